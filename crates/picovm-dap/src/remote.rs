//! Typed surface of the remote debugging engine.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use picovm_rpc::{RemoteCall, RpcError, RpcSession};
use serde::Deserialize;

use crate::outcome::ControlOutcome;
use crate::protocol::{BreakpointView, Scope, Thread, Variable};

/// Remote method names, one per bridge operation that reaches the engine.
pub mod methods {
    pub const INITIALIZE: &str = "debugger/initialize";
    pub const LAUNCH: &str = "debugger/launch";
    pub const SET_BREAKPOINTS: &str = "debugger/setBreakpoints";
    pub const THREADS: &str = "debugger/threads";
    pub const STACK_TRACE: &str = "debugger/stackTrace";
    pub const SCOPES: &str = "debugger/scopes";
    pub const VARIABLES: &str = "debugger/variables";
    pub const NEXT: &str = "debugger/next";
    pub const STEP_BACK: &str = "debugger/stepBack";
    pub const CONTINUE: &str = "debugger/continue";
    pub const PAUSE: &str = "debugger/pause";
    pub const DISCONNECT: &str = "debugger/disconnect";
}

/// Establishes a connection to the engine for one source program.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, source: &Path) -> Result<Arc<dyn RemoteCall>, RpcError>;
}

/// Production connector: one engine process per session.
pub struct EngineConnector {
    command: String,
}

impl EngineConnector {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Connect for EngineConnector {
    async fn connect(&self, source: &Path) -> Result<Arc<dyn RemoteCall>, RpcError> {
        let session = RpcSession::spawn(&self.command, source).await?;
        Ok(Arc::new(session))
    }
}

/// Result of `debugger/launch`: the new session identity plus the first
/// control outcome.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    pub session_id: i64,
    pub thread_id: i64,
    #[serde(flatten)]
    pub control: ControlOutcome,
}

#[derive(Debug, Deserialize)]
pub struct RemoteBreakpoints {
    pub breakpoints: Vec<BreakpointView>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteThreads {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStackTrace {
    pub total_frames: i64,
    pub stack_frames: Vec<RemoteFrame>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteFrame {
    pub id: i64,
    pub name: String,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoteScopes {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteVariables {
    pub variables: Vec<Variable>,
}
