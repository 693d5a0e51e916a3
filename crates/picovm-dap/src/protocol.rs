//! Wire shapes for the client-facing control protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Inbound request: `{ seq, command, arguments? }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl Request {
    /// Deserialize the arguments payload, treating absent arguments as `{}`.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let value = self
            .arguments
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        serde_json::from_value(value)
    }
}

/// A fully-sequenced outbound message, ready for framing.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub seq: i64,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Response {
        request_seq: i64,
        success: bool,
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        body: Value,
    },
    Event {
        event: String,
        body: Value,
    },
}

/// Events the bridge can emit. The stopped reason is already normalized, so
/// variants carry plain wire values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Initialized,
    Stopped { reason: &'static str, thread_id: i64 },
    Continued { thread_id: i64 },
    Terminated,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialized => "initialized",
            Event::Stopped { .. } => "stopped",
            Event::Continued { .. } => "continued",
            Event::Terminated => "terminated",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Event::Initialized | Event::Terminated => json!({}),
            Event::Stopped { reason, thread_id } => json!({
                "reason": reason,
                "threadId": thread_id,
                "allThreadsStopped": true,
            }),
            Event::Continued { thread_id } => json!({
                "threadId": thread_id,
                "allThreadsContinued": true,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_configuration_done_request: bool,
    pub supports_step_back: bool,
    pub supports_restart_request: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointView {
    pub line: i64,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SetBreakpointsBody {
    pub breakpoints: Vec<BreakpointView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thread {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ThreadsBody {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    pub line: i64,
    pub column: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceBody {
    pub stack_frames: Vec<StackFrame>,
    pub total_frames: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScopesBody {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VariablesBody {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContinueBody {
    pub all_threads_continued: bool,
}

/// Launch arguments. An inline `program` wins over `programFile`; exactly one
/// of the two must be usable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub program: Option<Vec<Value>>,
    #[serde(default)]
    pub program_file: Option<String>,
    #[serde(default = "default_stop_on_entry")]
    pub stop_on_entry: bool,
}

fn default_stop_on_entry() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetBreakpointsArguments {
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceBreakpoint {
    pub line: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    #[serde(default)]
    pub start_frame: i64,
    #[serde(default = "default_levels")]
    pub levels: i64,
}

fn default_levels() -> i64 {
    20
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    #[serde(default)]
    pub frame_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    #[serde(default)]
    pub variables_reference: i64,
}
