pub mod error;
pub mod session;

pub use error::RpcError;
pub use session::RpcSession;

use async_trait::async_trait;
use serde_json::Value;

/// Asynchronous call interface to the remote execution engine.
///
/// The engine owns all real debugging semantics; callers see a single
/// `call(method, params)` operation returning the raw result payload or a
/// failure.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}
