use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("failed to spawn engine process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("failed to encode engine request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("remote call '{method}' failed: {message}")]
    Call {
        method: String,
        code: i64,
        message: String,
    },
    #[error("engine connection closed")]
    Closed,
}
