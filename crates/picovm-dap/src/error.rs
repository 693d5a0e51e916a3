use std::io;

use picovm_rpc::RpcError;
use thiserror::Error;

/// Everything that can fail while handling a request. The dispatcher's
/// failure boundary turns any of these into exactly one failure response.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No active debug session. Launch first.")]
    NoSession,
    #[error("Missing launch field 'source' and no fallback source is configured")]
    MissingSource,
    #[error("Launch requires either 'program' (inline JSON array) or 'programFile'")]
    MissingProgram,
    #[error("Failed to read program file '{path}': {source}")]
    ProgramFileRead {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse program file '{path}': {source}")]
    ProgramFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Program file '{path}' must contain a JSON array")]
    ProgramFileNotArray { path: String },
    #[error("Failed to deserialize request arguments: {0}")]
    InvalidArguments(serde_json::Error),
    #[error("Remote engine payload did not match the expected shape: {0}")]
    RemotePayload(serde_json::Error),
    #[error(transparent)]
    Remote(#[from] RpcError),
    #[error("Unsupported request: {0}")]
    UnsupportedCommand(String),
}

impl BridgeError {
    /// Fixed identifier carried in the structured error body, one per
    /// failure class: precondition, input, remote, protocol.
    pub fn id(&self) -> i64 {
        match self {
            BridgeError::NoSession => 1,
            BridgeError::MissingSource
            | BridgeError::MissingProgram
            | BridgeError::ProgramFileRead { .. }
            | BridgeError::ProgramFileParse { .. }
            | BridgeError::ProgramFileNotArray { .. }
            | BridgeError::InvalidArguments(_) => 2,
            BridgeError::Remote(_) | BridgeError::RemotePayload(_) => 3,
            BridgeError::UnsupportedCommand(_) => 4,
        }
    }
}
