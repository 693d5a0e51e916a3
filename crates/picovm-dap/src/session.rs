//! Per-session bridge state.

use std::path::PathBuf;
use std::sync::Arc;

use picovm_rpc::RemoteCall;

/// Mutable state for the single in-flight session.
///
/// `remote_session_id` and `client` are present together from a successful
/// launch until disconnect. `pending_breakpoints` is the last requested line
/// set; it outlives the session so a later launch can resubmit it.
#[derive(Default)]
pub struct SessionState {
    pub remote_session_id: Option<i64>,
    pub source: Option<PathBuf>,
    pub pending_breakpoints: Vec<i64>,
    pub client: Option<Arc<dyn RemoteCall>>,
}

impl SessionState {
    /// Handle for operations that require a live remote session.
    pub fn session(&self) -> Option<(Arc<dyn RemoteCall>, i64)> {
        match (&self.client, self.remote_session_id) {
            (Some(client), Some(id)) => Some((Arc::clone(client), id)),
            _ => None,
        }
    }

    /// Install a freshly launched session, replacing any previous one.
    pub fn attach(&mut self, client: Arc<dyn RemoteCall>, session_id: i64, source: PathBuf) {
        self.client = Some(client);
        self.remote_session_id = Some(session_id);
        self.source = Some(source);
    }

    /// Discard the remote session. In-flight calls keep their own handle to
    /// the client; the bridge just drops its reference. The pending
    /// breakpoint set survives for the next launch.
    pub fn detach(&mut self) {
        self.client = None;
        self.remote_session_id = None;
    }
}
