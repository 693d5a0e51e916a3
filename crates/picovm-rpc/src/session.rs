use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{RemoteCall, RpcError};

/// Calls awaiting a reply, keyed by request id. The method name travels with
/// the sender so failures can name the call they belong to.
type PendingCalls = Arc<Mutex<HashMap<i64, (String, oneshot::Sender<Result<Value, RpcError>>)>>>;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: i64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: i64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFailure>,
}

#[derive(Deserialize)]
struct RpcFailure {
    code: i64,
    message: String,
}

/// One live connection to an engine process, speaking newline-delimited
/// JSON-RPC 2.0 over the child's stdio. Dropping the session kills the
/// engine; calls still in flight then resolve with [`RpcError::Closed`].
pub struct RpcSession {
    _child: Child,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: PendingCalls,
    next_id: AtomicI64,
}

impl RpcSession {
    /// Spawn the engine for `source` and start routing its responses.
    pub async fn spawn(command: &str, source: &Path) -> Result<Self, RpcError> {
        let mut child = Command::new(command)
            .arg("--debug-server")
            .arg(source)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RpcError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(RpcError::Closed)?;
        let stdout = child.stdout.take().ok_or(RpcError::Closed)?;
        let pending: PendingCalls = Arc::default();

        let routes = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => route_line(&routes, &line),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "engine stdout read failed");
                        break;
                    }
                }
            }
            // Engine is gone: fail every call still waiting on it.
            let drained: Vec<_> = routes.lock().unwrap().drain().collect();
            for (_, (_, tx)) in drained {
                let _ = tx.send(Err(RpcError::Closed));
            }
        });

        Ok(Self {
            _child: child,
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicI64::new(1),
        })
    }
}

#[async_trait]
impl RemoteCall for RpcSession {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(id, (method.to_string(), tx));

        let payload = serde_json::to_vec(&RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        })?;

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = write_line(&mut stdin, &payload).await {
                self.pending.lock().unwrap().remove(&id);
                return Err(RpcError::Transport(e));
            }
        }
        debug!(method, id, "issued remote call");

        rx.await.unwrap_or(Err(RpcError::Closed))
    }
}

async fn write_line(stdin: &mut ChildStdin, payload: &[u8]) -> std::io::Result<()> {
    stdin.write_all(payload).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

fn route_line(pending: &PendingCalls, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let response: RpcResponse = match serde_json::from_str(line) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "discarding malformed engine message");
            return;
        }
    };
    let Some((method, tx)) = pending.lock().unwrap().remove(&response.id) else {
        warn!(id = response.id, "engine response with no matching call");
        return;
    };
    let outcome = match (response.result, response.error) {
        (_, Some(failure)) => Err(RpcError::Call {
            method,
            code: failure.code,
            message: failure.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(Value::Null),
    };
    let _ = tx.send(outcome);
}
