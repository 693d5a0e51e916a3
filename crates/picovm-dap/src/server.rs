//! Client transport: the framed protocol stream over stdio.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::adapter::Bridge;
use crate::protocol::{Message, Request};
use crate::remote::EngineConnector;

type DynResult<T> = miette::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub struct Config {
    /// Engine executable spawned for each debug session.
    pub engine: String,
    /// Source used when a launch request omits its `source` field.
    pub fallback_source: Option<PathBuf>,
}

/// Run the bridge over stdio until the client disconnects.
pub async fn start(config: Config) -> DynResult<()> {
    info!(engine = %config.engine, "starting picovm-dap bridge");

    let connector = Arc::new(EngineConnector::new(config.engine));
    let (bridge, outbound) = Bridge::new(connector, config.fallback_source);
    let bridge = Arc::new(bridge);

    let writer = tokio::spawn(write_outbound(
        outbound,
        BufWriter::new(tokio::io::stdout()),
    ));

    let mut reader = BufReader::new(tokio::io::stdin());
    loop {
        let Some(frame) = read_frame(&mut reader).await? else {
            info!("client disconnected");
            break;
        };
        let value: Value = match serde_json::from_slice(&frame) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "discarding malformed payload");
                continue;
            }
        };
        if value.get("type").and_then(Value::as_str) != Some("request") {
            debug!("ignoring non-request message");
            continue;
        }
        match serde_json::from_value::<Request>(value) {
            Ok(request) => {
                let bridge = Arc::clone(&bridge);
                // Each request runs as its own task; a handler suspended on
                // its remote call does not block later requests.
                tokio::spawn(async move { bridge.dispatch(request).await });
            }
            Err(e) => warn!(error = %e, "discarding malformed request"),
        }
    }

    // Dropping our handle lets the writer finish once in-flight handlers
    // have emitted their final messages.
    drop(bridge);
    writer.await??;
    Ok(())
}

/// Read one `Content-Length`-framed payload. `None` on clean end of stream.
async fn read_frame<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value.trim().parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid Content-Length header: {line}"),
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let len = content_length.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
    })?;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

/// Drain the emitter's channel onto the client stream, one frame per
/// message, preserving emission order.
async fn write_outbound<W: AsyncWrite + Unpin>(
    mut rx: UnboundedReceiver<Message>,
    mut writer: W,
) -> io::Result<()> {
    while let Some(message) = rx.recv().await {
        let payload = serde_json::to_vec(&message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer
            .write_all(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes())
            .await?;
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }
    Ok(())
}
