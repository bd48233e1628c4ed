//! Newline-delimited JSON server.
//!
//! [`serve`] reads one request object per line and writes one reply object
//! per line. It is generic over `AsyncBufRead + AsyncWrite` so it can be
//! driven by stdio or in-memory buffers for testing.
//!
//! Requests are handled concurrently: a `NAVIGATION_CHANGED` must be able to
//! cancel a `CLASSIFY_BATCH` that is still running. Replies are therefore
//! written in completion order; senders correlate them by `id`.

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::messages::MessageRouter;

/// Serve requests from `reader` until EOF, then wait for every request in
/// flight to reply.
pub async fn serve<R, W>(router: MessageRouter, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut tasks: JoinSet<Value> = JoinSet::new();
    let mut reading = true;
    let mut handled = 0u64;

    while reading || !tasks.is_empty() {
        tokio::select! {
            line = lines.next_line(), if reading => {
                let Some(line) = line? else {
                    debug!(in_flight = tasks.len(), "input closed");
                    reading = false;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(msg) => {
                        let router = router.clone();
                        tasks.spawn(async move { router.handle(msg).await });
                    }
                    Err(e) => {
                        let reply = json!({ "ok": false, "error": format!("parse error: {e}") });
                        write_response(&mut writer, &reply).await?;
                    }
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                handled += 1;
                match joined {
                    Ok(reply) => write_response(&mut writer, &reply).await?,
                    Err(e) => warn!(error = %e, "message handler failed"),
                }
            }
        }
    }

    info!(handled, "server loop finished");
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Value) -> std::io::Result<()> {
    let mut line = serde_json::to_string(response).map_err(std::io::Error::other)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
