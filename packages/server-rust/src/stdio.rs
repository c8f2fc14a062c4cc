//! stdio transport: newline-delimited JSON-RPC over stdin and stdout.
//!
//! Each inbound line is dispatched on its own task, so a slow `generate` call
//! does not hold up a `ping` behind it. Replies are funnelled through one
//! writer task that owns stdout, which keeps lines from interleaving. There is
//! no authentication here: only the parent process can reach these pipes.

use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use relay_core::{JsonRpcError, JsonRpcResponse, RequestId};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::network::error::is_disconnect;
use crate::service::{DispatchReply, McpDispatcher};

/// Replies buffered between message tasks and the stdout writer.
const OUTBOUND_CAPACITY: usize = 256;

/// Serves the process's own stdin and stdout until EOF, a closed stdout, or `shutdown`.
///
/// # Errors
///
/// Returns an error on a non-disconnect I/O failure.
pub async fn serve_stdio(
    dispatcher: Arc<McpDispatcher>,
    shutdown: impl Future<Output = ()> + Send,
) -> anyhow::Result<()> {
    info!("serving MCP over stdio");
    serve_lines(
        dispatcher,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await
}

/// Reads one JSON-RPC payload per line from `reader` and writes replies to `writer`.
///
/// Stops on EOF, when `writer` can no longer be written, or when `shutdown`
/// resolves. Messages already being handled are allowed to finish and their
/// replies are flushed before returning.
///
/// # Errors
///
/// Returns an error on a non-disconnect I/O failure.
pub async fn serve_lines<R, W>(
    dispatcher: Arc<McpDispatcher>,
    mut reader: R,
    writer: W,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let writer_task = tokio::spawn(write_lines(writer, rx));
    let mut tasks = JoinSet::new();
    let mut buf = Vec::new();
    let mut read_error = None;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("stdio transport stopping on shutdown signal");
                break;
            }
            () = tx.closed() => {
                info!("stdout closed; stopping stdio transport");
                break;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    debug!("stdin reached EOF");
                    break;
                }
                Ok(_) => {
                    reap_finished(&mut tasks);
                    let line = std::mem::take(&mut buf);
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let dispatcher = Arc::clone(&dispatcher);
                    let tx = tx.clone();
                    tasks.spawn(async move { handle_line(&dispatcher, line, &tx).await });
                }
                Err(e) if is_disconnect(e.kind()) => {
                    info!(error = %e, "stdin disconnected");
                    break;
                }
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        log_task_exit(joined);
    }
    drop(tx);

    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if is_disconnect(e.kind()) => {
            info!(error = %e, "stdout disconnected");
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(e) => anyhow::bail!("stdout writer task failed: {e}"),
    }

    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Collects message tasks that have already finished, returning how many.
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        log_task_exit(joined);
        reaped += 1;
    }
    reaped
}

fn log_task_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "stdio message task did not complete");
    }
}

/// Dispatches one line and queues its reply, if any.
///
/// A panic while handling the message is answered with an internal error so
/// the client is not left waiting, and the transport keeps running.
async fn handle_line(dispatcher: &McpDispatcher, line: Vec<u8>, tx: &mpsc::Sender<String>) {
    let reply = match AssertUnwindSafe(dispatcher.dispatch(&line)).catch_unwind().await {
        Ok(reply) => reply,
        Err(_) => {
            let id = request_id_of(&line);
            error!(request_id = ?id, kind = "panic", "stdio message handler panicked");
            DispatchReply::Single(JsonRpcResponse::error(
                id,
                JsonRpcError::internal("internal server error"),
            ))
        }
    };

    if let Some(json) = reply.to_json() {
        if tx.send(json).await.is_err() {
            debug!("dropping reply; stdout writer has stopped");
        }
    }
}

/// Best-effort id of a single request, used when its handler panicked.
fn request_id_of(line: &[u8]) -> Option<RequestId> {
    let value: Value = serde_json::from_slice(line).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

async fn write_lines<W>(mut writer: W, mut rx: mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
