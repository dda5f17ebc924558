//! Stdin/stdout JSON bridge for the runtime.
//!
//! Reads newline-delimited JSON [`InboundEvent`] messages from stdin, routes
//! them through [`Runtime::dispatch`], and writes every [`RuntimeEvent`] as
//! newline-delimited JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::dispatcher::InboundEvent;
use crate::error::{Result, VuiError};
use crate::runtime::{Runtime, RuntimeEvent};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

/// Longest accepted input line.
const MAX_LINE_BYTES: usize = 100 * 1024;

/// Run the bridge over the process stdin/stdout until stdin closes.
///
/// # Errors
///
/// Returns [`VuiError::Channel`] if stdin or stdout fails.
pub async fn run_stdio_bridge(runtime: Arc<Runtime>) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_bridge(runtime, reader, writer).await
}

/// Run the bridge over arbitrary line streams until `reader` reaches EOF.
///
/// Two tasks operate in parallel:
///
/// 1. **Reader** (this task) -- parses each line and awaits its dispatch, so
///    inbound events are handled in arrival order.
/// 2. **Event forwarder** -- writes runtime events to `writer`. On EOF it
///    drains what is already queued before the bridge returns.
///
/// Unparseable lines are answered with a `dispatch_failed` event.
///
/// # Errors
///
/// Returns [`VuiError::Channel`] if reading or writing fails.
pub async fn run_bridge<R, W>(runtime: Arc<Runtime>, reader: R, writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let done = CancellationToken::new();

    let mut events = runtime.subscribe();
    let event_writer = Arc::clone(&writer);
    let forwarder_done = done.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                event = events.recv() => Some(event),
                () = forwarder_done.cancelled() => None,
            };
            let Some(event) = event else {
                drain_queued(&mut events, &event_writer).await;
                break;
            };
            match event {
                Ok(event) => {
                    if let Err(e) = write_event(&event_writer, &event).await {
                        tracing::warn!(
                            error = %e,
                            "failed to write runtime event; stopping event forwarder"
                        );
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(RecvError::Closed) => {
                    tracing::info!("runtime event channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(&runtime, reader, &writer).await;

    done.cancel();
    if let Err(e) = forwarder.await {
        tracing::warn!(error = %e, "event forwarder ended abnormally");
    }
    reader_result
}

/// Write whatever is still queued, then stop.
async fn drain_queued<W>(events: &mut broadcast::Receiver<RuntimeEvent>, writer: &Mutex<W>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        match events.try_recv() {
            Ok(event) => {
                if write_event(writer, &event).await.is_err() {
                    return;
                }
            }
            Err(TryRecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "event forwarder lagged while draining");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

async fn run_reader<R, W>(runtime: &Runtime, mut reader: R, writer: &Mutex<W>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| VuiError::Channel(format!("failed to read inbound line: {e}")))?;
        if bytes_read == 0 {
            tracing::info!("input closed (EOF); stopping bridge");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.len() > MAX_LINE_BYTES {
            tracing::warn!(len = trimmed.len(), "inbound line too long, skipped");
            let rejection = RuntimeEvent::DispatchFailed {
                error: format!("inbound line exceeds {MAX_LINE_BYTES} bytes"),
            };
            write_event(writer, &rejection).await?;
            continue;
        }

        match serde_json::from_str::<InboundEvent>(trimmed) {
            Ok(event) => runtime.dispatch(event).await,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse inbound event");
                let rejection = RuntimeEvent::DispatchFailed {
                    error: format!("failed to parse inbound event: {e}"),
                };
                write_event(writer, &rejection).await?;
            }
        }
    }
}

/// Write one event as a JSON line and flush.
async fn write_event<W>(writer: &Mutex<W>, event: &RuntimeEvent) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(event)?;
    let mut w = writer.lock().await;
    w.write_all(json.as_bytes())
        .await
        .map_err(|e| VuiError::Channel(format!("failed to write event: {e}")))?;
    w.write_all(b"\n")
        .await
        .map_err(|e| VuiError::Channel(format!("failed to write newline: {e}")))?;
    w.flush()
        .await
        .map_err(|e| VuiError::Channel(format!("failed to flush events: {e}")))?;
    Ok(())
}
