//! MCP transports
//!
//! Every transport carries newline-delimited JSON. [`LineTransport`] frames
//! messages over any buffered reader/writer pair; stdio and TCP only differ in
//! how that pair is built.

pub mod stdio;
pub mod tcp;

pub use stdio::stdio_transport;
pub use tcp::tcp_transport;

use std::io;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, trace};

use crate::handlers::{encode_response, Dispatcher, SessionSlot};
use crate::protocol::Method;

/// Newline-delimited JSON framing
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read the next non-blank line. `None` on EOF.
    pub async fn read_message(&mut self) -> io::Result<Option<String>> {
        read_line(&mut self.reader).await
    }

    /// Write one message followed by a newline
    pub async fn write_message(&mut self, message: &str) -> io::Result<()> {
        write_line(&mut self.writer, message).await
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Ok(None);
        }

        let message = line.trim_end();
        if !message.is_empty() {
            trace!("Received: {}", message);
            return Ok(Some(message.to_string()));
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> io::Result<()> {
    trace!("Sending: {}", message);
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Requests other than `initialize` may run alongside each other. Everything
/// else touches the connection's session slot and runs in read order.
fn runs_concurrently(value: &Value) -> bool {
    value.get("id").is_some()
        && value
            .get("method")
            .and_then(Value::as_str)
            .is_some_and(|method| method != Method::Initialize.as_str())
}

fn log_joined(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Request task panicked: {}", e);
        }
    }
}

/// Serve one connection until EOF or an I/O error.
///
/// Requests are dispatched as they arrive and answered as they finish, so a
/// slow tool call does not hold up later requests on the same connection.
/// Replies are matched by id. The connection gets its own session slot; the
/// session is expired when the connection ends.
pub async fn serve_connection<R, W>(
    dispatcher: &Arc<Dispatcher>,
    transport: &mut LineTransport<R, W>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut slot = SessionSlot::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let LineTransport { reader, writer } = transport;

    let session = &mut slot;
    let read_side = async move {
        let mut in_flight = JoinSet::new();

        let result = loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_joined(joined);
            }

            let line = match read_line(reader).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("EOF received, closing connection");
                    break Ok(());
                }
                Err(e) => break Err(e),
            };

            let reply = match serde_json::from_str::<Value>(&line) {
                Ok(value) if runs_concurrently(&value) => {
                    let dispatcher = Arc::clone(dispatcher);
                    let mut task_slot = session.clone();
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        let reply = dispatcher
                            .handle_value(&mut task_slot, value)
                            .await
                            .and_then(|response| encode_response(&response));
                        if let Some(reply) = reply {
                            let _ = tx.send(reply);
                        }
                    });
                    None
                }
                Ok(value) => dispatcher
                    .handle_value(session, value)
                    .await
                    .and_then(|response| encode_response(&response)),
                Err(_) => dispatcher.handle_line(session, &line).await,
            };
            if let Some(reply) = reply {
                let _ = tx.send(reply);
            }
        };

        while let Some(joined) = in_flight.join_next().await {
            log_joined(joined);
        }
        drop(tx);
        result
    };

    let write_side = async move {
        while let Some(reply) = rx.recv().await {
            write_line(writer, &reply).await?;
        }
        Ok::<(), io::Error>(())
    };

    let result = tokio::try_join!(read_side, write_side).map(|_| ());
    dispatcher.close(&mut slot).await;
    result
}
