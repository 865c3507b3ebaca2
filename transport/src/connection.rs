//! Correlating connection over a framed byte stream.
//!
//! [`Connection`] owns both halves of an adapter byte stream. A background
//! reader task unframes incoming messages and dispatches them: responses are
//! matched to their pending request by `request_seq`, events and framing
//! errors fan out to broadcast subscribers, and reverse requests are answered
//! by a configurable handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::AdapterCodec;
use crate::error::{AdapterError, TransportError};
use crate::message::{Event, Message, OutgoingMessage, OutgoingResponse, Request, Response, Seq};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const ERROR_CHANNEL_CAPACITY: usize = 64;

/// What a reverse-request handler wants sent back to the adapter.
#[derive(Debug, Clone, Default)]
pub struct ReverseReply {
    pub success: bool,
    pub message: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl ReverseReply {
    /// An empty success reply, the default for unhandled reverse requests.
    pub fn empty_success() -> Self {
        Self {
            success: true,
            message: None,
            body: None,
        }
    }
}

type ReverseHandler = Box<dyn Fn(&Request) -> ReverseReply + Send + Sync>;
type PendingMap = HashMap<Seq, oneshot::Sender<Result<Response, TransportError>>>;
type BoxedWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, AdapterCodec>;

struct Inner {
    writer: Mutex<BoxedWriter>,
    sequence_number: AtomicI64,
    // None once the connection has closed; requests then fail fast.
    pending: SyncMutex<Option<PendingMap>>,
    events_tx: broadcast::Sender<Event>,
    errors_tx: broadcast::Sender<String>,
    reverse_handler: SyncMutex<Option<ReverseHandler>>,
    exit: CancellationToken,
}

/// Handle to a live adapter connection. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Take ownership of an adapter byte stream and start the reader task.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (errors_tx, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);

        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let inner = Arc::new(Inner {
            writer: Mutex::new(FramedWrite::new(boxed, AdapterCodec::new())),
            sequence_number: AtomicI64::new(1),
            pending: SyncMutex::new(Some(HashMap::new())),
            events_tx,
            errors_tx,
            reverse_handler: SyncMutex::new(None),
            exit: CancellationToken::new(),
        });

        let connection = Self { inner };
        tokio::spawn(run_reader(
            FramedRead::new(reader, AdapterCodec::new()),
            connection.clone(),
        ));

        connection
    }

    /// Send a request and await its response.
    ///
    /// The pending entry is registered before the frame is written, and the
    /// sequence number is allocated under the writer lock so wire order
    /// matches sequence order. There is no intrinsic timeout; a closed
    /// transport fails the future with [`TransportError::Closed`].
    pub async fn send(
        &self,
        command: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<Response, TransportError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut writer = self.inner.writer.lock().await;

            let seq = {
                let mut pending = self.inner.pending.lock().unwrap();
                let Some(pending) = pending.as_mut() else {
                    return Err(TransportError::Closed);
                };
                let seq = self.inner.sequence_number.fetch_add(1, Ordering::SeqCst);
                pending.insert(seq, tx);
                seq
            };

            let frame = OutgoingMessage::Request(Request {
                seq,
                command: command.to_string(),
                arguments,
            });
            tracing::trace!(seq, command, "sending request");

            if let Err(e) = writer.send(frame).await {
                if let Some(pending) = self.inner.pending.lock().unwrap().as_mut() {
                    pending.remove(&seq);
                }
                return Err(e.into());
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Closed),
        }
    }

    /// Send a response on the reverse channel.
    pub async fn send_response(
        &self,
        request_seq: Seq,
        command: &str,
        reply: ReverseReply,
    ) -> Result<(), TransportError> {
        let mut writer = self.inner.writer.lock().await;
        let seq = self.inner.sequence_number.fetch_add(1, Ordering::SeqCst);
        let frame = OutgoingMessage::Response(OutgoingResponse {
            seq,
            request_seq,
            success: reply.success,
            command: command.to_string(),
            message: reply.message,
            body: reply.body,
        });
        writer.send(frame).await.map_err(Into::into)
    }

    /// Subscribe to adapter events. Subscribers joining mid-session see only
    /// subsequent events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.inner.events_tx.subscribe()
    }

    /// Subscribe to non-fatal protocol errors (bad frames, unmatched
    /// responses).
    pub fn server_errors(&self) -> broadcast::Receiver<String> {
        self.inner.errors_tx.subscribe()
    }

    /// Token cancelled once the connection has closed for any reason.
    pub fn exit(&self) -> CancellationToken {
        self.inner.exit.clone()
    }

    /// Install a handler for adapter-initiated requests. Without one, every
    /// reverse request is answered with an empty success response.
    pub fn set_reverse_handler<F>(&self, handler: F)
    where
        F: Fn(&Request) -> ReverseReply + Send + Sync + 'static,
    {
        *self.inner.reverse_handler.lock().unwrap() = Some(Box::new(handler));
    }

    /// Close the connection: stop the reader task and fail every pending
    /// request with [`TransportError::Closed`]. Idempotent.
    pub fn shutdown(&self) {
        self.close();
    }

    fn close(&self) {
        let drained = self.inner.pending.lock().unwrap().take();
        if let Some(pending) = drained {
            for (seq, tx) in pending {
                tracing::debug!(seq, "failing pending request on close");
                let _ = tx.send(Err(TransportError::Closed));
            }
        }
        self.inner.exit.cancel();
    }

    fn surface_error(&self, text: String) {
        tracing::warn!(error = %text, "protocol error");
        let _ = self.inner.errors_tx.send(text);
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Event(event) => {
                tracing::trace!(event = %event.event, "received event");
                let _ = self.inner.events_tx.send(event);
            }
            Message::Response(response) => {
                let waiter = self
                    .inner
                    .pending
                    .lock()
                    .unwrap()
                    .as_mut()
                    .and_then(|pending| pending.remove(&response.request_seq));
                match waiter {
                    Some(tx) => {
                        let result = if response.success {
                            Ok(response)
                        } else {
                            Err(TransportError::Adapter(AdapterError {
                                command: response.command,
                                message: response.message,
                                body: response.body,
                            }))
                        };
                        let _ = tx.send(result);
                    }
                    None => {
                        self.surface_error(format!(
                            "response for unknown request_seq {}",
                            response.request_seq
                        ));
                    }
                }
            }
            Message::Request(request) => {
                let reply = {
                    let handler = self.inner.reverse_handler.lock().unwrap();
                    match handler.as_ref() {
                        Some(handler) => handler(&request),
                        None => ReverseReply::empty_success(),
                    }
                };
                let connection = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = connection
                        .send_response(request.seq, &request.command, reply)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to answer reverse request");
                    }
                });
            }
        }
    }
}

async fn run_reader<R>(mut reader: FramedRead<R, AdapterCodec>, connection: Connection)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let exit = connection.exit();
    loop {
        tokio::select! {
            _ = exit.cancelled() => {
                tracing::debug!("reader task cancelled");
                break;
            }
            frame = reader.next() => {
                match frame {
                    Some(Ok(message)) => connection.dispatch(message),
                    Some(Err(e)) if e.is_recoverable() => {
                        connection.surface_error(e.to_string());
                    }
                    Some(Err(e)) => {
                        connection.surface_error(e.to_string());
                        break;
                    }
                    None => {
                        tracing::debug!("adapter stream closed");
                        break;
                    }
                }
            }
        }
    }
    connection.close();
}
