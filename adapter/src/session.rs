//! Typed wrapper over a live adapter connection.

use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use eyre::WrapErr;
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use transport::Connection;

use crate::events::AdapterEvent;
use crate::requests::{self, RequestBody};
use crate::responses::{
    Capabilities, CompletionsResponse, ContinueResponse, EvaluateResponse, ScopesResponse,
    SetBreakpointsResponse, SetVariableResponse, StackTraceResponse, ThreadsResponse,
    VariablesResponse,
};
use crate::types::{FrameId, Source, SourceBreakpoint, ThreadId, VariablesReference};
use crate::AdapterKind;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Shared {
    capabilities: SyncMutex<Option<Capabilities>>,
    // Flips to true on the first `initialized` event and stays true.
    ready_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<AdapterEvent>,
}

/// A debug-adapter session: typed requests, a typed multicast event stream,
/// and the capability cache.
#[derive(Clone)]
pub struct AdapterSession {
    connection: Connection,
    kind: AdapterKind,
    shared: Arc<Shared>,
}

impl AdapterSession {
    /// Wrap an already-connected transport. Spawns the event pump.
    pub fn new(connection: Connection, kind: AdapterKind) -> Self {
        let (ready_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            capabilities: SyncMutex::new(None),
            ready_tx,
            events_tx,
        });

        let session = Self {
            connection,
            kind,
            shared,
        };
        tokio::spawn(run_event_pump(session.clone()));
        session
    }

    pub fn kind(&self) -> AdapterKind {
        self.kind
    }

    /// Subscribe to the typed event stream. Subscribers joining mid-session
    /// see only subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.shared.events_tx.subscribe()
    }

    /// True once the first `initialized` event has arrived.
    pub fn is_ready_for_breakpoints(&self) -> bool {
        *self.shared.ready_tx.borrow()
    }

    /// Wait for the first `initialized` event (immediately if already seen).
    pub async fn wait_until_ready(&self) -> eyre::Result<()> {
        let mut rx = self.shared.ready_tx.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .wrap_err("adapter closed before the initialized event")?;
        Ok(())
    }

    /// Token cancelled when the adapter connection closes.
    pub fn exit(&self) -> CancellationToken {
        self.connection.exit()
    }

    /// Close the underlying connection, failing every pending request.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    // --- capability accessors -----------------------------------------------

    pub fn capabilities(&self) -> Capabilities {
        self.shared
            .capabilities
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default()
    }

    fn capability(&self, read: impl Fn(&Capabilities) -> Option<bool>) -> bool {
        self.shared
            .capabilities
            .lock()
            .unwrap()
            .as_ref()
            .and_then(read)
            .unwrap_or(false)
    }

    pub fn supports_configuration_done_request(&self) -> bool {
        self.capability(|c| c.supports_configuration_done_request)
    }

    pub fn supports_completions_request(&self) -> bool {
        self.capability(|c| c.supports_completions_request)
    }

    pub fn supports_delayed_stack_trace_loading(&self) -> bool {
        self.capability(|c| c.supports_delayed_stack_trace_loading)
    }

    pub fn supports_conditional_breakpoints(&self) -> bool {
        self.capability(|c| c.supports_conditional_breakpoints)
    }

    pub fn supports_set_variable(&self) -> bool {
        self.capability(|c| c.supports_set_variable)
    }

    // --- typed requests -----------------------------------------------------

    /// Negotiate capabilities. The response body is cached for the accessors.
    pub async fn initialize(&self) -> eyre::Result<Capabilities> {
        let body = RequestBody::Initialize(requests::Initialize::new(self.kind.adapter_id()));
        let capabilities: Capabilities = self.request(body).await?;
        *self.shared.capabilities.lock().unwrap() = Some(capabilities.clone());
        Ok(capabilities)
    }

    /// Start a new debuggee. `arguments` are passed through verbatim.
    pub async fn launch(&self, arguments: serde_json::Value) -> eyre::Result<()> {
        self.request_unit(RequestBody::Launch(arguments)).await
    }

    /// Attach to a running debuggee. `arguments` are passed through verbatim.
    pub async fn attach(&self, arguments: serde_json::Value) -> eyre::Result<()> {
        self.request_unit(RequestBody::Attach(arguments)).await
    }

    /// Replace the full breakpoint set for one source file.
    pub async fn set_breakpoints(
        &self,
        source: Source,
        lines: Vec<i64>,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> eyre::Result<SetBreakpointsResponse> {
        self.request(RequestBody::SetBreakpoints(requests::SetBreakpoints {
            source,
            lines,
            breakpoints,
        }))
        .await
    }

    pub async fn set_exception_breakpoints(&self, filters: Vec<String>) -> eyre::Result<()> {
        self.request_unit(RequestBody::SetExceptionBreakpoints(
            requests::SetExceptionBreakpoints { filters },
        ))
        .await
    }

    pub async fn configuration_done(&self) -> eyre::Result<()> {
        self.request_unit(RequestBody::ConfigurationDone).await
    }

    pub async fn continue_thread(&self, thread_id: ThreadId) -> eyre::Result<ContinueResponse> {
        self.request(RequestBody::Continue(requests::Continue { thread_id }))
            .await
    }

    pub async fn pause(&self, thread_id: ThreadId) -> eyre::Result<()> {
        self.request_unit(RequestBody::Pause(requests::Pause { thread_id }))
            .await
    }

    pub async fn next(&self, thread_id: ThreadId) -> eyre::Result<()> {
        self.request_unit(RequestBody::Next(requests::Next { thread_id }))
            .await
    }

    pub async fn step_in(&self, thread_id: ThreadId) -> eyre::Result<()> {
        self.request_unit(RequestBody::StepIn(requests::StepIn { thread_id }))
            .await
    }

    pub async fn step_out(&self, thread_id: ThreadId) -> eyre::Result<()> {
        self.request_unit(RequestBody::StepOut(requests::StepOut { thread_id }))
            .await
    }

    /// Fetch a stack trace; `levels: None` requests the full stack.
    pub async fn stack_trace(
        &self,
        thread_id: ThreadId,
        levels: Option<i64>,
    ) -> eyre::Result<StackTraceResponse> {
        self.request(RequestBody::StackTrace(requests::StackTrace {
            thread_id,
            start_frame: None,
            levels,
        }))
        .await
    }

    pub async fn scopes(&self, frame_id: FrameId) -> eyre::Result<ScopesResponse> {
        self.request(RequestBody::Scopes(requests::Scopes { frame_id }))
            .await
    }

    pub async fn variables(
        &self,
        variables_reference: VariablesReference,
    ) -> eyre::Result<VariablesResponse> {
        self.request(RequestBody::Variables(requests::Variables {
            variables_reference,
        }))
        .await
    }

    pub async fn set_variable(
        &self,
        variables_reference: VariablesReference,
        name: String,
        value: String,
    ) -> eyre::Result<SetVariableResponse> {
        self.request(RequestBody::SetVariable(requests::SetVariable {
            variables_reference,
            name,
            value,
        }))
        .await
    }

    pub async fn evaluate(
        &self,
        expression: String,
        frame_id: Option<FrameId>,
    ) -> eyre::Result<EvaluateResponse> {
        self.request(RequestBody::Evaluate(requests::Evaluate {
            expression,
            frame_id,
            context: None,
        }))
        .await
    }

    pub async fn completions(
        &self,
        text: String,
        column: i64,
        frame_id: Option<FrameId>,
    ) -> eyre::Result<CompletionsResponse> {
        self.request(RequestBody::Completions(requests::Completions {
            text,
            column,
            frame_id,
        }))
        .await
    }

    pub async fn continue_to_location(
        &self,
        source: Source,
        line: i64,
        column: i64,
    ) -> eyre::Result<()> {
        self.request_unit(RequestBody::ContinueToLocation(
            requests::ContinueToLocation {
                source,
                line,
                column,
            },
        ))
        .await
    }

    pub async fn threads(&self) -> eyre::Result<ThreadsResponse> {
        self.request(RequestBody::Threads).await
    }

    /// Best-effort goodbye; errors are reported to the caller but the
    /// connection is expected to close shortly afterwards either way.
    pub async fn disconnect(&self) -> eyre::Result<()> {
        self.request_unit(RequestBody::Disconnect).await
    }

    async fn request<T: DeserializeOwned>(&self, body: RequestBody) -> eyre::Result<T> {
        let (command, arguments) = body.into_wire();
        let response = self
            .connection
            .send(&command, arguments)
            .await
            .wrap_err_with(|| format!("sending '{command}' request"))?;
        let body = response.body.unwrap_or_else(|| serde_json::json!({}));
        serde_json::from_value(body).wrap_err_with(|| format!("decoding '{command}' response"))
    }

    async fn request_unit(&self, body: RequestBody) -> eyre::Result<()> {
        let (command, arguments) = body.into_wire();
        self.connection
            .send(&command, arguments)
            .await
            .wrap_err_with(|| format!("sending '{command}' request"))?;
        Ok(())
    }
}

async fn run_event_pump(session: AdapterSession) {
    let mut raw_events = session.connection.events();
    let exit = session.exit();
    loop {
        tokio::select! {
            _ = exit.cancelled() => break,
            received = raw_events.recv() => {
                match received {
                    Ok(raw) => {
                        let event = match AdapterEvent::from_wire(&raw) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::warn!(event = %raw.event, error = %e, "dropping unparseable event");
                                continue;
                            }
                        };
                        if matches!(event, AdapterEvent::Initialized) {
                            session.shared.ready_tx.send_replace(true);
                        }
                        let _ = session.shared.events_tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "event pump lagged behind the transport");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}
