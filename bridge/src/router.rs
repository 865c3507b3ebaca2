//! Client command dispatch and startup orchestration.
//!
//! Commands are classified in arrival order. Until the first
//! `Debugger.resume`, configuration commands are buffered or answered
//! locally; the first resume drives the adapter's required sequence
//! (initialize, launch/attach, initialized, bulk breakpoints, exception
//! filters, configurationDone). Afterwards each command runs as its own
//! task so a handler suspended on an adapter round-trip never blocks later
//! commands or event delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use adapter::types::Source;
use adapter::AdapterSession;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::breakpoints::BreakpointLedger;
use crate::client::{ClientSink, NotificationLevel};
use crate::convert::{adapter_to_client, client_to_adapter};
use crate::files::FileCache;
use crate::protocol::{
    ChromeRequest, CompletionsParams, ContinueToLocationParams, EvaluateOnCallFrameParams,
    GetPropertiesParams, GetScriptSourceParams, GetThreadStackParams, Location,
    PausedEventParams, PropertyDescriptor, RemoteObject, RemoveBreakpointParams,
    RuntimeEvaluateParams, SelectThreadParams, SetBreakpointByUrlParams,
    SetPauseOnExceptionsParams, SetVariableValueParams,
};
use crate::threads::{ThreadRegistry, ThreadState};
use crate::translator::fetch_call_frames;
use crate::{StartMode, SessionConfig};

/// A `setBreakpointByUrl` received before the session started; replied to
/// after the post-launch bulk sync.
struct BufferedBreakpoint {
    request_id: i64,
    path: String,
    /// 1-based adapter line.
    line: i64,
    condition: Option<String>,
}

#[derive(Default)]
struct Flags {
    /// First `Debugger.enable` seen.
    enabled: bool,
    /// First `Debugger.resume` seen; the client has finished configuring.
    started: bool,
    config_done_sent: bool,
    exception_filters: Vec<String>,
    pending_breakpoints: Vec<BufferedBreakpoint>,
}

struct Inner {
    config: SessionConfig,
    session: AdapterSession,
    sink: ClientSink,
    files: Arc<dyn FileCache>,
    ledger: Arc<BreakpointLedger>,
    registry: Arc<ThreadRegistry>,
    flags: SyncMutex<Flags>,
    /// Latest-wins state for exception-filter updates: a generation stamped
    /// at dispatch (arrival order), a token to cancel the in-flight call,
    /// and a FIFO lock so stale updates never reach the wire out of order.
    exception_generation: AtomicU64,
    exception_token: SyncMutex<Option<CancellationToken>>,
    exception_serial: Mutex<()>,
    /// Cancelled on unrecoverable startup failure; the session disposes.
    fatal: CancellationToken,
}

#[derive(Clone)]
pub struct CommandRouter {
    inner: Arc<Inner>,
}

impl CommandRouter {
    pub fn new(
        config: SessionConfig,
        session: AdapterSession,
        sink: ClientSink,
        files: Arc<dyn FileCache>,
        ledger: Arc<BreakpointLedger>,
        registry: Arc<ThreadRegistry>,
        fatal: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                session,
                sink,
                files,
                ledger,
                registry,
                flags: SyncMutex::new(Flags::default()),
                exception_generation: AtomicU64::new(0),
                exception_token: SyncMutex::new(None),
                exception_serial: Mutex::new(()),
                fatal,
            }),
        }
    }

    pub fn config_done_sent(&self) -> bool {
        self.inner.flags.lock().unwrap().config_done_sent
    }

    /// Dispatch one client command. Classification happens inline, in
    /// arrival order; adapter round-trips run in spawned tasks.
    pub fn dispatch(&self, request: ChromeRequest) {
        tracing::debug!(id = request.id, method = %request.method, "client command");
        if self.dispatch_startup(&request) {
            return;
        }

        // Latest-wins bookkeeping must happen in arrival order, so this one
        // does not go through the spawned-handler path.
        if request.method == "Debugger.setPauseOnExceptions" {
            self.update_exception_filters(request);
            return;
        }

        let router = self.clone();
        tokio::spawn(async move {
            let id = request.id;
            match router.handle(request).await {
                Ok(result) => router.inner.sink.reply(id, result),
                Err(e) => {
                    tracing::warn!(id, error = %e, "command handler failed");
                    router.inner.sink.reply_error(id, e);
                }
            }
        });
    }

    /// Pre-start buffering and acknowledgement. Returns true when the
    /// command was consumed here.
    fn dispatch_startup(&self, request: &ChromeRequest) -> bool {
        let mut flags = self.inner.flags.lock().unwrap();

        match request.method.as_str() {
            "Debugger.enable" if !flags.enabled => {
                flags.enabled = true;
                drop(flags);
                self.inner.sink.reply_empty(request.id);
                // Tells the UI the session is live and ready for
                // configuration.
                self.inner.sink.event(
                    "Debugger.paused",
                    PausedEventParams::synthetic("initial break", None),
                );
                true
            }
            _ if flags.started => false,
            "Debugger.setBreakpointByUrl" => {
                match parse_params::<SetBreakpointByUrlParams>(&request.params) {
                    Ok(params) => {
                        flags.pending_breakpoints.push(BufferedBreakpoint {
                            request_id: request.id,
                            path: params.url,
                            line: client_to_adapter(params.line_number),
                            condition: params.condition,
                        });
                    }
                    Err(e) => {
                        drop(flags);
                        self.inner.sink.reply_error(request.id, e);
                    }
                }
                true
            }
            "Debugger.setPauseOnExceptions" => {
                let result = parse_params::<SetPauseOnExceptionsParams>(&request.params)
                    .and_then(|params| filters_for_state(&params.state));
                match result {
                    Ok(filters) => {
                        // Local only; sent to the adapter at startup.
                        flags.exception_filters = filters;
                        drop(flags);
                        self.inner.sink.reply_empty(request.id);
                    }
                    Err(e) => {
                        drop(flags);
                        self.inner.sink.reply_error(request.id, e);
                    }
                }
                true
            }
            "Debugger.setDebuggerSettings" | "Runtime.enable" => {
                drop(flags);
                self.inner.sink.reply_empty(request.id);
                true
            }
            "Debugger.resume" => {
                flags.started = true;
                drop(flags);
                let router = self.clone();
                let request_id = request.id;
                tokio::spawn(async move {
                    router.start_debugging(request_id).await;
                });
                true
            }
            _ => false,
        }
    }

    /// The startup sequence required by the adapter protocol, run when the
    /// client signals the end of its configuration phase.
    async fn start_debugging(&self, request_id: i64) {
        let inner = &self.inner;

        let started: eyre::Result<()> = async {
            inner.session.initialize().await?;
            match inner.config.mode {
                StartMode::Launch => inner.session.launch(inner.config.arguments.clone()).await?,
                StartMode::Attach => inner.session.attach(inner.config.arguments.clone()).await?,
            }
            if !inner.session.is_ready_for_breakpoints() {
                inner.session.wait_until_ready().await?;
            }
            Ok(())
        }
        .await;

        if let Err(e) = started {
            tracing::error!(error = %e, "startup failed");
            let verb = match inner.config.mode {
                StartMode::Launch => "launch",
                StartMode::Attach => "attach",
            };
            inner.sink.notification(
                NotificationLevel::Error,
                format!("Failed to {verb} the debugger!"),
            );
            inner.sink.reply_error(request_id, e);
            inner.fatal.cancel();
            return;
        }

        self.flush_buffered_breakpoints().await;

        let filters = inner.flags.lock().unwrap().exception_filters.clone();
        if let Err(e) = inner.session.set_exception_breakpoints(filters).await {
            tracing::warn!(error = %e, "setExceptionBreakpoints failed during startup");
        }

        if inner.session.supports_configuration_done_request() {
            if let Err(e) = inner.session.configuration_done().await {
                tracing::warn!(error = %e, "configurationDone failed");
            }
        }
        inner.flags.lock().unwrap().config_done_sent = true;

        inner.sink.reply_empty(request_id);
    }

    /// Stage every buffered breakpoint, one bulk sync per file, and answer
    /// the buffered requests. A sync failure fails every request in that
    /// file's group.
    async fn flush_buffered_breakpoints(&self) {
        let inner = &self.inner;
        let buffered = std::mem::take(&mut inner.flags.lock().unwrap().pending_breakpoints);

        let mut groups: Vec<(String, Vec<BufferedBreakpoint>)> = Vec::new();
        for bp in buffered {
            match groups.iter_mut().find(|(path, _)| *path == bp.path) {
                Some((_, group)) => group.push(bp),
                None => groups.push((bp.path.clone(), vec![bp])),
            }
        }

        for (path, group) in groups {
            let mut staged = Vec::with_capacity(group.len());
            for bp in &group {
                let handle = inner
                    .ledger
                    .stage(&bp.path, bp.line, bp.condition.clone())
                    .await;
                staged.push((bp.request_id, handle));
            }

            match inner.ledger.sync_file(&path).await {
                Ok(()) => {
                    for (request_id, handle) in staged {
                        match inner.ledger.find(&handle).await {
                            Some(record) => inner.sink.reply(
                                request_id,
                                breakpoint_reply(&path, record.id, record.line, record.resolved),
                            ),
                            None => inner
                                .sink
                                .reply_error(request_id, "breakpoint record disappeared"),
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "bulk breakpoint sync failed");
                    for (request_id, _) in staged {
                        inner.sink.reply_error(request_id, &e);
                    }
                }
            }
        }
    }

    /// Steady-state handlers. The return value becomes the `result` payload;
    /// errors become `{id, error}` replies.
    async fn handle(&self, request: ChromeRequest) -> eyre::Result<serde_json::Value> {
        let inner = &self.inner;
        let params = &request.params;

        match request.method.as_str() {
            "Debugger.pause" => {
                let thread_id = inner
                    .registry
                    .active()
                    .or_else(|| inner.registry.known_ids().first().copied())
                    .unwrap_or(-1);
                inner.session.pause(thread_id).await?;
                inner.registry.clear_active();
                Ok(empty())
            }
            "Debugger.resume" => {
                let thread_id = inner.registry.active().unwrap_or(-1);
                inner.session.continue_thread(thread_id).await?;
                Ok(empty())
            }
            "Debugger.selectThread" => {
                let params: SelectThreadParams = parse_params(params)?;
                inner.registry.set_active(params.thread_id);
                Ok(empty())
            }
            "Debugger.stepOver" => {
                let thread_id = self.paused_thread("step over")?;
                inner.session.next(thread_id).await?;
                Ok(empty())
            }
            "Debugger.stepInto" => {
                let thread_id = self.paused_thread("step into")?;
                inner.session.step_in(thread_id).await?;
                Ok(empty())
            }
            "Debugger.stepOut" => {
                let thread_id = self.paused_thread("step out")?;
                inner.session.step_out(thread_id).await?;
                Ok(empty())
            }
            "Debugger.continueToLocation" => {
                let params: ContinueToLocationParams = parse_params(params)?;
                let target = params.location;
                inner.files.register_file(&target.script_id).await;
                inner
                    .session
                    .continue_to_location(
                        Source::from_path(&target.script_id),
                        client_to_adapter(target.line_number),
                        target.column_number.map(client_to_adapter).unwrap_or(1),
                    )
                    .await?;
                Ok(empty())
            }
            "Debugger.setBreakpointByUrl" => {
                let params: SetBreakpointByUrlParams = parse_params(params)?;
                let line = client_to_adapter(params.line_number);
                let handle = inner
                    .ledger
                    .stage(&params.url, line, params.condition)
                    .await;
                inner.ledger.sync_file(&params.url).await?;
                let record = inner
                    .ledger
                    .find(&handle)
                    .await
                    .ok_or_else(|| eyre::eyre!("breakpoint record disappeared"))?;
                Ok(breakpoint_reply(
                    &params.url,
                    record.id,
                    record.line,
                    record.resolved,
                ))
            }
            "Debugger.removeBreakpoint" => {
                let params: RemoveBreakpointParams = parse_params(params)?;
                let id = params
                    .breakpoint_id
                    .parse()
                    .map_err(|_| eyre::eyre!("invalid breakpoint id {}", params.breakpoint_id))?;
                inner.ledger.remove(id).await?;
                Ok(empty())
            }
            "Debugger.getScriptSource" => {
                let params: GetScriptSourceParams = parse_params(params)?;
                let source = inner.files.get_file_source(&params.script_id).await?;
                Ok(serde_json::json!({"scriptSource": source}))
            }
            "Debugger.getThreadStack" => {
                let params: GetThreadStackParams = parse_params(params)?;
                let call_frames = self.thread_stack(params.thread_id).await;
                Ok(serde_json::json!({"callFrames": call_frames}))
            }
            "Debugger.evaluateOnCallFrame" => {
                let params: EvaluateOnCallFrameParams = parse_params(params)?;
                let frame_id = parse_wire_id(&params.call_frame_id)?;
                let response = inner
                    .session
                    .evaluate(params.expression, Some(frame_id))
                    .await?;
                Ok(serde_json::json!({
                    "result": evaluate_remote_object(&response),
                    "wasThrown": false,
                }))
            }
            "Runtime.evaluate" => {
                let params: RuntimeEvaluateParams = parse_params(params)?;
                let response = inner.session.evaluate(params.expression, None).await?;
                Ok(serde_json::json!({
                    "result": evaluate_remote_object(&response),
                    "wasThrown": false,
                }))
            }
            "Debugger.setVariableValue" => {
                let params: SetVariableValueParams = parse_params(params)?;
                let reference = parse_wire_id(&params.call_frame_id)?;
                let response = inner
                    .session
                    .set_variable(reference, params.name, params.value)
                    .await?;
                Ok(serde_json::json!({"value": RemoteObject::text(response.value)}))
            }
            "Runtime.getProperties" => {
                let params: GetPropertiesParams = parse_params(params)?;
                let reference = parse_wire_id(&params.object_id)?;
                let response = inner.session.variables(reference).await?;
                let properties: Vec<PropertyDescriptor> = response
                    .variables
                    .into_iter()
                    .map(|variable| {
                        let value = if variable.variables_reference > 0 {
                            RemoteObject::object(
                                variable.value,
                                variable.variables_reference.to_string(),
                            )
                        } else {
                            RemoteObject::text(variable.value)
                        };
                        PropertyDescriptor {
                            name: variable.name,
                            value,
                            configurable: false,
                            enumerable: true,
                        }
                    })
                    .collect();
                Ok(serde_json::json!({"result": properties}))
            }
            "Debugger.completions" => {
                if !inner.session.supports_completions_request() {
                    return Ok(serde_json::json!({"targets": []}));
                }
                let params: CompletionsParams = parse_params(params)?;
                let column = params.column.map(client_to_adapter).unwrap_or(1);
                let response = inner
                    .session
                    .completions(params.text, column, params.frame_id)
                    .await?;
                let targets: Vec<serde_json::Value> = response
                    .targets
                    .into_iter()
                    .map(|item| {
                        serde_json::json!({
                            "text": item.text.unwrap_or(item.label),
                            "type": item.r#type,
                        })
                    })
                    .collect();
                Ok(serde_json::json!({"targets": targets}))
            }
            "Debugger.enable" | "Debugger.setDebuggerSettings" | "Runtime.enable" => Ok(empty()),
            method => eyre::bail!("Unknown command: {method}"),
        }
    }

    fn paused_thread(&self, action: &str) -> eyre::Result<i64> {
        self.inner
            .registry
            .active()
            .ok_or_else(|| eyre::eyre!("No paused thread to {action}"))
    }

    /// Latest-wins exception-filter update. The generation stamp and token
    /// swap happen inline (arrival order); the adapter call runs as a task
    /// that re-checks the generation once it holds the serializing lock, so
    /// a superseded update either never reaches the wire or is cancelled
    /// mid-flight.
    fn update_exception_filters(&self, request: ChromeRequest) {
        let inner = &self.inner;
        let filters = match parse_params::<SetPauseOnExceptionsParams>(&request.params)
            .and_then(|params| filters_for_state(&params.state))
        {
            Ok(filters) => filters,
            Err(e) => {
                inner.sink.reply_error(request.id, e);
                return;
            }
        };

        let config_done_sent = {
            let mut flags = inner.flags.lock().unwrap();
            flags.exception_filters = filters.clone();
            flags.config_done_sent
        };
        if !config_done_sent {
            // Local only until startup sends the filters itself.
            inner.sink.reply_empty(request.id);
            return;
        }

        let generation = inner.exception_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        {
            let mut current = inner.exception_token.lock().unwrap();
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
        }

        let router = self.clone();
        let request_id = request.id;
        tokio::spawn(async move {
            let inner = &router.inner;
            let _serial = inner.exception_serial.lock().await;
            if inner.exception_generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("exception filter update superseded before send");
                inner.sink.reply_empty(request_id);
                return;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!("exception filter update superseded in flight");
                    inner.sink.reply_empty(request_id);
                }
                result = inner.session.set_exception_breakpoints(filters) => {
                    match result {
                        Ok(()) => inner.sink.reply_empty(request_id),
                        Err(e) => inner.sink.reply_error(request_id, e),
                    }
                }
            }
        });
    }

    /// Full-stack fetch for `getThreadStack`, cached in the registry.
    async fn thread_stack(&self, thread_id: i64) -> Vec<crate::protocol::CallFrame> {
        let inner = &self.inner;
        let Some(info) = inner.registry.snapshot(thread_id) else {
            return vec![];
        };
        if info.state != ThreadState::Paused {
            return vec![];
        }
        if info.call_stack_loaded {
            return info.call_frames;
        }
        match fetch_call_frames(&inner.session, thread_id, None).await {
            Ok(call_frames) => {
                inner
                    .registry
                    .cache_frames(thread_id, call_frames.clone(), true);
                call_frames
            }
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "full stack fetch failed");
                info.call_frames
            }
        }
    }

    /// Re-apply configuration after an adapter restart (a second
    /// `initialized` event): all breakpoints, exception filters,
    /// configurationDone.
    pub(crate) async fn resync_configuration(&self) {
        let inner = &self.inner;
        if let Err(e) = inner.ledger.sync_all().await {
            tracing::warn!(error = %e, "breakpoint resync failed");
        }
        let filters = inner.flags.lock().unwrap().exception_filters.clone();
        if let Err(e) = inner.session.set_exception_breakpoints(filters).await {
            tracing::warn!(error = %e, "exception filter resync failed");
        }
        if inner.session.supports_configuration_done_request() {
            if let Err(e) = inner.session.configuration_done().await {
                tracing::warn!(error = %e, "configurationDone resync failed");
            }
        }
    }
}

fn empty() -> serde_json::Value {
    serde_json::json!({})
}

fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> eyre::Result<T> {
    serde_json::from_value(params.clone()).map_err(|e| eyre::eyre!("invalid parameters: {e}"))
}

/// Wire ids (call frame ids, object ids) are stringified integers.
fn parse_wire_id(raw: &str) -> eyre::Result<i64> {
    raw.parse()
        .map_err(|_| eyre::eyre!("invalid object id {raw}"))
}

fn filters_for_state(state: &str) -> eyre::Result<Vec<String>> {
    match state {
        "none" => Ok(vec![]),
        "uncaught" => Ok(vec!["uncaught".to_string()]),
        "all" => Ok(vec!["all".to_string()]),
        other => eyre::bail!("unknown exception pause state: {other}"),
    }
}

fn breakpoint_reply(
    path: &str,
    id: Option<i64>,
    line: i64,
    resolved: bool,
) -> serde_json::Value {
    serde_json::json!({
        "breakpointId": id.map(|id| id.to_string()).unwrap_or_default(),
        "locations": [Location {
            script_id: path.to_string(),
            line_number: adapter_to_client(line),
            column_number: 0,
        }],
        "resolved": resolved,
    })
}

fn evaluate_remote_object(response: &adapter::responses::EvaluateResponse) -> RemoteObject {
    if response.variables_reference > 0 {
        RemoteObject::object(
            response.result.clone(),
            response.variables_reference.to_string(),
        )
    } else {
        RemoteObject::text(response.result.clone())
    }
}
