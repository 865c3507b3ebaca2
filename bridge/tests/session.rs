//! End-to-end tests: a real [`Session`] against a scripted mock adapter
//! speaking the wire protocol over the in-memory transport.

use std::collections::VecDeque;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing_subscriber::EnvFilter;

use adapter::{AdapterKind, AdapterSession};
use bridge::{
    ClientCallback, FileCache, NotificationLevel, OutputLevel, Session, SessionConfig, StartMode,
};
use transport::testing::MemoryTransport;
use transport::{AdapterCodec, Connection, Message, OutgoingEvent, OutgoingMessage, Request};

const WAIT: Duration = Duration::from_secs(5);

#[ctor::ctor]
fn init() {
    if std::io::stderr().is_terminal() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }
}

// --- mock adapter -----------------------------------------------------------

#[derive(Debug, Clone)]
enum MockReply {
    Body(serde_json::Value),
    Error(String),
    Delayed(Duration, serde_json::Value),
}

type Responder = Box<dyn Fn(&str, &serde_json::Value) -> Option<MockReply> + Send + Sync>;

/// A debug adapter with scripted behavior. Requests get default replies
/// unless a responder overrides them; `launch`/`attach` trigger the
/// `initialized` event like a real adapter.
#[derive(Clone)]
struct MockAdapter {
    log: Arc<SyncMutex<Vec<(String, serde_json::Value)>>>,
    writer: Arc<Mutex<FramedWrite<DuplexStream, AdapterCodec>>>,
    seq: Arc<AtomicI64>,
    next_breakpoint_id: Arc<AtomicI64>,
    responder: Arc<SyncMutex<Option<Responder>>>,
}

impl MockAdapter {
    fn start(transport: MemoryTransport) -> Self {
        let (read, write) = transport.into_split();
        let mock = Self {
            log: Arc::new(SyncMutex::new(Vec::new())),
            writer: Arc::new(Mutex::new(FramedWrite::new(write, AdapterCodec::new()))),
            seq: Arc::new(AtomicI64::new(1000)),
            next_breakpoint_id: Arc::new(AtomicI64::new(100)),
            responder: Arc::new(SyncMutex::new(None)),
        };

        let runner = mock.clone();
        tokio::spawn(async move {
            let mut reader = FramedRead::new(read, AdapterCodec::new());
            while let Some(frame) = reader.next().await {
                let request = match frame {
                    Ok(Message::Request(request)) => request,
                    Ok(other) => panic!("mock adapter got a non-request: {other:?}"),
                    Err(e) => panic!("mock adapter codec error: {e}"),
                };
                runner.handle(request);
            }
        });

        mock
    }

    fn set_responder(
        &self,
        responder: impl Fn(&str, &serde_json::Value) -> Option<MockReply> + Send + Sync + 'static,
    ) {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    fn handle(&self, request: Request) {
        let arguments = request.arguments.clone().unwrap_or(serde_json::json!({}));
        self.log
            .lock()
            .unwrap()
            .push((request.command.clone(), arguments.clone()));

        let scripted = self
            .responder
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|responder| responder(&request.command, &arguments));
        let reply = scripted.unwrap_or_else(|| self.default_reply(&request.command, &arguments));

        let mock = self.clone();
        tokio::spawn(async move {
            let (delay, body, error) = match reply {
                MockReply::Body(body) => (None, body, None),
                MockReply::Error(message) => (None, serde_json::json!({}), Some(message)),
                MockReply::Delayed(delay, body) => (Some(delay), body, None),
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let seq = mock.seq.fetch_add(1, Ordering::SeqCst);
            let frame = OutgoingMessage::Response(transport::OutgoingResponse {
                seq,
                request_seq: request.seq,
                success: error.is_none(),
                command: request.command.clone(),
                message: error,
                body: Some(body),
            });
            mock.writer
                .lock()
                .await
                .send(frame)
                .await
                .expect("mock adapter writing response");

            if matches!(request.command.as_str(), "launch" | "attach") {
                mock.emit("initialized", serde_json::json!({})).await;
            }
        });
    }

    fn default_reply(&self, command: &str, arguments: &serde_json::Value) -> MockReply {
        let body = match command {
            "initialize" => serde_json::json!({
                "supportsConfigurationDoneRequest": true,
                "supportsCompletionsRequest": true,
                "supportsDelayedStackTraceLoading": true,
                "supportsConditionalBreakpoints": true,
            }),
            "setBreakpoints" => {
                let lines = arguments["lines"].as_array().cloned().unwrap_or_default();
                let breakpoints: Vec<serde_json::Value> = lines
                    .iter()
                    .map(|line| {
                        serde_json::json!({
                            "id": self.next_breakpoint_id.fetch_add(1, Ordering::SeqCst),
                            "verified": true,
                            "line": line,
                        })
                    })
                    .collect();
                serde_json::json!({"breakpoints": breakpoints})
            }
            "stackTrace" => {
                let thread_id = arguments["threadId"].as_i64().unwrap_or(0);
                serde_json::json!({
                    "stackFrames": [{
                        "id": thread_id * 1000 + 1,
                        "name": format!("worker_{thread_id}"),
                        "line": 3,
                        "column": 1,
                        "source": {"path": "/src/app.py"},
                    }]
                })
            }
            "scopes" => {
                let frame_id = arguments["frameId"].as_i64().unwrap_or(0);
                serde_json::json!({
                    "scopes": [{
                        "name": "Locals",
                        "variablesReference": frame_id * 10,
                        "expensive": false,
                    }]
                })
            }
            "variables" => serde_json::json!({
                "variables": [
                    {"name": "x", "value": "42", "type": "int", "variablesReference": 0},
                    {"name": "obj", "value": "Object", "variablesReference": 99},
                ]
            }),
            "evaluate" => serde_json::json!({"result": "42", "variablesReference": 0}),
            "setVariable" => serde_json::json!({"value": arguments["value"]}),
            "completions" => serde_json::json!({
                "targets": [{"label": "print", "type": "function"}]
            }),
            _ => serde_json::json!({}),
        };
        MockReply::Body(body)
    }

    async fn emit(&self, event: &str, body: serde_json::Value) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.writer
            .lock()
            .await
            .send(OutgoingMessage::Event(OutgoingEvent {
                seq,
                event: event.to_string(),
                body: Some(body),
            }))
            .await
            .expect("mock adapter writing event");
    }

    fn requests(&self, command: &str) -> Vec<serde_json::Value> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == command)
            .map(|(_, arguments)| arguments.clone())
            .collect()
    }

    fn command_sequence(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Poll until the mock has seen `count` requests for `command`.
    async fn wait_for_requests(&self, command: &str, count: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if self.requests(command).len() >= count {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "mock adapter never saw {count} '{command}' requests; log: {:?}",
                    self.command_sequence()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

// --- client harness ---------------------------------------------------------

#[derive(Debug, Clone)]
enum Emitted {
    Message(serde_json::Value),
    Notification(&'static str, String),
    Output(&'static str, String),
}

struct TestClient {
    tx: mpsc::UnboundedSender<Emitted>,
}

impl ClientCallback for TestClient {
    fn send_protocol_message(&self, message: String) {
        let parsed = serde_json::from_str(&message).expect("bridge sent invalid JSON");
        let _ = self.tx.send(Emitted::Message(parsed));
    }

    fn send_notification(&self, level: NotificationLevel, message: String) {
        let _ = self.tx.send(Emitted::Notification(level.as_str(), message));
    }

    fn send_user_output(&self, level: OutputLevel, text: String) {
        let _ = self.tx.send(Emitted::Output(level.as_str(), text));
    }
}

struct TestFiles;

#[async_trait]
impl FileCache for TestFiles {
    async fn register_file(&self, _path: &str) {}

    async fn get_file_source(&self, path: &str) -> eyre::Result<String> {
        Ok(format!("# contents of {path}\n"))
    }
}

/// Buffers client traffic and waits with predicates, so tests are not
/// sensitive to interleaving of unrelated events.
struct Harness {
    rx: mpsc::UnboundedReceiver<Emitted>,
    buffer: VecDeque<Emitted>,
}

impl Harness {
    async fn wait_emitted<F>(&mut self, what: &str, pred: F) -> Emitted
    where
        F: Fn(&Emitted) -> bool,
    {
        if let Some(position) = self.buffer.iter().position(|emitted| pred(emitted)) {
            return self.buffer.remove(position).unwrap();
        }
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let emitted = tokio::time::timeout(remaining, self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
                .expect("client channel closed");
            if pred(&emitted) {
                return emitted;
            }
            self.buffer.push_back(emitted);
        }
    }

    async fn wait_response(&mut self, id: i64) -> serde_json::Value {
        let emitted = self
            .wait_emitted(&format!("response to {id}"), |emitted| {
                matches!(emitted, Emitted::Message(m) if m["id"] == id)
            })
            .await;
        match emitted {
            Emitted::Message(message) => message,
            _ => unreachable!(),
        }
    }

    async fn wait_event(&mut self, method: &str) -> serde_json::Value {
        let emitted = self
            .wait_emitted(&format!("{method} event"), |emitted| {
                matches!(emitted, Emitted::Message(m) if m["method"] == method)
            })
            .await;
        match emitted {
            Emitted::Message(message) => message["params"].clone(),
            _ => unreachable!(),
        }
    }

    async fn wait_notification(&mut self) -> (&'static str, String) {
        let emitted = self
            .wait_emitted("notification", |emitted| {
                matches!(emitted, Emitted::Notification(..))
            })
            .await;
        match emitted {
            Emitted::Notification(level, message) => (level, message),
            _ => unreachable!(),
        }
    }

    async fn wait_output(&mut self) -> (&'static str, String) {
        let emitted = self
            .wait_emitted("user output", |emitted| {
                matches!(emitted, Emitted::Output(..))
            })
            .await;
        match emitted {
            Emitted::Output(level, text) => (level, text),
            _ => unreachable!(),
        }
    }

    /// Collect everything arriving within `window` (plus what is buffered).
    async fn drain(&mut self, window: Duration) -> Vec<Emitted> {
        let mut collected: Vec<Emitted> = self.buffer.drain(..).collect();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return collected;
            }
            match tokio::time::timeout(remaining, self.rx.recv()).await {
                Ok(Some(emitted)) => collected.push(emitted),
                _ => return collected,
            }
        }
    }
}

fn count_events(emitted: &[Emitted], method: &str) -> usize {
    emitted
        .iter()
        .filter(|e| matches!(e, Emitted::Message(m) if m["method"] == method))
        .count()
}

// --- setup ------------------------------------------------------------------

fn start_session(kind: AdapterKind, mode: StartMode) -> (Session, MockAdapter, Harness) {
    let (ours, theirs) = MemoryTransport::pair();
    let (read, write) = ours.into_split();
    let connection = Connection::new(read, write);
    let adapter_session = AdapterSession::new(connection, kind);
    let mock = MockAdapter::start(theirs);

    let (tx, rx) = mpsc::unbounded_channel();
    let session = Session::new(
        SessionConfig {
            mode,
            arguments: serde_json::json!({"program": "/src/app.py"}),
        },
        adapter_session,
        Arc::new(TestClient { tx }),
        Arc::new(TestFiles),
    );

    (
        session,
        mock,
        Harness {
            rx,
            buffer: VecDeque::new(),
        },
    )
}

fn command(session: &Session, id: i64, method: &str, params: serde_json::Value) {
    let raw = serde_json::json!({"id": id, "method": method, "params": params}).to_string();
    session.handle_command(&raw);
}

/// Run the startup sequence (enable + first resume) and wait for it to
/// complete.
async fn boot(session: &Session, harness: &mut Harness) {
    command(session, 1, "Debugger.enable", serde_json::json!({}));
    harness.wait_response(1).await;
    harness.wait_event("Debugger.paused").await;
    command(session, 2, "Debugger.resume", serde_json::json!({}));
    let reply = harness.wait_response(2).await;
    assert_eq!(reply["result"], serde_json::json!({}));
}

// --- scenarios --------------------------------------------------------------

#[tokio::test]
async fn initial_handshake_acknowledges_and_fakes_a_pause() {
    let (session, _mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);

    command(&session, 1, "Debugger.enable", serde_json::json!({}));

    let reply = harness.wait_response(1).await;
    assert_eq!(reply["result"], serde_json::json!({}));

    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(paused["reason"], "initial break");
    assert_eq!(paused["callFrames"], serde_json::json!([]));
    assert_eq!(paused["data"], serde_json::json!({}));
}

#[tokio::test]
async fn buffered_breakpoints_sync_once_per_file_at_startup() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);

    command(&session, 1, "Debugger.enable", serde_json::json!({}));
    command(
        &session,
        2,
        "Debugger.setBreakpointByUrl",
        serde_json::json!({"url": "a", "lineNumber": 10}),
    );
    command(
        &session,
        3,
        "Debugger.setBreakpointByUrl",
        serde_json::json!({"url": "a", "lineNumber": 20}),
    );
    command(&session, 4, "Debugger.resume", serde_json::json!({}));

    let reply2 = harness.wait_response(2).await;
    assert_eq!(reply2["result"]["breakpointId"], "100");
    assert_eq!(
        reply2["result"]["locations"],
        serde_json::json!([{"scriptId": "a", "lineNumber": 10, "columnNumber": 0}])
    );
    assert_eq!(reply2["result"]["resolved"], true);

    let reply3 = harness.wait_response(3).await;
    assert_eq!(reply3["result"]["breakpointId"], "101");
    assert_eq!(reply3["result"]["locations"][0]["lineNumber"], 20);

    let reply4 = harness.wait_response(4).await;
    assert_eq!(reply4["result"], serde_json::json!({}));

    // Exactly one bulk call for file "a", both lines, in order, 1-based.
    let sync_calls = mock.requests("setBreakpoints");
    assert_eq!(sync_calls.len(), 1);
    assert_eq!(sync_calls[0]["source"]["path"], "a");
    assert_eq!(sync_calls[0]["lines"], serde_json::json!([11, 21]));

    // The adapter-mandated startup order.
    let sequence = mock.command_sequence();
    let position = |name: &str| {
        sequence
            .iter()
            .position(|command| command == name)
            .unwrap_or_else(|| panic!("{name} missing from {sequence:?}"))
    };
    assert!(position("initialize") < position("launch"));
    assert!(position("launch") < position("setBreakpoints"));
    assert!(position("setBreakpoints") < position("setExceptionBreakpoints"));
    assert!(position("setExceptionBreakpoints") < position("configurationDone"));
}

#[tokio::test]
async fn adapter_relocated_breakpoint_reports_resolved_line() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.set_responder(|command, _| {
        (command == "setBreakpoints").then(|| {
            MockReply::Body(serde_json::json!({
                "breakpoints": [{"id": 700, "verified": true, "line": 7}]
            }))
        })
    });

    // Client stages line 4 (0-based); the adapter moves it to line 7.
    command(
        &session,
        10,
        "Debugger.setBreakpointByUrl",
        serde_json::json!({"url": "b.py", "lineNumber": 4}),
    );

    let reply = harness.wait_response(10).await;
    assert_eq!(reply["result"]["breakpointId"], "700");
    assert_eq!(reply["result"]["locations"][0]["lineNumber"], 6);
    assert_eq!(reply["result"]["resolved"], true);

    // A later breakpoint event with a changed hit count.
    mock.emit(
        "breakpoint",
        serde_json::json!({
            "reason": "changed",
            "breakpoint": {"id": 700, "verified": true, "line": 7, "nuclide_hitCount": 4},
        }),
    )
    .await;

    let hit = harness.wait_event("Debugger.breakpointHitCountChanged").await;
    assert_eq!(hit["breakpointId"], "700");
    assert_eq!(hit["hitCount"], 4);
}

#[tokio::test]
async fn all_threads_stop_with_continue_race_pauses_once() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    for thread_id in [1, 2, 3] {
        mock.emit(
            "thread",
            serde_json::json!({"reason": "started", "threadId": thread_id}),
        )
        .await;
        harness.wait_event("Debugger.threadsUpdated").await;
    }

    // Thread 3's stack fetch hangs long enough for the continue to land.
    mock.set_responder(|command, arguments| {
        (command == "stackTrace" && arguments["threadId"] == 3).then(|| {
            MockReply::Delayed(
                Duration::from_millis(500),
                serde_json::json!({"stackFrames": []}),
            )
        })
    });

    mock.emit(
        "stopped",
        serde_json::json!({"reason": "breakpoint", "threadId": 1, "allThreadsStopped": true}),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    mock.emit("continued", serde_json::json!({"threadId": 3}))
        .await;

    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(paused["stopThreadId"], 1);
    assert_eq!(paused["reason"], "breakpoint");
    harness.wait_event("Debugger.resumed").await;

    // Thread 3 never paused; exactly one paused event total.
    let updated = harness.wait_event("Debugger.threadsUpdated").await;
    let threads = updated["threads"].as_array().unwrap();
    let thread3 = threads.iter().find(|t| t["id"] == 3).unwrap();
    assert_eq!(thread3["stopReason"], "running");

    let rest = harness.drain(Duration::from_millis(600)).await;
    assert_eq!(count_events(&rest, "Debugger.paused"), 0);
}

#[tokio::test]
async fn exception_filter_updates_are_latest_wins() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.set_responder(|command, _| {
        (command == "setExceptionBreakpoints").then(|| {
            MockReply::Delayed(Duration::from_millis(200), serde_json::json!({}))
        })
    });

    command(
        &session,
        20,
        "Debugger.setPauseOnExceptions",
        serde_json::json!({"state": "all"}),
    );
    command(
        &session,
        21,
        "Debugger.setPauseOnExceptions",
        serde_json::json!({"state": "none"}),
    );

    harness.wait_response(20).await;
    harness.wait_response(21).await;

    // One call at startup, then the racing pair; the last word is "none".
    mock.wait_for_requests("setExceptionBreakpoints", 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let calls = mock.requests("setExceptionBreakpoints");
    assert_eq!(
        calls.last().unwrap()["filters"],
        serde_json::json!([]),
        "final filter set must be empty: {calls:?}"
    );
}

#[tokio::test]
async fn adapter_restart_resyncs_configuration_silently() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);

    command(&session, 1, "Debugger.enable", serde_json::json!({}));
    command(
        &session,
        2,
        "Debugger.setBreakpointByUrl",
        serde_json::json!({"url": "a", "lineNumber": 10}),
    );
    command(&session, 3, "Debugger.resume", serde_json::json!({}));
    harness.wait_response(2).await;
    harness.wait_response(3).await;

    // A second initialized event means the adapter restarted.
    mock.emit("initialized", serde_json::json!({})).await;

    mock.wait_for_requests("setBreakpoints", 2).await;
    mock.wait_for_requests("setExceptionBreakpoints", 2).await;
    mock.wait_for_requests("configurationDone", 2).await;

    let resync = mock.requests("setBreakpoints").pop().unwrap();
    assert_eq!(resync["source"]["path"], "a");
    assert_eq!(resync["lines"], serde_json::json!([11]));

    // The internal resync is invisible to the client.
    let emitted = harness.drain(Duration::from_millis(200)).await;
    assert_eq!(count_events(&emitted, "Debugger.breakpointResolved"), 0);
    assert_eq!(
        count_events(&emitted, "Debugger.breakpointHitCountChanged"),
        0
    );
}

// --- steady-state behavior --------------------------------------------------

#[tokio::test]
async fn unknown_methods_get_error_replies() {
    let (session, _mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    command(&session, 99, "Debugger.bogus", serde_json::json!({}));

    let reply = harness.wait_response(99).await;
    assert_eq!(reply["error"]["message"], "Unknown command: Debugger.bogus");
}

#[tokio::test]
async fn stepping_without_a_paused_thread_is_an_error() {
    let (session, _mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    command(&session, 30, "Debugger.stepOver", serde_json::json!({}));
    let reply = harness.wait_response(30).await;
    assert_eq!(reply["error"]["message"], "No paused thread to step over");

    command(&session, 31, "Debugger.stepInto", serde_json::json!({}));
    let reply = harness.wait_response(31).await;
    assert_eq!(reply["error"]["message"], "No paused thread to step into");

    command(&session, 32, "Debugger.stepOut", serde_json::json!({}));
    let reply = harness.wait_response(32).await;
    assert_eq!(reply["error"]["message"], "No paused thread to step out");
}

#[tokio::test]
async fn stop_and_step_use_the_active_thread() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.emit(
        "stopped",
        serde_json::json!({"reason": "breakpoint", "threadId": 4}),
    )
    .await;
    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(paused["stopThreadId"], 4);
    // Frames for the active thread come fully translated.
    assert_eq!(paused["callFrames"][0]["functionName"], "worker_4");
    assert_eq!(paused["callFrames"][0]["location"]["lineNumber"], 2);
    assert_eq!(
        paused["callFrames"][0]["scopeChain"][0]["object"]["objectId"],
        (4001 * 10).to_string()
    );

    command(&session, 40, "Debugger.stepOver", serde_json::json!({}));
    harness.wait_response(40).await;
    assert_eq!(mock.requests("next")[0]["threadId"], 4);
}

#[tokio::test]
async fn thread_switch_banner_names_both_threads() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.emit(
        "stopped",
        serde_json::json!({"reason": "breakpoint", "threadId": 1}),
    )
    .await;
    let paused = harness.wait_event("Debugger.paused").await;
    assert!(paused.get("threadSwitchMessage").is_none());

    mock.emit("continued", serde_json::json!({})).await;
    harness.wait_event("Debugger.resumed").await;

    mock.emit(
        "stopped",
        serde_json::json!({"reason": "breakpoint", "threadId": 2}),
    )
    .await;
    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(
        paused["threadSwitchMessage"],
        "Active thread switched from thread #1 to thread #2"
    );
}

#[tokio::test]
async fn thread_info_less_stop_repauses_the_active_thread() {
    let (session, mock, mut harness) = start_session(AdapterKind::Node, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.emit(
        "stopped",
        serde_json::json!({"reason": "breakpoint", "threadId": 1}),
    )
    .await;
    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(paused["stopThreadId"], 1);

    // A stop naming no threads while thread 1 is still the active paused
    // thread reports that thread again, not a synthetic async-break.
    mock.emit(
        "stopped",
        serde_json::json!({"reason": "exception", "allThreadsStopped": false}),
    )
    .await;

    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(paused["stopThreadId"], 1);
    assert_eq!(paused["reason"], "exception");
    assert_eq!(paused["callFrames"][0]["functionName"], "worker_1");
}

#[tokio::test]
async fn async_break_without_threads_is_synthetic() {
    let (session, mock, mut harness) = start_session(AdapterKind::Node, StartMode::Launch);
    boot(&session, &mut harness).await;

    // No thread id, no known threads, nothing active.
    mock.emit("stopped", serde_json::json!({"reason": "pause"}))
        .await;

    let paused = harness.wait_event("Debugger.paused").await;
    assert_eq!(paused["reason"], "Async-Break");
    assert_eq!(paused["stopThreadId"], -1);
    assert_eq!(paused["callFrames"], serde_json::json!([]));
}

#[tokio::test]
async fn evaluate_and_properties_round_trip() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    command(
        &session,
        50,
        "Runtime.evaluate",
        serde_json::json!({"expression": "6 * 7"}),
    );
    let reply = harness.wait_response(50).await;
    assert_eq!(reply["result"]["result"]["type"], "text");
    assert_eq!(reply["result"]["result"]["value"], "42");
    assert_eq!(reply["result"]["wasThrown"], false);

    command(
        &session,
        51,
        "Runtime.getProperties",
        serde_json::json!({"objectId": "99"}),
    );
    let reply = harness.wait_response(51).await;
    assert_eq!(mock.requests("variables")[0]["variablesReference"], 99);
    let properties = reply["result"]["result"].as_array().unwrap();
    assert_eq!(properties[0]["name"], "x");
    assert_eq!(properties[0]["value"]["type"], "text");
    // Nested objects page lazily through their objectId.
    assert_eq!(properties[1]["value"]["type"], "object");
    assert_eq!(properties[1]["value"]["objectId"], "99");

    command(
        &session,
        52,
        "Debugger.evaluateOnCallFrame",
        serde_json::json!({"callFrameId": "1001", "expression": "x"}),
    );
    let reply = harness.wait_response(52).await;
    assert_eq!(reply["result"]["result"]["value"], "42");
    assert_eq!(mock.requests("evaluate")[1]["frameId"], 1001);
}

#[tokio::test]
async fn script_sources_come_from_the_file_cache() {
    let (session, _mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    command(
        &session,
        60,
        "Debugger.getScriptSource",
        serde_json::json!({"scriptId": "/src/app.py"}),
    );

    let reply = harness.wait_response(60).await;
    assert_eq!(
        reply["result"]["scriptSource"],
        "# contents of /src/app.py\n"
    );
}

#[tokio::test]
async fn completions_require_the_capability() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);

    // An adapter that reports no capabilities at all.
    mock.set_responder(|command, _| {
        (command == "initialize").then(|| MockReply::Body(serde_json::json!({})))
    });
    boot(&session, &mut harness).await;

    command(
        &session,
        70,
        "Debugger.completions",
        serde_json::json!({"text": "pri", "column": 3}),
    );

    let reply = harness.wait_response(70).await;
    assert_eq!(reply["result"]["targets"], serde_json::json!([]));
    assert!(mock.requests("completions").is_empty());
}

#[tokio::test]
async fn output_events_map_categories_and_strip_newlines() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.emit(
        "output",
        serde_json::json!({"category": "stdout", "output": "hello world\n"}),
    )
    .await;
    let (level, text) = harness.wait_output().await;
    assert_eq!(level, "log");
    assert_eq!(text, "hello world");

    mock.emit(
        "output",
        serde_json::json!({"category": "stderr", "output": "boom\r\n"}),
    )
    .await;
    let (level, text) = harness.wait_output().await;
    assert_eq!(level, "error");
    assert_eq!(text, "boom");

    mock.emit(
        "output",
        serde_json::json!({
            "category": "nuclide_notification",
            "output": "build finished",
            "data": {"type": "success"},
        }),
    )
    .await;
    let (level, message) = harness.wait_notification().await;
    assert_eq!(level, "success");
    assert_eq!(message, "build finished");
}

#[tokio::test]
async fn python_user_request_stop_expands_to_all_threads() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    for thread_id in [1, 2] {
        mock.emit(
            "thread",
            serde_json::json!({"reason": "started", "threadId": thread_id}),
        )
        .await;
        harness.wait_event("Debugger.threadsUpdated").await;
    }

    // No allThreadsStopped flag, but Python plus "user request" forces the
    // expansion.
    mock.emit(
        "stopped",
        serde_json::json!({"reason": "user request", "threadId": 1}),
    )
    .await;

    harness.wait_event("Debugger.paused").await;
    let updated = harness.wait_event("Debugger.threadsUpdated").await;
    let threads = updated["threads"].as_array().unwrap();
    assert!(threads
        .iter()
        .all(|thread| thread["stopReason"] == "user request"));

    mock.wait_for_requests("stackTrace", 2).await;
}

#[tokio::test]
async fn remove_breakpoint_resyncs_the_file() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    command(
        &session,
        80,
        "Debugger.setBreakpointByUrl",
        serde_json::json!({"url": "c.py", "lineNumber": 5}),
    );
    let reply = harness.wait_response(80).await;
    let breakpoint_id = reply["result"]["breakpointId"].as_str().unwrap().to_string();

    command(
        &session,
        81,
        "Debugger.removeBreakpoint",
        serde_json::json!({"breakpointId": breakpoint_id}),
    );
    harness.wait_response(81).await;

    let calls = mock.requests("setBreakpoints");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1]["lines"], serde_json::json!([]));
}

#[tokio::test]
async fn get_thread_stack_fetches_full_frames_once() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    // Two threads stop together; the non-active one gets a shallow fetch.
    mock.emit(
        "thread",
        serde_json::json!({"reason": "started", "threadId": 2}),
    )
    .await;
    harness.wait_event("Debugger.threadsUpdated").await;
    mock.emit(
        "stopped",
        serde_json::json!({"reason": "breakpoint", "threadId": 1, "allThreadsStopped": true}),
    )
    .await;
    harness.wait_event("Debugger.paused").await;

    let shallow = mock
        .requests("stackTrace")
        .into_iter()
        .find(|arguments| arguments["threadId"] == 2)
        .expect("thread 2 was expanded");
    assert_eq!(shallow["levels"], 1);

    command(
        &session,
        90,
        "Debugger.getThreadStack",
        serde_json::json!({"threadId": 2}),
    );
    let reply = harness.wait_response(90).await;
    assert_eq!(reply["result"]["callFrames"][0]["functionName"], "worker_2");

    // The full fetch has no levels bound and is cached afterwards.
    let full = mock
        .requests("stackTrace")
        .into_iter()
        .filter(|arguments| arguments["threadId"] == 2)
        .last()
        .unwrap();
    assert!(full.get("levels").is_none());

    let before = mock.requests("stackTrace").len();
    command(
        &session,
        91,
        "Debugger.getThreadStack",
        serde_json::json!({"threadId": 2}),
    );
    harness.wait_response(91).await;
    assert_eq!(mock.requests("stackTrace").len(), before);
}

#[tokio::test]
async fn failed_launch_toasts_and_disposes() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);

    mock.set_responder(|command, _| {
        (command == "launch").then(|| MockReply::Error("no such program".to_string()))
    });

    command(&session, 1, "Debugger.enable", serde_json::json!({}));
    harness.wait_response(1).await;
    command(&session, 2, "Debugger.resume", serde_json::json!({}));

    let (level, message) = harness.wait_notification().await;
    assert_eq!(level, "error");
    assert_eq!(message, "Failed to launch the debugger!");

    session.wait_for_session_end().await;
}

#[tokio::test]
async fn debuggee_exit_ends_the_session() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    mock.emit("exited", serde_json::json!({"exitCode": 0})).await;

    tokio::time::timeout(WAIT, session.wait_for_session_end())
        .await
        .expect("session should end after debuggee exit");
}

#[tokio::test]
async fn dispose_is_idempotent_and_sends_disconnect() {
    let (session, mock, mut harness) = start_session(AdapterKind::Python, StartMode::Launch);
    boot(&session, &mut harness).await;

    session.dispose().await;
    session.dispose().await;

    assert_eq!(mock.requests("disconnect").len(), 1);
    tokio::time::timeout(WAIT, session.wait_for_session_end())
        .await
        .expect("dispose ends the session");
}
