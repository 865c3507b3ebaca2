//! Adapter event → client event translation.
//!
//! Stop events are the involved case: a single adapter `stopped` can mean
//! several threads paused at once, each needing a stack fetch, any of which
//! can be obsoleted by a `continued` racing in before the fetch finishes.
//! Per-thread cancellation tokens arbitrate that race; the client sees at
//! most one `Debugger.paused` per stop event.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use adapter::events::{
    AdapterEvent, ContinuedEventBody, OutputEventBody, StoppedEventBody, ThreadEventBody,
};
use adapter::types::ThreadId;
use adapter::AdapterSession;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::breakpoints::BreakpointLedger;
use crate::client::{ClientSink, NotificationLevel, OutputLevel};
use crate::convert::adapter_to_client;
use crate::protocol::{CallFrame, Location, PausedEventParams, ScopeDescription};
use crate::router::CommandRouter;
use crate::threads::{ThreadRegistry, ThreadState};

struct Inner {
    session: AdapterSession,
    sink: ClientSink,
    ledger: Arc<BreakpointLedger>,
    registry: Arc<ThreadRegistry>,
    router: CommandRouter,
    /// Stack fetches in flight, cancellable by a racing `continued`.
    pending_stops: SyncMutex<HashMap<ThreadId, CancellationToken>>,
}

#[derive(Clone)]
pub(crate) struct EventTranslator {
    inner: Arc<Inner>,
}

impl EventTranslator {
    pub(crate) fn new(
        session: AdapterSession,
        sink: ClientSink,
        ledger: Arc<BreakpointLedger>,
        registry: Arc<ThreadRegistry>,
        router: CommandRouter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                sink,
                ledger,
                registry,
                router,
                pending_stops: SyncMutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) async fn run(self) {
        let mut events = self.inner.session.subscribe();
        let exit = self.inner.session.exit();
        loop {
            tokio::select! {
                _ = exit.cancelled() => break,
                received = events.recv() => {
                    match received {
                        Ok(event) => self.handle_event(event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "event translator lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    fn handle_event(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::Stopped(body) => {
                // Runs as its own task so a racing `continued` can still be
                // processed (and cancel the stack fetches) while this stop
                // is expanding.
                let translator = self.clone();
                tokio::spawn(async move {
                    translator.on_stopped(body).await;
                });
            }
            AdapterEvent::Continued(body) => self.on_continued(body),
            AdapterEvent::Thread(body) => self.on_thread(body),
            AdapterEvent::Breakpoint(body) => {
                let translator = self.clone();
                tokio::spawn(async move {
                    translator.inner.ledger.on_breakpoint_event(&body).await;
                });
            }
            AdapterEvent::Output(body) => self.on_output(body),
            AdapterEvent::Initialized => {
                // The first initialized event is absorbed by startup
                // orchestration; a later one means the adapter restarted
                // and lost its configuration.
                if self.inner.router.config_done_sent() {
                    tracing::info!("adapter re-initialized, resyncing configuration");
                    let translator = self.clone();
                    tokio::spawn(async move {
                        translator.inner.router.resync_configuration().await;
                    });
                }
            }
            AdapterEvent::Terminated | AdapterEvent::Exited(_) => {
                // Session-end plumbing watches these on its own
                // subscription.
            }
            AdapterEvent::Custom { name, .. } => {
                tracing::debug!(event = %name, "ignoring adapter event");
            }
        }
    }

    async fn on_stopped(&self, body: StoppedEventBody) {
        let inner = &self.inner;
        let reason = body.reason.clone();

        let mut all_threads_stopped = body.all_threads_stopped.unwrap_or(false);
        // Python adapters underreport on user-requested pauses.
        if inner.session.kind().is_python() && reason == "user request" {
            all_threads_stopped = true;
        }

        let event_thread = body.thread_id.unwrap_or(-1);
        let mut stopped_ids: Vec<ThreadId> = Vec::new();
        if event_thread >= 0 {
            stopped_ids.push(event_thread);
        }
        if all_threads_stopped {
            for id in inner.registry.running_ids() {
                if id != event_thread {
                    stopped_ids.push(id);
                }
            }
        }

        let switched_from = if inner.registry.active().is_none() && !stopped_ids.is_empty() {
            inner.registry.set_active(stopped_ids[0])
        } else {
            None
        };

        // One token per stopped thread; a continued for that thread (or for
        // all) cancels just its fetch.
        {
            let mut pending = inner.pending_stops.lock().unwrap();
            for &id in &stopped_ids {
                pending.insert(id, CancellationToken::new());
            }
        }

        let active = inner.registry.active();
        let delayed = inner.session.supports_delayed_stack_trace_loading();
        let mut expanded = 0usize;

        for &id in &stopped_ids {
            let token = inner.pending_stops.lock().unwrap().get(&id).cloned();
            let Some(token) = token else { continue };

            let levels = if Some(id) == active {
                None
            } else if delayed {
                Some(1)
            } else {
                None
            };

            let fetched = tokio::select! {
                _ = token.cancelled() => None,
                result = fetch_call_frames(&inner.session, id, levels) => {
                    Some(result.unwrap_or_else(|e| {
                        tracing::warn!(thread_id = id, error = %e, "stack fetch failed");
                        vec![]
                    }))
                }
            };
            inner.pending_stops.lock().unwrap().remove(&id);

            let Some(call_frames) = fetched else {
                tracing::debug!(thread_id = id, "stop expansion cancelled by continue");
                continue;
            };

            inner
                .registry
                .mark_paused(id, &reason, call_frames, Some(id) == active);
            expanded += 1;
        }

        let active = inner.registry.active();

        if !stopped_ids.is_empty() && expanded == 0 {
            // Every stopped thread continued before its fetch finished;
            // this stop event is void.
            return;
        }

        if let Some(active_id) = active {
            // A single paused event for the active thread only; the other
            // stopped threads surface through threadsUpdated. A stop that
            // named no threads at all re-reports the existing active thread.
            if let Some(info) = inner.registry.snapshot(active_id) {
                inner.sink.event(
                    "Debugger.paused",
                    PausedEventParams {
                        call_frames: info.call_frames,
                        reason: reason.clone(),
                        data: serde_json::json!({}),
                        stop_thread_id: Some(active_id),
                        thread_switch_message: switched_from.map(|previous| {
                            format!(
                                "Active thread switched from thread #{previous} to thread #{active_id}"
                            )
                        }),
                    },
                );
            }
        } else if stopped_ids.is_empty() {
            // Async-break with no threads to report and none already
            // active.
            inner.sink.event(
                "Debugger.paused",
                PausedEventParams::synthetic("Async-Break", Some(-1)),
            );
        }

        inner
            .sink
            .event("Debugger.threadsUpdated", inner.registry.describe());
    }

    fn on_continued(&self, body: ContinuedEventBody) {
        let inner = &self.inner;
        let thread_id = body.thread_id.unwrap_or(-1);
        let all_continued = thread_id < 0;

        {
            let mut pending = inner.pending_stops.lock().unwrap();
            if all_continued {
                for token in pending.values() {
                    token.cancel();
                }
                pending.clear();
            } else if let Some(token) = pending.remove(&thread_id) {
                token.cancel();
            }
        }

        if all_continued {
            let ids = inner.registry.known_ids();
            inner.registry.upsert(&ids, ThreadState::Running);
            inner.registry.clear_active();
        } else {
            inner.registry.upsert(&[thread_id], ThreadState::Running);
            if inner.registry.active() == Some(thread_id) {
                inner.registry.clear_active();
            }
        }

        inner.sink.event("Debugger.resumed", serde_json::json!({}));
    }

    fn on_thread(&self, body: ThreadEventBody) {
        let inner = &self.inner;
        match body.reason.as_str() {
            "started" => inner
                .registry
                .upsert(&[body.thread_id], ThreadState::Running),
            "exited" => inner.registry.remove(body.thread_id),
            other => {
                tracing::debug!(reason = %other, thread_id = body.thread_id, "thread event");
            }
        }
        inner
            .sink
            .event("Debugger.threadsUpdated", inner.registry.describe());
    }

    fn on_output(&self, body: OutputEventBody) {
        let inner = &self.inner;
        let text = strip_trailing_newline(&body.output);
        let category = body.category.as_deref().unwrap_or("console");

        if category == "nuclide_notification" {
            let level = body
                .data
                .as_ref()
                .and_then(|data| data.get("type"))
                .and_then(|level| level.as_str())
                .map(NotificationLevel::from_name)
                .unwrap_or(NotificationLevel::Info);
            inner.sink.notification(level, text);
        } else {
            inner
                .sink
                .user_output(OutputLevel::from_category(category), text);
        }
    }
}

/// Fetch and translate one thread's stack. `levels: None` requests the full
/// stack. Scope-chain failures degrade to an empty chain so the client
/// always gets an answer.
pub(crate) async fn fetch_call_frames(
    session: &AdapterSession,
    thread_id: ThreadId,
    levels: Option<i64>,
) -> eyre::Result<Vec<CallFrame>> {
    let response = session.stack_trace(thread_id, levels).await?;

    let mut call_frames = Vec::with_capacity(response.stack_frames.len());
    for frame in response.stack_frames {
        let scope_chain = match session.scopes(frame.id).await {
            Ok(response) => response
                .scopes
                .into_iter()
                .map(|scope| ScopeDescription {
                    r#type: scope.name.clone(),
                    name: scope.name.clone(),
                    object: crate::protocol::RemoteObject::object(
                        scope.name,
                        scope.variables_reference.to_string(),
                    ),
                })
                .collect(),
            Err(e) => {
                tracing::warn!(frame_id = frame.id, error = %e, "scopes fetch failed");
                vec![]
            }
        };

        call_frames.push(CallFrame {
            call_frame_id: frame.id.to_string(),
            function_name: frame.name,
            location: Location {
                script_id: frame
                    .source
                    .as_ref()
                    .and_then(|source| source.path.clone())
                    .unwrap_or_else(|| "N/A".to_string()),
                line_number: adapter_to_client(frame.line),
                column_number: adapter_to_client(frame.column),
            },
            has_source: frame.source.is_some(),
            scope_chain,
        });
    }

    Ok(call_frames)
}

fn strip_trailing_newline(output: &str) -> String {
    output
        .strip_suffix("\r\n")
        .or_else(|| output.strip_suffix('\n'))
        .unwrap_or(output)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_trailing_newline_only() {
        assert_eq!(strip_trailing_newline("hello\n"), "hello");
        assert_eq!(strip_trailing_newline("hello\r\n"), "hello");
        assert_eq!(strip_trailing_newline("hello\n\n"), "hello\n");
        assert_eq!(strip_trailing_newline("hello"), "hello");
    }
}
