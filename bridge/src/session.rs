//! Session lifecycle: wiring, command intake, disposal, end-of-session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use adapter::events::AdapterEvent;
use adapter::AdapterSession;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::breakpoints::BreakpointLedger;
use crate::client::{ClientCallback, ClientSink};
use crate::files::FileCache;
use crate::protocol::ChromeRequest;
use crate::router::CommandRouter;
use crate::translator::EventTranslator;

/// How the debuggee comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Launch,
    Attach,
}

/// Construction-time configuration. `arguments` is passed verbatim to the
/// adapter's `launch` or `attach` request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: StartMode,
    pub arguments: serde_json::Value,
}

/// One translator instance: one adapter child, one client channel.
pub struct Session {
    adapter: AdapterSession,
    router: CommandRouter,
    sink: ClientSink,
    dispose_token: CancellationToken,
    disposed: AtomicBool,
    ended_rx: watch::Receiver<bool>,
}

impl Session {
    /// Wire a session over an already-spawned adapter. Spawns the event
    /// translator and the session-end watcher.
    pub fn new(
        config: SessionConfig,
        adapter: AdapterSession,
        client: Arc<dyn ClientCallback>,
        files: Arc<dyn FileCache>,
    ) -> Self {
        let sink = ClientSink::new(client);
        let ledger = Arc::new(BreakpointLedger::new(adapter.clone(), sink.clone()));
        let registry = Arc::new(crate::threads::ThreadRegistry::new());
        let dispose_token = CancellationToken::new();

        let router = CommandRouter::new(
            config,
            adapter.clone(),
            sink.clone(),
            files,
            Arc::clone(&ledger),
            Arc::clone(&registry),
            dispose_token.clone(),
        );

        let translator = EventTranslator::new(
            adapter.clone(),
            sink.clone(),
            ledger,
            registry,
            router.clone(),
        );
        tokio::spawn(translator.run());

        let (ended_tx, ended_rx) = watch::channel(false);
        tokio::spawn(watch_session_end(
            adapter.clone(),
            dispose_token.clone(),
            ended_tx,
        ));

        // Unrecoverable failures (startup errors, disposal) tear the
        // transport down and close the client sink.
        {
            let adapter = adapter.clone();
            let sink = sink.clone();
            let token = dispose_token.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                adapter.shutdown();
                sink.close();
            });
        }

        Self {
            adapter,
            router,
            sink,
            dispose_token,
            disposed: AtomicBool::new(false),
            ended_rx,
        }
    }

    /// Feed one raw client message. Commands are dispatched in arrival
    /// order; their handlers may complete out of order.
    pub fn handle_command(&self, raw: &str) {
        match serde_json::from_str::<ChromeRequest>(raw) {
            Ok(request) => self.router.dispatch(request),
            Err(e) => {
                tracing::warn!(error = %e, raw, "unparseable client message");
                // Reply if an id can be salvaged so the UI is not left
                // hanging on a malformed request.
                if let Some(id) = serde_json::from_str::<serde_json::Value>(raw)
                    .ok()
                    .and_then(|value| value.get("id").and_then(serde_json::Value::as_i64))
                {
                    self.sink.reply_error(id, format!("invalid request: {e}"));
                }
            }
        }
    }

    /// Resolves when the debuggee exits, the adapter terminates (after a
    /// one-second grace period for trailing output), or the transport
    /// closes.
    pub async fn wait_for_session_end(&self) {
        let mut ended_rx = self.ended_rx.clone();
        // An error means the watcher is gone, which only happens at
        // disposal; either way the session is over.
        let _ = ended_rx.wait_for(|ended| *ended).await;
    }

    /// Tear the session down: best-effort `disconnect` to the adapter, then
    /// close the transport (failing pending requests) and the client sink.
    /// A second call is a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("disposing session");
        let _ = tokio::time::timeout(Duration::from_secs(1), self.adapter.disconnect()).await;
        self.dispose_token.cancel();
    }
}

/// Multiplexes the three end-of-session signals.
async fn watch_session_end(
    adapter: AdapterSession,
    dispose_token: CancellationToken,
    ended_tx: watch::Sender<bool>,
) {
    let mut events = adapter.subscribe();
    let exit = adapter.exit();

    loop {
        tokio::select! {
            _ = exit.cancelled() => break,
            _ = dispose_token.cancelled() => break,
            received = events.recv() => {
                match received {
                    Ok(AdapterEvent::Exited(body)) => {
                        tracing::debug!(exit_code = body.exit_code, "debuggee exited");
                        break;
                    }
                    Ok(AdapterEvent::Terminated) => {
                        // Give trailing output events a moment to flush.
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    ended_tx.send_replace(true);
}
