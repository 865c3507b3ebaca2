//! Canonical breakpoint ledger and per-file bulk synchronization.
//!
//! The client creates and removes breakpoints one line at a time; the
//! adapter only accepts full replacement of a file's breakpoint set. The
//! ledger owns the canonical records, derives the bulk `setBreakpoints`
//! calls, and reconciles adapter-resolved ids and lines back into the
//! records.

use adapter::events::BreakpointEventBody;
use adapter::types::{BreakpointId, Source, SourceBreakpoint};
use adapter::AdapterSession;
use eyre::WrapErr;
use tokio::sync::Mutex;

use crate::client::ClientSink;
use crate::convert::adapter_to_client;
use crate::protocol::{BreakpointHitCountParams, BreakpointResolvedParams, Location};

/// Ids synthesized when the adapter omits one are allocated from here so
/// they cannot collide with adapter-assigned ids in the shared (stringified)
/// namespace.
const SYNTHETIC_ID_BASE: BreakpointId = 1 << 30;

/// One canonical breakpoint. Lines are 1-based (adapter coordinates).
#[derive(Debug, Clone)]
pub struct BreakpointRecord {
    /// Assigned on the first successful bulk sync and stable afterwards.
    pub id: Option<BreakpointId>,
    pub path: String,
    /// Current line; follows the adapter when it relocates the breakpoint.
    pub line: i64,
    /// Line as originally requested, used to match adapter breakpoint
    /// events that predate id assignment or that moved the breakpoint.
    pub original_line: i64,
    pub condition: Option<String>,
    pub hit_count: i64,
    /// Monotonic: once verified, stays resolved until removal.
    pub resolved: bool,
}

/// Correlates a staged breakpoint with its record after a sync.
#[derive(Debug, Clone)]
pub struct StagedHandle {
    path: String,
    line: i64,
}

struct LedgerState {
    records: Vec<BreakpointRecord>,
    next_synthetic_id: BreakpointId,
}

pub struct BreakpointLedger {
    session: AdapterSession,
    sink: ClientSink,
    state: Mutex<LedgerState>,
}

impl BreakpointLedger {
    pub fn new(session: AdapterSession, sink: ClientSink) -> Self {
        Self {
            session,
            sink,
            state: Mutex::new(LedgerState {
                records: Vec::new(),
                next_synthetic_id: SYNTHETIC_ID_BASE,
            }),
        }
    }

    /// Create (or replace) the record for `(path, line)`. Does not contact
    /// the adapter. A later stage on an occupied line supersedes the older
    /// record, including its condition.
    pub async fn stage(
        &self,
        path: &str,
        line: i64,
        condition: Option<String>,
    ) -> StagedHandle {
        let mut state = self.state.lock().await;
        state
            .records
            .retain(|r| !(r.path == path && r.original_line == line));
        state.records.push(BreakpointRecord {
            id: None,
            path: path.to_string(),
            line,
            original_line: line,
            condition,
            hit_count: 0,
            resolved: false,
        });
        StagedHandle {
            path: path.to_string(),
            line,
        }
    }

    /// Snapshot the record a staged handle refers to.
    pub async fn find(&self, handle: &StagedHandle) -> Option<BreakpointRecord> {
        let state = self.state.lock().await;
        state
            .records
            .iter()
            .find(|r| r.path == handle.path && r.original_line == handle.line)
            .cloned()
    }

    /// Push the full breakpoint set for `path` to the adapter and fold the
    /// response back into the records.
    pub async fn sync_file(&self, path: &str) -> eyre::Result<()> {
        let mut state = self.state.lock().await;
        self.sync_locked(&mut state, path).await
    }

    /// Drop the record with `id` and re-sync its file.
    pub async fn remove(&self, id: BreakpointId) -> eyre::Result<()> {
        let mut state = self.state.lock().await;
        let index = state
            .records
            .iter()
            .position(|r| r.id == Some(id))
            .ok_or_else(|| eyre::eyre!("no breakpoint with id {id}"))?;
        let path = state.records.remove(index).path;
        self.sync_locked(&mut state, &path).await
    }

    /// Re-sync every file with at least one record. Used after an adapter
    /// restart.
    pub async fn sync_all(&self) -> eyre::Result<()> {
        let mut state = self.state.lock().await;
        let mut paths: Vec<String> = Vec::new();
        for record in &state.records {
            if !paths.contains(&record.path) {
                paths.push(record.path.clone());
            }
        }
        for path in paths {
            self.sync_locked(&mut state, &path).await?;
        }
        Ok(())
    }

    /// Fold an adapter `breakpoint` event into the matching record,
    /// emitting resolution and hit-count events to the client.
    pub async fn on_breakpoint_event(&self, body: &BreakpointEventBody) {
        let bp = &body.breakpoint;
        let mut state = self.state.lock().await;

        let event_path = bp.source.as_ref().and_then(|s| s.path.clone());
        let event_line = bp.original_line.or(bp.line);
        let record = state.records.iter_mut().find(|r| match bp.id {
            Some(id) => r.id == Some(id),
            None => {
                r.id.is_none()
                    && Some(r.path.as_str()) == event_path.as_deref()
                    && Some(r.original_line) == event_line
            }
        });

        let Some(record) = record else {
            tracing::warn!(?bp, "breakpoint event matched no record, dropping");
            return;
        };

        if bp.verified && !record.resolved {
            record.resolved = true;
            if let Some(line) = bp.line {
                record.line = line;
            }
            if let Some(id) = record.id {
                self.sink.event(
                    "Debugger.breakpointResolved",
                    BreakpointResolvedParams {
                        breakpoint_id: id.to_string(),
                        location: Location {
                            script_id: record.path.clone(),
                            line_number: adapter_to_client(record.line),
                            column_number: 0,
                        },
                    },
                );
            }
        }

        if let Some(hits) = bp.nuclide_hit_count {
            if hits != record.hit_count {
                record.hit_count = hits;
                if let Some(id) = record.id {
                    self.sink.event(
                        "Debugger.breakpointHitCountChanged",
                        BreakpointHitCountParams {
                            breakpoint_id: id.to_string(),
                            hit_count: hits,
                        },
                    );
                }
            }
        }
    }

    /// Current records, insertion-ordered. Mostly useful to tests.
    pub async fn records(&self) -> Vec<BreakpointRecord> {
        self.state.lock().await.records.clone()
    }

    async fn sync_locked(&self, state: &mut LedgerState, path: &str) -> eyre::Result<()> {
        let indices: Vec<usize> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.path == path)
            .map(|(i, _)| i)
            .collect();

        let lines: Vec<i64> = indices.iter().map(|&i| state.records[i].line).collect();
        let breakpoints: Vec<SourceBreakpoint> = indices
            .iter()
            .map(|&i| SourceBreakpoint {
                line: state.records[i].line,
                column: None,
                condition: state.records[i].condition.clone(),
            })
            .collect();

        let response = self
            .session
            .set_breakpoints(Source::from_path(path), lines, breakpoints)
            .await
            .wrap_err_with(|| format!("syncing breakpoints for {path}"))?;

        if response.breakpoints.len() != indices.len() {
            eyre::bail!(
                "adapter returned {} breakpoints for {} requested in {path}",
                response.breakpoints.len(),
                indices.len()
            );
        }

        // Positional match: the adapter answers in request order.
        let LedgerState {
            records,
            next_synthetic_id,
        } = state;
        for (&index, reported) in indices.iter().zip(response.breakpoints.iter()) {
            let record = &mut records[index];
            if record.id.is_none() {
                record.id = Some(reported.id.unwrap_or_else(|| {
                    let id = *next_synthetic_id;
                    *next_synthetic_id += 1;
                    id
                }));
            }
            if reported.verified {
                record.resolved = true;
            }
            if let Some(line) = reported.line {
                if line != record.line {
                    tracing::debug!(path, from = record.line, to = line, "adapter moved breakpoint");
                    record.line = line;
                }
            }
        }

        Ok(())
    }
}
