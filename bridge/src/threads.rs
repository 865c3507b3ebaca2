//! Thread lifecycle and paused-state bookkeeping.

use std::collections::HashMap;
use std::sync::Mutex;

use adapter::types::ThreadId;

use crate::protocol::{CallFrame, Location, ThreadDescription, ThreadsUpdatedParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Paused,
}

#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub state: ThreadState,
    pub call_frames: Vec<CallFrame>,
    /// True iff the cached frames were fetched without a levels limit since
    /// the most recent pause.
    pub call_stack_loaded: bool,
    pub stop_reason: Option<String>,
}

impl ThreadInfo {
    fn running() -> Self {
        Self {
            state: ThreadState::Running,
            call_frames: Vec::new(),
            call_stack_loaded: false,
            stop_reason: None,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    threads: HashMap<ThreadId, ThreadInfo>,
    active: Option<ThreadId>,
    /// Most recent thread to have been active, never cleared.
    last_active: Option<ThreadId>,
    /// Set when a *different* thread becomes active; non-null iff at least
    /// two distinct threads have been active this session.
    previous: Option<ThreadId>,
}

#[derive(Default)]
pub struct ThreadRegistry {
    state: Mutex<RegistryState>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of the given threads, inserting unknown ids. Moving a
    /// thread to running discards its cached frames.
    pub fn upsert(&self, ids: &[ThreadId], thread_state: ThreadState) {
        let mut state = self.state.lock().unwrap();
        for &id in ids {
            let info = state.threads.entry(id).or_insert_with(ThreadInfo::running);
            info.state = thread_state;
            if thread_state == ThreadState::Running {
                info.call_frames.clear();
                info.call_stack_loaded = false;
                info.stop_reason = None;
            }
        }
    }

    pub fn mark_paused(
        &self,
        id: ThreadId,
        reason: &str,
        call_frames: Vec<CallFrame>,
        fully_loaded: bool,
    ) {
        let mut state = self.state.lock().unwrap();
        let info = state.threads.entry(id).or_insert_with(ThreadInfo::running);
        info.state = ThreadState::Paused;
        info.call_frames = call_frames;
        info.call_stack_loaded = fully_loaded;
        info.stop_reason = Some(reason.to_string());
    }

    /// Replace a paused thread's cached frames (e.g. after a full fetch).
    pub fn cache_frames(&self, id: ThreadId, call_frames: Vec<CallFrame>, fully_loaded: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(info) = state.threads.get_mut(&id) {
            info.call_frames = call_frames;
            info.call_stack_loaded = fully_loaded;
        }
    }

    /// Drop a thread. Clears the active selection if it pointed here.
    pub fn remove(&self, id: ThreadId) {
        let mut state = self.state.lock().unwrap();
        state.threads.remove(&id);
        if state.active == Some(id) {
            state.active = None;
        }
    }

    /// Make `id` the active paused thread. Returns the previously active
    /// distinct thread, if any, for the thread-switch banner.
    pub fn set_active(&self, id: ThreadId) -> Option<ThreadId> {
        let mut state = self.state.lock().unwrap();
        let switched_from = match state.last_active {
            Some(last) if last != id => Some(last),
            _ => None,
        };
        if switched_from.is_some() {
            state.previous = switched_from;
        }
        state.last_active = Some(id);
        state.active = Some(id);
        switched_from
    }

    /// Clear the active selection without touching switch history.
    pub fn clear_active(&self) {
        self.state.lock().unwrap().active = None;
    }

    pub fn active(&self) -> Option<ThreadId> {
        self.state.lock().unwrap().active
    }

    pub fn previous(&self) -> Option<ThreadId> {
        self.state.lock().unwrap().previous
    }

    pub fn known_ids(&self) -> Vec<ThreadId> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<ThreadId> = state.threads.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Known threads not currently paused.
    pub fn running_ids(&self) -> Vec<ThreadId> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<ThreadId> = state
            .threads
            .iter()
            .filter(|(_, info)| info.state != ThreadState::Paused)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn snapshot(&self, id: ThreadId) -> Option<ThreadInfo> {
        self.state.lock().unwrap().threads.get(&id).cloned()
    }

    /// Build the client `threadsUpdated` payload.
    pub fn describe(&self) -> ThreadsUpdatedParams {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<ThreadId> = state.threads.keys().copied().collect();
        ids.sort_unstable();

        let threads = ids
            .into_iter()
            .map(|id| {
                let info = &state.threads[&id];
                let top = info.call_frames.first();
                ThreadDescription {
                    id,
                    name: format!("Thread {id}"),
                    address: top
                        .map(|f| f.function_name.clone())
                        .unwrap_or_else(|| "N/A".to_string()),
                    location: top.map(|f| f.location.clone()).unwrap_or(Location {
                        script_id: "N/A".to_string(),
                        line_number: 0,
                        column_number: 0,
                    }),
                    stop_reason: info
                        .stop_reason
                        .clone()
                        .unwrap_or_else(|| "running".to_string()),
                    has_source: top.map(|f| f.has_source).unwrap_or(false),
                }
            })
            .collect();

        ThreadsUpdatedParams {
            owning_process_id: -1,
            stop_thread_id: state.active.unwrap_or(-1),
            threads,
        }
    }
}
