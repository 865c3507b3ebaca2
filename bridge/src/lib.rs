//! Bidirectional bridge between a Chrome-DevTools-style client protocol and
//! the debug-adapter dialect spoken by stdio-attached debug adapters.
//!
//! The client issues per-line breakpoint edits, free-ordered commands and
//! 0-based coordinates; the adapter wants bulk breakpoint replacement, a
//! strict startup sequence and 1-based coordinates. [`Session`] owns the
//! translation: a command router turns client commands into adapter
//! requests and responses, an event translator turns adapter events into
//! client events, and the breakpoint ledger and thread registry reconcile
//! the state both sides disagree about.
//!
//! The host supplies the three collaborators the bridge does not own: an
//! already-spawned [`adapter::AdapterSession`], a [`ClientCallback`] sink,
//! and a [`FileCache`].

mod breakpoints;
mod client;
mod convert;
mod files;
mod protocol;
mod router;
mod session;
mod threads;
mod translator;

pub use breakpoints::{BreakpointLedger, BreakpointRecord, StagedHandle};
pub use client::{ClientCallback, ClientSink, NotificationLevel, OutputLevel};
pub use files::FileCache;
pub use protocol::ChromeRequest;
pub use session::{Session, SessionConfig, StartMode};
pub use threads::{ThreadInfo, ThreadRegistry, ThreadState};
