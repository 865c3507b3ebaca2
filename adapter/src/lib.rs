//! Typed surface of the debug-adapter dialect.
//!
//! [`AdapterSession`] wraps a [`transport::Connection`] with typed request
//! methods, a typed event stream, and a capability cache. The protocol
//! shapes live in [`requests`], [`responses`], [`events`] and [`types`].

pub mod events;
pub mod requests;
pub mod responses;
pub mod types;

mod session;

pub use session::AdapterSession;

/// The debug adapters this bridge knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Python,
    Node,
    Java,
    Native,
}

impl AdapterKind {
    /// Value for the `adapterID` initialize parameter.
    pub fn adapter_id(&self) -> &'static str {
        match self {
            AdapterKind::Python => "python",
            AdapterKind::Node => "node",
            AdapterKind::Java => "java",
            AdapterKind::Native => "native",
        }
    }

    /// Python adapters underreport `allThreadsStopped` on user-requested
    /// pauses; the event translator compensates.
    pub fn is_python(&self) -> bool {
        matches!(self, AdapterKind::Python)
    }
}

impl std::str::FromStr for AdapterKind {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Self::Python),
            "node" => Ok(Self::Node),
            "java" => Ok(Self::Java),
            "native" => Ok(Self::Native),
            other => Err(eyre::eyre!("unsupported adapter kind {other}")),
        }
    }
}
