//! Framed transport for the debug-adapter wire protocol.
//!
//! Frames are `Content-Length: <N>\r\n\r\n` headers followed by N bytes of
//! UTF-8 JSON. This crate handles framing, request/response correlation by
//! sequence number, and event fan-out; everything protocol-shaped (typed
//! commands, capabilities, session sequencing) belongs upstream in the
//! `adapter` and `bridge` crates.
//!
//! # Usage
//!
//! ```ignore
//! let connection = Connection::new(child_stdout, child_stdin);
//! let mut events = connection.events();
//!
//! let response = connection.send("initialize", Some(args)).await?;
//! while let Ok(event) = events.recv().await {
//!     // ...
//! }
//! ```

mod codec;
mod connection;
mod error;
mod message;

pub mod testing;

pub use codec::AdapterCodec;
pub use connection::{Connection, ReverseReply};
pub use error::{AdapterError, CodecError, TransportError};
pub use message::{
    Event, Message, OutgoingEvent, OutgoingMessage, OutgoingResponse, Request, Response, Seq,
};
