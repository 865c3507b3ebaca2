//! Wire message shapes for the adapter protocol.
//!
//! Incoming traffic is one of three kinds, discriminated by the `type`
//! field: a response to one of our requests, an asynchronous event, or a
//! reverse request initiated by the adapter.

use serde::{Deserialize, Serialize};

/// Sequence number used for ordering and request/response correlation.
pub type Seq = i64;

/// A message received from the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Response(Response),
    Event(Event),
    Request(Request),
}

/// A response to a previously sent request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub seq: Seq,
    #[serde(rename = "request_seq")]
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// An asynchronous notification from the adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub seq: Seq,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A request. Incoming instances are reverse requests from the adapter;
/// outgoing instances are built by [`crate::Connection::send`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// A response we send back on the reverse channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingResponse {
    pub seq: Seq,
    #[serde(rename = "request_seq")]
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// An event frame. Only mock adapters in tests send these.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEvent {
    pub seq: Seq,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// A message written to the adapter.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Request(Request),
    Response(OutgoingResponse),
    Event(OutgoingEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_response() {
        let json = r#"{
            "seq": 4,
            "type": "response",
            "request_seq": 2,
            "success": true,
            "command": "initialize",
            "body": {"supportsConfigurationDoneRequest": true}
        }"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, Message::Response(r) if r.request_seq == 2 && r.success));
    }

    #[test]
    fn deserialize_event_without_body() {
        let json = r#"{"seq": 1, "type": "event", "event": "initialized"}"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, Message::Event(e) if e.event == "initialized" && e.body.is_none()));
    }

    #[test]
    fn deserialize_reverse_request() {
        let json = r#"{"seq": 9, "type": "request", "command": "runInTerminal"}"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, Message::Request(r) if r.command == "runInTerminal"));
    }

    #[test]
    fn serialize_outgoing_request() {
        let msg = OutgoingMessage::Request(Request {
            seq: 1,
            command: "launch".to_string(),
            arguments: Some(serde_json::json!({"program": "main.py"})),
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"request""#));
        assert!(json.contains(r#""command":"launch""#));
    }
}
