//! Requests sent to the debug adapter.

use serde::Serialize;

use crate::types::{FrameId, Source, SourceBreakpoint, ThreadId, VariablesReference};

/// The command and arguments of an outgoing request. The serialized form is
/// `{"command": <tag>, "arguments": <content>}`, which is split onto the
/// wire frame by the session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", content = "arguments", rename_all = "camelCase")]
pub enum RequestBody {
    Initialize(Initialize),
    Launch(serde_json::Value),
    Attach(serde_json::Value),
    SetBreakpoints(SetBreakpoints),
    SetExceptionBreakpoints(SetExceptionBreakpoints),
    ConfigurationDone,
    Continue(Continue),
    Pause(Pause),
    Next(Next),
    StepIn(StepIn),
    StepOut(StepOut),
    StackTrace(StackTrace),
    Scopes(Scopes),
    Variables(Variables),
    SetVariable(SetVariable),
    Evaluate(Evaluate),
    Completions(Completions),
    ContinueToLocation(ContinueToLocation),
    Threads,
    Disconnect,
}

impl RequestBody {
    /// Split into the wire command name and arguments value.
    pub fn into_wire(self) -> (String, Option<serde_json::Value>) {
        let value = serde_json::to_value(&self).expect("request bodies are always serializable");
        let command = value
            .get("command")
            .and_then(serde_json::Value::as_str)
            .expect("tagged enum carries its command")
            .to_string();
        let arguments = value.get("arguments").cloned();
        (command, arguments)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initialize {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    pub lines_start_at1: bool,
    pub columns_start_at1: bool,
    pub supports_variable_type: bool,
    pub supports_variable_paging: bool,
    pub supports_run_in_terminal_request: bool,
    pub path_format: String,
}

impl Initialize {
    /// The fixed parameter set this client advertises.
    pub fn new(adapter_id: impl Into<String>) -> Self {
        Self {
            client_id: "Nuclide".to_string(),
            adapter_id: adapter_id.into(),
            lines_start_at1: true,
            columns_start_at1: true,
            supports_variable_type: true,
            supports_variable_paging: false,
            supports_run_in_terminal_request: false,
            path_format: "path".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpoints {
    pub source: Source,
    /// Requested 1-based lines, in ledger order; the response array is
    /// matched back positionally.
    pub lines: Vec<i64>,
    pub breakpoints: Vec<SourceBreakpoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetExceptionBreakpoints {
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Continue {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pause {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Next {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepIn {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOut {
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    pub thread_id: ThreadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    /// Omitted for a full stack fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scopes {
    pub frame_id: FrameId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables {
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariable {
    pub variables_reference: VariablesReference,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<FrameId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completions {
    pub text: String,
    pub column: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<FrameId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueToLocation {
    pub source: Source,
    /// 1-based target line.
    pub line: i64,
    pub column: i64,
}
