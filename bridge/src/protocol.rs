//! Message shapes of the client (Chrome-DevTools-style) dialect.
//!
//! Lines and columns on this side are 0-based; see [`crate::convert`] for
//! the boundary conversions.

use serde::{Deserialize, Serialize};

/// A command from the UI shell.
#[derive(Debug, Clone, Deserialize)]
pub struct ChromeRequest {
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: String,
    pub line_number: i64,
    pub column_number: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

impl RemoteObject {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            r#type: "text".to_string(),
            value: Some(value.into()),
            description: None,
            object_id: None,
        }
    }

    pub fn object(description: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            r#type: "object".to_string(),
            value: None,
            description: Some(description.into()),
            object_id: Some(object_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDescription {
    pub r#type: String,
    pub name: String,
    pub object: RemoteObject,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: String,
    pub function_name: String,
    pub location: Location,
    pub has_source: bool,
    pub scope_chain: Vec<ScopeDescription>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEventParams {
    pub call_frames: Vec<CallFrame>,
    pub reason: String,
    /// Always present, always empty; UI consumers expect the key.
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_switch_message: Option<String>,
}

impl PausedEventParams {
    pub fn synthetic(reason: impl Into<String>, stop_thread_id: Option<i64>) -> Self {
        Self {
            call_frames: vec![],
            reason: reason.into(),
            data: serde_json::json!({}),
            stop_thread_id,
            thread_switch_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDescription {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub location: Location,
    pub stop_reason: String,
    pub has_source: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadsUpdatedParams {
    /// The adapter protocol provides no process id.
    pub owning_process_id: i64,
    pub stop_thread_id: i64,
    pub threads: Vec<ThreadDescription>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResolvedParams {
    pub breakpoint_id: String,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointHitCountParams {
    pub breakpoint_id: String,
    pub hit_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    pub value: RemoteObject,
    pub configurable: bool,
    pub enumerable: bool,
}

// --- request parameter shapes ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlParams {
    pub url: String,
    pub line_number: i64,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpointParams {
    pub breakpoint_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectThreadParams {
    pub thread_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetThreadStackParams {
    pub thread_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPauseOnExceptionsParams {
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceParams {
    pub script_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationParams {
    pub script_id: String,
    pub line_number: i64,
    #[serde(default)]
    pub column_number: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContinueToLocationParams {
    pub location: LocationParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameParams {
    pub call_frame_id: String,
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeEvaluateParams {
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableValueParams {
    pub call_frame_id: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesParams {
    pub object_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsParams {
    pub text: String,
    #[serde(default)]
    pub column: Option<i64>,
    #[serde(default)]
    pub frame_id: Option<i64>,
}
