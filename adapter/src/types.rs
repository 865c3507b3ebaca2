//! Data types shared by requests, responses and events.
//!
//! Source paths are opaque strings: the bridge compares them by equality and
//! never touches the filesystem, so there is no reason to carry `PathBuf`.

use serde::{Deserialize, Serialize};

pub type ThreadId = i64;
pub type BreakpointId = i64;
pub type FrameId = i64;
pub type VariablesReference = i64;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
}

impl Source {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            name: None,
            path: Some(path.into()),
            source_reference: None,
        }
    }
}

/// One entry of a bulk `setBreakpoints` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    /// 1-based source line.
    pub line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A breakpoint as reported by the adapter, in responses and in
/// `breakpoint` events. `original_line` and `nuclide_hit_count` are dialect
/// extras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Breakpoint {
    pub id: Option<BreakpointId>,
    pub verified: bool,
    pub message: Option<String>,
    pub source: Option<Source>,
    pub line: Option<i64>,
    pub column: Option<i64>,
    pub original_line: Option<i64>,
    #[serde(rename = "nuclide_hitCount")]
    pub nuclide_hit_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
}

/// A stack frame, with 1-based line and column.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: FrameId,
    pub name: String,
    #[serde(default)]
    pub source: Option<Source>,
    pub line: i64,
    pub column: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub name: String,
    pub variables_reference: VariablesReference,
    #[serde(default)]
    pub expensive: bool,
    #[serde(default)]
    pub named_variables: Option<i64>,
    #[serde(default)]
    pub indexed_variables: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub variables_reference: VariablesReference,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub label: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub r#type: Option<String>,
}
