//! Typed response bodies.

use serde::Deserialize;

use crate::types::{Breakpoint, CompletionItem, Scope, StackFrame, Thread, Variable};

/// Optional feature flags reported by the adapter at `initialize` time.
///
/// Accessors on [`crate::AdapterSession`] treat every flag as `false` until
/// the initialize response arrives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capabilities {
    pub supports_configuration_done_request: Option<bool>,
    pub supports_function_breakpoints: Option<bool>,
    pub supports_conditional_breakpoints: Option<bool>,
    pub supports_hit_conditional_breakpoints: Option<bool>,
    pub supports_evaluate_for_hovers: Option<bool>,
    pub supports_step_back: Option<bool>,
    pub supports_set_variable: Option<bool>,
    pub supports_restart_frame: Option<bool>,
    pub supports_completions_request: Option<bool>,
    pub supports_modules_request: Option<bool>,
    pub supports_restart_request: Option<bool>,
    pub supports_exception_info_request: Option<bool>,
    pub support_terminate_debuggee: Option<bool>,
    pub supports_delayed_stack_trace_loading: Option<bool>,
    pub supports_loaded_sources_request: Option<bool>,
    pub supports_log_points: Option<bool>,
    pub supports_terminate_request: Option<bool>,
    pub supports_continue_to_location: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetBreakpointsResponse {
    pub breakpoints: Vec<Breakpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinueResponse {
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackTraceResponse {
    pub stack_frames: Vec<StackFrame>,
    pub total_frames: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopesResponse {
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariablesResponse {
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetVariableResponse {
    pub value: String,
    pub r#type: Option<String>,
    pub variables_reference: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluateResponse {
    pub result: String,
    pub r#type: Option<String>,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionsResponse {
    pub targets: Vec<CompletionItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_default_to_unset() {
        let caps: Capabilities = serde_json::from_str("{}").unwrap();
        assert!(caps.supports_configuration_done_request.is_none());
        assert!(caps.supports_delayed_stack_trace_loading.is_none());
    }

    #[test]
    fn stack_trace_response_parses() {
        let json = r#"{
            "stackFrames": [
                {"id": 1, "name": "main", "line": 10, "column": 1,
                 "source": {"path": "/tmp/app.py"}}
            ],
            "totalFrames": 1
        }"#;

        let body: StackTraceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.stack_frames.len(), 1);
        assert_eq!(body.stack_frames[0].name, "main");
    }
}
