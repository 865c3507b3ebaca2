//! Typed adapter events.

use serde::Deserialize;

use crate::types::{Breakpoint, ThreadId};

/// An adapter event, parsed from the raw transport event by name.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    Initialized,
    Stopped(StoppedEventBody),
    Continued(ContinuedEventBody),
    Thread(ThreadEventBody),
    Breakpoint(BreakpointEventBody),
    Output(OutputEventBody),
    Terminated,
    Exited(ExitedEventBody),
    /// Anything this dialect does not model.
    Custom {
        name: String,
        body: Option<serde_json::Value>,
    },
}

impl AdapterEvent {
    pub fn from_wire(event: &transport::Event) -> eyre::Result<Self> {
        let body = || event.body.clone().unwrap_or_else(|| serde_json::json!({}));
        let parsed = match event.event.as_str() {
            "initialized" => AdapterEvent::Initialized,
            "stopped" => AdapterEvent::Stopped(serde_json::from_value(body())?),
            "continued" => AdapterEvent::Continued(serde_json::from_value(body())?),
            "thread" => AdapterEvent::Thread(serde_json::from_value(body())?),
            "breakpoint" => AdapterEvent::Breakpoint(serde_json::from_value(body())?),
            "output" => AdapterEvent::Output(serde_json::from_value(body())?),
            "terminated" => AdapterEvent::Terminated,
            "exited" => AdapterEvent::Exited(serde_json::from_value(body())?),
            name => AdapterEvent::Custom {
                name: name.to_string(),
                body: event.body.clone(),
            },
        };
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoppedEventBody {
    pub reason: String,
    pub description: Option<String>,
    pub thread_id: Option<ThreadId>,
    pub all_threads_stopped: Option<bool>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContinuedEventBody {
    pub thread_id: Option<ThreadId>,
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadEventBody {
    /// `"started"` or `"exited"`.
    pub reason: String,
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakpointEventBody {
    pub reason: String,
    pub breakpoint: Breakpoint,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputEventBody {
    pub category: Option<String>,
    pub output: String,
    pub variables_reference: Option<i64>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitedEventBody {
    pub exit_code: i64,
}
