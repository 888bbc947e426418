use serde::{Deserialize, Serialize};

use crate::scripting::ExecutionResult;

#[derive(Serialize, Debug)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn ok() -> ApiResponse<String> {
        ApiResponse {
            ok: true,
            data: Some("ok".to_string()),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> ApiResponse<String> {
        ApiResponse {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ScriptRequest {
    pub code: String,
}

/// Result of a script run over plain HTTP, with every log line it emitted.
#[derive(Serialize, Debug)]
pub struct ScriptReport {
    pub result: ExecutionResult,
    pub logs: Vec<String>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ExistsResponse {
    pub slug: String,
    pub exists: bool,
}

/// An inbound websocket message. Text that is not one of these JSON shapes
/// is taken as a raw command line.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConsoleRequest {
    Command { line: String },
    Execute { code: String },
}

impl ConsoleRequest {
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or_else(|_| ConsoleRequest::Command {
            line: text.to_string(),
        })
    }
}
