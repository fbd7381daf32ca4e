//! Line-delimited JSON messages exchanged with the interpreter child.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Error kind the child uses for exceptions raised by user source.
pub const RAISED_KIND: &str = "raised";

#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self { id, method, params }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

impl From<RemoteError> for EngineError {
    fn from(err: RemoteError) -> Self {
        if err.kind == RAISED_KIND {
            EngineError::Raised {
                message: err.message,
            }
        } else {
            EngineError::Remote {
                kind: err.kind,
                message: err.message,
            }
        }
    }
}

impl Response {
    /// Convert into the call's outcome, failing if it answers a different request.
    pub fn into_result(self, expected_id: u64) -> Result<Value, EngineError> {
        if self.id != Some(expected_id) {
            return Err(EngineError::Protocol(format!(
                "expected reply to request {expected_id}, got {:?}",
                self.id
            )));
        }
        if let Some(err) = self.error {
            return Err(err.into());
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Startup notification sent once the child is listening.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub method: String,
    #[serde(default)]
    pub params: ReadyParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadyParams {
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureText {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FigureList {
    pub figures: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderedFigure {
    /// Base64-encoded PNG.
    pub png: String,
}
