//! Outcome of one invocation as handed to collaborators.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::InvokeError;

/// Message placed on successful wire results.
pub const SUCCESS_MESSAGE: &str = "invocation succeeded";

/// Immutable result of one call. Failures are carried as `success = false`
/// with an error message rather than as a Rust error.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub success: bool,
    /// Structured payload, or an opaque string when nothing structured was found.
    pub payload: Option<Value>,
    pub error_message: Option<String>,
    /// Machine-readable failure kind, see [`InvokeError::kind`].
    pub error_kind: Option<&'static str>,
    pub elapsed_millis: u64,
}

impl InvocationResult {
    pub fn ok(payload: Option<Value>, elapsed_millis: u64) -> Self {
        Self {
            success: true,
            payload,
            error_message: None,
            error_kind: None,
            elapsed_millis,
        }
    }

    pub fn failed(error: &InvokeError, elapsed_millis: u64) -> Self {
        Self {
            success: false,
            payload: None,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            elapsed_millis,
        }
    }

    /// `true` when the provider answered with a business `null`.
    pub fn is_business_null(&self) -> bool {
        self.success && matches!(self.payload, None | Some(Value::Null))
    }

    pub fn to_wire(&self) -> WireResult {
        WireResult {
            success: self.success,
            data: self.payload.clone().unwrap_or(Value::Null),
            error: if self.success { None } else { self.error_message.clone() },
            message: if self.success {
                SUCCESS_MESSAGE.to_string()
            } else {
                self.error_kind.unwrap_or_default().to_string()
            },
            duration: self.elapsed_millis,
        }
    }
}

/// JSON shape `{success, data, error, message, duration}`; `error` is only
/// present on failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResult {
    pub success: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    /// Milliseconds.
    pub duration: u64,
}

impl From<&InvocationResult> for WireResult {
    fn from(result: &InvocationResult) -> Self {
        result.to_wire()
    }
}
