//! Wire protocol types shared by server and client
//!
//! Requests and responses travel as single JSON lines. Every request
//! carries the credentials; the endpoint holds no session state between
//! lines.

use crate::errors::Error;
use serde::{Deserialize, Serialize};

/// Default port the control endpoint listens on.
pub const DEFAULT_PORT: u16 = 6290;

/// A control operation, one JSON line per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Does this credential pair open the launcher?
    CheckCredentials {
        /// Username, `admin` by convention
        username: String,
        /// The generated admin password
        password: String,
    },
    /// Start the managed process.
    StartProcess {
        /// Username, `admin` by convention
        username: String,
        /// The generated admin password
        password: String,
    },
    /// Report supervisor status and diagnostics.
    Status {
        /// Username, `admin` by convention
        username: String,
        /// The generated admin password
        password: String,
    },
}

/// Machine-readable failure category, for exit-code mapping client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credentials did not match the current run's admin credential
    AuthenticationFailure,
    /// The managed process is already running
    AlreadyRunning,
    /// Another lifecycle operation holds the gate
    OperationInProgress,
    /// Anything else; the message carries the detail
    Internal,
}

impl From<&Error> for ErrorKind {
    fn from(value: &Error) -> Self {
        match value {
            Error::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            Error::AlreadyRunning => ErrorKind::AlreadyRunning,
            Error::OperationInProgress => ErrorKind::OperationInProgress,
            _ => ErrorKind::Internal,
        }
    }
}

/// One JSON line answered per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded
    pub success: bool,
    /// Process-unique name of the answering launcher instance
    pub service: String,
    /// Human-readable outcome
    pub message: String,
    /// Failure category, present on failures only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    /// Operation-specific payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    /// A successful response.
    #[must_use]
    pub fn ok(service: &str, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            service: service.to_owned(),
            message: message.into(),
            error: None,
            data,
        }
    }

    /// A failed response carrying a machine-readable category.
    #[must_use]
    pub fn failure(service: &str, error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            service: service.to_owned(),
            message: message.into(),
            error: Some(error),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_request_wire_format_is_tagged() {
        let request = Request::StartProcess {
            username: "admin".to_owned(),
            password: "secret".to_owned(),
        };
        let line = serde_json::to_string(&request).unwrap();
        assert!(
            line.contains(r#""op":"start_process""#),
            "the operation tag is the dispatch key: {line}"
        );
    }

    #[test]
    fn test_failure_response_keeps_its_category() {
        let response = Response::failure("ul#1", ErrorKind::AuthenticationFailure, "no");
        let line = serde_json::to_string(&response).unwrap();
        let parsed: Response = serde_json::from_str(&line).unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error, Some(ErrorKind::AuthenticationFailure));
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            ErrorKind::from(&Error::AlreadyRunning),
            ErrorKind::AlreadyRunning
        );
        assert_eq!(ErrorKind::from(&Error::NotFound), ErrorKind::Internal);
    }
}
