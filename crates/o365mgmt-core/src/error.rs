//! Error types for the core library.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Core library error type.
///
/// Covers startup-time failures: configuration loading, credential
/// validation and HTTP client construction.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A configuration-related error, including missing credentials.
    #[error("configuration error: {0}")]
    Config(String),

    /// A generic error for other cases, such as HTTP client construction.
    #[error("error: {0}")]
    Other(String),
}

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// A failure reported by a management API client for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ManagementError {
    /// The access token could not be obtained.
    #[error("authentication failed: {message}")]
    Auth {
        /// Description from the token endpoint or transport.
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("request failed: {message}")]
    Transport {
        /// Transport-level description.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("API error {status}{}: {message}", code_suffix(.code))]
    Api {
        /// HTTP status code.
        #[serde(rename = "statusCode")]
        status: u16,
        /// Service error code such as `AF20022`.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Service error message or raw body.
        message: String,
    },

    /// A success response carried a body that could not be decoded.
    #[error("decoding response: {message}")]
    Decode {
        /// Decoder description.
        message: String,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl ManagementError {
    /// JSON rendering of the error, as embedded in wrapped error text.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("\"{self}\""))
    }
}

/// Facade operation that produced a [`FacadeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `subscriptions/list`
    SubscriptionsList,
    /// `subscriptions/start`
    SubscriptionsStart,
    /// `subscriptions/stop`
    SubscriptionsStop,
    /// `subscriptions/content`
    SubscriptionsContent,
    /// `subscriptions/notifications`
    SubscriptionsNotifications,
    /// Content retrieval by URI.
    FetchContent,
}

impl Operation {
    /// Fixed label used as the prefix of rendered errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SubscriptionsList => "O365 subscriptions/list",
            Self::SubscriptionsStart => "O365 subscriptions/start error.",
            Self::SubscriptionsStop => "O365 subscriptions/stop error.",
            Self::SubscriptionsContent => "O365 subscriptions/content error.",
            Self::SubscriptionsNotifications => "O365 subscriptions/notifications error.",
            Self::FetchContent => "O365 fetch content error.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A wrapped operation failure: which operation, with which inputs, and why.
///
/// The rendered text names the operation, echoes every input parameter and
/// embeds the cause. Parameters are kept in call order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct FacadeError {
    operation: Operation,
    params: Vec<(&'static str, String)>,
    #[source]
    cause: ManagementError,
}

impl FacadeError {
    /// Wrap `cause` for `operation`. Each parameter value must already be
    /// rendered the way it should appear in the message.
    #[must_use]
    pub const fn new(
        operation: Operation,
        params: Vec<(&'static str, String)>,
        cause: ManagementError,
    ) -> Self {
        Self {
            operation,
            params,
            cause,
        }
    }

    /// The failing operation.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Rendered input parameters, in call order.
    #[must_use]
    pub fn params(&self) -> &[(&'static str, String)] {
        &self.params
    }

    /// Rendered value of a named parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The underlying client error.
    #[must_use]
    pub const fn cause(&self) -> &ManagementError {
        &self.cause
    }

    /// JSON view of the error for machine-readable output.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let params: serde_json::Map<String, Value> = self
            .params
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
            .collect();
        serde_json::json!({
            "operation": self.operation.label(),
            "params": params,
            "error": serde_json::to_value(&self.cause).unwrap_or(Value::Null),
            "message": self.to_string(),
        })
    }
}

impl fmt::Display for FacadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The list operation embeds the cause as text, the others as JSON.
        if self.operation == Operation::SubscriptionsList {
            return write!(f, "{} {}", self.operation.label(), self.cause);
        }
        write!(f, "{}", self.operation.label())?;
        let mut sep = " ";
        for (name, value) in &self.params {
            write!(f, "{sep}{name} = {value}")?;
            sep = ", ";
        }
        write!(f, "{sep}error = {}", self.cause.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: &str) -> ManagementError {
        ManagementError::Api {
            status: 400,
            code: Some(code.to_string()),
            message: "bad".to_string(),
        }
    }

    #[test]
    fn list_error_embeds_cause_text() {
        let err = FacadeError::new(Operation::SubscriptionsList, Vec::new(), api_error("AF1"));
        assert_eq!(
            err.to_string(),
            "O365 subscriptions/list API error 400 (AF1): bad"
        );
    }

    #[test]
    fn stop_error_embeds_params_and_json_cause() {
        let err = FacadeError::new(
            Operation::SubscriptionsStop,
            vec![("ContentType", "DLP.All".to_string())],
            api_error("x"),
        );
        assert_eq!(
            err.to_string(),
            r#"O365 subscriptions/stop error. ContentType = DLP.All, error = {"kind":"api","statusCode":400,"code":"x","message":"bad"}"#
        );
        assert_eq!(err.param("ContentType"), Some("DLP.All"));
    }

    #[test]
    fn value_view_keeps_params_in_call_order() {
        let err = FacadeError::new(
            Operation::SubscriptionsContent,
            vec![
                ("ContentType", "Audit.General".to_string()),
                ("startTs", "null".to_string()),
                ("endTs", r#""2017-01-02T00:00:00Z""#.to_string()),
            ],
            api_error("AF20022"),
        );
        let names: Vec<&str> = err.params().iter().map(|(k, _)| *k).collect();
        assert_eq!(names, ["ContentType", "startTs", "endTs"]);

        let value = err.to_value();
        assert_eq!(value["operation"], "O365 subscriptions/content error.");
        assert_eq!(value["params"]["startTs"], "null");
        assert_eq!(value["error"]["code"], "AF20022");
        assert_eq!(value["message"], err.to_string());
    }

    #[test]
    fn api_error_display_without_code() {
        let err = ManagementError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "API error 503: unavailable");
    }

    #[test]
    fn facade_error_source_is_cause() {
        use std::error::Error as _;
        let err = FacadeError::new(
            Operation::FetchContent,
            vec![("uri", "https://example/1".to_string())],
            ManagementError::Transport {
                message: "reset".to_string(),
            },
        );
        assert!(err.source().is_some());
        assert_eq!(
            err.cause(),
            &ManagementError::Transport {
                message: "reset".to_string()
            }
        );
    }
}
