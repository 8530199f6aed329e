//! Data models for the Office 365 Management Activity API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Audit log stream selected by a subscription or content query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Azure Active Directory audit records.
    #[serde(rename = "Audit.AzureActiveDirectory")]
    AuditAzureActiveDirectory,
    /// Exchange audit records.
    #[serde(rename = "Audit.Exchange")]
    AuditExchange,
    /// SharePoint audit records.
    #[serde(rename = "Audit.SharePoint")]
    AuditSharePoint,
    /// Workloads not covered by the other audit streams.
    #[serde(rename = "Audit.General")]
    AuditGeneral,
    /// Data loss prevention events.
    #[serde(rename = "DLP.All")]
    DlpAll,
}

impl ContentType {
    /// Every content type, in API documentation order.
    pub const ALL: [Self; 5] = [
        Self::AuditAzureActiveDirectory,
        Self::AuditExchange,
        Self::AuditSharePoint,
        Self::AuditGeneral,
        Self::DlpAll,
    ];

    /// Wire name of the content type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuditAzureActiveDirectory => "Audit.AzureActiveDirectory",
            Self::AuditExchange => "Audit.Exchange",
            Self::AuditSharePoint => "Audit.SharePoint",
            Self::AuditGeneral => "Audit.General",
            Self::DlpAll => "DLP.All",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ct| ct.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|ct| ct.as_str()).collect();
                format!("unknown content type '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Webhook that receives notifications for a subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// HTTPS endpoint that accepts notifications.
    pub address: String,
    /// Value echoed back in the `Webhook-AuthID` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    /// Expiration timestamp. Absent for a webhook that does not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

/// Webhook state reported for an existing subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStatus {
    /// `enabled`, `disabled` or `expired`.
    #[serde(default)]
    pub status: String,
    /// Registered webhook address.
    #[serde(default)]
    pub address: String,
    /// Registered auth id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_id: Option<String>,
    /// Registered expiration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

/// A subscription to a content type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Subscribed content type, as reported by the service.
    pub content_type: String,
    /// `enabled` or `disabled`.
    pub status: String,
    /// Webhook state, absent when no webhook is registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookStatus>,
}

/// Descriptor of a content blob available for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlob {
    /// Content type of the blob.
    pub content_type: String,
    /// Opaque blob identifier.
    pub content_id: String,
    /// URI to pass to content retrieval.
    pub content_uri: String,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_created: Option<String>,
    /// Timestamp after which the blob is no longer retrievable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_expiration: Option<String>,
}

/// A notification sent (or attempted) to a subscription webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Content type of the referenced blob.
    pub content_type: String,
    /// Opaque blob identifier.
    pub content_id: String,
    /// URI of the referenced blob.
    pub content_uri: String,
    /// Tenant-assigned client id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Delivery status of the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_status: Option<String>,
    /// Delivery timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sent: Option<String>,
    /// Creation timestamp of the blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_created: Option<String>,
    /// Expiration timestamp of the blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_expiration: Option<String>,
}

/// Render a timestamp the way the API expects it in `startTime`/`endTime`.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The request half of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestInfo {
    /// HTTP method.
    pub method: Method,
    /// Full request URL including query.
    pub url: String,
}

/// The response half of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponseInfo {
    /// HTTP status code.
    pub status: u16,
    /// `NextPageUri` header for paged listings.
    pub next_page_uri: Option<String>,
    /// Service request id, when reported.
    pub request_id: Option<String>,
}

/// Outcome of one management API call.
///
/// Mirrors an `(error, result, request, response)` completion: `result`
/// holds either the value or the error, and the HTTP exchange is reported
/// alongside in both cases as far as it got.
#[derive(Debug, Clone)]
pub struct Completion<T, E> {
    /// The value or the failure.
    pub result: Result<T, E>,
    /// Request sent, if one was built.
    pub request: Option<HttpRequestInfo>,
    /// Response received, if any.
    pub response: Option<HttpResponseInfo>,
}

impl<T, E> Completion<T, E> {
    /// A completion that failed before any request was sent.
    #[must_use]
    pub const fn failed(error: E) -> Self {
        Self {
            result: Err(error),
            request: None,
            response: None,
        }
    }

    /// Whether the call succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Transform the error, keeping the exchange.
    #[must_use]
    pub fn map_err<F, O>(self, op: O) -> Completion<T, F>
    where
        O: FnOnce(E) -> F,
    {
        Completion {
            result: self.result.map_err(op),
            request: self.request,
            response: self.response,
        }
    }

    /// Chain a fallible transformation of the value, keeping the exchange.
    #[must_use]
    pub fn and_then<U, O>(self, op: O) -> Completion<U, E>
    where
        O: FnOnce(T) -> Result<U, E>,
    {
        Completion {
            result: self.result.and_then(op),
            request: self.request,
            response: self.response,
        }
    }

    /// Drop the exchange and keep the result.
    ///
    /// # Errors
    ///
    /// Returns the call's error if it failed.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}
