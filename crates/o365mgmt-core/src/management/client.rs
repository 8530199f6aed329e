//! HTTP binding for the Office 365 Management Activity API.
//!
//! Each method issues exactly one request against
//! `{api_root}/{tenant}/activity/feed/...`. Paged listings are not followed;
//! the `NextPageUri` header is reported in the response info instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, ManagementError};
use crate::management::auth::{Credential, MANAGEMENT_RESOURCE};
use crate::management::models::{
    Completion, ContentBlob, ContentType, HttpRequestInfo, HttpResponseInfo, Notification,
    Subscription, Webhook, format_timestamp,
};

/// Default API root.
pub const DEFAULT_API_ROOT: &str = "https://manage.office.com/api/v1.0";

/// Result of a client call, before any facade wrapping.
pub type ApiCompletion<T> = Completion<T, ManagementError>;

/// Operations offered by a management API client.
///
/// [`ManagementClient`] talks to the real service; tests substitute stubs.
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// List current subscriptions.
    async fn list_subscriptions(&self) -> ApiCompletion<Vec<Subscription>>;

    /// Start a subscription, optionally registering a webhook.
    async fn start_subscription(
        &self,
        content_type: ContentType,
        webhook: Option<&Webhook>,
    ) -> ApiCompletion<Subscription>;

    /// Stop a subscription.
    async fn stop_subscription(&self, content_type: ContentType) -> ApiCompletion<()>;

    /// List content blobs available in an optional time window.
    async fn list_content(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiCompletion<Vec<ContentBlob>>;

    /// List notifications sent in an optional time window.
    async fn list_notifications(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiCompletion<Vec<Notification>>;

    /// Retrieve a content blob by URI.
    async fn fetch_content(&self, content_uri: &str) -> ApiCompletion<Value>;
}

/// Management Activity API client bound to one credential and tenant.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    http: Client,
    credential: Arc<Credential>,
    tenant_id: String,
    api_root: String,
}

impl ManagementClient {
    /// Build the HTTP client shared by the credential and the API calls.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn http_client(timeout: Duration) -> Result<Client, CoreError> {
        Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CoreError::Other(format!("creating HTTP client: {e}")))
    }

    /// Create a client from application credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails.
    pub fn new(
        client_id: &str,
        client_secret: &str,
        tenant_id: &str,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let http = Self::http_client(timeout)?;
        let credential = Credential::new(
            http.clone(),
            client_id,
            tenant_id,
            client_secret,
            MANAGEMENT_RESOURCE,
        );
        Ok(Self::with_credential(http, Arc::new(credential)))
    }

    /// Create a client around an existing credential.
    #[must_use]
    pub fn with_credential(http: Client, credential: Arc<Credential>) -> Self {
        let tenant_id = credential.tenant_id().to_string();
        Self {
            http,
            credential,
            tenant_id,
            api_root: DEFAULT_API_ROOT.to_string(),
        }
    }

    /// Point the client at a different API root.
    #[must_use]
    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into().trim_end_matches('/').to_string();
        self
    }

    /// Tenant the client is bound to.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The credential used for bearer tokens.
    #[must_use]
    pub const fn credential(&self) -> &Arc<Credential> {
        &self.credential
    }

    fn feed_url(&self, operation: &str) -> String {
        format!(
            "{}/{}/activity/feed/{operation}",
            self.api_root,
            urlencoding::encode(&self.tenant_id)
        )
    }

    fn window_query(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("contentType", content_type.as_str().to_string()),
            ("PublisherIdentifier", self.tenant_id.clone()),
        ];
        if let Some(start) = start {
            query.push(("startTime", format_timestamp(&start)));
        }
        if let Some(end) = end {
            query.push(("endTime", format_timestamp(&end)));
        }
        query
    }

    /// Authorize, send and read one request. The body is returned as text.
    async fn execute(&self, builder: RequestBuilder) -> ApiCompletion<String> {
        let token = match self.credential.token().await {
            Ok(token) => token,
            Err(e) => return Completion::failed(e),
        };

        let request = match builder.bearer_auth(token).build() {
            Ok(request) => request,
            Err(e) => {
                return Completion::failed(ManagementError::Transport {
                    message: format!("building request: {e}"),
                });
            }
        };
        let request_info = HttpRequestInfo {
            method: request.method().clone(),
            url: request.url().to_string(),
        };
        log::debug!("{} {}", request_info.method, request_info.url);

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                return Completion {
                    result: Err(ManagementError::Transport {
                        message: e.to_string(),
                    }),
                    request: Some(request_info),
                    response: None,
                };
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            log::debug!("API rejected the bearer token, dropping it");
            self.credential.invalidate().await;
        }
        let response_info = response_info(status.as_u16(), response.headers());
        let result = match response.text().await {
            Ok(text) if status.is_success() => Ok(text),
            Ok(text) => Err(api_error(status.as_u16(), &text)),
            Err(e) => Err(ManagementError::Transport {
                message: format!("reading response body: {e}"),
            }),
        };

        Completion {
            result,
            request: Some(request_info),
            response: Some(response_info),
        }
    }

    async fn execute_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiCompletion<T> {
        self.execute(builder).await.and_then(|body| decode(&body))
    }
}

#[async_trait]
impl ManagementApi for ManagementClient {
    async fn list_subscriptions(&self) -> ApiCompletion<Vec<Subscription>> {
        let builder = self
            .http
            .get(self.feed_url("subscriptions/list"))
            .query(&[("PublisherIdentifier", self.tenant_id.as_str())]);
        self.execute_json(builder).await
    }

    async fn start_subscription(
        &self,
        content_type: ContentType,
        webhook: Option<&Webhook>,
    ) -> ApiCompletion<Subscription> {
        let builder = self
            .http
            .post(self.feed_url("subscriptions/start"))
            .query(&[
                ("contentType", content_type.as_str()),
                ("PublisherIdentifier", self.tenant_id.as_str()),
            ]);
        let builder = match webhook {
            Some(hook) => builder.json(&serde_json::json!({ "webhook": hook })),
            None => builder.header("Content-Length", "0"),
        };
        self.execute_json(builder).await
    }

    async fn stop_subscription(&self, content_type: ContentType) -> ApiCompletion<()> {
        let builder = self
            .http
            .post(self.feed_url("subscriptions/stop"))
            .query(&[
                ("contentType", content_type.as_str()),
                ("PublisherIdentifier", self.tenant_id.as_str()),
            ])
            .header("Content-Length", "0");
        self.execute(builder).await.and_then(|_| Ok(()))
    }

    async fn list_content(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiCompletion<Vec<ContentBlob>> {
        let builder = self
            .http
            .get(self.feed_url("subscriptions/content"))
            .query(&self.window_query(content_type, start, end));
        self.execute_json(builder).await
    }

    async fn list_notifications(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiCompletion<Vec<Notification>> {
        let builder = self
            .http
            .get(self.feed_url("subscriptions/notifications"))
            .query(&self.window_query(content_type, start, end));
        self.execute_json(builder).await
    }

    async fn fetch_content(&self, content_uri: &str) -> ApiCompletion<Value> {
        let mut builder = self.http.request(Method::GET, content_uri);
        if !has_publisher_identifier(content_uri) {
            builder = builder.query(&[("PublisherIdentifier", self.tenant_id.as_str())]);
        }
        self.execute_json(builder).await
    }
}

/// Content URIs handed out by the service may already name the publisher.
fn has_publisher_identifier(uri: &str) -> bool {
    Url::parse(uri).is_ok_and(|url| {
        url.query_pairs()
            .any(|(key, _)| key.eq_ignore_ascii_case("PublisherIdentifier"))
    })
}

fn response_info(status: u16, headers: &HeaderMap) -> HttpResponseInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };
    HttpResponseInfo {
        status,
        next_page_uri: header("NextPageUri"),
        request_id: header("request-id").or_else(|| header("x-ms-request-id")),
    }
}

/// Map an error response body to [`ManagementError::Api`].
///
/// The service reports `{"error": {"code": ..., "message": ...}}`; anything
/// else is kept verbatim as the message.
fn api_error(status: u16, body: &str) -> ManagementError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let code = error
        .and_then(|e| e["code"].as_str())
        .map(ToString::to_string);
    let message = error
        .and_then(|e| e["message"].as_str())
        .map_or_else(|| body.to_string(), ToString::to_string);
    ManagementError::Api {
        status,
        code,
        message,
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ManagementError> {
    serde_json::from_str(body).map_err(|e| ManagementError::Decode {
        message: e.to_string(),
    })
}
