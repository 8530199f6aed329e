//! One entry point per management API operation, with uniform error reporting.
//!
//! Every operation forwards to a [`ManagementApi`] and hands back the
//! client's completion unchanged on success. On failure the cause is wrapped
//! in a [`FacadeError`] that names the operation and echoes its inputs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::ManagementConfig;
use crate::error::{CoreError, FacadeError, ManagementError, Operation};
use crate::management::auth::{Credential, MANAGEMENT_RESOURCE};
use crate::management::client::{ManagementApi, ManagementClient};
use crate::management::models::{
    Completion, ContentBlob, ContentType, Notification, Subscription, Webhook, format_timestamp,
};

/// Completion of a facade operation.
pub type FacadeCompletion<T> = Completion<T, FacadeError>;

/// Facade over a management API client.
#[derive(Debug, Clone)]
pub struct ManagementFacade<C = ManagementClient> {
    client: C,
}

impl ManagementFacade<ManagementClient> {
    /// Build the credential and client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the client id, client secret or
    /// tenant id is missing, or an error if the HTTP client cannot be built.
    pub fn from_config(config: &ManagementConfig) -> Result<Self, CoreError> {
        let creds = config.credentials()?;
        let http = ManagementClient::http_client(config.timeout())?;
        let credential = Credential::new(
            http.clone(),
            creds.client_id,
            creds.tenant_id,
            creds.client_secret,
            MANAGEMENT_RESOURCE,
        )
        .with_authority(&config.authority);
        let client = ManagementClient::with_credential(http, Arc::new(credential))
            .with_api_root(&config.api_root);
        log::debug!("management client ready for tenant {}", client.tenant_id());
        Ok(Self { client })
    }
}

impl<C: ManagementApi> ManagementFacade<C> {
    /// Wrap an existing client.
    #[must_use]
    pub const fn with_client(client: C) -> Self {
        Self { client }
    }

    /// The wrapped client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }

    /// `subscriptions/list`: active subscriptions for the tenant.
    pub async fn subscriptions_list(&self) -> FacadeCompletion<Vec<Subscription>> {
        let completion = self.client.list_subscriptions().await;
        wrap(completion, Operation::SubscriptionsList, Vec::new)
    }

    /// `subscriptions/start`: enable a content type, optionally with a webhook.
    pub async fn subscriptions_start(
        &self,
        content_type: ContentType,
        webhook: Option<&Webhook>,
    ) -> FacadeCompletion<Subscription> {
        let completion = self.client.start_subscription(content_type, webhook).await;
        wrap(completion, Operation::SubscriptionsStart, || {
            vec![
                ("ContentType", content_type.to_string()),
                ("webhook", render_json(webhook)),
            ]
        })
    }

    /// `subscriptions/stop`: disable a content type.
    pub async fn subscriptions_stop(&self, content_type: ContentType) -> FacadeCompletion<()> {
        let completion = self.client.stop_subscription(content_type).await;
        wrap(completion, Operation::SubscriptionsStop, || {
            vec![("ContentType", content_type.to_string())]
        })
    }

    /// `subscriptions/content`: content blobs available in a time window.
    pub async fn subscriptions_content(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> FacadeCompletion<Vec<ContentBlob>> {
        let completion = self.client.list_content(content_type, start, end).await;
        wrap(completion, Operation::SubscriptionsContent, || {
            window_params(content_type, start, end)
        })
    }

    /// `subscriptions/notifications`: notifications sent in a time window.
    pub async fn subscriptions_notifications(
        &self,
        content_type: ContentType,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> FacadeCompletion<Vec<Notification>> {
        let completion = self
            .client
            .list_notifications(content_type, start, end)
            .await;
        wrap(completion, Operation::SubscriptionsNotifications, || {
            window_params(content_type, start, end)
        })
    }

    /// Retrieve the audit records behind a content URI.
    pub async fn get_content(&self, content_uri: &str) -> FacadeCompletion<Value> {
        let completion = self.client.fetch_content(content_uri).await;
        wrap(completion, Operation::FetchContent, || {
            vec![("uri", content_uri.to_string())]
        })
    }
}

fn wrap<T, P>(
    completion: Completion<T, ManagementError>,
    operation: Operation,
    params: P,
) -> FacadeCompletion<T>
where
    P: FnOnce() -> Vec<(&'static str, String)>,
{
    completion.map_err(|cause| {
        let err = FacadeError::new(operation, params(), cause);
        log::warn!("{err}");
        err
    })
}

fn window_params(
    content_type: ContentType,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<(&'static str, String)> {
    vec![
        ("ContentType", content_type.to_string()),
        ("startTs", render_json(start.map(|ts| format_timestamp(&ts)))),
        ("endTs", render_json(end.map(|ts| format_timestamp(&ts)))),
    ]
}

fn render_json<T: serde::Serialize>(value: T) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
}
