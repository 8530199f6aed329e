//! Application (client-credentials) authentication for the management API.
//!
//! The Management Activity API accepts app-only tokens issued by the Azure AD
//! v1 token endpoint for the `https://manage.office.com` resource. Tokens are
//! cached in memory and refreshed shortly before they expire.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::ManagementError;

/// Resource the tokens are issued for.
pub const MANAGEMENT_RESOURCE: &str = "https://manage.office.com";

/// Default Azure AD authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Lifetime assumed when the token endpoint does not report one.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Longest lifetime honoured from a token response.
const MAX_EXPIRES_IN: u64 = 86_400;

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Application token credential bound to one tenant and resource.
pub struct Credential {
    client_id: String,
    tenant_id: String,
    client_secret: String,
    resource: String,
    authority: String,
    http: Client,
    token: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &"<redacted>")
            .field("resource", &self.resource)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Create a credential for `resource` using the default authority.
    #[must_use]
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        tenant_id: impl Into<String>,
        client_secret: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            client_secret: client_secret.into(),
            resource: resource.into(),
            authority: DEFAULT_AUTHORITY.to_string(),
            http,
            token: Mutex::new(None),
        }
    }

    /// Use a different authority host, e.g. a sovereign cloud or a test server.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    /// Tenant the credential is bound to.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/token",
            self.authority,
            urlencoding::encode(&self.tenant_id)
        )
    }

    /// Return a valid access token, requesting a new one if needed.
    ///
    /// Concurrent callers wait on the same refresh.
    ///
    /// # Errors
    ///
    /// Returns [`ManagementError::Auth`] if the token endpoint cannot be
    /// reached or rejects the request.
    pub async fn token(&self) -> Result<String, ManagementError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Forget the cached token so the next call requests a new one.
    ///
    /// The client calls this when the API answers 401.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn request_token(&self) -> Result<AccessToken, ManagementError> {
        let url = self.token_url();
        log::debug!(
            "requesting token for client {} in tenant {}",
            self.client_id,
            self.tenant_id
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", self.resource.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| auth_error(format!("token request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| auth_error(format!("reading token response: {e}")))?;
        if !status.is_success() {
            return Err(auth_error(format!(
                "token request failed: {status} - {}",
                describe_token_error(&text)
            )));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| auth_error(format!("parsing token response: {e}")))?;

        let value = body["access_token"]
            .as_str()
            .ok_or_else(|| auth_error("token response missing access_token".to_string()))?
            .to_string();

        // The v1 endpoint reports expires_in as a string.
        let expires_in = match &body["expires_in"] {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .unwrap_or(DEFAULT_EXPIRES_IN)
        .min(MAX_EXPIRES_IN);

        log::debug!("token acquired, expires in {expires_in}s");

        Ok(AccessToken {
            value,
            expires_at: expiry_after(expires_in),
        })
    }
}

fn expiry_after(expires_in: u64) -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(expires_in))
        .unwrap_or(now)
}

const fn auth_error(message: String) -> ManagementError {
    ManagementError::Auth { message }
}

fn describe_token_error(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    match (parsed["error"].as_str(), parsed["error_description"].as_str()) {
        (Some(code), Some(desc)) => format!("{code}: {desc}"),
        (Some(code), None) => code.to_string(),
        _ => body.to_string(),
    }
}
