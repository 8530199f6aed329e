//! Office 365 Management Activity API access.
//!
//! This module provides:
//! - Application token credentials for the management resource
//! - An HTTP client for the activity feed endpoints
//! - A facade that reports failures with the operation and its inputs

pub mod auth;
pub mod client;
pub mod facade;
pub mod models;

pub use auth::{Credential, DEFAULT_AUTHORITY, MANAGEMENT_RESOURCE};
pub use client::{ApiCompletion, DEFAULT_API_ROOT, ManagementApi, ManagementClient};
pub use facade::{FacadeCompletion, ManagementFacade};
pub use models::{
    Completion, ContentBlob, ContentType, HttpRequestInfo, HttpResponseInfo, Notification,
    Subscription, Webhook, WebhookStatus,
};
