//! HTTP-level tests for the credential, the activity feed client and the facade.

use std::sync::Arc;
use std::time::Duration;

use o365mgmt_core::management::{Credential, MANAGEMENT_RESOURCE};
use o365mgmt_core::{
    ContentType, ManagementApi, ManagementClient, ManagementConfig, ManagementError,
    ManagementFacade, Webhook,
};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT: &str = "tenant-1";
const FEED: &str = "/api/v1.0/tenant-1/activity/feed";

fn client_for(server: &MockServer) -> ManagementClient {
    let http = ManagementClient::http_client(Duration::from_secs(5)).expect("http client");
    let credential = Credential::new(http.clone(), "app-id", TENANT, "app-secret", MANAGEMENT_RESOURCE)
        .with_authority(server.uri());
    ManagementClient::with_credential(http, Arc::new(credential))
        .with_api_root(format!("{}/api/v1.0", server.uri()))
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=app-id"))
        .and(body_string_contains("resource=https%3A%2F%2Fmanage.office.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": "3599",
            "access_token": "tok-1"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn token_is_requested_once_and_reused() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/list")))
        .and(query_param("PublisherIdentifier", TENANT))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "contentType": "Audit.Exchange", "status": "enabled", "webhook": null }
        ])))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (first, second) = tokio::join!(client.list_subscriptions(), client.list_subscriptions());
    let third = client.list_subscriptions().await;

    for completion in [first, second, third] {
        let subs = completion.result.expect("list");
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].content_type, "Audit.Exchange");
        assert!(subs[0].webhook.is_none());
    }
}

#[tokio::test]
async fn start_posts_webhook_descriptor() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{FEED}/subscriptions/start")))
        .and(query_param("contentType", "Audit.SharePoint"))
        .and(body_json(json!({
            "webhook": {
                "address": "https://hook.example/notify",
                "authId": "o365notify"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "contentType": "Audit.SharePoint",
            "status": "enabled",
            "webhook": {
                "status": "enabled",
                "address": "https://hook.example/notify",
                "authId": "o365notify",
                "expiration": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let hook = Webhook {
        address: "https://hook.example/notify".to_string(),
        auth_id: Some("o365notify".to_string()),
        expiration: None,
    };
    let completion = client_for(&server)
        .start_subscription(ContentType::AuditSharePoint, Some(&hook))
        .await;
    let sub = completion.result.expect("start");
    assert_eq!(sub.status, "enabled");
    assert_eq!(
        sub.webhook.map(|w| w.address),
        Some("https://hook.example/notify".to_string())
    );
    assert_eq!(completion.response.map(|r| r.status), Some(200));
}

#[tokio::test]
async fn stop_accepts_empty_body() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{FEED}/subscriptions/stop")))
        .and(query_param("contentType", "DLP.All"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .stop_subscription(ContentType::DlpAll)
        .await;
    assert_eq!(completion.result, Ok(()));
}

#[tokio::test]
async fn content_listing_passes_window_and_reports_next_page() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    let next = format!("{}{FEED}/subscriptions/content?contentType=Audit.General&nextPage=2", server.uri());
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/content")))
        .and(query_param("contentType", "Audit.General"))
        .and(query_param("startTime", "2017-01-01T00:00:00Z"))
        .and(query_param("endTime", "2017-01-02T00:00:00Z"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("NextPageUri", next.as_str())
                .set_body_json(json!([{
                    "contentType": "Audit.General",
                    "contentId": "blob-1",
                    "contentUri": "https://manage.office.com/api/v1.0/tenant-1/activity/feed/audit/blob-1",
                    "contentCreated": "2017-01-01T10:00:00.000Z",
                    "contentExpiration": "2017-01-08T10:00:00.000Z"
                }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .list_content(
            ContentType::AuditGeneral,
            Some("2017-01-01T00:00:00Z".parse().expect("start")),
            Some("2017-01-02T00:00:00Z".parse().expect("end")),
        )
        .await;
    let response = completion.response.clone().expect("response");
    assert_eq!(response.next_page_uri.as_deref(), Some(next.as_str()));
    let request = completion.request.clone().expect("request");
    assert!(request.url.contains("startTime=2017-01-01T00%3A00%3A00Z"));
    let blobs = completion.result.expect("content");
    assert_eq!(blobs[0].content_id, "blob-1");
}

#[tokio::test]
async fn notifications_without_window_omit_time_bounds() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/notifications")))
        .and(query_param("contentType", "Audit.Exchange"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "contentType": "Audit.Exchange",
            "contentId": "blob-9",
            "contentUri": "https://manage.office.com/api/v1.0/tenant-1/activity/feed/audit/blob-9",
            "notificationStatus": "Succeeded",
            "notificationSent": "2017-01-01T10:05:00.000Z"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .list_notifications(ContentType::AuditExchange, None, None)
        .await;
    let request = completion.request.clone().expect("request");
    assert!(!request.url.contains("startTime"));
    assert!(!request.url.contains("endTime"));
    let notes = completion.result.expect("notifications");
    assert_eq!(notes[0].notification_status.as_deref(), Some("Succeeded"));
}

#[tokio::test]
async fn fetch_content_follows_absolute_uri() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/audit/blob-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Id": "rec-1", "Operation": "FileAccessed", "Workload": "SharePoint" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let uri = format!("{}{FEED}/audit/blob-1", server.uri());
    let completion = client_for(&server).fetch_content(&uri).await;
    let records = completion.result.expect("content");
    assert_eq!(records[0]["Operation"], "FileAccessed");
}

#[tokio::test]
async fn api_errors_carry_service_code_and_exchange() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/content")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "AF20022",
                "message": "No subscription found for the specified content type"
            }
        })))
        .mount(&server)
        .await;

    let completion = client_for(&server)
        .list_content(ContentType::AuditExchange, None, None)
        .await;
    assert_eq!(completion.response.as_ref().map(|r| r.status), Some(400));
    assert!(completion.request.is_some());
    assert_eq!(
        completion.result,
        Err(ManagementError::Api {
            status: 400,
            code: Some("AF20022".to_string()),
            message: "No subscription found for the specified content type".to_string(),
        })
    );
}

#[tokio::test]
async fn undecodable_success_body_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/list")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let completion = client_for(&server).list_subscriptions().await;
    assert!(matches!(completion.result, Err(ManagementError::Decode { .. })));
    assert_eq!(completion.response.map(|r| r.status), Some(200));
}

#[tokio::test]
async fn token_failure_skips_the_api_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/list")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let completion = client_for(&server).list_subscriptions().await;
    assert!(completion.request.is_none());
    assert!(completion.response.is_none());
    match completion.result {
        Err(ManagementError::Auth { message }) => {
            assert!(message.contains("invalid_client"));
            assert!(message.contains("AADSTS7000215"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn oversized_token_lifetime_is_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/{TENANT}/oauth2/token")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "expires_in": "18446744073709551615"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/list")))
        .and(header("Authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    for _ in 0..2 {
        let completion = client.list_subscriptions().await;
        assert_eq!(completion.result, Ok(Vec::new()));
    }
}

#[tokio::test]
async fn unauthorized_response_drops_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/list")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": "AF10001", "message": "The permission set sent in the request does not include the expected permission." }
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/subscriptions/list")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.list_subscriptions().await;
    assert!(matches!(first.result, Err(ManagementError::Api { status: 401, .. })));
    let second = client.list_subscriptions().await;
    assert_eq!(second.result, Ok(Vec::new()));
}

#[tokio::test]
async fn fetch_content_keeps_existing_publisher_identifier() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{FEED}/audit/blob-2")))
        .and(query_param("PublisherIdentifier", "other-publisher"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let uri = format!(
        "{}{FEED}/audit/blob-2?PublisherIdentifier=other-publisher",
        server.uri()
    );
    let completion = client_for(&server).fetch_content(&uri).await;
    let request = completion.request.clone().expect("request");
    assert_eq!(request.url.matches("PublisherIdentifier").count(), 1);
    assert_eq!(completion.result, Ok(json!([])));
}

#[tokio::test]
async fn facade_from_config_wraps_service_errors() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{FEED}/subscriptions/stop")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "AF20051", "message": "Subscription is not enabled" }
        })))
        .mount(&server)
        .await;

    let config = ManagementConfig {
        client_id: Some("app-id".to_string()),
        client_secret: Some("app-secret".to_string()),
        tenant_id: Some(TENANT.to_string()),
        authority: server.uri(),
        api_root: format!("{}/api/v1.0", server.uri()),
        ..ManagementConfig::default()
    };
    let facade = ManagementFacade::from_config(&config).expect("facade");
    let err = facade
        .subscriptions_stop(ContentType::AuditGeneral)
        .await
        .result
        .expect_err("stop should fail");
    let text = err.to_string();
    assert!(text.starts_with("O365 subscriptions/stop error. ContentType = Audit.General, error = "));
    assert!(text.contains("AF20051"));
    assert!(text.contains("Subscription is not enabled"));
}
