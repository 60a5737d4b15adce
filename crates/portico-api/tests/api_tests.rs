//! API integration tests
//!
//! Drive the full router over in-memory stores with a recording mailer.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
};
use portico_api::auth::encode_uid;
use portico_api::create_router_for_testing;
use portico_api::testing::TestContext;
use portico_core::config::AppConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "Str0ng!Pass";

/// Helper to create a test request
fn create_json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&body).unwrap()
}

async fn send(
    ctx: &TestContext,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = ctx
        .router
        .clone()
        .oneshot(create_json_request(method, uri, token, body))
        .await
        .unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

fn registration(username: &str, email: &str, alt_name: &str) -> Value {
    json!({
        "username": username,
        "email": email,
        "alt_name": alt_name,
        "password": PASSWORD,
        "password2": PASSWORD,
    })
}

/// Path of the link in the most recent email, without the base URL
async fn last_link_path(ctx: &TestContext) -> String {
    let sent = ctx.mailer.sent().await;
    let body = &sent.last().expect("no email sent").body;
    let link = body
        .lines()
        .find(|line| line.starts_with("http"))
        .expect("no link in email");
    link.trim_start_matches(&ctx.state.config.server.public_base_url)
        .to_string()
}

/// Register and activate an account, returning `(id, access, refresh)`
async fn active_account(ctx: &TestContext, username: &str, alt_name: &str) -> (i64, String, String) {
    let email = format!("{username}@example.com");
    let (status, created) = send(
        ctx,
        "POST",
        "/register/",
        None,
        Some(registration(username, &email, alt_name)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{created}");

    let path = last_link_path(ctx).await;
    let (status, pair) = send(ctx, "GET", &path, None, None).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{pair}");

    (
        created["id"].as_i64().unwrap(),
        pair["access"].as_str().unwrap().to_string(),
        pair["refresh"].as_str().unwrap().to_string(),
    )
}

fn field_names(body: &Value) -> Vec<String> {
    body["fields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .map(|f| f["field"].as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let ctx = TestContext::new();
    let (status, json) = send(&ctx, "GET", "/ready", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["database"], true);

    ctx.state.set_ready(false);
    let (status, _) = send(&ctx, "GET", "/ready", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_prometheus_metrics() {
    let ctx = TestContext::new();
    send(&ctx, "GET", "/entities/", None, None).await;

    // Recording happens on a spawned task
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let response = ctx
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("portico_uptime_seconds"));
    assert!(text.contains("portico_http_requests_total{endpoint=\"/entities/\",status=\"200\"} 1"));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let ctx = TestContext::new();
    let (status, json) = send(&ctx, "GET", "/api-docs/openapi.json", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/register/"].is_object());
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = create_router_for_testing();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

// =============================================================================
// Registration and Activation Tests
// =============================================================================

#[tokio::test]
async fn test_register_sends_one_activation_email() {
    let ctx = TestContext::new();

    let (status, json) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_1")),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["username"], "bob");
    assert_eq!(json["email"], "b@x.com");
    assert_eq!(json["alt_name"], "Bob_1");
    assert_eq!(json["is_active"], false);
    assert!(json.get("password").is_none());

    let id = json["id"].as_i64().unwrap();
    let account = ctx.state.accounts.get_account(id).await.unwrap().unwrap();
    assert!(!account.is_active);
    assert!(!account.email_validated);

    let sent = ctx.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "b@x.com");

    let path = last_link_path(&ctx).await;
    let prefix = format!("/activate-account/{}/", encode_uid(id));
    assert!(path.starts_with(&prefix), "{path}");
    assert!(path.len() > prefix.len() + 1);
}

#[tokio::test]
async fn test_register_rejects_invalid_fields() {
    let ctx = TestContext::new();

    let (status, json) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(json!({
            "username": "no spaces",
            "email": "not-an-email",
            "alt_name": "Bob!",
            "password": PASSWORD,
            "password2": "Different1!",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    let fields = field_names(&json);
    for expected in ["username", "email", "alt_name", "password"] {
        assert!(fields.contains(&expected.to_string()), "{fields:?}");
    }
    assert!(ctx.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_register_missing_field_is_validation_error() {
    let ctx = TestContext::new();

    let (status, json) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(json!({
            "username": "bob",
            "email": "b@x.com",
            "alt_name": "Bob_1",
            "password": PASSWORD,
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(field_names(&json), vec!["password2".to_string()]);
    assert!(ctx.mailer.sent().await.is_empty());

    let (status, json) = send(&ctx, "POST", "/entities/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{json}");

    let (_, access, _) = active_account(&ctx, "carol", "Carol").await;
    let (status, json) = send(&ctx, "POST", "/entities/", Some(&access), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(field_names(&json), vec!["body".to_string()]);
}

#[tokio::test]
async fn test_register_rejects_case_insensitive_alias() {
    let ctx = TestContext::new();

    let (status, _) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("alice1", "a1@x.com", "Alice")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, json) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("alice2", "a2@x.com", "alice")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&json), vec!["alt_name".to_string()]);
}

#[tokio::test]
async fn test_register_rejects_duplicate_username_and_email() {
    let ctx = TestContext::new();
    send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_1")),
    )
    .await;

    let (status, json) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_2")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = field_names(&json);
    assert!(fields.contains(&"username".to_string()));
    assert!(fields.contains(&"email".to_string()));
}

#[tokio::test]
async fn test_register_delivery_failure() {
    let ctx = TestContext::new();
    ctx.mailer.set_failing(true);

    let (status, json) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_1")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "DELIVERY_FAILED");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn test_login_before_activation_fails() {
    let ctx = TestContext::new();
    send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_1")),
    )
    .await;

    let (status, json) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        json["details"],
        "No active account found with the given credentials"
    );
}

#[tokio::test]
async fn test_activation_succeeds_exactly_once() {
    let ctx = TestContext::new();
    let (_, created) = send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_1")),
    )
    .await;
    let id = created["id"].as_i64().unwrap();
    let path = last_link_path(&ctx).await;

    let (status, pair) = send(&ctx, "GET", &path, None, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(pair["access"].is_string());
    assert!(pair["refresh"].is_string());

    let account = ctx.state.accounts.get_account(id).await.unwrap().unwrap();
    assert!(account.is_active);
    assert!(account.email_validated);

    let (status, json) = send(&ctx, "GET", &path, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_tampered_activation_token_rejected() {
    let ctx = TestContext::new();
    send(
        &ctx,
        "POST",
        "/register/",
        None,
        Some(registration("bob", "b@x.com", "Bob_1")),
    )
    .await;
    let path = last_link_path(&ctx).await;

    // Flip the final character of the token
    let trimmed = path.trim_end_matches('/');
    let (head, last) = trimmed.split_at(trimmed.len() - 1);
    let flipped = if last == "A" { "B" } else { "A" };
    let tampered = format!("{head}{flipped}/");

    let (status, json) = send(&ctx, "GET", &tampered, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_activation_with_bad_uid() {
    let ctx = TestContext::new();

    let (status, json) = send(&ctx, "GET", "/activate-account/!!/abc-def/", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_TOKEN");

    let unknown = format!("/activate-account/{}/abc-def/", encode_uid(999));
    let (status, json) = send(&ctx, "GET", &unknown, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_login_and_refresh() {
    let ctx = TestContext::new();
    active_account(&ctx, "bob", "Bob_1").await;

    let (status, pair) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &ctx,
        "POST",
        "/login/refresh/",
        None,
        Some(json!({"refresh": pair["refresh"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = json["access"].as_str().unwrap();

    let (status, _) = send(&ctx, "GET", "/users/", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_wrong_password() {
    let ctx = TestContext::new();
    active_account(&ctx, "bob", "Bob_1").await;

    let (status, json) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": "Wr0ng!Pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_access_token_cannot_refresh() {
    let ctx = TestContext::new();
    let (_, access, _) = active_account(&ctx, "bob", "Bob_1").await;

    let (status, _) = send(
        &ctx,
        "POST",
        "/login/refresh/",
        None,
        Some(json!({"refresh": access})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_blacklists_all_tokens() {
    let ctx = TestContext::new();
    let (_, access, refresh) = active_account(&ctx, "bob", "Bob_1").await;

    // A second session from a fresh login
    let (_, second) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": PASSWORD})),
    )
    .await;
    let second_access = second["access"].as_str().unwrap().to_string();

    let (status, body) = send(&ctx, "POST", "/logout/", Some(&access), None).await;
    assert_eq!(status, StatusCode::RESET_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = send(&ctx, "GET", "/users/", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&ctx, "GET", "/users/", Some(&second_access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &ctx,
        "POST",
        "/login/refresh/",
        None,
        Some(json!({"refresh": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_requires_authentication() {
    let ctx = TestContext::new();
    let (status, json) = send(&ctx, "POST", "/logout/", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");
}

// =============================================================================
// Password and Profile Tests
// =============================================================================

#[tokio::test]
async fn test_change_password_flow() {
    let ctx = TestContext::new();
    let (id, access, _) = active_account(&ctx, "bob", "Bob_1").await;
    let uri = format!("/change-password/{id}/");

    let (status, json) = send(
        &ctx,
        "PUT",
        &uri,
        Some(&access),
        Some(json!({"old_password": PASSWORD, "password": "N3w!Passw", "password2": "N3w!Passx"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&json), vec!["password".to_string()]);

    let (status, json) = send(
        &ctx,
        "PUT",
        &uri,
        Some(&access),
        Some(json!({"old_password": "Wr0ng!Pass", "password": "N3w!Passw", "password2": "N3w!Passw"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INCORRECT_CREDENTIAL");

    let (status, json) = send(
        &ctx,
        "PUT",
        &uri,
        Some(&access),
        Some(json!({"old_password": PASSWORD, "password": "N3w!Passw", "password2": "N3w!Passw"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(json["message"].is_string());

    let (status, _) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": "N3w!Passw"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_of_other_account_forbidden() {
    let ctx = TestContext::new();
    let (bob_id, _, _) = active_account(&ctx, "bob", "Bob_1").await;
    let (_, carol_access, _) = active_account(&ctx, "carol", "Carol").await;

    let (status, json) = send(
        &ctx,
        "PUT",
        &format!("/change-password/{bob_id}/"),
        Some(&carol_access),
        Some(json!({"old_password": PASSWORD, "password": "N3w!Passw", "password2": "N3w!Passw"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_update_profile() {
    let ctx = TestContext::new();
    let (bob_id, bob_access, _) = active_account(&ctx, "bob", "Bob_1").await;
    active_account(&ctx, "carol", "Carol").await;
    let uri = format!("/update-profile/{bob_id}/");

    let (status, json) = send(
        &ctx,
        "PUT",
        &uri,
        Some(&bob_access),
        Some(json!({"username": "bob", "email": "bob@example.com", "alt_name": "CAROL"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&json), vec!["alt_name".to_string()]);

    let (status, _) = send(
        &ctx,
        "PUT",
        &uri,
        Some(&bob_access),
        Some(json!({"username": "robert", "email": "robert@example.com", "alt_name": "Robert"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let account = ctx.state.accounts.get_account(bob_id).await.unwrap().unwrap();
    assert_eq!(account.username, "robert");
    assert_eq!(account.email, "robert@example.com");
    assert_eq!(account.alt_name, "Robert");
}

#[tokio::test]
async fn test_forgot_and_reset_password() {
    let ctx = TestContext::new();
    let (id, _, _) = active_account(&ctx, "bob", "Bob_1").await;

    let (status, json) = send(
        &ctx,
        "POST",
        "/forgot-password/",
        None,
        Some(json!({"email": "nobody@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&json), vec!["email".to_string()]);

    let (status, _) = send(
        &ctx,
        "POST",
        "/forgot-password/",
        None,
        Some(json!({"email": "bob@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ctx.mailer.sent().await.len(), 2);

    let path = last_link_path(&ctx).await;
    assert!(path.starts_with(&format!("/reset-password/{}/", encode_uid(id))));

    let (status, pair) = send(
        &ctx,
        "POST",
        &path,
        None,
        Some(json!({"password": "N3w!Passw", "password2": "N3w!Passw"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(pair["access"].is_string());

    let (status, _) = send(
        &ctx,
        "POST",
        "/login/",
        None,
        Some(json!({"username": "bob", "password": "N3w!Passw"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The link is spent once the password changed
    let (status, json) = send(
        &ctx,
        "POST",
        &path,
        None,
        Some(json!({"password": "An0ther!Pass", "password2": "An0ther!Pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_TOKEN");
}

// =============================================================================
// User Directory Tests
// =============================================================================

#[tokio::test]
async fn test_users_directory() {
    let ctx = TestContext::new();
    let (bob_id, access, _) = active_account(&ctx, "bob", "Bob_1").await;
    active_account(&ctx, "carol", "Carol").await;

    let (status, _) = send(&ctx, "GET", "/users/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(&ctx, "GET", "/users/", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    let users = json.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "carol");
    assert!(users[0].get("password_hash").is_none());

    let (status, json) = send(
        &ctx,
        "GET",
        &format!("/users/{bob_id}/"),
        Some(&access),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["alt_name"], "Bob_1");

    let (status, _) = send(&ctx, "GET", "/users/999/", Some(&access), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Entity Tests
// =============================================================================

async fn create_entity(ctx: &TestContext, token: &str, name: &str, views: i64) -> Value {
    let (status, json) = send(
        ctx,
        "POST",
        "/entities/",
        Some(token),
        Some(json!({
            "name": name,
            "link": format!("https://example.com/{name}"),
            "views": views,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json
}

#[tokio::test]
async fn test_entity_list_depends_on_caller() {
    let ctx = TestContext::new();
    let (bob_id, access, _) = active_account(&ctx, "bob", "Bob_1").await;

    create_entity(&ctx, &access, "popular", 40).await;
    create_entity(&ctx, &access, "obscure", 1).await;
    create_entity(&ctx, &access, "middling", 12).await;

    let (status, json) = send(&ctx, "GET", "/entities/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let anonymous = json.as_array().unwrap();
    assert_eq!(anonymous.len(), 1);
    assert_eq!(anonymous[0], json!({"name": "obscure", "author": bob_id}));

    let (status, json) = send(&ctx, "GET", "/entities/", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    let views: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["views"].as_i64().unwrap())
        .collect();
    assert_eq!(views, vec![1, 12, 40]);
    assert!(json[0]["link"].is_string());
    assert!(json[0]["id"].is_i64());
}

#[tokio::test]
async fn test_anonymous_list_limit_is_configurable() {
    let mut config = AppConfig::default();
    config.entities.anonymous_list_limit = 2;
    let ctx = TestContext::with_config(config);
    let (_, access, _) = active_account(&ctx, "bob", "Bob_1").await;

    for (name, views) in [("a", 3), ("b", 2), ("c", 1)] {
        create_entity(&ctx, &access, name, views).await;
    }

    let (_, json) = send(&ctx, "GET", "/entities/", None, None).await;
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["c", "b"]);
}

#[tokio::test]
async fn test_entity_retrieve_visibility() {
    let ctx = TestContext::new();
    let (_, access, _) = active_account(&ctx, "bob", "Bob_1").await;

    let first = create_entity(&ctx, &access, "first", 0).await;
    let hidden = create_entity(&ctx, &access, "hidden", 5).await;

    let (status, json) = send(
        &ctx,
        "GET",
        &format!("/entities/{}/", first["id"]),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.get("link").is_none());

    let hidden_uri = format!("/entities/{}/", hidden["id"]);
    let (status, _) = send(&ctx, "GET", &hidden_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(&ctx, "GET", &hidden_uri, Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["views"], 5);
}

#[tokio::test]
async fn test_entity_create_requires_auth_and_valid_fields() {
    let ctx = TestContext::new();
    let (_, access, _) = active_account(&ctx, "bob", "Bob_1").await;

    let (status, _) = send(
        &ctx,
        "POST",
        "/entities/",
        None,
        Some(json!({"name": "x", "link": "https://example.com/x"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(
        &ctx,
        "POST",
        "/entities/",
        Some(&access),
        Some(json!({"name": "", "link": "nope", "views": -3})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = field_names(&json);
    for expected in ["name", "link", "views"] {
        assert!(fields.contains(&expected.to_string()), "{fields:?}");
    }

    let created = create_entity(&ctx, &access, "dup", 0).await;
    assert_eq!(created["views"], 0);

    let (status, json) = send(
        &ctx,
        "POST",
        "/entities/",
        Some(&access),
        Some(json!({"name": "again", "link": "https://example.com/dup"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(field_names(&json), vec!["link".to_string()]);
}

#[tokio::test]
async fn test_entity_update_and_delete_by_author_only() {
    let ctx = TestContext::new();
    let (_, bob, _) = active_account(&ctx, "bob", "Bob_1").await;
    let (_, carol, _) = active_account(&ctx, "carol", "Carol").await;

    let entity = create_entity(&ctx, &bob, "bobs", 0).await;
    let uri = format!("/entities/{}/", entity["id"]);

    let (status, _) = send(&ctx, "PUT", &uri, Some(&carol), Some(json!({"views": 9}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&ctx, "DELETE", &uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = send(&ctx, "PUT", &uri, Some(&bob), Some(json!({"views": 9}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["views"], 9);
    assert_eq!(json["name"], "bobs");

    let (status, _) = send(&ctx, "DELETE", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&ctx, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
