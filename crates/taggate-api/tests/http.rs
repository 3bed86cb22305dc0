use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use taggate_api::{AppStateInner, router};
use taggate_core::captcha::CaptchaVerifier;
use taggate_core::organizations::ProfileDirectory;
use taggate_core::subscription::PaymentGateway;
use taggate_core::{Collaborators, CoreConfig, SystemClock, TagService};
use taggate_db::Database;
use taggate_types::models::PaymentCard;

struct Fakes;

#[async_trait]
impl CaptchaVerifier for Fakes {
    async fn verify(&self, response: &str) -> anyhow::Result<bool> {
        Ok(response == "human")
    }
}

#[async_trait]
impl PaymentGateway for Fakes {
    async fn charge(&self, _card: &PaymentCard, _amount_cents: u64) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for Fakes {
    async fn biography(&self, _handle: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

fn app_with(config: CoreConfig, max_requests_per_hour: Option<u32>) -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let service = Arc::new(TagService::new(
        config,
        Collaborators {
            store: db.clone(),
            captcha: Arc::new(Fakes),
            payments: Arc::new(Fakes),
            profiles: Arc::new(Fakes),
            clock: Arc::new(SystemClock),
        },
    ));
    router(Arc::new(AppStateInner {
        db,
        service,
        jwt_secret: "test-secret".into(),
        max_requests_per_hour,
    }))
}

fn app() -> Router {
    app_with(CoreConfig::default(), None)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": username, "password": "s3cret!pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

async fn create_group(app: &Router, token: &str, name: &str) {
    let (status, _) = send(
        app,
        "POST",
        "/api/groups",
        Some(token),
        Some(json!({ "organization": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_then_login() {
    let app = app();
    register(&app, "owner").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "owner", "password": "s3cret!pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "owner");

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "username": "owner", "password": "wrong!pass1" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "username": "owner", "password": "s3cret!pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/groups", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/groups", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_and_redeem_once() {
    let app = app();
    let token = register(&app, "owner").await;
    create_group(&app, &token, "acme").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/tags/acme/generate",
        Some(&token),
        Some(json!({ "description": "free coffee" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tag = body["tag"].as_str().unwrap().to_string();
    assert_eq!(tag.len(), 6);

    let uri = format!("/api/tags/acme/verify/{}", tag);
    let (status, body) = send(&app, "POST", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_valid"], true);

    let (_, body) = send(&app, "POST", &uri, Some(&token), None).await;
    assert_eq!(body["is_valid"], false);
}

#[tokio::test]
async fn out_of_range_expiration_is_a_bad_request() {
    let app = app();
    let token = register(&app, "owner").await;
    create_group(&app, &token, "acme").await;

    for expiration_ms in [i64::MIN, i64::MAX, -1] {
        let (status, body) = send(
            &app,
            "POST",
            "/api/tags/acme/generate",
            Some(&token),
            Some(json!({ "description": "x", "expiration_ms": expiration_ms })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", expiration_ms);
        assert!(body["error"].is_string());
    }

    let (status, _) = send(
        &app,
        "POST",
        "/api/tags/acme/generate",
        Some(&token),
        Some(json!({ "description": "x", "expiration_ms": 60_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn public_verification_consumes_the_tag() {
    let app = app();
    let token = register(&app, "owner").await;
    create_group(&app, &token, "acme").await;
    let (_, body) = send(
        &app,
        "POST",
        "/api/tags/acme/generate",
        Some(&token),
        Some(json!({})),
    )
    .await;
    let tag = body["tag"].as_str().unwrap().to_string();

    let uri = format!("/api/tags/acme/verifyweb/{}", tag);
    let (_, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(body["is_valid"], true);
    let (_, body) = send(&app, "POST", &uri, None, None).await;
    assert_eq!(body["is_valid"], false);

    let (status, body) = send(&app, "POST", "/api/tags/nope/verifyweb/AAAAAA", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "organization not found");
}

#[tokio::test]
async fn member_quota_maps_to_429() {
    let app = app();
    let owner = register(&app, "owner").await;
    let alice = register(&app, "alice").await;
    create_group(&app, &owner, "acme").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/groups/acme/members",
        Some(&owner),
        Some(json!({
            "username": "alice",
            "permissions": {
                "accounts": { "CREATE": false, "READ": false, "UPDATE": false, "DELETE": false },
                "allow_generate_tags": true,
                "allow_scan_tags": false,
                "tags_per_hour": 6
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for _ in 0..6 {
        let (status, _) = send(
            &app,
            "POST",
            "/api/tags/acme/generate",
            Some(&alice),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/tags/acme/generate")
        .header(header::AUTHORIZATION, format!("Bearer {}", alice))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    // Scanning was not granted.
    let (status, body) = send(
        &app,
        "POST",
        "/api/tags/acme/verify/AAAAAA",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn busy_hour_demands_captcha() {
    let app = app_with(
        CoreConfig {
            max_tags_per_hour_until_captcha_required: 1,
            ..CoreConfig::default()
        },
        None,
    );
    let token = register(&app, "owner").await;
    create_group(&app, &token, "acme").await;

    let generate = |body: Value| {
        let app = app.clone();
        let token = token.clone();
        async move { send(&app, "POST", "/api/tags/acme/generate", Some(&token), Some(body)).await }
    };

    assert_eq!(generate(json!({})).await.0, StatusCode::OK);
    let (status, body) = generate(json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "captcha required");

    let (_, body) = generate(json!({ "captcha_response": "bot" })).await;
    assert_eq!(body["error"], "incorrect captcha");

    let (status, _) = generate(json!({ "captcha_response": "human" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deals_and_premium() {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/deals", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let app = app_with(
        CoreConfig {
            enable_premium: true,
            ..CoreConfig::default()
        },
        None,
    );
    let (status, body) = send(&app, "GET", "/api/deals", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["silver"], 999);
    assert_eq!(body["diamond"], 16812);

    let token = register(&app, "owner").await;
    create_group(&app, &token, "acme").await;
    let card = json!({
        "cardholder_name": "Jane Doe",
        "card_number": "4242424242424242",
        "cvv": "123",
        "expiration_month": 12,
        "expiration_year": 2099
    });

    let (status, _) = send(
        &app,
        "POST",
        "/api/groups/acme/premium",
        Some(&token),
        Some(json!({ "duration": 12345, "card_details": card.clone() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/groups/acme/premium",
        Some(&token),
        Some(json!({ "duration": 2_628_000_000_i64, "card_details": card })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["subscription"]["expires_at"].is_string());
}

#[tokio::test]
async fn members_and_groups_lifecycle() {
    let app = app();
    let owner = register(&app, "owner").await;
    create_group(&app, &owner, "acme").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/groups/acme/members",
        Some(&owner),
        Some(json!({ "username": "bob", "tag_description": "tea" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "GET",
        "/api/groups/acme/members?filter=b",
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["tag_description"], "tea");

    let (status, body) = send(&app, "GET", "/api/groups/acme", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member_count"], 1);

    let (status, body) = send(
        &app,
        "GET",
        "/api/groups/acme/redemptions/bob?months_ago=1",
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = send(
        &app,
        "DELETE",
        "/api/groups/acme/members/bob",
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", "/api/groups/acme", Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, "GET", "/api/groups", Some(&owner), None).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn requests_are_throttled_per_ip() {
    let app = app_with(CoreConfig::default(), Some(2));
    let peer: SocketAddr = "203.0.113.7:40000".parse().unwrap();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let mut request = Request::builder()
            .uri("/api/tags/acme/verifyweb/AAAAAA")
            .method("POST")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::NOT_FOUND,
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
}

#[tokio::test]
async fn forwarded_clients_are_counted_separately() {
    let app = app_with(CoreConfig::default(), Some(1));
    let peer: SocketAddr = "10.0.0.1:40000".parse().unwrap();

    let mut statuses = Vec::new();
    for client in ["198.51.100.1", "198.51.100.2", "198.51.100.1"] {
        let mut request = Request::builder()
            .uri("/api/tags/acme/verifyweb/AAAAAA")
            .method("POST")
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }
    assert_eq!(
        statuses,
        vec![
            StatusCode::NOT_FOUND,
            StatusCode::NOT_FOUND,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
}
