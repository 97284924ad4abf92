//! End-to-end tests through the router: registration, confirmation, login,
//! password reset, role-gated avatar upload and contact CRUD.
//!
//! Run with `cargo test`. Tests that need a database are gated on
//! `TEST_DATABASE_URL` (Postgres; migrations are applied automatically) and
//! skip silently when it is unset.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::FromRef;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use tower::util::ServiceExt;
use uuid::Uuid;

use contacthub::app::build_app;
use contacthub::auth::jwt::{Claims, JwtKeys, TokenPurpose};
use contacthub::auth::repo::{User, UserRole};
use contacthub::cache::UserCache;
use contacthub::mailer::LogMailer;
use contacthub::state::AppState;
use contacthub::storage::ObjectStorage;

struct TestStorage;

#[axum::async_trait]
impl ObjectStorage for TestStorage {
    async fn upload(&self, key: &str, _body: Bytes, _content_type: &str) -> anyhow::Result<String> {
        Ok(format!("https://test.local/{}", key))
    }
}

async fn setup() -> Option<(Router, AppState)> {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("skip: set TEST_DATABASE_URL to run API tests");
            return None;
        }
    };

    let db = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .ok()?;
    sqlx::migrate!("./migrations").run(&db).await.ok()?;

    let state = AppState::from_parts(
        db,
        Arc::new(AppState::fake_config()),
        Arc::new(TestStorage),
        Arc::new(LogMailer),
        UserCache::disabled(),
    );
    Some((build_app(state.clone()), state))
}

fn unique_email(tag: &str) -> String {
    format!(
        "{}-{}@example.com",
        tag,
        Uuid::new_v4().simple()
    )
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn response_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn register(app: &Router, email: &str, password: &str, name: &str) -> serde_json::Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({ "email": email, "password": password, "name": name }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED, "register should succeed");
    response_json(res).await
}

async fn confirm(app: &Router, state: &AppState, user_id: Uuid) {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_email_confirm(user_id).unwrap();
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/auth/confirmed_email/{}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK, "confirmation should succeed");
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK, "login should succeed");
    let json = response_json(res).await;
    json["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_probe() {
    let Some((app, _state)) = setup().await else { return };
    let res = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_twice_answers_email_taken() {
    let Some((app, _state)) = setup().await else { return };
    let email = unique_email("dup");

    register(&app, &email, "password123", "Dup").await;

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({ "email": email, "password": "password123", "name": "Dup" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let json = response_json(res).await;
    assert_eq!(json["code"], "email_taken");
}

#[tokio::test]
async fn register_confirm_login_me_flow() {
    let Some((app, state)) = setup().await else { return };
    let email = unique_email("flow");

    let created = register(&app, &email, "password123", "Flow User").await;
    let user_id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    assert_eq!(created["email"], email);
    assert_eq!(created["role"], "user");
    assert!(created.get("password_hash").is_none());

    // Unconfirmed login is rejected while the policy flag is on.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": "password123" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(res).await["code"], "email_not_confirmed");

    confirm(&app, &state, user_id).await;

    // Confirming again is an idempotent success.
    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_email_confirm(user_id).unwrap();
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/auth/confirmed_email/{}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    assert_eq!(json["message"], "Your email is already confirmed");

    let access = login(&app, &email, "password123").await;
    assert!(!access.is_empty());

    let res = app
        .clone()
        .oneshot(bearer_request("GET", "/api/users/me", &access))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me = response_json(res).await;
    assert_eq!(me["email"], email);

    // Wrong password answers with the ambiguous credentials error.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": "wrong-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(res).await["code"], "invalid_credentials");
}

#[tokio::test]
async fn access_guard_rejects_bad_tokens() {
    let Some((app, state)) = setup().await else { return };

    // No token at all.
    let res = app
        .clone()
        .oneshot(Request::builder().uri("/api/users/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let email = unique_email("guard");
    let created = register(&app, &email, "password123", "Guard").await;
    let user_id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    confirm(&app, &state, user_id).await;

    // A confirmation token is not an access token.
    let keys = JwtKeys::from_ref(&state);
    let confirm_token = keys.sign_email_confirm(user_id).unwrap();
    let res = app
        .clone()
        .oneshot(bearer_request("GET", "/api/users/me", &confirm_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // An expired access token is rejected, past the validation leeway.
    let now = time::OffsetDateTime::now_utc();
    let claims = Claims {
        sub: user_id,
        iat: (now - time::Duration::seconds(600)).unix_timestamp() as usize,
        exp: (now - time::Duration::seconds(120)).unix_timestamp() as usize,
        iss: keys.issuer.clone(),
        aud: keys.audience.clone(),
        purpose: TokenPurpose::Access,
        pwd: None,
    };
    let expired =
        jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &keys.encoding).unwrap();
    let res = app
        .clone()
        .oneshot(bearer_request("GET", "/api/users/me", &expired))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_is_generic_and_single_use() {
    let Some((app, state)) = setup().await else { return };
    let email = unique_email("reset");

    let created = register(&app, &email, "password123", "Reset").await;
    let user_id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    confirm(&app, &state, user_id).await;

    // Identical message for registered and unregistered emails.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/request-password-reset",
            serde_json::json!({ "email": email }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let registered_msg = response_json(res).await["message"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/request-password-reset",
            serde_json::json!({ "email": unique_email("ghost") }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let unknown_msg = response_json(res).await["message"].as_str().unwrap().to_string();
    assert_eq!(registered_msg, unknown_msg);

    // Consume a reset token, then try to replay it.
    let user = User::find_by_email(&state.db, &email).await.unwrap().unwrap();
    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign_password_reset(user.id, &user.password_hash).unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            serde_json::json!({ "token": token, "password": "new-password-456" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/reset-password",
            serde_json::json!({ "token": token, "password": "another-password-789" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(res).await["code"], "token_invalid");

    // Old password is gone, new one works.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "email": email, "password": "password123" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    login(&app, &email, "new-password-456").await;
}

fn multipart_request(uri: &str, token: &str, content_type: &str, payload: &[u8]) -> Request<Body> {
    let boundary = "XTESTBOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"avatar\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn avatar_update_requires_admin_role() {
    let Some((app, state)) = setup().await else { return };
    let email = unique_email("avatar");

    let created = register(&app, &email, "password123", "Avatar").await;
    let user_id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    confirm(&app, &state, user_id).await;
    let access = login(&app, &email, "password123").await;

    // Plain user: valid identity, wrong role.
    let res = app
        .clone()
        .oneshot(multipart_request("/api/users/avatar", &access, "image/png", b"fake-png"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(response_json(res).await["code"], "forbidden");

    User::set_role(&state.db, user_id, UserRole::Admin).await.unwrap();

    // Unsupported media type still refused.
    let res = app
        .clone()
        .oneshot(multipart_request("/api/users/avatar", &access, "text/plain", b"not-an-image"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = app
        .clone()
        .oneshot(multipart_request("/api/users/avatar", &access, "image/png", b"fake-png"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = response_json(res).await;
    let avatar = json["avatar"].as_str().unwrap();
    assert!(avatar.starts_with("https://test.local/avatars/"));
    assert!(avatar.ends_with(".png"));
}

#[tokio::test]
async fn contacts_crud_search_and_birthdays() {
    let Some((app, state)) = setup().await else { return };
    let email = unique_email("contacts");

    let created = register(&app, &email, "password123", "Contacts").await;
    let user_id: Uuid = created["id"].as_str().unwrap().parse().unwrap();
    confirm(&app, &state, user_id).await;
    let access = login(&app, &email, "password123").await;

    // Birthday three days out, any year.
    let upcoming = time::OffsetDateTime::now_utc().date() + time::Duration::days(3);
    let birth_year = if upcoming.month() == time::Month::February && upcoming.day() == 29 {
        1992
    } else {
        1990
    };
    let birthday = time::Date::from_calendar_date(birth_year, upcoming.month(), upcoming.day())
        .unwrap()
        .to_string();

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/contacts")
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "name": "Grace",
                        "surname": "Hopper",
                        "email": "grace@example.com",
                        "phone": "+1555000001",
                        "birthday": birthday,
                        "extra": "compilers"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let contact = response_json(res).await;
    let contact_id = contact["id"].as_str().unwrap().to_string();

    // List and fetch.
    let res = app
        .clone()
        .oneshot(bearer_request("GET", "/api/contacts?limit=50", &access))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let list = response_json(res).await;
    assert!(list.as_array().unwrap().iter().any(|c| c["id"] == contact_id.as_str()));

    let res = app
        .clone()
        .oneshot(bearer_request("GET", &format!("/api/contacts/{}", contact_id), &access))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Search by surname fragment.
    let res = app
        .clone()
        .oneshot(bearer_request("GET", "/api/contacts/search?q=hopp", &access))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let found = response_json(res).await;
    assert!(found.as_array().unwrap().iter().any(|c| c["id"] == contact_id.as_str()));

    // Upcoming birthdays over the default week.
    let res = app
        .clone()
        .oneshot(bearer_request("GET", "/api/contacts/birthdays", &access))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let upcoming_list = response_json(res).await;
    assert!(upcoming_list
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["id"] == contact_id.as_str()));

    // Partial update keeps unmentioned fields.
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/contacts/{}", contact_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", access))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "phone": "+1555000002" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated = response_json(res).await;
    assert_eq!(updated["phone"], "+1555000002");
    assert_eq!(updated["surname"], "Hopper");

    // Another user cannot see this contact.
    let other_email = unique_email("other");
    let other = register(&app, &other_email, "password123", "Other").await;
    let other_id: Uuid = other["id"].as_str().unwrap().parse().unwrap();
    confirm(&app, &state, other_id).await;
    let other_access = login(&app, &other_email, "password123").await;
    let res = app
        .clone()
        .oneshot(bearer_request(
            "GET",
            &format!("/api/contacts/{}", contact_id),
            &other_access,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // Delete, then it is gone.
    let res = app
        .clone()
        .oneshot(bearer_request(
            "DELETE",
            &format!("/api/contacts/{}", contact_id),
            &access,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(bearer_request("GET", &format!("/api/contacts/{}", contact_id), &access))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
