mod common;

use axum::{
    body::{Body, BodyDataStream},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use common::{GOOD_PASSWORD, InMemoryRepository, StubIdentity, body_json, post, router, send};
use scroll_portal::{
    AppConfig, AppState, Backend, create_router,
    models::{Category, PostDraft},
};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, timeout};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn authed(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// Reads server-sent events off a streaming response body, one complete event at a time.
struct EventReader {
    body: BodyDataStream,
    buffer: String,
}

impl EventReader {
    fn new(response: Response) -> Self {
        Self {
            body: response.into_body().into_data_stream(),
            buffer: String::new(),
        }
    }

    /// Next event as (name, JSON data). `None` once the stream has ended.
    async fn next(&mut self) -> Option<(String, serde_json::Value)> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                let mut name = String::new();
                let mut data = String::new();
                for line in raw.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = value.trim().to_string();
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                // Keep-alive comments carry neither.
                if name.is_empty() && data.is_empty() {
                    continue;
                }
                return Some((name, serde_json::from_str(&data).unwrap()));
            }

            let chunk = timeout(Duration::from_secs(2), self.body.next())
                .await
                .expect("no event within two seconds")?;
            self.buffer
                .push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
        }
    }
}

fn fixtures() -> (Arc<InMemoryRepository>, Arc<StubIdentity>) {
    (
        Arc::new(InMemoryRepository::default()),
        Arc::new(StubIdentity::default()),
    )
}

// --- Public surface ---

#[tokio::test]
async fn test_health_check() {
    let (repo, identity) = fixtures();
    let response = send(router(repo, identity), get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_landing_serves_fallback_with_disabled_backend() {
    let app = create_router(AppState::new(&Backend::disabled(), AppConfig::default()));

    let response = send(app, get("/api/landing")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["featured_source"], "fallback");
    assert_eq!(body["quick_source"], "fallback");
    assert!(!body["featured"]["title"].as_str().unwrap().is_empty());
    assert_eq!(body["quick"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_refresh_endpoint_loads_live_content() {
    let (repo, identity) = fixtures();
    repo.add(post("Live Feature", "live-feature", Category::RabbitHole, 1));
    let app = router(repo, identity);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/landing/refresh")
        .body(Body::empty())
        .unwrap();
    let body = body_json(send(app, request).await).await;

    assert_eq!(body["featured_source"], "live");
    assert_eq!(body["featured"]["title"], "Live Feature");
    // No other posts: the grid falls back on its own.
    assert_eq!(body["quick_source"], "fallback");
}

#[tokio::test]
async fn test_get_post_by_slug() {
    let (repo, identity) = fixtures();
    repo.add(post("Found It", "found-it", Category::Tech, 1));
    let app = router(repo, identity);

    let response = send(app.clone(), get("/api/posts/found-it")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["title"], "Found It");

    let response = send(app, get("/api/posts/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_get_post_without_store_is_unavailable() {
    let app = create_router(AppState::new(&Backend::disabled(), AppConfig::default()));
    let response = send(app, get("/api/posts/anything")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// --- Session gate ---

#[tokio::test]
async fn test_admin_without_session_redirects_to_sign_in() {
    let (repo, identity) = fixtures();
    let response = send(router(repo.clone(), identity), get("/admin/posts")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(InMemoryRepository::calls(&repo.list_calls), 0);
}

#[tokio::test]
async fn test_admin_redirect_uses_configured_login_path() {
    let (repo, identity) = fixtures();
    let config = AppConfig {
        login_path: "/admin-login".to_string(),
        ..AppConfig::default()
    };
    let app = create_router(AppState::new(&common::backend(repo, identity), config));

    let response = send(app, get("/admin/session")).await;
    assert_eq!(response.headers()[header::LOCATION], "/admin-login");
}

#[tokio::test]
async fn test_admin_with_disabled_identity_redirects() {
    let app = create_router(AppState::new(&Backend::disabled(), AppConfig::default()));
    let response = send(app, authed(Method::GET, "/admin/posts", "any-token")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_admin_with_valid_session_runs_handler() {
    let (repo, identity) = fixtures();
    repo.add(post("Listed", "listed", Category::Tech, 1));
    identity.add_session("tok");

    let response = send(
        router(repo, identity),
        authed(Method::GET, "/admin/posts", "tok"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = body_json(response).await;
    assert_eq!(body[0]["title"], "Listed");
}

#[tokio::test]
async fn test_session_cookie_is_accepted() {
    let (repo, identity) = fixtures();
    let session = identity.add_session("cookie-tok");

    let request = Request::builder()
        .uri("/admin/session")
        .header(header::COOKIE, "theme=dark; sb-access-token=cookie-tok")
        .body(Body::empty())
        .unwrap();
    let response = send(router(repo, identity), request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], session.user_id.to_string());
    assert!(body.get("access_token").is_none());
}

#[tokio::test]
async fn test_handler_does_not_run_before_gate_resolves() {
    let repo = Arc::new(InMemoryRepository::default());
    let (identity, release) = StubIdentity::delayed();
    identity.add_session("tok");
    let identity = Arc::new(identity);
    let app = router(repo.clone(), identity.clone());

    let pending = tokio::spawn(send(app, authed(Method::GET, "/admin/posts", "tok")));

    // The gate is waiting on the provider: no handler, no store call.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(StubIdentity::calls(&identity), 1);
    assert!(!pending.is_finished());
    assert_eq!(InMemoryRepository::calls(&repo.list_calls), 0);

    release.notify_one();
    let response = timeout(Duration::from_secs(2), pending)
        .await
        .expect("request completes")
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(InMemoryRepository::calls(&repo.list_calls), 1);
}

// --- Sign-in / sign-out ---

#[tokio::test]
async fn test_sign_in_sets_http_only_cookie() {
    let (repo, identity) = fixtures();
    let response = send(
        router(repo, identity),
        json_request(
            Method::POST,
            "/auth/login",
            None,
            serde_json::json!({ "email": "admin@3amscroll.test", "password": GOOD_PASSWORD }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("sb-access-token="));
    assert!(cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["email"], "admin@3amscroll.test");
}

#[tokio::test]
async fn test_sign_in_with_wrong_password_shows_message() {
    let (repo, identity) = fixtures();
    let response = send(
        router(repo, identity),
        json_request(
            Method::POST,
            "/auth/login",
            None,
            serde_json::json!({ "email": "admin@3amscroll.test", "password": "nope" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Invalid login credentials");
}

#[tokio::test]
async fn test_sign_in_without_identity_provider_is_unavailable() {
    let app = create_router(AppState::new(&Backend::disabled(), AppConfig::default()));
    let response = send(
        app,
        json_request(
            Method::POST,
            "/auth/login",
            None,
            serde_json::json!({ "email": "a@b.c", "password": "pw" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Identity provider not configured");
}

#[tokio::test]
async fn test_sign_out_ends_session_and_redirects() {
    let (repo, identity) = fixtures();
    identity.add_session("tok");
    let app = router(repo, identity.clone());

    let response = send(app.clone(), authed(Method::POST, "/auth/logout", "tok")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    assert!(!identity.has_session("tok"));

    let response = send(app, authed(Method::GET, "/admin/posts", "tok")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

// --- Admin editor ---

#[tokio::test]
async fn test_save_draft_creates_then_updates() {
    let (repo, identity) = fixtures();
    identity.add_session("tok");
    let app = router(repo.clone(), identity);

    let draft = PostDraft {
        title: "Draft".to_string(),
        slug: "draft".to_string(),
        ..PostDraft::default()
    };
    let response = send(
        app.clone(),
        json_request(Method::POST, "/admin/posts", Some("tok"), serde_json::to_value(&draft).unwrap()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;

    let edit = serde_json::json!({
        "id": created["id"],
        "title": "Draft, revised",
        "slug": "draft",
    });
    let response = send(app, json_request(Method::POST, "/admin/posts", Some("tok"), edit)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let posts = repo.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].title, "Draft, revised");
}

#[tokio::test]
async fn test_save_draft_validation_and_conflict() {
    let (repo, identity) = fixtures();
    repo.add(post("Taken", "taken", Category::Tech, 1));
    identity.add_session("tok");
    let app = router(repo, identity);

    let response = send(
        app.clone(),
        json_request(Method::POST, "/admin/posts", Some("tok"), serde_json::json!({ "slug": "x" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        app,
        json_request(
            Method::POST,
            "/admin/posts",
            Some("tok"),
            serde_json::json!({ "title": "Copy", "slug": "taken" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_requires_confirmation() {
    let (repo, identity) = fixtures();
    let doomed = post("Doomed", "doomed", Category::Tech, 1);
    repo.add(doomed.clone());
    identity.add_session("tok");
    let app = router(repo.clone(), identity);

    let uri = format!("/admin/posts/{}", doomed.id);
    let response = send(app.clone(), authed(Method::DELETE, &uri, "tok")).await;

    assert_eq!(response.status(), StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(InMemoryRepository::calls(&repo.delete_calls), 0);

    let response = send(app, authed(Method::DELETE, &format!("{uri}?confirm=true"), "tok")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
    assert!(repo.posts().is_empty());
}

#[tokio::test]
async fn test_store_failure_is_surfaced_to_operator() {
    let (repo, identity) = fixtures();
    repo.fail_writes.store(true, std::sync::atomic::Ordering::SeqCst);
    identity.add_session("tok");
    let app = router(repo, identity);

    let response = send(
        app,
        json_request(
            Method::POST,
            "/admin/posts",
            Some("tok"),
            serde_json::json!({ "title": "T", "slug": "t" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"]["code"], "UPSTREAM_ERROR");
}

#[tokio::test]
async fn test_delete_with_unrecognised_confirmation_is_not_confirmed() {
    let (repo, identity) = fixtures();
    let doomed = post("Doomed", "doomed", Category::Tech, 1);
    repo.add(doomed.clone());
    identity.add_session("tok");
    let app = router(repo.clone(), identity);

    let uri = format!("/admin/posts/{}?confirm=yes", doomed.id);
    let response = send(app, authed(Method::DELETE, &uri, "tok")).await;

    assert_eq!(response.status(), StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(InMemoryRepository::calls(&repo.delete_calls), 0);
    assert_eq!(repo.posts().len(), 1);
}

#[tokio::test]
async fn test_delete_reports_success_when_refetch_fails() {
    let (repo, identity) = fixtures();
    let doomed = post("Doomed", "doomed", Category::Tech, 1);
    repo.add(doomed.clone());
    repo.fail_list.store(true, std::sync::atomic::Ordering::SeqCst);
    identity.add_session("tok");
    let app = router(repo.clone(), identity);

    let uri = format!("/admin/posts/{}?confirm=true", doomed.id);
    let response = send(app, authed(Method::DELETE, &uri, "tok")).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(repo.posts().is_empty());
}

// --- Event streams ---

#[tokio::test]
async fn test_session_events_follow_sign_out_and_release_gate() {
    let (repo, identity) = fixtures();
    identity.add_session("tok");
    let app = router(repo, identity.clone());

    let response = send(app, authed(Method::GET, "/admin/session/events", "tok")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut events = EventReader::new(response);

    let (name, data) = events.next().await.expect("verifying event");
    assert_eq!(name, "verifying");
    assert_eq!(data["state"], "verifying");

    let (name, data) = events.next().await.expect("authorized event");
    assert_eq!(name, "authorized");
    assert!(data["user_id"].is_string());
    assert_eq!(identity.listener_count(), 1);

    identity.revoke("tok");

    let (name, data) = events.next().await.expect("unauthorized event");
    assert_eq!(name, "unauthorized");
    assert_eq!(data["redirect"], AppConfig::default().login_path);

    assert!(events.next().await.is_none());

    timeout(Duration::from_secs(2), async {
        while identity.listener_count() > 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("gate released its session subscription");
}

#[tokio::test]
async fn test_session_events_require_a_session() {
    let (repo, identity) = fixtures();
    let response = send(router(repo, identity.clone()), get("/admin/session/events")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(identity.listener_count(), 0);
}

#[tokio::test]
async fn test_landing_events_stream_current_then_refreshed_snapshot() {
    let repo = Arc::new(InMemoryRepository::with_posts(vec![
        post("Live Feature", "live-feature", Category::RabbitHole, 1),
        post("Live Snack", "live-snack", Category::MidnightSnacks, 2),
    ]));
    let app = router(repo, Arc::new(StubIdentity::default()));

    let response = send(app.clone(), get("/api/landing/events")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut events = EventReader::new(response);

    let (name, data) = events.next().await.expect("current snapshot");
    assert_eq!(name, "landing");
    assert_eq!(data["featured_source"], "fallback");
    assert_eq!(data["quick"].as_array().map(Vec::len), Some(4));

    let refresh = Request::builder()
        .method(Method::POST)
        .uri("/api/landing/refresh")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(app, refresh).await.status(), StatusCode::OK);

    let (name, data) = events.next().await.expect("refreshed snapshot");
    assert_eq!(name, "landing");
    assert_eq!(data["featured_source"], "live");
    assert_eq!(data["featured"]["title"], "Live Feature");
    assert_eq!(data["quick"][0]["title"], "Live Snack");
}
