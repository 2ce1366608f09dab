use std::convert::Infallible;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{ACCESS_TOKEN_COOKIE, AccessToken, redirect_to_sign_in},
    config::Env,
    editor::SaveAction,
    error::{ApiError, ApiResult},
    gate::{GateState, MountedGate},
    models::{LandingSnapshot, Post, PostDraft, Session, SessionResponse, SignInRequest},
};

// --- Query Structs ---

/// DeleteParams
///
/// Query parameters for DELETE /admin/posts/{id}. Deletion only happens with `confirm=true`.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct DeleteParams {
    /// Must be `true`; anything else is answered with 428 and nothing is deleted.
    pub confirm: Option<String>,
}

impl DeleteParams {
    pub fn is_confirmed(&self) -> bool {
        self.confirm.as_deref() == Some("true")
    }
}

const SSE_KEEP_ALIVE_SECS: u64 = 15;

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(std::time::Duration::from_secs(SSE_KEEP_ALIVE_SECS))
        .text("ping")
}

// --- Reader Handlers ---

/// get_landing
///
/// [Public Route] The landing page's featured story and quick grid. Always complete: slots
/// without live content carry the built-in fallback, flagged by `*_source`.
#[utoipa::path(
    get,
    path = "/api/landing",
    responses((status = 200, description = "Current landing content", body = LandingSnapshot))
)]
pub async fn get_landing(State(state): State<AppState>) -> Json<LandingSnapshot> {
    Json(state.landing.snapshot())
}

/// refresh_landing
///
/// [Public Route] Re-fetches both slots now. May race the realtime refresher; each slot keeps
/// whichever result landed last.
#[utoipa::path(
    post,
    path = "/api/landing/refresh",
    responses((status = 200, description = "Refreshed landing content", body = LandingSnapshot))
)]
pub async fn refresh_landing(State(state): State<AppState>) -> Json<LandingSnapshot> {
    Json(state.loader.refresh(&state.landing).await)
}

/// landing_events
///
/// [Public Route] SSE stream of landing snapshots: the current one first, then one per refresh.
#[utoipa::path(
    get,
    path = "/api/landing/events",
    responses((status = 200, description = "Stream of `landing` events", content_type = "text/event-stream"))
)]
pub async fn landing_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let current = state.landing.snapshot();
    let updates = BroadcastStream::new(state.landing.subscribe()).filter_map(|result| result.ok());

    let stream = tokio_stream::once(current)
        .chain(updates)
        .map(|snapshot| Ok(landing_event(&snapshot)));

    Sse::new(stream).keep_alive(keep_alive())
}

fn landing_event(snapshot: &LandingSnapshot) -> Event {
    let json = serde_json::to_string(snapshot).unwrap_or_default();
    Event::default().event("landing").data(json)
}

/// get_post
///
/// [Public Route] One post by slug.
#[utoipa::path(
    get,
    path = "/api/posts/{slug}",
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "No post with this slug"),
        (status = 503, description = "Content store not configured")
    )
)]
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Post>> {
    state
        .repo
        .get_post_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))
}

// --- Session Handlers ---

/// sign_in
///
/// [Public Route] Exchanges email and password for a session at the identity provider.
/// The access token is returned in the body and set as an HttpOnly cookie.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Credentials rejected"),
        (status = 503, description = "Identity provider not configured")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignInRequest>,
) -> ApiResult<(CookieJar, Json<SessionResponse>)> {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let session = state
        .identity
        .sign_in_with_password(email, &payload.password)
        .await?;

    let cookie = Cookie::build((ACCESS_TOKEN_COOKIE, session.access_token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.env == Env::Production)
        .build();

    Ok((jar.add(cookie), Json(session.into())))
}

/// sign_out
///
/// [Public Route] Ends the caller's session (if any), clears the cookie and sends the browser
/// to the sign-in page. Succeeds even when no session was presented.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 303, description = "Signed out, redirected to sign-in"))
)]
pub async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
    AccessToken(token): AccessToken,
) -> Response {
    if let Some(token) = token {
        if let Err(e) = state.identity.sign_out(&token).await {
            tracing::debug!("sign-out without a live session: {e}");
        }
    }

    let jar = jar.remove(Cookie::build(ACCESS_TOKEN_COOKIE).path("/"));
    (jar, redirect_to_sign_in(&state.config.login_path)).into_response()
}

/// get_session
///
/// [Admin Route] The session the gate resolved for this request.
#[utoipa::path(
    get,
    path = "/admin/session",
    responses(
        (status = 200, description = "Current session", body = Session),
        (status = 303, description = "Not signed in, redirected to sign-in")
    )
)]
pub async fn get_session(Extension(session): Extension<Session>) -> Json<Session> {
    Json(session)
}

/// session_events
///
/// [Admin Route] Follows the caller's session while the admin panel is open. Emits
/// `verifying`, then an event on every gate transition. An `unauthorized` event carries the
/// sign-in path and ends the stream.
#[utoipa::path(
    get,
    path = "/admin/session/events",
    responses((status = 200, description = "Stream of gate state events", content_type = "text/event-stream"))
)]
pub async fn session_events(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let gate = MountedGate::mount(state.identity.clone(), token);
    let follower = GateFollower {
        rx: gate.watch(),
        _gate: gate,
        login_path: state.config.login_path.clone(),
        started: false,
    };

    // The gate lives inside the stream and is dropped with it when the client disconnects.
    let stream = stream::unfold(Some(follower), |follower| async move {
        let mut follower = follower?;

        let current = if follower.started {
            follower.rx.changed().await.ok()?;
            follower.rx.borrow_and_update().clone()
        } else {
            follower.started = true;
            GateState::Verifying
        };

        let event = gate_event(&current, &follower.login_path);
        let next = match current {
            GateState::Unauthorized => None,
            _ => Some(follower),
        };
        Some((Ok::<_, Infallible>(event), next))
    });

    Sse::new(stream).keep_alive(keep_alive())
}

struct GateFollower {
    rx: watch::Receiver<GateState>,
    // Held only to keep the gate task alive.
    _gate: MountedGate,
    login_path: String,
    started: bool,
}

fn gate_event(state: &GateState, login_path: &str) -> Event {
    let data = match state {
        GateState::Verifying => json!({ "state": state.label() }),
        GateState::Authorized(session) => json!({
            "state": state.label(),
            "user_id": session.user_id,
            "expires_at": session.expires_at,
        }),
        GateState::Unauthorized => json!({ "state": state.label(), "redirect": login_path }),
    };
    Event::default().event(state.label()).data(data.to_string())
}

// --- Admin Editor Handlers ---

/// list_posts
///
/// [Admin Route] Every post, newest first.
#[utoipa::path(
    get,
    path = "/admin/posts",
    responses(
        (status = 200, description = "All posts", body = [Post]),
        (status = 502, description = "Content store request failed")
    )
)]
pub async fn list_posts(State(state): State<AppState>) -> ApiResult<Json<Vec<Post>>> {
    Ok(Json(state.editor.list().await?))
}

/// save_post
///
/// [Admin Route] Saves the editor draft: updates the row named by `id`, or inserts a new row
/// when `id` is absent.
#[utoipa::path(
    post,
    path = "/admin/posts",
    request_body = PostDraft,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 200, description = "Updated", body = Post),
        (status = 400, description = "Title or slug missing"),
        (status = 404, description = "No post with this id"),
        (status = 409, description = "Slug already in use"),
        (status = 502, description = "Content store request failed")
    )
)]
pub async fn save_post(
    State(state): State<AppState>,
    Json(draft): Json<PostDraft>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let (post, action) = state.editor.save(&draft).await?;
    let status = match action {
        SaveAction::Inserted => StatusCode::CREATED,
        SaveAction::Updated => StatusCode::OK,
    };
    Ok((status, Json(post)))
}

/// delete_post
///
/// [Admin Route] Deletes one post after explicit confirmation and returns the refetched list.
/// Answers 204 when the row is gone but the list could not be refetched.
#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID"), DeleteParams),
    responses(
        (status = 200, description = "Deleted; remaining posts", body = [Post]),
        (status = 204, description = "Deleted; remaining posts unavailable"),
        (status = 404, description = "No post with this id"),
        (status = 428, description = "Confirmation missing; nothing deleted"),
        (status = 502, description = "Content store request failed")
    )
)]
pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Response> {
    let response = match state.editor.delete(id, params.is_confirmed()).await? {
        Some(posts) => Json(posts).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    };
    Ok(response)
}
