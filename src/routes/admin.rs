use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Admin Router Module
///
/// The record editor and session endpoints of the admin panel.
///
/// Access Control:
/// `create_router` wraps this whole router in the `session_gate` middleware. No handler here
/// runs before the gate has resolved the caller's session, and none runs without one; handlers
/// may rely on a `Session` request extension being present.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/session
        // Who is signed in.
        .route("/session", get(handlers::get_session))
        // GET /admin/session/events
        // SSE: gate transitions while the panel is open (sign-out elsewhere, expiry).
        .route("/session/events", get(handlers::session_events))
        // GET/POST /admin/posts
        // List all posts (newest first) / save a draft (insert or update by id).
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::save_post),
        )
        // DELETE /admin/posts/{id}?confirm=true
        // Deletes after explicit confirmation and returns the refetched list.
        .route("/posts/{id}", delete(handlers::delete_post))
}
