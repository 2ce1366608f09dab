use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that need no session. The landing endpoints never surface a store failure to
/// the reader; they serve fallback content instead.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // GET /api/landing
        // Featured story plus quick grid, live or fallback per slot.
        .route("/api/landing", get(handlers::get_landing))
        // POST /api/landing/refresh
        // Manual re-fetch of both slots.
        .route("/api/landing/refresh", post(handlers::refresh_landing))
        // GET /api/landing/events
        // SSE: a snapshot after every refresh.
        .route("/api/landing/events", get(handlers::landing_events))
        // GET /api/posts/{slug}
        .route("/api/posts/{slug}", get(handlers::get_post))
        // --- Session ---
        // POST /auth/login
        // Password sign-in against the identity provider; sets the session cookie.
        .route("/auth/login", post(handlers::sign_in))
        // POST /auth/logout
        // Ends the session and redirects to the sign-in page.
        .route("/auth/logout", post(handlers::sign_out))
}
