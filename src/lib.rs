use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod backend;
pub mod config;
pub mod editor;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod landing;
pub mod loader;
pub mod models;
pub mod realtime;
pub mod repository;

// Routing segregation (Public, Admin).
pub mod routes;
use routes::{admin, public};

// --- Public Re-exports ---

pub use backend::Backend;
pub use config::AppConfig;
pub use identity::IdentityState;
pub use repository::{PostgresRepository, RepositoryState};

use editor::PostEditor;
use landing::LandingView;
use loader::ContentLoader;

/// ApiDoc
///
/// Auto-generated OpenAPI document, served at `/api-docs/openapi.json` and browsable through
/// the Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_landing, handlers::refresh_landing, handlers::landing_events,
        handlers::get_post, handlers::sign_in, handlers::sign_out, handlers::get_session,
        handlers::session_events, handlers::list_posts, handlers::save_post,
        handlers::delete_post
    ),
    components(
        schemas(
            models::Post, models::PostDraft, models::Category, models::StoryCard,
            models::SlotSource, models::LandingSnapshot, models::Session,
            models::SignInRequest, models::SessionResponse,
        )
    ),
    tags(
        (name = "scroll-portal", description = "3AMSCROLL content and admin API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of everything a request may need. All members are shared
/// handles, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Content store (live Postgres or disabled).
    pub repo: RepositoryState,
    /// Identity provider (live Supabase or disabled).
    pub identity: IdentityState,
    /// Fetches landing content and applies the fallback policy.
    pub loader: Arc<ContentLoader>,
    /// The landing content currently served.
    pub landing: Arc<LandingView>,
    /// Admin record operations.
    pub editor: Arc<PostEditor>,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(backend: &Backend, config: AppConfig) -> Self {
        Self {
            repo: backend.repo.clone(),
            identity: backend.identity.clone(),
            loader: Arc::new(ContentLoader::new(
                backend.repo.clone(),
                config.featured_category,
            )),
            landing: Arc::new(LandingView::for_category(config.featured_category)),
            editor: Arc::new(PostEditor::new(backend.repo.clone())),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and registers the
/// application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: No middleware applied.
        .merge(public::public_routes())
        // Admin Routes: every route waits for the session gate, which either hands the
        // resolved session to the handler or redirects to the sign-in page.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::session_gate,
            )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing, correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request tracing span, tagged with the `x-request-id` header so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
