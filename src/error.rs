use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// A category label outside the fixed set.
#[derive(Debug, thiserror::Error)]
#[error("unknown category: {0:?}")]
pub struct UnknownCategory(pub String);

/// Startup configuration errors. Missing backend settings are not errors (they select the
/// disabled backend); only values that are present but unusable end up here.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FEATURED_CATEGORY: {0}")]
    FeaturedCategory(#[from] UnknownCategory),

    #[error("LOGIN_PATH must be an absolute path, got {0:?}")]
    LoginPath(String),
}

/// Content store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("content store is not configured")]
    NotConfigured,

    #[error("post not found")]
    NotFound,

    #[error("slug already in use: {0}")]
    DuplicateSlug(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classifies a failed insert/update, recognising unique-slug violations.
    pub fn from_write(err: sqlx::Error, slug: &str) -> Self {
        let unique_violation = err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_unique_violation());

        if unique_violation {
            StoreError::DuplicateSlug(slug.to_string())
        } else {
            StoreError::Database(err)
        }
    }
}

/// Identity provider failures.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider is not configured")]
    NotConfigured,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("access token is invalid or expired")]
    InvalidToken,

    #[error("session has been signed out")]
    Revoked,

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Change-notification channel failures.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("change feed is not configured")]
    NotConfigured,

    #[error("failed to listen for changes: {0}")]
    Listen(#[from] sqlx::Error),
}

/// Realtime refresher lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("a realtime refresher is already mounted on this landing view")]
    AlreadyMounted,
}

/// Admin editor failures.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("deletion requires explicit confirmation")]
    ConfirmationRequired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// ApiError
///
/// The HTTP-facing error taxonomy. Every variant renders as
/// `{"error": {"code": ..., "message": ...}}` so the sign-in form and the admin panel can
/// show the message inline.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("deletion requires explicit confirmation")]
    ConfirmationRequired,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::ConfirmationRequired => {
                (StatusCode::PRECONDITION_REQUIRED, "CONFIRMATION_REQUIRED")
            }
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotConfigured => {
                ApiError::Unavailable("Content store not configured".to_string())
            }
            StoreError::NotFound => ApiError::NotFound("Post not found".to_string()),
            StoreError::DuplicateSlug(slug) => {
                ApiError::Conflict(format!("Slug '{slug}' is already in use"))
            }
            StoreError::Database(e) => {
                tracing::error!("content store error: {:?}", e);
                ApiError::Upstream("Content store request failed".to_string())
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotConfigured => {
                ApiError::Unavailable("Identity provider not configured".to_string())
            }
            IdentityError::InvalidCredentials(message) => ApiError::Unauthorized(message),
            IdentityError::InvalidToken | IdentityError::Revoked => {
                ApiError::Unauthorized("Session is no longer valid".to_string())
            }
            IdentityError::Transport(e) => {
                tracing::error!("identity provider unreachable: {:?}", e);
                ApiError::Upstream("Identity provider unreachable".to_string())
            }
            IdentityError::Provider(message) => ApiError::Upstream(message),
        }
    }
}

impl From<EditorError> for ApiError {
    fn from(err: EditorError) -> Self {
        match err {
            EditorError::MissingField(field) => ApiError::BadRequest(format!("{field} is required")),
            EditorError::ConfirmationRequired => ApiError::ConfirmationRequired,
            EditorError::Store(e) => e.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
