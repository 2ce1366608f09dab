use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use crate::{
    config::AppConfig,
    gate::{self, GateState},
    identity::IdentityState,
};

/// Cookie carrying the Supabase access token for browser clients.
pub const ACCESS_TOKEN_COOKIE: &str = "sb-access-token";

/// AccessToken Extractor
///
/// The raw access token presented with a request, if any. Looks at the
/// `Authorization: Bearer ...` header first, then at the `sb-access-token` cookie.
/// Never rejects: an absent token is a valid input to the session gate.
#[derive(Debug, Clone, Default)]
pub struct AccessToken(pub Option<String>);

impl<S> FromRequestParts<S> for AccessToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        if bearer.is_some() {
            return Ok(AccessToken(bearer));
        }

        let cookie = CookieJar::from_headers(&parts.headers)
            .get(ACCESS_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty());

        Ok(AccessToken(cookie))
    }
}

/// session_gate
///
/// Middleware wrapping every admin route.
///
/// The handler runs only after the identity provider has answered and only for an
/// `Authorized` session, which is handed to it as a request extension. Anything else is
/// answered with a redirect to the sign-in page instead of the guarded response.
pub async fn session_gate(
    State(identity): State<IdentityState>,
    State(config): State<AppConfig>,
    AccessToken(token): AccessToken,
    mut request: Request,
    next: Next,
) -> Response {
    match gate::resolve(identity.as_ref(), token.as_deref()).await {
        GateState::Authorized(session) => {
            request.extensions_mut().insert(session);
            let mut response = next.run(request).await;
            // Admin pages must not be served from history after sign-out.
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        _ => redirect_to_sign_in(&config.login_path),
    }
}

/// `303 See Other` to the sign-in path, marked uncacheable so back-navigation cannot
/// resurrect the protected page.
pub fn redirect_to_sign_in(login_path: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, login_path.to_string()),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}
