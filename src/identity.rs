use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::{config::SupabaseConfig, error::IdentityError, models::Session};

/// Audience Supabase stamps on tokens of signed-in users.
const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// Claims
///
/// The payload of a Supabase access token. Validated (signature, expiry, audience) on every
/// protected request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id in `auth.users`.
    pub sub: Uuid,
    /// Expiration time, seconds since the epoch.
    pub exp: usize,
    /// Issued at, seconds since the epoch.
    pub iat: usize,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// A session-change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn { user_id: Uuid },
    SignedOut { user_id: Uuid },
    /// The subscriber fell behind and missed notifications; treat as "something changed".
    Lagged { missed: u64 },
}

/// SessionSubscription
///
/// Handle returned by `IdentityProvider::subscribe`. Dropping it unsubscribes.
pub struct SessionSubscription {
    rx: Option<broadcast::Receiver<SessionEvent>>,
}

impl SessionSubscription {
    pub fn new(rx: broadcast::Receiver<SessionEvent>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A subscription that never yields, for providers without notifications.
    pub fn inert() -> Self {
        Self { rx: None }
    }

    /// Waits for the next notification. `None` once the provider has gone away.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };

        match rx.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(missed)) => Some(SessionEvent::Lagged { missed }),
            Err(RecvError::Closed) => {
                self.rx = None;
                None
            }
        }
    }
}

/// IdentityProvider Trait
///
/// The external identity provider's surface: credential exchange, session lookup, sign-out and
/// session-change notifications. Selected once at startup (live Supabase or disabled).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchanges email/password for a session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError>;

    /// Resolves the session an access token stands for.
    async fn get_session(&self, access_token: &str) -> Result<Session, IdentityError>;

    /// Ends the session behind an access token.
    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Subscribes to session-change notifications until the handle is dropped.
    fn subscribe(&self) -> SessionSubscription;
}

/// IdentityState
///
/// The concrete type used to share the identity provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;

/// Minimal shape of GoTrue's password-grant response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// GoTrue reports errors under different keys depending on the endpoint and version.
#[derive(Deserialize, Default)]
struct GoTrueError {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl GoTrueError {
    fn into_message(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .unwrap_or_else(|| "Sign-in failed".to_string())
    }
}

/// SupabaseIdentity
///
/// Live identity provider backed by Supabase Auth (GoTrue).
///
/// - Sign-in uses the password grant of `/auth/v1/token`.
/// - Sessions are resolved locally by verifying the HS256 access token with the project's JWT
///   secret, so protected requests cost no network round trip.
/// - Sign-out calls `/auth/v1/logout` and also revokes the token locally until it expires,
///   because the provider cannot recall an access token it already issued.
pub struct SupabaseIdentity {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    decoding_key: DecodingKey,
    events: broadcast::Sender<SessionEvent>,
    revoked: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SupabaseIdentity {
    pub fn new(config: &SupabaseConfig) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            events,
            revoked: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live session-change subscriptions.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// verify_token
    ///
    /// Decodes and validates an access token: signature, expiry and the `authenticated`
    /// audience. Any failure is reported as `IdentityError::InvalidToken`.
    pub fn verify_token(&self, token: &str) -> Result<Session, IdentityError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("access token expired"),
                other => tracing::debug!("access token rejected: {:?}", other),
            }
            IdentityError::InvalidToken
        })?;

        let claims = token_data.claims;
        let expires_at = i64::try_from(claims.exp)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or(IdentityError::InvalidToken)?;

        Ok(Session {
            user_id: claims.sub,
            email: claims.email,
            expires_at,
            access_token: token.to_string(),
        })
    }

    fn is_revoked(&self, token: &str) -> bool {
        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        // Expired tokens fail verification anyway.
        revoked.retain(|_, expires_at| *expires_at > now);
        revoked.contains_key(token)
    }

    fn revoke(&self, session: &Session) {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.access_token.clone(), session.expires_at);
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GoTrueError>()
                .await
                .unwrap_or_default()
                .into_message();
            // 400/401 is GoTrue's answer to bad credentials; anything else is the provider's fault.
            return Err(if status.is_client_error() {
                IdentityError::InvalidCredentials(message)
            } else {
                IdentityError::Provider(message)
            });
        }

        let token = response.json::<TokenResponse>().await?;
        let session = self.verify_token(&token.access_token).map_err(|_| {
            IdentityError::Provider(
                "Issued access token failed verification; check SUPABASE_JWT_SECRET".to_string(),
            )
        })?;

        tracing::info!(user_id = %session.user_id, "admin signed in");
        self.notify(SessionEvent::SignedIn {
            user_id: session.user_id,
        });
        Ok(session)
    }

    async fn get_session(&self, access_token: &str) -> Result<Session, IdentityError> {
        if self.is_revoked(access_token) {
            return Err(IdentityError::Revoked);
        }
        self.verify_token(access_token)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        let session = self.verify_token(access_token)?;
        self.revoke(&session);

        let url = format!("{}/auth/v1/logout", self.base_url);
        let remote = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await;

        // The local revocation already ended the session for this service.
        match remote {
            Ok(response) if !response.status().is_success() => tracing::warn!(
                status = %response.status(),
                "provider sign-out rejected; session revoked locally"
            ),
            Err(e) => tracing::warn!("provider sign-out failed: {e}; session revoked locally"),
            Ok(_) => {}
        }

        tracing::info!(user_id = %session.user_id, "admin signed out");
        self.notify(SessionEvent::SignedOut {
            user_id: session.user_id,
        });
        Ok(())
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }
}

/// DisabledIdentity
///
/// Selected when Supabase is not configured. Every operation fails with
/// `IdentityError::NotConfigured`, which the session gate treats as "no session".
#[derive(Clone, Copy, Default)]
pub struct DisabledIdentity;

#[async_trait]
impl IdentityProvider for DisabledIdentity {
    async fn sign_in_with_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Session, IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    async fn get_session(&self, _access_token: &str) -> Result<Session, IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), IdentityError> {
        Err(IdentityError::NotConfigured)
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::inert()
    }
}
