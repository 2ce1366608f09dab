use std::env;

use crate::{error::ConfigError, models::Category};

/// AppConfig
///
/// Holds the application's entire configuration state, loaded once at startup and shared
/// read-only through the application state.
///
/// The hosted backend is optional: a missing `DATABASE_URL` or an incomplete set of Supabase
/// variables is not an error. It is recorded as `None` and the backend assembly picks the
/// disabled variants (fallback content, closed admin gate) instead of crashing.
#[derive(Clone)]
pub struct AppConfig {
    // Runtime environment marker. Controls the log format.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Postgres connection string for the posts table (Supabase's database in production).
    pub database_url: Option<String>,
    // Supabase identity settings; `None` unless all three variables are set.
    pub supabase: Option<SupabaseConfig>,
    // The category whose newest post fills the landing page's featured slot.
    pub featured_category: Category,
    // Where unauthorized admin requests are redirected.
    pub login_path: String,
    // Postgres NOTIFY channel carrying posts-table change events.
    pub change_channel: String,
}

/// SupabaseConfig
///
/// Connection details for the hosted identity provider (GoTrue).
#[derive(Clone)]
pub struct SupabaseConfig {
    // Project URL, without trailing slash (e.g. https://xyz.supabase.co).
    pub url: String,
    // Public anon key sent as the `apikey` header.
    pub anon_key: String,
    // Secret used to verify the HS256 access tokens Supabase issues.
    pub jwt_secret: String,
}

/// Env
///
/// Defines the runtime context: human-readable logs locally, JSON logs in production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_CHANGE_CHANNEL: &str = "posts_changes";

impl Default for AppConfig {
    /// default
    ///
    /// An unconfigured instance: no database, no identity provider. Used by tests and as the
    /// baseline `load()` fills in.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            supabase: None,
            featured_category: Category::default(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            change_channel: DEFAULT_CHANGE_CHANNEL.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment (call `dotenv` first).
    ///
    /// # Errors
    /// Fails only on values that are present but unusable, such as a `FEATURED_CATEGORY`
    /// outside the fixed category set.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match non_empty("APP_ENV").as_deref() {
            Some("production") => Env::Production,
            _ => Env::Local,
        };

        // All three Supabase values are needed to sign users in and to verify their tokens.
        let supabase = match (
            non_empty("SUPABASE_URL"),
            non_empty("SUPABASE_KEY"),
            non_empty("SUPABASE_JWT_SECRET"),
        ) {
            (Some(url), Some(anon_key), Some(jwt_secret)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
                jwt_secret,
            }),
            _ => None,
        };

        let featured_category = match non_empty("FEATURED_CATEGORY") {
            Some(label) => label.parse()?,
            None => Category::default(),
        };

        let login_path = non_empty("LOGIN_PATH").unwrap_or_else(|| DEFAULT_LOGIN_PATH.to_string());
        if !login_path.starts_with('/') {
            return Err(ConfigError::LoginPath(login_path));
        }

        Ok(Self {
            env,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: non_empty("DATABASE_URL"),
            supabase,
            featured_category,
            login_path,
            change_channel: non_empty("POSTS_CHANGE_CHANNEL")
                .unwrap_or_else(|| DEFAULT_CHANGE_CHANNEL.to_string()),
        })
    }

    /// True when a content store (and with it the change feed) can be reached.
    pub fn store_configured(&self) -> bool {
        self.database_url.is_some()
    }

    /// True when admin sign-in is possible.
    pub fn identity_configured(&self) -> bool {
        self.supabase.is_some()
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
