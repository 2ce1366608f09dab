use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::{
    config::AppConfig,
    identity::{DisabledIdentity, IdentityState, SupabaseIdentity},
    realtime::{ChangeFeedState, LocalChangeFeed, PgChangeFeed},
    repository::{DisabledRepository, PostgresRepository, RepositoryState},
};

/// Backend
///
/// The three external capabilities, selected once at startup. Each one is either live or a
/// disabled stand-in; a missing setting never aborts startup.
#[derive(Clone)]
pub struct Backend {
    pub repo: RepositoryState,
    pub identity: IdentityState,
    pub feed: ChangeFeedState,
}

impl Backend {
    /// from_config
    ///
    /// Builds the live store and change feed when `DATABASE_URL` is set, and the live identity
    /// provider when all Supabase settings are present. The pool connects lazily, so an
    /// unreachable database surfaces as failed fetches (and fallback content), not as a crash.
    pub fn from_config(config: &AppConfig) -> Self {
        let pool = config.database_url.as_deref().and_then(|url| {
            PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(url)
                .map_err(|e| tracing::warn!("DATABASE_URL rejected ({e}); content store disabled"))
                .ok()
        });

        let (repo, feed): (RepositoryState, ChangeFeedState) = match pool {
            Some(pool) => (
                Arc::new(PostgresRepository::new(pool.clone())),
                Arc::new(PgChangeFeed::new(pool, config.change_channel.clone())),
            ),
            None => {
                tracing::warn!("content store not configured; serving fallback content");
                (Arc::new(DisabledRepository), Arc::new(LocalChangeFeed::new()))
            }
        };

        let identity: IdentityState = match &config.supabase {
            Some(supabase) => Arc::new(SupabaseIdentity::new(supabase)),
            None => {
                tracing::warn!("identity provider not configured; admin surface is closed");
                Arc::new(DisabledIdentity)
            }
        };

        Self {
            repo,
            identity,
            feed,
        }
    }

    /// Everything disabled. Landing content is pure fallback and the admin gate stays closed.
    pub fn disabled() -> Self {
        Self {
            repo: Arc::new(DisabledRepository),
            identity: Arc::new(DisabledIdentity),
            feed: Arc::new(LocalChangeFeed::new()),
        }
    }
}
