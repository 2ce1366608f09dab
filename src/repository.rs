use crate::{
    error::StoreError,
    models::{Category, Post, PostDraft},
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for every operation on the external content store. Handlers,
/// the content loader and the admin editor only see this trait, so the Postgres implementation,
/// the disabled variant and test doubles are interchangeable.
///
/// Unlike a best-effort read path, every method reports failure explicitly: the content loader
/// turns errors into fallback data itself, and the admin surface needs them to tell the operator.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Landing Reads ---
    // Newest post in the given category, if any.
    async fn fetch_featured(&self, category: Category) -> Result<Option<Post>, StoreError>;
    // Up to `limit` newest posts outside the given category.
    async fn fetch_quick(&self, exclude: Category, limit: i64) -> Result<Vec<Post>, StoreError>;

    // --- Reader Reads ---
    async fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>, StoreError>;

    // --- Admin ---
    // All posts, newest first.
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError>;
    async fn insert_post(&self, draft: &PostDraft) -> Result<Post, StoreError>;
    // Fails with `StoreError::NotFound` when no row has this id.
    async fn update_post(&self, id: Uuid, draft: &PostDraft) -> Result<Post, StoreError>;
    // Returns true if a row was deleted.
    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the content store across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const POST_COLUMNS: &str =
    "id, title, slug, category, image_url, excerpt, content, reading_time, created_at, views";

/// PostgresRepository
///
/// The live implementation, talking to the `posts` table of the hosted Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// fetch_featured
    ///
    /// "Read one row where category = featured label". Ordered so repeated loads pick the same row.
    async fn fetch_featured(&self, category: Category) -> Result<Option<Post>, StoreError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE category = $1 ORDER BY created_at DESC LIMIT 1"
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(category.label())
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    /// fetch_quick
    ///
    /// "Read up to N rows where category != featured label", newest first.
    async fn fetch_quick(&self, exclude: Category, limit: i64) -> Result<Vec<Post>, StoreError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE category <> $1 ORDER BY created_at DESC LIMIT $2"
        );
        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(exclude.label())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    async fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = $1");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC");
        let posts = sqlx::query_as::<_, Post>(&sql).fetch_all(&self.pool).await?;
        Ok(posts)
    }

    /// insert_post
    ///
    /// Inserts a new row. `id`, `created_at` and `views` come from the column defaults.
    /// A duplicate slug surfaces as `StoreError::DuplicateSlug`.
    async fn insert_post(&self, draft: &PostDraft) -> Result<Post, StoreError> {
        let sql = format!(
            r#"INSERT INTO posts (title, slug, category, image_url, excerpt, content, reading_time)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {POST_COLUMNS}"#
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(&draft.title)
            .bind(&draft.slug)
            .bind(draft.category.label())
            .bind(&draft.image_url)
            .bind(&draft.excerpt)
            .bind(&draft.content)
            .bind(&draft.reading_time)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_write(e, &draft.slug))
    }

    /// update_post
    ///
    /// Full replacement of the editable columns of one row, matched by id.
    async fn update_post(&self, id: Uuid, draft: &PostDraft) -> Result<Post, StoreError> {
        let sql = format!(
            r#"UPDATE posts
               SET title = $2, slug = $3, category = $4, image_url = $5,
                   excerpt = $6, content = $7, reading_time = $8
               WHERE id = $1
               RETURNING {POST_COLUMNS}"#
        );
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(&draft.title)
            .bind(&draft.slug)
            .bind(draft.category.label())
            .bind(&draft.image_url)
            .bind(&draft.excerpt)
            .bind(&draft.content)
            .bind(&draft.reading_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_write(e, &draft.slug))?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// DisabledRepository
///
/// Selected at startup when no database is configured. Every call fails fast with
/// `StoreError::NotConfigured` without touching the network, which the loader turns into
/// fallback content and the admin surface into a 503.
#[derive(Clone, Copy, Default)]
pub struct DisabledRepository;

#[async_trait]
impl Repository for DisabledRepository {
    async fn fetch_featured(&self, _category: Category) -> Result<Option<Post>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn fetch_quick(&self, _exclude: Category, _limit: i64) -> Result<Vec<Post>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn get_post_by_slug(&self, _slug: &str) -> Result<Option<Post>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn insert_post(&self, _draft: &PostDraft) -> Result<Post, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn update_post(&self, _id: Uuid, _draft: &PostDraft) -> Result<Post, StoreError> {
        Err(StoreError::NotConfigured)
    }

    async fn delete_post(&self, _id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::NotConfigured)
    }
}
