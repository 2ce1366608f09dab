use uuid::Uuid;

use crate::{
    error::{EditorError, StoreError},
    models::{Post, PostDraft},
    repository::RepositoryState,
};

/// What a save did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    Inserted,
    Updated,
}

/// PostEditor
///
/// The admin panel's record operations. Writes go straight to the store and every mutation is
/// followed by a full refetch of the list; nothing is applied optimistically.
pub struct PostEditor {
    repo: RepositoryState,
}

impl PostEditor {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// All posts, newest first.
    pub async fn list(&self) -> Result<Vec<Post>, StoreError> {
        self.repo.list_posts().await
    }

    /// save
    ///
    /// Validates the draft, then updates the row named by `draft.id` or inserts a new one.
    /// Blank title or slug is rejected before any remote call.
    pub async fn save(&self, draft: &PostDraft) -> Result<(Post, SaveAction), EditorError> {
        if draft.title.trim().is_empty() {
            return Err(EditorError::MissingField("title"));
        }
        if draft.slug.trim().is_empty() {
            return Err(EditorError::MissingField("slug"));
        }

        let saved = match draft.id {
            Some(id) => {
                let post = self.repo.update_post(id, draft).await?;
                tracing::info!(%id, slug = %post.slug, "post updated");
                (post, SaveAction::Updated)
            }
            None => {
                let post = self.repo.insert_post(draft).await?;
                tracing::info!(id = %post.id, slug = %post.slug, "post created");
                (post, SaveAction::Inserted)
            }
        };
        Ok(saved)
    }

    /// delete
    ///
    /// Deletes one post and returns the refetched list. Without explicit confirmation nothing
    /// is sent to the store.
    ///
    /// The delete is reported as done once the row is gone: if only the refetch fails, the
    /// list is `None` instead of an error.
    pub async fn delete(
        &self,
        id: Uuid,
        confirmed: bool,
    ) -> Result<Option<Vec<Post>>, EditorError> {
        if !confirmed {
            return Err(EditorError::ConfirmationRequired);
        }

        if !self.repo.delete_post(id).await? {
            return Err(StoreError::NotFound.into());
        }
        tracing::info!(%id, "post deleted");

        match self.repo.list_posts().await {
            Ok(posts) => Ok(Some(posts)),
            Err(e) => {
                tracing::warn!(%id, "post deleted but the list could not be refetched: {e}");
                Ok(None)
            }
        }
    }
}
