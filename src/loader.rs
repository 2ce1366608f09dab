use crate::{
    fallback,
    landing::LandingView,
    models::{Category, LandingSnapshot, SlotSource, StoryCard},
    repository::RepositoryState,
};

/// Size of the quick-read grid.
pub const QUICK_ITEM_LIMIT: i64 = 4;

/// Result of one remote fetch, before the fallback policy is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Success(T),
    Empty,
    Failure(String),
}

/// resolve_slot
///
/// The fallback policy for one landing slot: `Success` keeps the live data, `Empty` and
/// `Failure` both yield the fallback. The two are logged at different levels so an empty
/// table can still be told apart from a broken backend.
pub fn resolve_slot<T>(
    slot: &'static str,
    outcome: FetchOutcome<T>,
    fallback: impl FnOnce() -> T,
) -> (T, SlotSource) {
    match outcome {
        FetchOutcome::Success(data) => (data, SlotSource::Live),
        FetchOutcome::Empty => {
            tracing::info!(slot, "no live content, serving fallback");
            (fallback(), SlotSource::Fallback)
        }
        FetchOutcome::Failure(reason) => {
            tracing::warn!(slot, %reason, "content fetch failed, serving fallback");
            (fallback(), SlotSource::Fallback)
        }
    }
}

/// Both landing slots after the fallback policy.
#[derive(Debug, Clone, PartialEq)]
pub struct LandingContent {
    pub featured: StoryCard,
    pub featured_source: SlotSource,
    pub quick: Vec<StoryCard>,
    pub quick_source: SlotSource,
}

/// ContentLoader
///
/// Fetches the featured story and the quick grid from the content store. Never fails:
/// whatever the store does, the caller gets complete content.
pub struct ContentLoader {
    repo: RepositoryState,
    featured_category: Category,
}

impl ContentLoader {
    pub fn new(repo: RepositoryState, featured_category: Category) -> Self {
        Self {
            repo,
            featured_category,
        }
    }

    pub fn featured_category(&self) -> Category {
        self.featured_category
    }

    /// Newest post of the featured category.
    pub async fn fetch_featured(&self) -> FetchOutcome<StoryCard> {
        match self.repo.fetch_featured(self.featured_category).await {
            Ok(Some(post)) => FetchOutcome::Success(post.into()),
            Ok(None) => FetchOutcome::Empty,
            Err(e) => FetchOutcome::Failure(e.to_string()),
        }
    }

    /// Up to four newest posts outside the featured category.
    pub async fn fetch_quick(&self) -> FetchOutcome<Vec<StoryCard>> {
        match self
            .repo
            .fetch_quick(self.featured_category, QUICK_ITEM_LIMIT)
            .await
        {
            Ok(posts) if posts.is_empty() => FetchOutcome::Empty,
            Ok(posts) => FetchOutcome::Success(posts.into_iter().map(StoryCard::from).collect()),
            Err(e) => FetchOutcome::Failure(e.to_string()),
        }
    }

    /// Runs both fetches concurrently and applies the fallback policy to each.
    pub async fn load(&self) -> LandingContent {
        let (featured, quick) = tokio::join!(self.fetch_featured(), self.fetch_quick());
        let category = self.featured_category;
        let (featured, featured_source) =
            resolve_slot("featured", featured, || fallback::featured(category));
        let (quick, quick_source) = resolve_slot("quick", quick, || fallback::quick(category));

        LandingContent {
            featured,
            featured_source,
            quick,
            quick_source,
        }
    }

    /// refresh
    ///
    /// Like `load`, but writes each slot into the view as soon as its own fetch settles.
    /// Overlapping refreshes therefore resolve per slot: the last write to land wins.
    /// Returns the snapshot published once both slots have settled.
    pub async fn refresh(&self, view: &LandingView) -> LandingSnapshot {
        let category = self.featured_category;
        let featured = async {
            let (story, source) = resolve_slot("featured", self.fetch_featured().await, || {
                fallback::featured(category)
            });
            view.set_featured(story, source);
        };
        let quick = async {
            let (items, source) = resolve_slot("quick", self.fetch_quick().await, || {
                fallback::quick(category)
            });
            view.set_quick(items, source);
        };

        tokio::join!(featured, quick);
        view.publish()
    }
}
