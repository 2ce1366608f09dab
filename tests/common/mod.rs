#![allow(dead_code)]

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, response::Response};
use chrono::{Duration, Utc};
use scroll_portal::{
    AppConfig, AppState, Backend, create_router,
    error::{IdentityError, StoreError},
    identity::{IdentityProvider, SessionEvent, SessionSubscription},
    models::{Category, Post, PostDraft, Session},
    realtime::LocalChangeFeed,
    repository::Repository,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::sync::{Notify, broadcast};
use tower::ServiceExt;
use uuid::Uuid;

// --- IN-MEMORY REPOSITORY ---

// Stand-in for the posts table. Failure switches let tests break one read path at a time;
// call counters let them prove that a remote call did (or did not) happen. Featured fetches
// can be held open one by one to line up overlapping loads.
#[derive(Default)]
pub struct InMemoryRepository {
    posts: Mutex<Vec<Post>>,
    featured_holds: Mutex<VecDeque<Arc<Notify>>>,
    pub fail_featured: AtomicBool,
    pub fail_quick: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_writes: AtomicBool,
    pub featured_calls: AtomicUsize,
    pub quick_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl InMemoryRepository {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        let repo = Self::default();
        *repo.posts.lock().unwrap() = posts;
        repo
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn add(&self, post: Post) {
        self.posts.lock().unwrap().push(post);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Queues a hold: the next featured fetch waits until the returned handle is notified,
    /// then reads the store.
    pub fn hold_featured(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.featured_holds.lock().unwrap().push_back(release.clone());
        release
    }

    /// Polls until `counter` reaches `expected`, failing the test after two seconds.
    pub async fn wait_for_calls(counter: &AtomicUsize, expected: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("store call never happened");
    }

    fn failure() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }

    fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }

    fn slug_taken(posts: &[Post], slug: &str, except: Option<Uuid>) -> bool {
        posts
            .iter()
            .any(|post| post.slug == slug && Some(post.id) != except)
    }
}

fn apply_draft(post: &mut Post, draft: &PostDraft) {
    post.title = draft.title.clone();
    post.slug = draft.slug.clone();
    post.category = draft.category;
    post.image_url = Some(draft.image_url.clone());
    post.excerpt = Some(draft.excerpt.clone());
    post.content = Some(draft.content.clone());
    post.reading_time = Some(draft.reading_time.clone());
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn fetch_featured(&self, category: Category) -> Result<Option<Post>, StoreError> {
        let hold = self.featured_holds.lock().unwrap().pop_front();
        self.featured_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = hold {
            release.notified().await;
        }
        if self.fail_featured.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        let posts = Self::newest_first(self.posts());
        Ok(posts.into_iter().find(|post| post.category == category))
    }

    async fn fetch_quick(&self, exclude: Category, limit: i64) -> Result<Vec<Post>, StoreError> {
        self.quick_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_quick.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        let posts = Self::newest_first(self.posts());
        Ok(posts
            .into_iter()
            .filter(|post| post.category != exclude)
            .take(limit as usize)
            .collect())
    }

    async fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.posts().into_iter().find(|post| post.slug == slug))
    }

    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        Ok(Self::newest_first(self.posts()))
    }

    async fn insert_post(&self, draft: &PostDraft) -> Result<Post, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        let mut posts = self.posts.lock().unwrap();
        if Self::slug_taken(&posts, &draft.slug, None) {
            return Err(StoreError::DuplicateSlug(draft.slug.clone()));
        }
        let mut post = Post {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            ..Post::default()
        };
        apply_draft(&mut post, draft);
        posts.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: Uuid, draft: &PostDraft) -> Result<Post, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        let mut posts = self.posts.lock().unwrap();
        if Self::slug_taken(&posts, &draft.slug, Some(id)) {
            return Err(StoreError::DuplicateSlug(draft.slug.clone()));
        }
        let post = posts
            .iter_mut()
            .find(|post| post.id == id)
            .ok_or(StoreError::NotFound)?;
        apply_draft(post, draft);
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::failure());
        }
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|post| post.id != id);
        Ok(posts.len() < before)
    }
}

/// A post created `minutes_ago` minutes in the past.
pub fn post(title: &str, slug: &str, category: Category, minutes_ago: i64) -> Post {
    Post {
        id: Uuid::new_v4(),
        title: title.to_string(),
        slug: slug.to_string(),
        category,
        image_url: Some(format!("https://img.example/{slug}.jpg")),
        excerpt: Some(format!("About {title}")),
        content: Some("Body".to_string()),
        reading_time: Some("4 min read".to_string()),
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        views: 0,
    }
}

// --- SCRIPTED IDENTITY PROVIDER ---

pub const GOOD_PASSWORD: &str = "correct-horse";

// Sessions are keyed by access token. When constructed with `delayed`, every session lookup
// blocks until the test releases it, which makes the "verifying" window observable.
pub struct StubIdentity {
    sessions: Mutex<HashMap<String, Session>>,
    release: Option<Arc<Notify>>,
    events: broadcast::Sender<SessionEvent>,
    pub get_session_calls: AtomicUsize,
}

impl Default for StubIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            sessions: Mutex::new(HashMap::new()),
            release: None,
            events,
            get_session_calls: AtomicUsize::new(0),
        }
    }
}

impl StubIdentity {
    pub fn delayed() -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let identity = Self {
            release: Some(release.clone()),
            ..Self::default()
        };
        (identity, release)
    }

    /// Registers a session valid for the next hour.
    pub fn add_session(&self, token: &str) -> Session {
        self.add_session_expiring(token, Utc::now() + Duration::hours(1))
    }

    pub fn add_session_expiring(
        &self,
        token: &str,
        expires_at: chrono::DateTime<Utc>,
    ) -> Session {
        let session = Session {
            user_id: Uuid::new_v4(),
            email: Some("admin@3amscroll.test".to_string()),
            expires_at,
            access_token: token.to_string(),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(token.to_string(), session.clone());
        session
    }

    /// Ends a session elsewhere (another tab, the provider's dashboard).
    pub fn revoke(&self, token: &str) {
        let removed = self.sessions.lock().unwrap().remove(token);
        if let Some(session) = removed {
            let _ = self.events.send(SessionEvent::SignedOut {
                user_id: session.user_id,
            });
        }
    }

    pub fn has_session(&self, token: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(token)
    }

    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    pub fn calls(identity: &StubIdentity) -> usize {
        identity.get_session_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, IdentityError> {
        if password != GOOD_PASSWORD {
            return Err(IdentityError::InvalidCredentials(
                "Invalid login credentials".to_string(),
            ));
        }
        let mut session = self.add_session(&format!("token-for-{email}"));
        session.email = Some(email.to_string());
        let _ = self.events.send(SessionEvent::SignedIn {
            user_id: session.user_id,
        });
        Ok(session)
    }

    async fn get_session(&self, access_token: &str) -> Result<Session, IdentityError> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.release {
            release.notified().await;
        }
        self.sessions
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or(IdentityError::InvalidToken)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), IdentityError> {
        if !self.has_session(access_token) {
            return Err(IdentityError::InvalidToken);
        }
        self.revoke(access_token);
        Ok(())
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }
}

// --- APP HELPERS ---

pub fn backend(repo: Arc<InMemoryRepository>, identity: Arc<StubIdentity>) -> Backend {
    Backend {
        repo,
        identity,
        feed: Arc::new(LocalChangeFeed::new()),
    }
}

pub fn app_state(repo: Arc<InMemoryRepository>, identity: Arc<StubIdentity>) -> AppState {
    AppState::new(&backend(repo, identity), AppConfig::default())
}

pub fn router(repo: Arc<InMemoryRepository>, identity: Arc<StubIdentity>) -> Router {
    create_router(app_state(repo, identity))
}

pub async fn send(router: Router, request: Request<Body>) -> Response {
    router.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
