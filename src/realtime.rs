use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, postgres::PgListener};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    error::{FeedError, RefreshError},
    landing::LandingView,
    loader::ContentLoader,
    models::LandingSnapshot,
};

/// Kind of row change reported by the database trigger (`TG_OP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

/// ChangeEvent
///
/// One change notification. The refresher reloads everything on any event, so the payload is
/// informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub table: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
        }
    }

    /// Parses a NOTIFY payload such as `{"type":"INSERT","table":"posts"}`. A payload that
    /// cannot be read still counts as a change.
    pub fn from_payload(payload: &str) -> Self {
        serde_json::from_str(payload).unwrap_or_else(|e| {
            tracing::debug!("unreadable change payload {payload:?}: {e}");
            Self::new(ChangeKind::Unknown, "")
        })
    }
}

/// ChangeSubscription
///
/// A live subscription to a change feed. Events are forwarded by a background task that
/// stops when the subscription is closed or dropped.
pub struct ChangeSubscription {
    rx: mpsc::Receiver<ChangeEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, forwarder: JoinHandle<()>) -> Self {
        Self {
            rx,
            forwarder: Some(forwarder),
        }
    }

    /// Next change. `None` once the feed has stopped.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Stops the forwarder and waits until it has released the underlying listener.
    pub async fn close(mut self) {
        self.rx.close();
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            let _ = forwarder.await;
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

/// ChangeFeed Trait
///
/// Source of "the posts table changed" notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self) -> Result<ChangeSubscription, FeedError>;
}

/// ChangeFeedState
///
/// The concrete type used to share the change feed.
pub type ChangeFeedState = Arc<dyn ChangeFeed>;

const FORWARD_BUFFER: usize = 32;

/// PgChangeFeed
///
/// Listens on a Postgres NOTIFY channel filled by the `posts` table trigger.
pub struct PgChangeFeed {
    pool: PgPool,
    channel: String,
}

impl PgChangeFeed {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self) -> Result<ChangeSubscription, FeedError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        tracing::info!(channel = %self.channel, "listening for content changes");

        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        let forwarder = tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = listener.recv() => match notification {
                        Ok(notification) => {
                            let event = ChangeEvent::from_payload(notification.payload());
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::error!("change feed connection lost: {:?}", e);
                            break;
                        }
                    },
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(ChangeSubscription::new(rx, forwarder))
    }
}

/// LocalChangeFeed
///
/// In-process feed. Stands in for the database channel when no database is configured (it
/// then stays silent) and drives the refresher deterministically in tests.
#[derive(Clone)]
pub struct LocalChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for LocalChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FORWARD_BUFFER);
        Self { tx }
    }

    /// Publishes a change. Returns how many subscriptions received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(&self) -> Result<ChangeSubscription, FeedError> {
        let mut source = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);

        let forwarder = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    received = source.recv() => match received {
                        Ok(event) => event,
                        // Missed events collapse into one reload.
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            ChangeEvent::new(ChangeKind::Unknown, "")
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tx.closed() => break,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(ChangeSubscription::new(rx, forwarder))
    }
}

/// DisabledChangeFeed
///
/// A feed that refuses every subscription. The refresher mounts idle on it.
#[derive(Clone, Copy, Default)]
pub struct DisabledChangeFeed;

#[async_trait]
impl ChangeFeed for DisabledChangeFeed {
    async fn subscribe(&self) -> Result<ChangeSubscription, FeedError> {
        Err(FeedError::NotConfigured)
    }
}

/// RealtimeRefresher
///
/// Keeps a landing view fresh: on every change notification the active-readers counter is
/// bumped by a random 1..=3 and both slots are reloaded.
///
/// At most one refresher can be mounted per view. Unmounting stops the listener, releases the
/// feed subscription and marks the view unmounted, so a reload still in flight lands nowhere.
pub struct RealtimeRefresher {
    view: Arc<LandingView>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeRefresher {
    /// mount
    ///
    /// Claims the view's listener slot and subscribes to the feed.
    ///
    /// # Errors
    /// `RefreshError::AlreadyMounted` if another refresher holds the view. A feed that cannot be
    /// subscribed to is not an error: the refresher is mounted idle and the view keeps its
    /// current content.
    pub async fn mount(
        feed: ChangeFeedState,
        loader: Arc<ContentLoader>,
        view: Arc<LandingView>,
    ) -> Result<Self, RefreshError> {
        if !view.claim_listener() {
            return Err(RefreshError::AlreadyMounted);
        }

        let subscription = match feed.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!("realtime refresh unavailable: {e}");
                return Ok(Self {
                    view,
                    shutdown: None,
                    task: None,
                });
            }
        };

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(listen(subscription, loader, view.clone(), shutdown_rx));

        Ok(Self {
            view,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// start
    ///
    /// Mounts the refresher, then runs the first load. The feed is already subscribed while
    /// that load is in flight, so a change announced meanwhile still triggers a reload.
    pub async fn start(
        feed: ChangeFeedState,
        loader: Arc<ContentLoader>,
        view: Arc<LandingView>,
    ) -> Result<(Self, LandingSnapshot), RefreshError> {
        let refresher = Self::mount(feed, loader.clone(), view.clone()).await?;
        let snapshot = loader.refresh(&view).await;
        Ok((refresher, snapshot))
    }

    /// True while a feed subscription is being listened to.
    pub fn is_listening(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Tears the listener down and waits until the subscription is released.
    pub async fn unmount(mut self) {
        self.view.unmount();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.view.release_listener();
        tracing::info!("realtime refresher unmounted");
    }
}

impl Drop for RealtimeRefresher {
    fn drop(&mut self) {
        // Dropping the sender stops the listen loop.
        self.shutdown.take();
        self.view.release_listener();
    }
}

async fn listen(
    mut subscription: ChangeSubscription,
    loader: Arc<ContentLoader>,
    view: Arc<LandingView>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            _ = &mut shutdown => break,
            event = subscription.next() => event,
        };

        let Some(event) = event else {
            tracing::warn!("change feed closed, landing content will no longer refresh");
            break;
        };
        tracing::debug!(kind = ?event.kind, table = %event.table, "content changed");

        let by: u64 = rand::rng().random_range(1..=3);
        view.bump_readers(by);

        tokio::select! {
            _ = &mut shutdown => break,
            _ = loader.refresh(&view) => {}
        }
    }

    subscription.close().await;
}
