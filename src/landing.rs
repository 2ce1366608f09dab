use std::sync::{
    PoisonError, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::{
    fallback,
    models::{Category, LandingSnapshot, SlotSource, StoryCard},
};

struct Slot<T> {
    value: T,
    source: SlotSource,
}

/// LandingView
///
/// The landing page's current content, shared by the HTTP handlers, the content loader and the
/// realtime refresher.
///
/// Each slot is guarded on its own, so the featured story and the quick grid are written
/// independently as their fetches settle. Until the first load the slots hold fallback
/// content, which keeps both of them non-empty at all times.
///
/// Once unmounted, the view ignores every write: late results from in-flight fetches are
/// dropped silently.
pub struct LandingView {
    featured: RwLock<Slot<StoryCard>>,
    quick: RwLock<Slot<Vec<StoryCard>>>,
    refreshed_at: RwLock<DateTime<Utc>>,
    active_readers: AtomicU64,
    mounted: AtomicBool,
    listener_claimed: AtomicBool,
    updates: broadcast::Sender<LandingSnapshot>,
}

impl Default for LandingView {
    fn default() -> Self {
        Self::new()
    }
}

impl LandingView {
    pub fn new() -> Self {
        Self::for_category(Category::default())
    }

    /// A view whose initial fallback content is built around `featured_category`.
    pub fn for_category(featured_category: Category) -> Self {
        let (updates, _) = broadcast::channel(16);
        Self {
            featured: RwLock::new(Slot {
                value: fallback::featured(featured_category),
                source: SlotSource::Fallback,
            }),
            quick: RwLock::new(Slot {
                value: fallback::quick(featured_category),
                source: SlotSource::Fallback,
            }),
            refreshed_at: RwLock::new(Utc::now()),
            active_readers: AtomicU64::new(0),
            mounted: AtomicBool::new(true),
            listener_claimed: AtomicBool::new(false),
            updates,
        }
    }

    /// Replaces the featured slot. Returns false (and changes nothing) after unmount.
    pub fn set_featured(&self, story: StoryCard, source: SlotSource) -> bool {
        if !self.is_mounted() {
            return false;
        }
        *self.featured.write().unwrap_or_else(PoisonError::into_inner) = Slot {
            value: story,
            source,
        };
        self.touch();
        true
    }

    /// Replaces the quick grid. Returns false (and changes nothing) after unmount.
    pub fn set_quick(&self, items: Vec<StoryCard>, source: SlotSource) -> bool {
        if !self.is_mounted() {
            return false;
        }
        *self.quick.write().unwrap_or_else(PoisonError::into_inner) = Slot {
            value: items,
            source,
        };
        self.touch();
        true
    }

    /// Adds to the cosmetic active-readers counter. Ignored after unmount.
    pub fn bump_readers(&self, by: u64) -> bool {
        if !self.is_mounted() {
            return false;
        }
        self.active_readers.fetch_add(by, Ordering::Relaxed);
        true
    }

    pub fn active_readers(&self) -> u64 {
        self.active_readers.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LandingSnapshot {
        let featured = self.featured.read().unwrap_or_else(PoisonError::into_inner);
        let quick = self.quick.read().unwrap_or_else(PoisonError::into_inner);
        let refreshed_at = *self
            .refreshed_at
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        LandingSnapshot {
            featured: featured.value.clone(),
            featured_source: featured.source,
            quick: quick.value.clone(),
            quick_source: quick.source,
            active_readers: self.active_readers(),
            refreshed_at,
        }
    }

    /// Broadcasts the current snapshot to SSE subscribers. Returns it for convenience.
    pub fn publish(&self) -> LandingSnapshot {
        let snapshot = self.snapshot();
        if self.is_mounted() {
            // Nobody listening is fine.
            let _ = self.updates.send(snapshot.clone());
        }
        snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LandingSnapshot> {
        self.updates.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Marks the view torn down. Every later write is discarded.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }

    /// Reserves the single change-listener slot. False if a listener already holds it.
    pub fn claim_listener(&self) -> bool {
        self.listener_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release_listener(&self) {
        self.listener_claimed.store(false, Ordering::Release);
    }

    fn touch(&self) {
        *self
            .refreshed_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }
}
