//! Live categorized view over the store's snapshot stream.
//!
//! The feed starts computing when the first observer arrives and every
//! observer shares that one computation. When the last observer leaves, the
//! upstream task is kept for a grace period and then stopped. The next
//! observer restarts it and gets a view of the latest snapshot right away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::categorize::{categorize, CategorizedView};
use crate::clock::Clock;
use crate::dates::TimeAnchors;
use crate::store::Snapshot;

/// Shared, live [`CategorizedView`] built from a snapshot stream.
pub struct TaskFeed<C: Clock> {
    inner: Arc<FeedInner<C>>,
}

impl<C: Clock> Clone for TaskFeed<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

struct FeedInner<C: Clock> {
    clock: Arc<C>,
    snapshots: watch::Receiver<Snapshot>,
    grace_period: Duration,
    runtime: Handle,
    recomputations: AtomicU64,
    state: Mutex<FeedState>,
}

#[derive(Default)]
struct FeedState {
    observers: usize,
    /// Bumped on every subscribe so a pending teardown can tell it is stale.
    generation: u64,
    upstream: Option<Upstream>,
}

struct Upstream {
    /// Kept only to hand out new receivers; the task owns the sender, so
    /// observers see the channel close when the task ends.
    views: watch::Receiver<Arc<CategorizedView>>,
    task: JoinHandle<()>,
}

impl<C: Clock> TaskFeed<C> {
    /// Create an idle feed. Must be called from within a Tokio runtime.
    pub fn new(snapshots: watch::Receiver<Snapshot>, clock: Arc<C>, grace_period: Duration) -> Self {
        Self::with_runtime(snapshots, clock, grace_period, Handle::current())
    }

    pub fn with_runtime(
        snapshots: watch::Receiver<Snapshot>,
        clock: Arc<C>,
        grace_period: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                clock,
                snapshots,
                grace_period,
                runtime,
                recomputations: AtomicU64::new(0),
                state: Mutex::new(FeedState::default()),
            }),
        }
    }

    /// Register an observer, starting the upstream if it is not running.
    pub fn subscribe(&self) -> ViewObserver<C> {
        let mut state = self.inner.lock_state();
        state.observers += 1;
        state.generation += 1;

        let running = state
            .upstream
            .as_ref()
            .filter(|upstream| !upstream.task.is_finished())
            .map(|upstream| upstream.views.clone());
        let mut views = match running {
            Some(views) => views,
            None => {
                let upstream = self.inner.start_upstream();
                let views = upstream.views.clone();
                state.upstream = Some(upstream);
                views
            }
        };
        views.mark_unchanged();

        ViewObserver {
            views,
            feed: Arc::clone(&self.inner),
        }
    }

    /// How many times a view has been computed since the feed was built.
    pub fn recomputations(&self) -> u64 {
        self.inner.recomputations.load(Ordering::SeqCst)
    }

    pub fn observers(&self) -> usize {
        self.inner.lock_state().observers
    }

    /// Whether an upstream subscription is currently running.
    pub fn is_active(&self) -> bool {
        self.inner
            .lock_state()
            .upstream
            .as_ref()
            .is_some_and(|upstream| !upstream.task.is_finished())
    }
}

impl<C: Clock> FeedInner<C> {
    fn lock_state(&self) -> MutexGuard<'_, FeedState> {
        // The state is a handful of counters; a panic elsewhere cannot leave
        // it half-written, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn compute(&self, snapshot: &Snapshot) -> Arc<CategorizedView> {
        self.recomputations.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        Arc::new(categorize(snapshot, &now, self.clock.week_starts_on()))
    }

    /// Time left until the local day changes, when the buckets shift.
    fn until_rollover(&self) -> Duration {
        let now = self.clock.now();
        let anchors = TimeAnchors::at(&now, self.clock.week_starts_on());
        (anchors.tomorrow_start - now.to_utc())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_millis(1))
    }

    fn start_upstream(self: &Arc<Self>) -> Upstream {
        let mut snapshots = self.snapshots.clone();
        let latest = snapshots.borrow_and_update().clone();
        let (sender, views) = watch::channel(self.compute(&latest));
        tracing::debug!(tasks = latest.len(), "task feed started");

        let feed = Arc::clone(self);
        let task = self.runtime.spawn(async move {
            loop {
                let rollover = feed.until_rollover();
                tokio::select! {
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            tracing::debug!("snapshot stream closed, task feed stopping");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(rollover) => {
                        tracing::debug!("day rolled over, recategorizing");
                    }
                }
                let latest = snapshots.borrow_and_update().clone();
                sender.send_replace(feed.compute(&latest));
            }
        });

        Upstream { views, task }
    }

    fn release(self: &Arc<Self>) {
        let generation = {
            let mut state = self.lock_state();
            state.observers = state.observers.saturating_sub(1);
            if state.observers > 0 {
                return;
            }
            state.generation
        };

        let feed = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(feed.grace_period).await;
            let mut state = feed.lock_state();
            if state.observers == 0 && state.generation == generation {
                if let Some(upstream) = state.upstream.take() {
                    upstream.task.abort();
                    tracing::debug!("task feed idle, stopped");
                }
            }
        });
    }
}

/// One consumer's view of a [`TaskFeed`]. Dropping it detaches the consumer.
pub struct ViewObserver<C: Clock> {
    views: watch::Receiver<Arc<CategorizedView>>,
    feed: Arc<FeedInner<C>>,
}

impl<C: Clock> ViewObserver<C> {
    /// The latest view.
    pub fn current(&self) -> Arc<CategorizedView> {
        self.views.borrow().clone()
    }

    /// Wait for the next view. `None` once the feed has stopped for good.
    pub async fn changed(&mut self) -> Option<Arc<CategorizedView>> {
        self.views.changed().await.ok()?;
        Some(self.views.borrow_and_update().clone())
    }
}

impl<C: Clock> Drop for ViewObserver<C> {
    fn drop(&mut self) {
        self.feed.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::RecordStore;
    use chrono::{FixedOffset, TimeZone, Weekday};

    const GRACE: Duration = Duration::from_millis(50);

    fn clock() -> Arc<FixedClock> {
        let now = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();
        Arc::new(FixedClock::new(now, Weekday::Mon))
    }

    fn setup(dir: &tempfile::TempDir) -> (RecordStore, TaskFeed<FixedClock>) {
        let (store, _) = RecordStore::open(&dir.path().join("tasks.db"), clock()).unwrap();
        let feed = TaskFeed::new(store.subscribe(), clock(), GRACE);
        (store, feed)
    }

    #[tokio::test]
    async fn feed_is_cold_until_first_observer() {
        let dir = tempfile::tempdir().unwrap();
        let (store, feed) = setup(&dir);
        store.create("before anyone looks", None).unwrap().wait().await.unwrap();

        assert!(!feed.is_active());
        assert_eq!(feed.recomputations(), 0);

        let observer = feed.subscribe();
        assert!(feed.is_active());
        assert_eq!(observer.current().upcoming.len(), 1);
        assert_eq!(feed.recomputations(), 1);
        drop(observer);
        store.close().unwrap();
    }

    #[tokio::test]
    async fn observers_share_one_recomputation_per_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (store, feed) = setup(&dir);
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();
        assert_eq!(feed.observers(), 2);

        store.create("shared", None).unwrap().wait().await.unwrap();
        let a = first.changed().await.unwrap();
        let b = second.changed().await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.upcoming[0].text, "shared");
        assert_eq!(feed.recomputations(), 2);
        store.close().unwrap();
    }

    #[tokio::test]
    async fn teardown_waits_for_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let (store, feed) = setup(&dir);

        drop(feed.subscribe());
        assert!(feed.is_active());

        // Re-subscribing inside the grace period keeps the same upstream.
        let observer = feed.subscribe();
        tokio::time::sleep(GRACE * 3).await;
        assert!(feed.is_active());
        assert_eq!(feed.recomputations(), 1);

        drop(observer);
        tokio::time::sleep(GRACE * 3).await;
        assert!(!feed.is_active());
        store.close().unwrap();
    }

    #[tokio::test]
    async fn resubscribe_replays_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (store, feed) = setup(&dir);

        drop(feed.subscribe());
        tokio::time::sleep(GRACE * 3).await;
        assert!(!feed.is_active());

        // Written while nobody was watching.
        let id = store.create("while idle", None).unwrap().wait().await.unwrap();
        store.toggle_completion(id).unwrap().wait().await.unwrap();

        let observer = feed.subscribe();
        let view = observer.current();
        assert_eq!(view.completed.len(), 1);
        assert_eq!(view.completed[0].id, id);
        store.close().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn midnight_recategorizes_without_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let late = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 10, 14, 23, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(late, Weekday::Mon));
        let (store, _) = RecordStore::open(&dir.path().join("tasks.db"), Arc::clone(&clock)).unwrap();
        let feed = TaskFeed::new(store.subscribe(), clock, GRACE);

        let mut observer = feed.subscribe();
        assert_eq!(feed.recomputations(), 1);

        // Let the upstream task arm its midnight timer.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(3601)).await;

        assert!(observer.changed().await.is_some());
        assert_eq!(feed.recomputations(), 2);
        drop(observer);
        store.close().unwrap();
    }

    #[tokio::test]
    async fn closing_the_store_ends_the_feed() {
        let dir = tempfile::tempdir().unwrap();
        let (store, feed) = setup(&dir);
        let mut observer = feed.subscribe();

        store.close().unwrap();
        assert!(observer.changed().await.is_none());
    }
}
