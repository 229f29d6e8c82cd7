//! Interval polling with wholesale snapshot replacement.
//!
//! A [`Poller`] owns at most one subscription at a time. Subscribing fetches
//! immediately and then on every interval tick; each completed fetch replaces
//! the published [`Snapshot`]. Changing the key or dropping the poller aborts
//! the timer task together with any fetch still in flight.

pub mod feed;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::FeedError;

/// Cadence for vehicle position views.
pub const VEHICLE_POSITIONS_INTERVAL: Duration = Duration::from_secs(15);

/// Cadence for views scoped to one schedule number.
pub const SCHEDULE_VIEW_INTERVAL: Duration = Duration::from_secs(20);

/// Something that can produce a fresh snapshot on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    type Snapshot: Send + Sync + 'static;

    async fn fetch(&self) -> Result<Self::Snapshot, FeedError>;
}

/// Latest published state of a subscription.
///
/// `data` is the last successful fetch; `error` is set when the most recent
/// committed fetch failed and cleared by the next success.
pub struct Snapshot<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<Arc<FeedError>>,
    /// Issue number of the fetch that produced this state (1-based, 0 = none yet).
    pub seq: u64,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            seq: 0,
            fetched_at: None,
        }
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            seq: self.seq,
            fetched_at: self.fetched_at,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("seq", &self.seq)
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

/// How overlapping fetches of one subscription are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Whichever fetch completes last wins.
    #[default]
    ArrivalOrder,
    /// A fetch issued before the currently published one is discarded.
    IssueOrder,
}

pub struct Poller<K, T> {
    interval: Duration,
    policy: CommitPolicy,
    key: Option<K>,
    task: Option<JoinHandle<()>>,
    tx: Arc<watch::Sender<Snapshot<T>>>,
}

impl<K, T> Poller<K, T>
where
    K: Clone + PartialEq + fmt::Debug,
    T: Send + Sync + 'static,
{
    pub fn new(interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self {
            interval,
            policy: CommitPolicy::default(),
            key: None,
            task: None,
            tx: Arc::new(tx),
        }
    }

    pub fn with_policy(mut self, policy: CommitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> PollState {
        match &self.task {
            Some(task) if !task.is_finished() => PollState::Polling,
            _ => PollState::Idle,
        }
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Current snapshot of the active subscription.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.tx.borrow().clone()
    }

    /// Receiver for snapshot changes of whatever subscription is active.
    pub fn watch(&self) -> watch::Receiver<Snapshot<T>> {
        self.tx.subscribe()
    }

    /// Starts polling `source` under `key`.
    ///
    /// The previous subscription is stopped first and its snapshot discarded;
    /// receivers of the old subscription see their sender closed.
    /// Re-subscribing with the same key while polling is a no-op.
    pub fn subscribe<S>(&mut self, key: K, source: S) -> watch::Receiver<Snapshot<T>>
    where
        S: SnapshotSource<Snapshot = T>,
    {
        if self.state() == PollState::Polling && self.key.as_ref() == Some(&key) {
            return self.watch();
        }
        self.stop();

        // each subscription owns its own channel
        let (tx, rx) = watch::channel(Snapshot::default());
        self.tx = Arc::new(tx);
        info!(key = ?key, interval_secs = self.interval.as_secs(), "Polling started");
        self.task = Some(tokio::spawn(run(
            Arc::new(source),
            self.interval,
            self.policy,
            self.tx.clone(),
        )));
        self.key = Some(key);
        rx
    }

    /// Cancels the timer and any in-flight fetch.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!(key = ?self.key, "Polling stopped");
        }
        self.key = None;
    }
}

impl<K, T> Drop for Poller<K, T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<S: SnapshotSource>(
    source: Arc<S>,
    interval: Duration,
    policy: CommitPolicy,
    tx: Arc<watch::Sender<Snapshot<S::Snapshot>>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = JoinSet::new();
    let mut issued = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                issued += 1;
                let seq = issued;
                let source = source.clone();
                debug!(seq, in_flight = in_flight.len(), "Poll tick");
                in_flight.spawn(async move { (seq, source.fetch().await) });
            }
            Some(joined) = in_flight.join_next() => {
                match joined {
                    Ok((seq, result)) => commit(&tx, policy, seq, result),
                    Err(e) => warn!(error = %e, "Poll fetch task failed"),
                }
            }
        }
    }
}

fn commit<T>(
    tx: &watch::Sender<Snapshot<T>>,
    policy: CommitPolicy,
    seq: u64,
    result: Result<T, FeedError>,
) {
    tx.send_if_modified(|snapshot| {
        if policy == CommitPolicy::IssueOrder && seq < snapshot.seq {
            debug!(seq, published = snapshot.seq, "Discarding out-of-order fetch");
            return false;
        }
        snapshot.seq = seq;
        match result {
            Ok(data) => {
                snapshot.data = Some(Arc::new(data));
                snapshot.error = None;
                snapshot.fetched_at = Some(Utc::now());
            }
            Err(e) => {
                warn!(seq, error = %e, "Poll failed; keeping last good snapshot");
                snapshot.error = Some(Arc::new(e));
            }
        }
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::Instant;

    /// Returns its call number, after an optional per-call delay.
    #[derive(Default)]
    struct Scripted {
        calls: Arc<AtomicU64>,
        delays_secs: Vec<u64>,
        fail_on: Vec<u64>,
        offset: u64,
    }

    #[async_trait]
    impl SnapshotSource for Scripted {
        type Snapshot = u64;

        async fn fetch(&self) -> Result<u64, FeedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.delays_secs.get(n as usize - 1).copied().unwrap_or(0);
            if delay > 0 {
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            if self.fail_on.contains(&n) {
                return Err(FeedError::Io(std::io::Error::other("feed unreachable")));
            }
            Ok(self.offset + n)
        }
    }

    async fn next(rx: &mut watch::Receiver<Snapshot<u64>>) -> Snapshot<u64> {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_on_interval() {
        let start = Instant::now();
        let mut poller: Poller<&str, u64> = Poller::new(VEHICLE_POSITIONS_INTERVAL);
        let mut rx = poller.subscribe("route_4", Scripted::default());
        assert_eq!(poller.state(), PollState::Polling);

        let first = next(&mut rx).await;
        assert_eq!(first.data.as_deref(), Some(&1));
        assert!(start.elapsed() < Duration::from_secs(1));

        let second = next(&mut rx).await;
        assert_eq!(second.data.as_deref(), Some(&2));
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_good_snapshot() {
        let mut poller: Poller<&str, u64> = Poller::new(VEHICLE_POSITIONS_INTERVAL);
        let source = Scripted {
            fail_on: vec![2],
            ..Default::default()
        };
        let mut rx = poller.subscribe("route_4", source);

        let ok = next(&mut rx).await;
        assert_eq!(ok.data.as_deref(), Some(&1));
        assert!(ok.error.is_none());

        let failed = next(&mut rx).await;
        assert_eq!(failed.data.as_deref(), Some(&1));
        assert!(failed.error.is_some());
        assert_eq!(failed.seq, 2);

        let recovered = next(&mut rx).await;
        assert_eq!(recovered.data.as_deref(), Some(&3));
        assert!(recovered.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_is_error_only() {
        let mut poller: Poller<&str, u64> = Poller::new(VEHICLE_POSITIONS_INTERVAL);
        let source = Scripted {
            fail_on: vec![1],
            ..Default::default()
        };
        let mut rx = poller.subscribe("route_4", source);

        let snapshot = next(&mut rx).await;
        assert!(snapshot.data.is_none());
        assert!(matches!(snapshot.error.as_deref(), Some(FeedError::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_change_stops_old_timer() {
        let mut poller: Poller<&str, u64> = Poller::new(SCHEDULE_VIEW_INTERVAL);
        let old_calls = Arc::new(AtomicU64::new(0));
        let mut rx = poller.subscribe(
            "164/01",
            Scripted {
                calls: old_calls.clone(),
                ..Default::default()
            },
        );
        assert_eq!(next(&mut rx).await.data.as_deref(), Some(&1));

        let mut rx = poller.subscribe(
            "164/02",
            Scripted {
                offset: 100,
                ..Default::default()
            },
        );
        assert_eq!(poller.key(), Some(&"164/02"));
        // the new subscription starts from an empty snapshot
        assert!(poller.snapshot().data.is_none());
        assert_eq!(next(&mut rx).await.data.as_deref(), Some(&101));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(old_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_keeps_running_subscription() {
        let mut poller: Poller<&str, u64> = Poller::new(VEHICLE_POSITIONS_INTERVAL);
        let calls = Arc::new(AtomicU64::new(0));
        let mut rx = poller.subscribe(
            "RY501",
            Scripted {
                calls: calls.clone(),
                ..Default::default()
            },
        );
        next(&mut rx).await;
        let _rx = poller.subscribe("RY501", Scripted::default());
        assert_eq!(poller.snapshot().data.as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_drop_cancel_polling() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut poller: Poller<&str, u64> = Poller::new(VEHICLE_POSITIONS_INTERVAL);
        let mut rx = poller.subscribe(
            "RY501",
            Scripted {
                calls: calls.clone(),
                ..Default::default()
            },
        );
        next(&mut rx).await;
        poller.stop();
        tokio::task::yield_now().await;
        assert_eq!(poller.state(), PollState::Idle);
        assert_eq!(poller.key(), None);

        let mut rx = poller.subscribe(
            "RY502",
            Scripted {
                calls: calls.clone(),
                ..Default::default()
            },
        );
        next(&mut rx).await;
        drop(poller);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Fetch #1 takes 25 s, so fetch #2 (issued at 15 s) lands first.
    fn overlapping() -> Scripted {
        Scripted {
            delays_secs: vec![25, 1, 1],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_order_commits_late_response() {
        let mut poller: Poller<&str, u64> = Poller::new(VEHICLE_POSITIONS_INTERVAL);
        let mut rx = poller.subscribe("route_4", overlapping());

        assert_eq!(next(&mut rx).await.seq, 2);
        let late = next(&mut rx).await;
        assert_eq!(late.seq, 1);
        assert_eq!(late.data.as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_order_discards_late_response() {
        let mut poller: Poller<&str, u64> =
            Poller::new(VEHICLE_POSITIONS_INTERVAL).with_policy(CommitPolicy::IssueOrder);
        let mut rx = poller.subscribe("route_4", overlapping());

        assert_eq!(next(&mut rx).await.seq, 2);
        let following = next(&mut rx).await;
        assert_eq!(following.seq, 3);
        assert_eq!(following.data.as_deref(), Some(&3));
    }
}
