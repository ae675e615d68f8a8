//! # Poll-Diff-Notify Engine
//! One generic engine per feed: load or seed the notified set, poll, diff,
//! announce new items oldest first, and persist after every successful send.
//!
//! Policy: notify, then commit. A crash between the two can re-announce an
//! item after restart, but an item is never recorded without having been
//! delivered.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::feeds::Feed;
use crate::notify::Notifier;
use crate::store::JsonStore;

/// Persisted dedup ledger for one feed.
pub trait FeedState<I>: Default + Serialize + DeserializeOwned + Send + Sync {
    fn is_empty(&self) -> bool;

    fn contains(&self, identity: &str) -> bool;

    /// First-run baseline; no notification was sent.
    fn seed(&mut self, identity: &str, item: &I, at: DateTime<Utc>) {
        self.record(identity, item, at);
    }

    /// Called only after the item was delivered.
    fn record(&mut self, identity: &str, item: &I, at: DateTime<Utc>);
}

/// Identities already announced, in announcement order.
///
/// Grows monotonically; serialized as a plain JSON array of strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct NotifiedSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl NotifiedSet {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.index.contains(identity)
    }

    /// Returns false if already present.
    pub fn insert(&mut self, identity: &str) -> bool {
        if !self.index.insert(identity.to_string()) {
            return false;
        }
        self.order.push(identity.to_string());
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for NotifiedSet {
    fn from(v: Vec<String>) -> Self {
        let mut set = NotifiedSet::default();
        for id in v {
            set.insert(&id);
        }
        set
    }
}

impl<S: AsRef<str>> FromIterator<S> for NotifiedSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut set = NotifiedSet::default();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}

impl Serialize for NotifiedSet {
    fn serialize<Ser: Serializer>(&self, s: Ser) -> Result<Ser::Ok, Ser::Error> {
        s.collect_seq(&self.order)
    }
}

impl<I> FeedState<I> for NotifiedSet {
    fn is_empty(&self) -> bool {
        NotifiedSet::is_empty(self)
    }

    fn contains(&self, identity: &str) -> bool {
        NotifiedSet::contains(self, identity)
    }

    fn record(&mut self, identity: &str, _item: &I, _at: DateTime<Utc>) {
        self.insert(identity);
    }
}

/// Initialization failures. Both mean there is no trustworthy baseline, so
/// the feed must not run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("feed {feed}: no persisted state and baseline fetch failed: {cause:#}")]
    Baseline { feed: String, cause: anyhow::Error },

    #[error("feed {feed}: state store unusable: {cause:#}")]
    Store { feed: String, cause: anyhow::Error },
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Destination chat channel.
    pub channel_id: String,
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
}

impl EngineOptions {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            fetch_timeout: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeouts(mut self, fetch_secs: u64, notify_secs: u64) -> Self {
        self.fetch_timeout = Duration::from_secs(fetch_secs.max(1));
        self.notify_timeout = Duration::from_secs(notify_secs.max(1));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    /// Transient; state untouched, retried next tick.
    FetchFailed(String),
    /// Stopped at `identity`; it and everything after it retry next tick.
    DispatchAborted { identity: String, error: String },
    /// `identity` was delivered but not persisted. Later items wait for the
    /// next tick, whose first successful write also persists `identity`.
    CommitFailed { identity: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub feed: String,
    pub fetched: usize,
    pub new: usize,
    pub notified: usize,
    /// Delivered but not persisted (0 or 1); may repeat after a restart.
    pub commit_failures: usize,
    pub outcome: PollOutcome,
}

impl PollReport {
    fn new(feed: &str) -> Self {
        Self {
            feed: feed.to_string(),
            fetched: 0,
            new: 0,
            notified: 0,
            commit_failures: 0,
            outcome: PollOutcome::Completed,
        }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_polls_total", "Feed polls started.");
        describe_counter!("monitor_fetch_errors_total", "Feed fetches that failed or timed out.");
        describe_counter!("monitor_notifications_total", "Notifications delivered.");
        describe_counter!(
            "monitor_dispatch_errors_total",
            "Notification sends that failed; the poll was aborted at that item."
        );
        describe_counter!(
            "monitor_commit_failures_total",
            "Delivered notifications whose state write failed."
        );
        describe_counter!(
            "monitor_follow_up_errors_total",
            "Follow-up messages that failed after the main message was delivered."
        );
        describe_gauge!("monitor_last_poll_ts", "Unix ts of the feed's last poll.");
    });
}

pub struct Engine<F: Feed> {
    feed: F,
    store: JsonStore,
    state: F::State,
    clock: SharedClock,
    opts: EngineOptions,
}

impl<F: Feed> Engine<F> {
    /// Loads the feed's state, or seeds it from one fetch on first run
    /// without notifying anything.
    pub async fn init(
        feed: F,
        store: JsonStore,
        clock: SharedClock,
        opts: EngineOptions,
    ) -> Result<Self, EngineError> {
        ensure_metrics_described();
        let feed_id = feed.id().to_string();
        let store_err = |cause| EngineError::Store {
            feed: feed_id.clone(),
            cause,
        };

        store.ensure_dir().await.map_err(store_err)?;
        let loaded: Option<F::State> = store.load().await.map_err(store_err)?;

        let mut engine = Self {
            feed,
            store,
            state: loaded.unwrap_or_default(),
            clock,
            opts,
        };

        if !engine.state.is_empty() {
            info!(feed = %feed_id, path = %engine.store.path().display(), "state loaded");
            return Ok(engine);
        }

        let items = engine
            .fetch()
            .await
            .map_err(|cause| EngineError::Baseline {
                feed: feed_id.clone(),
                cause,
            })?;
        let now = engine.clock.now();
        let mut seeded = 0;
        for item in items.iter().filter(|it| engine.feed.in_baseline(it, now)) {
            let identity = engine.feed.identity(item);
            if !engine.state.contains(&identity) {
                engine.state.seed(&identity, item, now);
                seeded += 1;
            }
        }
        engine.store.save(&engine.state).await.map_err(store_err)?;
        info!(
            feed = %feed_id,
            fetched = items.len(),
            seeded,
            "baseline seeded"
        );

        Ok(engine)
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn state(&self) -> &F::State {
        &self.state
    }

    pub fn channel_id(&self) -> &str {
        &self.opts.channel_id
    }

    async fn fetch(&self) -> anyhow::Result<Vec<F::Item>> {
        match tokio::time::timeout(self.opts.fetch_timeout, self.feed.fetch()).await {
            Ok(res) => res,
            Err(_) => Err(anyhow!(
                "fetch timed out after {}s",
                self.opts.fetch_timeout.as_secs()
            )),
        }
    }

    /// One poll: fetch, diff, then announce and commit item by item.
    /// Never fails; problems are logged, counted and reported.
    pub async fn check(&mut self, notifier: &dyn Notifier) -> PollReport {
        let feed_id = self.feed.id().to_string();
        let mut report = PollReport::new(&feed_id);

        counter!("monitor_polls_total", "feed" => feed_id.clone()).increment(1);
        gauge!("monitor_last_poll_ts", "feed" => feed_id.clone())
            .set(self.clock.now().timestamp() as f64);

        let items = match self.fetch().await {
            Ok(v) => v,
            Err(e) => {
                warn!(feed = %feed_id, error = ?e, "fetch failed; skipping poll");
                counter!("monitor_fetch_errors_total", "feed" => feed_id.clone()).increment(1);
                report.outcome = PollOutcome::FetchFailed(format!("{e:#}"));
                return report;
            }
        };
        report.fetched = items.len();

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut fresh: Vec<(String, F::Item)> = items
            .into_iter()
            .filter(|it| self.feed.is_eligible(it, now))
            .map(|it| (self.feed.identity(&it), it))
            .filter(|(id, _)| !self.state.contains(id) && seen.insert(id.clone()))
            .collect();
        // Stable: equal timestamps keep fetch order.
        fresh.sort_by_key(|(_, it)| self.feed.occurred_at(it));
        report.new = fresh.len();

        if fresh.is_empty() {
            debug!(feed = %feed_id, fetched = report.fetched, "nothing new");
            return report;
        }

        for (identity, item) in fresh {
            let message = self.feed.render(&item);
            let sent = match tokio::time::timeout(
                self.opts.notify_timeout,
                notifier.send(&self.opts.channel_id, &message),
            )
            .await
            {
                Ok(res) => res,
                Err(_) => Err(anyhow!(
                    "notify timed out after {}s",
                    self.opts.notify_timeout.as_secs()
                )),
            };

            if let Err(e) = sent {
                warn!(
                    feed = %feed_id,
                    %identity,
                    notifier = notifier.name(),
                    error = ?e,
                    "dispatch failed; remaining items deferred to next poll"
                );
                counter!("monitor_dispatch_errors_total", "feed" => feed_id.clone()).increment(1);
                report.outcome = PollOutcome::DispatchAborted {
                    identity,
                    error: format!("{e:#}"),
                };
                return report;
            }

            counter!("monitor_notifications_total", "feed" => feed_id.clone()).increment(1);
            report.notified += 1;
            info!(feed = %feed_id, %identity, "notified");

            self.state.record(&identity, &item, self.clock.now());
            if let Err(e) = self.store.save(&self.state).await {
                error!(
                    feed = %feed_id,
                    %identity,
                    class = "commit_failure",
                    error = ?e,
                    "notification sent but state not persisted; poll stopped, may repeat after restart"
                );
                counter!("monitor_commit_failures_total", "feed" => feed_id.clone()).increment(1);
                report.commit_failures += 1;
                report.outcome = PollOutcome::CommitFailed {
                    identity,
                    error: format!("{e:#}"),
                };
                return report;
            }
        }

        report
    }
}

/// Type-erased engine so the driver can hold feeds with different item types.
#[async_trait::async_trait]
pub trait Monitor: Send {
    fn feed_id(&self) -> &str;

    async fn tick(&mut self, notifier: &dyn Notifier) -> PollReport;
}

#[async_trait::async_trait]
impl<F: Feed + 'static> Monitor for Engine<F> {
    fn feed_id(&self) -> &str {
        self.feed.id()
    }

    async fn tick(&mut self, notifier: &dyn Notifier) -> PollReport {
        self.check(notifier).await
    }
}
