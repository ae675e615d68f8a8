// src/scheduler.rs
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::clock::SharedClock;
use crate::config::MonitorConfig;
use crate::config::Secrets;
use crate::engine::{Engine, EngineOptions, Monitor, PollOutcome, PollReport};
use crate::feeds::{
    audit::AuditFeed,
    blog::BlogFeed,
    impact::ImpactFeed,
    press::PressFeed,
    youtube::{self, YouTubeFeed},
};
use crate::notify::Notifier;
use crate::store::JsonStore;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub interval: Duration,
}

impl From<&MonitorConfig> for SchedulerCfg {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.interval_secs),
        }
    }
}

/// Initializes every enabled feed in driver order: youtube channels, blog,
/// audit, impact, press. `only` restricts to a single feed id.
///
/// Any error here is unrecoverable for the affected feed.
pub async fn init_monitors(
    cfg: &MonitorConfig,
    secrets: &Secrets,
    clock: SharedClock,
    only: Option<&str>,
) -> Result<Vec<Box<dyn Monitor>>> {
    let wanted = |id: &str| only.map_or(true, |o| o == id);
    let opts = |channel: String| {
        EngineOptions::new(channel).with_timeouts(cfg.fetch_timeout_secs, cfg.notify_timeout_secs)
    };
    let store = |id: &str| JsonStore::for_feed(&cfg.state_dir, id);

    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();

    for yt in cfg.youtube.iter().filter(|y| y.enabled) {
        let id = youtube::feed_id(&yt.label);
        if !wanted(id.as_str()) {
            continue;
        }
        let key = secrets
            .youtube_api_key
            .as_deref()
            .context("YOUTUBE_API_KEY is required when youtube feeds are configured")?;
        let feed = YouTubeFeed::new(&yt.label, key, &yt.channel_id, yt.max_results)?;
        let channel = cfg.channel_for(&id, yt.discord_channel_id.as_deref())?;
        let engine = Engine::init(feed, store(id.as_str()), clock.clone(), opts(channel)).await?;
        monitors.push(Box::new(engine));
    }

    if cfg.blog.enabled && wanted("blog") {
        let channel = cfg.channel_for("blog", cfg.blog.channel_id.as_deref())?;
        let feed = BlogFeed::from_url(cfg.blog_endpoint());
        let engine = Engine::init(feed, store("blog"), clock.clone(), opts(channel)).await?;
        monitors.push(Box::new(engine));
    }

    if cfg.audit.feed.enabled && wanted("audit") {
        let channel = cfg.channel_for("audit", cfg.audit.feed.channel_id.as_deref())?;
        let feed = AuditFeed::from_url(cfg.audit_endpoint()).with_grace_secs(cfg.audit.grace_secs);
        let engine = Engine::init(feed, store("audit"), clock.clone(), opts(channel)).await?;
        monitors.push(Box::new(engine));
    }

    if cfg.impact.feed.enabled && wanted("impact") {
        let channel = cfg.channel_for("impact", cfg.impact.feed.channel_id.as_deref())?;
        let feed = ImpactFeed::from_url(cfg.impact_endpoint(), clock.clone())
            .with_post_hour(cfg.impact.post_hour);
        let engine = Engine::init(feed, store("impact"), clock.clone(), opts(channel)).await?;
        monitors.push(Box::new(engine));
    }

    if cfg.press.enabled && wanted("press") {
        let channel = cfg.channel_for("press", cfg.press.channel_id.as_deref())?;
        let feed = PressFeed::from_url(cfg.press_endpoint());
        let engine = Engine::init(feed, store("press"), clock.clone(), opts(channel)).await?;
        monitors.push(Box::new(engine));
    }

    if let Some(o) = only {
        if monitors.is_empty() {
            bail!("no enabled feed named {o:?}");
        }
    }
    Ok(monitors)
}

/// Checks every monitor once, strictly one after another.
pub async fn tick(monitors: &mut [Box<dyn Monitor>], notifier: &dyn Notifier) -> Vec<PollReport> {
    let mut reports = Vec::with_capacity(monitors.len());
    for m in monitors.iter_mut() {
        let report = m.tick(notifier).await;
        match &report.outcome {
            PollOutcome::Completed => tracing::debug!(
                target: "scheduler",
                feed = %report.feed,
                fetched = report.fetched,
                new = report.new,
                notified = report.notified,
                "feed checked"
            ),
            outcome => tracing::info!(
                target: "scheduler",
                feed = %report.feed,
                notified = report.notified,
                ?outcome,
                "feed check incomplete"
            ),
        }
        reports.push(report);
    }
    reports
}

/// Runs the polling loop forever. The first check happens one interval
/// after start; ticks missed while a slow check runs are not replayed.
pub async fn run(cfg: SchedulerCfg, mut monitors: Vec<Box<dyn Monitor>>, notifier: &dyn Notifier) {
    let mut ticker = interval_at(Instant::now() + cfg.interval, cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        target: "scheduler",
        feeds = ?monitors.iter().map(|m| m.feed_id().to_string()).collect::<Vec<_>>(),
        interval_secs = cfg.interval.as_secs(),
        "polling started"
    );

    loop {
        ticker.tick().await;
        let reports = tick(&mut monitors, notifier).await;
        let notified: usize = reports.iter().map(|r| r.notified).sum();
        tracing::info!(target: "scheduler", feeds = reports.len(), notified, "tick done");
    }
}
