// tests/feed_gates.rs
// Eligibility gates driven through the real engine with a manual clock.
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::sync::Mutex;

use glow_content_monitor::clock::{ManualClock, SharedClock};
use glow_content_monitor::feeds::{audit::AuditFeed, impact::ImpactFeed, impact::ImpactState};
use glow_content_monitor::notify::{Notification, Notifier};
use glow_content_monitor::store::JsonStore;
use glow_content_monitor::{Engine, EngineOptions};

const AUDITS: &str = include_str!("fixtures/audits.json");
const IMPACT: &str = include_str!("fixtures/impact.json");

#[derive(Default)]
struct Outbox(Mutex<Vec<Notification>>);

impl Outbox {
    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn texts(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|n| n.summary()).collect()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, _channel_id: &str, n: &Notification) -> Result<()> {
        self.0.lock().unwrap().push(n.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "outbox"
    }
}

#[tokio::test]
async fn audits_wait_out_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("audit.json"), r#"["1-2-3"]"#).unwrap();
    let manual = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap());
    let clock: SharedClock = manual.clone();

    let mut eng = Engine::init(
        AuditFeed::from_fixture(AUDITS),
        JsonStore::for_feed(dir.path(), "audit"),
        clock,
        EngineOptions::new("audits"),
    )
    .await
    .unwrap();
    let outbox = Outbox::default();

    // farm-8 completed five minutes ago: deferred, not recorded.
    let r = eng.check(&outbox).await;
    assert_eq!(r.fetched, 2);
    assert_eq!(r.new, 1);
    assert_eq!(outbox.texts(), vec!["https://www.glow.org/audits/farm-7"]);
    assert!(!eng.state().contains("21"));

    manual.advance(Duration::seconds(299));
    assert_eq!(eng.check(&outbox).await.new, 0);

    manual.advance(Duration::seconds(1));
    eng.check(&outbox).await;
    assert_eq!(
        outbox.texts(),
        vec![
            "https://www.glow.org/audits/farm-7",
            "https://www.glow.org/audits/farm-8"
        ]
    );
    assert!(eng.state().contains("12-13") && eng.state().contains("21"));
}

#[tokio::test]
async fn audits_in_grace_at_first_run_are_announced_later() {
    let dir = tempfile::tempdir().unwrap();
    let manual = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap());
    let clock: SharedClock = manual.clone();

    let mut eng = Engine::init(
        AuditFeed::from_fixture(AUDITS),
        JsonStore::for_feed(dir.path(), "audit"),
        clock,
        EngineOptions::new("audits"),
    )
    .await
    .unwrap();
    // farm-8 completed five minutes before deploy: not part of the baseline.
    assert_eq!(eng.state().iter().collect::<Vec<_>>(), vec!["12-13"]);

    let outbox = Outbox::default();
    assert_eq!(eng.check(&outbox).await.new, 0);

    manual.advance(Duration::minutes(5));
    let r = eng.check(&outbox).await;
    assert_eq!(r.notified, 1);
    assert_eq!(outbox.texts(), vec!["https://www.glow.org/audits/farm-8"]);

    manual.advance(Duration::minutes(1));
    eng.check(&outbox).await;
    assert_eq!(outbox.len(), 1);
}

async fn impact_engine(dir: &std::path::Path, clock: SharedClock) -> Engine<ImpactFeed> {
    Engine::init(
        ImpactFeed::from_fixture(IMPACT, clock.clone()),
        JsonStore::for_feed(dir, "impact"),
        clock,
        EngineOptions::new("impact"),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn impact_posts_once_per_sunday_window() {
    let dir = tempfile::tempdir().unwrap();
    // Wednesday.
    let manual = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap());
    let mut eng = impact_engine(dir.path(), manual.clone()).await;
    let outbox = Outbox::default();

    let seeded: ImpactState =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("impact.json")).unwrap())
            .unwrap();
    assert!(seeded.last_metrics.is_some());
    assert!(seeded.last_post_date.is_none());

    assert_eq!(eng.check(&outbox).await.new, 0);

    manual.set(Utc.with_ymd_and_hms(2025, 3, 9, 0, 30, 0).unwrap());
    let r = eng.check(&outbox).await;
    assert_eq!(r.notified, 1);

    manual.set(Utc.with_ymd_and_hms(2025, 3, 9, 0, 45, 0).unwrap());
    assert_eq!(eng.check(&outbox).await.new, 0);

    manual.set(Utc.with_ymd_and_hms(2025, 3, 9, 1, 0, 0).unwrap());
    assert_eq!(eng.check(&outbox).await.new, 0);
    assert_eq!(outbox.len(), 1);

    manual.set(Utc.with_ymd_and_hms(2025, 3, 16, 0, 5, 0).unwrap());
    eng.check(&outbox).await;
    assert_eq!(outbox.len(), 2);

    let raw = std::fs::read_to_string(dir.path().join("impact.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(json["lastMetrics"]["solarPanelsInstalled"].is_number());
    assert!(json["lastPostDate"]
        .as_str()
        .is_some_and(|d| d.starts_with("2025-03-16T00:05:00")));
}

#[tokio::test]
async fn impact_post_survives_restart_within_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let manual = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 9, 0, 10, 0).unwrap());
    let outbox = Outbox::default();
    {
        // Deployed inside the window: baseline does not count as a post.
        let mut eng = impact_engine(dir.path(), manual.clone()).await;
        eng.check(&outbox).await;
    }
    assert_eq!(outbox.len(), 1);

    manual.advance(Duration::minutes(20));
    let mut eng = impact_engine(dir.path(), manual.clone()).await;
    eng.check(&outbox).await;
    assert_eq!(outbox.len(), 1);
}

#[tokio::test]
async fn impact_render_groups_digits() {
    let dir = tempfile::tempdir().unwrap();
    let manual = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap());
    let mut eng = impact_engine(dir.path(), manual.clone()).await;
    let outbox = Outbox::default();
    eng.check(&outbox).await;

    let sent = outbox.0.lock().unwrap();
    let embed = &sent[0].embeds[0];
    let value = |name: &str| {
        embed
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone())
    };
    assert_eq!(value("Solar Panels Installed").as_deref(), Some("12,345"));
    assert_eq!(value("Adult Trees Equivalent").as_deref(), Some("987,654.321"));
    assert_eq!(value("Water Saved (Gallons)").as_deref(), Some("45,000,000"));
}
