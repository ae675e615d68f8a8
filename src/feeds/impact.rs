//! Weekly impact-metrics post.
//!
//! Unlike the list feeds this one is cadence-gated: the single "item" per
//! poll is a metrics snapshot whose identity is the week it was observed in,
//! and it is only eligible inside the Sunday posting window. At most one
//! post per week, however often the numbers change.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::{Feed, JsonSource};
use crate::clock::SharedClock;
use crate::engine::FeedState;
use crate::notify::{Embed, EmbedField, EmbedFooter, Notification, COLOR_DEFAULT};

pub const DEFAULT_ENDPOINT: &str = "https://glow.org/api/impact-metrics";

/// Unix start of protocol week 0.
pub const GENESIS_TIMESTAMP: i64 = 1_700_352_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMetrics {
    pub solar_panels_installed: f64,
    pub adult_trees_equivalent: f64,
    pub flights_offset: f64,
    pub homes_powered: f64,
    pub asthma_attacks_prevented: f64,
    pub water_saved_gallons: f64,
    pub daily_needs_humans: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpactSnapshot {
    pub metrics: ImpactMetrics,
    pub observed_at: DateTime<Utc>,
}

/// Persisted as `{ "lastMetrics": {...} | null, "lastPostDate": ISO-8601 | null }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactState {
    pub last_metrics: Option<ImpactMetrics>,
    pub last_post_date: Option<DateTime<Utc>>,
}

impl FeedState<ImpactSnapshot> for ImpactState {
    fn is_empty(&self) -> bool {
        self.last_metrics.is_none() && self.last_post_date.is_none()
    }

    fn contains(&self, identity: &str) -> bool {
        self.last_post_date
            .is_some_and(|posted| week_key(posted) == identity)
    }

    /// Baseline only; the first window after deploy still posts.
    fn seed(&mut self, _identity: &str, item: &ImpactSnapshot, _at: DateTime<Utc>) {
        self.last_metrics = Some(item.metrics.clone());
    }

    fn record(&mut self, _identity: &str, item: &ImpactSnapshot, at: DateTime<Utc>) {
        self.last_metrics = Some(item.metrics.clone());
        self.last_post_date = Some(at);
    }
}

/// Sunday 00:00 UTC on or before `t`.
pub fn week_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let days_back = i64::from(t.weekday().num_days_from_sunday());
    let day = t.date_naive() - Duration::days(days_back);
    Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
}

/// `YYYY-MM-DD` of the week's Sunday.
pub fn week_key(t: DateTime<Utc>) -> String {
    week_start(t).format("%Y-%m-%d").to_string()
}

pub fn in_posting_window(now: DateTime<Utc>, post_hour: u32) -> bool {
    now.weekday() == Weekday::Sun && now.hour() == post_hour
}

/// Whole weeks since [`GENESIS_TIMESTAMP`].
pub fn protocol_week(now: DateTime<Utc>) -> i64 {
    (now.timestamp() - GENESIS_TIMESTAMP).div_euclid(7 * 24 * 3600)
}

/// `1234567.5` → `"1,234,567.5"` (at most three decimals).
pub fn group_thousands(v: f64) -> String {
    let neg = v < 0.0;
    let scaled = (v.abs() * 1000.0).round() as u64;
    let (int, frac) = (scaled / 1000, scaled % 1000);

    let digits = int.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 5);
    if neg && scaled > 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if frac > 0 {
        out.push('.');
        out.push_str(format!("{frac:03}").trim_end_matches('0'));
    }
    out
}

pub struct ImpactFeed {
    source: JsonSource,
    clock: SharedClock,
    post_hour: u32,
}

impl ImpactFeed {
    pub fn from_url(url: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            source: JsonSource::http(url),
            clock,
            post_hour: 0,
        }
    }

    pub fn from_fixture(json: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            source: JsonSource::fixture(json),
            clock,
            post_hour: 0,
        }
    }

    /// UTC hour on Sunday during which the weekly post goes out.
    pub fn with_post_hour(mut self, hour: u32) -> Self {
        self.post_hour = hour.min(23);
        self
    }
}

#[async_trait]
impl Feed for ImpactFeed {
    type Item = ImpactSnapshot;
    type State = ImpactState;

    fn id(&self) -> &str {
        "impact"
    }

    async fn fetch(&self) -> Result<Vec<ImpactSnapshot>> {
        let raw: serde_json::Map<String, serde_json::Value> = self.source.get("impact").await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let metrics: ImpactMetrics =
            serde_json::from_value(serde_json::Value::Object(raw)).context("impact metrics shape")?;
        Ok(vec![ImpactSnapshot {
            metrics,
            observed_at: self.clock.now(),
        }])
    }

    fn identity(&self, item: &ImpactSnapshot) -> String {
        week_key(item.observed_at)
    }

    fn occurred_at(&self, item: &ImpactSnapshot) -> DateTime<Utc> {
        item.observed_at
    }

    fn is_eligible(&self, _item: &ImpactSnapshot, now: DateTime<Utc>) -> bool {
        in_posting_window(now, self.post_hour)
    }

    /// Seeding only stores the metrics, never a post date.
    fn in_baseline(&self, _item: &ImpactSnapshot, _now: DateTime<Utc>) -> bool {
        true
    }

    fn render(&self, item: &ImpactSnapshot) -> Notification {
        let m = &item.metrics;
        let field = |name: &str, v: f64| EmbedField {
            name: name.to_string(),
            value: group_thousands(v),
            inline: false,
        };
        Notification::embed(Embed {
            title: Some("Glow Weekly Impact Metrics".to_string()),
            color: Some(COLOR_DEFAULT),
            timestamp: Some(item.observed_at.to_rfc3339()),
            fields: vec![
                field("Solar Panels Installed", m.solar_panels_installed),
                field("Adult Trees Equivalent", m.adult_trees_equivalent),
                field("Flights Offset", m.flights_offset),
                field("Homes Powered", m.homes_powered),
                field("Asthma Attacks Prevented", m.asthma_attacks_prevented),
                field("Water Saved (Gallons)", m.water_saved_gallons),
                field("Daily Needs for Humans", m.daily_needs_humans),
            ],
            footer: Some(EmbedFooter {
                text: format!(
                    "Data from Glow Impact API • Week {}",
                    protocol_week(item.observed_at)
                ),
            }),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_starts_on_sunday_midnight() {
        // 2025-10-15 is a Wednesday.
        let wed = Utc.with_ymd_and_hms(2025, 10, 15, 18, 30, 0).unwrap();
        assert_eq!(week_key(wed), "2025-10-12");
        let sun = Utc.with_ymd_and_hms(2025, 10, 12, 0, 5, 0).unwrap();
        assert_eq!(week_key(sun), "2025-10-12");
        let sat = Utc.with_ymd_and_hms(2025, 10, 18, 23, 59, 59).unwrap();
        assert_eq!(week_key(sat), "2025-10-12");
    }

    #[test]
    fn posting_window_is_one_sunday_hour() {
        let sun0 = Utc.with_ymd_and_hms(2025, 10, 12, 0, 42, 0).unwrap();
        assert!(in_posting_window(sun0, 0));
        assert!(!in_posting_window(sun0 + Duration::hours(1), 0));
        assert!(!in_posting_window(sun0 - Duration::days(1), 0));
        assert!(in_posting_window(sun0 + Duration::hours(15), 15));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0.0), "0");
        assert_eq!(group_thousands(999.0), "999");
        assert_eq!(group_thousands(1_234_567.0), "1,234,567");
        assert_eq!(group_thousands(1234.5), "1,234.5");
        assert_eq!(group_thousands(-12_000.25), "-12,000.25");
    }

    #[test]
    fn protocol_week_counts_from_genesis() {
        let genesis = Utc.timestamp_opt(GENESIS_TIMESTAMP, 0).unwrap();
        assert_eq!(protocol_week(genesis), 0);
        assert_eq!(protocol_week(genesis + Duration::days(7 * 3 + 2)), 3);
    }

    #[test]
    fn seed_keeps_window_open_and_record_closes_it() {
        let snap = ImpactSnapshot {
            metrics: ImpactMetrics {
                solar_panels_installed: 1.0,
                adult_trees_equivalent: 2.0,
                flights_offset: 3.0,
                homes_powered: 4.0,
                asthma_attacks_prevented: 5.0,
                water_saved_gallons: 6.0,
                daily_needs_humans: 7.0,
            },
            observed_at: Utc.with_ymd_and_hms(2025, 10, 12, 0, 10, 0).unwrap(),
        };
        let key = week_key(snap.observed_at);
        let mut st = ImpactState::default();
        assert!(st.is_empty());

        st.seed(&key, &snap, snap.observed_at);
        assert!(!st.is_empty());
        assert!(!st.contains(&key));

        st.record(&key, &snap, snap.observed_at);
        assert!(st.contains(&key));
        assert!(!st.contains("2025-10-19"));

        let json = serde_json::to_value(&st).unwrap();
        assert!(json.get("lastMetrics").is_some());
        assert!(json.get("lastPostDate").unwrap().is_string());
    }
}
