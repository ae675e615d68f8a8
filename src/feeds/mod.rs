// src/feeds/mod.rs
pub mod audit;
pub mod blog;
pub mod impact;
pub mod press;
pub mod youtube;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::engine::FeedState;
use crate::notify::Notification;

/// A named external source of dedup-tracked items.
///
/// Adapters supply fetch/identity/eligibility/render; the engine owns the
/// diffing, ordering and persistence.
#[async_trait::async_trait]
pub trait Feed: Send + Sync {
    type Item: Send + Sync;
    type State: FeedState<Self::Item>;

    fn id(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<Self::Item>>;

    /// Stable dedup key.
    fn identity(&self, item: &Self::Item) -> String;

    /// Used to announce new items oldest first.
    fn occurred_at(&self, item: &Self::Item) -> DateTime<Utc>;

    /// Feed-specific gate on top of novelty. Items failing it are deferred,
    /// not recorded.
    fn is_eligible(&self, _item: &Self::Item, _now: DateTime<Utc>) -> bool {
        true
    }

    /// Whether first-run seeding may absorb `item`. Items left out are
    /// announced once they become eligible.
    fn in_baseline(&self, item: &Self::Item, now: DateTime<Utc>) -> bool {
        self.is_eligible(item, now)
    }

    fn render(&self, item: &Self::Item) -> Notification;
}

/// Where a feed reads its JSON from.
#[derive(Debug, Clone)]
pub enum JsonSource {
    /// In-memory body (tests, probes).
    Fixture(String),
    Http { url: String, client: Client },
}

impl JsonSource {
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            client: Client::new(),
        }
    }

    pub fn fixture(body: impl Into<String>) -> Self {
        Self::Fixture(body.into())
    }

    pub async fn get<T: DeserializeOwned>(&self, what: &str) -> Result<T> {
        match self {
            JsonSource::Fixture(body) => {
                serde_json::from_str(body).with_context(|| format!("parsing {what} fixture"))
            }
            JsonSource::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("{what} http get()"))?
                    .error_for_status()
                    .with_context(|| format!("{what} non-2xx"))?
                    .text()
                    .await
                    .with_context(|| format!("{what} http .text()"))?;
                serde_json::from_str(&body).with_context(|| format!("parsing {what} json"))
            }
        }
    }
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC) or a
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Upstream ids arrive as either JSON strings or numbers.
pub(crate) fn value_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_in_several_shapes() {
        let want = Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-04"), Some(want));
        assert_eq!(parse_timestamp("2025-03-04T00:00:00Z"), Some(want));
        assert_eq!(parse_timestamp("2025-03-04T01:00:00+01:00"), Some(want));
        assert_eq!(parse_timestamp("2025-03-04T00:00:00.000"), Some(want));
        assert_eq!(parse_timestamp("last tuesday"), None);
    }

    #[test]
    fn ids_from_strings_and_numbers() {
        assert_eq!(value_text(&serde_json::json!(42)), Some("42".into()));
        assert_eq!(value_text(&serde_json::json!(" ab ")), Some("ab".into()));
        assert_eq!(value_text(&serde_json::json!("")), None);
        assert_eq!(value_text(&serde_json::json!(null)), None);
    }

    #[tokio::test]
    async fn fixture_source_reports_bad_json() {
        let src = JsonSource::fixture("{not json");
        let res: Result<Vec<String>> = src.get("blog").await;
        assert!(res.is_err());
    }
}
