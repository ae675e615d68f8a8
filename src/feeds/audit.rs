use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{parse_timestamp, value_text, Feed, JsonSource};
use crate::engine::NotifiedSet;
use crate::notify::Notification;

pub const DEFAULT_ENDPOINT: &str =
    "https://gca-crm-backend-production-1f2a.up.railway.app/applications/completed";

/// Reports are published upstream a few minutes after an audit completes.
pub const DEFAULT_GRACE_SECS: i64 = 600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApplication {
    id: Option<serde_json::Value>,
    status: Option<String>,
    farm: Option<RawFarm>,
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFarm {
    id: Option<serde_json::Value>,
    audit_complete_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDevice {
    short_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedAudit {
    pub audit_id: String,
    pub farm_id: String,
    /// Device short ids joined with `-`; the dedup key.
    pub short_ids: String,
    pub completed_at: DateTime<Utc>,
}

pub struct AuditFeed {
    source: JsonSource,
    grace: Duration,
}

impl AuditFeed {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source: JsonSource::http(url),
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
        }
    }

    pub fn from_fixture(json: impl Into<String>) -> Self {
        Self {
            source: JsonSource::fixture(json),
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
        }
    }

    pub fn with_grace_secs(mut self, secs: i64) -> Self {
        self.grace = Duration::seconds(secs.max(0));
        self
    }

    fn parse(raw: Vec<RawApplication>) -> Vec<CompletedAudit> {
        raw.into_iter()
            .filter(|a| a.status.as_deref() == Some("completed"))
            .filter_map(|a| {
                let farm = a.farm?;
                let completed_at = parse_timestamp(farm.audit_complete_date.as_deref()?)?;
                let short_ids = a
                    .devices
                    .iter()
                    .filter_map(|d| d.short_id.as_ref().and_then(value_text))
                    .collect::<Vec<_>>()
                    .join("-");
                if short_ids.is_empty() {
                    return None;
                }
                Some(CompletedAudit {
                    audit_id: a.id.as_ref().and_then(value_text)?,
                    farm_id: farm.id.as_ref().and_then(value_text)?,
                    short_ids,
                    completed_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Feed for AuditFeed {
    type Item = CompletedAudit;
    type State = NotifiedSet;

    fn id(&self) -> &str {
        "audit"
    }

    async fn fetch(&self) -> Result<Vec<CompletedAudit>> {
        let raw: Vec<RawApplication> = self.source.get("audit").await?;
        Ok(Self::parse(raw))
    }

    fn identity(&self, item: &CompletedAudit) -> String {
        item.short_ids.clone()
    }

    fn occurred_at(&self, item: &CompletedAudit) -> DateTime<Utc> {
        item.completed_at
    }

    fn is_eligible(&self, item: &CompletedAudit, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(item.completed_at) >= self.grace
    }

    fn render(&self, item: &CompletedAudit) -> Notification {
        Notification::text(format!("https://www.glow.org/audits/{}", item.farm_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIXTURE: &str = r#"[
        {"id":"app-1","status":"completed","farm":{"id":"farm-1","auditCompleteDate":"2025-05-01T12:00:00Z"},"devices":[{"shortId":101},{"shortId":"102"}]},
        {"id":"app-2","status":"pending","farm":{"id":"farm-2","auditCompleteDate":"2025-05-01T12:00:00Z"},"devices":[{"shortId":201}]},
        {"id":"app-3","status":"completed","farm":{"id":"farm-3"},"devices":[{"shortId":301}]},
        {"id":"app-4","status":"completed","farm":{"id":"farm-4","auditCompleteDate":"2025-05-01T12:00:00Z"},"devices":[]}
    ]"#;

    #[tokio::test]
    async fn keeps_completed_dated_audits_with_devices() {
        let items = AuditFeed::from_fixture(FIXTURE).fetch().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].short_ids, "101-102");
        assert_eq!(items[0].farm_id, "farm-1");
    }

    #[test]
    fn grace_period_defers_fresh_audits() {
        let feed = AuditFeed::from_fixture("[]");
        let done = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let item = CompletedAudit {
            audit_id: "a".into(),
            farm_id: "f".into(),
            short_ids: "1".into(),
            completed_at: done,
        };
        assert!(!feed.is_eligible(&item, done + Duration::minutes(5)));
        assert!(feed.is_eligible(&item, done + Duration::minutes(10)));
        assert!(feed.is_eligible(&item, done + Duration::minutes(11)));
    }

    #[test]
    fn render_links_the_farm_audit_page() {
        let feed = AuditFeed::from_fixture("[]");
        let item = CompletedAudit {
            audit_id: "a".into(),
            farm_id: "farm-9".into(),
            short_ids: "1".into(),
            completed_at: Utc::now(),
        };
        assert_eq!(
            feed.render(&item).content.as_deref(),
            Some("https://www.glow.org/audits/farm-9")
        );
    }
}
