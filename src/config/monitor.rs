// src/config/monitor.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::feeds::{audit, blog, impact, press, youtube};

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

pub const ENV_DISCORD_TOKEN: &str = "DISCORD_BOT_TOKEN";
pub const ENV_YOUTUBE_API_KEY: &str = "YOUTUBE_API_KEY";
pub const ENV_DRY_RUN: &str = "MONITOR_DRY_RUN";

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    120
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("db")
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_notify_timeout_secs() -> u64 {
    15
}
fn default_discord_timeout_secs() -> u64 {
    5
}
fn default_discord_retries() -> u8 {
    3
}
fn default_grace_secs() -> i64 {
    audit::DEFAULT_GRACE_SECS
}
fn default_max_results() -> u32 {
    youtube::DEFAULT_MAX_RESULTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between polling ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Directory holding one `<feed>.json` state record per feed.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
    /// e.g. "0.0.0.0:9100"; no metrics server when absent.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub blog: FeedConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub press: FeedConfig,
    #[serde(default)]
    pub impact: ImpactConfig,
    #[serde(default)]
    pub youtube: Vec<YouTubeChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Default destination for every feed without its own `channel_id`.
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default = "default_discord_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_discord_retries")]
    pub max_retries: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(flatten)]
    pub feed: FeedConfig,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpactConfig {
    #[serde(flatten)]
    pub feed: FeedConfig,
    /// Sunday hour (UTC) of the weekly post.
    #[serde(default)]
    pub post_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YouTubeChannelConfig {
    pub label: String,
    pub channel_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub discord_channel_id: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            state_dir: default_state_dir(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
            metrics_addr: None,
            discord: DiscordConfig::default(),
            blog: FeedConfig::default(),
            audit: AuditConfig::default(),
            press: FeedConfig::default(),
            impact: ImpactConfig::default(),
            youtube: Vec::new(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            timeout_secs: default_discord_timeout_secs(),
            max_retries: default_discord_retries(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            channel_id: None,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            post_hour: 0,
        }
    }
}

impl FeedConfig {
    pub fn endpoint_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint.as_deref().unwrap_or(default)
    }
}

impl MonitorConfig {
    /// Load and validate a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config from {}", path.display()))?;
        let cfg: MonitorConfig = toml::from_str(&content)
            .with_context(|| format!("parsing monitor config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config using env var + fallbacks:
    /// 1) $MONITOR_CONFIG_PATH
    /// 2) config/monitor.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            return Self::load_from(&pb);
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("interval_secs must be > 0");
        }
        if self.impact.post_hour > 23 {
            bail!("impact.post_hour must be 0..=23, got {}", self.impact.post_hour);
        }
        let mut labels = std::collections::BTreeSet::new();
        for yt in &self.youtube {
            if yt.label.trim().is_empty() || yt.channel_id.trim().is_empty() {
                bail!("youtube entries need a non-empty label and channel_id");
            }
            if !is_safe_label(yt.label.trim()) {
                bail!(
                    "youtube label {:?} must not contain path separators or '..'",
                    yt.label
                );
            }
            if !labels.insert(yt.label.trim()) {
                bail!("duplicate youtube label {:?}", yt.label);
            }
        }
        Ok(())
    }

    /// Destination for a feed: its override, else the `[discord]` default.
    pub fn channel_for(&self, feed_id: &str, feed_override: Option<&str>) -> Result<String> {
        feed_override
            .or(self.discord.channel_id.as_deref())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow!("feed {feed_id}: no channel_id and no [discord].channel_id default")
            })
    }

    pub fn blog_endpoint(&self) -> &str {
        self.blog.endpoint_or(blog::DEFAULT_ENDPOINT)
    }

    pub fn press_endpoint(&self) -> &str {
        self.press.endpoint_or(press::DEFAULT_ENDPOINT)
    }

    pub fn audit_endpoint(&self) -> &str {
        self.audit.feed.endpoint_or(audit::DEFAULT_ENDPOINT)
    }

    pub fn impact_endpoint(&self) -> &str {
        self.impact.feed.endpoint_or(impact::DEFAULT_ENDPOINT)
    }
}

/// Labels become `<state_dir>/youtube-<label>.json`.
fn is_safe_label(label: &str) -> bool {
    !label.contains(['/', '\\']) && !label.contains("..")
}

/// Credentials read from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub discord_token: Option<String>,
    pub youtube_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("discord_token", &self.discord_token.as_ref().map(|_| "***"))
            .field("youtube_api_key", &self.youtube_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Secrets {
    pub fn from_env() -> Self {
        let read = |k: &str| env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self {
            discord_token: read(ENV_DISCORD_TOKEN),
            youtube_api_key: read(ENV_YOUTUBE_API_KEY),
        }
    }
}

/// `MONITOR_DRY_RUN=1` logs notifications instead of posting them.
pub fn dry_run_from_env() -> bool {
    env::var(ENV_DRY_RUN)
        .ok()
        .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: MonitorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.interval_secs, 120);
        assert_eq!(cfg.state_dir, PathBuf::from("db"));
        assert!(cfg.blog.enabled && cfg.audit.feed.enabled && cfg.press.enabled);
        assert_eq!(cfg.audit.grace_secs, 600);
        assert_eq!(cfg.blog_endpoint(), blog::DEFAULT_ENDPOINT);
        assert!(cfg.youtube.is_empty());
    }

    #[test]
    fn channel_override_wins_over_default() {
        let cfg: MonitorConfig = toml::from_str(
            r#"
[discord]
channel_id = "100"

[press]
channel_id = "200"
"#,
        )
        .unwrap();
        assert_eq!(cfg.channel_for("blog", cfg.blog.channel_id.as_deref()).unwrap(), "100");
        assert_eq!(cfg.channel_for("press", cfg.press.channel_id.as_deref()).unwrap(), "200");
    }

    #[test]
    fn missing_channel_is_an_error() {
        let cfg = MonitorConfig::default();
        assert!(cfg.channel_for("blog", None).is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad_hour: MonitorConfig = toml::from_str("[impact]\npost_hour = 24").unwrap();
        assert!(bad_hour.validate().is_err());

        let dup: MonitorConfig = toml::from_str(
            r#"
[[youtube]]
label = "main"
channel_id = "UC1"

[[youtube]]
label = "main"
channel_id = "UC2"
"#,
        )
        .unwrap();
        assert!(dup.validate().is_err());
    }

    #[test]
    fn youtube_labels_cannot_escape_the_state_dir() {
        for label in ["../etc", "a/b", "a\\b", "..", "x..y"] {
            let cfg = MonitorConfig {
                youtube: vec![YouTubeChannelConfig {
                    label: label.to_string(),
                    channel_id: "UC1".into(),
                    enabled: true,
                    max_results: 5,
                    discord_channel_id: None,
                }],
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "{label:?} accepted");
        }
        let ok: MonitorConfig =
            toml::from_str("[[youtube]]\nlabel = \"glow-main_2\"\nchannel_id = \"UC1\"").unwrap();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn audit_and_impact_share_the_feed_fields() {
        let cfg: MonitorConfig = toml::from_str(
            r#"
[audit]
enabled = false
endpoint = "http://localhost/audits"
grace_secs = 60

[impact]
channel_id = "9"
post_hour = 3
"#,
        )
        .unwrap();
        assert!(!cfg.audit.feed.enabled);
        assert_eq!(cfg.audit_endpoint(), "http://localhost/audits");
        assert_eq!(cfg.audit.grace_secs, 60);
        assert_eq!(cfg.impact.feed.channel_id.as_deref(), Some("9"));
        assert_eq!(cfg.impact_endpoint(), impact::DEFAULT_ENDPOINT);
        assert_eq!(cfg.impact.post_hour, 3);
    }
}
