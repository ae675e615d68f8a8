pub mod discord;

use anyhow::Result;
use serde::Serialize;

pub use discord::DiscordNotifier;

/// One announcement for one remote item.
///
/// `follow_up` is sent as a separate plain message after the main one
/// (used for raw tweet links so Discord renders its native preview).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Notification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip)]
    pub follow_up: Option<String>,
}

impl Notification {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Default::default()
        }
    }

    pub fn with_follow_up(mut self, text: impl Into<String>) -> Self {
        self.follow_up = Some(text.into());
        self
    }

    /// Short human label for logs.
    pub fn summary(&self) -> String {
        if let Some(c) = &self.content {
            return c.clone();
        }
        self.embeds
            .first()
            .and_then(|e| e.title.clone())
            .unwrap_or_else(|| "<embed>".to_string())
    }
}

/// Subset of the Discord embed object that the monitors use.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

pub const COLOR_DEFAULT: u32 = 0x0099ff;
pub const COLOR_TWITTER: u32 = 0x1DA1F2;

/// Delivers a notification to a chat channel. `Ok` means delivered; the
/// engine only records an item as notified after `Ok`.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: &str, notification: &Notification) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Dry-run notifier: logs instead of posting.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel_id: &str, notification: &Notification) -> Result<()> {
        tracing::info!(
            target: "notify",
            channel = channel_id,
            message = %notification.summary(),
            follow_up = ?notification.follow_up,
            "dry-run notification"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
