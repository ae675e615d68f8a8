use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use super::{non_empty, parse_timestamp, Feed, JsonSource};
use crate::engine::NotifiedSet;
use crate::notify::{
    Embed, EmbedAuthor, EmbedFooter, EmbedMedia, Notification, COLOR_DEFAULT, COLOR_TWITTER,
};

pub const DEFAULT_ENDPOINT: &str = "https://glow.org/api/press";
const SITE: &str = "https://glow.org";
const BRANDING_THUMBNAIL: &str =
    "https://glow.org/_next/image?url=%2Fimages%2Fbranding.jpg&w=3840&q=75";
const TWITTER_ICON: &str = "https://abs.twimg.com/icons/apple-touch-icon-192x192.png";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPress {
    href: Option<String>,
    title: Option<String>,
    media: Option<String>,
    date: Option<String>,
    excerpt: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    image: Option<String>,
    #[serde(default)]
    is_twitter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PressPost {
    pub href: String,
    pub title: String,
    pub media: String,
    pub date: String,
    pub published_at: DateTime<Utc>,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub image: Option<String>,
    pub is_twitter: bool,
}

impl PressPost {
    /// Tweets link through fxtwitter so Discord renders a proper preview.
    pub fn embed_url(&self) -> String {
        if !self.is_twitter {
            return self.href.clone();
        }
        let Ok(mut url) = Url::parse(&self.href) else {
            return self.href.clone();
        };
        let is_tweet_host = matches!(
            url.host_str(),
            Some("x.com" | "www.x.com" | "twitter.com" | "www.twitter.com" | "mobile.twitter.com")
        );
        if is_tweet_host && url.set_host(Some("fxtwitter.com")).is_ok() {
            return url.into();
        }
        self.href.clone()
    }

    fn image_url(&self) -> Option<String> {
        self.image.as_ref().map(|img| {
            if img.starts_with("http") {
                img.clone()
            } else {
                format!("{SITE}{img}")
            }
        })
    }
}

pub struct PressFeed {
    source: JsonSource,
}

impl PressFeed {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source: JsonSource::http(url),
        }
    }

    pub fn from_fixture(json: impl Into<String>) -> Self {
        Self {
            source: JsonSource::fixture(json),
        }
    }

    fn parse(raw: Vec<RawPress>) -> Vec<PressPost> {
        let mut out = Vec::with_capacity(raw.len());
        for p in raw {
            let (Some(href), Some(title), Some(date)) =
                (non_empty(p.href), non_empty(p.title), non_empty(p.date))
            else {
                continue;
            };
            let Some(published_at) = parse_timestamp(&date) else {
                tracing::debug!(feed = "press", %href, %date, "unparseable date");
                continue;
            };
            out.push(PressPost {
                href,
                title,
                media: non_empty(p.media).unwrap_or_else(|| "Unknown".to_string()),
                date,
                published_at,
                excerpt: p.excerpt.unwrap_or_default(),
                tags: p.tags.into_iter().filter(|t| !t.trim().is_empty()).collect(),
                image: non_empty(p.image),
                is_twitter: p.is_twitter,
            });
        }
        out
    }
}

#[async_trait]
impl Feed for PressFeed {
    type Item = PressPost;
    type State = NotifiedSet;

    fn id(&self) -> &str {
        "press"
    }

    async fn fetch(&self) -> Result<Vec<PressPost>> {
        let raw: Vec<RawPress> = self.source.get("press").await?;
        Ok(Self::parse(raw))
    }

    fn identity(&self, item: &PressPost) -> String {
        item.href.clone()
    }

    fn occurred_at(&self, item: &PressPost) -> DateTime<Utc> {
        item.published_at
    }

    fn render(&self, p: &PressPost) -> Notification {
        let embed_url = p.embed_url();
        let tags = p.tags.join(" • ");

        let mut embed = Embed {
            title: Some(p.title.clone()),
            url: Some(embed_url.clone()),
            timestamp: Some(p.published_at.to_rfc3339()),
            image: p.image_url().map(|url| EmbedMedia { url }),
            ..Default::default()
        };

        if p.is_twitter {
            embed.color = Some(COLOR_TWITTER);
            embed.author = Some(EmbedAuthor {
                name: format!("🐦 {}", p.media),
                url: Some(embed_url.clone()),
                icon_url: Some(TWITTER_ICON.to_string()),
            });
            embed.description = Some(format!("{}\n\n[View on Twitter →]({embed_url})", p.excerpt));
            let footer = ["Twitter".to_string(), tags, p.date.clone()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" • ");
            embed.footer = Some(EmbedFooter { text: footer });
            return Notification::embed(embed).with_follow_up(embed_url);
        }

        embed.color = Some(COLOR_DEFAULT);
        embed.author = Some(EmbedAuthor {
            name: format!("📰 {}", p.media),
            url: Some(p.href.clone()),
            icon_url: None,
        });
        embed.description = Some(p.excerpt.clone()).filter(|d| !d.is_empty());
        let published = format!("Published on {}", p.date);
        embed.footer = Some(EmbedFooter {
            text: if tags.is_empty() {
                published
            } else {
                format!("{tags} • {published}")
            },
        });
        if embed.image.is_none() {
            embed.thumbnail = Some(EmbedMedia {
                url: BRANDING_THUMBNAIL.to_string(),
            });
        }
        Notification::embed(embed)
    }
}
