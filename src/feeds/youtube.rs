use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use super::{non_empty, parse_timestamp, Feed, JsonSource};
use crate::engine::NotifiedSet;
use crate::notify::Notification;

pub const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";
pub const DEFAULT_MAX_RESULTS: u32 = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub video_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
}

impl Video {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

/// Latest uploads of one YouTube channel.
pub struct YouTubeFeed {
    id: String,
    source: JsonSource,
}

impl YouTubeFeed {
    /// `label` names the feed (`youtube-<label>`) and its state file.
    pub fn new(label: &str, api_key: &str, channel_id: &str, max_results: u32) -> Result<Self> {
        let max = max_results.clamp(1, 50).to_string();
        let url = Url::parse_with_params(
            SEARCH_ENDPOINT,
            &[
                ("key", api_key),
                ("channelId", channel_id),
                ("part", "snippet,id"),
                ("order", "date"),
                ("maxResults", max.as_str()),
                ("type", "video"),
            ],
        )
        .context("building youtube search url")?;
        Ok(Self {
            id: feed_id(label),
            source: JsonSource::http(url.as_str()),
        })
    }

    pub fn from_fixture(label: &str, json: impl Into<String>) -> Self {
        Self {
            id: feed_id(label),
            source: JsonSource::fixture(json),
        }
    }
}

pub fn feed_id(label: &str) -> String {
    format!("youtube-{}", label.trim())
}

#[async_trait]
impl Feed for YouTubeFeed {
    type Item = Video;
    type State = NotifiedSet;

    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<Video>> {
        let rsp: SearchResponse = self.source.get("youtube").await?;
        Ok(rsp
            .items
            .into_iter()
            .filter_map(|it| {
                let video_id = non_empty(it.id.video_id)?;
                let snippet = it.snippet?;
                let published_at = parse_timestamp(snippet.published_at.as_deref()?)?;
                Some(Video {
                    video_id,
                    title: snippet.title.unwrap_or_default(),
                    published_at,
                })
            })
            .collect())
    }

    fn identity(&self, item: &Video) -> String {
        item.video_id.clone()
    }

    fn occurred_at(&self, item: &Video) -> DateTime<Utc> {
        item.published_at
    }

    fn render(&self, item: &Video) -> Notification {
        Notification::text(format!("New video posted: {}", item.watch_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_videos_and_skips_channels_and_playlists() {
        let json = r#"{"items":[
            {"id":{"kind":"youtube#video","videoId":"v2"},"snippet":{"publishedAt":"2025-03-02T00:00:00Z","title":"Two"}},
            {"id":{"kind":"youtube#channel","channelId":"UC1"},"snippet":{"publishedAt":"2020-01-01T00:00:00Z"}},
            {"id":{"kind":"youtube#video","videoId":"v1"},"snippet":{"publishedAt":"2025-03-01T00:00:00Z","title":"One"}}
        ]}"#;
        let feed = YouTubeFeed::from_fixture("main", json);
        assert_eq!(feed.id(), "youtube-main");
        let vids = feed.fetch().await.unwrap();
        let ids: Vec<_> = vids.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["v2", "v1"]);
        assert_eq!(
            feed.render(&vids[1]).content.as_deref(),
            Some("New video posted: https://www.youtube.com/watch?v=v1")
        );
    }

    #[test]
    fn search_url_carries_channel_and_ordering() {
        let feed = YouTubeFeed::new("regen", "KEY", "UCabc", 500).unwrap();
        let JsonSource::Http { url, .. } = &feed.source else {
            panic!("expected http source");
        };
        assert!(url.starts_with(SEARCH_ENDPOINT));
        assert!(url.contains("channelId=UCabc"));
        assert!(url.contains("order=date"));
        assert!(url.contains("maxResults=50"));
    }
}
