use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;

use super::{non_empty, parse_timestamp, Feed, JsonSource};
use crate::engine::NotifiedSet;
use crate::notify::{Embed, EmbedAuthor, EmbedFooter, EmbedMedia, Notification, COLOR_DEFAULT};

pub const DEFAULT_ENDPOINT: &str = "https://glow.org/api/blog";
const SITE: &str = "https://glow.org";
const BRANDING_IMAGE: &str = "/images/branding.jpg";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPost {
    slug: Option<String>,
    title: Option<String>,
    description: Option<String>,
    author: Option<RawAuthor>,
    published_at: Option<String>,
    image: Option<String>,
    #[serde(default)]
    hidden: bool,
    category: Option<String>,
    read_time: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlogPost {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub avatar: Option<String>,
    pub published: String,
    pub published_at: DateTime<Utc>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub read_time: Option<String>,
}

impl BlogPost {
    pub fn link(&self) -> String {
        format!("{SITE}/blog/{}", self.slug)
    }
}

pub struct BlogFeed {
    source: JsonSource,
}

impl BlogFeed {
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

    fn parse(raw: Vec<RawPost>) -> Vec<BlogPost> {
        let mut out = Vec::with_capacity(raw.len());
        for p in raw {
            if p.hidden {
                continue;
            }
            let (Some(slug), Some(title), Some(published)) = (
                non_empty(p.slug),
                non_empty(p.title),
                non_empty(p.published_at),
            ) else {
                continue;
            };
            let Some(published_at) = parse_timestamp(&published) else {
                tracing::debug!(feed = "blog", %slug, %published, "unparseable publishedAt");
                continue;
            };
            let (author, avatar) = match p.author {
                Some(a) => (
                    non_empty(a.name).unwrap_or_else(|| "Unknown".to_string()),
                    non_empty(a.avatar),
                ),
                None => ("Unknown".to_string(), None),
            };
            out.push(BlogPost {
                slug,
                title,
                description: p.description.unwrap_or_default(),
                author,
                avatar,
                published,
                published_at,
                image: non_empty(p.image),
                category: non_empty(p.category),
                read_time: p.read_time.as_ref().and_then(super::value_text),
            });
        }
        out
    }
}

/// Routes an image path through the site's Next.js image proxy.
fn proxied_image(path: &str, width: u32) -> Option<String> {
    let w = width.to_string();
    Url::parse_with_params(
        &format!("{SITE}/_next/image"),
        &[("url", path), ("w", w.as_str()), ("q", "75")],
    )
    .ok()
    .map(String::from)
}

#[async_trait]
impl Feed for BlogFeed {
    type Item = BlogPost;
    type State = NotifiedSet;

    fn id(&self) -> &str {
        "blog"
    }

    async fn fetch(&self) -> Result<Vec<BlogPost>> {
        let raw: Vec<RawPost> = self.source.get("blog").await?;
        Ok(Self::parse(raw))
    }

    fn identity(&self, item: &BlogPost) -> String {
        item.slug.clone()
    }

    fn occurred_at(&self, item: &BlogPost) -> DateTime<Utc> {
        item.published_at
    }

    fn render(&self, p: &BlogPost) -> Notification {
        let link = p.link();
        let footer = [
            p.category.clone(),
            p.read_time.clone(),
            Some(format!("Published on {}", p.published)),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" • ");

        let (image, thumbnail) = match &p.image {
            Some(img) => (proxied_image(img, 3840), None),
            None => (None, proxied_image(BRANDING_IMAGE, 3840)),
        };

        Notification::embed(Embed {
            title: Some(p.title.clone()),
            description: Some(p.description.clone()).filter(|d| !d.is_empty()),
            url: Some(link.clone()),
            color: Some(COLOR_DEFAULT),
            author: Some(EmbedAuthor {
                name: format!("Check out the new blog post from {}!", p.author),
                url: Some(link),
                icon_url: p.avatar.as_deref().and_then(|a| proxied_image(a, 96)),
            }),
            footer: Some(EmbedFooter { text: footer }),
            image: image.map(|url| EmbedMedia { url }),
            thumbnail: thumbnail.map(|url| EmbedMedia { url }),
            ..Default::default()
        })
    }
}
