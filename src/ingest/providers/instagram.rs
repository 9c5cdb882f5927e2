use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::ingest::types::{CandidateMeme, FetchError, SourceAdapter, SubSource};

// --- media feed JSON shape ---

#[derive(Debug, Deserialize)]
struct MediaFeed {
    #[serde(default)]
    items: Vec<MediaItem>,
}

#[derive(Debug, Deserialize)]
struct MediaItem {
    code: String,
    /// 1 = image, 2 = video. Carousels and anything newer are skipped.
    media_type: u8,
    #[serde(default)]
    taken_at: i64,
    #[serde(default)]
    caption: Option<Caption>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    /// Served best-quality-first by the API.
    #[serde(default)]
    video_versions: Vec<VideoVersion>,
}

#[derive(Debug, Deserialize)]
struct Caption {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct VideoVersion {
    url: String,
}

pub struct InstagramAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl InstagramAdapter {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("meme-harvester/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http {
                base_url: base_url.into(),
                client,
            },
        }
    }

    fn parse_feed(
        sub: &SubSource,
        body: &str,
        limit: usize,
    ) -> Result<Vec<CandidateMeme>, FetchError> {
        let feed: MediaFeed = serde_json::from_str(body)
            .context("parsing instagram media json")
            .map_err(FetchError::Transient)?;

        let mut out = Vec::new();
        for item in feed.items.into_iter().take(limit) {
            // Images use the thumbnail; videos use the top (highest quality)
            // direct rendition.
            let media_url = match item.media_type {
                1 => item.thumbnail_url,
                2 => item.video_versions.into_iter().next().map(|v| v.url),
                _ => None,
            };
            let Some(media_url) = media_url else { continue };

            out.push(CandidateMeme {
                source_url: format!("https://instagram.com/p/{}/", item.code),
                title: item.caption.map(|c| c.text).unwrap_or_default(),
                media_url,
                sub_source: sub.name.clone(),
                category: sub.category.clone(),
                created_at: DateTime::from_timestamp(item.taken_at, 0).unwrap_or_else(Utc::now),
            });
        }
        counter!("harvest_items_polled_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for InstagramAdapter {
    async fn poll(&self, sub: &SubSource, limit: usize) -> Result<Vec<CandidateMeme>, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_feed(sub, body, limit),
            Mode::Http { base_url, client } => {
                let url = format!("{base_url}/api/v1/users/{}/media?count={limit}", sub.name);
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .context("instagram media request")
                    .map_err(FetchError::Transient)?;

                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(FetchError::NotFound(sub.name.clone()));
                }
                if status.is_redirection() {
                    return Err(FetchError::Redirected(sub.name.clone()));
                }
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return Err(FetchError::Transient(anyhow!(
                        "instagram rate limited account '{}'",
                        sub.name
                    )));
                }
                if !status.is_success() {
                    return Err(FetchError::Transient(anyhow!(
                        "instagram media for '{}' returned status {status}",
                        sub.name
                    )));
                }

                let body = resp
                    .text()
                    .await
                    .context("reading instagram media body")
                    .map_err(FetchError::Transient)?;
                Self::parse_feed(sub, &body, limit)
            }
        }
    }

    fn name(&self) -> &'static str {
        "instagram"
    }
}
