use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;

use crate::ingest::types::{CandidateMeme, FetchError, SourceAdapter, SubSource};

/// Media extensions we accept from a hot listing. Everything else (galleries,
/// self posts, external articles) is skipped silently.
const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".mp4"];

// --- listing JSON shape (the slice of it we read) ---

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    permalink: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    stickied: bool,
}

pub struct RedditAdapter {
    mode: Mode,
}

enum Mode {
    /// Own copy of the listing body so tests can hand in any &str.
    Fixture(String),
    Http {
        base_url: String,
        client: reqwest::Client,
    },
}

impl RedditAdapter {
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    /// HTTP mode against a listing endpoint base (normally
    /// `https://www.reddit.com`). Redirects are not followed: a redirect on
    /// a subreddit listing means the subreddit is gone or renamed, and the
    /// caller needs to see that as a permanent error.
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

    fn parse_listing(
        sub: &SubSource,
        body: &str,
        limit: usize,
    ) -> Result<Vec<CandidateMeme>, FetchError> {
        let listing: Listing = serde_json::from_str(body)
            .context("parsing reddit listing json")
            .map_err(FetchError::Transient)?;

        let mut out = Vec::new();
        for child in listing.data.children.into_iter().take(limit) {
            let post = child.data;
            if post.stickied || !has_allowed_extension(&post.url) {
                continue;
            }
            out.push(CandidateMeme {
                source_url: format!("https://reddit.com{}", post.permalink),
                title: post.title,
                media_url: post.url,
                sub_source: sub.name.clone(),
                category: sub.category.clone(),
                created_at: DateTime::from_timestamp(post.created_utc as i64, 0)
                    .unwrap_or_else(Utc::now),
            });
        }
        counter!("harvest_items_polled_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for RedditAdapter {
    async fn poll(&self, sub: &SubSource, limit: usize) -> Result<Vec<CandidateMeme>, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_listing(sub, body, limit),
            Mode::Http { base_url, client } => {
                let url = format!("{base_url}/r/{}/hot.json?limit={limit}&raw_json=1", sub.name);
                let resp = client
                    .get(&url)
                    .send()
                    .await
                    .context("reddit listing request")
                    .map_err(FetchError::Transient)?;

                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Err(FetchError::NotFound(sub.name.clone()));
                }
                if status.is_redirection() {
                    return Err(FetchError::Redirected(sub.name.clone()));
                }
                if !status.is_success() {
                    return Err(FetchError::Transient(anyhow!(
                        "reddit listing for '{}' returned status {status}",
                        sub.name
                    )));
                }

                let body = resp
                    .text()
                    .await
                    .context("reading reddit listing body")
                    .map_err(FetchError::Transient)?;
                Self::parse_listing(sub, &body, limit)
            }
        }
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

fn has_allowed_extension(url: &str) -> bool {
    // Query strings don't count toward the extension.
    let path = url.split('?').next().unwrap_or(url).to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter_ignores_query_strings_and_case() {
        assert!(has_allowed_extension("https://i.redd.it/abc.JPG"));
        assert!(has_allowed_extension("https://i.redd.it/abc.gif?width=640"));
        assert!(!has_allowed_extension("https://reddit.com/gallery/abc"));
        assert!(!has_allowed_extension("https://example.com/article.html"));
    }
}
