//! YouTube Data API search and plain HTTP downloads for the online track path.

use crate::selector::{Media, MediaFetcher, SearchHit, SearchProvider};
use anyhow::{bail, Context, Result};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::time::Duration;

const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

pub struct YouTubeSearch {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: Option<ItemId>,
    snippet: Option<Snippet>,
}

#[derive(Deserialize)]
struct ItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct Snippet {
    title: Option<String>,
}

impl YouTubeSearch {
    /// Search client. A missing key is allowed here; every query then fails
    /// and the selector falls back to the local library.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: YOUTUBE_SEARCH_URL.to_string(),
        })
    }

    /// Key from the environment, falling back to the configured one.
    #[must_use]
    pub fn resolve_api_key(configured: Option<&str>) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
    }

    /// Point at a different endpoint (mirrors, local test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn hits_from_response(response: SearchResponse) -> Vec<SearchHit> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id?.video_id.filter(|id| !id.is_empty())?;
            let title = item
                .snippet
                .and_then(|s| s.title)
                .unwrap_or_else(|| video_id.clone());
            Some(SearchHit::new(title, format!("{WATCH_URL}{video_id}")))
        })
        .collect()
}

impl SearchProvider for YouTubeSearch {
    fn query(&self, text: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let Some(api_key) = &self.api_key else {
            bail!("No YouTube API key configured (set {API_KEY_ENV})");
        };
        debug!("YouTube search: '{text}' (max {max_results})");

        let max_results = max_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("part", "id,snippet"),
                ("type", "video"),
                ("q", text),
                ("maxResults", max_results.as_str()),
                ("key", api_key.as_str()),
            ])
            .send()
            .context("YouTube search request failed")?;

        if !response.status().is_success() {
            bail!("YouTube search failed with status {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .context("Failed to parse YouTube search response")?;
        Ok(hits_from_response(body))
    }
}

/// Downloads media over HTTP(S).
///
/// Only `audio/*` and `video/*` responses count as media. A watch page or an
/// error page served as HTML is rejected, so the selector falls back to the
/// local library.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl MediaFetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<Media> {
        debug!("Fetching {uri}");
        let response = self
            .client
            .get(uri)
            .send()
            .with_context(|| format!("Failed to download {uri}"))?;

        if !response.status().is_success() {
            bail!("Download of {uri} failed with status {}", response.status());
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type)
            .unwrap_or_default();
        if !is_playable(&mime_type) {
            bail!("{uri} is not audio (content type `{mime_type}`)");
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("Failed to read body of {uri}"))?;
        if bytes.is_empty() {
            bail!("Download of {uri} returned no data");
        }
        Ok(Media::new(bytes.to_vec(), mime_type))
    }
}

/// `audio/ogg; codecs=opus` → `audio/ogg`
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_playable(mime_type: &str) -> bool {
    mime_type.starts_with("audio/") || mime_type.starts_with("video/")
}
