use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::{SearchResult, VideoCandidate, VideoCatalog};

const YOUTUBE_API_URL: &str = "https://www.googleapis.com/youtube/v3";

/// YouTube Data API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_results: u32,
    pub timeout_seconds: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: YOUTUBE_API_URL.to_string(),
            max_results: 10,
            timeout_seconds: 30,
        }
    }
}

/// YouTube Data API v3 client
pub struct YouTubeClient {
    config: YouTubeConfig,
    api_key: String,
    client: reqwest::Client,
}

impl YouTubeClient {
    pub fn new(config: YouTubeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("YouTube API key required"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, api_key, client })
    }

    async fn search_request(&self, query: &str) -> Result<SearchResponse> {
        let url = format!("{}/search", self.config.base_url);
        let max_results = self.config.max_results.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query),
                ("part", "snippet"),
                ("type", "video"),
                ("videoDuration", "medium"),
                ("videoEmbeddable", "true"),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("YouTube search error {}: {}", status, text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl VideoCatalog for YouTubeClient {
    async fn search(&self, query: &str) -> Option<Vec<SearchResult>> {
        debug!("Searching YouTube for: {}", query);

        match self.search_request(query).await {
            Ok(response) => {
                let results = response.into_results();
                (!results.is_empty()).then_some(results)
            }
            Err(e) => {
                warn!("YouTube search failed for \"{}\": {}", query, e);
                None
            }
        }
    }

    async fn stats(&self, ids: &[String]) -> Result<Vec<VideoCandidate>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/videos", self.config.base_url);
        let joined = ids.join(",");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("id", joined.as_str()),
                ("part", "statistics,snippet"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("YouTube videos error {}: {}", status, text));
        }

        let videos: VideosResponse = response.json().await?;
        Ok(videos.into_candidates())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
}

impl SearchResponse {
    fn into_results(self) -> Vec<SearchResult> {
        self.items
            .into_iter()
            .filter_map(|item| {
                Some(SearchResult {
                    id: item.id.video_id?,
                    title: item.snippet.title,
                    description: item.snippet.description,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
}

/// Counts arrive as decimal strings; `likeCount` is missing when likes are hidden
#[derive(Debug, Default, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "likeCount")]
    like_count: Option<String>,
}

impl VideosResponse {
    fn into_candidates(self) -> Vec<VideoCandidate> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let Some(published_at) = item.snippet.published_at else {
                    warn!("Skipping video {} without publish date", item.id);
                    return None;
                };

                Some(VideoCandidate {
                    view_count: parse_count(item.statistics.view_count.as_deref()).unwrap_or(0),
                    like_count: parse_count(item.statistics.like_count.as_deref()),
                    id: item.id,
                    title: item.snippet.title,
                    description: item.snippet.description,
                    published_at,
                })
            })
            .collect()
    }
}

fn parse_count(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|value| value.trim().parse().ok())
}

/// Video id from a YouTube URL, or a bare 11-character id.
pub fn extract_video_id(input: &str) -> Option<String> {
    static URL_ID: OnceLock<Regex> = OnceLock::new();
    static BARE_ID: OnceLock<Regex> = OnceLock::new();

    let url_id = URL_ID.get_or_init(|| {
        Regex::new(r"(?:youtube\.com/(?:watch\?(?:[^&]*&)*v=|embed/|shorts/)|youtu\.be/)([A-Za-z0-9_-]{11})")
            .expect("video url pattern is valid")
    });
    let bare_id = BARE_ID.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("video id pattern is valid"));

    let input = input.trim();
    if let Some(id) = url_id.captures(input).and_then(|caps| caps.get(1)) {
        return Some(id.as_str().to_string());
    }
    bare_id.is_match(input).then(|| input.to_string())
}
