/// Video discovery and ranking
///
/// Candidates come from a [`VideoCatalog`] (the YouTube Data API in
/// production), are filtered and scored by [`VideoRanker`], and the best
/// survivor becomes the source video of a chapter.
pub mod ranking;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub use ranking::{RankingConfig, VideoRanker};
pub use youtube::{extract_video_id, YouTubeClient};

/// Search hit before statistics are known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Video metadata used for ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub view_count: u64,
    /// Absent when the uploader disabled likes
    pub like_count: Option<u64>,
    pub published_at: DateTime<Utc>,
}

/// A candidate that passed the hard filter, with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedVideo {
    #[serde(flatten)]
    pub video: VideoCandidate,
    pub score: f64,
}

impl RankedVideo {
    pub fn id(&self) -> &str {
        &self.video.id
    }
}

/// Search and statistics lookups against a video platform
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// `None` when the search itself failed or returned nothing usable
    async fn search(&self, query: &str) -> Option<Vec<SearchResult>>;

    /// Statistics for the given ids, in the order the platform returns them
    async fn stats(&self, ids: &[String]) -> Result<Vec<VideoCandidate>>;
}

/// Search, fetch statistics, rank.
#[derive(Clone)]
pub struct VideoFinder {
    catalog: Arc<dyn VideoCatalog>,
    ranker: VideoRanker,
}

impl VideoFinder {
    pub fn new(catalog: Arc<dyn VideoCatalog>, ranker: VideoRanker) -> Self {
        Self { catalog, ranker }
    }

    /// Ranked candidates for `query`, best first.
    ///
    /// Empty when the search fails or nothing survives the hard filter; the
    /// caller decides whether to broaden the query or give up.
    pub async fn ranked_videos(&self, query: &str) -> Vec<RankedVideo> {
        let Some(results) = self.catalog.search(query).await else {
            warn!("Video search returned nothing for query: {}", query);
            return Vec::new();
        };
        if results.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = results.into_iter().map(|r| r.id).collect();
        let candidates = match self.catalog.stats(&ids).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Failed to fetch statistics for {} videos: {}", ids.len(), e);
                return Vec::new();
            }
        };

        let ranked = self.ranker.rank(candidates);
        info!("🎬 {} of {} videos acceptable for \"{}\"", ranked.len(), ids.len(), query);
        ranked
    }

    /// The single best video for `query`, if any.
    pub async fn best_video(&self, query: &str) -> Option<RankedVideo> {
        self.ranked_videos(query).await.into_iter().next()
    }
}
