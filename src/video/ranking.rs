use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{RankedVideo, VideoCandidate};

const SECONDS_PER_DAY: f64 = 86_400.0;
const RECENCY_WINDOW_DAYS: f64 = 365.0;

/// Hard-filter floors and scoring weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Candidates with fewer views are dropped
    pub min_view_count: u64,
    /// Candidates whose like/view ratio is below this are dropped (only when likes are visible)
    pub min_like_ratio: f64,
    pub weight_ratio: f64,
    pub weight_views: f64,
    pub weight_recency: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_view_count: 10_000,
            min_like_ratio: 0.02,
            weight_ratio: 0.4,
            weight_views: 0.25,
            weight_recency: 0.1,
        }
    }
}

/// Two-tier ranking: pass/fail filter, then a weighted score.
#[derive(Debug, Clone, Default)]
pub struct VideoRanker {
    config: RankingConfig,
}

impl VideoRanker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Rank against the current time.
    pub fn rank(&self, candidates: Vec<VideoCandidate>) -> Vec<RankedVideo> {
        self.rank_at(candidates, Utc::now())
    }

    /// Filter, score and sort descending. Equal scores keep input order.
    pub fn rank_at(&self, candidates: Vec<VideoCandidate>, now: DateTime<Utc>) -> Vec<RankedVideo> {
        let total = candidates.len();

        let mut ranked: Vec<RankedVideo> = candidates
            .into_iter()
            .filter(|candidate| self.passes_filter(candidate))
            .map(|video| {
                let score = self.score(&video, now);
                RankedVideo { video, score }
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!("Ranked {} of {} candidates", ranked.len(), total);
        ranked
    }

    /// Tier 1. A hidden like count never fails the ratio check.
    pub fn passes_filter(&self, candidate: &VideoCandidate) -> bool {
        if candidate.view_count < self.config.min_view_count {
            return false;
        }

        match candidate.like_count {
            Some(likes) if likes > 0 && candidate.view_count > 0 => {
                likes as f64 / candidate.view_count as f64 >= self.config.min_like_ratio
            }
            _ => true,
        }
    }

    /// Tier 2. Pure in the candidate and `now`.
    pub fn score(&self, candidate: &VideoCandidate, now: DateTime<Utc>) -> f64 {
        let views = candidate.view_count as f64;
        let likes = candidate.like_count.unwrap_or(0) as f64;

        let (ratio, log_views) = if candidate.view_count > 0 {
            (likes / views, views.ln())
        } else {
            (0.0, 0.0)
        };

        ratio * self.config.weight_ratio
            + log_views * self.config.weight_views
            + recency_multiplier(candidate.published_at, now) * self.config.weight_recency
    }
}

/// Linear decay from 1 at publication to 0 after a year. Future dates count as now.
pub fn recency_multiplier(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_seconds = (now - published_at).num_seconds().max(0) as f64;
    let days = elapsed_seconds / SECONDS_PER_DAY;
    (1.0 - days / RECENCY_WINDOW_DAYS).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn candidate(id: &str, views: u64, likes: Option<u64>, days_old: i64) -> VideoCandidate {
        VideoCandidate {
            id: id.to_string(),
            title: format!("Video {}", id),
            description: String::new(),
            view_count: views,
            like_count: likes,
            published_at: now() - Duration::days(days_old),
        }
    }

    #[test]
    fn test_recency_bounds() {
        assert_eq!(recency_multiplier(now() - Duration::days(365), now()), 0.0);
        assert_eq!(recency_multiplier(now() - Duration::days(900), now()), 0.0);
        assert_eq!(recency_multiplier(now(), now()), 1.0);
        assert_eq!(recency_multiplier(now() + Duration::days(3), now()), 1.0);

        let fresh = recency_multiplier(now() - Duration::minutes(5), now());
        assert!(fresh > 0.9999 && fresh < 1.0);

        let half = recency_multiplier(now() - Duration::hours(365 * 12), now());
        assert!((half - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_view_floor_filter() {
        let ranker = VideoRanker::default();
        assert!(!ranker.passes_filter(&candidate("a", 9_999, None, 10)));
        assert!(ranker.passes_filter(&candidate("b", 10_000, None, 10)));
    }

    #[test]
    fn test_like_ratio_filter_only_when_likes_present() {
        let ranker = VideoRanker::default();
        // 1% likes, below the 2% floor
        assert!(!ranker.passes_filter(&candidate("low", 100_000, Some(1_000), 10)));
        // hidden likes never trip the ratio check
        assert!(ranker.passes_filter(&candidate("hidden", 100_000, None, 10)));
        // zero likes are treated like a missing count for filtering
        assert!(ranker.passes_filter(&candidate("zero", 100_000, Some(0), 10)));
        assert!(ranker.passes_filter(&candidate("ok", 100_000, Some(5_000), 10)));
    }

    #[test]
    fn test_score_formula() {
        let ranker = VideoRanker::default();
        let video = candidate("a", 100_000, Some(5_000), 0);
        let expected = 0.05 * 0.4 + (100_000f64).ln() * 0.25 + 1.0 * 0.1;
        assert!((ranker.score(&video, now()) - expected).abs() < 1e-12);

        let hidden = candidate("b", 100_000, None, 400);
        let expected = (100_000f64).ln() * 0.25;
        assert!((ranker.score(&hidden, now()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_views_with_zero_floor_scores_finite() {
        let ranker = VideoRanker::new(RankingConfig {
            min_view_count: 0,
            ..RankingConfig::default()
        });
        let ranked = ranker.rank_at(vec![candidate("a", 0, Some(0), 0)], now());
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].score.is_finite());
    }

    #[test]
    fn test_sorted_descending() {
        let ranker = VideoRanker::default();
        let ranked = ranker.rank_at(
            vec![
                candidate("small", 20_000, Some(1_000), 30),
                candidate("big", 5_000_000, Some(200_000), 30),
                candidate("mid", 300_000, Some(15_000), 30),
            ],
            now(),
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["big", "mid", "small"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let ranker = VideoRanker::default();
        let ranked = ranker.rank_at(
            vec![
                candidate("first", 50_000, Some(2_500), 20),
                candidate("better", 900_000, Some(90_000), 20),
                candidate("second", 50_000, Some(2_500), 20),
                candidate("third", 50_000, Some(2_500), 20),
            ],
            now(),
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["better", "first", "second", "third"]);
    }

    #[test]
    fn test_no_survivors_is_empty() {
        let ranker = VideoRanker::default();
        let ranked = ranker.rank_at(vec![candidate("a", 10, None, 1), candidate("b", 500, Some(50), 1)], now());
        assert!(ranked.is_empty());
    }
}
