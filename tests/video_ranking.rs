mod common;

use std::sync::Arc;

use common::{candidate, fixed_now, FakeCatalog};
use coursesmith::video::{RankingConfig, VideoFinder, VideoRanker};

fn ten_candidates() -> Vec<coursesmith::VideoCandidate> {
    vec![
        candidate("aaaaaaaaaa1", 120_000, Some(6_000), 10),
        candidate("aaaaaaaaaa2", 45_000, Some(2_000), 40),
        // Far below the view floor, with otherwise excellent metrics
        candidate("aaaaaaaaaa3", 5, Some(5), 0),
        candidate("aaaaaaaaaa4", 2_500_000, Some(90_000), 300),
        candidate("aaaaaaaaaa5", 18_000, None, 5),
        candidate("aaaaaaaaaa6", 75_000, Some(3_100), 120),
        candidate("aaaaaaaaaa7", 10_000, Some(400), 200),
        candidate("aaaaaaaaaa8", 640_000, Some(30_000), 700),
        candidate("aaaaaaaaaa9", 31_000, Some(1_500), 60),
        candidate("aaaaaaaaa10", 260_000, Some(11_000), 20),
    ]
}

#[test]
fn test_low_view_candidate_never_ranks() {
    let ranked = VideoRanker::default().rank_at(ten_candidates(), fixed_now());

    assert_eq!(ranked.len(), 9);
    assert!(ranked.iter().all(|r| r.id() != "aaaaaaaaaa3"));
    for pair in ranked.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(ranked[0].id(), "aaaaaaaaaa4");
}

#[test]
fn test_poor_like_ratio_is_filtered_but_hidden_likes_pass() {
    let candidates = vec![
        candidate("lowratio001", 500_000, Some(100), 1),
        candidate("hidden00001", 500_000, None, 1),
    ];

    let ranked = VideoRanker::default().rank_at(candidates, fixed_now());

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].id(), "hidden00001");
}

#[tokio::test]
async fn test_finder_returns_best_acceptable_video() {
    let finder = VideoFinder::new(Arc::new(FakeCatalog::new(ten_candidates())), VideoRanker::default());

    let ranked = finder.ranked_videos("rust ownership tutorial").await;
    assert_eq!(ranked.len(), 9);

    let best = finder.best_video("rust ownership tutorial").await.unwrap();
    assert_eq!(best.id(), "aaaaaaaaaa4");
    assert_eq!(best.video.view_count, 2_500_000);
}

#[tokio::test]
async fn test_finder_is_empty_when_search_fails() {
    let finder = VideoFinder::new(Arc::new(FakeCatalog::failing()), VideoRanker::default());

    assert!(finder.ranked_videos("anything").await.is_empty());
    assert!(finder.best_video("anything").await.is_none());
}

#[tokio::test]
async fn test_finder_is_empty_when_nothing_passes() {
    let strict = RankingConfig {
        min_view_count: 10_000_000,
        ..RankingConfig::default()
    };
    let finder = VideoFinder::new(Arc::new(FakeCatalog::new(ten_candidates())), VideoRanker::new(strict));

    assert!(finder.best_video("rust ownership tutorial").await.is_none());
}
