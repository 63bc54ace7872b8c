mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ScriptedLLM;
use coursesmith::cache::{ContentCache, MemoryCache};
use coursesmith::error::AttemptError;
use coursesmith::llm::{GenerationRequest, GenerationResult, RetryPolicy, Shape, StructuredGenerator, UserPrompt};

fn summary_request() -> GenerationRequest {
    GenerationRequest::new(
        "You summarize lectures",
        "Summarize ownership in Rust",
        Shape::new().literal("summary", "summary of the lecture"),
    )
}

fn generator(llm: &Arc<ScriptedLLM>, attempts: u32) -> StructuredGenerator {
    StructuredGenerator::new(llm.clone(), RetryPolicy::no_delay(attempts))
}

#[tokio::test]
async fn test_valid_first_response_uses_one_call() {
    let llm = Arc::new(ScriptedLLM::always(r#"{"summary": "Values have a single owner."}"#));

    let result = generator(&llm, 6).coerce(&summary_request()).await.unwrap();

    assert_eq!(llm.calls(), 1);
    match result {
        GenerationResult::Single(record) => assert_eq!(record["summary"], "Values have a single owner."),
        other => panic!("expected a single record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_responses_exhaust_exactly_the_budget() {
    let llm = Arc::new(ScriptedLLM::always("I'm sorry, I can't produce JSON today."));

    let failure = generator(&llm, 4).coerce(&summary_request()).await.unwrap_err();

    assert_eq!(llm.calls(), 4);
    assert_eq!(failure.attempts, 4);
    assert!(matches!(failure.last_error, AttemptError::Parse(_)));
    assert!(failure.feedback.contains("Attempt 4 result"));
}

#[tokio::test]
async fn test_call_errors_count_as_attempts() {
    let llm = Arc::new(ScriptedLLM::sequence(vec![
        Err("429 Too Many Requests"),
        Ok(r#"{"summary": "Borrowing lends access."}"#),
    ]));

    let result = generator(&llm, 3).coerce(&summary_request()).await.unwrap();

    assert_eq!(llm.calls(), 2);
    assert_eq!(result.records()[0]["summary"], "Borrowing lends access.");
}

#[tokio::test]
async fn test_rejection_reason_reaches_next_prompt() {
    let llm = Arc::new(ScriptedLLM::sequence(vec![
        Ok(r#"{"headline": "wrong key"}"#),
        Ok(r#"{"summary": "Fixed."}"#),
    ]));

    generator(&llm, 3).coerce(&summary_request()).await.unwrap();

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("summary not in json output"));
    assert!(prompts[1].contains("summary not in json output"));
    assert!(prompts[1].contains("wrong key"));
}

#[tokio::test]
async fn test_batch_length_mismatch_is_retried() {
    let llm = Arc::new(ScriptedLLM::sequence(vec![
        Ok(r#"[{"summary": "only one"}]"#),
        Ok(r#"[{"summary": "first"}, {"summary": "second"}]"#),
    ]));
    let request = GenerationRequest::new(
        "You summarize lectures",
        UserPrompt::Batch(vec!["Lecture one".to_string(), "Lecture two".to_string()]),
        Shape::new().literal("summary", "summary of the lecture"),
    );

    let result = generator(&llm, 3).coerce(&request).await.unwrap();

    assert_eq!(llm.calls(), 2);
    assert_eq!(result.records().len(), 2);
    assert_eq!(result.records()[1]["summary"], "second");
}

#[tokio::test(start_paused = true)]
async fn test_retry_delays_strictly_increase() {
    let llm = Arc::new(ScriptedLLM::always("not json"));
    let policy = RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_secs(3),
        max_jitter: Duration::from_secs(1),
    };

    StructuredGenerator::new(llm.clone(), policy)
        .coerce(&summary_request())
        .await
        .unwrap_err();

    let times = llm.call_times();
    assert_eq!(times.len(), 4);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] >= Duration::from_secs(3));
    for pair in gaps.windows(2) {
        assert!(pair[1] > pair[0], "delays not increasing: {:?}", gaps);
    }
}

#[tokio::test]
async fn test_cached_generation_skips_the_model() {
    let llm = Arc::new(ScriptedLLM::always(r#"{"summary": "Cached answer."}"#));
    let cache = MemoryCache::new();
    let request = summary_request();

    let first = generator(&llm, 3).coerce_cached(&request, &cache).await.unwrap();
    let second = generator(&llm, 3).coerce_cached(&request, &cache).await.unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(first, second);
    assert!(cache.get(&request.cache_key()).await.is_some());
}

#[tokio::test]
async fn test_failed_generation_is_not_cached() {
    let llm = Arc::new(ScriptedLLM::always("nope"));
    let cache = MemoryCache::new();
    let request = summary_request();

    assert!(generator(&llm, 2).coerce_cached(&request, &cache).await.is_err());
    assert!(cache.get(&request.cache_key()).await.is_none());
}
