/// Course content generation on top of structured output
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::ContentCache;
use crate::error::ContentError;
use crate::llm::{GenerationRequest, RetryPolicy, Shape, StructuredGenerator, UserPrompt};

/// Retry budget and content limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    /// Words of transcript fed to the summarizer
    pub summary_word_limit: usize,
    /// Shorter summary input yields no summary
    pub min_summary_chars: usize,
    /// Quiz context is cut to this many characters
    pub max_context_chars: usize,
    /// Shorter quiz context yields no questions
    pub min_quiz_chars: usize,
    pub chapter_questions: usize,
    pub unit_test_questions: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_ms: 3000,
            max_jitter_ms: 1000,
            summary_word_limit: 250,
            min_summary_chars: 100,
            max_context_chars: 5000,
            min_quiz_chars: 50,
            chapter_questions: 3,
            unit_test_questions: 5,
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

/// What the course is about, as entered by its author
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseBrief {
    pub title: String,
    pub description: String,
    pub level: String,
    pub keywords: Vec<String>,
}

impl CourseBrief {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub chapter_title: String,
    pub youtube_search_query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutline {
    pub title: String,
    pub chapters: Vec<ChapterOutline>,
}

/// Multiple-choice question; `options` holds the answer among the distractors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answer: String,
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    question: String,
    answer: String,
    option1: String,
    option2: String,
    option3: String,
}

impl From<GeneratedQuestion> for QuizQuestion {
    fn from(generated: GeneratedQuestion) -> Self {
        let mut options = vec![
            generated.answer.clone(),
            generated.option1,
            generated.option2,
            generated.option3,
        ];
        options.shuffle(&mut rand::thread_rng());
        Self {
            question: generated.question,
            answer: generated.answer,
            options,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedSummary {
    summary: String,
}

/// First `limit` whitespace-separated words.
pub fn first_words(text: &str, limit: usize) -> String {
    text.split_whitespace().take(limit).collect::<Vec<_>>().join(" ")
}

/// At most `limit` characters, never splitting a character.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn outline_system_prompt(brief: &CourseBrief) -> String {
    let mut prompt = format!(
        "You are an expert AI course creator. Generate a comprehensive and engaging course outline.\nThe course is titled \"{}\".",
        brief.title
    );
    if !brief.description.is_empty() {
        prompt.push_str(&format!("\nDescription: \"{}\".", brief.description));
    }
    if !brief.level.is_empty() {
        prompt.push_str(&format!("\nThe target audience is at a \"{}\" level.", brief.level));
    }
    if !brief.keywords.is_empty() {
        prompt.push_str(&format!("\nThe main keywords for this course are: {}.", brief.keywords.join(", ")));
    }
    prompt.push_str(
        "\n\nFor each unit, generate a list of relevant, specific chapter titles. For each chapter, write a YouTube search query that will find a suitable educational video.\
         \nSearch queries should use broad, popular terms, include words like \"introduction\", \"tutorial\" or \"explained\", and be a direct search phrase rather than a question.",
    );
    prompt
}

/// Outlines, summaries and quizzes, each a validated structured generation.
#[derive(Clone)]
pub struct ContentGenerator {
    generator: StructuredGenerator,
    cache: Arc<dyn ContentCache>,
    config: GenerationConfig,
}

impl ContentGenerator {
    pub fn new(generator: StructuredGenerator, cache: Arc<dyn ContentCache>, config: GenerationConfig) -> Self {
        Self {
            generator,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// One outline per unit, in unit order. Memoized: the same brief and
    /// units never hit the model twice.
    pub async fn course_outline(&self, brief: &CourseBrief, units: &[String]) -> Result<Vec<UnitOutline>, ContentError> {
        if units.is_empty() {
            return Ok(Vec::new());
        }

        info!("📚 Generating outline for \"{}\" ({} units)", brief.title, units.len());

        let prompts: Vec<String> = units
            .iter()
            .map(|unit| format!("Create chapters for the unit: \"{}\"", unit))
            .collect();
        let shape = Shape::new().literal("title", "title of the unit").literal(
            "chapters",
            "an array of chapters, each chapter should have a youtube_search_query and a chapter_title key in the JSON object",
        );
        let request = GenerationRequest::new(outline_system_prompt(brief), UserPrompt::Batch(prompts), shape);

        let result = self.generator.coerce_cached(&request, self.cache.as_ref()).await?;
        Ok(result.parse()?)
    }

    /// Summary of the start of a transcript, or `None` when there is too
    /// little text to summarize.
    pub async fn summarize_transcript(&self, transcript: &str) -> Result<Option<String>, ContentError> {
        let excerpt = first_words(transcript, self.config.summary_word_limit);
        if excerpt.chars().count() < self.config.min_summary_chars {
            debug!("Transcript too short to summarize ({} chars)", excerpt.len());
            return Ok(None);
        }

        let request = GenerationRequest::new(
            "You are an AI capable of summarizing a youtube transcript",
            format!(
                "summarize in 250 words or less and do not talk of the sponsors or anything unrelated to the main topic, also do not introduce what the summary is about.\n{}",
                excerpt
            ),
            Shape::new().literal("summary", "summary of the transcript"),
        );

        let generated: GeneratedSummary = self.generator.coerce(&request).await?.parse()?;
        Ok(Some(generated.summary))
    }

    /// `count` multiple-choice questions over `context`.
    ///
    /// Empty when the context is too short. Long context is truncated.
    pub async fn generate_quiz(&self, context: &str, count: usize) -> Result<Vec<QuizQuestion>, ContentError> {
        let context = context.trim();
        if count == 0 || context.chars().count() < self.config.min_quiz_chars {
            debug!("Context too short for a quiz ({} chars)", context.len());
            return Ok(Vec::new());
        }
        let context = truncate_chars(context, self.config.max_context_chars);

        let system = format!(
            "You are a helpful AI that creates educational multiple choice questions testing understanding of the key concepts in the following material.\n\nMaterial:\n\"{}\"",
            context
        );
        let prompts: Vec<String> = (1..=count)
            .map(|n| {
                format!(
                    "Write question {} of {}, about a different concept than the other questions, with one correct answer and three wrong options",
                    n, count
                )
            })
            .collect();
        let shape = Shape::new()
            .literal("question", "question")
            .literal("answer", "answer with max length of 15 words")
            .literal("option1", "option1 with max length of 15 words")
            .literal("option2", "option2 with max length of 15 words")
            .literal("option3", "option3 with max length of 15 words");

        let request = GenerationRequest::new(system, UserPrompt::Batch(prompts), shape);
        let generated: Vec<GeneratedQuestion> = self.generator.coerce(&request).await?.parse()?;

        Ok(generated.into_iter().map(QuizQuestion::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_words() {
        assert_eq!(first_words("one  two\nthree four", 3), "one two three");
        assert_eq!(first_words("", 3), "");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_generated_question_options_include_answer() {
        let question: QuizQuestion = GeneratedQuestion {
            question: "What does the borrow checker verify?".to_string(),
            answer: "Reference validity".to_string(),
            option1: "Heap size".to_string(),
            option2: "Thread count".to_string(),
            option3: "File handles".to_string(),
        }
        .into();

        assert_eq!(question.options.len(), 4);
        assert!(question.options.contains(&question.answer));
        for distractor in ["Heap size", "Thread count", "File handles"] {
            assert!(question.options.iter().any(|o| o == distractor));
        }
    }

    #[test]
    fn test_outline_prompt_mentions_brief() {
        let brief = CourseBrief {
            title: "Rust".to_string(),
            description: "Systems programming".to_string(),
            level: "Beginner".to_string(),
            keywords: vec!["ownership".to_string(), "traits".to_string()],
        };
        let prompt = outline_system_prompt(&brief);
        assert!(prompt.contains("\"Rust\""));
        assert!(prompt.contains("\"Beginner\" level"));
        assert!(prompt.contains("ownership, traits"));

        let bare = outline_system_prompt(&CourseBrief::new("Go"));
        assert!(!bare.contains("Description"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = GenerationConfig::default().retry_policy();
        assert_eq!(policy, RetryPolicy::default());
    }
}
