/// Coursesmith - content acquisition for AI-authored courses
///
/// Turns a chapter title into a ranked source video, a transcript and a
/// validated summary and quiz, despite unreliable model, video and speech
/// services upstream.

pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod transcript;
pub mod video;

// Re-export main types for easy access
pub use crate::cache::{ContentCache, JsonFileCache, MemoryCache};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::content::{ContentGenerator, CourseBrief, QuizQuestion, UnitOutline};
pub use crate::error::{AcquisitionError, AttemptError, ContentError, GenerationFailure};
pub use crate::llm::{GenerationRequest, GenerationResult, LLMConfig, LLMProvider, Shape, StructuredGenerator};
pub use crate::pipeline::{ChapterContent, ChapterPipeline, UnitContent};
pub use crate::transcript::{TranscriptAcquirer, TranscriptResult, TranscriptServices};
pub use crate::video::{RankedVideo, VideoCandidate, VideoFinder, VideoRanker};
