use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::content::{ChapterOutline, ContentGenerator, CourseBrief, QuizQuestion, UnitOutline};
use crate::error::ContentError;
use crate::transcript::{TranscriptAcquirer, TranscriptResult};
use crate::video::{RankedVideo, VideoFinder};

/// Separator between chapter contexts in a unit test prompt
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Everything produced for one chapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterContent {
    pub chapter_title: String,
    pub youtube_search_query: String,
    pub video: RankedVideo,
    pub transcript: TranscriptResult,
    /// Text the summary and quiz were generated from
    pub context: String,
    pub summary: Option<String>,
    pub questions: Vec<QuizQuestion>,
}

impl ChapterContent {
    /// What the unit test is written against: the summary when there is one.
    pub fn unit_context(&self) -> &str {
        self.summary.as_deref().unwrap_or(&self.context)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitContent {
    pub title: String,
    pub chapters: Vec<ChapterContent>,
    pub unit_test: Vec<QuizQuestion>,
}

/// Video → transcript → summary and quiz, per chapter.
#[derive(Clone)]
pub struct ChapterPipeline {
    finder: VideoFinder,
    acquirer: TranscriptAcquirer,
    content: ContentGenerator,
}

impl ChapterPipeline {
    pub fn new(finder: VideoFinder, acquirer: TranscriptAcquirer, content: ContentGenerator) -> Self {
        Self {
            finder,
            acquirer,
            content,
        }
    }

    pub fn content(&self) -> &ContentGenerator {
        &self.content
    }

    /// `None` when no acceptable video exists for the chapter's query. A
    /// failed summary or quiz leaves that part empty; the chapter is kept.
    pub async fn build_chapter(&self, chapter: &ChapterOutline) -> Option<ChapterContent> {
        info!("🎬 Processing chapter: {}", chapter.chapter_title);

        let Some(video) = self.finder.best_video(&chapter.youtube_search_query).await else {
            warn!(
                "No videos found for query \"{}\", skipping chapter",
                chapter.youtube_search_query
            );
            return None;
        };

        let transcript = self.acquirer.acquire(video.id()).await;
        let context = match &transcript.transcript {
            Some(text) => text.clone(),
            None => format!("{}. {}", chapter.chapter_title, video.video.description),
        };

        let config = self.content.config();
        let (summary, questions) = if context.trim().chars().count() > config.min_quiz_chars {
            info!("📝 Generating summary and quiz for \"{}\"", chapter.chapter_title);
            let (summary, questions) = futures::join!(
                self.content.summarize_transcript(&context),
                self.content.generate_quiz(&context, config.chapter_questions),
            );

            let summary = summary.unwrap_or_else(|e| {
                warn!("Summary failed for \"{}\": {}", chapter.chapter_title, e);
                None
            });
            let questions = questions.unwrap_or_else(|e| {
                warn!("Quiz failed for \"{}\": {}", chapter.chapter_title, e);
                Vec::new()
            });
            (summary, questions)
        } else {
            (None, Vec::new())
        };

        Some(ChapterContent {
            chapter_title: chapter.chapter_title.clone(),
            youtube_search_query: chapter.youtube_search_query.clone(),
            video,
            transcript,
            context,
            summary,
            questions,
        })
    }

    /// Chapters in order, then a unit test over what they cover. Chapters
    /// without a video are left out.
    pub async fn build_unit(&self, unit: &UnitOutline) -> UnitContent {
        info!("📦 Processing unit: {} ({} chapters)", unit.title, unit.chapters.len());

        let mut chapters = Vec::with_capacity(unit.chapters.len());
        for chapter in &unit.chapters {
            if let Some(content) = self.build_chapter(chapter).await {
                chapters.push(content);
            }
        }

        let unit_test = if chapters.is_empty() {
            Vec::new()
        } else {
            let joined = chapters
                .iter()
                .map(ChapterContent::unit_context)
                .collect::<Vec<_>>()
                .join(CONTEXT_SEPARATOR);

            match self
                .content
                .generate_quiz(&joined, self.content.config().unit_test_questions)
                .await
            {
                Ok(questions) => questions,
                Err(e) => {
                    error!("❌ Unit test for \"{}\" failed: {}", unit.title, e);
                    Vec::new()
                }
            }
        };

        info!(
            "✅ Unit \"{}\": {}/{} chapters, {} unit test questions",
            unit.title,
            chapters.len(),
            unit.chapters.len(),
            unit_test.len()
        );

        UnitContent {
            title: unit.title.clone(),
            chapters,
            unit_test,
        }
    }

    /// Outline the course, then build every unit.
    pub async fn build_course(&self, brief: &CourseBrief, units: &[String]) -> Result<Vec<UnitContent>, ContentError> {
        let outline = self.content.course_outline(brief, units).await?;

        let mut built = Vec::with_capacity(outline.len());
        for (index, unit) in outline.iter().enumerate() {
            info!("--- Unit {}/{}: {} ---", index + 1, outline.len(), unit.title);
            built.push(self.build_unit(unit).await);
        }
        Ok(built)
    }
}
