use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use coursesmith::cache::{ContentCache, JsonFileCache, MemoryCache};
use coursesmith::config::Config;
use coursesmith::content::{ChapterOutline, ContentGenerator, CourseBrief};
use coursesmith::llm::{create_llm, StructuredGenerator, LLM};
use coursesmith::pipeline::ChapterPipeline;
use coursesmith::transcript::{
    GoogleTranslator, NoTranslator, TranscriptAcquirer, TranscriptServices, Translator, WhisperCliRecognizer,
    YouTubeCaptionFetcher, YtDlpAudioSource,
};
use coursesmith::video::{extract_video_id, VideoFinder, VideoRanker, YouTubeClient};

#[derive(Parser)]
#[command(name = "coursesmith")]
#[command(version, about = "Source videos, transcripts and quizzes for AI-authored courses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to coursesmith.toml lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "coursesmith=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a transcript for a video URL or id
    Transcript {
        /// YouTube URL or 11-character video id
        video: String,
    },
    /// Search and rank videos for a query
    Videos {
        query: String,
    },
    /// Build a chapter: best video, transcript, summary and quiz
    Chapter {
        /// Chapter title
        title: String,
        /// YouTube search query
        query: String,
    },
    /// Generate (or reuse) a course outline
    Outline {
        /// Course title
        title: String,
        /// Unit names, one outline per unit
        #[arg(required = true)]
        units: Vec<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        level: String,
        /// Course keyword, repeatable
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Inspect or clear the generation cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and file size
    Stats,
    /// Remove every entry
    Clear,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_cache(config: &Config) -> Arc<dyn ContentCache> {
    if config.cache.enabled {
        Arc::new(JsonFileCache::new(&config.cache.file))
    } else {
        Arc::new(MemoryCache::new())
    }
}

fn build_content(config: &Config) -> Result<ContentGenerator> {
    let llm: Arc<dyn LLM> = Arc::from(create_llm(&config.llm)?);
    let generator = StructuredGenerator::new(llm, config.generation.retry_policy());
    Ok(ContentGenerator::new(generator, build_cache(config), config.generation.clone()))
}

fn build_finder(config: &Config) -> Result<VideoFinder> {
    let client = YouTubeClient::new(config.youtube.clone())?;
    Ok(VideoFinder::new(Arc::new(client), VideoRanker::new(config.ranking.clone())))
}

fn build_acquirer(config: &Config) -> Result<TranscriptAcquirer> {
    let transcript = &config.transcript;

    let translator: Arc<dyn Translator> = match &transcript.translate_api_key {
        Some(key) => Arc::new(GoogleTranslator::new(key.clone(), transcript.translation_timeout_seconds)?),
        None => {
            debug!("No translation API key, transcripts stay in their spoken language");
            Arc::new(NoTranslator)
        }
    };

    let services = TranscriptServices {
        captions: Arc::new(YouTubeCaptionFetcher::new(transcript.caption_timeout_seconds)?),
        audio: Arc::new(YtDlpAudioSource::new(transcript.yt_dlp_binary.clone())),
        recognizer: Arc::new(WhisperCliRecognizer::new(
            transcript.whisper_binary.clone(),
            transcript.whisper_model.clone(),
        )),
        translator,
    };
    Ok(TranscriptAcquirer::new(services, transcript.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 coursesmith {}", env!("CARGO_PKG_VERSION"));
    debug!("{}", config.summary());

    match cli.command {
        Commands::Transcript { video } => {
            let video_id = extract_video_id(&video).ok_or_else(|| anyhow!("Not a YouTube video: {}", video))?;
            config.transcript.validate()?;
            let acquirer = build_acquirer(&config)?;
            let result = acquirer.acquire(&video_id).await;
            print_json(&result)?;
        }

        Commands::Videos { query } => {
            let finder = build_finder(&config)?;
            let ranked = finder.ranked_videos(&query).await;
            if ranked.is_empty() {
                warn!("📭 No acceptable videos for \"{}\"", query);
            }
            print_json(&ranked)?;
        }

        Commands::Chapter { title, query } => {
            config.validate()?;
            let pipeline = ChapterPipeline::new(build_finder(&config)?, build_acquirer(&config)?, build_content(&config)?);
            let outline = ChapterOutline {
                chapter_title: title,
                youtube_search_query: query,
            };

            match pipeline.build_chapter(&outline).await {
                Some(chapter) => print_json(&chapter)?,
                None => {
                    warn!("📭 No video found, chapter skipped");
                    print_json(&serde_json::Value::Null)?;
                }
            }
        }

        Commands::Outline {
            title,
            units,
            description,
            level,
            keywords,
        } => {
            config.validate()?;
            let brief = CourseBrief {
                title,
                description,
                level,
                keywords,
            };
            let outline = build_content(&config)?.course_outline(&brief, &units).await?;
            print_json(&outline)?;
        }

        Commands::Cache { action } => {
            let cache = JsonFileCache::new(&config.cache.file);
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats().await?;
                    info!("📊 Cache file: {}", cache.path().display());
                    info!("📚 Entries: {}", stats.entries);
                    info!("💾 Size: {:.1} KB", stats.file_bytes as f64 / 1024.0);
                }
                CacheAction::Clear => {
                    let cleared = cache.clear().await?;
                    info!("🧹 Removed {} entries from {}", cleared, cache.path().display());
                }
            }
        }
    }

    Ok(())
}
