/// Transcript acquisition
///
/// A chain of progressively more expensive tiers: published captions first,
/// then audio download plus speech recognition with optional translation.
/// The first tier that yields a transcript wins.
pub mod audio;
pub mod captions;
pub mod speech;
pub mod translate;
pub mod whisper;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::AcquisitionError;
use audio::AudioChunk;

pub use audio::YtDlpAudioSource;
pub use captions::YouTubeCaptionFetcher;
pub use translate::{GoogleTranslator, NoTranslator};
pub use whisper::WhisperCliRecognizer;

/// Language reported when no transcript could be produced
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Outcome of one acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub original_language: String,
    pub is_translated: bool,
    pub transcript: Option<String>,
}

impl TranscriptResult {
    pub fn absent() -> Self {
        Self {
            original_language: UNKNOWN_LANGUAGE.to_string(),
            is_translated: false,
            transcript: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.transcript.is_none()
    }
}

/// One timed caption line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Speech recognizer output for one chunk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Detected language code, when the recognizer reports one
    pub language: Option<String>,
}

/// Published captions for a video
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn fetch_captions(&self, video_id: &str, language: &str) -> Result<Vec<CaptionSegment>>;
}

/// Downloads a video's audio track as a WAV file inside `dest_dir`
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn download_audio(&self, video_id: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Speech-to-text over a mono 16 kHz chunk
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Recognition>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String>;
}

/// Acquisition tier, tried in list order. Declaration order is the only
/// order a tier list may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Captions,
    Speech,
}

/// Transcript acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptConfig {
    pub tiers: Vec<Tier>,
    pub caption_language: String,
    pub target_language: String,
    /// Recognition window length
    pub chunk_seconds: u32,
    /// Overlap between consecutive windows
    pub stride_seconds: u32,
    pub caption_timeout_seconds: u64,
    pub download_timeout_seconds: u64,
    pub recognition_timeout_seconds: u64,
    pub translation_timeout_seconds: u64,
    pub yt_dlp_binary: String,
    pub whisper_binary: String,
    pub whisper_model: String,
    pub translate_api_key: Option<String>,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            tiers: vec![Tier::Captions, Tier::Speech],
            caption_language: "en".to_string(),
            target_language: "en".to_string(),
            chunk_seconds: 30,
            stride_seconds: 5,
            caption_timeout_seconds: 30,
            download_timeout_seconds: 600,
            recognition_timeout_seconds: 300,
            translation_timeout_seconds: 60,
            yt_dlp_binary: "yt-dlp".to_string(),
            whisper_binary: "whisper-cli".to_string(),
            whisper_model: "base".to_string(),
            translate_api_key: None,
        }
    }
}

impl TranscriptConfig {
    /// Tiers must be non-empty and strictly ascending, so captions always run
    /// before any download and no tier runs twice.
    pub fn validate(&self) -> Result<()> {
        if self.tiers.is_empty() {
            return Err(anyhow::anyhow!("transcript.tiers must name at least one tier"));
        }
        if let Some(pair) = self.tiers.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(anyhow::anyhow!(
                "transcript.tiers must be in order captions, speech without repeats; found {:?} before {:?}",
                pair[0],
                pair[1]
            ));
        }

        if self.chunk_seconds <= self.stride_seconds {
            return Err(anyhow::anyhow!(
                "transcript.chunk_seconds ({}) must be greater than stride_seconds ({})",
                self.chunk_seconds,
                self.stride_seconds
            ));
        }
        Ok(())
    }
}

/// Collaborator handles for [`TranscriptAcquirer`]
#[derive(Clone)]
pub struct TranscriptServices {
    pub captions: Arc<dyn CaptionSource>,
    pub audio: Arc<dyn AudioSource>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub translator: Arc<dyn Translator>,
}

/// Runs the tier chain for one video at a time.
#[derive(Clone)]
pub struct TranscriptAcquirer {
    services: TranscriptServices,
    config: TranscriptConfig,
}

async fn with_timeout<T, F>(seconds: u64, what: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), future).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("{} timed out after {}s", what, seconds)),
    }
}

/// True when `detected` is a real language code other than the target.
pub fn needs_translation(detected: &str, target: &str) -> bool {
    !detected.is_empty() && !detected.to_lowercase().starts_with(&target.to_lowercase())
}

impl TranscriptAcquirer {
    pub fn new(services: TranscriptServices, config: TranscriptConfig) -> Self {
        Self { services, config }
    }

    pub fn config(&self) -> &TranscriptConfig {
        &self.config
    }

    /// Like [`try_acquire`](Self::try_acquire), with a failed download
    /// reported as an absent transcript.
    pub async fn acquire(&self, video_id: &str) -> TranscriptResult {
        match self.try_acquire(video_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!("❌ Transcript acquisition failed for {}: {}", video_id, e);
                TranscriptResult::absent()
            }
        }
    }

    /// Walk the tiers in order and return the first transcript found.
    ///
    /// Errors only when audio is needed and cannot be obtained.
    pub async fn try_acquire(&self, video_id: &str) -> Result<TranscriptResult, AcquisitionError> {
        info!("📜 Acquiring transcript for {}", video_id);

        for tier in &self.config.tiers {
            let found = match tier {
                Tier::Captions => self.from_captions(video_id).await,
                Tier::Speech => self.from_speech(video_id).await?,
            };

            if let Some(result) = found {
                info!(
                    "✅ Transcript for {} via {:?} ({}, translated: {})",
                    video_id, tier, result.original_language, result.is_translated
                );
                return Ok(result);
            }
        }

        info!("No transcript available for {}", video_id);
        Ok(TranscriptResult::absent())
    }

    async fn from_captions(&self, video_id: &str) -> Option<TranscriptResult> {
        let language = &self.config.caption_language;
        let fetched = with_timeout(
            self.config.caption_timeout_seconds,
            "caption fetch",
            self.services.captions.fetch_captions(video_id, language),
        )
        .await;

        let segments = match fetched {
            Ok(segments) => segments,
            Err(e) => {
                debug!("No captions for {}: {}", video_id, e);
                return None;
            }
        };

        let text = segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            debug!("Caption track for {} is empty", video_id);
            return None;
        }

        Some(TranscriptResult {
            original_language: language.clone(),
            is_translated: false,
            transcript: Some(text),
        })
    }

    /// Download, recognize, translate. The temporary directory is removed
    /// when `temp_dir` drops, whichever way this returns.
    async fn from_speech(&self, video_id: &str) -> Result<Option<TranscriptResult>, AcquisitionError> {
        let temp_dir = tempfile::Builder::new().prefix("coursesmith-audio-").tempdir()?;

        let seconds = self.config.download_timeout_seconds;
        let download = tokio::time::timeout(
            Duration::from_secs(seconds),
            self.services.audio.download_audio(video_id, temp_dir.path()),
        )
        .await;

        let audio_path = match download {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                return Err(AcquisitionError::AudioDownload {
                    video_id: video_id.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(AcquisitionError::DownloadTimeout {
                    video_id: video_id.to_string(),
                    seconds,
                })
            }
        };
        info!("🎵 Audio downloaded: {}", audio_path.display());

        let recognized = match self.recognize(&audio_path).await {
            Ok(Some(recognized)) => recognized,
            Ok(None) => {
                warn!("Speech recognition produced no text for {}", video_id);
                return Ok(None);
            }
            Err(e) => {
                warn!("Speech recognition failed for {}: {}", video_id, e);
                return Ok(None);
            }
        };

        Ok(Some(self.translate_if_needed(recognized).await))
    }

    async fn recognize(&self, audio_path: &Path) -> Result<Option<Recognition>> {
        let samples = audio::load_samples(audio_path).await?;
        let chunks = speech::split_chunks(&samples, self.config.chunk_seconds, self.config.stride_seconds);
        debug!("Recognizing {} chunks from {}", chunks.len(), audio_path.display());

        let mut texts = Vec::with_capacity(chunks.len());
        let mut languages = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let recognition = with_timeout(
                self.config.recognition_timeout_seconds,
                "speech recognition",
                self.services.recognizer.transcribe(chunk),
            )
            .await?;
            texts.push(recognition.text);
            if let Some(language) = recognition.language {
                languages.push(language);
            }
        }

        let text = speech::merge_chunk_texts(&texts);
        if text.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(Recognition {
            text,
            language: speech::dominant_language(&languages),
        }))
    }

    async fn translate_if_needed(&self, recognized: Recognition) -> TranscriptResult {
        let detected = recognized.language.unwrap_or_default();
        let target = &self.config.target_language;
        let original_language = if detected.is_empty() {
            UNKNOWN_LANGUAGE.to_string()
        } else {
            detected.clone()
        };

        if !needs_translation(&detected, target) {
            return TranscriptResult {
                original_language,
                is_translated: false,
                transcript: Some(recognized.text),
            };
        }

        info!("🌐 Translating transcript from {} to {}", detected, target);
        let translated = with_timeout(
            self.config.translation_timeout_seconds,
            "translation",
            self.services.translator.translate(&recognized.text, target),
        )
        .await;

        match translated {
            Ok(text) => TranscriptResult {
                original_language,
                is_translated: true,
                transcript: Some(text),
            },
            Err(e) => {
                warn!("Translation failed, keeping {} transcript: {}", detected, e);
                TranscriptResult {
                    original_language,
                    is_translated: false,
                    transcript: Some(recognized.text),
                }
            }
        }
    }
}
