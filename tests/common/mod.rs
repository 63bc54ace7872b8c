//! In-process fakes for every collaborator trait.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use coursesmith::llm::{ChatMessage, LLMProvider, LLMResponse, LLM};
use coursesmith::transcript::audio::{write_wav, AudioChunk, SAMPLE_RATE};
use coursesmith::transcript::{
    AudioSource, CaptionSegment, CaptionSource, Recognition, SpeechRecognizer, Translator,
};
use coursesmith::video::{SearchResult, VideoCandidate, VideoCatalog};

type Responder = Box<dyn Fn(usize, &str) -> Result<String, String> + Send + Sync>;

/// Model that answers from a script and records every prompt.
pub struct ScriptedLLM {
    responder: Responder,
    prompts: Mutex<Vec<String>>,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedLLM {
    pub fn new(responder: impl Fn(usize, &str) -> Result<String, String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Responses in order; the last one repeats.
    pub fn sequence(responses: Vec<Result<&str, &str>>) -> Self {
        let responses: Vec<Result<String, String>> = responses
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self::new(move |call, _| responses[call.min(responses.len() - 1)].clone())
    }

    pub fn always(response: &str) -> Self {
        Self::sequence(vec![Ok(response)])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn chat(&self, messages: Vec<ChatMessage>, _temperature: Option<f32>) -> Result<LLMResponse> {
        let prompt = messages
            .into_iter()
            .map(|m| m.content)
            .collect::<Vec<_>>()
            .join("\n");

        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.clone());
            prompts.len() - 1
        };
        self.call_times.lock().unwrap().push(tokio::time::Instant::now());

        match (self.responder)(call, &prompt) {
            Ok(content) => Ok(LLMResponse {
                content,
                tokens_used: None,
            }),
            Err(e) => Err(anyhow!(e)),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn provider_type(&self) -> LLMProvider {
        LLMProvider::LMStudio
    }
}

pub struct FakeCaptions {
    outcome: Result<Vec<CaptionSegment>, String>,
    pub calls: AtomicUsize,
}

impl FakeCaptions {
    pub fn with_lines(lines: &[&str]) -> Self {
        let segments = lines
            .iter()
            .enumerate()
            .map(|(i, text)| CaptionSegment {
                text: text.to_string(),
                start: i as f64 * 2.0,
                duration: 2.0,
            })
            .collect();
        Self {
            outcome: Ok(segments),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            outcome: Err("captions are disabled".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptionSource for FakeCaptions {
    async fn fetch_captions(&self, _video_id: &str, _language: &str) -> Result<Vec<CaptionSegment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(|e| anyhow!(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadMode {
    /// Writes a silent WAV of the given length
    Succeed { seconds: u32 },
    /// Writes a partial file, then fails
    Fail,
    /// Never completes
    Hang,
}

pub struct FakeAudio {
    mode: DownloadMode,
    pub calls: AtomicUsize,
    written: Mutex<Vec<PathBuf>>,
}

impl FakeAudio {
    pub fn new(mode: DownloadMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every file this fake created, and the directory it was asked to use
    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSource for FakeAudio {
    async fn download_audio(&self, video_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.written.lock().unwrap().push(dest_dir.to_path_buf());

        match self.mode {
            DownloadMode::Succeed { seconds } => {
                let path = dest_dir.join(format!("{}.wav", video_id));
                let samples = vec![0.0f32; (seconds * SAMPLE_RATE) as usize];
                write_wav(&path, &samples)?;
                self.written.lock().unwrap().push(path.clone());
                Ok(path)
            }
            DownloadMode::Fail => {
                let path = dest_dir.join(format!("{}.wav.part", video_id));
                std::fs::write(&path, b"partial")?;
                self.written.lock().unwrap().push(path);
                Err(anyhow!("HTTP Error 403: Forbidden"))
            }
            DownloadMode::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Returns one scripted recognition per chunk; the last repeats.
pub struct FakeRecognizer {
    outcomes: Vec<Result<Recognition, String>>,
    pub chunks: Mutex<Vec<(usize, f64)>>,
}

impl FakeRecognizer {
    pub fn speaking(text: &str, language: &str) -> Self {
        Self::scripted(vec![Ok(Recognition {
            text: text.to_string(),
            language: Some(language.to_string()),
        })])
    }

    pub fn scripted(outcomes: Vec<Result<Recognition, String>>) -> Self {
        Self {
            outcomes,
            chunks: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::scripted(vec![Err("model file missing".to_string())])
    }

    pub fn calls(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Recognition> {
        self.chunks.lock().unwrap().push((chunk.index, chunk.start_seconds));
        let outcome = &self.outcomes[chunk.index.min(self.outcomes.len() - 1)];
        outcome.clone().map_err(|e| anyhow!(e))
    }
}

pub struct FakeTranslator {
    outcome: Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeTranslator {
    pub fn returning(text: &str) -> Self {
        Self {
            outcome: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err("quota exceeded".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, _text: &str, _target_language: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map_err(|e| anyhow!(e))
    }
}

pub struct FakeCatalog {
    results: Option<Vec<SearchResult>>,
    candidates: Vec<VideoCandidate>,
}

impl FakeCatalog {
    pub fn new(candidates: Vec<VideoCandidate>) -> Self {
        let results = candidates
            .iter()
            .map(|c| SearchResult {
                id: c.id.clone(),
                title: c.title.clone(),
                description: c.description.clone(),
            })
            .collect();
        Self {
            results: Some(results),
            candidates,
        }
    }

    pub fn failing() -> Self {
        Self {
            results: None,
            candidates: Vec::new(),
        }
    }
}

#[async_trait]
impl VideoCatalog for FakeCatalog {
    async fn search(&self, _query: &str) -> Option<Vec<SearchResult>> {
        self.results.clone()
    }

    async fn stats(&self, ids: &[String]) -> Result<Vec<VideoCandidate>> {
        Ok(self
            .candidates
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn candidate(id: &str, views: u64, likes: Option<u64>, days_old: i64) -> VideoCandidate {
    VideoCandidate {
        id: id.to_string(),
        title: format!("Video {}", id),
        description: format!("Description of {}", id),
        view_count: views,
        like_count: likes,
        published_at: fixed_now() - Duration::days(days_old),
    }
}
