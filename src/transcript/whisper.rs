use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::audio::{write_wav, AudioChunk};
use super::{Recognition, SpeechRecognizer};

/// Speech recognition through the whisper.cpp command-line tool.
///
/// Each chunk is written to its own temporary WAV, transcribed with language
/// auto-detection, and read back from whisper's JSON output.
#[derive(Debug, Clone)]
pub struct WhisperCliRecognizer {
    binary: String,
    model: String,
    threads: usize,
}

impl WhisperCliRecognizer {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            threads: num_cpus::get().max(1),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// First existing model file for the configured model name.
    fn model_path(&self) -> Option<PathBuf> {
        let as_given = PathBuf::from(&self.model);
        if as_given.extension().is_some() && as_given.exists() {
            return Some(as_given);
        }

        let candidates = [
            format!("models/ggml-{}.bin", self.model),
            format!("/usr/local/share/whisper-cpp/ggml-{}.bin", self.model),
            format!("/opt/homebrew/share/whisper-cpp/ggml-{}.bin", self.model),
        ];
        candidates.into_iter().map(PathBuf::from).find(|path| path.exists())
    }

    fn build_command(&self, audio_path: &Path, output_base: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-f")
            .arg(audio_path)
            .arg("-oj")
            .arg("-of")
            .arg(output_base)
            .arg("-l")
            .arg("auto")
            .arg("-t")
            .arg(self.threads.to_string())
            .arg("-tp")
            .arg("0.0")
            .kill_on_drop(true);

        match self.model_path() {
            Some(model) => {
                cmd.arg("-m").arg(model);
            }
            None => warn!("⚠️  No ggml model file found for '{}', using whisper default", self.model),
        }
        cmd
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperCliRecognizer {
    async fn transcribe(&self, chunk: &AudioChunk) -> Result<Recognition> {
        let work_dir = tempfile::Builder::new().prefix("coursesmith-whisper-").tempdir()?;
        let audio_path = work_dir.path().join(format!("chunk_{:04}.wav", chunk.index));
        let output_base = work_dir.path().join(format!("chunk_{:04}", chunk.index));

        let samples = chunk.samples.clone();
        let wav_path = audio_path.clone();
        tokio::task::spawn_blocking(move || write_wav(&wav_path, &samples)).await??;

        debug!(
            "🎙️  Whisper chunk {} at {:.0}s ({:.1}s long)",
            chunk.index,
            chunk.start_seconds,
            chunk.duration_seconds()
        );

        let output = self
            .build_command(&audio_path, &output_base)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} failed with {}: {}", self.binary, output.status, stderr.trim()));
        }

        let json_path = output_base.with_extension("json");
        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .with_context(|| format!("No whisper JSON output at {}", json_path.display()))?;

        let parsed: WhisperOutput = serde_json::from_str(&json_content)
            .map_err(|e| anyhow!("Failed to parse whisper JSON output: {}", e))?;
        let recognition = parsed.into_recognition();

        info!(
            "✅ Chunk {} transcribed: {} characters ({})",
            chunk.index,
            recognition.text.len(),
            recognition.language.as_deref().unwrap_or("?")
        );
        Ok(recognition)
    }
}

/// whisper JSON output; whisper.cpp and the Python CLI use different layouts
#[derive(Debug, Clone, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
    #[serde(default)]
    result: Option<WhisperResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperResult {
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WhisperSegment {
    text: String,
}

impl WhisperOutput {
    fn into_recognition(self) -> Recognition {
        let language = self
            .result
            .and_then(|r| r.language)
            .or(self.language)
            .filter(|l| !l.trim().is_empty());

        let segments = if self.transcription.is_empty() {
            self.segments
        } else {
            self.transcription
        };

        let text = if segments.is_empty() {
            self.text.unwrap_or_default()
        } else {
            segments
                .iter()
                .map(|segment| segment.text.trim())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        };

        Recognition {
            text: text.trim().to_string(),
            language,
        }
    }
}
