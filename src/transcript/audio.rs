use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::AudioSource;

const WATCH_URL: &str = "https://www.youtube.com/watch";

/// Sample rate every recognizer chunk uses (Whisper optimal)
pub const SAMPLE_RATE: u32 = 16_000;

/// A window of mono 16 kHz audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub index: usize,
    /// Offset of the first sample within the whole recording
    pub start_seconds: f64,
    pub samples: Vec<f32>,
}

impl AudioChunk {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }
}

/// Decode a WAV file into mono samples at [`SAMPLE_RATE`].
pub async fn load_samples(path: &Path) -> Result<Vec<f32>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || decode_wav(&path)).await?
}

fn decode_wav(path: &Path) -> Result<Vec<f32>> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("Failed to open audio file {}", path.display()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = downmix(&interleaved, spec.channels);
    debug!(
        "Decoded {} ({} Hz, {} channels, {} samples)",
        path.display(),
        spec.sample_rate,
        spec.channels,
        mono.len()
    );
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Average interleaved channels into one.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampling.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).floor() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let left = (position.floor() as usize).min(last);
            let right = (left + 1).min(last);
            let fraction = (position - left as f64) as f32;
            samples[left] + (samples[right] - samples[left]) * fraction
        })
        .collect()
}

/// Write mono [`SAMPLE_RATE`] samples as 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Audio download through the `yt-dlp` CLI, converted to 16 kHz mono WAV.
#[derive(Debug, Clone)]
pub struct YtDlpAudioSource {
    binary: String,
}

impl YtDlpAudioSource {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for YtDlpAudioSource {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl AudioSource for YtDlpAudioSource {
    async fn download_audio(&self, video_id: &str, dest_dir: &Path) -> Result<PathBuf> {
        let url = Url::parse_with_params(WATCH_URL, &[("v", video_id)])?;
        let output_template = dest_dir.join("%(id)s.%(ext)s");

        info!("⬇️  Downloading audio for {}", video_id);

        let output = Command::new(&self.binary)
            .arg(url.as_str())
            .arg("--no-playlist")
            .arg("-x")
            .arg("--audio-format")
            .arg("wav")
            .arg("--postprocessor-args")
            .arg(format!("ffmpeg:-ar {} -ac 1", SAMPLE_RATE))
            .arg("--print")
            .arg("after_move:filepath")
            .arg("-o")
            .arg(&output_template)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} exited with {}: {}", self.binary, output.status, stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("{} did not report an output file", self.binary))?;

        if !path.exists() {
            return Err(anyhow!("Downloaded audio not found at {}", path.display()));
        }
        Ok(path)
    }
}
