use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use super::{CaptionSegment, CaptionSource};

const WATCH_URL: &str = "https://www.youtube.com/watch";
const CAPTION_TRACKS_MARKER: &str = "\"captionTracks\":";

/// Published captions scraped from the YouTube watch page.
pub struct YouTubeCaptionFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    /// "asr" for auto-generated tracks
    #[serde(default)]
    kind: Option<String>,
}

impl YouTubeCaptionFetcher {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self { client })
    }

    async fn watch_page(&self, video_id: &str) -> Result<String> {
        let response = self
            .client
            .get(WATCH_URL)
            .query(&[("v", video_id)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("watch page for {} returned {}", video_id, response.status()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl CaptionSource for YouTubeCaptionFetcher {
    async fn fetch_captions(&self, video_id: &str, language: &str) -> Result<Vec<CaptionSegment>> {
        let html = self.watch_page(video_id).await?;
        let tracks_json =
            extract_caption_tracks(&html).ok_or_else(|| anyhow!("captions are disabled for {}", video_id))?;
        let tracks: Vec<CaptionTrack> = serde_json::from_str(&tracks_json)?;

        let track = select_track(&tracks, language)
            .ok_or_else(|| anyhow!("no {} captions for {} ({} tracks)", language, video_id, tracks.len()))?;
        debug!("Using {} caption track ({:?}) for {}", track.language_code, track.kind, video_id);

        let xml = self.client.get(&track.base_url).send().await?.error_for_status()?.text().await?;
        Ok(parse_timedtext(&xml))
    }
}

/// Raw JSON array following `"captionTracks":`, matched by bracket depth.
fn extract_caption_tracks(html: &str) -> Option<String> {
    let start = html.find(CAPTION_TRACKS_MARKER)? + CAPTION_TRACKS_MARKER.len();
    let remaining = &html[start..];
    if !remaining.starts_with('[') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in remaining.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '[' | '{' if !in_string => depth += 1,
            ']' | '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(remaining[..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Exact language match first, then a regional variant (`en` matches `en-GB`).
/// Manual tracks win over auto-generated ones at the same level.
fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let is_manual = |t: &&CaptionTrack| t.kind.as_deref() != Some("asr");
    let exact = |t: &&CaptionTrack| t.language_code.eq_ignore_ascii_case(language);
    let regional = |t: &&CaptionTrack| {
        t.language_code
            .split('-')
            .next()
            .is_some_and(|base| base.eq_ignore_ascii_case(language))
    };

    tracks
        .iter()
        .filter(exact)
        .find(is_manual)
        .or_else(|| tracks.iter().find(exact))
        .or_else(|| tracks.iter().filter(regional).find(is_manual))
        .or_else(|| tracks.iter().find(regional))
}

fn text_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<text start="([^"]*)"(?: dur="([^"]*)")?[^>]*>(.*?)</text>"#).expect("valid regex")
    })
}

fn numeric_entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"))
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"))
}

/// Parse a timedtext XML document into segments.
fn parse_timedtext(xml: &str) -> Vec<CaptionSegment> {
    text_pattern()
        .captures_iter(xml)
        .filter_map(|caps| {
            let text = decode_entities(caps.get(3)?.as_str());
            let text = tag_pattern().replace_all(&text, "");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            Some(CaptionSegment {
                start: caps.get(1)?.as_str().parse().unwrap_or(0.0),
                duration: caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0),
                text,
            })
        })
        .collect()
}

/// Timedtext bodies are often entity-encoded twice (`&amp;#39;`), so `&amp;`
/// goes first.
fn decode_entities(text: &str) -> String {
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");

    numeric_entity_pattern()
        .replace_all(&text, |caps: &regex::Captures| {
            let code = &caps[1];
            let value = match code.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse().ok(),
            };
            value
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
