use std::collections::HashMap;

use super::audio::{AudioChunk, SAMPLE_RATE};

/// Longest run of words considered when stitching two chunk transcripts
const MAX_SEAM_WORDS: usize = 16;

/// Split samples into `chunk_seconds` windows that overlap by `stride_seconds`.
///
/// The final window may be shorter. An overlap of at least the window length
/// is clamped so windows always advance.
pub fn split_chunks(samples: &[f32], chunk_seconds: u32, stride_seconds: u32) -> Vec<AudioChunk> {
    let rate = SAMPLE_RATE as usize;
    let window = (chunk_seconds.max(1) as usize).saturating_mul(rate);
    let overlap = (stride_seconds as usize).saturating_mul(rate).min(window - 1);
    let step = window - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + window).min(samples.len());
        chunks.push(AudioChunk {
            index: chunks.len(),
            start_seconds: start as f64 / SAMPLE_RATE as f64,
            samples: samples[start..end].to_vec(),
        });
        if end == samples.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Append `next` to `previous`, dropping the words at the start of `next`
/// that repeat the end of `previous`.
pub fn merge_overlap(previous: &str, next: &str) -> String {
    let left: Vec<&str> = previous.split_whitespace().collect();
    let right: Vec<&str> = next.split_whitespace().collect();
    if left.is_empty() {
        return right.join(" ");
    }
    if right.is_empty() {
        return left.join(" ");
    }

    let left_norm: Vec<String> = left.iter().map(|w| normalize(w)).collect();
    let right_norm: Vec<String> = right.iter().map(|w| normalize(w)).collect();

    let longest = MAX_SEAM_WORDS.min(left.len()).min(right.len());
    let seam = (1..=longest)
        .rev()
        .find(|&k| {
            let tail = &left_norm[left_norm.len() - k..];
            let head = &right_norm[..k];
            tail == head && tail.iter().any(|w| !w.is_empty())
        })
        .unwrap_or(0);

    left.iter()
        .chain(right[seam..].iter())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stitch per-chunk transcripts in order.
pub fn merge_chunk_texts(texts: &[String]) -> String {
    texts
        .iter()
        .fold(String::new(), |merged, text| merge_overlap(&merged, text))
}

/// Most frequently reported language; ties go to the one seen first.
pub fn dominant_language(languages: &[String]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, language) in languages.iter().enumerate() {
        let language = language.trim();
        if language.is_empty() {
            continue;
        }
        counts.entry(language).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(language, _)| language.to_string())
}
