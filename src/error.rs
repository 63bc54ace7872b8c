use thiserror::Error;

/// Why a single structured-output attempt was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// The generation call itself failed (network, rate limit, provider error)
    #[error("generation call failed: {0}")]
    Call(String),

    /// The response was not valid JSON
    #[error("invalid json: {0}")]
    Parse(String),

    /// Valid JSON that does not match the requested shape
    #[error("{0}")]
    Shape(String),
}

/// Returned once every structured-output attempt has been used up.
#[derive(Error, Debug, Clone)]
#[error("failed to get a valid response from the model after {attempts} attempts: {last_error}")]
pub struct GenerationFailure {
    /// Number of attempts made
    pub attempts: u32,
    /// Error of the final attempt
    pub last_error: AttemptError,
    /// Feedback text accumulated across all attempts
    pub feedback: String,
}

/// Unrecoverable failure inside the transcript acquisition chain.
///
/// Only a failure to obtain audio at all surfaces here; every other tier
/// degrades to an absent transcript.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("audio download failed for {video_id}: {reason}")]
    AudioDownload { video_id: String, reason: String },

    #[error("audio download for {video_id} timed out after {seconds}s")]
    DownloadTimeout { video_id: String, seconds: u64 },

    #[error("could not create temporary audio directory: {0}")]
    TempDir(#[from] std::io::Error),
}

/// Failures of the higher-level content generators.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error(transparent)]
    Generation(#[from] GenerationFailure),

    #[error("generated content has an unexpected structure: {0}")]
    Malformed(#[from] serde_json::Error),
}
