//! Track types and provider identifier validation.
//!
//! The track resolver is the leaf of the pipeline: a pure format check that
//! every boundary (WS queue additions, /extract, /stream) runs before an
//! identifier is allowed anywhere near room or cache state.

use serde::{Deserialize, Serialize};

use crate::error::{EnsembleError, EnsembleResult};
use crate::protocol_constants::VIDEO_ID_LEN;

/// A queued track.
///
/// Immutable once placed in a queue; equality is by `video_id` only.
/// The wire field names (`Title`, `VideoID`) are fixed by the web client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Display title for the track.
    #[serde(rename = "Title")]
    pub title: String,
    /// Provider video identifier (format-validated).
    #[serde(rename = "VideoID")]
    pub video_id: String,
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.video_id == other.video_id
    }
}

impl Eq for Track {}

impl Track {
    /// Creates a track after validating its identifier.
    pub fn new(title: impl Into<String>, video_id: impl Into<String>) -> EnsembleResult<Self> {
        let video_id = video_id.into();
        validate_video_id(&video_id)?;
        Ok(Self {
            title: title.into(),
            video_id,
        })
    }
}

/// Validates a provider video identifier.
///
/// Accepts exactly [`VIDEO_ID_LEN`] ASCII characters from `[A-Za-z0-9_-]`.
pub fn validate_video_id(video_id: &str) -> EnsembleResult<()> {
    if video_id.len() != VIDEO_ID_LEN {
        return Err(EnsembleError::Validation(format!(
            "video id must be {} characters, got {}",
            VIDEO_ID_LEN,
            video_id.len()
        )));
    }
    if !video_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(EnsembleError::Validation(format!(
            "video id contains invalid characters: {:?}",
            video_id
        )));
    }
    Ok(())
}
