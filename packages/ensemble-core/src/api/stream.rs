//! Audio streaming handler.
//!
//! Separated from REST handlers due to its distinct concerns: byte-range
//! parsing, file streaming and the resolve-then-serve flow against the
//! extraction cache. A request for an id that is mid-extraction waits for
//! the in-flight extraction rather than failing fast, so the first listener
//! and every late joiner share one subprocess run.

use std::io::SeekFrom;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;

use crate::api::AppState;
use crate::error::{EnsembleError, EnsembleResult};
use crate::extract::AudioHandle;
use crate::protocol_constants::AUDIO_CONTENT_TYPE;
use crate::track::validate_video_id;

/// How a `Range` header maps onto a resource of known length.
#[derive(Debug, PartialEq, Eq)]
enum RangeOutcome {
    /// No range or an ignorable (malformed) one; serve the whole body.
    Full,
    /// Serve `start..=end` (both in-bounds).
    Partial(u64, u64),
    /// Well-formed but not satisfiable against this length.
    Unsatisfiable,
}

/// Parses a `Range` header against a resource length.
///
/// Only the first byte-range of the header is honored. Malformed headers
/// are ignored (full response) per RFC 9110; syntactically valid ranges
/// that miss the resource are unsatisfiable.
fn parse_range(header: &str, len: u64) -> RangeOutcome {
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    let first = spec.split(',').next().unwrap_or("").trim();
    let Some((start_s, end_s)) = first.split_once('-') else {
        return RangeOutcome::Full;
    };

    match (start_s.is_empty(), end_s.is_empty()) {
        // "-suffix": final N bytes
        (true, false) => match end_s.parse::<u64>() {
            Ok(0) => RangeOutcome::Unsatisfiable,
            Ok(suffix) if len > 0 => {
                let start = len.saturating_sub(suffix);
                RangeOutcome::Partial(start, len - 1)
            }
            Ok(_) => RangeOutcome::Unsatisfiable,
            Err(_) => RangeOutcome::Full,
        },
        // "start-": from offset to the end
        (false, true) => match start_s.parse::<u64>() {
            Ok(start) if start < len => RangeOutcome::Partial(start, len - 1),
            Ok(_) => RangeOutcome::Unsatisfiable,
            Err(_) => RangeOutcome::Full,
        },
        // "start-end": inclusive window, clamped to the resource
        (false, false) => match (start_s.parse::<u64>(), end_s.parse::<u64>()) {
            (Ok(start), Ok(end)) if start <= end && start < len => {
                RangeOutcome::Partial(start, end.min(len - 1))
            }
            (Ok(_), Ok(_)) => RangeOutcome::Unsatisfiable,
            _ => RangeOutcome::Full,
        },
        (true, true) => RangeOutcome::Full,
    }
}

pub(super) async fn stream_audio(
    Path(video_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> EnsembleResult<Response> {
    // Malformed ids are indistinguishable from unknown tracks to a client
    if validate_video_id(&video_id).is_err() {
        return Err(EnsembleError::TrackNotFound(video_id));
    }

    let handle = state.cache.resolve(&video_id).await?;

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if let Some(ref range) = range_header {
        log::debug!(
            "[Stream] Range request: video={}, range='{}', len={}",
            video_id,
            range,
            handle.len
        );
    } else {
        log::info!(
            "[Stream] New listener: video={}, len={}",
            video_id,
            handle.len
        );
    }

    serve_audio(&handle, range_header.as_deref()).await
}

async fn serve_audio(handle: &AudioHandle, range: Option<&str>) -> EnsembleResult<Response> {
    let outcome = match range {
        Some(header) => parse_range(header, handle.len),
        None => RangeOutcome::Full,
    };

    let (status, start, end) = match outcome {
        RangeOutcome::Unsatisfiable => {
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{}", handle.len))
                .body(Body::empty())
                .map_err(|e| EnsembleError::Internal(e.to_string()));
        }
        RangeOutcome::Full => (StatusCode::OK, 0, handle.len.saturating_sub(1)),
        RangeOutcome::Partial(start, end) => (StatusCode::PARTIAL_CONTENT, start, end),
    };

    let mut file = tokio::fs::File::open(handle.path.as_ref())
        .await
        .map_err(|e| {
            EnsembleError::Internal(format!(
                "cached file {} unreadable: {}",
                handle.path.display(),
                e
            ))
        })?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| EnsembleError::Internal(e.to_string()))?;
    }

    let body_len = if handle.len == 0 { 0 } else { end - start + 1 };
    let reader = tokio::io::AsyncReadExt::take(file, body_len);
    let body = Body::from_stream(ReaderStream::new(reader));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, body_len.to_string());
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, end, handle.len),
        );
    }

    builder
        .body(body)
        .map_err(|e| EnsembleError::Internal(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
