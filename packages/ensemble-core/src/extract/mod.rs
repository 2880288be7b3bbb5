//! Audio acquisition: external extraction plus the on-disk cache that
//! collapses concurrent requests for the same track into one extraction.

mod cache;
mod extractor;

pub use cache::{AudioHandle, ExtractionCache};
pub use extractor::{AudioExtractor, YtDlpExtractor};
