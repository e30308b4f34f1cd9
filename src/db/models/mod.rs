//! Database models split into domain-specific modules.
//!
//! Each module holds the row types, the API-facing projections and the
//! queries for one entity family.

pub mod course;
pub mod enrollment;
pub mod error;
pub mod homework;
pub mod lead;
pub mod lesson;
pub mod sales;
pub mod user;

pub use course::*;
pub use enrollment::*;
pub use error::*;
pub use homework::*;
pub use lead::*;
pub use lesson::*;
pub use sales::*;
pub use user::*;

/// Current time as stored in every timestamp column
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Decode a JSON-encoded file list column
pub(crate) fn decode_files(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

/// Encode a file list for storage
pub(crate) fn encode_files(files: &[String]) -> Result<String, serde_json::Error> {
    serde_json::to_string(files)
}
