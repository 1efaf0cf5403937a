//! Resumable chunked uploads: part staging and ordered reassembly

mod chunk_store;
mod merger;

pub use chunk_store::ChunkStore;
pub use merger::Merger;
pub(crate) use merger::{create_new, raw_destination};

use std::path::Path;

use crate::error::{Error, Result};

/// Longest accepted session id
const MAX_SESSION_ID_LEN: usize = 128;

/// Check that a session id is safe to use as a directory name
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "session id must be 1-{} characters of [A-Za-z0-9_-], got '{}'",
            MAX_SESSION_ID_LEN, session_id
        )))
    }
}

/// Reduce a client-declared filename to its final path component
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Clients on Windows send backslash-separated paths
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or("");

    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::invalid(format!("invalid filename '{}'", filename)));
    }
    Ok(name.to_string())
}
