//! Ordered reassembly of staged parts into a raw document

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::{sanitize_filename, ChunkStore};
use crate::error::{Error, Result};
use crate::types::document::suffix_of;

/// Subdirectory for files without an extension
const NO_SUFFIX_DIR: &str = "unknown";

/// Concatenates a session's parts into `raw/{suffix}/{filename}`
#[derive(Debug, Clone)]
pub struct Merger {
    store: ChunkStore,
    raw_dir: PathBuf,
}

impl Merger {
    /// Create a merger reading from `store` and writing under `raw_dir`
    pub fn new(store: ChunkStore, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            raw_dir: raw_dir.into(),
        }
    }

    /// Destination for a declared filename
    pub fn destination_for(&self, filename: &str) -> Result<PathBuf> {
        raw_destination(&self.raw_dir, filename)
    }

    /// Append parts `0..total_parts` in index order, then drop the session's staging
    ///
    /// A missing part is fatal (`StagingIncomplete`). On any failure the
    /// partial destination this call created is removed, so a retry after the
    /// missing part arrives is not blocked, and staging is left untouched for
    /// inspection or retry.
    pub async fn merge(&self, session_id: &str, total_parts: u32, final_filename: &str) -> Result<PathBuf> {
        if total_parts == 0 {
            return Err(Error::invalid("total_parts must be at least 1"));
        }

        let session_dir = self.store.session_dir(session_id)?;
        let destination = self.destination_for(final_filename)?;

        let file = create_new(&destination).await?;
        let total_bytes = match append_parts(file, &session_dir, session_id, total_parts).await {
            Ok(total_bytes) => total_bytes,
            Err(e) => {
                // This call is the destination's only writer
                if let Err(remove) = fs::remove_file(&destination).await {
                    tracing::warn!(
                        destination = %destination.display(),
                        "Failed to remove partial merge output: {}",
                        remove
                    );
                }
                return Err(e);
            }
        };

        self.store.discard(session_id).await?;

        tracing::info!(
            session_id = %session_id,
            parts = total_parts,
            bytes = total_bytes,
            destination = %destination.display(),
            "Merged upload"
        );

        Ok(destination)
    }
}

async fn append_parts(file: fs::File, session_dir: &Path, session_id: &str, total_parts: u32) -> Result<u64> {
    let mut out = BufWriter::new(file);
    let mut total_bytes = 0u64;

    for index in 0..total_parts {
        let part_path = session_dir.join(format!("{}.part", index));
        let mut part = match fs::File::open(&part_path).await {
            Ok(part) => part,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    session_id = %session_id,
                    part_index = index,
                    total_parts,
                    "Merge aborted, part missing; staging kept"
                );
                return Err(Error::StagingIncomplete {
                    session_id: session_id.to_string(),
                    part_index: index,
                    source: e,
                });
            }
            Err(e) => return Err(e.into()),
        };
        total_bytes += tokio::io::copy(&mut part, &mut out).await?;
    }

    out.flush().await?;
    out.get_ref().sync_all().await?;
    Ok(total_bytes)
}

/// `raw_dir/{suffix}/{sanitized filename}`
pub(crate) fn raw_destination(raw_dir: &Path, filename: &str) -> Result<PathBuf> {
    let filename = sanitize_filename(filename)?;
    let suffix = suffix_of(&filename);
    let bucket = if suffix.is_empty() { NO_SUFFIX_DIR.to_string() } else { suffix };
    Ok(raw_dir.join(bucket).join(filename))
}

/// Create a file that must not exist yet, creating parent directories
pub(crate) async fn create_new(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    match OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Conflict(format!(
            "{} already exists and is awaiting ingestion",
            path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}
