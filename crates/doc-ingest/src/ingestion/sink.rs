//! JSONL artifact writer

use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Writes chunk artifacts under `processed/{format}/{stem}.jsonl`
///
/// The artifact is written to a sibling temp file and renamed into place, so
/// a reader never sees a partially written artifact. Each save gets its own
/// temp name, so two runs targeting the same stem never share a file.
#[derive(Debug, Clone)]
pub struct ChunkSink {
    processed_dir: PathBuf,
}

impl ChunkSink {
    /// Create a sink rooted at `processed_dir`
    pub fn new(processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            processed_dir: processed_dir.into(),
        }
    }

    /// Artifact path for a format tag and source stem
    pub fn artifact_path(&self, format: &str, stem: &str) -> PathBuf {
        self.processed_dir.join(format).join(format!("{}.jsonl", stem))
    }

    /// Write one line per chunk: `base` fields, then `chunk_index` and `text`
    ///
    /// An existing artifact at `destination` is replaced. Returns the number
    /// of lines written.
    pub fn save(&self, chunks: &[String], destination: &Path, base: &Map<String, Value>) -> Result<usize> {
        let sink_err = |source: io::Error| Error::SinkWrite {
            path: destination.to_path_buf(),
            source,
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(sink_err)?;
        }

        let tmp_path = temp_path_for(destination);
        if let Err(e) = write_lines(&tmp_path, chunks, base) {
            let _ = fs::remove_file(&tmp_path);
            return Err(sink_err(e));
        }
        if let Err(e) = fs::rename(&tmp_path, destination) {
            let _ = fs::remove_file(&tmp_path);
            return Err(sink_err(e));
        }

        tracing::debug!(
            path = %destination.display(),
            lines = chunks.len(),
            "Artifact written"
        );
        Ok(chunks.len())
    }
}

/// `{artifact file name}.{uuid}.tmp` next to the artifact
fn temp_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!("{}.{}.tmp", name, Uuid::new_v4().simple()))
}

fn write_lines(path: &Path, chunks: &[String], base: &Map<String, Value>) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    for (index, chunk) in chunks.iter().enumerate() {
        let mut line = base.clone();
        line.insert("chunk_index".to_string(), Value::from(index));
        line.insert("text".to_string(), Value::String(chunk.clone()));
        serde_json::to_writer(&mut out, &line)?;
        out.write_all(b"\n")?;
    }

    out.flush()?;
    out.get_ref().sync_all()
}
