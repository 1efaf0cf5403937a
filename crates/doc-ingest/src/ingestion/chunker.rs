//! Fixed-window chunking with overlap, over text or streamed records
//!
//! Sizes are counted in characters, not bytes.

use serde_json::Value;

use super::normalizer::clean_text;
use crate::error::{Error, Result};
use crate::types::Record;

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    /// Upper bound on characters per chunk
    chunk_size: usize,
    /// Characters shared with the next chunk
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker; `overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::Config(format!(
                "invalid chunking window: size {} overlap {}",
                chunk_size, overlap
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Window chunking over a single string
    ///
    /// Emits `[start, start + chunk_size)` and advances by `chunk_size - overlap`
    /// until a window reaches the end. The last window may be shorter. Blank
    /// input yields no chunks.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let len = offsets.len();
        let byte_at = |char_pos: usize| offsets.get(char_pos).copied().unwrap_or(text.len());
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::with_capacity(len / step + 1);
        let mut start = 0usize;
        loop {
            let end = start + self.chunk_size;
            chunks.push(text[byte_at(start)..byte_at(end.min(len))].to_string());
            if end >= len {
                break;
            }
            start += step;
        }

        chunks
    }

    /// Streaming chunker for record sets
    pub fn record_chunker(&self) -> RecordChunker {
        RecordChunker {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            buffer: String::new(),
            buffer_chars: 0,
        }
    }

    /// Chunk a record sequence, one serialized line per record
    pub fn chunk_records<'a, I>(&self, records: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut chunker = self.record_chunker();
        let mut chunks = Vec::new();
        for record in records {
            chunks.extend(chunker.push(record));
        }
        chunks.extend(chunker.finish());
        chunks
    }
}

/// Accumulates serialized records and emits full windows as soon as they fill
///
/// Between calls the buffer never holds `chunk_size` characters or more, so
/// memory stays bounded no matter how many records pass through.
#[derive(Debug)]
pub struct RecordChunker {
    chunk_size: usize,
    overlap: usize,
    buffer: String,
    buffer_chars: usize,
}

impl RecordChunker {
    /// Serialize, normalize and append one record
    pub fn push(&mut self, record: &Record) -> Vec<String> {
        self.push_line(&clean_text(&serialize_record(record)))
    }

    /// Append one already-normalized line
    pub fn push_line(&mut self, line: &str) -> Vec<String> {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        self.buffer_chars += line.chars().count() + 1;

        let mut emitted = Vec::new();
        while self.buffer_chars >= self.chunk_size {
            let cut = self.byte_offset(self.chunk_size);
            let keep_from = self.byte_offset(self.chunk_size - self.overlap);

            emitted.push(self.buffer[..cut].to_string());
            self.buffer.drain(..keep_from);
            self.buffer_chars -= self.chunk_size - self.overlap;
        }
        emitted
    }

    /// Flush the tail; blank tails are dropped
    pub fn finish(self) -> Option<String> {
        if self.buffer.trim().is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }

    /// Characters currently buffered
    pub fn buffered_chars(&self) -> usize {
        self.buffer_chars
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len())
    }
}

/// `key: value; key: value` in column order
pub fn serialize_record(record: &Record) -> String {
    record
        .iter()
        .map(|(key, value)| format!("{}: {}", key, render_value(value)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
