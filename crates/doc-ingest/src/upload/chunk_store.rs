//! On-disk staging area for upload parts

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::validate_session_id;
use crate::error::{Error, Result};

/// Staging area keyed by session id: `{root}/{session_id}/{part_index}.part`
///
/// Each part is its own file, so concurrent and out-of-order arrivals never
/// touch each other. Parts are written to a temp name and renamed into place,
/// so a `.part` file is either complete or absent.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a session's parts
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    /// Final path of one part
    pub fn part_path(&self, session_id: &str, part_index: u32) -> Result<PathBuf> {
        Ok(self.session_dir(session_id)?.join(format!("{}.part", part_index)))
    }

    /// Write one part from a byte stream, replacing any earlier upload of the same index
    ///
    /// Returns the number of bytes stored. A stream error is returned as the
    /// caller's own error, so transport limits keep their meaning.
    pub async fn put_part<S, E>(&self, session_id: &str, part_index: u32, mut stream: S) -> Result<u64>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Into<Error>,
    {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir).await?;

        let final_path = dir.join(format!("{}.part", part_index));
        let tmp_path = dir.join(format!("{}.part.{}.tmp", part_index, Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            let mut written = 0u64;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(Into::into)?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }

            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, Error>(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(
            session_id = %session_id,
            part_index,
            bytes = written,
            "Stored upload part"
        );

        Ok(written)
    }

    /// Write one part from an in-memory buffer
    pub async fn put_part_bytes(&self, session_id: &str, part_index: u32, data: Bytes) -> Result<u64> {
        let stream = futures::stream::iter([Ok::<_, std::io::Error>(data)]);
        self.put_part(session_id, part_index, stream).await
    }

    /// Indices of the complete parts present for a session, sorted ascending
    pub async fn received_parts(&self, session_id: &str) -> Result<Vec<u32>> {
        let dir = self.session_dir(session_id)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("upload session '{}'", session_id)));
            }
            Err(e) => return Err(e.into()),
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = name.strip_suffix(".part").and_then(|n| n.parse::<u32>().ok()) {
                parts.push(index);
            }
        }
        parts.sort_unstable();

        Ok(parts)
    }

    /// Remove a session's staging directory and everything in it
    pub async fn discard(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_part_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        let written = store
            .put_part_bytes("s1", 3, Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(written, 5);
        let stored = std::fs::read(dir.path().join("s1").join("3.part")).unwrap();
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn test_reupload_overwrites_part() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        store.put_part_bytes("s1", 0, Bytes::from_static(b"first attempt")).await.unwrap();
        store.put_part_bytes("s1", 0, Bytes::from_static(b"retry")).await.unwrap();

        let stored = std::fs::read(store.part_path("s1", 0).unwrap()).unwrap();
        assert_eq!(stored, b"retry");
        assert_eq!(store.received_parts("s1").await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_streamed_part_is_concatenated() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        let stream = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
            Ok(Bytes::from_static(b"e")),
        ]);
        let written = store.put_part("s2", 1, stream).await.unwrap();

        assert_eq!(written, 5);
        assert_eq!(std::fs::read(store.part_path("s2", 1).unwrap()).unwrap(), b"abcde");
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_part() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ]);
        let result = store.put_part("s3", 0, stream).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(store.received_parts("s3").await.unwrap().is_empty());
        let leftovers = std::fs::read_dir(dir.path().join("s3")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_received_parts_sorted_and_ignores_strays() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        for index in [2u32, 0, 1, 10] {
            store.put_part_bytes("s4", index, Bytes::from_static(b"x")).await.unwrap();
        }
        std::fs::write(dir.path().join("s4").join("notes.txt"), b"stray").unwrap();
        std::fs::write(dir.path().join("s4").join("5.part.abc.tmp"), b"half").unwrap();

        assert_eq!(store.received_parts("s4").await.unwrap(), vec![0, 1, 2, 10]);
    }

    #[tokio::test]
    async fn test_unknown_session_and_bad_ids() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        assert!(matches!(store.received_parts("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(
            store.put_part_bytes("../escape", 0, Bytes::new()).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_parts_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());

        let writes = (0..8u32).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let body = Bytes::from(vec![b'a' + i as u8; 1024]);
                store.put_part_bytes("shared", i, body).await
            })
        });
        for handle in futures::future::join_all(writes).await {
            handle.unwrap().unwrap();
        }

        for i in 0..8u32 {
            let data = std::fs::read(store.part_path("shared", i).unwrap()).unwrap();
            assert_eq!(data.len(), 1024);
            assert!(data.iter().all(|b| *b == b'a' + i as u8));
        }
    }
}
