//! Per-file ingestion run: dispatch, extract, normalize, chunk, sink, clean up

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;

use super::job_queue::{IngestOutcome, IngestStage, IngestTask, TaskRegistry};
use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::ingestion::IngestPipeline;
use crate::types::document::stem_of;
use crate::types::{ExtractedContent, SourceFormat};

/// Exclusive handle on a RawDocument for the length of one run
///
/// The file is removed when the handle drops, whichever way the run ends,
/// including by panic or by the run future being dropped on timeout.
#[derive(Debug)]
pub struct RawDocument {
    path: PathBuf,
}

impl RawDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RawDocument {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed raw document"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                "Failed to remove raw document: {}",
                e
            ),
        }
    }
}

/// A stage error tagged with where it happened
#[derive(Debug)]
struct StageFailure {
    stage: IngestStage,
    error: Error,
}

impl StageFailure {
    fn at(stage: IngestStage) -> impl FnOnce(Error) -> Self {
        move |error| Self { stage, error }
    }
}

/// Where a run stands once chunking is done
enum Prepared {
    /// Terminal before the sink stage (nothing to ingest)
    Finished(IngestOutcome),
    /// Chunks ready to be written
    Chunked {
        format: SourceFormat,
        chunks: Vec<String>,
    },
}

/// Runs the ingestion stages for one file and records the outcome
pub struct IngestOrchestrator {
    pipeline: Arc<IngestPipeline>,
    registry: TaskRegistry,
    extract_timeout: Duration,
    file_timeout: Duration,
}

impl IngestOrchestrator {
    pub fn new(pipeline: Arc<IngestPipeline>, registry: TaskRegistry, config: &ProcessingConfig) -> Self {
        Self {
            pipeline,
            registry,
            extract_timeout: Duration::from_secs(config.extract_timeout_secs),
            file_timeout: Duration::from_secs(config.file_timeout_secs),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Take ownership of the task's file and run it to a terminal outcome
    ///
    /// Never returns an error: every failure becomes `IngestOutcome::Failed`.
    /// The raw file is gone when this returns.
    pub async fn run(&self, task: IngestTask) -> IngestOutcome {
        let started = Instant::now();
        let filename = task.filename();
        let raw = RawDocument::new(task.path);

        self.registry.set_stage(task.id, IngestStage::Dispatched);

        // Sinking is never cut off by the file timeout, so a recorded outcome
        // always matches what is on disk.
        let prepared = match timeout(self.file_timeout, self.prepare(task.id, raw.path())).await {
            Ok(prepared) => prepared,
            Err(_) => Err(StageFailure {
                stage: self
                    .registry
                    .current_stage(task.id)
                    .unwrap_or(IngestStage::Dispatched),
                error: Error::Timeout(format!(
                    "file timed out after {}s",
                    self.file_timeout.as_secs()
                )),
            }),
        };
        let result = match prepared {
            Ok(Prepared::Finished(outcome)) => Ok(outcome),
            Ok(Prepared::Chunked { format, chunks }) => {
                self.sink(task.id, raw.path(), format, chunks).await
            }
            Err(failure) => Err(failure),
        };
        let outcome = result.unwrap_or_else(|failure| IngestOutcome::Failed {
            stage: failure.stage,
            message: failure.error.to_string(),
        });

        drop(raw);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            IngestOutcome::Completed { output_stem, chunks } => tracing::info!(
                task_id = %task.id,
                file = %filename,
                output_stem = %output_stem,
                chunks,
                elapsed_ms,
                "Ingestion completed"
            ),
            IngestOutcome::Empty => tracing::info!(
                task_id = %task.id,
                file = %filename,
                elapsed_ms,
                "Nothing to ingest, no artifact written"
            ),
            IngestOutcome::Failed { stage, message } => tracing::error!(
                task_id = %task.id,
                file = %filename,
                stage = %stage,
                elapsed_ms,
                "Ingestion failed: {}",
                message
            ),
        }

        self.registry.finish(task.id, outcome.clone());
        outcome
    }

    /// Dispatch through chunking, bounded by the whole-file timeout
    async fn prepare(&self, task_id: Uuid, path: &Path) -> std::result::Result<Prepared, StageFailure> {
        let format = SourceFormat::from_path(path).map_err(StageFailure::at(IngestStage::Dispatched))?;

        self.registry.set_stage(task_id, IngestStage::Extracting);
        let content = {
            let pipeline = self.pipeline.clone();
            let path = path.to_path_buf();
            let extraction = blocking(move || pipeline.extract(format, &path));
            match timeout(self.extract_timeout, extraction).await {
                Ok(result) => result.map_err(StageFailure::at(IngestStage::Extracting))?,
                Err(_) => {
                    return Err(StageFailure {
                        stage: IngestStage::Extracting,
                        error: Error::Timeout(format!(
                            "extraction exceeded {}s",
                            self.extract_timeout.as_secs()
                        )),
                    })
                }
            }
        };
        if content.is_empty() {
            return Ok(Prepared::Finished(IngestOutcome::Empty));
        }

        self.registry.set_stage(task_id, IngestStage::Normalizing);
        let content: ExtractedContent = blocking(move || Ok(IngestPipeline::normalize(content)))
            .await
            .map_err(StageFailure::at(IngestStage::Normalizing))?;

        self.registry.set_stage(task_id, IngestStage::Chunking);
        let chunks = {
            let pipeline = self.pipeline.clone();
            blocking(move || Ok(pipeline.chunk(&content)))
                .await
                .map_err(StageFailure::at(IngestStage::Chunking))?
        };
        if chunks.is_empty() {
            return Ok(Prepared::Finished(IngestOutcome::Empty));
        }

        Ok(Prepared::Chunked { format, chunks })
    }

    async fn sink(
        &self,
        task_id: Uuid,
        path: &Path,
        format: SourceFormat,
        chunks: Vec<String>,
    ) -> std::result::Result<IngestOutcome, StageFailure> {
        self.registry.set_stage(task_id, IngestStage::Sinking);
        let chunk_count = chunks.len();
        {
            let pipeline = self.pipeline.clone();
            let path = path.to_path_buf();
            blocking(move || pipeline.sink(&chunks, &path, format))
                .await
                .map_err(StageFailure::at(IngestStage::Sinking))?;
        }

        Ok(IngestOutcome::Completed {
            output_stem: stem_of(path),
            chunks: chunk_count,
        })
    }
}

/// Run a stage on the blocking pool; a panic inside it becomes an error
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("stage task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::processing::TaskState;
    use tempfile::TempDir;

    fn orchestrator(dir: &TempDir) -> IngestOrchestrator {
        let mut config = IngestConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.chunking.chunk_size = 40;
        config.chunking.chunk_overlap = 5;
        let pipeline = Arc::new(IngestPipeline::from_config(&config).unwrap());
        IngestOrchestrator::new(pipeline, TaskRegistry::new(), &config.processing)
    }

    fn place(dir: &TempDir, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.path().join("raw").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    async fn run(orch: &IngestOrchestrator, path: PathBuf) -> (IngestTask, IngestOutcome) {
        let task = IngestTask::new(path);
        orch.registry().register(&task);
        let outcome = orch.run(task.clone()).await;
        (task, outcome)
    }

    #[tokio::test]
    async fn test_completed_run_writes_artifact_and_removes_raw() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let body = format!("<main>{}</main>", "<p>plenty of words in this page body</p>".repeat(5));
        let raw = place(&dir, "notes.html", body.as_bytes());

        let (task, outcome) = run(&orch, raw.clone()).await;

        let IngestOutcome::Completed { output_stem, chunks } = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(output_stem, "notes");
        assert!(chunks > 1);
        let artifact = dir.path().join("processed").join("html").join("notes.jsonl");
        assert_eq!(std::fs::read_to_string(artifact).unwrap().lines().count(), chunks);
        assert!(!raw.exists());
        assert!(matches!(
            orch.registry().get(task.id).unwrap().state,
            TaskState::Finished { .. }
        ));
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_at_dispatch() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let raw = place(&dir, "slides.pptx", b"PK\x03\x04");

        let (_, outcome) = run(&orch, raw.clone()).await;

        match outcome {
            IngestOutcome::Failed { stage, message } => {
                assert_eq!(stage, IngestStage::Dispatched);
                assert!(message.contains("unsupported format"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(!raw.exists());
    }

    #[tokio::test]
    async fn test_extraction_failure_is_contained_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let raw = place(&dir, "broken.pdf", b"%PDF-1.4 truncated garbage");

        let (_, outcome) = run(&orch, raw.clone()).await;

        assert!(matches!(
            outcome,
            IngestOutcome::Failed { stage: IngestStage::Extracting, .. }
        ));
        assert!(!raw.exists());
        assert!(!dir.path().join("processed").join("pdf").join("broken.jsonl").exists());
    }

    #[tokio::test]
    async fn test_blank_html_is_empty() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let raw = place(&dir, "blank.html", b"<html><body>  \n </body></html>");

        let (_, outcome) = run(&orch, raw.clone()).await;

        assert_eq!(outcome, IngestOutcome::Empty);
        assert!(!raw.exists());
        assert!(!dir.path().join("processed").join("html").exists());
    }

    #[tokio::test]
    async fn test_sink_failure_is_tagged() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        // A file where the format directory should be
        std::fs::create_dir_all(dir.path().join("processed")).unwrap();
        std::fs::write(dir.path().join("processed").join("csv"), b"occupied").unwrap();
        let raw = place(&dir, "rows.csv", b"a,b\n1,2\n");

        let (_, outcome) = run(&orch, raw.clone()).await;

        assert!(matches!(
            outcome,
            IngestOutcome::Failed { stage: IngestStage::Sinking, .. }
        ));
        assert!(!raw.exists());
    }

    struct StuckEngine;

    impl crate::ingestion::PdfEngine for StuckEngine {
        fn name(&self) -> &'static str {
            "stuck"
        }

        fn extract_pages(&self, _data: &[u8]) -> Result<Vec<String>> {
            std::thread::sleep(Duration::from_secs(3));
            Ok(vec!["too late".to_string()])
        }
    }

    #[tokio::test]
    async fn test_stuck_extraction_times_out() {
        use crate::ingestion::{ChunkSink, FormatExtractor, PdfExtractor, TextChunker};

        let dir = TempDir::new().unwrap();
        let mut config = IngestConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.processing.extract_timeout_secs = 1;

        let pipeline = IngestPipeline::new(
            FormatExtractor::with_pdf(PdfExtractor::with_engines(vec![Box::new(StuckEngine)])),
            TextChunker::new(100, 10).unwrap(),
            ChunkSink::new(config.storage.processed_dir()),
        );
        let orch = IngestOrchestrator::new(Arc::new(pipeline), TaskRegistry::new(), &config.processing);
        let raw = place(&dir, "slow.pdf", b"%PDF-1.4");

        let (_, outcome) = run(&orch, raw.clone()).await;

        match outcome {
            IngestOutcome::Failed { stage, message } => {
                assert_eq!(stage, IngestStage::Extracting);
                assert!(message.contains("exceeded 1s"), "message: {}", message);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(!raw.exists());
    }

    #[tokio::test]
    async fn test_file_timeout_publishes_nothing() {
        use crate::ingestion::{ChunkSink, FormatExtractor, PdfExtractor, TextChunker};

        struct SlowEngine;

        impl crate::ingestion::PdfEngine for SlowEngine {
            fn name(&self) -> &'static str {
                "slow"
            }

            fn extract_pages(&self, _data: &[u8]) -> Result<Vec<String>> {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(vec!["text that arrives after the deadline".to_string()])
            }
        }

        let dir = TempDir::new().unwrap();
        let mut config = IngestConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.processing.extract_timeout_secs = 10;
        config.processing.file_timeout_secs = 1;

        let sink = ChunkSink::new(config.storage.processed_dir());
        let artifact = sink.artifact_path("pdf", "late");
        let pipeline = IngestPipeline::new(
            FormatExtractor::with_pdf(PdfExtractor::with_engines(vec![Box::new(SlowEngine)])),
            TextChunker::new(100, 10).unwrap(),
            sink,
        );
        let orch = IngestOrchestrator::new(Arc::new(pipeline), TaskRegistry::new(), &config.processing);
        let raw = place(&dir, "late.pdf", b"%PDF-1.4");

        let (task, outcome) = run(&orch, raw.clone()).await;

        match &outcome {
            IngestOutcome::Failed { stage, message } => {
                assert_eq!(*stage, IngestStage::Extracting);
                assert!(message.contains("file timed out"), "message: {}", message);
            }
            other => panic!("expected file timeout, got {:?}", other),
        }

        // The detached extraction finishes later; nothing may be published for a failed run
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(!artifact.exists());
        assert!(!raw.exists());
        assert_eq!(
            orch.registry().get(task.id).unwrap().state,
            TaskState::Finished { outcome }
        );
    }

    #[test]
    fn test_raw_document_drop_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.csv");
        std::fs::write(&path, b"a\n1\n").unwrap();

        {
            let raw = RawDocument::new(&path);
            assert!(raw.path().exists());
        }
        assert!(!path.exists());

        // Already gone is not an error
        drop(RawDocument::new(&path));
    }

    #[test]
    fn test_raw_document_removed_on_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("y.csv");
        std::fs::write(&path, b"a\n1\n").unwrap();

        let guarded = path.clone();
        let result = std::panic::catch_unwind(move || {
            let _raw = RawDocument::new(guarded);
            panic!("stage blew up");
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
