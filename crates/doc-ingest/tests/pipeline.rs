//! End-to-end ingestion: staged parts through merge, extraction, chunking and the sink

use std::fs::File;
use std::sync::Arc;

use bytes::Bytes;
use doc_ingest::config::IngestConfig;
use doc_ingest::processing::{IngestTask, TaskRegistry, TaskState};
use doc_ingest::{
    ChunkStore, FormatExtractor, IngestOrchestrator, IngestOutcome, IngestPipeline, IngestStage,
    Merger, SourceFormat,
};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use tempfile::TempDir;
use tokio_test::assert_ok;

struct Harness {
    _dir: TempDir,
    config: IngestConfig,
    store: ChunkStore,
    merger: Merger,
    orchestrator: IngestOrchestrator,
}

fn harness(chunk_size: usize, overlap: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = IngestConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.chunking.chunk_size = chunk_size;
    config.chunking.chunk_overlap = overlap;

    let store = ChunkStore::new(config.storage.staging_dir());
    let merger = Merger::new(store.clone(), config.storage.raw_dir());
    let pipeline = Arc::new(IngestPipeline::from_config(&config).unwrap());
    let orchestrator = IngestOrchestrator::new(pipeline, TaskRegistry::new(), &config.processing);

    Harness {
        _dir: dir,
        config,
        store,
        merger,
        orchestrator,
    }
}

async fn ingest(h: &Harness, path: std::path::PathBuf) -> (IngestTask, IngestOutcome) {
    let task = IngestTask::new(path);
    h.orchestrator.registry().register(&task);
    let outcome = h.orchestrator.run(task.clone()).await;
    (task, outcome)
}

fn sales_csv() -> String {
    let mut csv = String::from("region,amount\n");
    for i in 0..100 {
        csv.push_str(&format!("zone-{},{}\n", i % 7, i * 13));
    }
    csv
}

#[tokio::test]
async fn test_chunked_csv_upload_produces_artifact() {
    let h = harness(200, 20);
    let csv = sales_csv();

    // Expected chunks come from the same extraction run on an untouched copy
    let reference = h.config.storage.data_dir.join("reference.csv");
    std::fs::write(&reference, &csv).unwrap();
    let (_, content) = FormatExtractor::default().extract_path(&reference).unwrap();
    let expected = h.orchestrator_chunks(&content);

    let bytes = csv.as_bytes();
    let third = bytes.len() / 3;
    let parts = [&bytes[..third], &bytes[third..2 * third], &bytes[2 * third..]];
    // Out of order on purpose
    for index in [2usize, 0, 1] {
        assert_ok!(
            h.store
                .put_part_bytes("sales-upload", index as u32, Bytes::copy_from_slice(parts[index]))
                .await
        );
    }
    assert_eq!(h.store.received_parts("sales-upload").await.unwrap(), vec![0, 1, 2]);

    let raw = h.merger.merge("sales-upload", 3, "sales.csv").await.unwrap();
    assert_eq!(raw, h.config.storage.raw_dir().join("csv").join("sales.csv"));
    assert_eq!(std::fs::read(&raw).unwrap(), bytes);

    let (task, outcome) = ingest(&h, raw.clone()).await;

    let IngestOutcome::Completed { output_stem, chunks } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(output_stem, "sales");
    assert_eq!(chunks, expected.len());
    assert!(!raw.exists());

    let artifact = h.config.storage.processed_dir().join("csv").join("sales.jsonl");
    let text = std::fs::read_to_string(&artifact).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), expected.len());

    for (index, line) in lines.iter().enumerate() {
        let object = line.as_object().unwrap();
        for key in ["id", "source_file", "format", "chunk_index", "text"] {
            assert!(object.contains_key(key), "line {} lacks '{}'", index, key);
        }
        assert_eq!(line["id"], "sales");
        assert_eq!(line["format"], "csv");
        assert_eq!(line["chunk_index"], index);
        assert_eq!(line["text"], expected[index].as_str());
    }

    let record = h.orchestrator.registry().get(task.id).unwrap();
    assert!(matches!(record.state, TaskState::Finished { .. }));
    // Staging is gone once the merge succeeds
    assert!(matches!(
        h.store.received_parts("sales-upload").await,
        Err(doc_ingest::Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_zero_row_parquet_is_empty() {
    let h = harness(100, 10);
    let raw = h.config.storage.raw_dir().join("parquet").join("blank.parquet");
    std::fs::create_dir_all(raw.parent().unwrap()).unwrap();

    let schema = Arc::new(parse_message_type("message schema { REQUIRED INT32 id; }").unwrap());
    let writer = SerializedFileWriter::new(
        File::create(&raw).unwrap(),
        schema,
        Arc::new(WriterProperties::builder().build()),
    )
    .unwrap();
    writer.close().unwrap();

    let (_, outcome) = ingest(&h, raw.clone()).await;

    assert_eq!(outcome, IngestOutcome::Empty);
    assert!(!raw.exists());
    assert!(!h
        .config
        .storage
        .processed_dir()
        .join("parquet")
        .join("blank.jsonl")
        .exists());
}

#[tokio::test]
async fn test_unsupported_format_fails_at_dispatch() {
    let h = harness(100, 10);
    assert_ok!(h.store.put_part_bytes("slides", 0, Bytes::from_static(b"PK\x03\x04")).await);
    let raw = h.merger.merge("slides", 1, "deck.pptx").await.unwrap();

    let (_, outcome) = ingest(&h, raw.clone()).await;

    match outcome {
        IngestOutcome::Failed { stage, message } => {
            assert_eq!(stage, IngestStage::Dispatched);
            assert!(message.contains("pptx"), "message: {}", message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(!raw.exists());
    assert!(SourceFormat::from_path(&raw).is_err());
}

#[tokio::test]
async fn test_merge_with_gap_keeps_staging() {
    let h = harness(100, 10);
    assert_ok!(h.store.put_part_bytes("gappy", 0, Bytes::from_static(b"a,b\n")).await);
    assert_ok!(h.store.put_part_bytes("gappy", 2, Bytes::from_static(b"3,4\n")).await);

    let err = h.merger.merge("gappy", 3, "gappy.csv").await.unwrap_err();

    assert!(matches!(
        err,
        doc_ingest::Error::StagingIncomplete { part_index: 1, .. }
    ));
    assert_eq!(h.store.received_parts("gappy").await.unwrap(), vec![0, 2]);
    assert!(!h.config.storage.raw_dir().join("csv").join("gappy.csv").exists());

    assert_ok!(h.store.put_part_bytes("gappy", 1, Bytes::from_static(b"1,2\n")).await);
    let raw = h.merger.merge("gappy", 3, "gappy.csv").await.unwrap();

    assert_eq!(std::fs::read(&raw).unwrap(), b"a,b\n1,2\n3,4\n");
}

/// 100 rows padded so the whole file is exactly `total` bytes
fn padded_csv(total: usize) -> Vec<u8> {
    let header = "region,notes\n";
    let per_row = (total - header.len()) / 100;
    let mut csv = String::with_capacity(total);
    csv.push_str(header);
    for i in 0..100 {
        let prefix = format!("zone-{:02},", i);
        let mut pad = per_row - prefix.len() - 1;
        if i == 99 {
            pad += total - header.len() - 100 * per_row;
        }
        csv.push_str(&prefix);
        csv.extend(std::iter::repeat((b'a' + (i % 26) as u8) as char).take(pad));
        csv.push('\n');
    }
    csv.into_bytes()
}

#[tokio::test]
async fn test_multi_megabyte_parts_merge_and_ingest() {
    const PART: usize = 4 * 1024 * 1024;
    let h = harness(4000, 100);
    let csv = padded_csv(3 * PART);
    assert_eq!(csv.len(), 12 * 1024 * 1024);

    for index in [1usize, 2, 0] {
        let part = Bytes::copy_from_slice(&csv[index * PART..(index + 1) * PART]);
        let stored = h.store.put_part_bytes("wide", index as u32, part).await.unwrap();
        assert_eq!(stored, PART as u64);
    }

    let raw = h.merger.merge("wide", 3, "wide.csv").await.unwrap();
    let merged = std::fs::read(&raw).unwrap();
    assert_eq!(merged.len(), csv.len());
    assert!(merged == csv, "merged bytes differ from the uploaded parts");

    let (_, outcome) = ingest(&h, raw.clone()).await;

    let IngestOutcome::Completed { output_stem, chunks } = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(output_stem, "wide");
    assert!(chunks > 0);
    let artifact = h.config.storage.processed_dir().join("csv").join("wide.jsonl");
    let lines = std::fs::read_to_string(&artifact).unwrap().lines().count();
    assert_eq!(lines, chunks);
    assert!(!raw.exists());
}

impl Harness {
    fn orchestrator_chunks(&self, content: &doc_ingest::ExtractedContent) -> Vec<String> {
        let pipeline = IngestPipeline::from_config(&self.config).unwrap();
        pipeline.chunk(&IngestPipeline::normalize(content.clone()))
    }
}
