//! End-to-end integration tests for pdf2mp3.
//!
//! PDFs are generated in memory with lopdf and speech comes from a scripted
//! in-process engine, so everything except `live_engine_round_trip` runs
//! offline. That one test calls a real speech endpoint and is gated behind
//! the `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture
//!
//! Against a live engine:
//!   E2E_ENABLED=1 PDF2MP3_TTS_URL=http://localhost:5050/v1/audio/speech \
//!     cargo test --test e2e live_engine -- --nocapture

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf2mp3::{
    run_batch, ConversionConfig, ConversionProgressCallback, ConversionTask, Converter,
    Diagnostic, HttpSpeechSynthesizer, Pdf2Mp3Error, SourceDocument, SpeechConfig, SpeechRate,
    SpeechSynthesizer, SynthesisError, VoiceCatalog, VoiceProfile,
};
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test harness (`--nocapture` shows them).
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pdf2mp3=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Build a PDF with one page per entry, one text line per string.
fn make_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), (720 - 16 * i as i64).into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            Content { operations }.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Scripted engine: accepts only the voice ids of the default catalog and
/// writes `ID3` followed by the text. Tracks peak concurrency.
#[derive(Default)]
struct ScriptedEngine {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    delay_ms: u64,
}

impl ScriptedEngine {
    fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedEngine {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        _rate: &SpeechRate,
        output: &Path,
    ) -> Result<u64, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let known = VoiceCatalog::default().voices().iter().any(|v| v.id == voice);
        if !known {
            return Err(SynthesisError::InvalidVoice(voice.to_string()));
        }
        let audio = format!("ID3{text}");
        tokio::fs::write(output, &audio)
            .await
            .map_err(|source| SynthesisError::Write {
                path: output.to_path_buf(),
                source,
            })?;
        Ok(audio.len() as u64)
    }
}

fn converter_with(engine: Arc<ScriptedEngine>, config: ConversionConfig) -> Converter {
    Converter::new(config, VoiceCatalog::default(), engine)
}

fn converter() -> Converter {
    converter_with(Arc::new(ScriptedEngine::default()), ConversionConfig::default())
}

const JENNY: &str = "English (US) – Jenny (Neural)";

/// First three bytes of an artifact: "ID3" or an MPEG frame sync.
fn audio_header(path: &Path) -> [u8; 3] {
    let mut head = [0u8; 3];
    std::fs::File::open(path)
        .unwrap()
        .read_exact(&mut head)
        .unwrap();
    head
}

fn zip_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

// ── Pipeline scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_hello_pdf_produces_one_artifact() {
    init_tracing();
    let conv = converter();
    let prepared = conv
        .prepare(vec![SourceDocument::new(
            "hello.pdf",
            make_pdf(&[&["Hello, PDF test!"]]),
        )])
        .await
        .unwrap();

    assert_eq!(prepared.previews().len(), 1);
    assert_eq!(prepared.previews()[0].word_count, 3);
    assert!(prepared.diagnostics().is_empty());

    let report = prepared.convert(JENNY).await.unwrap();
    let paths = report.artifact_paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].exists());
    assert!(std::fs::metadata(paths[0]).unwrap().len() > 0);
    assert_eq!(&audio_header(paths[0]), b"ID3");
    assert_eq!(
        std::fs::read_to_string(paths[0]).unwrap(),
        "ID3Hello, PDF test!"
    );
}

#[tokio::test]
async fn test_valid_and_zero_byte_inputs() {
    init_tracing();
    let conv = converter();
    let report = conv
        .run(
            vec![
                SourceDocument::new("sample.pdf", make_pdf(&[&["Sample."]])),
                SourceDocument::new("broken.pdf", Vec::<u8>::new()),
            ],
            JENNY,
        )
        .await
        .unwrap();

    assert_eq!(report.successes().count(), 1);
    assert_eq!(report.failures().count(), 0);
    assert_eq!(report.stats.excluded, 1);
    assert!(report.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::DocumentUnreadable { name, .. } if name == "broken.pdf"
    )));

    let archive = report.archive_path().expect("archive built");
    assert_eq!(zip_entries(archive), vec!["sample_edge.mp3"]);
}

#[tokio::test]
async fn test_duplicate_names_keep_first() {
    let conv = converter();
    let report = conv
        .run(
            vec![
                SourceDocument::new("report.pdf", make_pdf(&[&["First version."]])),
                SourceDocument::new("report.pdf", make_pdf(&[&["Second version."]])),
            ],
            JENNY,
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    let audio = std::fs::read_to_string(report.artifact_paths()[0]).unwrap();
    assert_eq!(audio, "ID3First version.");
    assert_eq!(report.stats.duplicates, 1);
    assert!(report.diagnostics.contains(&Diagnostic::DuplicateInput {
        name: "report.pdf".into()
    }));
}

#[tokio::test]
async fn test_multi_page_text_in_page_order() {
    let conv = converter();
    let report = conv
        .run(
            vec![SourceDocument::new(
                "book.pdf",
                make_pdf(&[&["Chapter one.", "It begins."], &[], &["Chapter two."]]),
            )],
            JENNY,
        )
        .await
        .unwrap();

    assert_eq!(report.previews[0].page_count, 3);
    assert_eq!(
        std::fs::read_to_string(report.artifact_paths()[0]).unwrap(),
        "ID3Chapter one. It begins. Chapter two."
    );
}

#[tokio::test]
async fn test_blank_document_is_excluded_with_no_text() {
    let conv = converter();
    let report = conv
        .run(
            vec![SourceDocument::new("scan.pdf", make_pdf(&[&[], &[]]))],
            JENNY,
        )
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert!(!report.is_partial_success());
    assert!(report.archive_path().is_none());
    assert_eq!(
        report.diagnostics,
        vec![Diagnostic::NoText {
            name: "scan.pdf".into()
        }]
    );
}

#[tokio::test]
async fn test_stem_collisions_get_distinct_artifacts() {
    let conv = converter();
    let report = conv
        .run(
            vec![
                SourceDocument::new("notes.pdf", make_pdf(&[&["Lower."]])),
                SourceDocument::new("notes.PDF", make_pdf(&[&["Upper."]])),
            ],
            JENNY,
        )
        .await
        .unwrap();

    let archive = report.archive_path().unwrap();
    assert_eq!(
        zip_entries(archive),
        vec!["notes-2_edge.mp3", "notes_edge.mp3"]
    );
}

#[tokio::test]
async fn test_concurrency_ceiling_is_respected_end_to_end() {
    let engine = Arc::new(ScriptedEngine::with_delay(20));
    let config = ConversionConfig::builder().concurrency(2).build().unwrap();
    let conv = converter_with(engine.clone(), config);

    let inputs: Vec<_> = (0..6)
        .map(|i| {
            let text = format!("Document number {i}.");
            SourceDocument::new(format!("doc{i}.pdf"), make_pdf(&[&[text.as_str()]]))
        })
        .collect();
    let report = conv.run(inputs, JENNY).await.unwrap();

    assert_eq!(report.successes().count(), 6);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 6);
    assert!(engine.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_workspace_removed_when_report_dropped() {
    let parent = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .workspace_parent(parent.path())
        .build()
        .unwrap();
    let conv = converter_with(Arc::new(ScriptedEngine::default()), config);

    let report = conv
        .run(
            vec![SourceDocument::new("a.pdf", make_pdf(&[&["Keep me."]]))],
            JENNY,
        )
        .await
        .unwrap();
    let workspace = report.workspace_path().to_path_buf();
    assert!(workspace.starts_with(parent.path()));

    let out = tempfile::tempdir().unwrap();
    let written = report.persist_to(out.path()).unwrap();
    assert_eq!(written.len(), 2, "artifact plus archive");

    drop(report);
    assert!(!workspace.exists());
    assert!(out.path().join("a_edge.mp3").exists());
    assert!(out.path().join("converted_mp3s.zip").exists());
}

#[tokio::test]
async fn test_concurrent_runs_use_separate_workspaces() {
    let conv = converter();
    let a = vec![SourceDocument::new("a.pdf", make_pdf(&[&["Run A."]]))];
    let b = vec![SourceDocument::new("a.pdf", make_pdf(&[&["Run B."]]))];

    let (ra, rb) = tokio::join!(conv.run(a, JENNY), conv.run(b, JENNY));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_ne!(ra.workspace_path(), rb.workspace_path());
    assert_eq!(
        std::fs::read_to_string(ra.artifact_paths()[0]).unwrap(),
        "ID3Run A."
    );
    assert_eq!(
        std::fs::read_to_string(rb.artifact_paths()[0]).unwrap(),
        "ID3Run B."
    );
}

#[tokio::test]
async fn test_files_from_disk_later_duplicates_not_read() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("one").join("memo.pdf");
    std::fs::create_dir_all(first.parent().unwrap()).unwrap();
    std::fs::write(&first, make_pdf(&[&["From disk."]])).unwrap();
    let never_read = dir.path().join("missing").join("memo.pdf");

    let conv = converter();
    let prepared = conv.prepare_files(&[first, never_read]).await.unwrap();
    assert_eq!(prepared.previews().len(), 1);

    let report = prepared.convert("en-US-GuyNeural").await.unwrap();
    assert_eq!(report.stats.total_inputs, 2);
    assert_eq!(report.stats.duplicates, 1);
    assert_eq!(report.voice_id, "en-US-GuyNeural");
}

#[tokio::test]
async fn test_missing_file_is_fatal() {
    let conv = converter();
    let err = conv
        .prepare_files(&["/no/such/file.pdf".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2Mp3Error::InputReadFailed { .. }));
}

#[tokio::test]
async fn test_voice_outside_engine_fails_only_its_run_items() {
    // The catalog accepts the voice, the engine does not.
    let catalog =
        VoiceCatalog::new(vec![VoiceProfile::new("Robot", "xx-RobotNeural")]).unwrap();
    let conv = Converter::new(
        ConversionConfig::default(),
        catalog,
        Arc::new(ScriptedEngine::default()),
    );
    let report = conv
        .run(
            vec![SourceDocument::new("a.pdf", make_pdf(&[&["Beep."]]))],
            "Robot",
        )
        .await
        .unwrap();

    assert_eq!(report.stats.failed, 1);
    let failure = report.failures().next().unwrap();
    assert!(failure
        .error()
        .unwrap()
        .starts_with("TTS conversion failed"));
    assert!(report.artifact_paths().is_empty());
    assert!(report.archive_path().is_none());
}

// ── Batch runner ─────────────────────────────────────────────────────────────

fn task(dir: &Path, name: &str, voice: &str) -> ConversionTask {
    ConversionTask {
        source_name: name.to_string(),
        text: format!("Text of {name}."),
        voice: voice.to_string(),
        rate: SpeechRate::default(),
        output: dir.join(format!("{name}.mp3")),
    }
}

#[tokio::test]
async fn test_run_batch_empty() {
    for k in [1, 2, 8] {
        let results = run_batch(Arc::new(ScriptedEngine::default()), vec![], k)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}

#[tokio::test]
async fn test_run_batch_results_invariant_to_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let voice = if i % 3 == 0 { "bogus" } else { "en-US-GuyNeural" };
            task(dir.path(), &format!("t{i}"), voice)
        })
        .collect();

    let mut seen = Vec::new();
    for k in [1, 3, 7] {
        let engine = Arc::new(ScriptedEngine::with_delay(5));
        let results = run_batch(engine.clone(), tasks.clone(), k).await.unwrap();
        assert_eq!(results.len(), tasks.len());
        assert!(engine.peak.load(Ordering::SeqCst) <= k);

        let mut outcome: Vec<_> = results
            .iter()
            .map(|r| (r.source_name.clone(), r.is_success()))
            .collect();
        outcome.sort();
        seen.push(outcome);
    }
    assert!(seen.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_run_batch_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let results = run_batch(
        Arc::new(ScriptedEngine::default()),
        vec![
            task(dir.path(), "A", "no-such-voice"),
            task(dir.path(), "B", "en-GB-RyanNeural"),
        ],
        2,
    )
    .await
    .unwrap();

    let a = results.iter().find(|r| r.source_name == "A").unwrap();
    let b = results.iter().find(|r| r.source_name == "B").unwrap();
    assert!(!a.is_success());
    assert!(a.error().unwrap().contains("no-such-voice"));
    assert!(b.is_success());
    assert!(b.output_path().unwrap().exists());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn push(&self, s: String) {
        self.0.lock().unwrap().push(s);
    }
}

impl ConversionProgressCallback for EventLog {
    fn on_run_start(&self, total_documents: usize) {
        self.push(format!("run_start:{total_documents}"));
    }
    fn on_document_extracted(&self, name: &str, word_count: usize) {
        self.push(format!("extracted:{name}:{word_count}"));
    }
    fn on_document_excluded(&self, name: &str, _reason: &str) {
        self.push(format!("excluded:{name}"));
    }
    fn on_conversion_start(&self, total_tasks: usize) {
        self.push(format!("conversion_start:{total_tasks}"));
    }
    fn on_task_complete(&self, name: &str, _bytes: u64) {
        self.push(format!("complete:{name}"));
    }
    fn on_run_complete(&self, total_tasks: usize, success_count: usize) {
        self.push(format!("run_complete:{total_tasks}:{success_count}"));
    }
}

#[tokio::test]
async fn test_progress_events_follow_run_stages() {
    let log = Arc::new(EventLog::default());
    let config = ConversionConfig::builder()
        .progress_callback(log.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let conv = converter_with(Arc::new(ScriptedEngine::default()), config);

    conv.run(
        vec![
            SourceDocument::new("ok.pdf", make_pdf(&[&["Two words."]])),
            SourceDocument::new("bad.pdf", b"not a pdf".to_vec()),
        ],
        JENNY,
    )
    .await
    .unwrap();

    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "run_start:2",
            "extracted:ok.pdf:2",
            "excluded:bad.pdf",
            "conversion_start:1",
            "complete:ok.pdf",
            "run_complete:1:1",
        ]
    );
}

// ── Live engine ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn live_engine_round_trip() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    init_tracing();

    let engine = HttpSpeechSynthesizer::new(SpeechConfig::from_env()).unwrap();
    let conv = Converter::new(
        ConversionConfig::default(),
        VoiceCatalog::default(),
        Arc::new(engine),
    );
    let report = conv
        .run(
            vec![SourceDocument::new(
                "hello.pdf",
                make_pdf(&[&["Hello, PDF test!"]]),
            )],
            JENNY,
        )
        .await
        .unwrap();

    assert_eq!(report.successes().count(), 1, "{:?}", report.diagnostics);
    let head = audio_header(report.artifact_paths()[0]);
    // ID3 tag or an MPEG frame sync.
    assert!(&head == b"ID3" || (head[0] == 0xFF && head[1] & 0xE0 == 0xE0));
}
