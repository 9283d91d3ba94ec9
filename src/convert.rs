//! Run orchestration: `Collecting → Extracting → Converting → Reporting → Done`.
//!
//! A run is split in two so a presentation layer can show word counts and
//! duration estimates before spending any synthesis calls:
//!
//! 1. [`Converter::prepare`] collects inputs and extracts text, returning a
//!    [`PreparedRun`] with one [`DocumentPreview`] per readable document.
//! 2. [`PreparedRun::convert`] synthesizes every readable document with the
//!    chosen voice and builds the [`ConversionReport`].
//!
//! [`Converter::run`] does both in one call.

use crate::config::ConversionConfig;
use crate::error::{Diagnostic, Pdf2Mp3Error};
use crate::output::{ConversionOutcome, ConversionReport, DocumentPreview, RunStats};
use crate::pipeline::archive::write_archive;
use crate::pipeline::batch::{BatchRunner, ConversionTask};
use crate::pipeline::cache::{fingerprint, ExtractionCache};
use crate::pipeline::extract::{Extraction, TextExtractor};
use crate::pipeline::input::{collect_inputs, load_documents, CollectedInputs, SourceDocument};
use crate::pipeline::speech::SpeechSynthesizer;
use crate::pipeline::workspace::RunWorkspace;
use crate::voice::VoiceCatalog;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Collecting,
    Extracting,
    Converting,
    Reporting,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Collecting => "collecting",
            RunStage::Extracting => "extracting",
            RunStage::Converting => "converting",
            RunStage::Reporting => "reporting",
            RunStage::Done => "done",
        };
        f.write_str(s)
    }
}

fn enter(stage: RunStage) {
    debug!(%stage, "Run stage");
}

/// The conversion pipeline, configured once and reusable across runs.
///
/// The voice catalog and speech engine are injected so tests can substitute
/// a minimal catalog and a scripted engine.
pub struct Converter {
    config: ConversionConfig,
    catalog: VoiceCatalog,
    extractor: TextExtractor,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: ExtractionCache,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("voices", &self.catalog.voices().len())
            .field("extractor", &self.extractor)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Converter {
    pub fn new(
        config: ConversionConfig,
        catalog: VoiceCatalog,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let cache = ExtractionCache::new(config.cache_capacity);
        Self {
            config,
            catalog,
            extractor: TextExtractor::default(),
            synthesizer,
            cache,
        }
    }

    /// Replace the default (lopdf) extractor.
    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Forget every cached extraction.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Collect and extract in-memory inputs.
    pub async fn prepare(
        &self,
        inputs: impl IntoIterator<Item = SourceDocument>,
    ) -> Result<PreparedRun<'_>, Pdf2Mp3Error> {
        self.config.validate()?;
        let started = Instant::now();
        enter(RunStage::Collecting);
        let collected = collect_inputs(inputs);
        let total = collected.documents.len() + collected.diagnostics.len();
        self.extract_all(collected, total, started).await
    }

    /// Collect and extract files from disk. Later duplicates by file name are
    /// never read.
    pub async fn prepare_files(
        &self,
        paths: &[PathBuf],
    ) -> Result<PreparedRun<'_>, Pdf2Mp3Error> {
        self.config.validate()?;
        let started = Instant::now();
        enter(RunStage::Collecting);
        let collected = load_documents(paths).await?;
        self.extract_all(collected, paths.len(), started).await
    }

    /// Prepare and convert in one call.
    ///
    /// The voice is resolved first so an unknown label fails before any
    /// parsing happens.
    pub async fn run(
        &self,
        inputs: impl IntoIterator<Item = SourceDocument>,
        voice: &str,
    ) -> Result<ConversionReport, Pdf2Mp3Error> {
        self.catalog.resolve(voice)?;
        self.prepare(inputs).await?.convert(voice).await
    }

    /// Blocking wrapper around [`Converter::run`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from async
    /// code.
    pub fn run_sync(
        &self,
        inputs: impl IntoIterator<Item = SourceDocument>,
        voice: &str,
    ) -> Result<ConversionReport, Pdf2Mp3Error> {
        tokio::runtime::Runtime::new()
            .map_err(|e| Pdf2Mp3Error::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.run(inputs, voice))
    }

    async fn extract_all(
        &self,
        collected: CollectedInputs,
        total_inputs: usize,
        started: Instant,
    ) -> Result<PreparedRun<'_>, Pdf2Mp3Error> {
        enter(RunStage::Extracting);
        let CollectedInputs {
            documents,
            diagnostics: mut run_diagnostics,
        } = collected;
        let duplicates = run_diagnostics.len();
        info!(
            "Extracting text from {} document(s) ({} duplicate(s) dropped)",
            documents.len(),
            duplicates
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_run_start(documents.len());
        }

        let extract_start = Instant::now();
        let extractions: Vec<(SourceDocument, Result<Arc<Extraction>, Pdf2Mp3Error>)> =
            stream::iter(documents.into_iter().map(|doc| async move {
                let extraction = self.extract_one(&doc).await;
                (doc, extraction)
            }))
            .buffered(self.config.concurrency)
            .collect()
            .await;
        let extraction_time_ms = extract_start.elapsed().as_millis() as u64;

        let mut ready = Vec::new();
        let mut previews = Vec::new();
        let mut excluded = 0;

        for (doc, extraction) in extractions {
            let extraction = extraction?;
            let name = doc.name();
            run_diagnostics.extend(extraction.diagnostics.iter().cloned());

            if extraction.has_text() {
                let word_count = extraction.word_count();
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_extracted(name, word_count);
                }
                previews.push(DocumentPreview {
                    name: name.to_string(),
                    page_count: extraction.page_count,
                    word_count,
                    estimated_duration_secs: self.config.estimate_duration_secs(word_count),
                });
                ready.push(ReadyDocument {
                    name: name.to_string(),
                    text: extraction.text.clone(),
                });
                continue;
            }

            excluded += 1;
            let reason = match extraction
                .diagnostics
                .iter()
                .find(|d| d.excludes_document())
            {
                Some(d) => d.to_string(),
                None => {
                    let d = Diagnostic::NoText {
                        name: name.to_string(),
                    };
                    warn!("{}", d);
                    let reason = d.to_string();
                    run_diagnostics.push(d);
                    reason
                }
            };
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_document_excluded(name, &reason);
            }
        }

        info!(
            "{} document(s) ready, {} excluded, in {}ms",
            ready.len(),
            excluded,
            extraction_time_ms
        );

        Ok(PreparedRun {
            converter: self,
            stats: RunStats {
                total_inputs,
                duplicates,
                excluded,
                total_words: previews.iter().map(|p| p.word_count).sum(),
                extraction_time_ms,
                ..RunStats::default()
            },
            documents: ready,
            previews,
            diagnostics: run_diagnostics,
            started,
        })
    }

    async fn extract_one(&self, doc: &SourceDocument) -> Result<Arc<Extraction>, Pdf2Mp3Error> {
        let key = fingerprint(doc.bytes());
        let extractor = self.extractor.clone();
        let bytes = doc.shared_bytes();
        let name = doc.name().to_string();

        let extraction = self
            .cache
            .get_or_extract(key, async move {
                tokio::task::spawn_blocking(move || extractor.extract(&bytes, &name))
                    .await
                    .map(Arc::new)
                    .map_err(|e| Pdf2Mp3Error::Internal(format!("extraction task failed: {e}")))
            })
            .await?;

        if extraction
            .diagnostics
            .iter()
            .all(|d| d.source_name() == doc.name())
        {
            Ok(extraction)
        } else {
            debug!("Reusing cached extraction for '{}'", doc.name());
            Ok(Arc::new(extraction.renamed(doc.name())))
        }
    }
}

struct ReadyDocument {
    name: String,
    text: String,
}

/// A run that has finished extracting and is waiting for a voice.
pub struct PreparedRun<'a> {
    converter: &'a Converter,
    documents: Vec<ReadyDocument>,
    previews: Vec<DocumentPreview>,
    diagnostics: Vec<Diagnostic>,
    stats: RunStats,
    started: Instant,
}

impl fmt::Debug for PreparedRun<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRun")
            .field("previews", &self.previews)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl PreparedRun<'_> {
    /// One entry per document with text, in input order.
    pub fn previews(&self) -> &[DocumentPreview] {
        &self.previews
    }

    /// Duplicates, unreadable documents, failed pages and empty documents.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// True when at least one document will be synthesized.
    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }

    pub fn total_words(&self) -> usize {
        self.stats.total_words
    }

    pub fn estimated_duration_secs(&self) -> u64 {
        self.previews.iter().map(|p| p.estimated_duration_secs).sum()
    }

    /// Synthesize every readable document with `voice` (a catalog label or
    /// engine id).
    pub async fn convert(self, voice: &str) -> Result<ConversionReport, Pdf2Mp3Error> {
        self.convert_inner(voice, None).await
    }

    /// Like [`PreparedRun::convert`]; tasks still running when `token` fires
    /// end as failures with the error `"cancelled"`.
    pub async fn convert_with_cancellation(
        self,
        voice: &str,
        token: CancellationToken,
    ) -> Result<ConversionReport, Pdf2Mp3Error> {
        self.convert_inner(voice, Some(token)).await
    }

    async fn convert_inner(
        self,
        voice: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<ConversionReport, Pdf2Mp3Error> {
        let PreparedRun {
            converter,
            documents,
            previews,
            mut diagnostics,
            mut stats,
            started,
        } = self;
        let config = &converter.config;
        let profile = converter.catalog.resolve(voice)?.clone();

        // ── Converting ───────────────────────────────────────────────────
        enter(RunStage::Converting);
        let mut workspace = RunWorkspace::create(config.workspace_parent.as_deref())?;
        let tasks: Vec<ConversionTask> = documents
            .into_iter()
            .map(|doc| ConversionTask {
                output: workspace.claim_artifact_path(&doc.name, &config.artifact_suffix),
                source_name: doc.name,
                text: doc.text,
                voice: profile.id.clone(),
                rate: config.rate,
            })
            .collect();
        let total_tasks = tasks.len();
        info!(
            "Synthesizing {} document(s) with voice {} at rate {}",
            total_tasks, profile.id, config.rate
        );

        let mut runner = BatchRunner::new(Arc::clone(&converter.synthesizer), config.concurrency)
            .with_progress(config.progress_callback.clone());
        if let Some(token) = cancel {
            runner = runner.with_cancellation(token);
        }

        let synth_start = Instant::now();
        let results = runner.run(tasks).await?;
        stats.synthesis_time_ms = synth_start.elapsed().as_millis() as u64;

        // ── Reporting ────────────────────────────────────────────────────
        enter(RunStage::Reporting);
        for result in &results {
            if let Some(error) = result.error() {
                diagnostics.push(Diagnostic::SynthesisFailed {
                    name: result.source_name.clone(),
                    detail: error.to_string(),
                });
            }
        }

        let artifacts: Vec<PathBuf> = results
            .iter()
            .filter_map(|r| r.output_path().map(Path::to_path_buf))
            .collect();
        stats.converted = artifacts.len();
        stats.failed = total_tasks - stats.converted;
        stats.audio_bytes = results
            .iter()
            .filter_map(|r| match r.outcome {
                ConversionOutcome::Converted { bytes, .. } => Some(bytes),
                ConversionOutcome::Failed { .. } => None,
            })
            .sum();

        let archive = if config.build_archive && !artifacts.is_empty() {
            let path = workspace.archive_path(&config.archive_name);
            let target = path.clone();
            tokio::task::spawn_blocking(move || write_archive(&target, &artifacts))
                .await
                .map_err(|e| Pdf2Mp3Error::Internal(format!("archive task failed: {e}")))??;
            Some(path)
        } else {
            None
        };

        if stats.converted == 0 {
            warn!("No documents were converted");
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_run_complete(total_tasks, stats.converted);
        }

        stats.total_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Run complete: {}/{} converted, {} diagnostic(s), {}ms total",
            stats.converted,
            total_tasks,
            diagnostics.len(),
            stats.total_time_ms
        );
        enter(RunStage::Done);

        Ok(ConversionReport {
            voice: profile.label,
            voice_id: profile.id,
            rate: config.rate.to_string(),
            previews,
            results,
            archive,
            diagnostics,
            stats,
            workspace,
        })
    }
}
