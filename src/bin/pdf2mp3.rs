//! CLI binary for pdf2mp3.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` / `SpeechConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2mp3::{
    ConversionConfig, ConversionProgressCallback, ConversionReport, Converter,
    HttpSpeechSynthesizer, PreparedRun, ProgressCallback, SpeechConfig, SpeechRate, VoiceCatalog,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while PDFs are read, then a bar
/// over synthesis tasks. Tasks finish out of order, so start times are keyed
/// by document name.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Reading");
        bar.set_message("Extracting text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, name: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(name))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_document_extracted(&self, name: &str, word_count: usize) {
        self.bar.println(format!(
            "  {} {:<40} {}",
            dim("·"),
            name,
            dim(&format!("{word_count} words"))
        ));
    }

    fn on_document_excluded(&self, name: &str, reason: &str) {
        self.bar
            .println(format!("  {} {:<40} {}", yellow("⚠"), name, yellow(reason)));
    }

    fn on_conversion_start(&self, total_tasks: usize) {
        self.activate_bar(total_tasks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_tasks} file(s) to MP3…"))
        ));
    }

    fn on_task_start(&self, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(name.to_string(), Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_task_complete(&self, name: &str, bytes: u64) {
        let secs = self.elapsed_secs(name);
        self.bar.println(format!(
            "  {} {:<40} {:<12}  {}",
            green("✓"),
            name,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_task_error(&self, name: &str, error: &str) {
        let secs = self.elapsed_secs(name);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40} {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_tasks: usize, success_count: usize) {
        let failed = total_tasks.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if total_tasks == 0 {
            eprintln!("{} No readable documents to convert", yellow("⚠"));
        } else if failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == total_tasks {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_tasks,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two PDFs into ./audio with the default voice
  pdf2mp3 report.pdf notes.pdf -o audio

  # Pick a voice by label or engine id, speak 10% faster
  pdf2mp3 --voice "English (UK) – Ryan (Neural)" --rate +10% book.pdf
  pdf2mp3 --voice de-DE-JonasNeural brief.pdf

  # Word counts and estimated durations only, no synthesis
  pdf2mp3 --preview-only *.pdf

  # List the voice catalog
  pdf2mp3 --list-voices

  # JSON report on stdout
  pdf2mp3 --json report.pdf > report.json

OUTPUT:
  One <name>_edge.mp3 per converted PDF plus converted_mp3s.zip holding all
  of them. Unreadable PDFs and engine failures are reported but never stop
  the rest of the batch.

ENVIRONMENT VARIABLES:
  PDF2MP3_TTS_URL       OpenAI-compatible speech endpoint
                        (default http://localhost:5050/v1/audio/speech)
  PDF2MP3_TTS_API_KEY   Bearer token for the endpoint (falls back to OPENAI_API_KEY)
  PDF2MP3_TTS_MODEL     Model name sent with each request (default tts-1)
  RUST_LOG              Override log filtering (e.g. pdf2mp3=debug)
  PDFIUM_LIB_PATH       libpdfium to load with --engine pdfium (pdfium builds only)
"#;

/// Convert PDF files to MP3 audio with neural text-to-speech.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2mp3",
    version,
    about = "Convert PDF files to MP3 audio with neural text-to-speech",
    long_about = "Extract the text of one or more PDF files and synthesize each into an MP3 \
using an OpenAI-compatible speech endpoint (for example an Edge-TTS bridge). Documents are \
converted concurrently; failures are reported per file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files to convert.
    #[arg(required_unless_present = "list_voices")]
    inputs: Vec<PathBuf>,

    /// Directory that receives the MP3 files and the archive.
    #[arg(short, long, env = "PDF2MP3_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Voice label or engine voice id (see --list-voices).
    #[arg(long, env = "PDF2MP3_VOICE")]
    voice: Option<String>,

    /// JSON file with a custom voice catalog: [{"label": …, "id": …}, …].
    #[arg(long, env = "PDF2MP3_VOICES_FILE")]
    voices_file: Option<PathBuf>,

    /// Speaking rate as a signed percentage, e.g. +0%, +15%, -10%.
    #[arg(long, env = "PDF2MP3_RATE", default_value = "+0%", allow_hyphen_values = true)]
    rate: String,

    /// Maximum number of concurrent synthesis requests.
    #[arg(
        short,
        long,
        env = "PDF2MP3_CONCURRENCY",
        default_value_t = pdf2mp3::config::DEFAULT_CONCURRENCY
    )]
    concurrency: usize,

    /// Suffix appended to each artifact stem (<stem>_<suffix>.mp3).
    #[arg(long, env = "PDF2MP3_SUFFIX", default_value = pdf2mp3::config::DEFAULT_ARTIFACT_SUFFIX)]
    suffix: String,

    /// Skip building the combined zip archive.
    #[arg(long, env = "PDF2MP3_NO_ARCHIVE")]
    no_archive: bool,

    /// Speech endpoint URL.
    #[arg(long, env = "PDF2MP3_TTS_URL")]
    tts_url: Option<String>,

    /// Bearer token for the speech endpoint.
    #[arg(long, env = "PDF2MP3_TTS_API_KEY", hide_env_values = true)]
    tts_api_key: Option<String>,

    /// Model name sent to the speech endpoint.
    #[arg(long, env = "PDF2MP3_TTS_MODEL")]
    tts_model: Option<String>,

    /// PDF text engine.
    #[cfg(feature = "pdfium")]
    #[arg(long, env = "PDF2MP3_ENGINE", value_enum, default_value_t = EngineChoice::Lopdf)]
    engine: EngineChoice,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PDF2MP3_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Print the voice catalog and exit.
    #[arg(long)]
    list_voices: bool,

    /// Show word counts and estimated durations, then exit without synthesis.
    #[arg(long)]
    preview_only: bool,

    /// Output the run report as JSON on stdout.
    #[arg(long, env = "PDF2MP3_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2MP3_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2MP3_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2MP3_QUIET")]
    quiet: bool,
}

#[cfg(feature = "pdfium")]
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EngineChoice {
    /// Pure-Rust parser, no native library needed.
    Lopdf,
    /// libpdfium from PDFIUM_LIB_PATH or the system search path.
    Pdfium,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Voice catalog ────────────────────────────────────────────────────
    let catalog = match cli.voices_file {
        Some(ref path) => VoiceCatalog::from_json_file(path).context("Failed to load voices")?,
        None => VoiceCatalog::default(),
    };

    if cli.list_voices {
        print_voices(&catalog, cli.json)?;
        return Ok(());
    }

    let voice = cli
        .voice
        .clone()
        .unwrap_or_else(|| catalog.default_voice().label.clone());
    // Fail on a bad voice before reading any PDF.
    catalog.resolve(&voice)?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let engine = HttpSpeechSynthesizer::new(build_speech_config(&cli))
        .context("Failed to set up speech engine")?;
    let converter = Converter::new(config, catalog, Arc::new(engine));
    #[cfg(feature = "pdfium")]
    let converter = match cli.engine {
        EngineChoice::Lopdf => converter,
        EngineChoice::Pdfium => {
            let pdfium = pdf2mp3::pipeline::pdfium::PdfiumEngine::bind()
                .map_err(anyhow::Error::msg)
                .context("Failed to load pdfium")?;
            converter.with_extractor(pdf2mp3::TextExtractor::new(Arc::new(pdfium)))
        }
    };

    // ── Extract ──────────────────────────────────────────────────────────
    let prepared = converter
        .prepare_files(&cli.inputs)
        .await
        .context("Failed to read inputs")?;

    if cli.preview_only {
        print_preview(&prepared, cli.json)?;
        return Ok(());
    }

    // ── Convert (Ctrl-C cancels outstanding requests) ────────────────────
    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} Interrupted, cancelling outstanding requests…", yellow("⚠"));
                token.cancel();
            }
        })
    };

    let report = prepared
        .convert_with_cancellation(&voice, token)
        .await
        .context("Conversion failed")?;
    ctrl_c.abort();

    let written = report
        .persist_to(&cli.output_dir)
        .with_context(|| format!("Failed to write output to {}", cli.output_dir.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "report": &report,
            "files": &written,
        }))
        .context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &written, show_progress);
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let rate = SpeechRate::parse(&cli.rate)?;

    let mut builder = ConversionConfig::builder()
        .concurrency(cli.concurrency)
        .rate(rate)
        .artifact_suffix(cli.suffix.clone())
        .build_archive(!cli.no_archive);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Environment defaults, overridden by explicit flags.
fn build_speech_config(cli: &Cli) -> SpeechConfig {
    let mut speech = SpeechConfig::from_env();
    if let Some(ref url) = cli.tts_url {
        speech.endpoint = url.clone();
    }
    if let Some(ref key) = cli.tts_api_key {
        speech.api_key = Some(key.clone());
    }
    if let Some(ref model) = cli.tts_model {
        speech.model = model.clone();
    }
    speech.timeout_secs = cli.api_timeout;
    speech
}

fn print_voices(catalog: &VoiceCatalog, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(catalog).context("Failed to serialise voices")?
        );
        return Ok(());
    }
    let default = &catalog.default_voice().label;
    for v in catalog.voices() {
        let marker = if &v.label == default { "*" } else { " " };
        println!("{marker} {:<36} {}", v.label, dim(&v.id));
    }
    Ok(())
}

fn format_duration(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn print_preview(prepared: &PreparedRun<'_>, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "previews": prepared.previews(),
            "diagnostics": prepared.diagnostics(),
        }))
        .context("Failed to serialise preview")?;
        println!("{json}");
        return Ok(());
    }

    println!("{:<40} {:>8} {:>10}", bold("File"), bold("Words"), bold("Est. time"));
    for p in prepared.previews() {
        println!(
            "{:<40} {:>8} {:>10}",
            p.name,
            p.word_count,
            format_duration(p.estimated_duration_secs)
        );
    }
    println!(
        "{:<40} {:>8} {:>10}",
        dim("total"),
        prepared.total_words(),
        format_duration(prepared.estimated_duration_secs())
    );
    for d in prepared.diagnostics() {
        eprintln!("{} {}", yellow("⚠"), d);
    }
    Ok(())
}

fn print_summary(report: &ConversionReport, written: &[PathBuf], show_progress: bool) {
    // Exclusions and failures were already printed live by the progress bar.
    if !show_progress {
        for d in &report.diagnostics {
            eprintln!("{} {}", yellow("⚠"), d);
        }
    }

    let stats = &report.stats;
    if stats.converted == 0 {
        eprintln!(
            "{} No MP3 files were produced ({} input(s), {} excluded, {} failed)",
            red("✘"),
            stats.total_inputs,
            stats.excluded,
            stats.failed
        );
        return;
    }

    eprintln!(
        "{}  {}/{} converted  {} excluded  {}ms  voice {}",
        if stats.failed == 0 { green("✔") } else { cyan("⚠") },
        stats.converted,
        stats.converted + stats.failed,
        stats.excluded,
        stats.total_time_ms,
        dim(&report.voice_id),
    );
    for path in written {
        eprintln!("   →  {}", bold(&path.display().to_string()));
    }
}
