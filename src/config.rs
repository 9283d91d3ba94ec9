//! Configuration types for PDF-to-MP3 conversion.
//!
//! All run behaviour is controlled through [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. Engine-specific settings (endpoint,
//! credentials) live with the synthesizer in
//! [`crate::pipeline::speech::SpeechConfig`], so a config can be reused
//! across engines.

use crate::error::Pdf2Mp3Error;
use crate::pipeline::speech::SpeechRate;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default ceiling on simultaneous synthesis calls.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default artifact suffix: `report.pdf` → `report_edge.mp3`.
pub const DEFAULT_ARTIFACT_SUFFIX: &str = "edge";

/// Default name of the combined archive.
pub const DEFAULT_ARCHIVE_NAME: &str = "converted_mp3s.zip";

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2mp3::{ConversionConfig, SpeechRate};
///
/// let config = ConversionConfig::builder()
///     .concurrency(2)
///     .rate(SpeechRate::parse("+10%").unwrap())
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Maximum simultaneous synthesis calls, also used to bound extraction. Default: 4.
    ///
    /// The speech engine is an external, rate-sensitive service. Lowering
    /// this never changes results, only wall-clock time.
    pub concurrency: usize,

    /// Speech-rate modifier sent with every task. Default: `+0%`.
    pub rate: SpeechRate,

    /// Suffix appended to each source stem in artifact names. Default: `edge`.
    pub artifact_suffix: String,

    /// Build a zip of all successful artifacts. Default: true.
    pub build_archive: bool,

    /// File name of the combined archive. Default: `converted_mp3s.zip`.
    pub archive_name: String,

    /// Speaking speed used for duration estimates at rate `+0%`. Default: 150.
    pub words_per_minute: u32,

    /// Maximum number of extraction results kept in the content cache. Default: 64.
    pub cache_capacity: u64,

    /// Directory in which the per-run temporary workspace is created.
    /// `None` uses the system temp directory.
    pub workspace_parent: Option<PathBuf>,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate: SpeechRate::default(),
            artifact_suffix: DEFAULT_ARTIFACT_SUFFIX.to_string(),
            build_archive: true,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            words_per_minute: 150,
            cache_capacity: 64,
            workspace_parent: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("concurrency", &self.concurrency)
            .field("rate", &self.rate)
            .field("artifact_suffix", &self.artifact_suffix)
            .field("build_archive", &self.build_archive)
            .field("archive_name", &self.archive_name)
            .field("words_per_minute", &self.words_per_minute)
            .field("cache_capacity", &self.cache_capacity)
            .field("workspace_parent", &self.workspace_parent)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Rough spoken length of `word_count` words at the configured rate.
    pub fn estimate_duration_secs(&self, word_count: usize) -> u64 {
        if word_count == 0 {
            return 0;
        }
        let minutes = word_count as f64 / self.words_per_minute.max(1) as f64;
        (minutes * 60.0 / self.rate.speed_factor()).ceil() as u64
    }

    /// Check the constraints [`ConversionConfigBuilder::build`] enforces.
    ///
    /// [`crate::Converter`] runs this again before each run.
    pub fn validate(&self) -> Result<(), Pdf2Mp3Error> {
        let c = self;
        if c.concurrency == 0 {
            return Err(Pdf2Mp3Error::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.words_per_minute == 0 {
            return Err(Pdf2Mp3Error::InvalidConfig("Words per minute must be ≥ 1".into()));
        }
        if c.artifact_suffix.is_empty() || has_path_separator(&c.artifact_suffix) {
            return Err(Pdf2Mp3Error::InvalidConfig(format!(
                "Artifact suffix must be a non-empty plain name, got '{}'",
                c.artifact_suffix
            )));
        }
        if !c.archive_name.ends_with(".zip") || has_path_separator(&c.archive_name) {
            return Err(Pdf2Mp3Error::InvalidConfig(format!(
                "Archive name must be a plain file name ending in .zip, got '{}'",
                c.archive_name
            )));
        }
        Ok(())
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn rate(mut self, rate: SpeechRate) -> Self {
        self.config.rate = rate;
        self
    }

    pub fn artifact_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.artifact_suffix = suffix.into();
        self
    }

    pub fn build_archive(mut self, v: bool) -> Self {
        self.config.build_archive = v;
        self
    }

    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.config.archive_name = name.into();
        self
    }

    pub fn words_per_minute(mut self, wpm: u32) -> Self {
        self.config.words_per_minute = wpm;
        self
    }

    pub fn cache_capacity(mut self, entries: u64) -> Self {
        self.config.cache_capacity = entries;
        self
    }

    pub fn workspace_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_parent = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2Mp3Error> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn has_path_separator(s: &str) -> bool {
    s.contains('/') || s.contains('\\')
}
