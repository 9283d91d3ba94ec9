//! Speech synthesis: the rate modifier, the engine seam and the HTTP adapter.
//!
//! [`SpeechSynthesizer`] is the only thing the batch runner knows about the
//! engine. The shipped adapter, [`HttpSpeechSynthesizer`], talks to any
//! OpenAI-compatible `/v1/audio/speech` endpoint; a local Edge-TTS bridge is
//! the default target so the neural voice ids in [`crate::VoiceCatalog`] work
//! unchanged.

use crate::error::{Pdf2Mp3Error, SynthesisError};
use async_trait::async_trait;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

// ── Rate ─────────────────────────────────────────────────────────────────

static RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([+-])(\d{1,3})%$").unwrap());

/// Slowest accepted rate, in percent.
pub const MIN_RATE_PERCENT: i32 = -75;
/// Fastest accepted rate, in percent.
pub const MAX_RATE_PERCENT: i32 = 300;

/// Speaking-rate modifier in Edge-TTS notation: `+0%`, `+25%`, `-10%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeechRate {
    percent: i32,
}

impl SpeechRate {
    /// The neutral rate, `+0%`.
    pub const NORMAL: SpeechRate = SpeechRate { percent: 0 };

    /// Parse a signed percentage. The sign is mandatory.
    pub fn parse(s: &str) -> Result<Self, Pdf2Mp3Error> {
        let caps = RATE_RE
            .captures(s.trim())
            .ok_or_else(|| Pdf2Mp3Error::InvalidRate {
                rate: s.to_string(),
                reason: "expected a signed percentage such as +0% or -10%".into(),
            })?;

        let magnitude: i32 = caps[2].parse().map_err(|_| Pdf2Mp3Error::InvalidRate {
            rate: s.to_string(),
            reason: "percentage is not a number".into(),
        })?;
        let percent = if &caps[1] == "-" { -magnitude } else { magnitude };

        if !(MIN_RATE_PERCENT..=MAX_RATE_PERCENT).contains(&percent) {
            return Err(Pdf2Mp3Error::InvalidRate {
                rate: s.to_string(),
                reason: format!(
                    "must be between {MIN_RATE_PERCENT}% and +{MAX_RATE_PERCENT}%"
                ),
            });
        }
        Ok(Self { percent })
    }

    pub fn percent(&self) -> i32 {
        self.percent
    }

    /// Playback speed multiplier: `+0%` is 1.0, `+50%` is 1.5.
    pub fn speed_factor(&self) -> f64 {
        1.0 + self.percent as f64 / 100.0
    }
}

impl fmt::Display for SpeechRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}%", self.percent)
    }
}

impl FromStr for SpeechRate {
    type Err = Pdf2Mp3Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SpeechRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Engine seam ──────────────────────────────────────────────────────────

/// A text-to-speech engine.
///
/// `synthesize` writes MP3 audio for `text` to `output` and returns the
/// number of bytes written. On error no file may be left at `output`.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: &SpeechRate,
        output: &Path,
    ) -> Result<u64, SynthesisError>;
}

// ── HTTP adapter ─────────────────────────────────────────────────────────

/// Default endpoint: a local Edge-TTS bridge speaking the OpenAI audio API.
pub const DEFAULT_TTS_URL: &str = "http://localhost:5050/v1/audio/speech";
pub const DEFAULT_TTS_MODEL: &str = "tts-1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Most engines cap a single request at 4096 characters.
pub const DEFAULT_MAX_CHARS_PER_REQUEST: usize = 4096;

/// Connection settings for [`HttpSpeechSynthesizer`].
#[derive(Clone)]
pub struct SpeechConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_chars_per_request: usize,
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_chars_per_request", &self.max_chars_per_request)
            .finish()
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TTS_URL.to_string(),
            api_key: None,
            model: DEFAULT_TTS_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_chars_per_request: DEFAULT_MAX_CHARS_PER_REQUEST,
        }
    }
}

impl SpeechConfig {
    /// Defaults overridden by `PDF2MP3_TTS_URL`, `PDF2MP3_TTS_API_KEY`
    /// (falling back to `OPENAI_API_KEY`) and `PDF2MP3_TTS_MODEL`.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(url) = non_empty("PDF2MP3_TTS_URL") {
            config.endpoint = url;
        }
        config.api_key = non_empty("PDF2MP3_TTS_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"));
        if let Some(model) = non_empty("PDF2MP3_TTS_MODEL") {
            config.model = model;
        }
        config
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f64,
    response_format: &'static str,
}

/// [`SpeechSynthesizer`] for OpenAI-compatible `/v1/audio/speech` endpoints.
///
/// Text longer than `max_chars_per_request` is split at sentence boundaries
/// and the MP3 responses are appended in order; MP3 frames concatenate
/// cleanly.
#[derive(Debug, Clone)]
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: SpeechConfig) -> Result<Self, Pdf2Mp3Error> {
        if config.endpoint.trim().is_empty() {
            return Err(Pdf2Mp3Error::InvalidConfig("TTS endpoint must not be empty".into()));
        }
        if config.max_chars_per_request == 0 {
            return Err(Pdf2Mp3Error::InvalidConfig(
                "max_chars_per_request must be ≥ 1".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Pdf2Mp3Error::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    async fn write_chunks(
        &self,
        chunks: &[String],
        voice: &str,
        rate: &SpeechRate,
        part: &Path,
    ) -> Result<u64, SynthesisError> {
        let write_err = |source| SynthesisError::Write {
            path: part.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(part).await.map_err(write_err)?;
        let mut total = 0u64;

        for (i, chunk) in chunks.iter().enumerate() {
            debug!(
                chunk = i + 1,
                of = chunks.len(),
                chars = chunk.len(),
                voice,
                "Requesting speech"
            );
            let mut request = self.client.post(&self.config.endpoint).json(&SpeechRequest {
                model: &self.config.model,
                input: chunk,
                voice,
                speed: rate.speed_factor(),
                response_format: "mp3",
            });
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|source| SynthesisError::Request {
                endpoint: self.config.endpoint.clone(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SynthesisError::Rejected {
                    status: status.as_u16(),
                    body: body.chars().take(500).collect(),
                });
            }

            let mut stream = response.bytes_stream();
            while let Some(piece) = stream.next().await {
                let piece = piece.map_err(|source| SynthesisError::Request {
                    endpoint: self.config.endpoint.clone(),
                    source,
                })?;
                file.write_all(&piece).await.map_err(write_err)?;
                total += piece.len() as u64;
            }
        }

        file.flush().await.map_err(write_err)?;
        Ok(total)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: &SpeechRate,
        output: &Path,
    ) -> Result<u64, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SynthesisError::EmptyText);
        }
        if voice.trim().is_empty() {
            return Err(SynthesisError::InvalidVoice(voice.to_string()));
        }

        let chunks = split_into_requests(text, self.config.max_chars_per_request);
        let part = PartFile::new(partial_path(output));

        let bytes = match self.write_chunks(&chunks, voice, rate, part.path()).await? {
            0 => return Err(SynthesisError::EmptyAudio),
            n => n,
        };

        tokio::fs::rename(part.path(), output)
            .await
            .map_err(|source| SynthesisError::Write {
                path: output.to_path_buf(),
                source,
            })?;
        part.commit();
        info!(
            "Synthesized {} bytes of audio to {} ({} request(s))",
            bytes,
            output.display(),
            chunks.len()
        );
        Ok(bytes)
    }
}

/// In-progress download. Removed on drop unless committed, so a failed or
/// cancelled request leaves nothing behind.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial file {}: {}", self.path.display(), e),
        }
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    output.with_file_name(name)
}

static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// Split `text` into pieces of at most `max_chars` characters, preferring
/// sentence boundaries. A single over-long sentence is cut on char
/// boundaries.
pub fn split_into_requests(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        sentences.push(&text[last..m.end()]);
        last = m.end();
    }
    if last < text.len() {
        sentences.push(&text[last..]);
    }

    let mut batches = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    let mut flush = |current: &mut String, current_len: &mut usize| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            batches.push(trimmed.to_string());
        }
        current.clear();
        *current_len = 0;
    };

    for sentence in sentences {
        let len = sentence.chars().count();
        if len > max_chars {
            flush(&mut current, &mut current_len);
            let chars: Vec<char> = sentence.chars().collect();
            for piece in chars.chunks(max_chars) {
                let s: String = piece.iter().collect();
                current.push_str(&s);
                flush(&mut current, &mut current_len);
            }
            continue;
        }
        if current_len + len > max_chars {
            flush(&mut current, &mut current_len);
        }
        current.push_str(sentence);
        current_len += len;
    }
    flush(&mut current, &mut current_len);

    batches
}
