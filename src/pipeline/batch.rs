//! Bounded batch runner.
//!
//! Runs one synthesis call per [`ConversionTask`] with at most `limit` calls
//! in flight. Every task reaches a terminal [`ConversionResult`] before
//! [`BatchRunner::run`] returns; a failing task never affects its siblings.
//! The only fatal outcome is a panic inside a task, which is a defect and
//! aborts the run with [`Pdf2Mp3Error::Internal`].

use super::speech::{SpeechRate, SpeechSynthesizer};
use crate::error::Pdf2Mp3Error;
use crate::output::{ConversionOutcome, ConversionResult};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One unit of synthesis work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub source_name: String,
    /// Non-empty; documents without text never become tasks.
    pub text: String,
    /// Engine voice identifier.
    pub voice: String,
    pub rate: SpeechRate,
    pub output: PathBuf,
}

/// Runs [`ConversionTask`]s against a [`SpeechSynthesizer`] under a fixed
/// concurrency ceiling.
#[derive(Clone)]
pub struct BatchRunner {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    limit: usize,
    progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
}

impl BatchRunner {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, limit: usize) -> Self {
        Self {
            synthesizer,
            limit,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Tasks not yet finished when `token` fires resolve to failures with
    /// the error `"cancelled"`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run every task and return one result per task, in task order.
    pub async fn run(
        &self,
        tasks: Vec<ConversionTask>,
    ) -> Result<Vec<ConversionResult>, Pdf2Mp3Error> {
        if self.limit == 0 {
            return Err(Pdf2Mp3Error::InvalidConfig("concurrency limit must be ≥ 1".into()));
        }
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let total = tasks.len();
        info!("Converting {} document(s), up to {} at a time", total, self.limit);
        if let Some(ref cb) = self.progress {
            cb.on_conversion_start(total);
        }

        let outcomes: Vec<(usize, String, PathBuf, std::thread::Result<ConversionResult>)> =
            stream::iter(tasks.into_iter().enumerate().map(|(idx, task)| {
                let name = task.source_name.clone();
                let output = task.output.clone();
                async move {
                    let result = AssertUnwindSafe(self.run_one(task)).catch_unwind().await;
                    (idx, name, output, result)
                }
            }))
            .buffer_unordered(self.limit)
            .collect()
            .await;

        let mut results = Vec::with_capacity(total);
        let mut panicked = Vec::new();
        for (idx, name, output, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push((idx, result)),
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!("Task for '{}' panicked: {}", name, msg);
                    remove_artifact(&output).await;
                    panicked.push(format!("{name}: {msg}"));
                }
            }
        }

        if !panicked.is_empty() {
            return Err(Pdf2Mp3Error::Internal(format!(
                "conversion task panicked ({})",
                panicked.join("; ")
            )));
        }

        results.sort_by_key(|(idx, _)| *idx);
        Ok(results.into_iter().map(|(_, r)| r).collect())
    }

    async fn run_one(&self, task: ConversionTask) -> ConversionResult {
        let ConversionTask {
            source_name,
            text,
            voice,
            rate,
            output,
        } = task;

        if let Some(ref cb) = self.progress {
            cb.on_task_start(&source_name);
        }
        debug!("Synthesizing '{}' ({} chars) with {}", source_name, text.len(), voice);

        let call = self.synthesizer.synthesize(&text, &voice, &rate, &output);
        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                r = call => Some(r),
            },
            None => Some(call.await),
        };

        let result = match outcome {
            Some(Ok(bytes)) => ConversionResult::converted(&source_name, output, bytes),
            Some(Err(e)) => {
                warn!("Failed on '{}': {}", source_name, e);
                remove_artifact(&output).await;
                ConversionResult::failed(&source_name, e.to_string())
            }
            None => {
                debug!("'{}' cancelled", source_name);
                remove_artifact(&output).await;
                ConversionResult::failed(&source_name, "cancelled")
            }
        };

        if let Some(ref cb) = self.progress {
            match &result.outcome {
                ConversionOutcome::Converted { bytes, .. } => {
                    cb.on_task_complete(&source_name, *bytes)
                }
                ConversionOutcome::Failed { error } => {
                    cb.on_task_error(&source_name, error)
                }
            }
        }
        result
    }
}

/// Run `tasks` with at most `limit` synthesis calls in flight.
pub async fn run_batch(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    tasks: Vec<ConversionTask>,
    limit: usize,
) -> Result<Vec<ConversionResult>, Pdf2Mp3Error> {
    BatchRunner::new(synthesizer, limit).run(tasks).await
}

/// A failed task must not leave a playable-looking file behind.
async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynthesisError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes the text as "audio"; fails for one voice, panics for another,
    /// hangs for a third. Tracks peak concurrency.
    #[derive(Default)]
    struct FakeSynth {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynth {
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
            tokio::time::sleep(Duration::from_millis(10)).await;

            let result = match voice {
                "bad-voice" => {
                    tokio::fs::write(output, b"partial").await.ok();
                    Err(SynthesisError::InvalidVoice(voice.into()))
                }
                "panic-voice" => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    panic!("engine exploded");
                }
                "slow-voice" => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(0)
                }
                _ => tokio::fs::write(output, text.as_bytes())
                    .await
                    .map(|_| text.len() as u64)
                    .map_err(|source| SynthesisError::Write {
                        path: output.to_path_buf(),
                        source,
                    }),
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn task(dir: &Path, name: &str, voice: &str) -> ConversionTask {
        ConversionTask {
            source_name: name.into(),
            text: format!("text of {name}"),
            voice: voice.into(),
            rate: SpeechRate::NORMAL,
            output: dir.join(format!("{name}.mp3")),
        }
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let synth = Arc::new(FakeSynth::default());
        for k in [1, 4, 16] {
            let results = run_batch(synth.clone(), vec![], k).await.unwrap();
            assert!(results.is_empty());
        }
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let synth = Arc::new(FakeSynth::default());
        let err = run_batch(synth, vec![], 0).await.unwrap_err();
        assert!(matches!(err, Pdf2Mp3Error::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn results_are_invariant_to_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let tasks: Vec<_> = (0..10)
            .map(|i| task(dir.path(), &format!("doc{i}"), "en-US-GuyNeural"))
            .collect();

        let mut outcomes = Vec::new();
        for k in [1, 3, 10, 32] {
            let synth = Arc::new(FakeSynth::default());
            let results = run_batch(synth.clone(), tasks.clone(), k).await.unwrap();
            assert_eq!(results.len(), 10);
            assert!(synth.peak.load(Ordering::SeqCst) <= k);
            outcomes.push(
                results
                    .iter()
                    .map(|r| (r.source_name.clone(), r.is_success()))
                    .collect::<Vec<_>>(),
            );
        }
        assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn ceiling_is_reached_but_never_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let tasks: Vec<_> = (0..12)
            .map(|i| task(dir.path(), &format!("doc{i}"), "v"))
            .collect();
        let synth = Arc::new(FakeSynth::default());
        run_batch(synth.clone(), tasks, 4).await.unwrap();
        assert_eq!(synth.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            task(dir.path(), "a.pdf", "bad-voice"),
            task(dir.path(), "b.pdf", "en-US-JennyNeural"),
        ];
        let results = run_batch(Arc::new(FakeSynth::default()), tasks, 2)
            .await
            .unwrap();

        let a = results.iter().find(|r| r.source_name == "a.pdf").unwrap();
        let b = results.iter().find(|r| r.source_name == "b.pdf").unwrap();
        assert!(!a.is_success());
        assert!(a.error().unwrap().contains("invalid voice"));
        assert!(!dir.path().join("a.pdf.mp3").exists(), "partial file removed");
        assert!(b.is_success());
        assert_eq!(
            std::fs::read_to_string(b.output_path().unwrap()).unwrap(),
            "text of b.pdf"
        );
    }

    #[tokio::test]
    async fn panic_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            task(dir.path(), "ok.pdf", "v"),
            task(dir.path(), "boom.pdf", "panic-voice"),
        ];
        let err = run_batch(Arc::new(FakeSynth::default()), tasks, 2)
            .await
            .unwrap_err();
        match err {
            Pdf2Mp3Error::Internal(msg) => {
                assert!(msg.contains("boom.pdf"), "got: {msg}");
                assert!(msg.contains("engine exploded"), "got: {msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn cancellation_fails_unfinished_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            task(dir.path(), "slow1.pdf", "slow-voice"),
            task(dir.path(), "slow2.pdf", "slow-voice"),
        ];
        let token = CancellationToken::new();
        let runner = BatchRunner::new(Arc::new(FakeSynth::default()), 2)
            .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let results = runner.run(tasks).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.error() == Some("cancelled")));
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl crate::progress::ConversionProgressCallback for Recorder {
        fn on_conversion_start(&self, total: usize) {
            self.0.lock().unwrap().push(format!("start:{total}"));
        }
        fn on_task_complete(&self, name: &str, _bytes: u64) {
            self.0.lock().unwrap().push(format!("ok:{name}"));
        }
        fn on_task_error(&self, name: &str, _error: &str) {
            self.0.lock().unwrap().push(format!("err:{name}"));
        }
    }

    #[tokio::test]
    async fn progress_sees_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let runner = BatchRunner::new(Arc::new(FakeSynth::default()), 1)
            .with_progress(Some(recorder.clone() as ProgressCallback));
        runner
            .run(vec![
                task(dir.path(), "a.pdf", "v"),
                task(dir.path(), "b.pdf", "bad-voice"),
            ])
            .await
            .unwrap();

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(events[0], "start:2");
        assert!(events.contains(&"ok:a.pdf".to_string()));
        assert!(events.contains(&"err:b.pdf".to_string()));
    }
}
