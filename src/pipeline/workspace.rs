//! Run-scoped output directory.
//!
//! Every run gets its own [`TempDir`]. Artifacts and the archive live inside
//! it, so two concurrent runs never share an output directory, and dropping
//! the [`RunWorkspace`] removes every file on every exit path, including
//! early returns and panics.

use crate::error::Pdf2Mp3Error;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Sub-directory holding per-document MP3 files.
const AUDIO_DIR: &str = "audio";

/// Fallback stem for names that have none (e.g. `".pdf"`).
const FALLBACK_STEM: &str = "document";

/// Temporary storage owned by exactly one run.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
    audio_dir: PathBuf,
    claimed: HashSet<PathBuf>,
}

impl RunWorkspace {
    /// Create a fresh workspace under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self, Pdf2Mp3Error> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("pdf2mp3-run-");
            b
        };
        let dir = match parent {
            Some(p) => {
                std::fs::create_dir_all(p)
                    .map_err(|source| Pdf2Mp3Error::WorkspaceFailed { source })?;
                builder.tempdir_in(p)
            }
            None => builder.tempdir(),
        }
        .map_err(|source| Pdf2Mp3Error::WorkspaceFailed { source })?;

        let audio_dir = dir.path().join(AUDIO_DIR);
        std::fs::create_dir_all(&audio_dir)
            .map_err(|source| Pdf2Mp3Error::WorkspaceFailed { source })?;
        debug!("Created run workspace {}", dir.path().display());

        Ok(Self {
            dir,
            audio_dir,
            claimed: HashSet::new(),
        })
    }

    /// Root of the workspace.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Reserve a unique artifact path `<stem>_<suffix>.mp3` for `source_name`.
    ///
    /// Distinct sources that share a stem (`a.pdf`, `a.PDF`) get `-2`, `-3`…
    /// appended so no two tasks ever write the same file.
    pub fn claim_artifact_path(&mut self, source_name: &str, suffix: &str) -> PathBuf {
        let stem = source_stem(source_name);
        let mut n = 1usize;
        loop {
            let file_name = if n == 1 {
                format!("{stem}_{suffix}.mp3")
            } else {
                format!("{stem}-{n}_{suffix}.mp3")
            };
            let candidate = self.audio_dir.join(file_name);
            if self.claimed.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Path for the combined archive.
    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.dir.path().join(archive_name)
    }
}

/// File stem of the last path component of an upload name.
///
/// Upload names may carry client-side directories (`scans\\report.pdf`);
/// only the final component is used so artifacts stay inside the workspace.
pub fn source_stem(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let stem = Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.trim();
    if stem.is_empty() || stem == "." || stem == ".." {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}
