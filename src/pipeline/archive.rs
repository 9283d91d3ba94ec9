//! Combined zip archive of the successful artifacts.

use crate::error::Pdf2Mp3Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write `artifacts` into a zip at `archive`, one flat entry per file named
/// after the artifact's file name. Returns the number of entries written.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn write_archive(archive: &Path, artifacts: &[PathBuf]) -> Result<usize, Pdf2Mp3Error> {
    let fail = |reason: String| Pdf2Mp3Error::ArchiveFailed {
        path: archive.to_path_buf(),
        reason,
    };

    let file = File::create(archive).map_err(|e| fail(e.to_string()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0;
    for artifact in artifacts {
        let Some(entry_name) = artifact.file_name().map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        let data = std::fs::read(artifact)
            .map_err(|e| fail(format!("reading {}: {e}", artifact.display())))?;
        zip.start_file(entry_name.as_str(), options)
            .map_err(|e| fail(format!("creating entry {entry_name}: {e}")))?;
        zip.write_all(&data)
            .map_err(|e| fail(format!("writing entry {entry_name}: {e}")))?;
        entries += 1;
    }

    let mut inner = zip.finish().map_err(|e| fail(e.to_string()))?;
    inner.flush().map_err(|e| fail(e.to_string()))?;

    info!("Wrote archive {} with {} entries", archive.display(), entries);
    Ok(entries)
}
