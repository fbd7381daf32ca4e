//! Utilities (source loading, figure files).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::execution::ImageArtifact;

/// Marks the end of source text piped on stdin; anything after it is ignored.
pub const STDIN_EOF_MARKER: &str = "__pysession__eof__";

/// Read a script file and return its content as string.
/// Currently supports .py, .txt, and files without extension.
pub fn read_source_file(file_path: &Path) -> Result<String> {
    // Check if file exists
    if !file_path.exists() {
        bail!("Source file '{}' does not exist", file_path.display());
    }

    // Check if it's a file (not directory)
    if !file_path.is_file() {
        bail!("'{}' is not a file", file_path.display());
    }

    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "py" | "txt" | "" => fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read file '{}'", file_path.display())),
        _ => {
            bail!("Unsupported file type: .{}\nCurrently supported: .py, .txt, and files without extension", extension);
        }
    }
}

/// Source text from piped stdin, cut at the end marker when present.
pub fn source_from_stdin(buf: &str) -> &str {
    match buf.split_once(STDIN_EOF_MARKER) {
        Some((before, _after)) => before,
        None => buf,
    }
}

/// Write images as `figure-NNN.png` (1-based, creation order) into `dir`.
pub fn write_images(dir: &Path, prefix: &str, images: &[ImageArtifact]) -> Result<Vec<PathBuf>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir)
        .with_context(|| format!("creating image directory: {}", dir.display()))?;

    let mut written = Vec::with_capacity(images.len());
    for image in images {
        let path = dir.join(format!("{prefix}figure-{:03}.png", image.index + 1));
        fs::write(&path, &image.png)
            .with_context(|| format!("writing figure: {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = image.png.len(), "figure written");
        written.push(path);
    }
    Ok(written)
}
