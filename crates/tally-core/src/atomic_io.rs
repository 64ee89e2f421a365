use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::clock::current_unix_timestamp_ms;

/// Replaces the file at `path` with `content` via a sibling temp file and a
/// rename, so a reader never observes a partially written file.
pub fn write_text_atomic(path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        bail!("cannot write to an empty path");
    }
    if path.is_dir() {
        bail!("cannot overwrite directory {}", path.display());
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let stem = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("tally");
    let temp_path = dir.join(format!(
        ".{stem}.{}.{}.tmp",
        std::process::id(),
        current_unix_timestamp_ms()
    ));

    // The temp file lives in the destination directory so the rename stays on
    // one filesystem.
    let mut file = std::fs::File::create(&temp_path)
        .with_context(|| format!("failed to create {}", temp_path.display()))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    drop(file);

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            temp_path.display(),
            path.display()
        )
    })
}
