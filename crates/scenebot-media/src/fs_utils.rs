//! Filesystem helpers shared by the splitter, normalizer and cleanup code.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::MediaResult;

/// Normalize an extension to lowercase with a leading dot, e.g. `MP4` -> `.mp4`.
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    format!(".{}", trimmed.to_ascii_lowercase())
}

/// Lowercased extension of `path` with a leading dot, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
}

/// Case-insensitive extension check. `extension` may include the dot.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    extension_of(path).is_some_and(|e| e == normalize_extension(extension))
}

/// Regular files in `dir` with `extension`, sorted by file name.
pub async fn list_files_with_extension(dir: &Path, extension: &str) -> MediaResult<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Total size in bytes of all files under `dir`.
///
/// Entries that vanish or cannot be read while walking are skipped.
pub async fn directory_size(dir: &Path) -> u64 {
    let mut total = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(mut entries) = fs::read_dir(&current).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if metadata.is_dir() {
                pending.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }

    total
}
