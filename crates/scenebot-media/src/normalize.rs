//! Renaming split output into the canonical `scene-NNN.<ext>` scheme.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use scenebot_models::{index_width, scene_file_name, SceneFile};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{list_files_with_extension, normalize_extension};

const PENDING_SUFFIX: &str = ".pending";

/// Rename every `extension` file in `dir` to `scene-NNN.<ext>` in name order.
///
/// Files are first moved aside under temporary names and then onto their
/// targets, so no target is overwritten while its current holder still
/// needs to move. Files already at their target are not touched; running
/// this twice gives the same result as running it once.
pub async fn normalize(dir: &Path, extension: &str) -> MediaResult<Vec<SceneFile>> {
    let extension = normalize_extension(extension);
    let files = list_files_with_extension(dir, &extension).await?;
    if files.is_empty() {
        return Err(MediaError::NoScenesProduced);
    }

    let width = index_width(files.len());
    let plan: Vec<(PathBuf, PathBuf)> = files
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let target = dir.join(scene_file_name(i as u32 + 1, width, &extension));
            (path, target)
        })
        .collect();

    let mut pending = Vec::new();
    for (current, target) in &plan {
        if current == target {
            continue;
        }
        let mut name = target.as_os_str().to_owned();
        name.push(PENDING_SUFFIX);
        let temp = PathBuf::from(name);
        fs::rename(current, &temp).await?;
        pending.push((temp, target));
    }

    let renamed = pending.len();
    for (temp, target) in pending {
        debug!("Renaming {} -> {}", temp.display(), target.display());
        fs::rename(&temp, target).await?;
    }

    let mut scenes = Vec::with_capacity(plan.len());
    for (i, (_, target)) in plan.into_iter().enumerate() {
        let size_bytes = fs::metadata(&target).await?.len();
        scenes.push(SceneFile {
            index: i as u32 + 1,
            path: target,
            size_bytes,
        });
    }

    info!(
        "Normalized {} scene files in {} ({} renamed)",
        scenes.len(),
        dir.display(),
        renamed
    );
    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenebot_models::parse_scene_index;
    use tempfile::TempDir;

    async fn touch(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).await.unwrap();
    }

    async fn names(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_renames_split_output_in_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "clip-Scene-002.mp4", "two").await;
        touch(dir.path(), "clip-Scene-001.mp4", "one").await;
        touch(dir.path(), "clip-Scene-003.mp4", "three").await;
        touch(dir.path(), "notes.txt", "ignored").await;

        let scenes = normalize(dir.path(), "mp4").await.unwrap();

        assert_eq!(
            names(dir.path()).await,
            vec!["notes.txt", "scene-001.mp4", "scene-002.mp4", "scene-003.mp4"]
        );
        let indices: Vec<u32> = scenes.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(fs::read_to_string(&scenes[1].path).await.unwrap(), "two");
        assert_eq!(scenes[2].size_bytes, 5);
    }

    #[tokio::test]
    async fn test_running_twice_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        for i in 1..=4 {
            touch(dir.path(), &format!("v-Scene-{i:03}.mkv"), &i.to_string()).await;
        }

        let first = normalize(dir.path(), ".mkv").await.unwrap();
        let second = normalize(dir.path(), ".mkv").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second[3].path).await.unwrap(), "4");
    }

    #[tokio::test]
    async fn test_existing_target_names_are_not_clobbered() {
        // Sorted order: a.mp4, scene-001.mp4; a.mp4 must become scene-001
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.mp4", "first").await;
        touch(dir.path(), "scene-001.mp4", "second").await;

        let scenes = normalize(dir.path(), ".mp4").await.unwrap();

        assert_eq!(scenes.len(), 2);
        assert_eq!(fs::read_to_string(&scenes[0].path).await.unwrap(), "first");
        assert_eq!(fs::read_to_string(&scenes[1].path).await.unwrap(), "second");
        assert_eq!(
            names(dir.path()).await,
            vec!["scene-001.mp4", "scene-002.mp4"]
        );
    }

    #[tokio::test]
    async fn test_indices_are_contiguous_and_sort_lexicographically() {
        let dir = TempDir::new().unwrap();
        for i in 1..=1200 {
            touch(dir.path(), &format!("x-Scene-{i:04}.mp4"), "").await;
        }

        let scenes = normalize(dir.path(), ".mp4").await.unwrap();

        let file_names: Vec<String> = scenes
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(file_names[0], "scene-0001.mp4");
        assert_eq!(file_names[1199], "scene-1200.mp4");
        let mut sorted = file_names.clone();
        sorted.sort();
        assert_eq!(sorted, file_names);
        for (i, name) in file_names.iter().enumerate() {
            assert_eq!(parse_scene_index(name), Some(i as u32 + 1));
        }
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.md", "").await;

        assert!(matches!(
            normalize(dir.path(), ".mp4").await,
            Err(MediaError::NoScenesProduced)
        ));
    }
}
