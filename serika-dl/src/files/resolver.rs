//! Deciding which files of an Output Directory make up a job's artifact.

use std::path::Path;

use super::classify::{FileRole, classify};
use crate::jobs::DownloadMode;
use crate::{Error, Result};

/// Which branch of the selection policy produced a [`Selection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Thumbnail,
    Subtitle,
    /// Media files plus thumbnails and/or subtitles.
    Bundle,
    Video,
    Audio,
    /// Nothing recognisable; every deliverable file.
    Fallback,
}

/// Files to hand back for a job, primary files first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: SelectionKind,
    pub files: Vec<String>,
    /// Stem of the first file; names the zip bundle.
    pub base_name: String,
}

impl Selection {
    pub fn is_single(&self) -> bool {
        self.files.len() == 1
    }

    pub fn zip_name(&self) -> String {
        format!("{}.zip", self.base_name)
    }
}

/// Non-partial regular files in `dir`, sorted by name.
///
/// `None` means the directory does not exist, which callers report as
/// not-found. An existing but empty directory yields `Some(vec![])`.
pub async fn list_deliverables(dir: &Path) -> Result<Option<Vec<String>>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_path("reading output directory", dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_path("reading output directory", dir, e))?
    {
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_file && classify(&name) != FileRole::Partial {
            files.push(name);
        }
    }
    files.sort();
    Ok(Some(files))
}

/// Apply the selection policy to the deliverable files of a job.
///
/// Returns `None` for an empty list.
pub fn select(files: &[String]) -> Option<Selection> {
    let of_role = |role: FileRole| -> Vec<String> {
        files
            .iter()
            .filter(|name| classify(name) == role)
            .cloned()
            .collect()
    };
    let videos = of_role(FileRole::Video);
    let audios = of_role(FileRole::Audio);
    let thumbnails = of_role(FileRole::Thumbnail);
    let subtitles = of_role(FileRole::Subtitle);
    let has_media = !videos.is_empty() || !audios.is_empty();

    let (kind, selected) = if !has_media && !thumbnails.is_empty() {
        (SelectionKind::Thumbnail, thumbnails)
    } else if !has_media && !subtitles.is_empty() {
        (SelectionKind::Subtitle, subtitles)
    } else if has_media && (!thumbnails.is_empty() || !subtitles.is_empty()) {
        let mut bundle = videos;
        bundle.extend(audios);
        bundle.extend(thumbnails);
        bundle.extend(subtitles);
        (SelectionKind::Bundle, bundle)
    } else if !videos.is_empty() {
        (SelectionKind::Video, videos)
    } else if !audios.is_empty() {
        (SelectionKind::Audio, audios)
    } else {
        (SelectionKind::Fallback, files.to_vec())
    };

    let base_name = selected.first().map(|first| stem(first))?;
    Some(Selection {
        kind,
        files: selected,
        base_name,
    })
}

/// What a status poll reports about the files on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverableSummary {
    pub main_file: String,
    pub filesize: u64,
    pub file_count: usize,
}

/// Pick the file a job of `mode` is about and report its size.
///
/// `Ok(None)` when there is no directory or nothing deliverable yet.
pub async fn summarize(dir: &Path, mode: DownloadMode) -> Result<Option<DeliverableSummary>> {
    let Some(files) = list_deliverables(dir).await? else {
        return Ok(None);
    };
    let Some(main_file) = main_file_for(&files, mode) else {
        return Ok(None);
    };

    let path = dir.join(&main_file);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| Error::io_path("reading file metadata", &path, e))?;

    Ok(Some(DeliverableSummary {
        main_file,
        filesize: metadata.len(),
        file_count: files.len(),
    }))
}

fn main_file_for(files: &[String], mode: DownloadMode) -> Option<String> {
    let first_of = |role: FileRole| files.iter().find(|name| classify(name) == role);
    let preferred = match mode {
        DownloadMode::Thumbnail => first_of(FileRole::Thumbnail),
        DownloadMode::Subtitles => first_of(FileRole::Subtitle),
        DownloadMode::Audio => first_of(FileRole::Audio),
        DownloadMode::Video => first_of(FileRole::Video).or_else(|| first_of(FileRole::Audio)),
    };
    preferred.or_else(|| files.first()).cloned()
}

fn stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_only_thumbnails() {
        let sel = select(&names(&["a.jpg", "b.webp"])).unwrap();
        assert_eq!(sel.kind, SelectionKind::Thumbnail);
        assert_eq!(sel.files, names(&["a.jpg", "b.webp"]));
        assert_eq!(sel.base_name, "a");
    }

    #[test]
    fn test_only_subtitles() {
        let sel = select(&names(&["talk.en.vtt"])).unwrap();
        assert_eq!(sel.kind, SelectionKind::Subtitle);
        assert!(sel.is_single());
        assert_eq!(sel.base_name, "talk.en");
    }

    #[test]
    fn test_media_with_extras_is_bundled_primary_first() {
        let files = names(&["Clip.en.srt", "Clip.jpg", "Clip.mp4"]);
        let sel = select(&files).unwrap();
        assert_eq!(sel.kind, SelectionKind::Bundle);
        assert_eq!(sel.files, names(&["Clip.mp4", "Clip.jpg", "Clip.en.srt"]));
        assert_eq!(sel.zip_name(), "Clip.zip");
    }

    #[test]
    fn test_video_preferred_over_audio() {
        let sel = select(&names(&["a.m4a", "b.mp4"])).unwrap();
        assert_eq!(sel.kind, SelectionKind::Video);
        assert_eq!(sel.files, names(&["b.mp4"]));

        let sel = select(&names(&["a.m4a"])).unwrap();
        assert_eq!(sel.kind, SelectionKind::Audio);
    }

    #[test]
    fn test_fallback_and_empty() {
        let sel = select(&names(&["info.json", "notes.txt"])).unwrap();
        assert_eq!(sel.kind, SelectionKind::Fallback);
        assert_eq!(sel.files.len(), 2);
        assert!(select(&[]).is_none());
    }

    #[tokio::test]
    async fn test_list_deliverables() {
        let temp = TempDir::new().unwrap();
        assert!(list_deliverables(&temp.path().join("missing")).await.unwrap().is_none());

        std::fs::write(temp.path().join("b.mp4"), b"v").unwrap();
        std::fs::write(temp.path().join("a.jpg"), b"t").unwrap();
        std::fs::write(temp.path().join("c.mp4.part"), b"p").unwrap();
        std::fs::create_dir(temp.path().join("sub.mp4")).unwrap();

        let files = list_deliverables(temp.path()).await.unwrap().unwrap();
        assert_eq!(files, names(&["a.jpg", "b.mp4"]));
    }

    #[tokio::test]
    async fn test_summary_by_mode() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("song.mp3"), vec![0u8; 42]).unwrap();
        std::fs::write(temp.path().join("cover.jpg"), b"jpg").unwrap();

        let audio = summarize(temp.path(), DownloadMode::Audio).await.unwrap().unwrap();
        assert_eq!(audio.main_file, "song.mp3");
        assert_eq!(audio.filesize, 42);
        assert_eq!(audio.file_count, 2);

        // Video mode falls back to audio.
        let video = summarize(temp.path(), DownloadMode::Video).await.unwrap().unwrap();
        assert_eq!(video.main_file, "song.mp3");

        let thumb = summarize(temp.path(), DownloadMode::Thumbnail).await.unwrap().unwrap();
        assert_eq!(thumb.main_file, "cover.jpg");

        // No subtitle: first deliverable.
        let subs = summarize(temp.path(), DownloadMode::Subtitles).await.unwrap().unwrap();
        assert_eq!(subs.main_file, "cover.jpg");
    }

    #[tokio::test]
    async fn test_summary_without_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("v.mp4.part"), b"p").unwrap();
        assert!(summarize(temp.path(), DownloadMode::Video).await.unwrap().is_none());
        assert!(
            summarize(&temp.path().join("gone"), DownloadMode::Video)
                .await
                .unwrap()
                .is_none()
        );
    }
}
