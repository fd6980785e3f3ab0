//! Locating the yt-dlp executable.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const YTDLP: &str = "yt-dlp";

#[cfg(windows)]
const SYSTEM_LOCATIONS: &[&str] = &[
    r"C:\Program Files\yt-dlp\yt-dlp.exe",
    r"C:\Program Files (x86)\yt-dlp\yt-dlp.exe",
];

#[cfg(not(windows))]
const SYSTEM_LOCATIONS: &[&str] = &[
    "/usr/local/bin/yt-dlp",
    "/usr/bin/yt-dlp",
    "/opt/homebrew/bin/yt-dlp",
];

/// Find yt-dlp on `PATH`, then in well-known install locations.
///
/// Falls back to the bare name so a later spawn error carries a useful
/// message instead of failing at start-up.
pub fn resolve_ytdlp() -> PathBuf {
    if let Ok(path) = which::which(YTDLP) {
        debug!(path = %path.display(), "Found yt-dlp in PATH");
        return path;
    }

    if let Some(path) = first_existing(SYSTEM_LOCATIONS.iter().map(Path::new)) {
        debug!(path = %path.display(), "Found yt-dlp at system path");
        return path;
    }

    warn!("yt-dlp not found in PATH or known locations, falling back to bare name");
    PathBuf::from(YTDLP)
}

/// Whether `program` names something that can be executed.
///
/// A bare name is looked up on `PATH`; anything with a path component must
/// exist as a file.
pub fn is_available(program: &Path) -> bool {
    if program.components().count() > 1 {
        program.is_file()
    } else {
        which::which(program).is_ok()
    }
}

fn first_existing<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|p| p.is_file())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_existing_skips_missing() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("yt-dlp");
        std::fs::write(&present, b"").unwrap();
        let missing = temp.path().join("missing");

        let found = first_existing([missing.as_path(), present.as_path()]);
        assert_eq!(found, Some(present));
    }

    #[test]
    fn test_is_available_for_paths() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("tool");
        std::fs::write(&present, b"").unwrap();

        assert!(is_available(&present));
        assert!(!is_available(&temp.path().join("nope")));
        assert!(!is_available(Path::new("definitely-not-a-real-binary-serika")));
    }
}
