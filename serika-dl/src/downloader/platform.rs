//! URL validation and the few site checks that change how yt-dlp is driven.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::{Error, Result};

static SPOTIFY_TRACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(open\.)?spotify\.com/track/([a-zA-Z0-9]+)").unwrap()
});

static SPOTIFY_COLLECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(open\.)?spotify\.com/(album|playlist)/[\w]+").unwrap()
});

static BILIBILI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://)?(www\.)?(bilibili\.com|b23\.tv)/").unwrap());

static INSTAGRAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://)?(www\.)?instagram\.com/").unwrap());

/// Sites that need special handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    SpotifyTrack,
    SpotifyCollection,
    Bilibili,
    Instagram,
    Other,
}

impl Platform {
    pub fn detect(url: &str) -> Self {
        if SPOTIFY_TRACK.is_match(url) {
            Self::SpotifyTrack
        } else if SPOTIFY_COLLECTION.is_match(url) {
            Self::SpotifyCollection
        } else if BILIBILI.is_match(url) {
            Self::Bilibili
        } else if INSTAGRAM.is_match(url) {
            Self::Instagram
        } else {
            Self::Other
        }
    }
}

/// Trim and validate a user-supplied URL.
///
/// A missing scheme is accepted (`youtu.be/x` is fine) but the value handed
/// to yt-dlp is the trimmed input, not the normalised form, so the site
/// regexes keep matching what the user typed.
pub fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("URL is required"));
    }
    // A leading dash would be read as an option by yt-dlp.
    if trimmed.starts_with('-') {
        return Err(Error::validation("Invalid URL format"));
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme).map_err(|_| Error::validation("Invalid URL format"))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation("Invalid URL format"));
    }

    Ok(trimmed.to_string())
}

pub fn spotify_track_id(url: &str) -> Option<&str> {
    SPOTIFY_TRACK
        .captures(url)
        .and_then(|c| c.get(3))
        .map(|m| m.as_str())
}
