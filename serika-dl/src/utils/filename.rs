//! Filename helpers for yt-dlp output templates.
//!
//! Track-metadata driven jobs name their output after the artist and title
//! instead of letting yt-dlp pick `%(title)s`. Those strings come from a
//! remote service, so they are sanitized for every platform and escaped for
//! yt-dlp's template syntax before they are used in `-o`.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a string for use in filenames across all platforms.
///
/// Control characters and characters invalid on Windows become a single
/// underscore per run, leading/trailing spaces and dots are trimmed,
/// reserved device names get a `_` prefix and an empty result becomes
/// `"unnamed"`. Unicode text is preserved.
///
/// ```
/// use serika_dl::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC"), "AC_DC");
/// assert_eq!(sanitize_filename("花に亡霊?"), "花に亡霊_");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or_default();
    if WINDOWS_RESERVED_NAMES.contains(&stem) {
        return format!("_{trimmed}");
    }

    trimmed.to_string()
}

/// Escape a literal for use inside a yt-dlp output template.
///
/// yt-dlp expands `%(field)s` sequences, so a literal `%` must be doubled.
pub fn escape_template_literal(input: &str) -> String {
    input.replace('%', "%%")
}

/// File name for a track download: `"<artist> - <title>"`, sanitized and
/// escaped, without extension.
pub fn track_file_stem(artist: &str, title: &str) -> String {
    let stem = format!("{} - {}", sanitize_filename(artist), sanitize_filename(title));
    escape_template_literal(&stem)
}
