//! yt-dlp output interpretation.
//!
//! yt-dlp's console output is not a stable format. Everything it prints is
//! treated as best-effort telemetry: [`apply_chunk`] folds one chunk of output
//! into a [`Job`] by running an ordered table of rules over it, and a chunk no
//! rule recognises changes nothing. Success or failure is decided by the exit
//! code, never by this module.
//!
//! Rules run in table order and later rules overwrite fields set by earlier
//! ones within the same chunk. The one explicit precedence is that fragment
//! progress is skipped when percentage progress matched the same chunk.

use std::sync::LazyLock;

use regex::Regex;

use crate::jobs::{DownloadMode, Job, JobStatus};

/// Ceiling for transfer progress; the rest is reserved for post-processing.
pub const TRANSFER_CEILING: f64 = 95.0;
/// Progress once the raw transfer or a post-processor has finished.
pub const POST_PROCESSING_FLOOR: f64 = 96.0;
/// Progress while embedding thumbnails, metadata or subtitles.
pub const EMBEDDING_FLOOR: f64 = 98.0;
/// Progress of thumbnail- and subtitle-only jobs once writing starts.
pub const SIDECAR_WRITING_PROGRESS: f64 = 90.0;

const FRAGMENT_FLOOR: f64 = 10.0;
const FRAGMENT_STEP: f64 = 0.1;
const FRAGMENT_CEILING: f64 = 90.0;

/// Longest error message kept on a job, in characters.
pub const MAX_ERROR_CHARS: usize = 200;

// [download]  45.2% of ~123.45MiB at 5.67MiB/s ETA 00:30
static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[download\]\s+([\d.]+)%\s+of\s+~?\s*([\d.]+[KMG]iB)(?:.*?at\s+([\d.]+\s*[KMG]iB/s))?(?:.*?ETA\s+(\d+:\d+(?::\d+)?))?",
    )
    .unwrap()
});

// [download]   24.34MiB at    1.05MiB/s (00:00:28) (frag 66/120)
static FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[download\]\s+([\d.]+)([KMG]iB)\s+at\s+([\d.]+\s*[KMG]iB/s)\s+\((\d+:\d+:\d+|\d+:\d+)\)(?:\s+\(frag\s+(\d+)(?:/(\d+))?\))?",
    )
    .unwrap()
});

// [download] 100% of    7.60MiB in 00:00:30 at 255.22KiB/s
static TRANSFER_COMPLETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[download\]\s+100%\s+of\s+~?\s*([\d.]+[KMG]iB)\s+in\s+(\d+:\d+:\d+|\d+:\d+)\s+at\s+([\d.]+\s*[KMG]iB/s)",
    )
    .unwrap()
});

static DESTINATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\[download\] Destination:\s*(.+)$").unwrap());

static MERGE_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[Merger\] Merging formats into "(.+)""#).unwrap());

static AUDIO_DESTINATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\[ExtractAudio\] Destination:\s*(.+)$").unwrap());

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\berror:\s*(.+)").unwrap());

const POST_PROCESSING_TAGS: &[&str] = &["[Merger]", "[ffmpeg]", "[ExtractAudio]"];
const EMBEDDING_TAGS: &[&str] = &["[EmbedThumbnail]", "[Metadata]", "[EmbedSubtitle]"];
const THUMBNAIL_WRITING: &[&str] = &["[info] Writing video thumbnail", "Writing thumbnail"];
const SUBTITLE_WRITING: &[&str] = &[
    "[info] Writing video subtitles",
    "Writing video description",
    "[info] Writing",
];

/// Names of the rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Percent,
    Fragment,
    TransferComplete,
    PostProcessing,
    Embedding,
    ModeWriting,
    Destination,
    MergeTarget,
    AudioDestination,
    Error,
}

/// Which rules changed the job for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    matched: Vec<Rule>,
}

impl ChunkOutcome {
    pub fn matched(&self, rule: Rule) -> bool {
        self.matched.contains(&rule)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.matched
    }

    /// True when no rule recognised the chunk.
    pub fn is_noop(&self) -> bool {
        self.matched.is_empty()
    }
}

/// A rule returns `true` when it recognised the chunk and updated the job.
type RuleFn = fn(&mut Job, &str, &ChunkOutcome) -> bool;

const RULES: &[(Rule, RuleFn)] = &[
    (Rule::Percent, apply_percent),
    (Rule::Fragment, apply_fragment),
    (Rule::TransferComplete, apply_transfer_complete),
    (Rule::PostProcessing, apply_post_processing),
    (Rule::Embedding, apply_embedding),
    (Rule::ModeWriting, apply_mode_writing),
    (Rule::Destination, apply_destination),
    (Rule::MergeTarget, apply_merge_target),
    (Rule::AudioDestination, apply_audio_destination),
    (Rule::Error, apply_error),
];

/// Fold one chunk of yt-dlp output (stdout or stderr) into `job`.
///
/// The chunk is usually a single record from the output reader but may
/// contain several lines; patterns are matched against the whole chunk.
pub fn apply_chunk(job: &mut Job, chunk: &str) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();
    for (rule, apply) in RULES {
        if apply(job, chunk, &outcome) {
            outcome.matched.push(*rule);
        }
    }
    outcome
}

/// `X% of SIZE [at SPEED] [ETA T]`: progress capped at 95.
fn apply_percent(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    let Some(caps) = PERCENT.captures(chunk) else {
        return false;
    };
    let Some(percent) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) else {
        return false;
    };

    job.progress = percent.min(TRANSFER_CEILING);
    if let Some(speed) = caps.get(3) {
        job.speed = Some(compact(speed.as_str()));
    }
    if let Some(eta) = caps.get(4) {
        job.eta = Some(eta.as_str().to_string());
    }
    job.status = JobStatus::Downloading;
    true
}

/// `SIZE at SPEED (T) [(frag I[/N])]`, for streams that report no percentage.
///
/// With a known fragment total, progress is `round(I / N * 95)`. With only an
/// index it creeps up by a fixed step between 10 and 90.
fn apply_fragment(job: &mut Job, chunk: &str, so_far: &ChunkOutcome) -> bool {
    if so_far.matched(Rule::Percent) {
        return false;
    }
    let Some(caps) = FRAGMENT.captures(chunk) else {
        return false;
    };

    job.speed = caps.get(3).map(|m| compact(m.as_str()));
    job.eta = caps.get(4).map(|m| m.as_str().to_string());
    job.status = JobStatus::Downloading;

    let index = caps.get(5).and_then(|m| m.as_str().parse::<u64>().ok());
    let total = caps.get(6).and_then(|m| m.as_str().parse::<u64>().ok());
    match (index, total) {
        (Some(index), Some(total)) if total > 0 => {
            let estimate = (index as f64 / total as f64 * TRANSFER_CEILING).round();
            job.progress = estimate.min(TRANSFER_CEILING);
        }
        (Some(_), _) => {
            job.progress = (job.progress.max(FRAGMENT_FLOOR) + FRAGMENT_STEP).min(FRAGMENT_CEILING);
        }
        (None, _) => {}
    }
    true
}

/// `100% of SIZE in T at SPEED`: the transfer is done, post-processing may follow.
fn apply_transfer_complete(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    if !TRANSFER_COMPLETE.is_match(chunk) {
        return false;
    }
    job.progress = POST_PROCESSING_FLOOR;
    job.status = JobStatus::Processing;
    job.clear_transfer_stats();
    true
}

fn apply_post_processing(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    if !contains_any(chunk, POST_PROCESSING_TAGS) {
        return false;
    }
    job.raise_progress(POST_PROCESSING_FLOOR);
    job.status = JobStatus::Processing;
    job.clear_transfer_stats();
    true
}

fn apply_embedding(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    if !contains_any(chunk, EMBEDDING_TAGS) {
        return false;
    }
    job.raise_progress(EMBEDDING_FLOOR);
    job.status = JobStatus::Processing;
    true
}

/// Thumbnail- and subtitle-only jobs transfer no media stream, so the
/// "Writing ..." line is the only sign of life they give.
fn apply_mode_writing(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    let markers = match job.mode {
        DownloadMode::Thumbnail => THUMBNAIL_WRITING,
        DownloadMode::Subtitles => SUBTITLE_WRITING,
        DownloadMode::Video | DownloadMode::Audio => return false,
    };
    if !contains_any(chunk, markers) {
        return false;
    }
    job.progress = SIDECAR_WRITING_PROGRESS;
    job.status = JobStatus::Downloading;
    true
}

fn apply_destination(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    set_filename(job, &DESTINATION, chunk)
}

fn apply_merge_target(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    set_filename(job, &MERGE_TARGET, chunk)
}

fn apply_audio_destination(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    set_filename(job, &AUDIO_DESTINATION, chunk)
}

/// Keep the message of an `ERROR:` line. Status is left alone; only a
/// non-zero exit makes a job fail.
fn apply_error(job: &mut Job, chunk: &str, _: &ChunkOutcome) -> bool {
    let Some(message) = ERROR_LINE
        .captures(chunk)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|m| !m.is_empty())
    else {
        return false;
    };
    job.error = Some(truncate_chars(message, MAX_ERROR_CHARS));
    true
}

fn set_filename(job: &mut Job, pattern: &Regex, chunk: &str) -> bool {
    let Some(path) = pattern
        .captures(chunk)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
    else {
        return false;
    };
    let name = base_name(path);
    if name.is_empty() {
        return false;
    }
    job.filename = Some(name.to_string());
    true
}

/// Final path component. yt-dlp may print either separator, whatever the
/// host platform.
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn contains_any(chunk: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| chunk.contains(n))
}

/// `5.67 MiB/s` -> `5.67MiB/s`
fn compact(value: &str) -> String {
    value.split_whitespace().collect()
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
