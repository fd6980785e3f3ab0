//! yt-dlp argument assembly.
//!
//! [`build_args`] is pure: it only looks at the request options and the job
//! context, never at the filesystem or the environment.

use std::path::{Path, PathBuf};

use super::metadata::TrackMetadata;
use super::options::{DownloadOptions, non_empty};
use super::platform::Platform;
use crate::jobs::DownloadMode;
use crate::utils::filename::track_file_stem;

/// Language list used when subtitles are requested alongside media, and
/// in place of a literal `all` for subtitle-only jobs. Asking for every
/// language gets rate-limited by YouTube.
const EMBEDDED_SUB_LANGS: &str = "en,en-orig,en.*,-live_chat";
const COMMON_SUB_LANGS: &str = "en,en-orig,en.*,es,es.*,fr,de,pt,pt-BR,ja,ko,zh-Hans,zh-Hant,ru,ar,hi,it,nl,pl,tr,vi,-live_chat";

const BILIBILI_REFERER: &str = "https://www.bilibili.com/";
const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const ARIA2C_ARGS: &str = "aria2c:-x 16 -s 16 -k 1M --max-connection-per-server=16 --min-split-size=1M";
const LOSSLESS_PP_ARGS: &str = "ffmpeg:-c:a flac -compression_level 12";
const FAST_PP_ARGS: &str = "ffmpeg:-threads 0 -preset ultrafast -tune fastdecode -movflags +faststart";

const DEFAULT_HEIGHT: &str = "1080";
const DEFAULT_MP3_KBPS: &str = "320";

/// Per-job inputs that do not come from the request body.
#[derive(Debug, Clone)]
pub struct ArgContext {
    pub output_dir: PathBuf,
    /// URL handed to yt-dlp. For track-metadata jobs this is a search query.
    pub url: String,
    /// Effective mode; may differ from the requested one (tracks are audio).
    pub mode: DownloadMode,
    pub track: Option<TrackMetadata>,
    pub cookies_file: Option<PathBuf>,
}

impl ArgContext {
    pub fn new(output_dir: impl Into<PathBuf>, url: impl Into<String>, mode: DownloadMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            url: url.into(),
            mode,
            track: None,
            cookies_file: None,
        }
    }
}

/// Build the full yt-dlp argument list for one job.
pub fn build_args(options: &DownloadOptions, ctx: &ArgContext) -> Vec<String> {
    let mut args = Args::default();

    args.pair("-o", output_template(&ctx.output_dir, ctx.track.as_ref()));
    push_request_options(&mut args, options, ctx);

    match ctx.mode {
        DownloadMode::Thumbnail => {
            args.flag("--skip-download").flag("--write-thumbnail");
            if let Some(format) = non_empty(&options.thumbnail_format) {
                args.pair("--convert-thumbnails", format);
            }
            args.flag(&ctx.url);
            return args.0;
        }
        DownloadMode::Subtitles => {
            args.flag("--skip-download").flag("--write-subs");
            if options.auto_subs {
                args.flag("--write-auto-subs");
            }
            let langs = match non_empty(&options.subtitle_langs) {
                Some("all") => COMMON_SUB_LANGS,
                Some(langs) => langs,
                None => "en",
            };
            args.pair("--sub-langs", langs);
            if let Some(format) = non_empty(&options.subtitle_format) {
                args.pair("--convert-subs", format);
            }
            args.flag("--ignore-errors").flag(&ctx.url);
            return args.0;
        }
        DownloadMode::Audio | DownloadMode::Video => {}
    }

    args.pair("--concurrent-fragments", "16")
        .pair("--retries", "10")
        .pair("--fragment-retries", "10")
        .pair("--buffer-size", "16K")
        .pair("--http-chunk-size", "10M")
        .pair("--throttled-rate", "100K");

    if Platform::detect(&ctx.url) == Platform::Bilibili {
        args.pair("--referer", BILIBILI_REFERER);
        if non_empty(&options.user_agent).is_none() {
            args.pair("--user-agent", DESKTOP_USER_AGENT);
        }
        args.flag("--no-check-certificates");
    }

    args.pair("--external-downloader", "aria2c")
        .pair("--external-downloader-args", ARIA2C_ARGS);

    let audio_only = ctx.mode == DownloadMode::Audio;
    if audio_only {
        push_audio_format(&mut args, non_empty(&options.audio_format));
    } else if options.video_only {
        let format = match height_filter(&options.quality) {
            Some(filter) => format!("bestvideo{filter}/bestvideo/best"),
            None => "bestvideo/best".to_string(),
        };
        args.pair("-f", format);
    } else {
        args.pair("-f", video_format_selector(options));
        args.pair("--merge-output-format", "mp4");
    }

    if options.download_thumbnail {
        args.flag("--write-thumbnail");
    }
    if options.embed_thumbnail && !audio_only {
        args.flag("--embed-thumbnail");
    }
    if options.embed_metadata {
        args.flag("--embed-metadata")
            .pair("--parse-metadata", "description:(?s)(?P<meta_comment>.+)");
    }

    if let Some(track) = &ctx.track {
        push_track_overrides(&mut args, track);
    }

    if options.subtitles {
        args.flag("--write-subs")
            .flag("--write-auto-subs")
            .flag("--embed-subs")
            .pair("--sub-langs", EMBEDDED_SUB_LANGS)
            .flag("--ignore-errors");
    }

    if options.sponsor_block {
        args.pair("--sponsorblock-remove", "all");
    }

    args.pair("--postprocessor-args", FAST_PP_ARGS);
    args.flag(&ctx.url);
    args.0
}

fn output_template(output_dir: &Path, track: Option<&TrackMetadata>) -> String {
    let name = match track {
        Some(track) => format!("{}.%(ext)s", track_file_stem(&track.artist, &track.title)),
        None => "%(title)s.%(ext)s".to_string(),
    };
    output_dir.join(name).to_string_lossy().into_owned()
}

fn push_request_options(args: &mut Args, options: &DownloadOptions, ctx: &ArgContext) {
    if let Some(cookies) = &ctx.cookies_file {
        args.pair("--cookies", cookies.to_string_lossy());
    }
    if let Some(proxy) = non_empty(&options.proxy) {
        args.pair("--proxy", proxy);
    }
    if let Some(user_agent) = non_empty(&options.user_agent) {
        args.pair("--user-agent", user_agent);
    }
    if options.no_playlist {
        args.flag("--no-playlist");
    }
    if let Some(items) = non_empty(&options.playlist_items) {
        args.pair("--playlist-items", items);
    }
}

fn push_audio_format(args: &mut Args, audio_format: Option<&str>) {
    args.pair("-f", "bestaudio").flag("--extract-audio");

    match audio_format {
        Some(format @ ("flac" | "wav" | "alac")) => {
            let target = if format == "alac" { "m4a" } else { format };
            args.pair("--audio-format", target);
            if format != "wav" {
                args.pair("--audio-quality", "0");
            }
            args.pair("--postprocessor-args", LOSSLESS_PP_ARGS);
        }
        Some(format) if format.starts_with("mp3") => {
            let kbps = format
                .split('-')
                .nth(1)
                .filter(|b| !b.is_empty())
                .unwrap_or(DEFAULT_MP3_KBPS);
            args.pair("--audio-format", "mp3")
                .pair("--audio-quality", format!("{kbps}K"));
        }
        Some(format) => {
            args.pair("--audio-format", format);
        }
        None => {}
    }
}

/// `[height<=N]` for a quality like `720p`; `None` for `best` or garbage.
fn height_filter(quality: &str) -> Option<String> {
    let trimmed = quality.trim();
    let height = if trimmed.is_empty() {
        DEFAULT_HEIGHT
    } else {
        trimmed.trim_end_matches(['p', 'P'])
    };
    (!height.is_empty() && height.bytes().all(|b| b.is_ascii_digit()))
        .then(|| format!("[height<={height}]"))
}

/// Video+audio selector, most specific first, ending in `best`.
fn video_format_selector(options: &DownloadOptions) -> String {
    let height = height_filter(&options.quality).unwrap_or_default();
    let vcodec = non_empty(&options.video_codec);
    let acodec = non_empty(&options.audio_codec);

    let mut parts = Vec::with_capacity(6);
    if let (Some(v), Some(a)) = (vcodec, acodec) {
        parts.push(format!("bestvideo{height}[vcodec^={v}]+bestaudio[acodec^={a}]"));
    }
    if let Some(v) = vcodec {
        parts.push(format!("bestvideo{height}[vcodec^={v}]+bestaudio"));
    }
    if let Some(a) = acodec {
        parts.push(format!("bestvideo{height}+bestaudio[acodec^={a}]"));
    }
    if !height.is_empty() {
        parts.push(format!("bestvideo{height}+bestaudio"));
    }
    parts.push("bestvideo+bestaudio".to_string());
    parts.push("best".to_string());
    parts.join("/")
}

/// Force tags from track metadata, using literal `--parse-metadata`
/// templates (`TEXT:%(field)s`).
fn push_track_overrides(args: &mut Args, track: &TrackMetadata) {
    let mut set = |field: &str, value: &str| {
        args.pair(
            "--parse-metadata",
            format!("{}:%({field})s", escape_metadata_literal(value)),
        );
    };

    set("meta_title", &track.title);
    set("meta_artist", &track.artist);
    if let Some(album) = track.album.as_deref().filter(|a| !a.is_empty()) {
        set("meta_album", album);
    }
    if let Some(number) = track.track_number {
        set("meta_track", &number.to_string());
    }
    if let Some(date) = track.release_date.as_deref().filter(|d| !d.is_empty()) {
        set("meta_date", date);
    }
}

/// Escape a literal for the FROM side of `--parse-metadata`: `%` starts a
/// template field and an unescaped `:` ends the FROM part.
fn escape_metadata_literal(value: &str) -> String {
    value.replace('%', "%%").replace(':', "\\:")
}

#[derive(Default)]
struct Args(Vec<String>);

impl Args {
    fn flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.0.push(flag.into());
        self
    }

    fn pair(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.0.push(flag.to_string());
        self.0.push(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn ctx(mode: DownloadMode) -> ArgContext {
        ArgContext::new("/tmp/jobs/abc", URL, mode)
    }

    fn value_of<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    fn values_of<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
        args.windows(2)
            .filter(|w| w[0] == flag)
            .map(|w| w[1].as_str())
            .collect()
    }

    #[test]
    fn test_default_video_job() {
        let options = DownloadOptions::for_url(URL);
        let args = build_args(&options, &ctx(DownloadMode::Video));

        assert_eq!(args[0], "-o");
        assert_eq!(
            Path::new(&args[1]),
            Path::new("/tmp/jobs/abc").join("%(title)s.%(ext)s")
        );
        assert_eq!(args.last().map(String::as_str), Some(URL));
        assert_eq!(value_of(&args, "-f"), Some("bestvideo+bestaudio/best"));
        assert_eq!(value_of(&args, "--merge-output-format"), Some("mp4"));
        assert_eq!(value_of(&args, "--concurrent-fragments"), Some("16"));
        assert_eq!(value_of(&args, "--external-downloader"), Some("aria2c"));
        assert!(args.contains(&"--embed-thumbnail".to_string()));
        assert!(args.contains(&"--embed-metadata".to_string()));
        assert!(!args.contains(&"--write-subs".to_string()));
        assert_eq!(value_of(&args, "--postprocessor-args"), Some(FAST_PP_ARGS));
    }

    #[test]
    fn test_client_format_field_is_ignored() {
        let default = build_args(&DownloadOptions::for_url(URL), &ctx(DownloadMode::Video));
        let options = DownloadOptions {
            format: "worstvideo".to_string(),
            ..DownloadOptions::for_url(URL)
        };
        assert_eq!(build_args(&options, &ctx(DownloadMode::Video)), default);
    }

    #[test]
    fn test_video_quality_and_codecs() {
        let options = DownloadOptions {
            quality: "720p".to_string(),
            video_codec: Some("avc1".to_string()),
            audio_codec: Some("mp4a".to_string()),
            ..DownloadOptions::for_url(URL)
        };
        let args = build_args(&options, &ctx(DownloadMode::Video));

        assert_eq!(
            value_of(&args, "-f"),
            Some(
                "bestvideo[height<=720][vcodec^=avc1]+bestaudio[acodec^=mp4a]/\
                 bestvideo[height<=720][vcodec^=avc1]+bestaudio/\
                 bestvideo[height<=720]+bestaudio[acodec^=mp4a]/\
                 bestvideo[height<=720]+bestaudio/bestvideo+bestaudio/best"
            )
        );
    }

    #[test]
    fn test_video_only() {
        let options = DownloadOptions {
            video_only: true,
            quality: "1440p".to_string(),
            ..DownloadOptions::for_url(URL)
        };
        let args = build_args(&options, &ctx(DownloadMode::Video));
        assert_eq!(
            value_of(&args, "-f"),
            Some("bestvideo[height<=1440]/bestvideo/best")
        );
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn test_audio_formats() {
        let mut options = DownloadOptions {
            audio_only: true,
            audio_format: Some("mp3-192".to_string()),
            ..DownloadOptions::for_url(URL)
        };
        let args = build_args(&options, &ctx(DownloadMode::Audio));
        assert_eq!(value_of(&args, "-f"), Some("bestaudio"));
        assert_eq!(value_of(&args, "--audio-format"), Some("mp3"));
        assert_eq!(value_of(&args, "--audio-quality"), Some("192K"));
        // Embedded thumbnails are only added for video.
        assert!(!args.contains(&"--embed-thumbnail".to_string()));

        options.audio_format = Some("mp3".to_string());
        let args = build_args(&options, &ctx(DownloadMode::Audio));
        assert_eq!(value_of(&args, "--audio-quality"), Some("320K"));

        options.audio_format = Some("alac".to_string());
        let args = build_args(&options, &ctx(DownloadMode::Audio));
        assert_eq!(value_of(&args, "--audio-format"), Some("m4a"));
        assert_eq!(value_of(&args, "--audio-quality"), Some("0"));
        assert!(values_of(&args, "--postprocessor-args").contains(&LOSSLESS_PP_ARGS));

        options.audio_format = Some("wav".to_string());
        let args = build_args(&options, &ctx(DownloadMode::Audio));
        assert_eq!(value_of(&args, "--audio-format"), Some("wav"));
        assert_eq!(value_of(&args, "--audio-quality"), None);

        options.audio_format = None;
        let args = build_args(&options, &ctx(DownloadMode::Audio));
        assert_eq!(value_of(&args, "--audio-format"), None);
        assert!(args.contains(&"--extract-audio".to_string()));
    }

    #[test]
    fn test_thumbnail_only_returns_early() {
        let options = DownloadOptions {
            thumbnail_only: true,
            thumbnail_format: Some("png".to_string()),
            ..DownloadOptions::for_url(URL)
        };
        let args = build_args(&options, &ctx(DownloadMode::Thumbnail));

        assert_eq!(
            &args[2..],
            &[
                "--skip-download",
                "--write-thumbnail",
                "--convert-thumbnails",
                "png",
                URL
            ]
        );
    }

    #[test]
    fn test_subtitles_only() {
        let mut options = DownloadOptions {
            subtitles_only: true,
            subtitle_langs: Some("all".to_string()),
            subtitle_format: Some("srt".to_string()),
            ..DownloadOptions::for_url(URL)
        };
        let args = build_args(&options, &ctx(DownloadMode::Subtitles));
        assert!(args.contains(&"--write-auto-subs".to_string()));
        assert_eq!(value_of(&args, "--sub-langs"), Some(COMMON_SUB_LANGS));
        assert_eq!(value_of(&args, "--convert-subs"), Some("srt"));
        assert!(!args.contains(&"--concurrent-fragments".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(URL));

        options.auto_subs = false;
        options.subtitle_langs = None;
        let args = build_args(&options, &ctx(DownloadMode::Subtitles));
        assert!(!args.contains(&"--write-auto-subs".to_string()));
        assert_eq!(value_of(&args, "--sub-langs"), Some("en"));
    }

    #[test]
    fn test_bilibili_headers() {
        let options = DownloadOptions::for_url("https://www.bilibili.com/video/BV1xx");
        let context = ArgContext::new(
            "/tmp/jobs/abc",
            "https://www.bilibili.com/video/BV1xx",
            DownloadMode::Video,
        );
        let args = build_args(&options, &context);
        assert_eq!(value_of(&args, "--referer"), Some(BILIBILI_REFERER));
        assert_eq!(value_of(&args, "--user-agent"), Some(DESKTOP_USER_AGENT));
        assert!(args.contains(&"--no-check-certificates".to_string()));
    }

    #[test]
    fn test_request_level_options() {
        let options = DownloadOptions {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            user_agent: Some("custom".to_string()),
            no_playlist: true,
            playlist_items: Some("1,3".to_string()),
            subtitles: true,
            sponsor_block: true,
            ..DownloadOptions::for_url(URL)
        };
        let mut context = ctx(DownloadMode::Video);
        context.cookies_file = Some(PathBuf::from("/tmp/jobs/.cookies/abc.txt"));
        let args = build_args(&options, &context);

        assert_eq!(value_of(&args, "--cookies"), Some("/tmp/jobs/.cookies/abc.txt"));
        assert_eq!(value_of(&args, "--proxy"), Some("socks5://127.0.0.1:1080"));
        assert_eq!(value_of(&args, "--user-agent"), Some("custom"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(value_of(&args, "--playlist-items"), Some("1,3"));
        assert_eq!(value_of(&args, "--sub-langs"), Some(EMBEDDED_SUB_LANGS));
        assert!(args.contains(&"--embed-subs".to_string()));
        assert_eq!(value_of(&args, "--sponsorblock-remove"), Some("all"));
    }

    #[test]
    fn test_track_metadata_job() {
        let track = TrackMetadata {
            title: "Time: 100%".to_string(),
            artist: "AC/DC".to_string(),
            album: Some("Album".to_string()),
            duration: Some(215.0),
            artwork: None,
            release_date: Some("1980-07-25".to_string()),
            track_number: Some(3),
        };
        let mut context = ArgContext::new("/tmp/jobs/abc", "ytsearch1:AC/DC - Time: 100%", DownloadMode::Audio);
        context.track = Some(track);
        let options = DownloadOptions {
            audio_only: true,
            ..DownloadOptions::for_url("https://open.spotify.com/track/abc")
        };
        let args = build_args(&options, &context);

        assert_eq!(
            Path::new(&args[1]),
            Path::new("/tmp/jobs/abc").join("AC_DC - Time_ 100%%.%(ext)s")
        );
        let overrides = values_of(&args, "--parse-metadata");
        assert!(overrides.contains(&"Time\\: 100%%:%(meta_title)s"));
        assert!(overrides.contains(&"AC/DC:%(meta_artist)s"));
        assert!(overrides.contains(&"Album:%(meta_album)s"));
        assert!(overrides.contains(&"3:%(meta_track)s"));
        assert!(overrides.contains(&"1980-07-25:%(meta_date)s"));
        assert_eq!(args.last().map(String::as_str), Some("ytsearch1:AC/DC - Time: 100%"));
    }
}
