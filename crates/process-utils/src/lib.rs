//! Helpers for launching the external command-line tools the server wraps.
//!
//! yt-dlp and ffmpeg are always started with piped output, no stdin and no
//! console window, and their exit status is reported in one consistent form.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Environment applied to every wrapped tool.
///
/// yt-dlp is a Python program: without `PYTHONUNBUFFERED` its progress lines
/// are block-buffered when stdout is a pipe and arrive in bursts. `LC_ALL=C`
/// keeps ffmpeg and yt-dlp messages in the English form the parsers expect.
pub const TOOL_ENV: &[(&str, &str)] = &[("PYTHONUNBUFFERED", "1"), ("LC_ALL", "C")];

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Build a command whose stdout and stderr are both captured.
///
/// stdin is closed so a tool that unexpectedly prompts fails fast instead of
/// hanging the job. The child is killed if its handle is dropped. On Unix it
/// leads a new process group, so [`kill_process_tree`] also reaches helpers
/// it starts (aria2c, ffmpeg).
#[cfg(feature = "tokio")]
pub fn piped_command<I, S>(program: impl AsRef<OsStr>, args: I) -> tokio::process::Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .envs(TOOL_ENV.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.no_window();
    cmd
}

/// Kill a child started by [`piped_command`] together with its descendants,
/// then reap it.
///
/// Descendants that inherited the child's pipes would otherwise keep them
/// open after the child itself is gone. Elsewhere than Unix only the child
/// is killed.
#[cfg(feature = "tokio")]
pub async fn kill_process_tree(child: &mut tokio::process::Child) -> std::io::Result<()> {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // ESRCH: the group is already gone.
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }
    child.kill().await
}

/// Human readable description of how a child exited.
///
/// Unix processes terminated by a signal have no exit code; they are reported
/// as `killed by signal N` instead.
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {signal}");
        }
    }

    "unknown exit status".to_string()
}
