//! Detection and installation of the external ffmpeg binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{GrabberError, Result};
use crate::model::WorkerEvent;

const INSTALL_FAILED_STATUS: &str = "FFmpeg installation failed, checking again...";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A `Command` that does not flash a console window on Windows.
pub fn command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd.kill_on_drop(true);
    cmd
}

/// Runs `<ffmpeg> -version` and reports whether it exited cleanly.
pub async fn ffmpeg_available(ffmpeg: &Path) -> bool {
    command(ffmpeg)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Candidate ffmpeg executable: the configured one, then PATH.
pub fn locate_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_owned());
    }
    if let Ok(path) = which::which("ffmpeg") {
        return Some(path);
    }
    // winget drops its shims here, and our own PATH predates the install
    #[cfg(windows)]
    if let Some(links) = dirs::data_local_dir().map(|d| d.join("Microsoft/WinGet/Links/ffmpeg.exe")) {
        if links.exists() {
            return Some(links);
        }
    }
    None
}

async fn working_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    let path = locate_ffmpeg(configured)?;
    ffmpeg_available(&path).await.then_some(path)
}

/// Installs ffmpeg through the platform package manager.
#[cfg(windows)]
pub async fn install_ffmpeg() -> Result<()> {
    log::info!("Installing FFmpeg with winget");
    let output = command("winget")
        .args([
            "install",
            "-e",
            "--id=Gyan.FFmpeg",
            "--accept-source-agreements",
            "--accept-package-agreements",
        ])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| GrabberError::FfmpegInstall(e.to_string()))?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = [stderr.trim(), stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("winget exited with an error")
            .to_owned();
        Err(GrabberError::FfmpegInstall(detail))
    }
}

#[cfg(not(windows))]
pub async fn install_ffmpeg() -> Result<()> {
    Err(GrabberError::FfmpegInstall(
        "no supported package manager on this platform; install ffmpeg with your system package manager"
            .to_owned(),
    ))
}

/// Makes sure a working ffmpeg exists, installing it if needed.
pub async fn ensure_ffmpeg(
    configured: Option<&Path>,
    events: &UnboundedSender<WorkerEvent>,
) -> Result<PathBuf> {
    if let Some(path) = working_ffmpeg(configured).await {
        log::debug!("Using ffmpeg at {}", path.display());
        return Ok(path);
    }

    log::warn!("ffmpeg not found, trying to install it");
    let _ = events.send(WorkerEvent::Status(
        "Attempting to install FFmpeg...".to_owned(),
    ));
    if let Err(e) = install_ffmpeg().await {
        // a failed installer can still leave a usable ffmpeg behind
        log::warn!("{e}");
        let _ = events.send(WorkerEvent::Status(INSTALL_FAILED_STATUS.to_owned()));
    }

    working_ffmpeg(configured).await.ok_or(GrabberError::FfmpegMissing)
}

/// Kills `child` and everything it started, such as the ffmpeg yt-dlp runs for merging.
///
/// On unix the child must have been spawned as its own process group leader.
pub async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            log::debug!("killpg({pid}) failed: {e}");
        }
    }
    #[cfg(windows)]
    if let Some(pid) = child.id() {
        let pid = pid.to_string();
        let killed = command("taskkill")
            .args(["/T", "/F", "/PID", pid.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = killed {
            log::debug!("taskkill for {pid} failed: {e}");
        }
    }
    let _ = child.kill().await;
}
