use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::UnboundedSender,
};
use tokio_util::sync::CancellationToken;

use crate::assets;
use crate::error::{GrabberError, Result};
use crate::format;
use crate::model::{FormatKind, Outcome, WorkerEvent};
use crate::progress::{self, ProgressLine};
use crate::tooling;

/// One validated download job.
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub save_dir: PathBuf,
    pub kind: FormatKind,
    pub quality: String,
}

impl DownloadRequest {
    pub fn new(url: &str, save_dir: &str, kind: FormatKind, quality: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(GrabberError::EmptyUrl);
        }
        format::quality_value(kind, quality)?;
        Ok(Self {
            url: url.to_owned(),
            save_dir: PathBuf::from(save_dir.trim()),
            kind,
            quality: quality.to_owned(),
        })
    }
}

/// Executable overrides taken from the settings file.
#[derive(Clone, Debug, Default)]
pub struct ToolPaths {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

/// `<save_dir>/%(title)s.%(ext)s`
pub fn output_template(save_dir: &Path) -> String {
    save_dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned()
}

/// Full yt-dlp argument list for a request, URL last.
pub fn build_args(request: &DownloadRequest, ffmpeg: Option<&Path>) -> Result<Vec<String>> {
    let mut args = vec![
        "-f".to_owned(),
        format::format_selector(request.kind, &request.quality)?,
        "-o".to_owned(),
        output_template(&request.save_dir),
    ];
    args.extend(format::postprocessor_args(request.kind, &request.quality)?);

    if let Some(ffmpeg) = ffmpeg {
        args.push("--ffmpeg-location".to_owned());
        args.push(ffmpeg.to_string_lossy().into_owned());
    }

    args.extend([
        "--newline".to_owned(),
        "--no-colors".to_owned(),
        "--progress-template".to_owned(),
        progress::DOWNLOAD_TEMPLATE.to_owned(),
        "--progress-template".to_owned(),
        progress::POSTPROCESS_TEMPLATE.to_owned(),
        "--".to_owned(),
        request.url.clone(),
    ]);
    Ok(args)
}

/// Configured path, then the bundled copy, then PATH.
pub fn locate_ytdlp(configured: Option<&Path>) -> Result<PathBuf> {
    locate_ytdlp_in(configured, std::env::var_os("PATH"))
}

/// Same lookup order as [`locate_ytdlp`], searching `search_path` instead of `PATH`.
pub fn locate_ytdlp_in(
    configured: Option<&Path>,
    search_path: Option<OsString>,
) -> Result<PathBuf> {
    if let Some(path) = configured {
        return Ok(path.to_owned());
    }
    match assets::extract_bundled_ytdlp() {
        Ok(Some(path)) => return Ok(path),
        Ok(None) => {}
        Err(e) => log::warn!("Could not extract bundled yt-dlp: {e}"),
    }
    let cwd = std::env::current_dir()?;
    which::which_in("yt-dlp", search_path, cwd).map_err(|_| GrabberError::YtDlpNotFound)
}

/// Human-readable reason from yt-dlp's stderr.
pub fn error_message(stderr: &str, code: Option<i32>) -> String {
    let lines = || stderr.lines().map(str::trim).filter(|l| !l.is_empty());
    if let Some(error) = lines().filter_map(|l| l.strip_prefix("ERROR:")).last() {
        return error.trim().to_owned();
    }
    if let Some(last) = lines().last() {
        return last.to_owned();
    }
    match code {
        Some(code) => format!("yt-dlp exited with code {code}"),
        None => "yt-dlp was terminated".to_owned(),
    }
}

fn relay_line(line: &str, events: &UnboundedSender<WorkerEvent>) {
    log::trace!("yt-dlp> {line}");
    let event = match progress::parse_line(line) {
        Some(ProgressLine::Download(p)) if p.is_downloading() => WorkerEvent::Progress {
            percent: p.percent(),
            text: p.status_text(),
        },
        Some(ProgressLine::Postprocess {
            status,
            postprocessor,
        }) if status == "started" => WorkerEvent::Postprocessing(postprocessor),
        _ => return,
    };
    let _ = events.send(event);
}

/// Runs one job to completion and always finishes with a `Finished` event.
pub async fn spawn_download(
    request: DownloadRequest,
    tools: ToolPaths,
    events: UnboundedSender<WorkerEvent>,
    cancel: CancellationToken,
) {
    let outcome = match run(&request, &tools, &events, &cancel).await {
        Ok(()) => {
            log::info!("Finished {}", request.url);
            Outcome::Completed
        }
        Err(GrabberError::Stopped) => {
            log::info!("Stopped {}", request.url);
            Outcome::Stopped
        }
        Err(e) => {
            log::error!("Download of {} failed: {e}", request.url);
            Outcome::Failed(e.to_string())
        }
    };
    let _ = events.send(WorkerEvent::Finished(outcome));
}

async fn run(
    request: &DownloadRequest,
    tools: &ToolPaths,
    events: &UnboundedSender<WorkerEvent>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ffmpeg = tokio::select! {
        found = tooling::ensure_ffmpeg(tools.ffmpeg.as_deref(), events) => found?,
        _ = cancel.cancelled() => return Err(GrabberError::Stopped),
    };
    let ytdlp = locate_ytdlp(tools.ytdlp.as_deref())?;

    tokio::fs::create_dir_all(&request.save_dir)
        .await
        .map_err(|source| GrabberError::Path {
            path: request.save_dir.clone(),
            source,
        })?;

    let args = build_args(request, Some(ffmpeg.as_path()))?;
    log::debug!("Spawning {} {:?}", ytdlp.display(), args);

    let mut cmd = tooling::command(&ytdlp);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // own group, so a stop also reaches the ffmpeg it spawns
    #[cfg(unix)]
    cmd.process_group(0);
    let mut child = cmd
        .spawn()
        .map_err(|source| GrabberError::Path {
            path: ytdlp.clone(),
            source,
        })?;

    let (Some(out), Some(err)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(GrabberError::Process(
            "yt-dlp output pipes were not available".to_owned(),
        ));
    };

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let mut lines = BufReader::new(err).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log::trace!("yt-dlp! {line}");
            buf.push_str(&line);
            buf.push('\n');
        }
        buf
    });

    let mut lines = BufReader::new(out).lines();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tooling::kill_tree(&mut child).await;
                stderr_task.abort();
                return Err(GrabberError::Stopped);
            }
            line = lines.next_line() => match line? {
                Some(line) => relay_line(&line, events),
                None => break,
            },
        }
    }

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            tooling::kill_tree(&mut child).await;
            stderr_task.abort();
            return Err(GrabberError::Stopped);
        }
    };
    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(GrabberError::Process(error_message(&stderr, status.code())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: FormatKind, quality: &str) -> DownloadRequest {
        DownloadRequest::new("https://example.com/watch?v=abc", "/tmp/out", kind, quality).unwrap()
    }

    #[test]
    fn blank_url_is_rejected() {
        assert!(matches!(
            DownloadRequest::new("   ", "/tmp", FormatKind::Video, "720p (HD)"),
            Err(GrabberError::EmptyUrl)
        ));
    }

    #[test]
    fn url_is_trimmed() {
        let req = DownloadRequest::new("  https://x.test/v  ", "/tmp", FormatKind::Audio, "128kbps (Low Quality)")
            .unwrap();
        assert_eq!(req.url, "https://x.test/v");
    }

    #[test]
    fn video_args() {
        let args = build_args(&request(FormatKind::Video, "1080p (Full HD)"), None).unwrap();
        assert_eq!(args[0], "-f");
        assert_eq!(
            args[1],
            "bestvideo[height<=1080][ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]"
        );
        assert_eq!(args[2], "-o");
        assert!(args[3].ends_with("%(title)s.%(ext)s"));
        assert!(args.iter().any(|a| a == "--recode-video"));
        assert!(!args.iter().any(|a| a == "--ffmpeg-location"));
        assert_eq!(args.last().unwrap(), "https://example.com/watch?v=abc");
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn audio_args_with_ffmpeg_location() {
        let args = build_args(
            &request(FormatKind::Audio, "320kbps (High Quality)"),
            Some(Path::new("/usr/bin/ffmpeg")),
        )
        .unwrap();
        assert_eq!(args[1], "bestaudio[abr<=320][ext=m4a]/bestaudio");
        assert!(args.windows(2).any(|w| w == ["--audio-quality", "320K"]));
        assert!(args.windows(2).any(|w| w == ["--ffmpeg-location", "/usr/bin/ffmpeg"]));
        assert_eq!(args.iter().filter(|a| *a == "--progress-template").count(), 2);
    }

    #[test]
    fn error_message_prefers_error_lines() {
        let stderr = "WARNING: something\nERROR: [generic] Unsupported URL: x\n\n";
        assert_eq!(error_message(stderr, Some(1)), "[generic] Unsupported URL: x");
        assert_eq!(error_message("boom\n", Some(2)), "boom");
        assert_eq!(error_message("", Some(2)), "yt-dlp exited with code 2");
    }

    #[test]
    fn only_downloading_lines_become_progress() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        relay_line("[grab] finished|10|10|NA|NA|NA|Clip", &tx);
        relay_line("[download] Destination: Clip.mp4", &tx);
        relay_line("[grab] downloading|5|10|NA|NA|NA|Clip", &tx);
        relay_line("[grab-pp] finished|Merger", &tx);
        relay_line("[grab-pp] started|Merger", &tx);
        assert_eq!(
            rx.try_recv().unwrap(),
            WorkerEvent::Progress {
                percent: 50.0,
                text: "Clip: 50%".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), WorkerEvent::Postprocessing("Merger".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn configured_ytdlp_wins() {
        let configured = PathBuf::from("/opt/yt-dlp/yt-dlp");
        let empty = tempfile::tempdir().unwrap();
        assert_eq!(
            locate_ytdlp_in(Some(&configured), Some(empty.path().into())).unwrap(),
            configured
        );
    }

    #[test]
    fn ytdlp_missing_from_search_path() {
        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            locate_ytdlp_in(None, Some(empty.path().into())),
            Err(GrabberError::YtDlpNotFound)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn ytdlp_found_on_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("yt-dlp");
        std::fs::write(&bin, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(locate_ytdlp_in(None, Some(dir.path().into())).unwrap(), bin);
    }

    #[cfg(unix)]
    mod fake_ytdlp {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

        fn executable(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn script(dir: &Path, body: &str) -> PathBuf {
            executable(dir, "yt-dlp", body)
        }

        fn tools(ytdlp: PathBuf) -> ToolPaths {
            ToolPaths {
                ytdlp: Some(ytdlp),
                ffmpeg: Some(which::which("true").unwrap()),
            }
        }

        fn cancel_after(cancel: &CancellationToken, millis: u64) {
            let stopper = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
                stopper.cancel();
            });
        }

        async fn drain(mut rx: UnboundedReceiver<WorkerEvent>) -> Vec<WorkerEvent> {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv().await {
                seen.push(event);
            }
            seen
        }

        fn req(dir: &Path) -> DownloadRequest {
            DownloadRequest::new(
                "https://example.com/v",
                &dir.join("out").display().to_string(),
                FormatKind::Video,
                "720p (HD)",
            )
            .unwrap()
        }

        #[tokio::test]
        async fn relays_progress_and_completes() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(
                dir.path(),
                "echo '[grab] downloading|50|100|NA|NA|NA|Clip'\necho '[grab-pp] started|VideoConvertor'",
            );
            let (tx, rx) = unbounded_channel();
            spawn_download(req(dir.path()), tools(bin), tx, CancellationToken::new()).await;

            let events = drain(rx).await;
            assert_eq!(
                events,
                vec![
                    WorkerEvent::Progress {
                        percent: 50.0,
                        text: "Clip: 50%".into()
                    },
                    WorkerEvent::Postprocessing("VideoConvertor".into()),
                    WorkerEvent::Finished(Outcome::Completed),
                ]
            );
            assert!(dir.path().join("out").is_dir());
        }

        #[tokio::test]
        async fn failure_reports_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo 'ERROR: Unsupported URL' >&2\nexit 1");
            let (tx, rx) = unbounded_channel();
            spawn_download(req(dir.path()), tools(bin), tx, CancellationToken::new()).await;

            assert_eq!(
                drain(rx).await,
                vec![WorkerEvent::Finished(Outcome::Failed("Unsupported URL".into()))]
            );
        }

        #[tokio::test]
        async fn cancel_kills_the_child() {
            let dir = tempfile::tempdir().unwrap();
            let bin = script(dir.path(), "echo '[grab] downloading|1|100|NA|NA|NA|Slow'\nsleep 30");
            let (tx, rx) = unbounded_channel();
            let cancel = CancellationToken::new();
            cancel_after(&cancel, 200);

            let started = std::time::Instant::now();
            spawn_download(req(dir.path()), tools(bin), tx, cancel).await;
            assert!(started.elapsed() < std::time::Duration::from_secs(10));

            let events = drain(rx).await;
            assert_eq!(events.last(), Some(&WorkerEvent::Finished(Outcome::Stopped)));
        }

        #[tokio::test]
        async fn cancel_during_ffmpeg_check_never_starts_ytdlp() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("ytdlp-started");
            let bin = script(dir.path(), &format!("touch '{}'", marker.display()));
            let ffmpeg = executable(dir.path(), "ffmpeg", "exec sleep 30");
            let tools = ToolPaths {
                ytdlp: Some(bin),
                ffmpeg: Some(ffmpeg),
            };
            let (tx, rx) = unbounded_channel();
            let cancel = CancellationToken::new();
            cancel_after(&cancel, 200);

            let started = std::time::Instant::now();
            spawn_download(req(dir.path()), tools, tx, cancel).await;
            assert!(started.elapsed() < std::time::Duration::from_secs(10));

            assert_eq!(drain(rx).await, vec![WorkerEvent::Finished(Outcome::Stopped)]);
            assert!(!marker.exists());
            assert!(!dir.path().join("out").exists());
        }

        /// True while `/proc/<pid>` exists and is not a zombie.
        #[cfg(target_os = "linux")]
        fn running(pid: &str) -> bool {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Ok(stat) => {
                    let state = stat.rsplit(')').next().and_then(|rest| rest.split_whitespace().next());
                    state != Some("Z")
                }
                Err(_) => false,
            }
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        async fn cancel_kills_processes_started_by_ytdlp() {
            let dir = tempfile::tempdir().unwrap();
            let pid_file = dir.path().join("grandchild.pid");
            let bin = script(
                dir.path(),
                &format!(
                    "sleep 30 &\necho $! > '{}'\necho '[grab] downloading|1|100|NA|NA|NA|Slow'\nwait",
                    pid_file.display()
                ),
            );
            let (tx, mut rx) = unbounded_channel();
            let cancel = CancellationToken::new();
            let job = tokio::spawn(spawn_download(req(dir.path()), tools(bin), tx, cancel.clone()));

            // the pid file is written before the progress line
            assert!(matches!(rx.recv().await, Some(WorkerEvent::Progress { .. })));
            let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_owned();
            assert!(running(&pid));

            cancel.cancel();
            job.await.unwrap();
            assert_eq!(drain(rx).await, vec![WorkerEvent::Finished(Outcome::Stopped)]);

            let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
            while running(&pid) && std::time::Instant::now() < deadline {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
            assert!(!running(&pid), "sleep {pid} outlived the stopped job");
        }
    }
}
