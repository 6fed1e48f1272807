use serde::{Deserialize, Serialize};

/// What the user asked to keep from the remote media.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Video with audio, delivered as MP4
    #[default]
    Video,
    /// Audio track only, delivered as MP3
    Audio,
}

impl FormatKind {
    pub fn label(self) -> &'static str {
        match self {
            FormatKind::Video => "Video (MP4)",
            FormatKind::Audio => "Audio (MP3)",
        }
    }
}

/// Where the single download job currently is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadPhase {
    /// No job running
    #[default]
    Idle,
    /// Job spawned, checking tools and waiting for the first progress line
    Preparing,
    /// Bytes are arriving
    Downloading,
    /// ffmpeg is converting or extracting
    Postprocessing,
    /// Stop was requested and the job has not ended yet
    Stopping,
}

/// How a job ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Completed,
    Stopped,
    Failed(String),
}

/// Messages sent from the worker task to the UI thread.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    /// Free-form status line, e.g. while installing ffmpeg
    Status(String),
    /// Download progress: percentage (0..=100) and the line shown under the bar
    Progress { percent: f32, text: String },
    /// A post-processor started (name as reported by yt-dlp)
    Postprocessing(String),
    /// Terminal event, always the last one for a job
    Finished(Outcome),
}

/// A modal message the UI should pop up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Info { title: String, body: String },
    Error { title: String, body: String },
}

/// UI-facing state of the download row: progress bar, button and status line.
#[derive(Debug)]
pub struct DownloadState {
    /// Current phase of the job, `Idle` when none runs
    pub phase: DownloadPhase,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Text under the progress bar
    pub status: String,
}

impl Default for DownloadState {
    fn default() -> Self {
        Self {
            phase: DownloadPhase::Idle,
            progress: 0.0,
            status: "Ready".to_owned(),
        }
    }
}

impl DownloadState {
    pub fn is_busy(&self) -> bool {
        self.phase != DownloadPhase::Idle
    }

    /// The Download button turns into Stop while a job runs.
    pub fn button_label(&self) -> &'static str {
        if self.is_busy() { "Stop" } else { "Download" }
    }

    pub fn begin(&mut self) {
        self.phase = DownloadPhase::Preparing;
        self.progress = 0.0;
        self.status = "Hold tight! Your download is getting ready...".to_owned();
    }

    /// Returns false when there is nothing to stop.
    pub fn request_stop(&mut self) -> bool {
        if !self.is_busy() {
            return false;
        }
        self.phase = DownloadPhase::Stopping;
        self.status = "Stopping download...".to_owned();
        true
    }

    /// Folds one worker event into the state, returning a notice for terminal outcomes that need one.
    pub fn apply(&mut self, event: WorkerEvent) -> Option<Notice> {
        match event {
            WorkerEvent::Finished(outcome) => return self.finish(outcome),
            // once stop is requested the job only reports its end
            _ if self.phase == DownloadPhase::Stopping => {}
            _ if self.phase == DownloadPhase::Idle => {}
            WorkerEvent::Status(text) => self.status = text,
            WorkerEvent::Progress { percent, text } => {
                self.phase = DownloadPhase::Downloading;
                self.progress = percent.clamp(0.0, 100.0);
                self.status = text;
            }
            WorkerEvent::Postprocessing(name) => {
                self.phase = DownloadPhase::Postprocessing;
                self.progress = 100.0;
                self.status = format!("Processing ({name})...");
            }
        }
        None
    }

    fn finish(&mut self, outcome: Outcome) -> Option<Notice> {
        self.phase = DownloadPhase::Idle;
        self.progress = 0.0;
        match outcome {
            Outcome::Completed => {
                self.status = "Download completed!".to_owned();
                Some(Notice::Info {
                    title: "Success".to_owned(),
                    body: "Download completed successfully!".to_owned(),
                })
            }
            Outcome::Stopped => {
                self.status = "Download stopped!".to_owned();
                None
            }
            Outcome::Failed(reason) => {
                self.status = "Download failed!".to_owned();
                Some(Notice::Error {
                    title: "Error".to_owned(),
                    body: format!("Download failed: {reason}"),
                })
            }
        }
    }
}
