use std::path::PathBuf;

use thiserror::Error;

/// Everything that can end a download or a settings load.
#[derive(Error, Debug)]
pub enum GrabberError {
    #[error("Please enter a valid URL")]
    EmptyUrl,

    #[error("unrecognised quality option: {0:?}")]
    InvalidQuality(String),

    #[error("yt-dlp was not found; install it or set `ytdlp_path` in the settings file")]
    YtDlpNotFound,

    #[error(
        "FFmpeg is not installed and could not be installed automatically.\nPlease install FFmpeg manually and try again."
    )]
    FfmpegMissing,

    #[error("Automatic installation of FFmpeg failed.\nError: {0}\n\nPlease install FFmpeg manually.")]
    FfmpegInstall(String),

    #[error("{0}")]
    Process(String),

    #[error("Could not show the tray icon: {0}")]
    Tray(String),

    #[error("Download stopped by user")]
    Stopped,

    #[error("I/O error on {}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not read settings: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("could not write settings: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, GrabberError>;
