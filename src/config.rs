use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GrabberError, Result};
use crate::format;
use crate::model::FormatKind;

const APP_DIR: &str = "yt-grabber";
const SETTINGS_FILE: &str = "settings.toml";

/// User settings remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Folder downloads are written into
    pub save_dir: String,
    /// Last selected format
    pub format: FormatKind,
    /// Last selected quality label, must belong to `format`
    pub quality: String,
    /// Explicit yt-dlp executable, skips the embedded copy and PATH lookup
    pub ytdlp_path: Option<PathBuf>,
    /// Explicit ffmpeg executable, skips the PATH lookup
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir().display().to_string(),
            format: FormatKind::Video,
            quality: format::default_quality(FormatKind::Video).to_owned(),
            ytdlp_path: None,
            ffmpeg_path: None,
        }
    }
}

/// `~/Downloads`, or the platform download folder when the home dir is unknown.
pub fn default_save_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Downloads"))
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Location of the settings file, if the platform has a config dir.
pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
}

impl Settings {
    /// Loads from the default location; any problem falls back to defaults.
    pub fn load_or_default() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring settings at {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// A missing file is not an error, it just yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(GrabberError::Path {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        let mut settings: Settings = toml::from_str(&text)?;
        settings.normalize();
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GrabberError::Path {
                path: parent.to_owned(),
                source,
            })?;
        }
        let text = toml::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| GrabberError::Path {
            path: path.to_owned(),
            source,
        })?;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Repairs values a hand-edited file may get wrong.
    fn normalize(&mut self) {
        if !format::is_known_quality(self.format, &self.quality) {
            self.quality = format::default_quality(self.format).to_owned();
        }
        if self.save_dir.trim().is_empty() {
            self.save_dir = default_save_dir().display().to_string();
        }
    }
}
