//! Quality choices and the yt-dlp format selectors built from them.

use crate::error::{GrabberError, Result};
use crate::model::FormatKind;

pub const VIDEO_QUALITIES: [&str; 8] = [
    "2160p (4K)",
    "1440p (2K)",
    "1080p (Full HD)",
    "720p (HD)",
    "480p",
    "360p",
    "240p",
    "144p",
];

pub const AUDIO_QUALITIES: [&str; 4] = [
    "320kbps (High Quality)",
    "256kbps (Good Quality)",
    "192kbps (Medium Quality)",
    "128kbps (Low Quality)",
];

/// Labels shown in the quality combo box for a format.
pub fn quality_options(kind: FormatKind) -> &'static [&'static str] {
    match kind {
        FormatKind::Video => &VIDEO_QUALITIES,
        FormatKind::Audio => &AUDIO_QUALITIES,
    }
}

/// Preselected label after switching format: Full HD for video, the best bitrate for audio.
pub fn default_quality(kind: FormatKind) -> &'static str {
    match kind {
        FormatKind::Video => VIDEO_QUALITIES[2],
        FormatKind::Audio => AUDIO_QUALITIES[0],
    }
}

/// True when `quality` is one of the labels offered for `kind`.
pub fn is_known_quality(kind: FormatKind, quality: &str) -> bool {
    quality_options(kind).contains(&quality)
}

/// Numeric part of a label: `1080` for "1080p (Full HD)", `320` for "320kbps (High Quality)".
pub fn quality_value(kind: FormatKind, quality: &str) -> Result<u32> {
    let token = quality.split_whitespace().next().unwrap_or_default();
    let number = match kind {
        FormatKind::Video => token.replace('p', ""),
        FormatKind::Audio => token.replace("kbps", ""),
    };
    number
        .parse::<u32>()
        .map_err(|_| GrabberError::InvalidQuality(quality.to_owned()))
}

/// Format selector evaluated by yt-dlp.
pub fn format_selector(kind: FormatKind, quality: &str) -> Result<String> {
    let value = quality_value(kind, quality)?;
    Ok(match kind {
        FormatKind::Video => {
            format!("bestvideo[height<={value}][ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]")
        }
        FormatKind::Audio => format!("bestaudio[abr<={value}][ext=m4a]/bestaudio"),
    })
}

/// Post-processing steps, expressed as yt-dlp flags.
///
/// `--merge-output-format` is only passed for video: audio jobs download a
/// single stream, so there is nothing to merge before the mp3 extraction.
pub fn postprocessor_args(kind: FormatKind, quality: &str) -> Result<Vec<String>> {
    let args = match kind {
        FormatKind::Video => vec![
            "--merge-output-format".to_owned(),
            "mp4".to_owned(),
            "--recode-video".to_owned(),
            "mp4".to_owned(),
        ],
        FormatKind::Audio => {
            let bitrate = quality_value(kind, quality)?;
            vec![
                "--extract-audio".to_owned(),
                "--audio-format".to_owned(),
                "mp3".to_owned(),
                "--audio-quality".to_owned(),
                format!("{bitrate}K"),
            ]
        }
    };
    Ok(args)
}
