//! Machine-readable progress lines printed by yt-dlp.
//!
//! yt-dlp is told to print one line per progress hook call using the templates
//! below. Fields are `|`-separated and the title comes last so that a `|` in a
//! title cannot shift the other columns. Missing fields print as `NA`.

pub const DOWNLOAD_PREFIX: &str = "[grab] ";
pub const POSTPROCESS_PREFIX: &str = "[grab-pp] ";

pub const DOWNLOAD_TEMPLATE: &str = "download:[grab] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(info.playlist_index)s|%(info.playlist_count)s|%(info.title)s";
pub const POSTPROCESS_TEMPLATE: &str =
    "postprocess:[grab-pp] %(progress.status)s|%(progress.postprocessor)s";

const MAX_TITLE_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq)]
pub struct DownloadProgress {
    pub status: String,
    pub downloaded_bytes: Option<f64>,
    pub total_bytes: Option<f64>,
    pub total_bytes_estimate: Option<f64>,
    pub playlist_index: Option<u32>,
    pub playlist_count: Option<u32>,
    pub title: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProgressLine {
    Download(DownloadProgress),
    Postprocess { status: String, postprocessor: String },
}

fn field(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    (!raw.is_empty() && raw != "NA" && raw != "None").then_some(raw)
}

fn number<T: std::str::FromStr>(raw: &str) -> Option<T> {
    field(raw)?.parse().ok()
}

/// Parses one stdout line; anything that is not one of our template lines yields `None`.
pub fn parse_line(line: &str) -> Option<ProgressLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix(DOWNLOAD_PREFIX) {
        let mut parts = rest.splitn(7, '|');
        let status = field(parts.next()?)?.to_owned();
        let downloaded_bytes = number(parts.next()?);
        let total_bytes = number(parts.next()?);
        let total_bytes_estimate = number(parts.next()?);
        let playlist_index = number(parts.next()?);
        let playlist_count = number(parts.next()?);
        let title = parts.next().and_then(field).map(str::to_owned);
        return Some(ProgressLine::Download(DownloadProgress {
            status,
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate,
            playlist_index,
            playlist_count,
            title,
        }));
    }
    if let Some(rest) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let (status, name) = rest.split_once('|')?;
        return Some(ProgressLine::Postprocess {
            status: field(status)?.to_owned(),
            postprocessor: field(name).unwrap_or("ffmpeg").to_owned(),
        });
    }
    None
}

impl DownloadProgress {
    pub fn is_downloading(&self) -> bool {
        self.status == "downloading"
    }

    /// Percentage against the exact size, falling back to the estimate, 0 when neither is known.
    pub fn percent(&self) -> f32 {
        let total = self
            .total_bytes
            .filter(|t| *t > 0.0)
            .or(self.total_bytes_estimate.filter(|t| *t > 0.0));
        match (total, self.downloaded_bytes) {
            (Some(total), Some(done)) => ((done / total) * 100.0).clamp(0.0, 100.0) as f32,
            _ => 0.0,
        }
    }

    /// "Title: 42%" with long titles shortened and a "(2/10)" suffix inside playlists.
    pub fn status_text(&self) -> String {
        let title = self.title.as_deref().unwrap_or("Unknown");
        let mut text = if title.chars().count() > MAX_TITLE_CHARS {
            let short: String = title.chars().take(MAX_TITLE_CHARS).collect();
            format!("{short}...")
        } else {
            title.to_owned()
        };
        text.push_str(&format!(": {:.0}%", self.percent()));
        if let (Some(index), Some(count)) = (self.playlist_index, self.playlist_count) {
            if count > 1 {
                text.push_str(&format!(" ({index}/{count})"));
            }
        }
        text
    }
}
