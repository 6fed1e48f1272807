use std::{fs, io::Write, path::PathBuf};

use eframe::egui::IconData;
use rust_embed::RustEmbed;

/// Files under `assets/`: the logo, and optionally a bundled yt-dlp build.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

const LOGO: &str = "logo.png";

fn ytdlp_file_name() -> &'static str {
    if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" }
}

/// Decoded logo for the window icon.
pub fn app_icon() -> Option<IconData> {
    let data = Asset::get(LOGO)?;
    let img = match image::load_from_memory(&data.data) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            log::error!("Could not load icon from assets/{LOGO}: {e}");
            return None;
        }
    };
    let (width, height) = img.dimensions();
    Some(IconData {
        rgba: img.into_raw(),
        width,
        height,
    })
}

/// Writes the bundled yt-dlp into the temp dir once and returns its path.
/// `Ok(None)` when this build carries no yt-dlp.
pub fn extract_bundled_ytdlp() -> std::io::Result<Option<PathBuf>> {
    let bin = ytdlp_file_name();
    let Some(data) = Asset::get(bin) else {
        return Ok(None);
    };
    let tmp = std::env::temp_dir().join(bin);
    let stale = fs::metadata(&tmp)
        .map(|meta| meta.len() != data.data.len() as u64)
        .unwrap_or(true);
    if stale {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&data.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o755))?;
        }
        log::info!("Extracted bundled yt-dlp to {}", tmp.display());
    }
    Ok(Some(tmp))
}
