//! YT Grabber: paste a video URL, pick a quality, and let yt-dlp and ffmpeg do the rest.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// The egui application and its form
mod app;
// Embedded logo and optional bundled yt-dlp
mod assets;
// Theme, title bar and custom buttons
mod chrome;
// Settings persisted between runs
mod config;
// The background download job driving yt-dlp
mod downloader;
// Error type shared by the worker and settings
mod error;
// Quality labels and format selectors
mod format;
// Download state and worker events
mod model;
// Parsing of yt-dlp progress lines
mod progress;
// ffmpeg detection and installation
mod tooling;
// Tray icon shown while the window is hidden
mod tray;

use std::sync::Arc;

use eframe::egui;
use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;

use app::GrabberApp;
use config::Settings;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, then launches the GUI
fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    let _ = RUNTIME.set(rt);

    let settings = Settings::load_or_default();
    log::info!("Saving downloads to {}", settings.save_dir);

    let mut viewport = egui::ViewportBuilder::default()
        .with_title(chrome::TITLE)
        .with_decorations(false)
        .with_inner_size([430.0, 236.0])
        .with_resizable(false)
        .with_position([100.0, 100.0]);
    if let Some(icon) = assets::app_icon() {
        viewport = viewport.with_icon(Arc::new(icon));
    }
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        chrome::TITLE,
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(chrome::visuals());
            Box::new(GrabberApp::new(&cc.egui_ctx, settings))
        }),
    )
}
