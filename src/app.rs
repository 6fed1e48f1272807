use eframe::{
    App, Frame,
    egui::{self, ColorImage, TextureHandle, TextureOptions, ViewportCommand},
};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageLevel};
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError, unbounded_channel};
use tokio_util::sync::CancellationToken;

use crate::assets;
use crate::chrome::{self, TitleBarAction};
use crate::config::{self, Settings};
use crate::downloader::{DownloadRequest, ToolPaths, spawn_download};
use crate::format;
use crate::model::{DownloadState, FormatKind, Notice, Outcome, WorkerEvent};
use crate::tray::{Tray, TrayCommand};
use crate::RUNTIME;

const FIELD_WIDTH: f32 = 240.0;

/// The job currently owned by the UI.
struct RunningJob {
    /// Worker events for this job
    events: UnboundedReceiver<WorkerEvent>,
    /// Fired by the Stop button
    cancel: CancellationToken,
}

/// Application state for the GUI
pub struct GrabberApp {
    /// Input field for the video URL
    url_input: String,
    /// Settings, including the save folder and current format/quality
    settings: Settings,
    /// Progress bar, button label and status line
    state: DownloadState,
    /// Present while a download runs
    job: Option<RunningJob>,
    /// Logo shown in the title bar
    logo: Option<TextureHandle>,
    /// Created the first time the window goes to the tray
    tray: Option<Tray>,
    /// True while the window is hidden behind the tray icon
    hidden: bool,
    /// Where settings are written, `None` when the platform has no config dir
    settings_file: Option<std::path::PathBuf>,
    /// Set once `shutdown` has run
    shut_down: bool,
}

impl GrabberApp {
    pub fn new(ctx: &egui::Context, settings: Settings) -> Self {
        let logo = assets::app_icon().map(|icon| {
            let image = ColorImage::from_rgba_unmultiplied(
                [icon.width as usize, icon.height as usize],
                &icon.rgba,
            );
            ctx.load_texture("logo", image, TextureOptions::LINEAR)
        });
        Self {
            url_input: String::new(),
            settings,
            state: DownloadState::default(),
            job: None,
            logo,
            tray: None,
            hidden: false,
            settings_file: config::settings_path(),
            shut_down: false,
        }
    }

    fn save_settings(&self) {
        let Some(path) = &self.settings_file else {
            return;
        };
        if let Err(e) = self.settings.save_to(path) {
            log::warn!("Could not save settings: {e}");
        }
    }

    /// Hides the window and shows the tray icon; the window stays up if the icon cannot be created.
    fn minimize_to_tray(&mut self, ctx: &egui::Context) {
        if self.tray.is_none() {
            let created = match assets::app_icon() {
                Some(icon) => Tray::new(ctx, icon),
                None => Err(crate::error::GrabberError::Tray("the logo asset is missing".to_owned())),
            };
            match created {
                Ok(tray) => self.tray = Some(tray),
                Err(e) => {
                    log::error!("{e}");
                    show_notice(&Notice::Error {
                        title: "Tray Icon Error".to_owned(),
                        body: e.to_string(),
                    });
                    return;
                }
            }
        }
        if let Some(tray) = &self.tray {
            tray.set_visible(true);
        }
        self.hidden = true;
        ctx.send_viewport_cmd(ViewportCommand::Visible(false));
    }

    fn restore_from_tray(&mut self, ctx: &egui::Context) {
        if let Some(tray) = &self.tray {
            tray.set_visible(false);
        }
        self.hidden = false;
        ctx.send_viewport_cmd(ViewportCommand::Visible(true));
        ctx.send_viewport_cmd(ViewportCommand::Focus);
    }

    fn exit_app(&mut self, ctx: &egui::Context) {
        self.shutdown();
        // drops the icon, and on Linux ends its thread
        self.tray = None;
        ctx.send_viewport_cmd(ViewportCommand::Close);
    }

    fn set_format(&mut self, kind: FormatKind) {
        self.settings.format = kind;
        self.settings.quality = format::default_quality(kind).to_owned();
    }

    fn browse_location(&mut self) {
        if let Some(folder) = FileDialog::new()
            .set_directory(&self.settings.save_dir)
            .pick_folder()
        {
            self.settings.save_dir = folder.display().to_string();
        }
    }

    /// Download/Stop button handler.
    fn toggle_download(&mut self) {
        if self.state.is_busy() {
            if let Some(job) = &self.job {
                job.cancel.cancel();
            }
            self.state.request_stop();
            return;
        }

        let request = match DownloadRequest::new(
            &self.url_input,
            &self.settings.save_dir,
            self.settings.format,
            &self.settings.quality,
        ) {
            Ok(request) => request,
            Err(e) => {
                show_notice(&Notice::Error {
                    title: "Error".to_owned(),
                    body: e.to_string(),
                });
                return;
            }
        };

        let Some(runtime) = RUNTIME.get() else {
            log::error!("Tokio runtime is not initialised");
            return;
        };

        self.save_settings();

        let (tx, rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        let tools = ToolPaths {
            ytdlp: self.settings.ytdlp_path.clone(),
            ffmpeg: self.settings.ffmpeg_path.clone(),
        };
        log::info!("Starting download of {}", request.url);
        runtime.spawn(spawn_download(request, tools, tx, cancel.clone()));

        self.job = Some(RunningJob { events: rx, cancel });
        self.state.begin();
    }

    /// Drains worker events; a closed channel without a `Finished` event still ends the job.
    fn poll_worker(&mut self) {
        let Some(job) = &mut self.job else {
            return;
        };
        let mut notices = Vec::new();
        let mut ended = false;
        loop {
            match job.events.try_recv() {
                Ok(event) => {
                    ended |= matches!(event, WorkerEvent::Finished(_));
                    notices.extend(self.state.apply(event));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !ended {
                        notices.extend(self.state.apply(WorkerEvent::Finished(Outcome::Failed(
                            "download task ended unexpectedly".to_owned(),
                        ))));
                    }
                    ended = true;
                    break;
                }
            }
        }
        if ended {
            self.job = None;
        }
        for notice in &notices {
            show_notice(notice);
        }
    }

    /// Stops any running job and saves settings, once; later calls do nothing.
    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(job) = self.job.take() {
            job.cancel.cancel();
        }
        self.save_settings();
    }

    fn form(&mut self, ui: &mut egui::Ui) {
        let busy = self.state.is_busy();
        egui::Grid::new("form")
            .num_columns(3)
            .spacing([8.0, 8.0])
            .show(ui, |ui| {
                ui.strong("Video URL:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.url_input)
                        .desired_width(FIELD_WIDTH + 88.0)
                        .hint_text("https://"),
                );
                ui.end_row();

                ui.strong("Save to:");
                ui.add(egui::TextEdit::singleline(&mut self.settings.save_dir).desired_width(FIELD_WIDTH));
                if chrome::rounded_button(ui, "Browse", egui::vec2(80.0, 25.0), !busy).clicked() {
                    self.browse_location();
                }
                ui.end_row();

                ui.strong("Format:");
                ui.horizontal(|ui| {
                    for kind in [FormatKind::Video, FormatKind::Audio] {
                        let selected = self.settings.format == kind;
                        if ui.add_enabled(!busy, egui::RadioButton::new(selected, kind.label())).clicked()
                            && !selected
                        {
                            self.set_format(kind);
                        }
                    }
                });
                ui.end_row();

                ui.strong("Quality:");
                ui.add_enabled_ui(!busy, |ui| {
                    egui::ComboBox::from_id_source("quality")
                        .width(FIELD_WIDTH)
                        .selected_text(&self.settings.quality)
                        .show_ui(ui, |ui| {
                            for q in format::quality_options(self.settings.format) {
                                ui.selectable_value(&mut self.settings.quality, (*q).to_owned(), *q);
                            }
                        });
                });
                ui.end_row();
            });

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let bar_width = ui.available_width() - 110.0;
            ui.add(
                egui::ProgressBar::new(self.state.progress / 100.0)
                    .desired_width(bar_width)
                    .fill(chrome::ACCENT),
            );
            if chrome::rounded_button(ui, self.state.button_label(), egui::vec2(100.0, 30.0), true).clicked() {
                self.toggle_download();
            }
        });
        ui.label(egui::RichText::new(&self.state.status).small().strong());
    }
}

fn show_notice(notice: &Notice) {
    let (level, title, body) = match notice {
        Notice::Info { title, body } => (MessageLevel::Info, title, body),
        Notice::Error { title, body } => (MessageLevel::Error, title, body),
    };
    MessageDialog::new()
        .set_level(level)
        .set_title(title)
        .set_description(body)
        .set_buttons(MessageButtons::Ok)
        .show();
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for GrabberApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_worker();

        let tray_command = self.tray.as_ref().and_then(Tray::try_command);
        match tray_command {
            Some(TrayCommand::Restore) => self.restore_from_tray(ctx),
            Some(TrayCommand::Exit) => self.exit_app(ctx),
            None => {}
        }

        match chrome::title_bar(ctx, self.logo.as_ref()) {
            Some(TitleBarAction::Minimize) => self.minimize_to_tray(ctx),
            Some(TitleBarAction::Close) => self.exit_app(ctx),
            None => {}
        }
        if ctx.input(|i| i.viewport().close_requested()) {
            self.shutdown();
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(chrome::BACKGROUND).inner_margin(egui::Margin::same(5.0)))
            .show(ctx, |ui| self.form(ui));

        // keep polling the worker while a job runs, and the tray while hidden
        if self.job.is_some() || self.hidden {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_saving_to(path: &std::path::Path) -> GrabberApp {
        let mut app = GrabberApp::new(&egui::Context::default(), Settings::default());
        app.settings_file = Some(path.to_owned());
        app
    }

    #[test]
    fn shutdown_saves_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut app = app_saving_to(&path);

        app.shutdown();
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        app.shutdown();
        assert!(!path.exists());
    }

    #[test]
    fn shutdown_cancels_the_running_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_saving_to(&dir.path().join("settings.toml"));
        let (_tx, rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        app.job = Some(RunningJob {
            events: rx,
            cancel: cancel.clone(),
        });

        app.shutdown();
        assert!(cancel.is_cancelled());
        assert!(app.job.is_none());
    }

    #[test]
    fn switching_format_resets_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_saving_to(&dir.path().join("settings.toml"));
        app.set_format(FormatKind::Audio);
        assert_eq!(app.settings.quality, "320kbps (High Quality)");
        app.set_format(FormatKind::Video);
        assert_eq!(app.settings.quality, "1080p (Full HD)");
    }
}
