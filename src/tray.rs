//! Tray icon with Restore/Exit entries, shown while the window is hidden.
//!
//! On Linux the icon lives on its own GTK thread; everywhere else it is
//! created on the UI thread, which already pumps the platform event loop.

use std::sync::mpsc::{self, Receiver};

use eframe::egui::{self, IconData};
use tray_icon::{
    Icon, TrayIcon, TrayIconBuilder,
    menu::{Menu, MenuEvent, MenuItem},
};

use crate::chrome::TITLE;
use crate::error::{GrabberError, Result};

const RESTORE_ID: &str = "tray-restore";
const EXIT_ID: &str = "tray-exit";

/// A tray menu entry the user picked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrayCommand {
    Restore,
    Exit,
}

/// Maps a menu item id back to its command.
pub fn command_for(id: &str) -> Option<TrayCommand> {
    match id {
        RESTORE_ID => Some(TrayCommand::Restore),
        EXIT_ID => Some(TrayCommand::Exit),
        _ => None,
    }
}

fn build_tray_icon(icon: &IconData) -> Result<TrayIcon> {
    let image = Icon::from_rgba(icon.rgba.clone(), icon.width, icon.height)
        .map_err(|e| GrabberError::Tray(e.to_string()))?;

    let menu = Menu::new();
    let restore = MenuItem::with_id(RESTORE_ID, "Restore", true, None);
    let exit = MenuItem::with_id(EXIT_ID, "Exit", true, None);
    menu.append_items(&[&restore, &exit])
        .map_err(|e| GrabberError::Tray(e.to_string()))?;

    TrayIconBuilder::new()
        .with_menu(Box::new(menu))
        .with_tooltip(TITLE)
        .with_icon(image)
        .build()
        .map_err(|e| GrabberError::Tray(e.to_string()))
}

/// Owns the tray icon and the commands coming back from its menu.
pub struct Tray {
    commands: Receiver<TrayCommand>,
    #[cfg(target_os = "linux")]
    visibility: mpsc::Sender<bool>,
    #[cfg(not(target_os = "linux"))]
    icon: TrayIcon,
}

impl Tray {
    /// Creates the (visible) icon; menu clicks wake the UI so a hidden window still gets polled.
    pub fn new(ctx: &egui::Context, icon: IconData) -> Result<Self> {
        let (tx, commands) = mpsc::channel();
        let ctx = ctx.clone();
        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            if let Some(command) = command_for(&event.id.0) {
                let _ = tx.send(command);
                ctx.request_repaint();
            }
        }));

        #[cfg(target_os = "linux")]
        let tray = Self {
            commands,
            visibility: spawn_gtk_thread(icon)?,
        };
        #[cfg(not(target_os = "linux"))]
        let tray = Self {
            commands,
            icon: build_tray_icon(&icon)?,
        };
        Ok(tray)
    }

    pub fn set_visible(&self, visible: bool) {
        #[cfg(target_os = "linux")]
        let _ = self.visibility.send(visible);
        #[cfg(not(target_os = "linux"))]
        if let Err(e) = self.icon.set_visible(visible) {
            log::warn!("Could not change tray icon visibility: {e}");
        }
    }

    pub fn try_command(&self) -> Option<TrayCommand> {
        self.commands.try_recv().ok()
    }
}

/// Runs GTK on a dedicated thread holding the icon. Dropping the returned sender ends the thread.
#[cfg(target_os = "linux")]
fn spawn_gtk_thread(icon: IconData) -> Result<mpsc::Sender<bool>> {
    use std::time::Duration;

    use gtk::glib::{self, ControlFlow};

    let (visibility_tx, visibility_rx) = mpsc::channel::<bool>();
    let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

    std::thread::Builder::new()
        .name("tray".to_owned())
        .spawn(move || {
            if let Err(e) = gtk::init() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let tray = match build_tray_icon(&icon) {
                Ok(tray) => tray,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            glib::timeout_add_local(Duration::from_millis(100), move || loop {
                match visibility_rx.try_recv() {
                    Ok(visible) => {
                        if let Err(e) = tray.set_visible(visible) {
                            log::warn!("Could not change tray icon visibility: {e}");
                        }
                    }
                    Err(mpsc::TryRecvError::Empty) => return ControlFlow::Continue,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        gtk::main_quit();
                        return ControlFlow::Break;
                    }
                }
            });
            gtk::main();
        })?;

    ready_rx
        .recv()
        .map_err(|_| GrabberError::Tray("tray thread exited early".to_owned()))?
        .map_err(GrabberError::Tray)?;
    Ok(visibility_tx)
}
