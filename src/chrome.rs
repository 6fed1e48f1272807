//! Dark theme, custom title bar and the rounded accent button.

use eframe::egui::{
    self, Align, Align2, Color32, CursorIcon, FontId, Layout, Rounding, Sense, Stroke, TextureHandle,
    ViewportCommand, Visuals,
};

pub const BACKGROUND: Color32 = Color32::from_rgb(0x2C, 0x2C, 0x2C);
pub const FIELD: Color32 = Color32::from_rgb(0x3D, 0x3D, 0x3D);
pub const BORDER: Color32 = Color32::from_rgb(0x44, 0x44, 0x44);
pub const ACCENT: Color32 = Color32::from_rgb(0xE3, 0x19, 0x37);
pub const ACCENT_HOVER: Color32 = Color32::from_rgb(0xB8, 0x15, 0x2C);

pub const TITLE: &str = "YT Grabber";
const TITLE_BAR_HEIGHT: f32 = 26.0;

pub fn visuals() -> Visuals {
    let mut visuals = Visuals::dark();
    visuals.override_text_color = Some(Color32::WHITE);
    visuals.panel_fill = BACKGROUND;
    visuals.window_fill = BACKGROUND;
    visuals.extreme_bg_color = FIELD;
    visuals.selection.bg_fill = ACCENT;
    visuals.selection.stroke = Stroke::new(1.0, Color32::WHITE);
    for widget in [
        &mut visuals.widgets.inactive,
        &mut visuals.widgets.hovered,
        &mut visuals.widgets.active,
        &mut visuals.widgets.open,
    ] {
        widget.bg_fill = BACKGROUND;
        widget.weak_bg_fill = BACKGROUND;
        widget.bg_stroke = Stroke::new(1.0, BORDER);
    }
    visuals.widgets.hovered.weak_bg_fill = BORDER;
    visuals
}

/// What the user clicked in the title bar this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TitleBarAction {
    Minimize,
    Close,
}

/// Draws the title bar; dragging anywhere on it moves the window.
pub fn title_bar(ctx: &egui::Context, logo: Option<&TextureHandle>) -> Option<TitleBarAction> {
    let mut action = None;
    egui::TopBottomPanel::top("title_bar")
        .exact_height(TITLE_BAR_HEIGHT)
        .frame(egui::Frame::none().fill(BACKGROUND).inner_margin(egui::Margin::symmetric(5.0, 0.0)))
        .show(ctx, |ui| {
            let drag_area = ui.interact(ui.max_rect(), egui::Id::new("title_bar_drag"), Sense::click_and_drag());
            if drag_area.is_pointer_button_down_on() {
                ctx.send_viewport_cmd(ViewportCommand::StartDrag);
            }

            ui.with_layout(Layout::left_to_right(Align::Center), |ui| {
                if let Some(logo) = logo {
                    ui.add(egui::Image::new(logo).fit_to_exact_size(egui::vec2(18.0, 18.0)));
                }
                ui.label(egui::RichText::new(TITLE).strong().size(13.0));

                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    if chrome_button(ui, "X", ACCENT_HOVER).clicked() {
                        action = Some(TitleBarAction::Close);
                    }
                    if chrome_button(ui, "─", BORDER).clicked() {
                        action = Some(TitleBarAction::Minimize);
                    }
                });
            });
        });
    action
}

fn chrome_button(ui: &mut egui::Ui, text: &str, hover: Color32) -> egui::Response {
    let (rect, response) = ui.allocate_exact_size(egui::vec2(22.0, 20.0), Sense::click());
    if response.hovered() {
        ui.painter().rect_filled(rect, Rounding::same(3.0), hover);
    }
    ui.painter().text(
        rect.center(),
        Align2::CENTER_CENTER,
        text,
        FontId::proportional(13.0),
        Color32::WHITE,
    );
    response
}

/// Accent-filled button with rounded corners that darkens on hover.
pub fn rounded_button(ui: &mut egui::Ui, text: &str, size: egui::Vec2, enabled: bool) -> egui::Response {
    let sense = if enabled { Sense::click() } else { Sense::hover() };
    let (rect, response) = ui.allocate_exact_size(size, sense);
    let fill = match (enabled, response.hovered()) {
        (false, _) => BORDER,
        (true, true) => ACCENT_HOVER,
        (true, false) => ACCENT,
    };
    ui.painter().rect_filled(rect, Rounding::same(size.y.min(20.0) / 2.0), fill);
    ui.painter().text(
        rect.center(),
        Align2::CENTER_CENTER,
        text,
        FontId::proportional(12.0),
        Color32::WHITE,
    );
    if enabled {
        response.on_hover_cursor(CursorIcon::PointingHand)
    } else {
        response
    }
}
