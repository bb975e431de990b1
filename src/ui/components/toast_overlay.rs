use crate::ui::toast::{ToastBoard, ToastLevel};

pub fn render(ctx: &egui::Context, board: &mut ToastBoard) {
    let mut dismissed = None;
    egui::Area::new(egui::Id::new("toasts"))
        .anchor(egui::Align2::RIGHT_TOP, [-12.0, 48.0])
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            for (index, toast) in board.visible().enumerate() {
                let color = match toast.level {
                    ToastLevel::Info => egui::Color32::from_rgb(37, 99, 235),
                    ToastLevel::Error => egui::Color32::from_rgb(220, 38, 38),
                };
                let frame = egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_min_width(220.0);
                    ui.colored_label(color, &toast.text);
                });
                if frame.response.interact(egui::Sense::click()).clicked() {
                    dismissed = Some(index);
                }
                ui.add_space(6.0);
            }
        });
    if let Some(index) = dismissed {
        board.dismiss(index);
    }
}
