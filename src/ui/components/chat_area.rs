use crate::common::{ChatMessage, RecordId};

const OWN_BUBBLE: egui::Color32 = egui::Color32::from_rgb(124, 58, 237);
const OTHER_BUBBLE: egui::Color32 = egui::Color32::from_rgb(243, 240, 255);

pub fn render(
    ui: &mut egui::Ui,
    messages: &[ChatMessage],
    me: Option<&RecordId>,
    scroll_to_bottom: bool,
) {
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for message in messages {
                let own = Some(&message.sender_id) == me;
                let layout = if own {
                    egui::Layout::right_to_left(egui::Align::TOP)
                } else {
                    egui::Layout::left_to_right(egui::Align::TOP)
                };
                ui.with_layout(layout, |ui| {
                    let (fill, text_color) = if own {
                        (OWN_BUBBLE, egui::Color32::WHITE)
                    } else {
                        (OTHER_BUBBLE, egui::Color32::DARK_GRAY)
                    };
                    egui::Frame::new()
                        .fill(fill)
                        .corner_radius(8.0)
                        .inner_margin(egui::Margin::symmetric(10, 6))
                        .show(ui, |ui| {
                            ui.set_max_width(320.0);
                            ui.colored_label(text_color, &message.content);
                            if let Some(sent_at) = message.sent_at() {
                                ui.label(
                                    egui::RichText::new(sent_at.format("%H:%M").to_string())
                                        .small()
                                        .color(text_color),
                                );
                            }
                        });
                });
                ui.add_space(4.0);
            }

            if scroll_to_bottom {
                ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
            }
        });
}
