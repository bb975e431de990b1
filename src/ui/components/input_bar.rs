/// Draft editor with a Send button; returns true when the user asked to send.
/// The caller owns clearing or restoring the draft.
pub fn render(ui: &mut egui::Ui, draft: &mut String, sending: bool) -> bool {
    let mut send = false;
    ui.horizontal(|ui| {
        let width = (ui.available_width() - 70.0).max(80.0);
        let response = ui.add(
            egui::TextEdit::singleline(draft)
                .hint_text("Type a message…")
                .desired_width(width),
        );
        if ui
            .add_enabled(!sending, egui::Button::new("Send"))
            .clicked()
        {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    send && !draft.trim().is_empty()
}
