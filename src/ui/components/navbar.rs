use crate::identity::IdentityContext;

#[derive(Default)]
pub struct NavbarActions {
    pub go_home: bool,
}

/// `listening` reflects whether the global message notifier is live.
pub fn render(
    ui: &mut egui::Ui,
    identity: &IdentityContext,
    on_chat: bool,
    listening: bool,
) -> NavbarActions {
    let mut actions = NavbarActions::default();
    ui.horizontal(|ui| {
        if on_chat && ui.button("← Alumni").clicked() {
            actions.go_home = true;
        }
        ui.heading("Alumni Connect");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if listening {
                ui.label("🔔").on_hover_text("Message notifications on");
            }
            match identity.identity() {
                Some(identity) => ui.label(format!("Signed in as {}", identity.label())),
                None => ui.colored_label(egui::Color32::GRAY, "Not signed in"),
            };
        });
    });
    actions
}
