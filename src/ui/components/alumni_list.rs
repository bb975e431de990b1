use crate::common::{RecordId, UserProfile};
use crate::ui::state::LoadState;

/// Search box plus alumni cards; returns the id of a clicked card.
pub fn render(
    ui: &mut egui::Ui,
    alumni: &LoadState<Vec<UserProfile>>,
    search: &mut String,
    filtered: &[&UserProfile],
) -> Option<RecordId> {
    let mut selected = None;

    ui.vertical_centered(|ui| ui.heading("Connect with Alumni"));
    ui.add_space(8.0);
    ui.add(
        egui::TextEdit::singleline(search)
            .hint_text("Search by name or username...")
            .desired_width(f32::INFINITY),
    );
    ui.add_space(8.0);

    match alumni {
        LoadState::Loading => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading alumni...");
            });
        }
        LoadState::Failed(reason) => {
            ui.colored_label(egui::Color32::RED, format!("Could not load alumni: {reason}"));
        }
        LoadState::Ready(all) if all.is_empty() => {
            ui.label("No alumni yet");
        }
        LoadState::Ready(_) if filtered.is_empty() => {
            ui.label("No alumni match your search");
        }
        LoadState::Ready(_) => {
            egui::ScrollArea::vertical().show(ui, |ui| {
                for alum in filtered {
                    let card = egui::Frame::group(ui.style())
                        .inner_margin(egui::Margin::same(10))
                        .show(ui, |ui| {
                            ui.set_width(ui.available_width());
                            ui.horizontal(|ui| {
                                ui.strong(&alum.full_name);
                                if let Some(username) = &alum.username {
                                    ui.label(egui::RichText::new(format!("(@{username})")).weak());
                                }
                            });
                            ui.label(profile_subtitle(alum));
                        });
                    let response = card.response.interact(egui::Sense::click());
                    if response.on_hover_cursor(egui::CursorIcon::PointingHand).clicked() {
                        selected = Some(alum.id.clone());
                    }
                    ui.add_space(4.0);
                }
            });
        }
    }

    selected
}

fn profile_subtitle(alum: &UserProfile) -> String {
    let department = alum.department.as_deref().unwrap_or("Unknown department");
    match alum.graduation_year {
        Some(year) => format!("{department} · Class of {year}"),
        None => department.to_string(),
    }
}
