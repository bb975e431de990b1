use std::time::{Duration, Instant};

use crate::identity::IdentityContext;

use super::chat::ChatView;
use super::components::{alumni_list, chat_area, input_bar, navbar, toast_overlay};
use super::context::ViewContext;
use super::directory::{DirectoryView, filter_alumni};
use super::notifier::Notifier;
use super::route::Route;
use super::state::LoadState;
use super::toast::ToastBoard;

const IDLE_REPAINT: Duration = Duration::from_millis(250);

/// The mounted page; exactly one at a time.
enum Page {
    Directory(DirectoryView),
    Chat(ChatView),
}

pub struct AlumniApp {
    ctx: ViewContext,
    route: Route,
    identity: IdentityContext,
    page: Page,
    notifier: Notifier,
    toasts: ToastBoard,
}

impl AlumniApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        ctx: ViewContext,
        toasts: ToastBoard,
        route: Route,
    ) -> Self {
        let identity = ctx.identity();
        let notifier = Notifier::mount(&ctx, &identity);
        let page = Self::mount_page(&ctx, &route, &identity);
        Self {
            ctx,
            route,
            identity,
            page,
            notifier,
            toasts,
        }
    }

    fn mount_page(ctx: &ViewContext, route: &Route, identity: &IdentityContext) -> Page {
        log::info!("Navigating to {route}");
        match route {
            Route::Directory => Page::Directory(DirectoryView::mount(ctx)),
            Route::Chat(target) => {
                Page::Chat(ChatView::mount(ctx, identity.clone(), target.clone()))
            }
        }
    }

    fn navigate(&mut self, route: Route) {
        if route == self.route {
            return;
        }
        // The old page releases its subscription before the new one opens.
        match &mut self.page {
            Page::Directory(view) => view.unmount(),
            Page::Chat(view) => view.unmount(),
        }
        self.identity = self.ctx.identity();
        self.page = Self::mount_page(&self.ctx, &route, &self.identity);
        self.route = route;
    }

    fn handle_view_events(&mut self) {
        match &mut self.page {
            Page::Directory(view) => {
                view.handle_events();
            }
            Page::Chat(view) => {
                view.handle_events();
            }
        }
        self.toasts.poll(Instant::now());
    }

    fn render_directory(ui: &mut egui::Ui, view: &mut DirectoryView) -> Option<Route> {
        let filtered = match view.alumni.ready() {
            Some(alumni) => filter_alumni(alumni, &view.search),
            None => Vec::new(),
        };
        alumni_list::render(ui, &view.alumni, &mut view.search, &filtered).map(Route::Chat)
    }
}

impl eframe::App for AlumniApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_view_events();

        let mut next_route = None;
        let on_chat = matches!(self.page, Page::Chat(_));

        egui::TopBottomPanel::top("navbar").show(ctx, |ui| {
            let actions =
                navbar::render(ui, &self.identity, on_chat, self.notifier.is_listening());
            if actions.go_home {
                next_route = Some(Route::Directory);
            }
        });

        match &mut self.page {
            Page::Directory(view) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    if let Some(route) = Self::render_directory(ui, view) {
                        next_route = Some(route);
                    }
                });
            }
            Page::Chat(view) => {
                egui::TopBottomPanel::bottom("chat_input").show(ctx, |ui| {
                    ui.add_space(6.0);
                    let sending = view.is_sending();
                    if input_bar::render(ui, &mut view.draft, sending) {
                        view.send();
                    }
                    ui.add_space(6.0);
                });
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading(view.title());
                    ui.separator();
                    if let LoadState::Failed(reason) = &view.history {
                        ui.colored_label(
                            egui::Color32::RED,
                            format!("Could not load conversation: {reason}"),
                        );
                    } else if view.history.is_loading() {
                        ui.spinner();
                    }
                    let scroll = view.take_scroll_request();
                    chat_area::render(ui, view.messages(), view.me().user_id(), scroll);
                });
            }
        }

        toast_overlay::render(ctx, &mut self.toasts);

        if let Some(route) = next_route {
            self.navigate(route);
        }

        let repaint = self
            .toasts
            .next_expiry(Instant::now())
            .map_or(IDLE_REPAINT, |expiry| expiry.min(IDLE_REPAINT));
        ctx.request_repaint_after(repaint);
    }
}
