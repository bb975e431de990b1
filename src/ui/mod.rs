pub mod app;
pub mod chat;
pub mod components;
pub mod context;
pub mod directory;
pub mod notifier;
pub mod route;
pub mod state;
pub mod toast;

pub use app::AlumniApp;
pub use context::ViewContext;
pub use route::Route;
pub use toast::{ToastBoard, Toaster};
