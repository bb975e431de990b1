mod backend;
mod common;
mod config;
mod identity;
mod storage;
mod ui;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;

use backend::{DataStore, InMemoryStore, RestStore};
use common::RecordId;
use config::AppConfig;
use identity::IdentityContext;
use storage::LocalStorage;
use ui::{AlumniApp, Route, ToastBoard, Toaster, ViewContext};

#[derive(Parser)]
#[command(
    name = "alumni_connect",
    version,
    about = "Alumni directory and one-to-one chat"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Use a local demo store instead of the hosted backend
    #[arg(long)]
    offline: bool,
    /// Page to open first, e.g. `/chat/2`
    #[arg(long, default_value = "/", value_name = "PATH")]
    route: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
enum Command {
    /// Cache a user profile as the signed-in identity
    Login {
        /// Id of the user to sign in as
        user_id: String,
    },
    /// Forget the cached identity
    Logout,
    /// Print the cached identity
    Whoami,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::load_config(&cli.config);
    let local_storage = LocalStorage::open(&app_config.local_storage_path)?;
    let store = build_store(&app_config, cli.offline);

    match cli.command {
        Some(Command::Login { user_id }) => {
            login(&app_config, store.as_ref(), &local_storage, RecordId::new(user_id)).await
        }
        Some(Command::Logout) => {
            identity::sign_out(&local_storage)?;
            println!("Signed out");
            Ok(())
        }
        Some(Command::Whoami) => {
            match IdentityContext::load(&local_storage) {
                IdentityContext::SignedIn(identity) => {
                    println!("{} (id {})", identity.label(), identity.id)
                }
                IdentityContext::SignedOut => println!("Not signed in"),
            }
            Ok(())
        }
        None => run_app(app_config, store, local_storage, Route::parse(&cli.route)),
    }
}

fn build_store(app_config: &AppConfig, offline: bool) -> Arc<dyn DataStore> {
    if offline {
        log::info!("Running against the offline demo store");
        return Arc::new(InMemoryStore::demo());
    }
    if !app_config.has_backend() {
        log::warn!(
            "No backend configured (set {} and {}); falling back to the offline demo store",
            config::BACKEND_URL_ENV,
            config::ANON_KEY_ENV
        );
        return Arc::new(InMemoryStore::demo());
    }
    log::info!("Using backend {}", app_config.backend_url);
    Arc::new(RestStore::new(&app_config.backend_url, &app_config.anon_key))
}

async fn login(
    app_config: &AppConfig,
    store: &dyn DataStore,
    local_storage: &LocalStorage,
    user_id: RecordId,
) -> Result<(), Box<dyn Error>> {
    let profile = app_config
        .tables()
        .fetch_profile(
            store,
            &user_id,
            &["full_name", "username", "graduation_year", "department"],
        )
        .await?
        .ok_or_else(|| format!("no user with id {user_id}"))?;
    let identity = identity::sign_in(local_storage, &profile)?;
    println!("Signed in as {}", identity.label());
    Ok(())
}

fn run_app(
    app_config: AppConfig,
    store: Arc<dyn DataStore>,
    local_storage: LocalStorage,
    route: Route,
) -> Result<(), Box<dyn Error>> {
    let (toaster, toast_receiver) = Toaster::channel();
    let ctx = ViewContext {
        store,
        tables: app_config.tables(),
        local_storage,
        toaster,
        runtime: tokio::runtime::Handle::current(),
    };
    let toasts = ToastBoard::new(toast_receiver, app_config.toast_duration());

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Alumni Connect",
        options,
        Box::new(move |cc| Ok(Box::new(AlumniApp::new(cc, ctx, toasts, route)))),
    )?;
    Ok(())
}
