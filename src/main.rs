use clap::Parser;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod models;
mod report_auth;
mod routes;
mod rsvp;
mod schema;
mod settings;
mod store;

include!(concat!(env!("OUT_DIR"), "/templates.rs"));

use crate::routes::{router, AppState};
use crate::settings::Settings;

#[derive(Parser)]
#[command(about = "Collects event RSVPs and serves a password-protected report")]
struct Args {
    /// Settings file, without extension; environment variables override it.
    #[arg(long, default_value = "settings")]
    settings: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = match Settings::load(&args.settings) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Invalid settings: {}", err);
            process::exit(1);
        }
    };
    if settings.uses_default_password() {
        warn!("REPORT_PASSWORD not set, using the built-in default report password");
    }

    let store = match store::open(&settings) {
        Ok(store) => store,
        Err(err) => {
            error!("Failed to connect to the database: {}", err);
            process::exit(1);
        }
    };
    if let Err(err) = store.initialize() {
        error!("Failed to initialize the database: {}", err);
        process::exit(1);
    }
    info!("Active database: {}", store.describe());

    let address = settings.listen_address();
    info!("Listening on http://{}", address);
    if let Err(err) = gotham::start(address, router(AppState::new(store, &settings))) {
        error!("Server stopped: {}", err);
        process::exit(1);
    }
}
