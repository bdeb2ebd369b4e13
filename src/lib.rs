pub mod commands;
pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::commands::Launcher;
pub use crate::core::auth::{LoginAttempt, LoginMethod, Profile};
pub use crate::core::error::{AuthError, InstallError, InstallStep, LauncherError};
pub use crate::core::modpack::{LoaderType, ModEntry, ModpackDescriptor};
pub use crate::core::progress::ProgressReporter;
pub use crate::core::state::AppState;

/// Install the fmt subscriber with `RUST_LOG`, defaulting to
/// `info,packlauncher_lib=debug`. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,packlauncher_lib=debug"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("PackLauncher core {} starting...", env!("CARGO_PKG_VERSION"));
    }
}
