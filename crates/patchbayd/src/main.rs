//! Patchbay API daemon.
//!
//! Loads settings, wires the built-in commands to their daemon-side
//! services, and serves the command API over HTTP until an interrupt or an
//! API-issued signal stops it. Restart and update requests surface as
//! distinct exit codes for the supervisor to act on.

mod collaborators;
mod logging;
mod server;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Result;
use clap::Parser;
use patchbay_api::{Collaborators, Signal};
use patchbay_config::{ConfigError, ConfigHandle};
use patchbay_engine::ApiEngine;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    collaborators::{
        FileDatabase, FsImageStore, NoopLibraryService, NoopUserService, WatchControl,
    },
    server::ApiServer,
};

/// Exit code asking the supervisor to start the daemon again.
const RESTART_EXIT_CODE: u8 = 3;
/// Exit code asking the supervisor to run the updater before starting again.
const UPDATE_EXIT_CODE: u8 = 4;

#[derive(Parser, Debug)]
#[command(name = "patchbayd", version, about = "Patchbay API daemon")]
struct Cli {
    /// Path to the JSON settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address the HTTP listener binds to
    #[arg(long, default_value = "127.0.0.1:8181")]
    bind: SocketAddr,

    /// Directory for logs, backups, cache, and the database when the
    /// settings file does not name them
    #[arg(long, default_value = ".")]
    datadir: PathBuf,
}

/// How the daemon main loop came to an end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExitIntent {
    Shutdown,
    Restart,
    Update,
}

impl ExitIntent {
    fn as_str(self) -> &'static str {
        match self {
            ExitIntent::Shutdown => "shutdown",
            ExitIntent::Restart => "restart",
            ExitIntent::Update => "update",
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Arc::new(ConfigHandle::load(cli.config.clone())?);
    fill_directory_defaults(&config, &cli.datadir)?;
    logging::init(Path::new(&config.log_dir()))?;

    info!(settings = %config.path().display(), "patchbayd starting");
    if !config.api_enabled() {
        warn!("the api is disabled, requests are refused until api_enabled is set");
    }

    let (control, signals) = WatchControl::new();
    let commands = patchbay_api::command_set(Collaborators {
        config: Arc::clone(&config),
        database: Arc::new(FileDatabase::new(Arc::clone(&config))),
        libraries: Arc::new(NoopLibraryService),
        users: Arc::new(NoopUserService),
        control: Arc::new(control),
        images: Arc::new(FsImageStore::new(
            Path::new(&config.cache_dir()).join("images"),
        )),
    });
    let engine = Arc::new(ApiEngine::new(Arc::clone(&config), commands));
    info!(commands = engine.commands().len(), "command table ready");

    let server = ApiServer::new(cli.bind, engine).start().await?;
    let intent = wait_for_exit(signals).await;
    server.stop().await?;
    info!(intent = intent.as_str(), "patchbayd stopped");

    Ok(match intent {
        ExitIntent::Shutdown => ExitCode::SUCCESS,
        ExitIntent::Restart => ExitCode::from(RESTART_EXIT_CODE),
        ExitIntent::Update => ExitCode::from(UPDATE_EXIT_CODE),
    })
}

/// Point unset directory settings at subdirectories of `datadir` and
/// persist the result, so later runs and the settings commands see the
/// same paths.
fn fill_directory_defaults(config: &ConfigHandle, datadir: &Path) -> Result<(), ConfigError> {
    config.update(|settings| {
        let general = &mut settings.general;
        if general.log_dir.is_empty() {
            general.log_dir = datadir.join("logs").to_string_lossy().into_owned();
        }
        let advanced = &mut settings.advanced;
        if advanced.backup_dir.is_empty() {
            advanced.backup_dir = datadir.join("backups").to_string_lossy().into_owned();
        }
        if advanced.cache_dir.is_empty() {
            advanced.cache_dir = datadir.join("cache").to_string_lossy().into_owned();
        }
        if advanced.database_path.is_empty() {
            advanced.database_path = datadir.join("patchbay.db").to_string_lossy().into_owned();
        }
    })
}

/// Wait for an interrupt or an API-issued signal.
async fn wait_for_exit(mut signals: watch::Receiver<Option<Signal>>) -> ExitIntent {
    loop {
        tokio::select! {
            interrupt = tokio::signal::ctrl_c() => {
                if let Err(fault) = interrupt {
                    error!(error = %fault, "interrupt handler failed");
                }
                info!("interrupt received");
                return ExitIntent::Shutdown;
            }
            changed = signals.changed() => {
                if changed.is_err() {
                    return ExitIntent::Shutdown;
                }
                match *signals.borrow_and_update() {
                    Some(Signal::Restart) => {
                        info!("restart requested over the api");
                        return ExitIntent::Restart;
                    }
                    Some(Signal::Update) => {
                        info!("update requested over the api");
                        return ExitIntent::Update;
                    }
                    None => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use patchbay_config::Settings;

    use super::*;

    #[test]
    fn unset_directories_fall_back_to_the_datadir() {
        let config = ConfigHandle::ephemeral(Settings::default());

        fill_directory_defaults(&config, Path::new("/srv/patchbay")).unwrap();

        let settings = config.snapshot();
        assert_eq!(settings.general.log_dir, "/srv/patchbay/logs");
        assert_eq!(settings.advanced.backup_dir, "/srv/patchbay/backups");
        assert_eq!(settings.advanced.cache_dir, "/srv/patchbay/cache");
        assert_eq!(settings.advanced.database_path, "/srv/patchbay/patchbay.db");
    }

    #[test]
    fn configured_directories_are_left_alone() {
        let mut settings = Settings::default();
        settings.general.log_dir = "/var/log/patchbay".to_string();
        let config = ConfigHandle::ephemeral(settings);

        fill_directory_defaults(&config, Path::new("/srv/patchbay")).unwrap();

        let after = config.snapshot();
        assert_eq!(after.general.log_dir, "/var/log/patchbay");
        assert_eq!(after.advanced.cache_dir, "/srv/patchbay/cache");
    }

    #[test]
    fn exit_intents_map_to_their_names() {
        assert_eq!(ExitIntent::Restart.as_str(), "restart");
        assert_eq!(ExitIntent::Update.as_str(), "update");
        assert_eq!(ExitIntent::Shutdown.as_str(), "shutdown");
    }

    #[test]
    fn restart_signal_ends_the_wait() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (control, signals) = WatchControl::new();

        let intent = runtime.block_on(async move {
            let waiter = tokio::spawn(wait_for_exit(signals));
            patchbay_api::ProcessControl::signal(&control, Signal::Restart).unwrap();
            waiter.await.unwrap()
        });

        assert_eq!(intent, ExitIntent::Restart);
    }
}
