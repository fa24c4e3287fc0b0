//! Built-in commands served over the patchbay API.
//!
//! Every command wraps either the configuration store or one of the
//! collaborator traits in this crate, so the maintenance internals stay
//! pluggable. Hosts assemble the full table with [`command_set`], providing
//! their own collaborator implementations.

mod database;
mod images;
mod logs;
mod services;
mod settings;
mod traits;

use std::sync::Arc;

use patchbay_config::ConfigHandle;
use patchbay_registry::CommandSet;

pub use logs::LOG_FILENAME;
pub use traits::{Database, ImageStore, LibraryService, ProcessControl, Signal, UserService};

/// Host-provided services the built-in commands delegate to.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<ConfigHandle>,
    pub database: Arc<dyn Database>,
    pub libraries: Arc<dyn LibraryService>,
    pub users: Arc<dyn UserService>,
    pub control: Arc<dyn ProcessControl>,
    pub images: Arc<dyn ImageStore>,
}

/// Build the complete built-in command table.
pub fn command_set(collaborators: Collaborators) -> CommandSet {
    let Collaborators { config, database, libraries, users, control, images } = collaborators;
    CommandSet::builder()
        .register(logs::command(config.clone()))
        .register(settings::settings_command(config.clone()))
        .register(settings::backup_command(config.clone()))
        .register(settings::apikey_command(config.clone()))
        .register(database::sql_command(config, database.clone()))
        .register(database::backup_command(database))
        .register(services::restart_command(control.clone()))
        .register(services::update_command(control))
        .register(services::refresh_libraries_command(libraries))
        .register(services::refresh_users_command(users))
        .register(images::command(images))
        .build()
}
