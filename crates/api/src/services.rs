use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use patchbay_registry::Command;
use patchbay_types::{CommandOutcome, ResultKind};

use crate::traits::{LibraryService, ProcessControl, Signal, UserService};

const RESTART_DOC: &str = "Restart Patchbay.";
const UPDATE_DOC: &str = "Check for Patchbay updates and install them.";
const REFRESH_LIBRARIES_DOC: &str = "Refresh the Patchbay libraries list.";
const REFRESH_USERS_DOC: &str = "Refresh the Patchbay users list.";

pub(crate) fn restart_command(control: Arc<dyn ProcessControl>) -> Command {
    Command::new("restart", move |_| {
        control.signal(Signal::Restart)?;
        Ok(CommandOutcome::success_message("Restarting patchbay"))
    })
    .with_doc(RESTART_DOC)
}

pub(crate) fn update_command(control: Arc<dyn ProcessControl>) -> Command {
    Command::new("update", move |_| {
        control.signal(Signal::Update)?;
        Ok(CommandOutcome::success_message("Updating patchbay"))
    })
    .with_doc(UPDATE_DOC)
}

pub(crate) fn refresh_libraries_command(libraries: Arc<dyn LibraryService>) -> Command {
    Command::new("refresh_libraries_list", move |_| refresh_outcome(libraries.refresh()))
        .with_doc(REFRESH_LIBRARIES_DOC)
}

pub(crate) fn refresh_users_command(users: Arc<dyn UserService>) -> Command {
    Command::new("refresh_users_list", move |_| refresh_outcome(users.refresh()))
        .with_doc(REFRESH_USERS_DOC)
}

/// A refresh that reports `false` ran but had nothing to do, which counts
/// as a failure on the wire.
fn refresh_outcome(refreshed: Result<bool>) -> Result<CommandOutcome> {
    let refreshed = refreshed?;
    let kind = if refreshed { ResultKind::Success } else { ResultKind::Failed };
    Ok(CommandOutcome { kind, message: None, data: Value::Bool(refreshed).into() })
}
