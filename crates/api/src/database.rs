use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use patchbay_config::ConfigHandle;
use patchbay_registry::Command;
use patchbay_types::{Args, CommandOutcome};

use crate::traits::Database;

/// Backups older than this trigger a fresh one before raw queries run.
const BACKUP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const SQL_DOC: &str = r#"Query the Patchbay database with raw SQL. Automatically makes a backup of
the database if the latest backup is older then 24h. `api_sql` must be
manually enabled in the config file.

```
Required parameters:
    query (str):        The SQL query

Optional parameters:
    None

Returns:
    None
```"#;

const BACKUP_DB_DOC: &str = "Create a manual backup of the database file.";

pub(crate) fn sql_command(config: Arc<ConfigHandle>, database: Arc<dyn Database>) -> Command {
    Command::new("sql", move |args| sql(&config, database.as_ref(), args))
        .with_doc(SQL_DOC)
        .with_params(&["query"])
}

pub(crate) fn backup_command(database: Arc<dyn Database>) -> Command {
    Command::new("backup_db", move |_| backup_db(database.as_ref())).with_doc(BACKUP_DB_DOC)
}

/// Raw query access, deliberately inert unless `api_sql` is switched on in
/// the config file and a query was actually given.
fn sql(config: &ConfigHandle, database: &dyn Database, args: &Args) -> Result<CommandOutcome> {
    let query = args.str_arg("query").unwrap_or_default();
    if !config.sql_enabled() || query.is_empty() {
        return Ok(CommandOutcome::default());
    }

    if backup_needed(&config.resolve_backup_dir())? {
        let path = database.backup().context("backing up the database before raw query")?;
        info!(path = %path.display(), "created database backup before raw query");
    }

    let rows = database.select(&query)?;
    let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
    Ok(CommandOutcome::data(Value::Array(rows)))
}

fn backup_db(database: &dyn Database) -> Result<CommandOutcome> {
    let path = database.backup().context("backing up the database")?;
    Ok(CommandOutcome::success(path.display().to_string()))
}

/// A backup is due when the backup directory is missing or empty, or when
/// any entry in it is older than a day.
fn backup_needed(backup_dir: &Path) -> Result<bool> {
    let entries = match fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("reading backup directory {}", backup_dir.display()));
        }
    };

    let now = SystemTime::now();
    let mut occupied = false;
    for entry in entries {
        let entry = entry?;
        occupied = true;
        let modified = entry.metadata()?.modified()?;
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > BACKUP_MAX_AGE {
            return Ok(true);
        }
    }
    Ok(!occupied)
}
