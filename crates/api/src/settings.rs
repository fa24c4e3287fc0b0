use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use patchbay_config::ConfigHandle;
use patchbay_registry::{Command, GET_APIKEY_COMMAND};
use patchbay_types::{Args, CommandOutcome};

const GET_SETTINGS_DOC: &str = r#"Gets all settings from the config file.

```
Required parameters:
    None

Optional parameters:
    key (str):      Name of a config section to return

Returns:
    json:
        {"general": {"api_enabled": true, ...},
         "advanced": {"api_sql": false, ...}
         }
```"#;

const BACKUP_CONFIG_DOC: &str = "Create a manual backup of the `config.json` file.";

const GET_APIKEY_DOC: &str = r#"Get the apikey. Username and password are required
if auth is enabled. Makes and saves the apikey if it does not exist.

```
Required parameters:
    None

Optional parameters:
    username (str):     Your Patchbay username
    password (str):     Your Patchbay password

Returns:
    string:             "apikey"
```"#;

const AUTH_REQUIRED_MSG: &str =
    "Authentication is enabled, please add the correct username and password to the parameters";

pub(crate) fn settings_command(config: Arc<ConfigHandle>) -> Command {
    Command::new("get_settings", move |args| get_settings(&config, args))
        .with_doc(GET_SETTINGS_DOC)
        .with_params(&["key"])
}

pub(crate) fn backup_command(config: Arc<ConfigHandle>) -> Command {
    Command::new("backup_config", move |_| backup_config(&config)).with_doc(BACKUP_CONFIG_DOC)
}

pub(crate) fn apikey_command(config: Arc<ConfigHandle>) -> Command {
    Command::new(GET_APIKEY_COMMAND, move |args| get_apikey(&config, args))
        .with_doc(GET_APIKEY_DOC)
        .with_params(&["username", "password"])
}

fn get_settings(config: &ConfigHandle, args: &Args) -> Result<CommandOutcome> {
    let sections = serde_json::to_value(config.snapshot()).context("serializing settings")?;
    if let Some(key) = args.str_arg("key").filter(|key| !key.is_empty()) {
        return Ok(match sections.get(key.as_str()) {
            Some(section) => CommandOutcome::data(section.clone()),
            None => CommandOutcome::data(Value::Null),
        });
    }
    Ok(CommandOutcome::data(sections))
}

fn backup_config(config: &ConfigHandle) -> Result<CommandOutcome> {
    let path = config.make_backup().context("backing up the config file")?;
    Ok(CommandOutcome::success(path.display().to_string()))
}

/// Hand out the shared secret, bootstrapping one on first use. When HTTP
/// credentials are configured they must be presented as parameters.
fn get_apikey(config: &ConfigHandle, args: &Args) -> Result<CommandOutcome> {
    let username = args.str_arg("username").unwrap_or_default();
    let password = args.str_arg("password").unwrap_or_default();
    let (required_user, required_password) = config.http_credentials();

    if !required_user.is_empty()
        && !required_password.is_empty()
        && (username != required_user || password != required_password)
    {
        return Ok(CommandOutcome::failed(AUTH_REQUIRED_MSG));
    }

    let key = config.api_key_or_generate().context("persisting generated API key")?;
    Ok(CommandOutcome::data(key))
}
