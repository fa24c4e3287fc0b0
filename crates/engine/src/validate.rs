use serde_json::{Map, Value};
use tracing::debug;

use patchbay_config::{API_KEY_LEN, ConfigHandle};
use patchbay_registry::{CommandSet, DOCS_COMMAND, DOCS_MD_COMMAND, GET_APIKEY_COMMAND};
use patchbay_types::{Args, OutputFormat, truthy_flag, value_is_truthy};

use crate::context::RequestContext;

/// Commands reachable without a valid API key, as long as the API itself is
/// enabled. This is what lets a fresh installation bootstrap a key and read
/// the docs.
const KEYLESS_COMMANDS: [&str; 3] = [GET_APIKEY_COMMAND, DOCS_COMMAND, DOCS_MD_COMMAND];

/// Check the request against the configured key and the command table, and
/// strip the reserved transport parameters.
///
/// The reserved keys (`callback`, `apikey`, `cmd`, `debug`, `profileme`,
/// `out_type`) are removed from the parameter bag no matter how the request
/// fares, so handlers can never see them. The remaining parameters become
/// the cleaned argument bag only when authentication succeeds.
pub(crate) fn validate(
    config: &ConfigHandle,
    commands: &CommandSet,
    mut params: Map<String, Value>,
) -> RequestContext {
    let mut ctx = RequestContext::default();
    let api_key = config.api_key();
    let enabled = config.api_enabled();

    let requested_cmd = params.get("cmd").map(param_str);
    let known_cmd = requested_cmd.as_deref().is_some_and(|cmd| commands.contains(cmd));

    ctx.message = if !enabled {
        Some("API not enabled".to_string())
    } else if api_key.is_empty() {
        Some("API key not generated".to_string())
    } else if api_key.len() != API_KEY_LEN {
        Some("API key not generated correctly".to_string())
    } else if !params.contains_key("apikey") {
        Some("Parameter apikey is required".to_string())
    } else if params.get("apikey").map(param_str).as_deref() != Some(api_key.as_str()) {
        Some("Invalid apikey".to_string())
    } else if !params.contains_key("cmd") {
        Some(format!(
            "Parameter cmd is required. Possible commands are: {}",
            commands.joined_names()
        ))
    } else if !known_cmd {
        Some(format!(
            "Unknown command: {}. Possible commands are: {}",
            requested_cmd.as_deref().unwrap_or(""),
            commands.joined_names()
        ))
    } else {
        None
    };

    ctx.callback = params.remove("callback").map(|value| param_str(&value));
    ctx.apikey = params.remove("apikey").map(|value| param_str(&value));
    ctx.command = params.remove("cmd").map(|value| param_str(&value));
    ctx.debug = params.remove("debug").as_ref().is_some_and(truthy_flag);
    ctx.profile = params.remove("profileme").as_ref().is_some_and(value_is_truthy);
    ctx.format = params
        .remove("out_type")
        .map(|value| OutputFormat::parse(&param_str(&value)))
        .unwrap_or_default();

    // A missing key never matches; a supplied empty key does match an
    // ungenerated (empty) configured key.
    let key_matches = ctx.apikey.as_deref() == Some(api_key.as_str());
    let keyless = ctx
        .command
        .as_deref()
        .is_some_and(|cmd| KEYLESS_COMMANDS.contains(&cmd));

    if (key_matches && enabled && known_cmd) || (keyless && enabled) {
        ctx.authenticated = true;
        ctx.message = None;
        ctx.args = Args::new(params);
    }

    debug!(args = ?ctx.args.keys().collect::<Vec<_>>(), "cleaned request parameters");
    ctx
}

/// Textual form of a transport parameter. Query strings deliver strings, but
/// JSON bodies may carry native numbers or booleans.
fn param_str(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_config::Settings;
    use patchbay_registry::{Command, CommandSet};
    use patchbay_types::CommandOutcome;
    use serde_json::json;

    fn test_commands() -> CommandSet {
        CommandSet::builder()
            .register(Command::new("get_apikey", |_| Ok(CommandOutcome::default())))
            .register(Command::new("status", |_| Ok(CommandOutcome::default())))
            .build()
    }

    fn enabled_config(key: &str) -> ConfigHandle {
        let mut settings = Settings::default();
        settings.general.api_enabled = true;
        settings.general.api_key = key.to_string();
        ConfigHandle::ephemeral(settings)
    }

    fn params(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn rejections_follow_priority_order() {
        let commands = test_commands();

        let disabled = ConfigHandle::ephemeral(Settings::default());
        let ctx = validate(&disabled, &commands, params(&[]));
        assert_eq!(ctx.message.as_deref(), Some("API not enabled"));

        let mut settings = Settings::default();
        settings.general.api_enabled = true;
        let no_key = ConfigHandle::ephemeral(settings);
        let ctx = validate(&no_key, &commands, params(&[]));
        assert_eq!(ctx.message.as_deref(), Some("API key not generated"));

        let short = enabled_config("abc");
        let ctx = validate(&short, &commands, params(&[]));
        assert_eq!(ctx.message.as_deref(), Some("API key not generated correctly"));

        let config = enabled_config(KEY);
        let ctx = validate(&config, &commands, params(&[]));
        assert_eq!(ctx.message.as_deref(), Some("Parameter apikey is required"));
        assert!(!ctx.authenticated);
        assert!(ctx.args.is_empty());

        let ctx = validate(&config, &commands, params(&[("apikey", "wrong")]));
        assert_eq!(ctx.message.as_deref(), Some("Invalid apikey"));

        let ctx = validate(&config, &commands, params(&[("apikey", KEY)]));
        assert_eq!(
            ctx.message.as_deref(),
            Some("Parameter cmd is required. Possible commands are: docs, docs_md, get_apikey, status")
        );

        let ctx = validate(&config, &commands, params(&[("apikey", KEY), ("cmd", "nope")]));
        assert_eq!(
            ctx.message.as_deref(),
            Some("Unknown command: nope. Possible commands are: docs, docs_md, get_apikey, status")
        );
    }

    #[test]
    fn valid_request_authenticates_and_cleans_params() {
        let config = enabled_config(KEY);
        let commands = test_commands();
        let ctx = validate(
            &config,
            &commands,
            params(&[
                ("apikey", KEY),
                ("cmd", "status"),
                ("debug", "1"),
                ("profileme", "1"),
                ("out_type", "xml"),
                ("callback", "cb"),
                ("extra", "kept"),
            ]),
        );

        assert!(ctx.authenticated);
        assert!(ctx.message.is_none());
        assert_eq!(ctx.command.as_deref(), Some("status"));
        assert!(ctx.debug);
        assert!(ctx.profile);
        assert_eq!(ctx.format, OutputFormat::Xml);
        assert_eq!(ctx.callback.as_deref(), Some("cb"));
        assert_eq!(ctx.args.len(), 1);
        assert_eq!(ctx.args.str_arg("extra").as_deref(), Some("kept"));
    }

    #[test]
    fn reserved_keys_are_stripped_even_on_rejection() {
        let config = enabled_config(KEY);
        let commands = test_commands();
        let ctx = validate(
            &config,
            &commands,
            params(&[("apikey", "wrong"), ("cmd", "status"), ("out_type", "xml"), ("debug", "1")]),
        );

        assert!(!ctx.authenticated);
        assert_eq!(ctx.format, OutputFormat::Xml);
        assert!(ctx.debug);
        assert_eq!(ctx.command.as_deref(), Some("status"));
        assert!(ctx.args.is_empty());
    }

    #[test]
    fn keyless_commands_authenticate_without_a_key() {
        let mut settings = Settings::default();
        settings.general.api_enabled = true;
        let config = ConfigHandle::ephemeral(settings);
        let commands = test_commands();

        let ctx = validate(&config, &commands, params(&[("cmd", "get_apikey")]));
        assert!(ctx.authenticated);
        assert!(ctx.message.is_none());

        let ctx = validate(&config, &commands, params(&[("cmd", "docs")]));
        assert!(ctx.authenticated);

        let ctx = validate(&config, &commands, params(&[("cmd", "status")]));
        assert!(!ctx.authenticated);
    }

    #[test]
    fn keyless_commands_still_require_the_api_enabled() {
        let config = ConfigHandle::ephemeral(Settings::default());
        let commands = test_commands();
        let ctx = validate(&config, &commands, params(&[("cmd", "get_apikey")]));
        assert!(!ctx.authenticated);
        assert_eq!(ctx.message.as_deref(), Some("API not enabled"));
    }

    #[test]
    fn empty_supplied_key_matches_an_ungenerated_key() {
        let mut settings = Settings::default();
        settings.general.api_enabled = true;
        let config = ConfigHandle::ephemeral(settings);
        let commands = test_commands();

        let ctx = validate(&config, &commands, params(&[("apikey", ""), ("cmd", "status")]));
        assert!(ctx.authenticated);
        assert!(ctx.message.is_none());

        let ctx = validate(&config, &commands, params(&[("cmd", "status")]));
        assert!(!ctx.authenticated);
        assert_eq!(ctx.message.as_deref(), Some("API key not generated"));
    }
}
