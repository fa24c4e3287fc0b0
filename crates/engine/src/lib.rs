//! Request validation, dispatch, and response formatting for the HTTP API.
//!
//! The engine drives a flat map of request parameters through the full
//! pipeline: authentication and parameter cleaning, command lookup and
//! invocation, result normalization, and serialization into a JSON, JSONP,
//! or XML body. Handler faults never escape the pipeline unless the request
//! asked for debug mode.

mod context;
mod dispatch;
mod normalize;
mod respond;
mod validate;
mod xml;

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};
use tracing::debug;

use patchbay_config::ConfigHandle;
use patchbay_registry::CommandSet;
use patchbay_types::Rendered;

/// The API engine: a command set bound to runtime configuration.
pub struct ApiEngine {
    config: Arc<ConfigHandle>,
    commands: Arc<CommandSet>,
}

impl ApiEngine {
    pub fn new(config: Arc<ConfigHandle>, commands: CommandSet) -> Self {
        Self {
            config,
            commands: Arc::new(commands),
        }
    }

    /// Registered commands, e.g. for startup logging.
    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    /// Run one API request through the pipeline and produce the response.
    ///
    /// Every request, even a rejected or failing one, yields a well-formed
    /// response body. The only exception is debug mode, where handler faults
    /// are deliberately surfaced to the caller as errors.
    pub fn handle(&self, params: Map<String, Value>) -> Result<Rendered> {
        debug!(params = ?params.keys().collect::<Vec<_>>(), "handling api request");
        let mut ctx = validate::validate(&self.config, &self.commands, params);
        let raw = dispatch::dispatch(&self.commands, &mut ctx)?;
        let payload = normalize::normalize(raw);
        let kind = normalize::finalize_kind(&payload, ctx.kind);
        Ok(respond::render(&ctx, kind, &payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use patchbay_config::{GeneralSettings, Settings};
    use patchbay_registry::Command;
    use patchbay_types::{
        CONTENT_TYPE_HTML, CONTENT_TYPE_JAVASCRIPT, CONTENT_TYPE_XML, CommandOutcome,
    };
    use serde_json::json;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn engine() -> ApiEngine {
        let settings = Settings {
            general: GeneralSettings {
                api_enabled: true,
                api_key: KEY.to_string(),
                ..GeneralSettings::default()
            },
            ..Settings::default()
        };
        let commands = CommandSet::builder()
            .register(Command::new("status", |_args| {
                Ok(CommandOutcome::data(json!({"state": "up"})))
            }))
            .register(Command::new("echo", |args| {
                Ok(CommandOutcome::data(Value::Object(args.as_map().clone())))
            }))
            .register(Command::new("explode", |_args| Err(anyhow!("boom"))))
            .build();
        ApiEngine::new(Arc::new(ConfigHandle::ephemeral(settings)), commands)
    }

    fn params(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect()
    }

    fn response(rendered: &Rendered) -> Value {
        let parsed: Value = serde_json::from_str(rendered.as_text().unwrap()).unwrap();
        parsed["response"].clone()
    }

    #[test]
    fn successful_command_round_trip() {
        let rendered = engine()
            .handle(params(&[("apikey", KEY), ("cmd", "status")]))
            .unwrap();
        let body = response(&rendered);
        assert_eq!(body["result"], json!("success"));
        assert_eq!(body["message"], json!(null));
        assert_eq!(body["data"], json!({"state": "up"}));
    }

    #[test]
    fn missing_key_renders_error_envelope() {
        let rendered = engine().handle(params(&[("cmd", "status")])).unwrap();
        let body = response(&rendered);
        assert_eq!(body["result"], json!("error"));
        assert_eq!(body["message"], json!("Parameter apikey is required"));
        assert_eq!(body["data"], json!({}));
    }

    #[test]
    fn reserved_keys_never_reach_the_handler() {
        let rendered = engine()
            .handle(params(&[
                ("apikey", KEY),
                ("cmd", "echo"),
                ("debug", "0"),
                ("profileme", ""),
                ("out_type", "json"),
                ("extra", "1"),
            ]))
            .unwrap();
        let body = response(&rendered);
        assert_eq!(body["data"], json!({"extra": "1"}));
    }

    #[test]
    fn handler_fault_is_contained() {
        let rendered = engine()
            .handle(params(&[("apikey", KEY), ("cmd", "explode")]))
            .unwrap();
        let body = response(&rendered);
        assert_eq!(body["result"], json!("error"));
        assert_eq!(body["message"], json!(null));
        assert_eq!(body["data"], json!({}));
    }

    #[test]
    fn debug_mode_surfaces_handler_fault() {
        let fault = engine()
            .handle(params(&[("apikey", KEY), ("cmd", "explode"), ("debug", "1")]))
            .unwrap_err();
        assert!(fault.to_string().contains("boom"));
    }

    #[test]
    fn callback_parameter_selects_jsonp() {
        let rendered = engine()
            .handle(params(&[("apikey", KEY), ("cmd", "status"), ("callback", "cb")]))
            .unwrap();
        assert_eq!(rendered.content_type, CONTENT_TYPE_JAVASCRIPT);
        let body = rendered.as_text().unwrap();
        assert!(body.starts_with("cb("));
        assert!(body.ends_with(");"));
    }

    #[test]
    fn docs_lists_every_registered_command() {
        let rendered = engine().handle(params(&[("cmd", "docs")])).unwrap();
        let body = response(&rendered);
        assert_eq!(body["result"], json!("success"));
        let docs = body["data"].as_object().unwrap();
        for name in ["docs", "docs_md", "echo", "explode", "status"] {
            assert!(docs.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn markdown_reference_is_served_without_a_key() {
        let rendered = engine().handle(params(&[("cmd", "docs_md")])).unwrap();
        assert_eq!(rendered.content_type, CONTENT_TYPE_HTML);
        let body = rendered.as_text().unwrap();
        assert!(body.starts_with("<pre>"));
        assert!(body.contains("### status"));
    }

    #[test]
    fn xml_out_type_renders_a_document() {
        let rendered = engine()
            .handle(params(&[("apikey", KEY), ("cmd", "status"), ("out_type", "xml")]))
            .unwrap();
        assert_eq!(rendered.content_type, CONTENT_TYPE_XML);
        let body = rendered.as_text().unwrap();
        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<result>success</result>"));
        assert!(body.contains("<state>up</state>"));
    }
}
