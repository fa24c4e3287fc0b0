use serde_json::{Map, Value, json};
use tracing::error;

use patchbay_registry::{DOCS_MD_COMMAND, IMAGE_COMMAND};
use patchbay_types::{
    CONTENT_TYPE_HTML, CONTENT_TYPE_JAVASCRIPT, CONTENT_TYPE_JPEG, CONTENT_TYPE_JSON,
    CONTENT_TYPE_XML, OutputFormat, Payload, Rendered, ResultKind,
};

use crate::context::RequestContext;
use crate::xml::{self, XmlError};

/// Format the finished request into a transport-ready response.
///
/// Two commands bypass the envelope: the markdown reference page goes out
/// verbatim as HTML, and proxied image bytes go out as JPEG. A JSONP
/// callback forces JSON output regardless of the requested format. The
/// formatter itself never fails; serialization trouble degrades to error
/// envelopes instead.
pub(crate) fn render(ctx: &RequestContext, kind: ResultKind, payload: &Payload) -> Rendered {
    if ctx.command.as_deref() == Some(DOCS_MD_COMMAND) {
        if let Payload::Scalar(Value::String(page)) = payload {
            return Rendered::text(page.clone(), CONTENT_TYPE_HTML);
        }
    }
    if ctx.command.as_deref() == Some(IMAGE_COMMAND) {
        if let Payload::Binary(bytes) = payload {
            return Rendered::bytes(bytes.clone(), CONTENT_TYPE_JPEG);
        }
    }

    if ctx.callback.is_some() || ctx.format == OutputFormat::Json {
        render_json(ctx, kind, payload)
    } else {
        render_xml(ctx, kind, payload)
    }
}

fn render_json(ctx: &RequestContext, kind: ResultKind, payload: &Payload) -> Rendered {
    let body = match payload.to_value() {
        Some(data) => {
            let envelope = envelope_value(kind, ctx.message.as_deref(), data);
            let serialized = if ctx.debug {
                serde_json::to_string_pretty(&envelope)
            } else {
                serde_json::to_string(&envelope)
            };
            match serialized {
                Ok(body) => body,
                Err(fault) => {
                    error!(error = %fault, "failed to serialize JSON response");
                    reduced_error_body(&fault.to_string())
                }
            }
        }
        None => {
            error!("failed to serialize JSON response: binary payload");
            reduced_error_body("binary data cannot be represented in a JSON document")
        }
    };

    match &ctx.callback {
        Some(callback) => Rendered::text(format!("{callback}({body});"), CONTENT_TYPE_JAVASCRIPT),
        None => Rendered::text(body, CONTENT_TYPE_JSON),
    }
}

fn render_xml(ctx: &RequestContext, kind: ResultKind, payload: &Payload) -> Rendered {
    let body = match xml_document(kind, ctx.message.as_deref(), payload) {
        Ok(document) => document,
        Err(first) => {
            error!(error = %first, "failed to serialize XML response");
            // Second attempt carries the failure as the message, data kept.
            match xml_document(ResultKind::Error, Some(&first.to_string()), payload) {
                Ok(document) => document,
                Err(second) => {
                    error!(error = %second, "failed to serialize XML error response");
                    minimal_error_document(&second.to_string())
                }
            }
        }
    };
    Rendered::text(body, CONTENT_TYPE_XML)
}

fn xml_document(kind: ResultKind, message: Option<&str>, payload: &Payload) -> Result<String, XmlError> {
    let data = payload.to_value().ok_or(XmlError::Binary)?;
    let envelope = envelope_value(kind, message, data);
    xml::value_to_xml(&envelope)
}

/// Last-resort error document built by hand, for when even the error
/// envelope cannot be serialized.
fn minimal_error_document(fault: &str) -> String {
    let escaped = quick_xml::escape::escape(fault);
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<response>\n\t<message>{escaped}</message>\n\t<data></data>\n\t<result>error</result>\n</response>"
    )
}

fn reduced_error_body(fault: &str) -> String {
    let envelope = envelope_value(ResultKind::Error, Some(fault), Value::Object(Map::new()));
    serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string())
}

fn envelope_value(kind: ResultKind, message: Option<&str>, data: Value) -> Value {
    json!({
        "response": {
            "result": kind.as_str(),
            "message": message,
            "data": data,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_types::Body;
    use serde_json::json;

    fn mapping(value: Value) -> Payload {
        Payload::Mapping(value.as_object().unwrap().clone())
    }

    #[test]
    fn json_envelope_round_trips() {
        let ctx = RequestContext::default();
        let rendered = render(&ctx, ResultKind::Success, &mapping(json!({"n": 1})));
        assert_eq!(rendered.content_type, CONTENT_TYPE_JSON);

        let parsed: Value = serde_json::from_str(rendered.as_text().unwrap()).unwrap();
        assert_eq!(parsed["response"]["result"], json!("success"));
        assert_eq!(parsed["response"]["message"], json!(null));
        assert_eq!(parsed["response"]["data"], json!({"n": 1}));
    }

    #[test]
    fn empty_payload_renders_as_empty_object() {
        let ctx = RequestContext {
            message: Some("Invalid apikey".to_string()),
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Error, &Payload::Empty);
        let parsed: Value = serde_json::from_str(rendered.as_text().unwrap()).unwrap();
        assert_eq!(parsed["response"]["data"], json!({}));
        assert_eq!(parsed["response"]["message"], json!("Invalid apikey"));
        assert_eq!(parsed["response"]["result"], json!("error"));
    }

    #[test]
    fn callback_wraps_even_when_xml_requested() {
        let ctx = RequestContext {
            callback: Some("pong".to_string()),
            format: OutputFormat::Xml,
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Success, &mapping(json!({"n": 1})));
        assert_eq!(rendered.content_type, CONTENT_TYPE_JAVASCRIPT);
        let body = rendered.as_text().unwrap();
        assert!(body.starts_with("pong("));
        assert!(body.ends_with(");"));
    }

    #[test]
    fn debug_mode_pretty_prints() {
        let ctx = RequestContext {
            debug: true,
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Success, &mapping(json!({"n": 1})));
        assert!(rendered.as_text().unwrap().contains("\n"));
    }

    #[test]
    fn markdown_docs_bypass_the_envelope() {
        let ctx = RequestContext {
            command: Some(DOCS_MD_COMMAND.to_string()),
            ..RequestContext::default()
        };
        let page = Payload::Scalar(json!("<pre># API Reference</pre>"));
        let rendered = render(&ctx, ResultKind::Success, &page);
        assert_eq!(rendered.content_type, CONTENT_TYPE_HTML);
        assert_eq!(rendered.as_text(), Some("<pre># API Reference</pre>"));
    }

    #[test]
    fn image_bytes_bypass_the_envelope() {
        let ctx = RequestContext {
            command: Some(IMAGE_COMMAND.to_string()),
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Success, &Payload::Binary(vec![0xFF, 0xD8]));
        assert_eq!(rendered.content_type, CONTENT_TYPE_JPEG);
        assert_eq!(rendered.body, Body::Bytes(vec![0xFF, 0xD8]));
    }

    #[test]
    fn binary_payload_in_json_degrades_to_error_envelope() {
        let ctx = RequestContext::default();
        let rendered = render(&ctx, ResultKind::Success, &Payload::Binary(vec![1]));
        let parsed: Value = serde_json::from_str(rendered.as_text().unwrap()).unwrap();
        assert_eq!(parsed["response"]["result"], json!("error"));
        assert!(
            parsed["response"]["message"]
                .as_str()
                .unwrap()
                .contains("binary data")
        );
    }

    #[test]
    fn xml_success_document() {
        let ctx = RequestContext {
            format: OutputFormat::Xml,
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Success, &mapping(json!({"n": 1})));
        assert_eq!(rendered.content_type, CONTENT_TYPE_XML);
        let body = rendered.as_text().unwrap();
        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<result>success</result>"));
        assert!(body.contains("<n>1</n>"));
    }

    #[test]
    fn unserializable_xml_falls_back_to_minimal_document() {
        let ctx = RequestContext {
            format: OutputFormat::Xml,
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Success, &mapping(json!({"bad key": 1})));
        let body = rendered.as_text().unwrap();
        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<result>error</result>"));
        assert!(body.contains("bad key"));
        assert!(body.contains("<data></data>"));
    }

    #[test]
    fn binary_payload_in_xml_falls_back_to_minimal_document() {
        let ctx = RequestContext {
            format: OutputFormat::Xml,
            ..RequestContext::default()
        };
        let rendered = render(&ctx, ResultKind::Success, &Payload::Binary(vec![1]));
        let body = rendered.as_text().unwrap();
        assert!(body.contains("<result>error</result>"));
        assert!(body.contains("binary data"));
    }
}
