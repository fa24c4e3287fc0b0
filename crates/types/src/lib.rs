use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Classification attached to every API response envelope.
///
/// A request starts out as `Failed` and is finalized after the command ran:
/// non-empty data (or an explicit `Success` from the handler) upgrades it to
/// `Success`, everything else collapses to `Error`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// The command produced a usable result.
    Success,
    /// Intermediate state while a request is still being processed.
    #[default]
    Failed,
    /// The request was rejected or the command produced nothing.
    Error,
}

impl ResultKind {
    /// Wire name used inside response envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Serialization selected via the `out_type` request parameter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputFormat {
    #[default]
    Json,
    Xml,
}

impl OutputFormat {
    /// Parse an `out_type` value. Unrecognized names fall back to JSON.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "xml" => Self::Xml,
            _ => Self::Json,
        }
    }
}

/// Value handed back by a command handler before normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RawResult {
    /// The handler produced nothing (or was never invoked).
    #[default]
    None,
    /// A textual result. May be a serialized JSON or XML document, in which
    /// case the normalizer lifts it into structured form, or any plain string.
    Text(String),
    /// An already structured value.
    Value(Value),
    /// Raw binary content, e.g. proxied image data.
    Bytes(Vec<u8>),
}

impl RawResult {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Value> for RawResult {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<String> for RawResult {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawResult {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for RawResult {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Canonical result shape after normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// No data. Renders as `{}` in the envelope.
    Empty,
    /// A bare scalar (string, number, boolean, or null).
    Scalar(Value),
    /// A key/value mapping.
    Mapping(Map<String, Value>),
    /// An ordered list.
    List(Vec<Value>),
    /// Raw bytes that bypass the envelope entirely.
    Binary(Vec<u8>),
}

impl Payload {
    /// Emptiness rule used when finalizing the response classification.
    ///
    /// Null, `false`, zero, the empty string, and empty collections all count
    /// as empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Scalar(value) => value_is_truthy(value),
            Self::Mapping(map) => !map.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Binary(bytes) => !bytes.is_empty(),
        }
    }

    /// JSON representation for the envelope `data` field. `Empty` becomes an
    /// empty object; binary payloads have no JSON form.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Empty => Some(Value::Object(Map::new())),
            Self::Scalar(value) => Some(value.clone()),
            Self::Mapping(map) => Some(Value::Object(map.clone())),
            Self::List(items) => Some(Value::Array(items.clone())),
            Self::Binary(_) => None,
        }
    }
}

/// Emptiness of a single JSON value: null, `false`, zero, and empty
/// strings or collections all count as empty.
pub fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Everything a command handler reports back: an optional classification, an
/// optional operator-facing message, and the raw result data.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// Classification requested by the handler. When left at `Failed`, the
    /// emptiness of `data` decides the final classification.
    pub kind: ResultKind,
    /// Human-readable note carried in the envelope `message` field.
    pub message: Option<String>,
    /// The result data, normalized later by the engine.
    pub data: RawResult,
}

impl CommandOutcome {
    /// Outcome carrying only data. Classification is decided by the
    /// emptiness rule during finalization.
    pub fn data(data: impl Into<RawResult>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Outcome explicitly classified as successful.
    pub fn success(data: impl Into<RawResult>) -> Self {
        Self {
            kind: ResultKind::Success,
            message: None,
            data: data.into(),
        }
    }

    /// Successful outcome carrying only a message, no data.
    pub fn success_message(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Success,
            message: Some(message.into()),
            data: RawResult::None,
        }
    }

    /// Failed outcome carrying an explanatory message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Failed,
            message: Some(message.into()),
            data: RawResult::None,
        }
    }

    /// Attach a message to an existing outcome.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Cleaned request parameters passed to command handlers.
///
/// Reserved transport keys are stripped before construction, so handlers only
/// ever see their own arguments. Transports deliver values as strings, so the
/// typed accessors tolerate string-encoded numbers and booleans.
#[derive(Clone, Debug, Default)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// String value of a parameter. Numbers and booleans are rendered to
    /// their textual form; structured values yield `None`.
    pub fn str_arg(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn usize_arg(&self, name: &str) -> Option<usize> {
        match self.0.get(name)? {
            Value::Number(number) => number.as_u64().map(|n| n as usize),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn u32_arg(&self, name: &str) -> Option<u32> {
        match self.0.get(name)? {
            Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Interpret a transport-delivered flag value.
///
/// Accepts native booleans, nonzero numbers, and the usual affirmative
/// strings (`1`, `true`, `yes`, `on`, case-insensitive).
pub fn truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        }
        _ => false,
    }
}

/// Content type for JSON envelope responses.
pub const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";
/// Content type for JSONP (callback-wrapped) responses.
pub const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript";
/// Content type for XML envelope responses.
pub const CONTENT_TYPE_XML: &str = "application/xml";
/// Content type for the rendered documentation page.
pub const CONTENT_TYPE_HTML: &str = "text/html;charset=UTF-8";
/// Content type for proxied image data.
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";

/// Response body produced by the formatter.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

/// A fully formatted response ready for the transport layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Rendered {
    pub body: Body,
    pub content_type: &'static str,
}

impl Rendered {
    pub fn text(body: impl Into<String>, content_type: &'static str) -> Self {
        Self {
            body: Body::Text(body.into()),
            content_type,
        }
    }

    pub fn bytes(body: Vec<u8>, content_type: &'static str) -> Self {
        Self {
            body: Body::Bytes(body),
            content_type,
        }
    }

    /// Textual body, when the response is not binary.
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(text) => Some(text),
            Body::Bytes(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.body {
            Body::Text(text) => text.into_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_kind_wire_names() {
        assert_eq!(ResultKind::Success.as_str(), "success");
        assert_eq!(ResultKind::Failed.as_str(), "failed");
        assert_eq!(ResultKind::Error.as_str(), "error");
        assert_eq!(serde_json::to_value(ResultKind::Error).unwrap(), json!("error"));
    }

    #[test]
    fn output_format_falls_back_to_json() {
        assert_eq!(OutputFormat::parse("xml"), OutputFormat::Xml);
        assert_eq!(OutputFormat::parse("XML"), OutputFormat::Xml);
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(""), OutputFormat::Json);
    }

    #[test]
    fn payload_truthiness() {
        assert!(!Payload::Empty.is_truthy());
        assert!(!Payload::Scalar(Value::Null).is_truthy());
        assert!(!Payload::Scalar(json!(false)).is_truthy());
        assert!(!Payload::Scalar(json!(0)).is_truthy());
        assert!(!Payload::Scalar(json!("")).is_truthy());
        assert!(!Payload::Mapping(Map::new()).is_truthy());
        assert!(!Payload::List(Vec::new()).is_truthy());

        assert!(Payload::Scalar(json!(1)).is_truthy());
        assert!(Payload::Scalar(json!("ok")).is_truthy());
        assert!(Payload::List(vec![json!(null)]).is_truthy());
        assert!(Payload::Binary(vec![0xFF]).is_truthy());
    }

    #[test]
    fn empty_payload_renders_as_empty_object() {
        assert_eq!(Payload::Empty.to_value(), Some(json!({})));
        assert_eq!(Payload::Binary(vec![1, 2, 3]).to_value(), None);
    }

    #[test]
    fn outcome_defaults_leave_classification_open() {
        let outcome = CommandOutcome::data(json!({"rows": 3}));
        assert_eq!(outcome.kind, ResultKind::Failed);
        assert!(outcome.message.is_none());

        let outcome = CommandOutcome::success_message("Restarting");
        assert_eq!(outcome.kind, ResultKind::Success);
        assert!(outcome.data.is_none());
    }

    #[test]
    fn args_tolerate_string_typed_values() {
        let mut map = Map::new();
        map.insert("count".into(), json!("42"));
        map.insert("width".into(), json!(300));
        let args = Args::new(map);

        assert_eq!(args.usize_arg("count"), Some(42));
        assert_eq!(args.u32_arg("width"), Some(300));
        assert_eq!(args.str_arg("width"), Some("300".to_string()));
    }

    #[test]
    fn truthy_flag_accepts_transport_spellings() {
        assert!(truthy_flag(&json!("1")));
        assert!(truthy_flag(&json!("True")));
        assert!(truthy_flag(&json!("yes")));
        assert!(truthy_flag(&json!(true)));
        assert!(truthy_flag(&json!(2)));
        assert!(!truthy_flag(&json!("0")));
        assert!(!truthy_flag(&json!("false")));
        assert!(!truthy_flag(&json!(null)));
    }
}
