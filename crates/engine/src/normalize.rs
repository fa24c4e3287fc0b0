use serde_json::Value;

use patchbay_types::{Payload, RawResult, ResultKind};

use crate::xml;

/// Coerce a handler result into the canonical payload shape.
///
/// Structured values pass through. Text is lifted by trying a JSON parse,
/// then an XML parse; text that is neither stays a plain string. Nothing
/// becomes `Empty` and bytes stay binary.
pub(crate) fn normalize(raw: RawResult) -> Payload {
    match raw {
        RawResult::None => Payload::Empty,
        RawResult::Bytes(bytes) => Payload::Binary(bytes),
        RawResult::Value(value) => payload_from_value(value),
        RawResult::Text(text) => {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return payload_from_value(value);
            }
            match xml::xml_to_value(&text) {
                Ok(value) => payload_from_value(value),
                Err(_) => Payload::Scalar(Value::String(text)),
            }
        }
    }
}

fn payload_from_value(value: Value) -> Payload {
    match value {
        Value::Object(map) => Payload::Mapping(map),
        Value::Array(items) => Payload::List(items),
        other => Payload::Scalar(other),
    }
}

/// Final classification: non-empty data or an explicit success from the
/// handler wins, everything else is an error.
pub(crate) fn finalize_kind(payload: &Payload, kind: ResultKind) -> ResultKind {
    if payload.is_truthy() || kind == ResultKind::Success {
        ResultKind::Success
    } else {
        ResultKind::Error
    }
}
