//! Printer-agent wire protocol.
//!
//! Frames are JSON objects discriminated by a `type` field. An unknown or
//! missing `type` decodes to [`InboundMessage::Unknown`]; anything that is not
//! a JSON object is a [`ProtocolError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

pub const REGISTER_PRINTER: &str = "register_printer";
pub const SET_DEFAULT: &str = "set_default";

/// Reply text sent after a successful `set_default`.
pub const DEFAULT_SET_MESSAGE: &str = "Set as default printer";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    RegisterPrinter { printer_name: Option<String> },
    SetDefault,
    /// Forward-compatible catch-all; carries the `type` if there was one.
    Unknown { kind: Option<String> },
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::Decode("expected a JSON object".into()));
        };

        let kind = map.get("type").and_then(Value::as_str);
        Ok(match kind {
            Some(REGISTER_PRINTER) => Self::RegisterPrinter {
                printer_name: map
                    .get("printer_name")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            },
            Some(SET_DEFAULT) => Self::SetDefault,
            other => Self::Unknown {
                kind: other.map(str::to_owned),
            },
        })
    }
}

/// Server → agent status notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "status")]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn default_set() -> Self {
        Self::new(DEFAULT_SET_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_register_printer() {
        let msg = InboundMessage::decode(r#"{"type":"register_printer","printer_name":"Zebra"}"#)
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::RegisterPrinter {
                printer_name: Some("Zebra".into())
            }
        );
    }

    #[test]
    fn decode_register_printer_without_name() {
        let msg = InboundMessage::decode(r#"{"type":"register_printer"}"#).unwrap();
        assert_eq!(msg, InboundMessage::RegisterPrinter { printer_name: None });
    }

    #[test]
    fn decode_set_default() {
        let msg = InboundMessage::decode(r#"{"type":"set_default"}"#).unwrap();
        assert_eq!(msg, InboundMessage::SetDefault);
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let msg = InboundMessage::decode(r#"{"type":"paper_low","tray":2}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Unknown {
                kind: Some("paper_low".into())
            }
        );
    }

    #[test]
    fn missing_type_is_unknown() {
        let msg = InboundMessage::decode(r#"{"printer_name":"x"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown { kind: None });
    }

    #[test]
    fn non_string_type_is_unknown() {
        let msg = InboundMessage::decode(r#"{"type":7}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unknown { kind: None });
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let err = InboundMessage::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn non_object_json_is_a_decode_error() {
        assert!(InboundMessage::decode("[1,2,3]").is_err());
        assert!(InboundMessage::decode("\"set_default\"").is_err());
        assert!(InboundMessage::decode("").is_err());
    }

    #[test]
    fn status_message_wire_shape() {
        let json = serde_json::to_value(StatusMessage::default_set()).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], DEFAULT_SET_MESSAGE);
    }
}
