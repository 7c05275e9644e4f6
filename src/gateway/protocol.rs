//! Downstream client protocol
//!
//! JSON text frames between browser clients and the gateway:
//!
//! ```text
//! C → S  {"address":"<string>"}
//! S → C  {"type":"SUBSCRIBED","address":"<string>"}
//! S → C  {"type":"ERROR","message":"<string>"}
//! S → C  {"type":"NEW_TRANSACTION","signature":"<string>","err":<null|object>,"logs":[...]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Subscribe request from a client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRequest {
    #[serde(default)]
    pub address: Option<String>,
}

impl ClientRequest {
    /// Parse a text frame and extract the requested address
    ///
    /// Only a JSON object is accepted. The address is returned with
    /// surrounding whitespace removed; that trimmed value is what gets
    /// subscribed and echoed back in `SUBSCRIBED`.
    pub fn parse_address(text: &str) -> Result<String, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidFormat)?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidFormat);
        }
        let request: ClientRequest =
            serde_json::from_value(value).map_err(|_| ProtocolError::InvalidFormat)?;

        match request.address {
            Some(address) if !address.trim().is_empty() => Ok(address.trim().to_string()),
            _ => Err(ProtocolError::MissingAddress),
        }
    }
}

/// Event pushed to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    /// Request accepted and queued upstream
    Subscribed { address: String },

    /// Request rejected
    Error { message: String },

    /// Activity on the subscribed address
    NewTransaction {
        signature: String,
        err: Value,
        logs: Vec<Value>,
    },
}

impl ServerEvent {
    /// Error event for a protocol failure
    pub fn error(e: &ProtocolError) -> Self {
        ServerEvent::Error {
            message: e.client_message().to_string(),
        }
    }

    /// Normalize an upstream notification payload
    ///
    /// Log notifications wrap the transaction in `{"context":..,"value":..}`;
    /// payloads without `value` are read directly.
    pub fn from_notification(payload: &Value) -> Self {
        let value = payload.get("value").unwrap_or(payload);

        ServerEvent::NewTransaction {
            signature: value
                .get("signature")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            err: value.get("err").cloned().unwrap_or(Value::Null),
            logs: value
                .get("logs")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(
            ClientRequest::parse_address(r#"{"address":"AAA1"}"#),
            Ok("AAA1".to_string())
        );
        assert_eq!(
            ClientRequest::parse_address(r#"{"address":"  AAA1 ","extra":1}"#),
            Ok("AAA1".to_string())
        );
    }

    #[test]
    fn test_parse_invalid_format() {
        assert_eq!(
            ClientRequest::parse_address("AAA1"),
            Err(ProtocolError::InvalidFormat)
        );
        assert_eq!(
            ClientRequest::parse_address(r#"{"address":42}"#),
            Err(ProtocolError::InvalidFormat)
        );
        assert_eq!(
            ClientRequest::parse_address(r#""AAA1""#),
            Err(ProtocolError::InvalidFormat)
        );
    }

    #[test]
    fn test_parse_rejects_arrays() {
        assert_eq!(
            ClientRequest::parse_address(r#"["AAA1"]"#),
            Err(ProtocolError::InvalidFormat)
        );
        assert_eq!(
            ClientRequest::parse_address("[]"),
            Err(ProtocolError::InvalidFormat)
        );
        assert_eq!(
            ClientRequest::parse_address("null"),
            Err(ProtocolError::InvalidFormat)
        );
    }

    #[test]
    fn test_parse_missing_address() {
        assert_eq!(
            ClientRequest::parse_address("{}"),
            Err(ProtocolError::MissingAddress)
        );
        assert_eq!(
            ClientRequest::parse_address(r#"{"address":"   "}"#),
            Err(ProtocolError::MissingAddress)
        );
        assert_eq!(
            ClientRequest::parse_address(r#"{"address":null}"#),
            Err(ProtocolError::MissingAddress)
        );
    }

    #[test]
    fn test_event_wire_format() {
        let subscribed = ServerEvent::Subscribed {
            address: "AAA1".into(),
        };
        let value: Value = serde_json::from_str(&subscribed.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "SUBSCRIBED", "address": "AAA1"}));

        let error = ServerEvent::error(&ProtocolError::InvalidFormat);
        let value: Value = serde_json::from_str(&error.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "ERROR", "message": "Invalid message format"})
        );
    }

    #[test]
    fn test_from_log_notification() {
        let payload = json!({
            "context": {"slot": 5208469},
            "value": {"signature": "sig1", "err": null, "logs": ["a"]}
        });

        let event = ServerEvent::from_notification(&payload);
        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "NEW_TRANSACTION", "signature": "sig1", "err": null, "logs": ["a"]})
        );
    }

    #[test]
    fn test_from_notification_with_error() {
        let payload = json!({
            "value": {"signature": "sig2", "err": {"InstructionError": [0, "Custom"]}, "logs": []}
        });

        match ServerEvent::from_notification(&payload) {
            ServerEvent::NewTransaction { signature, err, logs } => {
                assert_eq!(signature, "sig2");
                assert_eq!(err, json!({"InstructionError": [0, "Custom"]}));
                assert!(logs.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_from_bare_payload() {
        let event = ServerEvent::from_notification(&json!({"signature": "sig3"}));
        assert_eq!(
            event,
            ServerEvent::NewTransaction {
                signature: "sig3".into(),
                err: Value::Null,
                logs: vec![],
            }
        );
    }
}
