//! DAP message envelopes (spec §3): a tagged value whose variants are
//! `Request`, `Response`, `Event`. Grounded on
//! `src/dap/yadap/protocol.rs::{DapRequest, DapResponse, DapEvent}`,
//! unified into one `Message` sum type instead of three free-standing
//! structs so the protocol engine can pattern-match on "what came off
//! the wire" the way spec §4.3 routes by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client request. `arguments` defaults to `null` when absent, as
/// DAP permits argument-less commands (`threads`, `configurationDone`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

/// The adapter's reply to a [`Request`]. `success=false` responses
/// carry a human-readable `message` (spec §7); the body is omitted
/// entirely rather than `null` on the wire, matching DAP clients'
/// expectations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub request_seq: i64,
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn success(request_seq: i64, command: impl Into<String>, body: Option<Value>) -> Self {
        Response {
            request_seq,
            command: command.into(),
            success: true,
            message: None,
            body,
        }
    }

    pub fn failure(request_seq: i64, command: impl Into<String>, message: impl Into<String>) -> Self {
        Response {
            request_seq,
            command: command.into(),
            success: false,
            message: Some(message.into()),
            body: None,
        }
    }
}

/// An adapter-initiated event (`stopped`, `output`, `initialized`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Event {
            event: event.into(),
            body,
        }
    }
}

/// The on-wire message envelope, tagged by `type` (spec §3, §4.3).
///
/// Every variant also carries the protocol-level `seq`: present on
/// every message the adapter emits, and read (but not required to be
/// meaningful) on inbound client requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(i64, Response),
    Event(i64, Event),
}

impl Message {
    /// Parses a raw JSON value into a typed [`Message`]. This is the
    /// codec's total function (spec §3: "every on-wire byte sequence
    /// parses to exactly one Message or a framing error"): unknown
    /// `type` values are rejected rather than silently dropped.
    pub fn decode(value: Value) -> Result<Message, serde_json::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            seq: i64,
            #[serde(rename = "type")]
            kind: String,
        }
        let envelope: Envelope = serde_json::from_value(value.clone())?;
        match envelope.kind.as_str() {
            "request" => Ok(Message::Request(serde_json::from_value(value)?)),
            "response" => Ok(Message::Response(envelope.seq, serde_json::from_value(value)?)),
            "event" => Ok(Message::Event(envelope.seq, serde_json::from_value(value)?)),
            other => Err(serde::de::Error::custom(format!("unknown message type: {other}"))),
        }
    }

    /// Serializes this message to its wire shape, stamping `seq`.
    pub fn encode(&self, seq: i64) -> Value {
        match self {
            Message::Request(request) => {
                let mut v = serde_json::to_value(request).unwrap();
                let obj = v.as_object_mut().unwrap();
                obj.insert("seq".into(), Value::from(seq));
                obj.insert("type".into(), Value::from("request"));
                v
            }
            Message::Response(_, response) => {
                let mut v = serde_json::to_value(response).unwrap();
                let obj = v.as_object_mut().unwrap();
                obj.insert("seq".into(), Value::from(seq));
                obj.insert("type".into(), Value::from("response"));
                v
            }
            Message::Event(_, event) => {
                let mut v = serde_json::to_value(event).unwrap();
                let obj = v.as_object_mut().unwrap();
                obj.insert("seq".into(), Value::from(seq));
                obj.insert("type".into(), Value::from("event"));
                v
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_request() {
        let raw = json!({"seq": 1, "type": "request", "command": "initialize", "arguments": {"adapterID": "x"}});
        let msg = Message::decode(raw).unwrap();
        match msg {
            Message::Request(r) => {
                assert_eq!(r.seq, 1);
                assert_eq!(r.command, "initialize");
            }
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn request_without_arguments_defaults_null() {
        let raw = json!({"seq": 2, "type": "request", "command": "threads"});
        let msg = Message::decode(raw).unwrap();
        match msg {
            Message::Request(r) => assert_eq!(r.arguments, Value::Null),
            _ => panic!("expected Request"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = json!({"seq": 1, "type": "bogus"});
        assert!(Message::decode(raw).is_err());
    }

    #[test]
    fn response_roundtrips_through_encode() {
        let response = Response::success(3, "threads", Some(json!({"threads": []})));
        let msg = Message::Response(9, response.clone());
        let encoded = msg.encode(9);
        assert_eq!(encoded["seq"], 9);
        assert_eq!(encoded["type"], "response");
        assert_eq!(encoded["request_seq"], 3);
        assert_eq!(encoded["success"], true);
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(decoded, Message::Response(9, response));
    }

    #[test]
    fn failed_response_omits_body() {
        let response = Response::failure(1, "evaluate", "Unsupported command: evaluate");
        let encoded = Message::Response(2, response).encode(2);
        assert!(encoded.get("body").is_none());
        assert_eq!(encoded["message"], "Unsupported command: evaluate");
    }
}
