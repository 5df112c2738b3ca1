//! Relay wire protocol: JSON arrays over WebSocket text frames.
//!
//! Client to relay: `["REQ", sub, filter...]`, `["EVENT", event]`,
//! `["CLOSE", sub]`. Relay to client: `["EVENT", sub, event]`,
//! `["OK", id, accepted, message]`, `["EOSE", sub]`, `["NOTICE", message]`,
//! `["CLOSED", sub, message]`, `["AUTH", challenge]`.

use bunker_core::{BunkerError, Envelope, Filter};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("relay message is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("relay message is not a non-empty array")]
    NotAnArray,

    #[error("unknown relay message type {0:?}")]
    UnknownType(String),

    #[error("malformed {0} message")]
    Malformed(&'static str),
}

impl From<WireError> for BunkerError {
    fn from(e: WireError) -> Self {
        BunkerError::Transport(e.to_string())
    }
}

/// Messages we send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    Event(Envelope),
    Close(String),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, WireError> {
        let value = match self {
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut parts = vec![json!("REQ"), json!(subscription_id)];
                for filter in filters {
                    parts.push(serde_json::to_value(filter)?);
                }
                Value::Array(parts)
            }
            Self::Event(event) => json!(["EVENT", event]),
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
        };
        Ok(value.to_string())
    }
}

/// Messages a relay sends us.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Box<Envelope>,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose(String),
    Notice(String),
    Closed {
        subscription_id: String,
        message: String,
    },
    Auth(String),
}

impl RelayMessage {
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        let parts = value.as_array().filter(|a| !a.is_empty()).ok_or(WireError::NotAnArray)?;
        let kind = parts[0].as_str().ok_or(WireError::NotAnArray)?;
        let text_at = |i: usize| parts.get(i).and_then(Value::as_str).map(str::to_string);

        match kind {
            "EVENT" => {
                let subscription_id = text_at(1).ok_or(WireError::Malformed("EVENT"))?;
                let event = parts.get(2).ok_or(WireError::Malformed("EVENT"))?;
                Ok(Self::Event {
                    subscription_id,
                    event: Box::new(serde_json::from_value(event.clone())?),
                })
            }
            "OK" => Ok(Self::Ok {
                event_id: text_at(1).ok_or(WireError::Malformed("OK"))?,
                accepted: parts
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or(WireError::Malformed("OK"))?,
                message: text_at(3).unwrap_or_default(),
            }),
            "EOSE" => Ok(Self::Eose(text_at(1).ok_or(WireError::Malformed("EOSE"))?)),
            "NOTICE" => Ok(Self::Notice(text_at(1).unwrap_or_default())),
            "CLOSED" => Ok(Self::Closed {
                subscription_id: text_at(1).ok_or(WireError::Malformed("CLOSED"))?,
                message: text_at(2).unwrap_or_default(),
            }),
            "AUTH" => Ok(Self::Auth(text_at(1).ok_or(WireError::Malformed("AUTH"))?)),
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunker_core::{Identity, KIND_NOSTR_CONNECT};

    fn event() -> Envelope {
        Envelope {
            id: "ab".repeat(32),
            pubkey: Identity::from("cd".repeat(32)),
            created_at: 1_700_000_000,
            kind: KIND_NOSTR_CONNECT,
            tags: vec![vec!["p".into(), "ef".repeat(32)]],
            content: "ciphertext".into(),
            sig: "00".repeat(64),
        }
    }

    #[test]
    fn req_carries_filters_inline() {
        let msg = ClientMessage::Req {
            subscription_id: "sub1".into(),
            filters: vec![Filter {
                kinds: vec![KIND_NOSTR_CONNECT],
                p_tags: vec!["L".into()],
                since: Some(5),
            }],
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!(["REQ", "sub1", {"kinds": [24133], "#p": ["L"], "since": 5}])
        );
    }

    #[test]
    fn event_and_close() {
        let json = ClientMessage::Event(event()).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0], "EVENT");
        assert_eq!(value[1]["kind"], 24133);
        assert_eq!(ClientMessage::Close("s".into()).to_json().unwrap(), r#"["CLOSE","s"]"#);
    }

    #[test]
    fn parses_relay_event() {
        let text = json!(["EVENT", "sub1", event()]).to_string();
        assert_eq!(
            RelayMessage::parse(&text).unwrap(),
            RelayMessage::Event {
                subscription_id: "sub1".into(),
                event: Box::new(event()),
            }
        );
    }

    #[test]
    fn parses_status_messages() {
        assert_eq!(
            RelayMessage::parse(r#"["OK","abc",false,"blocked: spam"]"#).unwrap(),
            RelayMessage::Ok {
                event_id: "abc".into(),
                accepted: false,
                message: "blocked: spam".into(),
            }
        );
        assert_eq!(
            RelayMessage::parse(r#"["EOSE","sub1"]"#).unwrap(),
            RelayMessage::Eose("sub1".into())
        );
        assert_eq!(
            RelayMessage::parse(r#"["NOTICE","slow down"]"#).unwrap(),
            RelayMessage::Notice("slow down".into())
        );
        assert_eq!(
            RelayMessage::parse(r#"["CLOSED","sub1","auth-required: sign in"]"#).unwrap(),
            RelayMessage::Closed {
                subscription_id: "sub1".into(),
                message: "auth-required: sign in".into(),
            }
        );
        assert_eq!(
            RelayMessage::parse(r#"["AUTH","challenge"]"#).unwrap(),
            RelayMessage::Auth("challenge".into())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(RelayMessage::parse("nope"), Err(WireError::Json(_))));
        assert!(matches!(RelayMessage::parse("[]"), Err(WireError::NotAnArray)));
        assert!(matches!(RelayMessage::parse("{}"), Err(WireError::NotAnArray)));
        assert!(matches!(
            RelayMessage::parse(r#"["COUNT","x",{}]"#),
            Err(WireError::UnknownType(_))
        ));
        assert!(matches!(
            RelayMessage::parse(r#"["EVENT","sub1"]"#),
            Err(WireError::Malformed("EVENT"))
        ));
        assert!(matches!(
            RelayMessage::parse(r#"["EVENT","sub1",{"id":1}]"#),
            Err(WireError::Json(_))
        ));
    }
}
