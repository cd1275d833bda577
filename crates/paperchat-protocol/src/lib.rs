//! Wire protocol for the paperchat answer service.
//!
//! The server streams one JSON object per WebSocket text frame while it works
//! through its answer pipeline. Each frame carries a `type` discriminator;
//! everything the client sends travels as a [`ClientQuery`] frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminators the decoder accepts. Anything else is protocol drift and
/// is reported as [`DecodeError::UnknownKind`] rather than dropped.
pub const KNOWN_EVENT_KINDS: [&str; 6] = [
    "query_received",
    "node_enter",
    "node_exit",
    "content",
    "done",
    "error",
];

/// Events streamed from the server during query processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The server accepted the query and bound it to a conversation thread.
    #[serde(rename = "query_received")]
    QueryAccepted { thread_id: String },

    /// A pipeline stage began executing.
    #[serde(rename = "node_enter")]
    StageEnter {
        #[serde(rename = "node")]
        stage: String,
    },

    /// A pipeline stage finished.
    #[serde(rename = "node_exit")]
    StageExit {
        #[serde(rename = "node")]
        stage: String,
    },

    /// An incremental piece of the answer text.
    #[serde(rename = "content")]
    Fragment {
        #[serde(rename = "data")]
        text: String,
    },

    /// The answer is complete.
    #[serde(rename = "done")]
    Completed,

    /// The server failed to answer the query.
    #[serde(rename = "error")]
    Failed { message: String },
}

impl ServerEvent {
    /// Decode one inbound text frame.
    ///
    /// Decoding is two-step: the frame is parsed to a JSON value first so the
    /// discriminator can be inspected and reported precisely on failure.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw).map_err(DecodeError::Syntax)?;

        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(DecodeError::MissingKind);
        };

        if !KNOWN_EVENT_KINDS.contains(&kind) {
            return Err(DecodeError::UnknownKind(kind.to_string()));
        }

        let kind = kind.to_string();
        serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
    }
}

/// The single frame a client sends: one query per submitted turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientQuery {
    pub query: String,
}

impl ClientQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Encode for transmission.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Syntax(serde_json::Error),

    /// The frame has no `type` discriminator.
    #[error("frame has no type discriminator")]
    MissingKind,

    /// The discriminator is not one the client knows about.
    #[error("unrecognized event type {0:?}")]
    UnknownKind(String),

    /// The discriminator is known but the payload does not match it.
    #[error("malformed {kind:?} event: {source}")]
    Payload {
        kind: String,
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(event: &ServerEvent) -> ServerEvent {
        let encoded = serde_json::to_string(event).unwrap();
        ServerEvent::parse(&encoded).unwrap()
    }

    #[test]
    fn test_roundtrip_all_variants() {
        let events = [
            ServerEvent::QueryAccepted {
                thread_id: "t-1".to_string(),
            },
            ServerEvent::StageEnter {
                stage: "retrieval".to_string(),
            },
            ServerEvent::StageExit {
                stage: "retrieval".to_string(),
            },
            ServerEvent::Fragment {
                text: "partial answer ".to_string(),
            },
            ServerEvent::Completed,
            ServerEvent::Failed {
                message: "model unavailable".to_string(),
            },
        ];
        for event in &events {
            assert_eq!(&roundtrip(event), event);
        }
    }

    #[test]
    fn test_wire_names_match_server() {
        let enter = ServerEvent::parse(r#"{"type":"node_enter","node":"planner"}"#).unwrap();
        assert_eq!(
            enter,
            ServerEvent::StageEnter {
                stage: "planner".to_string()
            }
        );

        let fragment = ServerEvent::parse(r#"{"type":"content","data":"The "}"#).unwrap();
        assert_eq!(
            fragment,
            ServerEvent::Fragment {
                text: "The ".to_string()
            }
        );

        assert_eq!(
            ServerEvent::parse(r#"{"type":"done"}"#).unwrap(),
            ServerEvent::Completed
        );
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            ServerEvent::parse("not json"),
            Err(DecodeError::Syntax(_))
        ));
    }

    #[test]
    fn test_rejects_missing_discriminator() {
        assert!(matches!(
            ServerEvent::parse(r#"{"node":"planner"}"#),
            Err(DecodeError::MissingKind)
        ));
    }

    #[test]
    fn test_rejects_unknown_discriminator() {
        let err = ServerEvent::parse(r#"{"type":"node_pause","node":"planner"}"#).unwrap_err();
        match err {
            DecodeError::UnknownKind(kind) => assert_eq!(kind, "node_pause"),
            other => panic!("expected UnknownKind, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_payload() {
        let err = ServerEvent::parse(r#"{"type":"content"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Payload { .. }));
    }

    #[test]
    fn test_client_query_frame() {
        let frame = ClientQuery::new("What is X?").to_frame().unwrap();
        assert_eq!(frame, r#"{"query":"What is X?"}"#);
    }
}
