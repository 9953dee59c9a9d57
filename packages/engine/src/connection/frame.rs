// packages/engine/src/connection/frame.rs
//! Realtime frame codec
//!
//! Frames are text messages made of a short numeric prefix followed by an
//! optional JSON payload:
//!
//! | Direction | Prefix | Payload                    | Meaning                 |
//! |-----------|--------|----------------------------|-------------------------|
//! | out       | `40`   | `{"token": …}`             | identity announcement   |
//! | out       | `3`    | none                       | heartbeat               |
//! | out       | `42`   | `["TAP", {"taps": […]}]`   | action batch            |
//! | in        | `40`   | anything                   | handshake acknowledged  |
//! | in        | `42`   | `[event, data]`            | server event            |
//! | in        | `0`    | session parameters         | transport opened        |
//! | in        | `2`    | none                       | server ping             |

use serde::{Deserialize, Serialize};

/// Announcement / acknowledgment prefix
pub const HANDSHAKE_PREFIX: &str = "40";

/// Event frame prefix
pub const EVENT_PREFIX: &str = "42";

/// Heartbeat frame
pub const HEARTBEAT: &str = "3";

/// Event name of action batches
pub const TAP_EVENT: &str = "TAP";

/// Kind of every simulated action
pub const CLICK_ACTION: &str = "CLICK";

/// One simulated action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapAction {
    pub actions: String,

    /// Logical timestamp from the identity's simulation clock
    pub date: u64,
}

impl TapAction {
    pub fn click(date: u64) -> Self {
        Self {
            actions: CLICK_ACTION.to_string(),
            date,
        }
    }
}

/// Actions transmitted together in one frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapBatch {
    pub taps: Vec<TapAction>,
}

impl TapBatch {
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }
}

/// Frames the client sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Announce { token: String },
    Heartbeat,
    Taps(TapBatch),
}

impl OutboundFrame {
    pub fn encode(&self) -> String {
        match self {
            OutboundFrame::Announce { token } => {
                format!(
                    "{}{}",
                    HANDSHAKE_PREFIX,
                    serde_json::json!({ "token": token })
                )
            }
            OutboundFrame::Heartbeat => HEARTBEAT.to_string(),
            OutboundFrame::Taps(batch) => {
                format!("{}{}", EVENT_PREFIX, serde_json::json!([TAP_EVENT, batch]))
            }
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundFrame::Announce { .. } => "announce",
            OutboundFrame::Heartbeat => "heartbeat",
            OutboundFrame::Taps(_) => "taps",
        }
    }
}

/// Frames the server sends
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Transport-level open packet
    Open(String),

    /// The server accepted the identity announcement
    HandshakeAck(String),

    /// Named event with its payload
    Event {
        name: String,
        payload: serde_json::Value,
    },

    Ping,

    Other(String),
}

impl InboundFrame {
    pub fn decode(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix(HANDSHAKE_PREFIX) {
            return InboundFrame::HandshakeAck(rest.to_string());
        }

        if let Some(rest) = text.strip_prefix(EVENT_PREFIX) {
            if let Ok(serde_json::Value::Array(mut items)) = serde_json::from_str(rest) {
                if let Some(serde_json::Value::String(name)) = items.first().cloned() {
                    let payload = if items.len() > 1 {
                        items.remove(1)
                    } else {
                        serde_json::Value::Null
                    };
                    return InboundFrame::Event { name, payload };
                }
            }
            return InboundFrame::Other(text.to_string());
        }

        if text == "2" {
            return InboundFrame::Ping;
        }

        if let Some(rest) = text.strip_prefix('0') {
            return InboundFrame::Open(rest.to_string());
        }

        InboundFrame::Other(text.to_string())
    }

    pub fn is_handshake_ack(&self) -> bool {
        matches!(self, InboundFrame::HandshakeAck(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_announce() {
        let frame = OutboundFrame::Announce {
            token: "abc.def".into(),
        };
        assert_eq!(frame.encode(), r#"40{"token":"abc.def"}"#);
    }

    #[test]
    fn test_encode_heartbeat() {
        assert_eq!(OutboundFrame::Heartbeat.encode(), "3");
    }

    #[test]
    fn test_encode_taps() {
        let batch = TapBatch {
            taps: vec![TapAction::click(10_000), TapAction::click(10_250)],
        };
        assert_eq!(
            OutboundFrame::Taps(batch).encode(),
            r#"42["TAP",{"taps":[{"actions":"CLICK","date":10000},{"actions":"CLICK","date":10250}]}]"#
        );
    }

    #[test]
    fn test_decode_handshake_ack() {
        let frame = InboundFrame::decode(r#"40{"sid":"Xyz"}"#);
        assert!(frame.is_handshake_ack());
        assert_eq!(frame, InboundFrame::HandshakeAck(r#"{"sid":"Xyz"}"#.into()));
        assert!(InboundFrame::decode("40").is_handshake_ack());
    }

    #[test]
    fn test_decode_event() {
        let frame = InboundFrame::decode(r#"42["BALANCE",{"energy":12}]"#);
        assert_eq!(
            frame,
            InboundFrame::Event {
                name: "BALANCE".into(),
                payload: serde_json::json!({ "energy": 12 }),
            }
        );

        assert_eq!(
            InboundFrame::decode(r#"42["PING"]"#),
            InboundFrame::Event {
                name: "PING".into(),
                payload: serde_json::Value::Null,
            }
        );
        assert!(matches!(
            InboundFrame::decode("42{bad"),
            InboundFrame::Other(_)
        ));
    }

    #[test]
    fn test_decode_transport_frames() {
        assert_eq!(InboundFrame::decode("2"), InboundFrame::Ping);
        assert_eq!(
            InboundFrame::decode(r#"0{"sid":"a"}"#),
            InboundFrame::Open(r#"{"sid":"a"}"#.into())
        );
        assert_eq!(InboundFrame::decode("41"), InboundFrame::Other("41".into()));
        assert!(!InboundFrame::decode("41").is_handshake_ack());
    }
}
