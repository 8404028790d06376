use crate::engine::{PlayerAction, SeatIndex, TableState};
use serde::{Deserialize, Serialize};

/// Inbound client message, envelope `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum InboundMessage {
    #[serde(rename = "joinTable")]
    JoinTable { player_id: String, name: String },
    #[serde(rename = "reserveSeat")]
    ReserveSeat {
        player_id: String,
        name: String,
        seat_index: SeatIndex,
    },
    #[serde(rename = "leaveTable")]
    LeaveTable { player_id: Option<String> },
    #[serde(rename = "leaveAfterHand")]
    LeaveAfterHand { player_id: Option<String> },
    #[serde(rename = "cancelLeaveAfterHand")]
    CancelLeaveAfterHand { player_id: Option<String> },
    #[serde(rename = "action")]
    Action {
        player_id: String,
        #[serde(flatten)]
        action: PlayerAction,
    },
    #[serde(rename = "nextHandGaugeComplete")]
    NextHandGaugeComplete { player_id: Option<String> },
    #[serde(rename = "revealHand")]
    RevealHand { player_id: Option<String> },
    #[serde(rename = "syncState")]
    SyncState,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "startHand")]
    StartHand,
    #[serde(rename = "resetTable")]
    ResetTable,
    #[serde(rename = "setAutoPlay")]
    SetAutoPlay {
        player_id: Option<String>,
        enabled: bool,
    },
}

/// Outbound message sent to one or all connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutboundMessage {
    #[serde(rename = "tableState")]
    TableState(TableState),
    #[serde(rename = "handState")]
    HandState(TableState),
    #[serde(rename = "actionApplied")]
    ActionApplied {
        player_id: String,
        action: PlayerAction,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_table() {
        let raw = r#"{"type":"joinTable","payload":{"player_id":"p1","name":"Ann"}}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        matches!(msg, InboundMessage::JoinTable { .. });
    }

    #[test]
    fn parses_raise_action() {
        let raw = r#"{"type":"action","payload":{"player_id":"p1","action":"raise","amount":40}}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        match msg {
            InboundMessage::Action { player_id, action } => {
                assert_eq!(player_id, "p1");
                assert_eq!(action, PlayerAction::Raise { amount: 40 });
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn parses_heartbeat_with_no_payload() {
        let raw = r#"{"type":"heartbeat"}"#;
        let msg: InboundMessage = serde_json::from_str(raw).unwrap();
        matches!(msg, InboundMessage::Heartbeat);
    }
}
