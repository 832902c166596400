use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Client to Server messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a presentation by access code; `prior_session_id` asks for a resume
    Join {
        access_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prior_session_id: Option<String>,
        seq: u64,
    },
    /// Leave the presentation (fire-and-forget, no ack)
    Leave { session_id: String },
    /// Start the presentation (presenter only)
    StartPresentation { presentation_id: String, seq: u64 },
    /// Stop the presentation (presenter only)
    StopPresentation { presentation_id: String, seq: u64 },
    /// Advance one slide (presenter only)
    NextSlide { presentation_id: String, seq: u64 },
    /// Go back one slide (presenter only)
    PrevSlide { presentation_id: String, seq: u64 },
    /// Jump to a specific slide (presenter only)
    GotoSlide {
        presentation_id: String,
        slide_index: i64,
        seq: u64,
    },
    /// Ping for keepalive
    Ping { seq: u64 },
}

/// Server to Client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Successfully joined (or resumed into) a presentation
    Joined {
        ack_seq: u64,
        session_id: String,
        participant: ParticipantInfo,
        snapshot: PresentationSnapshot,
        participant_count: usize,
    },
    /// Acknowledgment of a successful control action
    ControlAck {
        ack_seq: u64,
        is_active: bool,
        current_slide_index: u32,
        total_slides: u32,
    },
    /// A request failed; `ack_seq` correlates to the triggering message
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        ack_seq: Option<u64>,
        code: ErrorCode,
        message: String,
    },
    /// The presentation went live
    PresentationStarted {
        presentation_id: String,
        current_slide_index: u32,
        total_slides: u32,
        timestamp: u64,
    },
    /// The presentation ended
    PresentationStopped {
        presentation_id: String,
        timestamp: u64,
    },
    /// The presenter moved to another slide
    SlideChanged {
        presentation_id: String,
        current_slide_index: u32,
        total_slides: u32,
        timestamp: u64,
    },
    /// A participant joined the presentation
    ParticipantJoined {
        presentation_id: String,
        participant: ParticipantInfo,
        participant_count: usize,
        timestamp: u64,
    },
    /// A participant left (explicit leave, disconnect, or inactivity sweep)
    ParticipantLeft {
        presentation_id: String,
        session_id: String,
        participant_count: usize,
        timestamp: u64,
    },
    /// Pong response (to client's Ping)
    Pong { ack_seq: u64 },
    /// Ping for keepalive (server to client)
    Ping,
}

/// Participant identity as shared with the room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub session_id: String,
    pub display_name: String,
    pub is_anonymous: bool,
    pub joined_at: u64,
}

/// Fresh view of the presentation's play state
///
/// Always rebuilt from the stores; never cached across requests, so a
/// resuming client catches up on everything it missed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationSnapshot {
    pub presentation_id: String,
    pub is_active: bool,
    pub current_slide_index: u32,
    pub total_slides: u32,
}

impl ClientMessage {
    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave { .. } => "leave",
            ClientMessage::StartPresentation { .. } => "start_presentation",
            ClientMessage::StopPresentation { .. } => "stop_presentation",
            ClientMessage::NextSlide { .. } => "next_slide",
            ClientMessage::PrevSlide { .. } => "prev_slide",
            ClientMessage::GotoSlide { .. } => "goto_slide",
            ClientMessage::Ping { .. } => "ping",
        }
    }
}

impl ServerMessage {
    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::ControlAck { .. } => "control_ack",
            ServerMessage::Error { .. } => "error",
            ServerMessage::PresentationStarted { .. } => "presentation_started",
            ServerMessage::PresentationStopped { .. } => "presentation_stopped",
            ServerMessage::SlideChanged { .. } => "slide_changed",
            ServerMessage::ParticipantJoined { .. } => "participant_joined",
            ServerMessage::ParticipantLeft { .. } => "participant_left",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Ping => "ping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_round_trips_with_optional_fields_absent() {
        let json = r#"{"type":"join","access_code":"ABC123","seq":1}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join {
                access_code,
                display_name,
                prior_session_id,
                seq,
            } => {
                assert_eq!(access_code, "ABC123");
                assert!(display_name.is_none());
                assert!(prior_session_id.is_none());
                assert_eq!(seq, 1);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_error_carries_stable_code() {
        let msg = ServerMessage::Error {
            ack_seq: Some(7),
            code: ErrorCode::OutOfRange,
            message: "valid range 0-2".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"OutOfRange\""));
        assert!(json.contains("\"ack_seq\":7"));
    }

    #[test]
    fn test_goto_slide_accepts_negative_index_on_the_wire() {
        let json = r#"{"type":"goto_slide","presentation_id":"pres-1","slide_index":-1,"seq":3}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GotoSlide {
                slide_index: -1,
                ..
            }
        ));
    }
}
