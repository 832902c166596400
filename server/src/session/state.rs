use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::protocol::ParticipantInfo;

/// One attendee's live presence in a presentation
///
/// The session id is issued once and survives reconnects; the connection id
/// is the current transport channel and is rebound on resume.
#[derive(Debug, Clone)]
pub struct ParticipantSession {
    pub session_id: String,
    pub connection_id: Uuid,
    pub presentation_id: String,
    pub display_name: String,
    pub is_anonymous: bool,
    pub joined_at: u64,
    pub last_activity: u64,
}

impl ParticipantSession {
    pub fn new(
        presentation_id: &str,
        connection_id: Uuid,
        display_name: String,
        is_anonymous: bool,
    ) -> Self {
        let now = now_millis();
        Self {
            session_id: Uuid::new_v4().to_string(),
            connection_id,
            presentation_id: presentation_id.to_string(),
            display_name,
            is_anonymous,
            joined_at: now,
            last_activity: now,
        }
    }

    pub fn to_participant_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            session_id: self.session_id.clone(),
            display_name: self.display_name.clone(),
            is_anonymous: self.is_anonymous,
            joined_at: self.joined_at,
        }
    }
}

/// Get current timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
