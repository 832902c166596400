//! Join, resume, leave and disconnect flows
//!
//! Ties the access gate's connection identity to a [`ParticipantSession`],
//! room membership and the headcount broadcasts. Reconnection is a
//! best-effort optimization: a prior session id that no longer resolves
//! falls back to a fresh join, never an error.

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::ConnectionIdentity;
use crate::error::SyncError;
use crate::protocol::{PresentationSnapshot, ServerMessage};
use crate::rooms::{RoomBroadcaster, RoomKind, room_for};
use crate::session::state::now_millis;
use crate::session::{ParticipantSession, SessionRegistry};
use crate::store::{Presentation, PresentationStore, SlideStore};

/// Result of a successful join or resume
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session: ParticipantSession,
    pub snapshot: PresentationSnapshot,
    pub participant_count: usize,
    pub resumed: bool,
}

pub struct ParticipationService {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomBroadcaster>,
    presentations: Arc<dyn PresentationStore>,
    slides: Arc<dyn SlideStore>,
}

impl ParticipationService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomBroadcaster>,
        presentations: Arc<dyn PresentationStore>,
        slides: Arc<dyn SlideStore>,
    ) -> Self {
        Self {
            registry,
            rooms,
            presentations,
            slides,
        }
    }

    /// Join a presentation by access code, resuming a prior session when one
    /// is offered and still alive
    pub async fn join(
        &self,
        connection_id: Uuid,
        identity: &ConnectionIdentity,
        access_code: &str,
        display_name: Option<String>,
        prior_session_id: Option<String>,
    ) -> Result<JoinOutcome, SyncError> {
        let presentation = self
            .presentations
            .find_by_access_code(access_code)
            .await?
            .ok_or(SyncError::NotFound)?;

        if let Some(expires_at) = presentation.expires_at
            && now_millis() > expires_at
        {
            return Err(SyncError::Expired);
        }

        let total_slides = self
            .slides
            .count_by_presentation_id(&presentation.id)
            .await?;
        let snapshot = snapshot_of(&presentation, total_slides);

        // Resume path: rebind the old session instead of minting a new one
        if let Some(prior) = prior_session_id
            && let Some(resumed) = self.registry.resume(&prior, connection_id).await
        {
            if resumed.session.presentation_id == presentation.id {
                self.rooms
                    .rebind(resumed.previous_connection_id, connection_id)
                    .await;
                self.ensure_rooms(connection_id, identity, &presentation.id)
                    .await;

                let participant_count = self.registry.count_for(&presentation.id).await;
                counter!("slidecast_joins_total", "kind" => "resume").increment(1);
                info!(
                    "Session {} resumed into presentation {}",
                    resumed.session.session_id, presentation.id
                );
                return Ok(JoinOutcome {
                    session: resumed.session,
                    snapshot,
                    participant_count,
                    resumed: true,
                });
            }
            // Prior session belongs to a different presentation; drop it and
            // fall through to a fresh join
            debug!(
                "Prior session {} targets another presentation, discarding",
                resumed.session.session_id
            );
            self.registry
                .remove_by_session_id(&resumed.session.session_id)
                .await;
            self.rooms.leave_all(resumed.previous_connection_id).await;
            self.rooms.leave_all(connection_id).await;
        }

        let (name, is_anonymous) = resolve_display_name(identity, display_name);
        let session = self
            .registry
            .create(&presentation.id, connection_id, name, is_anonymous)
            .await;

        self.ensure_rooms(connection_id, identity, &presentation.id)
            .await;

        let participant_count = self.registry.count_for(&presentation.id).await;
        counter!("slidecast_joins_total", "kind" => "fresh").increment(1);

        let room = room_for(RoomKind::Presentation, &presentation.id);
        self.rooms
            .broadcast(
                &room,
                ServerMessage::ParticipantJoined {
                    presentation_id: presentation.id.clone(),
                    participant: session.to_participant_info(),
                    participant_count,
                    timestamp: now_millis(),
                },
            )
            .await;

        Ok(JoinOutcome {
            session,
            snapshot,
            participant_count,
            resumed: false,
        })
    }

    /// Explicit leave; unknown session ids are a quiet no-op
    pub async fn leave(&self, session_id: &str) -> Option<ParticipantSession> {
        let session = self.registry.remove_by_session_id(session_id).await?;
        self.rooms.leave_all(session.connection_id).await;
        self.announce_departure(&session).await;
        Some(session)
    }

    /// Connection loss takes the same path as an explicit leave
    pub async fn disconnect(&self, connection_id: Uuid) -> Option<ParticipantSession> {
        let session = self.registry.remove_by_connection_id(connection_id).await?;
        self.rooms.leave_all(connection_id).await;
        self.announce_departure(&session).await;
        Some(session)
    }

    /// Broadcast a departed session's headcount change to its presentation
    pub async fn announce_departure(&self, session: &ParticipantSession) {
        let participant_count = self.registry.count_for(&session.presentation_id).await;
        let room = room_for(RoomKind::Presentation, &session.presentation_id);
        self.rooms
            .broadcast(
                &room,
                ServerMessage::ParticipantLeft {
                    presentation_id: session.presentation_id.clone(),
                    session_id: session.session_id.clone(),
                    participant_count,
                    timestamp: now_millis(),
                },
            )
            .await;
    }

    async fn ensure_rooms(
        &self,
        connection_id: Uuid,
        identity: &ConnectionIdentity,
        presentation_id: &str,
    ) {
        self.rooms
            .join(connection_id, &room_for(RoomKind::Presentation, presentation_id))
            .await;
        if identity.is_presenter() {
            self.rooms
                .join(connection_id, &room_for(RoomKind::Presenter, presentation_id))
                .await;
        }
    }
}

fn snapshot_of(presentation: &Presentation, total_slides: u32) -> PresentationSnapshot {
    PresentationSnapshot {
        presentation_id: presentation.id.clone(),
        is_active: presentation.is_active,
        current_slide_index: presentation.current_slide_index,
        total_slides,
    }
}

/// A supplied display name wins; otherwise the identity's own name
fn resolve_display_name(
    identity: &ConnectionIdentity,
    display_name: Option<String>,
) -> (String, bool) {
    match identity {
        ConnectionIdentity::Presenter { principal_id } => (
            display_name.unwrap_or_else(|| principal_id.clone()),
            false,
        ),
        ConnectionIdentity::Participant {
            display_name: minted,
            is_anonymous,
            ..
        } => match display_name {
            Some(name) if !name.trim().is_empty() => (name, false),
            _ => (minted.clone(), *is_anonymous),
        },
    }
}
