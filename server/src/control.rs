//! Presentation control state machine
//!
//! Presenter-facing coordinator for start/stop/slide navigation. Every
//! operation reads the authoritative record fresh, validates the transition
//! and the caller's authority, persists the new state, and only then
//! broadcasts it. A persistence failure aborts the transition: nothing is
//! announced that was not durably committed.

use metrics::counter;
use std::sync::Arc;
use tracing::info;

use crate::error::SyncError;
use crate::protocol::ServerMessage;
use crate::rooms::{RoomBroadcaster, RoomKind, room_for};
use crate::session::state::now_millis;
use crate::store::{Presentation, PresentationStore, SlideStore};

/// State returned to the presenter after a successful transition
#[derive(Debug, Clone, Copy)]
pub struct ControlOutcome {
    pub is_active: bool,
    pub current_slide_index: u32,
    pub total_slides: u32,
}

pub struct PresentationControlCoordinator {
    presentations: Arc<dyn PresentationStore>,
    slides: Arc<dyn SlideStore>,
    rooms: Arc<RoomBroadcaster>,
}

impl PresentationControlCoordinator {
    pub fn new(
        presentations: Arc<dyn PresentationStore>,
        slides: Arc<dyn SlideStore>,
        rooms: Arc<RoomBroadcaster>,
    ) -> Self {
        Self {
            presentations,
            slides,
            rooms,
        }
    }

    pub async fn start(
        &self,
        presentation_id: &str,
        principal: &str,
    ) -> Result<ControlOutcome, SyncError> {
        let (mut presentation, total_slides) =
            self.load_authorized(presentation_id, principal).await?;

        if presentation.is_active {
            return Err(SyncError::InvalidState(
                "presentation already active".to_string(),
            ));
        }
        if total_slides == 0 {
            return Err(SyncError::Precondition);
        }

        presentation.is_active = true;
        presentation.current_slide_index = 0;
        self.presentations.save(&presentation).await?;

        counter!("slidecast_control_transitions_total", "op" => "start").increment(1);
        info!("Presentation {} started by {}", presentation_id, principal);

        let message = ServerMessage::PresentationStarted {
            presentation_id: presentation_id.to_string(),
            current_slide_index: 0,
            total_slides,
            timestamp: now_millis(),
        };
        self.announce_to_presentation_and_presenter(presentation_id, message)
            .await;

        Ok(ControlOutcome {
            is_active: true,
            current_slide_index: 0,
            total_slides,
        })
    }

    pub async fn stop(
        &self,
        presentation_id: &str,
        principal: &str,
    ) -> Result<ControlOutcome, SyncError> {
        let (mut presentation, total_slides) =
            self.load_authorized(presentation_id, principal).await?;

        if !presentation.is_active {
            return Err(SyncError::InvalidState(
                "presentation not active".to_string(),
            ));
        }

        presentation.is_active = false;
        self.presentations.save(&presentation).await?;

        counter!("slidecast_control_transitions_total", "op" => "stop").increment(1);
        info!("Presentation {} stopped by {}", presentation_id, principal);

        let message = ServerMessage::PresentationStopped {
            presentation_id: presentation_id.to_string(),
            timestamp: now_millis(),
        };
        self.announce_to_presentation_and_presenter(presentation_id, message)
            .await;

        Ok(ControlOutcome {
            is_active: false,
            current_slide_index: presentation.current_slide_index,
            total_slides,
        })
    }

    pub async fn goto_slide(
        &self,
        presentation_id: &str,
        principal: &str,
        index: i64,
    ) -> Result<ControlOutcome, SyncError> {
        let (presentation, total_slides) =
            self.load_authorized(presentation_id, principal).await?;
        require_active(&presentation)?;

        if index < 0 || index >= total_slides as i64 {
            return Err(SyncError::OutOfRange {
                index,
                max: total_slides.saturating_sub(1),
            });
        }

        self.commit_slide_change(presentation, index as u32, total_slides, "goto")
            .await
    }

    pub async fn next_slide(
        &self,
        presentation_id: &str,
        principal: &str,
    ) -> Result<ControlOutcome, SyncError> {
        let (presentation, total_slides) =
            self.load_authorized(presentation_id, principal).await?;
        require_active(&presentation)?;

        if presentation.current_slide_index + 1 >= total_slides {
            return Err(SyncError::AlreadyAtBoundary("already at last slide"));
        }

        let next = presentation.current_slide_index + 1;
        self.commit_slide_change(presentation, next, total_slides, "next")
            .await
    }

    pub async fn prev_slide(
        &self,
        presentation_id: &str,
        principal: &str,
    ) -> Result<ControlOutcome, SyncError> {
        let (presentation, total_slides) =
            self.load_authorized(presentation_id, principal).await?;
        require_active(&presentation)?;

        if presentation.current_slide_index == 0 {
            return Err(SyncError::AlreadyAtBoundary("already at first slide"));
        }

        let prev = presentation.current_slide_index - 1;
        self.commit_slide_change(presentation, prev, total_slides, "prev")
            .await
    }

    /// Load the record and slide count, enforcing presenter authority
    async fn load_authorized(
        &self,
        presentation_id: &str,
        principal: &str,
    ) -> Result<(Presentation, u32), SyncError> {
        let presentation = self
            .presentations
            .find_by_id(presentation_id)
            .await?
            .ok_or(SyncError::NotFound)?;

        if presentation.presenter_id != principal {
            return Err(SyncError::Forbidden);
        }

        let total_slides = self.slides.count_by_presentation_id(presentation_id).await?;
        Ok((presentation, total_slides))
    }

    async fn commit_slide_change(
        &self,
        mut presentation: Presentation,
        new_index: u32,
        total_slides: u32,
        op: &'static str,
    ) -> Result<ControlOutcome, SyncError> {
        presentation.current_slide_index = new_index;
        self.presentations.save(&presentation).await?;

        counter!("slidecast_control_transitions_total", "op" => op).increment(1);
        info!(
            "Presentation {} moved to slide {} ({})",
            presentation.id, new_index, op
        );

        let room = room_for(RoomKind::Presentation, &presentation.id);
        self.rooms
            .broadcast(
                &room,
                ServerMessage::SlideChanged {
                    presentation_id: presentation.id.clone(),
                    current_slide_index: new_index,
                    total_slides,
                    timestamp: now_millis(),
                },
            )
            .await;

        Ok(ControlOutcome {
            is_active: true,
            current_slide_index: new_index,
            total_slides,
        })
    }

    /// Start/stop announcements also reach the presenter room so
    /// co-presenters and other tabs stay in sync
    async fn announce_to_presentation_and_presenter(
        &self,
        presentation_id: &str,
        message: ServerMessage,
    ) {
        let presentation_room = room_for(RoomKind::Presentation, presentation_id);
        let presenter_room = room_for(RoomKind::Presenter, presentation_id);
        self.rooms
            .broadcast(&presentation_room, message.clone())
            .await;
        self.rooms.broadcast(&presenter_room, message).await;
    }
}

fn require_active(presentation: &Presentation) -> Result<(), SyncError> {
    if !presentation.is_active {
        return Err(SyncError::InvalidState(
            "presentation not active".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rooms::room_for;
    use crate::store::{MemoryPresentationStore, MemorySlideStore, StoreError};
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Fixture {
        control: PresentationControlCoordinator,
        presentations: Arc<MemoryPresentationStore>,
        rooms: Arc<RoomBroadcaster>,
    }

    async fn fixture(is_active: bool, current: u32, total: u32) -> Fixture {
        let presentations = Arc::new(MemoryPresentationStore::new());
        let slides = Arc::new(MemorySlideStore::new());
        let rooms = Arc::new(RoomBroadcaster::new());

        presentations
            .insert(Presentation {
                id: "pres-1".to_string(),
                access_code: "ABC123".to_string(),
                presenter_id: "p1".to_string(),
                title: "Demo".to_string(),
                is_active,
                current_slide_index: current,
                expires_at: None,
            })
            .await;
        slides.set_count("pres-1", total).await;

        let control = PresentationControlCoordinator::new(
            presentations.clone(),
            slides.clone(),
            rooms.clone(),
        );
        Fixture {
            control,
            presentations,
            rooms,
        }
    }

    /// Subscribe a fake connection to the presentation room
    async fn listen(rooms: &RoomBroadcaster, room: &str) -> mpsc::Receiver<ServerMessage> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(8);
        rooms.register_connection(id, tx);
        rooms.join(id, room).await;
        rx
    }

    #[tokio::test]
    async fn test_start_activates_at_slide_zero_and_notifies_both_rooms() {
        let f = fixture(false, 0, 3).await;
        let presentation_room = room_for(RoomKind::Presentation, "pres-1");
        let presenter_room = room_for(RoomKind::Presenter, "pres-1");
        let mut room_rx = listen(&f.rooms, &presentation_room).await;
        let mut presenter_rx = listen(&f.rooms, &presenter_room).await;

        let outcome = f.control.start("pres-1", "p1").await.unwrap();
        assert!(outcome.is_active);
        assert_eq!(outcome.current_slide_index, 0);
        assert_eq!(outcome.total_slides, 3);

        assert!(matches!(
            room_rx.recv().await,
            Some(ServerMessage::PresentationStarted {
                current_slide_index: 0,
                total_slides: 3,
                ..
            })
        ));
        assert!(matches!(
            presenter_rx.recv().await,
            Some(ServerMessage::PresentationStarted { .. })
        ));

        let stored = f.presentations.find_by_id("pres-1").await.unwrap().unwrap();
        assert!(stored.is_active);
    }

    #[tokio::test]
    async fn test_start_when_active_is_invalid_state() {
        let f = fixture(true, 1, 3).await;
        let result = f.control.start("pres-1", "p1").await;
        assert!(matches!(result, Err(SyncError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_start_with_zero_slides_fails_precondition() {
        let f = fixture(false, 0, 0).await;
        let result = f.control.start("pres-1", "p1").await;
        assert!(matches!(result, Err(SyncError::Precondition)));

        let stored = f.presentations.find_by_id("pres-1").await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_start_unknown_presentation_is_not_found() {
        let f = fixture(false, 0, 3).await;
        let result = f.control.start("missing", "p1").await;
        assert!(matches!(result, Err(SyncError::NotFound)));
    }

    #[tokio::test]
    async fn test_wrong_presenter_is_forbidden() {
        let f = fixture(true, 0, 3).await;
        for result in [
            f.control.start("pres-1", "intruder").await,
            f.control.stop("pres-1", "intruder").await,
            f.control.next_slide("pres-1", "intruder").await,
            f.control.prev_slide("pres-1", "intruder").await,
            f.control.goto_slide("pres-1", "intruder", 1).await,
        ] {
            assert!(matches!(result, Err(SyncError::Forbidden)));
        }
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_invalid_state() {
        let f = fixture(false, 0, 3).await;
        let result = f.control.stop("pres-1", "p1").await;
        assert!(matches!(result, Err(SyncError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_goto_out_of_range_reports_bounds_and_does_not_broadcast() {
        let f = fixture(true, 0, 3).await;
        let room = room_for(RoomKind::Presentation, "pres-1");
        let mut rx = listen(&f.rooms, &room).await;

        let err = f.control.goto_slide("pres-1", "p1", 5).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfRange);
        assert_eq!(err.to_string(), "valid range 0-2");

        let err = f.control.goto_slide("pres-1", "p1", -1).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfRange);

        // State untouched, nothing announced
        let stored = f.presentations.find_by_id("pres-1").await.unwrap().unwrap();
        assert_eq!(stored.current_slide_index, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_goto_valid_index_broadcasts_slide_changed() {
        let f = fixture(true, 0, 3).await;
        let room = room_for(RoomKind::Presentation, "pres-1");
        let mut rx = listen(&f.rooms, &room).await;

        let outcome = f.control.goto_slide("pres-1", "p1", 2).await.unwrap();
        assert_eq!(outcome.current_slide_index, 2);

        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::SlideChanged {
                current_slide_index: 2,
                total_slides: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_navigation_requires_active_presentation() {
        let f = fixture(false, 0, 3).await;
        for result in [
            f.control.goto_slide("pres-1", "p1", 1).await,
            f.control.next_slide("pres-1", "p1").await,
            f.control.prev_slide("pres-1", "p1").await,
        ] {
            assert!(matches!(result, Err(SyncError::InvalidState(_))));
        }
    }

    #[tokio::test]
    async fn test_next_at_last_slide_is_terminal_boundary() {
        let f = fixture(true, 2, 3).await;

        let err = f.control.next_slide("pres-1", "p1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyAtBoundary);
        assert_eq!(err.to_string(), "already at last slide");

        let stored = f.presentations.find_by_id("pres-1").await.unwrap().unwrap();
        assert_eq!(stored.current_slide_index, 2);
    }

    #[tokio::test]
    async fn test_prev_at_first_slide_is_terminal_boundary() {
        let f = fixture(true, 0, 3).await;

        let err = f.control.prev_slide("pres-1", "p1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyAtBoundary);
        assert_eq!(err.to_string(), "already at first slide");

        let stored = f.presentations.find_by_id("pres-1").await.unwrap().unwrap();
        assert_eq!(stored.current_slide_index, 0);
    }

    #[tokio::test]
    async fn test_next_and_prev_move_one_slide() {
        let f = fixture(true, 1, 3).await;

        let outcome = f.control.next_slide("pres-1", "p1").await.unwrap();
        assert_eq!(outcome.current_slide_index, 2);
        let outcome = f.control.prev_slide("pres-1", "p1").await.unwrap();
        assert_eq!(outcome.current_slide_index, 1);
    }

    /// Store that accepts reads but fails every write
    struct ReadOnlyStore {
        inner: MemoryPresentationStore,
    }

    #[async_trait]
    impl PresentationStore for ReadOnlyStore {
        async fn find_by_id(&self, id: &str) -> Result<Option<Presentation>, StoreError> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_access_code(
            &self,
            code: &str,
        ) -> Result<Option<Presentation>, StoreError> {
            self.inner.find_by_access_code(code).await
        }
        async fn save(&self, _presentation: &Presentation) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("write refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_aborts_without_broadcast() {
        let inner = MemoryPresentationStore::new();
        inner
            .insert(Presentation {
                id: "pres-1".to_string(),
                access_code: "ABC123".to_string(),
                presenter_id: "p1".to_string(),
                title: "Demo".to_string(),
                is_active: false,
                current_slide_index: 0,
                expires_at: None,
            })
            .await;
        let slides = Arc::new(MemorySlideStore::new());
        slides.set_count("pres-1", 3).await;
        let rooms = Arc::new(RoomBroadcaster::new());
        let control = PresentationControlCoordinator::new(
            Arc::new(ReadOnlyStore { inner }),
            slides,
            rooms.clone(),
        );

        let room = room_for(RoomKind::Presentation, "pres-1");
        let mut rx = listen(&rooms, &room).await;

        let err = control.start("pres-1", "p1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unavailable);
        assert!(rx.try_recv().is_err());
    }
}
