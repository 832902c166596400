//! Inactivity sweeper
//!
//! Recurring background task that evicts sessions idle past the configured
//! threshold and tells their rooms about the headcount change. The task owns
//! explicit handles to the registry and broadcaster and is stoppable: a
//! shutdown request lets the in-flight tick finish, so pending departure
//! broadcasts are never dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::protocol::ServerMessage;
use crate::rooms::{RoomBroadcaster, RoomKind, room_for};
use crate::session::SessionRegistry;
use crate::session::state::now_millis;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Cadence between sweep runs
    pub interval: Duration,
    /// Idle time after which a session is considered abandoned
    pub max_idle: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            max_idle: Duration::from_secs(30 * 60),
        }
    }
}

pub struct InactivitySweeper {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomBroadcaster>,
    config: SweeperConfig,
}

/// Handle to a running sweeper task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Request shutdown and wait for the task to finish its current tick
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

impl InactivitySweeper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        rooms: Arc<RoomBroadcaster>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            registry,
            rooms,
            config,
        }
    }

    /// Spawn the recurring sweep task
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Sweeper shutting down");
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// One sweep pass: evict stale sessions and notify their rooms
    pub async fn run_once(&self) {
        let removed = self.registry.sweep(self.config.max_idle).await;
        if removed.is_empty() {
            return;
        }

        info!("Sweeper evicting {} stale session(s)", removed.len());
        for session in removed {
            self.rooms.leave_all(session.connection_id).await;
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
    }
}
