//! Persistence collaborator interfaces
//!
//! Presentations and slides are owned by an external record store; the live
//! coordination layer only reads fresh state before a control operation and
//! writes it back before broadcasting. Both traits are object-safe so the
//! concrete backend can be swapped (in-memory for tests and demo mode).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

pub use memory::{MemoryPresentationStore, MemorySlideStore};

/// Errors from the persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Authoritative presentation record
///
/// `current_slide_index` is only meaningful while `is_active`; both fields
/// are mutated exclusively through the control coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    pub id: String,
    pub access_code: String,
    pub presenter_id: String,
    pub title: String,
    pub is_active: bool,
    pub current_slide_index: u32,
    /// Access window end (ms since epoch); `None` means no expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

#[async_trait]
pub trait PresentationStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Presentation>, StoreError>;

    async fn find_by_access_code(&self, code: &str) -> Result<Option<Presentation>, StoreError>;

    async fn save(&self, presentation: &Presentation) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SlideStore: Send + Sync {
    /// Number of slides in a presentation; unknown presentations count zero
    async fn count_by_presentation_id(&self, id: &str) -> Result<u32, StoreError>;
}
