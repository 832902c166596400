//! In-memory store implementations
//!
//! Backs demo mode and tests. Access codes are matched case-insensitively,
//! the way they are typed by participants.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Presentation, PresentationStore, SlideStore, StoreError};

/// In-memory presentation records keyed by id
#[derive(Default)]
pub struct MemoryPresentationStore {
    presentations: RwLock<HashMap<String, Presentation>>,
}

impl MemoryPresentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, replacing any existing one with the same id
    pub async fn insert(&self, presentation: Presentation) {
        let mut presentations = self.presentations.write().await;
        presentations.insert(presentation.id.clone(), presentation);
    }
}

#[async_trait]
impl PresentationStore for MemoryPresentationStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Presentation>, StoreError> {
        let presentations = self.presentations.read().await;
        Ok(presentations.get(id).cloned())
    }

    async fn find_by_access_code(&self, code: &str) -> Result<Option<Presentation>, StoreError> {
        let presentations = self.presentations.read().await;
        Ok(presentations
            .values()
            .find(|p| p.access_code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn save(&self, presentation: &Presentation) -> Result<(), StoreError> {
        let mut presentations = self.presentations.write().await;
        presentations.insert(presentation.id.clone(), presentation.clone());
        Ok(())
    }
}

/// In-memory slide counts keyed by presentation id
#[derive(Default)]
pub struct MemorySlideStore {
    counts: RwLock<HashMap<String, u32>>,
}

impl MemorySlideStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_count(&self, presentation_id: &str, count: u32) {
        let mut counts = self.counts.write().await;
        counts.insert(presentation_id.to_string(), count);
    }
}

#[async_trait]
impl SlideStore for MemorySlideStore {
    async fn count_by_presentation_id(&self, id: &str) -> Result<u32, StoreError> {
        let counts = self.counts.read().await;
        Ok(counts.get(id).copied().unwrap_or(0))
    }
}
