use std::sync::{Arc, RwLock};

use crate::Campaign;

/// `CampaignStore` holds the current candidate lists and allows concurrent access for readers and
/// writers.
///
/// Lists are immutable snapshots: a sync replaces a whole list, and readers keep evaluating the
/// snapshot they got.
#[derive(Debug, Default)]
pub struct CampaignStore {
    client_side: RwLock<Arc<Vec<Campaign>>>,
    server_side: RwLock<Arc<Vec<Campaign>>>,
}

impl CampaignStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Campaigns evaluated on the device.
    pub fn client_side(&self) -> Arc<Vec<Campaign>> {
        self.client_side
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Metadata of campaigns whose content is fetched from the server once they qualify.
    pub fn server_side(&self) -> Arc<Vec<Campaign>> {
        self.server_side
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Set new client-side campaigns, returning the previous ones.
    pub fn set_client_side(&self, campaigns: Vec<Campaign>) -> Arc<Vec<Campaign>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(campaigns);

        let mut slot = self.client_side.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut slot, new_value)
    }

    /// Set new server-side campaign metadata, returning the previous list.
    pub fn set_server_side(&self, campaigns: Vec<Campaign>) -> Arc<Vec<Campaign>> {
        let new_value = Arc::new(campaigns);

        let mut slot = self.server_side.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut slot, new_value)
    }

    /// Drop campaigns with the given ids from both lists.
    pub fn remove(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        for slot in [&self.client_side, &self.server_side] {
            let mut slot = slot.write().unwrap_or_else(|e| e.into_inner());
            let kept: Vec<Campaign> = slot
                .iter()
                .filter(|campaign| campaign.id().map_or(true, |id| !ids.contains(&id)))
                .cloned()
                .collect();
            *slot = Arc::new(kept);
        }
    }
}
