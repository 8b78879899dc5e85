use crate::models::{ItemChanges, RegionId};
use std::collections::BTreeSet;
use tracing::debug;

/// Regions whose basket changed within one [`Session`](crate::Session).
///
/// Every flush adds to the set; it is only emptied when the session commits
/// (the committer drains it) or rolls back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeTracker {
    affected: BTreeSet<RegionId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, region: RegionId) {
        if self.affected.insert(region) {
            debug!(%region, "region basket marked as changed");
        }
    }

    pub fn record_all(&mut self, regions: impl IntoIterator<Item = RegionId>) {
        for region in regions {
            self.record(region);
        }
    }

    /// Record the regions touched by a flushed item change, if any.
    pub fn observe(&mut self, changes: &ItemChanges) {
        self.record_all(changes.affected_regions());
    }

    /// Record every region a deleted item belonged to.
    pub fn observe_deletion(&mut self, regions: impl IntoIterator<Item = RegionId>) {
        self.record_all(regions);
    }

    pub fn affected(&self) -> &BTreeSet<RegionId> {
        &self.affected
    }

    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }

    /// Take the affected set, leaving the tracker empty.
    pub fn drain(&mut self) -> BTreeSet<RegionId> {
        std::mem::take(&mut self.affected)
    }

    pub fn clear(&mut self) {
        self.affected.clear();
    }
}
