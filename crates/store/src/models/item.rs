use crate::models::{ItemId, RegionId};
use std::collections::BTreeSet;

#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub(crate) id: ItemId,
    pub(crate) name: String,
    pub(crate) all_regions: bool,
}

/// State of an item as it was last read from (or written to) the database.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    name: String,
    all_regions: bool,
    regions: BTreeSet<RegionId>,
}

/// A basket item and the regions whose basket it belongs to.
///
/// Items carry their own dirty tracking: an item read through a
/// [`Session`](crate::Session) remembers the name and region set it was
/// loaded with, and [`changes`](Self::changes) reports the difference
/// between that snapshot and the current state. New items have no snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    id: Option<ItemId>,
    name: String,
    /// Stored as-is; membership is always explicit through `regions`.
    all_regions: bool,
    regions: BTreeSet<RegionId>,
    snapshot: Option<Snapshot>,
}

impl Item {
    pub fn new(name: impl Into<String>, all_regions: bool, regions: impl IntoIterator<Item = RegionId>) -> Self {
        Self {
            id: None,
            name: name.into(),
            all_regions,
            regions: regions.into_iter().collect(),
            snapshot: None,
        }
    }

    pub(crate) fn from_row(row: ItemRow, regions: BTreeSet<RegionId>) -> Self {
        let mut item = Self {
            id: Some(row.id),
            name: row.name,
            all_regions: row.all_regions,
            regions,
            snapshot: None,
        };
        item.mark_clean(row.id);
        item
    }

    /// Database ID, or `None` if the item has never been flushed.
    pub fn id(&self) -> Option<ItemId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn all_regions(&self) -> bool {
        self.all_regions
    }

    pub fn regions(&self) -> &BTreeSet<RegionId> {
        &self.regions
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_all_regions(&mut self, all_regions: bool) {
        self.all_regions = all_regions;
    }

    /// Returns `false` if the item was already in the region.
    pub fn add_region(&mut self, region: RegionId) -> bool {
        self.regions.insert(region)
    }

    /// Returns `false` if the item wasn't in the region.
    pub fn remove_region(&mut self, region: RegionId) -> bool {
        self.regions.remove(&region)
    }

    pub fn set_regions(&mut self, regions: impl IntoIterator<Item = RegionId>) {
        self.regions = regions.into_iter().collect();
    }

    /// Difference between the current state and the loaded snapshot.
    pub fn changes(&self) -> ItemChanges {
        match &self.snapshot {
            None => ItemChanges {
                id: self.id,
                name: self.name.clone(),
                all_regions: self.all_regions,
                is_new: true,
                name_changed: true,
                all_regions_changed: true,
                current: self.regions.clone(),
                added: self.regions.clone(),
                removed: BTreeSet::new(),
            },
            Some(snapshot) => ItemChanges {
                id: self.id,
                name: self.name.clone(),
                all_regions: self.all_regions,
                is_new: false,
                name_changed: snapshot.name != self.name,
                all_regions_changed: snapshot.all_regions != self.all_regions,
                current: self.regions.clone(),
                added: self.regions.difference(&snapshot.regions).copied().collect(),
                removed: snapshot.regions.difference(&self.regions).copied().collect(),
            },
        }
    }

    /// Adopt the region set stored for `id` and mark the item clean.
    pub(crate) fn mark_written(&mut self, id: ItemId, regions: BTreeSet<RegionId>) {
        self.regions = regions;
        self.mark_clean(id);
    }

    /// Record that the current state has been written under `id`.
    pub(crate) fn mark_clean(&mut self, id: ItemId) {
        self.id = Some(id);
        self.snapshot = Some(Snapshot {
            name: self.name.clone(),
            all_regions: self.all_regions,
            regions: self.regions.clone(),
        });
    }
}

/// The pending changes of one [`Item`], as consumed by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChanges {
    pub id: Option<ItemId>,
    pub name: String,
    pub all_regions: bool,
    pub is_new: bool,
    pub name_changed: bool,
    pub all_regions_changed: bool,
    /// Regions the item belongs to after the change.
    pub current: BTreeSet<RegionId>,
    pub added: BTreeSet<RegionId>,
    pub removed: BTreeSet<RegionId>,
}

impl ItemChanges {
    /// Anything at all to write.
    pub fn is_dirty(&self) -> bool {
        self.is_new || self.name_changed || self.all_regions_changed || !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Whether region baskets see this change.
    ///
    /// Baskets are keyed by item name, so a rename counts as much as a
    /// membership change. The `all_regions` flag alone does not.
    pub fn affects_basket(&self) -> bool {
        self.is_new || self.name_changed || !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Regions whose basket changes: every current region plus every region
    /// the item was removed from. Empty when [`affects_basket`](Self::affects_basket) is false.
    pub fn affected_regions(&self) -> BTreeSet<RegionId> {
        if !self.affects_basket() {
            return BTreeSet::new();
        }
        self.current.union(&self.removed).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(name: &str, regions: &[i64]) -> Item {
        let row = ItemRow { id: ItemId(1), name: name.to_string(), all_regions: false };
        Item::from_row(row, regions.iter().copied().map(RegionId).collect())
    }

    fn ids(regions: &[i64]) -> BTreeSet<RegionId> {
        regions.iter().copied().map(RegionId).collect()
    }

    #[test]
    fn test_new_item_affects_all_its_regions() {
        let item = Item::new("apple", true, [RegionId(1), RegionId(2)]);
        let changes = item.changes();
        assert!(changes.is_new);
        assert_eq!(changes.added, ids(&[1, 2]));
        assert_eq!(changes.affected_regions(), ids(&[1, 2]));
    }

    #[test]
    fn test_loaded_item_is_clean() {
        let item = loaded("apple", &[1, 2]);
        let changes = item.changes();
        assert!(!changes.is_dirty());
        assert!(changes.affected_regions().is_empty());
    }

    #[test]
    fn test_rename_affects_current_regions() {
        let mut item = loaded("apple", &[1, 2]);
        item.rename("green apple");
        let changes = item.changes();
        assert!(changes.name_changed);
        assert_eq!(changes.affected_regions(), ids(&[1, 2]));
    }

    #[test]
    fn test_rename_to_same_name_is_not_a_change() {
        let mut item = loaded("apple", &[1]);
        item.rename("apple");
        assert!(!item.changes().is_dirty());
    }

    #[test]
    fn test_move_affects_both_regions() {
        let mut item = loaded("banana", &[1]);
        item.set_regions([RegionId(2)]);
        let changes = item.changes();
        assert_eq!(changes.added, ids(&[2]));
        assert_eq!(changes.removed, ids(&[1]));
        assert_eq!(changes.affected_regions(), ids(&[1, 2]));
    }

    #[test]
    fn test_adding_region_flags_every_region() {
        let mut item = loaded("banana", &[1, 3]);
        assert!(item.add_region(RegionId(2)));
        assert!(!item.add_region(RegionId(2)));
        assert_eq!(item.changes().affected_regions(), ids(&[1, 2, 3]));
    }

    #[test]
    fn test_all_regions_flag_is_dirty_but_not_a_basket_change() {
        let mut item = loaded("apple", &[1]);
        item.set_all_regions(true);
        let changes = item.changes();
        assert!(changes.is_dirty());
        assert!(!changes.affects_basket());
        assert!(changes.affected_regions().is_empty());
    }

    #[test]
    fn test_mark_clean_resets_snapshot() {
        let mut item = Item::new("kiwi", false, [RegionId(4)]);
        item.mark_clean(ItemId(9));
        assert_eq!(item.id(), Some(ItemId(9)));
        assert!(!item.changes().is_dirty());
        item.remove_region(RegionId(4));
        assert_eq!(item.changes().removed, ids(&[4]));
    }
}
