//! Item reads and mutations.

use super::{Pending, Session};
use crate::error::{DatabaseResultExt, ErrorKind, Result, Violation};
use crate::models::{Item, ItemChanges, ItemId, ItemRow, RegionId};
use std::collections::BTreeSet;
use tracing::{debug, instrument};

impl Session {
    // =========================================================================
    // Staging
    // =========================================================================

    /// Queue an item's changes for the next flush.
    ///
    /// Clean items are ignored. Use [`save_item`](Self::save_item) when the
    /// new item's ID is needed straight away.
    pub fn stage_item(&mut self, item: Item) -> Result<()> {
        self.ensure_active()?;
        let changes = item.changes();
        if changes.is_dirty() {
            debug!(item = %changes.name, "item change staged");
            self.pending.push(Pending::Item(changes));
        }
        Ok(())
    }

    /// Flush, then write `item` immediately and mark it clean.
    ///
    /// Afterwards `item` holds the stored region set, which differs from its
    /// own if another session changed the item's membership since it was read.
    #[instrument(skip(self, item), fields(item = item.name()))]
    pub async fn save_item(&mut self, item: &mut Item) -> Result<ItemId> {
        self.flush().await?;
        let changes = item.changes();
        let result = self.write_item(&changes).await;
        let (id, regions) = self.guard(result)?;
        item.mark_written(id, regions);
        Ok(id)
    }

    /// Queue an item for deletion. Every region it belonged to gets a new
    /// basket version.
    pub fn delete_item(&mut self, item: ItemId) -> Result<()> {
        self.ensure_active()?;
        self.pending.push(Pending::DeleteItem(item));
        Ok(())
    }

    // =========================================================================
    // Convenience mutations
    // =========================================================================

    /// Create an item in the given regions.
    pub async fn add_item(
        &mut self,
        name: &str,
        all_regions: bool,
        regions: impl IntoIterator<Item = RegionId>,
    ) -> Result<ItemId> {
        let mut item = Item::new(name, all_regions, regions);
        self.save_item(&mut item).await
    }

    /// Take an item out of one region's basket.
    ///
    /// Returns `false` if the item wasn't in that region. Removing an item
    /// from its last region fails at the next flush.
    pub async fn remove_item_from_region(&mut self, item: ItemId, region: RegionId) -> Result<bool> {
        let mut loaded = self.require_item(item).await?;
        let removed = loaded.remove_region(region);
        self.stage_item(loaded)?;
        Ok(removed)
    }

    /// Put an item into one more region's basket. Returns `false` if it was already there.
    pub async fn add_item_to_region(&mut self, item: ItemId, region: RegionId) -> Result<bool> {
        let mut loaded = self.require_item(item).await?;
        let added = loaded.add_region(region);
        self.stage_item(loaded)?;
        Ok(added)
    }

    /// Move an item from one region's basket to another's.
    pub async fn move_item(&mut self, item: ItemId, from: RegionId, to: RegionId) -> Result<()> {
        let mut loaded = self.require_item(item).await?;
        loaded.remove_region(from);
        loaded.add_region(to);
        self.stage_item(loaded)
    }

    /// Rename an item. Its regions' baskets change with it.
    pub async fn rename_item(&mut self, item: ItemId, name: &str) -> Result<()> {
        let mut loaded = self.require_item(item).await?;
        loaded.rename(name);
        self.stage_item(loaded)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn item(&mut self, id: ItemId) -> Result<Option<Item>> {
        self.flush().await?;
        let row: Option<ItemRow> = sqlx::query_as("SELECT id, name, all_regions FROM item WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        match row {
            Some(row) => Ok(Some(self.load_item(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn item_by_name(&mut self, name: &str) -> Result<Option<Item>> {
        self.flush().await?;
        let row: Option<ItemRow> = sqlx::query_as("SELECT id, name, all_regions FROM item WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        match row {
            Some(row) => Ok(Some(self.load_item(row).await?)),
            None => Ok(None),
        }
    }

    /// Every item in a region's basket, ordered by name.
    pub async fn items_in_region(&mut self, region: RegionId) -> Result<Vec<Item>> {
        self.flush().await?;
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
                SELECT i.id, i.name, i.all_regions
                FROM item i
                JOIN item_region ir ON ir.item_id = i.id
                WHERE ir.region_id = ?
                ORDER BY i.name
            "#,
        )
        .bind(region)
        .fetch_all(&mut *self.tx)
        .await
        .or_db()?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(self.load_item(row).await?);
        }
        Ok(items)
    }

    async fn require_item(&mut self, id: ItemId) -> Result<Item> {
        match self.item(id).await? {
            Some(item) => Ok(item),
            None => exn::bail!(ErrorKind::Missing { entity: "item", id: id.0 }),
        }
    }

    async fn item_regions(&mut self, id: ItemId) -> Result<BTreeSet<RegionId>> {
        let regions: Vec<RegionId> = sqlx::query_scalar("SELECT region_id FROM item_region WHERE item_id = ?")
            .bind(id)
            .fetch_all(&mut *self.tx)
            .await
            .or_db()?;
        Ok(regions.into_iter().collect())
    }

    async fn load_item(&mut self, row: ItemRow) -> Result<Item> {
        let regions = self.item_regions(row.id).await?;
        Ok(Item::from_row(row, regions))
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write one item's changes and record the regions whose basket they change.
    ///
    /// The item may have been loaded in an earlier session, so its changes
    /// are checked against the stored rows. A rename counts only if the stored
    /// name differs. Only membership rows actually inserted or deleted count.
    /// The regions recorded are the ones stored for the item after the write.
    ///
    /// Returns the item's ID and its stored region set.
    pub(super) async fn write_item(&mut self, changes: &ItemChanges) -> Result<(ItemId, BTreeSet<RegionId>)> {
        let (id, name_changed, all_regions_changed) = match changes.id {
            None => {
                let id: ItemId = sqlx::query_scalar("INSERT INTO item (name, all_regions) VALUES (?, ?) RETURNING id")
                    .bind(&changes.name)
                    .bind(changes.all_regions)
                    .fetch_one(&mut *self.tx)
                    .await
                    .or_db()?;
                (id, true, true)
            },
            Some(id) => {
                let stored: Option<ItemRow> = sqlx::query_as("SELECT id, name, all_regions FROM item WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *self.tx)
                    .await
                    .or_db()?;
                let Some(stored) = stored else {
                    exn::bail!(ErrorKind::Missing { entity: "item", id: id.0 });
                };
                // Fields this change did not touch keep their stored value.
                let name_changed = changes.name_changed && stored.name != changes.name;
                let all_regions_changed = changes.all_regions_changed && stored.all_regions != changes.all_regions;
                if name_changed || all_regions_changed {
                    sqlx::query("UPDATE item SET name = ?, all_regions = ? WHERE id = ?")
                        .bind(if name_changed { &changes.name } else { &stored.name })
                        .bind(if all_regions_changed { changes.all_regions } else { stored.all_regions })
                        .bind(id)
                        .execute(&mut *self.tx)
                        .await
                        .or_db()?;
                }
                (id, name_changed, all_regions_changed)
            },
        };
        let mut added = BTreeSet::new();
        for region in &changes.added {
            let inserted = sqlx::query("INSERT OR IGNORE INTO item_region (item_id, region_id) VALUES (?, ?)")
                .bind(id)
                .bind(*region)
                .execute(&mut *self.tx)
                .await
                .or_db()?;
            if inserted.rows_affected() > 0 {
                added.insert(*region);
            }
        }
        let mut removed = BTreeSet::new();
        for region in &changes.removed {
            let deleted = sqlx::query("DELETE FROM item_region WHERE item_id = ? AND region_id = ?")
                .bind(id)
                .bind(*region)
                .execute(&mut *self.tx)
                .await
                .or_db()?;
            if deleted.rows_affected() > 0 {
                removed.insert(*region);
            }
        }
        let current = self.item_regions(id).await?;
        if current.is_empty() {
            exn::bail!(ErrorKind::Integrity(Violation::ItemWithoutRegion(changes.name.clone())));
        }
        let written = ItemChanges {
            id: Some(id),
            name: changes.name.clone(),
            all_regions: changes.all_regions,
            is_new: changes.id.is_none(),
            name_changed,
            all_regions_changed,
            current,
            added,
            removed,
        };
        self.tracker.observe(&written);
        debug!(%id, item = %written.name, "item written");
        Ok((id, written.current))
    }

    /// Delete an item and record every region it belonged to.
    pub(super) async fn delete_item_now(&mut self, id: ItemId) -> Result<()> {
        let regions = self.item_regions(id).await?;
        super::validate::item_deletable(&mut self.tx, id).await?;
        let deleted = sqlx::query("DELETE FROM item WHERE id = ?").bind(id).execute(&mut *self.tx).await.or_db()?;
        if deleted.rows_affected() == 0 {
            exn::bail!(ErrorKind::Missing { entity: "item", id: id.0 });
        }
        self.tracker.observe_deletion(regions);
        debug!(%id, "item deleted");
        Ok(())
    }
}
