//! Scraping rule invariants, checked before every rule insert and update.

use crate::error::{DatabaseResultExt, ErrorKind, Result, Violation};
use crate::models::{ItemId, RetailSiteId, ScrapingRuleId};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use tracing::warn;

/// A default rule binds no items; an exception rule binds at least one.
pub(crate) fn rule_shape(default_rule: bool, items: &BTreeSet<ItemId>) -> Result<()> {
    let violation = match (default_rule, items.is_empty()) {
        (true, false) => Violation::DefaultRuleWithItems,
        (false, true) => Violation::ExceptionRuleWithoutItems,
        _ => return Ok(()),
    };
    warn!(%violation, "scraping rule rejected");
    exn::bail!(ErrorKind::Integrity(violation))
}

/// No item may be bound to two exception rules of the same site.
///
/// `rule` is the rule being updated, excluded from the check; `None` when inserting.
pub(crate) async fn items_unclaimed(
    conn: &mut SqliteConnection,
    site: RetailSiteId,
    rule: Option<ScrapingRuleId>,
    items: &BTreeSet<ItemId>,
) -> Result<()> {
    for item in items {
        let claimed: bool = sqlx::query_scalar(
            r#"
                SELECT EXISTS (
                    SELECT 1
                    FROM scraping_rule_item sri
                    JOIN scraping_rule r ON r.id = sri.scraping_rule_id
                    WHERE r.retail_site_id = ? AND r.default_rule = 0 AND r.id IS NOT ? AND sri.item_id = ?
                )
            "#,
        )
        .bind(site)
        .bind(rule)
        .bind(*item)
        .fetch_one(&mut *conn)
        .await
        .or_db()?;
        if claimed {
            let violation = Violation::ItemAlreadyClaimed(item.0);
            warn!(%violation, %site, "scraping rule rejected");
            exn::bail!(ErrorKind::Integrity(violation));
        }
    }
    Ok(())
}

/// Deleting an item must not leave an exception rule bound to nothing.
pub(crate) async fn item_deletable(conn: &mut SqliteConnection, item: ItemId) -> Result<()> {
    let orphaned: bool = sqlx::query_scalar(
        r#"
            SELECT EXISTS (
                SELECT 1
                FROM scraping_rule_item sri
                WHERE sri.item_id = ?
                AND (SELECT COUNT(*) FROM scraping_rule_item o WHERE o.scraping_rule_id = sri.scraping_rule_id) = 1
            )
        "#,
    )
    .bind(item)
    .fetch_one(&mut *conn)
    .await
    .or_db()?;
    if orphaned {
        warn!(%item, "item is the only item of an exception rule");
        exn::bail!(ErrorKind::Integrity(Violation::ExceptionRuleWithoutItems));
    }
    Ok(())
}
