//! Basket version bumps, applied once per region per committed session.

use crate::error::{DatabaseResultExt, Result};
use crate::models::RegionId;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, BTreeSet};
use time::UtcDateTime;
use tracing::{debug, info, instrument};

/// Increment `basket_version` of every region in `regions` by one.
///
/// The increment is relative to the stored value so that concurrent
/// sessions never lose each other's bumps. Regions that no longer exist
/// (deleted earlier in the same session) are skipped. Returns the new
/// version of every region that was bumped.
#[instrument(skip(conn, regions), fields(regions = regions.len()))]
pub(crate) async fn bump_versions(
    conn: &mut SqliteConnection,
    regions: &BTreeSet<RegionId>,
    now: UtcDateTime,
) -> Result<BTreeMap<RegionId, i64>> {
    let mut versions = BTreeMap::new();
    for region in regions {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
                UPDATE region
                SET basket_version = basket_version + 1, basket_version_update_time = ?
                WHERE id = ?
                RETURNING basket_version
            "#,
        )
        .bind(now.unix_timestamp())
        .bind(*region)
        .fetch_optional(&mut *conn)
        .await
        .or_db()?;
        match version {
            Some(version) => {
                info!(%region, version, "basket version bumped");
                versions.insert(*region, version);
            },
            None => debug!(%region, "region deleted before commit, not bumped"),
        }
    }
    Ok(versions)
}
