//! Units of work.
//!
//! A [`Session`] wraps one SQLite transaction. Item mutations are staged and
//! written on the next flush, which happens before every read and before
//! commit. Each flush feeds the session's [`ChangeTracker`]; on commit the
//! tracked regions get their basket version bumped exactly once.

mod committer;
mod items;
mod reference;
mod rules;
mod sites;
mod tracker;
mod validate;


pub use self::tracker::ChangeTracker;

use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::models::{ItemChanges, ItemId, RegionId};
use sqlx::{Sqlite, Transaction};
use std::collections::BTreeMap;
use time::UtcDateTime;
use tracing::{debug, info, instrument};

/// A change waiting for the next flush.
#[derive(Debug)]
enum Pending {
    Item(ItemChanges),
    DeleteItem(ItemId),
}

/// One transaction against the store.
///
/// Dropping a session without committing rolls it back. After any failed
/// write the session is aborted: every further operation returns
/// [`ErrorKind::Aborted`] and only [`rollback`](Self::rollback) remains.
pub struct Session {
    tx: Transaction<'static, Sqlite>,
    pending: Vec<Pending>,
    tracker: ChangeTracker,
    initial_version: i64,
    aborted: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.pending)
            .field("tracker", &self.tracker)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>, initial_version: i64) -> Self {
        Self { tx, pending: Vec::new(), tracker: ChangeTracker::new(), initial_version, aborted: false }
    }

    /// Regions flagged so far. Staged changes only show up after a flush.
    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn ensure_active(&self) -> Result<()> {
        if self.aborted {
            exn::bail!(ErrorKind::Aborted);
        }
        Ok(())
    }

    /// Mark the session aborted if a write failed.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.aborted = true;
        }
        result
    }

    /// Write every staged change, in the order it was staged.
    ///
    /// Item changes are checked for [`Violation::ItemWithoutRegion`](crate::error::Violation)
    /// and deletions for leaving an exception rule without items. The first
    /// failure aborts the session.
    #[instrument(skip(self), fields(pending = self.pending.len()))]
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_active()?;
        for change in std::mem::take(&mut self.pending) {
            let result = match change {
                Pending::Item(changes) => self.write_item(&changes).await.map(|_| ()),
                Pending::DeleteItem(item) => self.delete_item_now(item).await,
            };
            self.guard(result)?;
        }
        Ok(())
    }

    /// Flush, bump the basket version of every affected region, then commit.
    ///
    /// Returns the new basket version of each bumped region; empty if no
    /// basket changed.
    #[instrument(skip(self))]
    pub async fn commit(mut self) -> Result<BTreeMap<RegionId, i64>> {
        self.flush().await?;
        let affected = self.tracker.drain();
        let versions = committer::bump_versions(&mut self.tx, &affected, UtcDateTime::now()).await?;
        self.tx.commit().await.or_db()?;
        info!(bumped = versions.len(), "session committed");
        Ok(versions)
    }

    /// Discard every change made in this session, including tracked regions.
    #[instrument(skip(self))]
    pub async fn rollback(mut self) -> Result<()> {
        self.tracker.clear();
        self.pending.clear();
        self.tx.rollback().await.or_db()?;
        debug!("session rolled back");
        Ok(())
    }
}
