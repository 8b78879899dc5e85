//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Three families matter to callers:
//! - [`ErrorKind::Integrity`] is raised while flushing and leaves the session
//!   aborted: roll back and retry with corrected data.
//! - [`ErrorKind::DefaultRuleNotUnique`] and [`ErrorKind::SiteNotUnique`] are
//!   raised on read, and point at data that needs fixing by hand.
//! - Everything else comes from SQLite itself.
//!
//! Lookups that find nothing return `Ok(None)` or an empty list, never an error.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A structural invariant would be broken by the pending changes.
    #[display("integrity violation: {_0}")]
    Integrity(#[error(not(source))] Violation),
    /// A retail site has zero, or more than one, default scraping rule.
    #[display("retail site '{site}' has {found} default scraping rules, expected exactly one")]
    DefaultRuleNotUnique { site: String, found: usize },
    /// More than one retail site matches a URL.
    #[display("URL '{url}' matches {found} retail sites")]
    SiteNotUnique { url: String, found: usize },
    /// A mutation referenced a row that does not exist.
    #[display("{entity} #{id} does not exist")]
    Missing { entity: &'static str, id: i64 },
    /// An earlier failure aborted this session; it can only be rolled back.
    #[display("session aborted by an earlier error, roll back before continuing")]
    Aborted,
    /// SQLite rejected a write (unique, foreign key, not-null or check constraint).
    #[display("database constraint violated")]
    Constraint,
    /// The database is locked by another writer.
    #[display("database busy")]
    Busy,
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Serialization/deserialization error.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A URL could not be decomposed into its site components.
    #[display("invalid URL")]
    Url,
}

/// Structural invariants enforced when pending changes are flushed.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A default scraping rule must not be bound to any item.
    #[display("default scraping rule bound to items")]
    DefaultRuleWithItems,
    /// A non-default (exception) scraping rule must be bound to an item.
    #[display("exception scraping rule bound to no items")]
    ExceptionRuleWithoutItems,
    /// Every item belongs to at least one region.
    #[display("item '{_0}' belongs to no region")]
    ItemWithoutRegion(String),
    /// An item may be claimed by at most one exception rule per retail site.
    #[display("item #{_0} is already claimed by another exception rule of this site")]
    ItemAlreadyClaimed(i64),
    /// A class chain must be keyed `"0"`, `"1"`, ... without gaps.
    #[display("invalid class chain: {_0}")]
    InvalidClassChain(String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Shorthand for matching a specific [`Violation`].
    pub fn is_violation(&self, violation: &Violation) -> bool {
        matches!(self, Self::Integrity(v) if v == violation)
    }
}

impl From<&sqlx::Error> for ErrorKind {
    fn from(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if !matches!(db.kind(), sqlx::error::ErrorKind::Other) => Self::Constraint,
            // SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
            sqlx::Error::Database(db)
                if db.code().and_then(|code| code.parse::<i32>().ok()).is_some_and(|code| matches!(code & 0xff, 5 | 6)) =>
            {
                Self::Busy
            },
            sqlx::Error::PoolTimedOut => Self::Busy,
            _ => Self::Database,
        }
    }
}

/// Raise a [`sqlx::Error`] under the [`ErrorKind`] it classifies as.
pub(crate) trait DatabaseResultExt<T> {
    fn or_db(self) -> Result<T>;
}
impl<T> DatabaseResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[track_caller]
    fn or_db(self) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::from(&err);
                Err(exn::Exn::new(err).raise(kind))
            },
        }
    }
}
