//! Entity store for basket tracking.
//!
//! Regions each have a basket of items, and a `basket_version` that goes up
//! by one every time a committed transaction changes which items are in the
//! basket (or what they are called). Retail sites are matched by URL and carry
//! scraping rules telling the browser extension where on a page each item's
//! price lives.
//!
//! # Architecture
//! Everything happens inside a [`Session`], one SQLite transaction:
//! - **Change tracking**: item changes are staged and written on flush; each
//!   flush records the regions whose basket changed in the session's
//!   [`ChangeTracker`].
//! - **Version commit**: [`Session::commit`] flushes, bumps every tracked
//!   region's basket version once, then commits.
//! - **Rule validation**: scraping rules are checked before every insert and
//!   update. A site has one default rule bound to no items; exception rules
//!   are bound to at least one item, and no item to two of them.
//! - **Resolution**: URLs are decomposed into protocol, subdomain, domain and
//!   suffix and matched exactly against stored sites.

mod db;
pub mod defaults;
pub mod error;
pub mod models;
mod session;

pub use crate::db::{DEFAULT_INITIAL_VERSION, Database};
pub use crate::session::{ChangeTracker, Session};
pub use basketbot_urls::{HttpsProbe, StaticProbe};
