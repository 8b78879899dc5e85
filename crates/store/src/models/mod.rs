mod class_chain;
mod item;
mod reference;
mod region;
mod retail_site;
mod scraping_rule;

pub use self::class_chain::{ChainLink, ClassChain};
pub use self::item::{Item, ItemChanges};
pub(crate) use self::item::ItemRow;
pub use self::reference::{ConversionRate, Country, Currency, DomElem, HistoricalBasket, User};
pub(crate) use self::reference::{ConversionRateRow, HistoricalBasketRow};
pub use self::region::{NewRegion, Region};
pub(crate) use self::region::RegionRow;
pub use self::retail_site::{Basket, NewRetailSite, RetailSite};
pub(crate) use self::retail_site::RetailSiteRow;
pub use self::scraping_rule::{NewScrapingRule, ScrapingRule};
pub(crate) use self::scraping_rule::ScrapingRuleRow;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;

macro_rules! id {
    ($name:ident) => {
        #[derive(Debug, derive_more::Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);
    };
}

id!(CountryId);
id!(CurrencyId);
id!(ConversionRateId);
id!(UserId);
id!(DomElemId);
id!(RegionId);
id!(ItemId);
id!(HistoricalBasketId);
id!(RetailSiteId);
id!(ScrapingRuleId);

pub(crate) fn from_timestamp(timestamp: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(timestamp).or_raise(|| ErrorKind::InvalidData(field))
}
