use crate::error::{Error, Result};
use crate::models::{CountryId, CurrencyId, RegionId, from_timestamp};
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct RegionRow {
    id: RegionId,
    name: String,
    basket_price: Option<f64>,
    basket_version: i64,
    basket_version_update_time: i64,
    currency_id: Option<CurrencyId>,
    country_id: Option<CountryId>,
}

/// A geographic region with its own basket of items.
///
/// `basket_version` increases by exactly one for every committed session
/// that changed the region's basket (or renamed one of its items).
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    /// Price of the whole basket, once computed.
    pub basket_price: Option<f64>,
    pub basket_version: i64,
    pub basket_version_update_time: UtcDateTime,
    pub currency_id: Option<CurrencyId>,
    pub country_id: Option<CountryId>,
}

/// A region that has not been written yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRegion {
    pub name: String,
    pub basket_price: Option<f64>,
    pub currency_id: Option<CurrencyId>,
    pub country_id: Option<CountryId>,
}

impl NewRegion {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

impl TryFrom<RegionRow> for Region {
    type Error = Error;
    fn try_from(row: RegionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            basket_price: row.basket_price,
            basket_version: row.basket_version,
            basket_version_update_time: from_timestamp(row.basket_version_update_time, "basket version update time")?,
            currency_id: row.currency_id,
            country_id: row.country_id,
        })
    }
}
