//! Reference data that baskets hang off but never change with them.

use crate::error::{Error, ErrorKind, Result};
use crate::models::{
    ConversionRateId, CountryId, CurrencyId, DomElemId, HistoricalBasketId, RegionId, UserId, from_timestamp,
};
use exn::ResultExt;
use time::UtcDateTime;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Currency {
    pub id: CurrencyId,
    pub name: String,
    /// E.g. `GBP`.
    pub abbreviation: String,
}

/// Owner of a scraping rule. Carries no credentials.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// An HTML element as named by the scraper (`bs_name`) and by the browser (`js_name`).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DomElem {
    pub id: DomElemId,
    pub bs_name: String,
    pub js_name: String,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ConversionRateRow {
    id: ConversionRateId,
    from_currency_id: CurrencyId,
    to_currency_id: CurrencyId,
    rate: f64,
    update_time: i64,
}

/// Exchange rate between two currencies, stored as last reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRate {
    pub id: ConversionRateId,
    pub from_currency_id: CurrencyId,
    pub to_currency_id: CurrencyId,
    pub rate: f64,
    pub update_time: UtcDateTime,
}

impl TryFrom<ConversionRateRow> for ConversionRate {
    type Error = Error;
    fn try_from(row: ConversionRateRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            from_currency_id: row.from_currency_id,
            to_currency_id: row.to_currency_id,
            rate: row.rate,
            update_time: from_timestamp(row.update_time, "conversion rate update time")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoricalBasketRow {
    id: HistoricalBasketId,
    region_id: RegionId,
    basket_version: i64,
    basket: String,
    recorded_at: i64,
}

/// Snapshot of a region's basket, appended and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalBasket {
    pub id: HistoricalBasketId,
    pub region_id: RegionId,
    /// Region basket version the snapshot was taken at.
    pub basket_version: i64,
    pub basket: serde_json::Value,
    pub recorded_at: UtcDateTime,
}

impl TryFrom<HistoricalBasketRow> for HistoricalBasket {
    type Error = Error;
    fn try_from(row: HistoricalBasketRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            region_id: row.region_id,
            basket_version: row.basket_version,
            basket: serde_json::from_str(&row.basket).or_raise(|| ErrorKind::InvalidData("historical basket"))?,
            recorded_at: from_timestamp(row.recorded_at, "historical basket time")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_basket_row_to_model() {
        let row = HistoricalBasketRow {
            id: HistoricalBasketId(1),
            region_id: RegionId(2),
            basket_version: 5,
            basket: r#"{"items": ["apple"]}"#.to_string(),
            recorded_at: 1_700_000_000,
        };
        let basket = HistoricalBasket::try_from(row).unwrap();
        assert_eq!(basket.basket["items"][0], "apple");
        assert_eq!(basket.recorded_at.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_corrupt_historical_basket_rejected() {
        let row = HistoricalBasketRow {
            id: HistoricalBasketId(1),
            region_id: RegionId(2),
            basket_version: 5,
            basket: "{not json".to_string(),
            recorded_at: 0,
        };
        let err = HistoricalBasket::try_from(row).unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidData("historical basket")));
    }
}
