//! Regions, reference data and basket history.

use super::Session;
use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::models::{
    ConversionRate, ConversionRateId, ConversionRateRow, CountryId, CurrencyId, DomElem, DomElemId, HistoricalBasket,
    HistoricalBasketId, HistoricalBasketRow, NewRegion, Region, RegionId, RegionRow, UserId,
};
use serde_json::json;
use std::collections::BTreeMap;
use time::UtcDateTime;
use tracing::{debug, instrument};

const SELECT_REGION: &str = r#"
    SELECT id, name, basket_price, basket_version, basket_version_update_time, currency_id, country_id
    FROM region
"#;

impl Session {
    // =========================================================================
    // Regions
    // =========================================================================

    /// Insert a region, starting at the configured initial basket version.
    pub async fn create_region(&mut self, region: NewRegion) -> Result<RegionId> {
        self.flush().await?;
        let result = sqlx::query_scalar(
            r#"
                INSERT INTO region (name, basket_price, basket_version, basket_version_update_time, currency_id, country_id)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
        )
        .bind(&region.name)
        .bind(region.basket_price)
        .bind(self.initial_version)
        .bind(UtcDateTime::now().unix_timestamp())
        .bind(region.currency_id)
        .bind(region.country_id)
        .fetch_one(&mut *self.tx)
        .await
        .or_db();
        let id: RegionId = self.guard(result)?;
        debug!(%id, region = %region.name, "region created");
        Ok(id)
    }

    pub async fn region(&mut self, id: RegionId) -> Result<Option<Region>> {
        self.flush().await?;
        let row: Option<RegionRow> = sqlx::query_as(&format!("{SELECT_REGION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        row.map(Region::try_from).transpose()
    }

    pub async fn region_by_name(&mut self, name: &str) -> Result<Option<Region>> {
        self.flush().await?;
        let row: Option<RegionRow> = sqlx::query_as(&format!("{SELECT_REGION} WHERE name = ?"))
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        row.map(Region::try_from).transpose()
    }

    /// Every region, ordered by name.
    pub async fn regions(&mut self) -> Result<Vec<Region>> {
        self.flush().await?;
        let rows: Vec<RegionRow> = sqlx::query_as(&format!("{SELECT_REGION} ORDER BY name"))
            .fetch_all(&mut *self.tx)
            .await
            .or_db()?;
        rows.into_iter().map(Region::try_from).collect()
    }

    // =========================================================================
    // Basket history
    // =========================================================================

    /// Record the region's current basket: its item names at the current
    /// basket version, and the price each linked site last reported for them.
    #[instrument(skip(self))]
    pub async fn snapshot_basket(&mut self, region: RegionId) -> Result<HistoricalBasketId> {
        let Some(current) = self.region(region).await? else {
            exn::bail!(ErrorKind::Missing { entity: "region", id: region.0 });
        };
        let items: Vec<String> = self.items_in_region(region).await?.iter().map(|item| item.name().to_string()).collect();
        let mut prices = BTreeMap::new();
        for site in self.sites_of_region(region).await? {
            let known: BTreeMap<&String, f64> =
                items.iter().filter_map(|item| site.basket.get(item).map(|price| (item, *price))).collect();
            prices.insert(site.name.clone(), json!(known));
        }
        let basket = json!({
            "basket_version": current.basket_version,
            "items": items,
            "prices": prices,
        });
        let result = sqlx::query_scalar(
            "INSERT INTO historical_basket (region_id, basket_version, basket, recorded_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(region)
        .bind(current.basket_version)
        .bind(basket.to_string())
        .bind(UtcDateTime::now().unix_timestamp())
        .fetch_one(&mut *self.tx)
        .await
        .or_db();
        let id: HistoricalBasketId = self.guard(result)?;
        debug!(%id, "basket snapshot recorded");
        Ok(id)
    }

    /// Every snapshot of a region's basket, oldest first.
    pub async fn historical_baskets(&mut self, region: RegionId) -> Result<Vec<HistoricalBasket>> {
        self.flush().await?;
        let rows: Vec<HistoricalBasketRow> = sqlx::query_as(
            r#"
                SELECT id, region_id, basket_version, basket, recorded_at
                FROM historical_basket
                WHERE region_id = ?
                ORDER BY recorded_at, id
            "#,
        )
        .bind(region)
        .fetch_all(&mut *self.tx)
        .await
        .or_db()?;
        rows.into_iter().map(HistoricalBasket::try_from).collect()
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    pub async fn create_country(&mut self, name: &str) -> Result<CountryId> {
        self.flush().await?;
        let result = sqlx::query_scalar("INSERT INTO country (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await
            .or_db();
        self.guard(result)
    }

    pub async fn create_currency(&mut self, name: &str, abbreviation: &str) -> Result<CurrencyId> {
        self.flush().await?;
        let result = sqlx::query_scalar("INSERT INTO currency (name, abbreviation) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(abbreviation)
            .fetch_one(&mut *self.tx)
            .await
            .or_db();
        self.guard(result)
    }

    /// Store the rate from one currency to another, replacing any earlier rate
    /// for the same pair. Rates must be positive.
    pub async fn create_conversion_rate(
        &mut self,
        from: CurrencyId,
        to: CurrencyId,
        rate: f64,
    ) -> Result<ConversionRateId> {
        self.flush().await?;
        let result = sqlx::query_scalar(
            r#"
                INSERT INTO conversion_rate (from_currency_id, to_currency_id, rate, update_time)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (from_currency_id, to_currency_id)
                DO UPDATE SET rate = excluded.rate, update_time = excluded.update_time
                RETURNING id
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(rate)
        .bind(UtcDateTime::now().unix_timestamp())
        .fetch_one(&mut *self.tx)
        .await
        .or_db();
        self.guard(result)
    }

    pub async fn conversion_rate(&mut self, from: CurrencyId, to: CurrencyId) -> Result<Option<ConversionRate>> {
        self.flush().await?;
        let row: Option<ConversionRateRow> = sqlx::query_as(
            r#"
                SELECT id, from_currency_id, to_currency_id, rate, update_time
                FROM conversion_rate
                WHERE from_currency_id = ? AND to_currency_id = ?
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *self.tx)
        .await
        .or_db()?;
        row.map(ConversionRate::try_from).transpose()
    }

    pub async fn create_user(&mut self, name: &str) -> Result<UserId> {
        self.flush().await?;
        let result = sqlx::query_scalar("INSERT INTO app_user (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await
            .or_db();
        self.guard(result)
    }

    pub async fn create_dom_elem(&mut self, bs_name: &str, js_name: &str) -> Result<DomElemId> {
        self.flush().await?;
        let result = sqlx::query_scalar("INSERT INTO dom_elem (bs_name, js_name) VALUES (?, ?) RETURNING id")
            .bind(bs_name)
            .bind(js_name)
            .fetch_one(&mut *self.tx)
            .await
            .or_db();
        self.guard(result)
    }

    pub async fn dom_elem_by_bs_name(&mut self, bs_name: &str) -> Result<Option<DomElem>> {
        self.flush().await?;
        sqlx::query_as("SELECT id, bs_name, js_name FROM dom_elem WHERE bs_name = ?")
            .bind(bs_name)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()
    }

    pub async fn dom_elem_by_js_name(&mut self, js_name: &str) -> Result<Option<DomElem>> {
        self.flush().await?;
        sqlx::query_as("SELECT id, bs_name, js_name FROM dom_elem WHERE js_name = ?")
            .bind(js_name)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()
    }
}
