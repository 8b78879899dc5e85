//! Retail sites and URL resolution.

use super::Session;
use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::models::{Basket, ItemId, NewRetailSite, RegionId, RetailSite, RetailSiteId, RetailSiteRow, ScrapingRule};
use basketbot_urls::{DecomposedUrl, HttpsProbe};
use exn::ResultExt;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

const SELECT_SITE: &str = r#"
    SELECT id, name, protocol, subdomain, domain, suffix, basket_url, basket_version, basket
    FROM retail_site
"#;

impl Session {
    /// Insert a retail site, starting at the configured initial basket version.
    pub async fn create_retail_site(&mut self, site: NewRetailSite) -> Result<RetailSiteId> {
        self.flush().await?;
        let result = sqlx::query_scalar(
            r#"
                INSERT INTO retail_site (name, protocol, subdomain, domain, suffix, basket_url, basket_version)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
        )
        .bind(&site.name)
        .bind(site.url.protocol.as_str())
        .bind(&site.url.subdomain)
        .bind(&site.url.domain)
        .bind(&site.url.suffix)
        .bind(&site.basket_url)
        .bind(self.initial_version)
        .fetch_one(&mut *self.tx)
        .await
        .or_db();
        let id: RetailSiteId = self.guard(result)?;
        debug!(%id, site = %site.name, "retail site created");
        Ok(id)
    }

    /// Make a site one of a region's price sources. Linking twice is a no-op.
    pub async fn link_site_to_region(&mut self, site: RetailSiteId, region: RegionId) -> Result<()> {
        self.flush().await?;
        let result = sqlx::query("INSERT OR IGNORE INTO region_retail_site (region_id, retail_site_id) VALUES (?, ?)")
            .bind(region)
            .bind(site)
            .execute(&mut *self.tx)
            .await
            .or_db();
        self.guard(result)?;
        Ok(())
    }

    /// Replace a site's scraped prices, bumping the site's own basket version.
    ///
    /// Returns the new version.
    pub async fn set_site_basket(&mut self, site: RetailSiteId, basket: &Basket) -> Result<i64> {
        self.flush().await?;
        let json = serde_json::to_string(basket).or_raise(|| ErrorKind::InvalidData("retail site basket"))?;
        let result: Result<Option<i64>> = sqlx::query_scalar(
            "UPDATE retail_site SET basket = ?, basket_version = basket_version + 1 WHERE id = ? RETURNING basket_version",
        )
        .bind(json)
        .bind(site)
        .fetch_optional(&mut *self.tx)
        .await
        .or_db();
        match self.guard(result)? {
            Some(version) => Ok(version),
            None => exn::bail!(ErrorKind::Missing { entity: "retail site", id: site.0 }),
        }
    }

    pub async fn retail_site(&mut self, id: RetailSiteId) -> Result<Option<RetailSite>> {
        self.flush().await?;
        let row: Option<RetailSiteRow> = sqlx::query_as(&format!("{SELECT_SITE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        match row {
            Some(row) => Ok(Some(self.load_site(row).await?)),
            None => Ok(None),
        }
    }

    pub async fn retail_site_by_name(&mut self, name: &str) -> Result<Option<RetailSite>> {
        self.flush().await?;
        let row: Option<RetailSiteRow> = sqlx::query_as(&format!("{SELECT_SITE} WHERE name = ?"))
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        match row {
            Some(row) => Ok(Some(self.load_site(row).await?)),
            None => Ok(None),
        }
    }

    /// Every site stored under exactly these URL components.
    ///
    /// A missing subdomain only matches sites stored without one.
    pub async fn sites_matching_url(&mut self, url: &DecomposedUrl) -> Result<Vec<RetailSite>> {
        self.flush().await?;
        let rows: Vec<RetailSiteRow> = sqlx::query_as(&format!(
            "{SELECT_SITE} WHERE protocol = ? AND subdomain IS ? AND domain = ? AND suffix = ? ORDER BY id"
        ))
        .bind(url.protocol.as_str())
        .bind(&url.subdomain)
        .bind(&url.domain)
        .bind(&url.suffix)
        .fetch_all(&mut *self.tx)
        .await
        .or_db()?;
        let mut sites = Vec::with_capacity(rows.len());
        for row in rows {
            sites.push(self.load_site(row).await?);
        }
        Ok(sites)
    }

    /// Find the retail site a URL belongs to.
    ///
    /// The probe is only consulted when the URL has no scheme. Returns
    /// `Ok(None)` if no site matches and [`ErrorKind::SiteNotUnique`] if
    /// several do.
    #[instrument(skip(self, probe))]
    pub async fn resolve_site_by_url(&mut self, url: &str, probe: &dyn HttpsProbe) -> Result<Option<RetailSite>> {
        let decomposed = basketbot_urls::decompose(url, probe).await.or_raise(|| ErrorKind::Url)?;
        let mut sites = self.sites_matching_url(&decomposed).await?;
        match sites.len() {
            0 => {
                debug!("no retail site matches");
                Ok(None)
            },
            1 => Ok(sites.pop()),
            found => {
                warn!(found, "URL matches more than one retail site");
                exn::bail!(ErrorKind::SiteNotUnique { url: url.to_string(), found })
            },
        }
    }

    /// The rule to scrape `item` with on `site`: its exception rule if it has
    /// one, otherwise the site's default rule.
    ///
    /// Returns `Ok(None)` if the site does not exist.
    #[instrument(skip(self))]
    pub async fn resolve_rule_for_item(&mut self, site: RetailSiteId, item: ItemId) -> Result<Option<ScrapingRule>> {
        match self.retail_site(site).await? {
            Some(site) => Ok(Some(site.rule_for_item(item)?.clone())),
            None => Ok(None),
        }
    }

    /// Every site linked to a region, ordered by ID.
    pub(super) async fn sites_of_region(&mut self, region: RegionId) -> Result<Vec<RetailSite>> {
        let rows: Vec<RetailSiteRow> = sqlx::query_as(&format!(
            "{SELECT_SITE} WHERE id IN (SELECT retail_site_id FROM region_retail_site WHERE region_id = ?) ORDER BY id"
        ))
        .bind(region)
        .fetch_all(&mut *self.tx)
        .await
        .or_db()?;
        let mut sites = Vec::with_capacity(rows.len());
        for row in rows {
            sites.push(self.load_site(row).await?);
        }
        Ok(sites)
    }

    async fn load_site(&mut self, row: RetailSiteRow) -> Result<RetailSite> {
        let regions: Vec<RegionId> =
            sqlx::query_scalar("SELECT region_id FROM region_retail_site WHERE retail_site_id = ?")
                .bind(row.id)
                .fetch_all(&mut *self.tx)
                .await
                .or_db()?;
        let rules = self.rules_of_site(row.id).await?;
        RetailSite::try_from((row, regions.into_iter().collect::<BTreeSet<_>>(), rules))
    }
}
