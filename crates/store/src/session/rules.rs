//! Scraping rule writes. Every insert and update passes the validator first.

use super::{Session, validate};
use crate::error::{DatabaseResultExt, ErrorKind, Result};
use crate::models::{ItemId, NewScrapingRule, RetailSiteId, ScrapingRule, ScrapingRuleId, ScrapingRuleRow};
use std::collections::BTreeSet;
use time::UtcDateTime;
use tracing::{debug, instrument};

const SELECT_RULE: &str = r#"
    SELECT id, update_time, user_id, retail_site_id, default_rule, parent_elem_id, parent_id, class_chain
    FROM scraping_rule
"#;

impl Session {
    /// Validate and insert a scraping rule.
    ///
    /// Fails with [`ErrorKind::Integrity`] if a default rule lists items, an
    /// exception rule lists none, or an item is already claimed by another
    /// exception rule of the same site.
    #[instrument(skip(self, rule), fields(site = %rule.retail_site_id, default = rule.default_rule))]
    pub async fn create_scraping_rule(&mut self, rule: NewScrapingRule) -> Result<ScrapingRuleId> {
        self.flush().await?;
        let result = self.insert_rule(&rule, UtcDateTime::now()).await;
        self.guard(result)
    }

    /// Validate and write every field of an existing rule, replacing its items.
    ///
    /// The rule's `update_time` is set to now.
    #[instrument(skip(self, rule), fields(rule = %rule.id))]
    pub async fn update_scraping_rule(&mut self, rule: &mut ScrapingRule) -> Result<()> {
        self.flush().await?;
        let now = UtcDateTime::now();
        let result = self.overwrite_rule(rule, now).await;
        self.guard(result)?;
        rule.update_time = now;
        Ok(())
    }

    pub async fn delete_scraping_rule(&mut self, id: ScrapingRuleId) -> Result<()> {
        self.flush().await?;
        let result = sqlx::query("DELETE FROM scraping_rule WHERE id = ?").bind(id).execute(&mut *self.tx).await.or_db();
        let deleted = self.guard(result)?;
        if deleted.rows_affected() == 0 {
            exn::bail!(ErrorKind::Missing { entity: "scraping rule", id: id.0 });
        }
        Ok(())
    }

    pub async fn scraping_rule(&mut self, id: ScrapingRuleId) -> Result<Option<ScrapingRule>> {
        self.flush().await?;
        let row: Option<ScrapingRuleRow> = sqlx::query_as(&format!("{SELECT_RULE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .or_db()?;
        match row {
            Some(row) => Ok(Some(self.load_rule(row).await?)),
            None => Ok(None),
        }
    }

    /// Every rule of a site, ordered by ID.
    pub(super) async fn rules_of_site(&mut self, site: RetailSiteId) -> Result<Vec<ScrapingRule>> {
        let rows: Vec<ScrapingRuleRow> =
            sqlx::query_as(&format!("{SELECT_RULE} WHERE retail_site_id = ? ORDER BY id"))
                .bind(site)
                .fetch_all(&mut *self.tx)
                .await
                .or_db()?;
        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(self.load_rule(row).await?);
        }
        Ok(rules)
    }

    async fn load_rule(&mut self, row: ScrapingRuleRow) -> Result<ScrapingRule> {
        let items: Vec<ItemId> =
            sqlx::query_scalar("SELECT item_id FROM scraping_rule_item WHERE scraping_rule_id = ?")
                .bind(row.id)
                .fetch_all(&mut *self.tx)
                .await
                .or_db()?;
        ScrapingRule::try_from((row, items.into_iter().collect::<BTreeSet<_>>()))
    }

    async fn insert_rule(&mut self, rule: &NewScrapingRule, now: UtcDateTime) -> Result<ScrapingRuleId> {
        validate::rule_shape(rule.default_rule, &rule.items)?;
        if !rule.default_rule {
            validate::items_unclaimed(&mut self.tx, rule.retail_site_id, None, &rule.items).await?;
        }
        let id: ScrapingRuleId = sqlx::query_scalar(
            r#"
                INSERT INTO scraping_rule
                    (update_time, user_id, retail_site_id, default_rule, parent_elem_id, parent_id, class_chain)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
        )
        .bind(now.unix_timestamp())
        .bind(rule.user_id)
        .bind(rule.retail_site_id)
        .bind(rule.default_rule)
        .bind(rule.parent_elem_id)
        .bind(&rule.parent_id)
        .bind(rule.class_chain.to_json()?)
        .fetch_one(&mut *self.tx)
        .await
        .or_db()?;
        self.bind_rule_items(id, &rule.items).await?;
        debug!(%id, "scraping rule created");
        Ok(id)
    }

    async fn overwrite_rule(&mut self, rule: &ScrapingRule, now: UtcDateTime) -> Result<()> {
        validate::rule_shape(rule.default_rule, &rule.items)?;
        if !rule.default_rule {
            validate::items_unclaimed(&mut self.tx, rule.retail_site_id, Some(rule.id), &rule.items).await?;
        }
        let updated = sqlx::query(
            r#"
                UPDATE scraping_rule
                SET update_time = ?, user_id = ?, retail_site_id = ?, default_rule = ?,
                    parent_elem_id = ?, parent_id = ?, class_chain = ?
                WHERE id = ?
            "#,
        )
        .bind(now.unix_timestamp())
        .bind(rule.user_id)
        .bind(rule.retail_site_id)
        .bind(rule.default_rule)
        .bind(rule.parent_elem_id)
        .bind(&rule.parent_id)
        .bind(rule.class_chain.to_json()?)
        .bind(rule.id)
        .execute(&mut *self.tx)
        .await
        .or_db()?;
        if updated.rows_affected() == 0 {
            exn::bail!(ErrorKind::Missing { entity: "scraping rule", id: rule.id.0 });
        }
        sqlx::query("DELETE FROM scraping_rule_item WHERE scraping_rule_id = ?")
            .bind(rule.id)
            .execute(&mut *self.tx)
            .await
            .or_db()?;
        self.bind_rule_items(rule.id, &rule.items).await?;
        debug!(id = %rule.id, "scraping rule updated");
        Ok(())
    }

    async fn bind_rule_items(&mut self, rule: ScrapingRuleId, items: &BTreeSet<ItemId>) -> Result<()> {
        for item in items {
            sqlx::query("INSERT INTO scraping_rule_item (scraping_rule_id, item_id) VALUES (?, ?)")
                .bind(rule)
                .bind(*item)
                .execute(&mut *self.tx)
                .await
                .or_db()?;
        }
        Ok(())
    }
}
