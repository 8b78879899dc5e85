use crate::error::{Error, Result};
use crate::models::{ClassChain, DomElemId, ItemId, RetailSiteId, ScrapingRuleId, UserId, from_timestamp};
use std::collections::BTreeSet;
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct ScrapingRuleRow {
    pub(crate) id: ScrapingRuleId,
    update_time: i64,
    user_id: Option<UserId>,
    retail_site_id: RetailSiteId,
    default_rule: bool,
    parent_elem_id: DomElemId,
    parent_id: String,
    class_chain: String,
}

/// Where on a retail site's page to find a price.
///
/// A site has exactly one *default* rule, bound to no items, and any number of
/// *exception* rules, each bound to the items it overrides the default for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapingRule {
    pub id: ScrapingRuleId,
    pub update_time: UtcDateTime,
    pub user_id: Option<UserId>,
    pub retail_site_id: RetailSiteId,
    pub default_rule: bool,
    /// Element the class chain is anchored to.
    pub parent_elem_id: DomElemId,
    /// `id` attribute of the anchor element.
    pub parent_id: String,
    pub class_chain: ClassChain,
    pub items: BTreeSet<ItemId>,
}

/// A scraping rule that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScrapingRule {
    pub user_id: Option<UserId>,
    pub retail_site_id: RetailSiteId,
    pub default_rule: bool,
    pub parent_elem_id: DomElemId,
    pub parent_id: String,
    pub class_chain: ClassChain,
    pub items: BTreeSet<ItemId>,
}

impl NewScrapingRule {
    /// The fallback rule for every item without an exception.
    pub fn default_for(site: RetailSiteId, parent_elem: DomElemId, parent_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            retail_site_id: site,
            default_rule: true,
            parent_elem_id: parent_elem,
            parent_id: parent_id.into(),
            class_chain: ClassChain::default(),
            items: BTreeSet::new(),
        }
    }

    /// A rule overriding the default for the given items.
    pub fn exception_for(
        site: RetailSiteId,
        parent_elem: DomElemId,
        parent_id: impl Into<String>,
        items: impl IntoIterator<Item = ItemId>,
    ) -> Self {
        Self { default_rule: false, items: items.into_iter().collect(), ..Self::default_for(site, parent_elem, parent_id) }
    }

    pub fn with_class_chain(mut self, class_chain: ClassChain) -> Self {
        self.class_chain = class_chain;
        self
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user_id = Some(user);
        self
    }
}

impl From<ScrapingRule> for NewScrapingRule {
    fn from(rule: ScrapingRule) -> Self {
        Self {
            user_id: rule.user_id,
            retail_site_id: rule.retail_site_id,
            default_rule: rule.default_rule,
            parent_elem_id: rule.parent_elem_id,
            parent_id: rule.parent_id,
            class_chain: rule.class_chain,
            items: rule.items,
        }
    }
}

impl TryFrom<(ScrapingRuleRow, BTreeSet<ItemId>)> for ScrapingRule {
    type Error = Error;
    fn try_from((row, items): (ScrapingRuleRow, BTreeSet<ItemId>)) -> Result<Self> {
        Ok(Self {
            id: row.id,
            update_time: from_timestamp(row.update_time, "scraping rule update time")?,
            user_id: row.user_id,
            retail_site_id: row.retail_site_id,
            default_rule: row.default_rule,
            parent_elem_id: row.parent_elem_id,
            parent_id: row.parent_id,
            class_chain: ClassChain::from_json(&row.class_chain)?,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model() {
        let row = ScrapingRuleRow {
            id: ScrapingRuleId(7),
            update_time: 1_700_000_000,
            user_id: None,
            retail_site_id: RetailSiteId(1),
            default_rule: false,
            parent_elem_id: DomElemId(1),
            parent_id: "product-price".to_string(),
            class_chain: r#"{"0": {"element_type": "span", "classes": ["price"]}}"#.to_string(),
        };
        let rule = ScrapingRule::try_from((row, BTreeSet::from([ItemId(3)]))).unwrap();
        assert_eq!(rule.class_chain.links()[0].element_type, "span");
        assert!(rule.items.contains(&ItemId(3)));
    }

    #[test]
    fn test_exception_constructor() {
        let rule = NewScrapingRule::exception_for(RetailSiteId(1), DomElemId(2), "main", [ItemId(4), ItemId(4)]);
        assert!(!rule.default_rule);
        assert_eq!(rule.items.len(), 1);
        assert!(NewScrapingRule::default_for(RetailSiteId(1), DomElemId(2), "main").default_rule);
    }
}
