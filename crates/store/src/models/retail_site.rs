use crate::error::{Error, ErrorKind, Result};
use crate::models::{ItemId, RegionId, RetailSiteId, ScrapingRule};
use basketbot_urls::{DecomposedUrl, Protocol};
use exn::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Latest scraped prices of a site, keyed by item name.
pub type Basket = BTreeMap<String, f64>;

#[derive(sqlx::FromRow)]
pub(crate) struct RetailSiteRow {
    pub(crate) id: RetailSiteId,
    name: String,
    protocol: String,
    subdomain: Option<String>,
    domain: String,
    suffix: String,
    basket_url: Option<String>,
    basket_version: i64,
    basket: String,
}

/// A retail website, identified by the components of its URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RetailSite {
    pub id: RetailSiteId,
    pub name: String,
    pub url: DecomposedUrl,
    /// Page listing the whole basket, if the site has one.
    pub basket_url: Option<String>,
    pub basket_version: i64,
    pub basket: Basket,
    pub regions: BTreeSet<RegionId>,
    /// Ordered by ID.
    pub scraping_rules: Vec<ScrapingRule>,
}

/// A retail site that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRetailSite {
    pub name: String,
    pub url: DecomposedUrl,
    pub basket_url: Option<String>,
}

impl NewRetailSite {
    pub fn new(name: impl Into<String>, url: DecomposedUrl) -> Self {
        Self { name: name.into(), url, basket_url: None }
    }

    pub fn with_basket_url(mut self, basket_url: impl Into<String>) -> Self {
        self.basket_url = Some(basket_url.into());
        self
    }
}

impl RetailSite {
    /// The one rule that applies to every item without an exception.
    ///
    /// Raises [`ErrorKind::DefaultRuleNotUnique`] if the site has no default
    /// rule, or more than one.
    pub fn default_rule(&self) -> Result<&ScrapingRule> {
        let mut defaults = self.scraping_rules.iter().filter(|rule| rule.default_rule);
        match (defaults.next(), defaults.next()) {
            (Some(rule), None) => Ok(rule),
            _ => {
                let found = self.scraping_rules.iter().filter(|rule| rule.default_rule).count();
                warn!(site = %self.name, found, "retail site does not have exactly one default scraping rule");
                exn::bail!(ErrorKind::DefaultRuleNotUnique { site: self.name.clone(), found })
            },
        }
    }

    /// Every rule that is not the default.
    pub fn exception_rules(&self) -> Vec<&ScrapingRule> {
        self.scraping_rules.iter().filter(|rule| !rule.default_rule).collect()
    }

    /// The exception rule bound to `item`, falling back to the default rule.
    pub fn rule_for_item(&self, item: ItemId) -> Result<&ScrapingRule> {
        match self.scraping_rules.iter().find(|rule| !rule.default_rule && rule.items.contains(&item)) {
            Some(rule) => Ok(rule),
            None => self.default_rule(),
        }
    }
}

impl TryFrom<(RetailSiteRow, BTreeSet<RegionId>, Vec<ScrapingRule>)> for RetailSite {
    type Error = Error;
    fn try_from(
        (row, regions, scraping_rules): (RetailSiteRow, BTreeSet<RegionId>, Vec<ScrapingRule>),
    ) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            url: DecomposedUrl {
                protocol: row.protocol.parse::<Protocol>().or_raise(|| ErrorKind::InvalidData("protocol"))?,
                subdomain: row.subdomain,
                domain: row.domain,
                suffix: row.suffix,
            },
            basket_url: row.basket_url,
            basket_version: row.basket_version,
            basket: serde_json::from_str(&row.basket).or_raise(|| ErrorKind::InvalidData("retail site basket"))?,
            regions,
            scraping_rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassChain, DomElemId, ScrapingRuleId};
    use rstest::rstest;
    use time::UtcDateTime;

    fn rule(id: i64, default_rule: bool, items: &[i64]) -> ScrapingRule {
        ScrapingRule {
            id: ScrapingRuleId(id),
            update_time: UtcDateTime::now(),
            user_id: None,
            retail_site_id: RetailSiteId(1),
            default_rule,
            parent_elem_id: DomElemId(1),
            parent_id: format!("rule-{id}"),
            class_chain: ClassChain::default(),
            items: items.iter().copied().map(ItemId).collect(),
        }
    }

    fn site(rules: Vec<ScrapingRule>) -> RetailSite {
        RetailSite {
            id: RetailSiteId(1),
            name: "Superstore".to_string(),
            url: DecomposedUrl {
                protocol: Protocol::Http,
                subdomain: Some("www".to_string()),
                domain: "superstore".to_string(),
                suffix: "com".to_string(),
            },
            basket_url: None,
            basket_version: 1,
            basket: Basket::new(),
            regions: BTreeSet::new(),
            scraping_rules: rules,
        }
    }

    #[test]
    fn test_single_default_rule() {
        let site = site(vec![rule(1, true, &[]), rule(2, false, &[3])]);
        assert_eq!(site.default_rule().unwrap().id, ScrapingRuleId(1));
        assert_eq!(site.exception_rules().len(), 1);
    }

    #[rstest]
    #[case::none(vec![rule(2, false, &[3])], 0)]
    #[case::two(vec![rule(1, true, &[]), rule(2, true, &[])], 2)]
    fn test_default_rule_not_unique(#[case] rules: Vec<ScrapingRule>, #[case] expected: usize) {
        let err = site(rules).default_rule().unwrap_err();
        assert!(matches!(&*err, ErrorKind::DefaultRuleNotUnique { found, .. } if *found == expected));
    }

    #[test]
    fn test_rule_for_item_prefers_exception() {
        let site = site(vec![rule(1, true, &[]), rule(2, false, &[3, 4])]);
        assert_eq!(site.rule_for_item(ItemId(4)).unwrap().id, ScrapingRuleId(2));
        assert_eq!(site.rule_for_item(ItemId(5)).unwrap().id, ScrapingRuleId(1));
    }

    #[test]
    fn test_rule_for_item_without_default() {
        let site = site(vec![rule(2, false, &[3])]);
        assert_eq!(site.rule_for_item(ItemId(3)).unwrap().id, ScrapingRuleId(2));
        let err = site.rule_for_item(ItemId(9)).unwrap_err();
        assert!(matches!(*err, ErrorKind::DefaultRuleNotUnique { found: 0, .. }));
    }
}
