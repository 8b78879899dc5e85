use crate::error::{Error, ErrorKind, Violation};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One step of a [`ClassChain`]: an element type and the CSS classes it must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub element_type: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl ChainLink {
    pub fn new(element_type: impl Into<String>, classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { element_type: element_type.into(), classes: classes.into_iter().map(Into::into).collect() }
    }
}

/// Ordered descent from a rule's parent element down to the price element.
///
/// Stored as a JSON object keyed by position (`"0"`, `"1"`, ...) so that the
/// browser extension and the scraper read the same document. Keys must run
/// from zero without gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, ChainLink>", into = "BTreeMap<String, ChainLink>")]
pub struct ClassChain(Vec<ChainLink>);

impl ClassChain {
    pub fn new(links: impl IntoIterator<Item = ChainLink>) -> Self {
        Self(links.into_iter().collect())
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Parse a chain supplied by a user, e.g. as recorded by the browser extension.
    ///
    /// Unlike reading a stored chain, a badly keyed chain is reported as an
    /// [`ErrorKind::Integrity`] violation.
    pub fn parse(json: &str) -> Result<Self, Error> {
        let map: BTreeMap<String, ChainLink> =
            serde_json::from_str(json).or_raise(|| ErrorKind::InvalidData("class chain"))?;
        Self::try_from(map).map_err(|violation| Error::from(ErrorKind::Integrity(violation)))
    }

    pub(crate) fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).or_raise(|| ErrorKind::InvalidData("class chain"))
    }

    pub(crate) fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).or_raise(|| ErrorKind::InvalidData("class chain"))
    }
}

impl TryFrom<BTreeMap<String, ChainLink>> for ClassChain {
    type Error = Violation;
    fn try_from(map: BTreeMap<String, ChainLink>) -> Result<Self, Self::Error> {
        let mut indexed = Vec::with_capacity(map.len());
        for (key, link) in map {
            // Keys are canonical: "1", never "01" or "+1".
            let position = key
                .parse::<usize>()
                .ok()
                .filter(|position| position.to_string() == key)
                .ok_or_else(|| Violation::InvalidClassChain(format!("key '{key}' is not a position")))?;
            indexed.push((position, link));
        }
        // BTreeMap orders "10" before "2", so sort numerically.
        indexed.sort_by_key(|(position, _)| *position);
        for (expected, (position, _)) in indexed.iter().enumerate() {
            if *position != expected {
                return Err(Violation::InvalidClassChain(format!("expected key '{expected}', found '{position}'")));
            }
        }
        Ok(Self(indexed.into_iter().map(|(_, link)| link).collect()))
    }
}

impl From<ClassChain> for BTreeMap<String, ChainLink> {
    fn from(chain: ClassChain) -> Self {
        chain.0.into_iter().enumerate().map(|(position, link)| (position.to_string(), link)).collect()
    }
}
