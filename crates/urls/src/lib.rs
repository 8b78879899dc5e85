//! URL decomposition for retail site matching.
//!
//! Retail sites are stored by their URL components rather than a full URL, so
//! that any page on a site (product pages, search results, checkout) can be
//! matched back to the site it belongs to. A URL is broken down into:
//!
//! - **protocol**: `http` or `https`, taken from the URL when present and
//!   otherwise decided by an [`HttpsProbe`],
//! - **subdomain**: everything in front of the registrable domain (`www`),
//!   or `None`,
//! - **domain**: the registrable domain label (`superstore`),
//! - **suffix**: the public suffix (`com`, `co.uk`).
//!
//! Paths, query strings, fragments, ports and credentials play no part in
//! matching and are discarded.

pub mod error;

use async_trait::async_trait;
use derive_more::Display;
use exn::ResultExt;
use std::str::FromStr;
use tracing::{debug, instrument};
use url::{Host, Url};

use crate::error::{Error, ErrorKind, Result};

/// Scheme of a retail site URL.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    #[display("http")]
    Http,
    #[display("https")]
    Https,
}
impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}
impl FromStr for Protocol {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => exn::bail!(ErrorKind::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Decides the protocol of a URL that was given without one.
///
/// Implementations are expected to reach out over the network (request the
/// `https://` variant of the host and check for a successful response); the
/// decomposition itself never does.
#[async_trait]
pub trait HttpsProbe: Send + Sync {
    /// Returns `true` if the host should be addressed over `https`.
    async fn supports_https(&self, host: &str) -> bool;
}

/// A probe that gives the same answer for every host, without any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProbe(pub bool);
#[async_trait]
impl HttpsProbe for StaticProbe {
    async fn supports_https(&self, _host: &str) -> bool {
        self.0
    }
}

/// A URL split into its host components, with the protocol still unknown if
/// the input had no scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub protocol: Option<Protocol>,
    pub subdomain: Option<String>,
    pub domain: String,
    pub suffix: String,
}
impl ParsedUrl {
    /// Fix the protocol, overriding whatever was parsed.
    pub fn with_protocol(self, protocol: Protocol) -> DecomposedUrl {
        DecomposedUrl {
            protocol,
            subdomain: self.subdomain,
            domain: self.domain,
            suffix: self.suffix,
        }
    }

    /// Use the parsed protocol, or ask the probe when the URL had none.
    pub async fn resolve(self, probe: &dyn HttpsProbe) -> DecomposedUrl {
        let protocol = match self.protocol {
            Some(protocol) => protocol,
            None => {
                let host = host_of(self.subdomain.as_deref(), &self.domain, &self.suffix);
                let protocol = if probe.supports_https(&host).await { Protocol::Https } else { Protocol::Http };
                debug!(%host, %protocol, "probed protocol for scheme-less URL");
                protocol
            },
        };
        self.with_protocol(protocol)
    }
}

/// A fully decomposed URL, ready for matching against stored retail sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecomposedUrl {
    pub protocol: Protocol,
    pub subdomain: Option<String>,
    pub domain: String,
    pub suffix: String,
}
impl DecomposedUrl {
    /// Full host name, e.g. `www.superstore.com`.
    pub fn host(&self) -> String {
        host_of(self.subdomain.as_deref(), &self.domain, &self.suffix)
    }

    /// Site root, e.g. `http://www.superstore.com`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host())
    }
}

fn host_of(subdomain: Option<&str>, domain: &str, suffix: &str) -> String {
    match subdomain {
        Some(subdomain) => format!("{subdomain}.{domain}.{suffix}"),
        None => format!("{domain}.{suffix}"),
    }
}

/// The scheme of `input`, if it starts with one.
///
/// Anything in front of `://` that is not a bare scheme name (for example a
/// scheme-less URL whose query holds another URL) means there is no scheme.
fn split_scheme(input: &str) -> Option<&str> {
    let (scheme, _) = input.split_once("://")?;
    let bare = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    bare.then_some(scheme)
}

/// Split a URL string into protocol (if explicit) and host components.
///
/// The suffix is looked up in the Public Suffix List, so multi-label
/// suffixes such as `co.uk` or `com.es` stay together.
pub fn parse(input: &str) -> Result<ParsedUrl> {
    let input = input.trim();
    let (protocol, with_scheme) = match split_scheme(input) {
        Some(scheme) => (Some(scheme.parse::<Protocol>()?), input.to_string()),
        None => (None, format!("http://{input}")),
    };
    let url = Url::parse(&with_scheme).or_raise(|| ErrorKind::InvalidUrl(input.to_string()))?;
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
        _ => exn::bail!(ErrorKind::MissingHost(input.to_string())),
    };
    if host.split('.').any(str::is_empty) {
        exn::bail!(ErrorKind::InvalidUrl(input.to_string()));
    }
    let Some((domain, suffix)) = psl::domain_str(&host).and_then(|registrable| registrable.split_once('.')) else {
        exn::bail!(ErrorKind::NoRegistrableDomain(host));
    };
    let subdomain = host
        .strip_suffix(suffix)
        .and_then(|rest| rest.strip_suffix('.'))
        .and_then(|rest| rest.strip_suffix(domain))
        .and_then(|rest| rest.strip_suffix('.'))
        .map(str::to_string);
    Ok(ParsedUrl {
        protocol,
        subdomain,
        domain: domain.to_string(),
        suffix: suffix.to_string(),
    })
}

/// Decompose a URL string, probing for `https` support when no scheme is given.
#[instrument(skip(probe))]
pub async fn decompose(input: &str, probe: &dyn HttpsProbe) -> Result<DecomposedUrl> {
    Ok(parse(input)?.resolve(probe).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://www.superstore.com", Some(Protocol::Http), Some("www"), "superstore", "com")]
    #[case("http://www.superstore.com/products/2423452345", Some(Protocol::Http), Some("www"), "superstore", "com")]
    #[case("http://www.superstore.com/products/4544?ra=45@la=55", Some(Protocol::Http), Some("www"), "superstore", "com")]
    #[case("http://megastore.com/products/4544?ra=45@la=55", Some(Protocol::Http), None, "megastore", "com")]
    #[case("https://www.superstore.co.uk/products/4544", Some(Protocol::Https), Some("www"), "superstore", "co.uk")]
    #[case("HTTPS://Shop.Example.COM:8443/basket#top", Some(Protocol::Https), Some("shop"), "example", "com")]
    #[case("buy.eu.megastore.com.au/x", None, Some("buy.eu"), "megastore", "com.au")]
    #[case("superstore.com", None, None, "superstore", "com")]
    #[case("http://www.billa.co.at", Some(Protocol::Http), Some("www"), "billa", "co.at")]
    #[case("https://www.elcorteingles.com.es/moda", Some(Protocol::Https), Some("www"), "elcorteingles", "com.es")]
    #[case("www.superstore.com/go?next=http://x.com", None, Some("www"), "superstore", "com")]
    #[case("superstore.com#from=https://megastore.com", None, None, "superstore", "com")]
    fn test_parse(
        #[case] input: &str,
        #[case] protocol: Option<Protocol>,
        #[case] subdomain: Option<&str>,
        #[case] domain: &str,
        #[case] suffix: &str,
    ) {
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.protocol, protocol);
        assert_eq!(parsed.subdomain.as_deref(), subdomain);
        assert_eq!(parsed.domain, domain);
        assert_eq!(parsed.suffix, suffix);
    }

    #[rstest]
    #[case("ftp://www.superstore.com")]
    #[case("http://")]
    #[case("http://127.0.0.1/products")]
    #[case("http://localhost:8080")]
    #[case("https://co.uk")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(parse(input).is_err());
    }

    #[test]
    fn test_unsupported_protocol_kind() {
        let err = parse("ftp://www.superstore.com").unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedProtocol("ftp".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_protocol_ignores_probe() {
        let url = decompose("http://www.superstore.com", &StaticProbe(true)).await.unwrap();
        assert_eq!(url.protocol, Protocol::Http);
        assert_eq!(url.base_url(), "http://www.superstore.com");
    }

    #[rstest]
    #[case(true, Protocol::Https)]
    #[case(false, Protocol::Http)]
    #[tokio::test]
    async fn test_missing_protocol_uses_probe(#[case] https: bool, #[case] expected: Protocol) {
        let url = decompose("www.superstore.com/products", &StaticProbe(https)).await.unwrap();
        assert_eq!(url.protocol, expected);
        assert_eq!(url.host(), "www.superstore.com");
    }
}
