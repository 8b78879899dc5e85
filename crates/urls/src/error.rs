//! URL Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A URL decomposition error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for URL operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input could not be parsed as a URL at all.
    #[display("invalid URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// The URL uses a scheme other than `http` or `https`.
    #[display("unsupported protocol: {_0}")]
    UnsupportedProtocol(#[error(not(source))] String),
    /// The URL parsed, but has no host (or an IP address for a host).
    #[display("URL has no domain name: {_0}")]
    MissingHost(#[error(not(source))] String),
    /// The host has no registrable domain in front of its public suffix
    /// (`localhost`, `co.uk`, etc.).
    #[display("no registrable domain in host: {_0}")]
    NoRegistrableDomain(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A URL either decomposes or it doesn't.
        false
    }
}
