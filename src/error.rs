//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not set up logging")]
    Logging,
    #[display("could not create database directory")]
    Io,
    #[display("store error")]
    Store,
    /// The command's target does not exist; not a failure of the tool itself.
    #[display("{_0}")]
    NotFound(#[error(not(source))] String),
}
