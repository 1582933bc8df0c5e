//! The central error type used throughout crosspost.
//!
//! Mirrors the taxonomy a user of this crate actually needs to branch on:
//! a domain error the caller should turn into a reply to the operator, a
//! remote-service failure that should be logged and swallowed, a storage
//! failure, or a boot-time failure that should abort the process.

use thiserror::Error;

/// Errors a human operator caused by sending a malformed or disallowed
/// command. These are never logged; they are translated into a localized
/// reply by the command layer and nothing else happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("invalid request")]
    InvalidRequest,
    #[error("no such source page: {0}")]
    NoSuchSource(String),
    #[error("source page is private or blocked: {0}")]
    SourcePrivate(String),
    #[error("no such destination chat: {0}")]
    NoSuchDestination(String),
    #[error("operator lacks admin rights on destination chat")]
    NotAdmin,
    #[error("subscription already exists")]
    DuplicateSubscription,
    #[error("subscription limit reached")]
    LimitReached,
    #[error("no subscription with that id")]
    NoSuchSubscription,
    #[error("no subscriptions to show")]
    EmptyList,
}

/// Top level error type returned from fallible crosspost operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A user-input error; the caller should render it via a [`crate::locale::Locale`]
    /// and must not log it.
    #[error(transparent)]
    UserInput(#[from] UserError),

    /// A source- or messaging-platform call failed. The enclosing operation
    /// (a poll batch, a single send) is abandoned; the caller logs this and
    /// continues, it is never surfaced to an operator.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// The persistent store rejected or failed an operation.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Boot-time file access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Boot-time configuration is missing or out of bounds.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Generic result type used throughout crosspost.
pub type Result<T> = std::result::Result<T, Error>;
