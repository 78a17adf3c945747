//! Typed errors for the offer pipeline.
//!
//! Every error here is scoped: a `FieldParseError` costs one listing, a
//! `SourceError` costs one source for one cycle, a `DispatchError` ends the
//! send loop of one cycle. None of them is retried within a cycle.

use std::path::PathBuf;

use thiserror::Error;

use crate::offer::SourceKind;

/// Network-level failure while fetching a listing page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading body of {url} failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid header {name}: {reason}")]
    Header { name: String, reason: String },
}

/// The page no longer has the structure the extractor relies on.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{site}: selector `{selector}` matched nothing, site layout changed?")]
    Structural {
        site: SourceKind,
        selector: &'static str,
    },
}

/// One listing could not be turned into an offer.
#[derive(Debug, Error, PartialEq)]
#[error("field `{field}`: {reason}")]
pub struct FieldParseError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldParseError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::new(field, "element missing")
    }
}

/// Failure reported by a notification sink.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SinkError {
    /// Timeouts, refused connections, gateway errors. Expected noise.
    #[error("transient sink error: {0}")]
    Transient(String),

    #[error("sink error: {0}")]
    Fatal(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Known-key store I/O.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("known-key store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("known-key store {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("serializing known keys: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Anything that aborts one source for one cycle before dispatch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("extraction task failed: {0}")]
    Join(String),
}

/// Aborts the remaining sends of a cycle.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Sink(SinkError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
