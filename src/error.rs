//! Error types

use thiserror::Error;

/// Fatal pipeline errors. Anything returned here aborts processing of the
/// current record; non-fatal conditions (missing assets, failed derivatives,
/// skipped links) are logged and handled in place instead.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to serialize {type_name} {id}: {source}")]
    Serialize {
        type_name: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to reparse {type_name} {id} after rewriting: {source}")]
    Reparse {
        type_name: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Unexpected failure while downloading an inline image. Not-found
    /// failures never reach this variant; see [`FetchError`].
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("media lookup failed: {0}")]
    MediaLookup(#[source] anyhow::Error),
}

/// Failure classes for the remote-file fetcher. The pipeline
/// treats `NotFound` as a per-image skip and everything else as fatal for
/// the record being processed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} was not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}
