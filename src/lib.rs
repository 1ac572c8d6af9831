//! wphtml-rewriter
//! Rewrites serialized WordPress content records for static publication:
//! inline images hosted on the source site become responsive derivative
//! markup, and absolute same-domain links become root-relative paths.
//!
//! The public entry point is [`process_node`]; callers supply the
//! service implementations behind [`Services`] and share one
//! [`PendingReferenceSet`] across records.

mod config;
mod services;
mod error;
mod fragment;
mod link_rewriter;
mod media_resolver;
mod pending;
mod processor;
mod record;
mod remote_file;
mod scanner;
mod splicer;
mod width_policy;

pub use services::{
    DerivativeRenderer, DerivativeRequest, FileLink, FileRecord, MediaDetails, MediaItemRecord,
    MediaLibrary, RecordStore, RemoteFileFetcher, RemoteFileRequest, ResponsiveDerivative,
    Services,
};
pub use config::{HtmlOptions, ProcessorOptions};
pub use error::{FetchError, ProcessError};
pub use pending::PendingReferenceSet;
pub use processor::process_node;
pub use record::{ContentRecord, RecordFields};
pub use remote_file::HttpRemoteFileFetcher;
