//! Service interfaces
//! Trait boundaries for the media library, remote-file download, derivative
//! rendering, and the record store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A media asset known to the CMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItemRecord {
    pub id: String,

    #[serde(rename = "sourceUrl")]
    pub source_url: String,

    #[serde(rename = "mediaDetails", skip_serializing_if = "Option::is_none")]
    pub media_details: Option<MediaDetails>,

    #[serde(rename = "localFile", skip_serializing_if = "Option::is_none")]
    pub local_file: Option<FileLink>,
}

impl MediaItemRecord {
    /// Natural pixel width of the source image, when the CMS reported one.
    pub fn natural_width(&self) -> Option<u32> {
        self.media_details.as_ref().and_then(|details| details.width)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Reference from a media asset to its backing file record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLink {
    pub id: String,
}

/// A downloaded (or locally stored) file backing an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub url: String,

    #[serde(rename = "absolutePath", skip_serializing_if = "Option::is_none")]
    pub absolute_path: Option<String>,
}

/// Batch lookup of media assets. Implementations create backing store
/// entries for newly seen assets but must otherwise be idempotent and
/// side-effect-free.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    async fn fetch_by_source_urls(&self, urls: &[String]) -> anyhow::Result<Vec<MediaItemRecord>>;

    async fn fetch_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<MediaItemRecord>>;
}

#[derive(Debug, Clone)]
pub struct RemoteFileRequest<'a> {
    pub url: &'a str,
    /// Record the file was discovered in; stored as the file's parent.
    pub parent_record_id: &'a str,
    /// When false, the fetcher downloads without persisting a file record.
    pub create_file_record: bool,
}

/// Direct download of a file that has no media asset behind it.
#[async_trait]
pub trait RemoteFileFetcher: Send + Sync {
    async fn fetch(&self, request: RemoteFileRequest<'_>) -> Result<FileRecord, FetchError>;
}

#[derive(Debug, Clone)]
pub struct DerivativeRequest<'a> {
    pub file: &'a FileRecord,
    pub width: u32,
    pub quality: u8,
    pub path_prefix: &'a str,
}

/// Multi-resolution derivative description consumed by the markup renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsiveDerivative {
    pub src: String,
    pub src_set: String,
    pub sizes: String,
    pub aspect_ratio: f32,
}

/// Generates (or serves from cache) a responsive derivative for one file at
/// one target width. May fail for unsupported formats or I/O errors; such
/// failures are isolated to the single image.
#[async_trait]
pub trait DerivativeRenderer: Send + Sync {
    async fn render(&self, request: DerivativeRequest<'_>) -> anyhow::Result<ResponsiveDerivative>;
}

/// Access to previously created file records, used to follow a media
/// asset's `localFile` reference.
pub trait RecordStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Option<FileRecord>;
}

/// Everything the pipeline needs from its environment, bundled so the
/// orchestrator threads one reference through the filters.
pub struct Services<'a> {
    pub media: &'a dyn MediaLibrary,
    pub files: &'a dyn RemoteFileFetcher,
    pub derivatives: &'a dyn DerivativeRenderer,
    pub store: &'a dyn RecordStore,
    /// Prefix prepended to derivative paths when the site is published under
    /// a subpath.
    pub path_prefix: &'a str,
}
