//! Content record model
//! Typed record kinds with stable serialization for exact substring matching

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Fields shared by every record kind. Free-text fields carrying embedded
/// HTML (content, excerpt, caption, ...) live in the flattened overflow map;
/// the pipeline never inspects them structurally, it only rewrites their
/// serialized form. The overflow map is a `BTreeMap`, so serialization order
/// is deterministic and a reparse/reserialize round trip is byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub id: String,

    #[serde(rename = "databaseId")]
    pub database_id: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// One unit of CMS content being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum ContentRecord {
    Post(RecordFields),
    Page(RecordFields),
    MediaItem(RecordFields),
}

impl ContentRecord {
    pub fn fields(&self) -> &RecordFields {
        match self {
            ContentRecord::Post(fields)
            | ContentRecord::Page(fields)
            | ContentRecord::MediaItem(fields) => fields,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ContentRecord::Post(_) => "Post",
            ContentRecord::Page(_) => "Page",
            ContentRecord::MediaItem(_) => "MediaItem",
        }
    }

    pub fn id(&self) -> &str {
        &self.fields().id
    }

    pub fn database_id(&self) -> u64 {
        self.fields().database_id
    }

    pub fn title(&self) -> Option<&str> {
        self.fields().title.as_deref()
    }

    pub fn link(&self) -> Option<&str> {
        self.fields().link.as_deref()
    }

    /// wp-admin edit URL for this record, derived from its front-end link.
    /// Surfaced in warnings so a stale inline image can be fixed at the
    /// source.
    pub fn edit_link(&self) -> Option<String> {
        let link = self.link()?;
        let parsed = Url::parse(link).ok()?;
        let host = parsed.host_str()?;

        Some(format!(
            "{}://{}/wp-admin/post.php?post={}&action=edit",
            parsed.scheme(),
            host,
            self.database_id()
        ))
    }
}
