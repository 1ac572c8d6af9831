//! Media resolution
//! Maps decoded `<img>` fragments to media assets via batched lookups, with
//! a direct-download fallback for files the media library no longer knows

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::services::{
    FileRecord, MediaItemRecord, MediaLibrary, RecordStore, RemoteFileFetcher, RemoteFileRequest,
};
use crate::error::{FetchError, ProcessError};
use crate::fragment::ImgAttributes;
use crate::record::ContentRecord;
use crate::scanner::TagMatch;

/// Either a CMS-known media asset or a bare downloaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAsset {
    MediaItem(MediaItemRecord),
    File(FileRecord),
}

impl ResolvedAsset {
    pub fn natural_width(&self) -> Option<u32> {
        match self {
            ResolvedAsset::MediaItem(media) => media.natural_width(),
            ResolvedAsset::File(_) => None,
        }
    }

    /// The file backing this asset. Media assets point at their file
    /// through the record store; downloaded files are their own backing.
    pub fn file_record(&self, store: &dyn RecordStore) -> Option<FileRecord> {
        match self {
            ResolvedAsset::File(file) => Some(file.clone()),
            ResolvedAsset::MediaItem(media) => {
                let link = media.local_file.as_ref()?;
                store.get_by_id(&link.id)
            }
        }
    }
}

/// Resolution result for one unique raw tag text.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub asset: ResolvedAsset,
    pub attributes: ImgAttributes,
}

// Uploaded images get size-suffixed copies like photo-300x200.jpg; the
// media library only knows the original URL.
static IMAGE_SIZE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\d+x\d+(\.[a-zA-Z0-9]{2,5})$").unwrap());

pub fn strip_image_sizes_from_url(url: &str) -> String {
    IMAGE_SIZE_SUFFIX_RE.replace(url, "$1").into_owned()
}

/// Resolves every decoded fragment to a media asset or downloaded file.
///
/// At most one entry is produced per unique raw tag text; duplicate tags
/// collapse onto the same resolution. Each batch lookup is issued once with
/// deduplicated inputs. A fragment matching no asset falls back to a direct
/// download of its `src`; a not-found download drops the image (the
/// original tag stays in place) while any other download failure aborts the
/// record.
pub async fn resolve_media(
    images: &[(TagMatch, ImgAttributes)],
    record: &ContentRecord,
    media: &dyn MediaLibrary,
    files: &dyn RemoteFileFetcher,
) -> Result<HashMap<String, ResolvedMedia>, ProcessError> {
    let mut source_urls: Vec<String> = Vec::new();
    for (_, attributes) in images {
        if let Some(src) = attributes.src.as_deref() {
            for candidate in [src.to_string(), strip_image_sizes_from_url(src)] {
                if !source_urls.contains(&candidate) {
                    source_urls.push(candidate);
                }
            }
        }
    }

    let by_url = if source_urls.is_empty() {
        Vec::new()
    } else {
        media
            .fetch_by_source_urls(&source_urls)
            .await
            .map_err(ProcessError::MediaLookup)?
    };

    // assets edited in the media library keep their id but change their
    // source url, so id hints catch what the url batch missed
    let mut relay_ids: Vec<String> = Vec::new();
    for (_, attributes) in images {
        if let Some(relay_id) = attributes.relay_id() {
            let covered = by_url.iter().any(|asset| asset.id == relay_id);
            if !covered && !relay_ids.contains(&relay_id) {
                relay_ids.push(relay_id);
            }
        }
    }

    let by_id = if relay_ids.is_empty() {
        Vec::new()
    } else {
        media
            .fetch_by_ids(&relay_ids)
            .await
            .map_err(ProcessError::MediaLookup)?
    };

    let mut assets: Vec<MediaItemRecord> = by_id;
    assets.extend(by_url);

    let mut resolved: HashMap<String, ResolvedMedia> = HashMap::new();

    for (tag, attributes) in images {
        if resolved.contains_key(&tag.text) {
            continue;
        }

        if let Some(asset) = find_matching_asset(&assets, attributes) {
            resolved.insert(
                tag.text.clone(),
                ResolvedMedia {
                    asset: ResolvedAsset::MediaItem(asset.clone()),
                    attributes: attributes.clone(),
                },
            );
            continue;
        }

        let src = match attributes.src.as_deref() {
            Some(src) => src,
            None => continue,
        };

        match files
            .fetch(RemoteFileRequest {
                url: src,
                parent_record_id: record.id(),
                create_file_record: true,
            })
            .await
        {
            Ok(file) => {
                resolved.insert(
                    tag.text.clone(),
                    ResolvedMedia {
                        asset: ResolvedAsset::File(file),
                        attributes: attributes.clone(),
                    },
                );
            }
            Err(FetchError::NotFound(_)) => {
                warn_not_found(record, src);
            }
            Err(FetchError::Other(source)) => {
                return Err(ProcessError::Download {
                    url: src.to_string(),
                    source,
                });
            }
        }
    }

    Ok(resolved)
}

/// URL match wins over an id-hint match when both point at different assets.
fn find_matching_asset<'a>(
    assets: &'a [MediaItemRecord],
    attributes: &ImgAttributes,
) -> Option<&'a MediaItemRecord> {
    if let Some(src) = attributes.src.as_deref() {
        let candidates = [src.to_string(), strip_image_sizes_from_url(src)];
        if let Some(asset) = assets
            .iter()
            .find(|asset| candidates.contains(&asset.source_url))
        {
            return Some(asset);
        }
    }

    let relay_id = attributes.relay_id()?;
    assets.iter().find(|asset| asset.id == relay_id)
}

fn warn_not_found(record: &ContentRecord, src: &str) {
    let title = record
        .title()
        .map(str::to_string)
        .unwrap_or_else(|| record.id().to_string());
    let edit_link = record
        .edit_link()
        .unwrap_or_else(|| "its edit screen".to_string());

    tracing::warn!(
        "Received a 404 when trying to fetch {} from {} #{} \"{}\". \
         Most likely this image was uploaded here and then deleted from the media library. \
         Fix and re-save this {} at {} to remove this warning.",
        src,
        record.type_name(),
        record.database_id(),
        title,
        record.type_name(),
        edit_link,
    );
}
