//! Node processing
//! Orchestrates one record through serialize → reference scan → image
//! filter → link filter → finalize

use std::collections::HashSet;

use crate::services::Services;
use crate::config::ProcessorOptions;
use crate::error::ProcessError;
use crate::fragment::{self, ImgAttributes};
use crate::link_rewriter;
use crate::media_resolver;
use crate::pending::PendingReferenceSet;
use crate::record::ContentRecord;
use crate::scanner::{self, TagMatch};
use crate::splicer::{self, ResolvedImage};
use crate::width_policy;

/// Runs the full rewrite pipeline over one record.
///
/// The record is serialized once; media ids referenced in the serialized
/// text are pushed into the shared pending set; the image and link filters
/// rewrite the string in sequence; the string is reparsed only when a
/// filter changed it, otherwise the original record is returned untouched.
pub async fn process_node(
    record: ContentRecord,
    options: &ProcessorOptions,
    services: &Services<'_>,
    wp_url: &str,
    pending: &PendingReferenceSet,
) -> Result<ContentRecord, ProcessError> {
    let node_string =
        serde_json::to_string(&record).map_err(|source| ProcessError::Serialize {
            type_name: record.type_name(),
            id: record.id().to_string(),
            source,
        })?;

    // media connected on record fields get prefetched in one batch later;
    // with lazy nodes (or no image rewriting) they resolve on demand instead
    if !options.lazy_nodes && options.html.use_inline_image_rewrite {
        for id in scanner::find_referenced_media_ids(&node_string, record.id()) {
            pending.insert(id);
        }
    }

    let mut processed =
        apply_image_filter(node_string.clone(), &record, options, services, wp_url).await?;
    processed = link_rewriter::rewrite_links(&processed, &record, wp_url);

    if processed == node_string {
        return Ok(record);
    }

    serde_json::from_str(&processed).map_err(|source| ProcessError::Reparse {
        type_name: record.type_name(),
        id: record.id().to_string(),
        source,
    })
}

/// Image filter: scan → decompose → resolve → width policy → derivative →
/// splice. Returns the input unchanged when the master switch is off or
/// nothing in the record references an uploaded file.
async fn apply_image_filter(
    node_string: String,
    record: &ContentRecord,
    options: &ProcessorOptions,
    services: &Services<'_>,
    wp_url: &str,
) -> Result<String, ProcessError> {
    if !options.html.use_inline_image_rewrite {
        return Ok(node_string);
    }

    if scanner::find_remote_file_urls(&node_string).is_empty() {
        return Ok(node_string);
    }

    let tags = scanner::find_wp_img_tags(&node_string, wp_url);
    if tags.is_empty() {
        return Ok(node_string);
    }

    tracing::debug!(
        "Image filter: {} {} has {} inline image tag(s)",
        record.type_name(),
        record.id(),
        tags.len(),
    );

    let images: Vec<(TagMatch, ImgAttributes)> = tags
        .into_iter()
        .filter_map(|tag| fragment::decompose(&tag).map(|attributes| (tag, attributes)))
        .collect();

    let resolved =
        media_resolver::resolve_media(&images, record, services.media, services.files).await?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut to_render: Vec<ResolvedImage> = Vec::new();
    for (tag, _) in &images {
        if !seen.insert(tag.text.as_str()) {
            continue;
        }
        let resolution = match resolved.get(&tag.text) {
            Some(resolution) => resolution,
            None => continue,
        };

        let file = match resolution.asset.file_record(services.store) {
            Some(file) => file,
            None => {
                tracing::warn!(
                    "Image filter: no file record behind an asset in {} {}, leaving tag as-is",
                    record.type_name(),
                    record.id(),
                );
                continue;
            }
        };

        let html_inferred = width_policy::infer_tag_width(&resolution.attributes);
        let width = width_policy::resolve_target_width(
            html_inferred,
            resolution.asset.natural_width(),
            options.html.fallback_image_max_width,
        );

        to_render.push(ResolvedImage {
            tag_text: tag.text.clone(),
            attributes: resolution.attributes.clone(),
            file,
            width,
        });
    }

    let replacements = splicer::build_image_replacements(
        to_render,
        record,
        services.derivatives,
        options.html.image_quality,
        services.path_prefix,
    )
    .await;

    Ok(splicer::apply_replacements(&node_string, &replacements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashMap};

    use crate::services::{
        DerivativeRenderer, DerivativeRequest, FileLink, FileRecord, MediaDetails, MediaItemRecord,
        MediaLibrary, RecordStore, RemoteFileFetcher, RemoteFileRequest, ResponsiveDerivative,
    };
    use crate::error::FetchError;
    use crate::record::RecordFields;

    const WP_URL: &str = "https://site.test";

    fn init_logs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .try_init();
    }

    struct MockLibrary {
        assets: Vec<MediaItemRecord>,
    }

    #[async_trait]
    impl MediaLibrary for MockLibrary {
        async fn fetch_by_source_urls(
            &self,
            urls: &[String],
        ) -> anyhow::Result<Vec<MediaItemRecord>> {
            Ok(self
                .assets
                .iter()
                .filter(|asset| urls.contains(&asset.source_url))
                .cloned()
                .collect())
        }

        async fn fetch_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<MediaItemRecord>> {
            Ok(self
                .assets
                .iter()
                .filter(|asset| ids.contains(&asset.id))
                .cloned()
                .collect())
        }
    }

    struct MockFetcher {
        not_found: bool,
    }

    #[async_trait]
    impl RemoteFileFetcher for MockFetcher {
        async fn fetch(&self, request: RemoteFileRequest<'_>) -> Result<FileRecord, FetchError> {
            if self.not_found {
                Err(FetchError::NotFound(request.url.to_string()))
            } else {
                Err(FetchError::Other(anyhow::anyhow!("connection reset")))
            }
        }
    }

    struct MockRenderer;

    #[async_trait]
    impl DerivativeRenderer for MockRenderer {
        async fn render(
            &self,
            request: DerivativeRequest<'_>,
        ) -> anyhow::Result<ResponsiveDerivative> {
            Ok(ResponsiveDerivative {
                src: format!(
                    "{}/static/{}-{}w.jpg",
                    request.path_prefix, request.file.id, request.width
                ),
                src_set: format!(
                    "{}/static/{}-{}w.jpg {}w",
                    request.path_prefix, request.file.id, request.width, request.width
                ),
                sizes: format!("(max-width: {}px) 100vw, {}px", request.width, request.width),
                aspect_ratio: 1.5,
            })
        }
    }

    struct MockStore {
        files: HashMap<String, FileRecord>,
    }

    impl RecordStore for MockStore {
        fn get_by_id(&self, id: &str) -> Option<FileRecord> {
            self.files.get(id).cloned()
        }
    }

    struct Fixture {
        library: MockLibrary,
        fetcher: MockFetcher,
        renderer: MockRenderer,
        store: MockStore,
    }

    impl Fixture {
        fn new() -> Self {
            let asset = MediaItemRecord {
                id: "cG9zdDo0MQ==".to_string(),
                source_url: "https://site.test/wp-content/uploads/a.jpg".to_string(),
                media_details: Some(MediaDetails {
                    width: Some(500),
                    height: Some(333),
                }),
                local_file: Some(FileLink {
                    id: "file-41".to_string(),
                }),
            };

            let mut files = HashMap::new();
            files.insert(
                "file-41".to_string(),
                FileRecord {
                    id: "file-41".to_string(),
                    url: asset.source_url.clone(),
                    absolute_path: Some("/cache/a.jpg".to_string()),
                },
            );

            Self {
                library: MockLibrary {
                    assets: vec![asset],
                },
                fetcher: MockFetcher { not_found: true },
                renderer: MockRenderer,
                store: MockStore { files },
            }
        }

        fn services(&self) -> Services<'_> {
            Services {
                media: &self.library,
                files: &self.fetcher,
                derivatives: &self.renderer,
                store: &self.store,
                path_prefix: "",
            }
        }
    }

    // the link filter rewrites any absolute site URL in the serialized
    // record, the record's own link field included, so fixtures that must
    // stay byte-identical carry no link
    fn post_with_fields(fields: BTreeMap<String, Value>) -> ContentRecord {
        ContentRecord::Post(RecordFields {
            id: "cG9zdDox".to_string(),
            database_id: 1,
            link: None,
            title: Some("Hello".to_string()),
            fields,
        })
    }

    fn post_with_content(content: &str) -> ContentRecord {
        let mut fields = BTreeMap::new();
        fields.insert("content".to_string(), Value::String(content.to_string()));
        post_with_fields(fields)
    }

    fn content_of(record: &ContentRecord) -> &str {
        record
            .fields()
            .fields
            .get("content")
            .and_then(Value::as_str)
            .unwrap()
    }

    #[tokio::test]
    async fn test_rewrites_images_and_links() {
        init_logs();
        let fixture = Fixture::new();
        let record = post_with_content(concat!(
            r#"<p><img class="wp-image-41" src="https://site.test/wp-content/uploads/a.jpg" width="800" /></p>"#,
            r#"<a href="https://site.test/about-us">About</a>"#,
        ));

        let processed = process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        let content = content_of(&processed);
        // explicit width 800 clamps to the asset's natural 500
        assert!(content.contains(r#"src="/static/file-41-500w.jpg""#));
        assert!(content.contains("width:500px"));
        assert!(content.contains(r#"class="wp-image-41""#));
        assert!(!content.contains("https://site.test/wp-content/uploads/a.jpg"));
        assert!(content.contains(r#"href="/about-us""#));
    }

    #[tokio::test]
    async fn test_processing_is_idempotent() {
        let fixture = Fixture::new();
        let record = post_with_content(concat!(
            r#"<img src="https://site.test/wp-content/uploads/a.jpg" />"#,
            r#"<a href="https://site.test/about-us">About</a>"#,
        ));

        let options = ProcessorOptions::default();
        let pending = PendingReferenceSet::new();

        let once = process_node(record, &options, &fixture.services(), WP_URL, &pending)
            .await
            .unwrap();
        let twice = process_node(
            once.clone(),
            &options,
            &fixture.services(),
            WP_URL,
            &pending,
        )
        .await
        .unwrap();

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_duplicate_tags_replaced_consistently() {
        let fixture = Fixture::new();
        let same = r#"<img src="https://site.test/wp-content/uploads/a.jpg" />"#;
        let other = r#"<img class="other" src="https://site.test/wp-content/uploads/a-300x200.jpg" width="300" />"#;
        let record = post_with_content(&format!("{}{}{}", same, same, other));

        let processed = process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        let content = content_of(&processed);
        // both identical tags got the same derivative markup
        assert_eq!(content.matches(r#"src="/static/file-41-500w.jpg""#).count(), 2);
        // the differently-attributed tag resolved independently (300 < 500)
        assert_eq!(content.matches(r#"src="/static/file-41-300w.jpg""#).count(), 1);
        assert!(content.contains(r#"class="other""#));
    }

    #[tokio::test]
    async fn test_non_wp_image_untouched() {
        let fixture = Fixture::new();
        let record =
            post_with_content(r#"<img src="https://elsewhere.example/pic.jpg" />"#);

        let processed = process_node(
            record.clone(),
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        assert_eq!(processed, record);
    }

    #[tokio::test]
    async fn test_not_found_image_left_in_place() {
        init_logs();
        let fixture = Fixture::new();
        let record = post_with_content(concat!(
            r#"<img src="https://site.test/wp-content/uploads/a.jpg" />"#,
            r#"<img src="https://site.test/wp-content/uploads/deleted.jpg" />"#,
        ));

        let processed = process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        let content = content_of(&processed);
        assert!(content.contains(r#"src="/static/file-41-500w.jpg""#));
        // the missing image's original tag survives untouched
        assert!(content.contains(r#"<img src="https://site.test/wp-content/uploads/deleted.jpg" />"#));
    }

    #[tokio::test]
    async fn test_unexpected_download_failure_aborts() {
        let mut fixture = Fixture::new();
        fixture.fetcher = MockFetcher { not_found: false };
        let record =
            post_with_content(r#"<img src="https://site.test/wp-content/uploads/unknown.jpg" />"#);

        let result = process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await;

        assert!(matches!(result, Err(ProcessError::Download { .. })));
    }

    #[tokio::test]
    async fn test_reference_scanning_collects_connected_media() {
        let fixture = Fixture::new();
        let mut fields = BTreeMap::new();
        fields.insert(
            "featuredImage".to_string(),
            json!({"id": "bWVkaWE6OQ==", "sourceUrl": "https://site.test/f.jpg"}),
        );
        let record = post_with_fields(fields);

        let pending = PendingReferenceSet::new();
        process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &pending,
        )
        .await
        .unwrap();

        assert!(pending.contains("bWVkaWE6OQ=="));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_reference_scanning_gates() {
        let fixture = Fixture::new();
        let mut fields = BTreeMap::new();
        fields.insert(
            "featuredImage".to_string(),
            json!({"id": "bWVkaWE6OQ==", "sourceUrl": "https://site.test/f.jpg"}),
        );

        let mut lazy: ProcessorOptions = ProcessorOptions::default();
        lazy.lazy_nodes = true;
        let pending = PendingReferenceSet::new();
        process_node(
            post_with_fields(fields.clone()),
            &lazy,
            &fixture.services(),
            WP_URL,
            &pending,
        )
        .await
        .unwrap();
        assert!(pending.is_empty());

        let mut no_rewrite = ProcessorOptions::default();
        no_rewrite.html.use_inline_image_rewrite = false;
        process_node(
            post_with_fields(fields),
            &no_rewrite,
            &fixture.services(),
            WP_URL,
            &pending,
        )
        .await
        .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_image_filter_master_switch() {
        let fixture = Fixture::new();
        let record =
            post_with_content(r#"<img src="https://site.test/wp-content/uploads/a.jpg" />"#);

        let mut options = ProcessorOptions::default();
        options.html.use_inline_image_rewrite = false;

        let processed = process_node(
            record.clone(),
            &options,
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        assert_eq!(processed, record);
    }

    #[tokio::test]
    async fn test_record_without_matches_returned_unchanged() {
        let fixture = Fixture::new();
        let record = post_with_content("<p>plain text, nothing to rewrite</p>");

        let processed = process_node(
            record.clone(),
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        assert_eq!(processed, record);
    }

    #[tokio::test]
    async fn test_record_link_field_also_rewritten() {
        let fixture = Fixture::new();
        let record = ContentRecord::Post(RecordFields {
            id: "cG9zdDox".to_string(),
            database_id: 1,
            link: Some("https://site.test/hello-world/".to_string()),
            title: None,
            fields: BTreeMap::new(),
        });

        let processed = process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        assert_eq!(processed.link(), Some("/hello-world/"));
    }

    #[tokio::test]
    async fn test_fallback_width_when_nothing_inferred() {
        let fixture = Fixture::new();
        // no width attribute, no sizes; asset natural width 500 is smaller
        // than the 1024 fallback, so the fallback collapses to 500
        let record =
            post_with_content(r#"<img src="https://site.test/wp-content/uploads/a.jpg" />"#);

        let processed = process_node(
            record,
            &ProcessorOptions::default(),
            &fixture.services(),
            WP_URL,
            &PendingReferenceSet::new(),
        )
        .await
        .unwrap();

        assert!(content_of(&processed).contains("width:500px"));
    }
}
