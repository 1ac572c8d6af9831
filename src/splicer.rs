//! Derivative requests and markup splicing
//! Fans out derivative rendering per resolved image, renders replacement
//! markup, and applies all replacements to the serialized record in one
//! deterministic pass

use futures::future::join_all;

use crate::services::{DerivativeRenderer, DerivativeRequest, FileRecord, ResponsiveDerivative};
use crate::fragment::ImgAttributes;
use crate::record::ContentRecord;

/// One image ready for derivative generation: a unique raw tag text, its
/// decoded attributes, the backing file, and the target render width.
/// Duplicate tags share one of these; the splice still covers every
/// occurrence because replacement is keyed on the raw text.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub tag_text: String,
    pub attributes: ImgAttributes,
    pub file: FileRecord,
    pub width: u32,
}

/// Requests a derivative for every resolved image concurrently and renders
/// the replacement markup. A failed derivative drops only that image; the
/// original tag text stays in the record.
pub async fn build_image_replacements(
    images: Vec<ResolvedImage>,
    record: &ContentRecord,
    derivatives: &dyn DerivativeRenderer,
    quality: u8,
    path_prefix: &str,
) -> Vec<(String, String)> {
    let rendered = join_all(images.into_iter().map(|image| async move {
        let request = DerivativeRequest {
            file: &image.file,
            width: image.width,
            quality,
            path_prefix,
        };

        match derivatives.render(request).await {
            Ok(derivative) => {
                let markup = render_image_markup(&derivative, &image.attributes, image.width);
                Some((image.tag_text, encode_for_splice(&markup)))
            }
            Err(e) => {
                tracing::error!("{}", e);
                tracing::warn!(
                    "Image filter: {} {} couldn't process inline html image {}",
                    record.type_name(),
                    record.id(),
                    image.file.url,
                );
                None
            }
        }
    }))
    .await;

    rendered.into_iter().flatten().collect()
}

/// Responsive replacement for one tag. The inline style pins the rendered
/// width while letting the image shrink with its container; eager loading
/// and opacity 1 show the full image immediately with no fade-in.
fn render_image_markup(
    derivative: &ResponsiveDerivative,
    attributes: &ImgAttributes,
    width: u32,
) -> String {
    let mut markup = String::from("<img");

    if let Some(class) = attributes.class.as_deref() {
        markup.push_str(&format!(" class=\"{}\"", escape_attr(class)));
    }
    if let Some(alt) = attributes.alt.as_deref() {
        markup.push_str(&format!(" alt=\"{}\"", escape_attr(alt)));
    }

    markup.push_str(&format!(
        " src=\"{}\" srcset=\"{}\" sizes=\"{}\" loading=\"eager\" \
         style=\"max-width:100%;width:{}px;opacity:1\"/>",
        escape_attr(&derivative.src),
        escape_attr(&derivative.src_set),
        escape_attr(&derivative.sizes),
        width,
    ));

    markup
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Encodes rendered markup as the body of a JSON string literal so it can
/// be threaded back into the larger serialized record: JSON-stringify, then
/// drop the wrapping quotes the encoding added.
fn encode_for_splice(markup: &str) -> String {
    let quoted = serde_json::Value::String(markup.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Applies every `(needle, replacement)` pair to `input` in one pass.
///
/// All occurrences of every needle are located in the original text first,
/// then rewritten left to right, so the output of one replacement is never
/// rescanned and can never trigger another substitution. Overlapping spans
/// keep the leftmost match; on a shared start offset the longest needle
/// wins.
pub fn apply_replacements(input: &str, replacements: &[(String, String)]) -> String {
    let mut spans: Vec<(usize, usize, usize)> = Vec::new();
    for (index, (needle, _)) in replacements.iter().enumerate() {
        if needle.is_empty() {
            continue;
        }
        for (start, _) in input.match_indices(needle.as_str()) {
            spans.push((start, start + needle.len(), index));
        }
    }

    spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut output = String::with_capacity(input.len());
    let mut cursor = 0;
    for (start, end, index) in spans {
        if start < cursor {
            continue;
        }
        output.push_str(&input[cursor..start]);
        output.push_str(&replacements[index].1);
        cursor = end;
    }
    output.push_str(&input[cursor..]);

    output
}
