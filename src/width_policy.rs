//! Width policy
//! Pure cascade from tag attributes, asset natural width, and the
//! configured fallback to one target render width

use std::sync::LazyLock;

use regex::Regex;

use crate::fragment::ImgAttributes;

static MAX_WIDTH_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"max-width:\s*(\d+)px").unwrap());

/// Largest `max-width: Npx` bound across the comma-separated conditions of
/// a `sizes` attribute.
pub fn largest_size_from_sizes(sizes: &str) -> Option<u32> {
    sizes
        .split(',')
        .filter_map(|condition| {
            MAX_WIDTH_TOKEN_RE
                .captures(condition)
                .and_then(|captures| captures[1].parse::<u32>().ok())
        })
        .max()
}

/// Width the tag itself asks for: an explicit numeric `width` attribute
/// wins, else the largest bound found in `sizes`.
pub fn infer_tag_width(attributes: &ImgAttributes) -> Option<u32> {
    if let Some(width) = attributes.width.as_deref() {
        if let Ok(parsed) = width.trim().parse::<u32>() {
            return Some(parsed);
        }
    }

    attributes
        .sizes
        .as_deref()
        .and_then(largest_size_from_sizes)
}

/// Target render width for one resolved image. A known natural width caps
/// both the html-inferred candidate and the configured fallback so a
/// derivative is never requested larger than its source.
pub fn resolve_target_width(
    html_inferred: Option<u32>,
    natural_width: Option<u32>,
    fallback: u32,
) -> u32 {
    let effective_fallback = match natural_width {
        Some(natural) if natural > 0 && natural < fallback => natural,
        _ => fallback,
    };

    match (html_inferred, natural_width) {
        (Some(candidate), Some(natural)) if natural > 0 && natural < candidate => natural,
        (Some(candidate), _) => candidate,
        (None, _) => effective_fallback,
    }
}
