//! Link rewriting
//! Substitutes absolute front-end links on the site's own domain with
//! root-relative paths

use crate::record::ContentRecord;
use crate::scanner;
use crate::splicer::apply_replacements;

/// Rewrites every absolute same-domain link in the serialized record to its
/// root-relative path. Upload and admin URLs are untouched (the scanner
/// excludes them). A match that cleans down to nothing is skipped with a
/// per-record warning; the remaining links still process.
pub fn rewrite_links(node_string: &str, record: &ContentRecord, wp_url: &str) -> String {
    let matches = scanner::find_wp_links(node_string, wp_url);
    if matches.is_empty() {
        return node_string.to_string();
    }

    let mut replacements: Vec<(String, String)> = Vec::new();
    for link in matches {
        // quote and escape characters ride along in the raw match; the
        // substitution works on the bare URL and path
        let needle: String = link
            .text
            .chars()
            .filter(|c| !matches!(c, '\'' | '"' | '\\'))
            .collect();
        let path: String = link.path.chars().filter(|c| *c != '\\').collect();

        if needle.is_empty() || path.is_empty() {
            tracing::warn!(
                "Link filter: failed to process inline html links in {} {}",
                record.type_name(),
                record.id(),
            );
            continue;
        }

        if !replacements.iter().any(|(existing, _)| existing == &needle) {
            replacements.push((needle, path));
        }
    }

    apply_replacements(node_string, &replacements)
}
