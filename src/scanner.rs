//! Tag and link scanning
//! Literal-text analysis over a serialized record. Nothing here parses a
//! document; matches are raw substrings whose exact text is the key for
//! later replacement.

use std::sync::LazyLock;

use regex::Regex;

/// A located, unparsed `<img ...>` occurrence inside a serialized record.
/// Several matches may carry identical text (the same tag pasted twice);
/// replacement applies to every occurrence of that exact text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagMatch {
    pub text: String,
}

/// An absolute same-domain link match: the quoted match text and the
/// captured path portion.
#[derive(Debug, Clone, PartialEq)]
pub struct WpLinkMatch {
    pub text: String,
    pub path: String,
}

// Matches src attributes pointing at uploaded files of any type WordPress
// accepts. Only the presence of matches is used; an empty result
// short-circuits the image filter. The src= prefix is followed by an
// escaped quote because the haystack is a JSON-serialized record.
static REMOTE_FILE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)src=\\""#,
        r#"((?:(?:https?|ftp|file)://|www\.|ftp\.)"#,
        r#"(?:\([-A-Z0-9+\&@#/%=\~_|$?!:,.]*\)|[-A-Z0-9+\&@#/%=\~_|$?!:,.])*"#,
        r#"(?:\([-A-Z0-9+\&@#/%=\~_|$?!:,.]*\)|[A-Z0-9+\&@#/%=\~_|$])"#,
        r#"\.(?:jpeg|jpg|png|gif|ico|pdf|doc|docx|ppt|pptx|pps|ppsx|odt|xls|psd|"#,
        r#"mp3|m4a|ogg|wav|mp4|m4v|mov|wmv|avi|mpg|ogv|3gp|3g2|svg|bmp|tif|tiff|"#,
        r#"asf|asx|wm|wmx|divx|flv|qt|mpe|webm|mkv|tt|asc|c|cc|h|csv|tsv|ics|rtx|"#,
        r#"css|htm|html|m4b|ra|ram|mid|midi|wax|mka|rtf|js|swf|class|tar|zip|gz|"#,
        r#"gzip|rar|7z|exe|pot|wri|xla|xlt|xlw|mdb|mpp|docm|dotx|dotm|xlsm|xlsb|"#,
        r#"xltx|xltm|xlam|pptm|ppsm|potx|potm|ppam|sldx|sldm|onetoc|onetoc2|"#,
        r#"onetmp|onepkg|odp|ods|odg|odc|odb|odf|wp|wpd|key|numbers|pages))"#,
        // terminator instead of a lookahead; matches are only counted
        r#"(?:\\"| |\.)"#,
    ))
    .unwrap()
});

static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img(.+?)/?>").unwrap());

// Media items serialize their id directly before their sourceUrl, which
// makes connected media references findable without parsing the record.
static REFERENCED_MEDIA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""id":"([^"]*)","sourceUrl""#).unwrap());

/// Path prefixes that stay absolute when rewriting links; uploads and admin
/// URLs are not front-end routes.
const EXCLUDED_LINK_PREFIXES: [&str; 3] = ["/wp-content", "/wp-admin", "/wp-includes"];

/// Ordered URL-like substrings referencing uploadable file types.
pub fn find_remote_file_urls(node_string: &str) -> Vec<String> {
    REMOTE_FILE_URL_RE
        .captures_iter(node_string)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Ordered `<img>` tag matches hosted on the source site. Tags referencing
/// third-party hosts are excluded so the pipeline never fetches arbitrary
/// remote imagery.
pub fn find_wp_img_tags(node_string: &str, wp_url: &str) -> Vec<TagMatch> {
    IMG_TAG_RE
        .find_iter(node_string)
        .map(|found| found.as_str())
        .filter(|text| text.contains(wp_url))
        .map(|text| TagMatch {
            text: text.to_string(),
        })
        .collect()
}

/// Quoted absolute links on the site's own domain, minus upload/admin paths.
pub fn find_wp_links(node_string: &str, wp_url: &str) -> Vec<WpLinkMatch> {
    let pattern = format!(r#"["']{}(/[^'"]+)["']"#, regex::escape(wp_url));
    let link_re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Link scan: could not build pattern for {}: {}", wp_url, e);
            return Vec::new();
        }
    };

    link_re
        .captures_iter(node_string)
        .filter_map(|captures| {
            let path = captures[1].to_string();
            let excluded = EXCLUDED_LINK_PREFIXES
                .iter()
                .any(|prefix| path.starts_with(prefix));
            if excluded {
                return None;
            }
            Some(WpLinkMatch {
                text: captures[0].to_string(),
                path,
            })
        })
        .collect()
}

/// Media ids referenced somewhere in the serialized record, excluding the
/// record's own id. Side effect free; the caller accumulates these for
/// batch prefetching.
pub fn find_referenced_media_ids(node_string: &str, own_id: &str) -> Vec<String> {
    REFERENCED_MEDIA_RE
        .captures_iter(node_string)
        .map(|captures| captures[1].to_string())
        .filter(|id| id != own_id)
        .collect()
}
