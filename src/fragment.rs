//! Fragment decomposition
//! Turns one raw `<img>` match into an attribute set and a database-id hint

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use scraper::{Html, Selector};

use crate::scanner::TagMatch;

/// Attributes decoded from a single `<img>` fragment. The id hint is either
/// a `data-id`/`data-image-id` value or the trailing number of a
/// `wp-image-<n>` class token; it is never guessed from other text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImgAttributes {
    pub src: Option<String>,
    pub width: Option<String>,
    pub sizes: Option<String>,
    pub class: Option<String>,
    pub alt: Option<String>,
    pub db_id_hint: Option<String>,
}

impl ImgAttributes {
    /// Stable global identifier for the hinted media item. Media items are
    /// of the post type, so the id encodes as `post:<dbId>`.
    pub fn relay_id(&self) -> Option<String> {
        self.db_id_hint.as_deref().map(media_relay_id)
    }
}

pub fn media_relay_id(db_id: &str) -> String {
    BASE64.encode(format!("post:{}", db_id))
}

/// Decodes one matched tag. The raw text is a slice of a JSON string, so it
/// is JSON-unescaped first and then parsed as an isolated fragment; the
/// surrounding record is never touched. Returns None when the text does not
/// decode to an `<img>` element, in which case the match is left as-is.
pub fn decompose(tag: &TagMatch) -> Option<ImgAttributes> {
    let unescaped = match unescape_json_fragment(&tag.text) {
        Some(unescaped) => unescaped,
        None => {
            tracing::debug!("Fragment: could not JSON-unescape {}", tag.text);
            return None;
        }
    };

    let fragment = Html::parse_fragment(&unescaped);
    let selector = Selector::parse("img").ok()?;

    let img = match fragment.select(&selector).next() {
        Some(img) => img,
        None => {
            tracing::debug!("Fragment: no img element in {}", unescaped);
            return None;
        }
    };

    let attr = |name: &str| img.value().attr(name).map(str::to_string);

    let mut attributes = ImgAttributes {
        src: attr("src"),
        width: attr("width"),
        sizes: attr("sizes"),
        class: attr("class"),
        alt: attr("alt"),
        db_id_hint: attr("data-id").or_else(|| attr("data-image-id")),
    };

    if attributes.db_id_hint.is_none() {
        attributes.db_id_hint = attributes
            .class
            .as_deref()
            .and_then(db_id_from_class);
    }

    Some(attributes)
}

/// Interprets the raw match as the body of a JSON string literal.
fn unescape_json_fragment(raw: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).ok()
}

/// WordPress tags uploaded images with a `wp-image-<databaseId>` class.
/// Only a nonzero number after the final dash counts as an id.
fn db_id_from_class(class: &str) -> Option<String> {
    let token = class
        .split(' ')
        .find(|token| token.contains("wp-image-"))?;

    let id: u64 = token.rsplit('-').next()?.parse().ok()?;
    if id == 0 {
        return None;
    }

    Some(id.to_string())
}
