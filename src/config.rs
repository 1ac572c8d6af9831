//! Processor configuration
//! Deserializable from the caller's plugin-options JSON

use serde::Deserialize;

/// Options controlling how records are processed. The serde names match the
/// option file consumed by the WordPress source plugin, so an existing
/// options document deserializes directly.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorOptions {
    /// When media items are fetched lazily by resolvers there is no need to
    /// collect referenced media ids up front.
    #[serde(default, rename = "lazyNodes")]
    pub lazy_nodes: bool,

    #[serde(default)]
    pub html: HtmlOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlOptions {
    /// Master switch for the inline image rewrite filter.
    #[serde(default = "default_true", rename = "useGatsbyImage")]
    pub use_inline_image_rewrite: bool,

    /// Render width used when neither the tag nor the media asset provides
    /// a better signal.
    #[serde(default = "default_fallback_width", rename = "fallbackImageMaxWidth")]
    pub fallback_image_max_width: u32,

    /// Quality passed through to the derivative renderer (1-100).
    #[serde(default = "default_quality", rename = "imageQuality")]
    pub image_quality: u8,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            lazy_nodes: false,
            html: HtmlOptions::default(),
        }
    }
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            use_inline_image_rewrite: true,
            fallback_image_max_width: default_fallback_width(),
            image_quality: default_quality(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_fallback_width() -> u32 {
    1024
}

fn default_quality() -> u8 {
    90
}
