use std::fmt;

/// Decoded RGBA raster handed to callers, always square at the configured size
pub type ScaledImage = image::RgbaImage;

/// A `<link>` element that qualified as an icon reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconCandidate {
    /// Raw `href` attribute, unresolved
    pub href: String,
    /// Raw `rel` attribute
    pub rel: String,
    /// Leading number of the `sizes` attribute, 1 when absent or unparsable
    pub declared_size: u32,
}

impl IconCandidate {
    pub fn new(href: impl Into<String>, rel: impl Into<String>, declared_size: u32) -> Self {
        Self {
            href: href.into(),
            rel: rel.into(),
            declared_size,
        }
    }
}

/// Absolute URL of the icon to download for a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIconUrl {
    /// Chosen from the site's declared `<link>` candidates
    Declared { url: String, declared_size: u32 },
    /// No usable candidate; the well-known `/favicon.ico`
    Fallback { url: String },
}

impl ResolvedIconUrl {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Declared { url, .. } | Self::Fallback { url } => url,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

impl fmt::Display for ResolvedIconUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
