//! Font assets injected into rendered pages.
//!
//! A font (typically a colour emoji face) is read from disk once per process
//! and registered with every page before navigation, so the first paint
//! already has it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as Base64Engine;
use log::{info, warn};
use tokio::sync::OnceCell;

use crate::{Error, Result};

/// A font file held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct FontAsset {
    pub family: String,
    /// MIME type derived from the file extension
    pub mime: &'static str,
    pub data: Vec<u8>,
}

impl FontAsset {
    pub fn new(family: impl Into<String>, path: &Path, data: Vec<u8>) -> Self {
        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("woff2") => "font/woff2",
            Some("woff") => "font/woff",
            Some("otf") => "font/otf",
            _ => "font/ttf",
        };
        Self {
            family: family.into(),
            mime,
            data,
        }
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }

    /// Script that adds this face to `document.fonts`.
    ///
    /// It runs before any page script, so it goes through the `FontFace` API
    /// rather than a stylesheet (the document may not have a `<head>` yet).
    pub fn registration_script(&self) -> String {
        // serde_json gives us properly escaped JS string literals
        let family = serde_json::to_string(&self.family).unwrap_or_else(|_| "\"\"".into());
        let source = serde_json::to_string(&format!("url({})", self.data_url()))
            .unwrap_or_else(|_| "\"\"".into());
        format!(
            r#"(function(){{
                if (typeof FontFace === 'undefined' || !document.fonts) return;
                try {{
                    const face = new FontFace({family}, {source});
                    document.fonts.add(face);
                    face.load().catch(function(){{}});
                }} catch (e) {{}}
            }})();"#
        )
    }
}

/// Where the optional font comes from
#[derive(Debug, Clone)]
pub struct FontSource {
    pub path: PathBuf,
    pub family: String,
}

/// Process-wide, populate-once font cache.
///
/// Concurrent first requests share a single disk read; afterwards the cached
/// asset is handed out by reference count and never invalidated. A failed
/// read leaves the cache empty so a later request retries.
#[derive(Debug, Default)]
pub struct FontCache {
    source: Option<FontSource>,
    cell: OnceCell<Arc<FontAsset>>,
}

impl FontCache {
    pub fn new(source: Option<FontSource>) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// A cache with nothing to load
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Load the font if it is not cached yet.
    pub async fn load(&self) -> Result<Option<Arc<FontAsset>>> {
        let Some(source) = &self.source else {
            return Ok(None);
        };

        let asset = self
            .cell
            .get_or_try_init(|| async {
                let data = tokio::fs::read(&source.path).await.map_err(|e| {
                    Error::Other(format!(
                        "Failed to read font {}: {}",
                        source.path.display(),
                        e
                    ))
                })?;
                info!(
                    "Loaded font '{}' from {} ({} bytes)",
                    source.family,
                    source.path.display(),
                    data.len()
                );
                Ok::<_, Error>(Arc::new(FontAsset::new(
                    source.family.clone(),
                    &source.path,
                    data,
                )))
            })
            .await?;

        Ok(Some(asset.clone()))
    }

    /// Like [`FontCache::load`], but a failure only costs the font.
    pub async fn get(&self) -> Option<Arc<FontAsset>> {
        match self.load().await {
            Ok(font) => font,
            Err(e) => {
                warn!("Capturing without custom font: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mime_follows_extension() {
        assert_eq!(FontAsset::new("A", Path::new("a.woff2"), vec![]).mime, "font/woff2");
        assert_eq!(FontAsset::new("A", Path::new("a.OTF"), vec![]).mime, "font/otf");
        assert_eq!(FontAsset::new("A", Path::new("a"), vec![]).mime, "font/ttf");
    }

    #[test]
    fn registration_script_embeds_escaped_family_and_data() {
        let font = FontAsset::new("Noto \"Emoji\"", Path::new("e.ttf"), vec![1, 2, 3]);
        let script = font.registration_script();
        assert!(script.contains(r#""Noto \"Emoji\"""#));
        assert!(script.contains("data:font/ttf;base64,AQID"));
        assert!(script.contains("document.fonts.add"));
    }

    #[tokio::test]
    async fn disabled_cache_yields_nothing() {
        let cache = FontCache::disabled();
        assert!(cache.load().await.unwrap().is_none());
        assert!(!cache.is_loaded());
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_asset() {
        let mut file = tempfile::Builder::new().suffix(".woff2").tempfile().unwrap();
        file.write_all(b"fontdata").unwrap();

        let cache = Arc::new(FontCache::new(Some(FontSource {
            path: file.path().to_path_buf(),
            family: "Test".into(),
        })));

        let handles = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get().await })
            })
            .collect::<Vec<_>>();

        let mut assets = Vec::new();
        for h in handles {
            assets.push(h.await.unwrap().expect("font loaded"));
        }
        assert!(assets.iter().all(|a| Arc::ptr_eq(a, &assets[0])));
        assert_eq!(assets[0].data, b"fontdata");
        assert_eq!(assets[0].mime, "font/woff2");
        assert!(cache.is_loaded());
    }

    #[tokio::test]
    async fn missing_file_is_not_cached() {
        let cache = FontCache::new(Some(FontSource {
            path: PathBuf::from("/nonexistent/pageshot-font.ttf"),
            family: "Missing".into(),
        }));
        assert!(cache.load().await.is_err());
        assert!(cache.get().await.is_none());
        assert!(!cache.is_loaded());
    }
}
