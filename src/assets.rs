use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;

use crate::error::RenderResult;

/// Asset namespaces understood by the renderer. The renderer only ever reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    Backgrounds,
    Fonts,
    Overlays,
    Subjects,
}

impl AssetCategory {
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Backgrounds => "backgrounds",
            Self::Fonts => "fonts",
            Self::Overlays => "overlays",
            Self::Subjects => "subjects",
        }
    }
}

/// Byte-addressable asset lookup. `None` means not found; the renderer
/// degrades by skipping the element.
pub trait AssetSource: Send + Sync {
    fn resolve(&self, category: AssetCategory, name: &str) -> Option<Vec<u8>>;
}

/// Reads assets from `<root>/<category>/<name>`, mirroring the storage layout
/// the upstream service maintains.
#[derive(Clone, Debug)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FsAssetSource {
    fn resolve(&self, category: AssetCategory, name: &str) -> Option<Vec<u8>> {
        // Plain filenames only; separators and parent traversals never
        // resolve.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        std::fs::read(self.root.join(category.dir_name()).join(name)).ok()
    }
}

/// In-memory source for tests and embedded assets.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssetSource {
    entries: HashMap<(AssetCategory, String), Vec<u8>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: AssetCategory, name: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert((category, name.into()), bytes);
    }
}

impl AssetSource for MemoryAssetSource {
    fn resolve(&self, category: AssetCategory, name: &str) -> Option<Vec<u8>> {
        self.entries.get(&(category, name.to_string())).cloned()
    }
}

pub fn decode_rgba(bytes: &[u8]) -> RenderResult<image::RgbaImage> {
    let img = image::load_from_memory(bytes).context("decode image asset")?;
    Ok(img.to_rgba8())
}

pub fn decode_rgb(bytes: &[u8]) -> RenderResult<image::RgbImage> {
    let img = image::load_from_memory(bytes).context("decode image asset")?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_hit_and_miss() {
        let mut src = MemoryAssetSource::new();
        src.insert(AssetCategory::Fonts, "impact.ttf", vec![1, 2, 3]);
        assert_eq!(
            src.resolve(AssetCategory::Fonts, "impact.ttf"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(src.resolve(AssetCategory::Fonts, "missing.ttf"), None);
        assert_eq!(src.resolve(AssetCategory::Overlays, "impact.ttf"), None);
    }

    #[test]
    fn fs_source_rejects_traversal() {
        let src = FsAssetSource::new("/nonexistent");
        assert_eq!(src.resolve(AssetCategory::Backgrounds, "../etc/passwd"), None);
        assert_eq!(src.resolve(AssetCategory::Backgrounds, "a/b.png"), None);
        assert_eq!(src.resolve(AssetCategory::Backgrounds, ""), None);
    }

    #[test]
    fn decode_roundtrips_png_bytes() {
        let mut img = image::RgbaImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_rgba(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0, 255]);

        assert!(decode_rgba(b"not an image").is_err());
    }
}
