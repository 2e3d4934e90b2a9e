use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use font8x8::{BASIC_FONTS, UnicodeFonts};

use crate::assets::{AssetCategory, AssetSource};

/// Fallback families tried when the requested identifier resolves nowhere.
const FALLBACK_FAMILIES: [&str; 3] = ["DejaVu Sans", "Liberation Sans", "Arial"];

/// Resolves (font identifier, pixel size) pairs to rasterizable handles.
///
/// Resolution order on a miss: custom `{identifier}.ttf` asset, then a system
/// font of the same family name, then the fixed fallback families, then any
/// known face, and finally a built-in 8x8 bitmap font that never fails.
///
/// Entries are immutable once inserted; population is insert-if-absent under a
/// write lock, so concurrent renders share one resolution per key.
pub struct FontCache {
    db: fontdb::Database,
    faces: RwLock<HashMap<String, Option<Arc<FontVec>>>>,
    handles: RwLock<HashMap<(String, u32), Arc<FontHandle>>>,
}

impl FontCache {
    /// Cache backed by the system font database.
    pub fn system() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Self::with_db(db)
    }

    /// Cache with no system fonts: asset fonts and the bitmap fallback only.
    /// Byte-deterministic across machines, which is what tests want.
    pub fn empty() -> Self {
        Self::with_db(fontdb::Database::new())
    }

    fn with_db(db: fontdb::Database) -> Self {
        Self {
            db,
            faces: RwLock::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Never fails; the last fallback is the built-in bitmap font.
    pub fn handle(
        &self,
        assets: &dyn AssetSource,
        identifier: &str,
        px_size: u32,
    ) -> Arc<FontHandle> {
        let key = (identifier.to_string(), px_size);
        if let Some(h) = self.handles.read().expect("font cache poisoned").get(&key) {
            return Arc::clone(h);
        }

        let face = self.face_for(assets, identifier);
        let built = Arc::new(FontHandle::new(face, px_size as f32));

        let mut handles = self.handles.write().expect("font cache poisoned");
        Arc::clone(handles.entry(key).or_insert(built))
    }

    fn face_for(&self, assets: &dyn AssetSource, identifier: &str) -> Option<Arc<FontVec>> {
        if let Some(f) = self.faces.read().expect("font cache poisoned").get(identifier) {
            return f.clone();
        }

        let resolved = self.resolve_face(assets, identifier);
        if resolved.is_none() {
            tracing::debug!(font = identifier, "no vector face found, using bitmap fallback");
        }

        let mut faces = self.faces.write().expect("font cache poisoned");
        faces.entry(identifier.to_string()).or_insert(resolved).clone()
    }

    fn resolve_face(&self, assets: &dyn AssetSource, identifier: &str) -> Option<Arc<FontVec>> {
        if let Some(bytes) = assets.resolve(AssetCategory::Fonts, &format!("{identifier}.ttf"))
            && let Ok(font) = FontVec::try_from_vec(bytes)
        {
            return Some(Arc::new(font));
        }

        let mut families = vec![fontdb::Family::Name(identifier)];
        for name in FALLBACK_FAMILIES {
            families.push(fontdb::Family::Name(name));
        }
        families.push(fontdb::Family::SansSerif);

        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight::NORMAL,
            stretch: fontdb::Stretch::Normal,
            style: fontdb::Style::Normal,
        };
        let id = self
            .db
            .query(&query)
            .or_else(|| self.db.faces().next().map(|f| f.id))?;
        self.load_face(id)
    }

    fn load_face(&self, id: fontdb::ID) -> Option<Arc<FontVec>> {
        let (src, index) = self.db.face_source(id)?;
        let data = match src {
            fontdb::Source::File(path) => std::fs::read(&path).ok()?,
            fontdb::Source::Binary(data) => data.as_ref().as_ref().to_vec(),
            fontdb::Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
        };
        FontVec::try_from_vec_and_index(data, index).ok().map(Arc::new)
    }
}

enum Glyphs {
    Vector(Arc<FontVec>),
    Bitmap,
}

/// A font fixed at one pixel size. Metrics and drawing share one definition of
/// glyph advance, so measurement, auto-sizing and alignment agree.
pub struct FontHandle {
    px: f32,
    ascent: f32,
    descent: f32,
    glyphs: Glyphs,
}

impl FontHandle {
    fn new(face: Option<Arc<FontVec>>, px: f32) -> Self {
        match face {
            Some(font) => {
                let scaled = font.as_scaled(PxScale::from(px));
                let (ascent, descent) = (scaled.ascent(), scaled.descent());
                Self {
                    px,
                    ascent,
                    descent,
                    glyphs: Glyphs::Vector(font),
                }
            }
            // 8x8 cells sit on the baseline: ascent spans the full cell.
            None => Self {
                px,
                ascent: px,
                descent: 0.0,
                glyphs: Glyphs::Bitmap,
            },
        }
    }

    pub fn px(&self) -> f32 {
        self.px
    }

    pub fn ascent(&self) -> f32 {
        self.ascent
    }

    /// Negative or zero, per the usual font conventions.
    pub fn descent(&self) -> f32 {
        self.descent
    }

    pub fn height(&self) -> f32 {
        self.ascent - self.descent
    }

    pub fn advance(&self, ch: char) -> f32 {
        match &self.glyphs {
            Glyphs::Vector(font) => {
                let scaled = font.as_scaled(PxScale::from(self.px));
                scaled.h_advance(scaled.glyph_id(ch))
            }
            Glyphs::Bitmap => self.px,
        }
    }

    pub fn kern(&self, left: char, right: char) -> f32 {
        match &self.glyphs {
            Glyphs::Vector(font) => {
                let scaled = font.as_scaled(PxScale::from(self.px));
                scaled.kern(scaled.glyph_id(left), scaled.glyph_id(right))
            }
            Glyphs::Bitmap => 0.0,
        }
    }

    /// Width of one line. With positive letter spacing the advance is
    /// per-character plus spacing and kerning is skipped, matching how spaced
    /// text is drawn; otherwise advances and kerning accumulate.
    pub fn line_width(&self, text: &str, letter_spacing: u32) -> f32 {
        let mut width = 0.0f32;
        let mut prev: Option<char> = None;
        let mut count = 0u32;
        for ch in text.chars() {
            if letter_spacing == 0
                && let Some(p) = prev
            {
                width += self.kern(p, ch);
            }
            width += self.advance(ch);
            prev = Some(ch);
            count += 1;
        }
        if letter_spacing > 0 && count > 1 {
            width += (letter_spacing * (count - 1)) as f32;
        }
        width
    }

    /// Draw one character with its origin at (`x`, `baseline`), reporting
    /// per-pixel coverage in [0, 1].
    pub fn draw_char(&self, ch: char, x: f32, baseline: f32, plot: &mut dyn FnMut(i64, i64, f32)) {
        match &self.glyphs {
            Glyphs::Vector(font) => {
                let scale = PxScale::from(self.px);
                let glyph = font.glyph_id(ch).with_scale_and_position(scale, point(x, baseline));
                if let Some(outlined) = font.outline_glyph(glyph) {
                    let bounds = outlined.px_bounds();
                    let (ox, oy) = (bounds.min.x as i64, bounds.min.y as i64);
                    outlined.draw(|gx, gy, coverage| {
                        if coverage > 0.0 {
                            plot(ox + i64::from(gx), oy + i64::from(gy), coverage.min(1.0));
                        }
                    });
                }
            }
            Glyphs::Bitmap => self.draw_bitmap_char(ch, x, baseline, plot),
        }
    }

    /// Draw a whole string with kerning applied between neighbours.
    pub fn draw_str(&self, text: &str, x: f32, baseline: f32, plot: &mut dyn FnMut(i64, i64, f32)) {
        let mut pen = x;
        let mut prev: Option<char> = None;
        for ch in text.chars() {
            if let Some(p) = prev {
                pen += self.kern(p, ch);
            }
            self.draw_char(ch, pen, baseline, plot);
            pen += self.advance(ch);
            prev = Some(ch);
        }
    }

    fn draw_bitmap_char(&self, ch: char, x: f32, baseline: f32, plot: &mut dyn FnMut(i64, i64, f32)) {
        let Some(rows) = BASIC_FONTS.get(ch) else {
            return;
        };
        let top = baseline - self.ascent;
        let scale = self.px / 8.0;
        let left_px = x.round() as i64;
        let top_px = top.round() as i64;
        let side = self.px.round() as i64;
        // Nearest sampling of the 8x8 cell keeps scaled output exact for
        // integer sizes.
        for oy in 0..side {
            let cy = ((oy as f32 + 0.5) / scale) as usize;
            if cy >= 8 {
                continue;
            }
            let row = rows[cy];
            for ox in 0..side {
                let cx = ((ox as f32 + 0.5) / scale) as usize;
                if cx >= 8 {
                    continue;
                }
                if row & (1 << cx) != 0 {
                    plot(left_px + ox, top_px + oy, 1.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetSource;

    #[test]
    fn empty_cache_falls_back_to_bitmap_metrics() {
        let cache = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let font = cache.handle(&assets, "Impact", 16);
        assert_eq!(font.height(), 16.0);
        assert_eq!(font.advance('A'), 16.0);
        assert_eq!(font.kern('A', 'V'), 0.0);
    }

    #[test]
    fn line_width_with_letter_spacing() {
        let cache = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let font = cache.handle(&assets, "Impact", 16);
        assert_eq!(font.line_width("AB", 0), 32.0);
        assert_eq!(font.line_width("AB", 5), 37.0);
        assert_eq!(font.line_width("A", 5), 16.0);
        assert_eq!(font.line_width("", 5), 0.0);
    }

    #[test]
    fn handles_are_shared_per_key() {
        let cache = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let a = cache.handle(&assets, "Impact", 32);
        let b = cache.handle(&assets, "Impact", 32);
        assert!(Arc::ptr_eq(&a, &b));
        let c = cache.handle(&assets, "Impact", 48);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn concurrent_population_resolves_to_one_handle() {
        let cache = std::sync::Arc::new(FontCache::empty());
        let assets = std::sync::Arc::new(MemoryAssetSource::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = std::sync::Arc::clone(&cache);
            let assets = std::sync::Arc::clone(&assets);
            handles.push(std::thread::spawn(move || {
                let h = cache.handle(assets.as_ref(), "Shared", 24);
                Arc::as_ptr(&h) as usize
            }));
        }
        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn bitmap_glyph_plots_within_cell() {
        let cache = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let font = cache.handle(&assets, "Impact", 16);
        let mut min = (i64::MAX, i64::MAX);
        let mut max = (i64::MIN, i64::MIN);
        let mut count = 0usize;
        font.draw_char('A', 10.0, 26.0, &mut |x, y, _| {
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
            count += 1;
        });
        assert!(count > 0);
        assert!(min.0 >= 10 && max.0 < 26);
        assert!(min.1 >= 10 && max.1 < 26);
    }
}
