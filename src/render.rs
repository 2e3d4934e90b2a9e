use std::sync::Arc;

use crate::assets::AssetSource;
use crate::error::{RenderError, RenderResult};
use crate::fonts::FontCache;
use crate::model::{EpisodeData, Template, Zone};
use crate::raster::Surface;
use crate::{backdrop, fx, text, zones};

/// Canvas fill used when no background resolves.
pub const DEFAULT_FILL: [u8; 4] = [0x1a, 0x1a, 0x1a, 0xff];

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions {
    /// Fixed seed for the grain overlay. `None` draws a fresh seed per call;
    /// set it for reproducible output.
    pub grain_seed: Option<u64>,
}

/// The compositor. Holds the shared font cache; everything else is an input
/// to each `render` call. Safe to share across concurrent render tasks.
pub struct Renderer {
    fonts: Arc<FontCache>,
    options: RenderOptions,
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_options(RenderOptions::default())
    }

    pub fn with_options(options: RenderOptions) -> Self {
        Self {
            fonts: Arc::new(FontCache::system()),
            options,
        }
    }

    /// Use a caller-supplied font cache, e.g. `FontCache::empty()` for
    /// machine-independent output in tests.
    pub fn with_font_cache(fonts: Arc<FontCache>, options: RenderOptions) -> Self {
        Self { fonts, options }
    }

    pub fn font_cache(&self) -> &Arc<FontCache> {
        &self.fonts
    }

    /// Render one thumbnail to PNG bytes.
    ///
    /// Fixed pipeline: default fill, background, subject, zones in declared
    /// order, overlays in declared order, PNG encoding. Asset and per-zone
    /// failures degrade by skipping the element; only validation and encoding
    /// failures are fatal. Identical inputs (and a fixed grain seed) produce
    /// byte-identical output.
    #[tracing::instrument(skip_all, fields(template = %template.id))]
    pub fn render(
        &self,
        template: &Template,
        data: &EpisodeData,
        assets: &dyn AssetSource,
        background_override: Option<&str>,
    ) -> RenderResult<Vec<u8>> {
        template.validate()?;
        let mut canvas =
            Surface::filled(template.canvas.width, template.canvas.height, DEFAULT_FILL)?;

        if let Err(err) =
            backdrop::place_background(&mut canvas, &template.background, assets, background_override)
        {
            tracing::warn!(%err, "background skipped");
        }
        if let Err(err) = backdrop::place_subject(&mut canvas, &template.subject, assets) {
            tracing::warn!(%err, "subject skipped");
        }

        for (name, zone) in template.zones.iter() {
            let value = data.get(name);
            let result = match zone {
                Zone::Text(z) => {
                    text::render_text_zone(&mut canvas, z, value, data, &self.fonts, assets)
                }
                Zone::Badge(z) => zones::render_badge_zone(&mut canvas, z, value, data, assets),
                Zone::Image(z) => zones::render_image_zone(&mut canvas, z, value, assets),
                Zone::Unknown => {
                    tracing::debug!(zone = name, "unknown zone type, skipped");
                    Ok(())
                }
            };
            if let Err(err) = result {
                tracing::warn!(zone = name, %err, "zone skipped");
            }
        }

        let seed = self.options.grain_seed.unwrap_or_else(rand::random);
        fx::apply_overlays(&mut canvas, &template.overlays, seed);

        encode_png(&canvas)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_png(canvas: &Surface) -> RenderResult<Vec<u8>> {
    let img = canvas.to_rgb_image();
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| RenderError::encode(format!("png encoding failed: {e}")))?;
    Ok(bytes)
}
