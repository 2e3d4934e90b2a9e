use crate::assets::{AssetCategory, AssetSource, decode_rgb, decode_rgba};
use crate::error::RenderResult;
use crate::model::{BackgroundConfig, BackgroundMode, SubjectConfig};
use crate::raster::Surface;

/// Resolve and place the background. Misses leave the default fill in place.
///
/// The image is scaled to `canvas * scale` and pasted opaquely, centered plus
/// the configured offset. Negative or overflowing coordinates clip silently.
pub fn place_background(
    canvas: &mut Surface,
    config: &BackgroundConfig,
    assets: &dyn AssetSource,
    override_name: Option<&str>,
) -> RenderResult<()> {
    let name = match override_name {
        Some(name) => Some(name),
        None if config.mode == BackgroundMode::Fixed => {
            config.fixed_images.first().map(String::as_str)
        }
        None => None,
    };
    let Some(name) = name else {
        return Ok(());
    };
    let Some(bytes) = assets.resolve(AssetCategory::Backgrounds, name) else {
        tracing::warn!(asset = name, "background not found, keeping default fill");
        return Ok(());
    };

    let img = decode_rgb(&bytes)?;
    let scale = if config.scale.is_finite() && config.scale > 0.0 {
        config.scale
    } else {
        1.0
    };
    let scaled_w = ((canvas.width() as f32 * scale).round() as u32).max(1);
    let scaled_h = ((canvas.height() as f32 * scale).round() as u32).max(1);
    let resized = image::imageops::resize(
        &img,
        scaled_w,
        scaled_h,
        image::imageops::FilterType::CatmullRom,
    );

    let paste_x = (i64::from(canvas.width()) - i64::from(scaled_w)) / 2 + i64::from(config.offset_x);
    let paste_y =
        (i64::from(canvas.height()) - i64::from(scaled_h)) / 2 + i64::from(config.offset_y);
    canvas.paste_opaque(&Surface::from_rgb_image(&resized), paste_x, paste_y);
    Ok(())
}

/// Place the foreground cutout: flip, uniform scale, alpha multiply, then
/// alpha-composite centered on the canvas center plus offset. Requires
/// `enabled`, a filename, and resolvable bytes; otherwise a no-op.
pub fn place_subject(
    canvas: &mut Surface,
    config: &SubjectConfig,
    assets: &dyn AssetSource,
) -> RenderResult<()> {
    if !config.enabled || config.image.is_empty() {
        return Ok(());
    }
    let Some(bytes) = assets.resolve(AssetCategory::Subjects, &config.image) else {
        tracing::warn!(asset = %config.image, "subject not found, layer skipped");
        return Ok(());
    };

    let mut img = decode_rgba(&bytes)?;
    if config.flip_horizontal {
        img = image::imageops::flip_horizontal(&img);
    }

    let scale = if config.scale.is_finite() && config.scale > 0.0 {
        config.scale
    } else {
        1.0
    };
    let scaled_w = ((img.width() as f32 * scale).round() as u32).max(1);
    let scaled_h = ((img.height() as f32 * scale).round() as u32).max(1);
    if (scaled_w, scaled_h) != img.dimensions() {
        img = image::imageops::resize(
            &img,
            scaled_w,
            scaled_h,
            image::imageops::FilterType::CatmullRom,
        );
    }

    let mut layer = Surface::from_rgba_image(&img);
    layer.scale_alpha(config.opacity.clamp(0.0, 1.0));

    let paste_x = (i64::from(canvas.width()) - i64::from(scaled_w)) / 2 + i64::from(config.offset_x);
    let paste_y =
        (i64::from(canvas.height()) - i64::from(scaled_h)) / 2 + i64::from(config.offset_y);
    canvas.composite(&layer, paste_x, paste_y, 1.0);
    Ok(())
}
