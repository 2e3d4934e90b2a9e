use std::collections::BTreeMap;

use crate::assets::{AssetCategory, AssetSource, decode_rgba};
use crate::error::RenderResult;
use crate::model::{BadgeZone, EpisodeData, ImageZone};
use crate::raster::Surface;

/// Badge visibility, preserved exactly as the accepted behavior: suppression
/// requires the predicate to name CRITICAL with a non-matching severity AND
/// name HIGH with a non-matching severity. A predicate naming only one of the
/// two tokens therefore never suppresses; this asymmetry is intentional.
pub fn badge_visible(visible_when: Option<&str>, severity: &str) -> bool {
    let Some(expr) = visible_when else {
        return true;
    };
    if expr.contains("CRITICAL") && severity != "CRITICAL" {
        if expr.contains("HIGH") && severity != "HIGH" {
            return false;
        }
    }
    true
}

fn variant_file<'a>(map: &'a BTreeMap<String, String>, value: &str) -> Option<&'a str> {
    map.get(value).or_else(|| map.get("default")).map(String::as_str)
}

/// Composite the badge asset at the zone's top-left, alpha-aware and without
/// resizing. Any resolution miss draws nothing.
pub fn render_badge_zone(
    canvas: &mut Surface,
    zone: &BadgeZone,
    value: &str,
    data: &EpisodeData,
    assets: &dyn AssetSource,
) -> RenderResult<()> {
    if !badge_visible(zone.visible_when.as_deref(), data.severity()) {
        return Ok(());
    }
    let Some(file) = variant_file(&zone.variants, value) else {
        return Ok(());
    };
    let Some(bytes) = assets.resolve(AssetCategory::Overlays, file) else {
        tracing::debug!(asset = file, "badge asset not found, zone skipped");
        return Ok(());
    };
    let badge = Surface::from_rgba_image(&decode_rgba(&bytes)?);
    canvas.composite(
        &badge,
        i64::from(zone.position.x),
        i64::from(zone.position.y),
        1.0,
    );
    Ok(())
}

/// Resize the mapped asset to exactly the zone rectangle (non-uniform) and
/// alpha-composite it at the zone's top-left.
pub fn render_image_zone(
    canvas: &mut Surface,
    zone: &ImageZone,
    value: &str,
    assets: &dyn AssetSource,
) -> RenderResult<()> {
    let Some(file) = variant_file(&zone.mapping, value) else {
        return Ok(());
    };
    if zone.position.width == 0 || zone.position.height == 0 {
        return Ok(());
    }
    // Image-zone assets live in the backgrounds category, matching the
    // upstream storage layout.
    let Some(bytes) = assets.resolve(AssetCategory::Backgrounds, file) else {
        tracing::debug!(asset = file, "image asset not found, zone skipped");
        return Ok(());
    };
    let img = decode_rgba(&bytes)?;
    let resized = image::imageops::resize(
        &img,
        zone.position.width,
        zone.position.height,
        image::imageops::FilterType::CatmullRom,
    );
    canvas.composite(
        &Surface::from_rgba_image(&resized),
        i64::from(zone.position.x),
        i64::from(zone.position.y),
        1.0,
    );
    Ok(())
}
