use std::sync::Arc;

use crate::assets::AssetSource;
use crate::blur::gaussian_blur;
use crate::error::RenderResult;
use crate::fonts::{FontCache, FontHandle};
use crate::model::{Align, EpisodeData, LayoutMode, TextTransform, TextZone, VAlign};
use crate::raster::{Surface, parse_hex_color, premultiply};

/// A line placed inside (or around) a zone rectangle.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Left edge of the line.
    pub x: i64,
    /// Top edge of the line's box.
    pub top: i64,
    pub width: i64,
    pub height: i64,
    /// Baseline passed to glyph drawing.
    pub baseline: f32,
}

/// Apply the zone's case transform.
pub fn apply_transform(text: &str, transform: TextTransform) -> String {
    match transform {
        TextTransform::None => text.to_string(),
        TextTransform::Uppercase => text.to_uppercase(),
        TextTransform::Lowercase => text.to_lowercase(),
    }
}

/// Color selection: `color_rules["default"]`, overridden by the first
/// non-default rule (declaration order) whose key equals the severity value.
/// Malformed hex degrades to white.
pub fn resolve_color(zone: &TextZone, data: &EpisodeData) -> [u8; 4] {
    let mut chosen = zone.color_rules.get("default").map(String::as_str);
    for (key, rule_color) in zone.color_rules.iter() {
        if key != "default" && data.severity() == key {
            chosen = Some(rule_color);
            break;
        }
    }
    let Some(hex) = chosen else {
        return [255, 255, 255, 255];
    };
    parse_hex_color(hex).unwrap_or_else(|| {
        tracing::warn!(color = hex, "malformed hex color, using white");
        [255, 255, 255, 255]
    })
}

/// Split the (already transformed) text per layout mode, dropping empty and
/// whitespace-only parts.
pub fn split_lines(text: &str, mode: LayoutMode) -> Vec<String> {
    match mode {
        LayoutMode::Horizontal | LayoutMode::Rotated => {
            if text.trim().is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            }
        }
        LayoutMode::StackedWords => text
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        LayoutMode::StackedChars => text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect(),
    }
}

/// Descending linear search for the largest size in `[min, max]` (steps of 2
/// from `max`) whose widest line fits `max_width`; falls back to `min`.
///
/// Linear rather than binary: hinted widths are not strictly monotonic in the
/// size pixel-for-pixel, and the exhaustive descent keeps the result
/// deterministic.
pub fn auto_size(
    fonts: &FontCache,
    assets: &dyn AssetSource,
    font_name: &str,
    lines: &[String],
    letter_spacing: u32,
    min: u32,
    max: u32,
    max_width: u32,
) -> u32 {
    let mut size = max.max(min);
    while size >= min {
        let font = fonts.handle(assets, font_name, size);
        if widest(&font, lines, letter_spacing) <= max_width as f32 {
            return size;
        }
        if size < 2 {
            break;
        }
        size -= 2;
    }
    min
}

fn widest(font: &FontHandle, lines: &[String], letter_spacing: u32) -> f32 {
    lines
        .iter()
        .map(|l| font.line_width(l, letter_spacing))
        .fold(0.0, f32::max)
}

/// Place lines inside the zone rectangle: the block is positioned by
/// `valign`, each line independently by `align`. Integer pixel placement.
#[allow(clippy::too_many_arguments)]
pub fn layout_lines(
    zone_x: i64,
    zone_y: i64,
    zone_w: i64,
    zone_h: i64,
    font: &FontHandle,
    lines: &[String],
    align: Align,
    valign: VAlign,
    letter_spacing: u32,
    line_height: f32,
    stack_gap: i64,
) -> Vec<PlacedLine> {
    let font_h = font.height().round() as i64;
    let line_h = if lines.len() > 1 {
        (font.height() * line_height).round() as i64
    } else {
        font_h
    };
    let n = lines.len() as i64;
    let block_h = line_h * n + stack_gap * (n - 1).max(0);

    let block_top = match valign {
        VAlign::Top => zone_y,
        VAlign::Middle => zone_y + (zone_h - block_h) / 2,
        VAlign::Bottom => zone_y + zone_h - block_h,
    };

    lines
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let width = font.line_width(text, letter_spacing).round() as i64;
            let x = match align {
                Align::Left => zone_x,
                Align::Center => zone_x + (zone_w - width) / 2,
                Align::Right => zone_x + zone_w - width,
            };
            let top = block_top + i as i64 * (line_h + stack_gap);
            // Center the glyph box inside the (possibly taller) line box.
            let baseline = top as f32 + ((line_h - font_h) / 2) as f32 + font.ascent();
            PlacedLine {
                text: text.clone(),
                x,
                top,
                width,
                height: line_h,
                baseline,
            }
        })
        .collect()
}

/// Render one text zone onto the canvas. Empty values are a no-op.
pub fn render_text_zone(
    canvas: &mut Surface,
    zone: &TextZone,
    value: &str,
    data: &EpisodeData,
    fonts: &FontCache,
    assets: &dyn AssetSource,
) -> RenderResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    let text = apply_transform(value, zone.transform);
    let lines = split_lines(&text, zone.layout_mode);
    if lines.is_empty() {
        return Ok(());
    }

    let fill = resolve_color(zone, data);
    let size = if zone.size.auto {
        auto_size(
            fonts,
            assets,
            &zone.font,
            &lines,
            zone.letter_spacing,
            zone.size.min,
            zone.size.max,
            zone.position.width,
        )
    } else {
        zone.size.max
    };
    let font = fonts.handle(assets, &zone.font, size);

    // Rotation by a multiple of 360 is the identity; routing it through the
    // horizontal path keeps it bit-equal to unrotated centered text.
    if zone.layout_mode == LayoutMode::Rotated && zone.rotation.rem_euclid(360) != 0 {
        render_rotated(canvas, zone, &lines[0], &font, fill)
    } else {
        let (align, valign) = if zone.layout_mode == LayoutMode::Rotated {
            (Align::Center, VAlign::Middle)
        } else {
            (zone.align, zone.valign)
        };
        let placed = layout_lines(
            i64::from(zone.position.x),
            i64::from(zone.position.y),
            i64::from(zone.position.width),
            i64::from(zone.position.height),
            &font,
            &lines,
            align,
            valign,
            zone.letter_spacing,
            zone.line_height,
            i64::from(zone.stack_gap),
        );
        let mut scratch = Surface::new(canvas.width(), canvas.height())?;
        draw_lines(&mut scratch, zone, &placed, &font, fill)?;
        scratch.scale_alpha(zone.opacity);
        canvas.composite(&scratch, 0, 0, 1.0);
        Ok(())
    }
}

/// Rotated mode: the line is drawn centered on an oversized transparent
/// square, rotated with bounding-box expansion, then pasted centered on the
/// zone rectangle's center. Overflow past the zone is by design.
fn render_rotated(
    canvas: &mut Surface,
    zone: &TextZone,
    line: &str,
    font: &Arc<FontHandle>,
    fill: [u8; 4],
) -> RenderResult<()> {
    let side = 2 * zone.position.width.max(zone.position.height).max(1);
    let mut layer = Surface::new(side, side)?;

    let width = font.line_width(line, zone.letter_spacing).round() as i64;
    let font_h = font.height().round() as i64;
    let s = i64::from(side);
    let placed = PlacedLine {
        text: line.to_string(),
        x: (s - width) / 2,
        top: (s - font_h) / 2,
        width,
        height: font_h,
        baseline: ((s - font_h) / 2) as f32 + font.ascent(),
    };
    draw_lines(&mut layer, zone, std::slice::from_ref(&placed), font, fill)?;

    let mut rotated = layer.rotated(-f64::from(zone.rotation));
    rotated.scale_alpha(zone.opacity);

    let center_x = i64::from(zone.position.x) + i64::from(zone.position.width) / 2;
    let center_y = i64::from(zone.position.y) + i64::from(zone.position.height) / 2;
    canvas.composite(
        &rotated,
        center_x - i64::from(rotated.width()) / 2,
        center_y - i64::from(rotated.height()) / 2,
        1.0,
    );
    Ok(())
}

/// Background box, shadow, stroke and fill, in that compositing order.
fn draw_lines(
    target: &mut Surface,
    zone: &TextZone,
    placed: &[PlacedLine],
    font: &FontHandle,
    fill: [u8; 4],
) -> RenderResult<()> {
    if zone.text_background.enabled {
        draw_background_box(target, zone, placed);
    }
    if zone.effects.shadow_enabled {
        draw_shadow(target, zone, placed, font)?;
    }

    let stroke = parse_hex_color(&zone.effects.stroke_color).unwrap_or([0, 0, 0, 255]);
    for line in placed {
        draw_line(
            target,
            font,
            &line.text,
            line.x as f32,
            line.baseline,
            fill,
            stroke,
            zone.effects.stroke_width,
            zone.letter_spacing,
        );
    }
    Ok(())
}

fn draw_background_box(target: &mut Surface, zone: &TextZone, placed: &[PlacedLine]) {
    let Some(color) = parse_hex_color(&zone.text_background.color) else {
        tracing::warn!(color = %zone.text_background.color, "malformed box color, box skipped");
        return;
    };
    let (Some(left), Some(top), Some(right), Some(bottom)) = (
        placed.iter().map(|l| l.x).min(),
        placed.iter().map(|l| l.top).min(),
        placed.iter().map(|l| l.x + l.width).max(),
        placed.iter().map(|l| l.top + l.height).max(),
    ) else {
        return;
    };
    let pad = i64::from(zone.text_background.padding);
    target.fill_rounded_rect(
        left - pad,
        top - pad,
        ((right - left) + 2 * pad).max(0) as u32,
        ((bottom - top) + 2 * pad).max(0) as u32,
        zone.text_background.border_radius,
        color,
        zone.text_background.opacity,
    );
}

/// The glyph silhouette in the shadow color, offset and gaussian-blurred,
/// composited beneath stroke and fill.
fn draw_shadow(
    target: &mut Surface,
    zone: &TextZone,
    placed: &[PlacedLine],
    font: &FontHandle,
) -> RenderResult<()> {
    let Some(color) = parse_hex_color(&zone.effects.shadow_color) else {
        tracing::warn!(color = %zone.effects.shadow_color, "malformed shadow color, shadow skipped");
        return Ok(());
    };
    let (dx, dy) = zone.effects.shadow_offset;
    let mut layer = Surface::new(target.width(), target.height())?;
    let px = premultiply(color);
    for line in placed {
        let mut plot = |x: i64, y: i64, cov: f32| {
            layer.blend_pixel(x + i64::from(dx), y + i64::from(dy), px, cov);
        };
        if zone.letter_spacing > 0 {
            let mut pen = line.x as f32;
            for ch in line.text.chars() {
                font.draw_char(ch, pen, line.baseline, &mut plot);
                pen += font.advance(ch) + zone.letter_spacing as f32;
            }
        } else {
            font.draw_str(&line.text, line.x as f32, line.baseline, &mut plot);
        }
    }
    let radius = zone.effects.shadow_blur;
    let blurred = if radius > 0 {
        gaussian_blur(&layer, radius, radius as f32 / 2.0)?
    } else {
        layer
    };
    target.composite(&blurred, 0, 0, 1.0);
    Ok(())
}

/// Stroke is an offset-redraw ring (all offsets in `[-w, w]^2` except the
/// origin), not a true outline. With positive letter spacing the ring and the
/// fill are drawn per character; otherwise per string.
#[allow(clippy::too_many_arguments)]
fn draw_line(
    target: &mut Surface,
    font: &FontHandle,
    text: &str,
    x: f32,
    baseline: f32,
    fill: [u8; 4],
    stroke: [u8; 4],
    stroke_width: u32,
    letter_spacing: u32,
) {
    let fill_px = premultiply(fill);
    let stroke_px = premultiply(stroke);
    let w = i64::from(stroke_width);

    if letter_spacing > 0 {
        let mut pen = x;
        for ch in text.chars() {
            if stroke_width > 0 {
                for dy in -w..=w {
                    for dx in -w..=w {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        font.draw_char(ch, pen, baseline, &mut |px, py, cov| {
                            target.blend_pixel(px + dx, py + dy, stroke_px, cov);
                        });
                    }
                }
            }
            font.draw_char(ch, pen, baseline, &mut |px, py, cov| {
                target.blend_pixel(px, py, fill_px, cov);
            });
            pen += font.advance(ch) + letter_spacing as f32;
        }
    } else {
        if stroke_width > 0 {
            for dy in -w..=w {
                for dx in -w..=w {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    font.draw_str(text, x, baseline, &mut |px, py, cov| {
                        target.blend_pixel(px + dx, py + dy, stroke_px, cov);
                    });
                }
            }
        }
        font.draw_str(text, x, baseline, &mut |px, py, cov| {
            target.blend_pixel(px, py, fill_px, cov);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetSource;
    use crate::model::{OrderedMap, TextSize, ZonePosition};

    fn zone(position: ZonePosition) -> TextZone {
        serde_json::from_value(serde_json::json!({ "position": position })).unwrap()
    }

    #[test]
    fn transform_cases() {
        assert_eq!(apply_transform("MiXeD", TextTransform::None), "MiXeD");
        assert_eq!(apply_transform("MiXeD", TextTransform::Uppercase), "MIXED");
        assert_eq!(apply_transform("MiXeD", TextTransform::Lowercase), "mixed");
    }

    #[test]
    fn split_lines_per_mode() {
        assert_eq!(split_lines("a b", LayoutMode::Horizontal), ["a b"]);
        assert_eq!(split_lines("  a  b ", LayoutMode::StackedWords), ["a", "b"]);
        assert_eq!(split_lines("a b", LayoutMode::StackedChars), ["a", "b"]);
        assert!(split_lines("   ", LayoutMode::Horizontal).is_empty());
        assert!(split_lines("   ", LayoutMode::StackedWords).is_empty());
    }

    #[test]
    fn color_rule_precedence_follows_declaration_order() {
        let mut z = zone(ZonePosition { x: 0, y: 0, width: 100, height: 100 });
        let mut rules = OrderedMap::new();
        rules.insert("default", "#FFFFFF".to_string());
        rules.insert("CRITICAL", "#FF0000".to_string());
        rules.insert("HIGH", "#FFA500".to_string());
        z.color_rules = rules;

        let mut data = EpisodeData::new();
        assert_eq!(resolve_color(&z, &data), [255, 255, 255, 255]);
        data.set("severity", "HIGH");
        assert_eq!(resolve_color(&z, &data), [255, 165, 0, 255]);
        data.set("severity", "CRITICAL");
        assert_eq!(resolve_color(&z, &data), [255, 0, 0, 255]);
        data.set("severity", "MEDIUM");
        assert_eq!(resolve_color(&z, &data), [255, 255, 255, 255]);
    }

    #[test]
    fn malformed_color_degrades_to_white() {
        let mut z = zone(ZonePosition { x: 0, y: 0, width: 10, height: 10 });
        let mut rules = OrderedMap::new();
        rules.insert("default", "not-a-color".to_string());
        z.color_rules = rules;
        assert_eq!(resolve_color(&z, &EpisodeData::new()), [255, 255, 255, 255]);
    }

    #[test]
    fn auto_size_picks_largest_fitting_step() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        // Bitmap advance equals the pixel size: 13 chars at 92px = 1196 <= 1200,
        // while 94px = 1222 does not fit.
        let lines = vec!["BREAKING NEWS".to_string()];
        let size = auto_size(&fonts, &assets, "Impact", &lines, 0, 48, 96, 1200);
        assert_eq!(size, 92);

        let font = fonts.handle(&assets, "Impact", size);
        assert!(font.line_width(&lines[0], 0) <= 1200.0);
        let two_up = fonts.handle(&assets, "Impact", size + 2);
        assert!(two_up.line_width(&lines[0], 0) > 1200.0);
    }

    #[test]
    fn auto_size_falls_back_to_min() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let lines = vec!["WIDE".to_string()];
        assert_eq!(auto_size(&fonts, &assets, "Impact", &lines, 0, 48, 96, 10), 48);
    }

    #[test]
    fn auto_size_stays_within_bounds() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let lines = vec!["X".to_string()];
        let size = auto_size(&fonts, &assets, "Impact", &lines, 0, 48, 96, 10_000);
        assert_eq!(size, 96);
    }

    #[test]
    fn stacked_layout_block_math() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let font = fonts.handle(&assets, "Impact", 16);
        let lines = vec!["AA".to_string(), "B".to_string(), "CCC".to_string()];
        // line_height 1.0 keeps line boxes equal to the font height.
        let placed = layout_lines(10, 10, 200, 100, &font, &lines, Align::Left, VAlign::Top, 0, 1.0, 4);
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[0].top, 10);
        assert_eq!(placed[1].top, 30);
        assert_eq!(placed[2].top, 50);
        assert!(placed.iter().all(|l| l.x == 10));
        assert_eq!(placed[0].width, 32);
        assert_eq!(placed[1].width, 16);
        assert_eq!(placed[2].width, 48);
        assert_eq!(placed[0].baseline, 26.0);
    }

    #[test]
    fn alignment_positions_lines_independently() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let font = fonts.handle(&assets, "Impact", 16);
        let lines = vec!["AA".to_string(), "B".to_string()];
        let centered =
            layout_lines(0, 0, 100, 100, &font, &lines, Align::Center, VAlign::Middle, 0, 1.0, 0);
        assert_eq!(centered[0].x, 34);
        assert_eq!(centered[1].x, 42);
        let right =
            layout_lines(0, 0, 100, 100, &font, &lines, Align::Right, VAlign::Bottom, 0, 1.0, 0);
        assert_eq!(right[0].x, 68);
        assert_eq!(right[1].x, 84);
        assert_eq!(right[1].top + right[1].height, 100);
    }

    #[test]
    fn empty_value_renders_nothing() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let z = zone(ZonePosition { x: 0, y: 0, width: 64, height: 64 });
        let mut canvas = Surface::new(64, 64).unwrap();
        render_text_zone(&mut canvas, &z, "", &EpisodeData::new(), &fonts, &assets).unwrap();
        assert!(canvas.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn fixed_size_uses_max() {
        let fonts = FontCache::empty();
        let assets = MemoryAssetSource::new();
        let mut z = zone(ZonePosition { x: 0, y: 0, width: 10, height: 64 });
        z.size = TextSize { min: 8, max: 32, auto: false };
        z.effects.stroke_width = 0;
        // Fits nothing at 32px, but auto is off so no shrinking happens:
        // glyphs overflow and clip at the canvas edge.
        let mut canvas = Surface::new(64, 64).unwrap();
        render_text_zone(&mut canvas, &z, "W", &EpisodeData::new(), &fonts, &assets).unwrap();
        assert!(canvas.data().iter().any(|&b| b != 0));
    }
}
