use crate::error::{RenderError, RenderResult};

/// Premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

/// Source-over composite of `src` onto `dst`, with an extra opacity factor.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Premultiply a straight-alpha color.
pub fn premultiply(color: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(color[3]);
    [
        mul_div255(u16::from(color[0]), a),
        mul_div255(u16::from(color[1]), a),
        mul_div255(u16::from(color[2]), a),
        color[3],
    ]
}

/// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional) into straight RGBA.
pub fn parse_hex_color(s: &str) -> Option<[u8; 4]> {
    let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
    let nibble = |c: u8| -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    };
    let b = hex.as_bytes();
    match b.len() {
        3 => {
            let r = nibble(b[0])?;
            let g = nibble(b[1])?;
            let bl = nibble(b[2])?;
            Some([r << 4 | r, g << 4 | g, bl << 4 | bl, 255])
        }
        6 | 8 => {
            let mut out = [0u8, 0, 0, 255];
            for (i, pair) in b.chunks_exact(2).enumerate() {
                out[i] = nibble(pair[0])? << 4 | nibble(pair[1])?;
            }
            Some(out)
        }
        _ => None,
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

/// An owned premultiplied-RGBA8 canvas, row-major and tightly packed.
///
/// All drawing operations clip silently at the edges; coordinates may be
/// negative or extend past the surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Surface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| RenderError::raster("surface size overflow"))?;
        Ok(Self {
            width,
            height,
            data: vec![0u8; len],
        })
    }

    /// Surface filled with one straight-alpha color.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> RenderResult<Self> {
        let mut s = Self::new(width, height)?;
        let px = premultiply(color);
        for chunk in s.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        Ok(s)
    }

    /// Premultiplies the source pixels.
    pub fn from_rgba_image(img: &image::RgbaImage) -> Self {
        let mut data = Vec::with_capacity((img.width() * img.height() * 4) as usize);
        for px in img.pixels() {
            let p = premultiply(px.0);
            data.extend_from_slice(&p);
        }
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    /// Wrap an already-premultiplied RGBA8 buffer.
    pub fn from_premul_data(width: u32, height: u32, data: Vec<u8>) -> RenderResult<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return Err(RenderError::raster("premul buffer does not match dimensions"));
        }
        Ok(Self { width, height, data })
    }

    /// Treats the source as opaque (alpha forced to 255).
    pub fn from_rgb_image(img: &image::RgbImage) -> Self {
        let mut data = Vec::with_capacity((img.width() * img.height() * 4) as usize);
        for px in img.pixels() {
            data.extend_from_slice(&[px.0[0], px.0[1], px.0[2], 255]);
        }
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn idx(&self, x: u32, y: u32) -> usize {
        ((y as usize * self.width as usize) + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = self.idx(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Alpha-blend one premultiplied pixel; out-of-bounds coordinates are dropped.
    pub fn blend_pixel(&mut self, x: i64, y: i64, src: PremulRgba8, opacity: f32) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let i = self.idx(x as u32, y as u32);
        let dst = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
        let out = over(dst, src, opacity);
        self.data[i..i + 4].copy_from_slice(&out);
    }

    /// Alpha-composite `src` with its top-left at (`left`, `top`), clipped.
    pub fn composite(&mut self, src: &Surface, left: i64, top: i64, opacity: f32) {
        for sy in 0..src.height {
            let dy = top + i64::from(sy);
            if dy < 0 || dy >= i64::from(self.height) {
                continue;
            }
            for sx in 0..src.width {
                let dx = left + i64::from(sx);
                if dx < 0 || dx >= i64::from(self.width) {
                    continue;
                }
                let s = src.pixel(sx, sy);
                if s[3] == 0 {
                    continue;
                }
                let i = self.idx(dx as u32, dy as u32);
                let d = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
                let out = over(d, s, opacity);
                self.data[i..i + 4].copy_from_slice(&out);
            }
        }
    }

    /// Opaque paste: replaces RGB and forces alpha to 255, ignoring source alpha.
    pub fn paste_opaque(&mut self, src: &Surface, left: i64, top: i64) {
        for sy in 0..src.height {
            let dy = top + i64::from(sy);
            if dy < 0 || dy >= i64::from(self.height) {
                continue;
            }
            for sx in 0..src.width {
                let dx = left + i64::from(sx);
                if dx < 0 || dx >= i64::from(self.width) {
                    continue;
                }
                let s = src.pixel(sx, sy);
                let i = self.idx(dx as u32, dy as u32);
                self.data[i..i + 4].copy_from_slice(&[s[0], s[1], s[2], 255]);
            }
        }
    }

    /// Multiply every pixel's alpha (and premultiplied RGB) by `opacity`.
    pub fn scale_alpha(&mut self, opacity: f32) {
        let op = ((opacity.clamp(0.0, 1.0) * 255.0).round() as i32).clamp(0, 255) as u16;
        if op == 255 {
            return;
        }
        for chunk in self.data.chunks_exact_mut(4) {
            for c in chunk.iter_mut() {
                *c = mul_div255(u16::from(*c), op);
            }
        }
    }

    /// Visit every pixel mutably in row-major order. Each slice is one RGBA8
    /// pixel.
    pub fn for_each_pixel_mut(&mut self, mut f: impl FnMut(u32, u32, &mut [u8])) {
        if self.width == 0 {
            return;
        }
        let w = u64::from(self.width);
        for (i, chunk) in self.data.chunks_exact_mut(4).enumerate() {
            f((i as u64 % w) as u32, (i as u64 / w) as u32, chunk);
        }
    }

    /// Fill an axis-aligned rounded rectangle (square corners when `radius` is 0).
    pub fn fill_rounded_rect(
        &mut self,
        left: i64,
        top: i64,
        width: u32,
        height: u32,
        radius: u32,
        color: [u8; 4],
        opacity: f32,
    ) {
        if width == 0 || height == 0 {
            return;
        }
        let r = i64::from(radius.min(width / 2).min(height / 2));
        let px = premultiply(color);
        let right = left + i64::from(width) - 1;
        let bottom = top + i64::from(height) - 1;
        for y in top..=bottom {
            for x in left..=right {
                if r > 0 {
                    // Distance test against the nearest corner circle center.
                    let cx = if x < left + r {
                        Some(left + r)
                    } else if x > right - r {
                        Some(right - r)
                    } else {
                        None
                    };
                    let cy = if y < top + r {
                        Some(top + r)
                    } else if y > bottom - r {
                        Some(bottom - r)
                    } else {
                        None
                    };
                    if let (Some(cx), Some(cy)) = (cx, cy) {
                        let dx = x - cx;
                        let dy = y - cy;
                        if dx * dx + dy * dy > r * r {
                            continue;
                        }
                    }
                }
                self.blend_pixel(x, y, px, opacity);
            }
        }
    }

    /// Rotate around the surface center by `degrees`, expanding the bounding
    /// box so nothing is cropped. Bilinear resampling on premultiplied pixels;
    /// samples outside the source are transparent.
    pub fn rotated(&self, degrees: f64) -> Surface {
        if self.width == 0 || self.height == 0 || degrees.rem_euclid(360.0) == 0.0 {
            return self.clone();
        }
        let theta = degrees.to_radians();
        let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
        let w = f64::from(self.width);
        let h = f64::from(self.height);
        // cos/sin carry ~1e-17 residue at exact right angles; without the
        // epsilon the ceil inflates the output box by one pixel.
        let out_w = ((w * cos + h * sin - 1e-7).ceil().max(1.0)) as u32;
        let out_h = ((w * sin + h * cos - 1e-7).ceil().max(1.0)) as u32;

        let inv = kurbo::Affine::rotate(-theta);
        let src_cx = w / 2.0;
        let src_cy = h / 2.0;
        let dst_cx = f64::from(out_w) / 2.0;
        let dst_cy = f64::from(out_h) / 2.0;

        let mut out = Surface {
            width: out_w,
            height: out_h,
            data: vec![0u8; out_w as usize * out_h as usize * 4],
        };
        for y in 0..out_h {
            for x in 0..out_w {
                let d = kurbo::Point::new(
                    f64::from(x) + 0.5 - dst_cx,
                    f64::from(y) + 0.5 - dst_cy,
                );
                let s = inv * d;
                let px = self.sample_bilinear(s.x + src_cx, s.y + src_cy);
                if px[3] != 0 {
                    let i = out.idx(x, y);
                    out.data[i..i + 4].copy_from_slice(&px);
                }
            }
        }
        out
    }

    fn sample_bilinear(&self, sx: f64, sy: f64) -> PremulRgba8 {
        let u = sx - 0.5;
        let v = sy - 0.5;
        let x0 = u.floor();
        let y0 = v.floor();
        let fx = u - x0;
        let fy = v - y0;
        let fetch = |x: i64, y: i64| -> [f64; 4] {
            if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
                return [0.0; 4];
            }
            let p = self.pixel(x as u32, y as u32);
            [f64::from(p[0]), f64::from(p[1]), f64::from(p[2]), f64::from(p[3])]
        };
        let (x0, y0) = (x0 as i64, y0 as i64);
        let p00 = fetch(x0, y0);
        let p10 = fetch(x0 + 1, y0);
        let p01 = fetch(x0, y0 + 1);
        let p11 = fetch(x0 + 1, y0 + 1);
        let mut out = [0u8; 4];
        for c in 0..4 {
            let top = p00[c] * (1.0 - fx) + p10[c] * fx;
            let bot = p01[c] * (1.0 - fx) + p11[c] * fx;
            out[c] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    /// Drop alpha and return the RGB pixels. Intended for opaque canvases.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for chunk in self.data.chunks_exact(4) {
            out.extend_from_slice(&chunk[0..3]);
        }
        image::RgbImage::from_raw(self.width, self.height, out)
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_src_transparent_is_noop() {
        let dst = [10, 20, 30, 255];
        let src = [255, 255, 255, 0];
        assert_eq!(over(dst, src, 1.0), dst);
    }

    #[test]
    fn parse_hex_color_forms() {
        assert_eq!(parse_hex_color("#FFFFFF"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("1a1a1a"), Some([26, 26, 26, 255]));
        assert_eq!(parse_hex_color("#F00"), Some([255, 0, 0, 255]));
        assert_eq!(parse_hex_color("#00000080"), Some([0, 0, 0, 128]));
        assert_eq!(parse_hex_color("nope"), None);
        assert_eq!(parse_hex_color(""), None);
    }

    #[test]
    fn composite_clips_negative_coordinates() {
        let mut dst = Surface::filled(4, 4, [0, 0, 0, 255]).unwrap();
        let src = Surface::filled(3, 3, [255, 255, 255, 255]).unwrap();
        dst.composite(&src, -2, -2, 1.0);
        assert_eq!(dst.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(dst.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn paste_opaque_ignores_source_alpha() {
        let mut dst = Surface::filled(2, 2, [0, 0, 0, 255]).unwrap();
        let mut img = image::RgbaImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgba([200, 100, 50, 255]));
        let src = Surface::from_rgba_image(&img);
        dst.paste_opaque(&src, 1, 1);
        assert_eq!(dst.pixel(1, 1), [200, 100, 50, 255]);
        assert_eq!(dst.pixel(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn scale_alpha_halves_premultiplied_channels() {
        let mut s = Surface::filled(1, 1, [255, 255, 255, 255]).unwrap();
        s.scale_alpha(0.5);
        let px = s.pixel(0, 0);
        assert!((i32::from(px[3]) - 128).abs() <= 1);
        assert_eq!(px[0], px[3]);
    }

    #[test]
    fn rounded_rect_radius_0_fills_whole_rect() {
        let mut s = Surface::new(6, 6).unwrap();
        s.fill_rounded_rect(1, 1, 4, 4, 0, [255, 0, 0, 255], 1.0);
        assert_eq!(s.pixel(1, 1), [255, 0, 0, 255]);
        assert_eq!(s.pixel(4, 4), [255, 0, 0, 255]);
        assert_eq!(s.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn rounded_rect_clips_corner_pixels() {
        let mut s = Surface::new(10, 10).unwrap();
        s.fill_rounded_rect(0, 0, 10, 10, 4, [255, 255, 255, 255], 1.0);
        assert_eq!(s.pixel(0, 0)[3], 0);
        assert_eq!(s.pixel(5, 5), [255, 255, 255, 255]);
        assert_eq!(s.pixel(5, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn rotated_0_is_identity() {
        let s = Surface::filled(3, 2, [9, 9, 9, 255]).unwrap();
        assert_eq!(s.rotated(0.0), s);
        assert_eq!(s.rotated(360.0), s);
    }

    #[test]
    fn rotated_90_swaps_dimensions_and_moves_pixels() {
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        let s = Surface::from_rgba_image(&img);
        let r = s.rotated(90.0);
        assert_eq!((r.width(), r.height()), (1, 2));
        assert_eq!(r.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(r.pixel(0, 1), [0, 0, 255, 255]);
    }
}
