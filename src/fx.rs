use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::raster::Surface;

/// Apply named full-frame overlays in declared order. Unknown names are
/// skipped with a warning. `seed` drives the grain noise only.
pub fn apply_overlays(canvas: &mut Surface, overlays: &[String], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for name in overlays {
        match name.as_str() {
            "vignette" => vignette(canvas, 0.5),
            "vignette_subtle" => vignette(canvas, 0.3),
            "grain" => grain(canvas, 0.1, &mut rng),
            other => tracing::warn!(overlay = other, "unknown overlay, skipped"),
        }
    }
}

/// Radial darkening: the mask for a pixel is that of the smallest covering
/// ring, `floor(255 * (1 - (r/max_r)^2 * strength))` with `r = clamp(ceil(d),
/// 1, floor(max_r))`, and 255 (untouched) beyond the outermost ring. Closed
/// form of a concentric-ellipse loop, evaluated in one buffer pass.
pub fn vignette(canvas: &mut Surface, strength: f32) {
    let (w, h) = (canvas.width(), canvas.height());
    if w == 0 || h == 0 {
        return;
    }
    let cx = f64::from(w / 2);
    let cy = f64::from(h / 2);
    let max_r = (cx * cx + cy * cy).sqrt();
    if max_r <= 0.0 {
        return;
    }
    let outer = max_r.floor();
    let strength = f64::from(strength);

    canvas.for_each_pixel_mut(|x, y, px| {
        let dx = f64::from(x) - cx;
        let dy = f64::from(y) - cy;
        let ring = (dx * dx + dy * dy).sqrt().ceil().max(1.0);
        if ring > outer {
            return;
        }
        let mask = (255.0 * (1.0 - (ring / max_r).powi(2) * strength)).floor().clamp(0.0, 255.0);
        let mask = mask as u32;
        for c in &mut px[0..3] {
            *c = ((u32::from(*c) * mask + 127) / 255) as u8;
        }
    });
}

/// Per-pixel additive noise: one uniform sample in `[-255*amount, 255*amount]`
/// per pixel (row-major), added to all three channels and clamped.
pub fn grain(canvas: &mut Surface, amount: f32, rng: &mut StdRng) {
    let n = (255.0 * amount) as i32;
    if n <= 0 {
        return;
    }
    canvas.for_each_pixel_mut(|_, _, px| {
        let noise = rng.gen_range(-n..=n);
        for c in &mut px[0..3] {
            *c = (i32::from(*c) + noise).clamp(0, 255) as u8;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vignette_darkens_edges_more_than_center() {
        let mut canvas = Surface::filled(100, 100, [255, 255, 255, 255]).unwrap();
        vignette(&mut canvas, 0.5);
        let center = canvas.pixel(50, 50)[0];
        let edge = canvas.pixel(50, 0)[0];
        assert!(center > edge);
        // Top-center pixel: d = 50, max_r^2 = 5000, so the mask is exactly
        // floor(255 * (1 - 0.5 * 0.5)) = 191.
        assert_eq!(edge, 191);
        assert!(center >= 250);
    }

    #[test]
    fn vignette_leaves_pixels_beyond_outermost_ring() {
        let mut canvas = Surface::filled(100, 100, [255, 255, 255, 255]).unwrap();
        vignette(&mut canvas, 0.5);
        // Corner distance (70.71) ceils past floor(max_r) = 70: untouched.
        assert_eq!(canvas.pixel(0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn vignette_subtle_is_lighter() {
        let mut strong = Surface::filled(64, 64, [200, 200, 200, 255]).unwrap();
        let mut subtle = strong.clone();
        vignette(&mut strong, 0.5);
        vignette(&mut subtle, 0.3);
        assert!(subtle.pixel(32, 0)[0] > strong.pixel(32, 0)[0]);
    }

    #[test]
    fn grain_is_reproducible_per_seed() {
        let base = Surface::filled(16, 16, [128, 128, 128, 255]).unwrap();

        let mut a = base.clone();
        let mut b = base.clone();
        grain(&mut a, 0.1, &mut StdRng::seed_from_u64(7));
        grain(&mut b, 0.1, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);

        let mut c = base.clone();
        grain(&mut c, 0.1, &mut StdRng::seed_from_u64(8));
        assert_ne!(a, c);
    }

    #[test]
    fn grain_stays_within_amount_bounds() {
        let base = Surface::filled(16, 16, [128, 128, 128, 255]).unwrap();
        let mut noisy = base.clone();
        grain(&mut noisy, 0.1, &mut StdRng::seed_from_u64(1));
        for (a, b) in noisy.data().chunks_exact(4).zip(base.data().chunks_exact(4)) {
            for c in 0..3 {
                assert!((i32::from(a[c]) - i32::from(b[c])).abs() <= 25);
            }
            assert_eq!(a[3], b[3]);
        }
    }

    #[test]
    fn unknown_overlay_is_skipped() {
        let mut canvas = Surface::filled(8, 8, [99, 99, 99, 255]).unwrap();
        let before = canvas.clone();
        apply_overlays(&mut canvas, &["glow".to_string()], 1);
        assert_eq!(canvas, before);
    }

    #[test]
    fn overlays_apply_in_declared_order() {
        let names = vec!["vignette".to_string(), "grain".to_string()];
        let mut a = Surface::filled(32, 32, [180, 180, 180, 255]).unwrap();
        apply_overlays(&mut a, &names, 42);

        let mut b = Surface::filled(32, 32, [180, 180, 180, 255]).unwrap();
        vignette(&mut b, 0.5);
        grain(&mut b, 0.1, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
