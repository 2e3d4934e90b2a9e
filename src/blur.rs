use crate::error::{RenderError, RenderResult};
use crate::raster::Surface;

/// Separable gaussian blur on premultiplied RGBA, fixed-point q16 weights.
///
/// Edge pixels are clamp-extended. `radius == 0` returns the input unchanged.
pub fn gaussian_blur(src: &Surface, radius: u32, sigma: f32) -> RenderResult<Surface> {
    if radius == 0 {
        return Ok(src.clone());
    }
    let kernel = kernel_q16(radius, sigma)?;
    let (w, h) = (src.width(), src.height());

    let mut tmp = vec![0u8; src.data().len()];
    let mut out = vec![0u8; src.data().len()];
    convolve_axis(src.data(), &mut tmp, w, h, &kernel, true);
    convolve_axis(&tmp, &mut out, w, h, &kernel, false);
    Surface::from_premul_data(w, h, out)
}

fn kernel_q16(radius: u32, sigma: f32) -> RenderResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(RenderError::validation("blur sigma must be > 0"));
    }
    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;

    let mut weights_f = Vec::<f64>::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }
    if sum <= 0.0 {
        return Err(RenderError::raster("gaussian kernel sum is zero"));
    }

    let mut weights = Vec::<u32>::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for &wf in &weights_f {
        let q = (((wf / sum) * 65536.0).round() as i64).clamp(0, 65536);
        weights.push(q as u32);
        acc += q;
    }
    // Force the fixed-point weights to sum to exactly 1.0 in q16.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

fn convolve_axis(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32], horizontal: bool) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let o = ki as i32 - radius;
                let (sx, sy) = if horizontal {
                    ((x + o).clamp(0, w - 1), y)
                } else {
                    (x, (y + o).clamp(0, h - 1))
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = (((acc[c] + 32768) >> 16).min(255)) as u8;
            }
        }
    }
}
