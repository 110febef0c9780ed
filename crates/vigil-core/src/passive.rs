//! Passive spoof analysis on raw pixels.
//!
//! Two landmark-independent checks run on every decoded frame:
//!
//! - **Frequency:** screens and halftone prints leave periodic high-frequency
//!   structure (Moiré, sub-pixel grids) that spreads the log-magnitude
//!   spectrum. A frame passes when the spectrum's standard deviation stays at
//!   or below `frequency_std_max`.
//! - **Texture:** blurry or flat inputs (low-resolution prints, glare, heavy
//!   compression) have little second-derivative energy. A frame passes when
//!   the Laplacian variance is at least `laplacian_var_min`.
//!
//! # Threat Coverage
//!
//! - **Blocks:** most screen replays and low-quality prints.
//! - **Does not block:** high-quality prints under good light, or frames that
//!   have been re-rendered to remove the display grid.

use std::sync::Arc;

use image::{GrayImage, Luma, RgbImage};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;

use crate::config::Thresholds;
use crate::decode::FrameSample;
use crate::stats;

/// Per-frame passive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PassiveScore {
    pub frequency_ok: bool,
    pub texture_ok: bool,
    /// Standard deviation of the log-magnitude spectrum.
    pub frequency_std: f64,
    /// Variance of the Laplacian response.
    pub laplacian_var: f64,
}

impl PassiveScore {
    /// Both checks passed.
    pub fn passed(&self) -> bool {
        self.frequency_ok && self.texture_ok
    }
}

/// Frequency and texture analyzer. Cheap to share across threads; the FFT
/// plan is built once.
#[derive(Clone)]
pub struct PassiveAnalyzer {
    size: u32,
    frequency_std_max: f64,
    laplacian_var_min: f64,
    fft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for PassiveAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassiveAnalyzer")
            .field("size", &self.size)
            .field("frequency_std_max", &self.frequency_std_max)
            .field("laplacian_var_min", &self.laplacian_var_min)
            .finish()
    }
}

impl PassiveAnalyzer {
    pub fn new(thresholds: &Thresholds) -> Self {
        let size = thresholds.analysis_size.max(2);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(size as usize);
        Self {
            size,
            frequency_std_max: thresholds.frequency_std_max,
            laplacian_var_min: thresholds.laplacian_var_min,
            fft,
        }
    }

    pub fn analyze(&self, frame: &FrameSample) -> PassiveScore {
        let gray = grayscale(&frame.pixels);
        let laplacian_var = laplacian_variance(&gray);
        let frequency_std = self.frequency_std(&gray);

        PassiveScore {
            frequency_ok: frequency_std <= self.frequency_std_max,
            texture_ok: laplacian_var >= self.laplacian_var_min,
            frequency_std,
            laplacian_var,
        }
    }

    /// Standard deviation of `20·ln(|F| + 1)` over the 2-D DFT of the frame
    /// downscaled to `size × size`.
    pub fn frequency_std(&self, gray: &GrayImage) -> f64 {
        let n = self.size as usize;
        let mut rows: Vec<Complex<f64>> = resize_linear(gray, self.size)
            .into_iter()
            .map(|v| Complex::new(v, 0.0))
            .collect();
        // Row transforms: the buffer holds `n` contiguous rows.
        self.fft.process(&mut rows);

        let mut cols = vec![Complex::new(0.0, 0.0); n * n];
        for y in 0..n {
            for x in 0..n {
                cols[x * n + y] = rows[y * n + x];
            }
        }
        self.fft.process(&mut cols);

        // The centering shift only permutes bins; the standard deviation is
        // unaffected, so the spectrum is summarised unshifted.
        let magnitudes: Vec<f64> = cols.iter().map(|c| 20.0 * (c.norm() + 1.0).ln()).collect();
        stats::std_dev(&magnitudes).unwrap_or(0.0)
    }
}

/// Resample to `size × size` with 2-tap bilinear interpolation on
/// half-pixel centres, rounding to 8-bit levels. Downscaling does not
/// low-pass first, so display-grid aliasing survives into the spectrum.
fn resize_linear(gray: &GrayImage, size: u32) -> Vec<f64> {
    let (w, h) = (gray.width(), gray.height());
    if w == 0 || h == 0 {
        return vec![0.0; (size * size) as usize];
    }
    let xs: Vec<Tap> = (0..size).map(|d| Tap::new(d, size, w)).collect();
    let ys: Vec<Tap> = (0..size).map(|d| Tap::new(d, size, h)).collect();
    let px = |x: u32, y: u32| f64::from(gray.get_pixel(x, y).0[0]);

    let mut out = Vec::with_capacity((size * size) as usize);
    for ty in &ys {
        for tx in &xs {
            let top = px(tx.lo, ty.lo) * (1.0 - tx.frac) + px(tx.hi, ty.lo) * tx.frac;
            let bottom = px(tx.lo, ty.hi) * (1.0 - tx.frac) + px(tx.hi, ty.hi) * tx.frac;
            let v = top * (1.0 - ty.frac) + bottom * ty.frac;
            out.push(v.round().clamp(0.0, 255.0));
        }
    }
    out
}

/// Source neighbours and weight for one output coordinate.
struct Tap {
    lo: u32,
    hi: u32,
    frac: f64,
}

impl Tap {
    fn new(dst: u32, dst_len: u32, src_len: u32) -> Self {
        let scale = f64::from(src_len) / f64::from(dst_len);
        let last = src_len - 1;
        let pos = ((f64::from(dst) + 0.5) * scale - 0.5).max(0.0);
        let lo = (pos.floor() as u32).min(last);
        if lo == last {
            return Self { lo, hi: lo, frac: 0.0 };
        }
        Self {
            lo,
            hi: lo + 1,
            frac: pos - f64::from(lo),
        }
    }
}

/// ITU-R BT.601 luma, rounded to 8 bits.
pub fn grayscale(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Variance of the 4-neighbour Laplacian over the whole image, with
/// reflect-101 borders.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    if w == 0 || h == 0 {
        return 0.0;
    }

    let at = |x: i64, y: i64| -> f64 {
        let xx = reflect_101(x, w);
        let yy = reflect_101(y, h);
        f64::from(gray.get_pixel(xx as u32, yy as u32).0[0])
    };

    let mut responses = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            responses.push(lap);
        }
    }
    stats::variance(&responses).unwrap_or(0.0)
}

/// Mirror an out-of-range index without repeating the edge pixel
/// (`-1 -> 1`, `n -> n - 2`).
fn reflect_101(i: i64, n: i64) -> i64 {
    if n == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
    }
    i
}
