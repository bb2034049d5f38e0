//! Structural similarity.
//!
//! Computes a per-pixel SSIM map between the grayscale baseline and current
//! frames over a 7x7 local window, scales it to an intensity image, then
//! applies an automatically chosen (Otsu) inverted threshold: pixels whose
//! similarity falls at or below the threshold are flagged as structurally
//! dissimilar. Windowed sums come from integral images so the cost is linear
//! in frame size.

use anyhow::Result;

use crate::detect::{
    changed_percent, count_nonzero, ensure_same_dimensions, grayscale, otsu_threshold,
    MethodOutput,
};
use crate::frame::ImageFrame;

/// Local window side length.
const WINDOW: i64 = 7;

/// Stabilization constants for 8-bit dynamic range.
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

pub fn detect(baseline: &ImageFrame, current: &ImageFrame) -> Result<MethodOutput> {
    ensure_same_dimensions(baseline, current)?;

    let width = baseline.width() as usize;
    let height = baseline.height() as usize;
    let a = grayscale(baseline);
    let b = grayscale(current);

    let scaled = ssim_map_scaled(&a, &b, width, height);
    let cutoff = otsu_threshold(&scaled);
    // Inverted threshold: low similarity means changed.
    let mask: Vec<u8> = scaled
        .iter()
        .map(|&v| if v <= cutoff { 255 } else { 0 })
        .collect();
    let percent = changed_percent(count_nonzero(&mask), baseline.pixel_count());
    Ok(MethodOutput { percent, mask })
}

/// Per-pixel SSIM over a clamped local window, scaled to u8.
fn ssim_map_scaled(a: &[u8], b: &[u8], width: usize, height: usize) -> Vec<u8> {
    let ia = Integral::new(a, width, height, |v| v);
    let ib = Integral::new(b, width, height, |v| v);
    let iaa = Integral::new(a, width, height, |v| v * v);
    let ibb = Integral::new(b, width, height, |v| v * v);
    let iab = Integral::product(a, b, width, height);

    let half = WINDOW / 2;
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let x0 = (x - half).max(0) as usize;
            let y0 = (y - half).max(0) as usize;
            let x1 = ((x + half) as usize).min(width - 1);
            let y1 = ((y + half) as usize).min(height - 1);
            let n = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;

            let sum_a = ia.window(x0, y0, x1, y1);
            let sum_b = ib.window(x0, y0, x1, y1);
            let mean_a = sum_a / n;
            let mean_b = sum_b / n;

            // Unbiased local variance and covariance.
            let norm = 1.0 / (n - 1.0);
            let var_a = (iaa.window(x0, y0, x1, y1) - n * mean_a * mean_a) * norm;
            let var_b = (ibb.window(x0, y0, x1, y1) - n * mean_b * mean_b) * norm;
            let cov = (iab.window(x0, y0, x1, y1) - n * mean_a * mean_b) * norm;

            let s = ((2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2))
                / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2));
            out.push((s * 255.0).clamp(0.0, 255.0).round() as u8);
        }
    }
    out
}

/// Summed-area table with one row/column of zero padding.
struct Integral {
    sums: Vec<f64>,
    width: usize,
}

impl Integral {
    fn new(values: &[u8], width: usize, height: usize, f: impl Fn(f64) -> f64) -> Self {
        Self::build(width, height, |idx| f(values[idx] as f64))
    }

    fn product(a: &[u8], b: &[u8], width: usize, height: usize) -> Self {
        Self::build(width, height, |idx| a[idx] as f64 * b[idx] as f64)
    }

    fn build(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(y * width + x);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            sums,
            width: stride,
        }
    }

    /// Sum over the inclusive pixel rectangle [x0..=x1] x [y0..=y1].
    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = |x: usize, y: usize| self.sums[y * self.width + x];
        s(x1 + 1, y1 + 1) - s(x0, y1 + 1) - s(x1 + 1, y0) + s(x0, y0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameSource;

    #[test]
    fn identical_black_frames_report_zero() {
        let black = ImageFrame::solid(40, 30, [0, 0, 0]);
        let out = detect(&black, &black).expect("detect");
        assert_eq!(out.percent, 0.0);
    }

    #[test]
    fn identical_textured_frames_report_zero() {
        let mut source = crate::frame::SyntheticSource::new("stub://t", 32, 32);
        let f = source.next_frame().expect("frame");
        let out = detect(&f, &f).expect("detect");
        assert_eq!(out.percent, 0.0);
    }

    #[test]
    fn quarter_white_block_is_structurally_dissimilar() {
        let baseline = ImageFrame::solid(80, 60, [0, 0, 0]);
        let current = baseline.with_block(0, 0, 40, 30, [255, 255, 255]);
        let out = detect(&baseline, &current).expect("detect");
        // The flagged region tracks the block, give or take the window
        // radius around its boundary.
        assert!(out.percent > 20.0, "got {}", out.percent);
        assert!(out.percent < 35.0, "got {}", out.percent);
    }

    #[test]
    fn fully_inverted_frame_is_fully_dissimilar() {
        let black = ImageFrame::solid(40, 30, [0, 0, 0]);
        let white = ImageFrame::solid(40, 30, [255, 255, 255]);
        let out = detect(&black, &white).expect("detect");
        assert_eq!(out.percent, 100.0);
    }

    #[test]
    fn integral_window_sums_match_naive() {
        let values: Vec<u8> = (0u8..16).collect();
        let integral = Integral::new(&values, 4, 4, |v| v);
        // Rectangle (1,1)..(3,2): rows 1..=2, cols 1..=3.
        let naive: f64 = [5, 6, 7, 9, 10, 11].iter().map(|&v| v as f64).sum();
        assert_eq!(integral.window(1, 1, 3, 2), naive);
    }

    #[test]
    fn ssim_map_is_255_for_identical_inputs() {
        let values = vec![7u8; 64];
        let map = ssim_map_scaled(&values, &values, 8, 8);
        assert!(map.iter().all(|&v| v == 255));
    }
}
