//! Difference algorithms.
//!
//! Four independent pixel-comparison strategies, each taking the same
//! (baseline, current) frame pair and producing a change percentage in
//! [0, 100] plus a binary mask artifact:
//!
//! - `frame_diff`: absolute difference, fixed threshold, pixel count
//! - `background_sub`: higher threshold plus morphological opening
//! - `contour`: external contour area over frame area
//! - `ssim`: structural similarity map with an adaptive threshold
//!
//! All four are pure functions: identical inputs give bit-identical outputs.
//! Callers must check baseline presence before invoking any of them, and a
//! dimension mismatch between the two frames is a contract violation that
//! fails the call loudly.

pub mod background_sub;
pub mod contour;
pub mod frame_diff;
pub mod ssim;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::ImageFrame;

/// One of the four difference algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMethod {
    FrameDiff,
    BackgroundSub,
    Contour,
    Ssim,
}

impl DiffMethod {
    /// Fixed evaluation and reporting order.
    pub const ALL: [DiffMethod; 4] = [
        DiffMethod::FrameDiff,
        DiffMethod::BackgroundSub,
        DiffMethod::Contour,
        DiffMethod::Ssim,
    ];

    /// Downstream wire label. These exact strings are consumed by external
    /// analysis collaborators and must not change.
    pub fn label(self) -> &'static str {
        match self {
            DiffMethod::FrameDiff => "Frame Differencing",
            DiffMethod::BackgroundSub => "Background Subtraction",
            DiffMethod::Contour => "Contour Detection",
            DiffMethod::Ssim => "SSIM",
        }
    }

    /// Configuration token.
    pub fn key(self) -> &'static str {
        match self {
            DiffMethod::FrameDiff => "frame_diff",
            DiffMethod::BackgroundSub => "background_sub",
            DiffMethod::Contour => "contour",
            DiffMethod::Ssim => "ssim",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }
}

/// Result of one algorithm invocation.
#[derive(Clone, Debug)]
pub struct MethodOutput {
    /// Change percentage in [0, 100].
    pub percent: f64,
    /// Binary mask artifact (0 or 255 per pixel), for optional display.
    pub mask: Vec<u8>,
}

/// Run one algorithm on a frame pair.
pub fn run(method: DiffMethod, baseline: &ImageFrame, current: &ImageFrame) -> Result<MethodOutput> {
    match method {
        DiffMethod::FrameDiff => frame_diff::detect(baseline, current),
        DiffMethod::BackgroundSub => background_sub::detect(baseline, current),
        DiffMethod::Contour => contour::detect(baseline, current),
        DiffMethod::Ssim => ssim::detect(baseline, current),
    }
}

// ----------------------------------------------------------------------------
// Shared raster helpers
// ----------------------------------------------------------------------------

pub(crate) fn ensure_same_dimensions(baseline: &ImageFrame, current: &ImageFrame) -> Result<()> {
    if !baseline.same_dimensions(current) {
        return Err(anyhow!(
            "frame dimension mismatch: baseline {}x{}, current {}x{}",
            baseline.width(),
            baseline.height(),
            current.width(),
            current.height()
        ));
    }
    Ok(())
}

/// Per-channel absolute difference collapsed to grayscale (Rec.601 weights).
pub(crate) fn absdiff_gray(baseline: &ImageFrame, current: &ImageFrame) -> Vec<u8> {
    let a = baseline.data();
    let b = current.data();
    let mut out = Vec::with_capacity(baseline.pixel_count());
    for (pa, pb) in a.chunks_exact(3).zip(b.chunks_exact(3)) {
        let dr = pa[0].abs_diff(pb[0]) as u32;
        let dg = pa[1].abs_diff(pb[1]) as u32;
        let db = pa[2].abs_diff(pb[2]) as u32;
        out.push(((dr * 299 + dg * 587 + db * 114) / 1000) as u8);
    }
    out
}

/// Grayscale conversion of one frame (Rec.601 weights).
pub(crate) fn grayscale(frame: &ImageFrame) -> Vec<u8> {
    frame
        .data()
        .chunks_exact(3)
        .map(|px| {
            ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8
        })
        .collect()
}

/// Binary threshold: values strictly above `cutoff` become 255, others 0.
pub(crate) fn threshold_binary(src: &[u8], cutoff: u8) -> Vec<u8> {
    src.iter()
        .map(|&v| if v > cutoff { 255 } else { 0 })
        .collect()
}

pub(crate) fn count_nonzero(mask: &[u8]) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}

pub(crate) fn changed_percent(changed: usize, total: usize) -> f64 {
    changed as f64 / total as f64 * 100.0
}

/// Otsu's threshold over an intensity map: maximizes between-class variance.
/// A constant map yields 0.
pub(crate) fn otsu_threshold(values: &[u8]) -> u8 {
    let mut hist = [0u64; 256];
    for &v in values {
        hist[v as usize] += 1;
    }
    let total = values.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut best_threshold = 0u8;
    let mut best_variance = -1.0;
    for t in 0..256usize {
        weight_b += hist[t] as f64;
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0.0 {
            break;
        }
        sum_b += t as f64 * hist[t] as f64;
        let mean_b = sum_b / weight_b;
        let mean_f = (sum_all - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f) * (mean_b - mean_f);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = t as u8;
        }
    }
    best_threshold
}

/// 5x5 elliptical structuring element, as (dx, dy) offsets from the anchor.
const ELLIPSE_5X5: [(i32, i32); 17] = [
    (0, -2),
    (-2, -1),
    (-1, -1),
    (0, -1),
    (1, -1),
    (2, -1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (2, 0),
    (-2, 1),
    (-1, 1),
    (0, 1),
    (1, 1),
    (2, 1),
    (0, 2),
];

fn erode(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    morph(mask, width, height, true)
}

fn dilate(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    morph(mask, width, height, false)
}

fn morph(mask: &[u8], width: usize, height: usize, erosion: bool) -> Vec<u8> {
    let mut out = vec![0u8; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut all = true;
            let mut any = false;
            for (dx, dy) in ELLIPSE_5X5 {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    // Out-of-bounds neighbors do not influence the result.
                    continue;
                }
                let v = mask[ny as usize * width + nx as usize];
                all &= v != 0;
                any |= v != 0;
            }
            let on = if erosion { all } else { any };
            out[y * width + x] = if on { 255 } else { 0 };
        }
    }
    out
}

/// Morphological opening: erosion followed by dilation with the 5x5 ellipse.
/// Suppresses isolated noise pixels while preserving larger regions.
pub(crate) fn morph_open(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    dilate(&erode(mask, width, height), width, height)
}
