//! Background subtraction.
//!
//! Same pipeline as frame differencing with a higher cutoff, followed by a
//! morphological opening (erosion then dilation, 5x5 ellipse) that suppresses
//! isolated noise pixels before the percentage is computed.

use anyhow::Result;

use crate::detect::{
    absdiff_gray, changed_percent, count_nonzero, ensure_same_dimensions, morph_open,
    threshold_binary, MethodOutput,
};
use crate::frame::ImageFrame;

/// Grayscale cutoff, stricter than plain frame differencing.
pub const DIFF_THRESHOLD: u8 = 50;

pub fn detect(baseline: &ImageFrame, current: &ImageFrame) -> Result<MethodOutput> {
    ensure_same_dimensions(baseline, current)?;

    let diff = absdiff_gray(baseline, current);
    let mask = threshold_binary(&diff, DIFF_THRESHOLD);
    let cleaned = morph_open(
        &mask,
        baseline.width() as usize,
        baseline.height() as usize,
    );
    let percent = changed_percent(count_nonzero(&cleaned), baseline.pixel_count());
    Ok(MethodOutput {
        percent,
        mask: cleaned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_black_frames_report_zero() {
        let black = ImageFrame::solid(40, 30, [0, 0, 0]);
        let out = detect(&black, &black).expect("detect");
        assert_eq!(out.percent, 0.0);
    }

    #[test]
    fn quarter_white_block_survives_opening() {
        let baseline = ImageFrame::solid(80, 60, [0, 0, 0]);
        let current = baseline.with_block(0, 0, 40, 30, [255, 255, 255]);
        let out = detect(&baseline, &current).expect("detect");
        // The opening erodes the block boundary slightly; the bulk remains.
        assert!((out.percent - 25.0).abs() < 2.0, "got {}", out.percent);
    }

    #[test]
    fn isolated_noise_pixels_are_suppressed() {
        let baseline = ImageFrame::solid(40, 30, [0, 0, 0]);
        // Two lone pixels, far apart: below the structuring element size.
        let current = baseline
            .with_block(5, 5, 1, 1, [255, 255, 255])
            .with_block(30, 20, 1, 1, [255, 255, 255]);
        let out = detect(&baseline, &current).expect("detect");
        assert_eq!(out.percent, 0.0);
    }

    #[test]
    fn mid_intensity_change_is_below_cutoff() {
        // A difference of 40 gray levels passes frame_diff's 30 cutoff but
        // not this one.
        let baseline = ImageFrame::solid(10, 10, [0, 0, 0]);
        let current = ImageFrame::solid(10, 10, [40, 40, 40]);
        let out = detect(&baseline, &current).expect("detect");
        assert_eq!(out.percent, 0.0);
    }
}
