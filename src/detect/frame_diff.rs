//! Frame differencing.
//!
//! Absolute pixel difference, grayscale, fixed binary threshold, then the
//! fraction of thresholded pixels over the whole frame.

use anyhow::Result;

use crate::detect::{
    absdiff_gray, changed_percent, count_nonzero, ensure_same_dimensions, threshold_binary,
    MethodOutput,
};
use crate::frame::ImageFrame;

/// Grayscale cutoff below which a pixel difference counts as noise.
pub const DIFF_THRESHOLD: u8 = 30;

pub fn detect(baseline: &ImageFrame, current: &ImageFrame) -> Result<MethodOutput> {
    ensure_same_dimensions(baseline, current)?;

    let diff = absdiff_gray(baseline, current);
    let mask = threshold_binary(&diff, DIFF_THRESHOLD);
    let percent = changed_percent(count_nonzero(&mask), baseline.pixel_count());
    Ok(MethodOutput { percent, mask })
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
    fn quarter_white_block_reports_about_25_percent() {
        let baseline = ImageFrame::solid(80, 60, [0, 0, 0]);
        let current = baseline.with_block(0, 0, 40, 30, [255, 255, 255]);
        let out = detect(&baseline, &current).expect("detect");
        assert!((out.percent - 25.0).abs() < 0.5, "got {}", out.percent);
    }

    #[test]
    fn sub_threshold_change_is_ignored() {
        let baseline = ImageFrame::solid(10, 10, [0, 0, 0]);
        let current = ImageFrame::solid(10, 10, [20, 20, 20]);
        let out = detect(&baseline, &current).expect("detect");
        assert_eq!(out.percent, 0.0);
    }

    #[test]
    fn mismatched_dimensions_fail() {
        let a = ImageFrame::solid(10, 10, [0, 0, 0]);
        let b = ImageFrame::solid(10, 20, [0, 0, 0]);
        assert!(detect(&a, &b).is_err());
    }
}
