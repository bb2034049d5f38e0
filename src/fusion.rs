//! Fusion engine.
//!
//! Combines the outputs of the currently-enabled difference algorithms for
//! one (baseline, current) pair into a single report: per-method percentages
//! plus the arithmetic mean over the enabled set. With no methods enabled the
//! mean is absent, never zero: zero would falsely read as "no change
//! detected". Evaluation is deterministic and carries no state between calls.

use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;

use crate::detect::{self, DiffMethod};
use crate::frame::ImageFrame;

/// Header line of the free-space report block. Wire contract; do not edit.
pub const REPORT_HEADER: &str = "=== Free Space Detection Results ===";

/// Emitted when evaluation is requested without both frames available.
/// Wire contract; do not edit.
pub const BASELINE_UNAVAILABLE: &str =
    "Baseline image or current frame not available for detection.";

/// Set of enabled difference algorithms, in fixed method order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodSet {
    enabled: [bool; DiffMethod::ALL.len()],
}

impl MethodSet {
    pub fn all() -> Self {
        Self {
            enabled: [true; DiffMethod::ALL.len()],
        }
    }

    pub fn none() -> Self {
        Self {
            enabled: [false; DiffMethod::ALL.len()],
        }
    }

    pub fn from_methods(methods: &[DiffMethod]) -> Self {
        let mut set = Self::none();
        for &m in methods {
            set.set(m, true);
        }
        set
    }

    pub fn set(&mut self, method: DiffMethod, on: bool) {
        self.enabled[index_of(method)] = on;
    }

    pub fn is_enabled(&self, method: DiffMethod) -> bool {
        self.enabled[index_of(method)]
    }

    pub fn iter_enabled(&self) -> impl Iterator<Item = DiffMethod> + '_ {
        DiffMethod::ALL.into_iter().filter(|&m| self.is_enabled(m))
    }

    pub fn count(&self) -> usize {
        self.enabled.iter().filter(|&&e| e).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

fn index_of(method: DiffMethod) -> usize {
    DiffMethod::ALL
        .iter()
        .position(|&m| m == method)
        .expect("method is in ALL")
}

/// Percentage reported by one enabled method.
#[derive(Clone, Debug, Serialize)]
pub struct MethodResult {
    pub method: DiffMethod,
    pub percent: f64,
}

/// Fresh snapshot of one evaluation tick. Never merged with prior reports.
#[derive(Clone, Debug, Serialize)]
pub struct FusionReport {
    /// Results for the enabled methods, in fixed method order.
    pub methods: Vec<MethodResult>,
    /// Arithmetic mean over the enabled methods; absent when none ran.
    pub mean: Option<f64>,
}

impl FusionReport {
    pub fn percent_for(&self, method: DiffMethod) -> Option<f64> {
        self.methods
            .iter()
            .find(|r| r.method == method)
            .map(|r| r.percent)
    }
}

/// Runs the enabled algorithms and fuses their outputs.
pub struct FusionEngine {
    enabled: MethodSet,
}

impl FusionEngine {
    pub fn new(enabled: MethodSet) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> MethodSet {
        self.enabled
    }

    /// Evaluate one (baseline, current) pair.
    ///
    /// Fails on the first algorithm error (dimension mismatch is a contract
    /// violation at the call site); the caller aborts the tick. Callers must
    /// check baseline presence before calling.
    pub fn evaluate(&self, baseline: &ImageFrame, current: &ImageFrame) -> Result<FusionReport> {
        let mut methods = Vec::with_capacity(self.enabled.count());
        for method in self.enabled.iter_enabled() {
            let output = detect::run(method, baseline, current)?;
            methods.push(MethodResult {
                method,
                percent: output.percent,
            });
        }
        let mean = if methods.is_empty() {
            None
        } else {
            Some(methods.iter().map(|r| r.percent).sum::<f64>() / methods.len() as f64)
        };
        Ok(FusionReport { methods, mean })
    }
}

/// Render a report as the downstream free-space block.
///
/// Every method appears, enabled ones with their percentage and disabled
/// ones marked DISABLED; the final line carries the mean or the N/A marker.
/// These exact label strings are consumed by external collaborators.
pub fn render_report(report: &FusionReport) -> String {
    let mut out = String::new();
    out.push_str(REPORT_HEADER);
    for method in DiffMethod::ALL {
        match report.percent_for(method) {
            Some(percent) => {
                let _ = write!(out, "\n{}: {:.2}%", method.label(), percent);
            }
            None => {
                let _ = write!(out, "\n{}: DISABLED", method.label());
            }
        }
    }
    match report.mean {
        Some(mean) => {
            let _ = write!(out, "\nMean of Enabled Methods: {:.2}%", mean);
        }
        None => out.push_str("\nMean of Enabled Methods: N/A (all methods disabled)"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_is_arithmetic_over_enabled_set() {
        let report = FusionReport {
            methods: vec![
                MethodResult {
                    method: DiffMethod::FrameDiff,
                    percent: 10.0,
                },
                MethodResult {
                    method: DiffMethod::Contour,
                    percent: 30.0,
                },
            ],
            mean: Some(20.0),
        };
        assert_eq!(report.percent_for(DiffMethod::FrameDiff), Some(10.0));
        assert_eq!(report.percent_for(DiffMethod::Ssim), None);
        assert_eq!(report.mean, Some(20.0));
    }

    #[test]
    fn evaluate_black_frames_reports_zero_everywhere() {
        let black = ImageFrame::solid(40, 30, [0, 0, 0]);
        let engine = FusionEngine::new(MethodSet::all());
        let report = engine.evaluate(&black, &black).expect("evaluate");

        assert_eq!(report.methods.len(), 4);
        for result in &report.methods {
            assert_eq!(result.percent, 0.0, "{:?}", result.method);
        }
        assert_eq!(report.mean, Some(0.0));
    }

    #[test]
    fn evaluate_mean_matches_enabled_subset() {
        let baseline = ImageFrame::solid(80, 60, [0, 0, 0]);
        let current = baseline.with_block(0, 0, 40, 30, [255, 255, 255]);
        let set = MethodSet::from_methods(&[DiffMethod::FrameDiff, DiffMethod::BackgroundSub]);
        let report = FusionEngine::new(set)
            .evaluate(&baseline, &current)
            .expect("evaluate");

        assert_eq!(report.methods.len(), 2);
        let expected = (report.methods[0].percent + report.methods[1].percent) / 2.0;
        assert_eq!(report.mean, Some(expected));
    }

    #[test]
    fn empty_set_has_absent_mean() {
        let black = ImageFrame::solid(8, 8, [0, 0, 0]);
        let report = FusionEngine::new(MethodSet::none())
            .evaluate(&black, &black)
            .expect("evaluate");
        assert!(report.methods.is_empty());
        assert_eq!(report.mean, None);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let baseline = ImageFrame::solid(32, 24, [10, 20, 30]);
        let current = baseline.with_block(4, 4, 10, 10, [200, 10, 10]);
        let engine = FusionEngine::new(MethodSet::all());

        let a = engine.evaluate(&baseline, &current).expect("evaluate");
        let b = engine.evaluate(&baseline, &current).expect("evaluate");
        for (ra, rb) in a.methods.iter().zip(b.methods.iter()) {
            assert_eq!(ra.percent, rb.percent);
        }
        assert_eq!(a.mean, b.mean);
    }

    #[test]
    fn render_produces_exact_wire_block() {
        let report = FusionReport {
            methods: vec![
                MethodResult {
                    method: DiffMethod::FrameDiff,
                    percent: 12.3456,
                },
                MethodResult {
                    method: DiffMethod::Ssim,
                    percent: 4.0,
                },
            ],
            mean: Some(8.1728),
        };
        let block = render_report(&report);
        assert_eq!(
            block,
            "=== Free Space Detection Results ===\n\
             Frame Differencing: 12.35%\n\
             Background Subtraction: DISABLED\n\
             Contour Detection: DISABLED\n\
             SSIM: 4.00%\n\
             Mean of Enabled Methods: 8.17%"
        );
    }

    #[test]
    fn render_all_disabled_uses_na_marker() {
        let report = FusionReport {
            methods: vec![],
            mean: None,
        };
        let block = render_report(&report);
        assert!(block.ends_with("Mean of Enabled Methods: N/A (all methods disabled)"));
        assert!(block.contains("Frame Differencing: DISABLED"));
    }
}
