//! Contour detection.
//!
//! Thresholds the frame difference like frame differencing, then traces the
//! external boundary of every 8-connected changed region and reports the
//! total polygon area of those boundaries over the frame area. Area here is
//! geometric (shoelace over the traced boundary), not a pixel count, so this
//! method can diverge from the pixel-count methods on sparse, large-area
//! changes.

use anyhow::Result;

use crate::detect::{
    absdiff_gray, ensure_same_dimensions, frame_diff::DIFF_THRESHOLD, threshold_binary,
    MethodOutput,
};
use crate::frame::ImageFrame;

pub fn detect(baseline: &ImageFrame, current: &ImageFrame) -> Result<MethodOutput> {
    ensure_same_dimensions(baseline, current)?;

    let diff = absdiff_gray(baseline, current);
    let mask = threshold_binary(&diff, DIFF_THRESHOLD);
    let width = baseline.width() as usize;
    let height = baseline.height() as usize;

    let total_area: f64 = external_contours(&mask, width, height)
        .iter()
        .map(|contour| shoelace_area(contour))
        .sum();
    let percent = total_area / baseline.pixel_count() as f64 * 100.0;
    Ok(MethodOutput { percent, mask })
}

/// Trace the external boundary of every 8-connected foreground region.
///
/// Returns one boundary polygon per region, in pixel coordinates, ordered
/// along the boundary.
fn external_contours(mask: &[u8], width: usize, height: usize) -> Vec<Vec<(i64, i64)>> {
    let mut visited = vec![false; mask.len()];
    let mut contours = Vec::new();

    for start in 0..mask.len() {
        if mask[start] == 0 || visited[start] {
            continue;
        }
        // Row-major scan order makes `start` the topmost-leftmost pixel of
        // an unvisited region; flood the whole region so it is traced once.
        flood_mark(mask, width, height, start, &mut visited);
        let x = (start % width) as i64;
        let y = (start / width) as i64;
        contours.push(trace_boundary(mask, width, height, (x, y)));
    }
    contours
}

/// Mark every pixel 8-connected to `start` as visited.
fn flood_mark(mask: &[u8], width: usize, height: usize, start: usize, visited: &mut [bool]) {
    let mut stack = vec![start];
    visited[start] = true;
    while let Some(idx) = stack.pop() {
        let x = (idx % width) as i64;
        let y = (idx / width) as i64;
        for dy in -1..=1i64 {
            for dx in -1..=1i64 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let nidx = ny as usize * width + nx as usize;
                if mask[nidx] != 0 && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            }
        }
    }
}

/// Moore neighborhood in clockwise order starting from West.
const MOORE: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

fn direction_index(delta: (i64, i64)) -> usize {
    MOORE
        .iter()
        .position(|&d| d == delta)
        .expect("delta is a Moore neighbor offset")
}

fn is_foreground(mask: &[u8], width: usize, height: usize, p: (i64, i64)) -> bool {
    p.0 >= 0
        && p.1 >= 0
        && p.0 < width as i64
        && p.1 < height as i64
        && mask[p.1 as usize * width + p.0 as usize] != 0
}

/// Moore-neighbor boundary trace from the topmost-leftmost pixel of a region.
///
/// The start pixel is entered from its West neighbor, which is guaranteed
/// background (or out of bounds) by the scan order. Terminates when the trace
/// is back at the start pixel and about to repeat its first step.
fn trace_boundary(mask: &[u8], width: usize, height: usize, start: (i64, i64)) -> Vec<(i64, i64)> {
    let mut boundary = vec![start];
    let mut current = start;
    let mut backtrack = (start.0 - 1, start.1);
    let mut first_step: Option<(i64, i64)> = None;

    // A boundary never exceeds the pixel count; the cap only guards against
    // a malformed mask mutating under us.
    let max_steps = 4 * mask.len() + 8;
    for _ in 0..max_steps {
        let entry = direction_index((backtrack.0 - current.0, backtrack.1 - current.1));
        let mut next = None;
        let mut previous = backtrack;
        for k in 1..=8 {
            let dir = MOORE[(entry + k) % 8];
            let candidate = (current.0 + dir.0, current.1 + dir.1);
            if is_foreground(mask, width, height, candidate) {
                next = Some((candidate, previous));
                break;
            }
            previous = candidate;
        }

        let Some((next_pixel, next_backtrack)) = next else {
            // Isolated pixel: the boundary is the pixel itself.
            break;
        };
        if current == start {
            match first_step {
                None => first_step = Some(next_pixel),
                Some(step) if step == next_pixel => break,
                Some(_) => {}
            }
        }
        boundary.push(next_pixel);
        current = next_pixel;
        backtrack = next_backtrack;
    }
    boundary
}

/// Polygon area via the shoelace formula over boundary pixel centers.
fn shoelace_area(points: &[(i64, i64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut doubled = 0i64;
    for i in 0..points.len() {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % points.len()];
        doubled += x0 * y1 - x1 * y0;
    }
    doubled.abs() as f64 / 2.0
}
