//! Image frames and frame sources.
//!
//! This module provides the fixed-size RGB frame container the difference
//! algorithms consume, plus sources that produce frames:
//! - Synthetic source (`stub://` URLs, testing and bring-up)
//! - JPEG directory replay (feature: ingest-file)
//!
//! Real camera drivers are external collaborators; the core only consumes
//! "current frame" and "baseline frame". Matching dimensions between the two
//! are the caller's contract: every algorithm checks and fails loudly on a
//! mismatch rather than guessing.

use anyhow::{anyhow, Result};

/// Opaque fixed-size RGB8 pixel buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ImageFrame {
    /// Wrap an RGB8 buffer. The buffer length must be `width * height * 3`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer length {} does not match {}x{} RGB ({} bytes)",
                data.len(),
                width,
                height,
                expected
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Copy of this frame with an axis-aligned block painted over it.
    /// The block is clipped to the frame bounds.
    pub fn with_block(&self, x0: u32, y0: u32, bw: u32, bh: u32, rgb: [u8; 3]) -> Self {
        let mut out = self.clone();
        let x1 = (x0 + bw).min(self.width);
        let y1 = (y0 + bh).min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y as usize * self.width as usize + x as usize) * 3;
                out.data[i..i + 3].copy_from_slice(&rgb);
            }
        }
        out
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB8 pixel data, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total pixel count.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn same_dimensions(&self, other: &ImageFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct FrameStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Periodic image producer.
pub trait FrameSource: Send {
    /// Capture the next frame. An error means this sample is skipped; the
    /// consumer retains the previous frame.
    fn next_frame(&mut self) -> Result<ImageFrame>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> FrameStats;
}

/// Open a frame source by URL.
///
/// `stub://` yields the synthetic source; `dir://<path>` replays JPEG files
/// from a directory when the `ingest-file` feature is enabled.
pub fn open_frame_source(url: &str, width: u32, height: u32) -> Result<Box<dyn FrameSource>> {
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(url, width, height)));
    }
    #[cfg(feature = "ingest-file")]
    if let Some(dir) = url.strip_prefix("dir://") {
        return Ok(Box::new(file::FileSource::open(std::path::Path::new(dir))?));
    }
    Err(anyhow!("unsupported frame source url: {}", url))
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and bring-up
// ----------------------------------------------------------------------------

/// Deterministic synthetic frame generator.
///
/// Simulates a mostly-static scene whose content shifts every 50 frames, so
/// a baseline captured early will eventually diverge from current frames.
pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(url: &str, width: u32, height: u32) -> Self {
        Self {
            url: url.to_string(),
            width,
            height,
            frame_count: 0,
            scene_state: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<ImageFrame> {
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let pixel_count = self.width as usize * self.height as usize * 3;
        let mut data = vec![0u8; pixel_count];
        for (i, px) in data.iter_mut().enumerate() {
            *px = ((i as u64 + self.scene_state as u64 * 64) % 256) as u8;
        }
        ImageFrame::new(self.width, self.height, data)
    }

    fn stats(&self) -> FrameStats {
        FrameStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// JPEG directory replay
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-file")]
pub mod file {
    use super::{FrameSource, FrameStats, ImageFrame};
    use anyhow::{anyhow, Context, Result};
    use std::path::{Path, PathBuf};

    /// Replays the JPEG files of a directory in name order, looping.
    pub struct FileSource {
        paths: Vec<PathBuf>,
        next: usize,
        frames_captured: u64,
        description: String,
    }

    impl FileSource {
        pub fn open(dir: &Path) -> Result<Self> {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
                .with_context(|| format!("failed to read frame directory {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
                        .unwrap_or(false)
                })
                .collect();
            paths.sort();
            if paths.is_empty() {
                return Err(anyhow!("no JPEG frames in {}", dir.display()));
            }
            Ok(Self {
                paths,
                next: 0,
                frames_captured: 0,
                description: format!("dir://{}", dir.display()),
            })
        }
    }

    impl FrameSource for FileSource {
        fn next_frame(&mut self) -> Result<ImageFrame> {
            let path = &self.paths[self.next];
            self.next = (self.next + 1) % self.paths.len();

            let img = image::open(path)
                .with_context(|| format!("failed to decode {}", path.display()))?
                .into_rgb8();
            self.frames_captured += 1;
            ImageFrame::new(img.width(), img.height(), img.into_raw())
        }

        fn stats(&self) -> FrameStats {
            FrameStats {
                frames_captured: self.frames_captured,
                source: self.description.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_buffer_length() {
        assert!(ImageFrame::new(2, 2, vec![0u8; 11]).is_err());
        assert!(ImageFrame::new(2, 2, vec![0u8; 12]).is_ok());
    }

    #[test]
    fn solid_and_block_constructors() {
        let black = ImageFrame::solid(4, 4, [0, 0, 0]);
        assert_eq!(black.pixel_count(), 16);
        assert!(black.data().iter().all(|&b| b == 0));

        let blocked = black.with_block(0, 0, 2, 2, [255, 255, 255]);
        let white_pixels = blocked.data().chunks(3).filter(|px| px[0] == 255).count();
        assert_eq!(white_pixels, 4);
    }

    #[test]
    fn block_is_clipped_to_bounds() {
        let frame = ImageFrame::solid(4, 4, [0, 0, 0]).with_block(3, 3, 10, 10, [255, 0, 0]);
        let painted = frame.data().chunks(3).filter(|px| px[0] == 255).count();
        assert_eq!(painted, 1);
    }

    #[test]
    fn synthetic_source_produces_matching_dimensions() -> Result<()> {
        let mut source = SyntheticSource::new("stub://webcam", 64, 48);
        let a = source.next_frame()?;
        let b = source.next_frame()?;
        assert_eq!(a.width(), 64);
        assert_eq!(a.height(), 48);
        assert!(a.same_dimensions(&b));
        // Consecutive frames within one scene state are identical.
        assert_eq!(a, b);
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn synthetic_scene_shifts_every_fifty_frames() -> Result<()> {
        let mut source = SyntheticSource::new("stub://webcam", 16, 16);
        let first = source.next_frame()?;
        let mut last = first.clone();
        for _ in 0..60 {
            last = source.next_frame()?;
        }
        assert_ne!(first, last);
        Ok(())
    }

    #[test]
    fn open_frame_source_rejects_unknown_scheme() {
        assert!(open_frame_source("rtsp://camera", 640, 480).is_err());
        assert!(open_frame_source("stub://webcam", 640, 480).is_ok());
    }
}
