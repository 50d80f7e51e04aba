use std::fs;
use std::path::PathBuf;

use image::{Rgba, RgbaImage};
use indicatif::ProgressBar;
use itertools::iproduct;
use rayon::prelude::*;

use crate::grid::{self, GridSnapshot};
use crate::sim::{SimError, TravelerStatus};

/// Marker drawn over the cell a live traveler occupies.
const TRAVELER_MARK: Rgba<u8> = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);

fn cell_pixel(cell: u32) -> Rgba<u8> {
    Rgba(grid::unpack(cell))
}

/// Expand each grid cell of a snapshot into a `cell_px`-sided square of
/// pixels.
pub fn render_grid(snapshot: &GridSnapshot, cell_px: u32) -> RgbaImage {
    let mut image = RgbaImage::new(
        snapshot.cols() as u32 * cell_px,
        snapshot.rows() as u32 * cell_px,
    );
    for (row, col) in iproduct!(0..snapshot.rows(), 0..snapshot.cols()) {
        let pixel = cell_pixel(snapshot.cell(row, col));
        for (dy, dx) in iproduct!(0..cell_px, 0..cell_px) {
            image.put_pixel(col as u32 * cell_px + dx, row as u32 * cell_px + dy, pixel);
        }
    }
    image
}

/// Like [`render_grid`], with a marker square over every live traveler.
pub fn render_grid_with_travelers(
    snapshot: &GridSnapshot,
    travelers: &[TravelerStatus],
    cell_px: u32,
) -> RgbaImage {
    let mut image = render_grid(snapshot, cell_px);
    let margin = cell_px / 4;
    for status in travelers.iter().filter(|status| status.live) {
        let left = status.col as u32 * cell_px;
        let top = status.row as u32 * cell_px;
        for (dy, dx) in iproduct!(margin..cell_px - margin, margin..cell_px - margin) {
            image.put_pixel(left + dx, top + dy, TRAVELER_MARK);
        }
    }
    image
}

/// One loggable line of simulation counters.
pub fn format_state(live: usize, levels: [u32; 3]) -> String {
    format!(
        "live travelers: {:2}  ink r/g/b: {:2}/{:2}/{:2}",
        live, levels[0], levels[1], levels[2]
    )
}

/// One recorded display refresh: the grid, the roster, and the counters as
/// they stood at a single instant.
#[derive(Debug, Clone)]
pub struct Frame {
    pub iteration: usize,
    pub snapshot: GridSnapshot,
    pub travelers: Vec<TravelerStatus>,
    pub live: usize,
    pub levels: [u32; 3],
}

/// Collects frames while the simulation runs and renders them all to
/// numbered PNG files afterwards.
#[derive(Debug)]
pub struct FrameRecorder {
    frames: Vec<Frame>,
    cell_px: u32,
    out_dir: PathBuf,
}

impl FrameRecorder {
    pub fn new(out_dir: impl Into<PathBuf>, cell_px: u32) -> Self {
        FrameRecorder {
            frames: Vec::new(),
            cell_px,
            out_dir: out_dir.into(),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Render every recorded frame to `out_dir/frame_NNNN.png`.
    pub fn render_all(&self) -> Result<(), SimError> {
        fs::create_dir_all(&self.out_dir)?;
        let bar = ProgressBar::new(self.frames.len() as u64);
        self.frames
            .par_iter()
            .try_for_each(|frame| -> Result<(), SimError> {
                let image =
                    render_grid_with_travelers(&frame.snapshot, &frame.travelers, self.cell_px);
                let path = self.out_dir.join(format!("frame_{:04}.png", frame.iteration));
                image.save(&path)?;
                bar.inc(1);
                Ok(())
            })?;
        bar.finish();
        Ok(())
    }
}
