//! Scan buffer lifecycle: allocation, clearing, reset points, copies.

use log::debug;

use super::atlas::{MaterialId, NO_MATERIAL};
use super::heap::MinHeap;
use super::switch::{SwitchPoint, MAX_WIDTH};
use super::RasterError;

/// Ordered switch points for one y-row.
///
/// Points are appended in primitive-emission order; the render pass sorts a
/// scratch copy, so the stored order doubles as an undo log: truncating to
/// `reset_mark` rolls the line back.
#[derive(Debug, Default)]
pub struct ScanLine {
    points: Vec<SwitchPoint>,
    reset_mark: usize,
    dirty: bool,
}

impl ScanLine {
    /// Number of switch points currently on the line.
    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[SwitchPoint] {
        &self.points
    }

    pub fn reset_mark(&self) -> usize {
        self.reset_mark
    }

    /// Whether the line changed since it was last rendered.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_clean(&mut self) {
        self.dirty = false;
    }
}

/// A frame's worth of scanlines plus the scratch the renderer needs.
///
/// The two spare lines are the merge-sort ping/pong buffers and the two heaps
/// are the compositor's working set; they are owned here so that rendering
/// the same buffer repeatedly never allocates.  If rendering is ever spread
/// across workers, each worker needs its own spares and heaps.
#[derive(Debug)]
pub struct ScanBuffer {
    width: usize,
    height: usize,
    line_capacity: usize,
    pub(crate) lines: Vec<ScanLine>,
    pub(crate) spare_a: Vec<SwitchPoint>,
    pub(crate) spare_b: Vec<SwitchPoint>,
    pub(crate) p_heap: MinHeap,
    pub(crate) r_heap: MinHeap,
}

impl ScanBuffer {
    /// Allocate a buffer for a `width` x `height` surface.  Every line gets
    /// room for `2 * width` switch points.
    pub fn new(width: usize, height: usize) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::ZeroDimension(width, height));
        }
        if width > MAX_WIDTH {
            return Err(RasterError::WidthTooLarge(width));
        }

        let line_capacity = width * 2;
        let mut lines = Vec::with_capacity(height);
        for _ in 0..height {
            lines.push(ScanLine {
                points: Vec::with_capacity(line_capacity),
                reset_mark: 0,
                dirty: true,
            });
        }

        debug!("scan buffer {width}x{height}, {line_capacity} points per line");
        Ok(ScanBuffer {
            width,
            height,
            line_capacity,
            lines,
            spare_a: vec![SwitchPoint::default(); line_capacity],
            spare_b: vec![SwitchPoint::default(); line_capacity],
            p_heap: MinHeap::with_capacity(line_capacity),
            r_heap: MinHeap::with_capacity(line_capacity),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn line(&self, y: usize) -> &ScanLine {
        &self.lines[y]
    }

    /// Append a switch point at an exact position, clipped to bounds.
    ///
    /// Rows outside the buffer are skipped; x is clamped to 0 on the left and
    /// dropped past `width` on the right.  A full line drops the point, never
    /// leaving a half-inserted state.
    pub fn set_switch_point(&mut self, x: i32, y: i32, id: MaterialId, on: bool) {
        if y < 0 || y >= self.height as i32 {
            return;
        }
        if x > self.width as i32 {
            return;
        }
        let line = &mut self.lines[y as usize];
        if line.points.len() >= self.line_capacity {
            return; // full
        }
        line.points.push(SwitchPoint::new(x.max(0) as u32, id, on));
        line.dirty = true;
    }

    /// Wipe all drawing, ready for the next frame.  Do this *after* the
    /// buffer has been rendered.
    pub fn clear(&mut self) {
        for line in &mut self.lines {
            line.points.clear();
            line.reset_mark = 0;
            line.dirty = true;
        }
    }

    /// Capture the current fill of every line so [`Self::reset`] can return
    /// to it.  Typical use: draw a static background once, set the reset
    /// point, then reset-and-redraw a cheap overlay every frame.
    pub fn set_reset_point(&mut self) {
        for line in &mut self.lines {
            line.reset_mark = line.points.len();
        }
    }

    /// Roll every line back to its reset mark.
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.points.truncate(line.reset_mark);
            line.dirty = true;
        }
    }

    /// Clear a single line, dropping its reset mark too.
    pub fn reset_line(&mut self, y: usize) {
        if y >= self.height {
            return;
        }
        let line = &mut self.lines[y];
        line.points.clear();
        line.reset_mark = 0;
        line.dirty = true;
    }

    /// Clear a single line and give it a fresh background material.
    pub fn reset_line_to_material(&mut self, y: usize, id: MaterialId) {
        if y >= self.height {
            return;
        }
        self.reset_line(y);
        if id != NO_MATERIAL {
            self.set_switch_point(0, y as i32, id, true);
        }
    }

    /// Exchange two rows (both become dirty).
    pub fn swap_lines(&mut self, a: usize, b: usize) {
        if a >= self.height || b >= self.height {
            return;
        }
        self.lines.swap(a, b);
        self.lines[a].dirty = true;
        self.lines[b].dirty = true;
    }

    /// Replace this buffer's drawing with `src`'s.  The buffers should be the
    /// same size; excess rows or points beyond this buffer's capacity are
    /// dropped.
    pub fn copy_from(&mut self, src: &ScanBuffer) {
        let rows = self.height.min(src.height);
        for y in 0..rows {
            let from = &src.lines[y];
            let to = &mut self.lines[y];
            let n = from.points.len().min(self.line_capacity);
            to.points.clear();
            to.points.extend_from_slice(&from.points[..n]);
            to.reset_mark = from.reset_mark.min(n);
            to.dirty = from.dirty;
        }
    }
}
