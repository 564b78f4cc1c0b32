//! Software 2-D renderer built on per-scanline *switch points*.
//!
//! Instead of overdrawing filled areas, every primitive contributes a pair of
//! x-ordered on/off events per scanline it touches.  A depth-priority sweep
//! resolves the final colour of each pixel in one left-to-right pass, so the
//! cost of a shape is proportional to its perimeter, not its area.
//!
//! * [`raster`]: the scan buffer, primitive rasterisation, texture atlas and
//!   the dual-heap compositor.
//! * [`pipeline`]: double-buffered draw/render frame pipeline for driving a
//!   window surface from two threads.

pub mod pipeline;
pub mod raster;
