//! Double-buffered draw/render frame pipeline.
//!
//! Two [`Frame`]s circulate between a draw thread (the producer) and whoever
//! owns the window surface (the consumer).  A rendezvous channel of depth one
//! is the only synchronisation: while a frame sits in the channel or with the
//! consumer, the producer keeps composing into the frame it still owns, so a
//! slow renderer never blocks drawing; the producer just overwrites its own
//! frame again.  Ownership moves wholesale, which is also what makes the
//! shared-nothing atlas handling sound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use log::{debug, info, warn};
use thiserror::Error;

use crate::raster::{RasterError, Rgba, ScanBuffer, TextureAtlas};

/// Things that can go wrong while bringing the pipeline up.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error("failed to spawn the draw thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

bitflags! {
    /// Switches that alter how the pipeline runs.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PipelineFlags: u32 {
        /// Pace the producer to the frame-time target instead of flat out.
        const FRAME_LIMIT = 1;
        /// Compose and render on separate threads.
        const MULTI_THREAD = 1 << 1;
        /// Carry the outgoing frame's drawing over into the next one, so the
        /// draw callback may redraw incrementally instead of fully.
        const COPY_SCAN_BUFFERS = 1 << 2;
        /// Demo convenience: keep the last image up until the window closes.
        const WAIT_AT_END = 1 << 3;
    }
}

/// Pipeline construction parameters.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub width: usize,
    pub height: usize,
    /// 32-bit textel capacity of each frame's atlas.
    pub textel_space: usize,
    /// Budget per frame; drives producer pacing and interlace catch-up.
    pub frame_time_target: Duration,
    pub flags: PipelineFlags,
}

impl PipelineConfig {
    pub fn new(width: usize, height: usize) -> Self {
        PipelineConfig {
            width,
            height,
            textel_space: 1 << 16,
            frame_time_target: Duration::from_millis(15),
            flags: PipelineFlags::FRAME_LIMIT | PipelineFlags::MULTI_THREAD,
        }
    }
}

/// Everything the draw callback composes into: a scan buffer and the atlas
/// its material ids refer to.  The pair travels between threads as one unit.
pub struct Frame {
    pub scan: ScanBuffer,
    pub atlas: TextureAtlas,
}

impl Frame {
    pub fn new(width: usize, height: usize, textel_space: usize) -> Result<Self, RasterError> {
        Ok(Frame {
            scan: ScanBuffer::new(width, height)?,
            atlas: TextureAtlas::new(textel_space),
        })
    }

    fn copy_from(&mut self, src: &Frame) {
        self.scan.copy_from(&src.scan);
        self.atlas.copy_from(&src.atlas);
    }
}

/// Per-frame context handed to the draw callback.
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    /// Running composition count.
    pub index: u64,
    /// Wall-clock cost of the previous composition.
    pub last_draw_time: Duration,
}

/// Counters the consumer can inspect or log.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub frames_rendered: u64,
    /// Frames whose second interlace pass missed the time budget.
    pub interlace_skips: u64,
}

type DrawFn = Box<dyn FnMut(&mut Frame, FrameInfo) + Send>;

enum Mode {
    /// Producer thread feeds frames through a rendezvous channel.
    Threaded {
        frames: Receiver<Frame>,
        returns: Sender<Frame>,
        producer: Option<JoinHandle<()>>,
    },
    /// Compose and render on the caller's thread.
    Inline {
        frame: Box<Frame>,
        draw: DrawFn,
        index: u64,
        last_draw_time: Duration,
    },
}

/// The consumer half of the pipeline; create with [`FramePipeline::spawn`].
pub struct FramePipeline {
    mode: Mode,
    quit: Arc<AtomicBool>,
    draw_done: Arc<AtomicBool>,
    frame_time_target: Duration,
    stats: PipelineStats,
}

impl FramePipeline {
    /// Build the pipeline and, in multi-thread mode, start the draw thread.
    pub fn spawn(
        config: PipelineConfig,
        mut draw: impl FnMut(&mut Frame, FrameInfo) + Send + 'static,
    ) -> Result<Self, PipelineError> {
        let quit = Arc::new(AtomicBool::new(false));
        let draw_done = Arc::new(AtomicBool::new(false));

        if !config.flags.contains(PipelineFlags::MULTI_THREAD) {
            let frame = Frame::new(config.width, config.height, config.textel_space)?;
            info!("pipeline running inline at {}x{}", config.width, config.height);
            return Ok(FramePipeline {
                mode: Mode::Inline {
                    frame: Box::new(frame),
                    draw: Box::new(draw),
                    index: 0,
                    last_draw_time: Duration::ZERO,
                },
                quit,
                draw_done,
                frame_time_target: config.frame_time_target,
                stats: PipelineStats::default(),
            });
        }

        let mut writing = Frame::new(config.width, config.height, config.textel_space)?;
        let frame_b = Frame::new(config.width, config.height, config.textel_space)?;

        let (frames_tx, frames_rx) = mpsc::sync_channel::<Frame>(1);
        let (returns_tx, returns_rx) = mpsc::channel::<Frame>();

        let producer_quit = Arc::clone(&quit);
        let producer_done = Arc::clone(&draw_done);
        let flags = config.flags;
        let target = config.frame_time_target;

        let producer = thread::Builder::new()
            .name("switchline-draw".into())
            .spawn(move || {
                let mut spare = Some(frame_b);
                let mut index = 0;
                let mut last_draw_time = Duration::ZERO;

                while !producer_quit.load(Ordering::Acquire) {
                    let t0 = Instant::now();
                    draw(&mut writing, FrameInfo { index, last_draw_time });
                    index += 1;

                    if spare.is_none() {
                        // reclaim a frame the consumer has finished with
                        spare = returns_rx.try_recv().ok();
                    }
                    if let Some(mut next) = spare.take() {
                        if flags.contains(PipelineFlags::COPY_SCAN_BUFFERS) {
                            next.copy_from(&writing);
                        }
                        match frames_tx.try_send(writing) {
                            Ok(()) => writing = next,
                            Err(TrySendError::Full(w)) => {
                                // consumer has not caught up: keep the frame
                                // and compose over it again
                                writing = w;
                                spare = Some(next);
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    }

                    last_draw_time = t0.elapsed();
                    if flags.contains(PipelineFlags::FRAME_LIMIT) && last_draw_time < target {
                        thread::sleep(target - last_draw_time);
                    }
                }
                producer_done.store(true, Ordering::Release);
                debug!("draw thread exiting after {index} compositions");
            })?;

        info!(
            "pipeline running threaded at {}x{}, target {:?}",
            config.width, config.height, config.frame_time_target
        );
        Ok(FramePipeline {
            mode: Mode::Threaded {
                frames: frames_rx,
                returns: returns_tx,
                producer: Some(producer),
            },
            quit,
            draw_done,
            frame_time_target: config.frame_time_target,
            stats: PipelineStats::default(),
        })
    }

    /// Render the next composition into `pixels` (row-major 0x00RRGGBB).
    ///
    /// Renders interlaced: the parity half first, then the other half if the
    /// frame budget allows, otherwise that half keeps last frame's pixels and
    /// the skip counter increments.  Returns `false` when no new composition
    /// arrived within the frame budget.
    pub fn render_next(&mut self, pixels: &mut [Rgba]) -> bool {
        let target = self.frame_time_target;
        match &mut self.mode {
            Mode::Inline {
                frame,
                draw,
                index,
                last_draw_time,
            } => {
                let t0 = Instant::now();
                draw(
                    frame,
                    FrameInfo {
                        index: *index,
                        last_draw_time: *last_draw_time,
                    },
                );
                *index += 1;
                frame.scan.render_to_frame(&frame.atlas, pixels, 0, 0);
                *last_draw_time = t0.elapsed();
                self.stats.frames_rendered += 1;
                true
            }
            Mode::Threaded { frames, returns, .. } => {
                let mut frame = match frames.recv_timeout(target) {
                    Ok(frame) => frame,
                    Err(RecvTimeoutError::Timeout) => return false,
                    Err(RecvTimeoutError::Disconnected) => return false,
                };

                let t0 = Instant::now();
                let start = (self.stats.frames_rendered & 1) as usize;
                frame.scan.render_to_frame(&frame.atlas, pixels, start, 1);
                if t0.elapsed() <= target {
                    frame.scan.render_to_frame(&frame.atlas, pixels, start ^ 1, 1);
                } else {
                    self.stats.interlace_skips += 1;
                }
                self.stats.frames_rendered += 1;

                // hand the frame back; if the producer is gone the drop is fine
                let _ = returns.send(frame);
                true
            }
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// True once the draw thread has left its loop.
    pub fn is_draw_done(&self) -> bool {
        self.draw_done.load(Ordering::Acquire)
    }

    /// Stop the draw thread and collect final counters.
    pub fn shutdown(mut self) -> PipelineStats {
        self.stop();
        info!(
            "pipeline stopped: {} frames, {} interlace skips",
            self.stats.frames_rendered, self.stats.interlace_skips
        );
        self.stats
    }

    fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Mode::Threaded {
            frames, producer, ..
        } = &mut self.mode
        {
            // drain so a frame in flight does not wedge the channel
            while frames.try_recv().is_ok() {}
            if let Some(handle) = producer.take() {
                if handle.join().is_err() {
                    warn!("draw thread panicked");
                }
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 16;
    const H: usize = 8;

    fn config(flags: PipelineFlags) -> PipelineConfig {
        PipelineConfig {
            textel_space: 64,
            flags,
            ..PipelineConfig::new(W, H)
        }
    }

    fn draw_rect(frame: &mut Frame, _info: FrameInfo) {
        frame.scan.clear();
        frame.atlas.reset();
        if let Ok(mat) = frame.atlas.set_single_color_material(1, 0xFF8800) {
            frame.scan.fill_rect(2, 2, 10, 6, mat);
        }
    }

    #[test]
    fn inline_mode_matches_direct_render() {
        let mut pipeline =
            FramePipeline::spawn(config(PipelineFlags::empty()), draw_rect).unwrap();
        let mut pixels = vec![0u32; W * H];
        assert!(pipeline.render_next(&mut pixels));
        assert_eq!(pipeline.stats().frames_rendered, 1);

        let mut frame = Frame::new(W, H, 64).unwrap();
        draw_rect(&mut frame, FrameInfo { index: 0, last_draw_time: Duration::ZERO });
        let mut direct = vec![0u32; W * H];
        frame.scan.render_to_frame(&frame.atlas, &mut direct, 0, 0);

        assert_eq!(pixels, direct);
    }

    #[test]
    fn threaded_mode_delivers_frames() {
        let mut pipeline =
            FramePipeline::spawn(config(PipelineFlags::MULTI_THREAD), draw_rect).unwrap();
        let mut pixels = vec![0u32; W * H];

        // the producer may need a moment to publish its first frame, and an
        // interlaced render needs two passes to guarantee any given row
        let mut rendered = 0;
        for _ in 0..200 {
            if pipeline.render_next(&mut pixels) {
                rendered += 1;
            }
            if rendered >= 3 && pixels[3 * W + 3] == 0xFF8800 {
                break;
            }
        }
        assert!(rendered >= 1, "no frame arrived");
        assert_eq!(pixels[3 * W + 3], 0xFF8800);

        let stats = pipeline.shutdown();
        assert!(stats.frames_rendered >= 1);
    }

    #[test]
    fn draw_callback_sees_advancing_index() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut pipeline = FramePipeline::spawn(
            config(PipelineFlags::empty()),
            move |frame, info| {
                sink.lock().unwrap().push(info.index);
                draw_rect(frame, info);
            },
        )
        .unwrap();

        let mut pixels = vec![0u32; W * H];
        pipeline.render_next(&mut pixels);
        pipeline.render_next(&mut pixels);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn shutdown_stops_the_producer() {
        let pipeline =
            FramePipeline::spawn(config(PipelineFlags::MULTI_THREAD), draw_rect).unwrap();
        let quit = Arc::clone(&pipeline.quit);
        let done = Arc::clone(&pipeline.draw_done);
        pipeline.shutdown();
        assert!(quit.load(Ordering::Acquire));
        assert!(done.load(Ordering::Acquire));
    }

    #[test]
    fn copy_scan_buffers_carries_drawing_forward() {
        // draw only on the very first composition; with the copy flag the
        // rectangle must still be present in later frames
        let mut pipeline = FramePipeline::spawn(
            config(PipelineFlags::MULTI_THREAD | PipelineFlags::COPY_SCAN_BUFFERS),
            |frame, info| {
                if info.index == 0 {
                    frame.atlas.reset();
                    if let Ok(mat) = frame.atlas.set_single_color_material(1, 0x00AA55) {
                        frame.scan.fill_rect(0, 0, W as i32, H as i32, mat);
                    }
                }
                // later frames redraw nothing; the copied points must survive
            },
        )
        .unwrap();

        let mut pixels = vec![0u32; W * H];
        let mut hits = 0;
        for _ in 0..200 {
            if pipeline.render_next(&mut pixels) {
                hits += 1;
                if hits >= 3 {
                    break;
                }
            }
        }
        assert!(hits >= 3, "only {hits} frames rendered");
        assert_eq!(pixels[0], 0x00AA55);
        pipeline.shutdown();
    }
}
