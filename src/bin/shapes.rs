//! Interactive demo: a window full of animated primitives.
//!
//! ```bash
//! cargo run --release --bin shapes -- --width 800 --height 600
//! ```

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::info;
use minifb::{Key, Window, WindowOptions};

use switchline::pipeline::{Frame, FrameInfo, FramePipeline, PipelineConfig, PipelineFlags};
use switchline::raster::Rgba;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Window width in pixels
    #[arg(long, default_value = "800")]
    width: usize,

    /// Window height in pixels
    #[arg(long, default_value = "600")]
    height: usize,

    /// Target milliseconds per frame
    #[arg(long, default_value = "15")]
    frame_ms: u64,

    /// Compose and render on the same thread
    #[arg(long)]
    single_thread: bool,

    /// Keep the last image up until the window is closed
    #[arg(long)]
    wait_at_end: bool,

    /// Stop after this many rendered frames
    #[arg(long)]
    frames: Option<u64>,
}

fn draw_scene(frame: &mut Frame, info: FrameInfo, width: usize, height: usize) {
    let (w, h) = (width as i32, height as i32);
    let t = info.index as f32 * 0.02;

    frame.scan.clear();
    frame.atlas.reset();

    let atlas = &mut frame.atlas;
    let Ok(bg) = atlas.set_single_color_material_rgb(10000, 50, 80, 70) else {
        return;
    };
    frame.scan.set_background(bg);

    // screen-fixed stripes behind everything but the backdrop
    if let Ok(base) = atlas.add_texture_rgb(&[
        30, 50, 45, 30, 50, 45, 30, 50, 45, 30, 50, 45, //
        70, 110, 95, 70, 110, 95, 70, 110, 95, 70, 110, 95,
    ]) {
        if let Ok(stripes) = atlas.add_texture_material_screen_space(9000, base, 1, 8) {
            frame.scan.fill_rect(0, h - 60, w, h, stripes);
        }
    }

    // orbiting filled shapes
    let (cx, cy) = (w / 2, h / 2);
    let orbit = (h / 3) as f32;
    let (sx, sy) = (
        cx + (t.cos() * orbit) as i32,
        cy + (t.sin() * orbit) as i32,
    );
    if let Ok(red) = atlas.set_single_color_material_rgb(40, 220, 60, 60) {
        frame.scan.fill_circle(sx, sy, h / 10, red);
    }
    if let Ok(amber) = atlas.set_single_color_material_rgb(50, 230, 180, 40) {
        frame.scan.fill_ellipse(
            cx - (t.sin() * orbit) as i32,
            cy + (t.cos() * orbit * 0.6) as i32,
            w / 12,
            h / 16,
            amber,
        );
    }

    // rotating thick line through the centre
    if let Ok(pen) = atlas.set_single_color_material_rgb(30, 240, 240, 240) {
        let reach = orbit * 1.2;
        frame.scan.draw_line(
            cx - (t.cos() * reach) as i32,
            cy - (t.sin() * reach) as i32,
            cx + (t.cos() * reach) as i32,
            cy + (t.sin() * reach) as i32,
            5,
            pen,
        );
    }

    // a triangle and its sheared twin
    if let Ok(teal) = atlas.set_single_color_material_rgb(60, 40, 170, 160) {
        frame
            .scan
            .fill_triangle(w / 8, h - 40, w / 4, h / 2, 40, h / 2, teal);
        frame
            .scan
            .fill_tri_quad(w - 200, 60, w - 120, 60, w - 180, 140, teal);
    }

    // static ring plus a vignette hole over the scene
    if let Ok(ring) = atlas.set_single_color_material_rgb(20, 250, 250, 250) {
        frame.scan.outline_ellipse(cx, cy, w / 5, h / 5, 4, ring);
    }
    if let Ok(shade) = atlas.set_single_color_material_rgb(90, 10, 14, 12) {
        frame
            .scan
            .ellipse_hole(cx, cy, (w * 2) / 5, (h * 2) / 5, shade);
    }

    // banner text
    if let Ok(ink) = atlas.set_single_color_material_rgb(1, 255, 255, 255) {
        frame
            .scan
            .add_text("switch-point scanline rasterizer", 16, 24, ink);
    }
    if let Ok(dim) = atlas.set_single_color_material_rgb(1, 120, 255, 255) {
        let ms = info.last_draw_time.as_millis();
        frame
            .scan
            .add_text(&format!("draw {ms:>3} ms"), 16, 40, dim);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut flags = PipelineFlags::FRAME_LIMIT;
    if !args.single_thread {
        flags |= PipelineFlags::MULTI_THREAD;
    }
    if args.wait_at_end {
        flags |= PipelineFlags::WAIT_AT_END;
    }

    let config = PipelineConfig {
        frame_time_target: Duration::from_millis(args.frame_ms),
        flags,
        ..PipelineConfig::new(args.width, args.height)
    };

    let (width, height) = (args.width, args.height);
    let mut pipeline = FramePipeline::spawn(config, move |frame, info| {
        draw_scene(frame, info, width, height);
    })
    .context("starting the frame pipeline")?;

    let mut window = Window::new(
        "switchline shapes",
        width,
        height,
        WindowOptions::default(),
    )
    .context("opening the window")?;

    let mut pixels: Vec<Rgba> = vec![0; width * height];

    // FPS accounting, reported every few seconds
    let started = Instant::now();
    let mut acc_frames = 0u64;
    let mut last_print = Instant::now();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let t0 = Instant::now();
        let rendered = pipeline.render_next(&mut pixels);
        window
            .update_with_buffer(&pixels, width, height)
            .context("presenting the frame")?;

        if rendered {
            acc_frames += 1;
        }
        if last_print.elapsed() >= Duration::from_secs(3) {
            let stats = pipeline.stats();
            info!(
                "{} frames in {:.1}s ({:.1} FPS), {} interlace skips",
                stats.frames_rendered,
                started.elapsed().as_secs_f64(),
                stats.frames_rendered as f64 / started.elapsed().as_secs_f64(),
                stats.interlace_skips,
            );
            last_print = Instant::now();
        }

        if let Some(limit) = args.frames {
            if acc_frames >= limit {
                break;
            }
        }

        // spend leftover budget idling so we do not spin the surface
        let spent = t0.elapsed();
        let target = Duration::from_millis(args.frame_ms);
        if spent < target {
            std::thread::sleep(target - spent);
        }
    }

    let wait = args.wait_at_end && window.is_open();
    let stats = pipeline.shutdown();
    info!(
        "done: {} frames rendered, {} interlace skips",
        stats.frames_rendered, stats.interlace_skips
    );

    if wait {
        while window.is_open() && !window.is_key_down(Key::Escape) {
            window.update();
        }
    }
    Ok(())
}
