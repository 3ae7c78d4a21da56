//! pixelgraph demo - Main Entry Point
//!
//! Builds the beauty pipeline over the software backend, feeds it synthetic
//! camera frames and logs what reaches the raw output.

use anyhow::Context;
use clap::Parser;
use pixelgraph::{
    config::GraphConfig,
    graph::Node,
    landmark::StaticDetector,
    native::{NativeBackend, SoftwareBackend},
    BeautyPipeline, CameraPermission, Control, GpuContext, GraphError,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pixelgraph")]
#[command(about = "Run the beauty-camera frame graph on synthetic frames")]
#[command(version)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to upload
    #[arg(short, long, default_value = "30")]
    frames: u32,

    /// Frame width in pixels
    #[arg(long, default_value = "640")]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value = "480")]
    height: u32,

    /// Upload rate in frames per second (0 uploads as fast as possible)
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Simulate the user refusing camera access
    #[arg(long)]
    deny_camera: bool,

    /// Slider override, e.g. `--progress smooth=8 --progress bigeye=40`
    #[arg(long = "progress", value_parser = parse_progress)]
    progress: Vec<(Control, i32)>,
}

fn parse_progress(s: &str) -> Result<(Control, i32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <control>=<value>, got '{}'", s))?;
    let control = name.trim().parse::<Control>()?;
    let value = value
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("invalid progress '{}': {}", value, e))?;
    Ok((control, value))
}

fn init_logging(config: &GraphConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let (file_layer, guard) = match &config.logging.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "pixelgraph.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Moving diagonal gradient, so consecutive frames differ.
fn synthetic_frame(width: u32, height: u32, index: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let v = x.wrapping_add(y).wrapping_add(index * 4);
            pixels.extend_from_slice(&[(v % 256) as u8, (y % 256) as u8, (x % 256) as u8, 255]);
        }
    }
    pixels
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GraphConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GraphConfig::load_or_default(),
    };
    let _log_guard = init_logging(&config)?;

    tracing::info!("Starting pixelgraph demo");

    let software = Arc::new(SoftwareBackend::with_journal_capacity(0));
    let backend: Arc<dyn NativeBackend> = software.clone();
    let ctx = GpuContext::new(config, backend)?;

    let permission = if cli.deny_camera {
        CameraPermission::Denied
    } else {
        CameraPermission::Granted
    };

    let pipeline = match BeautyPipeline::start(&ctx, permission) {
        Ok(pipeline) => pipeline,
        Err(GraphError::PermissionDenied) => {
            tracing::warn!("No camera access, nothing to process");
            ctx.shutdown();
            return Ok(());
        }
        Err(e) => return Err(e).context("starting beauty pipeline"),
    };

    pipeline
        .camera()
        .set_face_detector(StaticDetector::centered(cli.width, cli.height));
    pipeline.view().on_size_changed(cli.width, cli.height);

    let delivered = Arc::new(AtomicU64::new(0));
    let counter = delivered.clone();
    pipeline
        .raw_output()
        .set_i420_callback(move |bytes, width, height, timestamp| {
            counter.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "I420 frame {}x{} @{}ms ({} bytes)",
                width,
                height,
                timestamp,
                bytes.len()
            );
        });

    for (control, progress) in &cli.progress {
        pipeline.on_progress_changed(*control, *progress)?;
        tracing::info!("{} set to {}", control, control.level(*progress));
    }

    let interval = (cli.fps > 0).then(|| Duration::from_secs(1) / cli.fps);
    for index in 0..cli.frames {
        let pixels = synthetic_frame(cli.width, cli.height, index);
        pipeline
            .camera()
            .upload_bytes(&pixels, cli.width, cli.height, cli.width as usize * 4)?;
        if let Some(interval) = interval {
            std::thread::sleep(interval);
        }
    }

    ctx.flush()?;
    let presented = software
        .presented(pipeline.view().handle())
        .map(|(count, _)| count)
        .unwrap_or(0);
    tracing::info!(
        "Uploaded {} frames, {} raw deliveries, {} presented",
        cli.frames,
        delivered.load(Ordering::Relaxed),
        presented
    );
    tracing::info!("Queue stats: {:?}", ctx.queue().stats());

    pipeline.destroy();
    ctx.flush()?;
    tracing::info!("Shutting down...");
    ctx.shutdown();
    Ok(())
}
