use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sensor_recorder::config::{self, RecorderConfig, SourceKind};
use sensor_recorder::shutdown::ShutdownController;
use sensor_recorder::video::format::PixelFormat;
use sensor_recorder::video::{
    FrameSource, H264Encoder, Recorder, RecordingSummary, StreamSink, TestPatternSource,
    V4l2Source,
};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// sensor-recorder command line arguments
#[derive(Parser, Debug)]
#[command(name = "sensor-recorder")]
#[command(version, about = "Record an imaging sensor to a raw H.264 stream", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Frame source (v4l2, test-pattern)
    #[arg(long, value_name = "SOURCE")]
    source: Option<SourceKind>,

    /// Capture device path (overrides config)
    #[arg(short = 'd', long, value_name = "PATH")]
    device: Option<PathBuf>,

    /// Requested frame width
    #[arg(long)]
    width: Option<u32>,

    /// Requested frame height
    #[arg(long)]
    height: Option<u32>,

    /// Packed pixel layout (BGRA, BGRX, RGBA, RGBX)
    #[arg(long, value_name = "FORMAT")]
    format: Option<PixelFormat>,

    /// Output file for the H.264 stream
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Target bitrate in kbps
    #[arg(short = 'b', long, value_name = "KBPS")]
    bitrate: Option<u32>,

    /// Frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Pictures between refresh frames
    #[arg(long, value_name = "FRAMES")]
    gop: Option<u32>,

    /// Stop after this many frames
    #[arg(short = 'n', long, value_name = "FRAMES")]
    max_frames: Option<u64>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting sensor-recorder v{}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;
    tracing::info!(
        "Source: {:?} {} {}x{} {}, output: {}",
        config.device.source,
        config.device.path.display(),
        config.device.width,
        config.device.height,
        config.device.format,
        config.output.path.display()
    );

    let shutdown = ShutdownController::new();
    let signals = shutdown.install_signal_handlers();

    let result = tokio::task::spawn_blocking(move || record(&config, shutdown))
        .await
        .context("Recording task panicked")?;
    signals.abort();

    let summary = result.context("Recording failed")?;
    tracing::info!(
        "Wrote {} packets ({} bytes) from {} frames, exit: {}",
        summary.packets_written,
        summary.bytes_written,
        summary.frames_submitted,
        summary.exit_reason
    );
    Ok(())
}

/// Merge the config file (if any) with CLI overrides
fn build_config(args: &CliArgs) -> anyhow::Result<RecorderConfig> {
    let mut config = match &args.config {
        Some(path) => config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RecorderConfig::default(),
    };

    if let Some(source) = args.source {
        config.device.source = source;
    }
    if let Some(device) = &args.device {
        config.device.path = device.clone();
    }
    if let Some(width) = args.width {
        config.device.width = width;
    }
    if let Some(height) = args.height {
        config.device.height = height;
    }
    if let Some(format) = args.format {
        config.device.format = format;
    }
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if let Some(bitrate) = args.bitrate {
        config.encoder.bitrate_kbps = bitrate;
    }
    if let Some(fps) = args.fps {
        config.encoder.fps = fps;
    }
    if let Some(gop) = args.gop {
        config.encoder.gop_size = gop;
    }
    if args.max_frames.is_some() {
        config.max_frames = args.max_frames;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Open the pipeline and record until it stops
///
/// Anything opened before a later setup step fails is released on drop.
fn record(
    config: &RecorderConfig,
    shutdown: ShutdownController,
) -> sensor_recorder::Result<RecordingSummary> {
    let source = open_source(config)?;
    let encoder_config = config.encoder.encoder_config(source.resolution());
    let backend = H264Encoder::new(encoder_config)?;
    let sink = StreamSink::create(&config.output.path)?;

    let mut recorder = Recorder::new(source, Box::new(backend), Box::new(sink), shutdown)?
        .with_max_frames(config.max_frames);
    recorder.run()
}

fn open_source(config: &RecorderConfig) -> sensor_recorder::Result<Box<dyn FrameSource>> {
    let device = &config.device;
    let source: Box<dyn FrameSource> = match device.source {
        SourceKind::V4l2 => Box::new(V4l2Source::open(&device.capture_config())?),
        SourceKind::TestPattern => Box::new(
            TestPatternSource::new(device.resolution(), device.format)
                .with_fps(device.pattern_fps)
                .with_frame_limit(device.pattern_frames),
        ),
    };
    Ok(source)
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "sensor_recorder=error,error",
        LogLevel::Warn => "sensor_recorder=warn,warn",
        LogLevel::Info => "sensor_recorder=info,warn",
        LogLevel::Verbose => "sensor_recorder=debug,warn",
        LogLevel::Debug => "sensor_recorder=debug,info",
        LogLevel::Trace => "sensor_recorder=trace,debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
