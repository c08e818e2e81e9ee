use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "reelkit", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a single frame of the animation as a PNG.
    Frame(FrameArgs),
    /// Render the whole animation and export it as an MP4 (requires `ffmpeg` unless --dry-run).
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct CanvasArgs {
    /// Frame config JSON; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Canvas width in pixels [default: 200].
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height in pixels [default: 200].
    #[arg(long)]
    height: Option<u32>,
}

impl CanvasArgs {
    fn canvas(&self) -> reelkit::ReelResult<reelkit::Canvas> {
        let default = reelkit::Canvas::default();
        reelkit::Canvas::new(
            self.width.unwrap_or(default.width),
            self.height.unwrap_or(default.height),
        )
    }
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    canvas: CanvasArgs,

    /// Frame index (0-based).
    #[arg(long)]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[command(flatten)]
    canvas: CanvasArgs,

    /// Directory the finished video is written into.
    #[arg(long)]
    out_dir: PathBuf,

    /// Encode frames to PNG in parallel.
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Override rayon worker threads (parallel mode only).
    #[arg(long)]
    threads: Option<usize>,

    /// `ffmpeg` binary to run (defaults to `$REELKIT_FFMPEG`, then `ffmpeg` on PATH).
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Kill `ffmpeg` if a single invocation runs longer than this.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Use the in-process backend instead of `ffmpeg`; the output is not a playable video.
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "reelkit=info",
        1 => "reelkit=debug",
        _ => "reelkit=trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: &CanvasArgs) -> anyhow::Result<(reelkit::FrameGenConfig, reelkit::Canvas)> {
    let cfg = match &args.config {
        Some(path) => reelkit::FrameGenConfig::from_path(path)?,
        None => reelkit::FrameGenConfig::default(),
    };
    Ok((cfg, args.canvas()?))
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let (cfg, extent) = load_config(&args.canvas)?;
    let (width, height) = (extent.width, extent.height);

    let mut canvas = reelkit::CpuCanvas::with_canvas(extent)?;
    let frame = reelkit::render_frame(
        &mut canvas,
        width,
        height,
        &cfg,
        reelkit::FrameIndex(args.index),
    )?;
    let png = reelkit::encode_png(&frame)?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, png).with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let (cfg, extent) = load_config(&args.canvas)?;
    let (width, height) = (extent.width, extent.height);

    let mut canvas = reelkit::CpuCanvas::with_canvas(extent)?;
    let frames = reelkit::generate_frames(&mut canvas, width, height, &cfg)?;

    let exporter = if args.dry_run {
        reelkit::VideoExporter::new(reelkit::MemoryBackend::new)
    } else {
        let mut ffmpeg = reelkit::FfmpegOpts::default();
        if let Some(binary) = args.ffmpeg {
            ffmpeg.binary = binary;
        }
        ffmpeg.timeout = args.timeout_secs.map(Duration::from_secs);
        reelkit::VideoExporter::new(move || reelkit::FfmpegBackend::new(ffmpeg.clone()))
    };
    let exporter = exporter.with_opts(reelkit::ExportOpts {
        parallel: args.parallel,
        threads: args.threads,
    });

    exporter.subscribe(|state| {
        let label = match state {
            reelkit::ExportState::Exporting => "exporting...",
            reelkit::ExportState::Idle => "idle",
        };
        eprintln!("{label}");
    });

    let mut delivery = reelkit::DirectoryDelivery::new(&args.out_dir);
    let outcome = exporter.export_video(
        frames,
        width,
        height,
        &mut delivery,
        &reelkit::CancelToken::new(),
    );

    match outcome {
        reelkit::ExportOutcome::Skipped => {
            eprintln!("no frames to export");
            Ok(())
        }
        reelkit::ExportOutcome::Delivered { .. } => {
            for path in delivery.delivered() {
                eprintln!("wrote {}", path.display());
            }
            Ok(())
        }
        reelkit::ExportOutcome::Failed { stage, message } => {
            anyhow::bail!("{}: {stage}: {message}", reelkit::EXPORT_FAILED_MESSAGE)
        }
    }
}
