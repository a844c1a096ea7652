use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mockreel::{
    AnimationStyle, CancellationToken, ContentUnit, CostTable, EncoderSettings, ExportConfig,
    Exporter, ImageSequenceSettings, LoggingConfig, ProgressReporter, ProgressUpdate,
    QualityTier, ResolutionTier, SizeEstimator, SyntheticChat, VideoCodec, VideoContainer,
    VideoSettings, estimate::estimated_frame_count,
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "mockreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Animate a synthetic conversation and write it as a GIF or video.
    Export(ExportArgs),
    /// Predict the artifact size without rendering anything.
    Estimate(EstimateArgs),
}

#[derive(Args, Debug)]
struct ContentArgs {
    /// Message text; repeat for more messages. Without any, `--units` sample messages are used.
    #[arg(long = "message")]
    messages: Vec<String>,

    /// Number of sample messages when no `--message` is given.
    #[arg(long, default_value_t = 4)]
    units: usize,

    /// Animation style: none, reveal, typing or scroll.
    #[arg(long, value_parser = parse_name::<AnimationStyle>, default_value = "reveal")]
    style: AnimationStyle,
}

#[derive(Args, Debug)]
struct FormatArgs {
    #[arg(long, value_enum, default_value_t = FormatChoice::Gif)]
    format: FormatChoice,

    /// GIF quality tier: low, medium or high.
    #[arg(long, value_parser = parse_name::<QualityTier>, default_value = "medium")]
    quality: QualityTier,

    /// Disable dithering even where the tier allows it.
    #[arg(long)]
    no_dither: bool,

    /// Play the GIF once instead of looping.
    #[arg(long)]
    no_loop: bool,

    /// GIF frame delay in milliseconds.
    #[arg(long, default_value_t = 100)]
    delay_ms: u32,

    /// Video frame rate, 1 to 240.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..=240))]
    fps: u32,

    /// Video resolution tier: 480p, 720p or 1080p.
    #[arg(long, value_parser = parse_name::<ResolutionTier>, default_value = "720p")]
    resolution: ResolutionTier,

    /// Video codec; defaults to h264 for mp4 and vp9 for webm.
    #[arg(long, value_parser = parse_name::<VideoCodec>)]
    codec: Option<VideoCodec>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Gif,
    Mp4,
    Webm,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[command(flatten)]
    content: ContentArgs,

    #[command(flatten)]
    format: FormatArgs,

    /// JSON export config; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    frame_budget: Option<u32>,

    #[arg(long)]
    target_width: Option<u32>,

    /// Output path; defaults to the artifact's suggested filename.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct EstimateArgs {
    #[command(flatten)]
    content: ContentArgs,

    #[command(flatten)]
    format: FormatArgs,

    /// JSON cost table replacing the built-in heuristics.
    #[arg(long)]
    cost_table: Option<PathBuf>,

    #[arg(long, default_value_t = mockreel::estimate::DEFAULT_TARGET_WIDTH)]
    target_width: u32,
}

fn parse_name<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args).await,
        Command::Estimate(args) => cmd_estimate(args),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish()).ok();
    } else {
        tracing::subscriber::set_global_default(builder.with_target(true).finish()).ok();
    }
}

fn content_units(args: &ContentArgs) -> Vec<ContentUnit> {
    const SAMPLES: [&str; 6] = [
        "hey! are we still on for tonight?",
        "yes, 7pm at the usual place",
        "perfect. should I bring anything?",
        "maybe the board game from last time",
        "deal, see you there",
        "see you!",
    ];
    if args.messages.is_empty() {
        (0..args.units)
            .map(|i| ContentUnit::new(format!("m{i}"), i, SAMPLES[i % SAMPLES.len()]))
            .collect()
    } else {
        args.messages
            .iter()
            .enumerate()
            .map(|(i, text)| ContentUnit::new(format!("m{i}"), i, text.as_str()))
            .collect()
    }
}

fn encoder_settings(args: &FormatArgs) -> EncoderSettings {
    let video = |container: VideoContainer, default_codec: VideoCodec| {
        EncoderSettings::Video(VideoSettings {
            fps: args.fps,
            resolution: args.resolution,
            codec: args.codec.unwrap_or(default_codec),
            container,
        })
    };
    match args.format {
        FormatChoice::Gif => EncoderSettings::ImageSequence(ImageSequenceSettings {
            quality: args.quality,
            dither: !args.no_dither,
            looping: !args.no_loop,
            frame_delay_ms: args.delay_ms,
        }),
        FormatChoice::Mp4 => video(VideoContainer::Mp4, VideoCodec::H264),
        FormatChoice::Webm => video(VideoContainer::Webm, VideoCodec::Vp9),
    }
}

async fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ExportConfig::load(path)?,
        None => ExportConfig::default(),
    };
    if let Some(budget) = args.frame_budget {
        config.frame_budget = budget;
    }
    if let Some(width) = args.target_width {
        config.target_width = width;
    }
    init_logging(&config.logging);

    let units = content_units(&args.content);
    let settings = encoder_settings(&args.format);
    let exporter = Exporter::new(config)?;
    let mut surface = SyntheticChat::new(units.clone());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling...");
            on_ctrl_c.cancel();
        }
    });

    let progress = ProgressReporter::new(|update: ProgressUpdate| match update {
        ProgressUpdate::Progress(ev) => eprintln!("[{:>5.1}%] {}", ev.percent, ev.status),
        ProgressUpdate::Failed { message } => eprintln!("[failed] {message}"),
    });

    let report = exporter
        .export(
            &units,
            args.content.style,
            &mut surface,
            &settings,
            &cancel,
            &progress,
        )
        .await?;

    for skipped in &report.summary.skipped {
        eprintln!(
            "skipped frame {}: {}",
            skipped.frame_index, skipped.reason
        );
    }

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(&report.artifact.suggested_filename));
    write_artifact(&out, &report.artifact.bytes)?;
    eprintln!(
        "wrote {} ({}, {} bytes, {}/{} frames)",
        out.display(),
        report.artifact.media_type,
        report.artifact.bytes.len(),
        report.summary.captured,
        report.summary.planned
    );
    Ok(())
}

fn write_artifact(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write artifact '{}'", path.display()))
}

fn cmd_estimate(args: EstimateArgs) -> anyhow::Result<()> {
    let table = match &args.cost_table {
        Some(path) => {
            let f = File::open(path)
                .with_context(|| format!("open cost table '{}'", path.display()))?;
            serde_json::from_reader(BufReader::new(f)).with_context(|| "parse cost table JSON")?
        }
        None => CostTable::default(),
    };
    let units = content_units(&args.content).len();
    let settings = encoder_settings(&args.format);
    let bytes = SizeEstimator::new(table, args.target_width).estimate(
        units,
        args.content.style,
        &settings,
    );
    println!(
        "{} units, style {}, ~{} frames: about {} bytes ({:.1} KiB) as {}",
        units,
        args.content.style.as_str(),
        estimated_frame_count(units, args.content.style),
        bytes,
        bytes as f64 / 1024.0,
        settings.format().extension()
    );
    Ok(())
}
