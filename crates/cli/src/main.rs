use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::RallyConfig;
use rally_analysis::{AnalysisResult, ContinuityAnalyzer, HashColorSampler};
use rally_annotations::StoreStats;
use rally_storage::{discover_rallies, open_rally_folder, AnnotationSession, LocalFs, RallyFs};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;

#[derive(Parser)]
#[command(name = "rally")]
#[command(about = "Inspect and edit per-rally tracking annotations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file (overrides RALLY_CONFIG and ./rally.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List rally folders under a root directory
    Rallies(RalliesArgs),

    /// Print record and tracklet counts for a rally
    Stats(RallyArgs),

    /// Check tracklet continuity and flag suspected identity switches
    Analyze(RallyArgs),

    /// Merge ball points from interchange JSON files into a rally
    #[command(name = "import-ball")]
    ImportBall(ImportBallArgs),

    /// Write the rally as interchange JSON
    Export(ExportArgs),

    /// Relabel every record of one tracklet as another
    Merge(MergeArgs),

    /// Swap two tracklet ids on a set of frames
    Switch(SwitchArgs),

    /// Delete one record or a whole tracklet
    Delete(DeleteArgs),

    /// Delete every ball point
    #[command(name = "delete-ball")]
    DeleteBall(RallyArgs),

    /// Load and save, moving inline metadata into the tracklet detail file
    Normalize(RallyArgs),
}

#[derive(Args)]
struct RalliesArgs {
    /// Directory holding one sub-directory per rally
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RallyArgs {
    /// Rally folder (frame images plus `<name>.txt`)
    rally: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CanvasArgs {
    /// Canvas width ball points are rescaled to (overrides config)
    #[arg(long)]
    width: Option<f64>,

    /// Canvas height ball points are rescaled to (overrides config)
    #[arg(long)]
    height: Option<f64>,
}

#[derive(Args)]
struct ImportBallArgs {
    rally: PathBuf,

    /// Interchange JSON files; only those whose video_source names this rally are used
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    canvas: CanvasArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExportArgs {
    rally: PathBuf,

    /// Output directory (defaults to the rally folder)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[command(flatten)]
    canvas: CanvasArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MergeArgs {
    rally: PathBuf,

    /// Tracklet id to relabel
    #[arg(long)]
    from: i64,

    /// Tracklet id that absorbs the records
    #[arg(long)]
    into: i64,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SwitchArgs {
    rally: PathBuf,
    first: i64,
    second: i64,

    /// Frames to swap on, comma-separated (default: every frame of either id)
    #[arg(long, value_delimiter = ',')]
    frames: Vec<i64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DeleteArgs {
    rally: PathBuf,

    #[arg(long)]
    tracklet: i64,

    /// Delete only this frame's record
    #[arg(long)]
    frame: Option<i64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct EditOutput {
    rally: String,
    action: &'static str,
    changed: usize,
    records: usize,
}

#[derive(Serialize)]
struct StatsOutput {
    rally: String,
    images: usize,
    #[serde(flatten)]
    stats: StoreStats,
}

#[derive(Serialize)]
struct ExportOutput {
    rally: String,
    path: PathBuf,
    records: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Keep stdout clean for JSON parsing
    let json_output = match &cli.command {
        Commands::Rallies(args) => args.json,
        Commands::Stats(args)
        | Commands::Analyze(args)
        | Commands::DeleteBall(args)
        | Commands::Normalize(args) => args.json,
        Commands::ImportBall(args) => args.json,
        Commands::Export(args) => args.json,
        Commands::Merge(args) => args.json,
        Commands::Switch(args) => args.json,
        Commands::Delete(args) => args.json,
    };
    if json_output {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = RallyConfig::load(cli.config.as_deref())?;
    let fs: Arc<dyn RallyFs> = Arc::new(LocalFs);

    match cli.command {
        Commands::Rallies(args) => run_rallies(args, fs).await?,
        Commands::Stats(args) => run_stats(args, fs, &config).await?,
        Commands::Analyze(args) => run_analyze(args, fs, &config).await?,
        Commands::ImportBall(args) => run_import_ball(args, fs, &config).await?,
        Commands::Export(args) => run_export(args, fs, &config).await?,
        Commands::Merge(args) => run_merge(args, fs, &config).await?,
        Commands::Switch(args) => run_switch(args, fs, &config).await?,
        Commands::Delete(args) => run_delete(args, fs, &config).await?,
        Commands::DeleteBall(args) => run_delete_ball(args, fs, &config).await?,
        Commands::Normalize(args) => run_normalize(args, fs, &config).await?,
    }

    Ok(())
}

async fn open_session(
    fs: Arc<dyn RallyFs>,
    path: &Path,
    config: &RallyConfig,
) -> Result<AnnotationSession> {
    let rally = open_rally_folder(fs.as_ref(), path)
        .await
        .with_context(|| format!("Failed to open rally {}", path.display()))?;
    let session = AnnotationSession::open(fs, rally, config.retry)
        .await
        .with_context(|| format!("Failed to load annotations in {}", path.display()))?;
    Ok(session)
}

/// Save the session (when an edit changed something) and report the edit
async fn finish_edit(
    mut session: AnnotationSession,
    action: &'static str,
    changed: usize,
    json: bool,
) -> Result<()> {
    if session.store().is_dirty() {
        session.save().await.context("Failed to save annotations")?;
    }
    let output = EditOutput {
        rally: session.rally().name.clone(),
        action,
        changed,
        records: session.store().len(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "{}: {} changed {} record(s), {} remain",
            output.rally, output.action, output.changed, output.records
        );
    }
    Ok(())
}

async fn run_rallies(args: RalliesArgs, fs: Arc<dyn RallyFs>) -> Result<()> {
    let rallies = discover_rallies(fs.as_ref(), &args.root)
        .await
        .with_context(|| format!("Failed to list {}", args.root.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rallies)?);
    } else if rallies.is_empty() {
        eprintln!("No rallies found under {}", args.root.display());
    } else {
        for rally in &rallies {
            println!("{} ({} frames)", rally.name, rally.image_files.len());
        }
    }
    Ok(())
}

async fn run_stats(args: RallyArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let session = open_session(fs, &args.rally, config).await?;
    let output = StatsOutput {
        rally: session.rally().name.clone(),
        images: session.rally().image_files.len(),
        stats: session.store().stats(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let stats = &output.stats;
        println!("Rally:       {}", output.rally);
        println!("Images:      {}", output.images);
        println!("Records:     {}", stats.records);
        println!("Tracklets:   {}", stats.tracklets);
        println!("Ball points: {}", stats.ball_points);
        println!("Events:      {}", stats.events);
        if let (Some(first), Some(last)) = (stats.first_frame, stats.last_frame) {
            println!("Frames:      {first}-{last}");
        }
    }
    Ok(())
}

async fn run_analyze(args: RallyArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let session = open_session(fs, &args.rally, config).await?;
    let analyzer = ContinuityAnalyzer::new(config.analysis.clone(), HashColorSampler)?;
    let result = analyzer.analyze(&session.rally().path, &session.store().records());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_analysis(&result, config);
    }
    Ok(())
}

fn print_analysis(result: &AnalysisResult, config: &RallyConfig) {
    println!(
        "{} tracklets, {} problematic, score {:.2}",
        result.total_tracklets, result.problematic_tracklets, result.overall_score
    );
    for report in &result.tracklets {
        if !report.is_problematic(&config.analysis) {
            continue;
        }
        let reasons: Vec<&str> = report.switch_reasons.iter().map(|r| r.as_str()).collect();
        println!(
            "  tracklet {}: frames {}-{}, {} missing in {} gap(s), color {:.2}{}",
            report.tracklet_id,
            report.first_frame,
            report.last_frame,
            report.missing_frame_count,
            report.continuity_gaps,
            report.color_consistency,
            if reasons.is_empty() {
                String::new()
            } else {
                format!(" [{}]", reasons.join(", "))
            }
        );
    }
}

async fn run_import_ball(
    args: ImportBallArgs,
    fs: Arc<dyn RallyFs>,
    config: &RallyConfig,
) -> Result<()> {
    let canvas = config.canvas_with(args.canvas.width, args.canvas.height)?;
    let mut session = open_session(fs, &args.rally, config).await?;
    let merged = session.import_ball_json(&args.files, canvas).await?;
    finish_edit(session, "import-ball", merged, args.json).await
}

async fn run_export(args: ExportArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let canvas = config.canvas_with(args.canvas.width, args.canvas.height)?;
    let session = open_session(fs, &args.rally, config).await?;
    let out_dir = args
        .out_dir
        .unwrap_or_else(|| session.rally().path.clone());
    let path = session
        .export_json(&out_dir, canvas)
        .await
        .context("Failed to write export")?;

    let output = ExportOutput {
        rally: session.rally().name.clone(),
        path,
        records: session.store().len(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Exported {} records to {}", output.records, output.path.display());
    }
    Ok(())
}

async fn run_merge(args: MergeArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let mut session = open_session(fs, &args.rally, config).await?;
    let changed = session.store_mut().merge_tracklets(args.from, args.into);
    finish_edit(session, "merge", changed, args.json).await
}

async fn run_switch(args: SwitchArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let mut session = open_session(fs, &args.rally, config).await?;
    let changed = session
        .store_mut()
        .switch_tracklets(args.first, args.second, &args.frames);
    finish_edit(session, "switch", changed, args.json).await
}

async fn run_delete(args: DeleteArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let mut session = open_session(fs, &args.rally, config).await?;
    let store = session.store_mut();
    let changed = match args.frame {
        Some(frame) => usize::from(store.delete_by_key(frame, args.tracklet).is_some()),
        None => store.delete_all_for_tracklet(args.tracklet),
    };
    finish_edit(session, "delete", changed, args.json).await
}

async fn run_delete_ball(
    args: RallyArgs,
    fs: Arc<dyn RallyFs>,
    config: &RallyConfig,
) -> Result<()> {
    let mut session = open_session(fs, &args.rally, config).await?;
    let changed = session.store_mut().delete_all_ball();
    finish_edit(session, "delete-ball", changed, args.json).await
}

async fn run_normalize(args: RallyArgs, fs: Arc<dyn RallyFs>, config: &RallyConfig) -> Result<()> {
    let mut session = open_session(fs, &args.rally, config).await?;
    session.save().await.context("Failed to save annotations")?;
    let records = session.store().len();
    finish_edit(session, "normalize", records, args.json).await
}
