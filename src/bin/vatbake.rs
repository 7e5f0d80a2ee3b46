use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use vatbake::{
    AnimationClip, BakeConfig, BakeStats, DispatchSurface, FrameIndex, NormalizedTime,
    PoseEvaluator, SurfaceKind, TileLayout, VatBaker, WaveGridEvaluator,
};

#[derive(Parser, Debug)]
#[command(name = "vatbake", version)]
struct Cli {
    /// Log more to stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the atlas layout for a vertex and frame count as JSON.
    Plan(PlanArgs),
    /// Bake the procedural wave grid and print layout and stats as JSON.
    Bake(BakeArgs),
    /// Bake, read every frame back and compare it against a fresh evaluation.
    Verify(VerifyArgs),
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Vertices per frame.
    #[arg(long)]
    vertices: u32,

    /// Frame count. Alternative to --frame-rate with --duration.
    #[arg(long, conflicts_with_all = ["frame_rate", "duration"])]
    frames: Option<u32>,

    /// Clip frame rate in frames per second.
    #[arg(long, requires = "duration")]
    frame_rate: Option<f32>,

    /// Clip duration in seconds.
    #[arg(long, requires = "frame_rate")]
    duration: Option<f32>,
}

#[derive(Parser, Debug)]
struct BakeArgs {
    /// Bake configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Surface to run the kernels on.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Bake configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Surface to run the kernels on.
    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    Gpu,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Command::Plan(args) => cmd_plan(args),
        Command::Bake(args) => cmd_bake(args),
        Command::Verify(args) => cmd_verify(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn read_config(path: Option<&Path>) -> anyhow::Result<BakeConfig> {
    match path {
        Some(p) => BakeConfig::from_json_path(p)
            .with_context(|| format!("load bake config '{}'", p.display())),
        None => Ok(BakeConfig::default()),
    }
}

fn make_surface(choice: BackendChoice) -> anyhow::Result<Box<dyn DispatchSurface>> {
    let kind = match choice {
        BackendChoice::Cpu => SurfaceKind::Cpu,
        BackendChoice::Gpu => gpu_kind()?,
    };
    Ok(vatbake::create_surface(kind)?)
}

#[cfg(feature = "gpu")]
fn gpu_kind() -> anyhow::Result<SurfaceKind> {
    Ok(SurfaceKind::Gpu)
}

#[cfg(not(feature = "gpu"))]
fn gpu_kind() -> anyhow::Result<SurfaceKind> {
    anyhow::bail!("vatbake was built without the `gpu` feature")
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let layout = match (args.frames, args.frame_rate, args.duration) {
        (Some(frames), _, _) => TileLayout::plan(args.vertices, frames)?,
        (None, Some(frame_rate), Some(duration)) => {
            let clip = AnimationClip::new(frame_rate, duration)?;
            TileLayout::for_clip(args.vertices, &clip)?
        }
        _ => anyhow::bail!("pass --frames, or --frame-rate together with --duration"),
    };
    print_json(&serde_json::to_value(layout.info())?)
}

type Baker = VatBaker<Box<dyn DispatchSurface>>;

fn bake_configured(
    config: &BakeConfig,
    backend: BackendChoice,
) -> anyhow::Result<(Baker, BakeStats)> {
    let surface = make_surface(backend)?;
    let mut baker = VatBaker::new(surface, config.params()).context("configure baker")?;
    let mut evaluator = WaveGridEvaluator::new(config.mesh, config.clip)?;
    let stats = baker.bake(&mut evaluator).context("bake wave grid")?;
    Ok((baker, stats))
}

fn cmd_bake(args: BakeArgs) -> anyhow::Result<()> {
    let config = read_config(args.config.as_deref())?;
    let (mut baker, stats) = bake_configured(&config, args.backend)?;

    print_json(&serde_json::json!({
        "layout": baker.layout_info(),
        "stats": stats,
    }))?;
    baker.release()?;
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<()> {
    let config = read_config(args.config.as_deref())?;
    let (mut baker, _) = bake_configured(&config, args.backend)?;
    let mut reference = WaveGridEvaluator::new(config.mesh, config.clip)?;
    let frame_count = baker.layout().frame_count();
    let channels = config.channels;

    let mut mismatched_vertices = 0u64;
    let mut first_mismatch = None;
    for i in 0..frame_count {
        let frame = FrameIndex(i);
        let restored = baker
            .read_frame(frame)
            .with_context(|| format!("read back frame {i}"))?;
        let expected = reference.pose(NormalizedTime::of_frame(frame, frame_count))?;
        for (v, (got, want)) in restored.iter().zip(&expected).enumerate() {
            let same = bits_eq(&got.position, &want.position)
                && (!channels.normal || bits_eq(&got.normal, &want.normal))
                && (!channels.tangent || bits_eq(&got.tangent, &want.tangent));
            if !same {
                mismatched_vertices += 1;
                first_mismatch.get_or_insert((i, v));
            }
        }
    }

    print_json(&serde_json::json!({
        "layout": baker.layout_info(),
        "frames_checked": frame_count,
        "mismatched_vertices": mismatched_vertices,
    }))?;
    baker.release()?;

    if let Some((frame, vertex)) = first_mismatch {
        anyhow::bail!(
            "{mismatched_vertices} vertices differ after round-trip (first: frame {frame}, vertex {vertex})"
        );
    }
    Ok(())
}

fn bits_eq(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
