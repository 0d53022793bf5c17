use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use placer::agent::{AgentId, AgentSpec, DryRunProvider};
use placer::config::Config;
use placer::jobfile::JobFile;
use placer::orchestration::{
    estimate_duration, AgentPool, Progress, RunReport, Scheduler, SchedulerConfig,
};
use placer::preview;
use placer::quantize::Quantizer;
use placer::util::format_duration;
use placer::{plog, plog_warn, Error, Result};

/// Placer - quantize images to a palette and place them with a pool of agents
#[derive(Parser, Debug)]
#[command(name = "placer")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    PLACER_DEBUG=1      Enable debug logging (alternative to --debug)\n    PLACER_LOG=<level>  Log level: error, warn, info, debug, trace")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.placer/placer.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Convert an image into a job file
    Quantize {
        /// Image to quantize
        image: PathBuf,

        /// Job file to write (defaults to <IMAGE>.jobs.json)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        #[arg(long)]
        max_width: Option<u32>,

        #[arg(long)]
        max_height: Option<u32>,

        /// Only use the unrestricted half of the palette
        #[arg(long)]
        unrestricted_only: bool,

        /// Write a scaled preview PNG
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Write a preview PNG with cell outlines
        #[arg(long)]
        grid: Option<PathBuf>,

        /// Preview scale in pixels per cell
        #[arg(long)]
        pixel_size: Option<u32>,
    },

    /// Place every job in a job file
    Run {
        jobs: PathBuf,

        /// Default cooldown between placements, in seconds
        #[arg(long)]
        cooldown: Option<f64>,

        /// Use N synthetic agents instead of the configured roster
        #[arg(long)]
        agents: Option<usize>,

        #[arg(long)]
        start_x: Option<i32>,

        #[arg(long)]
        start_y: Option<i32>,

        /// Make every N-th placement of each agent fail
        #[arg(long)]
        fail_every: Option<u32>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Estimate how long a job file takes to place
    Estimate {
        jobs: PathBuf,

        #[arg(long)]
        agents: Option<usize>,

        #[arg(long)]
        cooldown: Option<f64>,
    },

    /// Show the active palette
    Palette {
        #[arg(long)]
        json: bool,
    },

    /// Manage the agent roster
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum AgentsAction {
    /// List configured agents
    List,
    /// Add an agent to the roster
    Add {
        id: String,
        #[arg(long)]
        premium: bool,
        /// Per-agent cooldown override, in seconds
        #[arg(long)]
        cooldown: Option<f64>,
    },
    /// Remove an agent from the roster
    Remove { id: String },
    /// Include an agent in runs
    Enable { id: String },
    /// Exclude an agent from runs
    Disable { id: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    placer::log::init(cli.debug);
    plog!("placer starting: {:?}", cli.command);

    match cli.command {
        Command::Quantize {
            image,
            output,
            max_width,
            max_height,
            unrestricted_only,
            preview,
            grid,
            pixel_size,
        } => run_quantize(QuantizeArgs {
            image,
            output,
            max_width,
            max_height,
            unrestricted_only,
            preview,
            grid,
            pixel_size,
        }),
        Command::Run {
            jobs,
            cooldown,
            agents,
            start_x,
            start_y,
            fail_every,
            json,
        } => {
            let report = run_placement(RunArgs {
                jobs,
                cooldown,
                agents,
                start_x,
                start_y,
                fail_every,
            })?;
            print_report(&report, json)?;
            process::exit(exit_code(&report));
        }
        Command::Estimate {
            jobs,
            agents,
            cooldown,
        } => run_estimate(&jobs, agents, cooldown),
        Command::Palette { json } => run_palette(json),
        Command::Agents { action } => run_agents(action),
    }
}

struct QuantizeArgs {
    image: PathBuf,
    output: Option<PathBuf>,
    max_width: Option<u32>,
    max_height: Option<u32>,
    unrestricted_only: bool,
    preview: Option<PathBuf>,
    grid: Option<PathBuf>,
    pixel_size: Option<u32>,
}

fn default_output(image: &Path) -> PathBuf {
    image.with_extension("jobs.json")
}

fn run_quantize(args: QuantizeArgs) -> Result<()> {
    let config = Config::load()?;
    let mut settings = config.quantize.clone();
    if let Some(w) = args.max_width {
        settings.max_width = w;
    }
    if let Some(h) = args.max_height {
        settings.max_height = h;
    }
    if args.unrestricted_only {
        settings.unrestricted_only = true;
    }
    if let Some(size) = args.pixel_size {
        settings.pixel_size = size;
    }

    let palette = config.palette()?;
    let quantizer = Quantizer::new(palette.clone(), settings.options());
    let result = quantizer.quantize_path(&args.image)?;

    if let Some(path) = &args.preview {
        preview::save_png(&preview::render_processed(&result, settings.pixel_size)?, path)?;
        println!("Preview written to {}", path.display());
    }
    if let Some(path) = &args.grid {
        preview::save_png(&preview::render_grid(&result, settings.pixel_size)?, path)?;
        println!("Grid preview written to {}", path.display());
    }

    let output = args.output.unwrap_or_else(|| default_output(&args.image));
    let source = args
        .image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let file = JobFile::from_result(result, &palette, source);
    file.save(&output)?;

    let result = &file.result;
    println!(
        "{}x{} (from {}x{}): {} jobs, {} colors ({} unrestricted, {} restricted)",
        result.width,
        result.height,
        result.source_width,
        result.source_height,
        result.jobs.len(),
        result.stats.unique_colors(),
        result.stats.unrestricted_count,
        result.stats.restricted_count
    );
    let agents = config.active_agents().len();
    if let Some(eta) = estimate_duration(result.jobs.len(), agents, config.scheduler.cooldown()) {
        println!("Estimated time with {} agents: {}", agents, format_duration(eta));
    }
    println!("Jobs written to {}", output.display());
    Ok(())
}

struct RunArgs {
    jobs: PathBuf,
    cooldown: Option<f64>,
    agents: Option<usize>,
    start_x: Option<i32>,
    start_y: Option<i32>,
    fail_every: Option<u32>,
}

fn cooldown_arg(secs: f64) -> Result<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Ok(Duration::from_secs_f64(secs))
    } else {
        Err(Error::Validation(format!("invalid cooldown: {}", secs)))
    }
}

fn synthetic_agents(count: usize) -> Vec<AgentSpec> {
    (1..=count).map(|i| AgentSpec::new(format!("dry-{}", i))).collect()
}

fn run_placement(args: RunArgs) -> Result<RunReport> {
    let config = Config::load()?;
    let jobs = JobFile::load(&args.jobs)?.into_jobs();

    let mut scheduler_config = SchedulerConfig::from(&config.scheduler);
    if let Some(secs) = args.cooldown {
        scheduler_config.cooldown = cooldown_arg(secs)?;
    }
    if let Some(x) = args.start_x {
        scheduler_config.offset.0 = x;
    }
    if let Some(y) = args.start_y {
        scheduler_config.offset.1 = y;
    }

    let specs = match args.agents {
        Some(n) => synthetic_agents(n),
        None => config.active_agents(),
    };
    if specs.is_empty() {
        plog_warn!("No active agents; add some with `placer agents add` or pass --agents");
    }

    let provider = DryRunProvider {
        fail_every: args.fail_every,
    };
    let agents = AgentPool::acquire(&provider, &specs, scheduler_config.cooldown);
    let scheduler = Scheduler::new(scheduler_config).with_progress(Box::new(print_progress));

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted, finishing in-flight placements...");
                on_interrupt.cancel();
            }
        });
        scheduler.run_async(jobs, agents, cancel).await
    })?;
    eprintln!();
    Ok(report)
}

fn print_progress(progress: &Progress) {
    let mut stderr = io::stderr();
    let _ = write!(
        stderr,
        "\r[{}/{}] placed {} failed {}",
        progress.current, progress.total, progress.placed, progress.failed
    );
    let _ = stderr.flush();
}

fn exit_code(report: &RunReport) -> i32 {
    match report {
        RunReport::Finished { .. } if report.is_success() => 0,
        RunReport::Finished { .. } => 1,
        RunReport::SetupFailed { .. } => 2,
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    match report {
        RunReport::SetupFailed { error } => {
            println!("Run could not start: {}", error);
        }
        RunReport::Finished { stats } => {
            let status = if stats.cancelled { "cancelled" } else { "finished" };
            println!("Run {}", status);
            println!(
                "  placed {}/{} ({:.1}%), failed {}, unprocessed {}",
                stats.placed,
                stats.total,
                stats.success_rate() * 100.0,
                stats.failed,
                stats.unprocessed()
            );
            if let Some(elapsed) = stats.duration() {
                println!("  took {}", format_duration(elapsed));
            }
            for (agent, placed) in &stats.per_agent_placed {
                let failed = stats.per_agent_failed.get(agent).copied().unwrap_or(0);
                println!("  {:<20} {:>6} placed {:>6} failed", agent, placed, failed);
            }
            for error in stats.errors.iter().take(10) {
                println!("  error: {}", error);
            }
            if stats.errors.len() > 10 {
                println!("  ... {} more errors", stats.errors.len() - 10);
            }
        }
    }
    Ok(())
}

fn run_estimate(jobs: &Path, agents: Option<usize>, cooldown: Option<f64>) -> Result<()> {
    let config = Config::load()?;
    let total = JobFile::load(jobs)?.jobs().len();
    let agents = agents.unwrap_or_else(|| config.active_agents().len());
    let cooldown = match cooldown {
        Some(secs) => cooldown_arg(secs)?,
        None => config.scheduler.cooldown(),
    };
    match estimate_duration(total, agents, cooldown) {
        Some(eta) => println!(
            "{} jobs, {} agents, {:.1}s cooldown: about {}",
            total,
            agents,
            cooldown.as_secs_f64(),
            format_duration(eta)
        ),
        None => println!("{} jobs but no agents; nothing to estimate", total),
    }
    Ok(())
}

fn run_palette(json: bool) -> Result<()> {
    let palette = Config::load()?.palette()?;
    let description = palette.describe();
    if json {
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(());
    }
    for (title, colors) in [
        ("Unrestricted", &description.unrestricted),
        ("Restricted", &description.restricted),
    ] {
        println!("{} ({}):", title, colors.len());
        for info in colors {
            println!(
                "  {:>2}  {}  rgb({:>3}, {:>3}, {:>3})",
                info.index, info.hex, info.rgb[0], info.rgb[1], info.rgb[2]
            );
        }
    }
    Ok(())
}

fn run_agents(action: AgentsAction) -> Result<()> {
    let mut config = Config::load()?;
    match action {
        AgentsAction::List => {
            let summary = config.roster_summary();
            println!(
                "{} agents ({} active, {} premium, {} free)",
                summary.total, summary.active, summary.premium, summary.free
            );
            for spec in &config.agents {
                let cooldown = spec
                    .cooldown_secs
                    .map(|s| format!("{:.1}s", s))
                    .unwrap_or_else(|| "default".to_string());
                println!(
                    "  {:<20} {:<8} {:<8} cooldown {}",
                    spec.id,
                    if spec.active { "active" } else { "inactive" },
                    if spec.premium { "premium" } else { "free" },
                    cooldown
                );
            }
            return Ok(());
        }
        AgentsAction::Add {
            id,
            premium,
            cooldown,
        } => {
            let mut spec = AgentSpec::new(id).premium(premium);
            if let Some(secs) = cooldown {
                spec = spec.with_cooldown(cooldown_arg(secs)?);
            }
            let id = spec.id.clone();
            config.add_agent(spec)?;
            println!("Added {}", id);
        }
        AgentsAction::Remove { id } => {
            let removed = config.remove_agent(&AgentId::new(id))?;
            println!("Removed {}", removed.id);
        }
        AgentsAction::Enable { id } => {
            config.set_active(&AgentId::new(id.clone()), true)?;
            println!("Enabled {}", id);
        }
        AgentsAction::Disable { id } => {
            config.set_active(&AgentId::new(id.clone()), false)?;
            println!("Disabled {}", id);
        }
    }
    config.save()
}
