//! ralph-loop - resumable build/plan loop controller
//!
//! Command-line front end: create loops, run them against the configured
//! agent command, and steer them between iterations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use ralph_loop::r#loop::driver::{EventOutcome, HintScope, LoopOverview, TurnEnd};
use ralph_loop::r#loop::operations::CliAgentRuntime;
use ralph_loop::{
    classify, HostEvent, LoopDriver, LoopError, LoopMode, LoopRunner, LoopState, LoopStatus,
    NewLoop, RunExit, Settings, StuckPolicy, TurnStart,
};

#[derive(Parser)]
#[command(name = "ralph-loop")]
#[command(version)]
#[command(about = "Resumable build/plan loop controller for coding agents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new loop
    Start {
        /// Loop name (letters, digits, '-', '_' and '.')
        name: String,

        /// Task file (defaults to .ralph/tasks/<name>.md)
        #[arg(short, long)]
        task_file: Option<PathBuf>,

        /// Iteration mode
        #[arg(short, long, value_enum, default_value = "build")]
        mode: LoopMode,

        /// Maximum iterations (0 for unbounded)
        #[arg(long, default_value = "0")]
        max_iterations: u32,

        /// Insert a checkpoint turn every N iterations (0 to disable)
        #[arg(long, default_value = "0")]
        reflect_every: u32,
    },

    /// Run a loop with the configured agent command until it stops
    Run {
        name: String,

        /// Override the no-progress streak that marks a loop stuck
        #[arg(long)]
        struggle_threshold: Option<u32>,

        /// Override what happens when a loop is stuck: continue or pause
        #[arg(long)]
        stuck_policy: Option<StuckPolicy>,

        /// Override the inactivity timeout in seconds (0 disables)
        #[arg(long, value_name = "SECS")]
        inactivity_timeout: Option<u64>,
    },

    /// Show a loop's state, or every loop's
    Status {
        name: Option<String>,

        /// Print the raw state record as JSON
        #[arg(long)]
        json: bool,
    },

    /// List loops
    List,

    /// Print the prompt the next turn would receive
    Prompt { name: String },

    /// Pause a running or stuck loop
    Pause { name: String },

    /// Resume a paused or stuck loop
    Resume { name: String },

    /// Stop a loop for good
    Stop { name: String },

    /// Manage operator hints
    Hint {
        #[command(subcommand)]
        action: HintAction,
    },

    /// Record that the agent session was rotated
    Rotate { name: String },

    /// Record that the agent's context was compacted
    Compacted { name: String },

    /// Classify a saved agent output file
    Check { file: PathBuf },

    /// Deliver a host event given as JSON, e.g. '{"event":"turn_start"}'
    Event { name: String, json: String },

    /// Move a loop's record to the archive
    Archive { name: String },
}

#[derive(Subcommand)]
enum HintAction {
    /// Add a hint
    Add {
        name: String,
        text: String,

        /// Keep the hint for every future turn instead of just the next one
        #[arg(long)]
        sticky: bool,
    },

    /// Remove a sticky hint by index
    Remove { name: String, index: usize },

    /// List hints
    List { name: String },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose {
        "ralph_loop=debug,info"
    } else {
        "ralph_loop=info,warn"
    };

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn colored_status(status: LoopStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        LoopStatus::Running => label.green(),
        LoopStatus::Paused => label.yellow(),
        LoopStatus::Stuck => label.red(),
        LoopStatus::Completed => label.green().bold(),
        LoopStatus::Aborted => label.red().bold(),
    }
}

fn print_overview(overview: &LoopOverview) {
    let state = &overview.state;
    println!(
        "{} {} ({} mode)",
        state.name.bold(),
        colored_status(state.status),
        state.mode
    );
    println!(
        "   Iteration: {}{}",
        state.iteration,
        state.max_iterations_suffix()
    );
    match overview.checklist {
        Some(progress) => match progress.percent() {
            Some(_) if progress.is_complete() => println!(
                "   Checklist: {} (all items checked) in {}",
                progress,
                state.task_file.display()
            ),
            Some(pct) => println!(
                "   Checklist: {} ({:.0}%, {} open) in {}",
                progress,
                pct,
                progress.remaining(),
                state.task_file.display()
            ),
            None => println!("   Checklist: no items in {}", state.task_file.display()),
        },
        None => println!(
            "   Checklist: {} {} is missing",
            "Warning:".yellow(),
            state.task_file.display()
        ),
    }
    if let Some(item) = &overview.next_item {
        println!("   Next item: {}", item);
    }
    let streak = format!("{}", state.no_progress_streak);
    println!(
        "   No-progress streak: {}",
        if overview.struggling {
            streak.red().to_string()
        } else {
            streak
        }
    );
    if state.reflect_every > 0 {
        println!("   Checkpoint every {} iterations", state.reflect_every);
    }
    println!(
        "   Hints: {} sticky, {} pending",
        state.sticky_hints.len(),
        state.pending_hints.len()
    );
    println!(
        "   Session rotations: {}, compactions: {}",
        state.session_rotations, state.compaction_count
    );
    if let Some(turn) = &state.active_turn {
        println!(
            "   Turn in flight: {} since {}",
            turn.kind,
            turn.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(reason) = state.stop_reason {
        println!("   Stopped: {}", reason);
    }
}

fn print_hints(state: &LoopState) {
    if state.sticky_hints.is_empty() && state.pending_hints.is_empty() {
        println!("No hints for loop '{}'", state.name);
        return;
    }
    for (index, hint) in state.sticky_hints.iter().enumerate() {
        println!("  [{}] {}", index, hint);
    }
    for hint in &state.pending_hints {
        println!("  [next] {}", hint);
    }
}

fn ok(message: impl std::fmt::Display) {
    println!("{} {}", "OK".green().bold(), message);
}

async fn run(cli: Cli, project: &Path) -> anyhow::Result<()> {
    match cli.command {
        Commands::Start {
            name,
            task_file,
            mode,
            max_iterations,
            reflect_every,
        } => {
            let driver = LoopDriver::open(project)?;
            let task_file = task_file
                .unwrap_or_else(|| PathBuf::from(".ralph").join("tasks").join(format!("{name}.md")));
            let state = driver.create(
                NewLoop::new(name, task_file)
                    .with_mode(mode)
                    .with_max_iterations(max_iterations)
                    .with_reflect_every(reflect_every),
            )?;
            ok(format!(
                "Created loop '{}' with task file {}",
                state.name,
                state.task_file.display()
            ));
            println!("\nNext: ralph-loop run {}", state.name);
        }

        Commands::Run {
            name,
            struggle_threshold,
            stuck_policy,
            inactivity_timeout,
        } => {
            let mut settings = Settings::load(project)?;
            if let Some(threshold) = struggle_threshold {
                settings.struggle_threshold = threshold;
            }
            if let Some(policy) = stuck_policy {
                settings.stuck_policy = policy;
            }
            if let Some(secs) = inactivity_timeout {
                settings.inactivity_timeout_secs = secs;
            }

            let driver = LoopDriver::with_settings(project, settings)?;
            let agent = CliAgentRuntime::new(project, &driver.settings().agent);
            agent.ensure_available()?;

            let runner = LoopRunner::new(driver, name, agent);
            let summary = runner
                .run_until(async {
                    if tokio::signal::ctrl_c().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
                .await?;

            match summary.exit {
                RunExit::Finished(_) if summary.status == LoopStatus::Completed => {
                    ok(summary.describe());
                }
                RunExit::Finished(_) => {
                    println!("{} {}", "Stopped:".red().bold(), summary.describe());
                }
                RunExit::Refused(_) | RunExit::Interrupted => {
                    println!("{} {}", "Paused:".yellow().bold(), summary.describe());
                }
            }
        }

        Commands::Status { name, json } => {
            let driver = LoopDriver::open(project)?;
            let overviews = match name {
                Some(name) => vec![driver.overview(&name)?],
                None => driver.list()?,
            };
            if json {
                let states: Vec<&LoopState> = overviews.iter().map(|o| &o.state).collect();
                println!("{}", serde_json::to_string_pretty(&states)?);
            } else if overviews.is_empty() {
                println!("No loops. Create one with `ralph-loop start <name>`");
            } else {
                for overview in &overviews {
                    print_overview(overview);
                    println!();
                }
            }
        }

        Commands::List => {
            let driver = LoopDriver::open(project)?;
            let loops = driver.list()?;
            if loops.is_empty() {
                println!("No loops");
            }
            for overview in loops {
                let progress = overview
                    .checklist
                    .map_or_else(|| "-".to_string(), |p| p.to_string());
                println!(
                    "{:<24} {:<10} iteration {:<6} {}",
                    overview.state.name,
                    colored_status(overview.state.status),
                    format!(
                        "{}{}",
                        overview.state.iteration,
                        overview.state.max_iterations_suffix()
                    ),
                    progress
                );
            }
        }

        Commands::Prompt { name } => {
            let driver = LoopDriver::open(project)?;
            println!("{}", driver.preview_prompt(&name)?);
        }

        Commands::Pause { name } => {
            let state = LoopDriver::open(project)?.pause(&name)?;
            ok(format!("Paused loop '{}'", state.name));
        }

        Commands::Resume { name } => {
            let state = LoopDriver::open(project)?.resume(&name)?;
            ok(format!(
                "Loop '{}' is {}",
                state.name,
                colored_status(state.status)
            ));
        }

        Commands::Stop { name } => {
            let state = LoopDriver::open(project)?.stop(&name)?;
            ok(format!(
                "Stopped loop '{}' at iteration {}",
                state.name, state.iteration
            ));
        }

        Commands::Hint { action } => {
            let driver = LoopDriver::open(project)?;
            match action {
                HintAction::Add { name, text, sticky } => {
                    let scope = if sticky {
                        HintScope::Sticky
                    } else {
                        HintScope::Pending
                    };
                    driver.add_hint(&name, &text, scope)?;
                    ok(if sticky {
                        "Added sticky hint"
                    } else {
                        "Added hint for the next turn"
                    });
                }
                HintAction::Remove { name, index } => {
                    let removed = driver.remove_hint(&name, index)?;
                    ok(format!("Removed hint: {}", removed));
                }
                HintAction::List { name } => {
                    print_hints(&driver.overview(&name)?.state);
                }
            }
        }

        Commands::Rotate { name } => {
            let state = LoopDriver::open(project)?.on_session_rotated(&name)?;
            ok(format!(
                "Recorded session rotation {} for '{}'",
                state.session_rotations, state.name
            ));
        }

        Commands::Compacted { name } => {
            let state = LoopDriver::open(project)?.on_compaction(&name)?;
            ok(format!(
                "Recorded compaction {} for '{}'",
                state.compaction_count, state.name
            ));
        }

        Commands::Check { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            println!("{}", classify(&text));
        }

        Commands::Event { name, json } => {
            let event: HostEvent =
                serde_json::from_str(&json).context("Invalid host event JSON")?;
            let driver = LoopDriver::open(project)?;
            match driver.handle(&name, event)? {
                EventOutcome::TurnStarted(TurnStart::Dispatch(plan)) => println!("{}", plan.prompt),
                EventOutcome::TurnStarted(TurnStart::Refused { reason, .. }) => {
                    println!("refused: {}", reason);
                }
                EventOutcome::TurnStarted(TurnStart::Stopped { reason }) => {
                    println!("stopped: {}", reason);
                }
                EventOutcome::TurnEnded(TurnEnd::Recorded(report)) => {
                    println!("{}", report.status);
                }
                EventOutcome::TurnEnded(TurnEnd::Ignored { status }) => println!("{}", status),
                EventOutcome::Updated(state) => println!("{}", state.status),
                EventOutcome::HintRemoved(text) => println!("{}", text),
                EventOutcome::ToolCall { waiting } => println!("waiting={}", waiting),
                EventOutcome::Inactivity { marked_stuck } => {
                    println!("marked_stuck={}", marked_stuck);
                }
                EventOutcome::Cancelled => println!("cancelled"),
            }
        }

        Commands::Archive { name } => {
            let path = LoopDriver::open(project)?.archive(&name)?;
            ok(format!("Archived loop '{}' to {}", name, path.display()));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let project = cli.project.canonicalize().unwrap_or(cli.project.clone());
    if !project.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project.display()
        );
        return ExitCode::from(1);
    }

    match run(cli, &project).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let code = e.downcast_ref::<LoopError>().map_or(1, LoopError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
