//! devloop - run several dev-mode commands side by side and keep them alive.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use devloop::config::{ConfigLoader, DevConfig};
use devloop::process::GroupLauncher;
use devloop::session::DevSession;
use devloop::status::{StatusRenderer, TerminalRenderer, TracingRenderer};

#[derive(Parser)]
#[command(
    name = "devloop",
    about = "Supervise dev-mode commands with restart on change",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured role until Ctrl-C.
    Run {
        /// Config file to use instead of the search path.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Show stdout of every role before all of them are ready.
        #[arg(long)]
        debug: bool,
        /// Emit status as log events instead of the colored view.
        #[arg(long)]
        log_output: bool,
    },
    /// Validate the configuration and print the resolved roles.
    Check {
        /// Config file to use instead of the search path.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn loader(path: Option<PathBuf>) -> ConfigLoader {
    path.map_or_else(ConfigLoader::new, ConfigLoader::with_path)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = match cli.command {
        // Status lines are info events, keep them visible.
        Commands::Run {
            log_output: true, ..
        } => cli.verbose.max(1),
        _ => cli.verbose,
    };
    init_tracing(verbosity);

    match cli.command {
        Commands::Run {
            config,
            debug,
            log_output,
        } => {
            let mut config = match loader(config).load() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{} {e}", "error:".red().bold());
                    return ExitCode::FAILURE;
                }
            };
            config.debug |= debug;
            let renderer: Arc<dyn StatusRenderer> = if log_output {
                Arc::new(TracingRenderer)
            } else {
                Arc::new(TerminalRenderer::new("devloop").with_links(config.links.clone()))
            };
            run(&config, renderer).await
        }
        Commands::Check { config } => match loader(config).load() {
            Ok(config) => {
                print_roles(&config);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} {e}", "error:".red().bold());
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(config: &DevConfig, renderer: Arc<dyn StatusRenderer>) -> ExitCode {
    let cancel = CancellationToken::new();

    let mut session = match DevSession::new(config, renderer, Arc::new(GroupLauncher), cancel.clone())
    {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, shutting down");
                ctrl_c.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    tracing::info!(roles = config.roles.len(), "Starting session");
    session.start();
    session.wait().await;
    let report = session.shutdown().await;

    tracing::debug!(report = %report, "Session report");
    if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        for (role, e) in report.failures() {
            eprintln!("{} [{role}] {e}", "error:".red().bold());
        }
        ExitCode::FAILURE
    }
}

fn print_roles(config: &DevConfig) {
    for role in &config.roles {
        let command = match role.command() {
            Ok(spec) => spec.display_line(),
            Err(e) => format!("<{e}>"),
        };
        println!("{} {}", role.name.bold(), command);
        println!("    cwd: {}", role.path.display());
        if !role.ready_sentinels.is_empty() {
            println!("    ready when output contains: {:?}", role.ready_sentinels);
        }
        if let Some(watch) = role.watch_spec() {
            println!("    watch: {}", watch.root.display());
        }
    }
}
