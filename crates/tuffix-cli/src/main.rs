use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod completion;
mod confirm;
mod dispatch;
mod render;
mod status;

use completion::CliCompletionShell;
use dispatch::{exit_code_for_error, run_cli};
use render::{render_status_line, stderr_output_style};

const LOG_ENV: &str = "TUFFIX_LOG";

#[derive(Parser, Debug)]
#[command(name = "tuffix")]
#[command(version, about = "Keyword-driven package setup for Ubuntu course machines", long_about = None)]
struct Cli {
    /// Build configuration file (default: /etc/tuffix/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the state directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize tuffix state on this host
    Init,
    /// Install one or more keywords ('all' for the whole catalog)
    Add { names: Vec<String> },
    /// Remove one or more keywords ('all' for everything installed)
    Remove { names: Vec<String> },
    /// Import keyword definition files and install them
    Custom { paths: Vec<PathBuf> },
    /// Print a keyword's description
    Describe { name: String },
    /// List the available keywords
    List,
    /// List the installed keywords
    Installed,
    /// Report on this host and its tuffix state
    Status,
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!(
                "{}",
                render_status_line(stderr_output_style(), "error", &format!("{err:#}"))
            );
            ExitCode::from(exit_code_for_error(&err))
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
