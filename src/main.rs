use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wavecrew::retry::FailAction;
use wavecrew::runner::{self, RunnerConfig};
use wavecrew::schedule::DEFAULT_PARALLEL;

#[derive(Parser)]
#[command(name = "crew")]
#[command(version)]
#[command(about = "Wave-scheduling task orchestrator for code-generation agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run every eligible task, wave by wave")]
    Run {
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_PARALLEL,
            help = "Maximum concurrent agent processes"
        )]
        parallel: usize,

        #[arg(long, help = "Plan the next wave without launching agents")]
        dry_run: bool,

        #[arg(long, help = "Never prompt; apply --on-fail to every failure")]
        non_interactive: bool,

        #[arg(
            long,
            value_enum,
            default_value = "skip",
            help = "What to do with failed tasks when not prompting"
        )]
        on_fail: FailAction,

        #[arg(long, help = "Abort the run when a verification gate fails")]
        fail_fast: bool,

        #[arg(long, help = "Skip the post-wave verification gate")]
        no_verify: bool,

        #[arg(
            short,
            long,
            default_value = ".",
            help = "Project directory containing tasks.json"
        )]
        dir: PathBuf,
    },

    #[command(about = "Show the task board without running anything")]
    Status {
        #[arg(
            short,
            long,
            default_value = ".",
            help = "Project directory containing tasks.json"
        )]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            parallel,
            dry_run,
            non_interactive,
            on_fail,
            fail_fast,
            no_verify,
            dir,
        } => {
            let config = RunnerConfig {
                project_dir: dir,
                parallel: parallel.max(1),
                dry_run,
                non_interactive,
                on_fail,
                fail_fast,
                no_verify,
            };
            runner::run(config).await.map(|_| ())
        }
        Commands::Status { dir } => runner::show_status(&dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
