//! TwinBridge - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;
use twinbridge::repl::LineRepl;
use twinbridge::util::config::BridgeConfig;
use twinbridge::util::logger;
use twinbridge::{run, run_file, Session, NAME, VERSION};

/// Run command scripts that call into an embedded object runtime
#[derive(Parser, Debug)]
#[command(name = "twinbridge")]
#[command(author = "TwinBridge Team")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (RON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command script file
    Run {
        /// Script file to run
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Evaluate a command script from the command line
    Eval {
        /// Script to evaluate
        #[arg(value_name = "CODE")]
        code: String,
    },

    /// Run the bridge command directly: call, eval or import
    Guest {
        /// Subcommand and its arguments
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Start an interactive session
    Repl,

    /// Print version information
    Version,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    logger::init_cli(config.level()?, args.verbose);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match args.command {
        Commands::Run { file } => {
            let result =
                run_file(&file, config).with_context(|| format!("Failed to run: {}", file.display()))?;
            print_result(&result);
        }
        Commands::Eval { code } => {
            let result = run(&code, config).context("Failed to evaluate code")?;
            print_result(&result);
        }
        Commands::Guest { args } => {
            let session = Session::start(config)?;
            let result = session.guest(&args);
            print!("{}", session.take_output());
            print_result(&result?);
        }
        Commands::Repl => {
            let session = Session::start(config)?;
            LineRepl::new(session)?.run()?;
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}

fn print_result(result: &str) {
    if !result.is_empty() {
        println!("{}", result);
    }
}
