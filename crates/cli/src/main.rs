mod load;
mod summary;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use stepsim_eval::{ExecuteOptions, StateMachine, StateMachineExecutor};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Local Amazon States Language runner.
#[derive(Parser)]
#[command(
    name = "stepsim",
    version,
    about = "Run Amazon States Language state machines locally against mocked services"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a state machine definition
    Run {
        /// Path to the definition (.json, .yaml or .yml)
        definition: PathBuf,
        /// Execution input as inline JSON, or @path to read it from a file
        #[arg(long)]
        input: Option<String>,
        /// Mock configuration file (JSON or YAML)
        #[arg(long)]
        mock: Option<PathBuf>,
        /// Engine configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Step guard override
        #[arg(long)]
        max_steps: Option<usize>,
        /// Include per-state traces and debug logging
        #[arg(long)]
        verbose: bool,
    },

    /// Load and validate a state machine definition
    Validate {
        /// Path to the definition (.json, .yaml or .yml)
        definition: PathBuf,
    },
}

struct RunArgs<'a> {
    definition: &'a Path,
    input: Option<&'a str>,
    mock: Option<&'a Path>,
    config: Option<&'a Path>,
    max_steps: Option<usize>,
    verbose: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if quiet {
        "off"
    } else if verbose {
        "stepsim_eval=debug"
    } else {
        "stepsim_eval=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            definition,
            input,
            mock,
            config,
            max_steps,
            verbose,
        } => {
            init_logging(verbose, cli.quiet);
            cmd_run(
                RunArgs {
                    definition: &definition,
                    input: input.as_deref(),
                    mock: mock.as_deref(),
                    config: config.as_deref(),
                    max_steps,
                    verbose,
                },
                cli.output,
                cli.quiet,
            );
        }
        Commands::Validate { definition } => {
            init_logging(false, cli.quiet);
            cmd_validate(&definition, cli.output, cli.quiet);
        }
    }
}

fn load_machine(path: &Path, output: OutputFormat, quiet: bool) -> StateMachine {
    let doc = match load::read_document(path) {
        Ok(doc) => doc,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match StateMachine::from_value(&doc) {
        Ok(machine) => machine,
        Err(e) => {
            report_error(&format!("invalid definition '{}': {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_run(args: RunArgs<'_>, output: OutputFormat, quiet: bool) {
    let machine = load_machine(args.definition, output, quiet);
    let loaded = load::parse_input(args.input).and_then(|input| {
        let mock = load::load_mock(args.mock)?;
        let config = load::load_config(args.config)?;
        Ok((input, mock, config))
    });
    let (input, mock, config) = match loaded {
        Ok(parts) => parts,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let executor = StateMachineExecutor::new(machine, mock).with_config(config);
    let options = ExecuteOptions {
        max_steps: args.max_steps,
        verbose: args.verbose,
    };
    let result = rt.block_on(executor.execute(input, options));

    match output {
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&result)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            if !quiet || result.success {
                print!("{}", summary::render(&result));
            }
        }
    }
    if !result.success {
        process::exit(1);
    }
}

fn cmd_validate(path: &Path, output: OutputFormat, quiet: bool) {
    let machine = load_machine(path, output, quiet);
    match output {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "valid": true,
                "startAt": machine.start_at,
                "states": machine.states.len(),
                "queryLanguage": machine.query_language.as_str(),
            });
            println!("{}", report);
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{}: valid ({} states, {})",
                    path.display(),
                    machine.states.len(),
                    machine.query_language.as_str()
                );
            }
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({"error": msg}));
        }
    }
}
