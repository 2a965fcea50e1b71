mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use scl_core::SclError;
use scl_eval::{RunContext, RunError, SclSettings, StepFactoryStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// SCL scripting language toolchain.
#[derive(Parser)]
#[command(name = "scl", version, about = "SCL scripting language toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log every step as it runs
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Settings file listing installed connectors
    #[arg(long, global = true, default_value = "scl.toml")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an SCL program
    Run {
        /// Path to the .scl file
        file: PathBuf,
    },

    /// Parse, type check and verify requirements without running
    Check {
        /// Path to the .scl file
        file: PathBuf,
    },

    /// Print a program in canonical form
    Format {
        /// Path to the .scl file
        file: PathBuf,
    },

    /// List the available steps and their signatures
    Steps {
        /// Only steps whose name contains this text
        filter: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match settings::load(&cli.settings) {
        Ok(s) => s,
        Err(e) => {
            report_error(&e.to_string(), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    let store = Arc::new(StepFactoryStore::with_core_steps());

    match cli.command {
        Commands::Run { file } => cmd_run(&file, store, settings, cli.output, cli.quiet),
        Commands::Check { file } => cmd_check(&file, &store, &settings, cli.output, cli.quiet),
        Commands::Format { file } => cmd_format(&file, &store, cli.output, cli.quiet),
        Commands::Steps { filter } => cmd_steps(&store, filter.as_deref(), cli.output),
    }
}

/// `RUST_LOG` overrides the default filter.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,scl=debug,scl_eval=debug,scl_core=debug")
        } else {
            EnvFilter::new("warn,scl=info")
        }
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_program(file: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", file.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_run(file: &Path, store: Arc<StepFactoryStore>, settings: SclSettings, output: OutputFormat, quiet: bool) {
    let text = read_program(file, output, quiet);
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let token = CancellationToken::new();
    let context = Arc::new(
        RunContext::new(store)
            .with_settings(settings)
            .with_cancellation(token.clone()),
    );

    let result = runtime.block_on(async move {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted; cancelling run");
                token.cancel();
            }
        });
        scl_eval::run(&text, context).await
    });

    match result {
        Ok(value) => debug!(result = %value.serialize(), "program finished"),
        Err(RunError::Cancelled) => {
            report_error("run cancelled", output, quiet);
            process::exit(130);
        }
        Err(RunError::Failed(e)) => {
            report_scl_error(&e, output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_check(file: &Path, store: &Arc<StepFactoryStore>, settings: &SclSettings, output: OutputFormat, quiet: bool) {
    let text = read_program(file, output, quiet);
    match scl_eval::check(&text, store, settings) {
        Ok(_) => {
            if !quiet {
                match output {
                    OutputFormat::Text => println!("{}: ok", file.display()),
                    OutputFormat::Json => println!("{}", serde_json::json!({ "ok": true })),
                }
            }
        }
        Err(e) => {
            report_scl_error(&e, output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_format(file: &Path, store: &Arc<StepFactoryStore>, output: OutputFormat, quiet: bool) {
    let text = read_program(file, output, quiet);
    match scl_eval::format(&text, store) {
        Ok(formatted) => match output {
            OutputFormat::Text => println!("{}", formatted),
            OutputFormat::Json => println!("{}", serde_json::json!({ "formatted": formatted })),
        },
        Err(e) => {
            report_scl_error(&e, output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_steps(store: &StepFactoryStore, filter: Option<&str>, output: OutputFormat) {
    let filter = filter.map(str::to_ascii_lowercase);
    let mut descriptors: Vec<_> = store
        .factories()
        .map(|f| f.descriptor())
        .filter(|d| {
            filter
                .as_deref()
                .map_or(true, |f| d.name.to_ascii_lowercase().contains(f))
        })
        .collect();
    descriptors.sort_by_key(|d| d.name);

    match output {
        OutputFormat::Text => {
            for d in descriptors {
                println!("{}", d.signature());
                if !d.summary.is_empty() {
                    println!("    {}", d.summary);
                }
            }
        }
        OutputFormat::Json => {
            let steps: Vec<serde_json::Value> = descriptors
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "name": d.name,
                        "aliases": d.aliases,
                        "signature": d.signature(),
                        "summary": d.summary,
                    })
                })
                .collect();
            let pretty = serde_json::to_string_pretty(&steps)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
    }
}

fn report_scl_error(error: &SclError, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", error),
        OutputFormat::Json => {
            let errors: Vec<String> = error.errors().iter().map(|e| e.as_string()).collect();
            eprintln!("{}", serde_json::json!({ "errors": errors }));
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
