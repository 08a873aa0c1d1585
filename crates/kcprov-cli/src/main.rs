mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{exit_code_for, RequestArgs, RetryArgs};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kcprov",
    version,
    about = "Idempotent identity-provider provisioning for workspace deployments"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Bring the identity service in line with a workspace request and print
    /// the client secret.
    Provision {
        #[command(flatten)]
        request: RequestArgs,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Wait until the identity service answers, without changing anything.
    Wait {
        /// Base URL of the identity service (overrides auth_url from the request file).
        #[arg(long)]
        url: Option<String>,
        /// Request file to take auth_url from.
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KCPROV_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Provision { request, retry } => {
            commands::provision::run(&request, &retry, json_output)
        }
        Commands::Wait { url, config, retry } => {
            commands::wait::run(url.as_deref(), config.as_deref(), &retry, json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}
