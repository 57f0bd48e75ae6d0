//! Larder CLI entry point.

use clap::Parser;
use larder::cli::commands;
use larder::cli::{Cli, Commands, PublishCommands};
use larder::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // The run loop is long-lived; its log lines need timestamps.
    let daemon = matches!(
        cli.command,
        Commands::Publish {
            command: PublishCommands::Run { .. }
        }
    );
    init_tracing(cli.verbose, cli.quiet, daemon);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool, timestamps: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 if timestamps => EnvFilter::new("info"),
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if timestamps {
        builder.init();
    } else {
        builder.without_time().init();
    }
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Store { command } => commands::store::execute(command, cli.config.as_ref(), json),
        Commands::Publish { command } => {
            commands::publish::execute(command, cli.config.as_ref(), json)
        }
        Commands::Export { command } => {
            commands::export::execute(command, cli.config.as_ref(), json)
        }
        Commands::Status => commands::status::execute(cli.config.as_ref(), json),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
