//! rover plugin entry point.
//!
//! Runs without an async runtime: namespace switches bind the calling
//! thread, so all route work stays on the main thread.

use std::io::{Read, Write};

use clap::Parser;
use clap::error::ErrorKind;
use color_eyre::eyre::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use rover::cli::{Cli, DEFAULT_VERSION, error_response, requested_version, usage_error};
use rover_network::NamespaceRouteApplier;

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse environment and arguments
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let response = error_response(&usage_error(&e), DEFAULT_VERSION);
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer(&mut stdout, &response)?;
            stdout.flush()?;
            std::process::exit(1);
        }
    };

    // Initialize tracing; stdout is reserved for the result
    let directive = if cli.debug { "rover=debug" } else { "rover=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let mut stdin = Vec::new();
    if cli.command.reads_stdin() {
        std::io::stdin().read_to_end(&mut stdin)?;
    }

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = cli.execute(NamespaceRouteApplier::new(), &stdin, &mut stdout) {
        tracing::error!(error = %err, "Command failed");
        serde_json::to_writer(&mut stdout, &error_response(&err, &requested_version(&stdin)))?;
        stdout.flush()?;
        std::process::exit(1);
    }

    Ok(())
}
