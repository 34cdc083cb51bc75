//! The executable entrypoint.
// SPDX-License-Identifier: GPL-2.0-or-later

use anyhow::Result;
use clap::Parser;

fn inner_main() -> Result<()> {
    // Write logs to stderr; several commands print machine-consumable
    // output (branch lists, target names) to stdout.
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    tracing::trace!("starting");
    fedpkg::cli::Cli::parse().run()
}

fn main() {
    if let Err(e) = inner_main() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
