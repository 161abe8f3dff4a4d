//! Vellum command-line binary.
//!
//! # Usage
//!
//! ```bash
//! export VELLUM_PICKLE_KEY=...
//!
//! # Create a session from a received session key
//! vellum import-share --input room.key --session room.pickle
//!
//! # Decrypt a message (the session file is updated)
//! vellum decrypt --session room.pickle --message msg.b64
//!
//! # Hand out history from index 10 onwards
//! vellum export --session room.pickle --index 10
//! ```

use std::io;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vellum_cli::{Cli, run};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let mut stdout = io::stdout().lock();
    if let Err(err) = run(&cli, &mut stdout) {
        tracing::error!(error = %err, "command failed");
        return Err(err.into());
    }

    Ok(())
}
