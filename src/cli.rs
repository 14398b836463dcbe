// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "xfer",
    about = "Bidirectional sync for a content-addressed artifact store",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (overrides the normal search path).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync server, accepting requests at `/xfer`.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Read-only sync: fetch everything the remote has that we don't.
    Pull {
        /// Remote sync endpoint, e.g. `http://example.com/xfer`.
        url: String,
        #[arg(long, env = "XFER_USER")]
        user: Option<String>,
        #[arg(long, env = "XFER_SECRET")]
        secret: Option<String>,
    },

    /// Write-only sync: send everything the remote doesn't have.
    Push {
        url: String,
        #[arg(long, env = "XFER_USER")]
        user: Option<String>,
        #[arg(long, env = "XFER_SECRET")]
        secret: Option<String>,
    },

    /// Bidirectional sync, seeded as a fresh clone of the remote.
    Clone {
        url: String,
        #[arg(long, env = "XFER_USER")]
        user: Option<String>,
        #[arg(long, env = "XFER_SECRET")]
        secret: Option<String>,
    },

    /// Print the effective merged configuration and exit.
    ShowConfig,

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
