// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use xfer_client::{ClientConfig, HttpTransport, SyncMode};
use xfer_core::crosslink::NoopCrosslink;
use xfer_core::delta::NullDeltaCodec;
use xfer_core::hash::DualHasher;
use xfer_core::session::{Session, SessionPolicy};
use xfer_core::store::InMemoryStore;
use xfer_core::Engines;
use xfer_server::creds::{AnonymousOnlyCredentials, StaticCredentials};
use xfer_server::{AppState, HandlerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::ShowConfig => {
            let config = xfer_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            Ok(())
        }
        Commands::Serve { bind } => run_serve(&cli, bind.as_deref()).await,
        Commands::Pull { url, user, secret } => run_sync_command(&cli, url, SyncMode::Pull, user.clone(), secret.clone()).await,
        Commands::Push { url, user, secret } => run_sync_command(&cli, url, SyncMode::Push, user.clone(), secret.clone()).await,
        Commands::Clone { url, user, secret } => run_sync_command(&cli, url, SyncMode::Clone, user.clone(), secret.clone()).await,
    }
}

async fn run_serve(cli: &Cli, bind_override: Option<&str>) -> anyhow::Result<()> {
    let config = xfer_config::load(cli.config.as_deref())?;
    let bind_addr = bind_override.unwrap_or(&config.server.bind_addr).to_string();

    let creds: Arc<dyn xfer_core::auth::Credentials> = if config.users.is_empty() {
        Arc::new(AnonymousOnlyCredentials)
    } else {
        let table: HashMap<String, (String, String)> = config
            .users
            .iter()
            .map(|u| (u.name.clone(), (u.secret.clone(), u.capabilities.clone())))
            .collect();
        Arc::new(StaticCredentials::new(table))
    };

    let handler_config = HandlerConfig {
        server_code: config.sync.server_code.clone().unwrap_or_default(),
        project_code: config.sync.project_code.clone().unwrap_or_default(),
    };

    let state = AppState::new(InMemoryStore::new(), creds, handler_config);
    xfer_server::serve(&bind_addr, state).await
}

async fn run_sync_command(
    cli: &Cli,
    url: &str,
    mode: SyncMode,
    user: Option<String>,
    secret: Option<String>,
) -> anyhow::Result<()> {
    let config = xfer_config::load(cli.config.as_deref())?;

    let mut store = InMemoryStore::new();
    let hasher = DualHasher;
    let delta = NullDeltaCodec;
    let mut crosslink = NoopCrosslink;
    let mut engines =
        Engines { store: &mut store, hasher: &hasher, delta: &delta, crosslink: &mut crosslink };
    let mut session = Session::new(SessionPolicy::client_default());

    let client_config = ClientConfig {
        server_code: config.sync.server_code.clone().unwrap_or_default(),
        project_code: config.sync.project_code.clone().unwrap_or_default(),
        mode,
        user,
        secret,
        cookie: config.sync.cookie.clone(),
        client_version: 3,
        compress: config.server.compress,
    };

    let transport = HttpTransport::new(url);
    let report = xfer_client::run_sync(&transport, &mut engines, &mut session, &client_config)
        .await
        .context("sync failed")?;

    println!(
        "{} cycles, {} files received, {} files sent, {} errors",
        report.cycles, report.files_received, report.files_sent, report.errors
    );
    if let Some(skew) = report.skew {
        println!("warning: clock skew of {}s detected against the remote", skew.seconds);
    }
    if report.errors > 0 {
        anyhow::bail!("sync completed with {} error(s)", report.errors);
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
