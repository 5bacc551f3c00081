//! Tasbih - shared counter for group dhikr
//!
//! One binary for both sides: `serve` runs the counter authority, every other
//! subcommand is a device talking to it.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tasbih_core::{CounterService, CounterStore, MemoryStore, SqliteStore};
use tasbih_net::{Client, CounterApi, ErrorKind, JoinLink, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod agent;
mod cli;
mod config;
mod session;
mod state;

use cli::{Cli, Command};
use config::{AppConfig, ServerConfig};
use state::AppState;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    cli.apply_overrides(&mut config);

    // RUST_LOG wins over the configured default
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log.filter).context("Invalid log filter")?,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Serve { .. } => runtime.block_on(serve(&config.server)),
        command => {
            let app_state = AppState::new().context("Failed to open local state")?;
            runtime.block_on(device(command, &config, &app_state))
        }
    }
}

async fn serve(config: &ServerConfig) -> anyhow::Result<()> {
    tracing::info!("Starting tasbih server");
    match &config.database {
        Some(path) => {
            let store = SqliteStore::open(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?;
            run_server(store, config).await
        }
        None => {
            tracing::warn!("No database configured, counters are kept in memory");
            run_server(MemoryStore::new(), config).await
        }
    }
}

async fn run_server<S: CounterStore + 'static>(store: S, config: &ServerConfig) -> anyhow::Result<()> {
    let service = Arc::new(CounterService::new(store));
    let server = Server::start(config.bind, service)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    println!("Serving counters on {}", server.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    server.shutdown();
    Ok(())
}

async fn device(command: Command, config: &AppConfig, state: &AppState) -> anyhow::Result<()> {
    let client = Arc::new(
        Client::new(config.client.server.clone()).with_timeout(config.client.request_timeout()),
    );
    let link_for = |id| JoinLink::new(config.client.join_base_url.clone(), id);

    match command {
        Command::Serve { .. } => bail!("serve runs without a device identity"),
        Command::Name { name } => {
            let profile = state.set_name(&name)?;
            println!(
                "Display name set to {}",
                profile.participant_name.unwrap_or_default()
            );
        }
        Command::Haptics { state: toggle } => {
            state.set_haptics(toggle.enabled())?;
            println!("Haptics {}", if toggle.enabled() { "on" } else { "off" });
        }
        Command::Whoami => {
            let profile = state.profile()?;
            match profile.participant_name {
                Some(name) => println!("{}", name),
                None => println!("(no display name set)"),
            }
            println!("haptics: {}", if profile.haptics_enabled { "on" } else { "off" });
            println!("data: {}", state.data_dir().display());
        }
        Command::Create { goal } => {
            let Some(identity) = state.identity()? else {
                bail!("Set a display name first: tasbih name <NAME>");
            };
            let counter = client
                .create(goal, &identity.name)
                .await
                .context("Failed to create counter")?;
            let link = link_for(counter.id);
            println!("Counter {} created, goal {}", counter.id, counter.goal);
            println!("Share: {}", link);
            session::run(client, link, Some(identity), config.client.agent_config(), state).await?;
        }
        Command::Join { code } => {
            let id = JoinLink::parse_id(&code)?;
            let identity = state.identity()?;
            let me = identity.as_ref().map(|i| i.name.as_str());
            match client.get_state(id).await {
                Ok(counter) => println!("{}", session::progress_line(&counter, me)),
                Err(e) if e.kind() == Some(ErrorKind::NotFound) => {
                    bail!("No counter with id {}", id)
                }
                Err(e) => return Err(e).context("Failed to reach the server"),
            }
            session::run(client, link_for(id), identity, config.client.agent_config(), state).await?;
        }
        Command::Open { code } => {
            let id = JoinLink::parse_id(&code)?;
            let identity = state.identity()?;
            session::run(client, link_for(id), identity, config.client.agent_config(), state).await?;
        }
        Command::Status { code } => {
            let id = JoinLink::parse_id(&code)?;
            let counter = client.get_state(id).await?;
            let identity = state.identity()?;
            let me = identity.as_ref().map(|i| i.name.as_str());
            println!("{}", session::progress_line(&counter, me));
            if counter.is_completed {
                println!("completed");
            } else {
                println!("{} to go", counter.remaining());
            }
        }
    }
    Ok(())
}
