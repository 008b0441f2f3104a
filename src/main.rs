use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lib::calendar::scheduler::CalendarScheduler;
use lib::config::{CalendarDefinition, Config};
use lib::nostr::client::NostrClient;
use log::*;

/// Republishes a Nostr calendar assembled from other people's events.
#[derive(Parser)]
#[command(name = "calendarmaker", version)]
struct Cli {
    /// Relay list and identity.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Calendar metadata and search list.
    #[arg(long, default_value = "calendarconfig.json")]
    calendar: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    let mut calendar = CalendarDefinition::load(&cli.calendar)?;

    let (keys, identity_updated) = config.ensure_identity()?;
    if identity_updated {
        config.save(&cli.config).context("saving config")?;
    }
    if calendar.ensure_uuid() {
        calendar.save(&cli.calendar).context("saving calendar")?;
    }

    info!("Maintaining calendar {} as {}", calendar.uuid, keys.public_key());

    let mut client = NostrClient::new(config.timing());
    client.connect(&config.relays(), config.max_relays()).await;

    let mut scheduler = CalendarScheduler::new(client, keys, calendar);
    scheduler.run().await;

    Ok(())
}
