use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{ClientSettings, ShipmentStore, StoreError, TrackingClient};
use shared::domain::{Courier, Shipment, SortOrder};
use storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tracker", about = "Track parcels across couriers")]
struct Cli {
    #[arg(long, default_value = "sqlite://tracker.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tracked shipments.
    List {
        #[arg(long, default_value = "date")]
        sort: SortOrder,
    },
    /// Look a tracking code up and start tracking it.
    Add {
        code: String,
        #[arg(long)]
        courier: Courier,
    },
    Delete {
        id: String,
    },
    /// Refresh every shipment. Ctrl-C abandons the batch without saving.
    Refresh,
    Couriers,
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    SetApiKey {
        key: String,
    },
    /// An empty value resets to the built-in proxy url.
    SetProxyUrl {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Config(command) => run_config(&storage, command).await,
        Command::Couriers => {
            for courier in Courier::ALL {
                println!(
                    "{:<14} {:<16} {}",
                    courier.id(),
                    courier.label(),
                    courier.provider_code().unwrap_or("(no api lookup)")
                );
            }
            Ok(())
        }
        command => {
            let config = ClientSettings::resolve(&storage).await?;
            info!(proxy_url = %config.proxy_url, "using tracking proxy");
            let store = ShipmentStore::new(storage, Arc::new(TrackingClient::new(config)));
            run_shipments(&store, command).await
        }
    }
}

async fn run_shipments(store: &ShipmentStore, command: Command) -> Result<()> {
    match command {
        Command::List { sort } => {
            let shipments = store.list_sorted(sort).await?;
            if shipments.is_empty() {
                println!("no shipments tracked yet");
            }
            for shipment in &shipments {
                println!("{}", render_shipment(shipment));
            }
        }
        Command::Add { code, courier } => {
            let shipment = store.add(&code, courier).await?;
            println!("{}", render_shipment(&shipment));
        }
        Command::Delete { id } => {
            if store.delete(&id).await? {
                println!("deleted {id}");
            } else {
                println!("no shipment with id {id}");
            }
        }
        Command::Refresh => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; abandoning refresh");
                    on_interrupt.cancel();
                }
            });

            match store.refresh_all_with_cancel(&cancel).await {
                Ok(shipments) => {
                    for shipment in &shipments {
                        println!("{}", render_shipment(shipment));
                    }
                }
                Err(StoreError::Cancelled) => println!("refresh cancelled; nothing saved"),
                Err(error) => return Err(error.into()),
            }
        }
        Command::Couriers | Command::Config(_) => {}
    }
    Ok(())
}

async fn run_config(storage: &Storage, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = ClientSettings::resolve(storage).await?;
            println!("api_key   = {}", mask_secret(&config.api_key));
            println!("proxy_url = {}", config.proxy_url);
            println!("timeout   = {}s", config.timeout.as_secs());
        }
        ConfigCommand::SetApiKey { key } => {
            storage.save_api_key(&key).await?;
            println!("api key saved");
        }
        ConfigCommand::SetProxyUrl { url } => {
            storage.save_proxy_url(&url).await?;
            let config = ClientSettings::resolve(storage).await?;
            println!("proxy_url = {}", config.proxy_url);
        }
    }
    Ok(())
}

fn render_shipment(shipment: &Shipment) -> String {
    let mut line = format!(
        "{}  {:<20} {:<16} {:<11} {}",
        shipment.id,
        shipment.tracking_code,
        shipment.courier.label(),
        shipment.status.label(),
        shipment.last_updated.format("%Y-%m-%d %H:%M"),
    );
    if shipment.degraded {
        line.push_str(" [degraded]");
    }
    if let Some(first) = shipment.summary.lines().next() {
        line.push_str("\n    ");
        line.push_str(first);
    }
    line
}

fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let tail: String = secret.chars().skip(len - 4).collect();
    format!("****{tail}")
}
