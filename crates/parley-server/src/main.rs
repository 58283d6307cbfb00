//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # One room on the default port, addressed delivery
//! parley-server
//!
//! # Two independent rooms, broadcast to everyone, replay history to newcomers
//! parley-server --bind 0.0.0.0:7890 --bind 0.0.0.0:7891 --delivery broadcast --replay-history
//! ```

use clap::{Parser, ValueEnum};
use parley_core::{DEFAULT_HISTORY_CAPACITY, DeliveryPolicy, RoomConfig, SessionConfig};
use parley_server::{DEFAULT_BIND_ADDRESS, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Routing mode for delivered messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Delivery {
    /// Only the member named by `Recipient:<id>` receives the message
    Addressed,
    /// Every member receives the message
    Broadcast,
}

/// Parley chat server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Parley framed text chat server")]
#[command(version)]
struct Args {
    /// Address to bind to; repeat for several endpoints, each with its own room
    #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
    bind: Vec<String>,

    /// How messages are routed within a room
    #[arg(long, value_enum, default_value = "addressed")]
    delivery: Delivery,

    /// Do not echo broadcast messages back to their sender
    #[arg(long)]
    exclude_sender: bool,

    /// Send recent history to each client when it joins
    #[arg(long)]
    replay_history: bool,

    /// Number of recent messages kept per room
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    /// Do not send the `Your ID: <id>` greeting on connect
    #[arg(long)]
    no_greeting: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn runtime_config(self) -> ServerRuntimeConfig {
        let delivery = match self.delivery {
            Delivery::Addressed => DeliveryPolicy::Addressed,
            Delivery::Broadcast => {
                DeliveryPolicy::Broadcast { include_sender: !self.exclude_sender }
            },
        };

        ServerRuntimeConfig {
            bind_addresses: self.bind,
            room: RoomConfig {
                delivery,
                replay_history: self.replay_history,
                history_capacity: self.history,
            },
            session: SessionConfig { greeting: !self.no_greeting },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley server starting");

    if args.exclude_sender && args.delivery == Delivery::Addressed {
        tracing::warn!("--exclude-sender only applies to broadcast delivery");
    }

    let config = args.runtime_config();
    tracing::info!("Binding to {}", config.bind_addresses.join(", "));

    let server = Server::bind(config).await?;

    for addr in server.local_addrs() {
        tracing::info!("Server listening on {}", addr);
    }

    server.run().await?;

    Ok(())
}
