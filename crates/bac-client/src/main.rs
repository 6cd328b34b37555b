//! bac client entry point: a command-line tester for a running server.
//!
//! ```text
//! main()
//!  └─ discover (unless --server)     -- wait for a UDP announcement
//!  └─ connect
//!  └─ get_slots                      -- print the roster
//!  └─ request_slot --slot
//!  └─ update_peripherals             -- one sample touch point, if granted
//!  └─ relinquish_slot
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use bac_core::protocol::DEFAULT_BROADCAST_PORT;
use clap::Parser;
use serde_json::{json, Map};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bac_client::{find_server, ControllerClient};

/// Exercises a bac server: list the slots, take one, report input, let go.
#[derive(Debug, Parser)]
#[command(name = "bac-client", version)]
struct Cli {
    /// Server control address.  Skips discovery when given.
    #[arg(long, env = "BAC_SERVER")]
    server: Option<SocketAddr>,

    /// UDP port to listen on for announcements.
    #[arg(long, default_value_t = DEFAULT_BROADCAST_PORT, env = "BAC_DISCOVERY_PORT")]
    discovery_port: u16,

    /// Slot index to request.
    #[arg(long, default_value_t = 0)]
    slot: usize,

    /// Seconds to wait for discovery and for each reply.
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    let addr = match cli.server {
        Some(addr) => addr,
        None => {
            info!("waiting for a server announcement on UDP {}", cli.discovery_port);
            let found = find_server(cli.discovery_port, timeout)
                .await
                .context("discovering server")?;
            info!("found {:?}", found.name);
            found.addr
        }
    };

    let mut client = ControllerClient::connect(addr).await?;

    let slots = client.get_slots(timeout).await.context("get_slots")?;
    for status in &slots {
        let state = if status.available { "free" } else { "taken" };
        info!("slot {}: {} ({state})", status.slot, status.name);
    }

    let granted = client
        .request_slot(cli.slot, timeout)
        .await
        .context("request_slot")?;
    if !granted {
        warn!("slot {} was refused", cli.slot);
        return Ok(());
    }
    info!("holding slot {}", cli.slot);

    let mut update = Map::new();
    update.insert("touch_points".to_string(), json!([[0, 0]]));
    client.update_peripherals(update).await?;

    client.relinquish_slot().await?;
    info!("released slot {}", cli.slot);
    Ok(())
}
