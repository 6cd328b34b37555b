//! bac server entry point.
//!
//! Loads the configuration, applies command-line overrides, binds the
//! [`Server`] and drives its event loop from a Tokio interval until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (file → defaults) + CLI overrides
//!  └─ Server::bind()          -- control listener + discovery socket
//!  └─ loop on current_thread runtime
//!       ├─ tick  → Server::process()
//!       └─ Ctrl-C → stop
//! ```
//!
//! The server itself never blocks; the interval is only there so that an
//! idle broker does not spin a core.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bac_server::infrastructure::storage::config::{self, AppConfig};
use bac_server::Server;

/// Slot names used when neither the file nor the command line names any.
const DEFAULT_SLOTS: &[&str] = &["Slot 1", "Slot 2"];

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LAN input broker: hands out controller slots to devices on the network.
#[derive(Debug, Parser)]
#[command(name = "bac-server", version)]
struct Cli {
    /// Configuration file.  Defaults to the platform config directory.
    #[arg(long, env = "BAC_CONFIG")]
    config: Option<PathBuf>,

    /// Server name carried in the discovery announcement.
    #[arg(long, env = "BAC_NAME")]
    name: Option<String>,

    /// Slot name; repeat once per slot.  Replaces the configured slots.
    #[arg(long = "slot", value_name = "NAME")]
    slots: Vec<String>,

    /// Accept connections from this machine only.
    #[arg(long)]
    local: bool,

    /// Control port (0 = any free port).
    #[arg(long, env = "BAC_PORT")]
    port: Option<u16>,
}

impl Cli {
    /// Overlays the command-line values on top of `cfg`.
    fn apply(self, cfg: &mut AppConfig) {
        if let Some(name) = self.name {
            cfg.server.name = name;
        }
        if !self.slots.is_empty() {
            cfg.server.slots = self.slots;
        }
        if self.local {
            cfg.network.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST).to_string();
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_default_config().context("loading default config")?,
    };
    cli.apply(&mut cfg);

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    let options = cfg.to_options().context("invalid network settings")?;
    let mut server = Server::bind(&options).context("starting server")?;

    if cfg.server.slots.is_empty() {
        cfg.server.slots = DEFAULT_SLOTS.iter().map(|s| s.to_string()).collect();
    }
    for name in &cfg.server.slots {
        server.add_slot(name.clone());
    }

    info!(
        "bac server {:?} ready on {} with {} slots.  Press Ctrl-C to exit.",
        server.name(),
        server.local_addr(),
        cfg.server.slots.len()
    );

    let mut ticker = tokio::time::interval(cfg.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => server.process(),
            result = &mut shutdown => {
                result.context("listening for Ctrl-C")?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("bac server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
