use anyhow::{ensure, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "tidepool-server",
    author,
    version,
    about = "Shared terminal session server with polling sync"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "TIDEPOOL_LISTEN_ADDR", default_value = "127.0.0.1:5000")]
    listen_addr: String,

    /// Soft timeout in seconds before a long-running command releases its
    /// caller (the command keeps running; its output lands later).
    #[arg(long, env = "TIDEPOOL_COMMAND_TIMEOUT_SECS", default_value_t = 30)]
    command_timeout_secs: u64,

    /// Depth of the FIFO command queue; submissions beyond it are rejected
    /// as busy.
    #[arg(long, env = "TIDEPOOL_QUEUE_DEPTH", default_value_t = 8)]
    queue_depth: usize,

    /// Serve HTTP only, without the interactive console.
    #[arg(long, env = "TIDEPOOL_HEADLESS", default_value_t = false)]
    headless: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub command_timeout: Duration,
    pub queue_depth: usize,
    pub headless: bool,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        ensure!(cli.queue_depth >= 1, "queue depth must be at least 1");
        Ok(ServerConfig {
            listen_addr,
            command_timeout: Duration::from_secs(cli.command_timeout_secs),
            queue_depth: cli.queue_depth,
            headless: cli.headless,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_into_a_config() {
        let cli = Cli::parse_from(["tidepool-server"]);
        let config = ServerConfig::try_from(cli).unwrap();
        assert_eq!(config.listen_addr.port(), 5000);
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.queue_depth, 8);
        assert!(!config.headless);
    }

    #[test]
    fn bad_listen_address_is_a_startup_error() {
        let cli = Cli::parse_from(["tidepool-server", "--listen-addr", "nowhere"]);
        assert!(ServerConfig::try_from(cli).is_err());
    }

    #[test]
    fn zero_queue_depth_is_rejected() {
        let cli = Cli::parse_from(["tidepool-server", "--queue-depth", "0"]);
        assert!(ServerConfig::try_from(cli).is_err());
    }
}
