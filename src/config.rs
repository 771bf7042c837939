//! Process configuration from command-line flags and environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::error::Result;
use crate::miner::Difficulty;

#[derive(Parser, Debug, Clone)]
#[command(name = "mailchain", version, about)]
pub struct Config {
    /// Address the HTTP API listens on.
    #[arg(long, env = "MAILCHAIN_LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Leading zero hex characters required of each sealed block digest.
    #[arg(long, env = "MAILCHAIN_DIFFICULTY", default_value_t = 2)]
    pub difficulty: u8,

    /// Seconds between background seals of pending records; 0 disables them.
    #[arg(long, env = "MAILCHAIN_SEAL_INTERVAL_SECS", default_value_t = 300)]
    pub seal_interval_secs: u64,
}

impl Config {
    /// Validated work target. Fails for difficulties the nonce space cannot cover.
    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(self.difficulty)
    }

    pub fn seal_interval(&self) -> Option<Duration> {
        (self.seal_interval_secs > 0).then(|| Duration::from_secs(self.seal_interval_secs))
    }
}
