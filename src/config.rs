use clap::Parser;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;

/// Yeego - HTTP control surface for Yeelight smart lights
#[derive(Debug, Clone, Parser)]
#[command(name = "yeego", version, about)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "YEEGO_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Seconds the initial search and each rescan listen for answers
    #[arg(long, default_value_t = 3)]
    pub search_secs: u64,

    /// Seconds between periodic rescans
    #[arg(long, default_value_t = 60)]
    pub rescan_secs: u64,

    /// Milliseconds a command waits for its reply
    #[arg(long, default_value_t = 2000)]
    pub command_timeout_ms: u64,

    /// Milliseconds allowed for opening a light's control socket
    #[arg(long, default_value_t = 2000)]
    pub connect_timeout_ms: u64,

    /// Messages buffered for the dispatcher before the oldest are dropped
    #[arg(long, default_value_t = 256)]
    pub event_capacity: usize,

    /// Only manage lights whose id, model or name contains this text
    #[arg(long, default_value = "")]
    pub filter: String,

    /// Do not listen for SSDP advertisements between rescans
    #[arg(long)]
    pub no_monitor: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    pub fn search_duration(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Log filter for the configured verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info,yeego=info",
            1 => "info,yeego=debug",
            2 => "debug",
            _ => "trace",
        }
    }
}
