//! Command line and environment configuration.
//!
//! ```bash
//! machine_job_server --opcua-port 4840 --ws-port 3000 --tick-interval-ms 1000
//! OPCUA_PORT=4850 AUTO_STOP_AFTER_MS=5000 machine_job_server
//! ```

use clap::Parser;
use std::time::Duration;

use crate::job_control::TickerConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "machine_job_server")]
#[command(about = "OPC UA demo machine with ISA-95 job order control")]
#[command(version)]
pub struct Config {
    /// Host the OPC UA endpoint binds to
    #[arg(long = "opcua-host", default_value = "0.0.0.0", env = "OPCUA_HOST")]
    pub opcua_host: String,

    #[arg(long = "opcua-port", default_value_t = 4840, env = "OPCUA_PORT")]
    pub opcua_port: u16,

    #[arg(long = "application-name", default_value = "MyControledMachine", env = "APPLICATION_NAME")]
    pub application_name: String,

    #[arg(long = "application-uri", default_value = "urn:MyControledMachine", env = "APPLICATION_URI")]
    pub application_uri: String,

    /// Directory holding the server certificate and trusted peers
    #[arg(long = "pki-dir", default_value = "./pki", env = "PKI_DIR")]
    pub pki_dir: String,

    /// Port of the WebSocket/HTTP bridge
    #[arg(long = "ws-port", default_value_t = 3000, env = "WS_PORT")]
    pub ws_port: u16,

    #[arg(long = "tick-interval-ms", default_value_t = 1000, env = "TICK_INTERVAL_MS")]
    pub tick_interval_ms: u64,

    /// Running time after which a job is stopped automatically
    #[arg(long = "auto-stop-after-ms", default_value_t = 10_000, env = "AUTO_STOP_AFTER_MS")]
    pub auto_stop_after_ms: u64,

    /// Leave job progression entirely to remote callers
    #[arg(long = "no-auto-progress", env = "NO_AUTO_PROGRESS")]
    pub no_auto_progress: bool,
}

impl Config {
    pub fn new() -> Self {
        Config::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 {
            return Err("Tick interval must be > 0".to_string());
        }
        if self.opcua_port == self.ws_port {
            return Err(format!(
                "OPC UA and WebSocket ports must differ (both {})",
                self.opcua_port
            ));
        }
        Ok(())
    }

    pub fn auto_progress(&self) -> bool {
        !self.no_auto_progress
    }

    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig {
            interval: Duration::from_millis(self.tick_interval_ms),
            auto_stop_after: Duration::from_millis(self.auto_stop_after_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["machine_job_server"])
    }
}
