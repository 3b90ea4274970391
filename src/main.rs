use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leaky_gate::config::{AdmissionMode, GateConfig};
use leaky_gate::http::HttpServer;
use leaky_gate::meter::build_strategy;

/// HTTP admission control using a leaky bucket as a meter.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Admission mode (meter or queue), case-insensitive
    #[arg(long, env = "MODE")]
    mode: Option<AdmissionMode>,

    /// Listen address, e.g. 0.0.0.0:27009
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Number of unleaked requests at which new requests are dropped
    #[arg(long)]
    capacity: Option<u64>,

    /// Milliseconds between leak ticks
    #[arg(long)]
    leak_rate_ms: Option<u64>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    /// Layer command line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut GateConfig) {
        if let Some(mode) = self.mode {
            config.admission.mode = mode;
        }
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
        if let Some(capacity) = self.capacity {
            config.admission.capacity = capacity;
        }
        if let Some(leak_rate_ms) = self.leak_rate_ms {
            config.admission.leak_rate_ms = leak_rate_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Leaky Gate admission control service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = GateConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    info!(
        addr = %config.server.addr,
        mode = %config.admission.mode,
        capacity = config.admission.capacity,
        leak_rate_ms = config.admission.leak_rate_ms,
        "Configuration loaded"
    );

    let strategy = build_strategy(&config.admission)?;
    let server = HttpServer::from_config(&config.server, strategy);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Leaky Gate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "leaky-gate",
            "--mode",
            "METER",
            "--addr",
            "127.0.0.1:8000",
            "--capacity",
            "12",
            "--leak-rate-ms",
            "500",
        ]);
        let mut config = GateConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.admission.mode, AdmissionMode::Meter);
        assert_eq!(config.server.addr, "127.0.0.1:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.admission.capacity, 12);
        assert_eq!(config.admission.leak_rate_ms, 500);
    }

    #[test]
    fn test_cli_parses_queue_mode_any_case() {
        let cli = Cli::parse_from(["leaky-gate", "--mode", "Queue"]);
        assert_eq!(cli.mode, Some(AdmissionMode::Queue));
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        let result = Cli::try_parse_from(["leaky-gate", "--mode", "bucket"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_json_log_format() {
        let cli = Cli::parse_from(["leaky-gate", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
