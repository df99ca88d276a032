// Feeds newline-delimited JSON snapshots from stdin through the Kafka backend

use anyhow::{Context, Result};
use clap::Parser;
use kafka_backend::config::{BackendConfig, ConfigBuilder};
use kafka_backend::error::BackendError;
use kafka_backend::events::EventBus;
use kafka_backend::prelude::{FlushSnapshot, KafkaBackend};
use kafka_backend::stats;
use kafka_backend::util::logging;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    name = "kafka-backend",
    version,
    about = "Flush statsd snapshots to the Kafka REST proxy"
)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix for configuration environment variables
    #[arg(long, default_value = "KAFKA_BACKEND")]
    env_prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = ConfigBuilder::<BackendConfig>::new().use_defaults();
    if let Some(path) = &args.config {
        builder = builder.add_file(path);
    }
    let config = builder
        .add_env(&args.env_prefix)
        .build()
        .context("Failed to load configuration")?;

    logging::init(config.effective_log_level());
    info!("kafka-backend {} starting", kafka_backend::VERSION);

    let mut events = EventBus::new();
    KafkaBackend::init(stats::now(), &config, &mut events)
        .context("Failed to initialise the Kafka backend")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let status_period = Duration::from_secs(config.status_interval.max(1));
    let mut status_timer = tokio::time::interval(status_period);
    status_timer.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read snapshot from stdin")? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => match serde_json::from_str::<FlushSnapshot>(&line) {
                        Ok(snapshot) => events.emit_flush(stats::now(), &snapshot),
                        Err(e) => warn!("Skipping malformed snapshot: {}", e),
                    },
                    None => {
                        debug!("End of input");
                        break;
                    }
                }
            }
            _ = status_timer.tick() => report_status(&events),
        }
    }

    report_status(&events);
    info!("kafka-backend stopped");
    Ok(())
}

fn report_status(events: &EventBus) {
    events.emit_status(&mut |err: Option<&BackendError>, source: &str, stat: &str, value: f64| {
        match err {
            Some(e) => error!("{}.{}: {}", source, stat, e),
            None => info!("{}.{}: {}", source, stat, value),
        }
    });
}
