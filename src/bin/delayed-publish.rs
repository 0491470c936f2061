// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! delayed-publish - publish one job to the delayed-jobs exchange.
//!
//! Usage:
//!   delayed-publish --delay-ms 5000 '{"type": "email_notification", "recipient": "a@b.com"}'
//!
//! Connection settings come from the `RABBITMQ_*` environment variables;
//! flags given on the command line take precedence.

use anyhow::{Context, Result};
use clap::Parser;
use delayed_jobs::{
    config::PublisherConfig, envelope::parse_payload, publisher::DelayedJobPublisher,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "delayed-publish")]
#[command(version)]
#[command(about = "Publish a job that the broker delivers after a delay", long_about = None)]
struct Cli {
    /// Job payload, a JSON object
    payload: String,

    /// Milliseconds the broker holds the job before routing it
    #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
    delay_ms: i64,

    /// Routing key to publish with (defaults to the queue binding key)
    #[arg(short, long)]
    routing_key: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long)]
    vhost: Option<String>,
}

impl Cli {
    fn connection_overrides(&self) -> Vec<(&'static str, String)> {
        [
            ("host", &self.host),
            ("port", &self.port),
            ("user", &self.user),
            ("password", &self.password),
            ("vhost", &self.vhost),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    let cli = Cli::parse();

    let mut config = PublisherConfig::from_env();
    config.connection = config
        .connection
        .with_overrides(cli.connection_overrides())
        .context("invalid connection option")?;
    tracing::info!(endpoint = config.connection.endpoint(), "config_loaded");

    let job = parse_payload(&cli.payload).context("invalid job payload")?;

    let envelope =
        DelayedJobPublisher::publish_once(&config, job, cli.delay_ms, cli.routing_key.as_deref())
            .await
            .context("failed to publish delayed job")?;

    println!("{}", serde_json::to_string(&envelope)?);

    Ok(())
}
