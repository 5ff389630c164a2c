// NowLink Gateway - Radio to MQTT forwarding
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # NowLink Gateway
//!
//! Receives NowLink records over UDP and forwards them to an MQTT broker.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: broker on localhost:1883, records on UDP 0.0.0.0:4210
//! nowlink-gateway
//!
//! # Configuration file, with the broker overridden
//! nowlink-gateway --config gateway.json --broker-host 192.168.1.10
//! ```
//!
//! The process exits with status 75 when the watchdog gives up on the
//! broker; run it under a supervisor that restarts it.

mod mqtt;
mod system;
mod udp;

use clap::Parser;
use mqtt::MqttBroker;
use nowlink::SystemClock;
use nowlink_gateway::{Gateway, GatewayConfig, ValueFileIndicator, ValueFileSource};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use system::{HostProbe, ProcessRestarter};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use udp::UdpIngress;

/// NowLink radio-to-MQTT gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker host (overrides the configuration file)
    #[arg(long)]
    broker_host: Option<String>,

    /// Broker port (overrides the configuration file)
    #[arg(long)]
    broker_port: Option<u16>,

    /// UDP address to receive records on (overrides the configuration file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Main loop period in milliseconds
    #[arg(long, default_value = "10")]
    tick_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> nowlink_gateway::Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(host) = &args.broker_host {
        config.broker.host = host.clone();
    }
    if let Some(port) = args.broker_port {
        config.broker.port = port;
    }
    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("NowLink Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let probe = HostProbe::new(&config.broker.host, config.broker.port);
    let mut gateway = match Gateway::new(
        &config,
        MqttBroker::new(config.broker.clone()),
        SystemClock::new(),
        Box::new(ProcessRestarter),
        Box::new(probe),
    ) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to create gateway: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(motion) = &config.motion {
        info!("Motion sensor '{}' on {}", motion.name, motion.value_path);
        gateway = gateway.with_motion(
            &motion.name,
            Box::new(ValueFileSource::new(&motion.value_path)),
        );
    }
    if let Some(path) = &config.status_led {
        gateway = gateway.with_indicator(Box::new(ValueFileIndicator::new(path)));
    }

    let ingress = match UdpIngress::spawn(&config.listen, gateway.queue(), gateway.stats()) {
        Ok(ingress) => ingress,
        Err(e) => {
            error!("Failed to bind {}: {}", config.listen, e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Forwarding records from {} to {}:{} under '{}'",
        ingress.local_addr(),
        config.broker.host,
        config.broker.port,
        config.base_topic
    );

    let period = Duration::from_millis(args.tick_ms.max(1));
    loop {
        gateway.tick();
        if ingress.is_finished() {
            error!("Ingress stopped, exiting");
            return ExitCode::FAILURE;
        }
        thread::sleep(period);
    }
}
