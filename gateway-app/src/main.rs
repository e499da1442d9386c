// lorabridge -- LoRa P2P to MQTT gateway for a RAK4270 module.
//
// Usage:
//   lorabridge --config gateway.toml
//   lorabridge --port /dev/ttyUSB1 --mqtt-host broker.local run
//   lorabridge --config gateway.toml check-config
//   lorabridge gen-config > gateway.toml

mod mqtt;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lorabridge_gateway::{Gateway, GatewayConfig, GatewayExit, MessageBus};
use lorabridge_rak::RakBuilder;

/// How long the MQTT event loop gets to flush the disconnect.
const MQTT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Bridges LoRa P2P telemetry and commands to an MQTT broker.
#[derive(Parser, Debug)]
#[command(name = "lorabridge", version, about)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used without one.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Serial port of the radio module (e.g. /dev/ttyUSB0, COM3).
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// MQTT broker host.
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT broker port.
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// Log filter (e.g. info, debug, lorabridge_rak=trace). Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the gateway until Ctrl-C (default).
    Run,
    /// Load and validate the configuration, then exit.
    CheckConfig,
    /// Print the effective configuration as TOML.
    GenConfig,
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid --log-level '{level}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load the file (if any), then apply command-line overrides and validate.
fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(host) = &cli.mqtt_host {
        config.mqtt.host = host.clone();
    }
    if let Some(port) = cli.mqtt_port {
        config.mqtt.port = port;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_check_config(config: &GatewayConfig) {
    println!("configuration OK");
    println!(
        "  serial:    {} @ {} baud",
        config.serial.port, config.serial.baud_rate
    );
    println!(
        "  radio:     {} Hz, SF{}, bw {}, cr {}, preamble {}, power {}",
        config.radio.frequency_hz,
        config.radio.spreading_factor,
        config.radio.bandwidth,
        config.radio.coding_rate,
        config.radio.preamble_length,
        config.radio.tx_power
    );
    println!("  mqtt:      {}:{}", config.mqtt.host, config.mqtt.port);
    println!("  telemetry: {}", config.topics.telemetry);
    println!("  commands:  {}", config.topics.auto_command);
    println!("             {}", config.topics.actuator_filter());
}

fn cmd_gen_config(config: &GatewayConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

async fn cmd_run(config: GatewayConfig) -> Result<()> {
    let radio = RakBuilder::new()
        .serial_port(&config.serial.port)
        .baud_rate(config.serial.baud_rate)
        .timing(config.timing())
        .build()
        .await
        .with_context(|| format!("failed to open radio on {}", config.serial.port))?;

    let session = mqtt::connect(&config.mqtt, &config.topics);
    let bus: Arc<dyn MessageBus> = Arc::new(session.bus.clone());

    let exit = match Gateway::start(radio, &config, bus, session.commands).await {
        Ok(gateway) => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            Ok(gateway.run(shutdown).await)
        }
        Err(e) => Err(e),
    };

    session.bus.disconnect().await;
    let mut task = session.task;
    if tokio::time::timeout(MQTT_STOP_TIMEOUT, &mut task).await.is_err() {
        session.stop.cancel();
        task.await.ok();
    }

    match exit.context("radio bring-up failed")? {
        GatewayExit::Shutdown => {
            info!("gateway shut down cleanly");
            Ok(())
        }
        GatewayExit::LinkLost(reason) => bail!("serial link lost: {reason}"),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let config = load_config(&cli)?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(config).await,
        Command::CheckConfig => {
            cmd_check_config(&config);
            Ok(())
        }
        Command::GenConfig => cmd_gen_config(&config),
    }
}
