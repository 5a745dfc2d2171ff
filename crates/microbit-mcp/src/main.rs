//! microbit-mcp: serve a micro:bit as tools over stdio.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use microbit_client::MicrobitClient;
use microbit_link::{list_ports, recommended_port};
use microbit_mcp::{serve, BridgeConfig, ToolHandler, ToolResult};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// micro:bit tool server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port of the micro:bit (default: /dev/cu.usbmodem2114202)
    #[arg(short, long)]
    port: Option<String>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Log filter, e.g. "debug" or "microbit_client=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // stdout is reserved for protocol messages.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn print_ports() -> ToolResult<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Available serial ports:");
    for port in &ports {
        let marker = if port.likely_microbit { " (likely micro:bit)" } else { "" };
        println!(
            "  {} - {}{}",
            port.name,
            port.description.as_deref().unwrap_or("unknown device"),
            marker
        );
        if let Some(hwid) = &port.hardware_id {
            println!("      hardware id: {}", hwid);
        }
    }

    match recommended_port(&ports) {
        Some(port) => println!("\nRecommended port: {}", port.name),
        None => println!("\nNo micro:bit detected."),
    }
    Ok(())
}

fn load_config(args: &Args) -> ToolResult<BridgeConfig> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };

    if let Some(port) = &args.port {
        config.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.client.baud_rate = baud;
    }
    config.client.validate()?;
    Ok(config)
}

async fn run(config: BridgeConfig) -> ToolResult<()> {
    let client = Arc::new(MicrobitClient::connect(&config.port, &config.client).await?);
    let handler = ToolHandler::new(Arc::clone(&client));

    info!(port = %config.port, "serving tools on stdio");
    let result = serve(handler, tokio::io::stdin(), tokio::io::stdout()).await;

    client.close();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    if args.list_ports {
        return match print_ports() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
