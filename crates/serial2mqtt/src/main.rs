//! serial2mqtt daemon
//!
//! `bridge` forwards JSON lines between a serial device and MQTT, `tracer`
//! publishes EP-Solar Tracer telemetry, `ports` lists serial devices.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rumqttc::AsyncClient;
use serial2mqtt_core::bridge::LineBridge;
use serial2mqtt_core::bus::{spawn_event_loop, INBOUND_QUEUE_CAPACITY};
use serial2mqtt_core::config::{Mode, Options, DEFAULT_OPTIONS_PATH};
use serial2mqtt_core::protocol::{list_ports, ReconnectSupervisor, SerialOpener};
use serial2mqtt_core::tracer::{publish_availability, TracerConfig, TracerSession};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

/// Time given to the event loop to flush the offline message on exit
const SHUTDOWN_FLUSH: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "serial2mqtt", version, about = "Serial UART to MQTT bridge", long_about = None)]
struct Cli {
    #[arg(
        long,
        value_name = "FILE",
        env = "SERIAL2MQTT_OPTIONS",
        default_value = DEFAULT_OPTIONS_PATH,
        help = "Path to the options JSON file"
    )]
    options: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Bridge newline-delimited JSON between serial and MQTT")]
    Bridge,
    #[command(about = "Publish EP-Solar Tracer charge controller readings")]
    Tracer,
    #[command(about = "List available serial ports")]
    Ports,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_options(path: &Path, mode: Mode) -> Result<Options> {
    info!(path = %path.display(), "reading options");
    let options = Options::load(path)
        .with_context(|| format!("failed to load options from {}", path.display()))?;
    options.validate(mode).context("invalid options")?;
    Ok(options)
}

/// Open the serial link once; failure at startup is fatal
fn open_serial(options: &Options, mode: Mode) -> Result<ReconnectSupervisor<SerialOpener>> {
    let opener = options.serial_opener(mode)?;
    let span = info_span!("serial", port = %opener.address, baud = opener.baud_rate);
    let mut supervisor = ReconnectSupervisor::new(opener, options.reconnect_interval(), span);
    supervisor.open().with_context(|| {
        format!(
            "could not initiate serial port {:?}, is the port correct and accessible? \
             Check the \"serial_port\" and \"serial_baud\" options",
            options.serial_port
        )
    })?;
    info!(port = %options.serial_port, "serial port open");
    Ok(supervisor)
}

async fn run_bridge(options: Options) -> Result<()> {
    let config = options.line_bridge()?;
    let mut supervisor = open_serial(&options, Mode::Bridge)?;

    let settings = options.mqtt_settings()?;
    info!(host = %settings.host, port = settings.port, client_id = %settings.client_id, "init MQTT client");
    let (client, eventloop) = settings.connect();
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
    spawn_event_loop(
        client.clone(),
        eventloop,
        Some(config.subscription()),
        Some(inbound_tx),
        info_span!("mqtt"),
    );

    let bridge = Arc::new(LineBridge::new(config, client, info_span!("bridge")));

    let inbound_bridge = bridge.clone();
    let writer = supervisor.writer();
    thread::Builder::new()
        .name("inbound-writer".into())
        .spawn(move || inbound_bridge.serve_inbound(inbound_rx, writer))
        .context("failed to start inbound writer")?;

    let serial_bridge = bridge.clone();
    thread::Builder::new()
        .name("serial".into())
        .spawn(move || supervisor.run(|channel, writer| serial_bridge.run_session(channel, writer)))
        .context("failed to start serial thread")?;

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    bridge.shutdown();
    Ok(())
}

async fn run_tracer(options: Options) -> Result<()> {
    let config = options.tracer()?;
    let mut supervisor = open_serial(&options, Mode::Tracer)?;

    let settings = options.mqtt_settings()?;
    info!(host = %settings.host, port = settings.port, client_id = %settings.client_id, "init MQTT client");
    let (client, eventloop) = settings.connect();
    spawn_event_loop(client.clone(), eventloop, None, None, info_span!("mqtt"));

    announce(&client, &config, true);

    let mut session = TracerSession::new(&config, client.clone(), info_span!("tracer"))?;
    let shutdown = session.shutdown_handle();
    thread::Builder::new()
        .name("serial".into())
        .spawn(move || supervisor.run(|channel, writer| session.run(channel, writer)))
        .context("failed to start serial thread")?;

    signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    shutdown.store(true, Ordering::Relaxed);
    announce(&client, &config, false);
    tokio::time::sleep(SHUTDOWN_FLUSH).await;
    Ok(())
}

fn announce(client: &AsyncClient, config: &TracerConfig, online: bool) {
    match publish_availability(client, config, online) {
        Ok(()) => info!(topic = %config.online_topic, online, "published availability"),
        Err(e) => warn!(topic = %config.online_topic, error = %e, "could not publish availability"),
    }
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}\t{:04x}:{:04x}\t{}",
                port.name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    info!(version = serial2mqtt_core::VERSION, "serial2mqtt starting");

    match cli.command {
        Commands::Bridge => run_bridge(load_options(&cli.options, Mode::Bridge)?).await,
        Commands::Tracer => run_tracer(load_options(&cli.options, Mode::Tracer)?).await,
        Commands::Ports => {
            print_ports();
            Ok(())
        }
    }
}
