//! Charge point simulator CLI.
//!
//! Connects a simulated charging station to a central system and drives it
//! interactively from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Socket transport (OCPP 1.6 over WebSocket)
//! chargersim --cs-url ws://localhost:8080/ocpp --charger-id test
//!
//! # Document transport (OCPP 1.5 SOAP): listen locally, post to the
//! # central system endpoint
//! chargersim --cs-url http://localhost:8081/ocpp --charger-id test --soap-port 12801
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use chargersim::ocpp::StatusNotificationRequest;
use chargersim::{
    CentralSystem, ChargePointErrorCode, ChargePointStatus, ChargerSimulator, SimulatorConfig,
};

/// OCPP charging station simulator.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Central System URL: ws:// selects the socket transport, http:// the
    /// document transport (together with --soap-port)
    #[arg(short = 's', long)]
    cs_url: String,

    /// OCPP identity of the simulated charger
    #[arg(short = 'i', long, default_value = "test")]
    charger_id: String,

    /// Connector used for status notifications and transactions
    #[arg(short = 'c', long, default_value = "1")]
    connector_id: i32,

    /// ID tag used to start transactions
    #[arg(short = 't', long, default_value = "123456")]
    id_tag: String,

    /// Vendor reported in BootNotification
    #[arg(long, default_value = "Test")]
    vendor: String,

    /// Model reported in BootNotification
    #[arg(long, default_value = "1")]
    model: String,

    /// Heartbeat period in seconds
    #[arg(long, default_value = "30")]
    heartbeat_interval: u64,

    /// Meter sampling period in seconds
    #[arg(long, default_value = "20")]
    meter_interval: u64,

    /// Delay before the scheduled StartTransaction, in milliseconds
    #[arg(long, default_value = "8000")]
    start_delay: u64,

    /// Delay before the scheduled StopTransaction, in milliseconds
    #[arg(long, default_value = "8000")]
    stop_delay: u64,

    /// Socket keepalive timeout in milliseconds; 0 disables pings
    #[arg(long, default_value = "50000")]
    keepalive_timeout: u64,

    /// Listen on this port for inbound SOAP calls (selects the document
    /// transport)
    #[arg(long)]
    soap_port: Option<u16>,

    /// Path the SOAP listener mounts at
    #[arg(long, default_value = "/")]
    soap_path: String,

    /// Skip the BootNotification on start
    #[arg(long)]
    no_boot: bool,

    /// Suppress envelope logging
    #[arg(long)]
    no_traffic_log: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn to_config(&self) -> SimulatorConfig {
        let mut config = SimulatorConfig::new(&self.cs_url, &self.charger_id)
            .with_vendor(&self.vendor, &self.model)
            .with_heartbeat_interval(Duration::from_secs(self.heartbeat_interval))
            .with_meter_interval(Duration::from_secs(self.meter_interval))
            .with_delays(
                Duration::from_millis(self.start_delay),
                Duration::from_millis(self.stop_delay),
            )
            .with_keepalive_timeout(match self.keepalive_timeout {
                0 => None,
                millis => Some(Duration::from_millis(millis)),
            });

        if let Some(port) = self.soap_port {
            config = config.with_local_listener(port, self.soap_path.clone());
        }
        if self.no_boot {
            config = config.without_boot_on_start();
        }
        if self.no_traffic_log {
            config = config.without_traffic_log();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        cs_url = %args.cs_url,
        charger_id = %args.charger_id,
        connector_id = args.connector_id,
        id_tag = %args.id_tag,
        "starting charger simulator"
    );

    let mut simulator = ChargerSimulator::new(args.to_config());
    simulator.start().await?;
    let central_system = simulator.central_system()?;

    info!("connected to central system");
    println!(
        "Supported keys (press the key, then Enter):
    q:        quit

    Connector {connector} status
    ---
    a:        send Available status
    p:        send Preparing status
    c:        send Charging status
    f:        send Finishing status

    Transaction on connector {connector}, tag {tag}
    ---
    u:        Authorize
    s:        StartTransaction
    t:        StopTransaction
",
        connector = args.connector_id,
        tag = args.id_tag,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "q" => break,
            "a" => send_status(&central_system, args.connector_id, ChargePointStatus::Available).await,
            "p" => send_status(&central_system, args.connector_id, ChargePointStatus::Preparing).await,
            "c" => send_status(&central_system, args.connector_id, ChargePointStatus::Charging).await,
            "f" => send_status(&central_system, args.connector_id, ChargePointStatus::Finishing).await,
            "u" => {
                match central_system
                    .authorize(chargersim::ocpp::AuthorizeRequest {
                        id_tag: args.id_tag.clone(),
                    })
                    .await
                {
                    Ok(reply) => info!(id_tag_info = ?reply.id_tag_info, "authorized"),
                    Err(error) => warn!(%error, "Authorize failed"),
                }
            }
            "s" => {
                let status = simulator.start_transaction(args.connector_id, &args.id_tag, false);
                info!(?status, "start transaction");
            }
            "t" => {
                let status = simulator.stop_transaction(false);
                info!(?status, "stop transaction");
            }
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }

    simulator.disconnect();
    Ok(())
}

async fn send_status(
    central_system: &Arc<dyn CentralSystem>,
    connector_id: i32,
    status: ChargePointStatus,
) {
    let request = StatusNotificationRequest {
        connector_id,
        error_code: ChargePointErrorCode::NoError,
        status,
    };
    match central_system.status_notification(request).await {
        Ok(_) => info!(?status, "status sent"),
        Err(error) => warn!(%error, "StatusNotification failed"),
    }
}
