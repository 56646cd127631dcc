//! Simulator configuration.

use std::time::Duration;

/// Everything a simulated charge point needs to know up front. Immutable
/// after construction; the presence of `local_port` selects the document
/// transport instead of the socket one.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Central system endpoint: a `ws://` URL for the socket transport, an
    /// `http://` URL for the document transport.
    pub endpoint: String,

    /// Charge point identity, used in the socket URL path and in the
    /// document transport's identity header.
    pub identity: String,

    pub vendor: String,
    pub model: String,

    /// Send BootNotification once the transport is up.
    pub boot_on_start: bool,

    /// Heartbeat period; the timer runs for the lifetime of the process.
    pub heartbeat_interval: Duration,

    /// Delay between accepting RemoteStartTransaction and issuing the
    /// outbound StartTransaction.
    pub start_delay: Duration,

    /// Same, for RemoteStopTransaction / StopTransaction.
    pub stop_delay: Duration,

    /// Liveness window for the socket transport; `None` disables pings.
    pub keepalive_timeout: Option<Duration>,

    /// Meter sampling period while charging.
    pub meter_interval: Duration,

    /// Per-tick energy increments in Wh: the common one and the larger one
    /// drawn with ~1/3 probability.
    pub meter_increment: i64,
    pub meter_increment_major: i64,

    /// Bound on every outbound call awaiting its reply.
    pub request_timeout: Duration,

    /// Socket reconnect backoff.
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,

    /// Local listening port for the document transport. `None` selects the
    /// socket transport.
    pub local_port: Option<u16>,
    /// Path the document server mounts at.
    pub local_path: String,

    /// Feed envelopes to the diagnostics sink.
    pub log_traffic: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/ocpp".to_string(),
            identity: "test".to_string(),
            vendor: "Test".to_string(),
            model: "1".to_string(),
            boot_on_start: true,
            heartbeat_interval: Duration::from_secs(30),
            start_delay: Duration::from_secs(8),
            stop_delay: Duration::from_secs(8),
            keepalive_timeout: Some(Duration::from_secs(50)),
            meter_interval: Duration::from_secs(20),
            meter_increment: 20,
            meter_increment_major: 30,
            request_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_delay: Duration::from_secs(300),
            local_port: None,
            local_path: "/".to_string(),
            log_traffic: true,
        }
    }
}

impl SimulatorConfig {
    pub fn new(endpoint: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: identity.into(),
            ..Default::default()
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self.model = model.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_delays(mut self, start: Duration, stop: Duration) -> Self {
        self.start_delay = start;
        self.stop_delay = stop;
        self
    }

    pub fn with_meter_interval(mut self, interval: Duration) -> Self {
        self.meter_interval = interval;
        self
    }

    pub fn with_keepalive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.keepalive_timeout = timeout;
        self
    }

    pub fn with_local_listener(mut self, port: u16, path: impl Into<String>) -> Self {
        self.local_port = Some(port);
        self.local_path = path.into();
        self
    }

    pub fn without_boot_on_start(mut self) -> Self {
        self.boot_on_start = false;
        self
    }

    pub fn without_traffic_log(mut self) -> Self {
        self.log_traffic = false;
        self
    }
}
