//! Charge point state machine.
//!
//! One simulated connector, one transaction slot. All mutable state lives
//! in a single struct behind a mutex; handlers, timer ticks and scheduled
//! completions each take the lock, mutate, and release before any await.
//! Invariant: the sampling-task handle is present exactly while the phase
//! is `Charging`. A stop arriving before the start has resolved finds no
//! handle and is rejected rather than racing the start.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::SimulatorConfig;
use crate::configuration::{ConfigurationKey, ConfigurationStore};
use crate::ocpp::{
    ChangeConfigurationRequest, CommandResponse, CommandStatus, GetConfigurationResponse,
    Measurand, MeterValue, MeterValuesRequest, RemoteStartTransactionRequest,
    RemoteStopTransactionRequest, SampledValue, StartTransactionRequest, StopTransactionRequest,
    UnitOfMeasure,
};
use crate::service::{CentralSystem, ChargePointService, HandlerError};

/// Fixed state-of-charge reading reported with every meter sample.
const STATE_OF_CHARGE_PERCENT: &str = "50";

/// Transaction lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    StartPending,
    Charging,
    StopPending,
}

struct ActiveTransaction {
    connector_id: i32,
    id_tag: String,
    /// Assigned by the central system; set only once StartTransaction
    /// resolves.
    transaction_id: Option<i32>,
    /// Accumulated energy in Wh.
    charged: i64,
}

#[derive(Default)]
struct ConnectorState {
    phase: Phase,
    transaction: Option<ActiveTransaction>,
    sampler: Option<JoinHandle<()>>,
}

struct Inner {
    config: SimulatorConfig,
    remote: OnceLock<Arc<dyn CentralSystem>>,
    state: Mutex<ConnectorState>,
    configuration: Mutex<ConfigurationStore>,
}

/// Handle to the single charge point instance. Clones share state.
#[derive(Clone)]
pub struct ChargePoint {
    inner: Arc<Inner>,
}

impl ChargePoint {
    pub fn new(config: SimulatorConfig) -> Self {
        let configuration = ConfigurationStore::new(vec![
            ConfigurationKey::new(
                "HeartBeatInterval",
                false,
                config.heartbeat_interval.as_secs().to_string(),
            ),
            ConfigurationKey::new("ResetRetries", false, "1"),
            ConfigurationKey::new(
                "MeterValueSampleInterval",
                false,
                config.meter_interval.as_secs().to_string(),
            ),
        ]);

        Self {
            inner: Arc::new(Inner {
                config,
                remote: OnceLock::new(),
                state: Mutex::new(ConnectorState::default()),
                configuration: Mutex::new(configuration),
            }),
        }
    }

    /// Wire in the remote-call surface once the transport is established.
    pub fn attach_central_system(&self, remote: Arc<dyn CentralSystem>) {
        if self.inner.remote.set(remote).is_err() {
            warn!("central system already attached");
        }
    }

    fn remote(&self) -> Option<Arc<dyn CentralSystem>> {
        self.inner.remote.get().cloned()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// Accumulated energy of the live transaction, in Wh.
    pub fn accumulated_energy(&self) -> i64 {
        self.inner
            .state
            .lock()
            .transaction
            .as_ref()
            .map(|transaction| transaction.charged)
            .unwrap_or(0)
    }

    pub fn transaction_id(&self) -> Option<i32> {
        self.inner
            .state
            .lock()
            .transaction
            .as_ref()
            .and_then(|transaction| transaction.transaction_id)
    }

    /// Begin a transaction: immediately accepted or rejected; the outbound
    /// StartTransaction is scheduled, and charging begins when it resolves.
    pub fn begin_transaction(
        &self,
        connector_id: i32,
        id_tag: &str,
        apply_delay: bool,
    ) -> CommandStatus {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Idle {
                return CommandStatus::Rejected;
            }
            state.phase = Phase::StartPending;
            state.transaction = Some(ActiveTransaction {
                connector_id,
                id_tag: id_tag.to_string(),
                transaction_id: None,
                charged: 0,
            });
        }

        let charge_point = self.clone();
        let delay = if apply_delay {
            self.inner.config.start_delay
        } else {
            Duration::ZERO
        };

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            charge_point.complete_start().await;
        });

        CommandStatus::Accepted
    }

    async fn complete_start(&self) {
        let Some(remote) = self.remote() else {
            warn!("no central system attached, abandoning start");
            self.reset_to_idle_if(Phase::StartPending);
            return;
        };

        let (connector_id, id_tag) = {
            let state = self.inner.state.lock();
            match state.transaction.as_ref() {
                Some(transaction) if state.phase == Phase::StartPending => {
                    (transaction.connector_id, transaction.id_tag.clone())
                }
                _ => return,
            }
        };

        let request = StartTransactionRequest {
            connector_id,
            id_tag,
            timestamp: Utc::now(),
            meter_start: 0,
        };

        match remote.start_transaction(request).await {
            Ok(reply) => {
                let mut state = self.inner.state.lock();
                if state.phase != Phase::StartPending {
                    return;
                }
                if let Some(transaction) = state.transaction.as_mut() {
                    transaction.transaction_id = Some(reply.transaction_id);
                    transaction.charged = 0;
                }
                state.phase = Phase::Charging;
                state.sampler = Some(self.spawn_sampler(connector_id, reply.transaction_id));
                info!(transaction_id = reply.transaction_id, "transaction started");
            }
            Err(error) => {
                error!(%error, "StartTransaction failed");
                self.reset_to_idle_if(Phase::StartPending);
            }
        }
    }

    /// End the live transaction: sampling stops immediately, the outbound
    /// StopTransaction is scheduled, and the machine returns to Idle when
    /// it completes.
    pub fn end_transaction(
        &self,
        transaction_id: Option<i32>,
        apply_delay: bool,
    ) -> CommandStatus {
        let (transaction_id, meter_stop) = {
            let mut state = self.inner.state.lock();
            let Some(sampler) = state.sampler.take() else {
                return CommandStatus::Rejected;
            };
            sampler.abort();
            state.phase = Phase::StopPending;

            let stored = state
                .transaction
                .as_mut()
                .and_then(|transaction| transaction.transaction_id.take());
            let Some(id) = transaction_id.or(stored) else {
                state.phase = Phase::Idle;
                state.transaction = None;
                return CommandStatus::Rejected;
            };
            let meter_stop = state
                .transaction
                .as_ref()
                .map(|transaction| transaction.charged)
                .unwrap_or(0);
            (id, meter_stop)
        };

        let charge_point = self.clone();
        let delay = if apply_delay {
            self.inner.config.stop_delay
        } else {
            Duration::ZERO
        };

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            charge_point.complete_stop(transaction_id, meter_stop).await;
        });

        CommandStatus::Accepted
    }

    async fn complete_stop(&self, transaction_id: i32, meter_stop: i64) {
        if let Some(remote) = self.remote() {
            let request = StopTransactionRequest {
                transaction_id,
                timestamp: Utc::now(),
                meter_stop,
            };
            if let Err(error) = remote.stop_transaction(request).await {
                error!(%error, "StopTransaction failed");
            } else {
                info!(transaction_id, meter_stop, "transaction stopped");
            }
        }

        let mut state = self.inner.state.lock();
        if state.phase == Phase::StopPending {
            state.phase = Phase::Idle;
            state.transaction = None;
        }
    }

    fn reset_to_idle_if(&self, expected: Phase) {
        let mut state = self.inner.state.lock();
        if state.phase == expected {
            state.phase = Phase::Idle;
            state.transaction = None;
        }
    }

    fn spawn_sampler(&self, connector_id: i32, transaction_id: i32) -> JoinHandle<()> {
        let charge_point = self.clone();
        let period = self.inner.config.meter_interval;

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;

            loop {
                ticks.tick().await;

                let charged = {
                    let mut state = charge_point.inner.state.lock();
                    let Some(transaction) = state.transaction.as_mut() else {
                        break;
                    };
                    transaction.charged += charge_point.meter_increment();
                    transaction.charged
                };

                let Some(remote) = charge_point.remote() else {
                    break;
                };

                let request = MeterValuesRequest {
                    connector_id,
                    transaction_id,
                    values: vec![MeterValue {
                        timestamp: Utc::now(),
                        values: vec![
                            SampledValue {
                                value: charged.to_string(),
                                measurand: Measurand::EnergyActiveImportRegister,
                                unit: UnitOfMeasure::Wh,
                            },
                            SampledValue {
                                value: STATE_OF_CHARGE_PERCENT.to_string(),
                                measurand: Measurand::StateOfCharge,
                                unit: UnitOfMeasure::Percent,
                            },
                        ],
                    }],
                };

                if let Err(error) = remote.meter_values(request).await {
                    warn!(%error, "MeterValues failed");
                }
            }
        })
    }

    /// Biased draw approximating the target average power: the larger
    /// increment lands roughly one tick in three.
    fn meter_increment(&self) -> i64 {
        if rand::random::<f64>() > 0.66 {
            self.inner.config.meter_increment_major
        } else {
            self.inner.config.meter_increment
        }
    }

    /// Heartbeat timer, independent of the transaction lifecycle. Runs
    /// until the process exits; the handle is not meant to be cancelled.
    pub fn start_heartbeat(&self) -> JoinHandle<()> {
        let charge_point = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(charge_point.inner.config.heartbeat_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;

            loop {
                ticks.tick().await;
                let Some(remote) = charge_point.remote() else {
                    continue;
                };
                match remote.heartbeat().await {
                    Ok(reply) => debug!(current_time = %reply.current_time, "heartbeat"),
                    Err(error) => warn!(%error, "Heartbeat failed"),
                }
            }
        })
    }
}

#[async_trait]
impl ChargePointService for ChargePoint {
    async fn remote_start_transaction(
        &self,
        request: RemoteStartTransactionRequest,
    ) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse {
            status: self.begin_transaction(request.connector_id, &request.id_tag, true),
        })
    }

    async fn remote_stop_transaction(
        &self,
        request: RemoteStopTransactionRequest,
    ) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse {
            status: self.end_transaction(Some(request.transaction_id), true),
        })
    }

    async fn get_configuration(&self) -> Result<GetConfigurationResponse, HandlerError> {
        Ok(GetConfigurationResponse {
            configuration_key: self.inner.configuration.lock().entries().to_vec(),
        })
    }

    async fn change_configuration(
        &self,
        request: ChangeConfigurationRequest,
    ) -> Result<CommandResponse, HandlerError> {
        let value = stringify(&request.value);
        self.inner.configuration.lock().change(&request.key, &value);
        Ok(CommandResponse::accepted())
    }

    async fn reserve_now(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn cancel_reservation(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn reset(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn trigger_message(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }

    async fn update_firmware(&self, _request: Value) -> Result<CommandResponse, HandlerError> {
        Ok(CommandResponse::accepted())
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
