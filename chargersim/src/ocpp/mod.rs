//! OCPP operation names, wire payload types and socket framing.

mod frame;
mod types;

pub use frame::{Frame, RpcError, RpcErrorCode};
pub use types::*;

use std::fmt;
use std::str::FromStr;

/// Every operation the simulator speaks, charge point → central system and
/// back. The wire name is the PascalCase variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    // CP -> CS
    Authorize,
    BootNotification,
    DataTransfer,
    Heartbeat,
    MeterValues,
    StartTransaction,
    StatusNotification,
    StopTransaction,

    // CS -> CP
    RemoteStartTransaction,
    RemoteStopTransaction,
    GetConfiguration,
    ChangeConfiguration,
    ReserveNow,
    CancelReservation,
    Reset,
    TriggerMessage,
    UpdateFirmware,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Authorize => "Authorize",
            Action::BootNotification => "BootNotification",
            Action::DataTransfer => "DataTransfer",
            Action::Heartbeat => "Heartbeat",
            Action::MeterValues => "MeterValues",
            Action::StartTransaction => "StartTransaction",
            Action::StatusNotification => "StatusNotification",
            Action::StopTransaction => "StopTransaction",
            Action::RemoteStartTransaction => "RemoteStartTransaction",
            Action::RemoteStopTransaction => "RemoteStopTransaction",
            Action::GetConfiguration => "GetConfiguration",
            Action::ChangeConfiguration => "ChangeConfiguration",
            Action::ReserveNow => "ReserveNow",
            Action::CancelReservation => "CancelReservation",
            Action::Reset => "Reset",
            Action::TriggerMessage => "TriggerMessage",
            Action::UpdateFirmware => "UpdateFirmware",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Authorize" => Ok(Action::Authorize),
            "BootNotification" => Ok(Action::BootNotification),
            "DataTransfer" => Ok(Action::DataTransfer),
            "Heartbeat" => Ok(Action::Heartbeat),
            "MeterValues" => Ok(Action::MeterValues),
            "StartTransaction" => Ok(Action::StartTransaction),
            "StatusNotification" => Ok(Action::StatusNotification),
            "StopTransaction" => Ok(Action::StopTransaction),
            "RemoteStartTransaction" => Ok(Action::RemoteStartTransaction),
            "RemoteStopTransaction" => Ok(Action::RemoteStopTransaction),
            "GetConfiguration" => Ok(Action::GetConfiguration),
            "ChangeConfiguration" => Ok(Action::ChangeConfiguration),
            "ReserveNow" => Ok(Action::ReserveNow),
            "CancelReservation" => Ok(Action::CancelReservation),
            "Reset" => Ok(Action::Reset),
            "TriggerMessage" => Ok(Action::TriggerMessage),
            "UpdateFirmware" => Ok(Action::UpdateFirmware),
            _ => Err(RpcError::UnknownAction(s.to_string())),
        }
    }
}
