use core::fmt::Formatter;
use crate::prelude::*;

/// CANopen SDO abort codes relevant to this transfer. Trimmed to the subset
/// the write adapter and transport actually raise; see CiA 301 for the full
/// table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AbortCode {
    SdoProtocolTimedOut,
    CommandSpecifierNotValidOrUnknown,
    CRCError,
    OutOfMemory,
    UnsupportedAccessToObject,
    ObjectDoesNotExistInObjectDictionary,
    GeneralParameterIncompatibility,
    HardwareError,
    DataTypeMismatchLengthMismatch,
    DataTypeMismatchLengthTooHigh,
    SubIndexDoesNotExist,
    ValueRangeExceeded,
    GeneralError,
    DataTransferOrStoreFailedDueToDeviceState,
}

impl AbortCode {
    pub fn code(&self) -> u32 {
        match *self {
            AbortCode::SdoProtocolTimedOut => 0x0504_0000,
            AbortCode::CommandSpecifierNotValidOrUnknown => 0x0504_0001,
            AbortCode::CRCError => 0x0504_0004,
            AbortCode::OutOfMemory => 0x0504_0005,
            AbortCode::UnsupportedAccessToObject => 0x0601_0000,
            AbortCode::ObjectDoesNotExistInObjectDictionary => 0x0602_0000,
            AbortCode::GeneralParameterIncompatibility => 0x0604_0043,
            AbortCode::HardwareError => 0x0606_0000,
            AbortCode::DataTypeMismatchLengthMismatch => 0x0607_0010,
            AbortCode::DataTypeMismatchLengthTooHigh => 0x0607_0012,
            AbortCode::SubIndexDoesNotExist => 0x0609_0011,
            AbortCode::ValueRangeExceeded => 0x0609_0030,
            AbortCode::GeneralError => 0x0800_0000,
            AbortCode::DataTransferOrStoreFailedDueToDeviceState => 0x0800_0022,
        }
    }

    pub fn description(&self) -> &'static str {
        match *self {
            AbortCode::SdoProtocolTimedOut => "SDO protocol timed out",
            AbortCode::CommandSpecifierNotValidOrUnknown => "Client/server command specifier not valid or unknown",
            AbortCode::CRCError => "CRC error",
            AbortCode::OutOfMemory => "Out of memory",
            AbortCode::UnsupportedAccessToObject => "Unsupported access to an object",
            AbortCode::ObjectDoesNotExistInObjectDictionary => "Object does not exist in the object dictionary",
            AbortCode::GeneralParameterIncompatibility => "General parameter incompatibility reason",
            AbortCode::HardwareError => "Access failed due to a hardware error",
            AbortCode::DataTypeMismatchLengthMismatch => "Data type does not match; length of service parameter does not match",
            AbortCode::DataTypeMismatchLengthTooHigh => "Data type does not match; length of service parameter too high",
            AbortCode::SubIndexDoesNotExist => "Sub-index does not exist",
            AbortCode::ValueRangeExceeded => "Value range of parameter exceeded (only for write access)",
            AbortCode::GeneralError => "General error",
            AbortCode::DataTransferOrStoreFailedDueToDeviceState => "Data cannot be transferred or stored because of the present device state",
        }
    }

    #[allow(dead_code)]
    pub(crate) fn from_code(code: u32) -> Option<Self> {
        match code {
            0x0504_0000 => Some(AbortCode::SdoProtocolTimedOut),
            0x0504_0001 => Some(AbortCode::CommandSpecifierNotValidOrUnknown),
            0x0504_0004 => Some(AbortCode::CRCError),
            0x0504_0005 => Some(AbortCode::OutOfMemory),
            0x0601_0000 => Some(AbortCode::UnsupportedAccessToObject),
            0x0602_0000 => Some(AbortCode::ObjectDoesNotExistInObjectDictionary),
            0x0604_0043 => Some(AbortCode::GeneralParameterIncompatibility),
            0x0606_0000 => Some(AbortCode::HardwareError),
            0x0607_0010 => Some(AbortCode::DataTypeMismatchLengthMismatch),
            0x0607_0012 => Some(AbortCode::DataTypeMismatchLengthTooHigh),
            0x0609_0011 => Some(AbortCode::SubIndexDoesNotExist),
            0x0609_0030 => Some(AbortCode::ValueRangeExceeded),
            0x0800_0000 => Some(AbortCode::GeneralError),
            0x0800_0022 => Some(AbortCode::DataTransferOrStoreFailedDueToDeviceState),
            _ => None,
        }
    }
}

/// The five abstract error categories of the transfer protocol. Every
/// failure path in the uploader and installer returns one of these; none of
/// them are retried automatically.
#[derive(Clone, Eq, PartialEq)]
pub enum TransferError {
    /// Wrong stage, wrong subindex, wrong byte count, out-of-order chunk,
    /// overflow, unsupported control command. `abort_code` lets a caller
    /// surface a specific wire code (e.g. `SubIndexDoesNotExist`) instead of
    /// always collapsing to the category default.
    ProtocolViolation { reason: String, abort_code: Option<AbortCode> },
    /// CRC mismatch or size mismatch at finalize.
    IntegrityFailure { reason: String },
    /// Cannot open file, short read, partition unavailable, OTA rejection,
    /// out of memory for chunk scratch.
    ResourceFailure { reason: String },
    /// SDO timeout, SDO abort, bus off.
    TransportFailure { reason: String },
    /// Usage violation: zero chunk size, unbound SDO client, metadata
    /// without prior reset.
    ConfigurationError { reason: String },
}

impl TransferError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        TransferError::ProtocolViolation { reason: reason.into(), abort_code: None }
    }

    /// Like `protocol`, but pins the wire-level abort code instead of
    /// letting `abort_code()` fall back to `GeneralParameterIncompatibility`.
    pub fn protocol_with_code(reason: impl Into<String>, abort_code: AbortCode) -> Self {
        TransferError::ProtocolViolation { reason: reason.into(), abort_code: Some(abort_code) }
    }

    pub fn integrity(reason: impl Into<String>) -> Self {
        TransferError::IntegrityFailure { reason: reason.into() }
    }

    pub fn resource(reason: impl Into<String>) -> Self {
        TransferError::ResourceFailure { reason: reason.into() }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        TransferError::TransportFailure { reason: reason.into() }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        TransferError::ConfigurationError { reason: reason.into() }
    }

    /// Maps this error onto the SDO abort code a real OD extension would
    /// return to the wire. Several distinct reasons collapse onto the same
    /// abort code; the `reason` string is what differentiates them in logs.
    pub fn abort_code(&self) -> AbortCode {
        match self {
            TransferError::ProtocolViolation { abort_code, .. } => {
                abort_code.unwrap_or(AbortCode::GeneralParameterIncompatibility)
            }
            TransferError::IntegrityFailure { .. } => AbortCode::CRCError,
            TransferError::ResourceFailure { .. } => AbortCode::HardwareError,
            TransferError::TransportFailure { .. } => AbortCode::SdoProtocolTimedOut,
            TransferError::ConfigurationError { .. } => AbortCode::UnsupportedAccessToObject,
        }
    }
}

impl Debug for TransferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::ProtocolViolation { reason, .. } => write!(f, "protocol violation: {}", reason),
            TransferError::IntegrityFailure { reason } => write!(f, "integrity failure: {}", reason),
            TransferError::ResourceFailure { reason } => write!(f, "resource failure: {}", reason),
            TransferError::TransportFailure { reason } => write!(f, "transport failure: {}", reason),
            TransferError::ConfigurationError { reason } => write!(f, "configuration error: {}", reason),
        }
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "linux"))]
impl std::error::Error for TransferError {}

pub type Result<T> = core::result::Result<T, TransferError>;
