use std::time::Duration;

use thiserror::Error;

use crate::cia402::CiA402State;

/// Everything an operation on the bus or the drive can fail with.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no matching response within {0:?}")]
    Timeout(Duration),

    #[error("wait cancelled")]
    Cancelled,

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid standard id: {cob_id:#x}")]
    InvalidCobId { cob_id: u16 },

    #[error("frame creation failed, cob_id = {cob_id:#x}, data: {data:02x?}")]
    FrameCreationFailed { cob_id: u16, data: Vec<u8> },

    #[error("bus closed")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("SDO abort on {index:#06x}:{sub_index:#04x}, code {code:#010x} ({})", describe_abort(.code))]
    Abort { index: u16, sub_index: u8, code: u32 },

    #[error("malformed frame on {cob_id:#x}: {reason}")]
    Malformed { cob_id: u16, reason: String },

    #[error("unexpected SDO command byte {command:#04x}")]
    Unexpected { command: u8 },
}

impl ProtocolError {
    pub fn abort_code(&self) -> Option<AbortCode> {
        match self {
            ProtocolError::Abort { code, .. } => AbortCode::from_code(*code),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("{target:?} not reached after {attempts} attempts, last state {last:?}")]
    RetriesExhausted { target: CiA402State, attempts: u32, last: CiA402State },

    #[error("drive reports fault, status word {status_word:#06x}")]
    Fault { status_word: u16 },

    #[error("homing error, status word {status_word:#06x}")]
    HomingFailed { status_word: u16 },
}

fn describe_abort(code: &u32) -> &'static str {
    AbortCode::from_code(*code).map_or("unknown abort code", |c| c.description())
}

macro_rules! abort_codes {
    ($($name:ident = $code:literal => $desc:literal,)*) => {
        /// SDO abort codes from CiA 301, as sent in bytes 4..8 of an abort frame.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub enum AbortCode {
            $($name,)*
        }

        impl AbortCode {
            pub fn code(&self) -> u32 {
                match *self {
                    $(AbortCode::$name => $code,)*
                }
            }

            pub fn description(&self) -> &'static str {
                match *self {
                    $(AbortCode::$name => $desc,)*
                }
            }

            pub fn from_code(code: u32) -> Option<Self> {
                match code {
                    $($code => Some(AbortCode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

abort_codes! {
    ToggleBitNotAlternated = 0x0503_0000 => "Toggle bit not alternated",
    SdoProtocolTimedOut = 0x0504_0000 => "SDO protocol timed out",
    CommandSpecifierNotValidOrUnknown = 0x0504_0001 => "Client/server command specifier not valid or unknown",
    OutOfMemory = 0x0504_0005 => "Out of memory",
    UnsupportedAccessToObject = 0x0601_0000 => "Unsupported access to an object",
    AttemptToReadWriteOnlyObject = 0x0601_0001 => "Attempt to read a write only object",
    AttemptToWriteReadOnlyObject = 0x0601_0002 => "Attempt to write a read only object",
    ObjectDoesNotExistInObjectDictionary = 0x0602_0000 => "Object does not exist in the object dictionary",
    ObjectCannotBeMappedToPdo = 0x0604_0041 => "Object cannot be mapped to the PDO",
    ExceedPdoSize = 0x0604_0042 => "The number and length of the objects to be mapped would exceed PDO length",
    GeneralParameterIncompatibility = 0x0604_0043 => "General parameter incompatibility reason",
    GeneralInternalIncompatibility = 0x0604_0047 => "General internal incompatibility in the device",
    HardwareError = 0x0606_0000 => "Access failed due to a hardware error",
    DataTypeMismatchLengthMismatch = 0x0607_0010 => "Data type does not match; length of service parameter does not match",
    DataTypeMismatchLengthTooHigh = 0x0607_0012 => "Data type does not match; length of service parameter too high",
    DataTypeMismatchLengthTooLow = 0x0607_0013 => "Data type does not match; length of service parameter too low",
    SubIndexDoesNotExist = 0x0609_0011 => "Sub-index does not exist",
    ValueRangeExceeded = 0x0609_0030 => "Value range of parameter exceeded (only for write access)",
    ValueWrittenTooHigh = 0x0609_0031 => "Value of parameter written too high",
    ValueWrittenTooLow = 0x0609_0032 => "Value of parameter written too low",
    MaxValueLessThanMinValue = 0x0609_0036 => "Maximum value is less than minimum value",
    GeneralError = 0x0800_0000 => "General error",
    DataTransferOrStoreFailed = 0x0800_0020 => "Data cannot be transferred or stored to the application",
    DataTransferOrStoreFailedDueToLocalControl = 0x0800_0021 => "Data cannot be transferred or stored to the application because of local control",
    DataTransferOrStoreFailedDueToDeviceState = 0x0800_0022 => "Data cannot be transferred or stored to the application because of the present device state",
    ObjectDictionaryGenerationFailedOrNotPresent = 0x0800_0023 => "Object dictionary dynamic generation fails or no object dictionary is present",
}
