//! CiA 402 device profile: status/control words, the power state machine and
//! the bounded-retry walk to "operation enabled".

use core::time::Duration;

use bitfield_struct::bitfield;
use log::{debug, info, warn};

use crate::config::EnableConfig;
use crate::error::{Error, StateError};

/// Status word (0x6041).
#[bitfield(u16)]
pub struct StatusWord {
    pub ready_to_switch_on: bool,
    pub switched_on: bool,
    pub operation_enabled: bool,
    pub fault: bool,
    pub voltage_enabled: bool,
    /// Active low: cleared while a quick stop is in progress.
    pub quick_stop: bool,
    pub switch_on_disabled: bool,
    pub warning: bool,
    #[bits(1)]
    _manufacturer_0: u8,
    pub remote: bool,
    pub target_reached: bool,
    pub internal_limit_active: bool,
    /// Set-point acknowledge in profile position, homing attained in homing mode.
    pub mode_specific_12: bool,
    /// Following error in profile position, homing error in homing mode.
    pub mode_specific_13: bool,
    #[bits(2)]
    _manufacturer_1: u8,
}

impl StatusWord {
    pub fn state(&self) -> CiA402State {
        decode_state(u16::from(*self))
    }

    pub fn homing_attained(&self) -> bool {
        self.mode_specific_12()
    }

    pub fn homing_error(&self) -> bool {
        self.mode_specific_13()
    }
}

/// Control word (0x6040).
#[bitfield(u16)]
pub struct ControlWord {
    pub switch_on: bool,
    pub enable_voltage: bool,
    /// Active low, like the matching status bit.
    pub quick_stop: bool,
    pub enable_operation: bool,
    /// New set-point in profile position, homing start in homing mode.
    pub new_set_point: bool,
    pub change_set_immediately: bool,
    pub relative: bool,
    pub fault_reset: bool,
    pub halt: bool,
    pub change_on_set_point: bool,
    #[bits(1)]
    _reserved_0: u8,
    #[bits(5)]
    _manufacturer: u8,
}

pub const CW_DISABLE_VOLTAGE: u16 = 0x00;
pub const CW_QUICK_STOP: u16 = 0x02;
pub const CW_SHUTDOWN: u16 = 0x06;
pub const CW_SWITCH_ON: u16 = 0x07;
pub const CW_DISABLE_OPERATION: u16 = 0x07;
pub const CW_ENABLE_OPERATION: u16 = 0x0F;
pub const CW_FAULT_RESET: u16 = 0x80;
/// Enable operation + new set-point.
pub const CW_NEW_SET_POINT: u16 = 0x1F;
/// Enable operation + change set immediately.
pub const CW_CHANGE_IMMEDIATELY: u16 = 0x2F;
/// Enable operation + new set-point + change set immediately.
pub const CW_APPLY_SET_POINT: u16 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CiA402State {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum OperationMode {
    ProfilePosition = 1,
    VelocityMode = 2,
    ProfileVelocity = 3,
    Homing = 6,
    CyclicSyncPosition = 8,
    CyclicSyncVelocity = 9,
    CyclicSyncTorque = 10,
}

impl OperationMode {
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            1 => Some(OperationMode::ProfilePosition),
            2 => Some(OperationMode::VelocityMode),
            3 => Some(OperationMode::ProfileVelocity),
            6 => Some(OperationMode::Homing),
            8 => Some(OperationMode::CyclicSyncPosition),
            9 => Some(OperationMode::CyclicSyncVelocity),
            10 => Some(OperationMode::CyclicSyncTorque),
            _ => None,
        }
    }
}

const MASK_STATES_4F: [(u16, CiA402State); 4] = [
    (0x00, CiA402State::NotReadyToSwitchOn),
    (0x40, CiA402State::SwitchOnDisabled),
    (0x08, CiA402State::Fault),
    (0x0F, CiA402State::FaultReactionActive),
];

const MASK_STATES_6F: [(u16, CiA402State); 4] = [
    (0x21, CiA402State::ReadyToSwitchOn),
    (0x23, CiA402State::SwitchedOn),
    (0x27, CiA402State::OperationEnabled),
    (0x07, CiA402State::QuickStopActive),
];

/// Maps a status word onto the power state. Patterns nobody defines fall
/// back to `NotReadyToSwitchOn`.
pub fn decode_state(status_word: u16) -> CiA402State {
    let lookup = |mask: u16, table: &[(u16, CiA402State)]| {
        table.iter().find(|(pattern, _)| status_word & mask == *pattern).map(|(_, state)| *state)
    };
    lookup(0x4F, &MASK_STATES_4F)
        .or_else(|| lookup(0x6F, &MASK_STATES_6F))
        .unwrap_or(CiA402State::NotReadyToSwitchOn)
}

/// The minimum a drive has to offer for the enable sequence to run against it.
pub trait DrivePort {
    fn read_status_word(&mut self) -> Result<u16, Error>;
    fn write_control_word(&mut self, value: u16) -> Result<(), Error>;
    fn pause(&mut self, duration: Duration) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnablePolicy {
    pub max_attempts: u32,
    pub step_delay: Duration,
    pub fault_reset_delay: Duration,
}

impl Default for EnablePolicy {
    fn default() -> Self {
        EnablePolicy::from(&EnableConfig::default())
    }
}

impl From<&EnableConfig> for EnablePolicy {
    fn from(config: &EnableConfig) -> Self {
        EnablePolicy {
            max_attempts: config.max_attempts,
            step_delay: Duration::from_millis(config.step_delay_ms),
            fault_reset_delay: Duration::from_millis(config.fault_reset_delay_ms),
        }
    }
}

/// Walks the drive to `OperationEnabled`, one control word per attempt.
///
/// Every attempt re-reads the status word and issues the single transition
/// that moves the drive one step closer (`0x06`, `0x07`, `0x0F`, or `0x80`
/// out of a fault). States without a forward transition are waited out.
/// Failed reads or writes cost an attempt and are only logged; cancellation
/// is returned as is. On success the number of attempts used is returned.
pub fn enable_operation<P: DrivePort>(port: &mut P, policy: &EnablePolicy) -> Result<u32, Error> {
    let mut last = CiA402State::NotReadyToSwitchOn;
    for attempt in 1..=policy.max_attempts {
        let state = match port.read_status_word() {
            Ok(status_word) => {
                let state = decode_state(status_word);
                debug!("[cia402] attempt {}: {:?} (status word {:#06x})", attempt, state, status_word);
                state
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!("[cia402] attempt {}: failed to read status word: {}", attempt, e);
                port.pause(policy.step_delay)?;
                continue;
            }
        };
        last = state;

        let (command, delay) = match state {
            CiA402State::OperationEnabled => {
                info!("[cia402] operation enabled after {} attempt(s)", attempt);
                return Ok(attempt);
            }
            CiA402State::SwitchOnDisabled => (Some(CW_SHUTDOWN), policy.step_delay),
            CiA402State::ReadyToSwitchOn => (Some(CW_SWITCH_ON), policy.step_delay),
            CiA402State::SwitchedOn => (Some(CW_ENABLE_OPERATION), policy.step_delay),
            CiA402State::Fault => {
                info!("[cia402] drive in fault, resetting");
                (Some(CW_FAULT_RESET), policy.fault_reset_delay)
            }
            CiA402State::NotReadyToSwitchOn
            | CiA402State::QuickStopActive
            | CiA402State::FaultReactionActive => (None, policy.step_delay),
        };

        if let Some(control_word) = command {
            match port.write_control_word(control_word) {
                Ok(()) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => warn!("[cia402] attempt {}: failed to write control word {:#06x}: {}", attempt, control_word, e),
            }
        }
        port.pause(delay)?;
    }

    warn!("[cia402] operation not enabled after {} attempts, last state {:?}", policy.max_attempts, last);
    Err(StateError::RetriesExhausted {
        target: CiA402State::OperationEnabled,
        attempts: policy.max_attempts,
        last,
    }
    .into())
}
