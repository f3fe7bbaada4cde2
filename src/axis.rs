//! One CiA 402 drive on the bus.
//!
//! An `Axis` borrows the transport it talks through, so several axes (one
//! per node id) can share one interface. Setpoints go out either as SDO
//! writes or as RPDOs, depending on the configured [`CommandPath`]; in the
//! PDO path the readers prefer the TPDO snapshots and fall back to SDO
//! while nothing has been received yet.

use std::time::Duration;

use log::{debug, info, warn};

use crate::bus::CanBus;
use crate::cia402::{
    self, decode_state, CiA402State, DrivePort, EnablePolicy, OperationMode, StatusWord, CW_APPLY_SET_POINT,
    CW_CHANGE_IMMEDIATELY, CW_DISABLE_OPERATION, CW_DISABLE_VOLTAGE, CW_ENABLE_OPERATION, CW_FAULT_RESET,
    CW_NEW_SET_POINT, CW_QUICK_STOP, CW_SHUTDOWN,
};
use crate::config::{CommandPath, DriveConfig, MotionConfig, PdoConfig};
use crate::constant::*;
use crate::error::{Error, ProtocolError, StateError};
use crate::nmt::NmtCommand;
use crate::pdo::{Rpdo1, Rpdo2, Rpdo3};
use crate::transport::Transport;
use crate::units::UnitScale;
use crate::util::WireSigned;
use crate::wait::Deadline;

/// Profile parameters for a position move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionProfile {
    /// `ProfilePosition` or `CyclicSyncPosition`.
    pub mode: OperationMode,
    pub velocity: u32,
    pub acceleration: u32,
    pub deceleration: u32,
}

impl From<&MotionConfig> for MotionProfile {
    fn from(config: &MotionConfig) -> Self {
        MotionProfile {
            mode: OperationMode::ProfilePosition,
            velocity: config.profile_velocity,
            acceleration: config.profile_acceleration,
            deceleration: config.profile_deceleration,
        }
    }
}

impl Default for MotionProfile {
    fn default() -> Self {
        MotionProfile::from(&MotionConfig::default())
    }
}

pub struct Axis<'a, B: CanBus> {
    transport: &'a Transport<B>,
    node_id: u8,
    state: CiA402State,
    mode: Option<OperationMode>,
    scale: UnitScale,
    command_path: CommandPath,
    policy: EnablePolicy,
    motion: MotionConfig,
    pdo: PdoConfig,
}

struct SdoDrive<'t, B: CanBus> {
    transport: &'t Transport<B>,
    node_id: u8,
}

impl<B: CanBus> DrivePort for SdoDrive<'_, B> {
    fn read_status_word(&mut self) -> Result<u16, Error> {
        Ok(self.transport.read_sdo(self.node_id, REG_STATUS_WORD, 0)? as u16)
    }

    fn write_control_word(&mut self, value: u16) -> Result<(), Error> {
        self.transport.write_sdo(self.node_id, REG_CONTROL_WORD, 0, value as u32, 2)
    }

    fn pause(&mut self, duration: Duration) -> Result<(), Error> {
        self.transport.pause(duration)
    }
}

/// Errors a polling loop shrugs off and retries on the next tick. An abort
/// is the drive refusing the read, so it ends the wait.
fn is_transient(e: &Error) -> bool {
    matches!(e, Error::Timeout(_) | Error::Protocol(ProtocolError::Malformed { .. }))
}

impl<'a, B: CanBus> Axis<'a, B> {
    pub fn new(transport: &'a Transport<B>, node_id: u8, config: &DriveConfig) -> Result<Self, Error> {
        if node_id == 0 || node_id > MAX_NODE_ID {
            return Err(Error::InvalidArgument(format!("node id {} out of range 1..=127", node_id)));
        }
        Ok(Axis {
            transport,
            node_id,
            state: CiA402State::NotReadyToSwitchOn,
            mode: None,
            scale: UnitScale::try_from(&config.axis)?,
            command_path: config.axis.command_path,
            policy: EnablePolicy::from(&config.enable),
            motion: config.motion.clone(),
            pdo: config.pdo.clone(),
        })
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Last state seen by `refresh_state` or the enable sequence.
    pub fn state(&self) -> CiA402State {
        self.state
    }

    /// Last mode requested through this handle.
    pub fn mode(&self) -> Option<OperationMode> {
        self.mode
    }

    pub fn scale(&self) -> &UnitScale {
        &self.scale
    }

    pub fn command_path(&self) -> CommandPath {
        self.command_path
    }

    pub fn set_command_path(&mut self, command_path: CommandPath) {
        self.command_path = command_path;
    }

    pub fn start_node(&self) -> Result<(), Error> {
        self.transport.send_nmt(NmtCommand::StartRemoteNode, self.node_id)
    }

    pub fn configure_pdo(&self) -> Result<(), Error> {
        self.transport.configure_pdo_mapping(self.node_id, &self.pdo)
    }

    pub fn refresh_state(&mut self) -> Result<CiA402State, Error> {
        let status_word = self.status_word()?;
        self.state = decode_state(status_word);
        Ok(self.state)
    }

    /// Resets a pending fault, then runs the enable sequence.
    pub fn initialize(&mut self) -> Result<(), Error> {
        info!("[axis] node {}: initializing", self.node_id);
        let status_word = self.transport.read_sdo(self.node_id, REG_STATUS_WORD, 0)? as u16;
        self.state = decode_state(status_word);
        if self.state == CiA402State::Fault {
            info!("[axis] node {}: fault pending (status word {:#06x}), resetting", self.node_id, status_word);
            self.reset_fault()?;
            self.transport.pause(self.policy.fault_reset_delay)?;
        }
        self.enable_operation()
    }

    pub fn enable_operation(&mut self) -> Result<(), Error> {
        let mut drive = SdoDrive { transport: self.transport, node_id: self.node_id };
        match cia402::enable_operation(&mut drive, &self.policy) {
            Ok(_) => {
                self.state = CiA402State::OperationEnabled;
                Ok(())
            }
            Err(e) => {
                if let Error::State(StateError::RetriesExhausted { last, .. }) = &e {
                    self.state = *last;
                }
                Err(e)
            }
        }
    }

    fn write_control_word(&self, control_word: u16) -> Result<(), Error> {
        self.transport.write_sdo(self.node_id, REG_CONTROL_WORD, 0, control_word as u32, 2)
    }

    pub fn reset_fault(&self) -> Result<(), Error> {
        info!("[axis] node {}: fault reset", self.node_id);
        self.write_control_word(CW_FAULT_RESET)
    }

    pub fn quick_stop(&self) -> Result<(), Error> {
        info!("[axis] node {}: quick stop", self.node_id);
        self.write_control_word(CW_QUICK_STOP)
    }

    pub fn disable_operation(&self) -> Result<(), Error> {
        info!("[axis] node {}: disable operation", self.node_id);
        self.write_control_word(CW_DISABLE_OPERATION)
    }

    pub fn shutdown(&self) -> Result<(), Error> {
        info!("[axis] node {}: shutdown", self.node_id);
        self.write_control_word(CW_SHUTDOWN)
    }

    pub fn disable_voltage(&self) -> Result<(), Error> {
        info!("[axis] node {}: disable voltage", self.node_id);
        self.write_control_word(CW_DISABLE_VOLTAGE)
    }

    /// Writes 0x6060, lets the drive settle and checks 0x6061. A display that
    /// disagrees is only logged.
    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<(), Error> {
        info!("[axis] node {}: mode {:?}", self.node_id, mode);
        self.transport.write_sdo_i8(self.node_id, REG_MODES_OF_OPERATION, 0, mode.code())?;
        self.mode = Some(mode);
        self.transport.pause(Duration::from_millis(self.motion.mode_settle_ms))?;
        match self.transport.read_sdo_i8(self.node_id, REG_MODES_OF_OPERATION_DISPLAY, 0) {
            Ok(display) if display == mode.code() => debug!("[axis] node {}: mode display {}", self.node_id, display),
            Ok(display) => warn!(
                "[axis] node {}: requested {:?} ({}) but drive displays {}",
                self.node_id,
                mode,
                mode.code(),
                display
            ),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => warn!("[axis] node {}: failed to read mode display: {}", self.node_id, e),
        }
        Ok(())
    }

    pub fn move_to_position(&mut self, target: i32) -> Result<(), Error> {
        let profile = MotionProfile::from(&self.motion);
        self.move_to_position_with(target, &profile)
    }

    /// Configures the profile, writes the target and latches it with
    /// control words 0x1F, 0x2F, 0x3F.
    pub fn move_to_position_with(&mut self, target: i32, profile: &MotionProfile) -> Result<(), Error> {
        if !matches!(profile.mode, OperationMode::ProfilePosition | OperationMode::CyclicSyncPosition) {
            return Err(Error::InvalidArgument(format!("{:?} is not a position mode", profile.mode)));
        }
        info!("[axis] node {}: move to {} ({:?})", self.node_id, target, self.command_path);
        self.set_operation_mode(profile.mode)?;

        let node_id = self.node_id;
        self.transport.write_sdo(node_id, REG_PROFILE_VELOCITY, 0, profile.velocity, 4)?;
        self.transport.write_sdo(node_id, REG_PROFILE_ACCELERATION, 0, profile.acceleration, 4)?;
        self.transport.write_sdo(node_id, REG_PROFILE_DECELERATION, 0, profile.deceleration, 4)?;

        let setpoint_delay = Duration::from_millis(self.motion.setpoint_delay_ms);
        if self.command_path == CommandPath::Sdo {
            self.transport.write_sdo_i32(node_id, REG_TARGET_POSITION, 0, target)?;
        }
        for control_word in [CW_NEW_SET_POINT, CW_CHANGE_IMMEDIATELY, CW_APPLY_SET_POINT] {
            match self.command_path {
                CommandPath::Sdo => self.write_control_word(control_word)?,
                CommandPath::Pdo => {
                    self.transport.send_rpdo1(node_id, &Rpdo1 { control_word, target_position: target })?
                }
            }
            self.transport.pause(setpoint_delay)?;
        }
        Ok(())
    }

    /// Cyclic synchronous velocity, in counts per second.
    pub fn set_velocity(&mut self, counts_per_sec: i32) -> Result<(), Error> {
        info!("[axis] node {}: velocity {} counts/s", self.node_id, counts_per_sec);
        let mode = OperationMode::CyclicSyncVelocity;
        self.set_operation_mode(mode)?;
        match self.command_path {
            CommandPath::Sdo => self.transport.write_sdo_i32(self.node_id, REG_TARGET_VELOCITY, 0, counts_per_sec)?,
            CommandPath::Pdo => self
                .transport
                .send_rpdo2(self.node_id, &Rpdo2 { target_velocity: counts_per_sec, mode: mode.code() })?,
        }
        self.write_control_word(CW_ENABLE_OPERATION)
    }

    /// Cyclic synchronous torque, in the drive's torque units (usually per mille of rated torque).
    pub fn set_torque(&mut self, torque: i16) -> Result<(), Error> {
        info!("[axis] node {}: torque {}", self.node_id, torque);
        self.set_operation_mode(OperationMode::CyclicSyncTorque)?;
        match self.command_path {
            CommandPath::Sdo => self.transport.write_sdo_i16(self.node_id, REG_TARGET_TORQUE, 0, torque)?,
            CommandPath::Pdo => self.transport.send_rpdo3(self.node_id, &Rpdo3 { target_torque: torque })?,
        }
        self.write_control_word(CW_ENABLE_OPERATION)
    }

    pub fn start_homing(&mut self, method: u8) -> Result<(), Error> {
        if !HOMING_METHODS.contains(&method) {
            return Err(Error::InvalidArgument(format!("homing method {} not in 1..=35", method)));
        }
        info!("[axis] node {}: homing, method {}", self.node_id, method);
        self.set_operation_mode(OperationMode::Homing)?;
        self.transport.write_sdo(self.node_id, REG_HOMING_METHOD, 0, method as u32, 1)?;
        self.write_control_word(CW_NEW_SET_POINT)?;
        self.transport.pause(Duration::from_millis(self.motion.setpoint_delay_ms))?;
        self.write_control_word(CW_APPLY_SET_POINT)
    }

    /// Polls until homing is attained. `None` waits the configured homing timeout.
    pub fn wait_for_homing(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let timeout = timeout.unwrap_or(Duration::from_millis(self.motion.homing_timeout_ms));
        let deadline = self.transport.deadline(timeout);
        let interval = Duration::from_millis(self.motion.homing_poll_ms);
        let result = self.poll_status(&deadline, interval, |status, _| {
            if status.homing_attained() {
                info!("[axis] node {}: homing attained", self.node_id);
                return Ok(Some(()));
            }
            let status_word = u16::from(status);
            if status.homing_error() {
                return Err(StateError::HomingFailed { status_word }.into());
            }
            if status.fault() {
                return Err(StateError::Fault { status_word }.into());
            }
            debug!("[axis] node {}: homing in progress, status word {:#06x}", self.node_id, status_word);
            Ok(None)
        });
        if let Err(e) = &result {
            warn!("[axis] node {}: homing not completed: {}", self.node_id, e);
        }
        result
    }

    /// Polls until the drive reports target reached or the actual position is
    /// within `tolerance` counts of `target`; returns the last actual position.
    pub fn wait_for_position_reached(
        &self,
        target: i32,
        tolerance: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<i32, Error> {
        let tolerance = tolerance.unwrap_or(self.motion.position_tolerance) as i64;
        let timeout = timeout.unwrap_or(Duration::from_millis(self.motion.position_timeout_ms));
        let deadline = self.transport.deadline(timeout);
        let interval = Duration::from_millis(self.motion.position_poll_ms);
        self.poll_status(&deadline, interval, |status, read| {
            let actual = self.actual_position_until(read)?;
            if status.target_reached() || (actual as i64 - target as i64).abs() <= tolerance {
                info!("[axis] node {}: at {} (target {})", self.node_id, actual, target);
                return Ok(Some(actual));
            }
            if status.fault() {
                return Err(StateError::Fault { status_word: u16::from(status) }.into());
            }
            debug!("[axis] node {}: moving, at {} (target {})", self.node_id, actual, target);
            Ok(None)
        })
    }

    /// Each probe's SDO reads share one deadline, capped by `deadline`.
    fn poll_status<T, C>(&self, deadline: &Deadline, interval: Duration, mut check: C) -> Result<T, Error>
    where
        C: FnMut(StatusWord, &Deadline) -> Result<Option<T>, Error>,
    {
        deadline.poll_until(interval, || {
            let read = deadline.within(self.transport.sdo_timeout());
            match self.status_word_until(&read).and_then(|status_word| check(StatusWord::from(status_word), &read)) {
                Err(e) if is_transient(&e) => {
                    warn!("[axis] node {}: status poll failed, retrying: {}", self.node_id, e);
                    Ok(None)
                }
                other => other,
            }
        })
    }

    pub fn status_word(&self) -> Result<u16, Error> {
        self.status_word_until(&self.transport.deadline(self.transport.sdo_timeout()))
    }

    fn status_word_until(&self, deadline: &Deadline) -> Result<u16, Error> {
        if let Some(tpdo) = self.cached_tpdo1() {
            return Ok(tpdo.status_word);
        }
        Ok(self.transport.read_sdo_until(self.node_id, REG_STATUS_WORD, 0, deadline)? as u16)
    }

    pub fn actual_position(&self) -> Result<i32, Error> {
        self.actual_position_until(&self.transport.deadline(self.transport.sdo_timeout()))
    }

    fn actual_position_until(&self, deadline: &Deadline) -> Result<i32, Error> {
        if let Some(tpdo) = self.cached_tpdo1() {
            return Ok(tpdo.actual_position);
        }
        Ok(i32::from_wire(self.transport.read_sdo_until(self.node_id, REG_ACTUAL_POSITION, 0, deadline)?))
    }

    pub fn actual_torque(&self) -> Result<i16, Error> {
        if let Some(tpdo) = self.cached_tpdo1() {
            return Ok(tpdo.actual_torque);
        }
        self.transport.read_sdo_i16(self.node_id, REG_ACTUAL_TORQUE, 0)
    }

    pub fn actual_velocity(&self) -> Result<i32, Error> {
        if let Some(tpdo) = self.cached_tpdo2() {
            return Ok(tpdo.actual_velocity);
        }
        self.transport.read_sdo_i32(self.node_id, REG_ACTUAL_VELOCITY, 0)
    }

    pub fn mode_display(&self) -> Result<i8, Error> {
        if let Some(tpdo) = self.cached_tpdo2() {
            return Ok(tpdo.mode_display);
        }
        self.transport.read_sdo_i8(self.node_id, REG_MODES_OF_OPERATION_DISPLAY, 0)
    }

    fn cached_tpdo1(&self) -> Option<crate::pdo::Tpdo1> {
        match self.command_path {
            CommandPath::Pdo => self.transport.tpdo1(self.node_id),
            CommandPath::Sdo => None,
        }
    }

    fn cached_tpdo2(&self) -> Option<crate::pdo::Tpdo2> {
        match self.command_path {
            CommandPath::Pdo => self.transport.tpdo2(self.node_id),
            CommandPath::Sdo => None,
        }
    }

    /// Moves to an output-shaft angle; returns the target in counts.
    pub fn move_to_radians(&mut self, radians: f64) -> Result<i32, Error> {
        let target = self.scale.radians_to_counts(radians);
        self.move_to_position(target)?;
        Ok(target)
    }

    pub fn set_velocity_rpm(&mut self, rpm: f64) -> Result<(), Error> {
        self.set_velocity(self.scale.rpm_to_counts_per_sec(rpm))
    }

    pub fn actual_radians(&self) -> Result<f64, Error> {
        Ok(self.scale.counts_to_radians(self.actual_position()?))
    }

    pub fn actual_rpm(&self) -> Result<f64, Error> {
        Ok(self.scale.counts_per_sec_to_rpm(self.actual_velocity()?))
    }
}
