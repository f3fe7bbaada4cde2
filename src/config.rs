//! Drive configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or
//! `DriveConfig::default()`) describes node 1 on `can0` with the timings the
//! drive firmware was commissioned with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constant::MAX_NODE_ID;
use crate::error::Error;

/// How setpoints travel to the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandPath {
    /// Confirmed SDO writes to the object dictionary.
    #[default]
    Sdo,
    /// RPDO frames, after `configure_pdo_mapping` has run.
    Pdo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub bus: BusConfig,
    pub sdo: SdoConfig,
    pub axis: AxisConfig,
    pub enable: EnableConfig,
    pub motion: MotionConfig,
    pub pdo: PdoConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Must already be up at the right bitrate (`ip link set can0 up type can bitrate 500000`).
    pub interface: String,
    pub node_id: u8,
    /// Socket read timeout; bounds how long `disconnect` waits for the receive loop.
    pub read_timeout_ms: u64,
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            interface: "can0".to_string(),
            node_id: 1,
            read_timeout_ms: 5,
            queue_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdoConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for SdoConfig {
    fn default() -> Self {
        SdoConfig { timeout_ms: 2000, poll_interval_ms: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub counts_per_rev: u32,
    pub gear_ratio: f64,
    pub command_path: CommandPath,
}

impl Default for AxisConfig {
    fn default() -> Self {
        AxisConfig { counts_per_rev: 10_000, gear_ratio: 1.0, command_path: CommandPath::Sdo }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnableConfig {
    pub max_attempts: u32,
    pub step_delay_ms: u64,
    pub fault_reset_delay_ms: u64,
}

impl Default for EnableConfig {
    fn default() -> Self {
        EnableConfig { max_attempts: 10, step_delay_ms: 200, fault_reset_delay_ms: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub setpoint_delay_ms: u64,
    pub mode_settle_ms: u64,
    pub homing_timeout_ms: u64,
    pub homing_poll_ms: u64,
    pub position_poll_ms: u64,
    pub position_timeout_ms: u64,
    pub profile_velocity: u32,
    pub profile_acceleration: u32,
    pub profile_deceleration: u32,
    pub position_tolerance: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            setpoint_delay_ms: 10,
            mode_settle_ms: 100,
            homing_timeout_ms: 30_000,
            homing_poll_ms: 500,
            position_poll_ms: 500,
            position_timeout_ms: 30_000,
            profile_velocity: 10_000,
            profile_acceleration: 1_000_000,
            profile_deceleration: 1_000_000,
            position_tolerance: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdoConfig {
    /// 0xFF: event driven (manufacturer specific), 1..=240: every n-th SYNC.
    pub transmission_type: u8,
    /// TPDO event timer, 0 disables it.
    pub tpdo_event_timer_ms: u16,
}

impl Default for PdoConfig {
    fn default() -> Self {
        PdoConfig { transmission_type: 0xFF, tpdo_event_timer_ms: 10 }
    }
}

impl DriveConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: DriveConfig = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.bus.node_id == 0 || self.bus.node_id > MAX_NODE_ID {
            return Err(Error::Config(format!("node_id {} out of range 1..=127", self.bus.node_id)));
        }
        if self.bus.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be non-zero".to_string()));
        }
        if self.axis.counts_per_rev == 0 {
            return Err(Error::Config("counts_per_rev must be non-zero".to_string()));
        }
        if !(self.axis.gear_ratio.is_finite() && self.axis.gear_ratio > 0.0) {
            return Err(Error::Config(format!("gear_ratio {} must be positive", self.axis.gear_ratio)));
        }
        if self.enable.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl BusConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

impl SdoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(1, 10))
    }
}
