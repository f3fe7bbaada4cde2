//! CiA 402 servo drive control over CANopen.
//!
//! A [`Transport`] owns one CAN interface and its receive thread; SDO, PDO
//! and NMT services are methods on it. An [`Axis`] drives one node through
//! the CiA 402 power state machine and issues motion commands.
//!
//! ```no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), canopen_cia402::Error> {
//! use canopen_cia402::{Axis, DriveConfig, SocketCanBus, Transport, TransportOptions};
//!
//! let config = DriveConfig::load("drive.toml")?;
//! let transport: Transport<SocketCanBus> = Transport::new(TransportOptions::from_config(&config));
//! transport.connect(&config.bus.interface)?;
//! let mut axis = Axis::new(&transport, config.bus.node_id, &config)?;
//! axis.initialize()?;
//! let target = axis.move_to_radians(std::f64::consts::PI)?;
//! axis.wait_for_position_reached(target, None, None)?;
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub mod axis;
pub mod bus;
pub mod cia402;
pub mod config;
pub mod constant;
pub mod demux;
pub mod error;
pub mod nmt;
pub mod pdo;
pub mod sdo_client;
pub mod transport;
pub mod units;
pub mod util;
pub mod wait;

pub use axis::{Axis, MotionProfile};
pub use bus::CanBus;
#[cfg(target_os = "linux")]
pub use bus::SocketCanBus;
pub use cia402::{decode_state, CiA402State, ControlWord, OperationMode, StatusWord};
pub use config::{CommandPath, DriveConfig};
pub use demux::{BusEvent, Direction, LogEntry};
pub use error::{AbortCode, Error, ProtocolError, StateError, TransportError};
pub use nmt::NmtCommand;
pub use pdo::{Rpdo1, Rpdo2, Rpdo3, Tpdo1, Tpdo2};
pub use sdo_client::SdoSize;
pub use transport::{Transport, TransportOptions};
pub use units::UnitScale;
pub use wait::{CancelToken, Clock, Deadline, ManualClock, SystemClock};
