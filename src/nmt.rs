use log::info;

use crate::bus::CanBus;
use crate::constant::{COB_FUNC_NMT, MAX_NODE_ID};
use crate::error::Error;
use crate::transport::Transport;

/// NMT node control command specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommand {
    StartRemoteNode = 0x01,
    StopRemoteNode = 0x02,
    EnterPreOperational = 0x80,
    ResetNode = 0x81,
    ResetCommunication = 0x82,
}

impl NmtCommand {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Addresses every node on the bus.
pub const NMT_ALL_NODES: u8 = 0;

impl<B: CanBus> Transport<B> {
    /// Sends `[command, node_id]` on COB-ID 0. Nodes do not answer NMT.
    pub fn send_nmt(&self, command: NmtCommand, node_id: u8) -> Result<(), Error> {
        if node_id > MAX_NODE_ID {
            return Err(Error::InvalidArgument(format!("node id {} out of range 0..=127", node_id)));
        }
        info!("[nmt] {:?} -> node {}", command, node_id);
        self.send_data(COB_FUNC_NMT, &[command.code(), node_id])
    }
}
