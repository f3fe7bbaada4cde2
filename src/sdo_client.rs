//! Expedited SDO client (transfers of up to 4 bytes).
//!
//! One cycle is: flush whatever is queued, send the request on 0x600+node,
//! then drain the response queue until a frame on 0x580+node answers the
//! same index and sub-index. Cycles on one transport never overlap.

use core::convert::TryFrom;

use embedded_can::Frame;
use log::{debug, trace, warn};

use crate::bus::CanBus;
use crate::constant::*;
use crate::error::{Error, ProtocolError, TransportError};
use crate::transport::Transport;
use crate::util::{create_frame, get_cob_id, get_index_from_can_frame, le_bytes_at, WireSigned};
use crate::wait::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdoSize {
    One = 1,
    Two = 2,
    Four = 4,
}

impl SdoSize {
    pub fn byte_len(self) -> usize {
        self as usize
    }

    pub fn write_command(self) -> u8 {
        match self {
            SdoSize::One => SDO_WRITE_1_BYTE,
            SdoSize::Two => SDO_WRITE_2_BYTES,
            SdoSize::Four => SDO_WRITE_4_BYTES,
        }
    }

    pub fn from_read_ack(command: u8) -> Option<Self> {
        match command {
            SDO_READ_ACK_1_BYTE => Some(SdoSize::One),
            SDO_READ_ACK_2_BYTES => Some(SdoSize::Two),
            SDO_READ_ACK_4_BYTES => Some(SdoSize::Four),
            _ => None,
        }
    }
}

impl TryFrom<u8> for SdoSize {
    type Error = Error;

    fn try_from(size: u8) -> Result<Self, Error> {
        match size {
            1 => Ok(SdoSize::One),
            2 => Ok(SdoSize::Two),
            4 => Ok(SdoSize::Four),
            _ => Err(Error::InvalidArgument(format!("expedited SDO size must be 1, 2 or 4, got {}", size))),
        }
    }
}

fn check_node_id(node_id: u8) -> Result<(), Error> {
    if node_id == 0 || node_id > MAX_NODE_ID {
        return Err(Error::InvalidArgument(format!("node id {} out of range 1..=127", node_id)));
    }
    Ok(())
}

fn abort_error(index: u16, sub_index: u8, response: &[u8]) -> Error {
    let code = le_bytes_at(response, 4).map_or(0, u32::from_le_bytes);
    ProtocolError::Abort { index, sub_index, code }.into()
}

impl<B: CanBus> Transport<B> {
    /// Writes the low `size` bytes of `value` to `index:sub_index` of `node_id`.
    pub fn write_sdo(&self, node_id: u8, index: u16, sub_index: u8, value: u32, size: u8) -> Result<(), Error> {
        let deadline = self.deadline(self.sdo_timeout());
        self.write_sdo_until(node_id, index, sub_index, value, size, &deadline)
    }

    pub fn write_sdo_until(
        &self,
        node_id: u8,
        index: u16,
        sub_index: u8,
        value: u32,
        size: u8,
        deadline: &Deadline,
    ) -> Result<(), Error> {
        let size = SdoSize::try_from(size)?;
        check_node_id(node_id)?;

        let mut request = [0u8; 8];
        request[0] = size.write_command();
        request[1..3].copy_from_slice(&index.to_le_bytes());
        request[3] = sub_index;
        request[4..4 + size.byte_len()].copy_from_slice(&value.to_le_bytes()[..size.byte_len()]);

        let response = self.sdo_cycle(node_id, &request, deadline)?;
        match response[0] {
            SDO_WRITE_ACK => {
                debug!("[sdo client] node {}: wrote {:#x} to {:#06x}:{}", node_id, value, index, sub_index);
                Ok(())
            }
            SDO_ABORT => Err(abort_error(index, sub_index, &response)),
            command => Err(ProtocolError::Unexpected { command }.into()),
        }
    }

    /// Reads `index:sub_index` of `node_id`; 1 and 2 byte objects are zero extended.
    pub fn read_sdo(&self, node_id: u8, index: u16, sub_index: u8) -> Result<u32, Error> {
        let deadline = self.deadline(self.sdo_timeout());
        self.read_sdo_until(node_id, index, sub_index, &deadline)
    }

    pub fn read_sdo_until(&self, node_id: u8, index: u16, sub_index: u8, deadline: &Deadline) -> Result<u32, Error> {
        check_node_id(node_id)?;

        let mut request = [0u8; 8];
        request[0] = SDO_READ_REQUEST;
        request[1..3].copy_from_slice(&index.to_le_bytes());
        request[3] = sub_index;

        let response = self.sdo_cycle(node_id, &request, deadline)?;
        let command = response[0];
        if command == SDO_ABORT {
            return Err(abort_error(index, sub_index, &response));
        }
        let size = SdoSize::from_read_ack(command).ok_or(ProtocolError::Unexpected { command })?;
        let bytes = response.get(4..4 + size.byte_len()).ok_or_else(|| ProtocolError::Malformed {
            cob_id: COB_FUNC_TRANSMIT_SDO + node_id as u16,
            reason: format!("{} byte upload response carries {} data bytes", size.byte_len(), response.len().saturating_sub(4)),
        })?;
        let mut raw = [0u8; 4];
        raw[..size.byte_len()].copy_from_slice(bytes);
        let value = u32::from_le_bytes(raw);
        debug!("[sdo client] node {}: read {:#x} from {:#06x}:{}", node_id, value, index, sub_index);
        Ok(value)
    }

    pub fn read_sdo_i32(&self, node_id: u8, index: u16, sub_index: u8) -> Result<i32, Error> {
        Ok(i32::from_wire(self.read_sdo(node_id, index, sub_index)?))
    }

    pub fn read_sdo_i16(&self, node_id: u8, index: u16, sub_index: u8) -> Result<i16, Error> {
        Ok(i16::from_wire(self.read_sdo(node_id, index, sub_index)? as u16))
    }

    pub fn read_sdo_i8(&self, node_id: u8, index: u16, sub_index: u8) -> Result<i8, Error> {
        Ok(i8::from_wire(self.read_sdo(node_id, index, sub_index)? as u8))
    }

    pub fn write_sdo_i32(&self, node_id: u8, index: u16, sub_index: u8, value: i32) -> Result<(), Error> {
        self.write_sdo(node_id, index, sub_index, value.to_wire(), 4)
    }

    pub fn write_sdo_i16(&self, node_id: u8, index: u16, sub_index: u8, value: i16) -> Result<(), Error> {
        self.write_sdo(node_id, index, sub_index, value.to_wire() as u32, 2)
    }

    pub fn write_sdo_i8(&self, node_id: u8, index: u16, sub_index: u8, value: i8) -> Result<(), Error> {
        self.write_sdo(node_id, index, sub_index, value.to_wire() as u32, 1)
    }

    /// Sends `request` and returns the payload of the matching response.
    fn sdo_cycle(&self, node_id: u8, request: &[u8; 8], deadline: &Deadline) -> Result<Vec<u8>, Error> {
        let _cycle = self.sdo_lock.lock();

        let stale = self.flush_responses();
        if stale > 0 {
            trace!("[sdo client] flushed {} stale frame(s)", stale);
        }

        let frame = create_frame::<B::Frame>(COB_FUNC_RECEIVE_SDO + node_id as u16, request)?;
        self.send(&frame)?;

        let expected_cob_id = COB_FUNC_TRANSMIT_SDO + node_id as u16;
        let index = u16::from_le_bytes([request[1], request[2]]);
        let sub_index = request[3];

        let result = deadline.poll_until(self.poll_interval(), || {
            while let Some(response) = self.next_response() {
                if get_cob_id(&response) != Some(expected_cob_id) {
                    continue;
                }
                match get_index_from_can_frame(&response) {
                    Some((i, s)) if i == index && s == sub_index => return Ok(Some(response.data().to_vec())),
                    Some((i, s)) => debug!(
                        "[sdo client] ignoring response for {:#06x}:{} while waiting for {:#06x}:{}",
                        i, s, index, sub_index
                    ),
                    None => {
                        return Err(ProtocolError::Malformed {
                            cob_id: expected_cob_id,
                            reason: format!("{} byte SDO response", response.data().len()),
                        }
                        .into())
                    }
                }
            }
            if !self.is_connected() {
                return Err(TransportError::NotConnected.into());
            }
            Ok(None)
        });

        if let Err(Error::Timeout(timeout)) = &result {
            self.flush_responses();
            warn!("[sdo client] node {}: no response for {:#06x}:{} within {:?}", node_id, index, sub_index, timeout);
        }
        result
    }
}
