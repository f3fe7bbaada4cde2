use log::{debug, info};

use crate::bus::CanBus;
use crate::cia402::{decode_state, CiA402State};
use crate::config::PdoConfig;
use crate::constant::*;
use crate::error::Error;
use crate::transport::Transport;
use crate::util::le_bytes_at;

/// Status word, actual position and actual torque, as sent on 0x180+node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tpdo1 {
    pub status_word: u16,
    pub actual_position: i32,
    pub actual_torque: i16,
}

impl Tpdo1 {
    /// Fields past the end of a short payload stay zero.
    pub fn decode(data: &[u8]) -> Self {
        Tpdo1 {
            status_word: le_bytes_at(data, 0).map_or(0, u16::from_le_bytes),
            actual_position: le_bytes_at(data, 2).map_or(0, i32::from_le_bytes),
            actual_torque: le_bytes_at(data, 6).map_or(0, i16::from_le_bytes),
        }
    }

    pub fn state(&self) -> CiA402State {
        decode_state(self.status_word)
    }
}

/// Actual velocity and mode display, as sent on 0x280+node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tpdo2 {
    pub actual_velocity: i32,
    pub mode_display: i8,
}

impl Tpdo2 {
    pub fn decode(data: &[u8]) -> Self {
        Tpdo2 {
            actual_velocity: le_bytes_at(data, 0).map_or(0, i32::from_le_bytes),
            mode_display: le_bytes_at(data, 4).map_or(0, i8::from_le_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rpdo1 {
    pub control_word: u16,
    pub target_position: i32,
}

impl Rpdo1 {
    pub fn encode(&self) -> [u8; 6] {
        let mut data = [0u8; 6];
        data[..2].copy_from_slice(&self.control_word.to_le_bytes());
        data[2..].copy_from_slice(&self.target_position.to_le_bytes());
        data
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rpdo2 {
    pub target_velocity: i32,
    pub mode: i8,
}

impl Rpdo2 {
    pub fn encode(&self) -> [u8; 5] {
        let mut data = [0u8; 5];
        data[..4].copy_from_slice(&self.target_velocity.to_le_bytes());
        data[4] = self.mode as u8;
        data
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rpdo3 {
    pub target_torque: i16,
}

impl Rpdo3 {
    pub fn encode(&self) -> [u8; 2] {
        self.target_torque.to_le_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdoType {
    TPDO,
    RPDO,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdoSlot {
    Rpdo1,
    Rpdo2,
    Rpdo3,
    Tpdo1,
    Tpdo2,
}

impl PdoSlot {
    pub fn pdo_type(&self) -> PdoType {
        match self {
            PdoSlot::Rpdo1 | PdoSlot::Rpdo2 | PdoSlot::Rpdo3 => PdoType::RPDO,
            PdoSlot::Tpdo1 | PdoSlot::Tpdo2 => PdoType::TPDO,
        }
    }

    fn offset(&self) -> u16 {
        match self {
            PdoSlot::Rpdo1 | PdoSlot::Tpdo1 => 0,
            PdoSlot::Rpdo2 | PdoSlot::Tpdo2 => 1,
            PdoSlot::Rpdo3 => 2,
        }
    }

    /// Communication parameter object (0x1400+n / 0x1800+n).
    pub fn comm_index(&self) -> u16 {
        match self.pdo_type() {
            PdoType::RPDO => REG_RPDO_COMM_BASE + self.offset(),
            PdoType::TPDO => REG_TPDO_COMM_BASE + self.offset(),
        }
    }

    /// Mapping parameter object (0x1600+n / 0x1A00+n).
    pub fn mapping_index(&self) -> u16 {
        match self.pdo_type() {
            PdoType::RPDO => REG_RPDO_MAPPING_BASE + self.offset(),
            PdoType::TPDO => REG_TPDO_MAPPING_BASE + self.offset(),
        }
    }

    pub fn cob_id(&self, node_id: u8) -> u16 {
        let base = match self {
            PdoSlot::Rpdo1 => COB_FUNC_RPDO_1,
            PdoSlot::Rpdo2 => COB_FUNC_RPDO_2,
            PdoSlot::Rpdo3 => COB_FUNC_RPDO_3,
            PdoSlot::Tpdo1 => COB_FUNC_TPDO_1,
            PdoSlot::Tpdo2 => COB_FUNC_TPDO_2,
        };
        base + node_id as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    pub index: u16,
    pub sub_index: u8,
    pub bits: u8,
}

impl MappingEntry {
    pub const fn new(index: u16, sub_index: u8, bits: u8) -> Self {
        MappingEntry { index, sub_index, bits }
    }

    /// `index << 16 | sub_index << 8 | bits`, the value of a mapping sub-entry.
    pub fn encode(&self) -> u32 {
        (self.index as u32) << 16 | (self.sub_index as u32) << 8 | self.bits as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoMapping {
    pub slot: PdoSlot,
    pub entries: &'static [MappingEntry],
}

/// The fixed layout every frame codec in this module assumes.
pub const DRIVE_PDO_MAPPINGS: [PdoMapping; 5] = [
    PdoMapping {
        slot: PdoSlot::Rpdo1,
        entries: &[MappingEntry::new(REG_CONTROL_WORD, 0, 16), MappingEntry::new(REG_TARGET_POSITION, 0, 32)],
    },
    PdoMapping {
        slot: PdoSlot::Rpdo2,
        entries: &[MappingEntry::new(REG_TARGET_VELOCITY, 0, 32), MappingEntry::new(REG_MODES_OF_OPERATION, 0, 8)],
    },
    PdoMapping {
        slot: PdoSlot::Rpdo3,
        entries: &[MappingEntry::new(REG_TARGET_TORQUE, 0, 16)],
    },
    PdoMapping {
        slot: PdoSlot::Tpdo1,
        entries: &[
            MappingEntry::new(REG_STATUS_WORD, 0, 16),
            MappingEntry::new(REG_ACTUAL_POSITION, 0, 32),
            MappingEntry::new(REG_ACTUAL_TORQUE, 0, 16),
        ],
    },
    PdoMapping {
        slot: PdoSlot::Tpdo2,
        entries: &[MappingEntry::new(REG_ACTUAL_VELOCITY, 0, 32), MappingEntry::new(REG_MODES_OF_OPERATION_DISPLAY, 0, 8)],
    },
];

impl<B: CanBus> Transport<B> {
    /// Programs `DRIVE_PDO_MAPPINGS` into `node_id`.
    ///
    /// Mapping objects only accept writes while their PDO is invalid, so every
    /// slot goes: COB-ID with bit 31 set, transmission type (and event timer
    /// for TPDOs), count 0, entries, count, COB-ID without bit 31. Stops at
    /// the first failed write.
    pub fn configure_pdo_mapping(&self, node_id: u8, config: &PdoConfig) -> Result<(), Error> {
        info!("[pdo] configuring PDO mapping of node {}", node_id);
        for mapping in DRIVE_PDO_MAPPINGS.iter() {
            self.configure_pdo_slot(node_id, mapping, config)?;
        }
        info!("[pdo] PDO mapping of node {} done", node_id);
        Ok(())
    }

    fn configure_pdo_slot(&self, node_id: u8, mapping: &PdoMapping, config: &PdoConfig) -> Result<(), Error> {
        let slot = mapping.slot;
        let comm = slot.comm_index();
        let map = slot.mapping_index();
        let cob_id = slot.cob_id(node_id) as u32;
        debug!("[pdo] {:?}: cob id {:#x}, {} entries", slot, cob_id, mapping.entries.len());

        self.write_sdo(node_id, comm, 1, cob_id | PDO_COB_ID_INVALID, 4)?;
        self.write_sdo(node_id, comm, 2, config.transmission_type as u32, 1)?;
        if slot.pdo_type() == PdoType::TPDO {
            self.write_sdo(node_id, comm, 5, config.tpdo_event_timer_ms as u32, 2)?;
        }
        self.write_sdo(node_id, map, 0, 0, 1)?;
        for (i, entry) in mapping.entries.iter().enumerate() {
            self.write_sdo(node_id, map, i as u8 + 1, entry.encode(), 4)?;
        }
        self.write_sdo(node_id, map, 0, mapping.entries.len() as u32, 1)?;
        self.write_sdo(node_id, comm, 1, cob_id, 4)
    }

    pub fn send_rpdo1(&self, node_id: u8, rpdo: &Rpdo1) -> Result<(), Error> {
        self.send_data(PdoSlot::Rpdo1.cob_id(node_id), &rpdo.encode())
    }

    pub fn send_rpdo2(&self, node_id: u8, rpdo: &Rpdo2) -> Result<(), Error> {
        self.send_data(PdoSlot::Rpdo2.cob_id(node_id), &rpdo.encode())
    }

    pub fn send_rpdo3(&self, node_id: u8, rpdo: &Rpdo3) -> Result<(), Error> {
        self.send_data(PdoSlot::Rpdo3.cob_id(node_id), &rpdo.encode())
    }
}
