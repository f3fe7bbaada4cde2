/// Canopen Function code prefixes on COB_ID
pub const COB_FUNC_NMT: u16 = 0x000;
pub const COB_FUNC_TPDO_1: u16 = 0x180;
pub const COB_FUNC_RPDO_1: u16 = 0x200;
pub const COB_FUNC_TPDO_2: u16 = 0x280;
pub const COB_FUNC_RPDO_2: u16 = 0x300;
pub const COB_FUNC_RPDO_3: u16 = 0x400;
pub const COB_FUNC_TRANSMIT_SDO: u16 = 0x580;
pub const COB_FUNC_RECEIVE_SDO: u16 = 0x600;
pub const COB_FUNC_MASK: u16 = 0xFF80;
pub const COB_NODE_MASK: u16 = 0x007F;

/// SDO command bytes (expedited only)
pub const SDO_WRITE_1_BYTE: u8 = 0x2F;
pub const SDO_WRITE_2_BYTES: u8 = 0x2B;
pub const SDO_WRITE_4_BYTES: u8 = 0x23;
pub const SDO_READ_REQUEST: u8 = 0x40;
pub const SDO_WRITE_ACK: u8 = 0x60;
pub const SDO_READ_ACK_1_BYTE: u8 = 0x4F;
pub const SDO_READ_ACK_2_BYTES: u8 = 0x4B;
pub const SDO_READ_ACK_4_BYTES: u8 = 0x43;
pub const SDO_ABORT: u8 = 0x80;

/// CANOPEN communication registers
pub const REG_RPDO_COMM_BASE: u16 = 0x1400;
pub const REG_RPDO_MAPPING_BASE: u16 = 0x1600;
pub const REG_TPDO_COMM_BASE: u16 = 0x1800;
pub const REG_TPDO_MAPPING_BASE: u16 = 0x1A00;

/// COB-ID bit 31: PDO does not exist / is not valid.
pub const PDO_COB_ID_INVALID: u32 = 0x8000_0000;

/// CiA 402 registers
pub const REG_CONTROL_WORD: u16 = 0x6040;
pub const REG_STATUS_WORD: u16 = 0x6041;
pub const REG_MODES_OF_OPERATION: u16 = 0x6060;
pub const REG_MODES_OF_OPERATION_DISPLAY: u16 = 0x6061;
pub const REG_ACTUAL_POSITION: u16 = 0x6064;
pub const REG_ACTUAL_VELOCITY: u16 = 0x606C;
pub const REG_TARGET_TORQUE: u16 = 0x6071;
pub const REG_ACTUAL_TORQUE: u16 = 0x6077;
pub const REG_TARGET_POSITION: u16 = 0x607A;
pub const REG_POSITION_MODE_CONFIG: u16 = 0x607D;
pub const REG_MAX_PROFILE_VELOCITY: u16 = 0x607F;
pub const REG_PROFILE_VELOCITY: u16 = 0x6081;
pub const REG_PROFILE_ACCELERATION: u16 = 0x6083;
pub const REG_PROFILE_DECELERATION: u16 = 0x6084;
pub const REG_HOMING_METHOD: u16 = 0x6098;
pub const REG_TARGET_VELOCITY: u16 = 0x60FF;

/// Misc
pub const MAX_NODE_ID: u8 = 0x7F;
pub const HOMING_METHODS: core::ops::RangeInclusive<u8> = 1..=35;
