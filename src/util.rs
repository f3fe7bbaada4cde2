use core::fmt::Write;

use embedded_can::{Frame, Id, StandardId};

use crate::error::TransportError;

/// Two's complement mapping between a signed value and the unsigned field
/// it occupies on the wire.
pub trait WireSigned: Sized {
    type Raw;
    fn to_wire(self) -> Self::Raw;
    fn from_wire(raw: Self::Raw) -> Self;
}

macro_rules! impl_wire_signed {
    ($signed:ty, $unsigned:ty, $limit:expr, $upscale:ty, $wrap_around:expr) => {
        impl WireSigned for $signed {
            type Raw = $unsigned;

            fn to_wire(self) -> $unsigned {
                if self < 0 {
                    (self as $upscale + $wrap_around) as $unsigned
                } else {
                    self as $unsigned
                }
            }

            fn from_wire(raw: $unsigned) -> Self {
                if raw <= $limit {
                    raw as $signed
                } else {
                    (raw as $upscale - $wrap_around) as $signed
                }
            }
        }
    };
}

impl_wire_signed!(i8, u8, 0x7F, i16, 0x100);
impl_wire_signed!(i16, u16, 0x7FFF, i32, 0x10000);
impl_wire_signed!(i32, u32, 0x7FFFFFFF, i64, 0x100000000);

pub fn get_cob_id<F: Frame>(frame: &F) -> Option<u16> {
    if let Id::Standard(sid) = frame.id() {
        return Some(sid.as_raw());
    }
    // No standard id. We only support CAN 2.0a in current version.
    None
}

pub fn get_index_from_can_frame<F: Frame>(frame: &F) -> Option<(u16, u8)> {
    let data = frame.data();
    if data.len() < 4 {
        return None;
    }
    Some((u16::from_le_bytes([data[1], data[2]]), data[3]))
}

/// The `N` bytes at `offset`, or `None` when the payload is too short.
pub fn le_bytes_at<const N: usize>(data: &[u8], offset: usize) -> Option<[u8; N]> {
    data.get(offset..offset + N)?.try_into().ok()
}

pub fn create_frame<F: Frame>(cob_id: u16, data: &[u8]) -> Result<F, TransportError> {
    F::new(StandardId::new(cob_id).ok_or(TransportError::InvalidCobId { cob_id })?, data)
        .ok_or(TransportError::FrameCreationFailed { cob_id, data: data.to_vec() })
}

/// candump style text, e.g. `601  [8]  2B 40 60 00 06 00 00 00`.
pub fn frame_to_string<F: Frame>(frame: &F) -> String {
    let mut s = match frame.id() {
        Id::Standard(sid) => format!("{:03X}", sid.as_raw()),
        Id::Extended(eid) => format!("{:08X}", eid.as_raw()),
    };
    let _ = write!(s, "  [{}] ", frame.dlc());
    for b in frame.data() {
        let _ = write!(s, " {:02X}", b);
    }
    s
}
