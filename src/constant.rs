//! CiA 302 inspired object-dictionary indices and COB-ID bases for this
//! transfer protocol. Kept separate from wire encoding (`wire.rs`) the same
//! way this codebase keeps its CANopen register constants apart from the
//! frames that carry them.

/// Program data (chunks), subindex 1, streamed.
pub const IDX_DATA: u16 = 0x1F50;
/// Program control `{cmd, type, bank}`, subindex 1, 3 bytes fixed.
pub const IDX_CONTROL: u16 = 0x1F51;
/// Program identification/metadata, subindex 1, 8 bytes fixed.
pub const IDX_METADATA: u16 = 0x1F57;
/// Program status / finalize CRC, subindex 1, 2 bytes fixed.
pub const IDX_STATUS: u16 = 0x1F5A;

/// The only writable subindex on all four program-update objects.
pub const SUB_DATA: u8 = 1;

/// `COB-ID client→server = 0x600 + node_id`.
pub const COB_BASE_RX: u16 = 0x600;
/// `COB-ID server→client = 0x580 + node_id`.
pub const COB_BASE_TX: u16 = 0x580;

pub fn cob_id_rx(node_id: u8) -> u16 {
    COB_BASE_RX + node_id as u16
}

pub fn cob_id_tx(node_id: u8) -> u16 {
    COB_BASE_TX + node_id as u16
}
