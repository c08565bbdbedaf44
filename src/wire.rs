//! On-wire payload shapes for the four program-update objects. These
//! are plain byte-packed records, not bitfields, so they are encoded and
//! decoded by hand rather than with `bitfield-struct` (reserved elsewhere in
//! this codebase for SDO command bytes, which this protocol does not touch).

use crate::error::TransferError;
use crate::prelude::*;

/// Uploader session input.
#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub firmware_path: String,
    pub image_type: ImageType,
    pub target_bank: u8,
    pub target_node_id: u8,
    pub max_chunk_bytes: usize,
    /// 0 means "compute from file".
    pub expected_crc: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImageType {
    Main = 0,
    Bootloader = 1,
    Config = 2,
}

impl ImageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(ImageType::Main),
            1 => Some(ImageType::Bootloader),
            2 => Some(ImageType::Config),
            _ => None,
        }
    }
}

/// The only defined control command.
pub const CMD_START: u8 = 0x01;

/// 8 bytes, little-endian, packed: `u32 image_bytes | u16 crc | u8 image_type | u8 bank`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MetadataRecord {
    pub image_bytes: u32,
    pub crc: u16,
    pub image_type: u8,
    pub bank: u8,
}

impl MetadataRecord {
    pub const WIRE_LEN: usize = 8;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..4].copy_from_slice(&self.image_bytes.to_le_bytes());
        out[4..6].copy_from_slice(&self.crc.to_le_bytes());
        out[6] = self.image_type;
        out[7] = self.bank;
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransferError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(TransferError::protocol(format!(
                "metadata record must be {} bytes, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        Ok(MetadataRecord {
            image_bytes: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            crc: u16::from_le_bytes([bytes[4], bytes[5]]),
            image_type: bytes[6],
            bank: bytes[7],
        })
    }
}

/// 3 bytes: `{command, image_type, bank}`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ControlPayload {
    pub command: u8,
    pub image_type: u8,
    pub bank: u8,
}

impl ControlPayload {
    pub const WIRE_LEN: usize = 3;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        [self.command, self.image_type, self.bank]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransferError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(TransferError::protocol(format!(
                "control payload must be {} bytes, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        Ok(ControlPayload { command: bytes[0], image_type: bytes[1], bank: bytes[2] })
    }
}

/// 2 bytes, little-endian: the finalize CRC.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FinalizePayload {
    pub crc: u16,
}

impl FinalizePayload {
    pub const WIRE_LEN: usize = 2;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        self.crc.to_le_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransferError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(TransferError::protocol(format!(
                "finalize payload must be {} bytes, got {}",
                Self::WIRE_LEN,
                bytes.len()
            )));
        }
        Ok(FinalizePayload { crc: u16::from_le_bytes([bytes[0], bytes[1]]) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trips() {
        let m = MetadataRecord { image_bytes: 512, crc: 0x9C21, image_type: 0, bank: 1 };
        let encoded = m.encode();
        assert_eq!(encoded.len(), MetadataRecord::WIRE_LEN);
        assert_eq!(MetadataRecord::decode(&encoded).unwrap(), m);
    }

    #[test]
    fn metadata_is_little_endian() {
        let m = MetadataRecord { image_bytes: 0x0001_0203, crc: 0x0504, image_type: 6, bank: 7 };
        let encoded = m.encode();
        assert_eq!(encoded, [0x03, 0x02, 0x01, 0x00, 0x04, 0x05, 6, 7]);
    }

    #[test]
    fn control_round_trips() {
        let c = ControlPayload { command: CMD_START, image_type: 0, bank: 1 };
        assert_eq!(ControlPayload::decode(&c.encode()).unwrap(), c);
    }

    #[test]
    fn finalize_round_trips() {
        let f = FinalizePayload { crc: 0x9C21 };
        assert_eq!(f.encode(), [0x21, 0x9C]);
        assert_eq!(FinalizePayload::decode(&f.encode()).unwrap(), f);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(MetadataRecord::decode(&[0u8; 7]).is_err());
        assert!(ControlPayload::decode(&[0u8; 2]).is_err());
        assert!(FinalizePayload::decode(&[0u8; 1]).is_err());
    }
}
