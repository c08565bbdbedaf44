//! SDO-object write adapter: routes incoming writes to the four
//! program-update indices, accumulates fixed-size records the way
//! `OD_writeOriginal` does, and calls into the state machine (`super`) once a
//! record or chunk is complete.
//!
//! Grounded on this codebase's equivalent OD extension callbacks
//! (`fw_write_metadata`/`fw_write_control`/`fw_write_data`/`fw_write_status`),
//! which this module's four `write_*` methods mirror one-for-one, down to the
//! subindex-0/wrong-subindex/zero-length checks.

use hashbrown::HashMap;

use super::{finalize, prepare_storage, receive_chunk, store_metadata, InstallerContext};
use crate::constant::{IDX_CONTROL, IDX_DATA, IDX_METADATA, IDX_STATUS, SUB_DATA};
use crate::error::{AbortCode, TransferError};
use crate::ota::{OtaBackend, RebootScheduler};
use crate::prelude::*;
use crate::wire::{ControlPayload, FinalizePayload, MetadataRecord, CMD_START};

/// Tracks per-object write progress the way `OD_stream_t` does: which
/// subindex is targeted and how far into a multi-segment write we are.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct OdStream {
    pub subindex: u8,
    pub data_offset: u32,
    /// Announced total length for this write, if known; 0 means unknown
    /// (mirrors CANopenNode's `OD_stream_t.dataLength == 0` convention).
    pub data_length: u32,
}

impl OdStream {
    pub fn reset(&mut self) {
        self.data_offset = 0;
        self.data_length = 0;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WriteOutcome {
    /// More segments expected; mirrors `ODR_PARTIAL`.
    Partial,
    /// Object index this SDO traffic resolves to.
    Ok,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ObjectKind {
    Metadata,
    Control,
    Data,
    Status,
}

fn registry() -> HashMap<u16, ObjectKind> {
    let mut map = HashMap::new();
    map.insert(IDX_METADATA, ObjectKind::Metadata);
    map.insert(IDX_CONTROL, ObjectKind::Control);
    map.insert(IDX_DATA, ObjectKind::Data);
    map.insert(IDX_STATUS, ObjectKind::Status);
    map
}

/// Accumulates `data` into a fixed-size record buffer at `stream.data_offset`,
/// mirroring `OD_writeOriginal`'s plain byte-copy-then-advance behavior.
fn write_fixed(buf: &mut [u8], stream: &mut OdStream, data: &[u8]) -> Result<WriteOutcome, TransferError> {
    let start = stream.data_offset as usize;
    let end = start + data.len();
    if end > buf.len() {
        return Err(TransferError::protocol(format!(
            "write of {} bytes at offset {} overruns {}-byte record",
            data.len(), start, buf.len()
        )));
    }
    buf[start..end].copy_from_slice(data);
    stream.data_offset = end as u32;
    if end == buf.len() {
        Ok(WriteOutcome::Ok)
    } else {
        Ok(WriteOutcome::Partial)
    }
}

/// Owns the installer context plus the per-index stream/buffer state an SDO
/// server would otherwise keep in `OD_stream_t` and the object dictionary
/// itself. One instance serves all four program-update indices for a single
/// target node.
pub struct SdoAdapter<O: OtaBackend, R: RebootScheduler> {
    pub ctx: InstallerContext,
    ota: O,
    reboot: R,
    max_image_bytes: u32,
    max_chunk_bytes: u32,
    registry: HashMap<u16, ObjectKind>,
    metadata_stream: OdStream,
    control_stream: OdStream,
    data_stream: OdStream,
    status_stream: OdStream,
    metadata_buf: [u8; MetadataRecord::WIRE_LEN],
    control_buf: [u8; ControlPayload::WIRE_LEN],
    status_buf: [u8; FinalizePayload::WIRE_LEN],
}

impl<O: OtaBackend, R: RebootScheduler> SdoAdapter<O, R> {
    pub fn new(ota: O, reboot: R, max_image_bytes: u32, max_chunk_bytes: u32) -> Self {
        SdoAdapter {
            ctx: InstallerContext::fresh(),
            ota,
            reboot,
            max_image_bytes,
            max_chunk_bytes,
            registry: registry(),
            metadata_stream: OdStream::default(),
            control_stream: OdStream::default(),
            data_stream: OdStream::default(),
            status_stream: OdStream::default(),
            metadata_buf: [0u8; MetadataRecord::WIRE_LEN],
            control_buf: [0u8; ControlPayload::WIRE_LEN],
            status_buf: [0u8; FinalizePayload::WIRE_LEN],
        }
    }

    /// Exposes the OTA backend for tests driving the state machine directly
    /// (bypassing this adapter's own offset bookkeeping).
    pub fn ota_mut(&mut self) -> &mut O {
        &mut self.ota
    }

    /// Dispatch point a real SDO server would call from its OD extension
    /// write callback: resolves `index` to one of the four objects and routes
    /// to the matching handler. `data_offset`/`data_length` come from the
    /// caller's segment framing (out of scope here; the in-memory transport
    /// always supplies a single segment covering the whole write).
    pub fn write(
        &mut self,
        index: u16,
        subindex: u8,
        data_offset: u32,
        data_length: u32,
        data: &[u8],
    ) -> Result<WriteOutcome, TransferError> {
        let kind = self
            .registry
            .get(&index)
            .copied()
            .ok_or_else(|| TransferError::protocol(format!("no program-update object at index 0x{:04X}", index)))?;

        match kind {
            ObjectKind::Metadata => {
                self.metadata_stream.subindex = subindex;
                self.metadata_stream.data_offset = data_offset;
                self.metadata_stream.data_length = data_length;
                self.write_metadata(data)
            }
            ObjectKind::Control => {
                self.control_stream.subindex = subindex;
                self.control_stream.data_offset = data_offset;
                self.control_stream.data_length = data_length;
                self.write_control(data)
            }
            ObjectKind::Data => {
                self.data_stream.subindex = subindex;
                self.data_stream.data_offset = data_offset;
                self.data_stream.data_length = data_length;
                self.write_data(data)
            }
            ObjectKind::Status => {
                self.status_stream.subindex = subindex;
                self.status_stream.data_offset = data_offset;
                self.status_stream.data_length = data_length;
                self.write_status(data)
            }
        }
    }

    fn write_metadata(&mut self, data: &[u8]) -> Result<WriteOutcome, TransferError> {
        if self.metadata_stream.subindex == 0 {
            return Err(TransferError::protocol_with_code(
                "metadata: subindex 0 is read-only",
                AbortCode::UnsupportedAccessToObject,
            ));
        }
        if self.metadata_stream.subindex != SUB_DATA {
            return Err(TransferError::protocol_with_code(
                "metadata: subindex does not exist",
                AbortCode::SubIndexDoesNotExist,
            ));
        }
        if data.is_empty() {
            return Err(TransferError::protocol("metadata: no data"));
        }
        let outcome = write_fixed(&mut self.metadata_buf, &mut self.metadata_stream, data)?;
        if outcome == WriteOutcome::Partial {
            return Ok(outcome);
        }
        let record = MetadataRecord::decode(&self.metadata_buf)?;
        store_metadata(&mut self.ctx, record, self.max_image_bytes)?;
        self.metadata_stream.reset();
        Ok(WriteOutcome::Ok)
    }

    fn write_control(&mut self, data: &[u8]) -> Result<WriteOutcome, TransferError> {
        if self.control_stream.subindex == 0 {
            return Err(TransferError::protocol_with_code(
                "control: subindex 0 is read-only",
                AbortCode::UnsupportedAccessToObject,
            ));
        }
        if self.control_stream.subindex != SUB_DATA {
            return Err(TransferError::protocol_with_code(
                "control: subindex does not exist",
                AbortCode::SubIndexDoesNotExist,
            ));
        }
        if self.control_stream.data_offset != 0 || data.len() != ControlPayload::WIRE_LEN {
            return Err(TransferError::protocol("control: must be written as one 3-byte segment"));
        }
        self.control_buf.copy_from_slice(data);
        let payload = ControlPayload::decode(&self.control_buf)?;
        if payload.command != CMD_START {
            return Err(TransferError::protocol(format!("unsupported control command 0x{:02X}", payload.command)));
        }
        if !self.ctx.metadata_received {
            return Err(TransferError::protocol("start command received before metadata"));
        }
        prepare_storage(&mut self.ctx, &mut self.ota)?;
        self.control_stream.reset();
        Ok(WriteOutcome::Ok)
    }

    fn write_data(&mut self, data: &[u8]) -> Result<WriteOutcome, TransferError> {
        if self.data_stream.subindex == 0 {
            return Err(TransferError::protocol_with_code(
                "data: subindex 0 is read-only",
                AbortCode::UnsupportedAccessToObject,
            ));
        }
        if self.data_stream.subindex != SUB_DATA {
            return Err(TransferError::protocol_with_code(
                "data: subindex does not exist",
                AbortCode::SubIndexDoesNotExist,
            ));
        }
        if data.is_empty() {
            return Err(TransferError::protocol("data: no data"));
        }
        if data.len() as u32 > self.max_chunk_bytes {
            return Err(TransferError::protocol(format!(
                "chunk too large ({} > {})",
                data.len(), self.max_chunk_bytes
            )));
        }
        if self.data_stream.data_offset == 0 {
            self.ctx.current_chunk_base = self.ctx.received_bytes;
            self.ctx.chunk_in_progress = true;
        }
        let absolute_offset = self.ctx.current_chunk_base + self.data_stream.data_offset;
        receive_chunk(&mut self.ctx, &mut self.ota, data, absolute_offset, self.max_chunk_bytes)?;

        let next_offset = self.data_stream.data_offset + data.len() as u32;
        self.data_stream.data_offset = next_offset;
        let final_chunk = self.data_stream.data_length != 0 && next_offset >= self.data_stream.data_length;
        if final_chunk {
            self.ctx.chunk_in_progress = false;
            self.ctx.current_chunk_base = self.ctx.received_bytes;
            self.data_stream.reset();
            Ok(WriteOutcome::Ok)
        } else {
            Ok(WriteOutcome::Partial)
        }
    }

    fn write_status(&mut self, data: &[u8]) -> Result<WriteOutcome, TransferError> {
        if self.status_stream.subindex == 0 {
            return Err(TransferError::protocol_with_code(
                "status: subindex 0 is read-only",
                AbortCode::UnsupportedAccessToObject,
            ));
        }
        if self.status_stream.subindex != SUB_DATA {
            return Err(TransferError::protocol_with_code(
                "status: subindex does not exist",
                AbortCode::SubIndexDoesNotExist,
            ));
        }
        if self.status_stream.data_offset != 0 || data.len() != FinalizePayload::WIRE_LEN {
            return Err(TransferError::protocol("status: must be written as one 2-byte segment"));
        }
        self.status_buf.copy_from_slice(data);
        let payload = FinalizePayload::decode(&self.status_buf)?;
        finalize(&mut self.ctx, &mut self.ota, &mut self.reboot, payload.crc)?;
        self.status_stream.reset();
        Ok(WriteOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc;
    use crate::ota::{InMemoryOta, InMemoryRebootScheduler};

    fn new_adapter() -> SdoAdapter<InMemoryOta, InMemoryRebootScheduler> {
        SdoAdapter::new(InMemoryOta::new(4096), InMemoryRebootScheduler::default(), 4096, 64)
    }

    #[test]
    fn full_session_through_the_object_registry() {
        let mut adapter = new_adapter();
        let bytes: Vec<u8> = (0..256u32).map(|i| (i & 0xFF) as u8).collect();
        let crc = crc::hash(&bytes);

        let meta = MetadataRecord { image_bytes: 256, crc, image_type: 0, bank: 1 };
        assert_eq!(
            adapter.write(IDX_METADATA, 1, 0, 8, &meta.encode()).unwrap(),
            WriteOutcome::Ok
        );

        let ctrl = ControlPayload { command: CMD_START, image_type: 0, bank: 1 };
        assert_eq!(
            adapter.write(IDX_CONTROL, 1, 0, 3, &ctrl.encode()).unwrap(),
            WriteOutcome::Ok
        );

        for (i, chunk) in bytes.chunks(64).enumerate() {
            let outcome = adapter.write(IDX_DATA, 1, 0, chunk.len() as u32, chunk).unwrap();
            assert_eq!(outcome, WriteOutcome::Ok, "chunk {} should complete in one segment", i);
        }

        let fin = FinalizePayload { crc };
        assert_eq!(
            adapter.write(IDX_STATUS, 1, 0, 2, &fin.encode()).unwrap(),
            WriteOutcome::Ok
        );
        assert!(adapter.ctx.crc_matched);
    }

    #[test]
    fn metadata_partial_write_across_two_segments() {
        let mut adapter = new_adapter();
        let meta = MetadataRecord { image_bytes: 64, crc: 0x1234, image_type: 0, bank: 0 };
        let encoded = meta.encode();
        assert_eq!(adapter.write(IDX_METADATA, 1, 0, 8, &encoded[0..4]).unwrap(), WriteOutcome::Partial);
        assert_eq!(adapter.write(IDX_METADATA, 1, 4, 8, &encoded[4..8]).unwrap(), WriteOutcome::Ok);
        assert!(adapter.ctx.metadata_received);
    }

    #[test]
    fn control_before_metadata_is_rejected() {
        let mut adapter = new_adapter();
        let ctrl = ControlPayload { command: CMD_START, image_type: 0, bank: 0 };
        assert!(adapter.write(IDX_CONTROL, 1, 0, 3, &ctrl.encode()).is_err());
    }

    #[test]
    fn data_chunk_larger_than_cap_is_rejected() {
        let mut adapter = new_adapter();
        let meta = MetadataRecord { image_bytes: 256, crc: 1, image_type: 0, bank: 0 };
        adapter.write(IDX_METADATA, 1, 0, 8, &meta.encode()).unwrap();
        let ctrl = ControlPayload { command: CMD_START, image_type: 0, bank: 0 };
        adapter.write(IDX_CONTROL, 1, 0, 3, &ctrl.encode()).unwrap();
        let oversize = [0u8; 65];
        assert!(adapter.write(IDX_DATA, 1, 0, 65, &oversize).is_err());
    }

    #[test]
    fn unknown_index_is_rejected() {
        let mut adapter = new_adapter();
        assert!(adapter.write(0x2000, 1, 0, 1, &[0u8]).is_err());
    }

    #[test]
    fn subindex_zero_and_other_invalid_subindices_carry_distinct_abort_codes() {
        let mut adapter = new_adapter();
        let meta = MetadataRecord { image_bytes: 256, crc: 1, image_type: 0, bank: 0 };

        let sub0_err = adapter.write(IDX_METADATA, 0, 0, 8, &meta.encode()).unwrap_err();
        assert_eq!(sub0_err.abort_code(), crate::error::AbortCode::UnsupportedAccessToObject);

        let sub5_err = adapter.write(IDX_METADATA, 5, 0, 8, &meta.encode()).unwrap_err();
        assert_eq!(sub5_err.abort_code(), crate::error::AbortCode::SubIndexDoesNotExist);
    }
}
