//! Installer state machine: validates metadata, prepares a flash
//! bank, accepts chunks in strict offset order, verifies CRC+size, commits
//! the boot partition, schedules reboot. These functions see clean
//! `(offset, bytes)` events; all SDO segment framing lives in `adapter`.
//!
//! Grounded on this codebase's equivalent ESP-IDF/CANopenNode demo server
//! (`fw_reset_context`/`fw_store_metadata`/`fw_prepare_storage`/
//! `fw_receive_chunk`/`fw_finalize`), generalized from a process-wide
//! singleton into an explicit context.

pub mod adapter;

use crate::crc;
use crate::error::TransferError;
use crate::ota::{OtaBackend, PartitionHandle, RebootScheduler};
use crate::prelude::*;
use crate::wire::MetadataRecord;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
    Idle,
    MetadataReady,
    Erasing,
    Receiving,
    Verifying,
    ReadyToBoot,
}

/// Server-side, process-wide-in-spirit context, re-architected as an
/// explicit value owned by the adapter wiring.
#[derive(Debug, Clone)]
pub struct InstallerContext {
    pub stage: Stage,
    pub expected_size: u32,
    pub received_bytes: u32,
    pub current_chunk_base: u32,
    pub expected_crc: u16,
    pub running_crc: u16,
    pub current_bank: u8,
    pub image_type: u8,
    pub metadata_received: bool,
    pub flash_prepared: bool,
    pub crc_matched: bool,
    pub chunk_in_progress: bool,
    pub target_partition: Option<PartitionHandle>,
    pub ota_handle: Option<crate::ota::OtaHandle>,
    pub ota_open: bool,
}

impl InstallerContext {
    /// The cold-boot / explicit-test-hook constructor. There is no
    /// wire-level reset command.
    pub fn fresh() -> Self {
        InstallerContext {
            stage: Stage::Idle,
            expected_size: 0,
            received_bytes: 0,
            current_chunk_base: 0,
            expected_crc: 0,
            running_crc: crc::SEED,
            current_bank: 0,
            image_type: 0,
            metadata_received: false,
            flash_prepared: false,
            crc_matched: false,
            chunk_in_progress: false,
            target_partition: None,
            ota_handle: None,
            ota_open: false,
        }
    }
}

impl Default for InstallerContext {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Accepts or rejects a freshly-parsed metadata record. Resets the context
/// for a fresh attempt when re-sent from `IDLE` or `METADATA_READY`;
/// rejects from any other stage without touching existing state.
pub fn store_metadata(ctx: &mut InstallerContext, meta: MetadataRecord, max_image_bytes: u32) -> Result<(), TransferError> {
    if !matches!(ctx.stage, Stage::Idle | Stage::MetadataReady) {
        return Err(TransferError::protocol(format!(
            "metadata rejected: not in IDLE or METADATA_READY (stage={:?})",
            ctx.stage
        )));
    }
    if meta.image_bytes == 0 {
        return Err(TransferError::protocol("metadata rejected: size is zero"));
    }
    if meta.image_bytes > max_image_bytes {
        return Err(TransferError::protocol(format!(
            "metadata rejected: size {} exceeds limit {}",
            meta.image_bytes, max_image_bytes
        )));
    }
    if meta.crc == 0 {
        return Err(TransferError::protocol("metadata rejected: CRC cannot be zero"));
    }

    ctx.expected_size = meta.image_bytes;
    ctx.expected_crc = meta.crc;
    ctx.image_type = meta.image_type;
    ctx.current_bank = meta.bank;
    ctx.received_bytes = 0;
    ctx.current_chunk_base = 0;
    ctx.chunk_in_progress = false;
    ctx.target_partition = None;
    ctx.ota_handle = None;
    ctx.ota_open = false;
    ctx.running_crc = crc::SEED;
    ctx.stage = Stage::MetadataReady;
    ctx.metadata_received = true;
    ctx.flash_prepared = false;
    ctx.crc_matched = false;

    crate::info!(
        "metadata accepted: size={} crc=0x{:04X} bank={} type={}",
        ctx.expected_size, ctx.expected_crc, ctx.current_bank, ctx.image_type
    );
    Ok(())
}

/// `METADATA_READY → ERASING → RECEIVING`, both in one call; `ERASING` is
/// observable only transiently for diagnostics.
pub fn prepare_storage(ctx: &mut InstallerContext, ota: &mut impl OtaBackend) -> Result<(), TransferError> {
    if !ctx.metadata_received || ctx.stage != Stage::MetadataReady {
        return Err(TransferError::protocol("cannot prepare storage before valid metadata"));
    }

    let partition = ota.next_update_partition(ctx.image_type, ctx.current_bank)?;
    if ctx.expected_size > partition.size {
        return Err(TransferError::resource(format!(
            "image size {} exceeds partition size {}",
            ctx.expected_size, partition.size
        )));
    }

    ctx.stage = Stage::Erasing;
    let handle = ota.begin(partition, ctx.expected_size)?;

    ctx.target_partition = Some(partition);
    ctx.ota_handle = Some(handle);
    ctx.ota_open = true;
    ctx.flash_prepared = true;
    ctx.stage = Stage::Receiving;
    crate::info!("prepared partition bank={} ({} bytes)", partition.id, partition.size);
    Ok(())
}

/// `offset` is the absolute offset within the image, already resolved by
/// the adapter from `current_chunk_base + dataOffset`.
pub fn receive_chunk(
    ctx: &mut InstallerContext,
    ota: &mut impl OtaBackend,
    data: &[u8],
    offset: u32,
    max_chunk_bytes: u32,
) -> Result<(), TransferError> {
    if !ctx.flash_prepared || ctx.stage != Stage::Receiving {
        return Err(TransferError::protocol(format!(
            "chunk rejected: flash not prepared or wrong stage ({:?})",
            ctx.stage
        )));
    }
    let (Some(partition_handle), true) = (ctx.ota_handle, ctx.ota_open) else {
        return Err(TransferError::protocol("chunk rejected: OTA partition not ready"));
    };
    if data.is_empty() {
        return Err(TransferError::protocol("chunk rejected: no data"));
    }
    if data.len() as u32 > max_chunk_bytes {
        return Err(TransferError::protocol(format!(
            "chunk rejected: {} bytes exceeds cap {}",
            data.len(), max_chunk_bytes
        )));
    }
    if offset != ctx.received_bytes {
        return Err(TransferError::protocol(format!(
            "chunk rejected: expected offset {} got {}",
            ctx.received_bytes, offset
        )));
    }
    if ctx.received_bytes + data.len() as u32 > ctx.expected_size {
        return Err(TransferError::protocol(format!(
            "chunk rejected: would overflow image size {}",
            ctx.expected_size
        )));
    }

    ota.write(partition_handle, offset, data)?;
    ctx.received_bytes += data.len() as u32;
    ctx.running_crc = crc::update(ctx.running_crc, data);
    crate::debug!(
        "chunk @{} accepted ({} bytes, total {}/{})",
        offset, data.len(), ctx.received_bytes, ctx.expected_size
    );
    Ok(())
}

/// Verifies size + CRC, commits the boot partition, schedules reboot.
/// Only an `IntegrityFailure` leaves the OTA session closed without marking
/// the partition bootable; other failures best-effort close it but
/// never clear the diagnostic counters.
pub fn finalize(
    ctx: &mut InstallerContext,
    ota: &mut impl OtaBackend,
    reboot: &mut impl RebootScheduler,
    payload_crc: u16,
) -> Result<(), TransferError> {
    if ctx.stage != Stage::Receiving {
        return Err(TransferError::protocol(format!("finalize refused: wrong stage {:?}", ctx.stage)));
    }
    let (Some(handle), Some(partition), true) = (ctx.ota_handle, ctx.target_partition, ctx.ota_open) else {
        return Err(TransferError::protocol("finalize refused: OTA session not active"));
    };
    if ctx.received_bytes != ctx.expected_size {
        return Err(TransferError::protocol(format!(
            "finalize refused: received {} bytes but expected {}",
            ctx.received_bytes, ctx.expected_size
        )));
    }

    ctx.stage = Stage::Verifying;
    if ctx.running_crc != payload_crc || ctx.running_crc != ctx.expected_crc {
        crate::error!(
            "CRC mismatch: computed 0x{:04X} payload 0x{:04X} expected 0x{:04X}",
            ctx.running_crc, payload_crc, ctx.expected_crc
        );
        // Best-effort close; never clear the diagnostic counters.
        if ota.end(handle).is_ok() {
            ctx.ota_open = false;
        }
        return Err(TransferError::integrity("CRC/size mismatch at finalize"));
    }

    ota.end(handle)?;
    ctx.ota_open = false;
    ota.set_boot_partition(partition)?;

    ctx.crc_matched = true;
    ctx.stage = Stage::ReadyToBoot;
    crate::info!("firmware validated (crc=0x{:04X}); next boot uses bank {}", ctx.running_crc, partition.id);
    reboot.schedule_reboot();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ota::{InMemoryOta, InMemoryRebootScheduler};

    fn meta(image_bytes: u32, crc: u16) -> MetadataRecord {
        MetadataRecord { image_bytes, crc, image_type: 0, bank: 1 }
    }

    #[test]
    fn metadata_rejects_zero_size() {
        let mut ctx = InstallerContext::fresh();
        assert!(store_metadata(&mut ctx, meta(0, 1), 1024).is_err());
        assert_eq!(ctx.stage, Stage::Idle);
    }

    #[test]
    fn metadata_rejects_oversize() {
        let mut ctx = InstallerContext::fresh();
        assert!(store_metadata(&mut ctx, meta(2000, 1), 1024).is_err());
        assert_eq!(ctx.stage, Stage::Idle);
    }

    #[test]
    fn metadata_rejects_zero_crc() {
        let mut ctx = InstallerContext::fresh();
        assert!(store_metadata(&mut ctx, meta(10, 0), 1024).is_err());
    }

    #[test]
    fn metadata_accepted_from_idle_and_metadata_ready() {
        let mut ctx = InstallerContext::fresh();
        store_metadata(&mut ctx, meta(512, 0x9C21), 1024).unwrap();
        assert_eq!(ctx.stage, Stage::MetadataReady);
        // Re-sending from METADATA_READY resets for a fresh attempt.
        store_metadata(&mut ctx, meta(256, 0x1234), 1024).unwrap();
        assert_eq!(ctx.expected_size, 256);
    }

    #[test]
    fn metadata_rejected_outside_idle_or_metadata_ready() {
        let mut ctx = InstallerContext::fresh();
        store_metadata(&mut ctx, meta(512, 0x9C21), 1024).unwrap();
        let mut ota = InMemoryOta::new(1024);
        prepare_storage(&mut ctx, &mut ota).unwrap();
        assert_eq!(ctx.stage, Stage::Receiving);
        assert!(store_metadata(&mut ctx, meta(64, 1), 1024).is_err());
        // Existing state must be left intact.
        assert_eq!(ctx.expected_size, 512);
    }

    #[test]
    fn chunk_rejects_out_of_order_offset() {
        let mut ctx = InstallerContext::fresh();
        store_metadata(&mut ctx, meta(512, 0x9C21), 1024).unwrap();
        let mut ota = InMemoryOta::new(1024);
        prepare_storage(&mut ctx, &mut ota).unwrap();
        let data = [0u8; 64];
        assert!(receive_chunk(&mut ctx, &mut ota, &data, 64, 64).is_err());
        assert_eq!(ctx.received_bytes, 0);
    }

    #[test]
    fn happy_path_512_bytes_in_64_byte_chunks() {
        let mut ctx = InstallerContext::fresh();
        let bytes: Vec<u8> = (0..512u32).map(|i| (i & 0xFF) as u8).collect();
        let want_crc = crc::hash(&bytes);
        assert_eq!(want_crc, 0x9C21, "fixture CRC must match the documented scenario-1 vector");

        store_metadata(&mut ctx, meta(512, want_crc), 1024).unwrap();
        let mut ota = InMemoryOta::new(1024);
        prepare_storage(&mut ctx, &mut ota).unwrap();

        for (i, chunk) in bytes.chunks(64).enumerate() {
            receive_chunk(&mut ctx, &mut ota, chunk, (i * 64) as u32, 64).unwrap();
        }
        assert_eq!(ctx.received_bytes, 512);

        let mut reboot = InMemoryRebootScheduler::default();
        finalize(&mut ctx, &mut ota, &mut reboot, want_crc).unwrap();
        assert_eq!(ctx.stage, Stage::ReadyToBoot);
        assert!(ctx.crc_matched);
        assert_eq!(reboot.calls, 1);
    }

    #[test]
    fn crc_mismatch_at_finalize_is_integrity_failure_with_no_reboot() {
        let mut ctx = InstallerContext::fresh();
        let mut bytes: Vec<u8> = (0..512u32).map(|i| (i & 0xFF) as u8).collect();
        let good_crc = crc::hash(&bytes);
        *bytes.last_mut().unwrap() ^= 0xFF;

        store_metadata(&mut ctx, meta(512, good_crc), 1024).unwrap();
        let mut ota = InMemoryOta::new(1024);
        prepare_storage(&mut ctx, &mut ota).unwrap();
        for (i, chunk) in bytes.chunks(64).enumerate() {
            receive_chunk(&mut ctx, &mut ota, chunk, (i * 64) as u32, 64).unwrap();
        }

        let mut reboot = InMemoryRebootScheduler::default();
        let err = finalize(&mut ctx, &mut ota, &mut reboot, good_crc).unwrap_err();
        assert!(matches!(err, TransferError::IntegrityFailure { .. }));
        assert_eq!(reboot.calls, 0);
    }
}
