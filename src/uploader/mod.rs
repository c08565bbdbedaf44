//! Uploader session: the master-side driver of the four-phase
//! protocol. Host-only (opens a real file), so this module is compiled for
//! the `x86_64`/`linux` target only, mirroring `crc::stream_file`'s cfg gate.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::thread::sleep;
use std::time::Duration;

use crate::config::Config;
use crate::constant::{IDX_CONTROL, IDX_DATA, IDX_METADATA, IDX_STATUS};
use crate::crc;
use crate::error::TransferError;
use crate::transport::{run_download, Transport};
use crate::wire::{ControlPayload, FinalizePayload, ImagePlan, MetadataRecord, CMD_START};

/// Drives one end-to-end firmware transfer over `transport` through the
/// eight-step sequence below, aborting on the first failure. On success the installer has
/// validated and committed the image; on failure no partial result is
/// observable to the caller beyond the error returned.
pub fn run_upload_session(plan: &ImagePlan, transport: &mut impl Transport, config: &Config) -> Result<(), TransferError> {
    if plan.max_chunk_bytes == 0 {
        return Err(TransferError::configuration("max_chunk_bytes must be > 0"));
    }
    if !(1..=127).contains(&plan.target_node_id) {
        return Err(TransferError::configuration(format!(
            "target_node_id {} out of range 1..=127",
            plan.target_node_id
        )));
    }

    // 1. Open payload, determine size, rewind.
    let mut file = File::open(&plan.firmware_path)
        .map_err(|e| TransferError::resource(format!("cannot open {}: {}", plan.firmware_path, e)))?;
    let size = file
        .metadata()
        .map_err(|e| TransferError::resource(format!("cannot stat {}: {}", plan.firmware_path, e)))?
        .len();
    if size == 0 {
        return Err(TransferError::resource("firmware file is empty"));
    }
    if size > u32::MAX as u64 {
        return Err(TransferError::resource("firmware file too large"));
    }
    let image_bytes = size as u32;

    // 2. Allocate chunk scratch.
    let mut scratch = vec![0u8; plan.max_chunk_bytes];

    // 3. Resolve CRC.
    let crc = if plan.expected_crc == 0 {
        crate::debug!("computing CRC for {}", plan.firmware_path);
        crc::stream_file(&mut file, &mut scratch)
            .map_err(|e| TransferError::resource(format!("CRC pass failed: {}", e)))?
    } else {
        plan.expected_crc
    };

    // 4. Select target. Idempotent; repeated before each write below.
    transport.setup(plan.target_node_id)?;

    let sleep_us = |us: u32| sleep(Duration::from_micros(us as u64));

    // 5. Write metadata.
    transport.setup(plan.target_node_id)?;
    let meta = MetadataRecord { image_bytes, crc, image_type: plan.image_type as u8, bank: plan.target_bank };
    run_download(transport, IDX_METADATA, 1, &meta.encode(), sleep_us, config.sdo_poll_us)?;

    // 6. Write control.
    transport.setup(plan.target_node_id)?;
    let ctrl = ControlPayload { command: CMD_START, image_type: plan.image_type as u8, bank: plan.target_bank };
    run_download(transport, IDX_CONTROL, 1, &ctrl.encode(), sleep_us, config.sdo_poll_us)?;

    // 7. Stream data.
    file.seek(SeekFrom::Start(0)).map_err(|e| TransferError::resource(format!("rewind failed: {}", e)))?;
    let mut sent = 0u32;
    loop {
        let n = file
            .read(&mut scratch)
            .map_err(|e| TransferError::resource(format!("read failed at offset {}: {}", sent, e)))?;
        if n == 0 {
            break;
        }
        transport.setup(plan.target_node_id)?;
        run_download(transport, IDX_DATA, 1, &scratch[..n], sleep_us, config.sdo_poll_us)?;
        sent += n as u32;
    }
    if sent != image_bytes {
        return Err(TransferError::resource(format!("short read: sent {} of {} bytes", sent, image_bytes)));
    }

    // 8. Write finalize.
    transport.setup(plan.target_node_id)?;
    let fin = FinalizePayload { crc };
    run_download(transport, IDX_STATUS, 1, &fin.encode(), sleep_us, config.sdo_poll_us)?;

    crate::info!("upload of {} ({} bytes, crc=0x{:04X}) completed", plan.firmware_path, image_bytes, crc);
    Ok(())
}
