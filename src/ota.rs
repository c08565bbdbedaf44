//! Host-platform OTA partition and reboot-scheduling abstractions. The real driver (flash erase,
//! partition table, reboot vector) is out of scope; these traits only
//! capture the shape of the calls the installer state machine needs, mirrored
//! on the ESP-IDF OTA API (`esp_ota_get_next_update_partition`,
//! `esp_ota_begin`/`write`/`end`, `esp_ota_set_boot_partition`) this crate is
//! adapted from. Only in-memory test doubles are provided.

use crate::error::TransferError;
use crate::prelude::*;

/// An opaque writable region of non-volatile storage distinct from the
/// currently-booted one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PartitionHandle {
    pub id: u8,
    pub size: u32,
}

/// An opaque in-progress OTA write session on a `PartitionHandle`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OtaHandle(pub u32);

/// Factory for the next writable bank. Mirrors `esp_ota_get_next_update_partition`.
pub trait OtaPlatform {
    fn next_update_partition(&mut self, image_type: u8, bank: u8) -> Result<PartitionHandle, TransferError>;
}

/// Per-write lifecycle on a partition. Mirrors `esp_ota_begin`/`esp_ota_write`/
/// `esp_ota_end`/`esp_ota_set_boot_partition`.
pub trait OtaSession {
    fn begin(&mut self, partition: PartitionHandle, expected_size: u32) -> Result<OtaHandle, TransferError>;
    fn write(&mut self, handle: OtaHandle, offset: u32, bytes: &[u8]) -> Result<(), TransferError>;
    fn end(&mut self, handle: OtaHandle) -> Result<(), TransferError>;
    fn set_boot_partition(&mut self, partition: PartitionHandle) -> Result<(), TransferError>;
}

/// A real implementation is one object (the flash controller) satisfying
/// both narrower traits; split only because partition lookup needs no
/// mutable session state while the write lifecycle does.
pub trait OtaBackend: OtaPlatform + OtaSession {}
impl<T: OtaPlatform + OtaSession> OtaBackend for T {}

/// One-shot reboot timer, ~500 ms after `READY_TO_BOOT` is reached.
pub trait RebootScheduler {
    fn schedule_reboot(&mut self);
}

/// In-memory double used by tests and by the integration harness: holds the
/// written bytes in a `Vec` instead of touching flash.
pub struct InMemoryOta {
    partitions: HashMap<u8, PartitionHandle>,
    next_handle: u32,
    sessions: HashMap<u32, Vec<u8>>,
    pub boot_partition: Option<PartitionHandle>,
}

impl InMemoryOta {
    pub fn new(bank_size: u32) -> Self {
        let mut partitions = HashMap::new();
        for bank in 0..2u8 {
            partitions.insert(bank, PartitionHandle { id: bank, size: bank_size });
        }
        InMemoryOta {
            partitions,
            next_handle: 1,
            sessions: HashMap::new(),
            boot_partition: None,
        }
    }

    /// Returns the bytes written to a still-open or already-ended session,
    /// for test assertions.
    pub fn written_bytes(&self, handle: OtaHandle) -> Option<&[u8]> {
        self.sessions.get(&handle.0).map(|v| v.as_slice())
    }
}

impl OtaPlatform for InMemoryOta {
    fn next_update_partition(&mut self, _image_type: u8, bank: u8) -> Result<PartitionHandle, TransferError> {
        self.partitions
            .get(&bank)
            .copied()
            .ok_or_else(|| TransferError::resource(format!("no partition for bank {}", bank)))
    }
}

impl OtaSession for InMemoryOta {
    fn begin(&mut self, partition: PartitionHandle, expected_size: u32) -> Result<OtaHandle, TransferError> {
        if expected_size > partition.size {
            return Err(TransferError::resource("image larger than partition"));
        }
        let handle = OtaHandle(self.next_handle);
        self.next_handle += 1;
        self.sessions.insert(handle.0, Vec::with_capacity(expected_size as usize));
        Ok(handle)
    }

    fn write(&mut self, handle: OtaHandle, offset: u32, bytes: &[u8]) -> Result<(), TransferError> {
        let buf = self
            .sessions
            .get_mut(&handle.0)
            .ok_or_else(|| TransferError::resource("write on unknown OTA handle"))?;
        let offset = offset as usize;
        if offset != buf.len() {
            return Err(TransferError::resource("non-sequential OTA write"));
        }
        buf.extend_from_slice(bytes);
        Ok(())
    }

    fn end(&mut self, handle: OtaHandle) -> Result<(), TransferError> {
        self.sessions
            .remove(&handle.0)
            .map(|_| ())
            .ok_or_else(|| TransferError::resource("end on unknown OTA handle"))
    }

    fn set_boot_partition(&mut self, partition: PartitionHandle) -> Result<(), TransferError> {
        self.boot_partition = Some(partition);
        Ok(())
    }
}

/// In-memory double that just counts scheduling calls.
#[derive(Default)]
pub struct InMemoryRebootScheduler {
    pub calls: u32,
}

impl RebootScheduler for InMemoryRebootScheduler {
    fn schedule_reboot(&mut self) {
        self.calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_rejects_oversize_image() {
        let mut ota = InMemoryOta::new(128);
        let p = ota.next_update_partition(0, 0).unwrap();
        assert!(ota.begin(p, 256).is_err());
    }

    #[test]
    fn write_requires_sequential_offsets() {
        let mut ota = InMemoryOta::new(128);
        let p = ota.next_update_partition(0, 0).unwrap();
        let h = ota.begin(p, 128).unwrap();
        assert!(ota.write(h, 0, &[1, 2, 3]).is_ok());
        assert!(ota.write(h, 10, &[4]).is_err());
        assert!(ota.write(h, 3, &[4]).is_ok());
    }

    #[test]
    fn reboot_scheduler_counts_calls() {
        let mut sched = InMemoryRebootScheduler::default();
        assert_eq!(sched.calls, 0);
        sched.schedule_reboot();
        assert_eq!(sched.calls, 1);
    }
}
