//! Partition table probing and partition-as-block-device windowing.
//!
//! Grounded on `spec.md` §6's `blockdevice_preadall` partition-nesting
//! description: a [`Partition`] is just a `(start, length)` window over a
//! parent [`BlockDevice`], and probing walks MBR first (checking for the
//! single-`0xEE`-entry protective-MBR case before trusting it as real MBR)
//! then GPT.

extern crate alloc;

use alloc::sync::Arc;

use hadron_driver_api::block::{BlockDevice, IoError};

use crate::gpt;
use crate::mbr;

/// Which partition table format a disk carries, as determined by
/// [`probe_partition_table_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTableType {
    /// No recognizable signature at all.
    None,
    /// A signature was present but the table didn't validate (bad CRC,
    /// truncated header, ...).
    Unknown,
    /// Classic MBR.
    Mbr,
    /// GPT (found via its LBA1 header, independent of whether a
    /// protective MBR precedes it).
    Gpt,
}

/// A handle to any [`BlockDevice`], used so [`probe_partition_table_type`]
/// and [`Partition`] can read sectors without committing callers to a
/// specific ownership pattern.
pub type BlockDeviceHandle = Arc<dyn BlockDevice>;

async fn read_sector(device: &dyn BlockDevice, lba: u64) -> Result<[u8; 512], IoError> {
    let mut buf = [0u8; 512];
    device.read_sector(lba, &mut buf).await?;
    Ok(buf)
}

/// Reads LBA0 (and LBA1 if needed) off `device` and determines which
/// partition table format is present.
///
/// Mirrors the real disambiguation a bootloader has to do: a GPT disk
/// carries a "protective MBR" at LBA0 whose single partition entry has
/// type `0xEE` and spans the whole disk; any other non-empty, signed MBR
/// is treated as a real MBR table. If neither checks out, LBA1 is still
/// inspected for a valid GPT header in case the protective MBR itself is
/// corrupt or missing.
pub async fn probe_partition_table_type(device: &dyn BlockDevice) -> Result<PartitionTableType, IoError> {
    let sector0 = read_sector(device, 0).await?;

    if !mbr::has_signature(&sector0) {
        return Ok(PartitionTableType::None);
    }

    let entries = mbr::primary_entries(&sector0);
    let is_protective_mbr = entries[0].partition_type == 0xEE
        && entries[1].partition_type == 0
        && entries[2].partition_type == 0
        && entries[3].partition_type == 0;

    if is_protective_mbr {
        return Ok(probe_gpt(device).await?.unwrap_or(PartitionTableType::Unknown));
    }

    if entries.iter().any(|e| e.partition_type != 0) {
        return Ok(PartitionTableType::Mbr);
    }

    // Signed but empty: fall back to checking LBA1 for a bare GPT header.
    Ok(probe_gpt(device).await?.unwrap_or(PartitionTableType::Unknown))
}

async fn probe_gpt(device: &dyn BlockDevice) -> Result<Option<PartitionTableType>, IoError> {
    let sector1 = read_sector(device, 1).await?;
    Ok(gpt::parse_header(&sector1).map(|_| PartitionTableType::Gpt))
}

/// A single partition, presented as its own [`BlockDevice`] by windowing
/// reads and writes over the parent device's sector range
/// `[start_lba, start_lba + sector_count)`.
pub struct Partition {
    parent: BlockDeviceHandle,
    start_lba: u64,
    sector_count: u64,
}

impl Partition {
    #[must_use]
    pub fn new(parent: BlockDeviceHandle, start_lba: u64, sector_count: u64) -> Self {
        Self { parent, start_lba, sector_count }
    }

    fn translate(&self, sector: u64) -> Result<u64, IoError> {
        if sector >= self.sector_count {
            return Err(IoError::OutOfRange);
        }
        Ok(self.start_lba + sector)
    }
}

impl BlockDevice for Partition {
    async fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<(), IoError> {
        let absolute = self.translate(sector)?;
        self.parent.read_sector(absolute, buf).await
    }

    async fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<(), IoError> {
        let absolute = self.translate(sector)?;
        self.parent.write_sector(absolute, buf).await
    }

    fn sector_size(&self) -> usize {
        self.parent.sector_size()
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use hadron_core::sync::SpinLock;

    struct MemDevice {
        sectors: SpinLock<Vec<[u8; 512]>>,
    }

    impl MemDevice {
        fn new(count: usize) -> Self {
            Self { sectors: SpinLock::new(alloc::vec![[0u8; 512]; count]) }
        }

        fn with_sector(self, lba: usize, data: [u8; 512]) -> Self {
            self.sectors.lock()[lba] = data;
            self
        }
    }

    impl BlockDevice for MemDevice {
        async fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<(), IoError> {
            let sectors = self.sectors.lock();
            let s = sectors.get(sector as usize).ok_or(IoError::OutOfRange)?;
            buf.copy_from_slice(s);
            Ok(())
        }

        async fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<(), IoError> {
            let mut sectors = self.sectors.lock();
            let s = sectors.get_mut(sector as usize).ok_or(IoError::OutOfRange)?;
            s.copy_from_slice(buf);
            Ok(())
        }

        fn sector_size(&self) -> usize {
            512
        }

        fn sector_count(&self) -> u64 {
            self.sectors.lock().len() as u64
        }
    }

    fn block_on<F: core::future::Future>(fut: F) -> F::Output {
        hadron_fs_poll_immediate(fut)
    }

    // Local copy of the no-op-waker poll helper: this crate doesn't depend
    // on hadron-fs, and these futures are documented to resolve on first
    // poll (plain in-memory sector access, no real blocking).
    fn hadron_fs_poll_immediate<F: core::future::Future>(mut future: F) -> F::Output {
        use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(core::ptr::null(), &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        let waker = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) };
        let mut cx = Context::from_waker(&waker);
        let mut future = core::pin::pin!(future);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(v) => v,
            Poll::Pending => panic!("test future did not resolve immediately"),
        }
    }

    fn signed_empty_mbr() -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xAA;
        sector
    }

    fn protective_mbr() -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xAA;
        let base = 446;
        sector[base + 4] = 0xEE;
        sector[base + 12..base + 16].copy_from_slice(&100u32.to_le_bytes());
        sector
    }

    fn real_mbr() -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[510] = 0x55;
        sector[511] = 0xAA;
        let base = 446;
        sector[base + 4] = 0x83;
        sector[base + 8..base + 12].copy_from_slice(&2048u32.to_le_bytes());
        sector[base + 12..base + 16].copy_from_slice(&1000u32.to_le_bytes());
        sector
    }

    #[test]
    fn no_signature_yields_none() {
        let device = MemDevice::new(4);
        let result = block_on(probe_partition_table_type(&device));
        assert_eq!(result.unwrap(), PartitionTableType::None);
    }

    #[test]
    fn real_mbr_detected() {
        let device = MemDevice::new(4).with_sector(0, real_mbr());
        let result = block_on(probe_partition_table_type(&device));
        assert_eq!(result.unwrap(), PartitionTableType::Mbr);
    }

    #[test]
    fn protective_mbr_without_gpt_header_is_unknown() {
        let device = MemDevice::new(4).with_sector(0, protective_mbr());
        let result = block_on(probe_partition_table_type(&device));
        assert_eq!(result.unwrap(), PartitionTableType::Unknown);
    }

    #[test]
    fn signed_empty_mbr_with_gpt_header_is_gpt() {
        let mut gpt_header = [0u8; 512];
        gpt_header[0..8].copy_from_slice(b"EFI PART");
        gpt_header[12..16].copy_from_slice(&92u32.to_le_bytes());
        let mut zeroed = gpt_header[..92].to_vec();
        zeroed[16..20].fill(0);
        let crc = crc32fast::hash(&zeroed);
        gpt_header[16..20].copy_from_slice(&crc.to_le_bytes());

        let device = MemDevice::new(4).with_sector(0, signed_empty_mbr()).with_sector(1, gpt_header);
        let result = block_on(probe_partition_table_type(&device));
        assert_eq!(result.unwrap(), PartitionTableType::Gpt);
    }

    #[test]
    fn partition_windows_parent_sectors() {
        let mut data = [0u8; 512];
        data[0] = 0xAB;
        let device = Arc::new(MemDevice::new(10).with_sector(5, data));
        let partition = Partition::new(device, 5, 3);

        let read = block_on(async {
            let mut buf = [0u8; 512];
            partition.read_sector(0, &mut buf).await.unwrap();
            buf
        });
        assert_eq!(read[0], 0xAB);

        let out_of_range = block_on(async {
            let mut buf = [0u8; 512];
            partition.read_sector(3, &mut buf).await
        });
        assert_eq!(out_of_range, Err(IoError::OutOfRange));
    }
}
