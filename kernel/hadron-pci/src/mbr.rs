//! Classic MBR partition table.
//!
//! Grounded on `spec.md` §6/§8 S4: a 512-byte sector, four primary entries
//! at offset 446 (16 bytes each), signature `0x55AA` at offset 510.
//! Extended partitions (type `0x05`/`0x0F`) chain to logical partitions
//! the same way real MBR does, each extended-partition-table sector
//! pointing to the next one in the chain.

extern crate alloc;

use alloc::vec::Vec;

/// A single decoded MBR partition entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbrEntry {
    pub partition_type: u8,
    pub lba_start: u32,
    pub sector_count: u32,
}

const ENTRY_OFFSET: usize = 446;
const ENTRY_SIZE: usize = 16;
const SIGNATURE_OFFSET: usize = 510;

/// `true` if `sector` (the first sector of the disk) carries the `0x55AA`
/// MBR boot signature. Does not by itself distinguish a real MBR from a
/// GPT protective MBR — callers check for a single `0xEE` entry covering
/// the whole disk first (see [`crate::partition::probe_partition_table_type`]).
#[must_use]
pub fn has_signature(sector: &[u8]) -> bool {
    sector.len() >= 512 && sector[SIGNATURE_OFFSET] == 0x55 && sector[SIGNATURE_OFFSET + 1] == 0xAA
}

/// Reads the four primary entries out of the MBR sector, in slot order.
/// Empty slots (`partition_type == 0`) are included — callers filter them.
#[must_use]
pub fn primary_entries(sector: &[u8]) -> [MbrEntry; 4] {
    let mut entries = [MbrEntry { partition_type: 0, lba_start: 0, sector_count: 0 }; 4];
    for (i, entry) in entries.iter_mut().enumerate() {
        let base = ENTRY_OFFSET + i * ENTRY_SIZE;
        entry.partition_type = sector[base + 4];
        entry.lba_start = u32::from_le_bytes(sector[base + 8..base + 12].try_into().unwrap());
        entry.sector_count = u32::from_le_bytes(sector[base + 12..base + 16].try_into().unwrap());
    }
    entries
}

/// `true` for the two MBR partition type bytes that denote an extended
/// partition container.
#[must_use]
pub fn is_extended(partition_type: u8) -> bool {
    partition_type == 0x05 || partition_type == 0x0F
}

/// Walks the primary table, expanding any extended partition chain.
///
/// `read_sector` reads one 512-byte sector at an absolute LBA; it's
/// injected rather than taking a `BlockDevice` directly so this module
/// stays synchronous (partition probing at boot happens before any async
/// executor is running).
pub fn parse(sector0: &[u8], mut read_sector: impl FnMut(u64) -> Option<[u8; 512]>) -> Vec<MbrEntry> {
    let mut out = Vec::new();
    for entry in primary_entries(sector0) {
        if entry.partition_type == 0 {
            continue;
        }
        if is_extended(entry.partition_type) {
            walk_extended(entry.lba_start as u64, entry.lba_start as u64, &mut read_sector, &mut out);
        } else {
            out.push(entry);
        }
    }
    out
}

fn walk_extended(
    ebr_lba: u64,
    extended_start: u64,
    read_sector: &mut impl FnMut(u64) -> Option<[u8; 512]>,
    out: &mut Vec<MbrEntry>,
) {
    let Some(sector) = read_sector(ebr_lba) else {
        return;
    };
    let entries = primary_entries(&sector);
    // Slot 0: the logical partition itself, LBA relative to this EBR.
    if entries[0].partition_type != 0 {
        out.push(MbrEntry {
            partition_type: entries[0].partition_type,
            lba_start: (ebr_lba + entries[0].lba_start as u64) as u32,
            sector_count: entries[0].sector_count,
        });
    }
    // Slot 1: link to the next EBR, LBA relative to the first extended
    // partition's start (not this EBR), per the standard chain format.
    if is_extended(entries[1].partition_type) {
        let next = extended_start + entries[1].lba_start as u64;
        walk_extended(next, extended_start, read_sector, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sector_with_entry(slot: usize, ptype: u8, lba: u32, count: u32) -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[SIGNATURE_OFFSET] = 0x55;
        sector[SIGNATURE_OFFSET + 1] = 0xAA;
        let base = ENTRY_OFFSET + slot * ENTRY_SIZE;
        sector[base + 4] = ptype;
        sector[base + 8..base + 12].copy_from_slice(&lba.to_le_bytes());
        sector[base + 12..base + 16].copy_from_slice(&count.to_le_bytes());
        sector
    }

    #[test]
    fn signature_detected() {
        let sector = make_sector_with_entry(0, 0x83, 2048, 1000);
        assert!(has_signature(&sector));
    }

    #[test]
    fn missing_signature_rejected() {
        let sector = [0u8; 512];
        assert!(!has_signature(&sector));
    }

    #[test]
    fn primary_partition_parsed() {
        let sector = make_sector_with_entry(1, 0x83, 2048, 1000);
        let entries = primary_entries(&sector);
        assert_eq!(entries[1].partition_type, 0x83);
        assert_eq!(entries[1].lba_start, 2048);
        assert_eq!(entries[1].sector_count, 1000);
        assert_eq!(entries[0].partition_type, 0);
    }

    #[test]
    fn parse_skips_empty_slots() {
        let sector = make_sector_with_entry(2, 0x07, 100, 200);
        let parsed = parse(&sector, |_| None);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].partition_type, 0x07);
    }

    #[test]
    fn extended_partition_chain_is_followed() {
        let mut primary = [0u8; 512];
        primary[SIGNATURE_OFFSET] = 0x55;
        primary[SIGNATURE_OFFSET + 1] = 0xAA;
        let base = ENTRY_OFFSET;
        primary[base + 4] = 0x05; // extended
        primary[base + 8..base + 12].copy_from_slice(&100u32.to_le_bytes());

        let mut ebr = [0u8; 512];
        ebr[ENTRY_OFFSET + 4] = 0x83;
        ebr[ENTRY_OFFSET + 8..ENTRY_OFFSET + 12].copy_from_slice(&0u32.to_le_bytes());
        ebr[ENTRY_OFFSET + 12..ENTRY_OFFSET + 16].copy_from_slice(&50u32.to_le_bytes());

        let parsed = parse(&primary, |lba| if lba == 100 { Some(ebr) } else { None });
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].partition_type, 0x83);
        assert_eq!(parsed[0].lba_start, 100);
        assert_eq!(parsed[0].sector_count, 50);
    }
}
