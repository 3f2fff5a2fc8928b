//! GUID Partition Table.
//!
//! Grounded on `spec.md` §6/§8 S4: header at LBA 1, partition array at
//! `partition_entry_lba` with `number_of_partition_entries` entries of
//! `size_of_partition_entry` bytes. Header CRC is computed with
//! `header_crc32` zeroed; the array CRC covers exactly the declared array
//! byte range. A backup copy lives at the last LBA, unused here (this
//! kernel only reads the primary copy; repair-from-backup is out of
//! scope).

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

const SIGNATURE: &[u8; 8] = b"EFI PART";
const HEADER_CRC_OFFSET: usize = 16;
const HEADER_SIZE_OFFSET: usize = 12;
const CURRENT_LBA_OFFSET: usize = 24;
const PARTITION_ENTRY_LBA_OFFSET: usize = 72;
const NUM_ENTRIES_OFFSET: usize = 80;
const ENTRY_SIZE_OFFSET: usize = 84;
const ARRAY_CRC_OFFSET: usize = 88;

/// A decoded GPT header, enough to locate and validate the partition
/// array.
#[derive(Debug, Clone, Copy)]
pub struct GptHeader {
    pub header_size: u32,
    pub current_lba: u64,
    pub partition_entry_lba: u64,
    pub number_of_partition_entries: u32,
    pub size_of_partition_entry: u32,
    pub partition_array_crc32: u32,
}

/// Parses and CRC-validates the GPT header in `sector` (LBA 1 of the
/// disk). Returns `None` if the signature or either CRC doesn't check
/// out.
#[must_use]
pub fn parse_header(sector: &[u8]) -> Option<GptHeader> {
    if sector.len() < 92 || &sector[0..8] != SIGNATURE {
        return None;
    }
    let header_size = u32::from_le_bytes(sector[HEADER_SIZE_OFFSET..HEADER_SIZE_OFFSET + 4].try_into().unwrap());
    let header_size = header_size as usize;
    if header_size < 92 || header_size > sector.len() {
        return None;
    }

    let stored_crc = u32::from_le_bytes(sector[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].try_into().unwrap());
    let mut zeroed = alloc::vec![0u8; header_size];
    zeroed.copy_from_slice(&sector[..header_size]);
    zeroed[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].fill(0);
    if crc32fast::hash(&zeroed) != stored_crc {
        return None;
    }

    Some(GptHeader {
        header_size: header_size as u32,
        current_lba: u64::from_le_bytes(sector[CURRENT_LBA_OFFSET..CURRENT_LBA_OFFSET + 8].try_into().unwrap()),
        partition_entry_lba: u64::from_le_bytes(
            sector[PARTITION_ENTRY_LBA_OFFSET..PARTITION_ENTRY_LBA_OFFSET + 8].try_into().unwrap(),
        ),
        number_of_partition_entries: u32::from_le_bytes(
            sector[NUM_ENTRIES_OFFSET..NUM_ENTRIES_OFFSET + 4].try_into().unwrap(),
        ),
        size_of_partition_entry: u32::from_le_bytes(
            sector[ENTRY_SIZE_OFFSET..ENTRY_SIZE_OFFSET + 4].try_into().unwrap(),
        ),
        partition_array_crc32: u32::from_le_bytes(sector[ARRAY_CRC_OFFSET..ARRAY_CRC_OFFSET + 4].try_into().unwrap()),
    })
}

/// A decoded, non-empty GPT partition entry.
#[derive(Debug, Clone)]
pub struct GptPartition {
    pub first_lba: u64,
    pub last_lba: u64,
    pub name: String,
}

/// Validates `array` (the raw bytes of every partition entry, contiguous,
/// exactly `header.number_of_partition_entries *
/// header.size_of_partition_entry` bytes) against the header's array CRC,
/// then decodes every non-empty entry (all-zero `partition_type_guid`
/// marks an empty slot).
#[must_use]
pub fn parse_array(header: &GptHeader, array: &[u8]) -> Option<Vec<GptPartition>> {
    let expected_len = header.number_of_partition_entries as usize * header.size_of_partition_entry as usize;
    if array.len() < expected_len {
        return None;
    }
    let array = &array[..expected_len];
    if crc32fast::hash(array) != header.partition_array_crc32 {
        return None;
    }

    let entry_size = header.size_of_partition_entry as usize;
    let mut partitions = Vec::new();
    for entry in array.chunks_exact(entry_size) {
        if entry.len() < 128 {
            continue;
        }
        if entry[0..16].iter().all(|&b| b == 0) {
            continue; // empty slot
        }
        let first_lba = u64::from_le_bytes(entry[32..40].try_into().unwrap());
        let last_lba = u64::from_le_bytes(entry[40..48].try_into().unwrap());
        let name = decode_utf16_name(&entry[56..128]);
        partitions.push(GptPartition { first_lba, last_lba, name });
    }
    Some(partitions)
}

fn decode_utf16_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_to_utf16_bytes(name: &str) -> [u8; 72] {
        let mut buf = [0u8; 72];
        for (i, unit) in name.encode_utf16().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        buf
    }

    fn build_header_sector(entry_lba: u64, num_entries: u32, entry_size: u32, array_crc: u32) -> [u8; 512] {
        let mut sector = [0u8; 512];
        sector[0..8].copy_from_slice(SIGNATURE);
        sector[HEADER_SIZE_OFFSET..HEADER_SIZE_OFFSET + 4].copy_from_slice(&92u32.to_le_bytes());
        sector[CURRENT_LBA_OFFSET..CURRENT_LBA_OFFSET + 8].copy_from_slice(&1u64.to_le_bytes());
        sector[PARTITION_ENTRY_LBA_OFFSET..PARTITION_ENTRY_LBA_OFFSET + 8].copy_from_slice(&entry_lba.to_le_bytes());
        sector[NUM_ENTRIES_OFFSET..NUM_ENTRIES_OFFSET + 4].copy_from_slice(&num_entries.to_le_bytes());
        sector[ENTRY_SIZE_OFFSET..ENTRY_SIZE_OFFSET + 4].copy_from_slice(&entry_size.to_le_bytes());
        sector[ARRAY_CRC_OFFSET..ARRAY_CRC_OFFSET + 4].copy_from_slice(&array_crc.to_le_bytes());

        let mut zeroed = sector[..92].to_vec();
        zeroed[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].fill(0);
        let crc = crc32fast::hash(&zeroed);
        sector[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        sector
    }

    fn build_one_partition_array(first_lba: u64, last_lba: u64, name: &str) -> alloc::vec::Vec<u8> {
        let mut entry = alloc::vec![0u8; 128];
        entry[0..16].copy_from_slice(&[0xAAu8; 16]); // non-zero type guid
        entry[32..40].copy_from_slice(&first_lba.to_le_bytes());
        entry[40..48].copy_from_slice(&last_lba.to_le_bytes());
        entry[56..128].copy_from_slice(&name_to_utf16_bytes(name));

        let mut second = alloc::vec![0u8; 128]; // empty slot
        let mut array = entry;
        array.append(&mut second);
        array
    }

    #[test]
    fn header_round_trips_with_valid_crc() {
        let array = build_one_partition_array(2048, 4095, "TEST");
        let array_crc = crc32fast::hash(&array);
        let sector = build_header_sector(2, 2, 128, array_crc);
        let header = parse_header(&sector).expect("header should validate");
        assert_eq!(header.partition_entry_lba, 2);
        assert_eq!(header.number_of_partition_entries, 2);
    }

    #[test]
    fn corrupted_header_crc_rejected() {
        let array = build_one_partition_array(2048, 4095, "TEST");
        let array_crc = crc32fast::hash(&array);
        let mut sector = build_header_sector(2, 2, 128, array_crc);
        sector[CURRENT_LBA_OFFSET] ^= 0xFF; // corrupt without updating CRC
        assert!(parse_header(&sector).is_none());
    }

    #[test]
    fn array_decodes_one_partition_with_name() {
        let array = build_one_partition_array(2048, 4095, "TEST");
        let array_crc = crc32fast::hash(&array);
        let sector = build_header_sector(2, 2, 128, array_crc);
        let header = parse_header(&sector).unwrap();

        let partitions = parse_array(&header, &array).expect("array CRC should validate");
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].first_lba, 2048);
        assert_eq!(partitions[0].last_lba, 4095);
        assert_eq!(partitions[0].name, "TEST");
    }

    #[test]
    fn corrupted_array_crc_rejected() {
        let array = build_one_partition_array(2048, 4095, "TEST");
        let sector = build_header_sector(2, 2, 128, array_crc_plus_one(&array));
        let header = parse_header(&sector).unwrap();
        assert!(parse_array(&header, &array).is_none());
    }

    fn array_crc_plus_one(array: &[u8]) -> u32 {
        crc32fast::hash(array).wrapping_add(1)
    }
}
