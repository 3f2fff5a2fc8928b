//! PCI bus enumeration and MBR/GPT partition table probing.
//!
//! `spec.md` §4.7/L5 groups "device probing" as one subsystem: PCI
//! enumeration to find storage controllers, then partition-table and
//! filesystem-signature probing on whatever block devices those
//! controllers expose. Grounded on `hadron-drivers/src/pci/{cam,enumerate}`
//! for the PCI half (ported here behind a [`ConfigSpace`] trait so
//! enumeration is host-testable instead of reaching for real I/O ports),
//! and on `spec.md` §6/§8 S4 for the exact MBR/GPT wire layout.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cam;
pub mod enumerate;
pub mod gpt;
pub mod mbr;
pub mod partition;

pub use cam::ConfigSpace;
pub use enumerate::enumerate;
pub use partition::{BlockDeviceHandle, Partition, PartitionTableType, probe_partition_table_type};

pub use hadron_driver_api::pci::{PciAddress, PciBar, PciDeviceId, PciDeviceInfo, PCI_ANY_ID};
