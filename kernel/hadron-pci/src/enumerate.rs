//! PCI bus walk and BAR decoding.
//!
//! Ported from `hadron-drivers/src/pci/enumerate.rs`, generalized to take a
//! `&dyn ConfigSpace` instead of calling `PciCam`'s `unsafe` port functions
//! directly — the walking/bridge-recursion/BAR-sizing logic is unchanged.

use alloc::vec::Vec;

use hadron_driver_api::pci::{PciAddress, PciBar, PciDeviceInfo};

use crate::cam::{ConfigSpace, regs};

/// Enumerates every PCI device reachable from `config`.
///
/// If the root host controller (0:0.0) is multi-function, each function is
/// treated as a separate host bridge with its own bus domain; otherwise
/// only bus 0 is walked.
#[must_use]
pub fn enumerate(config: &dyn ConfigSpace) -> Vec<PciDeviceInfo> {
    let mut devices = Vec::new();
    let header_type = config.read_u8(0, 0, 0, regs::HEADER_TYPE);
    if header_type & 0x80 == 0 {
        enumerate_bus(config, 0, &mut devices);
    } else {
        for func in 0..8u8 {
            if config.read_u16(0, 0, func, regs::VENDOR_ID) != 0xFFFF {
                enumerate_bus(config, func, &mut devices);
            }
        }
    }
    devices
}

fn enumerate_bus(config: &dyn ConfigSpace, bus: u8, devices: &mut Vec<PciDeviceInfo>) {
    for device in 0..32u8 {
        enumerate_device(config, bus, device, devices);
    }
}

fn enumerate_device(config: &dyn ConfigSpace, bus: u8, device: u8, devices: &mut Vec<PciDeviceInfo>) {
    if config.read_u16(bus, device, 0, regs::VENDOR_ID) == 0xFFFF {
        return;
    }

    let info = read_device_info(config, bus, device, 0);
    let is_multi_function = info.header_type & 0x80 != 0;

    if info.class == 0x06 && info.subclass == 0x04 {
        let secondary = config.read_u8(bus, device, 0, regs::SECONDARY_BUS);
        if secondary != 0 {
            enumerate_bus(config, secondary, devices);
        }
    }
    devices.push(info);

    if is_multi_function {
        for func in 1..8u8 {
            if config.read_u16(bus, device, func, regs::VENDOR_ID) == 0xFFFF {
                continue;
            }
            let func_info = read_device_info(config, bus, device, func);
            if func_info.class == 0x06 && func_info.subclass == 0x04 {
                let secondary = config.read_u8(bus, device, func, regs::SECONDARY_BUS);
                if secondary != 0 {
                    enumerate_bus(config, secondary, devices);
                }
            }
            devices.push(func_info);
        }
    }
}

fn read_device_info(config: &dyn ConfigSpace, bus: u8, dev: u8, func: u8) -> PciDeviceInfo {
    let vendor_id = config.read_u16(bus, dev, func, regs::VENDOR_ID);
    let device_id = config.read_u16(bus, dev, func, regs::DEVICE_ID);
    let revision = config.read_u8(bus, dev, func, regs::REVISION);
    let prog_if = config.read_u8(bus, dev, func, regs::PROG_IF);
    let subclass = config.read_u8(bus, dev, func, regs::SUBCLASS);
    let class = config.read_u8(bus, dev, func, regs::CLASS);
    let header_type = config.read_u8(bus, dev, func, regs::HEADER_TYPE);

    let (subsystem_vendor_id, subsystem_device_id) = if header_type & 0x7F == 0 {
        (
            config.read_u16(bus, dev, func, regs::SUBSYSTEM_VENDOR_ID),
            config.read_u16(bus, dev, func, regs::SUBSYSTEM_DEVICE_ID),
        )
    } else {
        (0, 0)
    };

    let interrupt_line = config.read_u8(bus, dev, func, regs::INTERRUPT_LINE);
    let interrupt_pin = config.read_u8(bus, dev, func, regs::INTERRUPT_PIN);
    let bars = decode_bars(config, bus, dev, func, header_type);

    PciDeviceInfo {
        address: PciAddress { bus, device: dev, function: func },
        vendor_id,
        device_id,
        revision,
        prog_if,
        subclass,
        class,
        header_type,
        subsystem_vendor_id,
        subsystem_device_id,
        interrupt_line,
        interrupt_pin,
        bars,
    }
}

fn decode_bars(config: &dyn ConfigSpace, bus: u8, dev: u8, func: u8, header_type: u8) -> [PciBar; 6] {
    let mut bars = [PciBar::Unused; 6];
    let max_bars: usize = if header_type & 0x7F == 1 { 2 } else { 6 };

    let mut i = 0;
    while i < max_bars {
        let offset = regs::BAR0 + (i as u8) * 4;
        let original = config.read_u32(bus, dev, func, offset);
        config.write_u32(bus, dev, func, offset, 0xFFFF_FFFF);
        let sizing = config.read_u32(bus, dev, func, offset);
        config.write_u32(bus, dev, func, offset, original);

        if sizing == 0 || sizing == 0xFFFF_FFFF {
            i += 1;
            continue;
        }

        if original & 1 != 0 {
            let mask = sizing & !0x03;
            let size = (!mask).wrapping_add(1) & 0xFFFF;
            if size > 0 {
                bars[i] = PciBar::Io { base: original & !0x03, size };
            }
            i += 1;
        } else {
            let bar_type = (original >> 1) & 0x03;
            let prefetchable = original & 0x08 != 0;
            let is_64bit = bar_type == 2;

            if is_64bit && i + 1 < max_bars {
                let next_offset = regs::BAR0 + ((i + 1) as u8) * 4;
                let original_high = config.read_u32(bus, dev, func, next_offset);
                config.write_u32(bus, dev, func, next_offset, 0xFFFF_FFFF);
                let sizing_high = config.read_u32(bus, dev, func, next_offset);
                config.write_u32(bus, dev, func, next_offset, original_high);

                let base = (u64::from(original_high) << 32) | u64::from(original & !0x0F);
                let mask64 = (u64::from(sizing_high) << 32) | u64::from(sizing & !0x0F);
                let size = (!mask64).wrapping_add(1);

                bars[i] = PciBar::Memory { base, size, prefetchable, is_64bit: true };
                i += 2;
            } else {
                let mask = sizing & !0x0F;
                let size = u64::from((!mask).wrapping_add(1));
                bars[i] = PciBar::Memory {
                    base: u64::from(original & !0x0F),
                    size,
                    prefetchable,
                    is_64bit: false,
                };
                i += 1;
            }
        }
    }
    bars
}

/// Human-readable name for a PCI class/subclass pair, for log lines.
#[must_use]
pub fn class_name(class: u8, subclass: u8) -> &'static str {
    match (class, subclass) {
        (0x00, 0x00) => "Non-VGA Unclassified",
        (0x01, 0x01) => "IDE Controller",
        (0x01, 0x06) => "SATA Controller",
        (0x02, 0x00) => "Ethernet Controller",
        (0x03, 0x00) => "VGA Controller",
        (0x04, 0x00) => "Video Device",
        (0x06, 0x00) => "Host Bridge",
        (0x06, 0x01) => "ISA Bridge",
        (0x06, 0x04) => "PCI-to-PCI Bridge",
        (0x08, 0x00) => "PIC",
        (0x08, 0x03) => "RTC Controller",
        (0x0C, 0x03) => "USB Controller",
        (0x0C, 0x05) => "SMBus Controller",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cam::tests::FakeConfigSpace;
    use crate::cam::regs;

    fn put_device(fake: &FakeConfigSpace, bus: u8, dev: u8, func: u8, vendor: u16, device: u16, class: u8, subclass: u8) {
        fake.set(bus, dev, func, regs::VENDOR_ID, (u32::from(device) << 16) | u32::from(vendor));
        fake.set(bus, dev, func, regs::CLASS, (u32::from(class) << 24) | (u32::from(subclass) << 16));
    }

    #[test]
    fn enumerate_finds_single_device_on_bus_zero() {
        let fake = FakeConfigSpace::new();
        put_device(&fake, 0, 0, 0, 0x8086, 0x1234, 0x02, 0x00);
        let devices = enumerate(&fake);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].vendor_id, 0x8086);
        assert_eq!(devices[0].device_id, 0x1234);
    }

    #[test]
    fn empty_bus_yields_no_devices() {
        let fake = FakeConfigSpace::new();
        assert!(enumerate(&fake).is_empty());
    }

    #[test]
    fn class_name_known_pair() {
        assert_eq!(class_name(0x02, 0x00), "Ethernet Controller");
        assert_eq!(class_name(0xFF, 0xFF), "Unknown");
    }
}
