//! Bootstrapping from either controller.

use log::info;

use crate::bus::{IoCode, Pulse, DEV_DHP, DEV_DKT};
use crate::disk::floppy::PROGRAM_LOAD_ROM;
use crate::error::{DiskError, DiskResult};
use crate::machine::Machine;

/// Where the fixed-disk bootstrap is installed.
pub const FIXED_BOOT_START: usize = 0o375;

/// IORST; NIOS DHP; JMP 377. The started read lands sector 0 over the loop.
pub const FIXED_BOOT_ROM: [u16; 3] = [0o062677, 0o060100 | DEV_DHP as u16, 0o000377];

/// Switch register bit requesting a program load from a high-speed device.
const SR_HIGH_SPEED: u16 = 0o100000;

/// Processor state a bootstrap hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootInfo {
    /// Start address, or None when the processor's own program load
    /// sequence takes over.
    pub pc: Option<u16>,
    /// Switch register setting.
    pub switches: u16,
}

/// Install the fixed-disk bootstrap for `unit`.
pub fn boot_fixed(machine: &mut Machine, unit: usize) -> DiskResult<BootInfo> {
    if !machine.fixed().unit(unit)?.is_attached() {
        return Err(DiskError::NotAttached(unit));
    }
    machine.memory_mut().load(FIXED_BOOT_START, &FIXED_BOOT_ROM);
    info!("DHP{}: bootstrap installed at {:06o}.", unit, FIXED_BOOT_START);
    Ok(BootInfo {
        pc: Some(FIXED_BOOT_START as u16),
        switches: SR_HIGH_SPEED + DEV_DHP as u16,
    })
}

/// Prepare a program load from floppy `unit`. The floppy controller is a
/// low-speed device, so the switch register carries only the device code.
pub fn boot_floppy(machine: &mut Machine, unit: usize) -> DiskResult<BootInfo> {
    if !machine.floppy().unit(unit)?.is_attached() {
        return Err(DiskError::NotAttached(unit));
    }
    // NIOS rewinds the program load ROM.
    machine.io(DEV_DKT, Pulse::Start, IoCode::Nio, 0);
    info!("DKT{}: ready for program load.", unit);
    Ok(BootInfo {
        pc: None,
        switches: DEV_DKT as u16,
    })
}

/// Fetch the program loader byte by byte with DIAS, the way the processor's
/// program load sequence does.
pub fn read_program_loader(machine: &mut Machine) -> Vec<u8> {
    (0..PROGRAM_LOAD_ROM.len())
        .filter_map(|_| machine.io(DEV_DKT, Pulse::Start, IoCode::Dia, 0))
        .map(|byte| byte as u8)
        .collect()
}
