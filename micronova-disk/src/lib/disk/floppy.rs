//! The 6038 floppy controller.
//!
//! Head movement commands complete after a fixed delay. Data commands wait
//! for the free-running sector timer: every sector time each drive advances
//! by one sector, and a pending read or write is scheduled for the sector
//! that has just arrived under the head.

use log::{debug, info, trace};

use crate::bus::{IoCode, Pulse, DEV_DKT};
use crate::error::{DiskError, DiskResult};
use crate::memory::{ADDRESS_MASK, MAP_A};
use crate::scheduler::EventTarget;

use super::disk_interface::*;
use super::geometry::FLOPPY_DRIVE_TYPES;
use super::unit::DiskUnit;

pub const NUM_UNITS: usize = 2;
/// Unit number of the sector timer in the event queue.
pub const TIMER_UNIT: usize = NUM_UNITS;
const SECTORS_PER_TRACK: u16 = 8;

// Specify command register.
const SC_COMMAND_MASK: u16 = 0o377;
const SC_SECTOR_SHIFT: u16 = 8;
const SC_SECTOR_MASK: u16 = 0o7;
const SC_UNIT_SHIFT: u16 = 15;

// Commands.
pub const CMD_SETTLE: u16 = 0o000;
pub const CMD_STEP_OUT: u16 = 0o001;
pub const CMD_STEP_IN: u16 = 0o002;
pub const CMD_READ_PREAMBLE: u16 = 0o010;
pub const CMD_READ_NEXT: u16 = 0o020;
pub const CMD_WRITE_NEXT: u16 = 0o040;
pub const CMD_FORMAT_0: u16 = 0o240;
pub const CMD_FORMAT_NEXT: u16 = 0o241;

// Status register bits.
pub const STA_NOT_READY: u16 = 0o100000;
pub const STA_TRACK0: u16 = 0o040000;
pub const STA_HEAD_ON: u16 = 0o020000;
pub const STA_WRITE_PROTECT: u16 = 0o001000;
pub const STA_UNIT: u16 = 0o000400;
pub const STA_DRIVE_STATUS: u16 = 0o000200;
pub const STA_ILLEGAL: u16 = 0o000040;
pub const STA_SECTOR_ERROR: u16 = 0o000020;
pub const STA_CHECKWORD: u16 = 0o000010;
pub const STA_DATA_LATE: u16 = 0o000004;
pub const STA_WRITE_FAULT: u16 = 0o000002;
pub const STA_ERROR: u16 = 0o000001;

const STA_UNIT_SHIFT: u16 = 8;
pub const STA_EFLGS: u16 = STA_ERROR | STA_DATA_LATE | STA_CHECKWORD | STA_SECTOR_ERROR
    | STA_WRITE_FAULT | STA_ILLEGAL | STA_DRIVE_STATUS;
/// Error flags cleared when a command is started.
const STA_START_CLEAR: u16 = STA_EFLGS & !STA_DRIVE_STATUS;
/// Errors that are summarised in STA_ERROR.
const STA_GENERAL: u16 = STA_ILLEGAL | STA_SECTOR_ERROR | STA_CHECKWORD | STA_DATA_LATE
    | STA_WRITE_FAULT;

/// Loader served byte by byte to the processor's program load sequence.
pub const PROGRAM_LOAD_ROM: [u8; 131] = [
    0x00, 0x07, 0xFF, 0xC0, 0x00, 0x3F, 0xFF, 0xD9, 0x00, 0x59, 0x28, 0x58, 0x21, 0xFC, 0x8F, 0x00,
    0x49, 0x38, 0xA8, 0x00, 0x11, 0x29, 0x11, 0x29, 0x11, 0x2A, 0x11, 0x2B, 0xAB, 0x04, 0x01, 0xFB,
    0x21, 0xF3, 0x31, 0xF3, 0x2A, 0x00, 0xDA, 0xC0, 0xFB, 0xC0, 0x4B, 0x00, 0xD3, 0x00, 0x83, 0x04,
    0x01, 0xFA, 0x03, 0xDB, 0x62, 0xBF, 0x65, 0xBF, 0x09, 0x15, 0x01, 0x04, 0x01, 0xFE, 0x85, 0x50,
    0x09, 0x11, 0xAA, 0x4B, 0x01, 0xFD, 0x85, 0x00, 0x09, 0x0E, 0xAE, 0x4B, 0x01, 0xFE, 0x21, 0x18,
    0x09, 0x0A, 0xC4, 0x1C, 0x01, 0xFE, 0x82, 0x50, 0x09, 0x06, 0x01, 0x02, 0x01, 0xEC, 0x21, 0x11,
    0x00, 0xFF, 0xD4, 0x91, 0xD4, 0x00, 0x62, 0x3F, 0x67, 0x7F, 0x01, 0xFF, 0x68, 0xFF, 0xCF, 0x00,
    0x75, 0x7F, 0xD2, 0x90, 0xD2, 0x90, 0xAA, 0x8B, 0xAA, 0x52, 0x03, 0x01, 0x03, 0x00, 0x00, 0x08,
    0x00, 0x44, 0x00,
];

/// Pack a specify command word.
pub fn specify_command(command: u16, sector: u16, unit: usize) -> u16 {
    ((unit as u16 & 1) << SC_UNIT_SHIFT)
        | ((sector & SC_SECTOR_MASK) << SC_SECTOR_SHIFT)
        | (command & SC_COMMAND_MASK)
}

/// Current address register value for a track and sector.
pub fn current_address(track: u16, sector: u16) -> u16 {
    ((track & 0o177) << 8) | ((sector & 0o7) << 2)
}

/// Simulated delays, in event-queue time units.
#[derive(Debug, Clone)]
pub struct FloppyTiming {
    pub settle: u64,
    pub step: u64,
    /// Delay before a format command completes.
    pub rotate: u64,
    /// Period of the sector timer.
    pub sector: u64,
    /// Time to read a sector's address field.
    pub address: u64,
    /// Time to move a sector's data field.
    pub data: u64,
    /// Hold a read-next or write-next until the requested sector comes round
    /// instead of completing on the next sector with a sector error.
    pub wait_for_sector: bool,
}

impl Default for FloppyTiming {
    fn default() -> Self {
        FloppyTiming {
            settle: 10,
            step: 1,
            rotate: 100,
            sector: 500,
            address: 5,
            data: 490,
            wait_for_sector: false,
        }
    }
}

pub struct FloppyController {
    sc: u16,
    ma: u16,
    ca: u16,
    rom_address: usize,
    status: u16,
    timing: FloppyTiming,
    units: Vec<DiskUnit>,
}

impl FloppyController {
    pub fn new() -> Self {
        Self::with_timing(FloppyTiming::default())
    }

    pub fn with_timing(timing: FloppyTiming) -> Self {
        FloppyController {
            sc: 0,
            ma: 0,
            ca: 0,
            rom_address: 0,
            status: 0,
            timing,
            units: (0..NUM_UNITS).map(|u| DiskUnit::new(u, &FLOPPY_DRIVE_TYPES)).collect(),
        }
    }

    pub fn timing(&self) -> &FloppyTiming {
        &self.timing
    }

    pub fn timing_mut(&mut self) -> &mut FloppyTiming {
        &mut self.timing
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn specify(&self) -> u16 {
        self.sc
    }

    pub fn memory_address(&self) -> u16 {
        self.ma
    }

    pub fn current(&self) -> u16 {
        self.ca
    }

    pub fn unit(&self, unit: usize) -> DiskResult<&DiskUnit> {
        self.units.get(unit).ok_or(DiskError::NoSuchUnit(unit))
    }

    pub fn unit_mut(&mut self, unit: usize) -> DiskResult<&mut DiskUnit> {
        self.units.get_mut(unit).ok_or(DiskError::NoSuchUnit(unit))
    }

    fn target(unit: usize) -> EventTarget {
        EventTarget::new(DEV_DKT, unit)
    }

    fn selected_unit(&self) -> usize {
        (self.sc >> SC_UNIT_SHIFT) as usize
    }

    fn requested_sector(&self) -> u16 {
        (self.sc >> SC_SECTOR_SHIFT) & SC_SECTOR_MASK
    }

    fn complete(ctx: &mut IoContext<'_>) {
        ctx.lines.clear_busy(DEV_DKT);
        ctx.lines.set_done(DEV_DKT);
        ctx.lines.update();
    }

    /// Validate and launch the command in SC. Returns false if it was
    /// rejected.
    fn go(&mut self, ctx: &mut IoContext<'_>) -> bool {
        self.status &= !STA_EFLGS;
        let u = self.selected_unit();
        let target = Self::target(u);
        if !self.units[u].is_attached() || ctx.scheduler.is_active(target) {
            self.status |= STA_ERROR;
            return false;
        }

        let command = self.sc & SC_COMMAND_MASK;
        self.units[u].function = command;
        debug!("DKT{}: command {:03o} sector {} at cyl {}.", u, command,
               self.requested_sector(), self.units[u].cylinder);
        match command {
            CMD_SETTLE => {
                ctx.scheduler.activate(target, self.timing.settle);
            }
            CMD_STEP_IN | CMD_STEP_OUT => {
                ctx.scheduler.activate(target, self.timing.step);
            }
            CMD_READ_PREAMBLE | CMD_READ_NEXT | CMD_WRITE_NEXT => {
                // Scheduled by the sector timer.
            }
            CMD_FORMAT_0 | CMD_FORMAT_NEXT => {
                if self.units[u].is_write_protected() {
                    self.status |= STA_WRITE_PROTECT | STA_WRITE_FAULT;
                    return false;
                }
                ctx.scheduler.activate(target, self.timing.rotate);
            }
            _ => {
                // Completes as an illegal command.
                ctx.scheduler.activate(target, self.timing.step);
            }
        }
        true
    }

    /// Move one sector between the drive and memory through map A.
    fn transfer(&mut self, u: usize, write: bool, ctx: &mut IoContext<'_>) -> std::io::Result<()> {
        let unit = &mut self.units[u];
        let block = unit.drive_type().linear_block_address(unit.cylinder, 0, unit.sector);
        let mut buf = [0u16; WORDS_PER_SECTOR];
        trace!("DKT{}: {} block {} ma={:06o}.", u, if write { "write" } else { "read" },
               block, self.ma);
        if write {
            copy_from_memory(ctx.memory, MAP_A, &mut self.ma, &mut buf);
            unit.write_sector(block, &buf)
        } else {
            unit.read_sector(block, &mut buf)?;
            copy_to_memory(ctx.memory, MAP_A, &mut self.ma, &buf);
            Ok(())
        }
    }

    /// The sector timer: rotate every drive by one sector and release a
    /// waiting data command.
    fn rotate(&mut self, ctx: &mut IoContext<'_>) {
        for unit in self.units.iter_mut() {
            unit.sector = (unit.sector + 1) % SECTORS_PER_TRACK;
        }
        if ctx.lines.is_busy(DEV_DKT) {
            let u = self.selected_unit();
            let target = Self::target(u);
            if !ctx.scheduler.is_active(target) {
                let unit = &self.units[u];
                match unit.function {
                    CMD_READ_PREAMBLE => {
                        ctx.scheduler.activate(target, self.timing.address);
                    }
                    CMD_READ_NEXT | CMD_WRITE_NEXT => {
                        if !self.timing.wait_for_sector || unit.sector == self.requested_sector() {
                            ctx.scheduler.activate(target, self.timing.address + self.timing.data);
                        }
                    }
                    _ => {}
                }
            }
        }
        ctx.scheduler.activate(Self::target(TIMER_UNIT), self.timing.sector);
    }
}

impl Default for FloppyController {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskController for FloppyController {
    fn device(&self) -> u8 {
        DEV_DKT
    }

    fn io(&mut self, pulse: Pulse, code: IoCode, ac: u16, ctx: &mut IoContext<'_>) -> u16 {
        let u = self.selected_unit();
        let mut result = 0;

        if pulse == Pulse::Start {
            if ctx.scheduler.is_active(Self::target(u)) {
                self.status |= STA_ERROR;
            } else {
                self.status &= !STA_START_CLEAR;
                ctx.lines.set_busy(DEV_DKT);
                ctx.lines.clear_done(DEV_DKT);
                ctx.lines.update();
                match code {
                    IoCode::Nio => {
                        Self::complete(ctx);
                        self.rom_address = 0;
                    }
                    IoCode::Dia => {
                        result = PROGRAM_LOAD_ROM.get(self.rom_address).copied().unwrap_or(0) as u16;
                        if self.rom_address < PROGRAM_LOAD_ROM.len() {
                            self.rom_address += 1;
                        }
                        Self::complete(ctx);
                    }
                    IoCode::Doa => {
                        let new_unit = (ac >> SC_UNIT_SHIFT) as usize;
                        if new_unit != u {
                            self.status = (self.status & !STA_UNIT)
                                | ((new_unit as u16) << STA_UNIT_SHIFT);
                            self.ca = current_address(self.units[new_unit].cylinder,
                                                      self.units[new_unit].sector);
                        }
                        self.sc = ac;
                        if !self.go(ctx) {
                            Self::complete(ctx);
                        }
                    }
                    _ => {
                        // Left busy: the processor's program load sequence
                        // drives the controller from here.
                    }
                }
            }
        } else {
            match code {
                IoCode::Dia => result = self.status,
                IoCode::Dib => result = self.ma & ADDRESS_MASK,
                IoCode::Dob => self.ma = ac & ADDRESS_MASK,
                IoCode::Dic => result = self.ca,
                _ => {}
            }
            if pulse == Pulse::Clear {
                ctx.lines.clear_busy(DEV_DKT);
                ctx.lines.clear_done(DEV_DKT);
                ctx.lines.update();
                self.status &= !STA_EFLGS;
                ctx.scheduler.cancel(Self::target(self.selected_unit()));
            }
        }

        if self.status & STA_GENERAL != 0 {
            self.status |= STA_ERROR;
        }
        trace!("DKT {}{} {:06o} -> {:06o} (status {:06o}).", code.mnemonic(), pulse.suffix(),
               ac, result, self.status);
        result
    }

    fn service(&mut self, u: usize, ctx: &mut IoContext<'_>) -> DiskResult<()> {
        if u == TIMER_UNIT {
            self.rotate(ctx);
            return Ok(());
        }

        let mut result = Ok(());
        let function = self.units[u].function;
        let last_cylinder = self.units[u].drive_type().cylinders - 1;
        match function {
            CMD_SETTLE => self.status |= STA_HEAD_ON,
            CMD_STEP_IN => {
                let unit = &mut self.units[u];
                if unit.cylinder < last_cylinder {
                    unit.cylinder += 1;
                }
            }
            CMD_STEP_OUT => {
                let unit = &mut self.units[u];
                unit.cylinder = unit.cylinder.saturating_sub(1);
            }
            CMD_READ_PREAMBLE => {
                self.ca = current_address(self.units[u].cylinder, self.units[u].sector);
            }
            CMD_READ_NEXT | CMD_WRITE_NEXT => {
                let write = function == CMD_WRITE_NEXT;
                let unit = &self.units[u];
                self.ca = current_address(unit.cylinder, unit.sector);
                if unit.sector != self.requested_sector() {
                    self.status |= STA_SECTOR_ERROR;
                } else if write && unit.is_write_protected() {
                    self.status |= STA_WRITE_PROTECT | STA_WRITE_FAULT;
                } else {
                    result = self.transfer(u, write, ctx);
                    if result.is_err() {
                        self.status |= STA_ERROR;
                    }
                }
            }
            CMD_FORMAT_0 | CMD_FORMAT_NEXT => {}
            _ => self.status |= STA_ILLEGAL | STA_ERROR,
        }

        if self.units[u].cylinder == 0 {
            self.status |= STA_TRACK0;
        } else {
            self.status &= !STA_TRACK0;
        }
        if self.status & STA_GENERAL != 0 {
            self.status |= STA_ERROR;
        }
        debug!("DKT{}: command {:03o} done at cyl {} sector {}, status {:06o}.", u, function,
               self.units[u].cylinder, self.units[u].sector, self.status);
        Self::complete(ctx);
        result.map_err(DiskError::from)
    }

    fn reset(&mut self, ctx: &mut IoContext<'_>) {
        ctx.lines.reset_device(DEV_DKT);
        self.sc = 0;
        self.ma = 0;
        self.ca = 0;
        self.rom_address = 0;
        self.status = 0;
        for (u, unit) in self.units.iter_mut().enumerate() {
            ctx.scheduler.cancel(Self::target(u));
            unit.cylinder = 0;
            unit.sector = 0;
            unit.function = 0;
        }
        let timer = Self::target(TIMER_UNIT);
        ctx.scheduler.cancel(timer);
        ctx.scheduler.activate(timer, self.timing.sector);
        info!("DKT reset.");
    }

    fn units(&self) -> &[DiskUnit] {
        &self.units
    }

    fn units_mut(&mut self) -> &mut [DiskUnit] {
        &mut self.units
    }
}
