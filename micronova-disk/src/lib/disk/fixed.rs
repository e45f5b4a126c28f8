//! The 6095 fixed-disk controller.
//!
//! Reads and writes are started with a Start pulse and complete after the
//! rotational latency; seeks are started with a Pulse and complete after a
//! delay proportional to the distance travelled. Seeks on different units may
//! overlap each other and a transfer.

use log::{debug, info, trace};

use crate::bus::{IoCode, Pulse, DEV_DHP};
use crate::error::{DiskError, DiskResult};
use crate::memory::{ADDRESS_MASK, MAP_A, MAP_B};
use crate::scheduler::EventTarget;

use super::disk_interface::*;
use super::geometry::{selected_unit, Command, FCCY_FLAGS, FIXED_DRIVE_TYPES};
use super::unit::DiskUnit;

pub const NUM_UNITS: usize = 4;

// Status register bits.
pub const STA_ERR: u16 = 0o000001;   // Error summary.
pub const STA_DLT: u16 = 0o000002;   // Data late.
pub const STA_CRC: u16 = 0o000004;   // Check error.
pub const STA_UNS: u16 = 0o000010;   // Unsafe.
pub const STA_XCY: u16 = 0o000020;   // Cross cylinder.
pub const STA_CYL: u16 = 0o000040;   // Nonexistent cylinder.
pub const STA_DRDY: u16 = 0o000100;  // Drive ready.
pub const STA_SEEK0: u16 = 0o002000; // Seeking; unit n is SEEK0 >> n.
pub const STA_SKDN0: u16 = 0o040000; // Seek done; unit n is SKDN0 >> n.
pub const STA_DONE: u16 = 0o100000;  // Read/write done.

pub const STA_EFLGS: u16 = STA_ERR | STA_DLT | STA_CRC | STA_UNS | STA_XCY | STA_CYL;
pub const STA_DFLGS: u16 = STA_DONE | STA_SKDN0 | (STA_SKDN0 >> 1)
    | (STA_SKDN0 >> 2) | (STA_SKDN0 >> 3);

/// DOA bit that clears the read/write error flags.
const DOA_CLEAR_ERRORS: u16 = 0o100000;
/// DOB bit that selects data channel map B.
const DOB_MAP_B: u16 = 0o100000;
/// DOC bit that strobes diagnostic mode on drives that have it.
const DOC_DIAGNOSTIC: u16 = 0o010000;
const NEW_ADDRESS_MASK: u16 = 0o177777;

/// Simulated delays, in event-queue time units.
#[derive(Debug, Clone)]
pub struct FixedTiming {
    /// Time per cylinder travelled.
    pub seek: u64,
    /// Rotational latency before a transfer starts.
    pub rotate: u64,
    /// Report bad and overflowing sector numbers as unsafe rather than cross
    /// cylinder, like the earlier revision of the controller did.
    pub legacy_sector_errors: bool,
}

impl Default for FixedTiming {
    fn default() -> Self {
        FixedTiming {
            seek: 100,
            rotate: 100,
            legacy_sector_errors: false,
        }
    }
}

pub struct FixedDiskController {
    fccy: u16,
    ussc: u16,
    ma: u16,
    map: u8,
    status: u16,
    diagnostic_mode: bool,
    timing: FixedTiming,
    units: Vec<DiskUnit>,
}

impl FixedDiskController {
    pub fn new() -> Self {
        Self::with_timing(FixedTiming::default())
    }

    pub fn with_timing(timing: FixedTiming) -> Self {
        FixedDiskController {
            fccy: 0,
            ussc: 0,
            ma: 0,
            map: MAP_A,
            status: 0,
            diagnostic_mode: false,
            timing,
            units: (0..NUM_UNITS).map(|u| DiskUnit::new(u, &FIXED_DRIVE_TYPES)).collect(),
        }
    }

    pub fn timing(&self) -> &FixedTiming {
        &self.timing
    }

    pub fn timing_mut(&mut self) -> &mut FixedTiming {
        &mut self.timing
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn fccy(&self) -> u16 {
        self.fccy
    }

    pub fn ussc(&self) -> u16 {
        self.ussc
    }

    pub fn memory_address(&self) -> u16 {
        self.ma
    }

    pub fn map(&self) -> u8 {
        self.map
    }

    pub fn diagnostic_mode(&self) -> bool {
        self.diagnostic_mode
    }

    pub fn unit(&self, unit: usize) -> DiskResult<&DiskUnit> {
        self.units.get(unit).ok_or(DiskError::NoSuchUnit(unit))
    }

    pub fn unit_mut(&mut self, unit: usize) -> DiskResult<&mut DiskUnit> {
        self.units.get_mut(unit).ok_or(DiskError::NoSuchUnit(unit))
    }

    fn target(unit: usize) -> EventTarget {
        EventTarget::new(DEV_DHP, unit)
    }

    fn sector_error(&self) -> u16 {
        if self.timing.legacy_sector_errors { STA_UNS } else { STA_XCY }
    }

    /// Finish a rejected or completed command: raise done and the interrupt.
    fn complete(ctx: &mut IoContext<'_>) {
        ctx.lines.clear_busy(DEV_DHP);
        ctx.lines.set_done(DEV_DHP);
        ctx.lines.update();
    }

    /// Validate and launch the command in FCCY on the selected unit. Returns
    /// false if the command was rejected.
    fn go(&mut self, pulse: Pulse, ctx: &mut IoContext<'_>) -> bool {
        self.status &= !STA_EFLGS;
        let u = selected_unit(self.ussc);
        let target = Self::target(u);
        if !self.units[u].is_attached() || ctx.scheduler.is_active(target) {
            self.status |= STA_ERR;
            return false;
        }

        if self.diagnostic_mode {
            // The command is absorbed; diagnostic mode stays on until a Pulse.
            self.status |= STA_DONE;
            Self::complete(ctx);
            debug!("DHP{}: command absorbed in diagnostic mode.", u);
            return true;
        }

        let sector_error = self.sector_error();
        let unit = &mut self.units[u];
        let drive_type = unit.drive_type();
        let layout = drive_type.layout();
        let old_cylinder = unit.cylinder;
        let fields = layout.decode_command(self.fccy);
        unit.function = fields.command.code();
        unit.cylinder = fields.cylinder;

        match fields.command {
            Command::Read | Command::Write => {
                let position = layout.decode_unit(self.ussc);
                debug!("DHP{}: {} cyl={} surf={} sect={} count={} ma={:06o}.", u,
                       fields.command.name(), fields.cylinder, position.surface,
                       position.sector, position.sectors_to_transfer(), self.ma);
                if !unit.is_attached()
                        || (fields.command == Command::Write && unit.is_write_protected()) {
                    self.status |= STA_DONE | STA_ERR;
                } else if fields.cylinder >= drive_type.cylinders {
                    self.status |= STA_DONE | STA_ERR | STA_CYL;
                } else if position.surface >= drive_type.surfaces {
                    self.status |= STA_DONE | STA_ERR | STA_UNS;
                } else if position.sector >= drive_type.sectors {
                    self.status |= STA_DONE | STA_ERR | sector_error;
                }
                if pulse != Pulse::Start || self.status & STA_ERR != 0 {
                    return false;
                }
                ctx.scheduler.activate(target, self.timing.rotate);
            }
            Command::Seek | Command::Recalibrate => {
                if fields.command == Command::Recalibrate {
                    unit.function = Command::Seek.code();
                    unit.cylinder = 0;
                }
                debug!("DHP{}: seek from cyl {} to cyl {}.", u, old_cylinder, unit.cylinder);
                if !unit.is_attached() {
                    self.status |= STA_DONE | STA_ERR;
                } else if unit.cylinder >= drive_type.cylinders {
                    self.status |= STA_ERR | STA_CYL;
                }
                if pulse != Pulse::Pulse || self.status & STA_ERR != 0 {
                    return false;
                }
                self.status |= STA_SEEK0 >> u;
                let mut distance = old_cylinder.abs_diff(unit.cylinder) as u64;
                if self.timing.seek != 0 && distance == 0 {
                    distance = 1;
                }
                ctx.scheduler.activate(target, self.timing.seek * distance);
            }
        }
        true
    }

    /// Transfer sectors until the residual count runs out or the surface
    /// overflows. Stops at the first backing store error.
    fn transfer(&mut self, u: usize, write: bool, ctx: &mut IoContext<'_>) -> std::io::Result<()> {
        let sector_error = self.sector_error();
        let unit = &mut self.units[u];
        let drive_type = unit.drive_type();
        let layout = drive_type.layout();
        let mut buf = [0u16; WORDS_PER_SECTOR];

        loop {
            let position = layout.decode_unit(self.ussc);
            let block = drive_type.linear_block_address(
                unit.cylinder, position.surface, position.sector);
            trace!("DHP{}: {} cyl={} surf={} sect={} block={} ma={:06o}.", u,
                   if write { "write" } else { "read" }, unit.cylinder,
                   position.surface, position.sector, block, self.ma);
            if write {
                copy_from_memory(ctx.memory, self.map, &mut self.ma, &mut buf);
                unit.write_sector(block, &buf)?;
            } else {
                unit.read_sector(block, &mut buf)?;
                copy_to_memory(ctx.memory, self.map, &mut self.ma, &buf);
            }

            // Sector overflow carries into the surface before repacking.
            let mut surface = position.surface;
            let mut sector = position.sector + 1;
            if sector >= drive_type.sectors {
                surface = (surface + 1) & layout.surface_mask();
                sector = 0;
            }
            self.ussc = layout.advance_unit(self.ussc, 1, surface, sector);
            if layout.decode_unit(self.ussc).count == 0 {
                break;
            }
            if surface >= drive_type.surfaces {
                self.status |= STA_DONE | STA_ERR | sector_error;
                debug!("DHP{}: transfer ran off the last surface.", u);
                break;
            }
        }
        Ok(())
    }
}

impl Default for FixedDiskController {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskController for FixedDiskController {
    fn device(&self) -> u8 {
        DEV_DHP
    }

    fn io(&mut self, pulse: Pulse, code: IoCode, ac: u16, ctx: &mut IoContext<'_>) -> u16 {
        let u = selected_unit(self.ussc);
        let drive_type = self.units[u].drive_type();
        let busy = ctx.lines.is_busy(DEV_DHP);
        let mut result = 0;

        match code {
            IoCode::Dia => {
                self.status &= !STA_DRDY;
                if self.units[u].is_attached() {
                    self.status |= STA_DRDY;
                }
                if self.units[u].cylinder >= drive_type.cylinders {
                    self.status |= STA_CYL;
                }
                if self.status & STA_EFLGS != 0 {
                    self.status |= STA_ERR;
                }
                result = self.status;
            }
            IoCode::Doa => {
                if ac & DOA_CLEAR_ERRORS != 0 {
                    self.status &= !(STA_CYL | STA_XCY | STA_UNS | STA_CRC);
                }
                if !busy {
                    self.fccy = ac;
                    self.status &= !(ac & FCCY_FLAGS);
                }
                ctx.lines.clear_done(DEV_DHP);
                if self.status & STA_DFLGS != 0 {
                    ctx.lines.set_done(DEV_DHP);
                }
                ctx.lines.update();
            }
            IoCode::Dib => result = self.ma & ADDRESS_MASK,
            IoCode::Dob => {
                if !busy {
                    self.ma = ac & if drive_type.new_format { NEW_ADDRESS_MASK } else { ADDRESS_MASK };
                    self.map = if ac & DOB_MAP_B != 0 { MAP_B } else { MAP_A };
                }
            }
            IoCode::Dic => result = self.ussc,
            IoCode::Doc => {
                if !busy {
                    self.ussc = ac;
                }
                if drive_type.diagnostic && ac & DOC_DIAGNOSTIC != 0 {
                    self.diagnostic_mode = true;
                    debug!("DHP: diagnostic mode on.");
                }
            }
            IoCode::Nio | IoCode::Skp => {}
        }
        trace!("DHP {}{} {:06o} -> {:06o} (status {:06o}).", code.mnemonic(), pulse.suffix(),
               ac, result, self.status);

        let u = selected_unit(self.ussc);
        match pulse {
            Pulse::None => {}
            Pulse::Start => {
                ctx.lines.set_busy(DEV_DHP);
                ctx.lines.clear_done(DEV_DHP);
                ctx.lines.update();
                if !self.go(pulse, ctx) {
                    Self::complete(ctx);
                    self.status |= STA_DONE;
                }
            }
            Pulse::Clear => {
                ctx.lines.clear_busy(DEV_DHP);
                ctx.lines.clear_done(DEV_DHP);
                ctx.lines.update();
                self.status &= !(STA_DFLGS | STA_EFLGS);
                if self.units[u].function != Command::Seek.code() {
                    ctx.scheduler.cancel(Self::target(u));
                }
            }
            Pulse::Pulse => {
                let launched = if self.diagnostic_mode {
                    self.diagnostic_mode = false;
                    debug!("DHP: diagnostic mode off.");
                    false
                } else {
                    ctx.lines.clear_done(DEV_DHP);
                    ctx.lines.update();
                    self.go(pulse, ctx)
                };
                if !launched {
                    ctx.lines.set_done(DEV_DHP);
                    ctx.lines.update();
                    self.status |= STA_SKDN0 >> u;
                }
            }
        }
        result
    }

    fn service(&mut self, u: usize, ctx: &mut IoContext<'_>) -> DiskResult<()> {
        let unit = &self.units[u];
        let drive_type = unit.drive_type();

        if unit.function == Command::Seek.code() {
            if !unit.is_attached() {
                self.status |= STA_DONE | STA_ERR;
            } else if unit.cylinder >= drive_type.cylinders {
                self.status |= STA_ERR | STA_CYL;
            }
            ctx.lines.set_done(DEV_DHP);
            ctx.lines.update();
            self.status = (self.status | (STA_SKDN0 >> u)) & !(STA_SEEK0 >> u);
            debug!("DHP{}: seek done at cyl {}.", u, unit.cylinder);
            return Ok(());
        }

        let write = unit.function == Command::Write.code();
        let position = drive_type.layout().decode_unit(self.ussc);
        let mut result = Ok(());
        if !unit.is_attached() || (write && unit.is_write_protected()) {
            self.status |= STA_DONE | STA_ERR;
        } else if unit.cylinder >= drive_type.cylinders {
            // Busy stays set, as on the real controller.
            self.status |= STA_DONE | STA_ERR | STA_CYL;
            ctx.lines.set_done(DEV_DHP);
            ctx.lines.update();
            return Ok(());
        } else if position.surface >= drive_type.surfaces {
            self.status |= STA_DONE | STA_ERR | STA_UNS;
        } else if position.sector >= drive_type.sectors {
            self.status |= STA_DONE | STA_ERR | self.sector_error();
        } else {
            result = self.transfer(u, write, ctx);
            self.status |= STA_DONE;
            if result.is_err() {
                self.status |= STA_ERR;
            }
        }

        debug!("DHP{}: {} done, status {:06o}, ussc {:06o}, ma {:06o}.", u,
               if write { "write" } else { "read" }, self.status, self.ussc, self.ma);
        Self::complete(ctx);
        result.map_err(DiskError::from)
    }

    fn reset(&mut self, ctx: &mut IoContext<'_>) {
        ctx.lines.reset_device(DEV_DHP);
        self.fccy = 0;
        self.ussc = 0;
        self.ma = 0;
        self.map = MAP_A;
        self.status = 0;
        self.diagnostic_mode = false;
        for (u, unit) in self.units.iter_mut().enumerate() {
            ctx.scheduler.cancel(Self::target(u));
            unit.cylinder = 0;
            unit.function = 0;
        }
        info!("DHP reset.");
    }

    fn units(&self) -> &[DiskUnit] {
        &self.units
    }

    fn units_mut(&mut self) -> &mut [DiskUnit] {
        &mut self.units
    }
}
