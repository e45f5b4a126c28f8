use log::{debug, trace};

use crate::bus::{InterruptLines, IoCode, IoInstruction, Pulse, DEV_CPU, DEV_DHP, DEV_DKT};
use crate::disk::{DiskController, FixedDiskController, FloppyController, IoContext};
use crate::error::DiskResult;
use crate::memory::Memory;
use crate::scheduler::{EventTarget, Scheduler};

/// The parts of a Micronova the storage controllers connect to: memory, the
/// I/O bus flags and the event queue, plus one controller of each kind.
pub struct Machine {
    memory: Memory,
    lines: InterruptLines,
    scheduler: Scheduler,
    fixed: FixedDiskController,
    floppy: FloppyController,
}

impl Machine {
    /// A machine with default memory and controllers, freshly reset.
    pub fn new() -> Self {
        Self::with_parts(Memory::default(), FixedDiskController::new(), FloppyController::new())
    }

    pub fn with_parts(memory: Memory, fixed: FixedDiskController, floppy: FloppyController) -> Self {
        let mut machine = Machine {
            memory,
            lines: InterruptLines::new(),
            scheduler: Scheduler::new(),
            fixed,
            floppy,
        };
        machine.reset();
        machine
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn lines(&self) -> &InterruptLines {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut InterruptLines {
        &mut self.lines
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn fixed(&self) -> &FixedDiskController {
        &self.fixed
    }

    pub fn fixed_mut(&mut self) -> &mut FixedDiskController {
        &mut self.fixed
    }

    pub fn floppy(&self) -> &FloppyController {
        &self.floppy
    }

    pub fn floppy_mut(&mut self) -> &mut FloppyController {
        &mut self.floppy
    }

    /// Run `f` against the controller at `device`, with the machine state
    /// it is allowed to touch.
    fn with_controller<R>(&mut self, device: u8,
                          f: impl FnOnce(&mut dyn DiskController, &mut IoContext<'_>) -> R) -> Option<R> {
        let mut ctx = IoContext {
            scheduler: &mut self.scheduler,
            memory: &mut self.memory,
            lines: &mut self.lines,
        };
        match device {
            DEV_DHP => Some(f(&mut self.fixed, &mut ctx)),
            DEV_DKT => Some(f(&mut self.floppy, &mut ctx)),
            _ => None,
        }
    }

    /// I/O reset (IORST): reset every controller.
    pub fn reset(&mut self) {
        self.with_controller(DEV_DHP, |c, ctx| c.reset(ctx));
        self.with_controller(DEV_DKT, |c, ctx| c.reset(ctx));
    }

    /// Perform one I/O transfer. SKP is answered from the bus flags and
    /// returns 1 if the skip condition holds. Returns None if no controller
    /// answers to `device`.
    pub fn io(&mut self, device: u8, pulse: Pulse, code: IoCode, ac: u16) -> Option<u16> {
        if device == DEV_CPU && code == IoCode::Dic && pulse == Pulse::Clear {
            debug!("IORST.");
            self.reset();
            return Some(0);
        }
        if code == IoCode::Skp {
            return match device {
                DEV_DHP | DEV_DKT => Some(self.lines.skip(device, pulse) as u16),
                _ => None,
            };
        }
        self.with_controller(device, |c, ctx| c.io(pulse, code, ac, ctx))
    }

    /// Execute an I/O instruction word with `ac` as the accumulator value.
    pub fn execute(&mut self, instruction: u16, ac: u16) -> Option<u16> {
        let decoded = IoInstruction::decode(instruction)?;
        trace!("Executing {:06o}: {:?}.", instruction, decoded);
        self.io(decoded.device, decoded.pulse, decoded.code, ac)
    }

    fn fire(&mut self, target: EventTarget) -> DiskResult<()> {
        trace!("t={}: event for {:?}.", self.scheduler.now(), target);
        self.with_controller(target.device, |c, ctx| c.service(target.unit, ctx))
            .unwrap_or(Ok(()))
    }

    /// Fire the next pending event, whenever it is due.
    pub fn step(&mut self) -> DiskResult<Option<EventTarget>> {
        match self.scheduler.pop_due(u64::MAX) {
            Some(target) => {
                self.fire(target)?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// Let `time` units of virtual time pass, firing every event that comes
    /// due. Stops at the first backing store failure.
    pub fn run_for(&mut self, time: u64) -> DiskResult<()> {
        let deadline = self.scheduler.now() + time;
        while let Some(target) = self.scheduler.pop_due(deadline) {
            self.fire(target)?;
        }
        self.scheduler.advance_to(deadline);
        Ok(())
    }

    /// Fire events until `condition` holds or `limit` units of time have
    /// passed. Returns whether the condition was met.
    pub fn run_until<F>(&mut self, limit: u64, mut condition: F) -> DiskResult<bool>
    where
        F: FnMut(&Machine) -> bool,
    {
        let deadline = self.scheduler.now() + limit;
        loop {
            if condition(self) {
                return Ok(true);
            }
            match self.scheduler.pop_due(deadline) {
                Some(target) => self.fire(target)?,
                None => {
                    self.scheduler.advance_to(deadline);
                    let met = condition(self);
                    debug!("Ran to t={} without events; condition {}.", deadline,
                           if met { "met" } else { "not met" });
                    return Ok(met);
                }
            }
        }
    }

    /// Fire events until `device` raises its done flag.
    pub fn run_until_done(&mut self, device: u8, limit: u64) -> DiskResult<bool> {
        self.run_until(limit, |m| m.lines.is_done(device))
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::fixed::{STA_DONE, STA_EFLGS};
    use crate::disk::floppy::{specify_command, CMD_READ_NEXT, TIMER_UNIT};
    use crate::disk::geometry::{Command, CommandFields, UnitFields, OLD_LAYOUT, TYPE_6038, TYPE_6095};
    use crate::disk::FailingStore;
    use crate::error::DiskError;
    use crate::init_test_logging;
    use micronova_utils::write_words::WriteWords;
    use ntest::timeout;
    use std::fs;

    /// A machine with image files on fixed unit 0 and floppy unit 0.
    struct MachineFixture {
        machine: Machine,
        _temp_dir: tempfile::TempDir,
    }

    impl MachineFixture {
        fn new() -> Self {
            init_test_logging();
            let temp_dir = tempfile::tempdir().unwrap();
            let fixed_path = temp_dir.path().join("fixed.img");
            let floppy_path = temp_dir.path().join("floppy.img");
            fs::write(&fixed_path, vec![0u8; TYPE_6095.size_bytes() as usize]).unwrap();

            // Sector 2 of track 0 holds a recognisable pattern.
            let mut floppy = vec![0u8; TYPE_6038.size_bytes() as usize];
            let offset = 2 * 512;
            let mut sector = &mut floppy[offset..offset + 512];
            let words: Vec<u16> = (0..256).map(|i| 0o100000 | i).collect();
            sector.write_words(&words).unwrap();
            fs::write(&floppy_path, floppy).unwrap();

            let mut machine = Machine::new();
            machine.fixed_mut().unit_mut(0).unwrap().attach_file(&fixed_path, false).unwrap();
            machine.floppy_mut().unit_mut(0).unwrap().attach_file(&floppy_path, false).unwrap();
            MachineFixture {
                machine,
                _temp_dir: temp_dir,
            }
        }
    }

    #[test]
    fn test_unknown_device_does_not_answer() {
        let mut machine = Machine::new();
        assert_eq!(machine.io(0o10, Pulse::None, IoCode::Dia, 0), None);
        assert_eq!(machine.io(0o10, Pulse::Clear, IoCode::Skp, 0), None);
        // JMP is not an I/O instruction.
        assert_eq!(machine.execute(0o000377, 0), None);
    }

    #[test]
    fn test_iorst() {
        init_test_logging();
        let mut machine = Machine::new();
        machine.io(DEV_DKT, Pulse::Start, IoCode::Nio, 0).unwrap();
        assert!(machine.lines().is_done(DEV_DKT));
        // IORST is DICC 0,CPU.
        assert_eq!(machine.execute(0o062677, 0), Some(0));
        assert!(!machine.lines().is_done(DEV_DKT));
    }

    #[test]
    #[timeout(2000)]
    fn test_fixed_disk_through_instructions() {
        let mut fixture = MachineFixture::new();
        let machine = &mut fixture.machine;
        let data: Vec<u16> = (0..512).map(|_| rand::random()).collect();
        machine.memory_mut().load(0o3000, &data);

        let ussc = OLD_LAYOUT.encode_unit(&UnitFields {
            unit: 0, surface: 2, sector: 6, count: UnitFields::count_for(2),
        });
        let write = OLD_LAYOUT.encode_command(&CommandFields { command: Command::Write, cylinder: 300 });
        let read = OLD_LAYOUT.encode_command(&CommandFields { command: Command::Read, cylinder: 300 });

        // DOB 0,DHP; DOC 0,DHP; DOAS 0,DHP
        machine.execute(0o062000 | DEV_DHP as u16, 0o3000).unwrap();
        machine.execute(0o063000 | DEV_DHP as u16, ussc).unwrap();
        machine.execute(0o061100 | DEV_DHP as u16, write).unwrap();
        // SKPBN DHP
        assert_eq!(machine.execute(0o063400 | DEV_DHP as u16, 0), Some(1));
        assert!(machine.run_until_done(DEV_DHP, 1000).unwrap());
        // SKPDN DHP
        assert_eq!(machine.execute(0o063600 | DEV_DHP as u16, 0), Some(1));
        assert_eq!(machine.now(), 100);

        machine.execute(0o062000 | DEV_DHP as u16, 0o20000).unwrap();
        machine.execute(0o063000 | DEV_DHP as u16, ussc).unwrap();
        machine.execute(0o061100 | DEV_DHP as u16, read).unwrap();
        assert!(machine.run_until_done(DEV_DHP, 1000).unwrap());
        // DIA 0,DHP
        let status = machine.execute(0o060400 | DEV_DHP as u16, 0).unwrap();
        assert_eq!(status & (STA_DONE | STA_EFLGS), STA_DONE);
        for (i, &word) in data.iter().enumerate() {
            assert_eq!(machine.memory()[0o20000 + i], word);
        }
    }

    #[test]
    #[timeout(2000)]
    fn test_both_controllers_share_the_clock() {
        let mut fixture = MachineFixture::new();
        let machine = &mut fixture.machine;

        // A long seek on the fixed disk and a floppy read interleave.
        let seek = OLD_LAYOUT.encode_command(&CommandFields { command: Command::Seek, cylinder: 12 });
        machine.io(DEV_DHP, Pulse::Pulse, IoCode::Doa, seek).unwrap();
        machine.io(DEV_DKT, Pulse::None, IoCode::Dob, 0o400).unwrap();
        machine.floppy_mut().timing_mut().wait_for_sector = true;
        machine.io(DEV_DKT, Pulse::Start, IoCode::Doa, specify_command(CMD_READ_NEXT, 2, 0)).unwrap();

        assert!(machine.run_until_done(DEV_DKT, 5000).unwrap());
        assert_eq!(machine.now(), 1495);
        assert!(machine.lines().is_done(DEV_DHP));
        assert_eq!(machine.fixed().unit(0).unwrap().cylinder(), 12);
        assert_eq!(machine.memory()[0o400], 0o100000);
        assert_eq!(machine.memory()[0o777], 0o100377);
    }

    #[test]
    fn test_run_for_keeps_sector_timer_running() {
        let mut machine = Machine::new();
        machine.run_for(2250).unwrap();
        assert_eq!(machine.now(), 2250);
        assert_eq!(machine.floppy().unit(0).unwrap().sector(), 4);
        assert_eq!(machine.scheduler().time_remaining(EventTarget::new(DEV_DKT, TIMER_UNIT)),
                   Some(250));
        assert_eq!(machine.step().unwrap(), Some(EventTarget::new(DEV_DKT, TIMER_UNIT)));
        assert_eq!(machine.now(), 2500);
    }

    #[test]
    fn test_io_failure_stops_the_run() {
        init_test_logging();
        let mut machine = Machine::new();
        machine.fixed_mut().unit_mut(1).unwrap().attach(FailingStore::new(), false).unwrap();
        let ussc = OLD_LAYOUT.encode_unit(&UnitFields { unit: 1, surface: 0, sector: 0, count: 15 });
        machine.io(DEV_DHP, Pulse::None, IoCode::Doc, ussc).unwrap();
        machine.io(DEV_DHP, Pulse::Start, IoCode::Doa, 0).unwrap();
        assert!(matches!(machine.run_for(1000), Err(DiskError::Io(_))));
        assert_eq!(machine.now(), 100);
        assert!(machine.lines().is_done(DEV_DHP));
    }

    #[test]
    fn test_reset_cancels_everything() {
        let mut fixture = MachineFixture::new();
        let machine = &mut fixture.machine;
        let seek = OLD_LAYOUT.encode_command(&CommandFields { command: Command::Seek, cylinder: 40 });
        machine.io(DEV_DHP, Pulse::Pulse, IoCode::Doa, seek).unwrap();
        machine.io(DEV_DKT, Pulse::Start, IoCode::Doa, specify_command(CMD_READ_NEXT, 1, 0)).unwrap();
        machine.run_for(300).unwrap();
        machine.reset();
        assert!(!machine.lines().is_busy(DEV_DKT));
        // Only the sector timer is left.
        assert_eq!(machine.step().unwrap(), Some(EventTarget::new(DEV_DKT, TIMER_UNIT)));
        assert_eq!(machine.now(), 800);
        assert_eq!(machine.fixed().unit(0).unwrap().cylinder(), 0);
    }
}
