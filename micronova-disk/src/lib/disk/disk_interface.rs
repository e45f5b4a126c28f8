use crate::bus::{InterruptLines, IoCode, Pulse};
use crate::error::DiskResult;
use crate::memory::{Memory, ADDRESS_MASK};
use crate::scheduler::Scheduler;

use super::unit::DiskUnit;

/// Words in one sector, for both controllers.
pub const WORDS_PER_SECTOR: usize = 256;
/// Bytes per word in a disk image (little-endian).
pub const BYTES_PER_WORD: u64 = 2;

/// The machine state a controller may touch while handling an I/O
/// instruction or an event.
pub struct IoContext<'a> {
    pub scheduler: &'a mut Scheduler,
    pub memory: &'a mut Memory,
    pub lines: &'a mut InterruptLines,
}

pub trait DiskController {
    /// Device code on the I/O bus.
    fn device(&self) -> u8;

    /// Execute one I/O instruction addressed to this controller. Returns the
    /// value for the accumulator; only meaningful for input codes.
    fn io(&mut self, pulse: Pulse, code: IoCode, ac: u16, ctx: &mut IoContext<'_>) -> u16;

    /// Complete the pending event of one unit.
    fn service(&mut self, unit: usize, ctx: &mut IoContext<'_>) -> DiskResult<()>;

    /// I/O reset: clear all registers and flags and cancel pending events.
    fn reset(&mut self, ctx: &mut IoContext<'_>);

    fn units(&self) -> &[DiskUnit];

    fn units_mut(&mut self) -> &mut [DiskUnit];
}

/// Copy a sector buffer into memory through a data channel map, advancing
/// the memory address counter.
pub(crate) fn copy_to_memory(memory: &mut Memory, map: u8, address: &mut u16, words: &[u16]) {
    for &word in words {
        let physical = memory.map_address(map, *address);
        memory.write(physical, word);
        *address = address.wrapping_add(1) & ADDRESS_MASK;
    }
}

/// Fill a sector buffer from memory through a data channel map, advancing
/// the memory address counter.
pub(crate) fn copy_from_memory(memory: &Memory, map: u8, address: &mut u16, words: &mut [u16]) {
    for word in words.iter_mut() {
        let physical = memory.map_address(map, *address);
        *word = memory.read(physical);
        *address = address.wrapping_add(1) & ADDRESS_MASK;
    }
}
