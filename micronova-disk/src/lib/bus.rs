//! The Micronova programmed-I/O bus: pulse and transfer codes, the shared
//! busy/done/interrupt flip-flops, and I/O instruction decoding.

use log::trace;

/// Device code of the 6095 fixed-disk controller.
pub const DEV_DHP: u8 = 0o27;
/// Device code of the 6038 floppy controller.
pub const DEV_DKT: u8 = 0o33;
/// The processor itself; DICC CPU is IORST.
pub const DEV_CPU: u8 = 0o77;

const DEVICE_MASK: u16 = 0o77;

/// Control pulse accompanying an I/O instruction (IR<8:9>).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    None,
    Start,
    Clear,
    Pulse,
}

impl Pulse {
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0o3 {
            0 => Pulse::None,
            1 => Pulse::Start,
            2 => Pulse::Clear,
            _ => Pulse::Pulse,
        }
    }

    /// Mnemonic suffix, as written after the instruction name.
    pub fn suffix(self) -> &'static str {
        match self {
            Pulse::None => "",
            Pulse::Start => "S",
            Pulse::Clear => "C",
            Pulse::Pulse => "P",
        }
    }
}

/// Transfer code of an I/O instruction (IR<5:7>).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoCode {
    Nio,
    Dia,
    Doa,
    Dib,
    Dob,
    Dic,
    Doc,
    Skp,
}

impl IoCode {
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0o7 {
            0 => IoCode::Nio,
            1 => IoCode::Dia,
            2 => IoCode::Doa,
            3 => IoCode::Dib,
            4 => IoCode::Dob,
            5 => IoCode::Dic,
            6 => IoCode::Doc,
            _ => IoCode::Skp,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            IoCode::Nio => "NIO",
            IoCode::Dia => "DIA",
            IoCode::Doa => "DOA",
            IoCode::Dib => "DIB",
            IoCode::Dob => "DOB",
            IoCode::Dic => "DIC",
            IoCode::Doc => "DOC",
            IoCode::Skp => "SKP",
        }
    }

    /// Does this code return a value to the accumulator?
    pub fn is_input(self) -> bool {
        matches!(self, IoCode::Dia | IoCode::Dib | IoCode::Dic)
    }
}

/// A decoded I/O instruction: `011 AC code pulse device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoInstruction {
    pub accumulator: u8,
    pub code: IoCode,
    pub pulse: Pulse,
    pub device: u8,
}

impl IoInstruction {
    /// Decode an instruction word, returning None if it is not an I/O
    /// instruction.
    pub fn decode(word: u16) -> Option<Self> {
        if word & 0o160000 != 0o060000 {
            return None;
        }
        Some(IoInstruction {
            accumulator: ((word >> 11) & 0o3) as u8,
            code: IoCode::from_bits(word >> 8),
            pulse: Pulse::from_bits(word >> 6),
            device: (word & DEVICE_MASK) as u8,
        })
    }
}

/// Busy, done, interrupt-disable and interrupt-request flip-flops for every
/// device on the bus, one bit per device code.
#[derive(Debug, Default)]
pub struct InterruptLines {
    busy: u64,
    done: u64,
    disable: u64,
    request: u64,
}

impl InterruptLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn bit(device: u8) -> u64 {
        1 << (device as u16 & DEVICE_MASK)
    }

    pub fn set_busy(&mut self, device: u8) {
        self.busy |= Self::bit(device);
    }

    pub fn clear_busy(&mut self, device: u8) {
        self.busy &= !Self::bit(device);
    }

    pub fn set_done(&mut self, device: u8) {
        self.done |= Self::bit(device);
    }

    pub fn clear_done(&mut self, device: u8) {
        self.done &= !Self::bit(device);
    }

    /// Set or clear the interrupt disable (mask) bit of a device. Takes effect
    /// at the next `update`.
    pub fn set_disable(&mut self, device: u8, disabled: bool) {
        if disabled {
            self.disable |= Self::bit(device);
        } else {
            self.disable &= !Self::bit(device);
        }
    }

    pub fn is_busy(&self, device: u8) -> bool {
        self.busy & Self::bit(device) != 0
    }

    pub fn is_done(&self, device: u8) -> bool {
        self.done & Self::bit(device) != 0
    }

    pub fn is_requesting(&self, device: u8) -> bool {
        self.request & Self::bit(device) != 0
    }

    /// Is any device requesting an interrupt?
    pub fn any_request(&self) -> bool {
        self.request != 0
    }

    /// Recompute the interrupt requests. Must be called after every change to
    /// a done or disable bit.
    pub fn update(&mut self) {
        self.request = self.done & !self.disable;
        trace!("Interrupt requests now {:#018x}.", self.request);
    }

    /// Evaluate an SKP instruction: the pulse field selects BN, BZ, DN or DZ.
    pub fn skip(&self, device: u8, pulse: Pulse) -> bool {
        match pulse {
            Pulse::None => self.is_busy(device),
            Pulse::Start => !self.is_busy(device),
            Pulse::Clear => self.is_done(device),
            Pulse::Pulse => !self.is_done(device),
        }
    }

    /// Drop every flag of one device, as an I/O reset does.
    pub fn reset_device(&mut self, device: u8) {
        self.clear_busy(device);
        self.clear_done(device);
        self.update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_io_instruction() {
        // NIOS DHP from the fixed-disk bootstrap.
        let nios = IoInstruction::decode(0o060127).unwrap();
        assert_eq!(nios.code, IoCode::Nio);
        assert_eq!(nios.pulse, Pulse::Start);
        assert_eq!(nios.device, DEV_DHP);

        // DOAS 2,DKT
        let doas = IoInstruction::decode(0o071100 | DEV_DKT as u16).unwrap();
        assert_eq!(doas.accumulator, 2);
        assert_eq!(doas.code, IoCode::Doa);
        assert_eq!(doas.pulse, Pulse::Start);
        assert_eq!(doas.device, DEV_DKT);

        // JMP 377 is not an I/O instruction.
        assert_eq!(IoInstruction::decode(0o000377), None);
    }

    #[test]
    fn test_interrupt_request_follows_done_and_disable() {
        let mut lines = InterruptLines::new();
        lines.set_done(DEV_DHP);
        assert!(!lines.is_requesting(DEV_DHP));
        lines.update();
        assert!(lines.is_requesting(DEV_DHP));

        lines.set_disable(DEV_DHP, true);
        lines.update();
        assert!(!lines.is_requesting(DEV_DHP));
        assert!(lines.is_done(DEV_DHP));

        lines.set_disable(DEV_DHP, false);
        lines.clear_done(DEV_DHP);
        lines.update();
        assert!(!lines.any_request());
    }

    #[test]
    fn test_skip_conditions() {
        let mut lines = InterruptLines::new();
        lines.set_busy(DEV_DKT);
        assert!(lines.skip(DEV_DKT, Pulse::None));
        assert!(!lines.skip(DEV_DKT, Pulse::Start));
        assert!(!lines.skip(DEV_DKT, Pulse::Clear));
        assert!(lines.skip(DEV_DKT, Pulse::Pulse));
        lines.reset_device(DEV_DKT);
        assert!(lines.skip(DEV_DKT, Pulse::Start));
    }
}
