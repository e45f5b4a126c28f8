//! Drive types and the bit layouts of the fixed-disk command registers.
//!
//! Two generations of drive pack the command/cylinder (FCCY) and
//! unit/surface/sector/count (USSC) registers differently. Each drive type
//! names its layout, and the controller goes through that `RegisterLayout` for
//! every field access instead of testing the generation at each site.

use super::disk_interface::{BYTES_PER_WORD, WORDS_PER_SECTOR};

/// Static description of one drive type.
#[derive(Debug, PartialEq, Eq)]
pub struct DriveType {
    pub name: &'static str,
    pub sectors: u16,
    pub surfaces: u16,
    pub cylinders: u16,
    /// Uses the revised register layout.
    pub new_format: bool,
    /// Honours the diagnostic-mode strobe on DOC.
    pub diagnostic: bool,
}

impl DriveType {
    /// Number of sectors on the drive.
    pub fn blocks(&self) -> u64 {
        self.sectors as u64 * self.surfaces as u64 * self.cylinders as u64
    }

    /// Capacity in words.
    pub fn size_words(&self) -> u64 {
        self.blocks() * WORDS_PER_SECTOR as u64
    }

    /// Capacity in bytes of a disk image.
    pub fn size_bytes(&self) -> u64 {
        self.size_words() * BYTES_PER_WORD
    }

    /// Linear sector number of a cylinder/surface/sector triple.
    pub fn linear_block_address(&self, cylinder: u16, surface: u16, sector: u16) -> u64 {
        (cylinder as u64 * self.surfaces as u64 + surface as u64) * self.sectors as u64
            + sector as u64
    }

    pub fn layout(&self) -> &'static RegisterLayout {
        if self.new_format {
            &NEW_LAYOUT
        } else {
            &OLD_LAYOUT
        }
    }
}

pub const TYPE_6095: DriveType = DriveType {
    name: "6095",
    sectors: 12,
    surfaces: 4,
    cylinders: 408,
    new_format: false,
    diagnostic: false,
};

pub const TYPE_6099: DriveType = DriveType {
    name: "6099",
    sectors: 32,
    surfaces: 4,
    cylinders: 192,
    new_format: true,
    diagnostic: true,
};

pub const TYPE_6103: DriveType = DriveType {
    name: "6103",
    sectors: 32,
    surfaces: 8,
    cylinders: 192,
    new_format: true,
    diagnostic: true,
};

pub const TYPE_6038: DriveType = DriveType {
    name: "6038",
    sectors: 8,
    surfaces: 1,
    cylinders: 77,
    new_format: false,
    diagnostic: false,
};

/// Drive types the fixed-disk controller accepts, smallest first so that
/// autosizing picks the first one large enough.
pub static FIXED_DRIVE_TYPES: [DriveType; 3] = [TYPE_6095, TYPE_6099, TYPE_6103];

/// Drive types the floppy controller accepts.
pub static FLOPPY_DRIVE_TYPES: [DriveType; 1] = [TYPE_6038];

/// Look up a drive type by name.
pub fn find_drive_type(table: &'static [DriveType], name: &str) -> Option<&'static DriveType> {
    table.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// The first drive type that can hold an image of `bytes` bytes.
pub fn autosize(table: &'static [DriveType], bytes: u64) -> Option<&'static DriveType> {
    table.iter().find(|t| bytes <= t.size_bytes())
}

/// Fixed-disk controller commands (FCCY command field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read,
    Write,
    Seek,
    Recalibrate,
}

impl Command {
    pub fn from_code(code: u16) -> Self {
        match code & 0o3 {
            0 => Command::Read,
            1 => Command::Write,
            2 => Command::Seek,
            _ => Command::Recalibrate,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Command::Read => 0,
            Command::Write => 1,
            Command::Seek => 2,
            Command::Recalibrate => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Read => "read",
            Command::Write => "write",
            Command::Seek => "seek",
            Command::Recalibrate => "recal",
        }
    }
}

/// Decoded FCCY register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFields {
    pub command: Command,
    pub cylinder: u16,
}

/// Decoded USSC register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitFields {
    pub unit: usize,
    pub surface: u16,
    pub sector: u16,
    /// Residual count, counting up to zero: 15 means one sector left, 0 means
    /// sixteen.
    pub count: u16,
}

impl UnitFields {
    /// Number of sectors a transfer with this residual count moves.
    pub fn sectors_to_transfer(&self) -> u16 {
        16 - (self.count & USSC_COUNT_MASK)
    }

    /// Residual count field for a transfer of `sectors` sectors (1 to 16).
    pub fn count_for(sectors: u16) -> u16 {
        16u16.wrapping_sub(sectors) & USSC_COUNT_MASK
    }
}

const USSC_COUNT_MASK: u16 = 0o17;
const USSC_UNIT_SHIFT: u16 = 14;
const USSC_UNIT_MASK: u16 = 0o3;

/// Flag bits of FCCY; writing them clears the matching done flags.
pub const FCCY_FLAGS: u16 = 0o174000;

/// Bit positions of the generation-dependent register fields.
#[derive(Debug)]
pub struct RegisterLayout {
    cylinder_mask: u16,
    command_shift: u16,
    /// Old layout: bit 10 extends the cylinder to 9 bits.
    cylinder_extend: Option<u16>,
    sector_shift: u16,
    sector_mask: u16,
    surface_shift: u16,
    surface_mask: u16,
}

/// Old layout: cylinder 0-7, command 8-9, cylinder extend 10; sector
/// 4-7, surface 8-13.
pub static OLD_LAYOUT: RegisterLayout = RegisterLayout {
    cylinder_mask: 0o377,
    command_shift: 8,
    cylinder_extend: Some(10),
    sector_shift: 4,
    sector_mask: 0o17,
    surface_shift: 8,
    surface_mask: 0o77,
};

/// Revised layout: cylinder 0-8, command 9-10; sector 4-8, surface 9-13.
pub static NEW_LAYOUT: RegisterLayout = RegisterLayout {
    cylinder_mask: 0o777,
    command_shift: 9,
    cylinder_extend: None,
    sector_shift: 4,
    sector_mask: 0o37,
    surface_shift: 9,
    surface_mask: 0o37,
};

impl RegisterLayout {
    pub fn decode_command(&self, fccy: u16) -> CommandFields {
        let mut cylinder = fccy & self.cylinder_mask;
        if let Some(bit) = self.cylinder_extend {
            cylinder |= (fccy >> (bit - 8)) & 0o400;
        }
        CommandFields {
            command: Command::from_code(fccy >> self.command_shift),
            cylinder,
        }
    }

    /// Pack a command and cylinder, leaving the flag bits clear.
    pub fn encode_command(&self, fields: &CommandFields) -> u16 {
        let mut fccy = (fields.command.code() << self.command_shift)
            | (fields.cylinder & self.cylinder_mask);
        if let Some(bit) = self.cylinder_extend {
            fccy |= (fields.cylinder & 0o400) << (bit - 8);
        }
        fccy
    }

    pub fn decode_unit(&self, ussc: u16) -> UnitFields {
        UnitFields {
            unit: ((ussc >> USSC_UNIT_SHIFT) & USSC_UNIT_MASK) as usize,
            surface: (ussc >> self.surface_shift) & self.surface_mask,
            sector: (ussc >> self.sector_shift) & self.sector_mask,
            count: ussc & USSC_COUNT_MASK,
        }
    }

    pub fn encode_unit(&self, fields: &UnitFields) -> u16 {
        ((fields.unit as u16 & USSC_UNIT_MASK) << USSC_UNIT_SHIFT)
            | ((fields.surface & self.surface_mask) << self.surface_shift)
            | ((fields.sector & self.sector_mask) << self.sector_shift)
            | (fields.count & USSC_COUNT_MASK)
    }

    /// Update USSC after a transfer step: keep the unit, add `count_step` to
    /// the residual count and store `surface` and `sector`. Like the hardware,
    /// the new values are not masked to their fields; callers carry sector
    /// overflow into the surface first.
    pub fn advance_unit(&self, ussc: u16, count_step: u16, surface: u16, sector: u16) -> u16 {
        (ussc & (USSC_UNIT_MASK << USSC_UNIT_SHIFT))
            | (ussc.wrapping_add(count_step) & USSC_COUNT_MASK)
            | surface.wrapping_shl(self.surface_shift as u32)
            | sector.wrapping_shl(self.sector_shift as u32)
    }

    /// Largest surface number the USSC field can hold.
    pub fn surface_mask(&self) -> u16 {
        self.surface_mask
    }
}

/// Unit number selected by a USSC value; the same for both layouts.
pub fn selected_unit(ussc: u16) -> usize {
    ((ussc >> USSC_UNIT_SHIFT) & USSC_UNIT_MASK) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacities() {
        assert_eq!(TYPE_6095.blocks(), 19584);
        assert_eq!(TYPE_6095.size_words(), 19584 * 256);
        assert_eq!(TYPE_6038.size_bytes(), 8 * 77 * 512);
    }

    #[test]
    fn test_linear_block_address_is_monotonic() {
        let t = &TYPE_6095;
        let mut previous = None;
        for cylinder in 0..t.cylinders {
            for surface in 0..t.surfaces {
                for sector in 0..t.sectors {
                    let lba = t.linear_block_address(cylinder, surface, sector);
                    if let Some(p) = previous {
                        assert_eq!(lba, p + 1);
                    }
                    previous = Some(lba);
                }
            }
        }
        assert_eq!(previous, Some(t.blocks() - 1));
        assert_eq!(t.linear_block_address(5, 0, 0), (5 * 4) * 12);
    }

    #[test]
    fn test_autosize() {
        assert_eq!(autosize(&FIXED_DRIVE_TYPES, 1).unwrap().name, "6095");
        assert_eq!(autosize(&FIXED_DRIVE_TYPES, TYPE_6095.size_bytes()).unwrap().name, "6095");
        assert_eq!(autosize(&FIXED_DRIVE_TYPES, TYPE_6095.size_bytes() + 2).unwrap().name, "6099");
        assert_eq!(autosize(&FIXED_DRIVE_TYPES, TYPE_6103.size_bytes()).unwrap().name, "6103");
        assert_eq!(autosize(&FIXED_DRIVE_TYPES, TYPE_6103.size_bytes() + 1), None);
        assert_eq!(find_drive_type(&FIXED_DRIVE_TYPES, "6099"), Some(&FIXED_DRIVE_TYPES[1]));
        assert_eq!(find_drive_type(&FLOPPY_DRIVE_TYPES, "6095"), None);
    }

    #[test]
    fn test_old_layout_cylinder_extend() {
        // Cylinder 0o401: low byte 1, extension bit 10 set, command seek.
        let fccy = 0o2000 | (2 << 8) | 0o001;
        let fields = OLD_LAYOUT.decode_command(fccy);
        assert_eq!(fields.command, Command::Seek);
        assert_eq!(fields.cylinder, 0o401);
        assert_eq!(OLD_LAYOUT.encode_command(&fields), fccy);
        // Flag bits do not leak into the fields.
        assert_eq!(OLD_LAYOUT.decode_command(fccy | FCCY_FLAGS), fields);
    }

    #[test]
    fn test_new_layout_fields() {
        let fccy = (3 << 9) | 0o777;
        let fields = NEW_LAYOUT.decode_command(fccy);
        assert_eq!(fields.command, Command::Recalibrate);
        assert_eq!(fields.cylinder, 0o777);

        let unit = UnitFields { unit: 2, surface: 7, sector: 31, count: 0 };
        let ussc = NEW_LAYOUT.encode_unit(&unit);
        assert_eq!(ussc, 0o100000 | (7 << 9) | (31 << 4));
        assert_eq!(NEW_LAYOUT.decode_unit(ussc), unit);
        // The same bits read through the old layout land elsewhere.
        let old = OLD_LAYOUT.decode_unit(ussc);
        assert_eq!(old.unit, 2);
        assert_eq!(old.sector, 0o17);
        assert_eq!(old.surface, 0o17);
    }

    #[test]
    fn test_residual_count() {
        assert_eq!(UnitFields::count_for(1), 15);
        assert_eq!(UnitFields::count_for(16), 0);
        let fields = OLD_LAYOUT.decode_unit(0);
        assert_eq!(fields.sectors_to_transfer(), 16);
    }

    #[test]
    fn test_advance_unit() {
        let ussc = OLD_LAYOUT.encode_unit(&UnitFields { unit: 1, surface: 2, sector: 3, count: 15 });
        let next = OLD_LAYOUT.advance_unit(ussc, 1, 2, 4);
        let fields = OLD_LAYOUT.decode_unit(next);
        assert_eq!(fields, UnitFields { unit: 1, surface: 2, sector: 4, count: 0 });
        // A sector number too large for its field spills into the surface.
        let spilled = NEW_LAYOUT.decode_unit(NEW_LAYOUT.advance_unit(0, 1, 0, 32));
        assert_eq!(spilled.sector, 0);
        assert_eq!(spilled.surface, 1);
    }
}
