use clap::{value_parser, Arg, ArgAction, ArgMatches, Command, ValueEnum};
use simplelog::{ConfigBuilder, LevelFilter, LevelPadding, WriteLogger};
use std::fs::File;
use std::path::PathBuf;
use time::macros::format_description;

use micronova_disk::boot::{boot_fixed, boot_floppy, read_program_loader};
use micronova_disk::bus::{IoCode, Pulse, DEV_DHP, DEV_DKT};
use micronova_disk::disk::fixed::{STA_ERR, STA_SKDN0};
use micronova_disk::disk::floppy::{specify_command, CMD_READ_NEXT, CMD_STEP_IN, STA_ERROR};
use micronova_disk::disk::geometry::{Command as DiskCommand, CommandFields, UnitFields, FCCY_FLAGS};
use micronova_disk::disk::{DiskUnit, WORDS_PER_SECTOR};
use micronova_disk::{DiskError, Machine};
use micronova_utils::octprint::pretty_print_octal_block;

const IMAGE_PATH: &str = "IMAGE";
const FLOPPY: &str = "floppy";
const DRIVE_TYPE: &str = "drive-type";
const CYLINDER: &str = "cylinder";
const SURFACE: &str = "surface";
const SECTOR: &str = "sector";
const COUNT: &str = "count";
const SEEK_TIME: &str = "seek-time";
const ROTATE_TIME: &str = "rotate-time";
const LOG_PATH: &str = "log";
const LOG_LEVEL: &str = "log-level";

/// Longest any single command may take, in event-queue time units.
const COMMAND_TIME_LIMIT: u64 = 10_000_000;

/// Possible log levels.
#[derive(Debug, PartialEq, Eq, Copy, Clone, ValueEnum)]
enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
}

fn image_args(command: Command) -> Command {
    command
        .arg(Arg::new(IMAGE_PATH)
            .help("The disk image file.")
            .action(ArgAction::Set)
            .value_parser(value_parser!(PathBuf))
            .required(true))
        .arg(Arg::new(FLOPPY)
            .help("Treat the image as a 6038 diskette instead of a fixed disk.")
            .short('f')
            .long("floppy")
            .action(ArgAction::SetTrue))
        .arg(Arg::new(DRIVE_TYPE)
            .help("Drive type to use instead of picking one from the image size.")
            .short('t')
            .long("type")
            .action(ArgAction::Set))
}

fn cli() -> Command {
    // Hack to make the build dirty when the toml changes.
    include_str!("../../Cargo.toml");

    clap::command!()
        .max_term_width(100)
        .subcommand_required(true)
        .after_help("\
Disk images are flat files of 16-bit little-endian words, 256 words per \
sector, in cylinder, surface, sector order. Fixed-disk images are matched \
to the smallest drive type that can hold them.")
        .arg(Arg::new(LOG_PATH)
            .help("If set, a debug log will be written to the given path.")
            .short('l')
            .long("log")
            .global(true)
            .action(ArgAction::Set)
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new(LOG_LEVEL)
            .help("Set the log level. Has no effect without \
                   specifying --log as well. Case insensitive.")
            .short('L')
            .long("log-level")
            .global(true)
            .action(ArgAction::Set)
            .default_value("TRACE")
            .value_parser(value_parser!(LogLevel))
            .ignore_case(true))
        .subcommand(image_args(Command::new("info")
            .about("Show the drive type and geometry an image attaches as.")))
        .subcommand(image_args(Command::new("dump")
            .about("Read sectors through the controller and print them in octal."))
            .arg(Arg::new(CYLINDER)
                .help("Cylinder (track) to read.")
                .short('c')
                .long("cylinder")
                .action(ArgAction::Set)
                .default_value("0")
                .value_parser(value_parser!(u16)))
            .arg(Arg::new(SURFACE)
                .help("Surface to start at (fixed disks only).")
                .short('s')
                .long("surface")
                .action(ArgAction::Set)
                .default_value("0")
                .value_parser(value_parser!(u16)))
            .arg(Arg::new(SECTOR)
                .help("Sector to start at.")
                .short('S')
                .long("sector")
                .action(ArgAction::Set)
                .default_value("0")
                .value_parser(value_parser!(u16)))
            .arg(Arg::new(COUNT)
                .help("Number of sectors to read.")
                .short('n')
                .long("count")
                .action(ArgAction::Set)
                .default_value("1")
                .value_parser(value_parser!(u16).range(1..=16)))
            .arg(Arg::new(SEEK_TIME)
                .help("Fixed-disk seek time per cylinder.")
                .long("seek-time")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64)))
            .arg(Arg::new(ROTATE_TIME)
                .help("Fixed-disk rotational latency.")
                .long("rotate-time")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u64))))
        .subcommand(image_args(Command::new("boot")
            .about("Install the bootstrap for an image and show the start state.")))
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) -> Result<(), String> {
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"))
        .build();

    WriteLogger::init(level, config, logfile)
        .map_err(|e| format!("Failed to initialise logging: {}", e))
}

fn disk_error(e: DiskError) -> String {
    e.to_string()
}

/// Attach the image named on the command line to unit 0 of the right
/// controller.
fn attach(machine: &mut Machine, args: &ArgMatches, read_only: bool) -> Result<(), String> {
    let path = args.get_one::<PathBuf>(IMAGE_PATH).unwrap();
    let unit = selected_unit(machine, args)?;
    if let Some(name) = args.get_one::<String>(DRIVE_TYPE) {
        unit.set_drive_type(name).map_err(disk_error)?;
        unit.set_auto_size(false);
    }
    unit.attach_file(path, read_only)
        .map_err(|e| format!("Failed to attach '{}': {}", path.display(), e))
}

fn selected_unit<'a>(machine: &'a mut Machine, args: &ArgMatches) -> Result<&'a mut DiskUnit, String> {
    if args.get_flag(FLOPPY) {
        machine.floppy_mut().unit_mut(0).map_err(disk_error)
    } else {
        machine.fixed_mut().unit_mut(0).map_err(disk_error)
    }
}

fn info(machine: &mut Machine, args: &ArgMatches) -> Result<(), String> {
    attach(machine, args, true)?;
    let unit = selected_unit(machine, args)?;
    let drive_type = unit.drive_type();
    let path = args.get_one::<PathBuf>(IMAGE_PATH).unwrap();
    let image_bytes = std::fs::metadata(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?
        .len();
    println!("Image:      {} ({} bytes)", path.display(), image_bytes);
    println!("Drive type: {}", drive_type.name);
    println!("Geometry:   {} cylinders, {} surfaces, {} sectors of {} words",
             drive_type.cylinders, drive_type.surfaces, drive_type.sectors, WORDS_PER_SECTOR);
    println!("Capacity:   {} sectors, {} bytes", drive_type.blocks(), drive_type.size_bytes());
    println!("Registers:  {} format{}", if drive_type.new_format { "new" } else { "old" },
             if drive_type.diagnostic { ", diagnostic mode" } else { "" });
    if image_bytes > drive_type.size_bytes() {
        println!("Warning:    image is larger than the drive; the excess is unreachable.");
    }
    Ok(())
}

/// Read `count` sectors into memory at 0 through the fixed-disk controller,
/// seeking first the way an operating system would.
fn dump_fixed(machine: &mut Machine, cylinder: u16, surface: u16, sector: u16,
              count: u16) -> Result<Vec<u16>, String> {
    let layout = machine.fixed().unit(0).map_err(disk_error)?.drive_type().layout();
    let ussc = layout.encode_unit(&UnitFields {
        unit: 0, surface, sector, count: UnitFields::count_for(count),
    });
    machine.io(DEV_DHP, Pulse::None, IoCode::Doc, ussc);

    let seek = layout.encode_command(&CommandFields { command: DiskCommand::Seek, cylinder });
    machine.io(DEV_DHP, Pulse::Pulse, IoCode::Doa, seek);
    machine.run_until_done(DEV_DHP, COMMAND_TIME_LIMIT).map_err(disk_error)?;
    let status = machine.fixed().status();
    if status & STA_ERR != 0 || status & STA_SKDN0 == 0 {
        return Err(format!("Seek to cylinder {} failed (status {:06o}).", cylinder, status));
    }

    // Clear the done flags, then read into location 0.
    machine.io(DEV_DHP, Pulse::None, IoCode::Doa, FCCY_FLAGS);
    machine.io(DEV_DHP, Pulse::None, IoCode::Dob, 0);
    let read = layout.encode_command(&CommandFields { command: DiskCommand::Read, cylinder });
    machine.io(DEV_DHP, Pulse::Start, IoCode::Doa, read);
    machine.run_until_done(DEV_DHP, COMMAND_TIME_LIMIT).map_err(disk_error)?;
    let status = machine.io(DEV_DHP, Pulse::None, IoCode::Dia, 0).unwrap_or(0);
    if status & STA_ERR != 0 {
        return Err(format!("Read failed (status {:06o}).", status));
    }
    Ok(words_from_memory(machine, count))
}

/// Read `count` consecutive sectors of one track through the floppy
/// controller. The drive is told to wait for each sector to come round.
fn dump_floppy(machine: &mut Machine, cylinder: u16, sector: u16,
               count: u16) -> Result<Vec<u16>, String> {
    machine.floppy_mut().timing_mut().wait_for_sector = true;
    for _ in 0..cylinder {
        machine.io(DEV_DKT, Pulse::Start, IoCode::Doa, specify_command(CMD_STEP_IN, 0, 0));
        machine.run_until_done(DEV_DKT, COMMAND_TIME_LIMIT).map_err(disk_error)?;
    }
    if machine.floppy().unit(0).map_err(disk_error)?.cylinder() != cylinder {
        return Err(format!("Track {} does not exist.", cylinder));
    }

    machine.io(DEV_DKT, Pulse::None, IoCode::Dob, 0);
    for i in 0..count {
        let s = (sector + i) % 8;
        machine.io(DEV_DKT, Pulse::Start, IoCode::Doa, specify_command(CMD_READ_NEXT, s, 0));
        machine.run_until_done(DEV_DKT, COMMAND_TIME_LIMIT).map_err(disk_error)?;
        let status = machine.io(DEV_DKT, Pulse::None, IoCode::Dia, 0).unwrap_or(0);
        if status & STA_ERROR != 0 {
            return Err(format!("Read of sector {} failed (status {:06o}).", s, status));
        }
    }
    Ok(words_from_memory(machine, count))
}

fn words_from_memory(machine: &Machine, count: u16) -> Vec<u16> {
    (0..count as usize * WORDS_PER_SECTOR).map(|a| machine.memory().read(a)).collect()
}

fn dump(machine: &mut Machine, args: &ArgMatches) -> Result<(), String> {
    if let Some(&time) = args.get_one::<u64>(SEEK_TIME) {
        machine.fixed_mut().timing_mut().seek = time;
    }
    if let Some(&time) = args.get_one::<u64>(ROTATE_TIME) {
        machine.fixed_mut().timing_mut().rotate = time;
    }
    attach(machine, args, true)?;

    let cylinder = *args.get_one::<u16>(CYLINDER).unwrap();
    let surface = *args.get_one::<u16>(SURFACE).unwrap();
    let sector = *args.get_one::<u16>(SECTOR).unwrap();
    let count = *args.get_one::<u16>(COUNT).unwrap();
    let words = if args.get_flag(FLOPPY) {
        dump_floppy(machine, cylinder, sector, count)?
    } else {
        dump_fixed(machine, cylinder, surface, sector, count)?
    };
    print!("{}", pretty_print_octal_block(&words, 0));
    Ok(())
}

fn boot(machine: &mut Machine, args: &ArgMatches) -> Result<(), String> {
    attach(machine, args, true)?;
    if args.get_flag(FLOPPY) {
        let info = boot_floppy(machine, 0).map_err(disk_error)?;
        println!("SR {:06o}; the processor's program load sequence takes over.", info.switches);
        let loader = read_program_loader(machine);
        let words: Vec<u16> = loader.chunks(2)
            .map(|pair| ((pair[0] as u16) << 8) | pair.get(1).copied().unwrap_or(0) as u16)
            .collect();
        println!("Program loader ({} bytes):", loader.len());
        print!("{}", pretty_print_octal_block(&words, 0));
    } else {
        let info = boot_fixed(machine, 0).map_err(disk_error)?;
        println!("PC {:06o}  SR {:06o}", info.pc.unwrap_or(0), info.switches);
        let start = info.pc.unwrap_or(0) as usize;
        let words: Vec<u16> = (start..start + 3).map(|a| machine.memory().read(a)).collect();
        print!("{}", pretty_print_octal_block(&words, start));
    }
    Ok(())
}

/// Main run function; returns an exit code.
fn run(args: ArgMatches) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    fn _run(args: ArgMatches) -> Result<(), String> {
        // Initialise logging if configured.
        if let Some(log_path) = args.get_one::<PathBuf>(LOG_PATH) {
            let logfile = File::create(log_path)
                .map_err(|e| format!("Failed to create log file: {}", e))?;
            let level = match args.get_one::<LogLevel>(LOG_LEVEL).unwrap() {
                LogLevel::TRACE => LevelFilter::Trace,
                LogLevel::DEBUG => LevelFilter::Debug,
                LogLevel::INFO => LevelFilter::Info,
            };
            init_logging(logfile, level)?;
        }

        let mut machine = Machine::new();
        match args.subcommand() {
            Some(("info", sub)) => info(&mut machine, sub),
            Some(("dump", sub)) => dump(&mut machine, sub),
            Some(("boot", sub)) => boot(&mut machine, sub),
            _ => unreachable!(),
        }
    }
}

fn main() {
    let args = cli().get_matches();
    std::process::exit(run(args).into());
}

#[cfg(test)]
mod tests {
    use super::*;

    use micronova_disk::disk::geometry::{TYPE_6038, TYPE_6095};
    use micronova_utils::write_words::WriteWords;
    use std::fs;
    use tempfile;

    macro_rules! invoke {
        ($($args:expr),+) => {{
            let args = cli().try_get_matches_from(
                    vec!["micronova-disk".to_string(), $($args.to_string()),*])
                .unwrap();
            run(args)
        }}
    }

    /// Write an image where every word holds its own sector number.
    fn numbered_image(path: &std::path::Path, blocks: u64) {
        let mut file = File::create(path).unwrap();
        for block in 0..blocks {
            file.write_words(&[block as u16; WORDS_PER_SECTOR]).unwrap();
        }
    }

    #[test]
    fn test_cli_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_info() {
        let tempdir = tempfile::tempdir().unwrap();
        let image = tempdir.path().join("disk.img");
        fs::write(&image, vec![0u8; 1024]).unwrap();
        assert_eq!(invoke!("info", image.to_str().unwrap()), 0);
        assert_eq!(invoke!("info", "--floppy", image.to_str().unwrap()), 0);
        assert_eq!(invoke!("info", "-t", "6103", image.to_str().unwrap()), 0);
        assert_eq!(invoke!("info", "-t", "9999", image.to_str().unwrap()), 1);
        let missing = tempdir.path().join("missing.img");
        assert_eq!(invoke!("info", missing.to_str().unwrap()), 1);
    }

    #[test]
    fn test_dump_fixed() {
        let tempdir = tempfile::tempdir().unwrap();
        let image = tempdir.path().join("disk.img");
        numbered_image(&image, TYPE_6095.blocks());

        let mut machine = Machine::new();
        machine.fixed_mut().unit_mut(0).unwrap().attach_file(&image, true).unwrap();
        let words = dump_fixed(&mut machine, 5, 3, 11, 2).unwrap();
        let first = TYPE_6095.linear_block_address(5, 3, 11) as u16;
        assert_eq!(words.len(), 2 * WORDS_PER_SECTOR);
        assert_eq!(words[0], first);
        assert_eq!(words[WORDS_PER_SECTOR], first + 1);

        // The second sector would run off the last surface.
        let mut machine = Machine::new();
        machine.fixed_mut().unit_mut(0).unwrap().attach_file(&image, true).unwrap();
        assert!(dump_fixed(&mut machine, 407, 3, 11, 2).is_err());

        assert_eq!(invoke!("dump", "-c", "5", "-n", "16", image.to_str().unwrap()), 0);
        assert_eq!(invoke!("dump", "-c", "408", image.to_str().unwrap()), 1);
        assert_eq!(invoke!("dump", "--seek-time", "0", "--rotate-time", "0",
                           image.to_str().unwrap()), 0);
    }

    #[test]
    fn test_dump_floppy() {
        let tempdir = tempfile::tempdir().unwrap();
        let image = tempdir.path().join("floppy.img");
        numbered_image(&image, TYPE_6038.blocks());

        let mut machine = Machine::new();
        machine.floppy_mut().unit_mut(0).unwrap().attach_file(&image, true).unwrap();
        let words = dump_floppy(&mut machine, 3, 7, 2).unwrap();
        assert_eq!(words[0], 3 * 8 + 7);
        // Reads wrap round to sector 0 of the same track.
        assert_eq!(words[WORDS_PER_SECTOR], 3 * 8);

        assert_eq!(invoke!("dump", "--floppy", "-c", "76", image.to_str().unwrap()), 0);
        assert_eq!(invoke!("dump", "--floppy", "-c", "77", image.to_str().unwrap()), 1);
    }

    #[test]
    fn test_boot() {
        let tempdir = tempfile::tempdir().unwrap();
        let image = tempdir.path().join("disk.img");
        fs::write(&image, vec![0u8; 512]).unwrap();
        assert_eq!(invoke!("boot", image.to_str().unwrap()), 0);
        assert_eq!(invoke!("boot", "-f", image.to_str().unwrap()), 0);
    }

    #[test]
    fn test_log_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let image = tempdir.path().join("disk.img");
        fs::write(&image, vec![0u8; 512]).unwrap();
        let log = tempdir.path().join("bad-dir").join("log.txt");
        // The log directory does not exist.
        assert_eq!(invoke!("info", image.to_str().unwrap(), "--log", log.to_str().unwrap()), 1);
    }
}
