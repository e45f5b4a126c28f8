use log::{debug, info};
use micronova_utils::read_words::ReadWords;
use micronova_utils::write_words::WriteWords;
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{DiskError, DiskResult};

use super::disk_interface::{BYTES_PER_WORD, WORDS_PER_SECTOR};
use super::geometry::{autosize, find_drive_type, DriveType};

/// Anything a drive can keep its image in.
pub trait BackingStore: Read + Write + Seek {}

impl<T: Read + Write + Seek> BackingStore for T {}

/// One drive attached to a controller.
pub struct DiskUnit {
    number: usize,
    store: Option<Box<dyn BackingStore>>,
    path: Option<PathBuf>,
    read_only: bool,
    write_locked: bool,
    auto_size: bool,
    table: &'static [DriveType],
    drive_type: &'static DriveType,
    pub(crate) cylinder: u16,
    pub(crate) function: u16,
    /// Sector currently under the head; only the floppy drive rotates.
    pub(crate) sector: u16,
}

impl DiskUnit {
    /// A detached unit that accepts the drive types in `table`, defaulting to
    /// the first one.
    pub(crate) fn new(number: usize, table: &'static [DriveType]) -> Self {
        DiskUnit {
            number,
            store: None,
            path: None,
            read_only: false,
            write_locked: false,
            auto_size: true,
            table,
            drive_type: &table[0],
            cylinder: 0,
            function: 0,
            sector: 0,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn is_attached(&self) -> bool {
        self.store.is_some()
    }

    /// Path of the attached image file, if it was attached from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_write_protected(&self) -> bool {
        self.read_only || self.write_locked
    }

    pub fn set_write_lock(&mut self, locked: bool) {
        self.write_locked = locked;
    }

    pub fn drive_type(&self) -> &'static DriveType {
        self.drive_type
    }

    /// Select a drive type by name. Not allowed while attached.
    pub fn set_drive_type(&mut self, name: &str) -> DiskResult<()> {
        if self.is_attached() {
            return Err(DiskError::AlreadyAttached(self.number));
        }
        self.drive_type = find_drive_type(self.table, name)
            .ok_or_else(|| DiskError::UnknownDriveType(name.to_string()))?;
        Ok(())
    }

    /// Whether attaching an image picks the drive type from its size.
    pub fn set_auto_size(&mut self, enabled: bool) {
        self.auto_size = enabled;
    }

    pub fn cylinder(&self) -> u16 {
        self.cylinder
    }

    pub fn sector(&self) -> u16 {
        self.sector
    }

    /// Attach a backing store. With autosizing on, a non-empty store selects
    /// the smallest drive type that can hold it.
    pub fn attach<S: BackingStore + 'static>(&mut self, store: S, read_only: bool) -> DiskResult<()> {
        self.attach_boxed(Box::new(store), None, read_only)
    }

    /// Attach an image file, creating it if it is missing and writable.
    pub fn attach_file(&mut self, path: impl AsRef<Path>, read_only: bool) -> DiskResult<()> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;
        self.attach_boxed(Box::new(file), Some(path.to_path_buf()), read_only)
    }

    fn attach_boxed(&mut self, mut store: Box<dyn BackingStore>,
                    path: Option<PathBuf>, read_only: bool) -> DiskResult<()> {
        if self.is_attached() {
            return Err(DiskError::AlreadyAttached(self.number));
        }
        if self.auto_size {
            let length = store.seek(SeekFrom::End(0))?;
            if length > 0 {
                if let Some(drive_type) = autosize(self.table, length) {
                    self.drive_type = drive_type;
                }
            }
        }
        match &path {
            Some(p) => info!("Unit {} attached '{}' as a {}{}.", self.number, p.display(),
                             self.drive_type.name, if read_only { " (read only)" } else { "" }),
            None => info!("Unit {} attached as a {}{}.", self.number, self.drive_type.name,
                          if read_only { " (read only)" } else { "" }),
        }
        self.store = Some(store);
        self.path = path;
        self.read_only = read_only;
        Ok(())
    }

    /// Remove the backing store and hand it back.
    pub fn detach(&mut self) -> DiskResult<Box<dyn BackingStore>> {
        let mut store = self.store.take().ok_or(DiskError::NotAttached(self.number))?;
        store.flush()?;
        self.path = None;
        self.read_only = false;
        info!("Unit {} detached.", self.number);
        Ok(store)
    }

    fn store(&mut self) -> io::Result<&mut Box<dyn BackingStore>> {
        let number = self.number;
        self.store.as_mut().ok_or_else(|| io::Error::new(
            io::ErrorKind::NotConnected, format!("unit {} has no media", number)))
    }

    fn seek_block(&mut self, block: u64) -> io::Result<()> {
        let offset = block * WORDS_PER_SECTOR as u64 * BYTES_PER_WORD;
        self.store()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read one sector. Anything past the end of the image reads as zeros.
    pub(crate) fn read_sector(&mut self, block: u64, buf: &mut [u16]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), WORDS_PER_SECTOR);
        self.seek_block(block)?;
        let got = self.store()?.read_words(buf)?;
        buf[got..].fill(0);
        debug!("Unit {} read block {} ({} words from image).", self.number, block, got);
        Ok(())
    }

    pub(crate) fn write_sector(&mut self, block: u64, buf: &[u16]) -> io::Result<()> {
        debug_assert_eq!(buf.len(), WORDS_PER_SECTOR);
        self.seek_block(block)?;
        let store = self.store()?;
        store.write_words(buf)?;
        store.flush()?;
        debug!("Unit {} wrote block {}.", self.number, block);
        Ok(())
    }
}
