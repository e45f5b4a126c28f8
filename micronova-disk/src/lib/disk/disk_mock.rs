use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A backing store that fails once a byte budget is used up, used to exercise
/// the hard I/O error paths of the controllers.
pub struct FailingStore {
    image: Cursor<Vec<u8>>,
    budget: usize,
}

impl FailingStore {
    /// An empty store whose every read and write fails.
    pub fn new() -> Self {
        Self::after(Vec::new(), 0)
    }

    /// A store over `image` that moves `bytes` bytes before failing.
    pub fn after(image: Vec<u8>, bytes: usize) -> Self {
        FailingStore {
            image: Cursor::new(image),
            budget: bytes,
        }
    }

    fn error() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "simulated media failure")
    }
}

impl Read for FailingStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(Self::error());
        }
        let len = buf.len().min(self.budget);
        let n = self.image.read(&mut buf[..len])?;
        self.budget -= n;
        Ok(n)
    }
}

impl Write for FailingStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(Self::error());
        }
        let len = buf.len().min(self.budget);
        let n = self.image.write(&buf[..len])?;
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FailingStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // An empty image leaves the configured drive type alone on attach.
        self.image.seek(pos)
    }
}
