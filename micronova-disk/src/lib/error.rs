use std::error::Error;
use std::fmt;
use std::io;

/// Errors that escape the controllers. Protocol-level problems (bad cylinder,
/// sector mismatch and so on) never appear here: they are reported through
/// the status registers like the real hardware does.
#[derive(Debug)]
pub enum DiskError {
    /// The backing store failed; the operation in progress was abandoned.
    Io(io::Error),
    /// The unit number does not exist on this controller.
    NoSuchUnit(usize),
    /// The unit already has media attached.
    AlreadyAttached(usize),
    /// The unit has no media attached.
    NotAttached(usize),
    /// The named drive type is not known to this controller.
    UnknownDriveType(String),
}

/// Result type alias.
pub type DiskResult<T> = Result<T, DiskError>;

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::Io(e) => write!(f, "I/O error on backing store: {}", e),
            DiskError::NoSuchUnit(u) => write!(f, "Unit {} does not exist.", u),
            DiskError::AlreadyAttached(u) => write!(f, "Unit {} is already attached.", u),
            DiskError::NotAttached(u) => write!(f, "Unit {} is not attached.", u),
            DiskError::UnknownDriveType(name) => write!(f, "Unknown drive type '{}'.", name),
        }
    }
}

impl Error for DiskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DiskError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Convert IO errors to disk errors.
impl From<io::Error> for DiskError {
    fn from(e: io::Error) -> Self {
        DiskError::Io(e)
    }
}
