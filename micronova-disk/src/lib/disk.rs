mod disk_interface;
pub mod fixed;
pub mod floppy;
pub mod geometry;
mod unit;

pub use disk_interface::*;
pub use fixed::{FixedDiskController, FixedTiming};
pub use floppy::{FloppyController, FloppyTiming};
pub use unit::{BackingStore, DiskUnit};

// Failing backing store for testing error paths.
#[cfg(test)]
mod disk_mock;
#[cfg(test)]
pub use disk_mock::FailingStore;
