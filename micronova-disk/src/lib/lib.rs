pub mod boot;
pub mod bus;
pub mod disk;
mod error;
mod machine;
pub mod memory;
pub mod scheduler;

pub use crate::error::{DiskError, DiskResult};
pub use crate::machine::Machine;

/// Route log output to the test harness. Safe to call from every test.
#[cfg(test)]
pub fn init_test_logging() {
    use simplelog::{Config, LevelFilter, TestLogger};

    // The logger can only be initialised once, but we don't know the order of
    // tests. Therefore we ignore the result.
    let _ = TestLogger::init(LevelFilter::Trace, Config::default());
}
