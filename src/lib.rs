//! LarchOS build-and-test harness library.
//!
//! The pipeline is a strict linear sequence: resolve config, build
//! artifacts, assemble the FAT32 boot image, launch QEMU, decode the guest
//! verdict. No stage starts before the previous one completes, nothing
//! retries, and the first failure aborts the run with artifacts left in
//! place for inspection.

pub mod build;
pub mod config;
pub mod context;
pub mod esp;
pub mod preflight;
pub mod process;
pub mod qemu;
pub mod verdict;

use std::time::Instant;

/// Wall-clock timer for pipeline stages.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let secs = self.start.elapsed().as_secs_f64();
        if secs >= 60.0 {
            println!("  [{}] {:.1}m", self.label, secs / 60.0);
        } else {
            println!("  [{}] {:.1}s", self.label, secs);
        }
    }
}
