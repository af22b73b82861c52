//! Reporting channel
//!
//! Mismatches and region faults come from interrupt context and must never
//! block there. `ConsoleReporter` uses the non-blocking console path for
//! those and the normal one for startup failures.

use core::fmt;

use crate::error::{RegionFault, StartupError};
use crate::validator::{CaptureRegion, ValidatorStats};

/// One word that didn't match the expected counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MismatchRecord {
    /// Portion the word belongs to
    pub region: CaptureRegion,
    /// Word position inside the portion
    pub word_index: usize,
    pub expected: u64,
    pub observed: u64,
}

impl MismatchRecord {
    pub fn word_address(&self) -> usize {
        self.region.address + self.word_index * crate::config::WORD_BYTES
    }
}

impl fmt::Display for MismatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "0x{:08x} : {} : Error at 0x{:08x} : expected {} observed {}",
            self.region.address,
            self.region.len,
            self.word_address(),
            self.expected,
            self.observed
        )
    }
}

/// Diagnostic sink. Calls are fire-and-forget.
pub trait Reporter {
    fn mismatch(&mut self, record: &MismatchRecord);
    /// `count` further mismatches in `region` were not reported individually
    fn suppressed(&mut self, region: CaptureRegion, count: u32);
    fn region_fault(&mut self, region: CaptureRegion, fault: RegionFault);
    fn progress(&mut self, stats: &ValidatorStats);
    fn startup_failure(&mut self, error: &StartupError);
}

/// Reports to the board console
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn mismatch(&mut self, record: &MismatchRecord) {
        crate::console::try_println(format_args!("[MEMWR] {}", record));
    }

    fn suppressed(&mut self, region: CaptureRegion, count: u32) {
        crate::console::try_println(format_args!(
            "[MEMWR] 0x{:08x} : {} : {} more mismatches not shown",
            region.address, region.len, count
        ));
    }

    fn region_fault(&mut self, region: CaptureRegion, fault: RegionFault) {
        crate::console::try_println(format_args!(
            "[MEMWR] 0x{:08x} : {} : {}",
            region.address, region.len, fault
        ));
    }

    fn progress(&mut self, stats: &ValidatorStats) {
        crate::console::try_println(format_args!(
            "[MEMWR] {} portions, {} words, {} mismatches, {} faults, max service {} ticks",
            stats.portions, stats.words, stats.mismatches, stats.region_faults, stats.max_service_ticks
        ));
        let (spurious, unhandled) = crate::gic::dispatch_anomalies();
        crate::console::try_println(format_args!(
            "[MEMWR] generator {} words / {} packets, missed {} events, irq spurious {} unhandled {}, {} lines dropped",
            stats.generator_words,
            stats.generator_packets,
            stats.missed_events,
            spurious,
            unhandled,
            crate::console::dropped_lines()
        ));
    }

    fn startup_failure(&mut self, error: &StartupError) {
        uart_println!("[APP] : {}", error);
        match error.controller_code() {
            Some(code) => uart_println!("[APP] : execution stopped with error {}", code),
            None => uart_println!("[APP] : execution stopped with error {}", error.exit_code()),
        }
    }
}
