//! ARM Generic Timer counter
//!
//! Times the memory writer handler. CNTVCT_EL0 runs at a fixed frequency
//! independent of the CPU clock, so service times are comparable across
//! clock configurations.

use core::arch::asm;

use crate::memwr::Clock;

macro_rules! read_sysreg {
    ($reg:literal) => {{
        let value: u64;
        unsafe {
            asm!(concat!("mrs {0}, ", $reg), out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }};
}

/// Virtual counter as a `Clock`
#[derive(Debug, Clone, Copy)]
pub struct GenericTimer {
    frequency_hz: u64,
}

impl GenericTimer {
    /// Latch the counter frequency programmed by the boot firmware
    pub fn new() -> Self {
        GenericTimer { frequency_hz: read_sysreg!("cntfrq_el0") }
    }

    pub fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}

impl Default for GenericTimer {
    fn default() -> Self {
        GenericTimer::new()
    }
}

impl Clock for GenericTimer {
    #[inline]
    fn ticks(&self) -> u64 {
        // keep the read from being hoisted above the handler's earlier work
        unsafe { asm!("isb", options(nomem, nostack, preserves_flags)) };
        read_sysreg!("cntvct_el0")
    }
}
