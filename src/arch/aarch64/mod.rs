//! AArch64 (ARM64) Architecture Support
//!
//! Board glue for the Cortex-A53 application core: console UART, data cache
//! maintenance, the generic counter and exception entry. The reset stub and
//! the exception vector table are linked in from the board support package.

pub mod uart;
pub mod cache;
pub mod counter;
pub mod exceptions;

/// Initialize ARM64 architecture
pub fn init() {
    // Route exceptions to our handlers, IRQs stay masked until dispatch is enabled
    exceptions::init();
}

/// Idle forever; all further work happens in interrupt context
pub fn idle() -> ! {
    exceptions::wait_for_interrupts()
}

/// Halt the CPU
pub fn hlt() {
    unsafe {
        core::arch::asm!("wfe");  // Wait For Event
    }
}
