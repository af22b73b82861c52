/*
 * ARM64 Exception Handlers
 *
 * The vector table (exception_vector_table) comes from the board support
 * assembly. Its IRQ slot saves caller-saved state and calls handle_irq,
 * which forwards to whatever dispatcher the interrupt binding installed.
 */

use core::arch::asm;

use spin::Once;

use crate::interrupts::{CpuInterrupts, Dispatch};

/// Exception frame saved by the assembly exception handlers
#[repr(C)]
pub struct ExceptionFrame {
    /// General purpose registers x0-x29
    pub x: [u64; 30],
    // Link register and stack pointer
    pub x30_lr: u64,
    pub sp_el0: u64,
    // Exception state
    pub elr_el1: u64,  // Exception link register (PC where exception occurred)
    pub spsr_el1: u64, // Saved processor state register
}

/// Dispatcher called for every IRQ
static IRQ_ENTRY: Once<&'static dyn Dispatch> = Once::new();

/// Point VBAR_EL1 at the board's vector table. IRQs stay masked.
pub fn init() {
    unsafe {
        let vector_table: u64;
        asm!(
            "adrp {0}, exception_vector_table",
            "add {0}, {0}, :lo12:exception_vector_table",
            out(reg) vector_table,
        );

        asm!(
            "msr vbar_el1, {0}",
            "isb",
            in(reg) vector_table,
        );
    }
}

/// CPU interrupt delivery on this core
pub struct ArmCpu {
    _private: (),
}

impl ArmCpu {
    /// # Safety
    ///
    /// Only one `ArmCpu` may exist; it owns the core's IRQ mask.
    pub const unsafe fn new() -> Self {
        ArmCpu { _private: () }
    }
}

impl CpuInterrupts for ArmCpu {
    fn install_irq_entry(&mut self, entry: &'static dyn Dispatch) {
        IRQ_ENTRY.call_once(|| entry);
    }

    fn unmask_irqs(&mut self) {
        unsafe {
            // DAIF: Debug, SError, IRQ, FIQ - clear I
            asm!("msr daifclr, #2", options(nomem, nostack));
        }
    }
}

/// Park the core until the next interrupt, forever
pub fn wait_for_interrupts() -> ! {
    loop {
        unsafe {
            asm!("wfi", options(nomem, nostack));
        }
    }
}

/// Handle IRQ interrupts
#[no_mangle]
extern "C" fn handle_irq() {
    // IRQs stay masked until an entry is installed
    if let Some(entry) = IRQ_ENTRY.get() {
        entry.dispatch();
    }
}

/// Handle synchronous exceptions
#[no_mangle]
extern "C" fn handle_sync_exception(frame: &ExceptionFrame) -> ! {
    let esr: u64;
    let far: u64;
    unsafe {
        asm!("mrs {0}, esr_el1", out(reg) esr);
        asm!("mrs {0}, far_el1", out(reg) far);
    }

    let ec = (esr >> 26) & 0x3F; // Exception Class
    let iss = esr & 0x1FFFFFF;   // Instruction Specific Syndrome

    uart_println!("\n[EXCEPTION] SYNCHRONOUS EXCEPTION");
    uart_println!("Exception Class: {:#x}", ec);
    uart_println!("ISS: {:#x}", iss);
    uart_println!("ELR_EL1 (PC): {:#018x}", frame.elr_el1);
    uart_println!("FAR_EL1 (Fault Addr): {:#018x}", far);
    uart_println!("SPSR_EL1: {:#x}", frame.spsr_el1);
    uart_println!("[EXCEPTION] System halted.");

    loop {
        unsafe { asm!("wfe"); }
    }
}

/// Handle SError (System Error)
#[no_mangle]
extern "C" fn handle_serror(frame: &ExceptionFrame) -> ! {
    uart_println!("\n[SERROR] System error at ELR_EL1 {:#018x}", frame.elr_el1);
    uart_println!("[SERROR] System halted.");
    loop {
        unsafe { asm!("wfe"); }
    }
}
