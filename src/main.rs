//! memwr_check - firmware entry point
//!
//! Called by the board's reset stub once stacks, caches and the console are
//! up. Brings up the interrupt controller and both peripherals, then idles
//! while the memory writer interrupt validates the captured stream.

#![no_std]  // Don't link Rust standard library
#![no_main] // Don't use standard main entry point

use core::panic::PanicInfo;

use spin::{Mutex, Once};

use memwr_check::arch::aarch64::{self, cache::CaptureWindow, counter, exceptions::ArmCpu};
use memwr_check::config::{Config, VERBOSE_BOOT};
use memwr_check::gic::ScuGic;
use memwr_check::memwr::{MemwrContext, MemwrIrq};
use memwr_check::regs::{GeneratorCounters, GeneratorRegs, WriterRegs};
use memwr_check::report::ConsoleReporter;
use memwr_check::{app, uart_println};

type BoardIrq = MemwrIrq<&'static mut WriterRegs, CaptureWindow, counter::GenericTimer, ConsoleReporter>;

/// The platform interrupt controller, set up once during startup
static GIC: Once<Mutex<ScuGic>> = Once::new();

/// Handler state for the memory writer interrupt
static MEMWR: Once<BoardIrq> = Once::new();

/// Firmware entry, called by the reset stub. Returns only on startup failure.
#[no_mangle]
pub extern "C" fn main() -> i32 {
    let config = Config::DEFAULT;

    let timer = counter::GenericTimer::new();

    uart_println!("\n[BOOT] memwr_check v{} starting...", env!("CARGO_PKG_VERSION"));
    if VERBOSE_BOOT {
        uart_println!("[BOOT] Generic counter: {} kHz", timer.frequency_hz() / 1_000);
    }

    aarch64::init();

    // SAFETY: the register blocks are mapped as device memory and this is
    // the only place that creates views of them
    let writer = unsafe { WriterRegs::at(config.writer_base) };
    let generator = unsafe { GeneratorRegs::at(config.generator_base) };
    let generator_counters = unsafe { GeneratorCounters::at(config.generator_base) };

    // SAFETY: the capture window is reserved for the writer by the linker script
    let window = unsafe { CaptureWindow::new(config.capture_base as usize, config.window_len() as usize) };

    let memwr = MEMWR.call_once(|| {
        MemwrIrq::new(
            MemwrContext::new(writer, window, timer, ConsoleReporter, &config)
                .with_generator_counters(generator_counters),
        )
    });

    // SAFETY: single core, nothing else owns the IRQ mask
    let mut cpu = unsafe { ArmCpu::new() };
    let mut reporter = ConsoleReporter;

    let started = app::bring_up(
        &config,
        |cfg| {
            // SAFETY: the GIC blocks are device mapped and owned by us alone
            let gic = unsafe { ScuGic::initialize(cfg.gic_device_id) }?;
            Ok(GIC.call_once(|| Mutex::new(gic)))
        },
        &mut cpu,
        memwr,
        generator,
        &mut reporter,
    );

    match started {
        Ok(_) => aarch64::idle(),
        Err(error) => error.exit_code(),
    }
}

/// Panic handler
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    uart_println!("[PANIC] {}", info);

    loop {
        aarch64::hlt();
    }
}
