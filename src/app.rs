//! Startup
//!
//! Brings the system from reset to steady state:
//!
//! 1. validate the board configuration
//! 2. initialize the interrupt controller
//! 3. bind the memory writer's interrupt to its handler
//! 4. enable CPU interrupt dispatch
//! 5. program and arm the peripherals, writer first
//!
//! Any failure is reported once and stops startup; nothing after the failed
//! step touches hardware.

use spin::Mutex;

use crate::config::{Config, VERBOSE_BOOT};
use crate::error::{InitError, StartupError};
use crate::interrupts::{self, CpuInterrupts, InterruptController, StartupProgress};
use crate::memwr::{Clock, DmaMemory, MemwrIrq};
use crate::regs::{DumpGenerator, MemoryWriter};
use crate::report::Reporter;
use crate::sequencer;

/// Run every startup step, reporting the first failure through `reporter`
pub fn bring_up<C, U, W, M, K, P, G, R>(
    config: &Config,
    init_controller: impl FnOnce(&Config) -> Result<&'static Mutex<C>, InitError>,
    cpu: &mut U,
    memwr: &'static MemwrIrq<W, M, K, P>,
    generator: &mut G,
    reporter: &mut R,
) -> Result<StartupProgress, StartupError>
where
    C: InterruptController + Send + 'static,
    U: CpuInterrupts,
    W: MemoryWriter + Send + 'static,
    M: DmaMemory + Send + 'static,
    K: Clock + Send + 'static,
    P: Reporter + Send + 'static,
    G: DumpGenerator,
    R: Reporter,
{
    let result = run_steps(config, init_controller, cpu, memwr, generator);
    if let Err(error) = &result {
        reporter.startup_failure(error);
    }
    result
}

fn run_steps<C, U, W, M, K, P, G>(
    config: &Config,
    init_controller: impl FnOnce(&Config) -> Result<&'static Mutex<C>, InitError>,
    cpu: &mut U,
    memwr: &'static MemwrIrq<W, M, K, P>,
    generator: &mut G,
) -> Result<StartupProgress, StartupError>
where
    C: InterruptController + Send + 'static,
    U: CpuInterrupts,
    W: MemoryWriter + Send + 'static,
    M: DmaMemory + Send + 'static,
    K: Clock + Send + 'static,
    P: Reporter + Send + 'static,
    G: DumpGenerator,
{
    let mut progress = StartupProgress::new();

    config.validate()?;

    if VERBOSE_BOOT { uart_println!("[INIT] Initializing interrupt controller..."); }
    let controller = init_controller(config)?;
    progress.controller_ready = true;
    if VERBOSE_BOOT { uart_println!("[ OK ] Interrupt controller initialized"); }

    // controller lock must be released before dispatch goes live
    {
        let mut gic = controller.lock();
        interrupts::connect(
            &mut *gic,
            &mut progress,
            config.memwr_irq,
            memwr,
            config.memwr_priority,
            config.memwr_trigger,
        )?;
    }

    interrupts::enable_cpu_dispatch(cpu, controller, &mut progress)?;

    if VERBOSE_BOOT { uart_println!("[INIT] Arming peripherals..."); }
    sequencer::arm_peripherals(config, &mut progress, memwr, generator)?;
    if VERBOSE_BOOT { uart_println!("[ OK ] Writer and generator running"); }

    uart_println!("[INFO] Validating stream, irq {}", config.memwr_irq.value());
    Ok(progress)
}
