//! Interrupt binding
//!
//! Binds the memory writer's "portion complete" event to its handler and
//! turns on CPU interrupt delivery. The controller itself sits behind
//! `InterruptController` (GIC driver on the board, recording mock in tests).
//!
//! Every `connect` must finish before `enable_cpu_dispatch`, otherwise a
//! source could fire with no handler bound. `StartupProgress` tracks this.

use spin::Mutex;

use crate::error::{ConnectError, SequencingError};

/// Hardware interrupt source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IrqId(u32);

impl IrqId {
    pub const fn new(id: u32) -> Self {
        IrqId(id)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Trigger policy, encoded the way the controller's configuration field expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Trigger {
    LevelHigh = 0x1,
    RisingEdge = 0x3,
}

impl Trigger {
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Handler bound to an interrupt source.
///
/// The implementing object is the handler's context: whatever it needs
/// (register view, validator state) is captured by it at bind time.
pub trait IrqHandler: Sync {
    fn handle(&self);
}

/// The platform interrupt controller, as a capability
pub trait InterruptController {
    fn set_priority_trigger_type(&mut self, irq: IrqId, priority: u8, trigger: Trigger);
    fn connect(&mut self, irq: IrqId, handler: &'static dyn IrqHandler) -> Result<(), ConnectError>;
    fn enable(&mut self, irq: IrqId);
    /// Acknowledge the pending interrupt, run its handler, signal completion
    fn dispatch(&mut self);
}

/// Single entry point for all hardware interrupts
pub trait Dispatch: Sync {
    fn dispatch(&self);
}

impl<C> Dispatch for Mutex<C>
where
    C: InterruptController + Send,
{
    fn dispatch(&self) {
        // The foreground releases the controller before dispatch is enabled;
        // if it is held anyway, leave the interrupt pending rather than deadlock.
        if let Some(mut controller) = self.try_lock() {
            controller.dispatch();
        }
    }
}

/// CPU-side interrupt delivery
pub trait CpuInterrupts {
    /// Route hardware interrupt traps to `entry`
    fn install_irq_entry(&mut self, entry: &'static dyn Dispatch);
    /// Unmask IRQs on this core
    fn unmask_irqs(&mut self);
}

/// A bound interrupt source. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptBinding {
    pub irq: IrqId,
    pub priority: u8,
    pub trigger: Trigger,
}

/// Which startup steps have completed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupProgress {
    pub controller_ready: bool,
    pub binding: Option<InterruptBinding>,
    pub dispatch_enabled: bool,
    pub armed: bool,
}

impl StartupProgress {
    pub fn new() -> Self {
        StartupProgress::default()
    }

    /// Everything the peripheral sequencer needs before arming
    pub fn check_ready_to_arm(&self) -> Result<(), SequencingError> {
        if !self.controller_ready {
            return Err(SequencingError::ControllerNotReady);
        }
        if self.binding.is_none() {
            return Err(SequencingError::HandlerNotBound);
        }
        if !self.dispatch_enabled {
            return Err(SequencingError::DispatchNotEnabled);
        }
        if self.armed {
            return Err(SequencingError::AlreadyArmed);
        }
        Ok(())
    }
}

/// Error from `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    Sequencing(SequencingError),
    Connect(ConnectError),
}

impl From<BindError> for crate::error::StartupError {
    fn from(e: BindError) -> Self {
        match e {
            BindError::Sequencing(e) => e.into(),
            BindError::Connect(e) => e.into(),
        }
    }
}

/// Bind `handler` to `irq`: edge/level policy and priority first, then the
/// handler, then enable the line.
pub fn connect<C: InterruptController>(
    controller: &mut C,
    progress: &mut StartupProgress,
    irq: IrqId,
    handler: &'static dyn IrqHandler,
    priority: u8,
    trigger: Trigger,
) -> Result<InterruptBinding, BindError> {
    if !progress.controller_ready {
        return Err(BindError::Sequencing(SequencingError::ControllerNotReady));
    }
    if progress.dispatch_enabled {
        return Err(BindError::Sequencing(SequencingError::DispatchAlreadyEnabled));
    }

    controller.set_priority_trigger_type(irq, priority, trigger);
    controller.connect(irq, handler).map_err(BindError::Connect)?;
    controller.enable(irq);

    let binding = InterruptBinding { irq, priority, trigger };
    progress.binding = Some(binding);

    uart_println!("[GIC] irq {} bound (priority {}, trigger {:#x})", irq.value(), priority, trigger.bits());
    Ok(binding)
}

/// Install the controller's dispatch routine as the IRQ entry and unmask IRQs.
///
/// Refused until at least one source is bound. One-time.
pub fn enable_cpu_dispatch<U: CpuInterrupts>(
    cpu: &mut U,
    entry: &'static dyn Dispatch,
    progress: &mut StartupProgress,
) -> Result<(), SequencingError> {
    if !progress.controller_ready {
        return Err(SequencingError::ControllerNotReady);
    }
    if progress.binding.is_none() {
        return Err(SequencingError::HandlerNotBound);
    }
    if progress.dispatch_enabled {
        return Err(SequencingError::DispatchAlreadyEnabled);
    }

    cpu.install_irq_entry(entry);
    cpu.unmask_irqs();
    progress.dispatch_enabled = true;

    uart_println!("[GIC] cpu interrupt dispatch enabled");
    Ok(())
}
