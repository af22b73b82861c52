//! GICv2 (SCU GIC) driver
//!
//! Distributor and CPU interface register views, configuration lookup by
//! device id, and the handler table the dispatch routine uses.
//!
//! Register map (GICv2 architecture):
//! - GICD: CTLR 0x000, TYPER 0x004, ISENABLER 0x100, ICENABLER 0x180,
//!   IPRIORITYR 0x400 (byte), ITARGETSR 0x800 (byte), ICFGR 0xC00
//! - GICC: CTLR 0x00, PMR 0x04, IAR 0x0C, EOIR 0x10

use core::mem::offset_of;
use core::sync::atomic::{AtomicU32, Ordering};

use volatile::Volatile;

use crate::error::{status, ConnectError, InitError};
use crate::interrupts::{InterruptController, IrqHandler, IrqId, Trigger};

/// Interrupt ids handled by this controller (SGIs, PPIs and SPIs)
pub const MAX_INTERRUPTS: usize = 192;

/// First shared peripheral interrupt
const SPI_BASE: usize = 32;

/// IAR value meaning "nothing pending"
const SPURIOUS: u32 = 1023;
const IAR_ID_MASK: u32 = 0x3FF;

/// 32 implemented priority levels, low 3 bits read as zero
const PRIORITY_MASK: u8 = 0xF8;
const DEFAULT_PRIORITY: u8 = 0xA0;
const CPU0_TARGET: u8 = 0x01;
const TRIGGER_FIELD_MASK: u32 = 0x3;

const GICD_CTLR_ENABLE: u32 = 0x1;
const GICC_CTLR_ENABLE: u32 = 0x07;
/// Let everything above the lowest priority through
const GICC_PMR_DEFAULT: u32 = 0xF0;

/// Interrupts acknowledged with nothing pending
static SPURIOUS_IRQS: AtomicU32 = AtomicU32::new(0);
/// Interrupts acknowledged with no handler bound
static UNHANDLED_IRQS: AtomicU32 = AtomicU32::new(0);

/// Dispatch anomalies since boot: (spurious, unhandled)
pub fn dispatch_anomalies() -> (u32, u32) {
    (SPURIOUS_IRQS.load(Ordering::Relaxed), UNHANDLED_IRQS.load(Ordering::Relaxed))
}

/// Where one controller instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GicConfig {
    pub device_id: u16,
    pub dist_base: usize,
    pub cpu_base: usize,
}

/// Controller instances on this board
pub const GIC_CONFIG_TABLE: [GicConfig; 1] = [GicConfig {
    device_id: 0,
    dist_base: 0xF901_0000,
    cpu_base: 0xF902_0000,
}];

/// Find the configuration for `device_id`
pub fn lookup_config(device_id: u16) -> Result<&'static GicConfig, InitError> {
    GIC_CONFIG_TABLE
        .iter()
        .find(|cfg| cfg.device_id == device_id)
        .ok_or(InitError::ConfigurationRejected { code: status::DEVICE_NOT_FOUND })
}

/// Distributor register block
#[repr(C)]
pub struct GicDistributor {
    pub ctlr: Volatile<u32>,
    pub typer: Volatile<u32>,
    pub iidr: Volatile<u32>,
    _reserved0: [u32; 29],
    pub igroupr: [Volatile<u32>; 32],
    pub isenabler: [Volatile<u32>; 32],
    pub icenabler: [Volatile<u32>; 32],
    pub ispendr: [Volatile<u32>; 32],
    pub icpendr: [Volatile<u32>; 32],
    pub isactiver: [Volatile<u32>; 32],
    pub icactiver: [Volatile<u32>; 32],
    pub ipriorityr: [Volatile<u8>; 1024],
    pub itargetsr: [Volatile<u8>; 1024],
    pub icfgr: [Volatile<u32>; 64],
}

/// CPU interface register block
#[repr(C)]
pub struct GicCpuInterface {
    pub ctlr: Volatile<u32>,
    pub pmr: Volatile<u32>,
    pub bpr: Volatile<u32>,
    pub iar: Volatile<u32>,
    pub eoir: Volatile<u32>,
    pub rpr: Volatile<u32>,
    pub hppir: Volatile<u32>,
}

const _: () = {
    assert!(offset_of!(GicDistributor, igroupr) == 0x080);
    assert!(offset_of!(GicDistributor, isenabler) == 0x100);
    assert!(offset_of!(GicDistributor, icenabler) == 0x180);
    assert!(offset_of!(GicDistributor, ipriorityr) == 0x400);
    assert!(offset_of!(GicDistributor, itargetsr) == 0x800);
    assert!(offset_of!(GicDistributor, icfgr) == 0xC00);
    assert!(offset_of!(GicCpuInterface, iar) == 0x0C);
    assert!(offset_of!(GicCpuInterface, eoir) == 0x10);
};

impl GicDistributor {
    /// Interrupt lines implemented, from TYPER.ITLinesNumber
    pub fn lines(&self) -> usize {
        32 * ((self.typer.read() & 0x1F) as usize + 1)
    }

    #[cfg(test)]
    pub(crate) fn zeroed() -> GicDistributor {
        // SAFETY: plain integer cells, all-zero is valid
        unsafe { core::mem::zeroed() }
    }
}

impl GicCpuInterface {
    #[cfg(test)]
    pub(crate) fn zeroed() -> GicCpuInterface {
        // SAFETY: plain integer cells, all-zero is valid
        unsafe { core::mem::zeroed() }
    }
}

/// The platform interrupt controller
pub struct ScuGic {
    dist: &'static mut GicDistributor,
    cpu: &'static mut GicCpuInterface,
    handlers: [Option<&'static dyn IrqHandler>; MAX_INTERRUPTS],
}

impl ScuGic {
    /// Look up controller `device_id` and bring it up.
    ///
    /// # Safety
    ///
    /// The configured register blocks must be mapped as device memory and
    /// not be in use by anything else.
    pub unsafe fn initialize(device_id: u16) -> Result<ScuGic, InitError> {
        let cfg = lookup_config(device_id)?;
        let dist = &mut *(cfg.dist_base as *mut GicDistributor);
        let cpu = &mut *(cfg.cpu_base as *mut GicCpuInterface);
        ScuGic::cfg_initialize(dist, cpu)
    }

    /// Bring up the controller from its register blocks.
    ///
    /// Fails if the distributor implements fewer lines than this driver
    /// dispatches.
    pub fn cfg_initialize(
        dist: &'static mut GicDistributor,
        cpu: &'static mut GicCpuInterface,
    ) -> Result<ScuGic, InitError> {
        if dist.lines() < MAX_INTERRUPTS {
            return Err(InitError::ConfigurationRejected { code: status::FAILURE });
        }

        let mut gic = ScuGic {
            dist,
            cpu,
            handlers: [None; MAX_INTERRUPTS],
        };
        gic.distributor_init();
        gic.cpu_init();

        uart_println!("[GIC] initialized, {} lines", gic.dist.lines());
        Ok(gic)
    }

    fn distributor_init(&mut self) {
        self.dist.ctlr.write(0);

        // SPIs: level-high, default priority, to CPU0, disabled
        for word in SPI_BASE / 16..MAX_INTERRUPTS / 16 {
            self.dist.icfgr[word].write(0);
        }
        for id in SPI_BASE..MAX_INTERRUPTS {
            self.dist.ipriorityr[id].write(DEFAULT_PRIORITY);
            self.dist.itargetsr[id].write(CPU0_TARGET);
        }
        for word in SPI_BASE / 32..MAX_INTERRUPTS / 32 {
            self.dist.icenabler[word].write(0xFFFF_FFFF);
        }

        self.dist.ctlr.write(GICD_CTLR_ENABLE);
    }

    fn cpu_init(&mut self) {
        self.cpu.pmr.write(GICC_PMR_DEFAULT);
        self.cpu.ctlr.write(GICC_CTLR_ENABLE);
    }

    fn in_range(irq: IrqId) -> bool {
        irq.as_usize() < MAX_INTERRUPTS
    }
}

impl InterruptController for ScuGic {
    fn set_priority_trigger_type(&mut self, irq: IrqId, priority: u8, trigger: Trigger) {
        if !Self::in_range(irq) {
            return;
        }
        let id = irq.as_usize();
        self.dist.ipriorityr[id].write(priority & PRIORITY_MASK);

        let shift = (id % 16) * 2;
        self.dist.icfgr[id / 16].update(|value| {
            *value &= !(TRIGGER_FIELD_MASK << shift);
            *value |= (u32::from(trigger.bits()) & TRIGGER_FIELD_MASK) << shift;
        });
    }

    fn connect(&mut self, irq: IrqId, handler: &'static dyn IrqHandler) -> Result<(), ConnectError> {
        if !Self::in_range(irq) {
            return Err(ConnectError::BindingRejected { irq, code: status::INVALID_PARAM });
        }
        let slot = &mut self.handlers[irq.as_usize()];
        if slot.is_some() {
            return Err(ConnectError::BindingRejected { irq, code: status::DEVICE_BUSY });
        }
        *slot = Some(handler);
        Ok(())
    }

    fn enable(&mut self, irq: IrqId) {
        if Self::in_range(irq) {
            let id = irq.as_usize();
            self.dist.isenabler[id / 32].write(1 << (id % 32));
        }
    }

    fn dispatch(&mut self) {
        let iar = self.cpu.iar.read();
        let id = iar & IAR_ID_MASK;
        if id == SPURIOUS {
            SPURIOUS_IRQS.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.handlers.get(id as usize).copied().flatten() {
            Some(handler) => handler.handle(),
            None => {
                UNHANDLED_IRQS.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.cpu.eoir.write(iar);
    }
}
