//! Board configuration
//!
//! Every address, size and interrupt parameter the firmware programs lives
//! here. `Config::DEFAULT` matches the hardware design: writer at
//! 0x4000_0000, generator at 0x4001_0000, capture window 0x1000_0000 to
//! 0x1800_0000.

use crate::error::ConfigError;
use crate::interrupts::{IrqId, Trigger};
use crate::regs::writer_ctrl;

/// Enable verbose boot logging (disable for faster boot)
pub const VERBOSE_BOOT: bool = cfg!(debug_assertions);

/// Size of one captured stream word
pub const WORD_BYTES: usize = core::mem::size_of::<u64>();

/// Fabric interrupt raised by the memory writer when a portion completes (PL-PS IRQ0)
pub const MEMWR_USER_EVENT_IRQ: IrqId = IrqId::new(121);

/// Interrupt controller instance present on the board
pub const SCUGIC_DEVICE_ID: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Memory writer register block base
    pub writer_base: usize,
    /// Dump generator register block base
    pub generator_base: usize,

    /// First byte of the circular capture window
    pub capture_base: u32,
    /// End of the capture window (exclusive)
    pub capture_high: u32,
    /// Bytes collected per reported event
    pub portion_size: u32,
    /// Control pattern that starts the writer in continuous capture
    pub writer_ctrl: u32,

    /// Generator packet size in bytes
    pub packet_size: u32,
    /// Packets to produce before stopping, 0 = unbounded
    pub packet_limit: u32,
    /// Idle cycles inserted between packets
    pub pause_cycles: u32,

    pub gic_device_id: u16,
    pub memwr_irq: IrqId,
    /// 0 is the highest priority
    pub memwr_priority: u8,
    pub memwr_trigger: Trigger,

    /// Pulse both reset registers before programming
    pub reset_peripherals: bool,
    /// Mismatch records emitted per portion before the rest are only counted.
    /// `u32::MAX` reports every mismatching word.
    pub mismatch_report_limit: u32,
    /// Emit a progress line every N portions, 0 disables
    pub progress_interval: u32,
}

impl Config {
    pub const DEFAULT: Config = Config {
        writer_base: 0x4000_0000,
        generator_base: 0x4001_0000,

        capture_base: 0x1000_0000,
        capture_high: 0x1800_0000,
        portion_size: 1 << 20,
        writer_ctrl: writer_ctrl::EVENT_ENABLE | writer_ctrl::CONTINUOUS | writer_ctrl::START,

        packet_size: 1024,
        packet_limit: 0,
        pause_cycles: 0x0000_0400,

        gic_device_id: SCUGIC_DEVICE_ID,
        memwr_irq: MEMWR_USER_EVENT_IRQ,
        memwr_priority: 0,
        memwr_trigger: Trigger::RisingEdge,

        reset_peripherals: false,
        mismatch_report_limit: u32::MAX,
        progress_interval: if VERBOSE_BOOT { 128 } else { 0 },
    };

    /// Size of the capture window in bytes
    pub fn window_len(&self) -> u32 {
        self.capture_high.saturating_sub(self.capture_base)
    }

    /// Check the values against what the peripherals can actually do
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_high <= self.capture_base {
            return Err(ConfigError::EmptyWindow);
        }
        if self.capture_base as usize % WORD_BYTES != 0 {
            return Err(ConfigError::MisalignedWindow);
        }
        if self.portion_size == 0 || self.portion_size as usize % WORD_BYTES != 0 {
            return Err(ConfigError::BadPortionSize);
        }
        if self.portion_size > self.window_len() {
            return Err(ConfigError::PortionExceedsWindow);
        }
        // the writer wraps at capture_high, a partial last portion would straddle it
        if self.window_len() % self.portion_size != 0 {
            return Err(ConfigError::WindowNotPortionMultiple);
        }
        if self.packet_size == 0 || self.packet_size as usize % WORD_BYTES != 0 {
            return Err(ConfigError::BadPacketSize);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::DEFAULT
    }
}
