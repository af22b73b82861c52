//! Register views for the memory writer and dump generator
//!
//! Both blocks are overlaid on device memory with `volatile::Volatile`
//! fields, so every access is an ordered load/store the compiler cannot
//! elide or merge. The mapping must be device (non-cacheable) memory.
//!
//! `MemoryWriter` and `DumpGenerator` are the device-control operations the
//! rest of the firmware uses; they are implemented by the register blocks
//! and by test doubles.

use core::mem::offset_of;
use volatile::Volatile;

/// Memory writer control register bits
pub mod writer_ctrl {
    /// Start capturing
    pub const START: u32 = 1 << 0;
    /// Wrap at the high address instead of stopping (circular capture)
    pub const CONTINUOUS: u32 = 1 << 1;
    /// Raise the user event (interrupt) at every completed portion
    pub const EVENT_ENABLE: u32 = 0x06 << 24;
}

/// Dump generator control register bits
pub mod generator_ctrl {
    pub const START: u32 = 1 << 0;
}

/// Pattern written to either reset register to return to power-on state
pub const RESET_PATTERN: u32 = 0x0000_0001;

/// AXI memory writer with user event interrupt
#[repr(C)]
pub struct WriterRegs {
    pub reset: Volatile<u32>,
    pub ctrl: Volatile<u32>,
    pub portion_size: Volatile<u32>,
    pub memory_highaddr: Volatile<u32>,
    pub interval: Volatile<u32>,
    pub freq_hz: Volatile<u32>,
    pub valid_count: Volatile<u32>,
    pub memory_baseaddr: Volatile<u32>,
    /// Start address of the portion that just completed
    pub current_address: Volatile<u32>,
    pub user_event_duration: Volatile<u32>,
    /// Length in bytes of the portion that just completed
    pub transferred_size: Volatile<u32>,
    pub fifo_current_volume: Volatile<u32>,
}

/// AXI dump (counting stream) generator
#[repr(C)]
pub struct GeneratorRegs {
    pub reset: Volatile<u32>,
    pub ctrl: Volatile<u32>,
    pub packet_size: Volatile<u32>,
    pub packet_limit: Volatile<u32>,
    pub pause: Volatile<u32>,
    pub freq_hz: Volatile<u32>,
    pub valid_count: Volatile<u32>,
    pub width: Volatile<u32>,
}

/// Offset of the generator's free-running counters from its base
pub const GENERATOR_COUNTERS_OFFSET: usize = 0x20;

/// Dump generator output counters, read-only.
///
/// Kept apart from `GeneratorRegs` so the interrupt handler can sample them
/// while the control block stays with the foreground.
#[repr(C)]
pub struct GeneratorCounters {
    pub data_count_hi: Volatile<u32>,
    pub data_count_lo: Volatile<u32>,
    pub packet_count_hi: Volatile<u32>,
    pub packet_count_lo: Volatile<u32>,
}

const _: () = {
    assert!(offset_of!(WriterRegs, portion_size) == 0x08);
    assert!(offset_of!(WriterRegs, memory_baseaddr) == 0x1C);
    assert!(offset_of!(WriterRegs, current_address) == 0x20);
    assert!(offset_of!(WriterRegs, transferred_size) == 0x28);
    assert!(offset_of!(WriterRegs, fifo_current_volume) == 0x2C);
    assert!(core::mem::size_of::<WriterRegs>() == 0x30);

    assert!(offset_of!(GeneratorRegs, packet_limit) == 0x0C);
    assert!(offset_of!(GeneratorRegs, pause) == 0x10);
    assert!(core::mem::size_of::<GeneratorRegs>() == GENERATOR_COUNTERS_OFFSET);
    assert!(offset_of!(GeneratorCounters, packet_count_lo) == 0x0C);
};

impl WriterRegs {
    /// Overlay the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the mapped address of a memory writer instance, and
    /// only one view of it may exist at a time.
    pub unsafe fn at(base: usize) -> &'static mut WriterRegs {
        &mut *(base as *mut WriterRegs)
    }

    /// Register block in ordinary memory, for tests
    #[cfg(test)]
    pub(crate) fn zeroed() -> WriterRegs {
        // SAFETY: all fields are u32 cells, all-zero is a valid value
        unsafe { core::mem::zeroed() }
    }
}

impl GeneratorRegs {
    /// Overlay the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the mapped address of a dump generator instance, and
    /// only one view of it may exist at a time.
    pub unsafe fn at(base: usize) -> &'static mut GeneratorRegs {
        &mut *(base as *mut GeneratorRegs)
    }

    #[cfg(test)]
    pub(crate) fn zeroed() -> GeneratorRegs {
        // SAFETY: see WriterRegs::zeroed
        unsafe { core::mem::zeroed() }
    }
}

impl GeneratorCounters {
    /// Overlay the counters of the generator whose register block is at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the mapped address of a dump generator instance.
    pub unsafe fn at(base: usize) -> &'static GeneratorCounters {
        &*((base + GENERATOR_COUNTERS_OFFSET) as *const GeneratorCounters)
    }

    #[cfg(test)]
    pub(crate) fn zeroed() -> GeneratorCounters {
        // SAFETY: see WriterRegs::zeroed
        unsafe { core::mem::zeroed() }
    }

    /// Words produced since start
    pub fn data_count(&self) -> u64 {
        read_split(|| self.data_count_hi.read(), || self.data_count_lo.read())
    }

    /// Packets produced since start
    pub fn packet_count(&self) -> u64 {
        read_split(|| self.packet_count_hi.read(), || self.packet_count_lo.read())
    }
}

/// Read a 64-bit counter exposed as two live 32-bit halves.
///
/// Re-reads until the high half is stable so a carry between the two loads
/// can't produce a torn value.
fn read_split(mut hi: impl FnMut() -> u32, mut lo: impl FnMut() -> u32) -> u64 {
    loop {
        let before = hi();
        let low = lo();
        if hi() == before {
            return (u64::from(before) << 32) | u64::from(low);
        }
    }
}

/// Writer registers read when a portion completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotField {
    FifoVolume,
    CurrentAddress,
    TransferredSize,
}

/// What the writer reports about the portion that raised the interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSnapshot {
    /// Diagnostic only
    pub fifo_volume: u32,
    pub address: u32,
    pub length: u32,
}

impl WriterSnapshot {
    /// Read the fields through `read`: FIFO volume, then address, then length
    pub fn capture(mut read: impl FnMut(SnapshotField) -> u32) -> WriterSnapshot {
        let fifo_volume = read(SnapshotField::FifoVolume);
        let address = read(SnapshotField::CurrentAddress);
        let length = read(SnapshotField::TransferredSize);
        WriterSnapshot { fifo_volume, address, length }
    }
}

/// Device-control operations on the memory writer
pub trait MemoryWriter {
    fn reset(&mut self);
    fn set_portion_size(&mut self, bytes: u32);
    /// Circular capture window `[base, high)`
    fn set_window(&mut self, base: u32, high: u32);
    /// Write the control register, `pattern` carries the start bit
    fn arm(&mut self, pattern: u32);
    /// Read FIFO volume, address and length of the completed portion, in that order
    fn snapshot(&self) -> WriterSnapshot;
    fn clock_hz(&self) -> u32;
}

/// Device-control operations on the dump generator
pub trait DumpGenerator {
    fn reset(&mut self);
    fn set_packet_size(&mut self, bytes: u32);
    /// 0 = unbounded
    fn set_packet_limit(&mut self, packets: u32);
    fn set_pause(&mut self, cycles: u32);
    fn arm(&mut self);
    fn clock_hz(&self) -> u32;
}

impl MemoryWriter for WriterRegs {
    fn reset(&mut self) {
        self.reset.write(RESET_PATTERN);
    }

    fn set_portion_size(&mut self, bytes: u32) {
        self.portion_size.write(bytes);
    }

    fn set_window(&mut self, base: u32, high: u32) {
        self.memory_baseaddr.write(base);
        self.memory_highaddr.write(high);
    }

    fn arm(&mut self, pattern: u32) {
        self.ctrl.write(pattern);
    }

    fn snapshot(&self) -> WriterSnapshot {
        WriterSnapshot::capture(|field| match field {
            SnapshotField::FifoVolume => self.fifo_current_volume.read(),
            SnapshotField::CurrentAddress => self.current_address.read(),
            SnapshotField::TransferredSize => self.transferred_size.read(),
        })
    }

    fn clock_hz(&self) -> u32 {
        self.freq_hz.read()
    }
}

impl DumpGenerator for GeneratorRegs {
    fn reset(&mut self) {
        self.reset.write(RESET_PATTERN);
    }

    fn set_packet_size(&mut self, bytes: u32) {
        self.packet_size.write(bytes);
    }

    fn set_packet_limit(&mut self, packets: u32) {
        self.packet_limit.write(packets);
    }

    fn set_pause(&mut self, cycles: u32) {
        self.pause.write(cycles);
    }

    fn arm(&mut self) {
        self.ctrl.write(generator_ctrl::START);
    }

    fn clock_hz(&self) -> u32 {
        self.freq_hz.read()
    }
}

impl<T: MemoryWriter + ?Sized> MemoryWriter for &mut T {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn set_portion_size(&mut self, bytes: u32) {
        (**self).set_portion_size(bytes)
    }

    fn set_window(&mut self, base: u32, high: u32) {
        (**self).set_window(base, high)
    }

    fn arm(&mut self, pattern: u32) {
        (**self).arm(pattern)
    }

    fn snapshot(&self) -> WriterSnapshot {
        (**self).snapshot()
    }

    fn clock_hz(&self) -> u32 {
        (**self).clock_hz()
    }
}

impl<T: DumpGenerator + ?Sized> DumpGenerator for &mut T {
    fn reset(&mut self) {
        (**self).reset()
    }

    fn set_packet_size(&mut self, bytes: u32) {
        (**self).set_packet_size(bytes)
    }

    fn set_packet_limit(&mut self, packets: u32) {
        (**self).set_packet_limit(packets)
    }

    fn set_pause(&mut self, cycles: u32) {
        (**self).set_pause(cycles)
    }

    fn arm(&mut self) {
        (**self).arm()
    }

    fn clock_hz(&self) -> u32 {
        (**self).clock_hz()
    }
}
