//! Test doubles for the hardware seams
//!
//! Mocks record what they were asked to do into a shared `EventLog`, so
//! tests can assert ordering across components.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use zerocopy::AsBytes;

use crate::error::{ConnectError, RegionFault, StartupError};
use crate::interrupts::{CpuInterrupts, Dispatch, InterruptController, IrqHandler, IrqId, Trigger};
use crate::memwr::{Clock, DmaMemory};
use crate::regs::{DumpGenerator, MemoryWriter, WriterSnapshot};
use crate::report::{MismatchRecord, Reporter};
use crate::validator::{CaptureRegion, ValidatorStats};

/// Leak a value for the `'static` borrows handlers and dispatchers need
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.position(event).is_some()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn starting_with(&self, prefix: &str) -> Vec<String> {
        self.events().into_iter().filter(|e| e.starts_with(prefix)).collect()
    }
}

pub struct NullHandler;

impl IrqHandler for NullHandler {
    fn handle(&self) {}
}

#[derive(Default)]
pub struct CountingHandler(pub AtomicU32);

impl CountingHandler {
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl IrqHandler for CountingHandler {
    fn handle(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Interrupt controller double. `pending` is what the next dispatch acknowledges.
pub struct MockGic {
    log: EventLog,
    pub reject_connect: Option<i32>,
    pub pending: Option<IrqId>,
    handlers: Vec<(IrqId, &'static dyn IrqHandler)>,
}

impl MockGic {
    pub fn new(log: EventLog) -> Self {
        MockGic { log, reject_connect: None, pending: None, handlers: Vec::new() }
    }
}

impl InterruptController for MockGic {
    fn set_priority_trigger_type(&mut self, irq: IrqId, priority: u8, trigger: Trigger) {
        self.log.record(format!("gic.priority_trigger {} {} {}", irq.value(), priority, trigger.bits()));
    }

    fn connect(&mut self, irq: IrqId, handler: &'static dyn IrqHandler) -> Result<(), ConnectError> {
        if let Some(code) = self.reject_connect {
            self.log.record(format!("gic.connect_rejected {}", irq.value()));
            return Err(ConnectError::BindingRejected { irq, code });
        }
        self.handlers.push((irq, handler));
        self.log.record(format!("gic.connect {}", irq.value()));
        Ok(())
    }

    fn enable(&mut self, irq: IrqId) {
        self.log.record(format!("gic.enable {}", irq.value()));
    }

    fn dispatch(&mut self) {
        let Some(irq) = self.pending.take() else { return };
        self.log.record(format!("gic.dispatch {}", irq.value()));
        if let Some((_, handler)) = self.handlers.iter().find(|(id, _)| *id == irq) {
            handler.handle();
        }
    }
}

/// CPU double. `fire` plays the exception vector.
pub struct MockCpu {
    log: EventLog,
    entry: Option<&'static dyn Dispatch>,
}

impl MockCpu {
    pub fn new(log: EventLog) -> Self {
        MockCpu { log, entry: None }
    }

    pub fn fire(&self) {
        if let Some(entry) = self.entry {
            entry.dispatch();
        }
    }
}

impl CpuInterrupts for MockCpu {
    fn install_irq_entry(&mut self, entry: &'static dyn Dispatch) {
        self.entry = Some(entry);
        self.log.record("cpu.install_irq_entry");
    }

    fn unmask_irqs(&mut self) {
        self.log.record("cpu.unmask_irqs");
    }
}

pub struct MockWriter {
    log: EventLog,
    pub snapshot: WriterSnapshot,
}

impl MockWriter {
    pub fn new(log: EventLog) -> Self {
        MockWriter { log, snapshot: WriterSnapshot { fifo_volume: 0, address: 0, length: 0 } }
    }
}

impl MemoryWriter for MockWriter {
    fn reset(&mut self) {
        self.log.record("writer.reset");
    }

    fn set_portion_size(&mut self, bytes: u32) {
        self.log.record(format!("writer.portion_size {}", bytes));
    }

    fn set_window(&mut self, base: u32, high: u32) {
        self.log.record(format!("writer.window {:#x} {:#x}", base, high));
    }

    fn arm(&mut self, pattern: u32) {
        self.log.record(format!("writer.arm {:#010x}", pattern));
    }

    fn snapshot(&self) -> WriterSnapshot {
        self.snapshot
    }

    fn clock_hz(&self) -> u32 {
        250_000_000
    }
}

pub struct MockGenerator {
    log: EventLog,
}

impl MockGenerator {
    pub fn new(log: EventLog) -> Self {
        MockGenerator { log }
    }
}

impl DumpGenerator for MockGenerator {
    fn reset(&mut self) {
        self.log.record("gen.reset");
    }

    fn set_packet_size(&mut self, bytes: u32) {
        self.log.record(format!("gen.packet_size {}", bytes));
    }

    fn set_packet_limit(&mut self, packets: u32) {
        self.log.record(format!("gen.packet_limit {}", packets));
    }

    fn set_pause(&mut self, cycles: u32) {
        self.log.record(format!("gen.pause {:#x}", cycles));
    }

    fn arm(&mut self) {
        self.log.record("gen.arm");
    }

    fn clock_hz(&self) -> u32 {
        250_000_000
    }
}

/// Capture memory backed by a word buffer that appears at `base`
pub struct MockMemory {
    base: usize,
    pub words: Vec<u64>,
    log: EventLog,
}

impl MockMemory {
    /// `words` words holding 0, 1, 2, ...
    pub fn counting(base: usize, words: usize, log: EventLog) -> Self {
        MockMemory { base, words: (0..words as u64).collect(), log }
    }
}

impl DmaMemory for MockMemory {
    fn window(&self) -> CaptureRegion {
        CaptureRegion::new(self.base, self.words.len() * 8)
    }

    fn invalidate(&self, region: CaptureRegion) {
        self.log.record(format!("mem.invalidate {:#x} {}", region.address, region.len));
    }

    fn bytes(&self, region: CaptureRegion) -> &[u8] {
        self.log.record(format!("mem.read {:#x} {}", region.address, region.len));
        let offset = region.address - self.base;
        &self.words.as_bytes()[offset..offset + region.len]
    }
}

/// Advances by `step` on every read
pub struct FakeClock {
    now: AtomicU64,
    step: u64,
}

impl FakeClock {
    pub fn new(step: u64) -> Self {
        FakeClock { now: AtomicU64::new(0), step }
    }
}

impl Clock for FakeClock {
    fn ticks(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub mismatches: Vec<MismatchRecord>,
    pub suppressed: Vec<(CaptureRegion, u32)>,
    pub faults: Vec<(CaptureRegion, RegionFault)>,
    pub progress: usize,
    pub failures: Vec<StartupError>,
}

impl Reporter for RecordingReporter {
    fn mismatch(&mut self, record: &MismatchRecord) {
        self.mismatches.push(*record);
    }

    fn suppressed(&mut self, region: CaptureRegion, count: u32) {
        self.suppressed.push((region, count));
    }

    fn region_fault(&mut self, region: CaptureRegion, fault: RegionFault) {
        self.faults.push((region, fault));
    }

    fn progress(&mut self, _stats: &ValidatorStats) {
        self.progress += 1;
    }

    fn startup_failure(&mut self, error: &StartupError) {
        self.failures.push(*error);
    }
}
