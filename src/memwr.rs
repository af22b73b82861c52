//! Memory writer interrupt handler
//!
//! Runs once per completed portion: snapshot the writer's registers,
//! invalidate the CPU cache over the reported range, then validate the
//! words. It never writes a peripheral register; the snapshot reads
//! consume the edge-triggered event.

use core::sync::atomic::{compiler_fence, AtomicU32, Ordering};

use spin::Mutex;

use crate::config::{Config, WORD_BYTES};
use crate::error::RegionFault;
use crate::interrupts::IrqHandler;
use crate::regs::{GeneratorCounters, MemoryWriter};
use crate::report::Reporter;
use crate::sequencer::WriterAccess;
use crate::validator::{CaptureRegion, PortionSummary, StreamValidator};

/// Memory the writer captures into, as seen by the CPU
pub trait DmaMemory {
    /// The whole capture window
    fn window(&self) -> CaptureRegion;

    /// Discard CPU cache lines covering `region`
    fn invalidate(&self, region: CaptureRegion);

    /// Bytes of `region`. Callers only pass regions inside `window()`.
    fn bytes(&self, region: CaptureRegion) -> &[u8];
}

/// Free-running tick counter used to time the handler
pub trait Clock {
    fn ticks(&self) -> u64;
}

/// What one handler invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOutcome {
    Checked(PortionSummary),
    /// Writer reported a zero-length portion
    Empty,
    Rejected(RegionFault),
}

/// Everything the handler owns: writer view, capture memory, validator state
pub struct MemwrContext<W, M, K, P> {
    writer: W,
    memory: M,
    clock: K,
    reporter: P,
    validator: StreamValidator,
    progress_interval: u32,
    generator: Option<&'static GeneratorCounters>,
}

impl<W, M, K, P> MemwrContext<W, M, K, P>
where
    W: MemoryWriter,
    M: DmaMemory,
    K: Clock,
    P: Reporter,
{
    pub fn new(writer: W, memory: M, clock: K, reporter: P, config: &Config) -> Self {
        MemwrContext {
            writer,
            memory,
            clock,
            reporter,
            validator: StreamValidator::new(0, config.mismatch_report_limit),
            progress_interval: config.progress_interval,
            generator: None,
        }
    }

    /// Include the generator's output counters in progress reports
    pub fn with_generator_counters(mut self, counters: &'static GeneratorCounters) -> Self {
        self.generator = Some(counters);
        self
    }

    /// Handle one "portion delivered" event
    pub fn service(&mut self) -> ServiceOutcome {
        let start = self.clock.ticks();

        let snapshot = self.writer.snapshot();
        let region = CaptureRegion::new(snapshot.address as usize, snapshot.length as usize);

        let outcome = self.check_region(region);

        let elapsed = self.clock.ticks().wrapping_sub(start);
        let stats = self.validator.stats_mut();
        stats.portions += 1;
        stats.last_fifo_volume = snapshot.fifo_volume;
        stats.last_service_ticks = elapsed;
        stats.max_service_ticks = stats.max_service_ticks.max(elapsed);

        if self.progress_interval != 0 && stats.portions % u64::from(self.progress_interval) == 0 {
            if let Some(generator) = self.generator {
                stats.generator_words = generator.data_count();
                stats.generator_packets = generator.packet_count();
            }
            let stats = *stats;
            self.reporter.progress(&stats);
        }

        outcome
    }

    fn check_region(&mut self, region: CaptureRegion) -> ServiceOutcome {
        if region.is_empty() {
            self.validator.stats_mut().empty_portions += 1;
            return ServiceOutcome::Empty;
        }

        let fault = if !self.memory.window().contains(&region) {
            Some(RegionFault::OutOfWindow)
        } else if region.address % WORD_BYTES != 0 {
            Some(RegionFault::Misaligned)
        } else {
            None
        };
        if let Some(fault) = fault {
            return self.reject(region, fault);
        }

        self.memory.invalidate(region);
        // no load from the region may be hoisted above the invalidate
        compiler_fence(Ordering::Acquire);

        let bytes = self.memory.bytes(region);
        match self.validator.check_bytes(region, bytes, &mut self.reporter) {
            Ok(summary) => ServiceOutcome::Checked(summary),
            Err(fault) => self.reject(region, fault),
        }
    }

    fn reject(&mut self, region: CaptureRegion, fault: RegionFault) -> ServiceOutcome {
        self.validator.stats_mut().region_faults += 1;
        self.reporter.region_fault(region, fault);
        ServiceOutcome::Rejected(fault)
    }

    pub fn validator(&self) -> &StreamValidator {
        &self.validator
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn reporter(&self) -> &P {
        &self.reporter
    }
}

/// The bound handler object for the writer's interrupt
pub struct MemwrIrq<W, M, K, P> {
    context: Mutex<MemwrContext<W, M, K, P>>,
    /// Invocations that found the context held by the foreground
    contended: AtomicU32,
}

impl<W, M, K, P> MemwrIrq<W, M, K, P>
where
    W: MemoryWriter,
    M: DmaMemory,
    K: Clock,
    P: Reporter,
{
    pub fn new(context: MemwrContext<W, M, K, P>) -> Self {
        MemwrIrq {
            context: Mutex::new(context),
            contended: AtomicU32::new(0),
        }
    }

    /// Lend the writer view to the foreground (startup sequencing only)
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(self.context.lock().writer_mut())
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&mut MemwrContext<W, M, K, P>) -> R) -> R {
        f(&mut self.context.lock())
    }

    pub fn contended(&self) -> u32 {
        self.contended.load(Ordering::Relaxed)
    }
}

impl<W, M, K, P> WriterAccess for MemwrIrq<W, M, K, P>
where
    W: MemoryWriter,
    M: DmaMemory,
    K: Clock,
    P: Reporter,
{
    type Writer = W;

    fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(self.context.lock().writer_mut())
    }
}

impl<W, M, K, P> IrqHandler for MemwrIrq<W, M, K, P>
where
    W: MemoryWriter + Send,
    M: DmaMemory + Send,
    K: Clock + Send,
    P: Reporter + Send,
{
    fn handle(&self) {
        match self.context.try_lock() {
            Some(mut context) => {
                context.validator.stats_mut().missed_events = self.contended.load(Ordering::Relaxed);
                context.service();
            }
            None => {
                self.contended.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::WriterRegs;
    use crate::testing::{EventLog, FakeClock, MockMemory, RecordingReporter};

    const BASE: usize = 0x1000_0000;

    fn context(
        words: usize,
        log: &EventLog,
    ) -> MemwrContext<WriterRegs, MockMemory, FakeClock, RecordingReporter> {
        MemwrContext::new(
            WriterRegs::zeroed(),
            MockMemory::counting(BASE, words, log.clone()),
            FakeClock::new(5),
            RecordingReporter::default(),
            &Config::DEFAULT,
        )
    }

    fn report(ctx: &mut MemwrContext<WriterRegs, MockMemory, FakeClock, RecordingReporter>, address: usize, len: usize) {
        let writer = ctx.writer_mut();
        writer.fifo_current_volume.write(3);
        writer.current_address.write(address as u32);
        writer.transferred_size.write(len as u32);
    }

    #[test]
    fn test_invalidates_exactly_the_reported_region_before_reading() {
        let log = EventLog::new();
        let mut ctx = context(4096, &log);

        let portions = [(BASE, 8192), (BASE + 8192, 8192), (BASE + 16384, 4096)];
        for &(address, len) in &portions {
            report(&mut ctx, address, len);
            ctx.service();
        }

        assert_eq!(
            log.events(),
            [
                format!("mem.invalidate {:#x} 8192", BASE),
                format!("mem.read {:#x} 8192", BASE),
                format!("mem.invalidate {:#x} 8192", BASE + 8192),
                format!("mem.read {:#x} 8192", BASE + 8192),
                format!("mem.invalidate {:#x} 4096", BASE + 16384),
                format!("mem.read {:#x} 4096", BASE + 16384),
            ]
        );
        assert_eq!(ctx.validator().expected(), (8192 + 8192 + 4096) / 8);
        assert!(ctx.reporter().mismatches.is_empty());
    }

    #[test]
    fn test_out_of_window_region_is_not_touched() {
        let log = EventLog::new();
        let mut ctx = context(1024, &log);

        report(&mut ctx, BASE + 4096, 8192);
        assert_eq!(ctx.service(), ServiceOutcome::Rejected(RegionFault::OutOfWindow));

        report(&mut ctx, BASE + 4, 64);
        assert_eq!(ctx.service(), ServiceOutcome::Rejected(RegionFault::Misaligned));

        assert!(log.events().is_empty());
        assert_eq!(ctx.validator().stats().region_faults, 2);
        assert_eq!(ctx.validator().expected(), 0);
        assert_eq!(ctx.reporter().faults.len(), 2);
    }

    #[test]
    fn test_empty_portion() {
        let log = EventLog::new();
        let mut ctx = context(16, &log);

        report(&mut ctx, BASE, 0);
        assert_eq!(ctx.service(), ServiceOutcome::Empty);
        assert!(log.events().is_empty());
        assert_eq!(ctx.validator().stats().empty_portions, 1);
        assert_eq!(ctx.validator().stats().portions, 1);
    }

    #[test]
    fn test_corruption_reported_with_region_and_handler_keeps_going() {
        let log = EventLog::new();
        let mut ctx = context(256, &log);
        ctx.memory.words[100] = 0xFFFF;

        report(&mut ctx, BASE, 1024);
        ctx.service();
        report(&mut ctx, BASE + 1024, 1024);
        ctx.service();

        let first = ctx.reporter().mismatches[0];
        assert_eq!(first.region, CaptureRegion::new(BASE, 1024));
        assert_eq!((first.expected, first.observed), (100, 0xFFFF));
        assert_eq!(first.word_address(), BASE + 800);
        assert_eq!(ctx.reporter().mismatches.len(), 2);
        assert_eq!(ctx.validator().stats().portions, 2);
        assert_eq!(ctx.validator().expected(), 256);
    }

    #[test]
    fn test_service_time_and_fifo_tracked() {
        let log = EventLog::new();
        let mut ctx = context(64, &log);

        report(&mut ctx, BASE, 512);
        ctx.service();

        let stats = ctx.validator().stats();
        assert_eq!(stats.last_fifo_volume, 3);
        assert_eq!(stats.last_service_ticks, 5);
        assert_eq!(stats.max_service_ticks, 5);
    }

    #[test]
    fn test_progress_emitted_every_interval() {
        let log = EventLog::new();
        let config = Config { progress_interval: 2, ..Config::DEFAULT };
        let mut ctx = MemwrContext::new(
            WriterRegs::zeroed(),
            MockMemory::counting(BASE, 64, log.clone()),
            FakeClock::new(1),
            RecordingReporter::default(),
            &config,
        );

        for i in 0..5 {
            report(&mut ctx, BASE + i * 64, 64);
            ctx.service();
        }
        assert_eq!(ctx.reporter().progress, 2);
    }

    #[test]
    fn test_handler_skips_when_context_is_held() {
        let log = EventLog::new();
        let irq = MemwrIrq::new(context(64, &log));

        irq.with_context(|ctx| {
            report(ctx, BASE, 64);
            // a nested interrupt here must not spin on the lock
            irq.handle();
        });
        assert_eq!(irq.contended(), 1);

        irq.handle();
        assert_eq!(irq.contended(), 1);
        irq.with_context(|ctx| {
            assert_eq!(ctx.validator().expected(), 8);
            assert_eq!(ctx.validator().stats().missed_events, 1);
        });
    }

    #[test]
    fn test_progress_carries_generator_counters() {
        let log = EventLog::new();
        let counters = Box::leak(Box::new(GeneratorCounters::zeroed()));
        counters.data_count_lo.write(16);
        counters.packet_count_lo.write(2);
        let config = Config { progress_interval: 2, ..Config::DEFAULT };
        let mut ctx = MemwrContext::new(
            WriterRegs::zeroed(),
            MockMemory::counting(BASE, 64, log.clone()),
            FakeClock::new(1),
            RecordingReporter::default(),
            &config,
        )
        .with_generator_counters(counters);

        report(&mut ctx, BASE, 64);
        ctx.service();
        // sampled only when progress is due
        assert_eq!(ctx.validator().stats().generator_words, 0);

        report(&mut ctx, BASE + 64, 64);
        ctx.service();
        let stats = ctx.validator().stats();
        assert_eq!((stats.generator_words, stats.generator_packets), (16, 2));
        assert_eq!(ctx.reporter().progress, 1);
    }
}
