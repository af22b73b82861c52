//! Peripheral sequencer
//!
//! One-shot startup programming of the dump generator and the memory writer.
//! The writer is armed before the generator so it is already capturing when
//! the first packet leaves the generator.
//!
//! The writer view belongs to the interrupt handler once dispatch is live,
//! so the sequencer only borrows it for each register write and never holds
//! it while the generator runs or while logging.

use spin::Mutex;

use crate::config::{Config, VERBOSE_BOOT};
use crate::error::SequencingError;
use crate::interrupts::StartupProgress;
use crate::regs::{DumpGenerator, MemoryWriter};

/// Short-lived access to a writer view owned elsewhere
pub trait WriterAccess {
    type Writer: MemoryWriter;

    fn with_writer<R>(&self, f: impl FnOnce(&mut Self::Writer) -> R) -> R;
}

impl<W: MemoryWriter> WriterAccess for Mutex<W> {
    type Writer = W;

    fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        f(&mut self.lock())
    }
}

/// Program and arm both peripherals.
///
/// Requires the controller to be up, the writer's interrupt bound and CPU
/// dispatch enabled; refuses to run twice.
pub fn arm_peripherals<A, G>(
    config: &Config,
    progress: &mut StartupProgress,
    writer: &A,
    generator: &mut G,
) -> Result<(), SequencingError>
where
    A: WriterAccess + ?Sized,
    G: DumpGenerator,
{
    progress.check_ready_to_arm()?;

    if config.reset_peripherals {
        writer.with_writer(|w| w.reset());
        generator.reset();
    }

    if VERBOSE_BOOT {
        let writer_hz = writer.with_writer(|w| w.clock_hz());
        uart_println!("[SEQ] writer clock {} Hz, generator clock {} Hz", writer_hz, generator.clock_hz());
    }

    generator.set_packet_size(config.packet_size);
    generator.set_packet_limit(config.packet_limit);
    generator.set_pause(config.pause_cycles);

    writer.with_writer(|w| {
        w.set_portion_size(config.portion_size);
        w.set_window(config.capture_base, config.capture_high);
        w.arm(config.writer_ctrl);
    });

    // first portion can complete from here on
    generator.arm();
    progress.armed = true;

    uart_println!(
        "[SEQ] capturing {:#010x}..{:#010x} in {} byte portions",
        config.capture_base,
        config.capture_high,
        config.portion_size
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::{InterruptBinding, IrqId, Trigger};
    use crate::testing::{EventLog, MockGenerator, MockWriter};

    fn bound() -> StartupProgress {
        StartupProgress {
            controller_ready: true,
            binding: Some(InterruptBinding { irq: IrqId::new(121), priority: 0, trigger: Trigger::RisingEdge }),
            dispatch_enabled: true,
            armed: false,
        }
    }

    #[test]
    fn test_programs_then_arms_writer_before_generator() {
        let log = EventLog::new();
        let writer = Mutex::new(MockWriter::new(log.clone()));
        let mut generator = MockGenerator::new(log.clone());
        let mut progress = bound();

        arm_peripherals(&Config::DEFAULT, &mut progress, &writer, &mut generator).expect("arm");

        assert_eq!(
            log.events(),
            [
                "gen.packet_size 1024",
                "gen.packet_limit 0",
                "gen.pause 0x400",
                "writer.portion_size 1048576",
                "writer.window 0x10000000 0x18000000",
                "writer.arm 0x06000003",
                "gen.arm",
            ]
        );
        assert!(progress.armed);
    }

    #[test]
    fn test_reset_before_programming() {
        let log = EventLog::new();
        let writer = Mutex::new(MockWriter::new(log.clone()));
        let mut generator = MockGenerator::new(log.clone());
        let mut progress = bound();
        let config = Config { reset_peripherals: true, ..Config::DEFAULT };

        arm_peripherals(&config, &mut progress, &writer, &mut generator).expect("arm");

        let events = log.events();
        assert_eq!(&events[..2], ["writer.reset", "gen.reset"]);
        assert!(log.position("writer.arm 0x06000003") < log.position("gen.arm"));
    }

    #[test]
    fn test_refuses_before_dispatch_enabled() {
        let log = EventLog::new();
        let writer = Mutex::new(MockWriter::new(log.clone()));
        let mut generator = MockGenerator::new(log.clone());
        let mut progress = StartupProgress { dispatch_enabled: false, ..bound() };

        let err = arm_peripherals(&Config::DEFAULT, &mut progress, &writer, &mut generator).unwrap_err();

        assert_eq!(err, SequencingError::DispatchNotEnabled);
        assert!(log.events().is_empty());
        assert!(!progress.armed);
    }

    #[test]
    fn test_not_reentrant() {
        let log = EventLog::new();
        let writer = Mutex::new(MockWriter::new(log.clone()));
        let mut generator = MockGenerator::new(log.clone());
        let mut progress = bound();

        arm_peripherals(&Config::DEFAULT, &mut progress, &writer, &mut generator).expect("arm");
        let writes = log.events().len();

        assert_eq!(
            arm_peripherals(&Config::DEFAULT, &mut progress, &writer, &mut generator),
            Err(SequencingError::AlreadyArmed)
        );
        assert_eq!(log.events().len(), writes);
    }

    /// Generator that records whether the writer view was free when it started
    struct WatchingGenerator<'a> {
        inner: MockGenerator,
        writer: &'a Mutex<MockWriter>,
        writer_free_at_arm: Option<bool>,
    }

    impl DumpGenerator for WatchingGenerator<'_> {
        fn reset(&mut self) {
            self.inner.reset()
        }

        fn set_packet_size(&mut self, bytes: u32) {
            self.inner.set_packet_size(bytes)
        }

        fn set_packet_limit(&mut self, packets: u32) {
            self.inner.set_packet_limit(packets)
        }

        fn set_pause(&mut self, cycles: u32) {
            self.inner.set_pause(cycles)
        }

        fn arm(&mut self) {
            self.writer_free_at_arm = Some(!self.writer.is_locked());
            self.inner.arm()
        }

        fn clock_hz(&self) -> u32 {
            self.inner.clock_hz()
        }
    }

    #[test]
    fn test_writer_view_released_before_generator_starts() {
        let log = EventLog::new();
        let writer = Mutex::new(MockWriter::new(log.clone()));
        let mut generator = WatchingGenerator {
            inner: MockGenerator::new(log.clone()),
            writer: &writer,
            writer_free_at_arm: None,
        };
        let mut progress = bound();

        arm_peripherals(&Config::DEFAULT, &mut progress, &writer, &mut generator).expect("arm");

        assert_eq!(generator.writer_free_at_arm, Some(true));
        assert!(log.position("writer.arm 0x06000003") < log.position("gen.arm"));
    }
}
