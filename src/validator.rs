//! Stream validator
//!
//! The generator emits 0, 1, 2, ... as 64-bit words. Every captured word is
//! compared to the expected counter. On a mismatch the counter is
//! resynchronized to the observed value, so a jump in the stream is reported
//! where it happens and not again for every word after it.

use zerocopy::FromBytes;

use crate::config::WORD_BYTES;
use crate::error::RegionFault;
use crate::report::{MismatchRecord, Reporter};

/// A captured memory range, as reported by the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub address: usize,
    pub len: usize,
}

impl CaptureRegion {
    pub const fn new(address: usize, len: usize) -> Self {
        CaptureRegion { address, len }
    }

    /// One past the last byte, `None` if the range wraps the address space
    pub fn end(&self) -> Option<usize> {
        self.address.checked_add(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if `other` lies entirely inside `self`
    pub fn contains(&self, other: &CaptureRegion) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => other.address >= self.address && other_end <= end,
            _ => false,
        }
    }
}

/// The next word value expected in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationState {
    expected: u64,
}

impl ValidationState {
    pub const fn new(initial: u64) -> Self {
        ValidationState { expected: initial }
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Consume one word. Returns the value that was expected if `word` didn't match.
    #[inline]
    pub fn observe(&mut self, word: u64) -> Option<u64> {
        let expected = self.expected;
        self.expected = word.wrapping_add(1);
        if word == expected {
            None
        } else {
            Some(expected)
        }
    }
}

/// Running totals since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorStats {
    pub portions: u64,
    pub empty_portions: u64,
    pub words: u64,
    pub mismatches: u64,
    /// Mismatches counted but not reported individually
    pub suppressed: u64,
    pub region_faults: u64,
    pub partial_bytes: u64,
    pub last_fifo_volume: u32,
    pub last_service_ticks: u64,
    pub max_service_ticks: u64,
    /// Portion events lost because the handler found its state busy
    pub missed_events: u32,
    /// Generator output, sampled when progress is reported
    pub generator_words: u64,
    pub generator_packets: u64,
}

/// Result of checking one portion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortionSummary {
    pub words: usize,
    pub mismatches: u32,
    pub suppressed: u32,
    pub partial_bytes: usize,
}

pub struct StreamValidator {
    state: ValidationState,
    stats: ValidatorStats,
    report_limit: u32,
}

impl StreamValidator {
    /// `report_limit` caps individual mismatch reports per portion
    pub fn new(initial: u64, report_limit: u32) -> Self {
        StreamValidator {
            state: ValidationState::new(initial),
            stats: ValidatorStats::default(),
            report_limit,
        }
    }

    pub fn expected(&self) -> u64 {
        self.state.expected()
    }

    pub fn stats(&self) -> &ValidatorStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ValidatorStats {
        &mut self.stats
    }

    /// Check a run of words captured at `region`
    pub fn check_words<P: Reporter>(
        &mut self,
        region: CaptureRegion,
        words: &[u64],
        reporter: &mut P,
    ) -> PortionSummary {
        let mut summary = PortionSummary { words: words.len(), ..PortionSummary::default() };

        for (index, &word) in words.iter().enumerate() {
            if let Some(expected) = self.state.observe(word) {
                summary.mismatches += 1;
                if summary.mismatches <= self.report_limit {
                    reporter.mismatch(&MismatchRecord { region, word_index: index, expected, observed: word });
                } else {
                    summary.suppressed += 1;
                }
            }
        }

        if summary.suppressed > 0 {
            reporter.suppressed(region, summary.suppressed);
        }

        self.stats.words += words.len() as u64;
        self.stats.mismatches += u64::from(summary.mismatches);
        self.stats.suppressed += u64::from(summary.suppressed);
        summary
    }

    /// Check raw captured bytes.
    ///
    /// Only whole words are checked. Trailing bytes are reported as a
    /// `PartialWord` fault and do not advance the counter.
    pub fn check_bytes<P: Reporter>(
        &mut self,
        region: CaptureRegion,
        bytes: &[u8],
        reporter: &mut P,
    ) -> Result<PortionSummary, RegionFault> {
        let partial = bytes.len() % WORD_BYTES;
        let whole = &bytes[..bytes.len() - partial];
        let words = u64::slice_from(whole).ok_or(RegionFault::Misaligned)?;

        let mut summary = self.check_words(region, words, reporter);

        if partial != 0 {
            let fault = RegionFault::PartialWord { bytes: partial };
            summary.partial_bytes = partial;
            self.stats.partial_bytes += partial as u64;
            self.stats.region_faults += 1;
            reporter.region_fault(region, fault);
        }
        Ok(summary)
    }
}
