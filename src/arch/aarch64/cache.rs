/*
 * ARM64 data cache maintenance
 *
 * The memory writer stores into DRAM behind the CPU's back, so before the
 * CPU reads a captured portion the lines covering it are invalidated by
 * virtual address (DC IVAC). Lines only partly covered by the range are
 * cleaned and invalidated (DC CIVAC) so data sharing those lines survives.
 */

use core::arch::asm;

use crate::memwr::DmaMemory;
use crate::validator::CaptureRegion;

/// Smallest data cache line size in bytes, from CTR_EL0.DminLine
#[inline]
pub fn dcache_line_size() -> usize {
    let ctr: u64;
    unsafe {
        asm!("mrs {0}, ctr_el0", out(reg) ctr, options(nomem, nostack, preserves_flags));
    }
    4 << ((ctr >> 16) & 0xF)
}

/// Invalidate the data cache over `[addr, addr + len)`
pub fn invalidate_dcache_range(addr: usize, len: usize) {
    if len == 0 {
        return;
    }

    let line = dcache_line_size();
    let end = addr + len;
    let mut cursor = addr & !(line - 1);

    unsafe {
        asm!("dsb sy", options(nostack, preserves_flags));

        while cursor < end {
            let partial = cursor < addr || cursor + line > end;
            if partial {
                asm!("dc civac, {0}", in(reg) cursor, options(nostack, preserves_flags));
            } else {
                asm!("dc ivac, {0}", in(reg) cursor, options(nostack, preserves_flags));
            }
            cursor += line;
        }

        asm!("dsb sy", options(nostack, preserves_flags));
    }
}

/// The physical capture window, identity mapped as normal cacheable memory
pub struct CaptureWindow {
    window: CaptureRegion,
}

impl CaptureWindow {
    /// # Safety
    ///
    /// `[base, base + len)` must be mapped, readable, and reserved for the
    /// memory writer (nothing else may allocate from it).
    pub unsafe fn new(base: usize, len: usize) -> Self {
        CaptureWindow { window: CaptureRegion::new(base, len) }
    }
}

impl DmaMemory for CaptureWindow {
    fn window(&self) -> CaptureRegion {
        self.window
    }

    fn invalidate(&self, region: CaptureRegion) {
        invalidate_dcache_range(region.address, region.len);
    }

    fn bytes(&self, region: CaptureRegion) -> &[u8] {
        debug_assert!(self.window.contains(&region));
        // SAFETY: the region is inside the window reserved at construction.
        // The writer may already be filling later portions, never this one.
        unsafe { core::slice::from_raw_parts(region.address as *const u8, region.len) }
    }
}
