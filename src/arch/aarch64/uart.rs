//! Cadence UART driver for the Zynq UltraScale+ PS
//!
//! Polled transmit on UART0. Baud rate and framing are set up by the boot
//! firmware before we run.

use core::fmt;
use core::ptr::{read_volatile, write_volatile};

/// PS UART0 base address
const UART_BASE: usize = 0xFF00_0000;

/// UART register offsets
const UART_SR: usize = 0x2C;      // Channel status
const UART_FIFO: usize = 0x30;    // TX/RX FIFO

/// Status register bits
const UART_SR_TXFULL: u32 = 1 << 4;  // Transmit FIFO full

/// Cadence UART driver
pub struct Uart {
    base: usize,
}

impl Uart {
    pub const fn new() -> Self {
        Uart { base: UART_BASE }
    }

    fn write_byte(&self, byte: u8) {
        unsafe {
            // Wait while transmit FIFO is full
            while (read_volatile((self.base + UART_SR) as *const u32) & UART_SR_TXFULL) != 0 {
                core::hint::spin_loop();
            }

            write_volatile((self.base + UART_FIFO) as *mut u32, byte as u32);
        }
    }

    fn write_string(&self, s: &str) {
        for byte in s.bytes() {
            // Convert \n to \r\n for terminals
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

/// Global UART instance
pub static UART: spin::Mutex<Uart> = spin::Mutex::new(Uart::new());
