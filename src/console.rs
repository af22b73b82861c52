//! Console output
//!
//! On the board every line goes to the PS UART. Host test builds print to
//! stdout, other hosted builds discard output.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

/// Messages dropped by the non-blocking path because the UART was busy
static DROPPED: AtomicU32 = AtomicU32::new(0);

/// Print macro for the board console
#[macro_export]
macro_rules! uart_print {
    ($($arg:tt)*) => {{
        $crate::console::_print(format_args!($($arg)*));
    }};
}

/// Println macro for the board console
#[macro_export]
macro_rules! uart_println {
    () => ($crate::uart_print!("\n"));
    ($($arg:tt)*) => ($crate::uart_print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(all(target_arch = "aarch64", target_os = "none", not(test)))]
    {
        use core::fmt::Write;
        let _ = crate::arch::aarch64::uart::UART.lock().write_fmt(args);
    }

    #[cfg(test)]
    std::print!("{}", args);

    #[cfg(not(any(test, all(target_arch = "aarch64", target_os = "none"))))]
    let _ = args;
}

/// Emit a line only if the console is free right now.
///
/// Used from interrupt context: if the foreground (or a panic path) holds the
/// UART the line is dropped and counted instead of spinning on the lock.
pub fn try_println(args: fmt::Arguments) -> bool {
    #[cfg(all(target_arch = "aarch64", target_os = "none", not(test)))]
    {
        use core::fmt::Write;
        match crate::arch::aarch64::uart::UART.try_lock() {
            Some(mut uart) => {
                let _ = uart.write_fmt(args);
                let _ = uart.write_str("\n");
                true
            }
            None => {
                DROPPED.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    #[cfg(test)]
    {
        std::println!("{}", args);
        true
    }

    #[cfg(not(any(test, all(target_arch = "aarch64", target_os = "none"))))]
    {
        let _ = args;
        DROPPED.fetch_add(1, Ordering::Relaxed);
        false
    }
}

/// Number of lines dropped by [`try_println`]
pub fn dropped_lines() -> u32 {
    DROPPED.load(Ordering::Relaxed)
}
