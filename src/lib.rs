//! memwr_check - Streaming capture validator for the memory writer / dump generator pair
//!
//! The dump generator produces a counting stream, the memory writer captures it
//! into a circular DRAM window and raises an interrupt per completed portion,
//! and the interrupt handler checks every captured 64-bit word against the
//! expected counter.

#![cfg_attr(not(test), no_std)] // Host unit tests link std

#[macro_use]
pub mod console;

pub mod app;
pub mod config;
pub mod error;
pub mod gic;
pub mod interrupts;
pub mod memwr;
pub mod regs;
pub mod report;
pub mod sequencer;
pub mod validator;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod arch;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{ConfigError, ConnectError, InitError, RegionFault, SequencingError, StartupError};
