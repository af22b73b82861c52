//! Error types
//!
//! Startup errors are fatal and map to distinct exit codes. `RegionFault` is
//! the only steady-state error and is reported, never propagated.

use core::fmt;

use crate::interrupts::IrqId;

/// Controller status codes (platform driver numbering)
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const DEVICE_NOT_FOUND: i32 = 2;
    pub const INVALID_PARAM: i32 = 15;
    pub const DEVICE_BUSY: i32 = 21;
}

/// Board configuration rejected before touching hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// capture_high is not above capture_base
    EmptyWindow,
    /// capture_base is not word aligned
    MisalignedWindow,
    /// Portion size is zero or not a multiple of the word size
    BadPortionSize,
    /// Portion larger than the capture window
    PortionExceedsWindow,
    /// Window is not a whole number of portions
    WindowNotPortionMultiple,
    /// Packet size is zero or not a multiple of the word size
    BadPacketSize,
}

/// Interrupt controller could not be brought up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Configuration missing or refused by the controller, with its status code
    ConfigurationRejected { code: i32 },
}

/// Interrupt source could not be bound to its handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    BindingRejected { irq: IrqId, code: i32 },
}

/// Startup step attempted before its prerequisites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencingError {
    ControllerNotReady,
    HandlerNotBound,
    DispatchNotEnabled,
    /// Dispatch already enabled, no more bindings accepted
    DispatchAlreadyEnabled,
    /// Peripherals were already armed
    AlreadyArmed,
}

/// A captured region that could not be (fully) validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionFault {
    /// Region is not inside the capture window
    OutOfWindow,
    /// Region start is not word aligned
    Misaligned,
    /// Trailing bytes that do not form a whole word
    PartialWord { bytes: usize },
}

/// Any fatal startup failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    Config(ConfigError),
    Init(InitError),
    Connect(ConnectError),
    Sequencing(SequencingError),
}

impl StartupError {
    /// Non-zero status identifying the failed startup step
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Init(_) => 1,
            StartupError::Connect(_) => 2,
            StartupError::Config(_) => 3,
            StartupError::Sequencing(_) => 4,
        }
    }

    /// Status code reported by the controller driver, if it produced one
    pub fn controller_code(&self) -> Option<i32> {
        match self {
            StartupError::Init(InitError::ConfigurationRejected { code }) => Some(*code),
            StartupError::Connect(ConnectError::BindingRejected { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

impl From<InitError> for StartupError {
    fn from(e: InitError) -> Self {
        StartupError::Init(e)
    }
}

impl From<ConnectError> for StartupError {
    fn from(e: ConnectError) -> Self {
        StartupError::Connect(e)
    }
}

impl From<SequencingError> for StartupError {
    fn from(e: SequencingError) -> Self {
        StartupError::Sequencing(e)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ConfigError::EmptyWindow => "capture window is empty",
            ConfigError::MisalignedWindow => "capture window base is not word aligned",
            ConfigError::BadPortionSize => "portion size must be a non-zero multiple of 8",
            ConfigError::PortionExceedsWindow => "portion size exceeds capture window",
            ConfigError::WindowNotPortionMultiple => "capture window is not a whole number of portions",
            ConfigError::BadPacketSize => "packet size must be a non-zero multiple of 8",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::ConfigurationRejected { code } => {
                write!(f, "interrupt controller configuration rejected (status {})", code)
            }
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectError::BindingRejected { irq, code } => {
                write!(f, "binding of irq {} rejected (status {})", irq.value(), code)
            }
        }
    }
}

impl fmt::Display for SequencingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SequencingError::ControllerNotReady => "interrupt controller not initialized",
            SequencingError::HandlerNotBound => "no handler bound",
            SequencingError::DispatchNotEnabled => "cpu interrupt dispatch not enabled",
            SequencingError::DispatchAlreadyEnabled => "cpu interrupt dispatch already enabled",
            SequencingError::AlreadyArmed => "peripherals already armed",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for RegionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionFault::OutOfWindow => f.write_str("region outside capture window"),
            RegionFault::Misaligned => f.write_str("region not word aligned"),
            RegionFault::PartialWord { bytes } => write!(f, "{} trailing bytes ignored", bytes),
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "config: {}", e),
            StartupError::Init(e) => write!(f, "init: {}", e),
            StartupError::Connect(e) => write!(f, "connect: {}", e),
            StartupError::Sequencing(e) => write!(f, "sequencing: {}", e),
        }
    }
}
