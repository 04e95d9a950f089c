//! Engine lifecycle state machine
//!
//! ```text
//! Uninitialized -> Starting -> Running -> Draining -> Stopped
//!                     |
//!                     +-------> Failed
//! ```
//! `Stopped` and `Failed` are terminal.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a dispatch engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Starting = 1,
    Running = 2,
    Draining = 3,
    Stopped = 4,
    Failed = 5,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Draining,
            4 => Self::Stopped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "Uninitialized",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Atomic holder for [`EngineState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(EngineState::Uninitialized as u8))
    }

    pub(crate) fn load(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from -> to`; on mismatch returns the actual state
    pub(crate) fn transition(&self, from: EngineState, to: EngineState) -> Result<(), EngineState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(EngineState::from_u8)
    }

    pub(crate) fn set(&self, to: EngineState) {
        self.0.store(to as u8, Ordering::Release);
    }
}
