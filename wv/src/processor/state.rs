//! Processor lifecycle state machine
//!
//! An atomic 32-bit state advanced only by compare-and-swap, so
//! concurrent start/stop calls cannot race a processor into a
//! contradictory state.

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Lifecycle states, in transition order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcessorState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ProcessorState {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => ProcessorState::Starting,
            2 => ProcessorState::Running,
            3 => ProcessorState::Stopping,
            _ => ProcessorState::Stopped,
        }
    }
}

/// Errors from lifecycle transitions
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("already running or starting")]
    AlreadyRunning,

    #[error("cannot stop while still starting")]
    StillStarting,
}

/// Atomic lifecycle holder
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU32,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(ProcessorState::Stopped as u32),
        }
    }

    pub fn current(&self) -> ProcessorState {
        ProcessorState::from_u32(self.state.load(Ordering::SeqCst))
    }

    /// CAS `Stopped -> Starting`; any other state refuses the start
    pub fn begin_start(&self) -> Result<(), LifecycleError> {
        self.state
            .compare_exchange(
                ProcessorState::Stopped as u32,
                ProcessorState::Starting as u32,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| LifecycleError::AlreadyRunning)
    }

    /// `Starting -> Running`, only once the consumption task is live
    pub fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            ProcessorState::Starting as u32,
            ProcessorState::Running as u32,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Roll a failed start back to `Stopped`
    pub fn rollback_start(&self) {
        let _ = self.state.compare_exchange(
            ProcessorState::Starting as u32,
            ProcessorState::Stopped as u32,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// CAS `Running -> Stopping`
    ///
    /// Returns `Ok(false)` when already stopped or stopping (a stop there
    /// is a no-op), `Ok(true)` when this call won the transition.
    pub fn begin_stop(&self) -> Result<bool, LifecycleError> {
        match self.state.compare_exchange(
            ProcessorState::Running as u32,
            ProcessorState::Stopping as u32,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => Ok(true),
            Err(actual) => match ProcessorState::from_u32(actual) {
                ProcessorState::Stopped | ProcessorState::Stopping => Ok(false),
                ProcessorState::Starting => Err(LifecycleError::StillStarting),
                ProcessorState::Running => Ok(false),
            },
        }
    }

    /// Final `-> Stopped` store once the consumption task has exited
    pub fn mark_stopped(&self) {
        self.state.store(ProcessorState::Stopped as u32, Ordering::SeqCst);
    }
}
