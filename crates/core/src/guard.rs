//! Reentrancy and pause guards for mutating entry points.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{EngineError, EngineResult};

/// Busy flag rejecting nested entry into a mutating call.
#[derive(Debug, Default)]
pub struct BusyFlag(AtomicBool);

impl BusyFlag {
    /// Mark the engine busy until the returned guard drops.
    pub fn enter(&self) -> EngineResult<BusyGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::Reentrancy)?;
        Ok(BusyGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears the busy flag on every exit path, including early `?` returns.
#[derive(Debug)]
pub struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Global pause switch.
#[derive(Debug, Default)]
pub struct PauseFlag(AtomicBool);

impl PauseFlag {
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Set the flag, returning the previous value.
    pub fn set(&self, paused: bool) -> bool {
        self.0.swap(paused, Ordering::AcqRel)
    }

    /// Fail with [`EngineError::Paused`] while paused.
    pub fn ensure_running(&self) -> EngineResult<()> {
        if self.is_paused() {
            return Err(EngineError::Paused);
        }
        Ok(())
    }
}
