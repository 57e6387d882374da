//! Per-instance update sessions.
//!
//! Each board instance owns one [`SessionSlot`]. The updating thread
//! writes stage, status, progress and error as it goes; any other
//! thread may poll them without taking the bus lock. All fields are
//! relaxed atomics — a poller may observe stage and progress from two
//! adjacent instants, which is acceptable for a progress display and
//! keeps the poll path lock-free.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::error::CompletionCode;

/// Where the state machine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    /// No update running.
    Idle = 0,
    /// Validating the image and gating preconditions.
    Preparing = 1,
    /// Streaming section records into the register map.
    Writing = 2,
    /// Burning the register map into OTP.
    Committing = 3,
    /// Reading back and comparing against the image.
    Verifying = 4,
}

impl Stage {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Preparing,
            2 => Self::Writing,
            3 => Self::Committing,
            4 => Self::Verifying,
            _ => Self::Idle,
        }
    }
}

/// Outcome-level status of the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Nothing running, no recorded outcome.
    Idle = 0,
    /// An update is in flight.
    Running = 1,
    /// Last update completed and verified.
    Success = 2,
    /// Last update failed; the error code says why.
    Fail = 3,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Success,
            3 => Self::Fail,
            _ => Self::Idle,
        }
    }
}

/// Snapshot of one slot, as returned to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    /// Current stage.
    pub stage: Stage,
    /// Current status.
    pub status: Status,
    /// Percent complete of the current stage's work, 0..=100.
    pub progress: u8,
    /// Completion code of the last failure, `Normal` otherwise.
    pub error_code: u8,
}

/// Lock-free session state for one board instance.
#[derive(Debug, Default)]
pub struct SessionSlot {
    active: AtomicBool,
    stage: AtomicU8,
    status: AtomicU8,
    progress: AtomicU8,
    error: AtomicU8,
}

impl SessionSlot {
    /// Claim the slot for a new update. Fails if one is already running.
    pub fn try_begin(&self) -> bool {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.stage.store(Stage::Preparing as u8, Ordering::Relaxed);
        self.status.store(Status::Running as u8, Ordering::Relaxed);
        self.progress.store(0, Ordering::Relaxed);
        self.error
            .store(CompletionCode::Normal.as_u8(), Ordering::Relaxed);
        true
    }

    /// Move to `stage`, resetting stage progress.
    pub fn set_stage(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::Relaxed);
        self.progress.store(0, Ordering::Relaxed);
    }

    /// Publish stage progress, clamped to 100.
    pub fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }

    /// Record a successful terminal state. The slot stays claimed until
    /// [`Self::finish`] so pollers can observe the success marker.
    pub fn succeed(&self) {
        self.progress.store(100, Ordering::Relaxed);
        self.status.store(Status::Success as u8, Ordering::Relaxed);
    }

    /// Record a failed terminal state and release the slot. Status and
    /// error stay visible until the next update claims it.
    pub fn fail(&self, code: CompletionCode) {
        self.error.store(code.as_u8(), Ordering::Relaxed);
        self.status.store(Status::Fail as u8, Ordering::Relaxed);
        self.stage.store(Stage::Idle as u8, Ordering::Relaxed);
        self.active.store(false, Ordering::Release);
    }

    /// Return the slot to idle and release it.
    pub fn finish(&self) {
        self.stage.store(Stage::Idle as u8, Ordering::Relaxed);
        self.status.store(Status::Idle as u8, Ordering::Relaxed);
        self.progress.store(0, Ordering::Relaxed);
        self.error
            .store(CompletionCode::Normal.as_u8(), Ordering::Relaxed);
        self.active.store(false, Ordering::Release);
    }

    /// Non-blocking snapshot for pollers.
    pub fn report(&self) -> ProgressReport {
        ProgressReport {
            stage: Stage::from_u8(self.stage.load(Ordering::Relaxed)),
            status: Status::from_u8(self.status.load(Ordering::Relaxed)),
            progress: self.progress.load(Ordering::Relaxed),
            error_code: self.error.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_begin_is_refused() {
        let slot = SessionSlot::default();
        assert!(slot.try_begin());
        assert!(!slot.try_begin());
        slot.finish();
        assert!(slot.try_begin());
    }

    #[test]
    fn failure_leaves_its_code_visible() {
        let slot = SessionSlot::default();
        assert!(slot.try_begin());
        slot.set_stage(Stage::Writing);
        slot.fail(CompletionCode::FlashWriteError);

        let r = slot.report();
        assert_eq!(r.status, Status::Fail);
        assert_eq!(r.error_code, CompletionCode::FlashWriteError.as_u8());
        assert_eq!(r.stage, Stage::Idle);

        // The slot is free for a retry, which clears the marker.
        assert!(slot.try_begin());
        assert_eq!(slot.report().error_code, CompletionCode::Normal.as_u8());
    }

    #[test]
    fn progress_is_clamped() {
        let slot = SessionSlot::default();
        slot.set_progress(250);
        assert_eq!(slot.report().progress, 100);
    }
}
