//! Packed dispatcher state for a serialized context
//!
//! One `AtomicU64` holds every field the scheduling decisions depend on, so
//! each transition is a single compare-and-swap:
//!
//! ```text
//!  63                                  2   1   0
//! +-------------------------------------+---+---+
//! |  queued count (tasks not finished)  | S | A |
//! +-------------------------------------+---+---+
//!   S = suspended, A = a sweep is active or scheduled
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

const ACTIVE: u64 = 0b01;
const SUSPENDED: u64 = 0b10;
const COUNT_SHIFT: u32 = 2;
const ONE_TASK: u64 = 1 << COUNT_SHIFT;

/// A point-in-time view of the packed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Snapshot(u64);

impl Snapshot {
    /// Tasks queued or executing
    pub(super) fn count(self) -> usize {
        (self.0 >> COUNT_SHIFT) as usize
    }

    pub(super) fn is_suspended(self) -> bool {
        self.0 & SUSPENDED != 0
    }

    pub(super) fn is_active(self) -> bool {
        self.0 & ACTIVE != 0
    }
}

/// What a sweep does after a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Step {
    /// Pop and run the next task
    Run,
    /// Sweep ends; the active flag has been cleared
    Stop,
    /// Budget spent with work left: submit a fresh sweep, which inherits the
    /// active flag
    Reschedule,
}

/// Atomic dispatcher state
pub(super) struct DispatchState {
    bits: AtomicU64,
}

impl DispatchState {
    pub(super) fn new() -> Self {
        Self {
            bits: AtomicU64::new(0),
        }
    }

    pub(super) fn load(&self) -> Snapshot {
        Snapshot(self.bits.load(Ordering::Acquire))
    }

    /// Count a newly queued task. Returns true when the caller claimed the
    /// active flag and must schedule a sweep.
    pub(super) fn enqueue(&self) -> bool {
        self.transition(|s| {
            let claim = !s.is_suspended() && !s.is_active();
            let next = (s.0 + ONE_TASK) | if claim { ACTIVE } else { 0 };
            (next, claim)
        })
    }

    /// Count a finished task
    pub(super) fn complete(&self) {
        let previous = self.bits.fetch_sub(ONE_TASK, Ordering::AcqRel);
        debug_assert!(Snapshot(previous).count() > 0, "completed more tasks than queued");
    }

    /// Set the suspended flag. Returns false if it was already set.
    pub(super) fn suspend(&self) -> bool {
        self.bits.fetch_or(SUSPENDED, Ordering::AcqRel) & SUSPENDED == 0
    }

    /// Clear the suspended flag. Returns true when the caller claimed the
    /// active flag and must schedule a sweep.
    pub(super) fn resume(&self) -> bool {
        self.transition(|s| {
            let claim = s.count() > 0 && !s.is_active();
            let next = (s.0 & !SUSPENDED) | if claim { ACTIVE } else { 0 };
            (next, claim)
        })
    }

    /// Decide the next step of the active sweep. `budget_left` is false once
    /// the sweep has run its throughput.
    pub(super) fn checkpoint(&self, budget_left: bool) -> Step {
        self.transition(|s| {
            if s.is_suspended() || s.count() == 0 {
                (s.0 & !ACTIVE, Step::Stop)
            } else if budget_left {
                (s.0, Step::Run)
            } else {
                (s.0, Step::Reschedule)
            }
        })
    }

    /// Apply `f` atomically. `f` returns the new packed value and the
    /// decision to report once it is installed.
    fn transition<T>(&self, f: impl Fn(Snapshot) -> (u64, T)) -> T {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let (next, decision) = f(Snapshot(current));
            if next == current {
                return decision;
            }
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return decision,
                Err(actual) => current = actual,
            }
        }
    }
}
