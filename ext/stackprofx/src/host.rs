//! Interfaces the profiler consumes from the host runtime.
//!
//! Everything that touches the runtime's internals (walking interpreted
//! stacks, listing threads, resolving frame names, deferring work to a safe
//! point) lives behind these traits. The profiler itself only ever sees
//! opaque [`FrameId`]s and [`ThreadHandle`]s.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::allocation_scheduler::AllocationHook;
use crate::sample_collector::PostponedJob;

/// Opaque, stable identifier of a call-site in the host's code representation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u64);

/// Opaque identifier of a host thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadHandle(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait StackWalker {
    /// Walks the interpreted stack of `thread`, innermost frame first.
    ///
    /// Fills at most `frames.len()` entries of `frames` and `lines` and
    /// returns the number of frames written. A line `<= 0` means the frame
    /// carries no line information.
    fn walk(&self, thread: ThreadHandle, frames: &mut [FrameId], lines: &mut [i32]) -> usize;
}

pub trait ThreadEnumerator {
    fn live_threads(&self) -> Vec<ThreadHandle>;
    fn is_runnable(&self, thread: ThreadHandle) -> bool;
}

pub trait FrameResolver {
    fn name(&self, frame: FrameId) -> Option<String>;
    fn file_path(&self, frame: FrameId) -> Option<String>;
    /// First line of the method definition. `None` or `Some(0)` if unknown.
    fn first_line(&self, frame: FrameId) -> Option<u32>;
}

pub trait GcState {
    /// Whether the runtime is inside a garbage collection pause.
    ///
    /// Called from signal handlers; must be async-signal-safe.
    fn during_gc(&self) -> bool;
}

/// The host's mechanism for running work at the next safe point.
pub trait Deferral {
    /// Registers the job to run on [`Deferral::trigger`]. Called on every
    /// `start`, from an ordinary context. Replaces any earlier job.
    fn register(&self, job: PostponedJob);

    /// Requests that the registered job runs at the next safe point.
    ///
    /// Called from signal handlers; must be async-signal-safe and must not
    /// allocate.
    fn trigger(&self);
}

/// Object-creation notifications, used by the allocation mode.
pub trait AllocationEvents {
    fn subscribe(&self, hook: AllocationHook);
    fn unsubscribe(&self);
}

/// Everything the profiler needs from its host.
pub trait Host:
    StackWalker + ThreadEnumerator + FrameResolver + GcState + Deferral + AllocationEvents + Send + Sync
{
}

impl<T> Host for T where
    T: StackWalker
        + ThreadEnumerator
        + FrameResolver
        + GcState
        + Deferral
        + AllocationEvents
        + Send
        + Sync
{
}

/// A [`Deferral`] for hosts that poll for pending work at their own safe
/// points.
///
/// `trigger` only flips an atomic flag; the host calls [`SafePointDeferral::poll`]
/// whenever arbitrary work is allowed.
#[derive(Default)]
pub struct SafePointDeferral {
    pending: AtomicBool,
    job: Mutex<Option<PostponedJob>>,
}

impl SafePointDeferral {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Runs the registered job if a trigger is pending. Returns whether it ran.
    pub fn poll(&self) -> bool {
        if !self.pending.swap(false, Ordering::AcqRel) {
            return false;
        }
        let job = match self.job.lock() {
            Ok(job) => job.clone(),
            Err(_) => {
                log::warn!("Postponed job registration poisoned. Dropping trigger.");
                return false;
            }
        };
        match job {
            Some(job) => {
                job.run();
                true
            }
            None => {
                log::trace!("Trigger pending but no postponed job registered");
                false
            }
        }
    }
}

impl Deferral for SafePointDeferral {
    fn register(&self, job: PostponedJob) {
        match self.job.lock() {
            Ok(mut slot) => *slot = Some(job),
            Err(poisoned) => *poisoned.into_inner() = Some(job),
        }
    }

    fn trigger(&self) {
        self.pending.store(true, Ordering::Release);
    }
}
