use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use indexmap::IndexSet;

use crate::allocation_scheduler::AllocationHook;
use crate::host::{Host, ThreadHandle};
use crate::profile::Profile;

/// Engine state shared between the session, the event sources and the
/// postponed job.
///
/// Counters and flags are atomics so that [`Trigger::fire`] can touch them
/// from a signal handler. The profile itself is only ever locked from
/// ordinary contexts.
pub struct SampleCollector {
    host: Arc<dyn Host>,
    running: AtomicBool,
    record_raw: AtomicBool,
    in_job: AtomicBool,
    overall_signals: AtomicUsize,
    overall_samples: AtomicUsize,
    during_gc: AtomicUsize,
    target_threads: RwLock<Option<IndexSet<ThreadHandle>>>,
    profile: Mutex<Option<Profile>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub overall_signals: usize,
    pub overall_samples: usize,
    pub during_gc: usize,
}

impl Counters {
    pub fn missed_samples(&self) -> usize {
        self.overall_signals.saturating_sub(self.overall_samples)
    }
}

impl SampleCollector {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            running: AtomicBool::new(false),
            record_raw: AtomicBool::new(true),
            in_job: AtomicBool::new(false),
            overall_signals: AtomicUsize::new(0),
            overall_samples: AtomicUsize::new(0),
            during_gc: AtomicUsize::new(0),
            target_threads: RwLock::new(None),
            profile: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Prepares for a new `start`. The profile is created, and the counters
    /// reset, only if no profile is pending from an earlier cycle. Returns
    /// whether a profile was created.
    pub(crate) fn prepare(
        &self,
        threads: Option<IndexSet<ThreadHandle>>,
        record_raw: bool,
    ) -> bool {
        *self
            .target_threads
            .write()
            .unwrap_or_else(PoisonError::into_inner) = threads;
        self.record_raw.store(record_raw, Ordering::Relaxed);

        let mut profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        if profile.is_none() {
            *profile = Some(Profile::new());
            self.overall_signals.store(0, Ordering::Relaxed);
            self.overall_samples.store(0, Ordering::Relaxed);
            self.during_gc.store(0, Ordering::Relaxed);
            log::debug!("Created new profile");
            return true;
        }
        false
    }

    pub(crate) fn clear_target_threads(&self) {
        *self
            .target_threads
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub(crate) fn take_profile(&self) -> Option<(Profile, Counters)> {
        let profile = self
            .profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some((profile, self.counters()))
    }

    pub(crate) fn with_profile<T>(&self, f: impl FnOnce(&Profile) -> T) -> Option<T> {
        let profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
        profile.as_ref().map(f)
    }

    pub fn counters(&self) -> Counters {
        Counters {
            overall_signals: self.overall_signals.load(Ordering::Relaxed),
            overall_samples: self.overall_samples.load(Ordering::Relaxed),
            during_gc: self.during_gc.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    // async-signal-safe
    fn fire(&self) {
        if !self.is_running() {
            return;
        }
        self.overall_signals.fetch_add(1, Ordering::Relaxed);
        if self.host.during_gc() {
            // The runtime's stacks are not walkable during GC
            self.during_gc.fetch_add(1, Ordering::Relaxed);
            self.overall_samples.fetch_add(1, Ordering::Relaxed);
        } else {
            self.host.trigger();
        }
    }

    /// Counts one signal and samples right away. Used by the manual mode.
    pub(crate) fn sample_now(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.overall_signals.fetch_add(1, Ordering::Relaxed);
        self.job_handler();
        true
    }

    /// Counts one allocation event and samples every `interval`th one.
    pub(crate) fn on_allocation(&self, interval: usize) {
        if !self.is_running() {
            return;
        }
        let signals = self.overall_signals.fetch_add(1, Ordering::Relaxed) + 1;
        if interval > 1 && signals % interval != 0 {
            return;
        }
        self.job_handler();
    }

    fn job_handler(&self) {
        if !self.is_running() {
            return;
        }
        // The deferred job may itself be interrupted by another trigger
        if self.in_job.swap(true, Ordering::AcqRel) {
            log::trace!("Postponed job already in progress. Ignoring nested trigger.");
            return;
        }
        self.record_sample();
        self.in_job.store(false, Ordering::Release);
    }

    // A walk dropped on a contended profile is not counted, so it shows up
    // in missed_samples.
    fn record_sample(&self) {
        let threads: Vec<ThreadHandle> = {
            let targets = self
                .target_threads
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match targets.as_ref() {
                Some(threads) => threads.iter().copied().collect(),
                None => self.host.live_threads(),
            }
        };

        let mut profile = match self.profile.try_lock() {
            Ok(profile) => profile,
            Err(_) => {
                log::trace!("Failed to acquire profile lock. Dropping sample.");
                return;
            }
        };
        let Some(profile) = profile.as_mut() else {
            log::trace!("No profile to record into. Dropping sample.");
            return;
        };
        self.overall_samples.fetch_add(1, Ordering::Relaxed);

        let record_raw = self.record_raw.load(Ordering::Relaxed);
        for thread in threads {
            if !self.host.is_runnable(thread) {
                continue;
            }
            profile.record(thread, &*self.host, record_raw);
        }
    }
}

/// Entry point for event sources that may fire in a restricted context.
///
/// [`Trigger::fire`] only bumps counters and asks the host to defer the real
/// work; it never allocates and never locks.
#[derive(Clone)]
pub struct Trigger {
    collector: Arc<SampleCollector>,
}

impl Trigger {
    pub(crate) fn new(collector: Arc<SampleCollector>) -> Self {
        Self { collector }
    }

    // async-signal-safe
    pub fn fire(&self) {
        self.collector.fire();
    }

    pub(crate) fn as_ptr(&self) -> *const SampleCollector {
        Arc::as_ptr(&self.collector)
    }

    pub(crate) fn allocation_hook(&self, interval: usize) -> AllocationHook {
        AllocationHook::new(Arc::clone(&self.collector), interval)
    }

    /// Fires the trigger of a collector reached through a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Trigger::as_ptr`] of a collector that is still
    /// alive.
    pub(crate) unsafe fn fire_raw(ptr: *const SampleCollector) {
        let collector = unsafe { &*ptr };
        collector.fire();
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").finish_non_exhaustive()
    }
}

/// The work deferred by [`Trigger::fire`]: walks the selected threads and
/// records their stacks. Must only run at a safe point.
///
/// Holds the collector weakly: the host keeps the job registered for as long
/// as it likes without keeping the session alive.
#[derive(Clone)]
pub struct PostponedJob {
    collector: Weak<SampleCollector>,
}

impl PostponedJob {
    pub(crate) fn new(collector: &Arc<SampleCollector>) -> Self {
        Self { collector: Arc::downgrade(collector) }
    }

    pub fn run(&self) {
        if let Some(collector) = self.collector.upgrade() {
            collector.job_handler();
        }
    }
}
