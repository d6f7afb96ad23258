pub mod configuration;
#[cfg(unix)]
pub mod fork;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use self::configuration::{Configuration, Mode, SchedulerKind};
use crate::allocation_scheduler::AllocationScheduler;
use crate::error::Result;
use crate::host::{FrameId, Host};
use crate::sample_collector::{Counters, PostponedJob, SampleCollector, Trigger};
use crate::scheduler::Scheduler;
use crate::serialization::profile::Results;
use crate::serialization::serializer::ResultsSerializer;
use crate::signal_scheduler::SignalScheduler;
use crate::timer_thread_scheduler::TimerThreadScheduler;

/// A profiling session.
///
/// `start`/`stop` may be called any number of times; samples accumulate
/// until `results` drains them. Control operations take `&mut self` and are
/// expected to come from a single controlling thread.
pub struct Session {
    collector: Arc<SampleCollector>,
    // Shared with the fork handlers, which must not need the session itself.
    scheduler: Arc<Mutex<Option<Box<dyn Scheduler>>>>,
    mode: Mode,
    interval: Option<u64>,
}

impl Session {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Session {
            collector: Arc::new(SampleCollector::new(host)),
            scheduler: Arc::new(Mutex::new(None)),
            mode: configuration::DEFAULT_MODE,
            interval: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.collector.is_running()
    }

    /// Starts sampling. Returns `Ok(false)` if the session is already
    /// running; configuration errors leave the session untouched.
    pub fn start(&mut self, configuration: Configuration) -> Result<bool> {
        if self.is_running() {
            return Ok(false);
        }

        let interval = configuration.validate()?;
        let mut scheduler = self.build_scheduler(&configuration, interval);

        let created = self
            .collector
            .prepare(configuration.threads, configuration.raw);
        self.collector
            .host()
            .register(PostponedJob::new(&self.collector));

        self.collector.set_running(true);
        if let Some(scheduler) = scheduler.as_mut() {
            if let Err(err) = scheduler.start(Trigger::new(Arc::clone(&self.collector))) {
                self.collector.set_running(false);
                self.collector.clear_target_threads();
                if created {
                    self.collector.take_profile();
                }
                return Err(err);
            }
        }

        *self.lock_scheduler() = scheduler;
        self.mode = configuration.mode;
        self.interval = interval;
        log::debug!("Profiling started (mode: {}, interval: {:?})", self.mode, self.interval);
        Ok(true)
    }

    fn build_scheduler(
        &self,
        configuration: &Configuration,
        interval: Option<u64>,
    ) -> Option<Box<dyn Scheduler>> {
        let interval = interval?;
        match (configuration.mode.time_mode(), configuration.scheduler) {
            (Some(time_mode), SchedulerKind::Signal) => Some(Box::new(SignalScheduler::new(
                time_mode,
                Duration::from_micros(interval),
            ))),
            (Some(_), SchedulerKind::TimerThread) => Some(Box::new(TimerThreadScheduler::new(
                Duration::from_micros(interval),
            ))),
            (None, _) => Some(Box::new(AllocationScheduler::new(
                Arc::clone(self.collector.host()),
                usize::try_from(interval).unwrap_or(usize::MAX),
            ))),
        }
    }

    /// Stops sampling. Returns `false` if the session was not running.
    ///
    /// A postponed job already requested from the host may still run
    /// afterwards; it is discarded since the session is no longer running.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.collector.set_running(false);

        let scheduler = self.lock_scheduler().take();
        if let Some(mut scheduler) = scheduler {
            if let Err(err) = scheduler.stop() {
                log::warn!("Failed to stop scheduler: {}", err);
            }
        }
        self.collector.clear_target_threads();
        log::debug!("Profiling stopped");
        true
    }

    /// Takes a sample right now. Returns `false` if the session is not
    /// running.
    pub fn sample(&self) -> bool {
        self.collector.sample_now()
    }

    /// Drains the collected data into a snapshot.
    ///
    /// `None` while running, or when nothing has been collected since the
    /// last call.
    pub fn results(&mut self) -> Option<Results> {
        if self.is_running() {
            return None;
        }
        let (profile, counters) = self.collector.take_profile()?;
        let serializer = ResultsSerializer::new(&**self.collector.host());
        Some(serializer.serialize(profile, counters, self.mode, self.interval))
    }

    /// Profiles `body` and returns the results.
    ///
    /// The session is stopped even if `body` panics. When
    /// `configuration.out` is set the results are also written there.
    pub fn run<F>(&mut self, configuration: Configuration, body: F) -> Result<Option<Results>>
    where
        F: FnOnce(&Session),
    {
        let out = configuration.out.clone();
        self.start(configuration)?;
        {
            let guard = StopGuard(&mut *self);
            body(&*guard.0);
        }

        let results = self.results();
        if let (Some(results), Some(out)) = (&results, out) {
            results.write_to(&out)?;
        }
        Ok(results)
    }

    pub fn counters(&self) -> Counters {
        self.collector.counters()
    }

    /// Reports every frame held by the session to `mark`, so that the host's
    /// garbage collector keeps them alive.
    pub fn mark(&self, mark: impl FnMut(FrameId)) {
        self.collector.with_profile(|profile| profile.dmark(mark));
    }

    /// Silences the event source before `fork(2)`.
    pub fn atfork_prepare(&mut self) {
        self.fork_handle().prepare();
    }

    /// Re-arms the event source in the parent after `fork(2)`.
    pub fn atfork_parent(&mut self) {
        self.fork_handle().parent();
    }

    /// The child does not inherit a usable profiler state.
    pub fn atfork_child(&mut self) {
        self.fork_handle().child();
        self.collector.clear_target_threads();
    }

    pub(crate) fn fork_handle(&self) -> ForkHandle {
        ForkHandle {
            collector: Arc::downgrade(&self.collector),
            scheduler: Arc::downgrade(&self.scheduler),
        }
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Option<Box<dyn Scheduler>>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reaches a session's engine and event source without going through the
/// session, so that fork handlers work while the session is borrowed or
/// locked elsewhere.
///
/// Never blocks: a scheduler that is being started or stopped at the time of
/// the fork is left alone.
#[derive(Clone)]
pub(crate) struct ForkHandle {
    collector: Weak<SampleCollector>,
    scheduler: Weak<Mutex<Option<Box<dyn Scheduler>>>>,
}

impl ForkHandle {
    pub(crate) fn prepare(&self) {
        let Some(collector) = self.collector.upgrade() else {
            return;
        };
        if !collector.is_running() {
            return;
        }
        self.with_scheduler(|scheduler| {
            if let Err(err) = scheduler.pause() {
                log::warn!("Failed to pause scheduler before fork: {}", err);
            }
        });
    }

    pub(crate) fn parent(&self) {
        let Some(collector) = self.collector.upgrade() else {
            return;
        };
        if !collector.is_running() {
            return;
        }
        self.with_scheduler(|scheduler| {
            if let Err(err) = scheduler.resume() {
                log::warn!("Failed to resume scheduler after fork: {}", err);
            }
        });
    }

    pub(crate) fn child(&self) {
        let Some(collector) = self.collector.upgrade() else {
            return;
        };
        collector.set_running(false);

        self.with_scheduler_slot(|slot| {
            if let Some(mut scheduler) = slot.take() {
                if let Err(err) = scheduler.stop() {
                    log::warn!("Failed to stop scheduler in forked child: {}", err);
                }
            }
        });
    }

    fn with_scheduler(&self, f: impl FnOnce(&mut dyn Scheduler)) {
        self.with_scheduler_slot(|slot| {
            if let Some(scheduler) = slot.as_mut() {
                f(scheduler.as_mut());
            }
        });
    }

    fn with_scheduler_slot(&self, f: impl FnOnce(&mut Option<Box<dyn Scheduler>>)) {
        let Some(shared) = self.scheduler.upgrade() else {
            return;
        };
        let guard = shared.try_lock();
        if let Ok(mut slot) = guard {
            f(&mut *slot);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

struct StopGuard<'a>(&'a mut Session);

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}
