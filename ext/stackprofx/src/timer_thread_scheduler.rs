use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::sample_collector::Trigger;
use crate::scheduler::Scheduler;

/// Fires the trigger from a dedicated thread every `interval` of wall time.
///
/// Portable alternative to [`crate::signal_scheduler::SignalScheduler`]. The
/// timer thread is an ordinary thread, but it goes through the same
/// trigger/postponed job path so that stacks are still walked at the host's
/// safe points.
#[derive(Debug)]
pub struct TimerThreadScheduler {
    interval: Duration,
    trigger: Option<Trigger>,
    stop_requested: Arc<AtomicBool>,
    timer_thread: Option<JoinHandle<()>>,
}

impl TimerThreadScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            trigger: None,
            stop_requested: Arc::new(AtomicBool::new(false)),
            timer_thread: None,
        }
    }

    fn spawn_timer_thread(&mut self) -> Result<()> {
        let Some(trigger) = self.trigger.clone() else {
            return Ok(());
        };
        let stop_requested = Arc::new(AtomicBool::new(false));
        self.stop_requested = Arc::clone(&stop_requested);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("stackprofx-timer".to_owned())
            .spawn(move || Self::thread_main_loop(trigger, interval, stop_requested))
            .map_err(|source| Error::Os { call: "thread spawn", source })?;
        self.timer_thread = Some(handle);
        log::debug!("Timer thread started (interval: {:?})", self.interval);
        Ok(())
    }

    fn join_timer_thread(&mut self) {
        self.stop_requested.store(true, Ordering::Relaxed);
        if let Some(handle) = self.timer_thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::warn!("Timer thread panicked");
            }
        }
    }

    fn thread_main_loop(trigger: Trigger, interval: Duration, stop_requested: Arc<AtomicBool>) {
        loop {
            // Parked rather than slept so that stop() does not wait out the interval
            let deadline = Instant::now() + interval;
            loop {
                if stop_requested.load(Ordering::Relaxed) {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
            log::trace!("Firing trigger");
            trigger.fire();
        }
    }
}

impl Scheduler for TimerThreadScheduler {
    fn start(&mut self, trigger: Trigger) -> Result<()> {
        self.trigger = Some(trigger);
        self.spawn_timer_thread()
    }

    fn stop(&mut self) -> Result<()> {
        self.join_timer_thread();
        self.trigger = None;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.join_timer_thread();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.timer_thread.is_some() {
            return Ok(());
        }
        self.spawn_timer_thread()
    }
}

impl Drop for TimerThreadScheduler {
    fn drop(&mut self) {
        self.join_timer_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Deferral, FrameId, Host, ThreadHandle};
    use crate::sample_collector::{PostponedJob, SampleCollector};
    use crate::testing::FakeHost;

    #[test]
    fn test_timer_thread_fires_until_stopped() {
        let host = Arc::new(FakeHost::new());
        host.set_stack(ThreadHandle(1), &[(FrameId(1), 0)]);
        let dyn_host: Arc<dyn Host> = host.clone();
        let collector = Arc::new(SampleCollector::new(dyn_host));
        collector.prepare(None, true);
        collector.set_running(true);
        host.register(PostponedJob::new(&collector));

        let mut scheduler = TimerThreadScheduler::new(Duration::from_millis(1));
        scheduler.start(Trigger::new(Arc::clone(&collector))).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while collector.counters().overall_signals < 3 && Instant::now() < deadline {
            host.deferral.poll();
            thread::sleep(Duration::from_millis(1));
        }
        scheduler.stop().unwrap();
        host.deferral.poll();

        let counters = collector.counters();
        assert!(counters.overall_signals >= 3);
        assert!(counters.overall_signals >= counters.overall_samples);

        let after_stop = collector.counters().overall_signals;
        thread::sleep(Duration::from_millis(10));
        assert_eq!(collector.counters().overall_signals, after_stop);
    }
}
