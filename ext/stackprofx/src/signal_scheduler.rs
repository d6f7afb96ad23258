#![deny(unsafe_op_in_unsafe_fn)]

use std::ffi::{c_int, c_void};
use std::io;
use std::ptr::null_mut;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::time::Duration;
use std::{mem, ptr};

use crate::error::{Error, Result};
use crate::sample_collector::{SampleCollector, Trigger};
use crate::scheduler::Scheduler;
use crate::session::configuration::TimeMode;

// The signal handler cannot receive arguments, so the collector it feeds is
// published here for the lifetime of the armed timer. Only one
// SignalScheduler may be armed per process.
static SIGNAL_TARGET: AtomicPtr<SampleCollector> = AtomicPtr::new(null_mut());

/// Drives sampling with `setitimer(2)`: `ITIMER_REAL`/`SIGALRM` for wall
/// time, `ITIMER_PROF`/`SIGPROF` for CPU time.
#[derive(Debug)]
pub struct SignalScheduler {
    time_mode: TimeMode,
    interval: Duration,
    trigger: Option<Trigger>,
}

impl SignalScheduler {
    pub fn new(time_mode: TimeMode, interval: Duration) -> Self {
        Self {
            time_mode,
            interval,
            trigger: None,
        }
    }

    fn signal(&self) -> c_int {
        match self.time_mode {
            TimeMode::WallTime => libc::SIGALRM,
            TimeMode::CpuTime => libc::SIGPROF,
        }
    }

    fn itimer(&self) -> c_int {
        match self.time_mode {
            TimeMode::WallTime => libc::ITIMER_REAL,
            TimeMode::CpuTime => libc::ITIMER_PROF,
        }
    }

    // Install signal handler for profiling events to the current process.
    fn install_signal_handler(&self) -> Result<()> {
        let mut sa: libc::sigaction = unsafe { mem::zeroed() };
        sa.sa_sigaction = Self::signal_handler as usize;
        sa.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        unsafe { libc::sigemptyset(&mut sa.sa_mask) };
        let err = unsafe { libc::sigaction(self.signal(), &sa, null_mut()) };
        if err != 0 {
            return Err(Error::Os { call: "sigaction", source: io::Error::last_os_error() });
        }
        log::debug!("Signal handler installed");
        Ok(())
    }

    fn ignore_signal(&self) -> Result<()> {
        let mut sa: libc::sigaction = unsafe { mem::zeroed() };
        sa.sa_sigaction = libc::SIG_IGN;
        sa.sa_flags = libc::SA_RESTART;
        unsafe { libc::sigemptyset(&mut sa.sa_mask) };
        let err = unsafe { libc::sigaction(self.signal(), &sa, null_mut()) };
        if err != 0 {
            return Err(Error::Os { call: "sigaction", source: io::Error::last_os_error() });
        }
        Ok(())
    }

    fn set_timer(&self, interval: Duration) -> Result<()> {
        let timer = Self::duration_to_itimerval(&interval);
        let err = unsafe { libc::setitimer(self.itimer(), &timer, null_mut()) };
        if err != 0 {
            return Err(Error::Os { call: "setitimer", source: io::Error::last_os_error() });
        }
        Ok(())
    }

    // Respond to the signal: count it and ask the host for a postponed job.
    // Must stay async-signal-safe: no allocation, no locks, no logging.
    extern "C" fn signal_handler(
        _sig: c_int,
        _info: *mut libc::siginfo_t,
        _ucontext: *mut c_void,
    ) {
        let target = SIGNAL_TARGET.load(Ordering::Acquire);
        if target.is_null() {
            return;
        }
        // The session keeps the collector alive beyond the scheduler's stop
        unsafe { Trigger::fire_raw(target) };
    }

    fn duration_to_itimerval(duration: &Duration) -> libc::itimerval {
        let mut timer: libc::itimerval = unsafe { mem::zeroed() };
        timer.it_interval.tv_sec = duration.as_secs() as libc::time_t;
        timer.it_interval.tv_usec = duration.subsec_micros() as libc::suseconds_t;
        timer.it_value = timer.it_interval;
        timer
    }
}

impl Scheduler for SignalScheduler {
    fn start(&mut self, trigger: Trigger) -> Result<()> {
        let target = trigger.as_ptr() as *mut SampleCollector;
        if SIGNAL_TARGET
            .compare_exchange(ptr::null_mut(), target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SchedulerBusy);
        }
        self.trigger = Some(trigger);

        let armed = self
            .install_signal_handler()
            .and_then(|()| self.set_timer(self.interval));
        if let Err(err) = armed {
            SIGNAL_TARGET.store(null_mut(), Ordering::Release);
            self.trigger = None;
            return Err(err);
        }
        log::debug!("Timer armed ({:?}, interval: {:?})", self.time_mode, self.interval);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.trigger.is_none() {
            return Ok(());
        }
        let disarmed = self.set_timer(Duration::ZERO);
        let ignored = self.ignore_signal();
        SIGNAL_TARGET.store(null_mut(), Ordering::Release);
        self.trigger = None;
        log::debug!("Timer disarmed");
        disarmed.and(ignored)
    }

    fn pause(&mut self) -> Result<()> {
        if self.trigger.is_none() {
            return Ok(());
        }
        self.set_timer(Duration::ZERO)
    }

    fn resume(&mut self) -> Result<()> {
        if self.trigger.is_none() {
            return Ok(());
        }
        self.set_timer(self.interval)
    }
}

impl Drop for SignalScheduler {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Failed to disarm timer: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_itimerval() {
        let timer = SignalScheduler::duration_to_itimerval(&Duration::from_micros(1000));
        assert_eq!(timer.it_interval.tv_sec, 0);
        assert_eq!(timer.it_interval.tv_usec, 1000);
        assert_eq!(timer.it_value.tv_usec, 1000);

        let timer = SignalScheduler::duration_to_itimerval(&Duration::from_micros(2_500_000));
        assert_eq!(timer.it_interval.tv_sec, 2);
        assert_eq!(timer.it_interval.tv_usec, 500_000);
    }

    #[test]
    fn test_signal_per_mode() {
        let wall = SignalScheduler::new(TimeMode::WallTime, Duration::from_millis(1));
        assert_eq!((wall.signal(), wall.itimer()), (libc::SIGALRM, libc::ITIMER_REAL));
        let cpu = SignalScheduler::new(TimeMode::CpuTime, Duration::from_millis(1));
        assert_eq!((cpu.signal(), cpu.itimer()), (libc::SIGPROF, libc::ITIMER_PROF));
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut scheduler = SignalScheduler::new(TimeMode::WallTime, Duration::from_millis(1));
        assert!(scheduler.stop().is_ok());
        assert!(scheduler.pause().is_ok());
        assert!(scheduler.resume().is_ok());
    }
}
