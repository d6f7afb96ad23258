use std::time::Duration;

use crate::error::{Error, Result};
use crate::sample_collector::Trigger;
use crate::scheduler::Scheduler;
use crate::session::configuration::{SchedulerKind, TimeMode};

/// Stand-in for platforms without `setitimer(2)`. Use
/// [`SchedulerKind::TimerThread`] there instead.
#[derive(Debug)]
pub struct SignalScheduler {
    time_mode: TimeMode,
}

impl SignalScheduler {
    pub fn new(time_mode: TimeMode, _interval: Duration) -> Self {
        Self { time_mode }
    }
}

impl Scheduler for SignalScheduler {
    fn start(&mut self, _trigger: Trigger) -> Result<()> {
        Err(Error::UnsupportedScheduler {
            scheduler: SchedulerKind::Signal,
            mode: self.time_mode.into(),
        })
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
