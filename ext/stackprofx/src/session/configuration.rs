use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indexmap::IndexSet;

use crate::error::{Error, Result};
use crate::host::ThreadHandle;

/// Default interval of the timer-driven modes, in microseconds.
pub const DEFAULT_TIMER_INTERVAL: u64 = 1000;
/// Default interval of the allocation mode, in allocation events.
pub const DEFAULT_ALLOCATION_INTERVAL: u64 = 1;
pub const DEFAULT_MODE: Mode = Mode::Wall;
#[cfg(unix)]
pub const DEFAULT_SCHEDULER: SchedulerKind = SchedulerKind::Signal;
#[cfg(not(unix))]
pub const DEFAULT_SCHEDULER: SchedulerKind = SchedulerKind::TimerThread;

#[derive(Clone, Debug)]
pub struct Configuration {
    pub mode: Mode,
    /// Microseconds for `wall`/`cpu`, allocation events for `allocation`.
    /// Falls back to the mode's default when unset; ignored by `manual`.
    pub interval: Option<u64>,
    /// Threads to sample, walked in insertion order. All live threads when
    /// unset.
    pub threads: Option<IndexSet<ThreadHandle>>,
    pub scheduler: SchedulerKind,
    /// Whether to keep the raw sample log.
    pub raw: bool,
    /// Where `Session::run` writes the results as JSON, if anywhere.
    pub out: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            mode: DEFAULT_MODE,
            interval: None,
            threads: None,
            scheduler: DEFAULT_SCHEDULER,
            raw: true,
            out: None,
        }
    }
}

impl Configuration {
    pub fn new(mode: Mode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_threads(mut self, threads: impl IntoIterator<Item = ThreadHandle>) -> Self {
        self.threads = Some(threads.into_iter().collect());
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_out(mut self, out: impl Into<PathBuf>) -> Self {
        self.out = Some(out.into());
        self
    }

    /// The interval the session will run with, after defaults are applied.
    pub fn effective_interval(&self) -> Result<Option<u64>> {
        let interval = match self.mode {
            Mode::Wall | Mode::Cpu => self.interval.unwrap_or(DEFAULT_TIMER_INTERVAL),
            Mode::Allocation => self.interval.unwrap_or(DEFAULT_ALLOCATION_INTERVAL),
            Mode::Manual => return Ok(None),
        };
        if interval == 0 {
            return Err(Error::InvalidInterval(interval));
        }
        Ok(Some(interval))
    }

    /// Checks mode/scheduler compatibility and resolves the interval.
    pub fn validate(&self) -> Result<Option<u64>> {
        let interval = self.effective_interval()?;
        if self.mode == Mode::Cpu && self.scheduler == SchedulerKind::TimerThread {
            return Err(Error::UnsupportedScheduler {
                scheduler: self.scheduler,
                mode: self.mode,
            });
        }
        Ok(interval)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Wall,
    Cpu,
    Allocation,
    Manual,
}

impl Mode {
    pub fn time_mode(self) -> Option<TimeMode> {
        match self {
            Mode::Wall => Some(TimeMode::WallTime),
            Mode::Cpu => Some(TimeMode::CpuTime),
            Mode::Allocation | Mode::Manual => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Wall => "wall",
            Mode::Cpu => "cpu",
            Mode::Allocation => "allocation",
            Mode::Manual => "manual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wall" => Ok(Self::Wall),
            "cpu" => Ok(Self::Cpu),
            "allocation" | "object" => Ok(Self::Allocation),
            "manual" | "custom" => Ok(Self::Manual),
            _ => Err(Error::InvalidMode(s.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeMode {
    CpuTime,
    WallTime,
}

impl From<TimeMode> for Mode {
    fn from(time_mode: TimeMode) -> Self {
        match time_mode {
            TimeMode::CpuTime => Mode::Cpu,
            TimeMode::WallTime => Mode::Wall,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerKind {
    Signal,
    TimerThread,
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerKind::Signal => f.write_str("signal"),
            SchedulerKind::TimerThread => f.write_str("timer_thread"),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "signal" => Ok(Self::Signal),
            "timer_thread" => Ok(Self::TimerThread),
            _ => Err(Error::InvalidScheduler(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_str() {
        assert_eq!("wall".parse::<Mode>().unwrap(), Mode::Wall);
        assert_eq!("cpu".parse::<Mode>().unwrap(), Mode::Cpu);
        assert_eq!("allocation".parse::<Mode>().unwrap(), Mode::Allocation);
        assert_eq!("object".parse::<Mode>().unwrap(), Mode::Allocation);
        assert_eq!("manual".parse::<Mode>().unwrap(), Mode::Manual);
        assert_eq!("custom".parse::<Mode>().unwrap(), Mode::Manual);
        assert!(matches!("walltime".parse::<Mode>(), Err(Error::InvalidMode(mode)) if mode == "walltime"));
    }

    #[test]
    fn test_scheduler_from_str() {
        assert_eq!("signal".parse::<SchedulerKind>().unwrap(), SchedulerKind::Signal);
        assert_eq!("timer_thread".parse::<SchedulerKind>().unwrap(), SchedulerKind::TimerThread);
        assert!("thread".parse::<SchedulerKind>().is_err());
    }

    #[test]
    fn test_default_intervals() {
        assert_eq!(Configuration::new(Mode::Wall).validate().unwrap(), Some(1000));
        assert_eq!(Configuration::new(Mode::Cpu).validate().unwrap(), Some(1000));
        assert_eq!(Configuration::new(Mode::Allocation).validate().unwrap(), Some(1));
        assert_eq!(Configuration::new(Mode::Manual).validate().unwrap(), None);
        assert_eq!(
            Configuration::new(Mode::Manual).with_interval(50).validate().unwrap(),
            None
        );
        assert_eq!(
            Configuration::new(Mode::Allocation).with_interval(10).validate().unwrap(),
            Some(10)
        );
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = Configuration::new(Mode::Wall).with_interval(0).validate();
        assert!(matches!(err, Err(Error::InvalidInterval(0))));
    }

    #[test]
    fn test_cpu_mode_requires_signal_scheduler() {
        let err = Configuration::new(Mode::Cpu)
            .with_scheduler(SchedulerKind::TimerThread)
            .validate();
        assert!(matches!(err, Err(Error::UnsupportedScheduler { .. })));
        assert!(Configuration::new(Mode::Wall)
            .with_scheduler(SchedulerKind::TimerThread)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Allocation).unwrap(), "\"allocation\"");
        assert_eq!(Mode::Manual.to_string(), "manual");
    }
}
