use crate::error::Result;
use crate::sample_collector::Trigger;

/// An event source driving the sampling.
pub trait Scheduler: Send {
    /// Arms the event source; every event calls `trigger`.
    fn start(&mut self, trigger: Trigger) -> Result<()>;

    /// Disarms the event source.
    fn stop(&mut self) -> Result<()>;

    /// Silences the event source without disarming it, e.g. around `fork(2)`.
    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    /// Re-arms a paused event source with its original interval.
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }
}
