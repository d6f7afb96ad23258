extern crate serde;
#[macro_use]
extern crate serde_derive;

mod init;

mod allocation_scheduler;
mod counter;
mod error;
mod frame_table;
mod host;
mod profile;
mod raw_samples;
mod sample;
mod sample_collector;
mod scheduler;
mod serialization;
mod session;
#[cfg(unix)]
mod signal_scheduler;
#[cfg(not(unix))]
#[path = "signal_scheduler_unsupported_platform.rs"]
mod signal_scheduler;
mod timer_thread_scheduler;

#[cfg(test)]
mod testing;

pub use allocation_scheduler::AllocationHook;
pub use counter::PackedCounter;
pub use error::{Error, Result};
pub use frame_table::{FrameStats, FrameTable};
pub use host::{
    AllocationEvents, Deferral, FrameId, FrameResolver, GcState, Host, SafePointDeferral,
    StackWalker, ThreadEnumerator, ThreadHandle,
};
pub use init::init;
pub use raw_samples::{RawSample, RawSampleLog};
pub use sample::MAX_STACK_DEPTH;
pub use sample_collector::{Counters, PostponedJob, Trigger};
pub use scheduler::Scheduler;
pub use serialization::profile::{FrameDetails, Results, FORMAT_VERSION};
pub use session::configuration::{Configuration, Mode, SchedulerKind};
#[cfg(unix)]
pub use session::fork;
pub use session::Session;
