use std::io;

use thiserror::Error;

use crate::session::configuration::{Mode, SchedulerKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid mode '{0}'. Valid values are 'wall', 'cpu', 'allocation' and 'manual'.")]
    InvalidMode(String),

    #[error("Invalid interval ({0}). The interval must be a positive integer.")]
    InvalidInterval(u64),

    #[error("Invalid scheduler '{0}'. Valid values are 'signal' and 'timer_thread'.")]
    InvalidScheduler(String),

    #[error("The {scheduler} scheduler does not support the {mode} mode")]
    UnsupportedScheduler { scheduler: SchedulerKind, mode: Mode },

    #[error("Another signal-driven profiling session is already armed in this process")]
    SchedulerBusy,

    #[error("{call} failed: {source}")]
    Os {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
