use super::frame_table::FrameTable;
use super::raw_samples::RawSampleLog;
use super::sample::Sample;
use crate::host::{FrameId, StackWalker, ThreadHandle};

/// Aggregated data of a profiling session.
///
/// Created on the first `start`, kept across `stop`/`start` cycles and
/// consumed by `results`.
#[derive(Debug)]
pub struct Profile {
    pub frame_table: FrameTable,
    pub raw_samples: RawSampleLog,
    sample: Box<Sample>,
}

impl Profile {
    pub fn new() -> Self {
        Self {
            frame_table: FrameTable::new(),
            raw_samples: RawSampleLog::new(),
            sample: Sample::new(),
        }
    }

    /// Walks `thread` and folds the stack into the frame table and,
    /// if `record_raw` is set, the raw sample log.
    pub fn record<W: StackWalker + ?Sized>(
        &mut self,
        thread: ThreadHandle,
        walker: &W,
        record_raw: bool,
    ) {
        self.sample.capture(thread, walker);

        if record_raw {
            self.raw_samples.append_or_collapse(self.sample.frames());
        }
        self.frame_table
            .record_stack(self.sample.frames(), self.sample.linenos());
    }

    /// Reports every frame the profile holds on to, for the host's GC.
    pub fn dmark(&self, mut mark: impl FnMut(FrameId)) {
        for frame in self.frame_table.frame_ids() {
            mark(frame);
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
