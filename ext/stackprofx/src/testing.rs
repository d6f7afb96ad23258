//! A scriptable host for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::allocation_scheduler::AllocationHook;
use crate::host::{
    AllocationEvents, Deferral, FrameId, FrameResolver, GcState, SafePointDeferral, StackWalker,
    ThreadEnumerator, ThreadHandle,
};
use crate::sample_collector::PostponedJob;

#[derive(Default)]
pub struct FakeHost {
    stacks: Mutex<BTreeMap<ThreadHandle, Vec<(FrameId, i32)>>>,
    blocked: Mutex<HashSet<ThreadHandle>>,
    names: Mutex<HashMap<FrameId, (String, String, u32)>>,
    during_gc: AtomicBool,
    pub deferral: SafePointDeferral,
    pub allocation_hook: Mutex<Option<AllocationHook>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stack of `thread`, innermost frame first.
    pub fn set_stack(&self, thread: ThreadHandle, stack: &[(FrameId, i32)]) {
        self.stacks.lock().unwrap().insert(thread, stack.to_vec());
    }

    pub fn set_runnable(&self, thread: ThreadHandle, runnable: bool) {
        let mut blocked = self.blocked.lock().unwrap();
        if runnable {
            blocked.remove(&thread);
        } else {
            blocked.insert(thread);
        }
    }

    pub fn set_during_gc(&self, during_gc: bool) {
        self.during_gc.store(during_gc, Ordering::SeqCst);
    }

    pub fn define_frame(&self, frame: FrameId, name: &str, file: &str, first_line: u32) {
        self.names
            .lock()
            .unwrap()
            .insert(frame, (name.to_owned(), file.to_owned(), first_line));
    }

    /// Simulates `count` object allocations.
    pub fn allocate(&self, count: usize) {
        let hook = self.allocation_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            for _ in 0..count {
                hook.on_allocation();
            }
        }
    }
}

impl StackWalker for FakeHost {
    fn walk(&self, thread: ThreadHandle, frames: &mut [FrameId], lines: &mut [i32]) -> usize {
        let stacks = self.stacks.lock().unwrap();
        let Some(stack) = stacks.get(&thread) else {
            return 0;
        };
        let depth = stack.len().min(frames.len());
        for (i, (frame, line)) in stack.iter().take(depth).enumerate() {
            frames[i] = *frame;
            lines[i] = *line;
        }
        depth
    }
}

impl ThreadEnumerator for FakeHost {
    fn live_threads(&self) -> Vec<ThreadHandle> {
        self.stacks.lock().unwrap().keys().copied().collect()
    }

    fn is_runnable(&self, thread: ThreadHandle) -> bool {
        !self.blocked.lock().unwrap().contains(&thread)
    }
}

impl FrameResolver for FakeHost {
    fn name(&self, frame: FrameId) -> Option<String> {
        self.names.lock().unwrap().get(&frame).map(|(name, _, _)| name.clone())
    }

    fn file_path(&self, frame: FrameId) -> Option<String> {
        self.names.lock().unwrap().get(&frame).map(|(_, file, _)| file.clone())
    }

    fn first_line(&self, frame: FrameId) -> Option<u32> {
        self.names.lock().unwrap().get(&frame).map(|(_, _, line)| *line)
    }
}

impl GcState for FakeHost {
    fn during_gc(&self) -> bool {
        self.during_gc.load(Ordering::SeqCst)
    }
}

impl Deferral for FakeHost {
    fn register(&self, job: PostponedJob) {
        self.deferral.register(job);
    }

    fn trigger(&self) {
        self.deferral.trigger();
    }
}

impl AllocationEvents for FakeHost {
    fn subscribe(&self, hook: AllocationHook) {
        *self.allocation_hook.lock().unwrap() = Some(hook);
    }

    fn unsubscribe(&self) {
        *self.allocation_hook.lock().unwrap() = None;
    }
}
