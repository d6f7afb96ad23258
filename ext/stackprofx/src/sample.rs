use crate::host::{FrameId, StackWalker, ThreadHandle};

pub const MAX_STACK_DEPTH: usize = 2048;

/// Fixed-size buffer a single stack walk is captured into.
///
/// Allocated once per profile and reused for every walk, so capturing a
/// stack never allocates.
#[derive(Debug)]
pub struct Sample {
    pub thread: Option<ThreadHandle>,
    pub depth: usize,
    pub frames: [FrameId; MAX_STACK_DEPTH],
    pub linenos: [i32; MAX_STACK_DEPTH],
}

impl Sample {
    pub fn new() -> Box<Self> {
        Box::new(Sample {
            thread: None,
            depth: 0,
            frames: [FrameId::default(); MAX_STACK_DEPTH],
            linenos: [0; MAX_STACK_DEPTH],
        })
    }

    pub fn capture<W: StackWalker + ?Sized>(&mut self, thread: ThreadHandle, walker: &W) {
        self.thread = Some(thread);
        let depth = walker.walk(thread, &mut self.frames, &mut self.linenos);
        // Never trust the walker to respect the buffer size
        self.depth = depth.min(MAX_STACK_DEPTH);
    }

    /// Captured frames, innermost first.
    pub fn frames(&self) -> &[FrameId] {
        &self.frames[..self.depth]
    }

    pub fn linenos(&self) -> &[i32] {
        &self.linenos[..self.depth]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<(FrameId, i32)>);

    impl StackWalker for Fixed {
        fn walk(&self, _thread: ThreadHandle, frames: &mut [FrameId], lines: &mut [i32]) -> usize {
            let n = self.0.len().min(frames.len());
            for (i, (frame, line)) in self.0.iter().take(n).enumerate() {
                frames[i] = *frame;
                lines[i] = *line;
            }
            n
        }
    }

    #[test]
    fn test_capture() {
        let mut sample = Sample::new();
        let walker = Fixed(vec![(FrameId(1), 10), (FrameId(2), 0)]);
        sample.capture(ThreadHandle(7), &walker);

        assert_eq!(sample.thread, Some(ThreadHandle(7)));
        assert_eq!(sample.frames(), &[FrameId(1), FrameId(2)]);
        assert_eq!(sample.linenos(), &[10, 0]);
    }

    #[test]
    fn test_capture_is_bounded() {
        let mut sample = Sample::new();
        let walker = Fixed((0..MAX_STACK_DEPTH as u64 + 10).map(|i| (FrameId(i), 1)).collect());
        sample.capture(ThreadHandle(1), &walker);
        assert_eq!(sample.frames().len(), MAX_STACK_DEPTH);
    }

    #[test]
    fn test_reuse_shrinks() {
        let mut sample = Sample::new();
        sample.capture(ThreadHandle(1), &Fixed(vec![(FrameId(1), 1), (FrameId(2), 2)]));
        sample.capture(ThreadHandle(1), &Fixed(vec![(FrameId(3), 3)]));
        assert_eq!(sample.frames(), &[FrameId(3)]);
    }
}
