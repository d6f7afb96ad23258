use crate::host::FrameId;

/// Initial capacity, in multiples of the first stack's footprint.
const INITIAL_CAPACITY_FACTOR: usize = 100;

/// Append-only log of every captured stack.
///
/// Stored as a flat sequence of words:
///
/// ```text
/// record := frame_count, frame_id{frame_count}, repeat_count
/// ```
///
/// Frames are written outermost first. A stack identical to the most recently
/// appended record bumps that record's `repeat_count` instead of being
/// appended again.
#[derive(Debug, Default)]
pub struct RawSampleLog {
    words: Vec<u64>,
    /// Offset of the most recently appended record. Kept as an index rather
    /// than a pointer so that it stays valid across reallocation.
    last_record: Option<usize>,
}

/// A decoded record of the raw sample log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Outermost frame first.
    pub frames: Vec<FrameId>,
    /// Number of consecutive captures of this exact stack.
    pub count: u64,
}

impl RawSample {
    /// Expands the record into `count` copies of its stack.
    pub fn expand(&self) -> impl Iterator<Item = &[FrameId]> + '_ {
        (0..self.count).map(move |_| self.frames.as_slice())
    }
}

impl RawSampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of words currently stored.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn capacity(&self) -> usize {
        self.words.capacity()
    }

    /// Makes room for one more record of `frame_count` frames.
    pub fn reserve(&mut self, frame_count: usize) {
        let needed = frame_count + 2;
        let mut capacity = self.words.capacity();
        if capacity == 0 {
            capacity = frame_count.max(1) * INITIAL_CAPACITY_FACTOR;
        }
        while capacity < self.words.len() + needed {
            capacity *= 2;
        }
        if capacity > self.words.capacity() {
            self.words.reserve_exact(capacity - self.words.len());
        }
    }

    fn same_as_last(&self, stack: &[FrameId]) -> bool {
        let Some(start) = self.last_record else {
            return false;
        };
        if self.words[start] != stack.len() as u64 {
            return false;
        }
        let stored = &self.words[start + 1..start + 1 + stack.len()];
        stored
            .iter()
            .zip(stack.iter().rev())
            .all(|(stored, frame)| *stored == frame.0)
    }

    /// Records `stack` (innermost first), collapsing it into the previous
    /// record when identical.
    pub fn append_or_collapse(&mut self, stack: &[FrameId]) {
        self.reserve(stack.len());

        if self.same_as_last(stack) {
            if let Some(count) = self.words.last_mut() {
                *count += 1;
            }
            return;
        }

        self.last_record = Some(self.words.len());
        self.words.push(stack.len() as u64);
        self.words.extend(stack.iter().rev().map(|frame| frame.0));
        self.words.push(1);
    }

    /// Decodes every record and releases the backing storage.
    pub fn drain(&mut self) -> Vec<RawSample> {
        let words = std::mem::take(&mut self.words);
        self.last_record = None;

        let mut samples = vec![];
        let mut cursor = 0;
        while cursor < words.len() {
            let frame_count = words[cursor] as usize;
            let frames_end = cursor + 1 + frame_count;
            let frames = words[cursor + 1..frames_end]
                .iter()
                .map(|word| FrameId(*word))
                .collect();
            samples.push(RawSample { frames, count: words[frames_end] });
            cursor = frames_end + 1;
        }
        samples
    }
}
