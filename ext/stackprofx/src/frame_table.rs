use std::collections::HashMap;

use crate::counter::PackedCounter;
use crate::host::FrameId;

/// Accumulated statistics of a single frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Number of captured stacks this frame appeared in.
    pub total_samples: usize,
    /// Number of captured stacks where this frame was the innermost one.
    pub caller_samples: usize,
    /// Line number -> packed (total, weighted) counters.
    /// Allocated on the first sample carrying a line number.
    pub lines: Option<HashMap<u32, PackedCounter>>,
}

impl FrameStats {
    fn increment_line(&mut self, line: u32, increment: PackedCounter) {
        self.lines
            .get_or_insert_with(HashMap::new)
            .entry(line)
            .and_modify(|counter| *counter = counter.merge(increment))
            .or_insert(increment);
    }
}

#[derive(Debug, Default)]
pub struct FrameTable {
    frames: HashMap<FrameId, FrameStats>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, frame: FrameId) -> &mut FrameStats {
        self.frames.entry(frame).or_default()
    }

    pub fn get(&self, frame: FrameId) -> Option<&FrameStats> {
        self.frames.get(&frame)
    }

    /// Folds one walked stack (innermost first) into the table.
    pub fn record_stack(&mut self, frames: &[FrameId], lines: &[i32]) {
        for (i, frame) in frames.iter().enumerate() {
            let is_top = i == 0;
            let stats = self.get_or_create(*frame);
            stats.total_samples += 1;
            if is_top {
                stats.caller_samples += 1;
            }

            let line = lines.get(i).copied().unwrap_or(0);
            if line > 0 {
                let increment = if is_top { PackedCounter::top() } else { PackedCounter::generic() };
                stats.increment_line(line as u32, increment);
            }
        }
    }

    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.frames.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Removes every entry, handing each to the caller.
    pub fn drain(&mut self) -> impl Iterator<Item = (FrameId, FrameStats)> + '_ {
        self.frames.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: FrameId = FrameId(0xa);
    const B: FrameId = FrameId(0xb);
    const C: FrameId = FrameId(0xc);

    #[test]
    fn test_get_or_create() {
        let mut table = FrameTable::new();
        assert_eq!(*table.get_or_create(A), FrameStats::default());
        table.get_or_create(A).total_samples = 3;
        assert_eq!(table.get_or_create(A).total_samples, 3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_record_stack_counts() {
        let mut table = FrameTable::new();
        table.record_stack(&[A, B, C], &[0, 0, 0]);
        table.record_stack(&[B, C], &[0, 0]);
        table.record_stack(&[A, C], &[0, 0]);

        let a = table.get(A).unwrap();
        assert_eq!((a.total_samples, a.caller_samples), (2, 2));
        let b = table.get(B).unwrap();
        assert_eq!((b.total_samples, b.caller_samples), (2, 1));
        let c = table.get(C).unwrap();
        assert_eq!((c.total_samples, c.caller_samples), (3, 0));

        for (_, stats) in table.drain() {
            assert!(stats.caller_samples <= stats.total_samples);
            assert!(stats.lines.is_none());
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_record_stack_lines() {
        let mut table = FrameTable::new();
        table.record_stack(&[A, B], &[10, 20]);
        table.record_stack(&[A, B], &[11, 20]);
        table.record_stack(&[B], &[20]);

        let a_lines = table.get(A).unwrap().lines.as_ref().unwrap();
        assert_eq!(a_lines[&10].decode(), (1, 1));
        assert_eq!(a_lines[&11].decode(), (1, 1));

        let b_lines = table.get(B).unwrap().lines.as_ref().unwrap();
        assert_eq!(b_lines[&20].decode(), (3, 1));
    }

    #[test]
    fn test_recursive_frame_counts_every_occurrence() {
        let mut table = FrameTable::new();
        table.record_stack(&[A, A, B], &[5, 6, 0]);

        let a = table.get(A).unwrap();
        assert_eq!((a.total_samples, a.caller_samples), (2, 1));
        let lines = a.lines.as_ref().unwrap();
        assert_eq!(lines[&5].decode(), (1, 1));
        assert_eq!(lines[&6].decode(), (1, 0));
    }
}
