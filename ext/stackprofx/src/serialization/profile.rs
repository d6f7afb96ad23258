use std::collections::BTreeMap;

use crate::host::FrameId;
use crate::raw_samples::RawSample;
use crate::session::configuration::Mode;

pub const FORMAT_VERSION: f64 = 1.1;

/// The immutable snapshot returned by `Session::results`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub version: f64,
    pub mode: Mode,
    pub interval: Option<u64>,
    /// Number of samples taken, including the ones that fell into a GC pause.
    pub samples: usize,
    pub gc_samples: usize,
    /// Events that did not result in a sample.
    pub missed_samples: usize,
    pub frames: BTreeMap<FrameId, FrameDetails>,
    /// Every captured stack in capture order, with consecutive repeats
    /// collapsed. Absent if no raw sample was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<RawSample>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDetails {
    pub name: Option<String>,
    pub file: Option<String>,
    /// The first line number of the method definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub total_samples: usize,
    /// Samples where this frame was the innermost one.
    pub samples: usize,
    /// Line number -> (total, samples as innermost frame).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<BTreeMap<u32, (u32, u32)>>,
}

impl Results {
    /// Expands the raw sample log into the ordered list of captured stacks,
    /// outermost frame first.
    pub fn raw_stacks(&self) -> impl Iterator<Item = &[FrameId]> + '_ {
        self.raw.iter().flatten().flat_map(|sample| sample.expand())
    }
}
