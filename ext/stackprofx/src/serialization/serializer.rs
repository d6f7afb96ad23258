use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::profile::{FrameDetails, Results, FORMAT_VERSION};
use crate::error::Result;
use crate::frame_table::FrameStats;
use crate::host::{FrameId, FrameResolver};
use crate::profile::Profile;
use crate::sample_collector::Counters;
use crate::session::configuration::Mode;

pub struct ResultsSerializer<'a, R: FrameResolver + ?Sized> {
    resolver: &'a R,
}

impl<'a, R: FrameResolver + ?Sized> ResultsSerializer<'a, R> {
    pub fn new(resolver: &'a R) -> Self {
        Self { resolver }
    }

    /// Drains `profile` into a [`Results`] snapshot.
    pub fn serialize(
        &self,
        mut profile: Profile,
        counters: Counters,
        mode: Mode,
        interval: Option<u64>,
    ) -> Results {
        let frames: BTreeMap<FrameId, FrameDetails> = profile
            .frame_table
            .drain()
            .map(|(frame, stats)| (frame, self.frame_details(frame, stats)))
            .collect();

        let raw = if profile.raw_samples.is_empty() {
            None
        } else {
            Some(profile.raw_samples.drain())
        };

        log::debug!(
            "Serialized {} frames, {} samples ({} during GC, {} missed)",
            frames.len(),
            counters.overall_samples,
            counters.during_gc,
            counters.missed_samples()
        );

        Results {
            version: FORMAT_VERSION,
            mode,
            interval,
            samples: counters.overall_samples,
            gc_samples: counters.during_gc,
            missed_samples: counters.missed_samples(),
            frames,
            raw,
        }
    }

    fn frame_details(&self, frame: FrameId, stats: FrameStats) -> FrameDetails {
        let lines = stats.lines.map(|lines| {
            lines
                .into_iter()
                .map(|(line, counter)| (line, counter.decode()))
                .collect()
        });

        FrameDetails {
            name: self.resolver.name(frame),
            file: self.resolver.file_path(frame),
            line: self.resolver.first_line(frame).filter(|line| *line != 0),
            total_samples: stats.total_samples,
            samples: stats.caller_samples,
            lines,
        }
    }
}

impl Results {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        log::debug!("Results written to {}", path.display());
        Ok(())
    }
}
