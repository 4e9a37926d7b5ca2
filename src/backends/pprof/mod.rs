use crate::{
    backends::Backend,
    error::FormatError,
    frame::{CallTree, FrameId, FrameKind},
    profile::Profile,
};
use chrono::{TimeZone, Utc};
use decoder::{Decoded, Location, Sample};
use std::{collections::HashMap, rc::Rc, time::Instant};
use tracing::{debug, info, warn};

pub mod decoder;
pub mod proto;

/// Go's pprof protobuf format, plain or gzip compressed.
#[derive(Clone, Copy, Debug, Default)]
pub struct PprofBackend;

impl Backend for PprofBackend {
    fn name(&self) -> &'static str {
        "pprof"
    }

    fn validate(&self, content: &[u8]) -> bool {
        match decoder::decode(content) {
            Ok(_) => true,
            Err(err) => {
                info!(%err, "content is not a pprof profile");
                false
            }
        }
    }

    fn parse(&self, content: &[u8], filename: &str) -> Result<Profile, FormatError> {
        parse_profile(content, filename)
    }
}

pub fn parse_profile(content: &[u8], filename: &str) -> Result<Profile, FormatError> {
    let decoded = decoder::decode(content)?;
    build_profile(decoded, filename)
}

fn build_profile(decoded: Decoded, filename: &str) -> Result<Profile, FormatError> {
    let start = Instant::now();
    let mut builder = TreeBuilder::new(decoded.sample_types.len());
    for sample in &decoded.samples {
        builder.add_sample(sample, &decoded.locations)?;
    }
    info!(
        samples = decoded.samples.len(),
        frames = builder.tree.len(),
        elapsed = ?start.elapsed(),
        "built pprof call tree"
    );
    debug!(tree = ?builder.tree);

    let mut profile = Profile::new(filename, builder.tree, decoded.sample_types);
    profile.highest_lines = builder.highest;
    profile.total_sample = decoded.samples.len();
    // 0 means unspecified, and the convention is then the last sample type
    if decoded.default_sample_type != 0 {
        profile.default_sample_type_index = decoded.default_sample_type;
    }
    profile.created_at = (decoded.time_nanos != 0).then(|| Utc.timestamp_nanos(decoded.time_nanos));
    profile.period = decoded.period;
    profile.period_type = decoded.period_type;
    profile.duration_nanos = decoded.duration_nanos;
    profile.comments = decoded.comments;
    profile.drop_frames = decoded.drop_frames;
    profile.keep_frames = decoded.keep_frames;
    Ok(profile)
}

struct TreeBuilder {
    tree: CallTree,
    sample_type_count: usize,
    highest: usize,
}

impl TreeBuilder {
    fn new(sample_type_count: usize) -> Self {
        Self {
            tree: CallTree::new(sample_type_count),
            sample_type_count,
            highest: 0,
        }
    }

    /// Builds the sample's chain, outermost call first, and piles it up
    /// under the root.
    fn add_sample(&mut self, sample: &Sample, locations: &HashMap<u64, Location>) -> Result<(), FormatError> {
        let stack = sample
            .location_ids
            .iter()
            .rev()
            .map(|id| {
                locations
                    .get(id)
                    .ok_or(FormatError::MissingRecord { kind: "location", id: *id })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let depth = stack.iter().map(|location| location.lines.len()).sum();
        self.highest = self.highest.max(depth);

        let mut values = sample.values.clone();
        if values.len() != self.sample_type_count {
            warn!(
                got = values.len(),
                expected = self.sample_type_count,
                "sample value count does not match sample types"
            );
            values.resize(self.sample_type_count, 0);
        }

        let mut head: Option<FrameId> = None;
        let mut prev: Option<FrameId> = None;
        for location in stack {
            // lines are already stored caller first
            for line in &location.lines {
                let kind = FrameKind::Pprof {
                    line: line.clone(),
                    mapping: location.mapping.as_ref().map(Rc::clone),
                };
                let id = self.tree.push(line.function.name.clone(), values.clone(), kind);
                if let Some(prev) = prev {
                    self.tree.link(prev, id);
                }
                head.get_or_insert(id);
                prev = Some(id);
            }
        }

        if let Some(head) = head {
            self.tree.add_sample(head);
        }
        Ok(())
    }
}
