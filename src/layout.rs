//! Column layout of the flamegraph.
//!
//! Every frame below the focused one gets an `(offset, width)` pair per
//! sample type, proportional to its share of its parent. Widths are rounded
//! so that siblings plus the unused tail always add up to the parent's
//! width exactly, which keeps rows aligned at any terminal width.

use crate::{
    error::{ProfileError, RenderError},
    frame::FrameId,
    profile::Profile,
};
use std::{cmp::Ordering, collections::HashMap, time::Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameMap {
    pub offset: usize,
    pub width: usize,
    /// Columns left unused after the last child of a parent.
    pub followspaces: usize,
}

impl FrameMap {
    pub fn new(offset: usize, width: usize) -> Self {
        Self {
            offset,
            width,
            followspaces: 0,
        }
    }
}

/// Frame maps of one profile, recomputed only when the width or the focused
/// frame changes.
pub struct FrameMaps<'p> {
    profile: &'p Profile,
    key: Option<(usize, FrameId)>,
    maps: HashMap<FrameId, Vec<FrameMap>>,
    computations: usize,
}

impl<'p> FrameMaps<'p> {
    pub fn new(profile: &'p Profile) -> Self {
        Self {
            profile,
            key: None,
            maps: HashMap::new(),
            computations: 0,
        }
    }

    pub fn profile(&self) -> &'p Profile {
        self.profile
    }

    /// Lays out the subtree of `focused` in `width` columns. The focused
    /// frame and all of its ancestors span the whole width.
    pub fn generate(&mut self, width: usize, focused: FrameId) -> Result<(), ProfileError> {
        if self.key == Some((width, focused)) {
            debug!(width, focused, "frame maps are up to date");
            return Ok(());
        }
        let focused_frame = self
            .profile
            .frame(focused)
            .ok_or(ProfileError::UnknownFrame(focused))?;

        let start = Instant::now();
        let tree = self.profile.tree();
        let count = focused_frame.values.len();
        let mut maps: HashMap<FrameId, Vec<FrameMap>> = HashMap::new();

        maps.insert(focused, vec![FrameMap::new(0, width); count]);
        for ancestor in self.profile.ancestors(focused) {
            maps.insert(ancestor, vec![FrameMap::new(0, width); count]);
        }

        let mut pending = vec![focused];
        while let Some(id) = pending.pop() {
            let frame = &tree[id];
            if frame.children.is_empty() {
                continue;
            }
            let parent_maps = maps[&id].clone();
            let mut children_maps = vec![Vec::with_capacity(count); frame.children.len()];

            for (sample_index, parent_map) in parent_maps.iter().enumerate() {
                let parent_value = frame.value(sample_index);
                let parent_width = parent_map.width;

                let mut ideal: Vec<f64> = if parent_value <= 0 {
                    vec![0.0; frame.children.len()]
                } else {
                    frame
                        .children
                        .iter()
                        .map(|&c| tree[c].value(sample_index) as f64 / parent_value as f64 * parent_width as f64)
                        .collect()
                };

                let mut tail = parent_width as f64 - ideal.iter().sum::<f64>();
                if tail < 0.0 {
                    warn!(
                        frame = id,
                        sample_index,
                        overflow = -tail,
                        "children are wider than their parent"
                    );
                    tail = 0.0;
                }
                ideal.push(tail);

                let widths = saferound(&ideal, parent_width);
                let mut offset = parent_map.offset;
                let last = frame.children.len() - 1;
                for (index, child_maps) in children_maps.iter_mut().enumerate() {
                    let width = widths[index];
                    child_maps.push(FrameMap {
                        offset,
                        width,
                        followspaces: if index == last { tail as usize } else { 0 },
                    });
                    offset += width;
                }
            }

            for (&child, child_maps) in frame.children.iter().zip(children_maps) {
                maps.insert(child, child_maps);
                pending.push(child);
            }
        }

        self.maps = maps;
        self.key = Some((width, focused));
        self.computations += 1;
        info!(
            width,
            focused,
            frames = self.maps.len(),
            elapsed = ?start.elapsed(),
            "generated frame maps"
        );
        Ok(())
    }

    /// Layout of `id` at `sample_index`, `None` when the frame is not part
    /// of the focused view.
    pub fn get(&self, id: FrameId, sample_index: usize) -> Result<Option<FrameMap>, RenderError> {
        if self.key.is_none() {
            return Err(RenderError::FrameMapsNotReady);
        }
        Ok(self.maps.get(&id).and_then(|maps| maps.get(sample_index)).copied())
    }

    pub fn maps(&self) -> Result<&HashMap<FrameId, Vec<FrameMap>>, RenderError> {
        match self.key {
            Some(_) => Ok(&self.maps),
            None => Err(RenderError::FrameMapsNotReady),
        }
    }

    /// `(width, focused)` of the current maps.
    pub fn key(&self) -> Option<(usize, FrameId)> {
        self.key
    }

    /// How many times the maps were actually computed.
    pub fn computations(&self) -> usize {
        self.computations
    }
}

/// Rounds `values` to integers that sum to exactly `topline`.
///
/// Each value is rounded to nearest, then the remaining difference is
/// spread one unit at a time over the values with the largest rounding
/// error in the needed direction. No value goes below zero.
pub fn saferound(values: &[f64], topline: usize) -> Vec<usize> {
    let mut rounded: Vec<i64> = values.iter().map(|v| v.round().max(0.0) as i64).collect();
    if rounded.is_empty() {
        return vec![];
    }

    let mut difference = topline as i64 - rounded.iter().sum::<i64>();
    if difference != 0 {
        let step = difference.signum();
        let error = |i: usize| (values[i] - rounded[i] as f64) * step as f64;
        let mut order: Vec<usize> = (0..rounded.len()).collect();
        order.sort_by(|&a, &b| error(b).partial_cmp(&error(a)).unwrap_or(Ordering::Equal));

        while difference != 0 {
            let mut adjusted = false;
            for &i in &order {
                if difference == 0 {
                    break;
                }
                if step < 0 && rounded[i] == 0 {
                    continue;
                }
                rounded[i] += step;
                difference -= step;
                adjusted = true;
            }
            if !adjusted {
                break;
            }
        }
    }

    rounded.into_iter().map(|r| r as usize).collect()
}
