use crate::backends::pprof::decoder::{Line, Mapping};
use serde::Serialize;
use std::{
    fmt,
    ops::{Index, IndexMut},
    rc::Rc,
};

/// Stable frame identifier, also the frame's slot in the [`CallTree`] arena.
pub type FrameId = usize;

/// The synthetic root is always created first.
pub const ROOT_ID: FrameId = 0;

/// Format-specific payload of a frame.
#[derive(Clone, Debug)]
pub enum FrameKind {
    Root,
    Pprof {
        line: Line,
        mapping: Option<Rc<Mapping>>,
    },
    Collapsed,
}

#[derive(Clone, Debug)]
pub struct Frame {
    pub id: FrameId,
    pub name: String,
    pub children: Vec<FrameId>,
    pub parent: Option<FrameId>,
    /// One value per declared sample type.
    pub values: Vec<i64>,
    pub root: FrameId,
    pub kind: FrameKind,
}

impl Frame {
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Value at `sample_index`, 0 when the frame carries fewer values.
    pub fn value(&self, sample_index: usize) -> i64 {
        self.values.get(sample_index).copied().unwrap_or(0)
    }

    /// `github.com/foo/bar.(*T).Run` -> `bar.(*T).Run`
    pub fn display_name(&self) -> &str {
        match self.name.rsplit_once('/') {
            Some((_, function)) => function,
            None => &self.name,
        }
    }

    /// Frames of the same module share a color.
    pub fn color_key(&self) -> &str {
        let function = self.display_name();
        function.split('.').next().unwrap_or(function)
    }

    pub fn package(&self) -> &str {
        match self.name.rsplit_once('/') {
            Some((package, _)) => package,
            None => "buildin",
        }
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        match &self.kind {
            FrameKind::Pprof { mapping, .. } => mapping.as_deref(),
            _ => None,
        }
    }
}

/// Arena holding every frame created while parsing, addressed by [`FrameId`].
///
/// Frames that were merged away by [`CallTree::pile_up`] stay in the arena but
/// are no longer reachable from the root.
#[derive(Clone)]
pub struct CallTree {
    frames: Vec<Frame>,
}

impl CallTree {
    /// Creates a tree holding only the root, with one zero per sample type.
    pub fn new(sample_type_count: usize) -> Self {
        let root = Frame {
            id: ROOT_ID,
            name: "root".to_string(),
            children: vec![],
            parent: None,
            values: vec![0; sample_type_count],
            root: ROOT_ID,
            kind: FrameKind::Root,
        };
        Self { frames: vec![root] }
    }

    /// Allocates a detached frame.
    pub fn push(&mut self, name: impl Into<String>, values: Vec<i64>, kind: FrameKind) -> FrameId {
        let id = self.frames.len();
        self.frames.push(Frame {
            id,
            name: name.into(),
            children: vec![],
            parent: None,
            values,
            root: ROOT_ID,
            kind,
        });
        id
    }

    /// Makes `child` the only child of `parent`. Used to build sample chains.
    pub fn link(&mut self, parent: FrameId, child: FrameId) {
        self.frames[parent].children = vec![child];
        self.frames[child].parent = Some(parent);
    }

    /// Merges the chain headed by `child` into the children of `parent`.
    ///
    /// A child with the same name absorbs the new frame's values (the new
    /// frame's own total is authoritative, its children may not add up to it)
    /// and the new frame's children are piled up into it in turn. Otherwise
    /// `child` is appended as a new branch.
    pub fn pile_up(&mut self, parent: FrameId, child: FrameId) {
        let mut pending = vec![(parent, child)];
        while let Some((parent, child)) = pending.pop() {
            self.frames[child].parent = Some(parent);

            let existing = self.frames[parent]
                .children
                .iter()
                .copied()
                .find(|&c| self.frames[c].name == self.frames[child].name);

            let Some(existing) = existing else {
                self.frames[parent].children.push(child);
                continue;
            };

            let values = self.frames[child].values.clone();
            add_values(&mut self.frames[existing].values, &values);

            let grandchildren = std::mem::take(&mut self.frames[child].children);
            // reversed so siblings are merged in their original order
            pending.extend(grandchildren.into_iter().rev().map(|gc| (existing, gc)));
        }
    }

    /// Adds a finished sample chain under the root.
    pub fn add_sample(&mut self, head: FrameId) {
        let values = self.frames[head].values.clone();
        add_values(&mut self.frames[ROOT_ID].values, &values);
        self.pile_up(ROOT_ID, head);
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id)
    }

    pub fn root(&self) -> &Frame {
        &self.frames[ROOT_ID]
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Serializable view of one frame, children given by id.
    pub fn node(&self, id: FrameId) -> FrameNode<'_> {
        let frame = &self.frames[id];
        FrameNode {
            id,
            name: &frame.name,
            parent: frame.parent,
            values: &frame.values,
            children: &frame.children,
        }
    }
}

impl Index<FrameId> for CallTree {
    type Output = Frame;

    fn index(&self, id: FrameId) -> &Frame {
        &self.frames[id]
    }
}

impl IndexMut<FrameId> for CallTree {
    fn index_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id]
    }
}

impl fmt::Debug for CallTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        let mut pending = vec![(ROOT_ID, 0)];
        while let Some((id, depth)) = pending.pop() {
            let frame = &self.frames[id];
            writeln!(
                f,
                "{:indent$}{} {:?}",
                "",
                frame.name,
                frame.values,
                indent = depth * 2
            )?;
            pending.extend(frame.children.iter().rev().map(|&c| (c, depth + 1)));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct FrameNode<'a> {
    pub id: FrameId,
    pub name: &'a str,
    pub parent: Option<FrameId>,
    pub values: &'a [i64],
    pub children: &'a [FrameId],
}

/// Elementwise `acc += other`, over the common length.
pub fn add_values(acc: &mut [i64], other: &[i64]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a = a.saturating_add(*b);
    }
}
