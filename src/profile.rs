use crate::frame::{CallTree, Frame, FrameId, FrameNode, ROOT_ID};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SampleType {
    pub sample_type: String,
    pub sample_unit: String,
}

impl SampleType {
    pub fn new(sample_type: &str, sample_unit: &str) -> Self {
        Self {
            sample_type: sample_type.to_string(),
            sample_unit: sample_unit.to_string(),
        }
    }
}

/// A parsed profile: the merged call tree plus everything derived from it.
///
/// The tree is frozen once the profile is built; `lines` and the name index
/// are computed in [`Profile::new`] and never change afterwards.
#[derive(Debug)]
pub struct Profile {
    pub filename: String,
    pub created_at: Option<DateTime<Utc>>,
    pub sample_types: Vec<SampleType>,
    /// Negative values count from the end, `-1` is the last sample type.
    pub default_sample_type_index: i64,
    pub period_type: Option<SampleType>,
    pub period: i64,
    pub duration_nanos: i64,
    pub comments: Vec<String>,
    pub drop_frames: String,
    pub keep_frames: String,
    /// Deepest stack seen while parsing.
    pub highest_lines: usize,
    pub total_sample: usize,

    tree: CallTree,
    lines: Vec<Vec<FrameId>>,
    line_index: HashMap<FrameId, usize>,
    name_aggr: HashMap<String, Vec<FrameId>>,
}

impl Profile {
    pub fn new(filename: &str, tree: CallTree, sample_types: Vec<SampleType>) -> Self {
        let (lines, line_index) = breadth_first_lines(&tree);
        let name_aggr = aggregate_names(&tree);
        Self {
            filename: filename.to_string(),
            created_at: None,
            sample_types,
            default_sample_type_index: -1,
            period_type: None,
            period: 0,
            duration_nanos: 0,
            comments: vec![],
            drop_frames: String::new(),
            keep_frames: String::new(),
            highest_lines: 0,
            total_sample: 0,
            tree,
            lines,
            line_index,
            name_aggr,
        }
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn root(&self) -> &Frame {
        self.tree.root()
    }

    /// Only frames reachable from the root are known to the profile.
    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.line_index.contains_key(&id).then(|| &self.tree[id])
    }

    /// Rows of the flamegraph, row `k` holding every frame at depth `k`.
    pub fn lines(&self) -> &[Vec<FrameId>] {
        &self.lines
    }

    pub fn line_of(&self, id: FrameId) -> Option<usize> {
        self.line_index.get(&id).copied()
    }

    /// Every instance of `name`, minus recursive occurrences below an
    /// instance of the same name.
    pub fn all_instances(&self, name: &str) -> &[FrameId] {
        self.name_aggr.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn name_aggr(&self) -> &HashMap<String, Vec<FrameId>> {
        &self.name_aggr
    }

    /// Resolves a possibly negative sample type index.
    pub fn sample_index(&self, index: i64) -> Option<usize> {
        let len = self.sample_types.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        (0..len).contains(&resolved).then_some(resolved as usize)
    }

    pub fn default_sample_index(&self) -> usize {
        self.sample_index(self.default_sample_type_index)
            .unwrap_or_else(|| {
                warn!(
                    index = self.default_sample_type_index,
                    sample_types = self.sample_types.len(),
                    "default sample type out of range, using the first one"
                );
                0
            })
    }

    pub fn sample_type(&self, sample_index: usize) -> Option<&SampleType> {
        self.sample_types.get(sample_index)
    }

    pub fn sample_unit(&self, sample_index: usize) -> &str {
        self.sample_type(sample_index)
            .map_or("", |st| st.sample_unit.as_str())
    }

    /// Ancestors of `id`, the root first, `id` itself excluded.
    pub fn ancestors(&self, id: FrameId) -> Vec<FrameId> {
        let mut chain = vec![];
        let mut current = self.tree.get(id).and_then(|f| f.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.tree[parent].parent;
        }
        chain.reverse();
        chain
    }

    pub fn parent(&self, id: FrameId) -> Option<FrameId> {
        self.frame(id).and_then(|f| f.parent)
    }

    /// First child holding the largest value at `sample_index`.
    pub fn biggest_child(&self, id: FrameId, sample_index: usize) -> Option<FrameId> {
        let frame = self.frame(id)?;
        let mut biggest: Option<FrameId> = None;
        for &child in &frame.children {
            let value = self.tree[child].value(sample_index);
            if biggest.map_or(true, |b| value > self.tree[b].value(sample_index)) {
                biggest = Some(child);
            }
        }
        biggest
    }

    /// Next sibling to the right with a positive value, looking at the
    /// siblings of each ancestor in turn when `id` is the last one.
    pub fn find_right_sibling(&self, id: FrameId, sample_index: usize) -> Option<FrameId> {
        self.find_sibling(id, sample_index, |siblings, at| {
            siblings.get(at + 1..).unwrap_or_default().iter().copied().collect()
        })
    }

    pub fn find_left_sibling(&self, id: FrameId, sample_index: usize) -> Option<FrameId> {
        self.find_sibling(id, sample_index, |siblings, at| {
            siblings[..at].iter().rev().copied().collect()
        })
    }

    fn find_sibling(
        &self,
        id: FrameId,
        sample_index: usize,
        candidates: impl Fn(&[FrameId], usize) -> Vec<FrameId>,
    ) -> Option<FrameId> {
        let mut me = id;
        let mut parent = self.parent(id);
        while let Some(p) = parent {
            let siblings = &self.tree[p].children;
            if let Some(at) = siblings.iter().position(|&s| s == me) {
                let found = candidates(siblings, at)
                    .into_iter()
                    .find(|&s| self.tree[s].value(sample_index) > 0);
                if found.is_some() {
                    return found;
                }
            }
            me = p;
            parent = self.tree[p].parent;
        }
        None
    }

    /// Value not attributed to any child, clamped at 0.
    pub fn self_value(&self, id: FrameId, sample_index: usize) -> i64 {
        let Some(frame) = self.frame(id) else {
            warn!(id, "self value of an unknown frame");
            return 0;
        };
        let children: i64 = frame
            .children
            .iter()
            .map(|&c| self.tree[c].value(sample_index))
            .sum();
        (frame.value(sample_index) - children).max(0)
    }

    pub fn percent_of_root(&self, value: i64, sample_index: usize) -> f64 {
        let total = self.root().value(sample_index);
        if total == 0 {
            return 0.0;
        }
        value as f64 / total as f64 * 100.0
    }

    /// Share of `ancestor`'s value taken by `id`.
    pub fn percent_of(&self, id: FrameId, ancestor: FrameId, sample_index: usize) -> f64 {
        let (Some(frame), Some(ancestor_frame)) = (self.frame(id), self.frame(ancestor)) else {
            warn!(id, ancestor, "percentage of an unknown frame");
            return 0.0;
        };
        let total = ancestor_frame.value(sample_index);
        if total == 0 {
            warn!(ancestor, sample_index, "percentage of a frame without value");
            return 0.0;
        }
        frame.value(sample_index) as f64 / total as f64 * 100.0
    }

    pub fn all_instances_total(&self, name: &str, sample_index: usize) -> i64 {
        self.all_instances(name)
            .iter()
            .map(|&id| self.tree[id].value(sample_index))
            .sum()
    }

    pub fn all_instances_self(&self, name: &str, sample_index: usize) -> i64 {
        self.all_instances(name)
            .iter()
            .map(|&id| self.self_value(id, sample_index))
            .sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ProfileDocument {
            filename: &self.filename,
            created_at: self.created_at,
            sample_types: &self.sample_types,
            default_sample_type_index: self.default_sample_type_index,
            period_type: self.period_type.as_ref(),
            period: self.period,
            highest_lines: self.highest_lines,
            total_sample: self.total_sample,
            frames: self.lines.iter().flatten().map(|&id| self.tree.node(id)).collect(),
        })
    }
}

#[derive(Serialize)]
struct ProfileDocument<'a> {
    filename: &'a str,
    #[serde(serialize_with = "serialize_created_at")]
    created_at: Option<DateTime<Utc>>,
    sample_types: &'a [SampleType],
    default_sample_type_index: i64,
    period_type: Option<&'a SampleType>,
    period: i64,
    highest_lines: usize,
    total_sample: usize,
    /// Reachable frames in row order, the root first.
    frames: Vec<FrameNode<'a>>,
}

fn serialize_created_at<S: serde::Serializer>(
    created_at: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match created_at {
        Some(at) => serializer.serialize_some(&at.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

fn breadth_first_lines(tree: &CallTree) -> (Vec<Vec<FrameId>>, HashMap<FrameId, usize>) {
    let mut lines: Vec<Vec<FrameId>> = vec![];
    let mut line_index = HashMap::new();
    let mut queue = VecDeque::from([(ROOT_ID, 0)]);
    while let Some((id, depth)) = queue.pop_front() {
        if lines.len() == depth {
            lines.push(vec![]);
        }
        lines[depth].push(id);
        line_index.insert(id, depth);
        queue.extend(tree[id].children.iter().map(|&c| (c, depth + 1)));
    }
    (lines, line_index)
}

fn aggregate_names(tree: &CallTree) -> HashMap<String, Vec<FrameId>> {
    enum Step {
        Enter(FrameId),
        Leave(FrameId),
    }

    let mut aggr: HashMap<String, Vec<FrameId>> = HashMap::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut steps = vec![Step::Enter(ROOT_ID)];
    while let Some(step) = steps.pop() {
        match step {
            Step::Enter(id) => {
                let frame = &tree[id];
                if on_path.insert(&frame.name) {
                    aggr.entry(frame.name.clone()).or_default().push(id);
                    steps.push(Step::Leave(id));
                }
                steps.extend(frame.children.iter().rev().map(|&c| Step::Enter(c)));
            }
            Step::Leave(id) => {
                on_path.remove(tree[id].name.as_str());
            }
        }
    }
    aggr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;

    /// `stacks` as `("a;b;c", value)` pairs.
    fn build(stacks: &[(&str, i64)]) -> Profile {
        let mut tree = CallTree::new(1);
        for (stack, value) in stacks {
            let mut head = None;
            let mut prev = None;
            for name in stack.split(';') {
                let id = tree.push(name, vec![*value], FrameKind::Collapsed);
                if let Some(prev) = prev {
                    tree.link(prev, id);
                }
                head.get_or_insert(id);
                prev = Some(id);
            }
            tree.add_sample(head.unwrap());
        }
        Profile::new("test", tree, vec![SampleType::new("samples", "count")])
    }

    fn named(profile: &Profile, path: &[&str]) -> FrameId {
        path.iter().fold(ROOT_ID, |id, name| {
            profile.tree()[id]
                .children
                .iter()
                .copied()
                .find(|&c| profile.tree()[c].name == *name)
                .unwrap()
        })
    }

    #[test]
    fn lines_are_breadth_first() {
        let profile = build(&[("s1;s2", 1), ("s1;s3", 2)]);
        // the second `s1` (id 3) was merged into id 1
        assert_eq!(profile.lines(), [vec![0], vec![1], vec![2, 4]]);
        assert_eq!(profile.line_of(4), Some(2));
        assert_eq!(profile.line_of(3), None);
        assert!(profile.frame(3).is_none());
        assert_eq!(profile.frame(4).unwrap().name, "s3");
    }

    #[test]
    fn chain_lines() {
        let profile = build(&[("s1;s2", 1)]);
        assert_eq!(profile.lines(), [vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn name_aggregation_skips_recursion() {
        let profile = build(&[("foo;bar;foo", 3), ("baz;foo", 2)]);
        let outer = named(&profile, &["foo"]);
        let nested = named(&profile, &["foo", "bar", "foo"]);
        let under_baz = named(&profile, &["baz", "foo"]);

        assert_eq!(profile.all_instances("foo"), [outer, under_baz]);
        assert!(!profile.all_instances("foo").contains(&nested));
        assert_eq!(profile.all_instances("bar").len(), 1);
        assert!(profile.all_instances("missing").is_empty());

        assert_eq!(profile.all_instances_total("foo", 0), 5);
        // outer foo passes everything to bar, baz's foo keeps its 2
        assert_eq!(profile.all_instances_self("foo", 0), 2);
    }

    #[test]
    fn sibling_paths_do_not_share_names() {
        let profile = build(&[("a;x", 1), ("b;x", 1), ("b;a", 1)]);
        assert_eq!(profile.all_instances("x").len(), 2);
        assert_eq!(profile.all_instances("a").len(), 2);
    }

    #[test]
    fn negative_sample_index_counts_from_end() {
        let mut profile = build(&[("a", 1)]);
        profile.sample_types = vec![
            SampleType::new("alloc_objects", "count"),
            SampleType::new("alloc_space", "bytes"),
            SampleType::new("inuse_space", "bytes"),
        ];
        assert_eq!(profile.sample_index(-1), Some(2));
        assert_eq!(profile.sample_index(-3), Some(0));
        assert_eq!(profile.sample_index(-4), None);
        assert_eq!(profile.sample_index(1), Some(1));
        assert_eq!(profile.sample_index(3), None);
        assert_eq!(profile.default_sample_index(), 2);
        assert_eq!(profile.sample_unit(2), "bytes");

        profile.default_sample_type_index = 7;
        assert_eq!(profile.default_sample_index(), 0);
    }

    #[test]
    fn moves_between_siblings_with_value() {
        let profile = build(&[("a;x", 3), ("b", 0), ("c;y", 2), ("c;z", 1)]);
        let a = named(&profile, &["a"]);
        let b = named(&profile, &["b"]);
        let c = named(&profile, &["c"]);
        let x = named(&profile, &["a", "x"]);
        let y = named(&profile, &["c", "y"]);
        let z = named(&profile, &["c", "z"]);

        // `b` has no value and is skipped
        assert_eq!(profile.find_right_sibling(a, 0), Some(c));
        assert_eq!(profile.find_left_sibling(c, 0), Some(a));
        assert_eq!(profile.find_right_sibling(y, 0), Some(z));
        assert_eq!(profile.find_left_sibling(z, 0), Some(y));
        // no sibling of x, so look right of its parent
        assert_eq!(profile.find_right_sibling(x, 0), Some(c));
        assert_eq!(profile.find_left_sibling(a, 0), None);
        assert_eq!(profile.find_right_sibling(z, 0), None);
        assert_eq!(profile.find_right_sibling(ROOT_ID, 0), None);
        assert_eq!(profile.find_left_sibling(b, 0), Some(a));
    }

    #[test]
    fn moves_up_and_down() {
        let profile = build(&[("a", 1), ("b", 3), ("c", 3)]);
        let b = named(&profile, &["b"]);
        assert_eq!(profile.biggest_child(ROOT_ID, 0), Some(b));
        assert_eq!(profile.biggest_child(b, 0), None);
        assert_eq!(profile.parent(b), Some(ROOT_ID));
        assert_eq!(profile.parent(ROOT_ID), None);
        assert_eq!(profile.ancestors(b), [ROOT_ID]);
        assert!(profile.ancestors(ROOT_ID).is_empty());
    }

    #[test]
    fn statistics() {
        let profile = build(&[("a;b", 3), ("a", 1)]);
        let a = named(&profile, &["a"]);
        let b = named(&profile, &["a", "b"]);

        assert_eq!(profile.self_value(a, 0), 1);
        assert_eq!(profile.self_value(b, 0), 3);
        assert_eq!(profile.self_value(ROOT_ID, 0), 0);
        assert_eq!(profile.percent_of_root(1, 0), 25.0);
        assert_eq!(profile.percent_of(b, a, 0), 75.0);
        assert_eq!(profile.percent_of(b, 999, 0), 0.0);
        assert_eq!(profile.self_value(999, 0), 0);
    }

    #[test]
    fn json_holds_the_merged_tree() {
        let profile = build(&[("a;b", 3), ("a", 1)]);
        let json: serde_json::Value = serde_json::from_str(&profile.to_json().unwrap()).unwrap();
        assert_eq!(json["filename"], "test");
        assert_eq!(json["created_at"], serde_json::Value::Null);
        let frames = json["frames"].as_array().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["id"], ROOT_ID);
        assert_eq!(frames[0]["values"], serde_json::json!([4]));
        assert_eq!(frames[1]["name"], "a");
        assert_eq!(frames[1]["parent"], ROOT_ID);
        assert_eq!(frames[0]["children"], serde_json::json!([frames[1]["id"]]));
        assert_eq!(frames[2]["values"], serde_json::json!([3]));
        assert_eq!(frames[2]["parent"], frames[1]["id"]);
    }

    #[test]
    fn deep_stacks_do_not_recurse() {
        let stack = vec!["f"; 100_000].join(";");
        let profile = build(&[(stack.as_str(), 1)]);
        assert_eq!(profile.lines().len(), 100_001);

        let json = profile.to_json().unwrap();
        assert_eq!(json.matches("\"name\": \"f\"").count(), 100_000);

        // indentation grows with depth, keep this one small
        let stack = vec!["g"; 2_000].join(";");
        let profile = build(&[(stack.as_str(), 1)]);
        let debug = format!("{:?}", profile.tree());
        assert_eq!(debug.lines().count(), 2_002);
        assert!(debug.ends_with(&format!("{}g [1]\n", " ".repeat(2 * 2_000))));
    }
}
