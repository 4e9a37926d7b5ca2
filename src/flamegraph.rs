use crate::{
    frame::{FrameId, ROOT_ID},
    profile::Profile,
};
use eyre::{Result, WrapErr};
use inferno::flamegraph;
use std::{fs, path::Path};
use tracing::info;

/// A profile flattened to folded stack lines, ready for inferno.
pub struct Flamegraph<'a> {
    folded_stack_lines: Vec<String>,
    pub options: flamegraph::Options<'a>,
}

impl<'a> Flamegraph<'a> {
    pub fn from_profile(profile: &Profile, sample_index: usize) -> Self {
        let mut options = flamegraph::Options::default();
        options.title = profile.filename.clone();
        if let Some(st) = profile.sample_type(sample_index) {
            options.count_name = st.sample_unit.clone();
            options.subtitle = Some(st.sample_type.clone());
        }
        Self {
            folded_stack_lines: folded_lines(profile, sample_index),
            options,
        }
    }

    pub fn folded_stack_lines(&self) -> &[String] {
        &self.folded_stack_lines
    }

    /// Writes the SVG to `file_name`, replacing any existing file.
    pub fn generate(&mut self, file_name: impl AsRef<Path>) -> Result<()> {
        let file_name = file_name.as_ref();
        if file_name.exists() {
            fs::remove_file(file_name)?;
        }
        let file = fs::File::create(file_name)?;

        flamegraph::from_lines(
            &mut self.options,
            self.folded_stack_lines.iter().map(|s| s.as_str()),
            file,
        )
        .wrap_err("inferno failed to render the flamegraph")?;
        info!(path = %file_name.display(), lines = self.folded_stack_lines.len(), "wrote flamegraph");
        Ok(())
    }
}

/// One `caller;...;frame SELF` line per frame with a positive self value,
/// the synthetic root left out of the stacks.
pub fn folded_lines(profile: &Profile, sample_index: usize) -> Vec<String> {
    let tree = profile.tree();
    let mut lines = vec![];
    let mut pending: Vec<(FrameId, String)> = tree
        .root()
        .children
        .iter()
        .rev()
        .map(|&c| (c, String::new()))
        .collect();

    while let Some((id, prepend)) = pending.pop() {
        let frame = &tree[id];
        let stack = if prepend.is_empty() {
            frame.name.clone()
        } else {
            format!("{prepend};{}", frame.name)
        };

        let self_value = profile.self_value(id, sample_index);
        if self_value > 0 {
            lines.push(format!("{stack} {self_value}"));
        }
        pending.extend(frame.children.iter().rev().map(|&c| (c, stack.clone())));
    }

    let root_self = profile.self_value(ROOT_ID, sample_index);
    if root_self > 0 {
        lines.push(format!("{} {root_self}", tree.root().name));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends;

    #[test]
    fn folds_self_values() {
        let profile = backends::parse(b"a;b 3\na 2\na;c 1\nd 4\n", "stacks.txt").unwrap();
        assert_eq!(folded_lines(&profile, 0), ["a 2", "a;b 3", "a;c 1", "d 4"]);
    }

    #[test]
    fn undercounted_children_keep_parent_self() {
        let profile = backends::parse(b"a;b;c 5\na;b 1\n", "stacks.txt").unwrap();
        assert_eq!(folded_lines(&profile, 0), ["a;b 1", "a;b;c 5"]);
    }

    #[test]
    fn writes_svg() {
        let profile = backends::parse(b"main;work 3\nmain 1\n", "cpu.txt").unwrap();
        let mut flamegraph = Flamegraph::from_profile(&profile, 0);
        assert_eq!(flamegraph.options.title, "cpu.txt");
        assert_eq!(flamegraph.options.count_name, "count");

        let path = std::env::temp_dir().join(format!("flameview-{}.svg", std::process::id()));
        flamegraph.generate(&path).unwrap();
        flamegraph.generate(&path).unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("work"));
    }

    #[test]
    fn generate_reports_unwritable_path() {
        let profile = backends::parse(b"main 1\n", "cpu.txt").unwrap();
        let path = std::env::temp_dir()
            .join(format!("flameview-missing-{}", std::process::id()))
            .join("out.svg");
        assert!(Flamegraph::from_profile(&profile, 0).generate(&path).is_err());
    }
}
