//! Brendan Gregg's collapsed (folded) stack format: `a;b;c 42` per line.

use crate::{
    backends::Backend,
    error::FormatError,
    frame::{CallTree, FrameId, FrameKind},
    profile::{Profile, SampleType},
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

static LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?) (\d+)$").unwrap());
static VALIDATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:.* )?\d+$").unwrap());

const VALIDATE_BYTES: usize = 1024;
const VALIDATE_LINES: usize = 100;

#[derive(Clone, Copy, Debug, Default)]
pub struct CollapsedBackend;

impl Backend for CollapsedBackend {
    fn name(&self) -> &'static str {
        "collapsed"
    }

    fn validate(&self, content: &[u8]) -> bool {
        validate(content)
    }

    fn parse(&self, content: &[u8], filename: &str) -> Result<Profile, FormatError> {
        let text = std::str::from_utf8(content)?;
        Ok(StackCollapseParser::new().parse(text, filename))
    }
}

/// Checks that the head of `content` looks like collapsed stacks.
///
/// The head runs to the end of the line crossing the first 1024 bytes, so
/// stacks deeper than that are still seen whole.
pub fn validate(content: &[u8]) -> bool {
    let head = &content[..head_len(content)];
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(err) => {
            info!(%err, "content is not UTF-8, not collapsed stacks");
            return false;
        }
    };

    let lines: Vec<&str> = text
        .split('\n')
        .take(VALIDATE_LINES)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        info!("content is empty, not collapsed stacks");
        return false;
    }

    for (index, line) in lines.iter().enumerate() {
        if !VALIDATE_RE.is_match(line) {
            info!(line = index + 1, content = line, "line does not look like a collapsed stack");
            return false;
        }
    }
    true
}

fn head_len(content: &[u8]) -> usize {
    if content.len() <= VALIDATE_BYTES {
        return content.len();
    }
    let from = VALIDATE_BYTES - 1;
    content[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(content.len(), |at| from + at + 1)
}

pub struct StackCollapseParser {
    tree: CallTree,
    highest: usize,
}

impl Default for StackCollapseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StackCollapseParser {
    pub fn new() -> Self {
        Self {
            tree: CallTree::new(1),
            highest: 0,
        }
    }

    pub fn parse(mut self, text: &str, filename: &str) -> Profile {
        let mut total_sample = 0;
        for line in text.split('\n') {
            total_sample += 1;
            self.parse_line(line);
        }
        info!(
            lines = total_sample,
            root = ?self.tree.root().values,
            "parsed collapsed stacks"
        );

        let mut profile = Profile::new(filename, self.tree, vec![SampleType::new("samples", "count")]);
        profile.highest_lines = self.highest;
        profile.total_sample = total_sample;
        profile
    }

    fn parse_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let Some(captures) = LINE_RE.captures(line) else {
            warn!(line, regex = LINE_RE.as_str(), "can not parse collapsed stack line");
            return;
        };
        let count: i64 = match captures[2].parse() {
            Ok(count) => count,
            Err(err) => {
                warn!(line, %err, "sample count out of range");
                return;
            }
        };
        let names: Vec<&str> = captures[1].split(';').collect();
        debug!(?names, count, "collapsed stack");

        let mut head: Option<FrameId> = None;
        let mut prev: Option<FrameId> = None;
        for name in &names {
            let id = self.tree.push(*name, vec![count], FrameKind::Collapsed);
            if let Some(prev) = prev {
                self.tree.link(prev, id);
            }
            head.get_or_insert(id);
            prev = Some(id);
        }

        if let Some(head) = head {
            self.tree.add_sample(head);
        }
        self.highest = self.highest.max(names.len());
    }
}
