//! Static text rendering of a flamegraph view.

use crate::{
    colors::{ColorPalette, Rgb, VIEW_INFO_COLOR},
    error::{ProfileError, RenderError},
    frame::{Frame, FrameId, FrameKind, ROOT_ID},
    layout::FrameMaps,
    profile::Profile,
    utils::humanize,
};
use std::fmt::Write;
use tracing::{debug, trace};
use yansi::{Color, Paint};

const FRAME_EDGE: char = '▏';

#[derive(Clone, Debug)]
pub struct ViewOptions {
    pub width: usize,
    pub sample_index: usize,
    /// Zoom root. Its ancestors are drawn full width.
    pub focused: FrameId,
    /// Frame whose details are shown, drawn highlighted.
    pub view_frame: FrameId,
    /// Rows drawn below the focused frame.
    pub max_depth: Option<usize>,
    pub color: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            width: 120,
            sample_index: 0,
            focused: ROOT_ID,
            view_frame: ROOT_ID,
            max_depth: None,
            color: true,
        }
    }
}

pub struct Renderer<'p> {
    profile: &'p Profile,
    maps: FrameMaps<'p>,
    palette: ColorPalette,
    options: ViewOptions,
}

impl<'p> Renderer<'p> {
    pub fn new(profile: &'p Profile, options: ViewOptions) -> Self {
        Self {
            profile,
            maps: FrameMaps::new(profile),
            palette: ColorPalette::new(),
            options,
        }
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ViewOptions {
        &mut self.options
    }

    pub fn frame_maps(&self) -> &FrameMaps<'p> {
        &self.maps
    }

    /// Header, flamegraph rows, then the detail block of the view frame.
    pub fn render(&mut self) -> Result<String, RenderError> {
        if self.profile.sample_type(self.options.sample_index).is_none() {
            return Err(ProfileError::UnknownSampleIndex(self.options.sample_index as i64).into());
        }
        if self.profile.frame(self.options.view_frame).is_none() {
            return Err(ProfileError::UnknownFrame(self.options.view_frame).into());
        }
        self.maps.generate(self.options.width, self.options.focused)?;

        let mut out = String::new();
        for line in self.render_header() {
            writeln!(out, "{line}").ok();
        }
        writeln!(out).ok();
        for row in self.visible_rows() {
            writeln!(out, "{}", self.render_line(row)?).ok();
        }
        writeln!(out).ok();
        for line in self.render_detail(self.options.view_frame) {
            writeln!(out, "{line}").ok();
        }
        Ok(out)
    }

    pub fn render_header(&self) -> Vec<String> {
        let profile = self.profile;
        let sample_index = self.options.sample_index;
        let mut lines = vec![];

        let chosen = match profile.sample_type(sample_index) {
            Some(st) => format!("({}, {})", st.sample_type, st.sample_unit),
            None => "(-)".to_string(),
        };
        lines.push(format!("{}: {chosen}", profile.filename));

        let types: Vec<String> = profile
            .sample_types
            .iter()
            .enumerate()
            .map(|(i, st)| {
                if i == sample_index {
                    format!("[{}]", st.sample_type)
                } else {
                    st.sample_type.clone()
                }
            })
            .collect();
        lines.push(format!("Sample types: {}", types.join(" ")));

        if let Some(created_at) = profile.created_at {
            lines.push(format!("Dumped at {}", created_at.to_rfc3339()));
        }
        if let Some(period_type) = &profile.period_type {
            lines.push(format!(
                "Period: {} {} ({})",
                profile.period, period_type.sample_unit, period_type.sample_type
            ));
        }
        if profile.duration_nanos > 0 {
            lines.push(format!("Duration: {}ns", profile.duration_nanos));
        }
        lines.push(format!(
            "Samples: {}, max depth: {}",
            profile.total_sample, profile.highest_lines
        ));
        for comment in &profile.comments {
            lines.push(format!("# {comment}"));
        }
        lines
    }

    /// Rows from the root down to `max_depth` rows below the focused frame.
    pub fn visible_rows(&self) -> std::ops::Range<usize> {
        let rows = self.profile.lines().len();
        let end = match (self.options.max_depth, self.profile.line_of(self.options.focused)) {
            (Some(depth), Some(focused_row)) => (focused_row + depth + 1).min(rows),
            _ => rows,
        };
        0..end
    }

    /// Draws row `row` of the flamegraph. Frames outside the focused view or
    /// without width are left out.
    pub fn render_line(&mut self, row: usize) -> Result<String, RenderError> {
        let profile = self.profile;
        let line = profile.lines().get(row).ok_or(RenderError::RowOutOfRange(row))?;
        let tree = profile.tree();

        let mut out = String::new();
        let mut cursor = 0;
        for &id in line {
            let Some(map) = self.maps.get(id, self.options.sample_index)? else {
                trace!(frame = id, row, "frame not in the view");
                continue;
            };
            if map.width == 0 {
                continue;
            }

            if map.offset < cursor {
                return Err(RenderError::NegativePadding {
                    frame: id,
                    row,
                    overlap: cursor - map.offset,
                });
            }
            out.extend(std::iter::repeat(' ').take(map.offset - cursor));

            let frame = &tree[id];
            let text = fit(&format!("{FRAME_EDGE}{}", frame.display_name()), map.width);
            let (color, bold) = if id == self.options.view_frame {
                (VIEW_INFO_COLOR, true)
            } else {
                (self.palette.get_color(frame.color_key()), false)
            };
            out.push_str(&self.paint(&text, color, bold));
            cursor = map.offset + map.width;
            debug!(frame = id, row, ?map, "drawn");
        }
        Ok(out)
    }

    fn paint(&self, text: &str, background: Rgb, bold: bool) -> String {
        if !self.options.color {
            return text.to_string();
        }
        let mut chars = text.chars();
        let Some(edge) = chars.next() else {
            return String::new();
        };
        let rest: String = chars.collect();

        let bg = Color::from(background);
        let mut body = Paint::new(rest).bg(bg).fg(Color::from(background.contrast_text()));
        if bold {
            body = body.bold();
        }
        format!("{}{}", Paint::new(edge).bg(bg), body)
    }

    /// The call stack of `id`, innermost first, then its statistics.
    pub fn render_detail(&self, id: FrameId) -> Vec<String> {
        let profile = self.profile;
        let sample_index = self.options.sample_index;
        let unit = profile.sample_unit(sample_index);
        let Some(frame) = profile.frame(id) else {
            return vec![];
        };

        let mut lines = vec![frame.display_name().to_string()];
        let mut current = Some(id);
        while let Some(at) = current {
            let frame = &profile.tree()[at];
            lines.extend(frame_detail(profile, frame, sample_index, unit));
            current = frame.parent;
        }

        let percent = |value: i64| format!("{:.2}%", profile.percent_of_root(value, sample_index));

        let total = frame.value(sample_index);
        let self_value = profile.self_value(id, sample_index);
        lines.push(String::new());
        lines.push("This instance".to_string());
        lines.push(format!("  Total: {:>12} {:>8}", humanize(unit, total), percent(total)));
        lines.push(format!(
            "  Self:  {:>12} {:>8}",
            humanize(unit, self_value),
            percent(self_value)
        ));

        let all_total = profile.all_instances_total(&frame.name, sample_index);
        let all_self = profile.all_instances_self(&frame.name, sample_index);
        lines.push("All instances".to_string());
        lines.push(format!(
            "  Total: {:>12} {:>8}",
            humanize(unit, all_total),
            percent(all_total)
        ));
        lines.push(format!("  Self:  {:>12} {:>8}", humanize(unit, all_self), percent(all_self)));
        lines
    }
}

/// Detail lines of a single frame, depending on where it came from.
pub fn frame_detail(profile: &Profile, frame: &Frame, sample_index: usize, unit: &str) -> Vec<String> {
    match &frame.kind {
        FrameKind::Root => {
            let tree = profile.tree();
            let total: i64 = frame.children.iter().map(|&c| tree[c].value(sample_index)).sum();
            let binary = frame
                .children
                .first()
                .and_then(|&c| tree[c].mapping())
                .map_or_else(|| "root".to_string(), |m| format!("Binary: {}", m.filename));
            vec![format!("{binary} {}", humanize(unit, total))]
        }
        FrameKind::Pprof { line, .. } => vec![
            format!(
                "{}: {}",
                line.function.name,
                humanize(unit, frame.value(sample_index))
            ),
            format!("  {}, line {}", line.function.filename, line.line_no),
        ],
        FrameKind::Collapsed => vec![frame.name.clone()],
    }
}

/// Pads or truncates `text` to exactly `width` characters.
fn fit(text: &str, width: usize) -> String {
    let mut fitted: String = text.chars().take(width).collect();
    let len = fitted.chars().count();
    fitted.extend(std::iter::repeat(' ').take(width - len));
    fitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backends, backends::pprof::fixtures};
    use prost::Message;

    fn collapsed() -> Profile {
        backends::parse(b"a;b 3\na;c 1\nd 4\n", "stacks.txt").unwrap()
    }

    fn plain(width: usize) -> ViewOptions {
        ViewOptions {
            width,
            color: false,
            ..Default::default()
        }
    }

    #[test]
    fn rows_at_their_offsets() {
        let profile = collapsed();
        let mut renderer = Renderer::new(&profile, plain(16));
        renderer.render().unwrap();

        assert_eq!(renderer.render_line(0).unwrap(), "▏root           ");
        assert_eq!(renderer.render_line(1).unwrap(), "▏a      ▏d      ");
        assert_eq!(renderer.render_line(2).unwrap(), "▏b    ▏c");
        assert!(matches!(renderer.render_line(3), Err(RenderError::RowOutOfRange(3))));
    }

    #[test]
    fn narrow_frames_are_truncated_and_empty_ones_skipped() {
        let profile = backends::parse(b"abcdef 1\nx 0\ny 1\n", "s.txt").unwrap();
        let mut renderer = Renderer::new(&profile, plain(6));
        renderer.render().unwrap();
        assert_eq!(renderer.render_line(1).unwrap(), "▏ab▏y ");
    }

    #[test]
    fn zoomed_view_hides_other_branches() {
        let profile = collapsed();
        let a = profile.root().children[0];
        let mut renderer = Renderer::new(
            &profile,
            ViewOptions {
                focused: a,
                view_frame: a,
                ..plain(10)
            },
        );
        renderer.render().unwrap();
        assert_eq!(renderer.render_line(1).unwrap(), "▏a        ");
        assert_eq!(renderer.render_line(2).unwrap(), "▏b     ▏c ");
    }

    #[test]
    fn max_depth_limits_rows() {
        let profile = collapsed();
        let renderer = Renderer::new(
            &profile,
            ViewOptions {
                max_depth: Some(1),
                ..plain(10)
            },
        );
        assert_eq!(renderer.visible_rows(), 0..2);
    }

    #[test]
    fn line_before_layout_is_an_error() {
        let profile = collapsed();
        let mut renderer = Renderer::new(&profile, plain(10));
        assert!(matches!(renderer.render_line(0), Err(RenderError::FrameMapsNotReady)));
    }

    #[test]
    fn colored_view_frame_is_bold() {
        let profile = collapsed();
        let mut renderer = Renderer::new(
            &profile,
            ViewOptions {
                width: 8,
                ..Default::default()
            },
        );
        renderer.render().unwrap();
        let root = renderer.render_line(0).unwrap();
        assert!(root.contains("\u{1b}["));
        assert!(root.contains("root"));
    }

    #[test]
    fn pprof_detail() {
        let profile = backends::parse(&fixtures::simple().encode_to_vec(), "cpu.pprof").unwrap();
        let root = profile.root();
        assert_eq!(
            frame_detail(&profile, root, 1, "nanoseconds"),
            ["Binary: /usr/local/bin/app 1000"]
        );

        let main = root.children[0];
        let mut renderer = Renderer::new(
            &profile,
            ViewOptions {
                view_frame: main,
                sample_index: 1,
                ..plain(40)
            },
        );
        let out = renderer.render().unwrap();
        assert!(out.contains("cpu.pprof: (cpu, nanoseconds)"));
        assert!(out.contains("Sample types: samples [cpu]"));
        assert!(out.contains("main.main: 600"));
        assert!(out.contains("  /src/main.go, line 10"));
        assert!(out.contains("Binary: /usr/local/bin/app 1000"));
        assert!(out.contains("Period: 10000000 nanoseconds (cpu)"));
        assert!(out.contains("Samples: 5, max depth: 4"));
    }

    #[test]
    fn collapsed_detail_and_statistics() {
        let profile = backends::parse(b"a;b;a 2\nb 3\n", "rec.txt").unwrap();
        let a = profile.root().children[0];
        let renderer = Renderer::new(
            &profile,
            ViewOptions {
                view_frame: a,
                ..plain(10)
            },
        );
        let detail = renderer.render_detail(a);
        assert_eq!(detail[0], "a");
        assert_eq!(detail[1], "a");
        assert_eq!(detail[2], "root 5");
        assert_eq!(detail[4], "This instance");
        assert_eq!(detail[5], "  Total:            2   40.00%");
        assert_eq!(detail[6], "  Self:             0    0.00%");
        assert_eq!(detail[7], "All instances");
        // the nested `a` is not counted again
        assert_eq!(detail[8], "  Total:            2   40.00%");
    }

    #[test]
    fn unknown_sample_index() {
        let profile = collapsed();
        let mut renderer = Renderer::new(
            &profile,
            ViewOptions {
                sample_index: 3,
                ..plain(10)
            },
        );
        assert!(matches!(
            renderer.render(),
            Err(RenderError::Profile(ProfileError::UnknownSampleIndex(3)))
        ));
    }
}
