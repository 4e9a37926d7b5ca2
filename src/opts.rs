use crate::frame::{FrameId, ROOT_ID};
use clap::{ArgAction, Parser, ValueHint};
use std::path::PathBuf;

const VERSION_MESSAGE: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    " ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

/// View pprof and collapsed-stack profiles as a flamegraph in the terminal.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "flameview",
    version = VERSION_MESSAGE,
    after_help = "Profiles may be pprof protobuf (plain or gzip) or collapsed stacks (`a;b;c 42` per line).",
    next_display_order = None,
)]
pub struct FlameviewArgs {
    /// Profile to open, `-` reads standard input.
    #[arg(value_name = "PROFILE", value_hint = ValueHint::FilePath)]
    pub profile: PathBuf,

    /// Log verbosity, repeat for more (-v info, -vv debug, -vvv trace).
    #[arg(long, short, action = ArgAction::Count)]
    pub verbose: u8,

    /// Append logs to this file instead of stderr.
    #[arg(long, short, value_name = "PATH", env = "FLAMEVIEW_LOG_TO", value_hint = ValueHint::FilePath)]
    pub log_to: Option<PathBuf>,

    #[arg(long, short, env = "COLUMNS", default_value_t = 120, help_heading = "View")]
    pub width: usize,

    /// Sample type to show. Negative values count from the end, defaults to
    /// the profile's own default.
    #[arg(long, short, allow_negative_numbers = true, help_heading = "View")]
    pub sample_index: Option<i64>,

    /// Frame id to zoom into.
    #[arg(long, short, default_value_t = ROOT_ID, help_heading = "View")]
    pub focus: FrameId,

    /// Rows drawn below the focused frame.
    #[arg(long, short = 'd', help_heading = "View")]
    pub max_depth: Option<usize>,

    #[arg(long, help_heading = "View")]
    pub no_color: bool,

    /// Print the merged call tree as JSON.
    #[arg(long, short, help_heading = "Output format", conflicts_with_all = ["folded", "svg"])]
    pub json: bool,

    /// Print folded stack lines.
    #[arg(long, help_heading = "Output format")]
    pub folded: bool,

    /// Write an SVG flamegraph.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath, help_heading = "Output format")]
    pub svg: Option<PathBuf>,

    /// Open the SVG once written.
    #[arg(long, requires = "svg", help_heading = "Output format")]
    pub open: bool,
}
