//! Terminal flamegraph viewer for pprof and collapsed-stack profiles.
//!
//! Bytes go through [`backends::parse`], which picks the format and builds a
//! [`profile::Profile`]. [`layout::FrameMaps`] lays the profile out for a
//! given width and zoom, and [`render::Renderer`] draws it.

pub mod backends;
pub mod cli;
pub mod colors;
pub mod error;
pub mod flamegraph;
pub mod frame;
pub mod layout;
pub mod opts;
pub mod profile;
pub mod render;
pub mod utils;

pub use backends::parse;
pub use error::{FormatError, ProfileError, RenderError};
pub use profile::{Profile, SampleType};
