use crate::{
    backends,
    flamegraph::{folded_lines, Flamegraph},
    opts::FlameviewArgs,
    profile::Profile,
    render::{Renderer, ViewOptions},
};
use eyre::{Result, WrapErr};
use std::{
    fs,
    io::{self, IsTerminal, Read},
    path::Path,
};
use tracing::{info, trace};

const STDIN: &str = "-";

impl FlameviewArgs {
    pub fn run(self) -> Result<()> {
        trace!(target: "flameview::cli", args = ?self, "executing");

        let (content, filename) = self.read_input()?;
        let profile = backends::parse(&content, &filename)?;
        let sample_index = self.resolve_sample_index(&profile)?;

        if self.json {
            println!("{}", profile.to_json()?);
            return Ok(());
        }

        if self.folded {
            for line in folded_lines(&profile, sample_index) {
                println!("{line}");
            }
        }

        if let Some(svg) = &self.svg {
            Flamegraph::from_profile(&profile, sample_index)
                .generate(svg)
                .wrap_err_with(|| format!("failed to write {}", svg.display()))?;
            if self.open {
                open::that(svg).wrap_err_with(|| format!("failed to open {}", svg.display()))?;
            }
        }

        if self.folded || self.svg.is_some() {
            return Ok(());
        }

        if profile.frame(self.focus).is_none() {
            eyre::bail!("frame {} does not exist in {filename}", self.focus);
        }
        let options = ViewOptions {
            width: self.width,
            sample_index,
            focused: self.focus,
            view_frame: self.focus,
            max_depth: self.max_depth,
            color: !self.no_color && io::stdout().is_terminal(),
        };
        let mut renderer = Renderer::new(&profile, options);
        print!("{}", renderer.render()?);
        Ok(())
    }

    fn read_input(&self) -> Result<(Vec<u8>, String)> {
        if self.profile == Path::new(STDIN) {
            let mut content = vec![];
            io::stdin()
                .lock()
                .read_to_end(&mut content)
                .wrap_err("failed to read standard input")?;
            info!(bytes = content.len(), "read profile from stdin");
            return Ok((content, "<stdin>".to_string()));
        }

        let content = fs::read(&self.profile)
            .wrap_err_with(|| format!("failed to read {}", self.profile.display()))?;
        info!(path = %self.profile.display(), bytes = content.len(), "read profile");
        Ok((content, self.profile.display().to_string()))
    }

    fn resolve_sample_index(&self, profile: &Profile) -> Result<usize> {
        match self.sample_index {
            Some(index) => profile.sample_index(index).ok_or_else(|| {
                eyre::eyre!(
                    "sample index {index} is out of range, {} has {} sample types",
                    profile.filename,
                    profile.sample_types.len()
                )
            }),
            None => Ok(profile.default_sample_index()),
        }
    }
}
