use clap::Parser;
use eyre::Result;

use flameview::{opts::FlameviewArgs, utils};

fn main() -> Result<()> {
    let args = FlameviewArgs::parse();
    utils::subscriber(args.verbose, args.log_to.as_deref())?;
    args.run()
}
