use std::{fs::OpenOptions, io, path::Path, sync::Mutex};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const BINARY_PREFIXES: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

/// Formats a byte count with binary prefixes: `1536` -> `1.5KiB`.
pub fn sizeof(num: f64) -> String {
    let mut num = num;
    for unit in BINARY_PREFIXES {
        if num.abs() < 1024.0 {
            return format!("{num:.1}{unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:.1}YiB")
}

/// Display form of `value` in `sample_unit`. Only bytes get scaled.
pub fn humanize(sample_unit: &str, value: i64) -> String {
    match sample_unit {
        "bytes" => sizeof(value as f64),
        _ => value.to_string(),
    }
}

pub fn verbosity_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global tracing subscriber.
///
/// Logs go to `log_to` when given (appending, no colors), to stderr
/// otherwise. Nothing is installed when neither a log file nor `-v` was
/// asked for. `RUST_LOG` takes precedence over `verbose`.
pub fn subscriber(verbose: u8, log_to: Option<&Path>) -> io::Result<()> {
    if verbose == 0 && log_to.is_none() {
        return Ok(());
    }

    let level = verbosity_level(verbose);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,flameview={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    // the subscriber may already be set, e.g. in tests
    match log_to {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(io::stderr).try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(sizeof(0.0), "0.0B");
        assert_eq!(sizeof(1023.0), "1023.0B");
        assert_eq!(sizeof(1536.0), "1.5KiB");
        assert_eq!(sizeof(1024.0 * 1024.0 * 3.5), "3.5MiB");
        assert_eq!(sizeof(-2048.0), "-2.0KiB");
        assert_eq!(sizeof(1024f64.powi(8) * 2.0), "2.0YiB");
    }

    #[test]
    fn only_bytes_are_scaled() {
        assert_eq!(humanize("bytes", 10 * 1024 * 1024), "10.0MiB");
        assert_eq!(humanize("nanoseconds", 1_000_000), "1000000");
        assert_eq!(humanize("count", -3), "-3");
    }

    #[test]
    fn verbosity() {
        assert_eq!(verbosity_level(0), LevelFilter::WARN);
        assert_eq!(verbosity_level(2), LevelFilter::DEBUG);
        assert_eq!(verbosity_level(9), LevelFilter::TRACE);
    }

    #[test]
    fn quiet_by_default() {
        subscriber(0, None).unwrap();
    }
}
