//! Input formats, and picking the right one for a payload.

use crate::{
    error::{FormatError, ProfileError},
    profile::Profile,
};
use std::time::Instant;
use tracing::{debug, info};

pub mod collapsed;
pub mod pprof;

pub use collapsed::CollapsedBackend;
pub use pprof::PprofBackend;

pub trait Backend {
    fn name(&self) -> &'static str;

    /// Cheap-enough check that `content` is in this backend's format.
    fn validate(&self, content: &[u8]) -> bool;

    fn parse(&self, content: &[u8], filename: &str) -> Result<Profile, FormatError>;
}

/// Binary first: gzip or protobuf bytes may well be valid UTF-8.
pub fn default_backends() -> Vec<Box<dyn Backend>> {
    vec![Box::new(PprofBackend), Box::new(CollapsedBackend)]
}

pub fn choose_backend<'a>(
    content: &[u8],
    backends: &'a [Box<dyn Backend>],
) -> Option<&'a dyn Backend> {
    backends.iter().map(|backend| &**backend).find(|backend| {
        let ok = backend.validate(content);
        debug!(backend = backend.name(), ok, "validated content");
        ok
    })
}

/// Detects the format of `content` and parses it.
pub fn parse(content: &[u8], filename: &str) -> Result<Profile, ProfileError> {
    let backends = default_backends();
    let backend = choose_backend(content, &backends).ok_or_else(|| ProfileError::Unrecognized {
        filename: filename.to_string(),
    })?;

    let start = Instant::now();
    let profile = backend.parse(content, filename)?;
    info!(
        backend = backend.name(),
        filename,
        elapsed = ?start.elapsed(),
        "parsed profile"
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::pprof::fixtures;
    use prost::Message;

    #[test]
    fn pprof_is_tried_first() {
        let backends = default_backends();
        let gz = fixtures::gzip(&fixtures::simple().encode_to_vec());
        assert_eq!(choose_backend(&gz, &backends).unwrap().name(), "pprof");

        let raw = fixtures::simple().encode_to_vec();
        assert_eq!(choose_backend(&raw, &backends).unwrap().name(), "pprof");
    }

    #[test]
    fn text_goes_to_collapsed() {
        let backends = default_backends();
        let backend = choose_backend(b"a;b;c 10\nc 4\n", &backends).unwrap();
        assert_eq!(backend.name(), "collapsed");
    }

    #[test]
    fn binary_that_is_also_utf8_is_still_pprof() {
        // only a string table, encoded as `2\0` `2\x03x 1`
        let encoded = pprof::proto::Profile {
            string_table: vec!["".into(), "x 1".into()],
            ..Default::default()
        }
        .encode_to_vec();
        assert!(collapsed::validate(&encoded));

        let backends = default_backends();
        assert_eq!(choose_backend(&encoded, &backends).unwrap().name(), "pprof");
    }

    #[test]
    fn unrecognized_content() {
        let err = parse(&[0xff, 0x00, 0x13, 0x37], "blob.bin").unwrap_err();
        assert!(matches!(err, ProfileError::Unrecognized { ref filename } if filename == "blob.bin"));
        assert_eq!(
            err.to_string(),
            "can not parse blob.bin: content is neither pprof nor collapsed stacks"
        );
    }

    #[test]
    fn parses_either_format() {
        let profile = parse(b"a;b 3\na;c 1\n", "stacks.txt").unwrap();
        assert_eq!(profile.root().values, vec![4]);

        let profile = parse(&fixtures::simple().encode_to_vec(), "cpu.pprof").unwrap();
        assert_eq!(profile.root().values, vec![10, 1000]);
    }
}
