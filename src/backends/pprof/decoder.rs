//! Turns raw pprof bytes into resolved, typed records.
//!
//! Every string field is resolved against the string table eagerly, and
//! locations keep their inlined lines outermost first. These records only
//! live while the call tree is being built.

use super::proto;
use crate::{error::FormatError, profile::SampleType};
use flate2::read::MultiGzDecoder;
use prost::Message;
use std::{collections::HashMap, io::Read, rc::Rc};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Function {
    pub id: u64,
    pub filename: String,
    pub name: String,
    pub start_line: i64,
    pub system_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub line_no: i64,
    pub function: Rc<Function>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mapping {
    pub id: u64,
    pub memory_start: u64,
    pub memory_limit: u64,
    pub file_offset: u64,
    pub filename: String,
    pub build_id: String,
    pub has_functions: bool,
    pub has_filenames: bool,
    pub has_line_numbers: bool,
    pub has_inline_frames: bool,
}

#[derive(Clone, Debug)]
pub struct Location {
    pub id: u64,
    pub mapping: Option<Rc<Mapping>>,
    pub address: u64,
    /// Outermost caller first.
    pub lines: Vec<Line>,
    pub is_folded: bool,
}

#[derive(Clone, Debug)]
pub struct Sample {
    /// Leaf first, as on the wire.
    pub location_ids: Vec<u64>,
    pub values: Vec<i64>,
}

/// Everything the tree builder needs from a pprof payload.
#[derive(Debug, Default)]
pub struct Decoded {
    pub functions: HashMap<u64, Rc<Function>>,
    pub mappings: HashMap<u64, Rc<Mapping>>,
    pub locations: HashMap<u64, Location>,
    pub samples: Vec<Sample>,
    pub sample_types: Vec<SampleType>,
    pub time_nanos: i64,
    pub duration_nanos: i64,
    pub period_type: Option<SampleType>,
    pub period: i64,
    pub default_sample_type: i64,
    pub comments: Vec<String>,
    pub drop_frames: String,
    pub keep_frames: String,
}

/// Decompresses (when gzip) and decodes the protobuf message.
pub fn unmarshal(content: &[u8]) -> Result<proto::Profile, FormatError> {
    if content.len() < 2 {
        return Err(FormatError::TooShort(content.len()));
    }

    let profile = if content[..2] == GZIP_MAGIC {
        let mut raw = Vec::with_capacity(content.len() * 4);
        MultiGzDecoder::new(content)
            .read_to_end(&mut raw)
            .map_err(FormatError::Gzip)?;
        debug!(compressed = content.len(), raw = raw.len(), "profile is gzip compressed");
        proto::Profile::decode(raw.as_slice())?
    } else {
        proto::Profile::decode(content)?
    };

    if profile.string_table.is_empty() {
        return Err(FormatError::EmptyStringTable);
    }
    Ok(profile)
}

/// Full decode: [`unmarshal`] followed by record resolution.
pub fn decode(content: &[u8]) -> Result<Decoded, FormatError> {
    let profile = unmarshal(content)?;
    resolve(profile)
}

fn resolve(profile: proto::Profile) -> Result<Decoded, FormatError> {
    let table = StringTable(&profile.string_table);

    let functions = profile
        .functions
        .iter()
        .map(|f| {
            let function = Function {
                id: f.id,
                filename: table.get(f.filename)?,
                name: table.get(f.name)?,
                start_line: f.start_line,
                system_name: table.get(f.system_name)?,
            };
            Ok((f.id, Rc::new(function)))
        })
        .collect::<Result<HashMap<_, _>, FormatError>>()?;

    let mappings = profile
        .mappings
        .iter()
        .map(|m| {
            let mapping = Mapping {
                id: m.id,
                memory_start: m.memory_start,
                memory_limit: m.memory_limit,
                file_offset: m.file_offset,
                filename: table.get(m.filename)?,
                build_id: table.get(m.build_id)?,
                has_functions: m.has_functions,
                has_filenames: m.has_filenames,
                has_line_numbers: m.has_line_numbers,
                has_inline_frames: m.has_inline_frames,
            };
            Ok((m.id, Rc::new(mapping)))
        })
        .collect::<Result<HashMap<_, _>, FormatError>>()?;

    let mut locations = HashMap::with_capacity(profile.locations.len());
    for l in &profile.locations {
        // mapping_id 0 means the location has no mapping
        let mapping = match l.mapping_id {
            0 => None,
            id => Some(Rc::clone(mappings.get(&id).ok_or(FormatError::MissingRecord {
                kind: "mapping",
                id,
            })?)),
        };
        let lines = l
            .lines
            .iter()
            .rev()
            .map(|line| {
                let function = functions
                    .get(&line.function_id)
                    .ok_or(FormatError::MissingRecord {
                        kind: "function",
                        id: line.function_id,
                    })?;
                Ok(Line {
                    line_no: line.line,
                    function: Rc::clone(function),
                })
            })
            .collect::<Result<Vec<_>, FormatError>>()?;

        locations.insert(
            l.id,
            Location {
                id: l.id,
                mapping,
                address: l.address,
                lines,
                is_folded: l.is_folded,
            },
        );
    }

    let samples = profile
        .samples
        .into_iter()
        .map(|s| Sample {
            location_ids: s.location_ids,
            values: s.values,
        })
        .collect();

    let sample_types = profile
        .sample_types
        .iter()
        .map(|st| table.sample_type(st))
        .collect::<Result<Vec<_>, _>>()?;

    let period_type = profile
        .period_type
        .as_ref()
        .map(|st| table.sample_type(st))
        .transpose()?;

    let comments = profile
        .comment
        .iter()
        .map(|&c| table.get(c))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Decoded {
        functions,
        mappings,
        locations,
        samples,
        sample_types,
        time_nanos: profile.time_nanos,
        duration_nanos: profile.duration_nanos,
        period_type,
        period: profile.period,
        default_sample_type: profile.default_sample_type,
        comments,
        drop_frames: table.get(profile.drop_frames)?,
        keep_frames: table.get(profile.keep_frames)?,
    })
}

struct StringTable<'a>(&'a [String]);

impl StringTable<'_> {
    fn get(&self, index: i64) -> Result<String, FormatError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.0.get(i))
            .cloned()
            .ok_or(FormatError::StringIndex(index))
    }

    fn sample_type(&self, st: &proto::ValueType) -> Result<SampleType, FormatError> {
        Ok(SampleType {
            sample_type: self.get(st.r#type)?,
            sample_unit: self.get(st.unit)?,
        })
    }
}
