use crate::frame::FrameId;
use thiserror::Error;

/// The payload is not a well-formed profile of the format being tried.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("profile content is too short: {0} bytes")]
    TooShort(usize),
    #[error("failed to decompress gzip payload: {0}")]
    Gzip(#[source] std::io::Error),
    #[error("malformed protobuf payload: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("string table is empty")]
    EmptyStringTable,
    #[error("string table index {0} out of range")]
    StringIndex(i64),
    #[error("{kind} {id} is referenced but not defined")]
    MissingRecord { kind: &'static str, id: u64 },
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("can not parse {filename}: content is neither pprof nor collapsed stacks")]
    Unrecognized { filename: String },
    #[error("frame {0} does not exist in this profile")]
    UnknownFrame(FrameId),
    #[error("sample type index {0} is out of range")]
    UnknownSampleIndex(i64),
}

/// Caller-contract violations of the layout and rendering layer. These point
/// at a bug in the caller, never at bad input.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("frame maps are not generated yet")]
    FrameMapsNotReady,
    #[error("frame {frame} starts {overlap} columns before the cursor on row {row}")]
    NegativePadding {
        frame: FrameId,
        row: usize,
        overlap: usize,
    },
    #[error("row {0} is out of range")]
    RowOutOfRange(usize),
    #[error(transparent)]
    Profile(#[from] ProfileError),
}
