use std::fmt;

/// Errors raised while decoding and assembling tile-data payloads.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unsupported element type '{0}', expected one of: int32, float32")]
    UnsupportedType(String),

    #[error("buffer too short: need {expected} bytes, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("cannot find update date/time in message: {message:?}")]
    PatternNotFound { message: String },

    #[error("config payload has no string field '{field}'")]
    MissingField { field: &'static str },

    #[error("update message holds an invalid date/time: {0}")]
    InvalidDateTime(String),

    #[error("expecting {expected} columns, found {found}")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("municipality {0} appears more than once in the payload")]
    DuplicateId(String),

    #[error("municipality {0} is not in the reference lookup")]
    UnknownMunicipality(String),

    #[error("cannot retrieve {resource}: {reason}")]
    RetrievalFailed { resource: Resource, reason: String },
}

/// The three logical payloads published by the tile-data backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Config,
    Header,
    Data,
}

impl Resource {
    pub fn file_name(self) -> &'static str {
        match self {
            Resource::Config => "config.json",
            Resource::Header => "va.dat",
            Resource::Data => "in.dat",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Resource::Config => "update config",
            Resource::Header => "header",
            Resource::Data => "data",
        };
        write!(f, "{} ({})", label, self.file_name())
    }
}
