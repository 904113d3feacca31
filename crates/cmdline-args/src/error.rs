use thiserror::Error;

/// Failure to store a value for a recognized argument.
///
/// Unknown flags are not errors; see [`crate::ParseReport::unknown`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing value for argument \"{flag}\"")]
    MissingValue { flag: String },

    #[error("invalid value \"{value}\" for argument \"{flag}\": {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },
}

impl ParseError {
    /// The flag spelling that triggered the error, as it appeared in argv.
    pub fn flag(&self) -> &str {
        match self {
            Self::MissingValue { flag } | Self::InvalidValue { flag, .. } => flag,
        }
    }
}
