use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the clipcrop stages.
///
/// `Format` and `Validation` only ever reject a single record; the stages
/// count them and keep going. `Resource` means nothing can be emitted safely.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("format error: {0}")]
    Format(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("cannot open {path}: {source}")]
    Resource {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Resource {
            source,
            path: path.into(),
        }
    }

    /// Whether the error only affects the record being processed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Format(_) | Error::Validation(_))
    }
}
