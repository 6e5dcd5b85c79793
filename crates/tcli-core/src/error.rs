//! Error types for command parsing, handlers and the device inventory.

use thiserror::Error;

/// Errors raised while parsing or executing a local command.
///
/// Both variants are recoverable: the line is abandoned, a warning is shown
/// and the session carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Malformed command line: unknown name, bad arity, bad quoting,
    /// disallowed characters or unsupported append.
    #[error("{0}")]
    Parse(String),

    /// A well-formed command was given an argument its handler rejects.
    #[error("{0}")]
    Value(String),
}

impl CommandError {
    /// Shorthand for a [`CommandError::Parse`].
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Shorthand for a [`CommandError::Value`].
    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }

    /// Returns true for parse failures.
    #[must_use]
    pub const fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Result type alias for local command operations.
pub type Result<T> = std::result::Result<T, CommandError>;

/// Errors raised by the device inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Device data could not be fetched from its source.
    #[error("device inventory failed to load: {0}")]
    Load(String),

    /// The source loaded but produced no devices.
    #[error("device inventory data failed to load or no devices found")]
    NoDevices,

    /// A filter regex did not compile.
    #[error("argument regexp {0:?} is invalid")]
    InvalidFilter(String),

    /// A filter named an attribute the inventory does not know.
    #[error("device attribute {0:?} invalid")]
    UnknownAttribute(String),

    /// A literal filter entry matched no known value.
    #[error("non-regexp filter entry {0:?} is not valid")]
    UnknownLiteral(String),

    /// The filtered device list is larger than the configured limit.
    #[error("target list exceeded maximum targets limit of: {0}")]
    MaxTargets(usize),

    /// The CSV source was malformed.
    #[error("csv error: {0}")]
    Csv(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InventoryError> for CommandError {
    fn from(err: InventoryError) -> Self {
        Self::Value(err.to_string())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::Value(err.to_string())
    }
}
