//! Request and reply records exchanged with the device accessor.

use std::fmt;
use std::str::FromStr;

use crate::error::CommandError;

/// Process-unique identifier of one outgoing request.
///
/// Allocated by the inventory, strictly increasing for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u64);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device command-line interpreter a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The device's native CLI.
    #[default]
    Cli,
    /// A gated CLI that restricts commands.
    Gated,
    /// HTTP API of the device.
    Http,
    /// The device's underlying shell.
    Shell,
}

impl Mode {
    /// Every mode, in display order.
    pub const ALL: [Self; 4] = [Self::Cli, Self::Gated, Self::Http, Self::Shell];

    /// Lowercase name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Gated => "gated",
            Self::Http => "http",
            Self::Shell => "shell",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                CommandError::value(format!(
                    "Unknown mode {s:?}. Available modes are '{}'",
                    names(&Self::ALL)
                ))
            })
    }
}

/// Output layout for rendered replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayFormat {
    /// Reply text as received.
    #[default]
    Raw,
    /// Comma separated values.
    Csv,
    /// Aligned table.
    Tbl,
    /// Name/value pairs.
    Nvp,
}

impl DisplayFormat {
    /// Every format, in display order.
    pub const ALL: [Self; 4] = [Self::Raw, Self::Csv, Self::Tbl, Self::Nvp];

    /// Lowercase name of the format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Csv => "csv",
            Self::Tbl => "tbl",
            Self::Nvp => "nvp",
        }
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayFormat {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| {
                CommandError::value(format!(
                    "Unknown display {s:?}. Available displays are '{}'",
                    names(&Self::ALL)
                ))
            })
    }
}

fn names<T: fmt::Display>(all: &[T]) -> String {
    all.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// One command bound for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Identifier the matching reply must carry.
    pub uid: Uid,
    /// Device name.
    pub target: String,
    /// Command text sent verbatim.
    pub command: String,
    /// Interpreter on the device.
    pub mode: Mode,
}

/// A device's answer to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Uid of the originating request.
    pub uid: Uid,
    /// Device that produced the reply.
    pub device_name: String,
    /// Command the device ran.
    pub command: String,
    /// Command output, empty when `error` is set.
    pub data: String,
    /// Failure description, empty on success.
    pub error: String,
}

impl Reply {
    /// Successful reply for `request`.
    #[must_use]
    pub fn ok(request: &Request, data: impl Into<String>) -> Self {
        Self {
            uid: request.uid,
            device_name: request.target.clone(),
            command: request.command.clone(),
            data: data.into(),
            error: String::new(),
        }
    }

    /// Failed reply for `request`.
    #[must_use]
    pub fn failed(request: &Request, error: impl Into<String>) -> Self {
        Self {
            uid: request.uid,
            device_name: request.target.clone(),
            command: request.command.clone(),
            data: String::new(),
            error: error.into(),
        }
    }

    /// True when the device reported an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request {
            uid: Uid(7),
            target: "device_a".into(),
            command: "show version".into(),
            mode: Mode::Cli,
        }
    }

    #[test]
    fn mode_round_trips_through_str() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_is_value_error() {
        let err = "telnet".parse::<Mode>().unwrap_err();
        assert!(!err.is_parse());
        assert!(err.to_string().contains("cli, gated, http, shell"));
    }

    #[test]
    fn unknown_display_is_value_error() {
        let err = "html".parse::<DisplayFormat>().unwrap_err();
        assert!(err.to_string().contains("Unknown display"));
    }

    #[test]
    fn reply_constructors_copy_request_identity() {
        let ok = Reply::ok(&request(), "Version 1.0");
        assert_eq!(ok.uid, Uid(7));
        assert_eq!(ok.device_name, "device_a");
        assert!(!ok.is_error());

        let failed = Reply::failed(&request(), "unreachable");
        assert!(failed.is_error());
        assert!(failed.data.is_empty());
    }
}
