//! Line grammar: client-side pipes, inline overrides and argument splitting.
//!
//! Three markers shape a line typed at the prompt:
//!
//! - [`ESCAPE`] (`/`) prefixes a local command, e.g. `/display csv`.
//! - [`INLINE_MARKER`] (`//`) preceded by a space appends a one-off local
//!   command to a device command, e.g. `show version //display csv`.
//! - `||` splits a device command from a pipe that runs locally, e.g.
//!   `show inter terse | grep ge || wc -l`.
//!
//! The functions here are pure; which local commands exist is decided by the
//! caller (see [`crate::Registry::extract_inline_commands`]).

use crate::error::{CommandError, Result};

/// Prefix that marks a line as a local command.
pub const ESCAPE: char = '/';

/// Suffix on a command name that selects append rather than replace.
pub const APPEND: char = '+';

/// Doubled escape that introduces an inline override.
pub const INLINE_MARKER: &str = "//";

/// Separator scanned for when splitting inline overrides off a line.
const INLINE_SEPARATOR: &str = " //";

/// Classification of one inline override candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineToken {
    /// Parses as a local command usable inline.
    Command,
    /// Parses as the exit directive.
    Exit,
    /// Not a valid inline local command.
    Invalid,
}

/// A device-bound line with its inline overrides split off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineSplit {
    /// What remains to be sent to targets.
    pub body: String,
    /// Accepted overrides, in the order they appeared on the line.
    pub overrides: Vec<String>,
}

impl InlineSplit {
    /// True when the line carried no accepted overrides.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Splits trailing ` //command` segments off `line`.
///
/// Segments are examined right to left with `classify`. Accepted commands are
/// collected; an exit directive is dropped and stops the scan, returning
/// everything to its left to the body; the first invalid segment stops the
/// scan and is folded back into the body together with everything to its
/// left. A `//` with no space before it is never a boundary.
///
/// # Errors
///
/// Returns [`CommandError::Parse`] for an empty line.
pub fn extract_inline_commands<F>(line: &str, mut classify: F) -> Result<InlineSplit>
where
    F: FnMut(&str) -> InlineToken,
{
    if line.is_empty() {
        return Err(CommandError::parse("Empty command line."));
    }

    let tokens: Vec<&str> = line.split(INLINE_SEPARATOR).collect();
    let mut overrides = Vec::new();
    let mut body = tokens[0].to_string();

    for index in (1..tokens.len()).rev() {
        match classify(tokens[index]) {
            InlineToken::Command => overrides.push(tokens[index].to_string()),
            InlineToken::Exit => {
                body = tokens[..index].join(INLINE_SEPARATOR);
                break;
            }
            InlineToken::Invalid => {
                body = tokens[..=index].join(INLINE_SEPARATOR);
                break;
            }
        }
    }

    overrides.reverse();
    Ok(InlineSplit { body, overrides })
}

/// Lexical pieces of a device command, quotes kept opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Text(&'a str),
    Quoted(&'a str),
    Pipes(&'a str),
}

impl<'a> Piece<'a> {
    const fn as_str(&self) -> &'a str {
        match self {
            Self::Text(s) | Self::Quoted(s) | Self::Pipes(s) => s,
        }
    }
}

fn lex_pipes(line: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let bytes = line.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                if start < i {
                    pieces.push(Piece::Text(&line[start..i]));
                }
                // An unterminated quote runs to the end of the line.
                let end = line[i + 1..]
                    .find(char::from(quote))
                    .map_or(line.len(), |off| i + 1 + off + 1);
                pieces.push(Piece::Quoted(&line[i..end]));
                i = end;
                start = end;
            }
            b'|' => {
                if start < i {
                    pieces.push(Piece::Text(&line[start..i]));
                }
                let run = bytes[i..].iter().take_while(|b| **b == b'|').count();
                pieces.push(Piece::Pipes(&line[i..i + run]));
                i += run;
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < line.len() {
        pieces.push(Piece::Text(&line[start..]));
    }
    pieces
}

/// Splits a device command from its client-side pipe.
///
/// Returns `(device_part, local_pipe)`. Quoted spans are opaque. A single
/// `|` belongs to the device command; `||` starts the local pipe. Only the
/// `||` run not followed (to its right) by an unquoted single `|` counts: once
/// a single pipe appears to the right, every `||` further left is literal.
/// Accepted `||` after the first are rewritten to `|` in the local pipe.
///
/// ```
/// use tcli_core::grammar::extract_pipe;
///
/// let (cmd, pipe) = extract_pipe("show inter terse | grep ge || wc -l");
/// assert_eq!(cmd, "show inter terse | grep ge");
/// assert_eq!(pipe, "wc -l");
/// ```
#[must_use]
pub fn extract_pipe(line: &str) -> (String, String) {
    if !line.contains("||") {
        return (line.to_string(), String::new());
    }

    let pieces = lex_pipes(line);
    let mut accepted = Vec::new();
    for (index, piece) in pieces.iter().enumerate().rev() {
        match piece {
            Piece::Pipes("|") => break,
            Piece::Pipes("||") => accepted.push(index),
            _ => {}
        }
    }

    let Some(&first) = accepted.last() else {
        return (line.to_string(), String::new());
    };

    let device: String = pieces[..first].iter().map(Piece::as_str).collect();
    let local: String = pieces[first + 1..]
        .iter()
        .enumerate()
        .map(|(offset, piece)| {
            if accepted.contains(&(first + 1 + offset)) {
                "|"
            } else {
                piece.as_str()
            }
        })
        .collect();

    (device.trim_end().to_string(), local.trim().to_string())
}

/// Splits command arguments using shell quoting rules.
///
/// # Errors
///
/// Returns [`CommandError::Parse`] on an unterminated quote or escape.
pub fn split_args(text: &str) -> Result<Vec<String>> {
    shlex::split(text).ok_or_else(|| {
        CommandError::parse(format!(
            "Invalid string could not be parsed into arguments: {text:?}"
        ))
    })
}
