//! Presentation helpers: color schemes, line wrapping, prompt and banner.
//!
//! Nothing here writes escape sequences. A [`Style`] and an optional
//! [`ColorScheme`] travel with each piece of text to the
//! [`Terminal`](crate::output::Terminal), which decides how to show them.

use std::fmt;
use std::str::FromStr;

use crate::error::CommandError;
use crate::grammar::ESCAPE;

/// Line shown before input is read.
pub const PROMPT_STR: &str = "#! ";

/// Prompt header shown when targets are too wide for the terminal.
const TRUNCATED_TARGETS: &str = "#####";

/// Role of a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// Device output and undecorated text.
    Output,
    /// Headings such as `#!# device:command #!#`.
    Title,
    /// Replies to local commands.
    System,
    /// Warnings; written to stderr.
    Warning,
}

/// Palette used when color is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorScheme {
    /// For dark backgrounds.
    #[default]
    Light,
    /// For light backgrounds.
    Dark,
    /// Loud.
    Gross,
}

impl ColorScheme {
    /// Every scheme.
    pub const ALL: [Self; 3] = [Self::Light, Self::Dark, Self::Gross];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Gross => "gross",
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorScheme {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == s)
            .ok_or_else(|| CommandError::value(format!("Error: Unknown color scheme: {s:?}")))
    }
}

/// Hard-wraps every line of `text` at `width` characters.
#[must_use]
pub fn line_wrap(text: &str, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| {
            let chars: Vec<char> = line.chars().collect();
            if chars.len() <= width {
                return line.to_string();
            }
            chars
                .chunks(width)
                .map(|chunk| chunk.iter().collect::<String>())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt header `#! <targets[count]*> !#` as styled segments.
///
/// The targets string is replaced with `#####` when the whole header would
/// not fit in `width` columns. `*` marks safe mode.
#[must_use]
pub fn prompt_header(
    targets: &str,
    count: usize,
    safemode: bool,
    width: usize,
) -> Vec<(String, Style)> {
    let safe = if safemode { "*" } else { "" };
    let full = format!("#! <{targets}[{count}]{safe}> !#");
    let shown = if full.chars().count() < width {
        targets
    } else {
        TRUNCATED_TARGETS
    };

    vec![
        ("#! <".to_string(), Style::Output),
        (shown.to_string(), Style::System),
        ("[".to_string(), Style::Output),
        (count.to_string(), Style::Warning),
        ("]".to_string(), Style::Output),
        (safe.to_string(), Style::Title),
        ("> !#".to_string(), Style::Output),
    ]
}

/// Banner printed when an interactive session starts.
#[must_use]
pub fn banner() -> String {
    let rule = "#".repeat(76);
    format!(
        "#!{rule}!#
#! TCLI - Tokenized Command Line Interface
#! Note: Beta code, use with caution.
#!
#! Type '{ESCAPE}help' to get started.
#! To disable color: '{ESCAPE}color off'.
#!
#! Note:
#! Interactive TCLI starts in safe mode (indicated by '*' in the prompt).
#! To disable safe mode: '{ESCAPE}safemode off'.
#!
#! Have a nice day!
#!{rule}!#"
    )
}
