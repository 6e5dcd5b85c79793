//! Console terminal: crossterm styling, stdin input and a reply counter.

use std::fmt::Display;
use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::execute;
use crossterm::style::{Attribute, Color, ContentStyle, Print};
use crossterm::terminal::{Clear, ClearType};
use parking_lot::Mutex;
use tcli_core::display::PROMPT_STR;
use tcli_core::{ColorScheme, Progress, Style, Terminal};
use tracing::debug;

/// Colors for `style` under `scheme`. Plain output is never styled.
pub fn content_style(style: Style, scheme: ColorScheme) -> Option<ContentStyle> {
    let (foreground, background, bold) = match (scheme, style) {
        (_, Style::Output) => return None,
        (ColorScheme::Light, Style::System) => (Color::Yellow, None, false),
        (ColorScheme::Light, Style::Warning) => (Color::Red, None, false),
        (ColorScheme::Light, Style::Title) => (Color::Cyan, None, false),
        (ColorScheme::Dark, Style::System) => (Color::Blue, None, true),
        (ColorScheme::Dark, Style::Warning) => (Color::Red, None, true),
        (ColorScheme::Dark, Style::Title) => (Color::Magenta, None, true),
        (ColorScheme::Gross, Style::System) => (Color::Magenta, Some(Color::Cyan), true),
        (ColorScheme::Gross, Style::Warning) => (Color::Yellow, Some(Color::Magenta), true),
        (ColorScheme::Gross, Style::Title) => (Color::Red, Some(Color::Green), true),
    };

    let mut content = ContentStyle::new();
    content.foreground_color = Some(foreground);
    content.background_color = background;
    if bold {
        content.attributes.set(Attribute::Bold);
    }
    Some(content)
}

fn paint(text: &str, style: Style, scheme: Option<ColorScheme>) -> Box<dyn Display + '_> {
    match scheme.and_then(|scheme| content_style(style, scheme)) {
        Some(content) => Box::new(content.apply(text)),
        None => Box::new(text),
    }
}

/// Terminal over stdout, stderr and stdin.
///
/// Warnings go to stderr, everything else to stdout.
#[derive(Debug, Default)]
pub struct ConsoleTerminal;

impl ConsoleTerminal {
    /// Console terminal.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Writes styled segments as one line.
    pub fn write_segments(&self, segments: &[(String, Style)], scheme: Option<ColorScheme>) {
        if let Err(e) = write_segments(&mut io::stdout().lock(), segments, scheme) {
            debug!(error = %e, "Prompt write failed");
        }
    }
}

fn write_segments(
    out: &mut impl Write,
    segments: &[(String, Style)],
    scheme: Option<ColorScheme>,
) -> io::Result<()> {
    for (text, style) in segments {
        write!(out, "{}", paint(text, *style, scheme))?;
    }
    writeln!(out)
}

#[derive(Debug)]
struct Prompt {
    header: Vec<(String, Style)>,
    scheme: Option<ColorScheme>,
}

/// The prompt on screen while a line is being read.
///
/// An interrupt at the prompt discards the typed line, so the prompt is
/// drawn again, header included.
#[derive(Debug, Default)]
pub struct PromptState {
    current: Mutex<Option<Prompt>>,
}

impl PromptState {
    /// Empty state; nothing is being read.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `header` as shown above a pending read.
    pub fn reading(&self, header: Vec<(String, Style)>, scheme: Option<ColorScheme>) {
        *self.current.lock() = Some(Prompt { header, scheme });
    }

    /// Marks the read as finished.
    pub fn done(&self) {
        *self.current.lock() = None;
    }

    /// Draws the prompt again on a new line if a read is pending.
    /// Returns whether anything was drawn.
    ///
    /// # Errors
    ///
    /// Returns the error from writing to `out`.
    pub fn redraw(&self, out: &mut impl Write) -> io::Result<bool> {
        let current = self.current.lock();
        let Some(prompt) = current.as_ref() else {
            return Ok(false);
        };
        writeln!(out)?;
        write_segments(out, &prompt.header, prompt.scheme)?;
        write!(out, "{PROMPT_STR}")?;
        out.flush()?;
        Ok(true)
    }
}

impl Terminal for ConsoleTerminal {
    fn write(&self, text: &str, style: Style, scheme: Option<ColorScheme>) {
        let painted = paint(text, style, scheme);
        let result = if style == Style::Warning {
            writeln!(io::stderr().lock(), "{painted}")
        } else {
            writeln!(io::stdout().lock(), "{painted}")
        };
        if let Err(e) = result {
            debug!(error = %e, "Terminal write failed");
        }
    }

    fn width(&self) -> usize {
        crossterm::terminal::size().map_or(80, |(columns, _)| usize::from(columns))
    }

    fn read_line(&self, prompt: &str) -> Option<String> {
        let mut stdout = io::stdout().lock();
        if write!(stdout, "{prompt}").and_then(|()| stdout.flush()).is_err() {
            return None;
        }
        drop(stdout);

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
            Err(e) => {
                debug!(error = %e, "Read from stdin failed");
                None
            }
        }
    }
}

/// `[received/expected]` counter on stderr while replies arrive.
#[derive(Debug)]
pub struct ReplyCounter {
    enabled: bool,
}

impl ReplyCounter {
    /// Counter that only draws when stderr is a terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: io::stderr().is_terminal(),
        }
    }

    fn draw(&self, text: &str) {
        if !self.enabled {
            return;
        }
        let mut stderr = io::stderr().lock();
        let drawn = execute!(
            stderr,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(text)
        );
        if let Err(e) = drawn {
            debug!(error = %e, "Progress draw failed");
        }
    }
}

impl Default for ReplyCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ReplyCounter {
    fn advance(&self, received: usize, expected: usize) {
        self.draw(&format!("[{received}/{expected}]"));
    }

    fn clear(&self) {
        self.draw("");
    }
}
