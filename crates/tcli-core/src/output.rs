//! Printing and reply rendering.
//!
//! A [`Printer`] pairs a snapshot of the presentation settings with the
//! shared buffers and the [`Terminal`]. Every printed line is also appended
//! to the active log buffers:
//!
//! | kind    | buffers         |
//! |---------|-----------------|
//! | output  | `log`, `logall` |
//! | title   | `log`, `logall` |
//! | system  | `logall`        |
//! | warning | `logall`        |

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::buffer::Buffers;
use crate::display::{self, ColorScheme, Style};
use crate::types::{DisplayFormat, Reply};

/// Where text ends up.
pub trait Terminal: Send + Sync {
    /// Writes one message. `scheme` is `None` when color is off.
    fn write(&self, text: &str, style: Style, scheme: Option<ColorScheme>);

    /// Columns available.
    fn width(&self) -> usize {
        80
    }

    /// Reads one line of input after showing `prompt`, if input is possible.
    fn read_line(&self, prompt: &str) -> Option<String> {
        let _ = prompt;
        None
    }
}

/// Terminal that keeps everything written to it. Used by tests and when
/// embedding a session.
#[derive(Debug, Default)]
pub struct CaptureTerminal {
    written: Mutex<Vec<(Style, String)>>,
    input: Mutex<Vec<String>>,
    width: Option<usize>,
}

impl CaptureTerminal {
    /// Empty capture, 80 columns wide.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture reporting `width` columns.
    #[must_use]
    pub fn with_width(width: usize) -> Self {
        Self {
            width: Some(width),
            ..Self::default()
        }
    }

    /// Queues a line for [`Terminal::read_line`].
    pub fn push_input(&self, line: impl Into<String>) {
        self.input.lock().push(line.into());
    }

    /// Everything written, in order.
    pub fn written(&self) -> Vec<(Style, String)> {
        self.written.lock().clone()
    }

    /// Text written with `style`, one entry per write.
    pub fn texts(&self, style: Style) -> Vec<String> {
        self.written
            .lock()
            .iter()
            .filter(|(s, _)| *s == style)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// All text written, newline joined.
    pub fn transcript(&self) -> String {
        self.written
            .lock()
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Forgets everything written so far.
    pub fn clear(&self) {
        self.written.lock().clear();
    }
}

impl Terminal for CaptureTerminal {
    fn write(&self, text: &str, style: Style, _scheme: Option<ColorScheme>) {
        self.written.lock().push((style, text.to_string()));
    }

    fn width(&self) -> usize {
        self.width.unwrap_or(80)
    }

    fn read_line(&self, _prompt: &str) -> Option<String> {
        let mut input = self.input.lock();
        (!input.is_empty()).then(|| input.remove(0))
    }
}

/// Presentation settings captured when printing or dispatching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintSettings {
    /// Colorize output.
    pub color: bool,
    /// Palette when color is on.
    pub color_scheme: ColorScheme,
    /// Wrap at terminal width.
    pub linewrap: bool,
    /// Layout for replies.
    pub display: DisplayFormat,
    /// Template index, required by non-raw layouts.
    pub filter: Option<String>,
    /// Sort replies by device name within a row.
    pub sorted: bool,
    /// Buffer receiving output.
    pub log: Option<String>,
    /// Buffer receiving output, system text and warnings.
    pub logall: Option<String>,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            color: false,
            color_scheme: ColorScheme::Light,
            linewrap: false,
            display: DisplayFormat::Raw,
            filter: None,
            sorted: false,
            log: None,
            logall: None,
        }
    }
}

/// Prints to the terminal and the active log buffers.
#[derive(Clone)]
pub struct Printer {
    settings: PrintSettings,
    buffers: Buffers,
    terminal: Arc<dyn Terminal>,
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Printer {
    /// Printer over `terminal` with `settings`.
    pub fn new(settings: PrintSettings, buffers: Buffers, terminal: Arc<dyn Terminal>) -> Self {
        Self {
            settings,
            buffers,
            terminal,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &PrintSettings {
        &self.settings
    }

    fn emit(&self, text: &str, style: Style) {
        let scheme = self.settings.color.then_some(self.settings.color_scheme);
        if self.settings.linewrap {
            let wrapped = display::line_wrap(text, self.terminal.width());
            self.terminal.write(&wrapped, style, scheme);
        } else {
            self.terminal.write(text, style, scheme);
        }
    }

    /// Device output.
    pub fn output(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.buffers.append_opt(self.settings.log.as_deref(), text);
        self.buffers.append_opt(self.settings.logall.as_deref(), text);
        self.emit(text, Style::Output);
    }

    /// Heading above device output.
    pub fn title(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.buffers.append_opt(self.settings.log.as_deref(), text);
        self.buffers.append_opt(self.settings.logall.as_deref(), text);
        self.emit(text, Style::Title);
    }

    /// Reply to a local command.
    pub fn system(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.buffers.append_opt(self.settings.logall.as_deref(), text);
        self.emit(text, Style::System);
    }

    /// Warning.
    pub fn warning(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.buffers.append_opt(self.settings.logall.as_deref(), text);
        self.emit(text, Style::Warning);
    }

    /// Renders one released row.
    ///
    /// Error replies print as warnings. Layouts other than raw need a filter
    /// and otherwise show the reply text unchanged.
    pub fn render_row(&self, mut replies: Vec<Reply>, pipe: &str) {
        if self.settings.display != DisplayFormat::Raw && self.settings.filter.is_none() {
            self.warning(&format!(
                "No filter set, cannot display in {:?} format",
                self.settings.display.as_str()
            ));
            return;
        }

        if self.settings.sorted {
            replies.sort_by(|a, b| a.device_name.cmp(&b.device_name));
        }

        for reply in replies {
            if reply.is_error() {
                self.warning(&format!(
                    "#!# {}:{} #!#\n{}",
                    reply.device_name, reply.command, reply.error
                ));
                continue;
            }
            self.render_raw(&reply, pipe);
        }
    }

    fn render_raw(&self, reply: &Reply, pipe: &str) {
        self.title(&format!("#!# {}:{} #!#", reply.device_name, reply.command));
        if pipe.is_empty() {
            self.output(&reply.data);
            return;
        }
        match run_pipe(&reply.data, pipe) {
            Ok(filtered) => self.output(&filtered),
            Err(e) => {
                error!(pipe, error = %e, "Pipe failed");
                self.warning(&format!("Pipe {pipe:?} failed: {e}"));
            }
        }
    }
}

/// Feeds `input` through `sh -c <pipe>` and returns its stdout.
///
/// # Errors
///
/// Returns the I/O error if the shell cannot be started or read.
pub fn run_pipe(input: &str, pipe: &str) -> io::Result<String> {
    let pipe = pipe.trim_start_matches('|');
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(pipe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("pipe stdin unavailable"))?;
    let data = input.as_bytes().to_vec();
    let writer = std::thread::spawn(move || stdin.write_all(&data));

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_string(&mut output)?;
    }
    child.wait()?;
    // The command may exit without reading all input.
    let _ = writer.join();

    debug!(pipe, bytes_in = input.len(), bytes_out = output.len(), "Pipe complete");
    Ok(output)
}

/// Runs `command` with `sh -c` and returns its stdout.
///
/// # Errors
///
/// Returns the I/O error if the shell cannot be started.
pub fn run_shell(command: &str) -> io::Result<String> {
    let output = Command::new("sh").arg("-c").arg(command).output()?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Opens `text` in `editor` on the controlling terminal and returns the
/// edited text.
///
/// `editor` is run with `sh -c`, so it may carry its own arguments. The
/// file name is passed as the last argument.
///
/// # Errors
///
/// Returns an error if the scratch file cannot be used, the editor cannot be
/// started, or it exits unsuccessfully.
pub fn edit_text(text: &str, editor: &str) -> io::Result<String> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;

    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} \"$1\""))
        .arg("sh")
        .arg(file.path())
        .status()?;
    if !status.success() {
        return Err(io::Error::other(format!("Editor {editor:?} exited with {status}.")));
    }

    let edited = std::fs::read_to_string(file.path())?;
    debug!(editor, bytes_in = text.len(), bytes_out = edited.len(), "Edit complete");
    Ok(edited)
}
