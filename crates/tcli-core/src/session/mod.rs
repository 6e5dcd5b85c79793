//! Session: live settings, local command execution and dispatch.
//!
//! A [`Session`] owns its own [`Registry`], its settings, and a slot holding
//! the one live [`Ledger`]. Device-bound lines become rows in a fresh ledger;
//! replies are delivered by the accessor on its own threads, reconciled by
//! the ledger and rendered row by row while the session blocks.
//!
//! ```text
//! parse_commands ──► exec_local ──► Registry::exec ──► handler
//!        │
//!        └─────────► dispatch ──► Accessor ──► RowSink::deliver ──► Printer
//!                        │                          │
//!                        └──── wait_done ◄── Ledger ┘
//! ```

pub mod commands;
mod inline;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::accessor::{Accessor, ReplyCallback};
use crate::buffer::Buffers;
use crate::config::{DEFAULT_COMMANDS, INVENTORY_DEFAULTS, SessionConfig};
use crate::display::{self, ColorScheme, Style};
use crate::error::{InventoryError, Result};
use crate::grammar::{self, ESCAPE, INLINE_MARKER};
use crate::inventory::Inventory;
use crate::ledger::{Ledger, Progress};
use crate::output::{PrintSettings, Printer, Terminal};
use crate::registry::{Invocation, Outcome, Registry};
use crate::types::{DisplayFormat, Mode, Reply};

/// Buffer the run-commands file is loaded into.
pub const STARTUP_BUFFER: &str = "startup";

/// Whether the session should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Flow {
    /// Read the next line.
    Continue,
    /// An exit directive was executed.
    Exit,
}

/// Buffers currently recording or logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogTargets {
    /// Receives device commands.
    pub record: Option<String>,
    /// Receives device and local commands.
    pub recordall: Option<String>,
    /// Receives device commands and output.
    pub log: Option<String>,
    /// Receives everything, warnings included.
    pub logall: Option<String>,
}

impl LogTargets {
    /// Names of the logging commands, in the order they are checked.
    pub const NAMES: [&'static str; 4] = ["record", "recordall", "log", "logall"];

    /// Active buffer of logging command `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "record" => self.record.as_deref(),
            "recordall" => self.recordall.as_deref(),
            "log" => self.log.as_deref(),
            "logall" => self.logall.as_deref(),
            _ => None,
        }
    }

    fn slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "record" => Some(&mut self.record),
            "recordall" => Some(&mut self.recordall),
            "log" => Some(&mut self.log),
            "logall" => Some(&mut self.logall),
            _ => None,
        }
    }

    /// Points logging command `name` at `buffer`.
    pub fn set(&mut self, name: &str, buffer: Option<String>) {
        if let Some(slot) = self.slot(name) {
            *slot = buffer;
        }
    }

    /// Whether any logging command writes to `buffer`.
    pub fn contains(&self, buffer: &str) -> bool {
        Self::NAMES.iter().any(|name| self.get(name) == Some(buffer))
    }

    /// Stops the first logging command writing to `buffer`.
    pub fn stop(&mut self, buffer: &str) -> bool {
        for name in Self::NAMES {
            if self.get(name) == Some(buffer) {
                self.set(name, None);
                return true;
            }
        }
        false
    }

    /// Every active buffer, possibly repeated.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        [&self.record, &self.recordall, &self.log, &self.logall]
            .into_iter()
            .filter_map(Option::as_deref)
    }
}

/// Live, per-session settings. Copied by value into inline overlays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Colorize output.
    pub color: bool,
    /// Palette when color is on.
    pub color_scheme: ColorScheme,
    /// Reply layout.
    pub display: DisplayFormat,
    /// Template index for non-raw layouts.
    pub filter: Option<String>,
    /// Wrap output at terminal width.
    pub linewrap: bool,
    /// Device interpreter.
    pub mode: Mode,
    /// Seconds to wait for replies.
    pub timeout: u64,
    /// Only explicit `command` reaches devices.
    pub safemode: bool,
    /// Extra columns in tabular layouts.
    pub verbose: bool,
    /// Recording and logging buffers.
    pub logging: LogTargets,
}

impl Settings {
    fn from_config(config: &SessionConfig) -> Self {
        Self {
            color: config.color,
            color_scheme: config.color_scheme,
            display: config.display,
            filter: (!config.filter.is_empty()).then(|| config.filter.clone()),
            linewrap: config.linewrap,
            mode: config.mode,
            timeout: config.timeout,
            safemode: false,
            verbose: false,
            logging: LogTargets::default(),
        }
    }

    /// Boolean setting behind toggle command `name`.
    pub fn flag_mut(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "color" => Some(&mut self.color),
            "linewrap" => Some(&mut self.linewrap),
            "safemode" => Some(&mut self.safemode),
            "verbose" => Some(&mut self.verbose),
            _ => None,
        }
    }
}

/// Forwards replies into the current ledger and renders released rows.
struct RowSink {
    ledger: Arc<Mutex<Arc<Ledger>>>,
    drain: Arc<Mutex<()>>,
    printer: Printer,
}

impl RowSink {
    fn deliver(&self, reply: Reply) {
        // One reply at a time so rows print whole and in order.
        let _drain = self.drain.lock();
        let ledger = Arc::clone(&*self.ledger.lock());
        debug!(uid = %reply.uid, device = %reply.device_name, "Reply delivered");
        if !ledger.add_reply(reply) {
            return;
        }
        while let Some(row) = ledger.next_completed_row() {
            self.printer.render_row(ledger.replies(&row), &row.pipe);
        }
    }
}

/// An interactive or batch command session.
pub struct Session {
    defaults: SessionConfig,
    settings: Settings,
    registry: Arc<Registry<Session>>,
    buffers: Buffers,
    inventory: Arc<Inventory>,
    accessor: Arc<dyn Accessor>,
    terminal: Arc<dyn Terminal>,
    ledger: Arc<Mutex<Arc<Ledger>>>,
    drain: Arc<Mutex<()>>,
    progress: Option<Arc<dyn Progress>>,
    playback: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("playback", &self.playback)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session with base and inventory commands registered.
    ///
    /// Blocks until the inventory's pending load completes, since filter
    /// commands are registered per device attribute.
    pub fn new(
        config: SessionConfig,
        inventory: Arc<Inventory>,
        accessor: Arc<dyn Accessor>,
        terminal: Arc<dyn Terminal>,
    ) -> Self {
        let mut registry = commands::base_registry(&config);
        commands::register_inventory(&mut registry, &config, &inventory);

        Self {
            settings: Settings::from_config(&config),
            defaults: config,
            registry: Arc::new(registry),
            buffers: Buffers::new(),
            inventory,
            accessor,
            terminal,
            ledger: Arc::new(Mutex::new(Arc::new(Ledger::new()))),
            drain: Arc::new(Mutex::new(())),
            progress: None,
            playback: None,
        }
    }

    /// Reports reply progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Live settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start-up configuration.
    pub fn defaults(&self) -> &SessionConfig {
        &self.defaults
    }

    /// This session's commands.
    pub fn registry(&self) -> &Registry<Self> {
        &self.registry
    }

    /// Shared text buffers.
    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    /// Shared device inventory.
    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    /// Ledger of the current or most recent batch.
    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&*self.ledger.lock())
    }

    /// Discards outstanding replies by installing an empty ledger.
    pub fn reset_ledger(&self) {
        let _drain = self.drain.lock();
        *self.ledger.lock() = Arc::new(Ledger::new());
    }

    /// Palette to use, `None` when color is off.
    pub fn color_scheme(&self) -> Option<ColorScheme> {
        self.settings.color.then_some(self.settings.color_scheme)
    }

    /// Targets passing the current filters.
    ///
    /// # Errors
    ///
    /// Inventory failures, including the target ceiling.
    pub fn device_list(&self) -> std::result::Result<Vec<String>, InventoryError> {
        self.inventory.device_list()
    }

    /// Printer over the current settings.
    pub fn printer(&self) -> Printer {
        let settings = PrintSettings {
            color: self.settings.color,
            color_scheme: self.settings.color_scheme,
            linewrap: self.settings.linewrap,
            display: self.settings.display,
            filter: self.settings.filter.clone(),
            sorted: self.defaults.sorted,
            log: self.settings.logging.log.clone(),
            logall: self.settings.logging.logall.clone(),
        };
        Printer::new(settings, self.buffers.clone(), Arc::clone(&self.terminal))
    }

    fn print_output(&self, text: &str) {
        self.printer().output(text);
    }

    fn print_title(&self, text: &str) {
        self.printer().title(text);
    }

    fn print_system(&self, text: &str) {
        self.printer().system(text);
    }

    fn print_warning(&self, text: &str) {
        self.printer().warning(text);
    }

    /// Prompt header segments for the current targets.
    pub fn prompt_header(&self) -> Vec<(String, Style)> {
        let count = match self.device_list() {
            Ok(list) => list.len(),
            Err(e) => {
                self.print_warning(&e.to_string());
                0
            }
        };
        display::prompt_header(
            &self.inventory.targets(),
            count,
            self.settings.safemode,
            self.terminal.width(),
        )
    }

    /// Runs start-up tasks.
    ///
    /// Inventory filters and presentation defaults are applied first. An
    /// interactive session then enters safe mode and plays `rc` (if any)
    /// from the `startup` buffer, after which the defaults are applied again
    /// so explicit settings win. Finally `commands` are executed.
    pub fn start_up(&mut self, interactive: bool, rc: Option<&str>, commands: Option<&str>) -> Flow {
        self.set_filters_from_defaults();
        self.set_defaults();

        if interactive {
            self.settings.safemode = true;
            if let Some(rc) = rc {
                self.buffers.append(STARTUP_BUFFER, rc);
                if let Ok(text) = self.buffers.get(STARTUP_BUFFER) {
                    if self.parse_commands(&text) == Flow::Exit {
                        return Flow::Exit;
                    }
                }
            }
            self.set_defaults();
        }

        match commands {
            Some(commands) => self.parse_commands(commands),
            None => Flow::Continue,
        }
    }

    /// Applies the configured default of every presentation command.
    pub fn set_defaults(&mut self) {
        self.apply_defaults(&DEFAULT_COMMANDS);
    }

    /// Applies the configured inventory filters.
    pub fn set_filters_from_defaults(&mut self) {
        self.apply_defaults(&INVENTORY_DEFAULTS);
    }

    fn apply_defaults(&mut self, names: &[&str]) {
        let registry = Arc::clone(&self.registry);
        for name in names {
            if !registry.contains(name) {
                continue;
            }
            if let Err(e) = registry.exec_with_default(self, name) {
                self.print_warning(&e.to_string());
            }
        }
    }

    /// Executes newline separated input.
    ///
    /// Lines starting with the escape character are local commands; pending
    /// device commands are flushed before each. A device line carrying
    /// inline overrides is sent on its own through an overlay. Other device
    /// lines are batched, one row each.
    pub fn parse_commands(&mut self, text: &str) -> Flow {
        let mut pending: Vec<String> = Vec::new();

        for line in text.split('\n').map(str::trim) {
            if line.is_empty() {
                continue;
            }

            if let Some(local) = line.strip_prefix(ESCAPE) {
                self.flush(&mut pending);
                if self.exec_local(local) == Flow::Exit {
                    return Flow::Exit;
                }
                continue;
            }

            if line.contains(INLINE_MARKER) && self.run_inline(line, &mut pending) {
                continue;
            }
            pending.push(line.to_string());
        }

        self.flush(&mut pending);
        Flow::Continue
    }

    fn flush(&mut self, pending: &mut Vec<String>) {
        if pending.is_empty() {
            return;
        }
        debug!(commands = ?pending, "Flush commands");
        let commands = std::mem::take(pending);
        self.dispatch(&commands, false);
    }

    /// Executes one local command line, escape character removed.
    ///
    /// Parse and value errors become warnings. Valid commands other than
    /// `help` are copied to the `recordall` and `logall` buffers.
    pub fn exec_local(&mut self, line: &str) -> Flow {
        let invocation = match self.registry.canonicalize(line) {
            Ok(invocation) => invocation,
            Err(e) => {
                self.print_warning(&e.to_string());
                return Flow::Continue;
            }
        };

        if invocation.name != "help" {
            let logging = &self.settings.logging;
            for buffer in [logging.recordall.as_deref(), logging.logall.as_deref()]
                .into_iter()
                .flatten()
            {
                let stopping = matches!(invocation.name.as_str(), "logstop" | "recordstop")
                    && invocation.first() == Some(buffer);
                if !stopping {
                    self.buffers.append(buffer, &format!("{ESCAPE}{line}"));
                }
            }
        }

        match self.invoke(&invocation) {
            Ok(Outcome::Done) => Flow::Continue,
            Ok(Outcome::Message(text)) => {
                self.print_system(&text);
                Flow::Continue
            }
            Ok(Outcome::Exit) => Flow::Exit,
            Err(e) => {
                self.print_warning(&e.to_string());
                Flow::Continue
            }
        }
    }

    fn invoke(&mut self, invocation: &Invocation) -> Result<Outcome> {
        let registry = Arc::clone(&self.registry);
        registry.exec(self, invocation)
    }

    /// Sends `commands` to the current targets.
    ///
    /// `explicit` marks a `command` invocation, which bypasses safe mode.
    pub fn dispatch(&mut self, commands: &[String], explicit: bool) {
        let targets = match self.device_list() {
            Ok(targets) => targets,
            Err(e) => {
                self.print_warning(&e.to_string());
                Vec::new()
            }
        };
        self.cmd_requests(&targets, commands, explicit);
    }

    /// Sends every command to every target and renders replies in order.
    ///
    /// Commands are recorded first, whether or not anything is sent. Blocks
    /// until every row is rendered or the timeout plus grace period passes;
    /// on expiry the ledger is replaced and late replies are dropped.
    pub fn cmd_requests(&mut self, targets: &[String], commands: &[String], explicit: bool) {
        let joined = commands.join("\n");
        for buffer in self.settings.logging.active() {
            self.buffers.append(buffer, &joined);
        }

        if targets.is_empty() || commands.is_empty() {
            debug!(targets = targets.len(), commands = commands.len(), "Nothing to send");
            return;
        }

        if !explicit && self.settings.safemode {
            self.print_warning("Safe mode on, command ignored.");
            return;
        }

        if self.defaults.dry_run {
            self.print_title("Send Commands: ");
            self.print_output(&format!("  {}", commands.join("\n  ")));
            self.print_title("To Targets: ");
            self.print_output(&format!("  {}", targets.join(",")));
            return;
        }

        let ledger = Arc::new(match &self.progress {
            Some(progress) => Ledger::with_progress(Arc::clone(progress)),
            None => Ledger::new(),
        });
        {
            let _drain = self.drain.lock();
            *self.ledger.lock() = Arc::clone(&ledger);
        }

        let sink = Arc::new(RowSink {
            ledger: Arc::clone(&self.ledger),
            drain: Arc::clone(&self.drain),
            printer: self.printer(),
        });

        let mut requests = Vec::with_capacity(targets.len() * commands.len());
        for (row, line) in commands.iter().enumerate() {
            let (command, pipe) = grammar::extract_pipe(line);
            debug!(row, %command, %pipe, "Extracted command and pipe");
            ledger.init_row(row, pipe);

            for target in targets {
                let request = self.inventory.create_request(target, &command, self.settings.mode);
                ledger.register_request(row, request.uid);
                let sink = Arc::clone(&sink);
                let callback: ReplyCallback = Arc::new(move |reply| sink.deliver(reply));
                requests.push((request, callback));
            }
        }

        let timeout = Duration::from_secs(self.settings.timeout);
        info!(
            rows = commands.len(),
            targets = targets.len(),
            timeout_secs = self.settings.timeout,
            "Dispatching requests"
        );
        self.accessor.send_requests(requests, timeout);

        if !ledger.wait_done(timeout.saturating_add(self.defaults.grace_period())) {
            warn!(
                received = ledger.received_count(),
                expected = ledger.expected_count(),
                "Timed out waiting for replies"
            );
            self.reset_ledger();
            self.print_warning("Timeout: timer exceeded while waiting for responses.");
        }
        debug!("All callbacks completed");
    }

    /// Settings summary for the `env` command.
    pub fn env(&self) -> String {
        let s = &self.settings;
        let none = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());
        format!(
            "Display: {}, Filter: {}\n\
             Record: {}, Recordall: {}\n\
             Log: {}, Logall: {}\n\
             Color: {}, Scheme: {}\n\
             Timeout: {}, Verbose: {}\n\
             CLI Mode: {}, Safemode: {}\n\
             Line Wrap: {}\n{}",
            s.display,
            none(&s.filter),
            none(&s.logging.record),
            none(&s.logging.recordall),
            none(&s.logging.log),
            none(&s.logging.logall),
            s.color,
            s.color_scheme,
            s.timeout,
            s.verbose,
            s.mode,
            s.safemode,
            s.linewrap,
            self.inventory.show_env()
        )
    }

    /// Warns and returns true when `buffer` is being written or played.
    fn buffer_in_use(&self, buffer: &str) -> bool {
        if self.settings.logging.contains(buffer) {
            self.print_warning(&format!("Buffer: {buffer:?}, already open for writing."));
            return true;
        }
        if self.playback.as_deref() == Some(buffer) {
            self.print_warning(&format!("Buffer: {buffer:?}, already open by 'play' command."));
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests;
