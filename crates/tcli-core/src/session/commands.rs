//! Local command table and handlers.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Flow, Session};
use crate::config::SessionConfig;
use crate::display::ColorScheme;
use crate::error::{CommandError, Result};
use crate::inventory::{Inventory, TARGETS, XTARGETS};
use crate::output;
use crate::registry::{CommandDescriptor, DefaultValue, Invocation, Outcome, Registry};
use crate::types::{DisplayFormat, Mode};

const TOGGLE_VALUES: [&str; 2] = ["on", "off"];

mod help {
    pub const BUFFER: &str = "Show contents of buffer.";
    pub const BUFFERLIST: &str = "Show buffers currently in use (written to and not cleared).";
    pub const CLEAR: &str = "Deletes contents of named buffer.";
    pub const COLOR: &str = "Toggle color support.";
    pub const COLOR_SCHEME: &str = "Use 'light' scheme on dark background or 'dark' otherwise.";
    pub const COMMAND: &str = "Submit command to target devices. Safe mode enforces use of\n    \
        'command' for sending input to targets.\n    Shortname: 'C'.";
    pub const DEFAULTS: &str = "Returns environment to startup defaults.\n    \
        Supply argument to set a specific value back to default,\n    \
        or 'all' to return everything to the defaults.";
    pub const DISPLAY: &str = "Routines used for formatting command output.\n    \
        Available display formats are: raw, csv, tbl, nvp.\n    Shortname: 'D'.";
    pub const ENV: &str = "Display current escape command settings.";
    pub const EXEC: &str = "Execute command in shell.\n    Shortname: '!'.";
    pub const EXIT: &str = "Exit tcli.";
    pub const EXPANDTARGETS: &str = "Displays the expanded list of devices matched by 'targets' and\n    \
        not matched by 'xtargets'.";
    pub const FILTER: &str = "File name that maps templates for extracting data from output.\n    \
        Is disabled if display is in 'raw' mode.\n    Shortname: 'F'.";
    pub const HELP: &str = "Display escape command online help.";
    pub const INVENTORY: &str = "Displays attributes of matched targets.\n    Shortname: 'V'.";
    pub const LINEWRAP: &str = "Set line wrap for displayed data.";
    pub const LOG: &str = "Record commands and device output to buffer.\n    \
        Does not include escape commands or output from these commands.";
    pub const LOGALL: &str = "Record both commands and escape commands and output to buffer.";
    pub const LOGSTOP: &str = "Stop recording or logging to named buffer (same as 'recordstop').";
    pub const MODE: &str = "CLI mode for command.\n    \
        Available command modes are: cli, gated, http, shell.\n    Shortname: 'M'.";
    pub const PLAY: &str = "Play out recorded keystrokes from named buffer to target devices.\n    \
        Shortname: 'P'.";
    pub const QUIT: &str = "Exit by another name.";
    pub const READ: &str = "Read contents of file and store in buffer.\n    \
        File name is specified at a subsequent prompt if not given.";
    pub const RECORD: &str = "Record commands to named <buffer>.\n    \
        If command is appended with '+' then append to buffer.";
    pub const RECORDALL: &str = "Record commands and escape commands to named <buffer>.\n    \
        If command is appended with '+' then append to buffer.";
    pub const RECORDSTOP: &str = "Stop recording or logging to named buffer (same as 'logstop').";
    pub const SAFEMODE: &str = "Do not forward input to 'targets' unless using 'command'.\n    \
        Shortname: 'S'.";
    pub const TIMEOUT: &str = "Period (in seconds) to wait for outstanding command responses.";
    pub const VI: &str = "Opens buffer in vi editor.";
    pub const VERBOSE: &str = "Display extra data columns in output (for csv mode).";
    pub const WRITE: &str = "Dumps contents of buffer to file.\n    \
        File name is specified at a subsequent prompt if not given.";

    pub const ATTRIBUTES: &str = "Filter targets based on an attribute of the device.\n    \
        First argument is attribute name, the second is the value.\n    \
        If a value is prefixed with a '^' then it is treated as a regexp.\n    \
        If command is appended with '+' then adds to current attribute value.\n    \
        A value of '^' resets the attribute filter.\n    Shortname: 'A'.";
    pub const TARGETS: &str = "Set target devices to receive commands\n    \
        (hostnames, comma separated, no spaces).\n    \
        If a target is prefixed with a '^' then it is treated as a regexp.\n    \
        If command is appended with '+' then adds to current targets value.\n    \
        A target of '^' resets the list.\n    Shortname: 'T'.";
    pub const MAXTARGETS: &str = "High water mark to prevent accidentally making changes to large\n    \
        numbers of targets. A value of 0 removes the restriction.";
    pub const XATTRIBUTES: &str = "Omit targets that have the attribute named by the first argument\n    \
        matching a string or regexp from the second argument.\n    \
        If command is appended with '+' then adds to current xattributes value.\n    \
        Shortname: 'E'.";
    pub const XTARGETS: &str = "Omit targets that match a string or regexp from this list.\n    \
        If command is appended with '+' then adds to current xtargets value.\n    \
        Shortname: 'X'.";
}

/// Commands every session starts with.
pub fn base_registry(config: &SessionConfig) -> Registry<Session> {
    let schemes: Vec<&str> = ColorScheme::ALL.iter().map(ColorScheme::as_str).collect();
    let displays: Vec<&str> = DisplayFormat::ALL.iter().map(DisplayFormat::as_str).collect();
    let modes: Vec<&str> = Mode::ALL.iter().map(Mode::as_str).collect();

    let mut r = Registry::new();
    r.register(CommandDescriptor::new("buffer", help::BUFFER, cmd_buffer).args(1, 1));
    r.register(CommandDescriptor::new("bufferlist", help::BUFFERLIST, cmd_bufferlist).args(0, 0));
    r.register(CommandDescriptor::new("clear", help::CLEAR, cmd_clear).args(1, 1));
    r.register(
        CommandDescriptor::new("color", help::COLOR, cmd_toggle)
            .inline()
            .toggle()
            .default_value(DefaultValue::Flag(config.color))
            .completions(&TOGGLE_VALUES),
    );
    r.register(
        CommandDescriptor::new("color_scheme", help::COLOR_SCHEME, cmd_color_scheme)
            .inline()
            .default_value(DefaultValue::Text(config.color_scheme.to_string()))
            .completions(&schemes),
    );
    r.register(
        CommandDescriptor::new("command", help::COMMAND, cmd_command)
            .alias('C')
            .args(1, 1)
            .raw(),
    );
    r.register(CommandDescriptor::new("defaults", help::DEFAULTS, cmd_defaults));
    r.register(
        CommandDescriptor::new("display", help::DISPLAY, cmd_display)
            .alias('D')
            .inline()
            .default_value(DefaultValue::Text(config.display.to_string()))
            .completions(&displays),
    );
    r.register(CommandDescriptor::new("env", help::ENV, cmd_env).args(0, 0));
    r.register(
        CommandDescriptor::new("exec", help::EXEC, cmd_exec)
            .alias('!')
            .args(1, 1)
            .raw(),
    );
    r.register(
        CommandDescriptor::new("exit", help::EXIT, cmd_exit)
            .args(0, 0)
            .inline()
            .terminal(),
    );
    r.register(
        CommandDescriptor::new("expandtargets", help::EXPANDTARGETS, cmd_expandtargets).args(0, 0),
    );
    r.register(
        CommandDescriptor::new("filter", help::FILTER, cmd_filter)
            .alias('F')
            .inline()
            .default_value(DefaultValue::Text(config.filter.clone())),
    );
    r.register(CommandDescriptor::new("help", help::HELP, cmd_help).args(0, 0).inline());
    r.register(
        CommandDescriptor::new("inventory", help::INVENTORY, cmd_inventory)
            .alias('V')
            .args(0, 0),
    );
    r.register(
        CommandDescriptor::new("linewrap", help::LINEWRAP, cmd_toggle)
            .inline()
            .toggle()
            .default_value(DefaultValue::Flag(config.linewrap))
            .completions(&TOGGLE_VALUES),
    );
    for (name, text) in [
        ("log", help::LOG),
        ("logall", help::LOGALL),
        ("record", help::RECORD),
        ("recordall", help::RECORDALL),
    ] {
        r.register(CommandDescriptor::new(name, text, cmd_logging).append().inline());
    }
    r.register(CommandDescriptor::new("logstop", help::LOGSTOP, cmd_logstop).args(1, 1).inline());
    r.register(
        CommandDescriptor::new("recordstop", help::RECORDSTOP, cmd_logstop)
            .args(1, 1)
            .inline(),
    );
    r.register(
        CommandDescriptor::new("mode", help::MODE, cmd_mode)
            .alias('M')
            .inline()
            .default_value(DefaultValue::Text(config.mode.to_string()))
            .completions(&modes),
    );
    r.register(
        CommandDescriptor::new("play", help::PLAY, cmd_play)
            .alias('P')
            .args(1, 1),
    );
    r.register(
        CommandDescriptor::new("quit", help::QUIT, cmd_exit)
            .args(0, 0)
            .inline()
            .terminal(),
    );
    r.register(
        CommandDescriptor::new("read", help::READ, cmd_read)
            .args(1, 2)
            .append()
            .regexp(),
    );
    r.register(
        CommandDescriptor::new("safemode", help::SAFEMODE, cmd_toggle)
            .alias('S')
            .inline()
            .toggle()
            .completions(&TOGGLE_VALUES),
    );
    r.register(
        CommandDescriptor::new("timeout", help::TIMEOUT, cmd_timeout)
            .default_value(DefaultValue::Number(config.timeout)),
    );
    r.register(
        CommandDescriptor::new("verbose", help::VERBOSE, cmd_toggle)
            .inline()
            .toggle()
            .completions(&TOGGLE_VALUES),
    );
    r.register(CommandDescriptor::new("vi", help::VI, cmd_editor).args(1, 1));
    r.register(
        CommandDescriptor::new("write", help::WRITE, cmd_write)
            .args(1, 2)
            .append()
            .regexp(),
    );
    r
}

/// Adds the inventory's filter commands, one per device attribute included.
///
/// Blocks until devices are loaded. Attributes that collide with an existing
/// command are skipped.
pub fn register_inventory(r: &mut Registry<Session>, config: &SessionConfig, inventory: &Inventory) {
    r.register(
        CommandDescriptor::new("attributes", help::ATTRIBUTES, cmd_attributes)
            .alias('A')
            .args(0, 2)
            .append()
            .regexp()
            .inline(),
    );
    r.register(
        CommandDescriptor::new(TARGETS, help::TARGETS, cmd_inventory_filter)
            .alias('T')
            .append()
            .regexp()
            .inline()
            .default_value(DefaultValue::Text(config.targets.clone())),
    );
    r.register(
        CommandDescriptor::new("maxtargets", help::MAXTARGETS, cmd_maxtargets)
            .default_value(DefaultValue::Number(config.maxtargets as u64)),
    );
    r.register(
        CommandDescriptor::new("xattributes", help::XATTRIBUTES, cmd_attributes)
            .alias('E')
            .args(0, 2)
            .append()
            .regexp()
            .inline(),
    );
    r.register(
        CommandDescriptor::new(XTARGETS, help::XTARGETS, cmd_inventory_filter)
            .alias('X')
            .append()
            .regexp()
            .inline()
            .default_value(DefaultValue::Text(config.xtargets.clone())),
    );

    let attributes = match inventory.attribute_names() {
        Ok(attributes) => attributes,
        Err(e) => {
            warn!(source = inventory.source_name(), error = %e, "No attribute filters registered");
            return;
        }
    };
    for attribute in attributes {
        let exclusion = format!("x{attribute}");
        if r.contains(&attribute) || r.contains(&exclusion) {
            warn!(attribute, "Attribute shadows a command; not registered");
            continue;
        }
        debug!(attribute, "Registering attribute filter");
        r.register(
            CommandDescriptor::new(
                attribute.clone(),
                format!("Filter targets by device {attribute}.\n    Comma separated, '^' prefix for regexp."),
                cmd_inventory_filter,
            )
            .append()
            .regexp()
            .inline(),
        );
        r.register(
            CommandDescriptor::new(
                exclusion,
                format!("Omit targets by device {attribute}.\n    Comma separated, '^' prefix for regexp."),
                cmd_inventory_filter,
            )
            .append()
            .regexp()
            .inline(),
        );
    }
}

fn cmd_buffer(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let name = inv.first().unwrap_or_default();
    let content = session
        .buffers
        .get(name)
        .map_err(|_| CommandError::value(format!("Invalid buffer name {name:?}.")))?;
    session.print_warning(&format!("#! BUFFER {name} !#"));
    session.print_system(&content);
    session.print_warning("#! ENDBUFFER !#");
    Ok(Outcome::Done)
}

fn cmd_bufferlist(session: &mut Session, _: &Invocation) -> Result<Outcome> {
    Ok(Outcome::message(session.buffers.list()))
}

fn cmd_clear(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let name = inv.first().unwrap_or_default();
    if !session.buffers.clear(name) {
        debug!(buffer = name, "Clear of unused buffer");
    }
    Ok(Outcome::Done)
}

fn parse_toggle(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        _ => Err(CommandError::value("Error: Argument must be 'on' or 'off'.")),
    }
}

fn cmd_toggle(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let flag = session
        .settings
        .flag_mut(&inv.name)
        .ok_or_else(|| CommandError::value(format!("Unknown toggle {:?}.", inv.name)))?;
    *flag = match inv.first() {
        Some(value) => parse_toggle(value)?,
        None => !*flag,
    };
    Ok(Outcome::Done)
}

fn cmd_color_scheme(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    match inv.first() {
        None => Ok(Outcome::message(format!(
            "Color scheme: {}",
            session.settings.color_scheme
        ))),
        Some(value) => {
            session.settings.color_scheme = value.parse()?;
            Ok(Outcome::Done)
        }
    }
}

fn cmd_command(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    session.dispatch(&inv.args, true);
    Ok(Outcome::Done)
}

fn cmd_defaults(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    match inv.first() {
        None => Ok(Outcome::message(session.env())),
        Some("all") => {
            session.set_defaults();
            session.set_filters_from_defaults();
            Ok(Outcome::Done)
        }
        Some(name) => {
            let registry = Arc::clone(&session.registry);
            registry
                .exec_with_default(session, name)
                .map_err(|_| CommandError::value(format!("Cannot set {name:?} to defaults.")))
        }
    }
}

fn cmd_display(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    match inv.first() {
        None => Ok(Outcome::message(format!("Display: {}", session.settings.display))),
        Some(value) => {
            session.settings.display = value.parse()?;
            Ok(Outcome::Done)
        }
    }
}

fn cmd_env(session: &mut Session, _: &Invocation) -> Result<Outcome> {
    Ok(Outcome::message(session.env()))
}

fn cmd_editor(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let buffer = inv.first().unwrap_or_default();
    let content = session.buffers.get(buffer).unwrap_or_default();
    let edited = output::edit_text(&content, &session.defaults.editor)?;
    session.buffers.clear(buffer);
    session.buffers.append(buffer, &edited);
    Ok(Outcome::Done)
}

fn cmd_exec(_: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let command = inv.first().unwrap_or_default();
    let stdout = output::run_shell(command)?;
    Ok(Outcome::message(stdout.trim_end_matches('\n')))
}

fn cmd_exit(_: &mut Session, _: &Invocation) -> Result<Outcome> {
    Ok(Outcome::Exit)
}

fn cmd_expandtargets(session: &mut Session, _: &Invocation) -> Result<Outcome> {
    Ok(Outcome::message(session.device_list()?.join(",")))
}

fn cmd_filter(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    match inv.first() {
        None => Ok(Outcome::message(format!(
            "Filter: {}",
            session.settings.filter.as_deref().unwrap_or("None")
        ))),
        Some("") => {
            session.settings.filter = None;
            Ok(Outcome::Done)
        }
        Some(value) => {
            session.settings.filter = Some(value.to_string());
            Ok(Outcome::Done)
        }
    }
}

fn cmd_help(session: &mut Session, _: &Invocation) -> Result<Outcome> {
    let text: Vec<String> = session
        .registry
        .iter()
        .map(|descriptor| {
            let append = if descriptor.supports_append() { "[+]" } else { "" };
            let arg = if descriptor.min_args() > 0 {
                format!(" <{}>", descriptor.name())
            } else {
                String::new()
            };
            format!("{}{append}{arg}\n    {}\n", descriptor.name(), descriptor.help())
        })
        .collect();
    Ok(Outcome::message(text.join("\n")))
}

fn cmd_inventory(session: &mut Session, _: &Invocation) -> Result<Outcome> {
    let targets = session.device_list()?;
    if targets.is_empty() {
        return Ok(Outcome::Done);
    }
    let table = session.inventory.devices()?;

    let mut lines = Vec::with_capacity(targets.len());
    for name in &targets {
        let Some(device) = table.devices.get(name) else {
            continue;
        };
        let mut fields = vec![name.clone()];
        for attribute in table.attributes.iter().filter(|a| a.as_str() != "flags") {
            let values = device.values(attribute).unwrap_or_default();
            if values.is_empty() {
                continue;
            }
            fields.push(format!("{}:{}", title_case(attribute), values.join(",")));
        }
        fields.extend(device.values("flags").unwrap_or_default().iter().cloned());
        lines.push(fields.join(", "));
    }
    Ok(Outcome::message(lines.join("\n")))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn cmd_logging(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let Some(buffer) = inv.first() else {
        let current = session.settings.logging.get(&inv.name).unwrap_or("None");
        return Ok(Outcome::message(format!("{:?} buffer is {current:?}", inv.name)));
    };

    if session.buffer_in_use(buffer) {
        return Ok(Outcome::Done);
    }
    if !inv.append {
        session.buffers.clear(buffer);
    }
    session.settings.logging.set(&inv.name, Some(buffer.to_string()));
    debug!(command = %inv.name, buffer, append = inv.append, "Logging started");
    Ok(Outcome::Done)
}

fn cmd_logstop(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let buffer = inv.first().unwrap_or_default();
    if session.settings.logging.stop(buffer) {
        Ok(Outcome::Done)
    } else {
        Err(CommandError::value("Buffer not in use for logging or recording."))
    }
}

fn cmd_mode(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    match inv.first() {
        None => Ok(Outcome::message(format!("Mode: {}", session.settings.mode))),
        Some(value) => {
            session.settings.mode = value.parse()?;
            Ok(Outcome::Done)
        }
    }
}

fn cmd_play(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let buffer = inv.first().unwrap_or_default();
    if session.playback.is_some() {
        return Err(CommandError::value("Recursive call of \"play\" rejected."));
    }
    if session.buffer_in_use(buffer) {
        return Ok(Outcome::Done);
    }
    let text = session.buffers.get(buffer)?;

    session.playback = Some(buffer.to_string());
    let flow = session.parse_commands(&text);
    session.playback = None;

    Ok(match flow {
        Flow::Exit => Outcome::Exit,
        Flow::Continue => Outcome::Done,
    })
}

fn filename(session: &Session, inv: &Invocation, prompt: &str) -> Result<PathBuf> {
    let name = match inv.args.get(1) {
        Some(name) => name.clone(),
        None => session
            .terminal
            .read_line(prompt)
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .ok_or_else(|| CommandError::value("No filename supplied."))?,
    };
    Ok(expand_home(&name))
}

fn expand_home(name: &str) -> PathBuf {
    match (name.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(name),
    }
}

fn cmd_read(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let buffer = inv.first().unwrap_or_default();
    let path = filename(session, inv, "Enter filename to read from: ")?;
    let content = std::fs::read_to_string(&path)?;

    if !inv.append {
        session.buffers.clear(buffer);
    }
    session.buffers.append(buffer, &content);
    let lines = session.buffers.get(buffer).unwrap_or_default().matches('\n').count();
    Ok(Outcome::message(format!("{lines} lines read.")))
}

fn cmd_timeout(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let Some(value) = inv.first() else {
        return Ok(Outcome::message(format!("Timeout: {}", session.settings.timeout)));
    };
    match value.parse::<u64>() {
        Ok(timeout) if timeout > 0 => {
            session.settings.timeout = timeout;
            Ok(Outcome::Done)
        }
        _ => Err(CommandError::value(format!("Invalid timeout value {value:?}."))),
    }
}

fn cmd_write(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let buffer = inv.first().unwrap_or_default();
    let content = session.buffers.get(buffer).unwrap_or_default();
    if content.is_empty() {
        return Err(CommandError::value("Buffer empty."));
    }
    let path = filename(session, inv, "Enter filename to write buffer to: ")?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(inv.append)
        .truncate(!inv.append)
        .open(&path)?;
    file.write_all(content.as_bytes())?;
    Ok(Outcome::message(format!(
        "{} lines written.",
        content.matches('\n').count()
    )))
}

fn cmd_inventory_filter(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let shown = session.inventory.filter(&inv.name, inv.first(), inv.append)?;
    Ok(shown.map_or(Outcome::Done, Outcome::Message))
}

fn cmd_attributes(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let exclusion = inv.name == "xattributes";
    let Some(attribute) = inv.first() else {
        return Ok(Outcome::message(session.inventory.show_filters(exclusion)?));
    };
    let name = if exclusion {
        format!("x{attribute}")
    } else {
        attribute.to_string()
    };
    let value = inv.args.get(1).map(String::as_str);
    let shown = session.inventory.filter(&name, value, inv.append)?;
    Ok(shown.map_or(Outcome::Done, Outcome::Message))
}

fn cmd_maxtargets(session: &mut Session, inv: &Invocation) -> Result<Outcome> {
    let Some(value) = inv.first() else {
        return Ok(Outcome::message(format!(
            "Maxtargets: {}",
            session.inventory.maxtargets()
        )));
    };
    let maxtargets = value.parse::<usize>().map_err(|_| {
        CommandError::value(format!("Max Targets is a non-cardinal value: {value:?}"))
    })?;
    session.inventory.set_maxtargets(maxtargets);
    Ok(Outcome::Done)
}

