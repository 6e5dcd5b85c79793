//! Local command registry.
//!
//! A [`Registry`] maps command names to [`CommandDescriptor`]s and turns a
//! raw local command line into an [`Invocation`]. Each session owns its own
//! registry; handlers are plain function pointers over the session type `C`
//! so a registry never borrows the state it mutates.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{CommandError, Result};
use crate::grammar::{self, APPEND, InlineSplit, InlineToken};

/// What a handler asks the caller to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to show.
    Done,
    /// Text to show the user.
    Message(String),
    /// Terminate the session.
    Exit,
}

impl Outcome {
    /// Wraps non-empty text in [`Outcome::Message`].
    pub fn message(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::Done
        } else {
            Self::Message(text)
        }
    }
}

/// A parsed local command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Canonical (long) command name.
    pub name: String,
    /// Arguments after tokenizing.
    pub args: Vec<String>,
    /// Whether the append marker was present.
    pub append: bool,
}

impl Invocation {
    /// First argument, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Handler invoked for a command.
pub type Handler<C> = fn(&mut C, &Invocation) -> Result<Outcome>;

/// Start-up value of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// Boolean setting.
    Flag(bool),
    /// Numeric setting.
    Number(u64),
    /// Free-form setting.
    Text(String),
}

impl DefaultValue {
    /// Argument string passed to the handler.
    ///
    /// Flags of toggle commands render as `on`/`off`.
    #[must_use]
    pub fn render(&self, toggle: bool) -> String {
        match self {
            Self::Flag(value) if toggle => String::from(if *value { "on" } else { "off" }),
            Self::Flag(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }
}

/// Attributes and behaviour of one local command.
pub struct CommandDescriptor<C> {
    name: String,
    help: String,
    alias: Option<char>,
    min_args: usize,
    max_args: usize,
    default: Option<DefaultValue>,
    append: bool,
    inline: bool,
    raw: bool,
    regexp: bool,
    toggle: bool,
    terminal: bool,
    handler: Handler<C>,
    completions: Vec<String>,
}

impl<C> Clone for CommandDescriptor<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            help: self.help.clone(),
            alias: self.alias,
            min_args: self.min_args,
            max_args: self.max_args,
            default: self.default.clone(),
            append: self.append,
            inline: self.inline,
            raw: self.raw,
            regexp: self.regexp,
            toggle: self.toggle,
            terminal: self.terminal,
            handler: self.handler,
            completions: self.completions.clone(),
        }
    }
}

impl<C> fmt::Debug for CommandDescriptor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("append", &self.append)
            .field("inline", &self.inline)
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl<C> CommandDescriptor<C> {
    /// New descriptor taking zero or one argument.
    pub fn new(name: impl Into<String>, help: impl Into<String>, handler: Handler<C>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            alias: None,
            min_args: 0,
            max_args: 1,
            default: None,
            append: false,
            inline: false,
            raw: false,
            regexp: false,
            toggle: false,
            terminal: false,
            handler,
            completions: Vec::new(),
        }
    }

    /// Single character short name.
    #[must_use]
    pub fn alias(mut self, alias: char) -> Self {
        self.alias = Some(alias);
        self
    }

    /// Permitted argument count range.
    #[must_use]
    pub fn args(mut self, min: usize, max: usize) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    /// Start-up value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Accepts the append marker.
    #[must_use]
    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    /// Usable as an inline override.
    #[must_use]
    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    /// Takes the rest of the line, untokenized, as its single argument.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Arguments may contain non-alphanumeric characters.
    #[must_use]
    pub fn regexp(mut self) -> Self {
        self.regexp = true;
        self
    }

    /// Boolean setting; no argument flips it.
    #[must_use]
    pub fn toggle(mut self) -> Self {
        self.toggle = true;
        self
    }

    /// The command ends the session.
    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Values offered by interactive completion.
    #[must_use]
    pub fn completions(mut self, values: &[&str]) -> Self {
        self.completions = values.iter().map(ToString::to_string).collect();
        self
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Short name, if any.
    pub const fn short_name(&self) -> Option<char> {
        self.alias
    }

    /// Minimum argument count.
    pub const fn min_args(&self) -> usize {
        self.min_args
    }

    /// Maximum argument count.
    pub const fn max_args(&self) -> usize {
        self.max_args
    }

    /// Start-up value, if any.
    pub const fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    /// Whether append mode is supported.
    pub const fn supports_append(&self) -> bool {
        self.append
    }

    /// Whether the command is allowed inline.
    pub const fn is_inline(&self) -> bool {
        self.inline
    }

    /// Whether arguments are taken raw.
    pub const fn is_raw(&self) -> bool {
        self.raw
    }

    /// Whether this is a boolean toggle.
    pub const fn is_toggle(&self) -> bool {
        self.toggle
    }

    /// Whether the command ends the session.
    pub const fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Completion values.
    pub fn completion_values(&self) -> &[String] {
        &self.completions
    }

    /// Handler function.
    pub fn handler(&self) -> Handler<C> {
        self.handler
    }
}

/// Name to descriptor map for one session.
pub struct Registry<C> {
    commands: BTreeMap<String, CommandDescriptor<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C> Registry<C> {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    /// Adds a command, replacing any existing one of the same name.
    pub fn register(&mut self, descriptor: CommandDescriptor<C>) {
        self.commands.insert(descriptor.name.clone(), descriptor);
    }

    /// Removes a command. Unknown names are ignored.
    pub fn unregister(&mut self, name: &str) {
        self.commands.remove(name);
    }

    /// Drops every command that cannot be used inline.
    pub fn inline_only(&mut self) {
        self.commands.retain(|_, descriptor| descriptor.inline);
    }

    /// Descriptor for `name`.
    pub fn get(&self, name: &str) -> Option<&CommandDescriptor<C>> {
        self.commands.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered descriptors, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor<C>> {
        self.commands.values()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn by_alias(&self, alias: char) -> Option<&CommandDescriptor<C>> {
        self.commands
            .values()
            .find(|descriptor| descriptor.alias == Some(alias))
    }

    /// Parses a local command line (escape prefix already removed).
    ///
    /// A leading short name expands to its long name and may be followed
    /// directly by the append marker. Otherwise the first space-delimited word
    /// is the name, optionally ending in the append marker.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Parse`] for an unregistered name, unsupported
    /// append, bad quoting, an argument count outside the descriptor's range,
    /// or non-alphanumeric arguments to a command that forbids them.
    pub fn canonicalize(&self, line: &str) -> Result<Invocation> {
        let (descriptor, rest, append) = self.expand(line)?;

        if append && !descriptor.append {
            return Err(CommandError::parse(format!(
                "Command {:?} does not support append mode.",
                descriptor.name
            )));
        }

        if descriptor.raw {
            if rest.is_empty() && descriptor.min_args > 0 {
                return Err(CommandError::parse("Invalid number of arguments, found 0."));
            }
            return Ok(Invocation {
                name: descriptor.name.clone(),
                args: vec![rest.to_string()],
                append,
            });
        }

        let args = grammar::split_args(rest)?;
        if args.len() < descriptor.min_args || args.len() > descriptor.max_args {
            return Err(CommandError::parse(format!(
                "Invalid number of arguments, found {}.",
                args.len()
            )));
        }

        if !descriptor.regexp
            && args
                .iter()
                .any(|arg| arg.chars().any(|c| !(c.is_alphanumeric() || c == '_')))
        {
            return Err(CommandError::parse(
                "Arguments with alphanumeric characters only.",
            ));
        }

        Ok(Invocation {
            name: descriptor.name.clone(),
            args,
            append,
        })
    }

    fn expand<'a>(&self, line: &'a str) -> Result<(&CommandDescriptor<C>, &'a str, bool)> {
        if let Some(first) = line.chars().next() {
            if let Some(descriptor) = self.by_alias(first) {
                let mut rest = &line[first.len_utf8()..];
                let mut append = false;
                if let Some(stripped) = rest.strip_prefix(APPEND) {
                    append = true;
                    rest = stripped;
                }
                return Ok((descriptor, rest.trim_start_matches(' '), append));
            }
        }

        let (mut name, rest) = match line.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let mut append = false;
        if let Some(stripped) = name.strip_suffix(APPEND) {
            name = stripped;
            append = true;
        }

        let descriptor = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::parse(format!("Invalid escape command {name:?}.")))?;
        Ok((descriptor, rest, append))
    }

    /// Runs the handler for a parsed invocation.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Value`] for an unknown name, otherwise whatever
    /// the handler returns.
    pub fn exec(&self, ctx: &mut C, invocation: &Invocation) -> Result<Outcome> {
        let descriptor = self.commands.get(&invocation.name).ok_or_else(|| {
            CommandError::value(format!("Unknown command {:?}.", invocation.name))
        })?;
        (descriptor.handler)(ctx, invocation)
    }

    /// Invocation that applies the configured default of `name`.
    ///
    /// Returns `None` when the command has no default.
    ///
    /// # Errors
    ///
    /// [`CommandError::Value`] if `name` is unknown, [`CommandError::Parse`]
    /// if the command takes no argument.
    pub fn default_invocation(&self, name: &str) -> Result<Option<Invocation>> {
        let descriptor = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::value(format!("Unknown command {name:?}.")))?;

        if descriptor.max_args == 0 {
            return Err(CommandError::parse(format!(
                "Unable to set default, {name:?} expects no arguments."
            )));
        }

        Ok(descriptor.default.as_ref().map(|value| Invocation {
            name: descriptor.name.clone(),
            args: vec![value.render(descriptor.toggle)],
            append: false,
        }))
    }

    /// Invokes the handler of `name` with its configured default.
    ///
    /// # Errors
    ///
    /// See [`Registry::default_invocation`]; handler errors pass through.
    pub fn exec_with_default(&self, ctx: &mut C, name: &str) -> Result<Outcome> {
        match self.default_invocation(name)? {
            Some(invocation) => {
                debug!(command = name, value = ?invocation.args, "Applying default");
                self.exec(ctx, &invocation)
            }
            None => Ok(Outcome::Done),
        }
    }

    /// Splits trailing inline overrides off a device-bound line.
    ///
    /// A segment is accepted only when it parses against this registry, so
    /// the caller decides which commands are usable inline by what it has
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Parse`] for an empty line.
    pub fn extract_inline_commands(&self, line: &str) -> Result<InlineSplit> {
        grammar::extract_inline_commands(line, |token| match self.canonicalize(token) {
            Ok(invocation) if self.get(&invocation.name).is_some_and(|d| d.terminal) => {
                InlineToken::Exit
            }
            Ok(_) => InlineToken::Command,
            Err(_) => InlineToken::Invalid,
        })
    }
}
