//! Command-line argument parsing with clap.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use tcli_core::config::{DEFAULT_EDITOR, DEFAULT_GRACE_SECS, DEFAULT_TIMEOUT_SECS};
use tcli_core::inventory::DEFAULT_MAXTARGETS;
use tcli_core::{ColorScheme, DisplayFormat, Mode, SessionConfig};

/// Value of `--config-file` that disables the rc file.
pub const NO_CONFIG_FILE: &str = "none";

/// TCLI - send commands to many devices and read replies in order.
#[derive(Parser, Debug, Clone)]
#[command(name = "tcli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Commands to run, newline separated. Exits afterwards unless
    /// --interactive is also given.
    #[arg(short = 'C', long)]
    pub cmds: Option<String>,

    /// Stay interactive after --cmds.
    #[arg(short = 'I', long)]
    pub interactive: bool,

    /// Run commands file, played at start-up. 'none' disables it.
    #[arg(short = 'R', long, env = "TCLI_CONFIG_FILE", default_value = "~/.tclirc")]
    pub config_file: String,

    /// CSV file describing the devices.
    #[arg(long, env = "TCLI_INVENTORY", default_value = "devices.csv")]
    pub inventory: PathBuf,

    /// Directory of canned device output.
    #[arg(long, env = "TCLI_RESPONSES", default_value = "device_output")]
    pub responses: PathBuf,

    /// Initial target filter.
    #[arg(short = 'T', long, default_value = "")]
    pub targets: String,

    /// Initial exclusion filter.
    #[arg(short = 'X', long, default_value = "")]
    pub xtargets: String,

    /// Maximum number of targets; 0 is unlimited.
    #[arg(long, default_value_t = DEFAULT_MAXTARGETS)]
    pub maxtargets: usize,

    /// Output format.
    #[arg(short = 'D', long, default_value = "raw")]
    pub display: DisplayFormat,

    /// Interpreter on the devices.
    #[arg(short = 'M', long, default_value = "cli")]
    pub mode: Mode,

    /// Template index used by non-raw formats.
    #[arg(short = 'F', long, default_value = "default_index")]
    pub filter: String,

    /// Seconds to wait for replies.
    #[arg(short = 'O', long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Seconds to wait past the timeout.
    #[arg(long, default_value_t = DEFAULT_GRACE_SECS)]
    pub grace: u64,

    /// Colorize output.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub color: bool,

    /// Palette when color is on.
    #[arg(long, default_value = "light")]
    pub color_scheme: ColorScheme,

    /// Wrap output at terminal width.
    #[arg(long)]
    pub linewrap: bool,

    /// Show what would be sent instead of sending it.
    #[arg(long)]
    pub dry_run: bool,

    /// Sort replies by device name.
    #[arg(long)]
    pub sorted: bool,

    /// Editor for the 'vi' command.
    #[arg(long, env = "EDITOR", default_value = DEFAULT_EDITOR)]
    pub editor: String,
}

impl Cli {
    /// Start-up values for the session.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            color: self.color,
            color_scheme: self.color_scheme,
            display: self.display,
            filter: self.filter.clone(),
            linewrap: self.linewrap,
            mode: self.mode,
            timeout: self.timeout,
            grace: self.grace,
            targets: self.targets.clone(),
            xtargets: self.xtargets.clone(),
            maxtargets: self.maxtargets,
            dry_run: self.dry_run,
            sorted: self.sorted,
            editor: self.editor.clone(),
        }
    }

    /// Whether to prompt for input.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.interactive || self.cmds.is_none()
    }

    /// Path of the rc file, `None` when disabled.
    #[must_use]
    pub fn config_path(&self) -> Option<PathBuf> {
        if self.config_file.is_empty() || self.config_file == NO_CONFIG_FILE {
            return None;
        }
        Some(expand_home(&self.config_file, std::env::var_os("HOME").as_deref().map(Path::new)))
    }
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_help_does_not_panic() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_session_defaults() {
        let cli = Cli::parse_from(["tcli"]);
        assert!(cli.is_interactive());
        let config = cli.session_config();
        // The editor follows $EDITOR when set.
        let expected = SessionConfig {
            editor: config.editor.clone(),
            ..SessionConfig::default()
        };
        assert_eq!(config, expected);
    }

    #[test]
    fn batch_mode_with_cmds() {
        let cli = Cli::parse_from(["tcli", "-C", "show version", "-T", "device_a"]);
        assert!(!cli.is_interactive());
        assert_eq!(cli.cmds.as_deref(), Some("show version"));
        assert_eq!(cli.session_config().targets, "device_a");
    }

    #[test]
    fn cmds_with_interactive() {
        let cli = Cli::parse_from(["tcli", "-C", "show version", "-I"]);
        assert!(cli.is_interactive());
    }

    #[test]
    fn parses_enums() {
        let cli = Cli::parse_from([
            "tcli",
            "--display",
            "csv",
            "--mode",
            "shell",
            "--color-scheme",
            "gross",
            "--color",
            "false",
        ]);
        let config = cli.session_config();
        assert_eq!(config.display, DisplayFormat::Csv);
        assert_eq!(config.mode, Mode::Shell);
        assert_eq!(config.color_scheme, ColorScheme::Gross);
        assert!(!config.color);
    }

    #[test]
    fn rejects_unknown_display() {
        assert!(Cli::try_parse_from(["tcli", "--display", "fancy"]).is_err());
    }

    #[test]
    fn editor_flag_overrides_default() {
        let cli = Cli::parse_from(["tcli", "--editor", "nano"]);
        assert_eq!(cli.session_config().editor, "nano");
    }

    #[test]
    fn config_file_none_disables_rc() {
        let cli = Cli::parse_from(["tcli", "-R", "none"]);
        assert_eq!(cli.config_path(), None);
    }

    #[test]
    fn home_is_expanded() {
        let path = expand_home("~/.tclirc", Some(Path::new("/home/user")));
        assert_eq!(path, PathBuf::from("/home/user/.tclirc"));
        assert_eq!(expand_home("/etc/tclirc", None), PathBuf::from("/etc/tclirc"));
    }
}
