//! Start-up configuration of a session.

use std::time::Duration;

use crate::display::ColorScheme;
use crate::inventory::DEFAULT_MAXTARGETS;
use crate::types::{DisplayFormat, Mode};

/// Presentation commands reset by `defaults all` and applied around the rc
/// file, so explicit settings win over rc contents.
pub const DEFAULT_COMMANDS: [&str; 7] = [
    "color",
    "color_scheme",
    "display",
    "filter",
    "linewrap",
    "mode",
    "timeout",
];

/// Inventory filter commands seeded from configuration at start-up.
pub const INVENTORY_DEFAULTS: [&str; 3] = ["targets", "xtargets", "maxtargets"];

/// Default response timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 45;

/// Extra wait after the timeout for slow but valid replies.
pub const DEFAULT_GRACE_SECS: u64 = 5;

/// Editor opened by the `vi` command.
pub const DEFAULT_EDITOR: &str = "vi";

/// Values a session starts with and returns to on `defaults`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Colorize output.
    pub color: bool,
    /// Palette when color is on.
    pub color_scheme: ColorScheme,
    /// Output layout.
    pub display: DisplayFormat,
    /// Template index used by non-raw layouts.
    pub filter: String,
    /// Wrap output at terminal width.
    pub linewrap: bool,
    /// Interpreter on the devices.
    pub mode: Mode,
    /// Seconds to wait for replies.
    pub timeout: u64,
    /// Seconds to wait past the timeout.
    pub grace: u64,
    /// Initial `targets` filter.
    pub targets: String,
    /// Initial `xtargets` filter.
    pub xtargets: String,
    /// Target ceiling; 0 is unlimited.
    pub maxtargets: usize,
    /// Show what would be sent instead of sending it.
    pub dry_run: bool,
    /// Sort each row's replies by device name.
    pub sorted: bool,
    /// Editor for buffers, run through the shell.
    pub editor: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            color: true,
            color_scheme: ColorScheme::Light,
            display: DisplayFormat::Raw,
            filter: "default_index".to_string(),
            linewrap: false,
            mode: Mode::Cli,
            timeout: DEFAULT_TIMEOUT_SECS,
            grace: DEFAULT_GRACE_SECS,
            targets: String::new(),
            xtargets: String::new(),
            maxtargets: DEFAULT_MAXTARGETS,
            dry_run: false,
            sorted: false,
            editor: DEFAULT_EDITOR.to_string(),
        }
    }
}

impl SessionConfig {
    /// Extra wait past the timeout.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace)
    }
}
