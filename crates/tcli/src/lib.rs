//! # tcli
//!
//! Console front end for [`tcli_core`]: argument parsing, a crossterm
//! terminal and the interactive prompt loop.
//!
//! ```text
//! ┌──────────┐  lines   ┌─────────┐  requests  ┌────────────────┐
//! │ terminal │─────────►│ Session │───────────►│ CannedAccessor │
//! │          │◄─────────│         │◄───────────│   (tokio)      │
//! └──────────┘  rows    └─────────┘  replies   └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod terminal;

pub use cli::Cli;
pub use error::CliError;
pub use terminal::{ConsoleTerminal, PromptState, ReplyCounter};
