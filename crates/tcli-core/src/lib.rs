//! # tcli-core
//!
//! Engine behind TCLI, a shell that sends commands to many network devices
//! at once and shows their replies in the order the commands were typed.
//!
//! This crate provides:
//!
//! - [`grammar`] — Escape, inline override and client-side pipe syntax
//! - [`Registry`] — Local command table, parsing and default values
//! - [`Ledger`] — Ordered reconciliation of asynchronous replies
//! - [`Session`] — Settings, line execution, dispatch and inline overlays
//! - [`Inventory`] — Devices and the target filters over them
//! - [`Accessor`] — Pluggable transport; [`CannedAccessor`] reads replies
//!   from files
//!
//! ## Example
//!
//! ```rust
//! use tcli_core::{Ledger, Reply, Uid};
//!
//! let ledger = Ledger::new();
//! ledger.init_row(0, "");
//! ledger.register_request(0, Uid(1));
//!
//! assert!(ledger.add_reply(Reply {
//!     uid: Uid(1),
//!     device_name: "device_a".into(),
//!     command: "show version".into(),
//!     data: "Version 1.0".into(),
//!     error: String::new(),
//! }));
//!
//! let row = ledger.next_completed_row().unwrap();
//! assert_eq!(ledger.replies(&row)[0].data, "Version 1.0");
//! assert!(ledger.next_completed_row().is_none());
//! assert!(ledger.is_done());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accessor;
pub mod buffer;
pub mod config;
pub mod display;
pub mod error;
pub mod grammar;
pub mod inventory;
pub mod ledger;
pub mod output;
pub mod registry;
pub mod session;
pub mod signal;
pub mod types;

// Re-export main types
pub use accessor::{Accessor, CannedAccessor, ReplyCallback};
pub use buffer::Buffers;
pub use config::SessionConfig;
pub use display::{ColorScheme, Style};
pub use error::{CommandError, InventoryError, Result};
pub use inventory::csv::CsvSource;
pub use inventory::{Device, DeviceSource, DeviceTable, Inventory};
pub use ledger::{CompletedRow, Ledger, Phase, Progress};
pub use output::{CaptureTerminal, Printer, Terminal};
pub use registry::{CommandDescriptor, DefaultValue, Invocation, Outcome, Registry};
pub use session::{Flow, Session, Settings};
pub use signal::Signal;
pub use types::{DisplayFormat, Mode, Reply, Request, Uid};
