//! Device accessor: delivers requests to devices and replies to callbacks.
//!
//! The transport to real devices is pluggable. [`CannedAccessor`] answers
//! from files on disk and is what the binary ships with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::types::{Reply, Request};

/// Receives the reply to one request. May be called from any thread.
pub type ReplyCallback = Arc<dyn Fn(Reply) + Send + Sync>;

/// Sends requests to devices.
///
/// Implementations invoke each callback at most once, with a reply carrying
/// the request's uid, concurrently and in any order. A callback that is never
/// invoked is covered by the caller's timeout.
pub trait Accessor: Send + Sync {
    /// Submits every request; returns without waiting for replies.
    fn send_requests(&self, requests: Vec<(Request, ReplyCallback)>, deadline: Duration);
}

/// Answers requests from canned output files.
///
/// The reply to `command` on `target` is read from
/// `<dir>/<target>_<command with spaces replaced by underscores>`.
#[derive(Debug, Clone)]
pub struct CannedAccessor {
    dir: PathBuf,
    runtime: Handle,
}

impl CannedAccessor {
    /// Accessor reading from `dir`, spawning reads on `runtime`.
    pub fn new(dir: impl Into<PathBuf>, runtime: Handle) -> Self {
        Self {
            dir: dir.into(),
            runtime,
        }
    }

    /// Directory replies are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the canned reply for `request`.
    pub fn reply_path(&self, request: &Request) -> PathBuf {
        let command = request.command.replace([' ', '/'], "_");
        self.dir.join(format!("{}_{command}", request.target))
    }
}

impl Accessor for CannedAccessor {
    fn send_requests(&self, requests: Vec<(Request, ReplyCallback)>, deadline: Duration) {
        debug!(count = requests.len(), dir = %self.dir.display(), "Sending canned requests");
        for (request, callback) in requests {
            let path = self.reply_path(&request);
            self.runtime.spawn(async move {
                let read = tokio::time::timeout(deadline, tokio::fs::read_to_string(&path)).await;
                let reply = match read {
                    Ok(Ok(data)) => Reply::ok(&request, data),
                    Ok(Err(e)) => {
                        debug!(path = %path.display(), error = %e, "No canned reply");
                        Reply::failed(
                            &request,
                            format!(
                                "Failure to retrieve response from device \"{}\", for command \"{}\".",
                                request.target, request.command
                            ),
                        )
                    }
                    Err(_) => {
                        warn!(uid = %request.uid, target = %request.target, "Deadline exceeded");
                        return;
                    }
                };
                // Callbacks may block on rendering.
                let delivered = tokio::task::spawn_blocking(move || callback(reply)).await;
                if let Err(e) = delivered {
                    warn!(error = %e, "Reply callback failed");
                }
            });
        }
    }
}
