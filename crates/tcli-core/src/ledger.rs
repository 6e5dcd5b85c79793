//! Response ledger: reconciles out-of-order replies with ordered rows.
//!
//! Each command sent to the targets is a *row*; each target's reply to it
//! is identified by the [`Uid`] of its request. Replies arrive in any order,
//! from any thread. The ledger releases a row only when every reply for it
//! has arrived, and only after every earlier row has been released.
//!
//! ```text
//!             uid 1  uid 2  uid 3
//!   row 0  ->   ✓      ✓      ✓    released
//!   row 1  ->   ✓      ·      ✓    waiting (cursor)
//!   row 2  ->   ✓      ✓      ✓    complete, waits for row 1
//! ```
//!
//! All mutation goes through one lock owned by the ledger instance. A fresh
//! ledger is created for every dispatch batch; replies addressed to an older
//! batch carry unknown uids and are discarded.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::signal::Signal;
use crate::types::{Reply, Uid};

/// Progress indicator advanced as replies arrive.
pub trait Progress: Send + Sync {
    /// A reply arrived; `received` of `expected` are now in.
    fn advance(&self, received: usize, expected: usize);

    /// Output is about to be shown; remove any indicator from the screen.
    fn clear(&self);
}

/// Lifecycle of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Rows registered, nothing released yet.
    Collecting,
    /// At least one row has been released.
    Draining,
    /// Every registered row has been released.
    Done,
}

/// A row ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedRow {
    /// Position of the row in the batch.
    pub id: usize,
    /// Reply uids in arrival order.
    pub uids: Vec<Uid>,
    /// Client-side pipe for this row's output.
    pub pipe: String,
}

#[derive(Debug, Default)]
struct Row {
    expected: HashSet<Uid>,
    received: Vec<Uid>,
    pipe: String,
}

impl Row {
    fn is_complete(&self) -> bool {
        self.received.len() == self.expected.len()
    }
}

#[derive(Debug)]
struct State {
    rows: BTreeMap<usize, Row>,
    uid_index: HashMap<Uid, usize>,
    replies: HashMap<Uid, Reply>,
    cursor: usize,
    received: usize,
    phase: Phase,
}

/// Per-batch reply ledger.
pub struct Ledger {
    state: Mutex<State>,
    done: Signal,
    progress: Option<Arc<dyn Progress>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Ledger")
            .field("rows", &state.rows.len())
            .field("cursor", &state.cursor)
            .field("received", &state.received)
            .field("phase", &state.phase)
            .finish_non_exhaustive()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Empty ledger without a progress indicator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                rows: BTreeMap::new(),
                uid_index: HashMap::new(),
                replies: HashMap::new(),
                cursor: 0,
                received: 0,
                phase: Phase::Collecting,
            }),
            done: Signal::new(),
            progress: None,
        }
    }

    /// Empty ledger reporting to `progress`.
    #[must_use]
    pub fn with_progress(progress: Arc<dyn Progress>) -> Self {
        Self {
            progress: Some(progress),
            ..Self::new()
        }
    }

    /// Registers row `id` with its client-side pipe.
    pub fn init_row(&self, id: usize, pipe: impl Into<String>) {
        let mut state = self.state.lock();
        state.rows.insert(
            id,
            Row {
                pipe: pipe.into(),
                ..Row::default()
            },
        );
    }

    /// Adds `uid` to the replies row `row` waits for.
    ///
    /// Registering against a row that was never initialised is ignored.
    pub fn register_request(&self, row: usize, uid: Uid) {
        let mut state = self.state.lock();
        let Some(entry) = state.rows.get_mut(&row) else {
            warn!(row, %uid, "Request registered against unknown row");
            return;
        };
        entry.expected.insert(uid);
        state.uid_index.insert(uid, row);
    }

    /// Records a reply.
    ///
    /// Returns `false`, leaving the ledger untouched, when the uid is unknown
    /// (a stale reply from an interrupted batch) or was already received.
    pub fn add_reply(&self, reply: Reply) -> bool {
        let uid = reply.uid;
        let (received, expected) = {
            let mut state = self.state.lock();
            let Some(&row) = state.uid_index.get(&uid) else {
                warn!(%uid, "Discarded reply, not expected (stale?)");
                return false;
            };
            if state.replies.contains_key(&uid) {
                warn!(%uid, row, "Discarded duplicate reply");
                return false;
            }

            state.replies.insert(uid, reply);
            if let Some(entry) = state.rows.get_mut(&row) {
                entry.received.push(uid);
            }
            state.received += 1;
            (state.received, state.uid_index.len())
        };

        if let Some(progress) = &self.progress {
            progress.advance(received, expected);
        }
        true
    }

    /// Releases the row at the cursor if all of its replies are in.
    ///
    /// Returns `None` while the cursor's row is incomplete or not yet
    /// registered. Once every registered row has been released, fires the
    /// completion signal and keeps returning `None`.
    pub fn next_completed_row(&self) -> Option<CompletedRow> {
        let mut state = self.state.lock();
        if state.rows.is_empty() {
            return None;
        }

        let cursor = state.cursor;
        let Some(row) = state.rows.get(&cursor) else {
            let last = state.rows.keys().next_back().copied().unwrap_or_default();
            if cursor > last {
                debug!(rows = state.rows.len(), "All rows released");
                state.phase = Phase::Done;
                self.done.set();
            }
            return None;
        };

        if !row.is_complete() {
            debug!(row = cursor, "Current row incomplete");
            return None;
        }

        info!(row = cursor, size = row.received.len(), "Row complete and released");
        let completed = CompletedRow {
            id: cursor,
            uids: row.received.clone(),
            pipe: row.pipe.clone(),
        };
        state.cursor += 1;
        state.phase = Phase::Draining;
        drop(state);

        if let Some(progress) = &self.progress {
            progress.clear();
        }
        Some(completed)
    }

    /// Reply stored for `uid`.
    pub fn reply(&self, uid: Uid) -> Option<Reply> {
        self.state.lock().replies.get(&uid).cloned()
    }

    /// Replies for a released row, in arrival order.
    pub fn replies(&self, row: &CompletedRow) -> Vec<Reply> {
        let state = self.state.lock();
        row.uids
            .iter()
            .filter_map(|uid| state.replies.get(uid).cloned())
            .collect()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Total replies accepted so far.
    pub fn received_count(&self) -> usize {
        self.state.lock().received
    }

    /// Total requests registered.
    pub fn expected_count(&self) -> usize {
        self.state.lock().uid_index.len()
    }

    /// Number of registered rows.
    pub fn row_count(&self) -> usize {
        self.state.lock().rows.len()
    }

    /// Whether the completion signal has fired.
    pub fn is_done(&self) -> bool {
        self.done.is_set()
    }

    /// Blocks until every row is released or `timeout` elapses.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn reply(uid: u64) -> Reply {
        Reply {
            uid: Uid(uid),
            device_name: format!("device_{uid}"),
            command: "show version".into(),
            data: format!("output {uid}"),
            error: String::new(),
        }
    }

    /// Two rows of two requests each: row 0 -> uids 1,2; row 1 -> uids 3,4.
    fn two_by_two() -> Ledger {
        let ledger = Ledger::new();
        ledger.init_row(0, "");
        ledger.register_request(0, Uid(1));
        ledger.register_request(0, Uid(2));
        ledger.init_row(1, "wc -l");
        ledger.register_request(1, Uid(3));
        ledger.register_request(1, Uid(4));
        ledger
    }

    #[test]
    fn later_row_waits_for_earlier_row() {
        let ledger = two_by_two();
        assert!(ledger.add_reply(reply(3)));
        assert!(ledger.add_reply(reply(4)));
        assert_eq!(ledger.next_completed_row(), None);

        assert!(ledger.add_reply(reply(2)));
        assert_eq!(ledger.next_completed_row(), None);
        assert!(ledger.add_reply(reply(1)));

        let first = ledger.next_completed_row().unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(first.uids, vec![Uid(2), Uid(1)]);
        assert_eq!(ledger.phase(), Phase::Draining);

        let second = ledger.next_completed_row().unwrap();
        assert_eq!(second.id, 1);
        assert_eq!(second.pipe, "wc -l");

        assert!(!ledger.is_done());
        assert_eq!(ledger.next_completed_row(), None);
        assert!(ledger.is_done());
        assert_eq!(ledger.phase(), Phase::Done);
    }

    #[test]
    fn duplicate_reply_is_not_double_counted() {
        let ledger = two_by_two();
        assert!(ledger.add_reply(reply(1)));
        assert!(!ledger.add_reply(reply(1)));
        assert_eq!(ledger.received_count(), 1);
        assert_eq!(ledger.next_completed_row(), None);

        assert!(ledger.add_reply(reply(2)));
        let row = ledger.next_completed_row().unwrap();
        assert_eq!(row.uids, vec![Uid(1), Uid(2)]);
        assert_eq!(ledger.next_completed_row(), None);
    }

    #[test]
    fn unknown_uid_leaves_ledger_untouched() {
        let ledger = two_by_two();
        assert!(!ledger.add_reply(reply(99)));
        assert_eq!(ledger.received_count(), 0);
        assert!(ledger.reply(Uid(99)).is_none());
        assert_eq!(ledger.phase(), Phase::Collecting);
    }

    #[test]
    fn idle_calls_are_idempotent() {
        let ledger = two_by_two();
        for _ in 0..3 {
            assert_eq!(ledger.next_completed_row(), None);
        }
        assert!(!ledger.is_done());
    }

    #[test]
    fn empty_ledger_is_never_done() {
        let ledger = Ledger::new();
        assert_eq!(ledger.next_completed_row(), None);
        assert!(!ledger.is_done());
    }

    #[test]
    fn replies_follow_arrival_order() {
        let ledger = two_by_two();
        ledger.add_reply(reply(2));
        ledger.add_reply(reply(1));
        let row = ledger.next_completed_row().unwrap();
        let names: Vec<_> = ledger
            .replies(&row)
            .into_iter()
            .map(|r| r.device_name)
            .collect();
        assert_eq!(names, vec!["device_2", "device_1"]);
    }

    #[test]
    fn progress_is_advanced_and_cleared() {
        #[derive(Default)]
        struct Counter {
            advanced: AtomicUsize,
            cleared: AtomicUsize,
        }
        impl Progress for Counter {
            fn advance(&self, _received: usize, _expected: usize) {
                self.advanced.fetch_add(1, Ordering::SeqCst);
            }
            fn clear(&self) {
                self.cleared.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter::default());
        let ledger = Ledger::with_progress(counter.clone());
        ledger.init_row(0, "");
        ledger.register_request(0, Uid(1));
        ledger.add_reply(reply(1));
        ledger.add_reply(reply(5));
        assert!(ledger.next_completed_row().is_some());

        assert_eq!(counter.advanced.load(Ordering::SeqCst), 1);
        assert_eq!(counter.cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_delivery_releases_every_row_once_in_order() {
        let ledger = Arc::new(Ledger::new());
        let rows = 8;
        let targets = 16u64;
        for row in 0..rows {
            ledger.init_row(row, "");
            for target in 0..targets {
                ledger.register_request(row, Uid(row as u64 * targets + target));
            }
        }

        let released = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = (0..targets)
            .map(|target| {
                let ledger = Arc::clone(&ledger);
                let released = Arc::clone(&released);
                thread::spawn(move || {
                    for row in (0..rows).rev() {
                        ledger.add_reply(reply(row as u64 * targets + target));
                        let mut released = released.lock();
                        while let Some(done) = ledger.next_completed_row() {
                            released.push(done.id);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*released.lock(), (0..rows).collect::<Vec<_>>());
        assert_eq!(ledger.next_completed_row(), None);
        assert!(ledger.wait_done(Duration::ZERO));
    }

    proptest! {
        #[test]
        fn rows_release_in_order_for_any_arrival_order(
            order in Just((1u64..=12).collect::<Vec<_>>()).prop_shuffle()
        ) {
            // Four rows of three uids each.
            let ledger = Ledger::new();
            for row in 0..4usize {
                ledger.init_row(row, "");
                for k in 0..3u64 {
                    ledger.register_request(row, Uid(row as u64 * 3 + k + 1));
                }
            }

            let mut released = Vec::new();
            for uid in order {
                prop_assert!(ledger.add_reply(reply(uid)));
                while let Some(row) = ledger.next_completed_row() {
                    prop_assert_eq!(row.uids.len(), 3);
                    released.push(row.id);
                }
            }
            prop_assert_eq!(released, vec![0, 1, 2, 3]);
            prop_assert!(ledger.is_done());
        }
    }
}
