use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::accessor::{Accessor, ReplyCallback};
use crate::inventory::tests::inventory;
use crate::output::CaptureTerminal;
use crate::types::Request;

/// Replies `<target> says <command>` from a thread per request.
///
/// Targets in `silent` never reply; targets in `slow` reply after `delay`.
#[derive(Default)]
struct ScriptedAccessor {
    sent: Mutex<Vec<Request>>,
    silent: BTreeSet<String>,
    slow: BTreeSet<String>,
    delay: Duration,
}

impl ScriptedAccessor {
    fn sent(&self) -> Vec<Request> {
        self.sent.lock().clone()
    }
}

impl Accessor for ScriptedAccessor {
    fn send_requests(&self, requests: Vec<(Request, ReplyCallback)>, _deadline: Duration) {
        for (request, callback) in requests {
            self.sent.lock().push(request.clone());
            if self.silent.contains(&request.target) {
                continue;
            }
            let delay = if self.slow.contains(&request.target) {
                self.delay
            } else {
                Duration::ZERO
            };
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                let data = format!("{} says {}", request.target, request.command);
                callback(Reply::ok(&request, data));
            });
        }
    }
}

struct Harness {
    session: Session,
    terminal: Arc<CaptureTerminal>,
    accessor: Arc<ScriptedAccessor>,
}

fn harness_with(config: SessionConfig, accessor: ScriptedAccessor) -> Harness {
    let terminal = Arc::new(CaptureTerminal::new());
    let accessor = Arc::new(accessor);
    let mut session = Session::new(
        config,
        Arc::new(inventory()),
        Arc::clone(&accessor) as Arc<dyn Accessor>,
        Arc::clone(&terminal) as Arc<dyn Terminal>,
    );
    assert_eq!(session.start_up(false, None, None), Flow::Continue);
    assert_eq!(session.parse_commands("/targets device_a,device_b"), Flow::Continue);
    Harness {
        session,
        terminal,
        accessor,
    }
}

fn harness() -> Harness {
    let config = SessionConfig {
        color: false,
        ..SessionConfig::default()
    };
    harness_with(config, ScriptedAccessor::default())
}

fn titles(terminal: &CaptureTerminal) -> Vec<String> {
    terminal.texts(Style::Title)
}

#[test]
fn batched_lines_render_row_by_row() {
    let mut h = harness();
    assert_eq!(h.session.parse_commands("show version\nshow time"), Flow::Continue);

    assert_eq!(
        titles(&h.terminal),
        vec![
            "#!# device_a:show version #!#",
            "#!# device_b:show version #!#",
            "#!# device_a:show time #!#",
            "#!# device_b:show time #!#",
        ]
    );
    assert_eq!(h.accessor.sent().len(), 4);
    assert!(h.session.ledger().is_done());
}

#[test]
fn local_line_flushes_pending_commands() {
    let mut h = harness();
    let _ = h.session.parse_commands("show version\n/display csv\nshow time");
    // The first line was sent before display changed.
    assert_eq!(titles(&h.terminal).len(), 4);
    assert_eq!(h.session.settings().display, DisplayFormat::Csv);
}

#[test]
fn pipe_filters_output() {
    let mut h = harness();
    let _ = h.session.parse_commands("show version || tr a-z A-Z");
    let output = h.terminal.texts(Style::Output);
    assert!(output.contains(&"DEVICE_A SAYS SHOW VERSION".to_string()));
    let sent = h.accessor.sent();
    assert!(sent.iter().all(|request| request.command == "show version"));
}

#[test]
fn safe_mode_only_sends_explicit_commands() {
    let mut h = harness();
    let _ = h.session.parse_commands("/safemode on\nshow version");
    assert!(h.accessor.sent().is_empty());
    assert!(h
        .terminal
        .texts(Style::Warning)
        .contains(&"Safe mode on, command ignored.".to_string()));

    let _ = h.session.parse_commands("/command show version");
    assert_eq!(h.accessor.sent().len(), 2);
}

#[test]
fn no_targets_sends_nothing_but_records() {
    let mut h = harness();
    let _ = h.session.parse_commands("/record buf\n/targets ^\nshow version");
    assert!(h.accessor.sent().is_empty());
    assert_eq!(h.session.buffers().get("buf").unwrap(), "show version");
}

#[test]
fn dry_run_shows_commands_and_targets() {
    let config = SessionConfig {
        color: false,
        dry_run: true,
        ..SessionConfig::default()
    };
    let mut h = harness_with(config, ScriptedAccessor::default());
    let _ = h.session.parse_commands("show version\nshow time");

    assert!(h.accessor.sent().is_empty());
    assert_eq!(titles(&h.terminal), vec!["Send Commands: ", "To Targets: "]);
    let output = h.terminal.texts(Style::Output);
    assert_eq!(output, vec!["  show version\n  show time", "  device_a,device_b"]);
}

#[test]
fn timeout_warns_and_drops_late_replies() {
    let config = SessionConfig {
        color: false,
        timeout: 1,
        grace: 0,
        ..SessionConfig::default()
    };
    let accessor = ScriptedAccessor {
        slow: BTreeSet::from(["device_b".to_string()]),
        delay: Duration::from_millis(1500),
        ..ScriptedAccessor::default()
    };
    let mut h = harness_with(config, accessor);
    let _ = h.session.parse_commands("show version");

    assert!(h
        .terminal
        .texts(Style::Warning)
        .contains(&"Timeout: timer exceeded while waiting for responses.".to_string()));
    // The late reply lands on a fresh ledger and is discarded.
    std::thread::sleep(Duration::from_millis(1000));
    assert!(titles(&h.terminal).is_empty());
    assert_eq!(h.session.ledger().received_count(), 0);
}

#[test]
fn largest_timeout_still_dispatches() {
    let mut h = harness();
    let _ = h.session.parse_commands(&format!("/timeout {}", u64::MAX));
    assert_eq!(h.session.settings().timeout, u64::MAX);

    let _ = h.session.parse_commands("show version");
    assert_eq!(titles(&h.terminal).len(), 2);
    assert!(h.terminal.texts(Style::Warning).is_empty());
}

#[test]
fn silent_target_stalls_row_until_timeout() {
    let config = SessionConfig {
        color: false,
        timeout: 1,
        grace: 0,
        ..SessionConfig::default()
    };
    let accessor = ScriptedAccessor {
        silent: BTreeSet::from(["device_a".to_string()]),
        ..ScriptedAccessor::default()
    };
    let mut h = harness_with(config, accessor);
    let _ = h.session.parse_commands("show version");
    assert!(titles(&h.terminal).is_empty());
    assert_eq!(h.terminal.texts(Style::Warning).len(), 1);
}

#[test]
fn inline_overrides_leave_parent_untouched() {
    let mut h = harness();
    let _ = h.session.parse_commands("show version //record buf //display csv");

    assert_eq!(h.session.settings().display, DisplayFormat::Raw);
    assert_eq!(h.session.settings().logging.record, None);
    assert_eq!(h.session.buffers().get("buf").unwrap(), "show version");
    assert_eq!(h.accessor.sent().len(), 2);
    assert!(h.accessor.sent().iter().all(|r| r.command == "show version"));
}

#[test]
fn inline_line_is_sent_apart_from_batch() {
    let mut h = harness();
    let _ = h.session.parse_commands("show time\nshow version //display csv\nshow date");
    let commands: Vec<String> = h.accessor.sent().into_iter().map(|r| r.command).collect();
    assert_eq!(
        commands,
        vec!["show time", "show time", "show version", "show version", "show date", "show date"]
    );
}

#[test]
fn failing_inline_override_abandons_line() {
    let mut h = harness();
    let _ = h.session.parse_commands("show version //display bogus");
    assert!(h.accessor.sent().is_empty());
    assert_eq!(h.terminal.texts(Style::Warning).len(), 1);
}

#[test]
fn inline_exit_is_dropped() {
    let mut h = harness();
    assert_eq!(h.session.parse_commands("show version //exit"), Flow::Continue);
    assert_eq!(h.accessor.sent().len(), 2);
}

#[test]
fn exit_stops_parsing() {
    let mut h = harness();
    assert_eq!(h.session.parse_commands("/exit\nshow version"), Flow::Exit);
    assert!(h.accessor.sent().is_empty());
}

#[test]
fn bad_local_commands_warn() {
    let mut h = harness();
    let _ = h.session.parse_commands("/bogus\n/timeout 0\n/color maybe");
    assert_eq!(
        h.terminal.texts(Style::Warning),
        vec![
            "Invalid escape command \"bogus\".",
            "Invalid timeout value \"0\".",
            "Error: Argument must be 'on' or 'off'.",
        ]
    );
}

#[test]
fn toggles_flip_without_argument() {
    let mut h = harness();
    assert!(!h.session.settings().verbose);
    let _ = h.session.parse_commands("/verbose");
    assert!(h.session.settings().verbose);
    let _ = h.session.parse_commands("/verbose off");
    assert!(!h.session.settings().verbose);
}

#[test]
fn recordall_captures_local_commands() {
    let mut h = harness();
    let _ = h.session.parse_commands("/recordall buf\n/display csv\nshow version\n/logstop buf");
    assert_eq!(
        h.session.buffers().get("buf").unwrap(),
        "/display csv\nshow version"
    );
    assert_eq!(h.session.settings().logging.recordall, None);
}

#[test]
fn log_captures_device_output() {
    let mut h = harness();
    let _ = h.session.parse_commands("/log out\nshow version");
    let log = h.session.buffers().get("out").unwrap();
    assert!(log.starts_with("show version\n#!# device_a:show version #!#"));
    assert!(log.contains("device_b says show version"));
}

#[test]
fn buffer_in_use_is_refused() {
    let mut h = harness();
    let _ = h.session.parse_commands("/record buf\n/log buf");
    assert_eq!(h.session.settings().logging.log, None);
    assert_eq!(
        h.terminal.texts(Style::Warning),
        vec!["Buffer: \"buf\", already open for writing."]
    );
}

#[test]
fn logstop_of_unused_buffer_fails() {
    let mut h = harness();
    let _ = h.session.parse_commands("/logstop nothing");
    assert_eq!(
        h.terminal.texts(Style::Warning),
        vec!["Buffer not in use for logging or recording."]
    );
}

#[test]
fn play_replays_buffer_and_rejects_recursion() {
    let mut h = harness();
    h.session.buffers().append("macro", "show version\n/play macro");
    let _ = h.session.parse_commands("/play macro");

    assert_eq!(h.accessor.sent().len(), 2);
    assert!(h
        .terminal
        .texts(Style::Warning)
        .contains(&"Recursive call of \"play\" rejected.".to_string()));
}

#[test]
fn defaults_restore_start_up_values() {
    let mut h = harness();
    let _ = h.session.parse_commands("/display csv\n/timeout 5\n/defaults timeout");
    assert_eq!(h.session.settings().timeout, 45);
    assert_eq!(h.session.settings().display, DisplayFormat::Csv);

    let _ = h.session.parse_commands("/defaults all");
    assert_eq!(h.session.settings().display, DisplayFormat::Raw);
    assert_eq!(h.session.inventory().targets(), "");
}

#[test]
fn interactive_start_up_runs_rc_then_defaults() {
    let terminal = Arc::new(CaptureTerminal::new());
    let mut session = Session::new(
        SessionConfig::default(),
        Arc::new(inventory()),
        Arc::new(ScriptedAccessor::default()),
        Arc::clone(&terminal) as Arc<dyn Terminal>,
    );
    let rc = "/display csv\n/targets device_a\n/verbose on";
    assert_eq!(session.start_up(true, Some(rc), None), Flow::Continue);

    assert!(session.settings().safemode);
    assert!(session.settings().verbose);
    assert_eq!(session.settings().display, DisplayFormat::Raw);
    assert_eq!(session.inventory().targets(), "device_a");
    assert_eq!(session.buffers().get(STARTUP_BUFFER).unwrap(), rc);
}

#[test]
fn attribute_filters_are_registered() {
    let mut h = harness();
    assert!(h.session.registry().contains("vendor"));
    assert!(h.session.registry().contains("xvendor"));

    let _ = h.session.parse_commands("/targets ^device_.*\n/vendor juniper\n/expandtargets");
    assert_eq!(
        h.terminal.texts(Style::System),
        vec!["device_a,device_c"]
    );
}

#[test]
fn maxtargets_limits_dispatch() {
    let mut h = harness();
    let _ = h.session.parse_commands("/maxtargets 1\nshow version");
    assert!(h.accessor.sent().is_empty());
    assert_eq!(
        h.terminal.texts(Style::Warning),
        vec!["target list exceeded maximum targets limit of: 1"]
    );
}

#[test]
fn inventory_lists_attributes() {
    let mut h = harness();
    let _ = h.session.parse_commands("/inventory");
    assert_eq!(
        h.terminal.texts(Style::System),
        vec![
            "device_a, Pop:abc01, Realm:prod, Vendor:juniper, f1\n\
             device_b, Pop:xyz02, Realm:prod, Vendor:cisco"
        ]
    );
}

#[test]
fn help_marks_append_commands() {
    let mut h = harness();
    let _ = h.session.parse_commands("/help");
    let help = h.terminal.texts(Style::System).join("");
    assert!(help.contains("record[+]\n"));
    assert!(help.contains("buffer <buffer>\n"));
    assert!(help.contains("targets[+]\n"));
}

#[test]
fn env_reports_settings() {
    let mut h = harness();
    let env = h.session.env();
    assert!(env.contains("Display: raw, Filter: default_index"));
    assert!(env.contains("Timeout: 45"));
    assert!(env.contains("Max Targets: 50"));
    let _ = h.session.parse_commands("/env");
    assert_eq!(h.terminal.texts(Style::System), vec![env]);
}

#[test]
fn read_and_write_buffers() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("in.txt");
    let target = dir.path().join("out.txt");
    std::fs::write(&source, "show version\nshow time\n").unwrap();

    let mut h = harness();
    let _ = h.session.parse_commands(&format!("/read buf {}", source.display()));
    assert_eq!(
        h.terminal.texts(Style::System),
        vec!["2 lines read."]
    );

    h.terminal.push_input(target.display().to_string());
    let _ = h.session.parse_commands("/write buf");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "show version\nshow time\n");
}

#[test]
fn vi_replaces_buffer_with_edited_text() {
    let config = SessionConfig {
        color: false,
        editor: "sed -i s/version/time/".to_string(),
        ..SessionConfig::default()
    };
    let mut h = harness_with(config, ScriptedAccessor::default());
    let _ = h.session.parse_commands("/record buf
show version
/recordstop buf");
    let _ = h.session.parse_commands("/vi buf");

    assert_eq!(h.session.buffers().get("buf").unwrap(), "show time");
    assert!(h.terminal.texts(Style::Warning).is_empty());
}

#[test]
fn vi_reports_editor_failure() {
    let config = SessionConfig {
        color: false,
        editor: "false".to_string(),
        ..SessionConfig::default()
    };
    let mut h = harness_with(config, ScriptedAccessor::default());
    let _ = h.session.parse_commands("/vi buf");
    assert_eq!(h.terminal.texts(Style::Warning).len(), 1);
    assert!(h.session.buffers().get("buf").is_err());
}

#[test]
fn prompt_reflects_targets_and_safe_mode() {
    let mut h = harness();
    let _ = h.session.parse_commands("/safemode on");
    let header: String = h
        .session
        .prompt_header()
        .into_iter()
        .map(|(text, _)| text)
        .collect();
    assert_eq!(header, "#! <device_a,device_b[2]*> !#");
}
