//! TCLI binary entrypoint.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tcli::{Cli, CliError, ConsoleTerminal, PromptState, ReplyCounter};
use tcli_core::display::{PROMPT_STR, banner};
use tcli_core::{CannedAccessor, CsvSource, Flow, Inventory, Session, Style, Terminal};

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Replies are read on the runtime while the session runs on this thread
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: {}", CliError::Runtime(e));
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &runtime) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, runtime: &Runtime) -> Result<(), CliError> {
    let terminal = Arc::new(ConsoleTerminal::new());

    let inventory = Arc::new(Inventory::new(CsvSource::new(&cli.inventory)));
    inventory.load()?;
    if let Err(e) = inventory.devices() {
        terminal.write(&e.to_string(), Style::Warning, None);
    }

    let accessor = Arc::new(CannedAccessor::new(&cli.responses, runtime.handle().clone()));
    let interactive = cli.is_interactive();

    let mut session = Session::new(
        cli.session_config(),
        inventory,
        accessor,
        Arc::clone(&terminal) as Arc<dyn Terminal>,
    );
    if interactive {
        session = session.with_progress(Arc::new(ReplyCounter::new()));
        terminal.write(&banner(), Style::System, session.color_scheme());
    }

    let rc = if interactive { read_rc(cli)? } else { None };
    info!(interactive, rc = rc.is_some(), "Starting session");

    if session.start_up(interactive, rc.as_deref(), cli.cmds.as_deref()) == Flow::Exit
        || !interactive
    {
        return Ok(());
    }

    prompt_loop(&mut session, &terminal, runtime);
    Ok(())
}

fn read_rc(cli: &Cli) -> Result<Option<String>, CliError> {
    let Some(path) = cli.config_path() else {
        return Ok(None);
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No rc file");
            Ok(None)
        }
        Err(source) => Err(CliError::ConfigFile {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn prompt_loop(session: &mut Session, terminal: &ConsoleTerminal, runtime: &Runtime) {
    let prompt = Arc::new(PromptState::new());
    let state = Arc::clone(&prompt);
    runtime.spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            let redrawn = state.redraw(&mut io::stdout().lock());
            match redrawn {
                Ok(true) => {}
                Ok(false) => warn!("Interrupt ignored while waiting for replies"),
                Err(e) => debug!(error = %e, "Prompt redraw failed"),
            }
        }
    });

    loop {
        session.reset_ledger();
        let header = session.prompt_header();
        terminal.write_segments(&header, session.color_scheme());

        prompt.reading(header, session.color_scheme());
        let line = terminal.read_line(PROMPT_STR);
        prompt.done();

        let Some(line) = line else {
            // EOF
            println!();
            break;
        };
        if session.parse_commands(&line) == Flow::Exit {
            break;
        }
    }
}
