//! Code Flow command-line interface.
//!
//! Provides the `codeflow` binary for tracing, stepping through and checking
//! small JavaScript and Python programs from a terminal.
//!
//! Environment:
//! - `CODEFLOW_LOG`: log filter (default: "warn"); logs go to stderr.
//! - `CODEFLOW_MAX_STEPS`, `CODEFLOW_TIMEOUT_MS`, `CODEFLOW_MAX_STRING`:
//!   execution limits, overridden by `--max-steps` / `--timeout-ms`.
//!
//! Exit codes: 0 = success, 1 = the program (or a test) failed,
//! 2 = usage or I/O error.

mod render;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use codeflow_check::{parse_tests, Language, Playground};
use codeflow_core::playback::DEFAULT_SPEED_MS;
use codeflow_core::{
    EngineEvent, NoopObserver, PlaybackController, Player, Step, TraceErrorKind, TraceLimits,
    TraceResult,
};
use codeflow_js::{Entry, JsHost, RunRequest, SteppedSession};

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Trace, step through and check small programs.
#[derive(Parser)]
#[command(name = "codeflow", about = "Trace, step through and check small programs")]
struct Cli {
    #[command(flatten)]
    limits: LimitArgs,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LimitArgs {
    /// Wall-clock budget per run, in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Maximum number of traced steps.
    #[arg(long, global = true)]
    max_steps: Option<usize>,
}

impl LimitArgs {
    fn resolve(&self) -> TraceLimits {
        let mut limits = TraceLimits::from_env();
        if let Some(timeout_ms) = self.timeout_ms {
            limits = limits.with_timeout_ms(timeout_ms);
        }
        if let Some(max_steps) = self.max_steps {
            limits = limits.with_max_steps(max_steps);
        }
        limits
    }
}

#[derive(Args)]
struct EntryArgs {
    /// Function to call after top-level code runs (JavaScript only).
    #[arg(long)]
    entry: Option<String>,

    /// JSON array of arguments for the entry function.
    #[arg(long)]
    args: Option<String>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run a program and print its output.
    Run {
        file: PathBuf,
        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Run a program and print every traced step.
    Trace {
        file: PathBuf,
        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Validate a solution against exercise tests.
    Check {
        /// Exercise starter code; names the function under test.
        #[arg(long)]
        starter: PathBuf,

        /// The solution to check.
        #[arg(long)]
        user: PathBuf,

        /// JSON test definitions.
        #[arg(long)]
        tests: PathBuf,
    },

    /// Step through a JavaScript program interactively.
    Step {
        file: PathBuf,
        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Replay a program's trace at a fixed speed.
    Play {
        file: PathBuf,

        /// Delay between steps, in milliseconds (100-3000).
        #[arg(long, default_value_t = DEFAULT_SPEED_MS)]
        speed_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let limits = cli.limits.resolve();
    tracing::debug!("limits: {:?}", limits);

    let exit_code = match cli.command {
        Commands::Run { file, entry } => run_file(&file, &entry, limits, cli.json, false).await,
        Commands::Trace { file, entry } => run_file(&file, &entry, limits, cli.json, true).await,
        Commands::Check {
            starter,
            user,
            tests,
        } => check(&starter, &user, &tests, limits, cli.json).await,
        Commands::Step { file, entry } => step(&file, &entry, limits).await,
        Commands::Play { file, speed_ms } => play(&file, speed_ms, limits, cli.json).await,
    };
    process::exit(exit_code);
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("CODEFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads a source file, reporting failures on stderr.
fn read_file(path: &Path) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: cannot read '{}': {}", path.display(), e);
        EXIT_USAGE
    })
}

fn language_of(path: &Path) -> Result<Language, i32> {
    Language::from_path(path).map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_USAGE
    })
}

fn entry_of(args: &EntryArgs) -> Result<(Entry, Vec<serde_json::Value>), i32> {
    let entry = match &args.entry {
        Some(name) => Entry::named(name.as_str()),
        None => Entry::Script,
    };
    let values = match &args.args {
        None => Vec::new(),
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(values)) => values,
            Ok(_) => {
                eprintln!("Error: --args must be a JSON array");
                return Err(EXIT_USAGE);
            }
            Err(e) => {
                eprintln!("Error: invalid --args JSON: {}", e);
                return Err(EXIT_USAGE);
            }
        },
    };
    Ok((entry, values))
}

fn exit_code(result: &TraceResult) -> i32 {
    match result.error_kind {
        None => EXIT_OK,
        Some(TraceErrorKind::Usage) => EXIT_USAGE,
        Some(_) => EXIT_FAILED,
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

/// Runs a file to completion through the playground.
async fn trace_file(
    file: &Path,
    entry: &EntryArgs,
    limits: TraceLimits,
) -> Result<TraceResult, i32> {
    let source = read_file(file)?;
    let language = language_of(file)?;
    let (entry, args) = entry_of(entry)?;
    if language == Language::Python && (entry != Entry::Script || !args.is_empty()) {
        eprintln!("Error: --entry and --args apply to JavaScript only");
        return Err(EXIT_USAGE);
    }
    let playground = Playground::new(limits);
    playground
        .run_entry("cli", language, &source, entry, args, &mut NoopObserver)
        .await
        .into_result()
        .ok_or(EXIT_FAILED)
}

/// Execute the run and trace subcommands.
async fn run_file(
    file: &Path,
    entry: &EntryArgs,
    limits: TraceLimits,
    json: bool,
    show_steps: bool,
) -> i32 {
    let result = match trace_file(file, entry, limits).await {
        Ok(result) => result,
        Err(code) => return code,
    };
    if json {
        print_json(&result);
        return exit_code(&result);
    }

    if show_steps {
        let total = result.steps.len();
        for (index, step) in result.steps.iter().enumerate() {
            let prev = index.checked_sub(1).map(|i| &result.steps[i]);
            print!("{}", render::step(index, Some(total), step, prev));
            for entry in result.output.iter().filter(|e| e.step_index == index) {
                print!("  > {}", entry.text);
            }
        }
    } else {
        print!("{}", result.stdout());
        eprint!("{}", result.stream_text(codeflow_core::OutputStream::Stderr));
    }
    eprintln!("{}", render::summary(&result));
    exit_code(&result)
}

/// Execute the check subcommand.
async fn check(starter: &Path, user: &Path, tests: &Path, limits: TraceLimits, json: bool) -> i32 {
    let (starter, user, tests) = match (read_file(starter), read_file(user), read_file(tests)) {
        (Ok(s), Ok(u), Ok(t)) => (s, u, t),
        _ => return EXIT_USAGE,
    };
    let tests = match parse_tests(&tests) {
        Ok(tests) => tests,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_USAGE;
        }
    };

    let report = Playground::new(limits).validate(&starter, &user, &tests).await;
    if json {
        print_json(&report);
    } else {
        println!("{}", render::report(&report));
    }
    if report.ok {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

/// Waits for the session's next snapshot, echoing program output as it
/// arrives.
async fn next_snapshot(session: &mut SteppedSession) -> Option<Step> {
    while let Some(event) = session.next_event().await {
        match event {
            EngineEvent::Snapshot(step) => return Some(step),
            EngineEvent::Output { text, .. } => print!("  > {}", text),
            _ => {}
        }
    }
    None
}

/// Execute the step subcommand: `s` (or enter) advances one line, `r` runs to
/// the end, `q` stops the program.
async fn step(file: &Path, entry: &EntryArgs, limits: TraceLimits) -> i32 {
    let source = match read_file(file) {
        Ok(source) => source,
        Err(code) => return code,
    };
    if language_of(file) != Ok(Language::JavaScript) {
        eprintln!("Error: step supports JavaScript files only");
        return EXIT_USAGE;
    }
    let (entry, args) = match entry_of(entry) {
        Ok(parsed) => parsed,
        Err(code) => return code,
    };
    let request = RunRequest::new(source).with_entry(entry).with_args(args);
    let mut session = match JsHost::new(limits).start(request) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return if e.kind() == TraceErrorKind::Usage {
                EXIT_USAGE
            } else {
                EXIT_FAILED
            };
        }
    };

    eprintln!("commands: [s]tep, [r]esume, [q]uit");
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut prev: Option<Step> = None;
    let mut index = 0;
    'session: while let Some(current) = next_snapshot(&mut session).await {
        print!("{}", render::step(index, None, &current, prev.as_ref()));
        index += 1;
        prev = Some(current);
        loop {
            eprint!("> ");
            let command = match commands.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => {
                    session.terminate();
                    break 'session;
                }
            };
            match command.trim() {
                "" | "s" | "step" => {
                    session.step();
                    break;
                }
                "r" | "resume" => {
                    session.resume();
                    break 'session;
                }
                "q" | "quit" => {
                    session.terminate();
                    break 'session;
                }
                other => eprintln!("unknown command '{}'", other),
            }
        }
    }

    let result = session.finish().await;
    eprintln!("{}", render::summary(&result));
    exit_code(&result)
}

/// Execute the play subcommand.
async fn play(file: &Path, speed_ms: u64, limits: TraceLimits, json: bool) -> i32 {
    let no_entry = EntryArgs {
        entry: None,
        args: None,
    };
    let result = match trace_file(file, &no_entry, limits).await {
        Ok(result) => result,
        Err(code) => return code,
    };

    let mut controller = PlaybackController::new(result.steps.len());
    controller.set_speed(speed_ms);
    if !result.ok {
        let error = result.error.clone().unwrap_or_default();
        controller.show_error(error, result.failure_line());
    }
    let player = Player::spawn(controller);
    let mut states = player.subscribe();
    let total = result.steps.len();
    let mut shown: Option<usize> = None;
    player.play().await;

    loop {
        let state = states.borrow_and_update().clone();
        if json {
            print_json(&state);
        } else if shown != Some(state.current_index) {
            if let Some(step) = result.steps.get(state.current_index) {
                let prev = shown.and_then(|i| result.steps.get(i));
                print!("{}", render::step(state.current_index, Some(total), step, prev));
                for entry in result.output_until(state.current_index) {
                    if shown.map_or(true, |i| entry.step_index > i) {
                        print!("  > {}", entry.text);
                    }
                }
            }
        }
        shown = Some(state.current_index);
        if !state.is_playing || states.changed().await.is_err() {
            break;
        }
    }

    eprintln!("{}", render::summary(&result));
    exit_code(&result)
}
