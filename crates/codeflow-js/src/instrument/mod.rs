//! Source instrumentation for the JavaScript path.
//!
//! [`instrument`] rewrites user source so that executing it also reports
//! every line it runs. After each line that ends a statement it appends, on
//! the same physical line,
//!
//! ```text
//! ;__cf_hook(L, NEXT); __cf_snap(L, () => { ...read candidate names... });
//! ```
//!
//! so line numbers in the rewritten program are the user's line numbers.
//! Every statement block also starts with `__cf_tick();`, which only checks
//! for cancellation, so a loop whose body shares its header's line still
//! stops promptly. Function bodies are wrapped to maintain a frame stack in
//! the sandbox:
//!
//! ```text
//! { __cf_enter("name", L); try { <body> } catch (__cf_e) { __cf_fault(__cf_e); throw __cf_e; } finally { __cf_exit(); } }
//! ```
//!
//! The whole program becomes the body of `globalThis.__cf_program`, which
//! the host calls with the entry arguments.

mod entry;
mod names;
mod scanner;

use codeflow_core::TraceError;

use scanner::{BraceKind, LineScan, Scan, Token};

/// Which function the wrapper invokes after the top-level code has run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Entry {
    /// Run top-level code only.
    #[default]
    Script,
    /// Invoke the named function; it must be declared in the source.
    Named(String),
    /// Invoke the first top-level function declaration.
    Discover,
}

impl Entry {
    pub fn named(name: impl Into<String>) -> Self {
        Entry::Named(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentMode {
    /// Run to completion.
    #[default]
    Auto,
    /// Suspend at a gate after every snapshot until released.
    Stepped,
}

/// An instrumented program ready for the sandbox.
#[derive(Debug, Clone)]
pub struct InstrumentedProgram {
    pub original: String,
    pub wrapper_source: String,
    pub entry: Option<String>,
    pub candidates: Vec<String>,
    /// User lines that received a hook.
    pub instrumented_lines: Vec<u32>,
    pub mode: InstrumentMode,
}

const PROGRAM_HEADER: &str = "globalThis.__cf_program = function (__cf_args) {";

const BLOCK_TICK: &str = "__cf_tick();";

const FUNCTION_EPILOGUE: &str =
    "} catch (__cf_e) { __cf_fault(__cf_e); throw __cf_e; } finally { __cf_exit(); } ";

/// Keywords after which the statement continues on the next line.
const CONTINUING_KEYWORDS: &[&str] = &[
    "if",
    "else",
    "for",
    "while",
    "do",
    "switch",
    "case",
    "default",
    "function",
    "class",
    "new",
    "typeof",
    "instanceof",
    "in",
    "of",
    "var",
    "let",
    "const",
    "try",
    "catch",
    "finally",
    "throw",
    "delete",
    "void",
    "yield",
    "await",
    "async",
    "extends",
    "import",
    "export",
    "with",
];

const JUMP_KEYWORDS: &[&str] = &["return", "throw", "break", "continue"];

/// Name of the function [`Entry::Discover`] would call in `source`.
pub fn discover_entry(source: &str) -> Result<String, TraceError> {
    let scan = scanner::scan(source);
    entry::resolve(&scan.masked, &Entry::Discover)?
        .map(|found| found.name)
        .ok_or_else(|| TraceError::usage("no function found to call"))
}

pub fn instrument(
    source: &str,
    entry: &Entry,
    mode: InstrumentMode,
) -> Result<InstrumentedProgram, TraceError> {
    let scan = scanner::scan(source);
    let entry = entry::resolve(&scan.masked, entry)?.map(|e| e.name);
    let candidates = names::candidate_names(&scan.masked);
    let capture = capture_closure(&candidates);

    let texts: Vec<&str> = source.split('\n').collect();
    let mut body = Vec::with_capacity(texts.len());
    let mut instrumented_lines = Vec::new();

    for (index, text) in texts.iter().enumerate() {
        let Some(line) = scan.lines.get(index) else {
            body.push(text.to_string());
            continue;
        };
        let number = index as u32 + 1;
        let next = next_code_line(&scan, index);
        let mut inserts: Vec<(usize, u8, String)> = Vec::new();

        for open in &line.function_opens {
            inserts.push((
                open.offset,
                0,
                format!("__cf_enter({}, {}); try {{", js_string(&open.name), number),
            ));
        }
        for &close in &line.function_closes {
            inserts.push((close, 0, FUNCTION_EPILOGUE.to_string()));
        }
        for &open in &line.block_opens {
            inserts.push((open, 1, BLOCK_TICK.to_string()));
        }

        if let Some(start) = line.code_start.filter(|_| is_jump_line(&scan, &texts, index)) {
            inserts.push((start, 1, format!("{} ", hook(number, number, &capture, mode))));
            instrumented_lines.push(number);
        } else if let Some(end) = line.code_end.filter(|_| ends_statement(&scan, &texts, index)) {
            let next_line = next.map(|i| i as u32 + 1).unwrap_or(number + 1);
            inserts.push((end, 2, format!(";{}", hook(number, next_line, &capture, mode))));
            instrumented_lines.push(number);
        }

        body.push(apply_inserts(text, inserts));
    }

    let mut wrapper_source = String::from(PROGRAM_HEADER);
    wrapper_source.push_str(&body.join("\n"));
    wrapper_source.push_str("\n;return ");
    match &entry {
        Some(name) => {
            wrapper_source.push_str(name);
            wrapper_source.push_str("(...__cf_args)");
        }
        None => wrapper_source.push_str("undefined"),
    }
    wrapper_source.push_str(";\n};\n");

    tracing::debug!(
        "instrumented {} of {} lines ({} candidate names)",
        instrumented_lines.len(),
        texts.len(),
        candidates.len()
    );

    Ok(InstrumentedProgram {
        original: source.to_string(),
        wrapper_source,
        entry,
        candidates,
        instrumented_lines,
        mode,
    })
}

fn hook(line: u32, next: u32, capture: &str, mode: InstrumentMode) -> String {
    let mut text = format!("__cf_hook({line}, {next}); __cf_snap({line}, {capture});");
    if mode == InstrumentMode::Stepped {
        text.push_str(" __cf_gate();");
    }
    text
}

/// A closure returning `[name, value]` pairs for every candidate that can be
/// read at the call site.
fn capture_closure(candidates: &[String]) -> String {
    let mut text = String::from("() => { const __cf_v = [];");
    for name in candidates {
        text.push_str(&format!(
            " try {{ __cf_v.push([{}, {}]); }} catch (__cf_e) {{}}",
            js_string(name),
            name
        ));
    }
    text.push_str(" return __cf_v; }");
    text
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

fn apply_inserts(text: &str, mut inserts: Vec<(usize, u8, String)>) -> String {
    if inserts.is_empty() {
        return text.to_string();
    }
    inserts.sort_by_key(|(offset, order, _)| (*offset, *order));
    let extra: usize = inserts.iter().map(|i| i.2.len()).sum();
    let mut out = String::with_capacity(text.len() + extra);
    let mut cursor = 0;
    for (offset, _, insert) in inserts {
        let offset = offset.min(text.len());
        out.push_str(&text[cursor..offset]);
        out.push_str(&insert);
        cursor = offset;
    }
    out.push_str(&text[cursor..]);
    out
}

fn next_code_line(scan: &Scan, index: usize) -> Option<usize> {
    scan.lines
        .iter()
        .enumerate()
        .skip(index + 1)
        .find(|(_, line)| line.has_code())
        .map(|(i, _)| i)
}

fn prev_code_line(scan: &Scan, index: usize) -> Option<usize> {
    scan.lines[..index].iter().rposition(LineScan::has_code)
}

/// Whether the code following the end of one line continues its statement.
fn continues(rest: &str) -> bool {
    if rest.starts_with("++") || rest.starts_with("--") {
        return false;
    }
    if rest.starts_with("!=") {
        return true;
    }
    rest.chars().next().is_some_and(|c| {
        matches!(
            c,
            '.' | '?'
                | ':'
                | '+'
                | '-'
                | '*'
                | '/'
                | '%'
                | '='
                | '&'
                | '|'
                | '^'
                | ','
                | '('
                | '['
                | '`'
                | '<'
                | '>'
                | ')'
                | ']'
        )
    })
}

/// The line is the body of a braceless `if`/`for`/`while`/`else`/`do`.
fn is_braceless_body(scan: &Scan, index: usize) -> bool {
    let Some(prev) = prev_code_line(scan, index).map(|i| &scan.lines[i]) else {
        return false;
    };
    match &prev.last {
        Some(Token::Punct(')')) => prev.header_paren,
        Some(Token::Word(w)) => w == "else" || w == "do",
        _ => false,
    }
}

/// Whether a hook can be appended after the last token of line `index`.
fn ends_statement(scan: &Scan, texts: &[&str], index: usize) -> bool {
    let line = &scan.lines[index];
    if !line.has_code() || line.ends_in_literal || !line.end_scope.holds_statements() {
        return false;
    }
    if is_braceless_body(scan, index) {
        return false;
    }
    // `else x = 1;` is a body too; only `else {` opens a hookable block.
    if line.first.as_ref().is_some_and(|t| t.is_word("else"))
        && line.last != Some(Token::Punct('{'))
    {
        return false;
    }

    let next = next_code_line(scan, index)
        .map(|i| (&scan.lines[i], texts.get(i).copied().unwrap_or("")));
    let next_first = next.and_then(|(l, _)| l.first.as_ref());
    let next_continues = next
        .and_then(|(l, text)| {
            if l.starts_in_literal {
                return None;
            }
            l.code_start.map(|start| continues(&text[start..]))
        })
        .unwrap_or(false);
    if next_first.is_some_and(|t| t.is_word("else")) {
        return false;
    }

    match &line.last {
        Some(Token::Punct(';')) => true,
        Some(Token::Punct('{')) => matches!(
            line.opened,
            Some(BraceKind::Block | BraceKind::FunctionBody)
        ),
        Some(Token::Punct('}')) => {
            !next_continues
                && !next_first.is_some_and(|t| {
                    t.is_word("catch") || t.is_word("finally") || t.is_word("while")
                })
        }
        Some(Token::Punct(')')) => !line.header_paren && !next_continues,
        Some(Token::Word(w)) => !CONTINUING_KEYWORDS.contains(&w.as_str()) && !next_continues,
        Some(Token::Punct(']')) | Some(Token::Literal) | Some(Token::Update) => !next_continues,
        _ => false,
    }
}

/// A `return`/`throw`/`break`/`continue` line at the start of a statement;
/// its hook goes before the jump so the line still shows up in the trace.
fn is_jump_line(scan: &Scan, texts: &[&str], index: usize) -> bool {
    let line = &scan.lines[index];
    let jumps = matches!(&line.first, Some(Token::Word(w)) if JUMP_KEYWORDS.contains(&w.as_str()));
    if !jumps || line.starts_in_literal || !line.start_scope.holds_statements() {
        return false;
    }
    match prev_code_line(scan, index) {
        None => true,
        Some(prev) => {
            let prev_line = &scan.lines[prev];
            ends_statement(scan, texts, prev)
                || (prev_line.last == Some(Token::Punct(':'))
                    && prev_line.end_scope == scanner::Scope::Brace(BraceKind::Switch))
        }
    }
}
