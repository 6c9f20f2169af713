//! Entry function discovery.

use std::sync::LazyLock;

use codeflow_core::TraceError;
use regex::Regex;

use super::Entry;

static FUNCTION_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\b\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(").unwrap());

static BOUND_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^\w$.])([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:function\b|\([^()]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>)",
    )
    .unwrap()
});

static IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

/// A function declaration the wrapper can call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EntryPoint {
    pub name: String,
    pub line: u32,
    /// Brace depth of the declaration; 0 is top level.
    pub depth: usize,
    offset: usize,
}

/// All function declarations matched by the entry patterns, in source order.
pub(crate) fn declared_functions(masked: &str) -> Vec<EntryPoint> {
    let mut found: Vec<EntryPoint> = Vec::new();
    for regex in [&*FUNCTION_DECL, &*BOUND_FUNCTION] {
        for caps in regex.captures_iter(masked) {
            if let Some(name) = caps.get(1) {
                found.push(EntryPoint {
                    name: name.as_str().to_string(),
                    line: line_of(masked, name.start()),
                    depth: depth_at(masked, name.start()),
                    offset: name.start(),
                });
            }
        }
    }
    found.sort_by_key(|entry| entry.offset);
    found.dedup_by(|a, b| a.name == b.name && a.offset == b.offset);
    found
}

/// Resolves which function (if any) the wrapper should invoke.
pub(crate) fn resolve(masked: &str, entry: &Entry) -> Result<Option<EntryPoint>, TraceError> {
    match entry {
        Entry::Script => Ok(None),
        Entry::Named(name) => {
            if !IDENT.is_match(name) {
                return Err(TraceError::usage(format!(
                    "`{}` is not a valid function name",
                    name
                )));
            }
            declared_functions(masked)
                .into_iter()
                .find(|f| f.name == *name)
                .map(Some)
                .ok_or_else(|| {
                    TraceError::usage(format!("entry function `{}` not found in source", name))
                })
        }
        Entry::Discover => {
            let functions = declared_functions(masked);
            let top_level = functions.iter().find(|f| f.depth == 0).cloned();
            top_level
                .or_else(|| functions.into_iter().next())
                .map(Some)
                .ok_or_else(|| TraceError::usage("no function found to call"))
        }
    }
}

fn line_of(text: &str, offset: usize) -> u32 {
    text[..offset].matches('\n').count() as u32 + 1
}

fn depth_at(text: &str, offset: usize) -> usize {
    let mut depth = 0usize;
    for c in text[..offset].chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeflow_core::TraceErrorKind;

    const SOURCE: &str = "function helper(x) {\n  return x;\n}\nconst solve = (nums) => {\n  function inner() {}\n};\nlet twice = n => n * 2;";

    #[test]
    fn finds_every_declaration_form() {
        let names: Vec<String> = declared_functions(SOURCE)
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["helper", "solve", "inner", "twice"]);
    }

    #[test]
    fn named_entry_must_exist() {
        let found = resolve(SOURCE, &Entry::Named("solve".into())).unwrap().unwrap();
        assert_eq!(found.line, 4);

        let err = resolve(SOURCE, &Entry::Named("missing".into())).unwrap_err();
        assert_eq!(err.kind(), TraceErrorKind::Usage);
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn discovery_prefers_first_top_level_function() {
        let src = "{\n  function nested() {}\n}\nfunction main() {}";
        let found = resolve(src, &Entry::Discover).unwrap().unwrap();
        assert_eq!(found.name, "main");
        assert_eq!(found.depth, 0);
    }

    #[test]
    fn discovery_without_functions_is_a_usage_error() {
        let err = resolve("let x = 1;", &Entry::Discover).unwrap_err();
        assert_eq!(err.kind(), TraceErrorKind::Usage);
        assert!(resolve("let x = 1;", &Entry::Script).unwrap().is_none());
    }
}
