//! Candidate variable discovery.
//!
//! Collects every name a snapshot should try to read: function parameters and
//! `var`/`let`/`const` targets anywhere in the source. There is no scope
//! resolution; a name that is not visible at a given line simply fails to
//! evaluate there and is skipped.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

static DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:var|let|const)\s+").unwrap());

static FUNCTION_PARAMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfunction\b\s*\*?\s*(?:[A-Za-z_$][\w$]*)?\s*\(([^()]*)\)").unwrap()
});

static ARROW_PARAMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]*)\)\s*=>").unwrap());

static ARROW_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w$.])([A-Za-z_$][\w$]*)\s*=>").unwrap());

static CATCH_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bcatch\s*\(\s*([A-Za-z_$][\w$]*)\s*\)").unwrap());

static IDENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

const RESERVED: &[&str] = &[
    "arguments", "async", "await", "break", "case", "catch", "class", "const", "continue",
    "debugger", "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false",
    "finally", "for", "function", "if", "implements", "import", "in", "instanceof", "interface",
    "let", "new", "null", "of", "package", "private", "protected", "public", "return", "static",
    "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with", "yield",
];

/// Candidate names in order of first appearance. `masked` is the source with
/// comments and literals blanked out.
pub(crate) fn candidate_names(masked: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for caps in FUNCTION_PARAMS.captures_iter(masked) {
        if let Some(params) = caps.get(1) {
            for name in parameter_names(params.as_str()) {
                found.push((params.start(), name));
            }
        }
    }
    for caps in ARROW_PARAMS.captures_iter(masked) {
        if let Some(params) = caps.get(1) {
            for name in parameter_names(params.as_str()) {
                found.push((params.start(), name));
            }
        }
    }
    for regex in [&*ARROW_SINGLE, &*CATCH_PARAM] {
        for caps in regex.captures_iter(masked) {
            if let Some(name) = caps.get(1) {
                found.push((name.start(), name.as_str().to_string()));
            }
        }
    }
    for m in DECLARATION.find_iter(masked) {
        for name in declarators(&masked[m.end()..]) {
            found.push((m.end(), name));
        }
    }

    found.sort_by_key(|(offset, _)| *offset);
    let names: IndexSet<String> = found
        .into_iter()
        .map(|(_, name)| name)
        .filter(|name| is_candidate(name))
        .collect();
    names.into_iter().collect()
}

fn is_candidate(name: &str) -> bool {
    IDENT.is_match(name) && !name.starts_with("__") && !RESERVED.contains(&name)
}

fn parameter_names(params: &str) -> Vec<String> {
    let mut names = Vec::new();
    for element in split_top_level(params) {
        binding_names(element, &mut names);
    }
    names
}

/// Names bound by one element of a parameter list or destructuring pattern
/// (`a`, `a = 1`, `...rest`, `{ x, y: z }`, `[first, , third]`).
fn binding_names(element: &str, names: &mut Vec<String>) {
    let element = strip_default(element.trim());
    let element = element.strip_prefix("...").unwrap_or(element).trim();
    if let Some(inner) = element.strip_prefix('{').and_then(|e| e.strip_suffix('}')) {
        for property in split_top_level(inner) {
            let property = strip_default(property.trim());
            let target = match find_top_level(property, ':') {
                Some(colon) => &property[colon + 1..],
                None => property,
            };
            binding_names(target, names);
        }
    } else if let Some(inner) = element.strip_prefix('[').and_then(|e| e.strip_suffix(']')) {
        for item in split_top_level(inner) {
            binding_names(item, names);
        }
    } else if !element.is_empty() {
        names.push(element.to_string());
    }
}

/// Declarator targets following a `var`/`let`/`const` keyword.
fn declarators(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        let Some((pattern, after)) = take_binding(rest) else {
            break;
        };
        binding_names(pattern, &mut names);
        rest = after.trim_start_matches([' ', '\t']);
        if rest.starts_with('=') && !rest.starts_with("==") {
            rest = skip_initializer(&rest[1..]);
        }
        match rest.strip_prefix(',') {
            Some(after_comma) => rest = after_comma,
            None => break,
        }
    }
    names
}

fn take_binding(text: &str) -> Option<(&str, &str)> {
    let first = text.chars().next()?;
    if first == '{' || first == '[' {
        let end = matching_close(text)?;
        return Some((&text[..=end], &text[end + 1..]));
    }
    if first == '_' || first == '$' || first.is_alphabetic() {
        let end = text
            .find(|c: char| !(c == '_' || c == '$' || c.is_alphanumeric()))
            .unwrap_or(text.len());
        return Some((&text[..end], &text[end..]));
    }
    None
}

/// Skips an initializer expression, stopping before a top-level `,` or `;`,
/// a line break at depth zero, or a closing bracket that belongs to an
/// enclosing `for (...)` header.
fn skip_initializer(text: &str) -> &str {
    let mut depth = 0i32;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                if depth == 0 {
                    return &text[index..];
                }
                depth -= 1;
            }
            ',' | ';' | '\n' if depth == 0 => return &text[index..],
            _ => {}
        }
    }
    ""
}

fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_default(element: &str) -> &str {
    match find_top_level(element, '=') {
        Some(eq) => element[..eq].trim(),
        None => element,
    }
}

fn find_top_level(text: &str, needle: char) -> Option<usize> {
    let mut depth = 0i32;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == needle && depth == 0 => return Some(index),
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (index, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_params_and_declarations_in_order() {
        let src = "function twoSum(nums, target) {\n  const seen = new Map();\n  for (let i = 0; i < nums.length; i++) {\n    const need = target - nums[i];\n  }\n}";
        assert_eq!(
            candidate_names(src),
            vec!["nums", "target", "seen", "i", "need"]
        );
    }

    #[test]
    fn multiple_declarators_and_destructuring() {
        let src = "let lo = 0, hi = xs.length - 1;\nconst { a, b: renamed, ...others } = obj;\nconst [first, , third = 3] = list;";
        assert_eq!(
            candidate_names(src),
            vec!["lo", "hi", "a", "renamed", "others", "first", "third"]
        );
    }

    #[test]
    fn arrow_and_default_params() {
        let src = "const add = (x, y = 2) => x + y;\nitems.map(item => item * 2);\nfunction f(a, { depth } = {}, ...rest) {}";
        assert_eq!(
            candidate_names(src),
            vec!["add", "x", "y", "item", "a", "depth", "rest"]
        );
    }

    #[test]
    fn for_of_targets() {
        assert_eq!(
            candidate_names("for (const [k, v] of entries) {}\nfor (let x of xs) {}"),
            vec!["k", "v", "x"]
        );
    }

    #[test]
    fn deduplicates_and_skips_internal_names() {
        let src = "let x = 1;\nlet x2 = 2;\nvar x = 3;\nlet __cf_v = 0;\ncatch (err) {}";
        assert_eq!(candidate_names(src), vec!["x", "x2", "err"]);
    }
}
