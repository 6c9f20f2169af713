//! Line-oriented lexical scan of JavaScript source.
//!
//! This is not a parser. It tracks just enough (literals, comments, bracket
//! nesting and what kind of block each `{` opens) to decide, per physical
//! line, whether a statement may be appended after the last token without
//! changing what the line means.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Word(String),
    Punct(char),
    Arrow,
    /// `++` or `--`.
    Update,
    /// Number, string, template or regex literal.
    Literal,
}

impl Token {
    pub(crate) fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Word(w) if w == word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BraceKind {
    Block,
    FunctionBody,
    Object,
    Class,
    Switch,
    TemplateExpr,
}

/// Innermost container at some point of the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Scope {
    #[default]
    Top,
    Brace(BraceKind),
    Paren,
    Square,
    Template,
}

impl Scope {
    /// Whether statements can appear directly in this scope.
    pub(crate) fn holds_statements(self) -> bool {
        matches!(
            self,
            Scope::Top
                | Scope::Brace(BraceKind::Block | BraceKind::FunctionBody | BraceKind::Switch)
        )
    }
}

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "with", "catch", "switch"];

const REGEX_AFTER_WORDS: &[&str] = &[
    "return",
    "typeof",
    "case",
    "do",
    "else",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "instanceof",
    "yield",
    "await",
];

#[derive(Debug, Clone, Default)]
struct Paren {
    keyword: Option<String>,
    callee: Option<String>,
    signature: bool,
}

#[derive(Debug, Clone)]
enum Container {
    Paren(Paren),
    Square,
    Brace(BraceKind),
    /// Template literal; holds the byte offset of its opening backtick.
    Template(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    BlockComment,
    Str(char),
    TemplateText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FunctionOpen {
    /// Byte offset within the line just past the `{`.
    pub offset: usize,
    pub name: String,
}

/// What the scanner learned about one physical line. Offsets are bytes
/// relative to the start of the line.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineScan {
    pub code_start: Option<usize>,
    pub code_end: Option<usize>,
    pub first: Option<Token>,
    pub last: Option<Token>,
    pub starts_in_literal: bool,
    pub ends_in_literal: bool,
    pub start_scope: Scope,
    pub end_scope: Scope,
    /// Kind of brace opened by the last token, when it is `{`.
    pub opened: Option<BraceKind>,
    /// The last token is a `)` closing a control header or a function
    /// signature, so the statement continues.
    pub header_paren: bool,
    pub function_opens: Vec<FunctionOpen>,
    /// Offsets just past each `{` that opens a statement block.
    pub block_opens: Vec<usize>,
    /// Offsets of the `}` closing function bodies.
    pub function_closes: Vec<usize>,
}

impl LineScan {
    pub(crate) fn has_code(&self) -> bool {
        self.code_end.is_some()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Scan {
    pub lines: Vec<LineScan>,
    /// The source with comments and literal contents blanked out. Line
    /// breaks are preserved.
    pub masked: String,
}

pub(crate) fn scan(source: &str) -> Scan {
    Scanner::new(source).run()
}

struct Scanner<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    masked: Vec<char>,
    pos: usize,
    line_start: usize,
    mode: Mode,
    string_start: usize,
    continued: bool,
    stack: Vec<Container>,
    history: Vec<Token>,
    last_paren: Option<Paren>,
    class_pending: bool,
    pending_name: Option<String>,
    lines: Vec<LineScan>,
    current: LineScan,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        let chars: Vec<(usize, char)> = src.char_indices().collect();
        let masked = chars.iter().map(|&(_, c)| c).collect();
        Scanner {
            src,
            chars,
            masked,
            pos: 0,
            line_start: 0,
            mode: Mode::Code,
            string_start: 0,
            continued: false,
            stack: Vec::new(),
            history: Vec::new(),
            last_paren: None,
            class_pending: false,
            pending_name: None,
            lines: Vec::new(),
            current: LineScan::default(),
        }
    }

    fn run(mut self) -> Scan {
        while let Some(&(offset, c)) = self.chars.get(self.pos) {
            if c == '\n' {
                self.end_line(offset);
                self.pos += 1;
                continue;
            }
            match self.mode {
                Mode::Code => self.code(offset, c),
                Mode::BlockComment => {
                    self.blank(self.pos);
                    if c == '*' && self.peek(1) == Some('/') {
                        self.blank(self.pos + 1);
                        self.mode = Mode::Code;
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                }
                Mode::Str(quote) => {
                    self.blank(self.pos);
                    if c == '\\' {
                        if self.peek(1) == Some('\n') {
                            self.continued = true;
                            self.pos += 1;
                        } else {
                            self.blank(self.pos + 1);
                            self.pos += 2;
                        }
                    } else if c == quote {
                        self.mode = Mode::Code;
                        self.pos += 1;
                        self.push(Token::Literal, self.string_start, offset + 1);
                    } else {
                        self.pos += 1;
                    }
                }
                Mode::TemplateText => self.template_text(offset, c),
            }
        }
        let end = self.src.len();
        self.end_line(end);
        Scan {
            lines: self.lines,
            masked: self.masked.into_iter().collect(),
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn blank(&mut self, index: usize) {
        if let Some(c) = self.masked.get_mut(index) {
            if *c != '\n' {
                *c = ' ';
            }
        }
    }

    fn byte_at(&self, index: usize) -> usize {
        self.chars
            .get(index)
            .map(|&(offset, _)| offset)
            .unwrap_or(self.src.len())
    }

    fn prev(&self) -> Option<&Token> {
        self.history.last()
    }

    fn scope(&self) -> Scope {
        match self.stack.last() {
            None => Scope::Top,
            Some(Container::Paren(_)) => Scope::Paren,
            Some(Container::Square) => Scope::Square,
            Some(Container::Brace(kind)) => Scope::Brace(*kind),
            Some(Container::Template(_)) => Scope::Template,
        }
    }

    fn end_line(&mut self, newline: usize) {
        let mut line = std::mem::take(&mut self.current);
        line.ends_in_literal = self.mode != Mode::Code;
        line.end_scope = self.scope();
        self.lines.push(line);

        if let Mode::Str(_) = self.mode {
            if !self.continued {
                // Unterminated string; resynchronize on the next line.
                self.mode = Mode::Code;
            }
        }
        self.continued = false;
        self.line_start = newline + 1;
        self.current.starts_in_literal = self.mode != Mode::Code;
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        if start >= self.line_start && self.current.first.is_none() {
            self.current.first = Some(token.clone());
            self.current.code_start = Some(start - self.line_start);
            self.current.start_scope = self.scope();
        }
        self.current.code_end = Some(end.saturating_sub(self.line_start));
        self.current.last = Some(token.clone());
        self.current.header_paren = false;
        self.current.opened = None;

        match &token {
            Token::Punct(';') => self.pending_name = None,
            Token::Punct('=') | Token::Punct(':') => {
                if let Some(Token::Word(word)) = self.prev() {
                    self.pending_name = Some(word.clone());
                }
            }
            _ => {}
        }

        self.history.push(token);
        if self.history.len() > 3 {
            self.history.remove(0);
        }
    }

    fn code(&mut self, offset: usize, c: char) {
        match c {
            c if c.is_whitespace() => self.pos += 1,
            '/' if self.peek(1) == Some('/') => {
                while let Some(&(_, c)) = self.chars.get(self.pos) {
                    if c == '\n' {
                        break;
                    }
                    self.blank(self.pos);
                    self.pos += 1;
                }
            }
            '/' if self.peek(1) == Some('*') => {
                self.blank(self.pos);
                self.blank(self.pos + 1);
                self.mode = Mode::BlockComment;
                self.pos += 2;
            }
            '/' if self.regex_allowed() => self.regex(offset),
            '\'' | '"' => {
                self.blank(self.pos);
                self.string_start = offset;
                self.mode = Mode::Str(c);
                self.pos += 1;
            }
            '`' => {
                self.blank(self.pos);
                self.stack.push(Container::Template(offset));
                self.mode = Mode::TemplateText;
                self.pos += 1;
            }
            c if is_ident_start(c) => {
                while self.peek(0).is_some_and(is_ident_part) {
                    self.pos += 1;
                }
                let end = self.byte_at(self.pos);
                let word = self.src[offset..end].to_string();
                if word == "class" {
                    self.class_pending = true;
                }
                self.push(Token::Word(word), offset, end);
            }
            c if c.is_ascii_digit()
                || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                self.pos += 1;
                while self
                    .peek(0)
                    .is_some_and(|n| n.is_ascii_alphanumeric() || n == '_' || n == '.')
                {
                    self.pos += 1;
                }
                let end = self.byte_at(self.pos);
                self.push(Token::Literal, offset, end);
            }
            '(' => self.open_paren(offset),
            ')' => {
                self.pos += 1;
                let paren = self.pop_to(|c| matches!(c, Container::Paren(_)));
                self.push(Token::Punct(')'), offset, offset + 1);
                self.last_paren = match paren {
                    Some(Container::Paren(paren)) => Some(paren),
                    _ => None,
                };
                self.current.header_paren = self
                    .last_paren
                    .as_ref()
                    .is_some_and(|p| p.keyword.is_some() || p.signature);
            }
            '[' => {
                self.pos += 1;
                self.push(Token::Punct('['), offset, offset + 1);
                self.stack.push(Container::Square);
            }
            ']' => {
                self.pos += 1;
                self.pop_to(|c| matches!(c, Container::Square));
                self.push(Token::Punct(']'), offset, offset + 1);
            }
            '{' => self.open_brace(offset),
            '}' => self.close_brace(offset),
            '=' if self.peek(1) == Some('>') => {
                self.pos += 2;
                self.push(Token::Arrow, offset, offset + 2);
            }
            '+' | '-' if self.peek(1) == Some(c) => {
                self.pos += 2;
                self.push(Token::Update, offset, offset + 2);
            }
            _ => {
                self.pos += 1;
                let end = self.byte_at(self.pos);
                self.push(Token::Punct(c), offset, end);
            }
        }
    }

    fn template_text(&mut self, offset: usize, c: char) {
        match c {
            '\\' => {
                self.blank(self.pos);
                if self.peek(1) == Some('\n') {
                    self.pos += 1;
                } else {
                    self.blank(self.pos + 1);
                    self.pos += 2;
                }
            }
            '`' => {
                self.blank(self.pos);
                self.pos += 1;
                let start = match self.pop_to(|c| matches!(c, Container::Template(_))) {
                    Some(Container::Template(start)) => start,
                    _ => offset,
                };
                self.mode = Mode::Code;
                self.push(Token::Literal, start, offset + 1);
            }
            '$' if self.peek(1) == Some('{') => {
                self.blank(self.pos);
                self.blank(self.pos + 1);
                self.pos += 2;
                self.stack.push(Container::Brace(BraceKind::TemplateExpr));
                self.mode = Mode::Code;
            }
            _ => {
                self.blank(self.pos);
                self.pos += 1;
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        match self.prev() {
            None | Some(Token::Arrow) => true,
            Some(Token::Punct(c)) => !matches!(c, ')' | ']' | '}'),
            Some(Token::Word(w)) => REGEX_AFTER_WORDS.contains(&w.as_str()),
            Some(Token::Update) | Some(Token::Literal) => false,
        }
    }

    fn regex(&mut self, offset: usize) {
        let start = self.pos;
        let mut index = self.pos + 1;
        let mut in_class = false;
        loop {
            let c = self.chars.get(index).map(|&(_, c)| c);
            let escaped = self.chars.get(index + 1).map(|&(_, c)| c);
            match c {
                None | Some('\n') => {
                    // Not a regex after all; treat the slash as division.
                    self.pos += 1;
                    self.push(Token::Punct('/'), offset, offset + 1);
                    return;
                }
                Some('\\') if !matches!(escaped, None | Some('\n')) => index += 2,
                Some('\\') => index += 1,
                Some('[') => {
                    in_class = true;
                    index += 1;
                }
                Some(']') => {
                    in_class = false;
                    index += 1;
                }
                Some('/') if !in_class => {
                    index += 1;
                    break;
                }
                Some(_) => index += 1,
            }
        }
        while self
            .chars
            .get(index)
            .is_some_and(|&(_, c)| c.is_ascii_alphabetic())
        {
            index += 1;
        }
        for i in start..index {
            self.blank(i);
        }
        self.pos = index;
        let end = self.byte_at(index);
        self.push(Token::Literal, offset, end);
    }

    fn open_paren(&mut self, offset: usize) {
        let keyword = match self.prev() {
            Some(Token::Word(w)) if CONTROL_KEYWORDS.contains(&w.as_str()) => Some(w.clone()),
            _ => None,
        };
        let callee = match self.prev() {
            Some(Token::Word(w)) if keyword.is_none() => Some(w.clone()),
            _ => None,
        };
        let signature = self.history.iter().any(|t| t.is_word("function"))
            || self.scope() == Scope::Brace(BraceKind::Class);
        let keeps_name = match self.prev() {
            Some(Token::Punct('=' | ':' | '*')) => true,
            Some(Token::Word(w)) => w == "async" || w == "function",
            _ => false,
        };
        if !keeps_name && callee.as_deref() != Some("function") {
            self.pending_name = None;
        }

        self.pos += 1;
        self.push(Token::Punct('('), offset, offset + 1);
        self.stack.push(Container::Paren(Paren {
            keyword,
            callee,
            signature,
        }));
    }

    fn brace_kind(&self) -> BraceKind {
        if self.class_pending {
            return BraceKind::Class;
        }
        match self.prev() {
            Some(Token::Punct(')')) => {
                match self.last_paren.as_ref().and_then(|p| p.keyword.as_deref()) {
                    Some("switch") => BraceKind::Switch,
                    Some(_) => BraceKind::Block,
                    None => BraceKind::FunctionBody,
                }
            }
            Some(Token::Arrow) => BraceKind::FunctionBody,
            Some(Token::Word(w))
                if matches!(w.as_str(), "else" | "try" | "finally" | "do" | "catch") =>
            {
                BraceKind::Block
            }
            None | Some(Token::Punct(';' | '{' | '}')) => BraceKind::Block,
            Some(Token::Punct(':')) => match self.scope() {
                Scope::Brace(BraceKind::Switch) => BraceKind::Block,
                _ => BraceKind::Object,
            },
            _ => BraceKind::Object,
        }
    }

    fn function_name(&mut self) -> String {
        let from_callee = match self.prev() {
            Some(Token::Punct(')')) => self
                .last_paren
                .as_ref()
                .and_then(|p| p.callee.clone())
                .filter(|name| name != "function" && name != "async"),
            _ => None,
        };
        let name = from_callee.or_else(|| self.pending_name.take());
        self.pending_name = None;
        name.unwrap_or_else(|| "anonymous".to_string())
    }

    fn open_brace(&mut self, offset: usize) {
        let kind = self.brace_kind();
        let statement_block = kind == BraceKind::Block && self.scope().holds_statements();
        self.class_pending = false;
        let name = if kind == BraceKind::FunctionBody {
            Some(self.function_name())
        } else {
            None
        };

        self.pos += 1;
        self.push(Token::Punct('{'), offset, offset + 1);
        if let Some(name) = name {
            self.current.function_opens.push(FunctionOpen {
                offset: offset + 1 - self.line_start,
                name,
            });
        }
        if statement_block {
            self.current.block_opens.push(offset + 1 - self.line_start);
        }
        self.stack.push(Container::Brace(kind));
        self.current.opened = Some(kind);
    }

    fn close_brace(&mut self, offset: usize) {
        self.pos += 1;
        let kind = match self.pop_to(|c| matches!(c, Container::Brace(_))) {
            Some(Container::Brace(kind)) => Some(kind),
            _ => None,
        };
        match kind {
            Some(BraceKind::TemplateExpr) => {
                self.blank(self.pos - 1);
                self.mode = Mode::TemplateText;
                return;
            }
            Some(BraceKind::FunctionBody) => {
                self.current
                    .function_closes
                    .push(offset - self.line_start);
            }
            _ => {}
        }
        self.pending_name = None;
        self.push(Token::Punct('}'), offset, offset + 1);
    }

    /// Pops up to and including the innermost container matching `pred`.
    /// Leaves the stack alone when nothing matches.
    fn pop_to(&mut self, pred: impl Fn(&Container) -> bool) -> Option<Container> {
        let index = self.stack.iter().rposition(pred)?;
        let container = self.stack.get(index).cloned();
        self.stack.truncate(index);
        container
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &str) -> Vec<LineScan> {
        scan(src).lines
    }

    #[test]
    fn one_scan_per_physical_line() {
        assert_eq!(lines("a\nb\n\nc").len(), 4);
        assert_eq!(lines("").len(), 1);
    }

    #[test]
    fn classifies_braces() {
        let src = "function f(a) {\n  if (a) {\n    const o = {\n      k: 1,\n    };\n  }\n}";
        let scans = lines(src);
        assert_eq!(scans[0].opened, Some(BraceKind::FunctionBody));
        assert_eq!(scans[0].function_opens[0].name, "f");
        assert_eq!(scans[1].opened, Some(BraceKind::Block));
        assert_eq!(scans[2].opened, Some(BraceKind::Object));
        assert_eq!(scans[3].end_scope, Scope::Brace(BraceKind::Object));
        assert_eq!(scans[6].function_closes, vec![0]);
        assert_eq!(scans[6].end_scope, Scope::Top);
    }

    #[test]
    fn statement_blocks_are_located() {
        let scans = lines("while (true) { n++; }\nconst o = { k: 1 };\nif (a) { b(); } else { c(); }");
        assert_eq!(scans[0].block_opens, vec![14]);
        assert!(scans[1].block_opens.is_empty());
        assert_eq!(scans[2].block_opens, vec![8, 22]);

        let scans = lines("f();\nconst s = `${{ a: 1 }.a}`;");
        assert!(scans[1].block_opens.is_empty());
    }

    #[test]
    fn names_arrow_and_expression_functions() {
        let scans = lines("const add = (a, b) => {\n};\nlet g = function (x) {\n};");
        assert_eq!(scans[0].function_opens[0].name, "add");
        assert_eq!(scans[2].function_opens[0].name, "g");

        let scans = lines("xs.forEach((x) => {\n});");
        assert_eq!(scans[0].function_opens[0].name, "anonymous");
    }

    #[test]
    fn class_bodies_and_methods() {
        let scans = lines("class Stack {\n  push(x) {\n    this.items.push(x);\n  }\n}");
        assert_eq!(scans[0].opened, Some(BraceKind::Class));
        assert_eq!(scans[1].function_opens[0].name, "push");
        assert_eq!(scans[3].end_scope, Scope::Brace(BraceKind::Class));
    }

    #[test]
    fn literals_hide_brackets() {
        let scans = lines("const s = \"{ ( [\";\nconst t = '}';\n// }\nconst r = /[}]/g;");
        for scan in &scans {
            assert_eq!(scan.end_scope, Scope::Top);
        }
        assert_eq!(scans[3].last, Some(Token::Punct(';')));
    }

    #[test]
    fn multiline_template_and_comment() {
        let scans = lines("const t = `a\n${x + 1}\nb`;\n/* one\ntwo */ x = 1;");
        assert!(scans[0].ends_in_literal);
        assert!(scans[1].starts_in_literal);
        assert!(scans[1].ends_in_literal);
        assert!(!scans[2].ends_in_literal);
        assert_eq!(scans[2].last, Some(Token::Punct(';')));
        assert!(scans[3].ends_in_literal);
        assert_eq!(scans[4].last, Some(Token::Punct(';')));
    }

    #[test]
    fn template_expression_is_code() {
        let scan = scan("const t = `${ {a: 1}.a }`;");
        assert_eq!(scan.lines[0].end_scope, Scope::Top);
        assert!(scan.masked.contains("a: 1"));
    }

    #[test]
    fn header_parens_are_flagged() {
        let scans = lines("if (x)\n  y();\nfoo(x)\nfor (;;)");
        assert!(scans[0].header_paren);
        assert!(!scans[2].header_paren);
        assert!(scans[3].header_paren);
    }

    #[test]
    fn division_is_not_regex() {
        let scans = lines("const half = total / 2;\nconst q = (a) / (b) / 2;");
        assert_eq!(scans[0].last, Some(Token::Punct(';')));
        assert_eq!(scans[1].last, Some(Token::Punct(';')));
    }

    #[test]
    fn masks_comments_and_strings() {
        let scan = scan("let a = 'let b'; // let c\nconst d = 1;");
        assert!(scan.masked.contains("let a"));
        assert!(!scan.masked.contains("let b"));
        assert!(!scan.masked.contains("let c"));
        assert_eq!(scan.masked.lines().count(), 2);
    }

    #[test]
    fn switch_cases() {
        let scans = lines("switch (k) {\n  case 1: {\n    x = 1;\n  }\n}");
        assert_eq!(scans[0].opened, Some(BraceKind::Switch));
        assert_eq!(scans[1].opened, Some(BraceKind::Block));
    }
}
