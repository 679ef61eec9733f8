use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::sync::Arc;

/// The lexical class of a token. The lexer never interprets keywords; the
/// parser decides what an identifier-class token means in context.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    /// A run of letters, digits, `_`, `.` and `-`: identifiers, dotted names and numbers.
    AlphaNumeric,
    /// A quoted literal, kept verbatim including its quotes and escapes.
    StringLiteral,
    /// Any other single non-whitespace character.
    Symbol,
    /// The content of a `//` comment or of one line of a `/* */` comment, without markers.
    Comment,
    /// A run of whitespace. Emitted so that positions stay exact; filtered by the cursor.
    Whitespace,
}

/// A token with its position. Identity is `(index, file)`, not the text.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub line: usize,
    pub column: usize,
    pub file: Arc<str>,
    pub kind: TokenKind,
    pub line_text: Arc<str>,
    pub index: usize,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.file == other.file
    }
}

impl Eq for Token {}

impl Token {
    /// True when this is a non-string token with exactly this text.
    pub fn is(&self, text: &str) -> bool {
        self.kind != TokenKind::StringLiteral && self.value == text
    }

    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.value)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
}

/// A line-oriented tokenizer. Tokens are produced lazily, one physical line at a time;
/// a `/* */` comment left open at the end of a line carries over to the next.
pub struct Lexer<'a> {
    lines: std::str::Lines<'a>,
    file: Arc<str>,
    line_number: usize,
    index: usize,
    in_block_comment: bool,
    pending: VecDeque<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file: &str) -> Self {
        Self {
            lines: input.lines(),
            file: Arc::from(file),
            line_number: 0,
            index: 0,
            in_block_comment: false,
            pending: VecDeque::new(),
        }
    }

    /// Tokenizes the whole input eagerly.
    pub fn lex(self) -> Vec<Token> {
        self.collect()
    }

    fn push(&mut self, kind: TokenKind, chars: &[char], start: usize, line_text: &Arc<str>) {
        self.pending.push_back(Token {
            value: chars.iter().collect(),
            line: self.line_number,
            column: start + 1,
            file: self.file.clone(),
            kind,
            line_text: line_text.clone(),
            index: self.index,
        });
        self.index += 1;
    }

    fn lex_line(&mut self, line: &str) {
        let line_text: Arc<str> = Arc::from(line);
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if self.in_block_comment {
                let close = (i..chars.len().saturating_sub(1))
                    .find(|&j| chars[j] == '*' && chars[j + 1] == '/');
                let end = close.unwrap_or(chars.len());
                if end > i {
                    self.push(TokenKind::Comment, &chars[i..end], i, &line_text);
                }
                match close {
                    Some(j) => {
                        self.in_block_comment = false;
                        i = j + 2;
                    }
                    None => i = chars.len(),
                }
                continue;
            }

            let c = chars[i];
            let next = chars.get(i + 1).copied();
            let start = i;
            if c.is_whitespace() {
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                self.push(TokenKind::Whitespace, &chars[start..i], start, &line_text);
            } else if c == '"' || c == '\'' {
                i += 1;
                let mut escaped = false;
                while i < chars.len() {
                    let ch = chars[i];
                    i += 1;
                    if escaped {
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == c {
                        break;
                    }
                }
                self.push(TokenKind::StringLiteral, &chars[start..i], start, &line_text);
            } else if c == '/' && next == Some('/') {
                self.push(TokenKind::Comment, &chars[i + 2..], i + 2, &line_text);
                i = chars.len();
            } else if c == '/' && next == Some('*') {
                self.in_block_comment = true;
                i += 2;
            } else if is_identifier_char(c) {
                while i < chars.len() && is_identifier_char(chars[i]) {
                    i += 1;
                }
                self.push(TokenKind::AlphaNumeric, &chars[start..i], start, &line_text);
            } else {
                i += 1;
                self.push(TokenKind::Symbol, &chars[start..i], start, &line_text);
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            let line = self.lines.next()?;
            self.line_number += 1;
            self.lex_line(line);
        }
    }
}
