//! Tokenizer for the restricted dialect
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens so the parser never has to look at whitespace.

use crate::lang::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    False,
    None,
    True,
    And,
    As,
    Assert,
    Async,
    Await,
    Break,
    Class,
    Continue,
    Def,
    Del,
    Elif,
    Else,
    Except,
    Finally,
    For,
    From,
    Global,
    If,
    Import,
    In,
    Is,
    Lambda,
    Nonlocal,
    Not,
    Or,
    Pass,
    Raise,
    Return,
    Try,
    While,
    With,
    Yield,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        let kw = match ident {
            "False" => Self::False,
            "None" => Self::None,
            "True" => Self::True,
            "and" => Self::And,
            "as" => Self::As,
            "assert" => Self::Assert,
            "async" => Self::Async,
            "await" => Self::Await,
            "break" => Self::Break,
            "class" => Self::Class,
            "continue" => Self::Continue,
            "def" => Self::Def,
            "del" => Self::Del,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "except" => Self::Except,
            "finally" => Self::Finally,
            "for" => Self::For,
            "from" => Self::From,
            "global" => Self::Global,
            "if" => Self::If,
            "import" => Self::Import,
            "in" => Self::In,
            "is" => Self::Is,
            "lambda" => Self::Lambda,
            "nonlocal" => Self::Nonlocal,
            "not" => Self::Not,
            "or" => Self::Or,
            "pass" => Self::Pass,
            "raise" => Self::Raise,
            "return" => Self::Return,
            "try" => Self::Try,
            "while" => Self::While,
            "with" => Self::With,
            "yield" => Self::Yield,
            _ => return None,
        };
        Some(kw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::False => "False",
            Self::None => "None",
            Self::True => "True",
            Self::And => "and",
            Self::As => "as",
            Self::Assert => "assert",
            Self::Async => "async",
            Self::Await => "await",
            Self::Break => "break",
            Self::Class => "class",
            Self::Continue => "continue",
            Self::Def => "def",
            Self::Del => "del",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::Except => "except",
            Self::Finally => "finally",
            Self::For => "for",
            Self::From => "from",
            Self::Global => "global",
            Self::If => "if",
            Self::Import => "import",
            Self::In => "in",
            Self::Is => "is",
            Self::Lambda => "lambda",
            Self::Nonlocal => "nonlocal",
            Self::Not => "not",
            Self::Or => "or",
            Self::Pass => "pass",
            Self::Raise => "raise",
            Self::Return => "return",
            Self::Try => "try",
            Self::While => "while",
            Self::With => "with",
            Self::Yield => "yield",
        }
    }
}

/// Operators and delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,
    At,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    LShift,
    RShift,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtE,
    GtE,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DoubleSlashAssign,
    PercentAssign,
    DoubleStarAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    LShiftAssign,
    RShiftAssign,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Semicolon => ";",
            Self::At => "@",
            Self::Arrow => "->",
            Self::Assign => "=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::DoubleStar => "**",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Percent => "%",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtE => "<=",
            Self::GtE => ">=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::StarAssign => "*=",
            Self::SlashAssign => "/=",
            Self::DoubleSlashAssign => "//=",
            Self::PercentAssign => "%=",
            Self::DoubleStarAssign => "**=",
            Self::AmpAssign => "&=",
            Self::PipeAssign => "|=",
            Self::CaretAssign => "^=",
            Self::LShiftAssign => "<<=",
            Self::RShiftAssign => ">>=",
        }
    }
}

// Longest first so that `**=` wins over `**` and `*`.
const OPERATORS: &[(&str, Op)] = &[
    ("**=", Op::DoubleStarAssign),
    ("//=", Op::DoubleSlashAssign),
    ("<<=", Op::LShiftAssign),
    (">>=", Op::RShiftAssign),
    ("**", Op::DoubleStar),
    ("//", Op::DoubleSlash),
    ("<<", Op::LShift),
    (">>", Op::RShift),
    ("==", Op::Eq),
    ("!=", Op::NotEq),
    ("<=", Op::LtE),
    (">=", Op::GtE),
    ("->", Op::Arrow),
    ("+=", Op::PlusAssign),
    ("-=", Op::MinusAssign),
    ("*=", Op::StarAssign),
    ("/=", Op::SlashAssign),
    ("%=", Op::PercentAssign),
    ("&=", Op::AmpAssign),
    ("|=", Op::PipeAssign),
    ("^=", Op::CaretAssign),
    ("(", Op::LParen),
    (")", Op::RParen),
    ("[", Op::LBracket),
    ("]", Op::RBracket),
    ("{", Op::LBrace),
    ("}", Op::RBrace),
    (",", Op::Comma),
    (":", Op::Colon),
    (".", Op::Dot),
    (";", Op::Semicolon),
    ("@", Op::At),
    ("=", Op::Assign),
    ("+", Op::Plus),
    ("-", Op::Minus),
    ("*", Op::Star),
    ("/", Op::Slash),
    ("%", Op::Percent),
    ("&", Op::Amp),
    ("|", Op::Pipe),
    ("^", Op::Caret),
    ("~", Op::Tilde),
    ("<", Op::Lt),
    (">", Op::Gt),
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Keyword(Keyword),
    Int(i64),
    Float(f64),
    Str(String),
    /// Body of an f-string, escapes already processed
    FString(String),
    Op(Op),
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Name(name) => format!("name '{name}'"),
            Self::Keyword(kw) => format!("'{}'", kw.as_str()),
            Self::Int(_) | Self::Float(_) => "number".to_owned(),
            Self::Str(_) | Self::FString(_) => "string".to_owned(),
            Self::Op(op) => format!("'{}'", op.as_str()),
            Self::Newline => "end of line".to_owned(),
            Self::Indent => "indent".to_owned(),
            Self::Dedent => "dedent".to_owned(),
            Self::Eof => "end of input".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    indents: Vec<usize>,
    depth: usize,
    tokens: Vec<Token>,
}

/// Split source text into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
        indents: vec![0],
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::at(message, self.line, self.col)
    }

    fn push(&mut self, kind: TokenKind, line: u32, col: u32) {
        self.tokens.push(Token { kind, line, col });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent)
        )
    }

    fn run(&mut self) -> Result<(), CompileError> {
        let mut at_line_start = true;

        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.handle_indentation()? {
                    continue;
                }
            }

            let Some(c) = self.peek() else { break };
            let (line, col) = (self.line, self.col);

            match c {
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        if !self.last_is_newline() {
                            self.push(TokenKind::Newline, line, col);
                        }
                        at_line_start = true;
                    }
                }
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.peek() != Some('\n') {
                        return Err(self.error("unexpected character after line continuation"));
                    }
                    self.bump();
                }
                c if c.is_ascii_digit() => self.number(line, col)?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.number(line, col)?
                }
                '"' | '\'' => self.string(String::new(), line, col)?,
                c if is_ident_start(c) => self.identifier(line, col)?,
                _ => self.operator(line, col)?,
            }
        }

        if !self.last_is_newline() {
            self.push(TokenKind::Newline, self.line, self.col);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, self.line, self.col);
        }
        self.push(TokenKind::Eof, self.line, self.col);
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Measure leading whitespace and emit Indent/Dedent tokens.
    ///
    /// Returns true when the line turned out blank or comment-only.
    fn handle_indentation(&mut self) -> Result<bool, CompileError> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.bump();
        }

        match self.peek() {
            None | Some('\n') | Some('#') => return Ok(true),
            Some('\r') if self.peek_at(1) == Some('\n') => return Ok(true),
            _ => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent, self.line, 1);
        } else if width < current {
            while self.indents.last().copied().unwrap_or(0) > width {
                self.indents.pop();
                self.push(TokenKind::Dedent, self.line, 1);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn identifier(&mut self, line: u32, col: u32) -> Result<(), CompileError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let ident: String = self.chars[start..self.pos].iter().collect();

        // String prefixes: r, f, rf, fr (any case)
        if matches!(self.peek(), Some('"') | Some('\'')) {
            let lower = ident.to_ascii_lowercase();
            if matches!(lower.as_str(), "r" | "f" | "rf" | "fr") {
                return self.string(lower, line, col);
            }
            if matches!(lower.as_str(), "b" | "br" | "rb" | "u") {
                return Err(CompileError::at(
                    format!("'{ident}' string prefix is not supported"),
                    line,
                    col,
                ));
            }
        }

        let kind = match Keyword::from_ident(&ident) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Name(ident),
        };
        self.push(kind, line, col);
        Ok(())
    }

    fn number(&mut self, line: u32, col: u32) -> Result<(), CompileError> {
        let start = self.pos;

        if self.peek() == Some('0')
            && let Some(radix_char) = self.peek_at(1)
        {
            let radix = match radix_char {
                'x' | 'X' => Some(16),
                'o' | 'O' => Some(8),
                'b' | 'B' => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let digits_start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    self.bump();
                }
                let digits: String = self.chars[digits_start..self.pos]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                let value = i64::from_str_radix(&digits, radix).map_err(|_| {
                    CompileError::at("invalid or too large integer literal", line, col)
                })?;
                self.push(TokenKind::Int(value), line, col);
                return Ok(());
            }
        }

        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign_offset = usize::from(matches!(self.peek_at(1), Some('+') | Some('-')));
            if self
                .peek_at(1 + sign_offset)
                .is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                self.bump();
                if sign_offset == 1 {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        if matches!(self.peek(), Some('j') | Some('J')) {
            return Err(self.error("complex numbers are not supported"));
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("invalid decimal literal"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let kind = if is_float {
            TokenKind::Float(
                text.parse()
                    .map_err(|_| CompileError::at("invalid float literal", line, col))?,
            )
        } else {
            TokenKind::Int(text.parse().map_err(|_| {
                CompileError::at("integer literal is too large", line, col)
            })?)
        };
        self.push(kind, line, col);
        Ok(())
    }

    fn string(&mut self, prefix: String, line: u32, col: u32) -> Result<(), CompileError> {
        let raw = prefix.contains('r');
        let formatted = prefix.contains('f');
        let Some(quote) = self.bump() else {
            return Err(self.error("unterminated string literal"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(CompileError::at("unterminated string literal", line, col));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.bump();
                    self.bump();
                    break;
                }
                value.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(CompileError::at("unterminated string literal", line, col));
            }
            if c == '\\' {
                let Some(next) = self.bump() else {
                    return Err(CompileError::at("unterminated string literal", line, col));
                };
                if raw {
                    value.push('\\');
                    value.push(next);
                    continue;
                }
                self.escape(next, &mut value)?;
                continue;
            }
            value.push(c);
        }

        let kind = if formatted {
            TokenKind::FString(value)
        } else {
            TokenKind::Str(value)
        };
        self.push(kind, line, col);
        Ok(())
    }

    fn escape(&mut self, c: char, out: &mut String) -> Result<(), CompileError> {
        match c {
            '\n' => {}
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => out.push(self.hex_escape(2)?),
            'u' => out.push(self.hex_escape(4)?),
            'U' => out.push(self.hex_escape(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, CompileError> {
        let mut code = 0u32;
        for _ in 0..len {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("truncated escape sequence"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid character in escape sequence"))
    }

    fn operator(&mut self, line: u32, col: u32) -> Result<(), CompileError> {
        for (text, op) in OPERATORS {
            let matches = text
                .chars()
                .enumerate()
                .all(|(i, expected)| self.peek_at(i) == Some(expected));
            if matches {
                for _ in 0..text.len() {
                    self.bump();
                }
                match op {
                    Op::LParen | Op::LBracket | Op::LBrace => self.depth += 1,
                    Op::RParen | Op::RBracket | Op::RBrace => {
                        self.depth = self.depth.saturating_sub(1)
                    }
                    _ => {}
                }
                self.push(TokenKind::Op(*op), line, col);
                return Ok(());
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(CompileError::at(
            format!("invalid character '{c}'"),
            line,
            col,
        ))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn simple_call() {
        assert_eq!(
            kinds("print(2 + 2)"),
            vec![
                TokenKind::Name("print".into()),
                TokenKind::Op(Op::LParen),
                TokenKind::Int(2),
                TokenKind::Op(Op::Plus),
                TokenKind::Int(2),
                TokenKind::Op(Op::RParen),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_blocks() {
        let tokens = kinds("if x:\n    y\nz\n");
        assert!(tokens.contains(&TokenKind::Indent));
        assert!(tokens.contains(&TokenKind::Dedent));
        let indent = tokens.iter().position(|t| *t == TokenKind::Indent).unwrap();
        let dedent = tokens.iter().position(|t| *t == TokenKind::Dedent).unwrap();
        assert!(indent < dedent);
    }

    #[test]
    fn blank_and_comment_lines_do_not_change_indentation() {
        let tokens = kinds("if x:\n    a\n\n    # note\n    b\n");
        assert_eq!(
            tokens.iter().filter(|t| **t == TokenKind::Indent).count(),
            1
        );
    }

    #[test]
    fn inconsistent_dedent_is_rejected() {
        let err = tokenize("if x:\n    a\n  b\n").unwrap_err();
        assert!(err.message.contains("unindent"));
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let tokens = kinds("x = [1,\n 2]\n");
        assert_eq!(
            tokens.iter().filter(|t| **t == TokenKind::Newline).count(),
            1
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("0x1f")[0], TokenKind::Int(31));
        assert_eq!(kinds("0b101")[0], TokenKind::Int(5));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("1.5")[0], TokenKind::Float(1.5));
        assert_eq!(kinds("2e3")[0], TokenKind::Float(2000.0));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
    }

    #[test]
    fn huge_integer_literal_is_rejected() {
        assert!(tokenize("99999999999999999999999").is_err());
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(kinds(r#"'a\tb'"#)[0], TokenKind::Str("a\tb".into()));
        assert_eq!(kinds(r#"r'a\tb'"#)[0], TokenKind::Str("a\\tb".into()));
        assert_eq!(kinds("'''x\ny'''")[0], TokenKind::Str("x\ny".into()));
        assert_eq!(kinds("f'{x}'")[0], TokenKind::FString("{x}".into()));
        assert_eq!(kinds(r#""\x41\u00e9""#)[0], TokenKind::Str("Aé".into()));
    }

    #[test]
    fn unterminated_string_reports_start() {
        let err = tokenize("x = 'abc").unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.line, Some(1));
        assert_eq!(err.col, Some(5));
    }

    #[test]
    fn keywords_are_recognised() {
        assert_eq!(kinds("while")[0], TokenKind::Keyword(Keyword::While));
        assert_eq!(kinds("whilex")[0], TokenKind::Name("whilex".into()));
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(kinds("a **= 2")[1], TokenKind::Op(Op::DoubleStarAssign));
        assert_eq!(kinds("a // 2")[1], TokenKind::Op(Op::DoubleSlash));
    }

    #[test]
    fn invalid_character() {
        let err = tokenize("x = $").unwrap_err();
        assert!(err.message.contains('$'));
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn tokenize_never_panics(source in "\\PC{0,200}") {
            let _ = tokenize(&source);
        }

        #[test]
        fn tokenize_is_deterministic(source in "[a-z0-9 +*()\\n:=\\-]{0,80}") {
            let first = tokenize(&source);
            let second = tokenize(&source);
            prop_assert_eq!(first, second);
        }
    }
}
