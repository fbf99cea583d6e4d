// ast.rs
//
// This file defines the source-level data structures shared by the tokenizer,
// the syntax parser and the assembler: locations, tokens, and tokenized files.
//
// The assembler never looks at raw text. Each source file arrives as an ordered
// list of already-tokenized lines, and every token remembers where it came from
// so diagnostics can point back at the exact file, line and column.

use std::fmt;

// ==============================================================================
// Source Locations
// ==============================================================================

/// A position in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location { file: file.into(), line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, line {}, column {}", self.file, self.line, self.column)
    }
}

// ==============================================================================
// Tokens
// ==============================================================================

/// The kind of a token, carrying its resolved value where it has one.
///
/// Character literals are folded into `Integer` since they are interchangeable
/// with integers everywhere an operand is accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    Directive,
    Register(u8),
    Integer(i32),
    Real(f64),
    StringLiteral(String),
    Colon,
    Comma,
    LeftParen,
    RightParen,
    Plus,
    Minus,
}

impl TokenKind {
    /// True for tokens that can end an operand. A `-` right after one of these is
    /// a binary minus rather than the sign of a numeric literal.
    pub fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Identifier
                | TokenKind::Register(_)
                | TokenKind::Integer(_)
                | TokenKind::Real(_)
                | TokenKind::RightParen
        )
    }
}

/// A single token with its literal text and source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, location: Location) -> Self {
        Token { kind, literal: literal.into(), location }
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    pub fn integer_value(&self) -> Option<i32> {
        match self.kind {
            TokenKind::Integer(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal)
    }
}

// ==============================================================================
// Tokenized Source
// ==============================================================================

/// One source line: its original text (kept for listings and error context)
/// and the tokens found on it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub line: u32,
    pub text: String,
    pub tokens: Vec<Token>,
}

/// A tokenized source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub filename: String,
    pub lines: Vec<SourceLine>,
}

impl SourceFile {
    pub fn line_text(&self, line: u32) -> Option<&str> {
        self.lines.iter().find(|l| l.line == line).map(|l| l.text.as_str())
    }
}
