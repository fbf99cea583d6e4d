// tokenizer.rs
//
// Turns MIPS assembly text into tokenized source lines. Each line is tokenized
// on its own; a malformed line is logged as an error and kept with no tokens so
// the rest of the file can still be assembled and checked.

use std::iter::Peekable;
use std::str::Chars;

use crate::ast::{Location, SourceFile, SourceLine, Token, TokenKind};
use crate::log::AssemblerLog;
use crate::mips::register_number;

/// A tokenizing failure at a column of the current line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    pub column: u32,
    pub message: String,
}

/// Tokenize a whole file, logging malformed lines to `log`.
pub fn tokenize(filename: &str, text: &str, log: &mut AssemblerLog) -> SourceFile {
    let mut lines = Vec::new();
    for (index, line_text) in text.lines().enumerate() {
        let line = index as u32 + 1;
        let tokens = match tokenize_line(line_text, filename, line) {
            Ok(tokens) => tokens,
            Err(e) => {
                log.error(Some(&Location::new(filename, line, e.column)), e.message);
                Vec::new()
            }
        };
        lines.push(SourceLine { line, text: line_text.to_string(), tokens });
    }
    SourceFile { filename: filename.to_string(), lines }
}

struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor { chars: text.chars().peekable(), column: 1 }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// The character after the next one.
    fn peek_second(&self) -> Option<char> {
        self.chars.clone().nth(1)
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.column += 1;
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> TokenError {
        TokenError { column: self.column, message: message.into() }
    }
}

pub fn tokenize_line(text: &str, filename: &str, line: u32) -> Result<Vec<Token>, TokenError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut cursor = Cursor::new(text);

    while let Some(ch) = cursor.peek() {
        let location = Location::new(filename, line, cursor.column);
        match ch {
            ' ' | '\t' | '\r' | '\n' => {
                cursor.next();
            }
            '#' => break,
            ':' => {
                cursor.next();
                tokens.push(Token::new(TokenKind::Colon, ":", location));
            }
            ',' => {
                cursor.next();
                tokens.push(Token::new(TokenKind::Comma, ",", location));
            }
            '(' => {
                cursor.next();
                tokens.push(Token::new(TokenKind::LeftParen, "(", location));
            }
            ')' => {
                cursor.next();
                tokens.push(Token::new(TokenKind::RightParen, ")", location));
            }
            '+' => {
                cursor.next();
                tokens.push(Token::new(TokenKind::Plus, "+", location));
            }
            '-' => {
                let follows_operand = tokens.last().is_some_and(|t| t.kind.ends_operand());
                if !follows_operand && cursor.peek_second().is_some_and(|c| c.is_ascii_digit()) {
                    cursor.next();
                    let (kind, literal) = parse_number(&mut cursor, true)?;
                    tokens.push(Token::new(kind, literal, location));
                } else {
                    cursor.next();
                    tokens.push(Token::new(TokenKind::Minus, "-", location));
                }
            }
            '\'' => {
                cursor.next();
                let c = match cursor.next() {
                    Some('\\') => parse_escape(&mut cursor)?,
                    Some('\'') | None => return Err(cursor.error("Empty or unclosed character literal")),
                    Some(c) => c,
                };
                if cursor.next() != Some('\'') {
                    return Err(cursor.error("Unclosed character literal"));
                }
                tokens.push(Token::new(TokenKind::Integer(c as i32), format!("'{}'", c.escape_default()), location));
            }
            '"' => {
                cursor.next();
                let (value, literal) = parse_string_literal(&mut cursor)?;
                tokens.push(Token::new(TokenKind::StringLiteral(value), literal, location));
            }
            '.' if cursor.peek_second().is_some_and(|c| c.is_ascii_alphabetic()) => {
                cursor.next();
                let name = parse_identifier(&mut cursor);
                tokens.push(Token::new(TokenKind::Directive, format!(".{}", name), location));
            }
            '$' => {
                cursor.next();
                let name = parse_identifier(&mut cursor);
                let literal = format!("${}", name);
                match register_number(&name) {
                    Some(number) => tokens.push(Token::new(TokenKind::Register(number), literal, location)),
                    None => return Err(TokenError { column: location.column, message: format!("Unknown register '{}'", literal) }),
                }
            }
            '0'..='9' => {
                let (kind, literal) = parse_number(&mut cursor, false)?;
                tokens.push(Token::new(kind, literal, location));
            }
            c if c.is_alphabetic() || c == '_' => {
                let name = parse_identifier(&mut cursor);
                tokens.push(Token::new(TokenKind::Identifier, name, location));
            }
            _ => return Err(cursor.error(format!("Unexpected character '{}'", ch))),
        }
    }
    Ok(tokens)
}

fn parse_identifier(cursor: &mut Cursor) -> String {
    let mut s = String::new();
    while let Some(ch) = cursor.peek() {
        if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '$' {
            s.push(ch);
            cursor.next();
        } else {
            break;
        }
    }
    s
}

/// Parse an integer (decimal, `0x` hex, `0b` binary) or a decimal real.
/// The sign, if any, has already been consumed.
fn parse_number(cursor: &mut Cursor, negative: bool) -> Result<(TokenKind, String), TokenError> {
    let mut s = String::new();
    let mut base = 10;
    if cursor.peek() == Some('0') {
        match cursor.peek_second() {
            Some('x') | Some('X') => base = 16,
            Some('b') | Some('B') => base = 2,
            _ => {}
        }
        if base != 10 {
            cursor.next();
            cursor.next();
        }
    }
    let mut is_real = false;
    while let Some(ch) = cursor.peek() {
        let accepted = match base {
            16 => ch.is_ascii_hexdigit(),
            2 => ch == '0' || ch == '1',
            _ if ch.is_ascii_digit() => true,
            _ if ch == '.' && !is_real && cursor.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                is_real = true;
                true
            }
            _ if (ch == 'e' || ch == 'E') && !s.contains(['e', 'E']) => {
                is_real = true;
                true
            }
            _ if (ch == '+' || ch == '-') && s.ends_with(['e', 'E']) => true,
            _ => false,
        };
        if !accepted {
            break;
        }
        s.push(ch);
        cursor.next();
    }

    let sign = if negative { "-" } else { "" };
    let prefix = match base {
        16 => "0x",
        2 => "0b",
        _ => "",
    };
    let literal = format!("{}{}{}", sign, prefix, s);

    if is_real {
        let value: f64 = format!("{}{}", sign, s).parse().map_err(|_| cursor.error(format!("Invalid number {}", literal)))?;
        return Ok((TokenKind::Real(value), literal));
    }
    let magnitude =
        u64::from_str_radix(&s, base).map_err(|_| cursor.error(format!("Invalid number {}", literal)))?;
    let value = if negative {
        if magnitude > 0x8000_0000 {
            return Err(cursor.error(format!("Number {} is out of range", literal)));
        }
        (magnitude as i64).wrapping_neg() as i32
    } else {
        if magnitude > u32::MAX as u64 {
            return Err(cursor.error(format!("Number {} is out of range", literal)));
        }
        magnitude as u32 as i32
    };
    Ok((TokenKind::Integer(value), literal))
}

fn parse_escape(cursor: &mut Cursor) -> Result<char, TokenError> {
    let esc = cursor.next().ok_or_else(|| cursor.error("Unexpected end in escape sequence"))?;
    let c = match esc {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        '0' => '\0',
        _ => return Err(cursor.error(format!("Unknown escape sequence \\{}", esc))),
    };
    Ok(c)
}

/// Parse the rest of a string literal after the opening quote, returning its
/// value and its literal text.
fn parse_string_literal(cursor: &mut Cursor) -> Result<(String, String), TokenError> {
    let mut value = String::new();
    let mut literal = String::from("\"");
    while let Some(ch) = cursor.next() {
        literal.push(ch);
        match ch {
            '"' => return Ok((value, literal)),
            '\\' => {
                if let Some(raw) = cursor.peek() {
                    literal.push(raw);
                }
                value.push(parse_escape(cursor)?);
            }
            _ => value.push(ch),
        }
    }
    Err(cursor.error("Unclosed string literal"))
}
