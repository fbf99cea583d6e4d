// directives.rs
//
// Assembler directives and what each one does during pass 1. Segment directives
// move the active cursor; data directives write straight into memory at the
// cursor; `.globl` and `.extern` feed the global symbol table.

use std::fmt;

use crate::assembler::Assembler;
use crate::ast::{Token, TokenKind};
use crate::parser::DirectiveSyntax;
use crate::segment::SegmentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Text,
    Data,
    KText,
    KData,
    Byte,
    Half,
    Word,
    Float,
    Double,
    Ascii,
    Asciiz,
    Space,
    Align,
    Extern,
    Globl,
    Set,
    Eqv,
    Macro,
    EndMacro,
    Include,
}

const DIRECTIVES: &[(Directive, &str)] = &[
    (Directive::Text, ".text"),
    (Directive::Data, ".data"),
    (Directive::KText, ".ktext"),
    (Directive::KData, ".kdata"),
    (Directive::Byte, ".byte"),
    (Directive::Half, ".half"),
    (Directive::Word, ".word"),
    (Directive::Float, ".float"),
    (Directive::Double, ".double"),
    (Directive::Ascii, ".ascii"),
    (Directive::Asciiz, ".asciiz"),
    (Directive::Space, ".space"),
    (Directive::Align, ".align"),
    (Directive::Extern, ".extern"),
    (Directive::Globl, ".globl"),
    (Directive::Set, ".set"),
    (Directive::Eqv, ".eqv"),
    (Directive::Macro, ".macro"),
    (Directive::EndMacro, ".end_macro"),
    (Directive::Include, ".include"),
];

impl Directive {
    pub fn from_name(name: &str) -> Option<Directive> {
        DIRECTIVES.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)).map(|(d, _)| *d)
    }

    pub fn name(&self) -> &'static str {
        DIRECTIVES.iter().find(|(d, _)| d == self).map_or("", |(_, n)| n)
    }

    /// Directives whose values may continue on following lines.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Directive::Byte
                | Directive::Half
                | Directive::Word
                | Directive::Float
                | Directive::Double
                | Directive::Ascii
                | Directive::Asciiz
        )
    }

    /// Element size of integer data directives.
    fn integer_length(&self) -> Option<u32> {
        match self {
            Directive::Byte => Some(1),
            Directive::Half => Some(2),
            Directive::Word => Some(4),
            _ => None,
        }
    }

    pub fn process(&self, syntax: &DirectiveSyntax, assembler: &mut Assembler) {
        match self {
            Directive::Text => switch_segment(SegmentKind::Text, syntax, assembler),
            Directive::Data => switch_segment(SegmentKind::Data, syntax, assembler),
            Directive::KText => switch_segment(SegmentKind::KernelText, syntax, assembler),
            Directive::KData => switch_segment(SegmentKind::KernelData, syntax, assembler),
            Directive::Byte | Directive::Half | Directive::Word => {
                if require_data_segment(syntax, assembler) {
                    store_integers(self.integer_length().unwrap_or(4), syntax, assembler);
                }
            }
            Directive::Float | Directive::Double => {
                if require_data_segment(syntax, assembler) {
                    store_reals(*self == Directive::Double, syntax, assembler);
                }
            }
            Directive::Ascii | Directive::Asciiz => {
                if require_data_segment(syntax, assembler) {
                    store_strings(*self == Directive::Asciiz, syntax, assembler);
                }
            }
            Directive::Space => {
                if require_data_segment(syntax, assembler) {
                    reserve_space(syntax, assembler);
                }
            }
            Directive::Align => {
                if require_data_segment(syntax, assembler) {
                    align(syntax, assembler);
                }
            }
            Directive::Extern => declare_extern(syntax, assembler),
            Directive::Globl => declare_globals(syntax, assembler),
            Directive::Set => assembler.log_mut().warning(
                Some(&syntax.token.location),
                format!("Directive '{}' is not supported; ignored", syntax.token.literal),
            ),
            Directive::Eqv | Directive::Macro | Directive::EndMacro | Directive::Include => assembler.log_mut().warning(
                Some(&syntax.token.location),
                format!("Directive '{}' is handled by the preprocessor; ignored", syntax.token.literal),
            ),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ==============================================================================
// Helpers
// ==============================================================================

fn require_data_segment(syntax: &DirectiveSyntax, assembler: &mut Assembler) -> bool {
    if assembler.segments().active().is_data() {
        return true;
    }
    assembler.log_mut().error(
        Some(&syntax.token.location),
        format!("Directive '{}' can only be used in a data segment", syntax.token.literal),
    );
    false
}

/// Split directive content at commas. Commas are optional between values.
fn values(content: &[Token]) -> impl Iterator<Item = &Token> {
    content.iter().filter(|t| t.kind != TokenKind::Comma)
}

fn switch_segment(kind: SegmentKind, syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    assembler.segments_mut().switch_to(kind);
    match syntax.content.as_slice() {
        [] => {}
        [token] => match token.kind {
            TokenKind::Integer(address) => assembler.segments_mut().set_address(address as u32),
            _ => assembler.log_mut().error(
                Some(&token.location),
                format!("Invalid address '{}' for directive '{}'", token.literal, syntax.token.literal),
            ),
        },
        [_, extra, ..] => assembler.log_mut().error(
            Some(&extra.location),
            format!("Unexpected '{}' after directive '{}'", extra.literal, syntax.token.literal),
        ),
    }
}

/// Whether `value` can be stored in `length` bytes, signed or unsigned.
fn fits(value: i32, length: u32) -> bool {
    match length {
        1 => (-0x80..=0xff).contains(&value),
        2 => (-0x8000..=0xffff).contains(&value),
        _ => true,
    }
}

/// `value` or `value : count`. Returns the count and advances past it.
fn repeat_count<'a>(
    tokens: &mut std::iter::Peekable<impl Iterator<Item = &'a Token>>,
    assembler: &mut Assembler,
) -> u32 {
    if !matches!(tokens.peek(), Some(t) if t.kind == TokenKind::Colon) {
        return 1;
    }
    let colon = tokens.next();
    match tokens.next() {
        Some(Token { kind: TokenKind::Integer(count), .. }) if *count > 0 => *count as u32,
        Some(token) => {
            assembler.log_mut().error(
                Some(&token.location),
                format!("Invalid repeat count '{}'; expected a positive integer", token.literal),
            );
            0
        }
        None => {
            if let Some(colon) = colon {
                assembler.log_mut().error(Some(&colon.location), "Expected a repeat count after ':'");
            }
            0
        }
    }
}

/// List directives need at least one value.
fn require_values(syntax: &DirectiveSyntax, what: &str, assembler: &mut Assembler) -> bool {
    if !syntax.content.is_empty() {
        return true;
    }
    assembler.log_mut().error(
        Some(&syntax.token.location),
        format!("Directive '{}' requires one or more {}", syntax.token.literal, what),
    );
    false
}

fn store_integers(length: u32, syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    if !require_values(syntax, "values", assembler) {
        return;
    }
    if assembler.segments().auto_align() {
        assembler.align_cursor(length);
    }
    let mut tokens = values(&syntax.content).peekable();
    while let Some(token) = tokens.next() {
        match &token.kind {
            TokenKind::Integer(value) => {
                let count = repeat_count(&mut tokens, assembler);
                if !fits(*value, length) {
                    assembler.log_mut().warning(
                        Some(&token.location),
                        format!(
                            "Value {} is out of range for directive '{}'; truncated to 0x{:x}",
                            token.literal,
                            syntax.token.literal,
                            (*value as u32) & (u32::MAX >> (32 - 8 * length))
                        ),
                    );
                }
                for _ in 0..count {
                    if !assembler.write_data(&token.location, *value as u32, length) {
                        return;
                    }
                }
            }
            TokenKind::Identifier => {
                let count = repeat_count(&mut tokens, assembler);
                let known = assembler.local_address(&token.literal);
                for _ in 0..count {
                    let written = match known {
                        Some(address) => assembler.write_data(&token.location, address, length),
                        None => assembler.write_forward_reference(token, length),
                    };
                    if !written {
                        return;
                    }
                }
            }
            _ => assembler.log_mut().error(
                Some(&token.location),
                format!("Invalid value '{}' for directive '{}'", token.literal, syntax.token.literal),
            ),
        }
    }
}

fn store_reals(double: bool, syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    if !require_values(syntax, "values", assembler) {
        return;
    }
    let length = if double { 8 } else { 4 };
    if assembler.segments().auto_align() {
        assembler.align_cursor(length);
    }
    let mut tokens = values(&syntax.content).peekable();
    while let Some(token) = tokens.next() {
        let value = match token.kind {
            TokenKind::Real(value) => value,
            TokenKind::Integer(value) => value as f64,
            _ => {
                assembler.log_mut().error(
                    Some(&token.location),
                    format!("Invalid value '{}' for directive '{}'", token.literal, syntax.token.literal),
                );
                continue;
            }
        };
        let count = repeat_count(&mut tokens, assembler);
        let single = value as f32;
        if !double && single.is_infinite() && value.is_finite() {
            assembler.log_mut().warning(
                Some(&token.location),
                format!("Value {} is out of range for directive '.float'", token.literal),
            );
        }
        for _ in 0..count {
            let written = if double {
                assembler.write_doubleword(&token.location, value.to_bits())
            } else {
                assembler.write_data(&token.location, single.to_bits(), 4)
            };
            if !written {
                return;
            }
        }
    }
}

fn store_strings(null_terminated: bool, syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    if !require_values(syntax, "strings", assembler) {
        return;
    }
    for token in values(&syntax.content) {
        let TokenKind::StringLiteral(value) = &token.kind else {
            assembler.log_mut().error(
                Some(&token.location),
                format!("Invalid value '{}' for directive '{}'", token.literal, syntax.token.literal),
            );
            continue;
        };
        let terminator = null_terminated.then_some(0);
        for byte in value.bytes().chain(terminator) {
            if !assembler.write_data(&token.location, byte as u32, 1) {
                return;
            }
        }
    }
}

fn reserve_space(syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    match syntax.content.as_slice() {
        [Token { kind: TokenKind::Integer(size), .. }] if *size >= 0 => assembler.segments_mut().increment(*size as u32),
        _ => assembler.log_mut().error(
            Some(&syntax.token.location),
            "Directive '.space' requires one non-negative integer size",
        ),
    }
}

fn align(syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    match syntax.content.as_slice() {
        [Token { kind: TokenKind::Integer(0), .. }] => assembler.segments_mut().set_auto_align(false),
        [Token { kind: TokenKind::Integer(n @ 1..=3), .. }] => assembler.align_cursor(1 << n),
        _ => assembler.log_mut().error(
            Some(&syntax.token.location),
            "Directive '.align' requires an alignment value between 0 and 3",
        ),
    }
}

fn declare_extern(syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    match syntax.content.as_slice() {
        [label @ Token { kind: TokenKind::Identifier, .. }, rest @ ..] => {
            let size = match values(rest).collect::<Vec<_>>().as_slice() {
                [Token { kind: TokenKind::Integer(size), .. }] if *size >= 0 => *size as u32,
                _ => {
                    assembler.log_mut().error(
                        Some(&syntax.token.location),
                        "Directive '.extern' requires a label and a non-negative size",
                    );
                    return;
                }
            };
            assembler.define_extern(label, size);
        }
        _ => assembler.log_mut().error(
            Some(&syntax.token.location),
            "Directive '.extern' requires a label and a non-negative size",
        ),
    }
}

fn declare_globals(syntax: &DirectiveSyntax, assembler: &mut Assembler) {
    if syntax.content.is_empty() {
        assembler.log_mut().error(Some(&syntax.token.location), "Directive '.globl' requires at least one label");
    }
    for token in values(&syntax.content) {
        if token.is_identifier() {
            assembler.declare_global(token);
        } else {
            assembler.log_mut().error(Some(&token.location), format!("Invalid label '{}' for directive '.globl'", token.literal));
        }
    }
}
