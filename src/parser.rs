// parser.rs
//
// The syntax parser: walks a tokenized source file and yields syntax units,
// which are labels, directives and instruction statements. Each unit knows how
// to process itself against the assembler during pass 1.
//
// Parse problems are logged and the offending line is skipped, so a single run
// reports as many problems as possible.

use crate::assembler::Assembler;
use crate::ast::{SourceFile, SourceLine, Token, TokenKind};
use crate::directives::Directive;
use crate::isa::InstructionSet;
use crate::log::AssemblerLog;
use crate::statement::{OperandSyntax, StatementSyntax};

/// `label:`
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSyntax {
    pub token: Token,
}

impl LabelSyntax {
    pub fn process(self, assembler: &mut Assembler) {
        assembler.define_label(&self.token);
    }
}

/// A directive and the tokens that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveSyntax {
    pub directive: Directive,
    pub token: Token,
    pub content: Vec<Token>,
}

impl DirectiveSyntax {
    pub fn process(self, assembler: &mut Assembler) {
        self.directive.process(&self, assembler);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Label(LabelSyntax),
    Directive(DirectiveSyntax),
    Statement(StatementSyntax),
}

impl Syntax {
    pub fn process(self, assembler: &mut Assembler) {
        match self {
            Syntax::Label(label) => label.process(assembler),
            Syntax::Directive(directive) => directive.process(assembler),
            Syntax::Statement(statement) => statement.process(assembler),
        }
    }
}

pub struct SyntaxParser<'a> {
    isa: &'a dyn InstructionSet,
    file: &'a SourceFile,
    line_index: usize,
    pos: usize,
}

impl<'a> SyntaxParser<'a> {
    pub fn new(isa: &'a dyn InstructionSet, file: &'a SourceFile) -> Self {
        SyntaxParser { isa, file, line_index: 0, pos: 0 }
    }

    fn line(&self) -> Option<&'a SourceLine> {
        self.file.lines.get(self.line_index)
    }

    fn skip_line(&mut self) {
        self.line_index += 1;
        self.pos = 0;
    }

    /// The next syntax unit, or `None` at end of file.
    pub fn next_syntax(&mut self, log: &mut AssemblerLog) -> Option<Syntax> {
        loop {
            let line = self.line()?;
            let tokens = &line.tokens;
            let Some(token) = tokens.get(self.pos) else {
                self.skip_line();
                continue;
            };

            match &token.kind {
                TokenKind::Identifier if matches!(tokens.get(self.pos + 1), Some(t) if t.kind == TokenKind::Colon) => {
                    self.pos += 2;
                    return Some(Syntax::Label(LabelSyntax { token: token.clone() }));
                }
                TokenKind::Directive => {
                    let content = tokens[self.pos + 1..].to_vec();
                    self.skip_line();
                    match Directive::from_name(&token.literal) {
                        Some(directive) => {
                            let content = self.continuation(directive, content);
                            return Some(Syntax::Directive(DirectiveSyntax { directive, token: token.clone(), content }));
                        }
                        None => log.warning(
                            Some(&token.location),
                            format!("Directive '{}' is not supported; ignored", token.literal),
                        ),
                    }
                }
                TokenKind::Identifier if self.isa.has_mnemonic(&token.literal) => {
                    let operands = &tokens[self.pos + 1..];
                    self.skip_line();
                    if let Some(statement) = self.parse_statement(line, token, operands, log) {
                        return Some(Syntax::Statement(statement));
                    }
                }
                TokenKind::Identifier => {
                    log.error(
                        Some(&token.location),
                        format!("Mnemonic '{}' does not correspond to any known instruction", token.literal),
                    );
                    self.skip_line();
                }
                _ => {
                    log.error(Some(&token.location), format!("Unexpected token '{}'", token.literal));
                    self.skip_line();
                }
            }
        }
    }

    /// List directives may continue on following lines that hold only values.
    fn continuation(&mut self, directive: Directive, mut content: Vec<Token>) -> Vec<Token> {
        if !directive.is_list() {
            return content;
        }
        while let Some(line) = self.line() {
            let continues = match line.tokens.first() {
                Some(first) => match &first.kind {
                    TokenKind::Integer(_) | TokenKind::Real(_) | TokenKind::StringLiteral(_) => true,
                    TokenKind::Identifier => {
                        !self.isa.has_mnemonic(&first.literal)
                            && !matches!(line.tokens.get(1), Some(t) if t.kind == TokenKind::Colon)
                    }
                    _ => false,
                },
                None => false,
            };
            if !continues {
                break;
            }
            content.extend(line.tokens.iter().cloned());
            self.skip_line();
        }
        content
    }

    fn parse_statement(
        &self,
        line: &SourceLine,
        mnemonic: &Token,
        tokens: &[Token],
        log: &mut AssemblerLog,
    ) -> Option<StatementSyntax> {
        let operands = match parse_operands(tokens) {
            Ok(operands) => operands,
            Err((token, message)) => {
                log.error(Some(&token.location), message);
                return None;
            }
        };
        let candidates = self.isa.instructions_for(&mnemonic.literal);
        let Some(instruction) = candidates.into_iter().find(|i| i.accepts(&operands)) else {
            let listed: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
            log.error(
                Some(&mnemonic.location),
                format!("No instruction '{}' found matching operands [{}]", mnemonic.literal, listed.join(", ")),
            );
            return None;
        };
        Some(StatementSyntax {
            mnemonic: mnemonic.clone(),
            instruction,
            operands,
            source_text: line.text.trim().to_string(),
        })
    }
}

/// Parse comma-separated operands. `imm(reg)` yields two operands.
pub fn parse_operands(tokens: &[Token]) -> Result<Vec<OperandSyntax>, (Token, String)> {
    let mut operands = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let token = &tokens[pos];
        pos += 1;
        let operand = match &token.kind {
            TokenKind::Register(number) => OperandSyntax::Register { token: token.clone(), number: *number },
            TokenKind::Integer(value) => OperandSyntax::Integer { token: token.clone(), value: *value },
            TokenKind::LeftParen => {
                let inner = tokens.get(pos).ok_or_else(|| (token.clone(), "Unclosed parenthesis".to_string()))?;
                let TokenKind::Register(number) = inner.kind else {
                    return Err((inner.clone(), "Parentheses can only contain CPU registers".to_string()));
                };
                match tokens.get(pos + 1) {
                    Some(t) if t.kind == TokenKind::RightParen => {}
                    _ => return Err((token.clone(), "Unclosed parenthesis".to_string())),
                }
                pos += 2;
                OperandSyntax::ParenRegister { token: inner.clone(), number }
            }
            TokenKind::Identifier => {
                let mut offset = 0i32;
                if let (Some(sign), Some(value)) = (tokens.get(pos), tokens.get(pos + 1).and_then(|t| t.integer_value())) {
                    match sign.kind {
                        TokenKind::Plus => {
                            offset = value;
                            pos += 2;
                        }
                        TokenKind::Minus => {
                            offset = value.wrapping_neg();
                            pos += 2;
                        }
                        _ => {}
                    }
                }
                OperandSyntax::Label { token: token.clone(), offset }
            }
            _ => return Err((token.clone(), format!("Invalid operand '{}'", token.literal))),
        };
        operands.push(operand);

        match tokens.get(pos) {
            None => {}
            Some(t) if t.kind == TokenKind::Comma => {
                pos += 1;
                if pos == tokens.len() {
                    return Err((t.clone(), "Expected an operand after ','".to_string()));
                }
            }
            // `offset(base)` needs no comma
            Some(t) if t.kind == TokenKind::LeftParen && matches!(operands.last(), Some(OperandSyntax::Integer { .. })) => {}
            Some(t) => return Err((t.clone(), format!("Expected ',' but found '{}'", t.literal))),
        }
    }
    Ok(operands)
}
