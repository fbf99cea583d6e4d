// statement.rs
//
// The three successive forms of an instruction line:
//
// 1. `StatementSyntax` - parsed in pass 1: the chosen instruction and its
//    operands as written, labels still unresolved.
// 2. `Statement` - resolved in pass 2: every operand reduced to a value,
//    extended instructions expanded into their basic instructions.
// 3. `BasicStatement` - placed in pass 3: one machine word with its encoding.
//
// Each later form keeps a reference to the syntax it came from so placement
// errors and listings can point back at the source line.

use std::fmt;
use std::sync::Arc;

use crate::assembler::Assembler;
use crate::ast::{Location, Token};
use crate::isa::{BasicInstruction, ExtendedInstruction, Instruction, OperandType};
use crate::log::AssemblerLog;
use crate::mips::register_name;
use crate::symbols::SymbolScope;

// ==============================================================================
// Parsed Statements
// ==============================================================================

/// An operand as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandSyntax {
    Register { token: Token, number: u8 },
    ParenRegister { token: Token, number: u8 },
    Integer { token: Token, value: i32 },
    /// A label reference with an optional constant offset, `label+4`
    Label { token: Token, offset: i32 },
}

impl OperandSyntax {
    pub fn token(&self) -> &Token {
        match self {
            OperandSyntax::Register { token, .. }
            | OperandSyntax::ParenRegister { token, .. }
            | OperandSyntax::Integer { token, .. }
            | OperandSyntax::Label { token, .. } => token,
        }
    }

    /// Reduce the operand to a value, looking labels up in `scope`.
    pub fn resolve(&self, scope: &SymbolScope<'_>, log: &mut AssemblerLog) -> i32 {
        match self {
            OperandSyntax::Register { number, .. } | OperandSyntax::ParenRegister { number, .. } => *number as i32,
            OperandSyntax::Integer { value, .. } => *value,
            OperandSyntax::Label { token, offset } => match scope.lookup(&token.literal) {
                Some(symbol) => symbol.address.wrapping_add(*offset as u32) as i32,
                None => {
                    log.error(
                        Some(&token.location),
                        format!("Symbol '{}' not found in symbol table", token.literal),
                    );
                    0
                }
            },
        }
    }
}

impl fmt::Display for OperandSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandSyntax::Register { token, .. } | OperandSyntax::Integer { token, .. } => write!(f, "{}", token),
            OperandSyntax::ParenRegister { token, .. } => write!(f, "({})", token),
            OperandSyntax::Label { token, offset } => match offset {
                0 => write!(f, "{}", token),
                o if *o > 0 => write!(f, "{}+{}", token, o),
                o => write!(f, "{}{}", token, o),
            },
        }
    }
}

/// An instruction line as parsed in pass 1.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementSyntax {
    pub mnemonic: Token,
    pub instruction: Instruction,
    pub operands: Vec<OperandSyntax>,
    pub source_text: String,
}

impl StatementSyntax {
    pub fn location(&self) -> &Location {
        &self.mnemonic.location
    }

    pub fn filename(&self) -> &str {
        &self.mnemonic.location.file
    }

    pub fn size_bytes(&self) -> u32 {
        self.instruction.size_bytes()
    }

    /// Pass 1: record the statement at the current cursor.
    pub fn process(self, assembler: &mut Assembler) {
        assembler.add_parsed_statement(self);
    }

    /// Pass 2: resolve operands against `scope` and expand extended instructions.
    pub fn resolve(self: Arc<Self>, scope: &SymbolScope<'_>, log: &mut AssemblerLog) -> Statement {
        let operands: Vec<i32> = self.operands.iter().map(|o| o.resolve(scope, log)).collect();
        match self.instruction {
            Instruction::Basic(instruction) => Statement::Basic { syntax: self, instruction, operands },
            Instruction::Extended(instruction) => {
                let expansion = instruction.expand(&operands);
                Statement::Extended { syntax: self, instruction, operands, expansion }
            }
        }
    }
}

impl fmt::Display for StatementSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let separator = match (i, operand) {
                (0, _) => " ",
                (_, OperandSyntax::ParenRegister { .. })
                    if matches!(self.operands[i - 1], OperandSyntax::Integer { .. }) =>
                {
                    ""
                }
                _ => ", ",
            };
            write!(f, "{}{}", separator, operand)?;
        }
        Ok(())
    }
}

// ==============================================================================
// Resolved Statements
// ==============================================================================

/// A statement whose operands are all values.
#[derive(Debug, Clone)]
pub enum Statement {
    Basic {
        syntax: Arc<StatementSyntax>,
        instruction: &'static BasicInstruction,
        operands: Vec<i32>,
    },
    Extended {
        syntax: Arc<StatementSyntax>,
        instruction: &'static ExtendedInstruction,
        operands: Vec<i32>,
        expansion: Vec<(&'static BasicInstruction, Vec<i32>)>,
    },
}

impl Statement {
    pub fn syntax(&self) -> &Arc<StatementSyntax> {
        match self {
            Statement::Basic { syntax, .. } | Statement::Extended { syntax, .. } => syntax,
        }
    }

    pub fn operands(&self) -> &[i32] {
        match self {
            Statement::Basic { operands, .. } | Statement::Extended { operands, .. } => operands,
        }
    }

    pub fn size_bytes(&self) -> u32 {
        match self {
            Statement::Basic { .. } => 4,
            Statement::Extended { expansion, .. } => 4 * expansion.len() as u32,
        }
    }

    /// The basic instructions making up this statement with their operands.
    pub fn basic_parts(&self) -> Vec<(&'static BasicInstruction, &[i32])> {
        match self {
            Statement::Basic { instruction, operands, .. } => vec![(*instruction, operands.as_slice())],
            Statement::Extended { expansion, .. } => expansion.iter().map(|(i, o)| (*i, o.as_slice())).collect(),
        }
    }

    /// Pass 3: encode each basic part and place it at consecutive words from `address`.
    pub fn handle_placement(&self, address: u32, assembler: &mut Assembler) {
        let syntax = self.syntax();
        for (i, (instruction, operands)) in self.basic_parts().into_iter().enumerate() {
            let word_address = address.wrapping_add(4 * i as u32);
            match instruction.encode(operands, word_address) {
                Ok(binary) => {
                    let statement =
                        BasicStatement::new(instruction, operands.to_vec(), binary, Some(Arc::clone(syntax)));
                    assembler.place_statement(word_address, Arc::new(statement));
                }
                Err(message) => assembler.log_mut().error(Some(syntax.location()), message),
            }
        }
    }
}

// ==============================================================================
// Encoded Statements
// ==============================================================================

/// One machine word: a basic instruction, its operand values and its encoding.
#[derive(Debug, Clone)]
pub struct BasicStatement {
    pub instruction: &'static BasicInstruction,
    pub operands: Vec<i32>,
    pub binary: u32,
    pub syntax: Option<Arc<StatementSyntax>>,
}

impl BasicStatement {
    pub fn new(
        instruction: &'static BasicInstruction,
        operands: Vec<i32>,
        binary: u32,
        syntax: Option<Arc<StatementSyntax>>,
    ) -> Self {
        BasicStatement { instruction, operands, binary, syntax }
    }

    pub fn location(&self) -> Option<&Location> {
        self.syntax.as_ref().map(|s| s.location())
    }
}

impl PartialEq for BasicStatement {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.instruction, other.instruction)
            && self.operands == other.operands
            && self.binary == other.binary
    }
}

impl fmt::Display for BasicStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instruction.mnemonic)?;
        let types = self.instruction.operand_types;
        for (i, (kind, value)) in types.iter().zip(&self.operands).enumerate() {
            let separator = match (i, kind) {
                (0, _) => " ",
                (_, OperandType::ParenRegister) if types[i - 1] == OperandType::Signed16 => "",
                _ => ", ",
            };
            write!(f, "{}", separator)?;
            match kind {
                OperandType::Register => write!(f, "{}", register_name(*value as u8))?,
                OperandType::ParenRegister => write!(f, "({})", register_name(*value as u8))?,
                OperandType::Label => write!(f, "0x{:08x}", *value as u32)?,
                _ => write!(f, "{}", value)?,
            }
        }
        Ok(())
    }
}
