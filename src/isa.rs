// isa.rs
//
// This file defines the interface between the assembler/memory core and an
// instruction set description.
//
// An instruction set is a catalogue of basic instructions (one machine word each,
// with an encoding format) and extended instructions (pseudo-instructions that
// expand to a fixed sequence of basic ones). The parser selects an instruction by
// mnemonic and operand shape; the assembler encodes it; memory decodes words back
// into statements when code is stored or fetched as raw data.

use std::fmt;

use crate::statement::{BasicStatement, OperandSyntax};

// ==============================================================================
// Operand Types
// ==============================================================================

/// The shape of an operand an instruction accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    /// A CPU register, `$t0`
    Register,
    /// A register in parentheses, `($t0)`
    ParenRegister,
    /// 5-bit unsigned integer (shift amounts)
    Unsigned5,
    /// 16-bit signed integer
    Signed16,
    /// 16-bit unsigned integer
    Unsigned16,
    /// Any 32-bit integer
    Integer32,
    /// A label, optionally with a constant offset
    Label,
}

impl OperandType {
    pub fn accepts(&self, operand: &OperandSyntax) -> bool {
        match (self, operand) {
            (OperandType::Register, OperandSyntax::Register { .. }) => true,
            (OperandType::ParenRegister, OperandSyntax::ParenRegister { .. }) => true,
            (OperandType::Unsigned5, OperandSyntax::Integer { value, .. }) => (0..32).contains(value),
            (OperandType::Signed16, OperandSyntax::Integer { value, .. }) => (-0x8000..=0x7fff).contains(value),
            (OperandType::Unsigned16, OperandSyntax::Integer { value, .. }) => (0..=0xffff).contains(value),
            (OperandType::Integer32, OperandSyntax::Integer { .. }) => true,
            (OperandType::Label, OperandSyntax::Label { .. }) => true,
            _ => false,
        }
    }
}

// ==============================================================================
// Encoding Formats
// ==============================================================================

/// Bit layout of a basic instruction. Operand order is the source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `rd, rs, rt`
    Register { funct: u32 },
    /// `rd, rt, shamt`
    Shift { funct: u32 },
    /// `rs`
    JumpRegister { funct: u32 },
    /// `rt, rs, imm`
    Immediate { opcode: u32 },
    /// `rt, imm`
    UpperImmediate { opcode: u32 },
    /// `rt, offset(base)` or `rt, (base)`
    Memory { opcode: u32 },
    /// `rs, rt, target`, PC-relative
    Branch { opcode: u32 },
    /// `target`, pseudo-direct
    Jump { opcode: u32 },
    /// No operands
    Fixed { word: u32 },
}

fn field(value: i32) -> u32 {
    (value as u32) & 0x1f
}

fn low16(value: i32) -> u32 {
    (value as u32) & 0xffff
}

fn sign_extend16(value: u32) -> i32 {
    (value & 0xffff) as u16 as i16 as i32
}

impl Format {
    /// Fixed bits that identify an instruction of this format, as `(mask, pattern)`.
    pub fn match_bits(&self) -> (u32, u32) {
        match *self {
            Format::Register { funct } => (0xfc00_07ff, funct),
            Format::Shift { funct } => (0xffe0_003f, funct),
            Format::JumpRegister { funct } => (0xfc1f_ffff, funct),
            Format::Immediate { opcode }
            | Format::Memory { opcode }
            | Format::Branch { opcode }
            | Format::Jump { opcode } => (0xfc00_0000, opcode << 26),
            Format::UpperImmediate { opcode } => (0xffe0_0000, opcode << 26),
            Format::Fixed { word } => (0xffff_ffff, word),
        }
    }

    pub fn encode(&self, operands: &[i32], address: u32) -> Result<u32, String> {
        let op = |i: usize| operands.get(i).copied().unwrap_or(0);
        let word = match *self {
            Format::Register { funct } => (field(op(1)) << 21) | (field(op(2)) << 16) | (field(op(0)) << 11) | funct,
            Format::Shift { funct } => (field(op(1)) << 16) | (field(op(0)) << 11) | (field(op(2)) << 6) | funct,
            Format::JumpRegister { funct } => (field(op(0)) << 21) | funct,
            Format::Immediate { opcode } => {
                (opcode << 26) | (field(op(1)) << 21) | (field(op(0)) << 16) | low16(op(2))
            }
            Format::UpperImmediate { opcode } => (opcode << 26) | (field(op(0)) << 16) | low16(op(1)),
            Format::Memory { opcode } => {
                let (offset, base) = if operands.len() == 2 { (0, op(1)) } else { (op(1), op(2)) };
                (opcode << 26) | (field(base) << 21) | (field(op(0)) << 16) | low16(offset)
            }
            Format::Branch { opcode } => {
                let target = op(2) as u32;
                let delta = target.wrapping_sub(address.wrapping_add(4)) as i32;
                if delta % 4 != 0 {
                    return Err(format!("Branch target 0x{:08x} is not word aligned", target));
                }
                let offset = delta >> 2;
                if !(-0x8000..=0x7fff).contains(&offset) {
                    return Err(format!("Branch target 0x{:08x} is out of range", target));
                }
                (opcode << 26) | (field(op(0)) << 21) | (field(op(1)) << 16) | low16(offset)
            }
            Format::Jump { opcode } => {
                let target = op(0) as u32;
                if target & 0xf000_0000 != address.wrapping_add(4) & 0xf000_0000 {
                    return Err(format!("Jump target 0x{:08x} is outside the current 256 MiB region", target));
                }
                if target % 4 != 0 {
                    return Err(format!("Jump target 0x{:08x} is not word aligned", target));
                }
                (opcode << 26) | ((target >> 2) & 0x03ff_ffff)
            }
            Format::Fixed { word } => word,
        };
        Ok(word)
    }

    /// Recover source-order operand values from an encoding.
    /// `signed_immediate` selects sign extension for `Immediate` formats.
    pub fn decode(&self, binary: u32, address: u32, signed_immediate: bool) -> Vec<i32> {
        let rs = ((binary >> 21) & 0x1f) as i32;
        let rt = ((binary >> 16) & 0x1f) as i32;
        let rd = ((binary >> 11) & 0x1f) as i32;
        let shamt = ((binary >> 6) & 0x1f) as i32;
        let imm = if signed_immediate { sign_extend16(binary) } else { (binary & 0xffff) as i32 };
        match *self {
            Format::Register { .. } => vec![rd, rs, rt],
            Format::Shift { .. } => vec![rd, rt, shamt],
            Format::JumpRegister { .. } => vec![rs],
            Format::Immediate { .. } => vec![rt, rs, imm],
            Format::UpperImmediate { .. } => vec![rt, (binary & 0xffff) as i32],
            Format::Memory { .. } => vec![rt, sign_extend16(binary), rs],
            Format::Branch { .. } => {
                let target = address.wrapping_add(4).wrapping_add((sign_extend16(binary) << 2) as u32);
                vec![rs, rt, target as i32]
            }
            Format::Jump { .. } => {
                let target = (address.wrapping_add(4) & 0xf000_0000) | ((binary & 0x03ff_ffff) << 2);
                vec![target as i32]
            }
            Format::Fixed { .. } => Vec::new(),
        }
    }
}

// ==============================================================================
// Instructions
// ==============================================================================

/// An instruction occupying exactly one machine word.
#[derive(Debug, PartialEq, Eq)]
pub struct BasicInstruction {
    pub mnemonic: &'static str,
    pub operand_types: &'static [OperandType],
    pub format: Format,
    pub description: &'static str,
}

impl BasicInstruction {
    pub fn encode(&self, operands: &[i32], address: u32) -> Result<u32, String> {
        self.format.encode(operands, address)
    }

    pub fn matches_binary(&self, binary: u32) -> bool {
        let (mask, pattern) = self.format.match_bits();
        binary & mask == pattern
    }

    pub fn decode_operands(&self, binary: u32, address: u32) -> Vec<i32> {
        let signed = self.operand_types.contains(&OperandType::Signed16);
        self.format.decode(binary, address, signed)
    }
}

/// Expansion of an extended instruction's resolved operands into the operand
/// lists of its basic instructions, in order.
pub type Expander = fn(&[i32]) -> Vec<Vec<i32>>;

/// A pseudo-instruction that assembles to a fixed sequence of basic instructions.
#[derive(Debug)]
pub struct ExtendedInstruction {
    pub mnemonic: &'static str,
    pub operand_types: &'static [OperandType],
    pub expansion: &'static [&'static BasicInstruction],
    pub expand: Expander,
    pub description: &'static str,
}

impl ExtendedInstruction {
    pub fn expand(&self, operands: &[i32]) -> Vec<(&'static BasicInstruction, Vec<i32>)> {
        self.expansion.iter().copied().zip((self.expand)(operands)).collect()
    }
}

/// A candidate instruction for a mnemonic.
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Basic(&'static BasicInstruction),
    Extended(&'static ExtendedInstruction),
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Basic(i) => i.mnemonic,
            Instruction::Extended(i) => i.mnemonic,
        }
    }

    pub fn operand_types(&self) -> &'static [OperandType] {
        match self {
            Instruction::Basic(i) => i.operand_types,
            Instruction::Extended(i) => i.operand_types,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Instruction::Basic(i) => i.description,
            Instruction::Extended(i) => i.description,
        }
    }

    /// Number of bytes the instruction occupies once assembled.
    pub fn size_bytes(&self) -> u32 {
        match self {
            Instruction::Basic(_) => 4,
            Instruction::Extended(i) => 4 * i.expansion.len() as u32,
        }
    }

    pub fn accepts(&self, operands: &[OperandSyntax]) -> bool {
        let types = self.operand_types();
        types.len() == operands.len() && types.iter().zip(operands).all(|(t, o)| t.accepts(o))
    }
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Instruction::Basic(a), Instruction::Basic(b)) => std::ptr::eq(*a, *b),
            (Instruction::Extended(a), Instruction::Extended(b)) => std::ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

// ==============================================================================
// Instruction Set
// ==============================================================================

/// An instruction set description, shared between the assembler and memory.
pub trait InstructionSet: Send + Sync {
    fn name(&self) -> &str;

    fn basic_instructions(&self) -> &[&'static BasicInstruction];

    fn extended_instructions(&self) -> &[&'static ExtendedInstruction];

    fn register_number(&self, name: &str) -> Option<u8>;

    fn register_name(&self, number: u8) -> String;

    /// Every instruction with this mnemonic, basic before extended, in table order.
    fn instructions_for(&self, mnemonic: &str) -> Vec<Instruction> {
        let basic = self
            .basic_instructions()
            .iter()
            .filter(|i| i.mnemonic.eq_ignore_ascii_case(mnemonic))
            .map(|i| Instruction::Basic(*i));
        let extended = self
            .extended_instructions()
            .iter()
            .filter(|i| i.mnemonic.eq_ignore_ascii_case(mnemonic))
            .map(|i| Instruction::Extended(*i));
        basic.chain(extended).collect()
    }

    fn has_mnemonic(&self, mnemonic: &str) -> bool {
        !self.instructions_for(mnemonic).is_empty()
    }

    /// Decode a word into a statement; `None` if no basic instruction matches.
    fn decode(&self, binary: u32, address: u32) -> Option<BasicStatement> {
        let instruction = self.basic_instructions().iter().copied().find(|i| i.matches_binary(binary))?;
        let operands = instruction.decode_operands(binary, address);
        Some(BasicStatement::new(instruction, operands, binary, None))
    }
}
