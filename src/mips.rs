// mips.rs
//
// The bundled MIPS32 instruction subset: register names, the basic instruction
// table and the extended (pseudo) instructions built on top of it.
//
// Table order matters. The parser picks the first instruction whose operand types
// accept the operands, and decoding picks the first basic instruction whose fixed
// bits match, so `nop` sits ahead of `sll` and the `offset(base)` memory forms sit
// ahead of the `(base)` forms.

use crate::isa::{BasicInstruction, ExtendedInstruction, Format, InstructionSet, OperandType};

use OperandType::*;

// ==============================================================================
// Registers
// ==============================================================================

const REGISTER_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", "s0", "s1",
    "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

pub const ZERO: i32 = 0;
pub const AT: i32 = 1;

/// Parse a register reference such as `$t0`, `$8` or `t0`.
pub fn register_number(name: &str) -> Option<u8> {
    let name = name.strip_prefix('$').unwrap_or(name);
    if let Ok(number) = name.parse::<u8>() {
        return (number < 32).then_some(number);
    }
    if name == "s8" {
        return Some(30);
    }
    REGISTER_NAMES.iter().position(|r| *r == name).map(|n| n as u8)
}

pub fn register_name(number: u8) -> String {
    match REGISTER_NAMES.get(number as usize) {
        Some(name) => format!("${}", name),
        None => format!("${}", number),
    }
}

// ==============================================================================
// Basic Instructions
// ==============================================================================

const R3: &[OperandType] = &[Register, Register, Register];
const SHIFT: &[OperandType] = &[Register, Register, Unsigned5];
const R1: &[OperandType] = &[Register];
const R2_S16: &[OperandType] = &[Register, Register, Signed16];
const R2_U16: &[OperandType] = &[Register, Register, Unsigned16];
const R1_U16: &[OperandType] = &[Register, Unsigned16];
const MEM: &[OperandType] = &[Register, Signed16, ParenRegister];
const MEM_NO_OFFSET: &[OperandType] = &[Register, ParenRegister];
const BRANCH: &[OperandType] = &[Register, Register, Label];
const JUMP: &[OperandType] = &[Label];
const NONE: &[OperandType] = &[];

macro_rules! basic {
    ($name:ident, $mnemonic:literal, $types:expr, $format:expr, $description:literal) => {
        pub static $name: BasicInstruction = BasicInstruction {
            mnemonic: $mnemonic,
            operand_types: $types,
            format: $format,
            description: $description,
        };
    };
}

basic!(NOP, "nop", NONE, Format::Fixed { word: 0 }, "Null operation: machine code is all zeroes");
basic!(SYSCALL, "syscall", NONE, Format::Fixed { word: 0x0000_000c }, "Issue a system call");
basic!(BREAK, "break", NONE, Format::Fixed { word: 0x0000_000d }, "Break execution");

basic!(ADD, "add", R3, Format::Register { funct: 0x20 }, "Addition with overflow: rd = rs + rt");
basic!(ADDU, "addu", R3, Format::Register { funct: 0x21 }, "Addition unsigned without overflow: rd = rs + rt");
basic!(SUB, "sub", R3, Format::Register { funct: 0x22 }, "Subtraction with overflow: rd = rs - rt");
basic!(SUBU, "subu", R3, Format::Register { funct: 0x23 }, "Subtraction unsigned without overflow: rd = rs - rt");
basic!(AND, "and", R3, Format::Register { funct: 0x24 }, "Bitwise AND: rd = rs & rt");
basic!(OR, "or", R3, Format::Register { funct: 0x25 }, "Bitwise OR: rd = rs | rt");
basic!(XOR, "xor", R3, Format::Register { funct: 0x26 }, "Bitwise XOR: rd = rs ^ rt");
basic!(NOR, "nor", R3, Format::Register { funct: 0x27 }, "Bitwise NOR: rd = !(rs | rt)");
basic!(SLT, "slt", R3, Format::Register { funct: 0x2a }, "Set less than: rd = (rs < rt) ? 1 : 0");
basic!(SLTU, "sltu", R3, Format::Register { funct: 0x2b }, "Set less than unsigned: rd = (rs < rt) ? 1 : 0");

basic!(SLL, "sll", SHIFT, Format::Shift { funct: 0x00 }, "Shift left logical: rd = rt << shamt");
basic!(SRL, "srl", SHIFT, Format::Shift { funct: 0x02 }, "Shift right logical: rd = rt >>> shamt");
basic!(SRA, "sra", SHIFT, Format::Shift { funct: 0x03 }, "Shift right arithmetic: rd = rt >> shamt");

basic!(JR, "jr", R1, Format::JumpRegister { funct: 0x08 }, "Jump register unconditionally: pc = rs");

basic!(ADDI, "addi", R2_S16, Format::Immediate { opcode: 0x08 }, "Addition immediate with overflow: rt = rs + imm");
basic!(ADDIU, "addiu", R2_S16, Format::Immediate { opcode: 0x09 }, "Addition immediate without overflow: rt = rs + imm");
basic!(SLTI, "slti", R2_S16, Format::Immediate { opcode: 0x0a }, "Set less than immediate: rt = (rs < imm) ? 1 : 0");
basic!(SLTIU, "sltiu", R2_S16, Format::Immediate { opcode: 0x0b }, "Set less than immediate unsigned: rt = (rs < imm) ? 1 : 0");
basic!(ANDI, "andi", R2_U16, Format::Immediate { opcode: 0x0c }, "Bitwise AND immediate: rt = rs & imm");
basic!(ORI, "ori", R2_U16, Format::Immediate { opcode: 0x0d }, "Bitwise OR immediate: rt = rs | imm");
basic!(XORI, "xori", R2_U16, Format::Immediate { opcode: 0x0e }, "Bitwise XOR immediate: rt = rs ^ imm");
basic!(LUI, "lui", R1_U16, Format::UpperImmediate { opcode: 0x0f }, "Load upper immediate: rt = imm << 16");

basic!(LB, "lb", MEM, Format::Memory { opcode: 0x20 }, "Load byte: rt = sign-extended byte at offset(base)");
basic!(LB_BASE, "lb", MEM_NO_OFFSET, Format::Memory { opcode: 0x20 }, "Load byte: rt = sign-extended byte at (base)");
basic!(LH, "lh", MEM, Format::Memory { opcode: 0x21 }, "Load halfword: rt = sign-extended halfword at offset(base)");
basic!(LH_BASE, "lh", MEM_NO_OFFSET, Format::Memory { opcode: 0x21 }, "Load halfword: rt = sign-extended halfword at (base)");
basic!(LW, "lw", MEM, Format::Memory { opcode: 0x23 }, "Load word: rt = word at offset(base)");
basic!(LW_BASE, "lw", MEM_NO_OFFSET, Format::Memory { opcode: 0x23 }, "Load word: rt = word at (base)");
basic!(LBU, "lbu", MEM, Format::Memory { opcode: 0x24 }, "Load byte unsigned: rt = zero-extended byte at offset(base)");
basic!(LBU_BASE, "lbu", MEM_NO_OFFSET, Format::Memory { opcode: 0x24 }, "Load byte unsigned: rt = zero-extended byte at (base)");
basic!(LHU, "lhu", MEM, Format::Memory { opcode: 0x25 }, "Load halfword unsigned: rt = zero-extended halfword at offset(base)");
basic!(LHU_BASE, "lhu", MEM_NO_OFFSET, Format::Memory { opcode: 0x25 }, "Load halfword unsigned: rt = zero-extended halfword at (base)");
basic!(SB, "sb", MEM, Format::Memory { opcode: 0x28 }, "Store byte: low byte of rt to offset(base)");
basic!(SB_BASE, "sb", MEM_NO_OFFSET, Format::Memory { opcode: 0x28 }, "Store byte: low byte of rt to (base)");
basic!(SH, "sh", MEM, Format::Memory { opcode: 0x29 }, "Store halfword: low halfword of rt to offset(base)");
basic!(SH_BASE, "sh", MEM_NO_OFFSET, Format::Memory { opcode: 0x29 }, "Store halfword: low halfword of rt to (base)");
basic!(SW, "sw", MEM, Format::Memory { opcode: 0x2b }, "Store word: rt to offset(base)");
basic!(SW_BASE, "sw", MEM_NO_OFFSET, Format::Memory { opcode: 0x2b }, "Store word: rt to (base)");

basic!(BEQ, "beq", BRANCH, Format::Branch { opcode: 0x04 }, "Branch if equal: if rs == rt goto label");
basic!(BNE, "bne", BRANCH, Format::Branch { opcode: 0x05 }, "Branch if not equal: if rs != rt goto label");
basic!(J, "j", JUMP, Format::Jump { opcode: 0x02 }, "Jump unconditionally to label");
basic!(JAL, "jal", JUMP, Format::Jump { opcode: 0x03 }, "Jump and link: $ra = pc + 4, goto label");

static BASIC_INSTRUCTIONS: &[&BasicInstruction] = &[
    &NOP, &SYSCALL, &BREAK, &ADD, &ADDU, &SUB, &SUBU, &AND, &OR, &XOR, &NOR, &SLT, &SLTU, &SLL, &SRL, &SRA, &JR,
    &ADDI, &ADDIU, &SLTI, &SLTIU, &ANDI, &ORI, &XORI, &LUI, &LB, &LB_BASE, &LH, &LH_BASE, &LW, &LW_BASE, &LBU,
    &LBU_BASE, &LHU, &LHU_BASE, &SB, &SB_BASE, &SH, &SH_BASE, &SW, &SW_BASE, &BEQ, &BNE, &J, &JAL,
];

// ==============================================================================
// Extended Instructions
// ==============================================================================

fn at(operands: &[i32], index: usize) -> i32 {
    operands.get(index).copied().unwrap_or(0)
}

fn upper(value: i32) -> i32 {
    ((value as u32) >> 16) as i32
}

fn lower(value: i32) -> i32 {
    ((value as u32) & 0xffff) as i32
}

/// Upper half adjusted for a sign-extended lower half, as used by loads and stores.
fn upper_adjusted(value: i32) -> i32 {
    ((value as u32).wrapping_add(0x8000) >> 16) as i32
}

fn lower_signed(value: i32) -> i32 {
    (value as u32 & 0xffff) as u16 as i16 as i32
}

pub static LI_SIGNED16: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "li",
    operand_types: &[Register, Signed16],
    expansion: &[&ADDIU],
    expand: |ops| vec![vec![at(ops, 0), ZERO, at(ops, 1)]],
    description: "Load immediate: rt = 16-bit signed value",
};

pub static LI_UNSIGNED16: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "li",
    operand_types: &[Register, Unsigned16],
    expansion: &[&ORI],
    expand: |ops| vec![vec![at(ops, 0), ZERO, at(ops, 1)]],
    description: "Load immediate: rt = 16-bit unsigned value",
};

pub static LI_INTEGER32: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "li",
    operand_types: &[Register, Integer32],
    expansion: &[&LUI, &ORI],
    expand: |ops| vec![vec![AT, upper(at(ops, 1))], vec![at(ops, 0), AT, lower(at(ops, 1))]],
    description: "Load immediate: rt = 32-bit value",
};

pub static LA: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "la",
    operand_types: &[Register, Label],
    expansion: &[&LUI, &ORI],
    expand: |ops| vec![vec![AT, upper(at(ops, 1))], vec![at(ops, 0), AT, lower(at(ops, 1))]],
    description: "Load address: rt = address of label",
};

pub static MOVE: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "move",
    operand_types: &[Register, Register],
    expansion: &[&ADDU],
    expand: |ops| vec![vec![at(ops, 0), ZERO, at(ops, 1)]],
    description: "Move: rd = rs",
};

pub static B: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "b",
    operand_types: &[Label],
    expansion: &[&BEQ],
    expand: |ops| vec![vec![ZERO, ZERO, at(ops, 0)]],
    description: "Branch unconditionally to label",
};

pub static BEQZ: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "beqz",
    operand_types: &[Register, Label],
    expansion: &[&BEQ],
    expand: |ops| vec![vec![at(ops, 0), ZERO, at(ops, 1)]],
    description: "Branch if equal to zero",
};

pub static BNEZ: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "bnez",
    operand_types: &[Register, Label],
    expansion: &[&BNE],
    expand: |ops| vec![vec![at(ops, 0), ZERO, at(ops, 1)]],
    description: "Branch if not equal to zero",
};

pub static LW_LABEL: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "lw",
    operand_types: &[Register, Label],
    expansion: &[&LUI, &LW],
    expand: |ops| vec![vec![AT, upper_adjusted(at(ops, 1))], vec![at(ops, 0), lower_signed(at(ops, 1)), AT]],
    description: "Load word: rt = word at label",
};

pub static SW_LABEL: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "sw",
    operand_types: &[Register, Label],
    expansion: &[&LUI, &SW],
    expand: |ops| vec![vec![AT, upper_adjusted(at(ops, 1))], vec![at(ops, 0), lower_signed(at(ops, 1)), AT]],
    description: "Store word: rt to word at label",
};

pub static ADDI_INTEGER32: ExtendedInstruction = ExtendedInstruction {
    mnemonic: "addi",
    operand_types: &[Register, Register, Integer32],
    expansion: &[&LUI, &ORI, &ADD],
    expand: |ops| {
        vec![vec![AT, upper(at(ops, 2))], vec![AT, AT, lower(at(ops, 2))], vec![at(ops, 0), at(ops, 1), AT]]
    },
    description: "Addition immediate with overflow: rt = rs + 32-bit value",
};

static EXTENDED_INSTRUCTIONS: &[&ExtendedInstruction] = &[
    &LI_SIGNED16,
    &LI_UNSIGNED16,
    &LI_INTEGER32,
    &LA,
    &MOVE,
    &B,
    &BEQZ,
    &BNEZ,
    &LW_LABEL,
    &SW_LABEL,
    &ADDI_INTEGER32,
];

// ==============================================================================
// Instruction Set
// ==============================================================================

/// The bundled MIPS32 subset.
#[derive(Debug, Clone, Copy, Default)]
pub struct MipsInstructionSet;

impl MipsInstructionSet {
    pub fn new() -> Self {
        MipsInstructionSet
    }
}

impl InstructionSet for MipsInstructionSet {
    fn name(&self) -> &str {
        "MIPS32"
    }

    fn basic_instructions(&self) -> &[&'static BasicInstruction] {
        BASIC_INSTRUCTIONS
    }

    fn extended_instructions(&self) -> &[&'static ExtendedInstruction] {
        EXTENDED_INSTRUCTIONS
    }

    fn register_number(&self, name: &str) -> Option<u8> {
        register_number(name)
    }

    fn register_name(&self, number: u8) -> String {
        register_name(number)
    }
}
