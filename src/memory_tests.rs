use std::sync::Arc;

use crate::config::MemoryConfig;
use crate::error::{AccessKind, AddressFault};
use crate::layout::{LayoutPreset, MemoryLayout};
use crate::memory::*;
use crate::mips;
use crate::statement::BasicStatement;
use crate::test_utils::test_helpers::*;

const DATA: u32 = 0x1001_0000;
const TEXT: u32 = 0x0040_0000;

fn addi_t0_10() -> Arc<BasicStatement> {
    Arc::new(BasicStatement::new(&mips::ADDI, vec![8, 0, 10], 0x2008_000a, None))
}

#[test]
fn test_word_round_trip() {
    let memory = create_test_memory();
    assert_eq!(memory.store_word(DATA, 0xdead_beef, false).unwrap(), 0);
    assert_eq!(memory.fetch_word(DATA, false).unwrap(), 0xdead_beef);
    assert_eq!(memory.store_word(DATA, 1, false).unwrap(), 0xdead_beef);
}

#[test]
fn test_little_endian_byte_order() {
    let memory = create_test_memory_with(Endianness::Little, false);
    memory.store_word(DATA, 0x1122_3344, false).unwrap();
    assert_eq!(memory.fetch_byte(DATA, false).unwrap(), 0x44);
    assert_eq!(memory.fetch_byte(DATA + 3, false).unwrap(), 0x11);
    assert_eq!(memory.fetch_halfword(DATA, false).unwrap(), 0x3344);
    assert_eq!(memory.fetch_halfword(DATA + 2, false).unwrap(), 0x1122);
}

#[test]
fn test_big_endian_byte_order() {
    let memory = create_test_memory_with(Endianness::Big, false);
    memory.store_word(DATA, 0x1122_3344, false).unwrap();
    assert_eq!(memory.fetch_byte(DATA, false).unwrap(), 0x11);
    assert_eq!(memory.fetch_byte(DATA + 3, false).unwrap(), 0x44);
    assert_eq!(memory.fetch_halfword(DATA, false).unwrap(), 0x1122);
}

#[test]
fn test_halfwords_reassemble_word() {
    let little = create_test_memory_with(Endianness::Little, false);
    little.store_halfword(DATA, 0x3344, false).unwrap();
    little.store_halfword(DATA + 2, 0x1122, false).unwrap();
    assert_eq!(little.fetch_word(DATA, false).unwrap(), 0x1122_3344);

    let big = create_test_memory_with(Endianness::Big, false);
    big.store_halfword(DATA, 0x1122, false).unwrap();
    big.store_halfword(DATA + 2, 0x3344, false).unwrap();
    assert_eq!(big.fetch_word(DATA, false).unwrap(), 0x1122_3344);
}

#[test]
fn test_bytes_splice_into_existing_word() {
    let memory = create_test_memory();
    memory.store_word(DATA, 0xaabb_ccdd, false).unwrap();
    assert_eq!(memory.store_byte(DATA + 1, 0x00, false).unwrap(), 0xcc);
    assert_eq!(memory.fetch_word(DATA, false).unwrap(), 0xaabb_00dd);
}

#[test]
fn test_endianness_switch_at_runtime() {
    let memory = create_test_memory();
    memory.store_word(DATA, 0x1122_3344, false).unwrap();
    memory.set_endianness(Endianness::Big);
    assert_eq!(memory.endianness(), Endianness::Big);
    assert_eq!(memory.fetch_byte(DATA, false).unwrap(), 0x11);
}

#[test]
fn test_doubleword_word_order() {
    let little = create_test_memory_with(Endianness::Little, false);
    little.store_doubleword(DATA, 0x0102_0304_0506_0708, false).unwrap();
    assert_eq!(little.fetch_word(DATA, false).unwrap(), 0x0506_0708);
    assert_eq!(little.fetch_word(DATA + 4, false).unwrap(), 0x0102_0304);
    assert_eq!(little.fetch_doubleword(DATA, false).unwrap(), 0x0102_0304_0506_0708);

    let big = create_test_memory_with(Endianness::Big, false);
    big.store_doubleword(DATA, 0x0102_0304_0506_0708, false).unwrap();
    assert_eq!(big.fetch_word(DATA, false).unwrap(), 0x0102_0304);
    assert_eq!(big.fetch_doubleword(DATA, false).unwrap(), 0x0102_0304_0506_0708);
}

#[test]
fn test_doubleword_needs_only_word_alignment() {
    let memory = create_test_memory();
    assert!(memory.store_doubleword(DATA + 4, 7, false).is_ok());
    let err = memory.fetch_doubleword(DATA + 2, false).unwrap_err();
    assert_eq!(err.fault, AddressFault::Misaligned(4));
}

#[test]
fn test_alignment_errors() {
    let memory = create_test_memory();
    let err = memory.fetch_word(DATA + 2, false).unwrap_err();
    assert_eq!(err.address, DATA + 2);
    assert_eq!(err.kind, AccessKind::Load);
    assert_eq!(err.fault, AddressFault::Misaligned(4));

    let err = memory.store_halfword(DATA + 1, 0, false).unwrap_err();
    assert_eq!(err.kind, AccessKind::Store);
    assert_eq!(err.fault, AddressFault::Misaligned(2));

    assert!(memory.store_byte(DATA + 3, 1, false).is_ok());
}

#[test]
fn test_out_of_range() {
    let memory = create_test_memory();
    let err = memory.fetch_word(0x0000_1000, false).unwrap_err();
    assert_eq!(err.fault, AddressFault::OutOfRange);
    assert_eq!(err.to_string(), "load at 0x00001000: segmentation fault (address out of range)");
}

#[test]
fn test_unwritten_memory_reads_zero() {
    let memory = create_test_memory();
    assert_eq!(memory.fetch_word(0x7fff_effc, false).unwrap(), 0);
    assert_eq!(memory.fetch_word(TEXT, false).unwrap(), 0);
    assert_eq!(memory.fetch_word(0x9000_0000, false).unwrap(), 0);
    assert_eq!(memory.fetch_word_or_absent(DATA).unwrap(), None);
}

#[test]
fn test_text_write_protected_without_self_modifying_code() {
    let memory = create_test_memory();
    memory.store_statement(TEXT, addi_t0_10(), false).unwrap();

    let err = memory.store_word(TEXT, 0x0000_000c, false).unwrap_err();
    assert_eq!(err.fault, AddressFault::TextWriteProtected);
    assert_eq!(memory.fetch_word(TEXT, false).unwrap(), 0x2008_000a);
    let statement = memory.fetch_statement(TEXT, false).unwrap().unwrap();
    assert_eq!(statement.instruction.mnemonic, "addi");
}

#[test]
fn test_text_write_decodes_with_self_modifying_code() {
    let memory = create_test_memory_with(Endianness::Little, true);
    memory.store_statement(TEXT, addi_t0_10(), false).unwrap();

    assert_eq!(memory.store_word(TEXT, 0x0000_000c, false).unwrap(), 0x2008_000a);
    let statement = memory.fetch_statement(TEXT, false).unwrap().unwrap();
    assert_eq!(statement.instruction.mnemonic, "syscall");
    assert_eq!(statement.binary, 0x0000_000c);
}

#[test]
fn test_text_byte_write_redecodes_word() {
    let memory = create_test_memory_with(Endianness::Little, true);
    memory.store_statement(TEXT, addi_t0_10(), false).unwrap();
    // Low byte holds the immediate under little-endian
    memory.store_byte(TEXT, 0x14, false).unwrap();
    let statement = memory.fetch_statement(TEXT, false).unwrap().unwrap();
    assert_eq!(statement.operands, vec![8, 0, 20]);
}

#[test]
fn test_undecodable_text_write_leaves_word_unchanged() {
    let memory = create_test_memory_with(Endianness::Little, true);
    memory.store_statement(TEXT, addi_t0_10(), false).unwrap();
    let err = memory.store_word(TEXT, 0xffff_ffff, false).unwrap_err();
    assert_eq!(err.fault, AddressFault::Undecodable(0xffff_ffff));
    assert_eq!(memory.fetch_word(TEXT, false).unwrap(), 0x2008_000a);
}

#[test]
fn test_code_in_data_requires_self_modifying_code() {
    let memory = create_test_memory();
    let err = memory.store_statement(DATA, addi_t0_10(), false).unwrap_err();
    assert_eq!(err.fault, AddressFault::CodeOutsideText);
    memory.store_word(DATA, 0x2008_000a, false).unwrap();
    let err = memory.fetch_statement(DATA, false).unwrap_err();
    assert_eq!(err.fault, AddressFault::CodeOutsideText);

    memory.set_self_modifying_code(true);
    let statement = memory.fetch_statement(DATA, false).unwrap().unwrap();
    assert_eq!(statement.instruction.mnemonic, "addi");
    assert_eq!(statement.operands, vec![8, 0, 10]);
    memory.store_statement(DATA + 4, addi_t0_10(), false).unwrap();
    assert_eq!(memory.fetch_word(DATA + 4, false).unwrap(), 0x2008_000a);
}

#[test]
fn test_fetch_statement_empty_text() {
    let memory = create_test_memory();
    assert!(memory.fetch_statement(TEXT + 8, false).unwrap().is_none());
}

#[test]
fn test_first_unwritten_is_block_granular() {
    let memory = create_test_memory();
    assert_eq!(memory.first_unwritten(DATA, DATA + 0x100).unwrap(), Some(DATA));
    memory.store_word(DATA, 1, false).unwrap();
    assert_eq!(memory.first_unwritten(DATA, DATA + 0x100).unwrap(), None);
    assert_eq!(memory.first_unwritten(DATA, DATA + 0x2000).unwrap(), Some(DATA + 0x1000));
}

#[test]
fn test_null_terminated_string() {
    let memory = create_test_memory();
    for (i, byte) in b"hello\0world".iter().enumerate() {
        memory.store_byte(DATA + i as u32, *byte, false).unwrap();
    }
    assert_eq!(memory.fetch_null_terminated_string(DATA).unwrap(), "hello");
    assert_eq!(memory.fetch_null_terminated_string(DATA + 6).unwrap(), "world");
}

#[test]
fn test_heap_allocation() {
    let memory = create_test_memory();
    assert_eq!(memory.allocate_heap_space(5).unwrap(), 0x1004_0000);
    assert_eq!(memory.allocate_heap_space(4).unwrap(), 0x1004_0008);
    assert_eq!(memory.allocate_heap_space(0).unwrap(), 0x1004_000c);
    assert!(memory.allocate_heap_space(0x8000_0000).is_err());
    memory.reset();
    assert_eq!(memory.allocate_heap_space(4).unwrap(), 0x1004_0000);
}

#[test]
fn test_reset_discards_contents() {
    let memory = create_test_memory();
    memory.store_word(DATA, 5, false).unwrap();
    memory.store_statement(TEXT, addi_t0_10(), false).unwrap();
    memory.reset();
    assert_eq!(memory.fetch_word(DATA, false).unwrap(), 0);
    assert!(memory.fetch_statement(TEXT, false).unwrap().is_none());
}

#[test]
fn test_reset_with_other_layout() {
    let memory = create_test_memory();
    memory.reset_with(MemoryLayout::from_preset(LayoutPreset::CompactTextAtZero));
    assert_eq!(memory.layout().text.first, 0);
    memory.store_statement(0, addi_t0_10(), false).unwrap();
    assert_eq!(memory.fetch_word(0, false).unwrap(), 0x2008_000a);
    assert!(memory.fetch_word(DATA, false).is_err());
}

#[test]
fn test_kernel_addresses() {
    let memory = Memory::new(mips(), MemoryConfig::default());
    memory.store_word(0x9000_0000, 0xcafe_f00d, false).unwrap();
    assert_eq!(memory.fetch_word(0x9000_0000, false).unwrap(), 0xcafe_f00d);
    memory.store_statement(0x8000_0180, addi_t0_10(), false).unwrap();
    assert_eq!(memory.fetch_word(0x8000_0180, false).unwrap(), 0x2008_000a);
    memory.store_word(0xffff_0000, 1, false).unwrap();
    assert_eq!(memory.fetch_word(0xffff_0000, false).unwrap(), 1);
}
