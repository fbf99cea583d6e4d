use std::sync::Arc;

use crate::config::AssemblerConfig;
use crate::error::Pass;
use crate::listener::MemoryListener;
use crate::log::LogLevel;
use crate::mips;
use crate::statement::BasicStatement;
use crate::test_utils::test_helpers::*;

const TEXT: u32 = 0x0040_0000;
const DATA: u32 = 0x1001_0000;

fn word_at(assembler: &crate::assembler::Assembler, address: u32) -> u32 {
    assembler.memory().fetch_word(address, false).unwrap()
}

// ==============================================================================
// Text
// ==============================================================================

#[test]
fn test_simple_program() {
    let assembler = assemble_ok(
        "
        .text
main:   addi $t0, $zero, 10
        add $t2, $t0, $t1
        lw $t0, 4($sp)
        sll $t0, $t1, 2
        jr $ra
",
    );
    assert_eq!(word_at(&assembler, TEXT), 0x2008_000a);
    assert_eq!(word_at(&assembler, TEXT + 4), 0x0109_5020);
    assert_eq!(word_at(&assembler, TEXT + 8), 0x8fa8_0004);
    assert_eq!(word_at(&assembler, TEXT + 12), 0x0009_4080);
    assert_eq!(word_at(&assembler, TEXT + 16), 0x03e0_0008);
    assert_eq!(assembler.assembled_statements().len(), 5);

    let main = assembler.lookup("test.s", "main").unwrap();
    assert_eq!(main.address, TEXT);
    assert!(!main.is_data);
    assert!(assembler.log().messages().is_empty());
}

#[test]
fn test_extended_instruction_occupies_consecutive_words() {
    let assembler = assemble_ok("li $t0, 0x12345678\nnop\n");
    assert_eq!(word_at(&assembler, TEXT), 0x3c01_1234);
    assert_eq!(word_at(&assembler, TEXT + 4), 0x3428_5678);
    assert_eq!(word_at(&assembler, TEXT + 8), 0);
    assert_eq!(assembler.parsed_statements().len(), 2);
    assert!(assembler.parsed_statements().contains_key(&(TEXT + 8)));

    let first = &assembler.assembled_statements()[&TEXT];
    let second = &assembler.assembled_statements()[&(TEXT + 4)];
    assert_eq!(first.instruction.mnemonic, "lui");
    assert_eq!(second.instruction.mnemonic, "ori");
    assert!(Arc::ptr_eq(first.syntax.as_ref().unwrap(), second.syntax.as_ref().unwrap()));
}

#[test]
fn test_small_li_picks_single_word_form() {
    let assembler = assemble_ok("li $t0, -5\nli $t1, 0xffff\n");
    assert_eq!(assembler.assembled_statements().len(), 2);
    assert_eq!(assembler.assembled_statements()[&TEXT].instruction.mnemonic, "addiu");
    assert_eq!(assembler.assembled_statements()[&(TEXT + 4)].instruction.mnemonic, "ori");
}

#[test]
fn test_branches_and_jumps_to_labels() {
    let assembler = assemble_ok(
        "
start:  beq $t0, $t1, start
        j start
        bne $t0, $zero, end
        nop
end:    jal start
",
    );
    assert_eq!(word_at(&assembler, TEXT), 0x1109_ffff);
    assert_eq!(word_at(&assembler, TEXT + 4), 0x0810_0000);
    assert_eq!(word_at(&assembler, TEXT + 8), 0x1500_0001);
    assert_eq!(word_at(&assembler, TEXT + 16), 0x0c10_0000);
}

#[test]
fn test_label_with_offset() {
    let assembler = assemble_ok(
        "
        .data
arr:    .word 1, 2, 3
        .text
        la $t0, arr+8
",
    );
    // lui $at, 0x1001 ; ori $t0, $at, 8
    assert_eq!(word_at(&assembler, TEXT), 0x3c01_1001);
    assert_eq!(word_at(&assembler, TEXT + 4), 0x3428_0008);
}

#[test]
fn test_kernel_text_sorts_after_user_text() {
    let assembler = assemble_ok(
        "
        .ktext
handler: addi $k0, $zero, 1
        .text
main:   nop
",
    );
    let addresses: Vec<u32> = assembler.assembled_statements().keys().copied().collect();
    assert_eq!(addresses, vec![TEXT, 0x8000_0000]);
    assert_eq!(word_at(&assembler, 0x8000_0000), 0x201a_0001);
    assert_eq!(assembler.lookup("test.s", "handler").unwrap().address, 0x8000_0000);
}

#[test]
fn test_instruction_in_data_segment() {
    let mut assembler = create_test_assembler();
    let err = assembler.assemble_sources(&[("test.s", ".data\nadd $t0, $t1, $t2\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_log_contains(&assembler, LogLevel::Error, "Instruction 'add' cannot be placed in segment .data");
}

// ==============================================================================
// Data Directives
// ==============================================================================

#[test]
fn test_data_label_moves_with_auto_alignment() {
    let assembler = assemble_ok(
        "
        .data
        .byte 1
lbl:    .word 5
        .text
        nop
",
    );
    assert_eq!(assembler.lookup("test.s", "lbl").unwrap().address, DATA + 4);
    assert!(assembler.lookup("test.s", "lbl").unwrap().is_data);
    assert_eq!(assembler.memory().fetch_byte(DATA, false).unwrap(), 1);
    assert_eq!(word_at(&assembler, DATA + 4), 5);
}

#[test]
fn test_strings_halves_and_space() {
    let assembler = assemble_ok(
        "
        .data
msg:    .asciiz \"hi\"
h:      .half 0x1234
        .space 3
        .align 2
w:      .word 9
        .ascii \"ab\"
        .text
        nop
",
    );
    let memory = assembler.memory();
    assert_eq!(memory.fetch_null_terminated_string(DATA).unwrap(), "hi");
    assert_eq!(assembler.lookup("test.s", "h").unwrap().address, DATA + 4);
    assert_eq!(memory.fetch_halfword(DATA + 4, false).unwrap(), 0x1234);
    assert_eq!(assembler.lookup("test.s", "w").unwrap().address, DATA + 12);
    assert_eq!(word_at(&assembler, DATA + 12), 9);
    assert_eq!(memory.fetch_byte(DATA + 16, false).unwrap(), b'a');
    assert_eq!(memory.fetch_byte(DATA + 17, false).unwrap(), b'b');
    assert_eq!(memory.fetch_byte(DATA + 18, false).unwrap(), 0);
}

#[test]
fn test_align_zero_disables_auto_alignment() {
    let mut assembler = create_test_assembler();
    let err = assembler
        .assemble_sources(&[("test.s", ".data\n.byte 1\n.align 0\nw: .half 2\n.text\nnop\n")])
        .unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_eq!(assembler.lookup("test.s", "w").unwrap().address, DATA + 1);
    assert_log_contains(&assembler, LogLevel::Error, "address not aligned on 2-byte boundary");
}

#[test]
fn test_repeat_count_and_truncation() {
    let assembler = assemble_ok(".data\n.word 7 : 3\n.byte 300\n.text\nnop\n");
    assert_eq!(word_at(&assembler, DATA), 7);
    assert_eq!(word_at(&assembler, DATA + 4), 7);
    assert_eq!(word_at(&assembler, DATA + 8), 7);
    assert_eq!(assembler.memory().fetch_byte(DATA + 12, false).unwrap(), 0x2c);
    assert_log_contains(&assembler, LogLevel::Warning, "Value 300 is out of range for directive '.byte'");
}

#[test]
fn test_repeat_count_must_be_positive() {
    let mut assembler = create_test_assembler();
    let err = assembler
        .assemble_sources(&[("test.s", ".data\nx: .word 7 : 0\ny: .word 9\n.text\nnop\n")])
        .unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    let errors = messages_at(&assembler, LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Invalid repeat count '0'"), "{}", errors[0]);
}

#[test]
fn test_list_directive_without_values() {
    let mut assembler = create_test_assembler();
    let err = assembler
        .assemble_sources(&[("test.s", ".data\n.word\n.float\n.asciiz\n.text\nnop\n")])
        .unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    let errors = messages_at(&assembler, LogLevel::Error);
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("Directive '.word' requires one or more values"));
    assert!(errors[1].contains("Directive '.float' requires one or more values"));
    assert!(errors[2].contains("Directive '.asciiz' requires one or more strings"));
}

#[test]
fn test_store_fault_stops_directive() {
    let config = AssemblerConfig { max_error_count: None, warnings_are_errors: false };
    let mut assembler = create_test_assembler_with(config);
    let source = ".data 0x7ffffff8\n.word 1 : 100\n.data 0x7ffffffc\n.asciiz \"abcdefgh\"\n.text\nnop\n";
    let err = assembler.assemble_sources(&[("test.s", source)]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);

    // One error per directive, at the first address past the data segment
    let errors = messages_at(&assembler, LogLevel::Error);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.contains("0x80000000")), "{:?}", errors);
    assert_eq!(word_at(&assembler, 0x7fff_fff8), 1);
    assert_eq!(assembler.memory().fetch_byte(0x7fff_fffc, false).unwrap(), b'a');
}

#[test]
fn test_list_directive_continues_on_next_line() {
    let assembler = assemble_ok(".data\nvalues: .word 1, 2\n  3, 4\n.text\nnop\n");
    assert_eq!(word_at(&assembler, DATA + 12), 4);
}

#[test]
fn test_float_and_double() {
    let assembler = assemble_ok(".data\n.float 2.5\n.double 1.5\n.text\nnop\n");
    let memory = assembler.memory();
    assert_eq!(memory.fetch_word(DATA, false).unwrap(), 2.5f32.to_bits());
    // Doubles are aligned to eight bytes
    assert_eq!(memory.fetch_doubleword(DATA + 8, false).unwrap(), 1.5f64.to_bits());
}

#[test]
fn test_data_directive_in_text_segment() {
    let mut assembler = create_test_assembler();
    assert!(assembler.assemble_sources(&[("test.s", ".word 1\nnop\n")]).is_err());
    assert_log_contains(&assembler, LogLevel::Error, "Directive '.word' can only be used in a data segment");
}

#[test]
fn test_kernel_data() {
    let assembler = assemble_ok(".kdata\nkv: .word 0x55\n.text\nnop\n");
    assert_eq!(assembler.lookup("test.s", "kv").unwrap().address, 0x9000_0000);
    assert_eq!(word_at(&assembler, 0x9000_0000), 0x55);
}

#[test]
fn test_unsupported_directives_warn() {
    let assembler = assemble_ok(".set noreorder\n.eqv LIMIT 10\n.bogus\nnop\n");
    let warnings = messages_at(&assembler, LogLevel::Warning);
    assert_eq!(warnings.len(), 3);
    assert!(warnings[0].contains("'.set' is not supported"));
    assert!(warnings[1].contains("handled by the preprocessor"));
    assert!(warnings[2].contains("'.bogus' is not supported"));
}

// ==============================================================================
// Symbols
// ==============================================================================

#[test]
fn test_forward_data_reference_in_same_file() {
    let assembler = assemble_ok(
        "
        .data
ptr:    .word target
back:   .word ptr
target: .word 7
        .text
        nop
",
    );
    assert_eq!(word_at(&assembler, DATA), DATA + 8);
    assert_eq!(word_at(&assembler, DATA + 4), DATA);
}

#[test]
fn test_global_label_defined_in_later_file() {
    let mut assembler = create_test_assembler();
    assembler
        .assemble_sources(&[
            ("a.s", ".data\nref: .word shared\n.text\nnop\n"),
            ("b.s", ".globl shared\n.data\nshared: .word 3\n"),
        ])
        .unwrap();
    let shared = assembler.global_symbols().lookup("shared").unwrap();
    assert_eq!(shared.address, DATA + 4);
    assert!(!assembler.local_symbols("b.s").unwrap().contains("shared"));
    assert_eq!(word_at(&assembler, DATA), DATA + 4);
    assert_eq!(word_at(&assembler, DATA + 4), 3);
}

#[test]
fn test_local_labels_are_per_file() {
    let mut assembler = create_test_assembler();
    assembler
        .assemble_sources(&[("a.s", "loop: nop\nj loop\n"), ("b.s", "loop: nop\nj loop\n")])
        .unwrap();
    assert_eq!(assembler.lookup("a.s", "loop").unwrap().address, TEXT);
    assert_eq!(assembler.lookup("b.s", "loop").unwrap().address, TEXT + 8);
    assert_eq!(word_at(&assembler, TEXT + 4), 0x0810_0000);
    assert_eq!(word_at(&assembler, TEXT + 12), 0x0810_0002);
}

#[test]
fn test_global_label_used_from_other_file() {
    let mut assembler = create_test_assembler();
    let files = vec![
        tokenize_ok("main.s", ".globl main\nmain: jal helper\n"),
        tokenize_ok("lib.s", ".globl helper\nhelper: jr $ra\n"),
    ];
    assembler.assemble(&files).unwrap();
    assert_eq!(assembler.global_symbols().len(), 2);
    assert_eq!(word_at(&assembler, TEXT), 0x0c10_0001);
    assert_eq!(assembler.lookup("main.s", "helper").unwrap().address, TEXT + 4);
}

#[test]
fn test_undefined_forward_reference() {
    let mut assembler = create_test_assembler();
    let err = assembler.assemble_sources(&[("test.s", ".data\n.word nowhere\n.text\nnop\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_eq!(err.error_count(), 1);
    assert!(err.messages[0].content.contains("Undefined symbol 'nowhere'"));
    assert_eq!(err.messages[0].location.as_ref().unwrap().line, 2);
}

#[test]
fn test_undefined_operand_fails_resolution() {
    let mut assembler = create_test_assembler();
    let err = assembler.assemble_sources(&[("test.s", "nop\nj nowhere\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Resolve);
    assert_log_contains(&assembler, LogLevel::Error, "Symbol 'nowhere' not found in symbol table");
    assert!(assembler.assembled_statements().is_empty());
}

#[test]
fn test_duplicate_label_keeps_first() {
    let mut assembler = create_test_assembler();
    let err = assembler.assemble_sources(&[("test.s", "a: nop\na: nop\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_log_contains(&assembler, LogLevel::Error, "Symbol 'a' is already defined at 0x00400000");
    assert_eq!(assembler.lookup("test.s", "a").unwrap().address, TEXT);
}

#[test]
fn test_globl_without_definition() {
    let mut assembler = create_test_assembler();
    assert!(assembler.assemble_sources(&[("test.s", ".globl missing\nnop\n")]).is_err());
    assert_log_contains(&assembler, LogLevel::Error, "Symbol 'missing' is declared global but not defined in this file");
}

#[test]
fn test_globl_defined_in_two_files() {
    let mut assembler = create_test_assembler();
    let result = assembler.assemble_sources(&[("a.s", ".globl f\nf: nop\n"), ("b.s", ".globl f\nf: nop\n")]);
    assert!(result.is_err());
    assert_log_contains(&assembler, LogLevel::Error, "Symbol 'f' is already defined in the global symbol table");
}

#[test]
fn test_globl_repeated_warns() {
    let assembler = assemble_ok(".globl main, main\nmain: nop\n");
    assert_log_contains(&assembler, LogLevel::Warning, "Symbol 'main' is already declared global");
    assert!(assembler.global_symbols().contains("main"));
}

#[test]
fn test_extern() {
    let assembler = assemble_ok(".extern buf 16\n.extern other 4\n.extern buf 8\nla $t0, buf\n");
    let globals = assembler.global_symbols();
    assert_eq!(globals.lookup("buf").unwrap().address, 0x1000_0000);
    assert_eq!(globals.lookup("other").unwrap().address, 0x1000_0010);
    assert!(globals.lookup("buf").unwrap().is_data);
    assert_eq!(word_at(&assembler, TEXT), 0x3c01_1000);
    assert_eq!(word_at(&assembler, TEXT + 4), 0x3428_0000);
}

// ==============================================================================
// Placement
// ==============================================================================

#[test]
fn test_overlapping_statements_in_pass_one() {
    let mut assembler = create_test_assembler();
    let err = assembler
        .assemble_sources(&[("test.s", ".text\nnop\n.text 0x00400000\nadd $t0, $t1, $t2\n")])
        .unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_log_contains(&assembler, LogLevel::Error, "Address 0x00400000 is already occupied by the statement at test.s, line 2");
    assert_eq!(assembler.parsed_statements().len(), 1);
}

#[test]
fn test_place_statement_keeps_first() {
    let mut assembler = assemble_ok("addi $t0, $zero, 10\n");
    let syscall = Arc::new(BasicStatement::new(&mips::SYSCALL, Vec::new(), 0x0000_000c, None));
    assembler.place_statement(TEXT, syscall);
    assert_eq!(word_at(&assembler, TEXT), 0x2008_000a);
    assert_log_contains(&assembler, LogLevel::Error, "Address 0x00400000 is already occupied by the statement at test.s, line 1");
}

#[test]
fn test_branch_out_of_range_reported_at_placement() {
    let mut assembler = create_test_assembler();
    let err = assembler
        .assemble_sources(&[("test.s", "beq $t0, $t1, far\n.text 0x00500000\nfar: nop\n")])
        .unwrap_err();
    assert_eq!(err.pass, Pass::Place);
    assert_log_contains(&assembler, LogLevel::Error, "out of range");
}

// ==============================================================================
// Pipeline
// ==============================================================================

#[test]
fn test_no_files() {
    let mut assembler = create_test_assembler();
    let err = assembler.assemble_sources(&[]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_eq!(err.messages[0].content, "No source files to assemble");
}

#[test]
fn test_no_statements() {
    let mut assembler = create_test_assembler();
    let err = assembler.assemble_sources(&[("test.s", ".data\n.word 1\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    assert_eq!(err.messages[0].content, "No statements found to assemble");
}

#[test]
fn test_max_error_count() {
    let config = AssemblerConfig { max_error_count: Some(2), warnings_are_errors: false };
    let mut assembler = create_test_assembler_with(config);
    let err = assembler.assemble_sources(&[("test.s", "frob\nfrob\nfrob\nfrob\nfrob\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Parse);
    let errors = messages_at(&assembler, LogLevel::Error);
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("Mnemonic 'frob' does not correspond to any known instruction"));
    assert_eq!(errors.iter().filter(|m| m.contains("Maximum error count exceeded")).count(), 1);
}

#[test]
fn test_unlimited_error_count() {
    let config = AssemblerConfig { max_error_count: None, warnings_are_errors: false };
    let mut assembler = create_test_assembler_with(config);
    let source = "frob\n".repeat(300);
    assert!(assembler.assemble_sources(&[("test.s", &source)]).is_err());
    assert_eq!(assembler.log().error_count(), 300);
}

#[test]
fn test_warnings_are_errors() {
    let assembler = assemble_ok(".set noreorder\nnop\n");
    assert_eq!(assembler.log().warning_count(), 1);

    let config = AssemblerConfig { warnings_are_errors: true, ..Default::default() };
    let mut assembler = create_test_assembler_with(config);
    let err = assembler.assemble_sources(&[("test.s", ".set noreorder\nnop\n")]).unwrap_err();
    assert_eq!(err.pass, Pass::Place);
    assert_eq!(err.warning_count(), 1);
    assert_eq!(err.error_count(), 0);
}

#[test]
fn test_tokenizer_errors_fail_parse() {
    let mut assembler = create_test_assembler();
    assert!(assembler.assemble_sources(&[("test.s", "nop\nli $t0, \"unterminated\n")]).is_err());
    assert!(assembler.log().has_errors());
}

#[test]
fn test_listeners_see_assembly_writes() {
    let mut assembler = create_test_assembler();
    let recorder = RecordingListener::new();
    assembler.memory().add_listener_everywhere(Arc::clone(&recorder) as Arc<dyn MemoryListener>);
    assembler.assemble_sources(&[("test.s", ".data\n.word 5\n.text\naddi $t0, $zero, 10\n")]).unwrap();

    let events = recorder.events();
    assert_eq!(events.first(), Some(&Event::Reset));
    let writes = recorder.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!((writes[0].address, writes[0].value), (DATA, 5));
    assert_eq!((writes[1].address, writes[1].value), (TEXT, 0x2008_000a));
}

#[test]
fn test_reset_between_runs() {
    let mut assembler = assemble_ok(".globl main\nmain: addi $t0, $zero, 10\n");
    assembler.reset();
    assert!(assembler.global_symbols().is_empty());
    assert!(assembler.assembled_statements().is_empty());
    assert!(assembler.log().messages().is_empty());
    assert_eq!(word_at(&assembler, TEXT), 0);

    assembler.assemble_sources(&[("again.s", "main: jr $ra\n")]).unwrap();
    assert_eq!(word_at(&assembler, TEXT), 0x03e0_0008);
    assert!(assembler.local_symbols("test.s").is_none());
}

#[test]
fn test_segment_cursors_continue_across_files() {
    let mut assembler = create_test_assembler();
    assembler
        .assemble_sources(&[("a.s", ".data\nx: .word 1\n.text\nnop\n"), ("b.s", "nop\n.data\ny: .word 2\n")])
        .unwrap();
    // b.s starts in text again, after a.s's code
    assert_eq!(assembler.assembled_statements().keys().copied().collect::<Vec<_>>(), vec![TEXT, TEXT + 4]);
    assert_eq!(assembler.lookup("b.s", "y").unwrap().address, DATA + 4);
}
