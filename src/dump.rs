// dump.rs
//
// Text listings of an assembled program: symbol tables, the assembled text
// segments and the written part of a data segment.

use std::fmt::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::assembler::Assembler;
use crate::error::AddressError;
use crate::layout::Range;
use crate::memory::{Endianness, Memory, WORD};
use crate::symbols::SymbolTable;

/// Words shown per row of a data dump.
const WORDS_PER_ROW: u32 = 4;

// ============================================================================
// Symbols
// ============================================================================

fn write_table(out: &mut String, table: &SymbolTable) {
    let _ = writeln!(out, "{}", table.name());
    let _ = writeln!(out, "{}", "=".repeat(60));
    if table.is_empty() {
        let _ = writeln!(out, "  (empty)");
    }
    for symbol in table.all() {
        let kind = if symbol.is_data { "data" } else { "text" };
        let _ = writeln!(out, "  0x{:08x}  {:4}  {}", symbol.address, kind, symbol.identifier);
    }
    out.push('\n');
}

/// The global table followed by each file's local table, files in name order.
pub fn dump_symbols(assembler: &Assembler) -> String {
    let mut out = String::from("========== SYMBOLS ==========\n\n");
    write_table(&mut out, assembler.global_symbols());
    let mut locals: Vec<&SymbolTable> = assembler.local_symbol_tables().collect();
    locals.sort_by(|a, b| a.name().cmp(b.name()));
    for table in locals {
        write_table(&mut out, table);
    }
    out
}

// ============================================================================
// Text
// ============================================================================

/// One line per assembled word: address, encoding, basic form and source.
pub fn dump_text(assembler: &Assembler) -> String {
    let mut out = String::from("========== TEXT ==========\n\n");
    let mut previous_source: Option<(String, u32)> = None;
    for (address, statement) in assembler.assembled_statements() {
        let _ = write!(out, "0x{:08x}  0x{:08x}  {:28}", address, statement.binary, statement.to_string());
        if let Some(syntax) = &statement.syntax {
            let location = syntax.location();
            let key = (location.file.clone(), location.line);
            // Expansions share one source line; show it on the first word only
            if previous_source.as_ref() != Some(&key) {
                let _ = write!(out, "  {:>4}: {}", location.line, syntax.source_text);
                previous_source = Some(key);
            }
        }
        out.push('\n');
    }
    out
}

// ============================================================================
// Data
// ============================================================================

fn word_bytes(word: u32, endianness: Endianness) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    match endianness {
        Endianness::Little => LittleEndian::write_u32(&mut bytes, word),
        Endianness::Big => BigEndian::write_u32(&mut bytes, word),
    }
    bytes
}

/// Rows of words from the start of `range` up to the first never-written word,
/// each followed by the printable characters of its bytes in address order.
pub fn dump_data(memory: &Memory, range: Range) -> Result<String, AddressError> {
    let mut out = String::from("========== DATA ==========\n\n");
    let end = memory.first_unwritten(range.first, range.last)?.unwrap_or(range.last);
    let endianness = memory.endianness();

    let mut row = range.first;
    while row < end {
        let _ = write!(out, "0x{:08x} ", row);
        let mut text = String::new();
        for i in 0..WORDS_PER_ROW {
            let address = row.wrapping_add(i * WORD);
            if address >= end {
                let _ = write!(out, "           ");
                continue;
            }
            let word = memory.fetch_word(address, false)?;
            let _ = write!(out, " 0x{:08x}", word);
            for byte in word_bytes(word, endianness) {
                text.push(if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' });
            }
        }
        let _ = writeln!(out, "  {}", text);
        match row.checked_add(WORDS_PER_ROW * WORD) {
            Some(next) => row = next,
            None => break,
        }
    }
    Ok(out)
}
