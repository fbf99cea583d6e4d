// patch.rs
//
// Forward references from data directives. A `.word label` seen before `label:`
// stores a placeholder and leaves a patch behind; once the label is known the
// placeholder is overwritten with its address.
//
// Patches from the file being parsed are tried against that file's local table
// and then the global table when the file ends. Whatever is left waits until all
// files are parsed and is tried against the global table alone.

use crate::ast::Token;
use crate::log::AssemblerLog;
use crate::memory::Memory;
use crate::symbols::SymbolTable;

/// Stored at a patch site until the reference is resolved.
pub const PLACEHOLDER: u32 = 0xdead_beef;

/// A memory location waiting for the address of `token`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardReference {
    pub address: u32,
    pub length: u32,
    pub token: Token,
}

#[derive(Debug, Clone, Default)]
pub struct PatchQueue {
    current_file: Vec<ForwardReference>,
    remaining: Vec<ForwardReference>,
}

impl PatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_file(&mut self) {
        self.current_file.clear();
    }

    pub fn push(&mut self, patch: ForwardReference) {
        self.current_file.push(patch);
    }

    pub fn current_file(&self) -> &[ForwardReference] {
        &self.current_file
    }

    pub fn remaining(&self) -> &[ForwardReference] {
        &self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.current_file.is_empty() && self.remaining.is_empty()
    }

    /// End of a file: resolve against `local` then `global`, carry the rest over.
    pub fn finish_file(&mut self, local: &SymbolTable, global: &SymbolTable, memory: &Memory, log: &mut AssemblerLog) {
        let patches = std::mem::take(&mut self.current_file);
        for patch in patches {
            let symbol = local.lookup(&patch.token.literal).or_else(|| global.lookup(&patch.token.literal));
            match symbol {
                Some(symbol) => apply(&patch, symbol.address, memory, log),
                None => self.remaining.push(patch),
            }
        }
    }

    /// After every file: resolve the carried-over patches against `global`. Each
    /// patch still unresolved is reported, in source order.
    pub fn finish_all(&mut self, global: &SymbolTable, memory: &Memory, log: &mut AssemblerLog) {
        let patches = std::mem::take(&mut self.remaining);
        for patch in patches {
            match global.lookup(&patch.token.literal) {
                Some(symbol) => apply(&patch, symbol.address, memory, log),
                None => {
                    if log.has_exceeded_max_error_count() {
                        break;
                    }
                    log.error(Some(&patch.token.location), format!("Undefined symbol '{}'", patch.token.literal));
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.current_file.clear();
        self.remaining.clear();
    }
}

fn apply(patch: &ForwardReference, value: u32, memory: &Memory, log: &mut AssemblerLog) {
    if let Err(e) = memory.store(patch.address, value, patch.length, true) {
        log.error(Some(&patch.token.location), e.to_string());
    }
}
