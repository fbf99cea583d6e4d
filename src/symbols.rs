// symbols.rs
//
// Symbol tables: one per source file for local labels, plus one global table
// that `.globl` and `.extern` populate. A secondary index by address supports
// re-alignment, which moves every symbol sitting in the padding skipped by an
// alignment up to the aligned address.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::DuplicateSymbol;

/// A named address, tagged with whether it lives in a data segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub identifier: String,
    pub address: u32,
    pub is_data: bool,
}

impl Symbol {
    pub fn new(identifier: impl Into<String>, address: u32, is_data: bool) -> Self {
        Symbol { identifier: identifier.into(), address, is_data }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    name: String,
    symbols: HashMap<String, Symbol>,
    by_address: BTreeMap<u32, BTreeSet<String>>,
}

impl SymbolTable {
    /// `name` is the owning filename, or a descriptive name for the global table.
    pub fn new(name: impl Into<String>) -> Self {
        SymbolTable { name: name.into(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a symbol. An identifier already present is left untouched and reported.
    pub fn define(&mut self, symbol: Symbol) -> Result<(), DuplicateSymbol> {
        if let Some(existing) = self.symbols.get(&symbol.identifier) {
            return Err(DuplicateSymbol { identifier: symbol.identifier, address: existing.address });
        }
        self.index(&symbol.identifier, symbol.address);
        self.symbols.insert(symbol.identifier.clone(), symbol);
        Ok(())
    }

    pub fn remove(&mut self, identifier: &str) -> Option<Symbol> {
        let symbol = self.symbols.remove(identifier)?;
        self.unindex(identifier, symbol.address);
        Some(symbol)
    }

    pub fn lookup(&self, identifier: &str) -> Option<&Symbol> {
        self.symbols.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.symbols.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All symbols in address order.
    pub fn all(&self) -> Vec<&Symbol> {
        self.by_address.values().flatten().filter_map(|id| self.symbols.get(id)).collect()
    }

    pub fn data_only(&self) -> Vec<&Symbol> {
        self.all().into_iter().filter(|s| s.is_data).collect()
    }

    pub fn text_only(&self) -> Vec<&Symbol> {
        self.all().into_iter().filter(|s| !s.is_data).collect()
    }

    /// Move every symbol whose address falls in `[old, new)` to `new`.
    /// Returns how many symbols moved.
    pub fn realign(&mut self, old: u32, new: u32) -> usize {
        if new <= old {
            return 0;
        }
        let moved: Vec<String> = self.by_address.range(old..new).flat_map(|(_, ids)| ids.iter().cloned()).collect();
        for identifier in &moved {
            let Some(symbol) = self.symbols.get_mut(identifier) else {
                continue;
            };
            let previous = std::mem::replace(&mut symbol.address, new);
            self.unindex(identifier, previous);
            self.index(identifier, new);
        }
        moved.len()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.by_address.clear();
    }

    fn index(&mut self, identifier: &str, address: u32) {
        self.by_address.entry(address).or_default().insert(identifier.to_string());
    }

    fn unindex(&mut self, identifier: &str, address: u32) {
        if let Some(ids) = self.by_address.get_mut(&address) {
            ids.remove(identifier);
            if ids.is_empty() {
                self.by_address.remove(&address);
            }
        }
    }
}

/// The tables visible while resolving one statement: its file's local table,
/// then the global table.
#[derive(Debug, Clone, Copy)]
pub struct SymbolScope<'a> {
    pub local: Option<&'a SymbolTable>,
    pub global: &'a SymbolTable,
}

impl<'a> SymbolScope<'a> {
    pub fn new(local: Option<&'a SymbolTable>, global: &'a SymbolTable) -> Self {
        SymbolScope { local, global }
    }

    pub fn lookup(&self, identifier: &str) -> Option<&'a Symbol> {
        self.local.and_then(|t| t.lookup(identifier)).or_else(|| self.global.lookup(identifier))
    }
}
