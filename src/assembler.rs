// assembler.rs
//
// The assembly pipeline.
//
// Pass 1 walks every file's syntax units, defining labels, running directives
// and recording parsed statements at the segment cursors. Forward references
// from data directives are patched per file and again once all files are seen.
// Pass 2 resolves operands of every parsed statement against the symbol tables
// of the file it came from. Pass 3 encodes each resolved statement and places it
// in memory.
//
// Diagnostics go to the `AssemblerLog`. Each pass ends at a gate that turns any
// logged error into a single `AssemblyError`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::ast::{Location, SourceFile, Token};
use crate::config::AssemblerConfig;
use crate::error::{AssemblyError, Pass, Result};
use crate::isa::InstructionSet;
use crate::log::AssemblerLog;
use crate::memory::{DOUBLEWORD, Memory};
use crate::parser::SyntaxParser;
use crate::patch::{ForwardReference, PLACEHOLDER, PatchQueue};
use crate::segment::{SegmentAllocator, SegmentKind};
use crate::statement::{BasicStatement, Statement, StatementSyntax};
use crate::symbols::{Symbol, SymbolScope, SymbolTable};
use crate::tokenizer::tokenize;

/// Name of the global symbol table.
pub const GLOBAL_TABLE_NAME: &str = "(global)";

pub struct Assembler {
    config: AssemblerConfig,
    isa: Arc<dyn InstructionSet>,
    memory: Arc<Memory>,
    log: AssemblerLog,
    parsed_statements: BTreeMap<u32, Arc<StatementSyntax>>,
    resolved_statements: BTreeMap<u32, Statement>,
    assembled_statements: BTreeMap<u32, Arc<BasicStatement>>,
    global_symbols: SymbolTable,
    local_symbols: HashMap<String, SymbolTable>,
    current_file: String,
    pending_globals: Vec<Token>,
    patches: PatchQueue,
    segments: SegmentAllocator,
}

impl Assembler {
    pub fn new(config: AssemblerConfig, isa: Arc<dyn InstructionSet>, memory: Arc<Memory>) -> Self {
        let segments = SegmentAllocator::new(&memory.layout());
        Assembler {
            config,
            isa,
            memory,
            log: AssemblerLog::new(config.max_error_count),
            parsed_statements: BTreeMap::new(),
            resolved_statements: BTreeMap::new(),
            assembled_statements: BTreeMap::new(),
            global_symbols: SymbolTable::new(GLOBAL_TABLE_NAME),
            local_symbols: HashMap::new(),
            current_file: String::new(),
            pending_globals: Vec::new(),
            patches: PatchQueue::new(),
            segments,
        }
    }

    /// Discard everything from previous runs, including the contents of memory.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.log = AssemblerLog::new(self.config.max_error_count);
        self.parsed_statements.clear();
        self.resolved_statements.clear();
        self.assembled_statements.clear();
        self.global_symbols = SymbolTable::new(GLOBAL_TABLE_NAME);
        self.local_symbols.clear();
        self.current_file.clear();
        self.pending_globals.clear();
        self.patches.clear();
        self.segments = SegmentAllocator::new(&self.memory.layout());
    }

    /// Reset, tokenize `(filename, text)` pairs and assemble them in order.
    pub fn assemble_sources(&mut self, sources: &[(&str, &str)]) -> Result<()> {
        self.reset();
        let files: Vec<SourceFile> =
            sources.iter().map(|(filename, text)| tokenize(filename, text, &mut self.log)).collect();
        self.assemble(&files)
    }

    /// Assemble tokenized files in order. The assembler must be fresh or reset;
    /// anything already in the log (tokenizer errors, say) counts against pass 1.
    pub fn assemble(&mut self, files: &[SourceFile]) -> Result<()> {
        if files.is_empty() {
            self.log.error(None, "No source files to assemble");
            return self.gate(Pass::Parse);
        }

        self.parse_files(files);
        if self.parsed_statements.is_empty() && !self.log.has_errors() {
            self.log.error(None, "No statements found to assemble");
        }
        self.gate(Pass::Parse)?;

        self.resolve_statements();
        self.gate(Pass::Resolve)?;

        self.place_statements();
        self.gate(Pass::Place)?;
        if self.config.warnings_are_errors && self.log.has_warnings() {
            return Err(AssemblyError::new(Pass::Place, self.log.messages().to_vec()));
        }
        Ok(())
    }

    fn gate(&self, pass: Pass) -> Result<()> {
        if self.log.has_errors() {
            tracing::info!(%pass, errors = self.log.error_count(), "assembly failed");
            return Err(AssemblyError::new(pass, self.log.messages().to_vec()));
        }
        Ok(())
    }

    // ==========================================================================
    // Pass 1
    // ==========================================================================

    fn parse_files(&mut self, files: &[SourceFile]) {
        let _span = tracing::info_span!("parse").entered();
        let isa = Arc::clone(&self.isa);

        'files: for file in files {
            tracing::debug!(file = %file.filename, lines = file.lines.len(), "parsing file");
            self.current_file = file.filename.clone();
            self.local_symbols.insert(file.filename.clone(), SymbolTable::new(&file.filename));
            self.pending_globals.clear();
            self.segments.switch_to(SegmentKind::Text);
            self.patches.start_file();

            let mut parser = SyntaxParser::new(isa.as_ref(), file);
            while let Some(syntax) = parser.next_syntax(&mut self.log) {
                syntax.process(self);
                if self.log.has_exceeded_max_error_count() {
                    break 'files;
                }
            }

            self.promote_globals();
            if let Some(local) = self.local_symbols.get(&file.filename) {
                self.patches.finish_file(local, &self.global_symbols, &self.memory, &mut self.log);
            }
        }

        self.patches.finish_all(&self.global_symbols, &self.memory, &mut self.log);
        tracing::info!(statements = self.parsed_statements.len(), "parse complete");
    }

    /// Move the current file's `.globl` labels from its local table to the global table.
    fn promote_globals(&mut self) {
        let pending = std::mem::take(&mut self.pending_globals);
        let Some(local) = self.local_symbols.get_mut(&self.current_file) else {
            return;
        };
        for token in pending {
            if self.global_symbols.contains(&token.literal) {
                self.log.error(
                    Some(&token.location),
                    format!("Symbol '{}' is already defined in the global symbol table", token.literal),
                );
                continue;
            }
            let Some(symbol) = local.remove(&token.literal) else {
                self.log.error(
                    Some(&token.location),
                    format!("Symbol '{}' is declared global but not defined in this file", token.literal),
                );
                continue;
            };
            if let Err(e) = self.global_symbols.define(symbol) {
                self.log.error(Some(&token.location), e.to_string());
            }
        }
    }

    /// Define `token` in the current file's table at the active cursor.
    pub(crate) fn define_label(&mut self, token: &Token) {
        let address = self.segments.current_address();
        let is_data = self.segments.active().is_data();
        let Some(local) = self.local_symbols.get_mut(&self.current_file) else {
            return;
        };
        if let Err(e) = local.define(Symbol::new(token.literal.clone(), address, is_data)) {
            self.log.error(Some(&token.location), e.to_string());
        }
    }

    /// Record a parsed statement at the active cursor and advance past it.
    pub(crate) fn add_parsed_statement(&mut self, syntax: StatementSyntax) {
        let address = self.segments.current_address();
        let size = syntax.size_bytes();
        if self.segments.active().is_data() {
            self.log.error(
                Some(syntax.location()),
                format!("Instruction '{}' cannot be placed in segment {}", syntax.mnemonic.literal, self.segments.active_kind()),
            );
        } else if let Some(existing) = self.parsed_statements.get(&address) {
            self.log.error(
                Some(syntax.location()),
                format!("Address 0x{:08x} is already occupied by the statement at {}", address, existing.location()),
            );
        } else {
            self.parsed_statements.insert(address, Arc::new(syntax));
        }
        self.segments.increment(size);
    }

    /// Align the active cursor, moving labels left in the padding with it.
    pub(crate) fn align_cursor(&mut self, alignment: u32) {
        let local = self.local_symbols.get_mut(&self.current_file);
        self.segments.align_to(alignment, local);
    }

    /// Address of `identifier` in the current file's table.
    pub(crate) fn local_address(&self, identifier: &str) -> Option<u32> {
        self.local_symbols.get(&self.current_file)?.lookup(identifier).map(|s| s.address)
    }

    /// Store `length` bytes of `value` at the active cursor and advance.
    /// Returns false after logging a store fault; the caller abandons the directive.
    pub(crate) fn write_data(&mut self, location: &Location, value: u32, length: u32) -> bool {
        let address = self.segments.current_address();
        if let Err(e) = self.memory.store(address, value, length, true) {
            self.log.error(Some(location), e.to_string());
            return false;
        }
        self.segments.increment(length);
        true
    }

    pub(crate) fn write_doubleword(&mut self, location: &Location, value: u64) -> bool {
        let address = self.segments.current_address();
        if let Err(e) = self.memory.store_doubleword(address, value, true) {
            self.log.error(Some(location), e.to_string());
            return false;
        }
        self.segments.increment(DOUBLEWORD);
        true
    }

    /// Store a placeholder for a label not yet defined, and queue a patch for it.
    pub(crate) fn write_forward_reference(&mut self, token: &Token, length: u32) -> bool {
        let address = self.segments.current_address();
        if !self.write_data(&token.location, PLACEHOLDER, length) {
            return false;
        }
        self.patches.push(ForwardReference { address, length, token: token.clone() });
        true
    }

    /// `.extern label size`: reserve `size` bytes in the extern segment.
    pub(crate) fn define_extern(&mut self, token: &Token, size: u32) {
        if self.global_symbols.contains(&token.literal) {
            return;
        }
        let extern_segment = self.segments.segment_mut(SegmentKind::Extern);
        let address = extern_segment.current_address();
        extern_segment.increment(size);
        if let Err(e) = self.global_symbols.define(Symbol::new(token.literal.clone(), address, true)) {
            self.log.error(Some(&token.location), e.to_string());
        }
    }

    pub(crate) fn declare_global(&mut self, token: &Token) {
        if self.pending_globals.iter().any(|t| t.literal == token.literal) {
            self.log.warning(
                Some(&token.location),
                format!("Symbol '{}' is already declared global", token.literal),
            );
            return;
        }
        self.pending_globals.push(token.clone());
    }

    // ==========================================================================
    // Pass 2
    // ==========================================================================

    fn resolve_statements(&mut self) {
        let _span = tracing::info_span!("resolve").entered();
        let mut bound_file: Option<&str> = None;
        let mut local: Option<&SymbolTable> = None;

        for (&address, syntax) in &self.parsed_statements {
            // Rebind only when the originating file changes
            if bound_file != Some(syntax.filename()) {
                bound_file = Some(syntax.filename());
                local = self.local_symbols.get(syntax.filename());
            }
            let scope = SymbolScope::new(local, &self.global_symbols);
            let statement = Arc::clone(syntax).resolve(&scope, &mut self.log);
            self.resolved_statements.insert(address, statement);
            if self.log.has_exceeded_max_error_count() {
                break;
            }
        }
        tracing::info!(statements = self.resolved_statements.len(), "resolve complete");
    }

    // ==========================================================================
    // Pass 3
    // ==========================================================================

    fn place_statements(&mut self) {
        let _span = tracing::info_span!("place").entered();
        let resolved = std::mem::take(&mut self.resolved_statements);
        for (&address, statement) in &resolved {
            statement.handle_placement(address, self);
            if self.log.has_exceeded_max_error_count() {
                break;
            }
        }
        self.resolved_statements = resolved;
        tracing::info!(statements = self.assembled_statements.len(), "place complete");
    }

    /// Write an encoded statement to memory. An address already holding a
    /// statement keeps it and the conflict is logged.
    pub fn place_statement(&mut self, address: u32, statement: Arc<BasicStatement>) {
        if let Some(existing) = self.assembled_statements.get(&address) {
            let earlier = match existing.location() {
                Some(location) => format!("the statement at {}", location),
                None => format!("'{}'", existing),
            };
            self.log.error(
                statement.location(),
                format!("Address 0x{:08x} is already occupied by {}", address, earlier),
            );
            return;
        }
        match self.memory.store_statement(address, Arc::clone(&statement), true) {
            Ok(()) => {
                self.assembled_statements.insert(address, statement);
            }
            Err(e) => self.log.error(statement.location(), e.to_string()),
        }
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn instruction_set(&self) -> &Arc<dyn InstructionSet> {
        &self.isa
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn log(&self) -> &AssemblerLog {
        &self.log
    }

    /// For diagnostics produced outside the pipeline, such as tokenizing.
    pub fn log_mut(&mut self) -> &mut AssemblerLog {
        &mut self.log
    }

    pub fn parsed_statements(&self) -> &BTreeMap<u32, Arc<StatementSyntax>> {
        &self.parsed_statements
    }

    pub fn resolved_statements(&self) -> &BTreeMap<u32, Statement> {
        &self.resolved_statements
    }

    pub fn assembled_statements(&self) -> &BTreeMap<u32, Arc<BasicStatement>> {
        &self.assembled_statements
    }

    pub fn global_symbols(&self) -> &SymbolTable {
        &self.global_symbols
    }

    pub fn local_symbols(&self, filename: &str) -> Option<&SymbolTable> {
        self.local_symbols.get(filename)
    }

    /// Every file's local table, in no particular order.
    pub fn local_symbol_tables(&self) -> impl Iterator<Item = &SymbolTable> {
        self.local_symbols.values()
    }

    /// Look `identifier` up in `filename`'s table, then the global table.
    pub fn lookup(&self, filename: &str, identifier: &str) -> Option<&Symbol> {
        SymbolScope::new(self.local_symbols.get(filename), &self.global_symbols).lookup(identifier)
    }

    pub fn segments(&self) -> &SegmentAllocator {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut SegmentAllocator {
        &mut self.segments
    }
}
