// error.rs
//
// This file defines the error types for the assembler and the memory model.
//
// Assembly diagnostics are collected in the `AssemblerLog` and surface as a single
// `AssemblyError` at a pass boundary. Memory contract violations are structured
// `AddressError`s carrying the offending address and the reason.

use std::fmt;

use thiserror::Error;

use crate::log::{LogLevel, LogMessage};

// ==============================================================================
// Memory Errors
// ==============================================================================

/// Whether the failing access was a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Load,
    Store,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Load => write!(f, "load"),
            AccessKind::Store => write!(f, "store"),
        }
    }
}

/// Why a memory access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressFault {
    #[error("address not aligned on {0}-byte boundary")]
    Misaligned(u32),
    #[error("segmentation fault (address out of range)")]
    OutOfRange,
    #[error("cannot write to text segment unless self-modifying code is enabled")]
    TextWriteProtected,
    #[error("cannot access code outside the text segment unless self-modifying code is enabled")]
    CodeOutsideText,
    #[error("word 0x{0:08x} does not decode to any instruction")]
    Undecodable(u32),
}

/// A refused memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} at 0x{address:08x}: {fault}")]
pub struct AddressError {
    pub address: u32,
    pub kind: AccessKind,
    pub fault: AddressFault,
}

impl AddressError {
    pub fn load(address: u32, fault: AddressFault) -> Self {
        AddressError { address, kind: AccessKind::Load, fault }
    }

    pub fn store(address: u32, fault: AddressFault) -> Self {
        AddressError { address, kind: AccessKind::Store, fault }
    }
}

// ==============================================================================
// Symbol Errors
// ==============================================================================

/// Returned when an identifier is defined twice in one symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Symbol '{identifier}' is already defined at 0x{address:08x}")]
pub struct DuplicateSymbol {
    pub identifier: String,
    pub address: u32,
}

// ==============================================================================
// Assembly Errors
// ==============================================================================

/// The stage of the pipeline at which an assembly run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Parse,
    Resolve,
    Place,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Pass::Parse => "parsing",
            Pass::Resolve => "operand resolution",
            Pass::Place => "placement",
        };
        write!(f, "{}", s)
    }
}

/// The single failure signal raised at a pass boundary, carrying every
/// diagnostic logged so far in order.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("assembly failed during {pass}")]
pub struct AssemblyError {
    pub pass: Pass,
    pub messages: Vec<LogMessage>,
}

impl AssemblyError {
    pub fn new(pass: Pass, messages: Vec<LogMessage>) -> Self {
        AssemblyError { pass, messages }
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogMessage> {
        self.messages.iter().filter(|m| m.level == LogLevel::Error)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages.iter().filter(|m| m.level == LogLevel::Warning).count()
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
