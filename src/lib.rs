pub mod assembler;
pub mod ast;
pub mod config;
pub mod directives;
pub mod dump;
pub mod error;
pub mod isa;
pub mod layout;
pub mod listener;
pub mod log;
pub mod memory;
pub mod mips;
pub mod parser;
pub mod patch;
pub mod region;
pub mod segment;
pub mod statement;
pub mod symbols;
pub mod tokenizer;

#[cfg(test)]
mod assembler_tests;
#[cfg(test)]
mod memory_tests;
#[cfg(test)]
mod test_utils;
