// config.rs
//
// Configuration and CLI argument parsing for the MIPS assembler

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::layout::{LayoutPreset, MemoryLayout};
use crate::memory::Endianness;

/// Default cutoff for logged errors in one assembly run.
pub const DEFAULT_MAX_ERROR_COUNT: usize = 200;

/// Pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Stop logging (and abort the current pass) after this many errors. `None` is unlimited.
    pub max_error_count: Option<usize>,
    /// Fail the run at the final gate if any warning was logged.
    pub warnings_are_errors: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig { max_error_count: Some(DEFAULT_MAX_ERROR_COUNT), warnings_are_errors: false }
    }
}

/// Initial memory settings. Endianness and self-modifying code can be changed
/// later on the `Memory` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryConfig {
    pub layout: MemoryLayout,
    pub endianness: Endianness,
    pub self_modifying_code: bool,
}

#[derive(Debug, Parser)]
#[command(name = "mipsasm", version, about = "Assemble MIPS source files into an emulated memory")]
pub struct Args {
    /// Source files, assembled in order
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Maximum number of errors before assembly halts (0 for unlimited)
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ERROR_COUNT)]
    pub max_errors: usize,

    /// Treat warnings as errors
    #[arg(long)]
    pub warnings_are_errors: bool,

    /// Allow writes to the text segment and code outside it
    #[arg(long)]
    pub self_modifying_code: bool,

    /// Use big-endian byte order (default little-endian)
    #[arg(long)]
    pub big_endian: bool,

    /// Memory layout
    #[arg(long, value_enum, default_value_t = LayoutPreset::Default)]
    pub layout: LayoutPreset,

    /// Print the global and per-file symbol tables
    #[arg(long)]
    pub dump_symbols: bool,

    /// Print the assembled text segments
    #[arg(long)]
    pub dump_text: bool,

    /// Print the written part of the static data segment
    #[arg(long)]
    pub dump_data: bool,

    /// More output (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            max_error_count: (self.max_errors > 0).then_some(self.max_errors),
            warnings_are_errors: self.warnings_are_errors,
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            layout: MemoryLayout::from_preset(self.layout),
            endianness: if self.big_endian { Endianness::Big } else { Endianness::Little },
            self_modifying_code: self.self_modifying_code,
        }
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
