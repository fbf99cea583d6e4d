// main.rs
//
// Command-line front end: assemble MIPS source files into an emulated memory,
// report diagnostics and optionally print listings.

use std::fs;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use tracing_subscriber::EnvFilter;

use mipsasm::assembler::Assembler;
use mipsasm::ast::SourceFile;
use mipsasm::config::Args;
use mipsasm::dump;
use mipsasm::log::{LogLevel, LogMessage};
use mipsasm::memory::Memory;
use mipsasm::mips::MipsInstructionSet;
use mipsasm::tokenizer::tokenize;

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let mut sources = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match fs::read_to_string(path) {
            Ok(text) => sources.push((path.display().to_string(), text)),
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
    }

    let isa = Arc::new(MipsInstructionSet::new());
    let memory = Arc::new(Memory::new(isa.clone(), args.memory_config()));
    let mut assembler = Assembler::new(args.assembler_config(), isa, Arc::clone(&memory));

    let files: Vec<SourceFile> =
        sources.iter().map(|(name, text)| tokenize(name, text, assembler.log_mut())).collect();
    let result = assembler.assemble(&files);

    let color = io::stderr().is_tty();
    for message in assembler.log().messages() {
        print_message(message, &files, color);
    }

    if args.dump_symbols {
        print!("{}", dump::dump_symbols(&assembler));
    }
    if args.dump_text && result.is_ok() {
        print!("{}", dump::dump_text(&assembler));
    }
    if args.dump_data && result.is_ok() {
        match dump::dump_data(&memory, memory.layout().static_data) {
            Ok(listing) => print!("{}", listing),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    match result {
        Ok(()) => {
            let log = assembler.log();
            if log.has_warnings() {
                eprintln!("Assembly completed with {} warning(s)", log.warning_count());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {} ({} error(s), {} warning(s))", e, e.error_count(), e.warning_count());
            ExitCode::from(1)
        }
    }
}

/// Print one diagnostic; errors also show the surrounding source lines.
fn print_message(message: &LogMessage, files: &[SourceFile], color: bool) {
    let source = message
        .location
        .as_ref()
        .and_then(|location| files.iter().find(|f| f.filename == location.file));
    let text = match (message.level, source) {
        (LogLevel::Error, Some(source)) => message.with_source_context(source),
        _ => message.to_string(),
    };
    if !color {
        eprintln!("{}", text);
        return;
    }
    match message.level {
        LogLevel::Error => eprintln!("{}", text.red()),
        LogLevel::Warning => eprintln!("{}", text.yellow()),
        LogLevel::Info => eprintln!("{}", text.dark_grey()),
    }
}
