pub mod test_helpers {
    use std::sync::{Arc, Mutex};

    use crate::assembler::Assembler;
    use crate::ast::SourceFile;
    use crate::config::{AssemblerConfig, MemoryConfig};
    use crate::isa::InstructionSet;
    use crate::listener::{MemoryAccess, MemoryListener};
    use crate::log::{AssemblerLog, LogLevel};
    use crate::memory::{Endianness, Memory};
    use crate::mips::MipsInstructionSet;
    use crate::tokenizer::tokenize;

    pub fn mips() -> Arc<dyn InstructionSet> {
        Arc::new(MipsInstructionSet::new())
    }

    pub fn create_test_memory() -> Memory {
        Memory::new(mips(), MemoryConfig::default())
    }

    pub fn create_test_memory_with(endianness: Endianness, self_modifying_code: bool) -> Memory {
        Memory::new(mips(), MemoryConfig { endianness, self_modifying_code, ..Default::default() })
    }

    pub fn create_test_assembler() -> Assembler {
        create_test_assembler_with(AssemblerConfig::default())
    }

    pub fn create_test_assembler_with(config: AssemblerConfig) -> Assembler {
        let isa = mips();
        let memory = Arc::new(Memory::new(Arc::clone(&isa), MemoryConfig::default()));
        Assembler::new(config, isa, memory)
    }

    /// Tokenize `text`, failing the test on tokenizer errors.
    pub fn tokenize_ok(filename: &str, text: &str) -> SourceFile {
        let mut log = AssemblerLog::new(None);
        let file = tokenize(filename, text, &mut log);
        assert!(!log.has_errors(), "unexpected tokenizer errors: {:?}", log.messages());
        file
    }

    /// Assemble one file, failing the test with the log if assembly fails.
    pub fn assemble_ok(source: &str) -> Assembler {
        let mut assembler = create_test_assembler();
        if let Err(e) = assembler.assemble_sources(&[("test.s", source)]) {
            panic!("assembly failed: {:?}", e.messages);
        }
        assembler
    }

    /// Contents of every message at `level`, in order.
    pub fn messages_at(assembler: &Assembler, level: LogLevel) -> Vec<String> {
        assembler.log().messages().iter().filter(|m| m.level == level).map(|m| m.content.clone()).collect()
    }

    pub fn assert_log_contains(assembler: &Assembler, level: LogLevel, fragment: &str) {
        let messages = messages_at(assembler, level);
        assert!(
            messages.iter().any(|m| m.contains(fragment)),
            "no {:?} message containing {:?}; got {:?}",
            level,
            fragment,
            messages
        );
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Event {
        Read(MemoryAccess),
        Written(MemoryAccess),
        Reset,
    }

    /// Records every callback it receives.
    #[derive(Default)]
    pub struct RecordingListener {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingListener {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn writes(&self) -> Vec<MemoryAccess> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Written(access) => Some(access),
                    _ => None,
                })
                .collect()
        }

        pub fn reads(&self) -> Vec<MemoryAccess> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Read(access) => Some(access),
                    _ => None,
                })
                .collect()
        }
    }

    impl MemoryListener for RecordingListener {
        fn memory_read(&self, access: &MemoryAccess) {
            self.events.lock().unwrap().push(Event::Read(*access));
        }

        fn memory_written(&self, access: &MemoryAccess) {
            self.events.lock().unwrap().push(Event::Written(*access));
        }

        fn memory_reset(&self) {
            self.events.lock().unwrap().push(Event::Reset);
        }
    }
}
