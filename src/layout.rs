// layout.rs
//
// This module describes the address layout of the emulated machine: where text,
// data, kernel and memory-mapped I/O live, and the initial pointer values that
// follow from it. The assembler derives its segment cursors from a layout and
// memory sizes its regions from the same layout.

use std::fmt;

/// An inclusive address range, compared unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub first: u32,
    pub last: u32,
}

impl Range {
    pub const fn new(first: u32, last: u32) -> Self {
        Range { first, last }
    }

    pub fn contains(&self, address: u32) -> bool {
        self.first <= address && address <= self.last
    }

    /// True if every byte of `[address, address + length)` is in range.
    pub fn contains_span(&self, address: u32, length: u32) -> bool {
        let end = address as u64 + length as u64 - 1;
        self.first <= address && end <= self.last as u64
    }

    pub fn intersects(&self, first: u32, last: u32) -> bool {
        self.first <= last && first <= self.last
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}-0x{:08x}", self.first, self.last)
    }
}

/// Named layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum LayoutPreset {
    /// Text at 0x00400000, static data at 0x10010000, kernel above 0x80000000
    #[default]
    #[value(name = "default")]
    Default,
    /// 32 KiB address space with static data at address 0
    #[value(name = "compact-data")]
    CompactDataAtZero,
    /// 32 KiB address space with text at address 0
    #[value(name = "compact-text")]
    CompactTextAtZero,
}

impl fmt::Display for LayoutPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayoutPreset::Default => "Default",
            LayoutPreset::CompactDataAtZero => "Compact (static data at address 0)",
            LayoutPreset::CompactTextAtZero => "Compact (text at address 0)",
        };
        write!(f, "{}", s)
    }
}

/// Every address range and initial pointer of a machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryLayout {
    pub mapped: Range,
    pub user: Range,
    pub text: Range,
    /// The whole user data segment: extern, static and dynamic data
    pub data: Range,
    pub extern_data: Range,
    pub static_data: Range,
    /// Heap growing up, stack growing down
    pub dynamic_data: Range,
    pub kernel_text: Range,
    pub kernel_data: Range,
    pub mmio: Range,
    pub exception_handler: u32,
    pub global_pointer: u32,
    pub stack_pointer: u32,
}

impl MemoryLayout {
    pub fn from_preset(preset: LayoutPreset) -> Self {
        match preset {
            LayoutPreset::Default => MemoryLayout {
                mapped: Range::new(0x0040_0000, 0xffff_ffff),
                user: Range::new(0x0040_0000, 0x7fff_ffff),
                text: Range::new(0x0040_0000, 0x0fff_ffff),
                data: Range::new(0x1000_0000, 0x7fff_ffff),
                extern_data: Range::new(0x1000_0000, 0x1000_ffff),
                static_data: Range::new(0x1001_0000, 0x1003_ffff),
                dynamic_data: Range::new(0x1004_0000, 0x7fff_ffff),
                kernel_text: Range::new(0x8000_0000, 0x8fff_ffff),
                kernel_data: Range::new(0x9000_0000, 0xfffe_ffff),
                mmio: Range::new(0xffff_0000, 0xffff_ffff),
                exception_handler: 0x8000_0180,
                global_pointer: 0x1000_8000,
                stack_pointer: 0x7fff_effc,
            },
            LayoutPreset::CompactDataAtZero => MemoryLayout {
                mapped: Range::new(0x0000_0000, 0x0000_7fff),
                user: Range::new(0x0000_0000, 0x0000_3fff),
                text: Range::new(0x0000_3000, 0x0000_3fff),
                data: Range::new(0x0000_0000, 0x0000_2fff),
                extern_data: Range::new(0x0000_1000, 0x0000_1fff),
                static_data: Range::new(0x0000_0000, 0x0000_0fff),
                dynamic_data: Range::new(0x0000_2000, 0x0000_2fff),
                kernel_text: Range::new(0x0000_4000, 0x0000_4fff),
                kernel_data: Range::new(0x0000_5000, 0x0000_7eff),
                mmio: Range::new(0x0000_7f00, 0x0000_7fff),
                exception_handler: 0x0000_4180,
                global_pointer: 0x0000_1800,
                stack_pointer: 0x0000_2ffc,
            },
            LayoutPreset::CompactTextAtZero => MemoryLayout {
                mapped: Range::new(0x0000_0000, 0x0000_7fff),
                user: Range::new(0x0000_0000, 0x0000_3fff),
                text: Range::new(0x0000_0000, 0x0000_0fff),
                data: Range::new(0x0000_1000, 0x0000_3fff),
                extern_data: Range::new(0x0000_1000, 0x0000_1fff),
                static_data: Range::new(0x0000_2000, 0x0000_2fff),
                dynamic_data: Range::new(0x0000_3000, 0x0000_3fff),
                kernel_text: Range::new(0x0000_4000, 0x0000_4fff),
                kernel_data: Range::new(0x0000_5000, 0x0000_7eff),
                mmio: Range::new(0x0000_7f00, 0x0000_7fff),
                exception_handler: 0x0000_4180,
                global_pointer: 0x0000_1800,
                stack_pointer: 0x0000_3ffc,
            },
        }
    }

    /// Highest word of the stack.
    pub fn stack_base(&self) -> u32 {
        self.dynamic_data.last & !3
    }

    /// Where heap allocation starts.
    pub fn heap_base(&self) -> u32 {
        self.dynamic_data.first
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        MemoryLayout::from_preset(LayoutPreset::Default)
    }
}
