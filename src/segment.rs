// segment.rs
//
// Write cursors for the five segments an assembled program is laid out into,
// and the alignment bookkeeping that goes with them.

use std::fmt;

use crate::layout::{MemoryLayout, Range};
use crate::symbols::SymbolTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Text,
    Data,
    KernelText,
    KernelData,
    Extern,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 5] =
        [SegmentKind::Text, SegmentKind::Data, SegmentKind::KernelText, SegmentKind::KernelData, SegmentKind::Extern];

    pub fn is_data(&self) -> bool {
        matches!(self, SegmentKind::Data | SegmentKind::KernelData | SegmentKind::Extern)
    }

    fn index(&self) -> usize {
        match self {
            SegmentKind::Text => 0,
            SegmentKind::Data => 1,
            SegmentKind::KernelText => 2,
            SegmentKind::KernelData => 3,
            SegmentKind::Extern => 4,
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegmentKind::Text => ".text",
            SegmentKind::Data => ".data",
            SegmentKind::KernelText => ".ktext",
            SegmentKind::KernelData => ".kdata",
            SegmentKind::Extern => ".extern",
        };
        write!(f, "{}", s)
    }
}

/// Round `address` up to the next multiple of `alignment`.
pub fn align_to_next(address: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return address;
    }
    let alignment = alignment as u64;
    (((address as u64 + alignment - 1) / alignment) * alignment) as u32
}

/// Round `address` down to a multiple of `alignment`.
pub fn align_to_previous(address: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        return address;
    }
    address - address % alignment
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub first_address: u32,
    pub last_address: u32,
    cursor: u32,
}

impl Segment {
    pub fn new(kind: SegmentKind, range: Range) -> Self {
        Segment { kind, first_address: range.first, last_address: range.last, cursor: range.first }
    }

    pub fn is_data(&self) -> bool {
        self.kind.is_data()
    }

    pub fn current_address(&self) -> u32 {
        self.cursor
    }

    pub fn set_address(&mut self, address: u32) {
        self.cursor = address;
    }

    pub fn increment(&mut self, bytes: u32) {
        self.cursor = self.cursor.wrapping_add(bytes);
    }

    pub fn contains(&self, address: u32) -> bool {
        self.first_address <= address && address <= self.last_address
    }

    pub fn reset(&mut self) {
        self.cursor = self.first_address;
    }
}

/// The five segments, which one is active, and whether data directives align
/// themselves automatically.
#[derive(Debug, Clone)]
pub struct SegmentAllocator {
    segments: [Segment; 5],
    active: SegmentKind,
    auto_align: bool,
}

impl SegmentAllocator {
    pub fn new(layout: &MemoryLayout) -> Self {
        SegmentAllocator {
            segments: [
                Segment::new(SegmentKind::Text, layout.text),
                Segment::new(SegmentKind::Data, layout.static_data),
                Segment::new(SegmentKind::KernelText, layout.kernel_text),
                Segment::new(SegmentKind::KernelData, layout.kernel_data),
                Segment::new(SegmentKind::Extern, layout.extern_data),
            ],
            active: SegmentKind::Text,
            auto_align: true,
        }
    }

    pub fn segment(&self, kind: SegmentKind) -> &Segment {
        &self.segments[kind.index()]
    }

    pub fn segment_mut(&mut self, kind: SegmentKind) -> &mut Segment {
        &mut self.segments[kind.index()]
    }

    pub fn active(&self) -> &Segment {
        self.segment(self.active)
    }

    pub fn active_kind(&self) -> SegmentKind {
        self.active
    }

    /// Make `kind` the active segment. Auto-alignment is re-enabled.
    pub fn switch_to(&mut self, kind: SegmentKind) {
        self.active = kind;
        self.auto_align = true;
    }

    pub fn current_address(&self) -> u32 {
        self.active().current_address()
    }

    pub fn set_address(&mut self, address: u32) {
        self.segment_mut(self.active).set_address(address);
    }

    pub fn increment(&mut self, bytes: u32) {
        self.segment_mut(self.active).increment(bytes);
    }

    pub fn auto_align(&self) -> bool {
        self.auto_align
    }

    pub fn set_auto_align(&mut self, enabled: bool) {
        self.auto_align = enabled;
    }

    /// Advance the active cursor to a multiple of `alignment`, moving any symbol of
    /// `symbols` left in the skipped padding up to the new cursor. Returns the new
    /// cursor.
    pub fn align_to(&mut self, alignment: u32, symbols: Option<&mut SymbolTable>) -> u32 {
        let old = self.current_address();
        if alignment <= 1 {
            return old;
        }
        let new = align_to_next(old, alignment);
        if new != old {
            self.set_address(new);
            if let Some(symbols) = symbols {
                symbols.realign(old, new);
            }
        }
        new
    }

    /// Rewind every cursor and make text active again.
    pub fn reset(&mut self) {
        for segment in &mut self.segments {
            segment.reset();
        }
        self.switch_to(SegmentKind::Text);
    }
}
