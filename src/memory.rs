// memory.rs
//
// The emulated address space: sparse regions for text, kernel text, data,
// kernel data and memory-mapped I/O, with alignment-checked access at byte,
// halfword, word and doubleword widths.
//
// Everything narrower than a word is a read-modify-write of the containing word;
// endianness only decides which bits of that word a sub-word address maps to.
// Text regions hold decoded statements, so storing a word into text decodes it,
// and fetching a word from text returns the statement's encoding.
//
// A `Memory` is meant to be shared (`Arc<Memory>`) between the assembler, an
// execution engine and any observers. All methods take `&self`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::config::MemoryConfig;
use crate::error::{AddressError, AddressFault};
use crate::isa::InstructionSet;
use crate::layout::MemoryLayout;
use crate::listener::{InvalidListenerRange, ListenerSet, MemoryAccess, MemoryListener};
use crate::region::{DataRegion, TextRegion};
use crate::statement::BasicStatement;

pub const BYTE: u32 = 1;
pub const HALFWORD: u32 = 2;
pub const WORD: u32 = 4;
pub const DOUBLEWORD: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Bit shift of a `length`-byte value at `address` within its containing word.
fn sub_word_shift(address: u32, length: u32, endianness: Endianness) -> u32 {
    let offset = address % WORD;
    match endianness {
        Endianness::Little => offset * 8,
        Endianness::Big => (WORD - length - offset) * 8,
    }
}

fn value_mask(length: u32) -> u32 {
    if length >= WORD { u32::MAX } else { (1u32 << (length * 8)) - 1 }
}

fn extract(word: u32, address: u32, length: u32, endianness: Endianness) -> u32 {
    (word >> sub_word_shift(address, length, endianness)) & value_mask(length)
}

fn splice(word: u32, value: u32, address: u32, length: u32, endianness: Endianness) -> u32 {
    let shift = sub_word_shift(address, length, endianness);
    let mask = value_mask(length) << shift;
    (word & !mask) | ((value << shift) & mask)
}

fn check_alignment(address: u32, length: u32) -> Result<(), AddressFault> {
    let alignment = match length {
        HALFWORD => HALFWORD,
        WORD | DOUBLEWORD => WORD,
        _ => BYTE,
    };
    if address % alignment == 0 { Ok(()) } else { Err(AddressFault::Misaligned(alignment)) }
}

struct Regions {
    layout: MemoryLayout,
    text: TextRegion,
    kernel_text: TextRegion,
    data: DataRegion,
    kernel_data: DataRegion,
    mmio: DataRegion,
}

impl Regions {
    fn new(layout: MemoryLayout) -> Self {
        Regions {
            layout,
            text: TextRegion::new(layout.text),
            kernel_text: TextRegion::new(layout.kernel_text),
            data: DataRegion::new(layout.data),
            kernel_data: DataRegion::new(layout.kernel_data),
            mmio: DataRegion::new(layout.mmio),
        }
    }

    fn target(&self, address: u32) -> Option<Target<'_>> {
        [&self.data, &self.kernel_data, &self.mmio]
            .into_iter()
            .find(|r| r.contains(address))
            .map(Target::Data)
            .or_else(|| [&self.text, &self.kernel_text].into_iter().find(|r| r.contains(address)).map(Target::Text))
    }
}

enum Target<'a> {
    Data(&'a DataRegion),
    Text(&'a TextRegion),
}

pub struct Memory {
    isa: Arc<dyn InstructionSet>,
    regions: RwLock<Regions>,
    listeners: ListenerSet,
    big_endian: AtomicBool,
    self_modifying_code: AtomicBool,
    heap_address: AtomicU32,
}

impl Memory {
    pub fn new(isa: Arc<dyn InstructionSet>, config: MemoryConfig) -> Self {
        Memory {
            isa,
            heap_address: AtomicU32::new(config.layout.heap_base()),
            regions: RwLock::new(Regions::new(config.layout)),
            listeners: ListenerSet::new(),
            big_endian: AtomicBool::new(config.endianness == Endianness::Big),
            self_modifying_code: AtomicBool::new(config.self_modifying_code),
        }
    }

    fn regions(&self) -> RwLockReadGuard<'_, Regions> {
        self.regions.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn instruction_set(&self) -> &Arc<dyn InstructionSet> {
        &self.isa
    }

    pub fn layout(&self) -> MemoryLayout {
        self.regions().layout
    }

    // ==========================================================================
    // Policies
    // ==========================================================================

    pub fn endianness(&self) -> Endianness {
        if self.big_endian.load(Ordering::Relaxed) { Endianness::Big } else { Endianness::Little }
    }

    pub fn set_endianness(&self, endianness: Endianness) {
        self.big_endian.store(endianness == Endianness::Big, Ordering::Relaxed);
    }

    pub fn self_modifying_code(&self) -> bool {
        self.self_modifying_code.load(Ordering::Relaxed)
    }

    pub fn set_self_modifying_code(&self, enabled: bool) {
        self.self_modifying_code.store(enabled, Ordering::Relaxed);
    }

    // ==========================================================================
    // Lifecycle
    // ==========================================================================

    /// Discard every stored value and rebuild the regions, then notify every
    /// listener.
    pub fn reset(&self) {
        let layout = self.layout();
        self.reset_with(layout);
    }

    /// Like `reset`, switching to a different layout.
    pub fn reset_with(&self, layout: MemoryLayout) {
        {
            let mut regions = self.regions.write().unwrap_or_else(PoisonError::into_inner);
            *regions = Regions::new(layout);
        }
        self.heap_address.store(layout.heap_base(), Ordering::Relaxed);
        tracing::debug!(text = %layout.text, data = %layout.data, "memory reset");
        self.listeners.dispatch_reset();
    }

    /// Reserve `bytes` (rounded up to a word) of heap, returning its address.
    pub fn allocate_heap_space(&self, bytes: u32) -> Result<u32, AddressError> {
        let size = bytes.checked_add(WORD - 1).map(|b| b & !(WORD - 1));
        let limit = self.layout().dynamic_data.last;
        let mut current = self.heap_address.load(Ordering::Relaxed);
        loop {
            let next = size.and_then(|s| current.checked_add(s)).filter(|n| n.wrapping_sub(1) <= limit);
            let Some(next) = next else {
                return Err(AddressError::store(current, AddressFault::OutOfRange));
            };
            match self.heap_address.compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return Ok(current),
                Err(actual) => current = actual,
            }
        }
    }

    // ==========================================================================
    // Listeners
    // ==========================================================================

    pub fn add_listener(
        &self,
        listener: Arc<dyn MemoryListener>,
        first: u32,
        last: u32,
    ) -> Result<(), InvalidListenerRange> {
        self.listeners.add(listener, first, last)
    }

    /// Listen to the whole address space.
    pub fn add_listener_everywhere(&self, listener: Arc<dyn MemoryListener>) {
        // A full range can't be inverted
        let _ = self.listeners.add(listener, 0, u32::MAX);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MemoryListener>) {
        self.listeners.remove(listener);
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    // ==========================================================================
    // Generic Access
    // ==========================================================================

    /// Read a 1, 2 or 4 byte value.
    pub fn fetch(&self, address: u32, length: u32, notify: bool) -> Result<u32, AddressError> {
        check_alignment(address, length).map_err(|f| AddressError::load(address, f))?;
        let word_address = address & !(WORD - 1);
        let word = {
            let regions = self.regions();
            match regions.target(word_address) {
                Some(Target::Data(region)) => region.fetch(word_address),
                Some(Target::Text(region)) => region.fetch(word_address).map_or(0, |s| s.binary),
                None => return Err(AddressError::load(address, AddressFault::OutOfRange)),
            }
        };
        let value = extract(word, address, length, self.endianness());
        if notify {
            self.listeners.dispatch_read(&MemoryAccess { address, length, value, word_address, word_value: word });
        }
        Ok(value)
    }

    /// Write a 1, 2 or 4 byte value, returning the value it replaced.
    pub fn store(&self, address: u32, value: u32, length: u32, notify: bool) -> Result<u32, AddressError> {
        check_alignment(address, length).map_err(|f| AddressError::store(address, f))?;
        let word_address = address & !(WORD - 1);
        let endianness = self.endianness();
        let value = value & value_mask(length);
        let old_word = {
            let regions = self.regions();
            match regions.target(word_address) {
                Some(Target::Data(region)) => region
                    .update(word_address, |old| Ok::<u32, AddressError>(splice(*old, value, address, length, endianness)))?,
                Some(Target::Text(region)) => {
                    if !self.self_modifying_code() {
                        return Err(AddressError::store(address, AddressFault::TextWriteProtected));
                    }
                    let old = region.update(word_address, |old| {
                        let old_word = old.as_ref().map_or(0, |s| s.binary);
                        let new_word = splice(old_word, value, address, length, endianness);
                        let statement = self
                            .isa
                            .decode(new_word, word_address)
                            .ok_or(AddressError::store(address, AddressFault::Undecodable(new_word)))?;
                        Ok(Some(Arc::new(statement)))
                    })?;
                    old.map_or(0, |s| s.binary)
                }
                None => return Err(AddressError::store(address, AddressFault::OutOfRange)),
            }
        };
        if notify {
            let word_value = splice(old_word, value, address, length, endianness);
            self.listeners.dispatch_write(&MemoryAccess { address, length, value, word_address, word_value });
        }
        Ok(extract(old_word, address, length, endianness))
    }

    // ==========================================================================
    // Typed Access
    // ==========================================================================

    pub fn fetch_byte(&self, address: u32, notify: bool) -> Result<u8, AddressError> {
        self.fetch(address, BYTE, notify).map(|v| v as u8)
    }

    pub fn fetch_halfword(&self, address: u32, notify: bool) -> Result<u16, AddressError> {
        self.fetch(address, HALFWORD, notify).map(|v| v as u16)
    }

    pub fn fetch_word(&self, address: u32, notify: bool) -> Result<u32, AddressError> {
        self.fetch(address, WORD, notify)
    }

    /// Read two consecutive words. Only word alignment is required.
    pub fn fetch_doubleword(&self, address: u32, notify: bool) -> Result<u64, AddressError> {
        check_alignment(address, DOUBLEWORD).map_err(|f| AddressError::load(address, f))?;
        let first = self.fetch_word(address, notify)?;
        let second = self.fetch_word(address.wrapping_add(WORD), notify)?;
        Ok(self.join_doubleword([first, second]))
    }

    pub fn store_byte(&self, address: u32, value: u8, notify: bool) -> Result<u8, AddressError> {
        self.store(address, value as u32, BYTE, notify).map(|v| v as u8)
    }

    pub fn store_halfword(&self, address: u32, value: u16, notify: bool) -> Result<u16, AddressError> {
        self.store(address, value as u32, HALFWORD, notify).map(|v| v as u16)
    }

    pub fn store_word(&self, address: u32, value: u32, notify: bool) -> Result<u32, AddressError> {
        self.store(address, value, WORD, notify)
    }

    /// Write two consecutive words. Only word alignment is required.
    pub fn store_doubleword(&self, address: u32, value: u64, notify: bool) -> Result<u64, AddressError> {
        check_alignment(address, DOUBLEWORD).map_err(|f| AddressError::store(address, f))?;
        let [first, second] = self.split_doubleword(value);
        let old_first = self.store_word(address, first, notify)?;
        let old_second = self.store_word(address.wrapping_add(WORD), second, notify)?;
        Ok(self.join_doubleword([old_first, old_second]))
    }

    /// The words of `value` in address order.
    fn split_doubleword(&self, value: u64) -> [u32; 2] {
        let mut bytes = [0u8; 8];
        match self.endianness() {
            Endianness::Little => {
                LittleEndian::write_u64(&mut bytes, value);
                [LittleEndian::read_u32(&bytes[..4]), LittleEndian::read_u32(&bytes[4..])]
            }
            Endianness::Big => {
                BigEndian::write_u64(&mut bytes, value);
                [BigEndian::read_u32(&bytes[..4]), BigEndian::read_u32(&bytes[4..])]
            }
        }
    }

    fn join_doubleword(&self, words: [u32; 2]) -> u64 {
        let mut bytes = [0u8; 8];
        match self.endianness() {
            Endianness::Little => {
                LittleEndian::write_u32(&mut bytes[..4], words[0]);
                LittleEndian::write_u32(&mut bytes[4..], words[1]);
                LittleEndian::read_u64(&bytes)
            }
            Endianness::Big => {
                BigEndian::write_u32(&mut bytes[..4], words[0]);
                BigEndian::write_u32(&mut bytes[4..], words[1]);
                BigEndian::read_u64(&bytes)
            }
        }
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    /// Place an encoded statement. Statements outside text are stored as their
    /// encoding, which needs self-modifying code.
    pub fn store_statement(
        &self,
        address: u32,
        statement: Arc<BasicStatement>,
        notify: bool,
    ) -> Result<(), AddressError> {
        check_alignment(address, WORD).map_err(|f| AddressError::store(address, f))?;
        let binary = statement.binary;
        {
            let regions = self.regions();
            match regions.target(address) {
                Some(Target::Text(region)) => {
                    region.store(address, Some(statement));
                }
                Some(Target::Data(region)) => {
                    if !self.self_modifying_code() {
                        return Err(AddressError::store(address, AddressFault::CodeOutsideText));
                    }
                    region.store(address, binary);
                }
                None => return Err(AddressError::store(address, AddressFault::OutOfRange)),
            }
        }
        if notify {
            let access =
                MemoryAccess { address, length: WORD, value: binary, word_address: address, word_value: binary };
            self.listeners.dispatch_write(&access);
        }
        Ok(())
    }

    /// The statement at `address`, if any. Data words are decoded on every call,
    /// which needs self-modifying code.
    pub fn fetch_statement(&self, address: u32, notify: bool) -> Result<Option<Arc<BasicStatement>>, AddressError> {
        check_alignment(address, WORD).map_err(|f| AddressError::load(address, f))?;
        let statement = {
            let regions = self.regions();
            match regions.target(address) {
                Some(Target::Text(region)) => region.fetch(address),
                Some(Target::Data(region)) => {
                    if !self.self_modifying_code() {
                        return Err(AddressError::load(address, AddressFault::CodeOutsideText));
                    }
                    self.isa.decode(region.fetch(address), address).map(Arc::new)
                }
                None => return Err(AddressError::load(address, AddressFault::OutOfRange)),
            }
        };
        if notify {
            let binary = statement.as_ref().map_or(0, |s| s.binary);
            let access =
                MemoryAccess { address, length: WORD, value: binary, word_address: address, word_value: binary };
            self.listeners.dispatch_read(&access);
        }
        Ok(statement)
    }

    // ==========================================================================
    // Inspection
    // ==========================================================================

    /// The word at `address`, or `None` if it was never written. Never notifies.
    pub fn fetch_word_or_absent(&self, address: u32) -> Result<Option<u32>, AddressError> {
        check_alignment(address, WORD).map_err(|f| AddressError::load(address, f))?;
        let regions = self.regions();
        match regions.target(address) {
            Some(Target::Data(region)) => Ok(region.fetch_or_absent(address)),
            Some(Target::Text(region)) => Ok(region.fetch_or_absent(address).flatten().map(|s| s.binary)),
            None => Err(AddressError::load(address, AddressFault::OutOfRange)),
        }
    }

    /// Address of the first never-written word in `[first, limit)`, stepping by words.
    pub fn first_unwritten(&self, first: u32, limit: u32) -> Result<Option<u32>, AddressError> {
        let mut address = first;
        while address < limit {
            if self.fetch_word_or_absent(address)?.is_none() {
                return Ok(Some(address));
            }
            match address.checked_add(WORD) {
                Some(next) => address = next,
                None => break,
            }
        }
        Ok(None)
    }

    /// Bytes from `address` up to (not including) the first zero byte.
    pub fn fetch_null_terminated_string(&self, address: u32) -> Result<String, AddressError> {
        let mut bytes = Vec::new();
        let mut current = address;
        loop {
            let byte = self.fetch_byte(current, false)?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
            current = current.checked_add(1).ok_or(AddressError::load(current, AddressFault::OutOfRange))?;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
