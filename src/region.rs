// region.rs
//
// Sparse storage for one contiguous span of memory.
//
// A region is a table of tables of blocks of words. Tables and blocks are only
// allocated when first written, so a region spanning gigabytes costs nothing
// until used, and reading anything never written yields the default value.
// Each region serializes its own accesses behind a mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::layout::Range;
use crate::segment::align_to_previous;
use crate::statement::BasicStatement;

pub const WORDS_PER_BLOCK: usize = 1024;
pub const BLOCKS_PER_TABLE: usize = 1024;
pub const BYTES_PER_BLOCK: u32 = WORDS_PER_BLOCK as u32 * 4;
pub const BYTES_PER_TABLE: u32 = BYTES_PER_BLOCK * BLOCKS_PER_TABLE as u32;

type Block<T> = Box<[T]>;
type Table<T> = Box<[Option<Block<T>>]>;

/// Raw data words.
pub type DataRegion = SparseRegion<u32>;

/// Decoded instructions.
pub type TextRegion = SparseRegion<Option<Arc<BasicStatement>>>;

pub struct SparseRegion<T> {
    range: Range,
    base: u32,
    tables: Mutex<Vec<Option<Table<T>>>>,
}

impl<T: Clone + Default> SparseRegion<T> {
    pub fn new(range: Range) -> Self {
        let base = align_to_previous(range.first, BYTES_PER_TABLE);
        let table_count = ((range.last - base) / BYTES_PER_TABLE) as usize + 1;
        let mut tables = Vec::with_capacity(table_count);
        tables.resize_with(table_count, || None);
        SparseRegion { range, base, tables: Mutex::new(tables) }
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn contains(&self, address: u32) -> bool {
        self.range.contains(address)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Option<Table<T>>>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// (table, block, word) indices of a word address.
    fn indices(&self, address: u32) -> (usize, usize, usize) {
        let relative = ((address - self.base) >> 2) as usize;
        let word = relative % WORDS_PER_BLOCK;
        let block = (relative / WORDS_PER_BLOCK) % BLOCKS_PER_TABLE;
        let table = relative / (WORDS_PER_BLOCK * BLOCKS_PER_TABLE);
        (table, block, word)
    }

    pub fn fetch(&self, address: u32) -> T {
        self.fetch_or_absent(address).unwrap_or_default()
    }

    /// `None` if the word's block has never been written.
    pub fn fetch_or_absent(&self, address: u32) -> Option<T> {
        debug_assert!(self.contains(address));
        let (table, block, word) = self.indices(address);
        let tables = self.lock();
        let block = tables.get(table)?.as_ref()?[block].as_ref()?;
        Some(block[word].clone())
    }

    /// Store a value, returning the one it replaced.
    pub fn store(&self, address: u32, value: T) -> T {
        self.update(address, |_| Ok::<T, ()>(value.clone())).unwrap_or_default()
    }

    /// Replace a value with `f(old)` while holding the region lock. Nothing is
    /// written (and nothing allocated) if `f` fails. Returns the old value.
    pub fn update<E>(&self, address: u32, f: impl FnOnce(&T) -> Result<T, E>) -> Result<T, E> {
        debug_assert!(self.contains(address));
        let (table, block, word) = self.indices(address);
        let mut tables = self.lock();
        let Some(slot) = tables.get_mut(table) else {
            return Ok(T::default());
        };
        let current = slot.as_ref().and_then(|t| t[block].as_ref()).map(|b| b[word].clone()).unwrap_or_default();
        let new = f(&current)?;
        let table = slot.get_or_insert_with(|| {
            let mut blocks = Vec::with_capacity(BLOCKS_PER_TABLE);
            blocks.resize_with(BLOCKS_PER_TABLE, || None);
            blocks.into_boxed_slice()
        });
        let block = table[block].get_or_insert_with(|| vec![T::default(); WORDS_PER_BLOCK].into_boxed_slice());
        Ok(std::mem::replace(&mut block[word], new))
    }

    /// Number of blocks that have been allocated by writes.
    pub fn allocated_blocks(&self) -> usize {
        self.lock().iter().flatten().map(|t| t.iter().filter(|b| b.is_some()).count()).sum()
    }
}
