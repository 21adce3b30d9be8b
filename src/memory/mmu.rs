//! Memory management unit implemented
//! with a sparse page table over the 64-bit address space

use std::collections::BTreeMap;

const PAGE_WIDTH: u32 = 12;
const PAGE_SIZE: usize = 1 << PAGE_WIDTH;
const WORD_SIZE: u64 = 8;

// Defines page type
type PageType = Box<[u8; PAGE_SIZE]>;

/// Memory management unit
#[derive(Clone, Debug, Default)]
pub struct MMU {
    // pages[p] stores the bytes at (p << PAGE_WIDTH) ..
    // Allocate stuff lazily; absent pages read as zero
    pages: BTreeMap<u64, PageType>,
}

impl MMU {
    /// Make a new MMU
    pub fn make() -> Self {
        Self::default()
    }

    /// The page number of the address
    pub fn get_page_number(address: u64) -> u64 {
        address >> PAGE_WIDTH
    }

    /// The page offset
    pub fn get_page_offset(address: u64) -> usize {
        (address & ((PAGE_SIZE - 1) as u64)) as usize
    }

    /// Check if a page is allocated at the given address
    pub fn page_exists(&self, address: u64) -> bool {
        self.pages.contains_key(&Self::get_page_number(address))
    }

    /// Allocate a page of memory at the given address.
    /// Returns true iff the allocation was successful
    pub fn allocate_page(&mut self, address: u64) -> bool {
        let page = Self::get_page_number(address);
        if self.pages.contains_key(&page) {
            return false;
        }
        self.pages.insert(page, Box::new([0; PAGE_SIZE]));
        true
    }

    /// Set the byte at the given address, allocating its page on demand
    pub fn set8(&mut self, address: u64, byte: u8) {
        let page = self
            .pages
            .entry(Self::get_page_number(address))
            .or_insert_with(|| Box::new([0; PAGE_SIZE]));
        page[Self::get_page_offset(address)] = byte;
    }

    /// Get the byte at the given address
    pub fn get8(&self, address: u64) -> u8 {
        self.pages
            .get(&Self::get_page_number(address))
            .map_or(0, |page| page[Self::get_page_offset(address)])
    }

    /// Little-endian 32-bit read
    pub fn get32(&self, address: u64) -> u32 {
        (0..4).fold(0, |acc, i| {
            acc | (self.get8(address.wrapping_add(i)) as u32) << (8 * i)
        })
    }

    /// Little-endian 64-bit read
    pub fn get64(&self, address: u64) -> u64 {
        (0..WORD_SIZE).fold(0, |acc, i| {
            acc | (self.get8(address.wrapping_add(i)) as u64) << (8 * i)
        })
    }

    /// Little-endian 64-bit write
    pub fn set64(&mut self, address: u64, value: u64) {
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.set8(address.wrapping_add(i as u64), byte);
        }
    }

    /// Copies `len` bytes starting at `address`
    pub fn read_block(&self, address: u64, len: usize) -> Vec<u8> {
        (0..len as u64)
            .map(|i| self.get8(address.wrapping_add(i)))
            .collect()
    }

    /// Stores `data` starting at `address`
    pub fn write_block(&mut self, address: u64, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.set8(address.wrapping_add(i as u64), byte);
        }
    }

    /// Every nonzero 8-byte word in an allocated page, in address order
    pub fn populated_words(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.pages.keys().flat_map(move |&page| {
            let base = page << PAGE_WIDTH;
            (0..PAGE_SIZE as u64 / WORD_SIZE)
                .map(move |i| base + i * WORD_SIZE)
                .map(move |address| (address, self.get64(address)))
                .filter(|&(_, value)| value != 0)
        })
    }
}
