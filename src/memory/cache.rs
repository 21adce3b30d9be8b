//! Cache implementation

use std::fmt::Write;

use super::AccessType;
use crate::bitfield::get_log_2;
use crate::bitfield::is_pow_2;
use crate::error::ConfigError;

/// Largest cache the simulator will allocate, in bytes
pub const MAX_CAPACITY: u64 = 1 << 30;

pub fn get_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Set-associative, write-back, write-allocate cache with LRU replacement
#[derive(Clone, Debug)]
pub struct Cache {
    pub policy: CachePolicy,

    pub history: CacheHistory,

    // Constants
    offset_bits: u32,
    index_bits: u32,

    sets: Vec<Vec<CacheLine>>,

    /// Timestamp handed to the next touched line
    next_lru: u64,
}

// Addresses look like this:
// | tag | index | offset |
impl Cache {
    pub fn make(policy: CachePolicy) -> Self {
        let offset_bits = get_log_2(policy.block_size);
        let index_bits = get_log_2(policy.set_count());
        let line = CacheLine {
            data: vec![0; policy.block_size as usize],
            ..Default::default()
        };
        let sets = vec![
            vec![line; policy.associativity as usize];
            policy.set_count() as usize
        ];

        Self {
            policy,
            history: CacheHistory::default(),
            offset_bits,
            index_bits,
            sets,
            next_lru: 0,
        }
    }

    pub fn get_offset(&self, address: u64) -> usize {
        (address & get_mask(self.offset_bits)) as usize
    }

    pub fn get_index(&self, address: u64) -> usize {
        ((address >> self.offset_bits) & get_mask(self.index_bits)) as usize
    }

    pub fn get_tag(&self, address: u64) -> u64 {
        address
            .checked_shr(self.offset_bits + self.index_bits)
            .unwrap_or(0)
    }

    /// Rebuilds the block address of a line from its tag and set index
    pub fn get_address(&self, tag: u64, index: usize) -> u64 {
        tag.checked_shl(self.offset_bits + self.index_bits).unwrap_or(0)
            | ((index as u64) << self.offset_bits)
    }

    /// Way holding `address`, without touching any state
    pub fn lookup(&self, address: u64) -> Option<usize> {
        let tag = self.get_tag(address);
        self.sets[self.get_index(address)]
            .iter()
            .position(|line| line.valid && line.tag == tag)
    }

    pub fn get_line(&self, address: u64) -> Option<&CacheLine> {
        let way = self.lookup(address)?;
        Some(&self.sets[self.get_index(address)][way])
    }

    pub fn is_in_cache(&self, address: u64) -> bool {
        self.lookup(address).is_some()
    }

    /// Picks the victim in a set: the first invalid line,
    /// otherwise the least recently used one
    pub fn select_line(&self, index: usize) -> usize {
        let set = &self.sets[index];
        if let Some(way) = set.iter().position(|line| !line.valid) {
            return way;
        }
        let mut result = 0;
        for (way, line) in set.iter().enumerate() {
            // Strictly older only, so ties keep the lowest way
            if line.lru < set[result].lru {
                result = way;
            }
        }
        result
    }

    /// Looks up `address`, records the hit or miss and,
    /// on a hit, touches the line
    pub fn check_hit(&mut self, address: u64, access_type: AccessType) -> bool {
        match self.lookup(address) {
            Some(way) => {
                self.history.num_hit += 1;
                let index = self.get_index(address);
                self.touch(index, way);
                if access_type == AccessType::Write {
                    self.sets[index][way].dirty = true;
                }
                true
            }
            None => {
                self.history.num_miss += 1;
                false
            }
        }
    }

    /// Replaces the victim line of `address`'s set with the block
    /// holding `address`. The new line takes `incoming` as its data,
    /// or zeros if none is given. Returns what was displaced.
    pub fn handle_miss(
        &mut self,
        address: u64,
        access_type: AccessType,
        incoming: Option<&[u8]>,
    ) -> EvictedLine {
        let index = self.get_index(address);
        let tag = self.get_tag(address);
        let way = self.select_line(index);

        let evicted = {
            let line = &self.sets[index][way];
            EvictedLine {
                address: self.get_address(line.tag, index),
                dirty: line.dirty,
                valid: line.valid,
                data: line.data.clone(),
            }
        };
        if evicted.valid {
            if evicted.dirty {
                self.history.num_dirty_evict += 1;
            } else {
                self.history.num_clean_evict += 1;
            }
        }

        let line = &mut self.sets[index][way];
        line.valid = true;
        line.tag = tag;
        line.dirty = access_type == AccessType::Write;
        match incoming {
            Some(data) => {
                let n = data.len().min(line.data.len());
                line.data[..n].copy_from_slice(&data[..n]);
                line.data[n..].fill(0);
            }
            None => line.data.fill(0),
        }
        self.touch(index, way);

        evicted
    }

    /// Reads the 8-byte word holding `address`, if cached
    pub fn get_word(&mut self, address: u64) -> Option<u64> {
        let index = self.get_index(address);
        let way = self.lookup(address)?;
        let offset = self.word_offset(address);
        self.touch(index, way);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.sets[index][way].data[offset..offset + 8]);
        Some(u64::from_le_bytes(bytes))
    }

    /// Writes the 8-byte word holding `address` and marks the line dirty.
    /// Returns false if the block is not cached.
    pub fn set_word(&mut self, address: u64, value: u64) -> bool {
        let index = self.get_index(address);
        let Some(way) = self.lookup(address) else {
            return false;
        };
        let offset = self.word_offset(address);
        self.touch(index, way);
        let line = &mut self.sets[index][way];
        line.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        line.dirty = true;
        true
    }

    /// Every valid dirty line as `(block address, data)`
    pub fn dirty_lines(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        self.sets.iter().enumerate().flat_map(move |(index, set)| {
            set.iter()
                .filter(|line| line.valid && line.dirty)
                .map(move |line| {
                    (self.get_address(line.tag, index), line.data.as_slice())
                })
        })
    }

    /// Human-readable dump of one set
    pub fn display_set(&self, index: usize) -> String {
        let mut out = String::new();
        let Some(set) = self.sets.get(index) else {
            return out;
        };
        let _ = writeln!(out, "set {index}:");
        for (way, line) in set.iter().enumerate() {
            let _ = writeln!(
                out,
                "  way {way}: valid={} dirty={} tag={:#x} lru={}",
                line.valid as u8, line.dirty as u8, line.tag, line.lru
            );
        }
        out
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        let total = self.history.num_hit + self.history.num_miss;
        if total == 0 {
            return 0.0;
        }
        self.history.num_miss as f64 / total as f64
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    fn touch(&mut self, index: usize, way: usize) {
        self.next_lru += 1;
        self.sets[index][way].lru = self.next_lru;
    }

    /// Byte offset of the aligned word holding `address`
    fn word_offset(&self, address: u64) -> usize {
        let offset = self.get_offset(address) & !7;
        offset.min(self.policy.block_size as usize - 8)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheLine {
    pub valid: bool,
    pub dirty: bool,
    pub tag: u64,
    pub lru: u64,
    pub data: Vec<u8>,
}

/// Displaced line handed back to the caller for write-back
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictedLine {
    pub address: u64,
    pub dirty: bool,
    pub valid: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
    pub num_dirty_evict: u64,
    pub num_clean_evict: u64,
}

/// Cache geometry and miss latency
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub associativity: u64,
    pub block_size: u64,
    pub capacity: u64,
    /// Extra cycles a miss keeps the memory stage busy
    pub miss_latency: u64,
}

impl CachePolicy {
    pub fn make(
        associativity: u64,
        block_size: u64,
        capacity: u64,
        miss_latency: u64,
    ) -> Result<Self, ConfigError> {
        let policy =
            Self { associativity, block_size, capacity, miss_latency };
        policy.validate()?;
        Ok(policy)
    }

    /// All four parameters or none; anything in between is an error
    pub fn from_parts(
        associativity: Option<u64>,
        block_size: Option<u64>,
        capacity: Option<u64>,
        miss_latency: Option<u64>,
    ) -> Result<Option<Self>, ConfigError> {
        match (associativity, block_size, capacity, miss_latency) {
            (None, None, None, None) => Ok(None),
            (Some(a), Some(b), Some(c), Some(d)) => {
                Self::make(a, b, c, d).map(Some)
            }
            _ => Err(ConfigError::PartialCacheConfig),
        }
    }

    /// Zero when one set is already larger than the whole cache
    pub fn set_count(&self) -> u64 {
        self.associativity
            .checked_mul(self.block_size)
            .and_then(|set_bytes| self.capacity.checked_div(set_bytes))
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size < 8 || !is_pow_2(self.block_size) {
            return Err(ConfigError::InvalidBlockSize(self.block_size));
        }
        if self.associativity == 0 {
            return Err(ConfigError::InvalidAssociativity);
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge(self.capacity));
        }
        let sets = self.set_count();
        let covered = sets
            .checked_mul(self.associativity)
            .and_then(|lines| lines.checked_mul(self.block_size));
        if covered != Some(self.capacity) || !is_pow_2(sets) {
            return Err(ConfigError::InvalidSetCount(sets));
        }
        Ok(())
    }
}
