//! Memory structure

pub mod cache;
pub mod mmu;
pub mod segment;

use log::debug;

use cache::Cache;
use cache::CacheHistory;
use cache::CachePolicy;
use mmu::MMU;
use segment::SegmentMap;

use crate::error::MemoryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}

/// Outcome of a data access in one cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortResult {
    /// Completed; holds the loaded word for reads and zero for writes
    Ready(u64),
    /// A miss is still being serviced
    Pending,
}

/// A miss waiting out its latency
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct InFlight {
    address: u64,
    access_type: AccessType,
    remaining: u64,
}

/// Memory interface seen by the pipeline: instruction fetch straight
/// from memory, data accesses through the optional cache
#[derive(Clone, Debug)]
pub struct DataPort {
    pub mmu: MMU,
    pub segments: SegmentMap,
    cache: Option<Cache>,
    in_flight: Option<InFlight>,
}

impl DataPort {
    pub fn new(mmu: MMU, segments: SegmentMap, policy: Option<CachePolicy>) -> Self {
        Self { mmu, segments, cache: policy.map(Cache::make), in_flight: None }
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    pub fn cache_history(&self) -> Option<CacheHistory> {
        self.cache.as_ref().map(|c| c.history)
    }

    /// Whether a miss is occupying the memory stage
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Reads the instruction word at `address`
    pub fn fetch32(&self, address: u64) -> Result<u32, MemoryError> {
        self.segments.check_imem(address)?;
        Ok(self.mmu.get32(address))
    }

    /// Performs one cycle's worth of a data access.
    ///
    /// A miss with latency `d > 0` returns [`PortResult::Pending`] and
    /// must be retried on each of the next `d` cycles with the same
    /// address; the last retry completes it.
    pub fn access(
        &mut self,
        address: u64,
        access_type: AccessType,
        value: u64,
    ) -> Result<PortResult, MemoryError> {
        self.segments.check_dmem(address, access_type)?;

        if self.segments.is_special(address) || self.cache.is_none() {
            return Ok(PortResult::Ready(self.direct(address, access_type, value)));
        }

        if let Some(mut pending) = self.in_flight.take() {
            if pending.address == address && pending.access_type == access_type {
                pending.remaining = pending.remaining.saturating_sub(1);
                if pending.remaining > 0 {
                    self.in_flight = Some(pending);
                    return Ok(PortResult::Pending);
                }
                return Ok(PortResult::Ready(self.complete_miss(address, access_type, value)));
            }
            debug!("dropping stale in-flight access at {:#x}", pending.address);
        }

        let Some(cache) = self.cache.as_mut() else {
            return Ok(PortResult::Ready(self.direct(address, access_type, value)));
        };
        if cache.check_hit(address, access_type) {
            return Ok(PortResult::Ready(Self::cached(cache, address, access_type, value)));
        }

        let latency = cache.policy.miss_latency;
        debug!("cache miss at {address:#x}, {latency} cycle(s)");
        if latency == 0 {
            return Ok(PortResult::Ready(self.complete_miss(address, access_type, value)));
        }
        self.in_flight = Some(InFlight { address, access_type, remaining: latency });
        Ok(PortResult::Pending)
    }

    /// Memory contents as the program sees them, with dirty cache
    /// lines laid over the backing store
    pub fn coherent_mmu(&self) -> MMU {
        let mut mmu = self.mmu.clone();
        if let Some(cache) = &self.cache {
            for (address, data) in cache.dirty_lines() {
                mmu.write_block(address, data);
            }
        }
        mmu
    }

    fn direct(&mut self, address: u64, access_type: AccessType, value: u64) -> u64 {
        match access_type {
            AccessType::Read => self.mmu.get64(address),
            AccessType::Write => {
                self.mmu.set64(address, value);
                0
            }
        }
    }

    fn cached(cache: &mut Cache, address: u64, access_type: AccessType, value: u64) -> u64 {
        match access_type {
            AccessType::Read => cache.get_word(address).unwrap_or(0),
            AccessType::Write => {
                cache.set_word(address, value);
                0
            }
        }
    }

    /// Fills the line for `address`, writes back a dirty victim,
    /// then performs the access against the new line
    fn complete_miss(&mut self, address: u64, access_type: AccessType, value: u64) -> u64 {
        let Some(cache) = self.cache.as_mut() else {
            return self.direct(address, access_type, value);
        };
        let block_size = cache.policy.block_size;
        let base = address & !(block_size - 1);
        let block = self.mmu.read_block(base, block_size as usize);
        let evicted = cache.handle_miss(address, access_type, Some(&block));
        if evicted.valid && evicted.dirty {
            debug!("writing back dirty line {:#x}", evicted.address);
            self.mmu.write_block(evicted.address, &evicted.data);
        }
        Self::cached(cache, address, access_type, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::segment::DATA_START;

    fn port(policy: Option<CachePolicy>) -> DataPort {
        DataPort::new(MMU::make(), SegmentMap::default(), policy)
    }

    #[test]
    fn test_uncached_access_is_immediate() {
        let mut port = port(None);
        assert_eq!(port.access(DATA_START, AccessType::Write, 9), Ok(PortResult::Ready(0)));
        assert_eq!(port.access(DATA_START, AccessType::Read, 0), Ok(PortResult::Ready(9)));
        assert!(!port.in_flight());
        assert!(port.cache_history().is_none());
    }

    #[test]
    fn test_miss_latency() {
        let policy = CachePolicy::make(1, 8, 64, 3).unwrap();
        let mut port = port(Some(policy));
        port.mmu.set64(DATA_START, 77);

        for _ in 0..3 {
            assert_eq!(port.access(DATA_START, AccessType::Read, 0), Ok(PortResult::Pending));
            assert!(port.in_flight());
        }
        assert_eq!(port.access(DATA_START, AccessType::Read, 0), Ok(PortResult::Ready(77)));
        assert!(!port.in_flight());

        // Retries do not count as extra lookups
        let history = port.cache_history().unwrap();
        assert_eq!((history.num_hit, history.num_miss), (0, 1));

        assert_eq!(port.access(DATA_START, AccessType::Read, 0), Ok(PortResult::Ready(77)));
        assert_eq!(port.cache_history().unwrap().num_hit, 1);
    }

    #[test]
    fn test_zero_latency_miss_completes_at_once() {
        let policy = CachePolicy::make(1, 8, 64, 0).unwrap();
        let mut port = port(Some(policy));
        assert_eq!(port.access(DATA_START, AccessType::Write, 5), Ok(PortResult::Ready(0)));
        assert!(!port.in_flight());
        assert_eq!(port.access(DATA_START, AccessType::Read, 0), Ok(PortResult::Ready(5)));
    }

    #[test]
    fn test_write_back_on_dirty_eviction() {
        // Direct-mapped, a single 8-byte line
        let policy = CachePolicy::make(1, 8, 8, 0).unwrap();
        let mut port = port(Some(policy));
        port.access(DATA_START, AccessType::Write, 0xAB).unwrap();
        // Still only in the cache
        assert_eq!(port.mmu.get64(DATA_START), 0);
        assert_eq!(port.coherent_mmu().get64(DATA_START), 0xAB);

        port.access(DATA_START + 8, AccessType::Read, 0).unwrap();
        assert_eq!(port.mmu.get64(DATA_START), 0xAB);
        assert_eq!(port.cache_history().unwrap().num_dirty_evict, 1);
    }

    #[test]
    fn test_faults() {
        let mut port = port(None);
        assert!(port.access(DATA_START + 1, AccessType::Read, 0).is_err());
        assert!(port.access(0x40_0000, AccessType::Write, 0).is_err());
        assert!(port.fetch32(DATA_START).is_err());
        assert!(port.fetch32(0x40_0000).is_ok());
    }
}
