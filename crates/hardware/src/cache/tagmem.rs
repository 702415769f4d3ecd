//! N-way tag/data memory with LRU replacement.
//!
//! The storage behind both L1 caches: per way and index one line of
//! `{tag, flag bits, data}`. Reads probe every way at the index; a miss
//! reports the LRU victim's contents instead so the controller can
//! schedule its write-back. A separate direct-access mode addresses
//! `{index, way}` explicitly for the reset and flush-all walks, and a
//! snoop port reads flags without disturbing the LRU order.

use super::lru::Lru;
use crate::common::line::CacheLine;
use crate::config::CacheConfig;
use crate::config::defaults::LOG2_L1_BYTES_PER_LINE;

/// Line flag bits.
pub mod fl {
    /// Line holds a valid tag.
    pub const VALID: u8 = 1 << 0;
    /// Line was written since its refill (D-cache only).
    pub const DIRTY: u8 = 1 << 1;
    /// Another cache may hold a copy (D-cache only).
    pub const SHARED: u8 = 1 << 2;
    /// LR reservation marker (D-cache only).
    pub const RESERVED: u8 = 1 << 3;
}

/// One stored line.
#[derive(Clone, Copy, Default)]
struct StoredLine {
    tag: u64,
    flags: u8,
    data: CacheLine,
}

/// Result of a tag probe.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbeOut {
    /// The requested address is present.
    pub hit: bool,
    /// Hit way, or the LRU victim on a miss.
    pub way: usize,
    /// Full address of the returned line (victim address on a miss).
    pub raddr: u64,
    /// Returned line data.
    pub rdata: CacheLine,
    /// Returned line flags.
    pub rflags: u8,
}

/// The tag/data memory of one cache.
pub struct TagMem {
    index_bits: u32,
    ways: Vec<Vec<StoredLine>>,
    lru: Lru,
}

impl TagMem {
    /// Allocates the memory for the given geometry.
    pub fn new(config: &CacheConfig) -> Self {
        let ways = (0..config.ways())
            .map(|_| vec![StoredLine::default(); config.lines()])
            .collect();
        Self {
            index_bits: config.index_bits,
            ways,
            lru: Lru::new(config.lines(), config.ways()),
        }
    }

    fn index(&self, addr: u64) -> usize {
        ((addr >> LOG2_L1_BYTES_PER_LINE) as usize) & ((1 << self.index_bits) - 1)
    }

    fn tag(&self, addr: u64) -> u64 {
        addr >> (LOG2_L1_BYTES_PER_LINE + self.index_bits)
    }

    fn line_addr(&self, tag: u64, index: usize) -> u64 {
        (tag << (LOG2_L1_BYTES_PER_LINE + self.index_bits))
            | ((index as u64) << LOG2_L1_BYTES_PER_LINE)
    }

    /// Probes every way at the address's index.
    ///
    /// On a hit the LRU order is refreshed; on a miss the victim way's
    /// contents come back so a dirty line can be offloaded.
    pub fn probe(&mut self, addr: u64) -> ProbeOut {
        let index = self.index(addr);
        let tag = self.tag(addr);

        for (w, way) in self.ways.iter().enumerate() {
            let line = &way[index];
            if line.flags & fl::VALID != 0 && line.tag == tag {
                self.lru.touch(index, w);
                return ProbeOut {
                    hit: true,
                    way: w,
                    raddr: self.line_addr(tag, index),
                    rdata: line.data,
                    rflags: line.flags,
                };
            }
        }

        let victim = self.lru.victim(index);
        let line = &self.ways[victim][index];
        ProbeOut {
            hit: false,
            way: victim,
            raddr: self.line_addr(line.tag, index),
            rdata: line.data,
            rflags: line.flags,
        }
    }

    /// Reads flags and data without touching the LRU order (snoop port).
    pub fn snoop(&self, addr: u64) -> ProbeOut {
        let index = self.index(addr);
        let tag = self.tag(addr);
        for (w, way) in self.ways.iter().enumerate() {
            let line = &way[index];
            if line.flags & fl::VALID != 0 && line.tag == tag {
                return ProbeOut {
                    hit: true,
                    way: w,
                    raddr: self.line_addr(tag, index),
                    rdata: line.data,
                    rflags: line.flags,
                };
            }
        }
        ProbeOut::default()
    }

    /// Writes the line holding `addr` (hit way, else the LRU victim)
    /// merging `data` under the byte strobe and replacing the flags.
    pub fn write(&mut self, addr: u64, data: &CacheLine, wstrb: u32, flags: u8) {
        let index = self.index(addr);
        let tag = self.tag(addr);

        let way = self
            .hit_way(index, tag)
            .unwrap_or_else(|| self.lru.victim(index));
        let line = &mut self.ways[way][index];
        line.tag = tag;
        line.data.merge(data, wstrb);
        line.flags = flags;
        self.lru.touch(index, way);
    }

    /// Replaces only the flags of a present line (snoop downgrade,
    /// reservation updates).
    pub fn write_flags(&mut self, addr: u64, flags: u8) {
        let index = self.index(addr);
        let tag = self.tag(addr);
        if let Some(way) = self.hit_way(index, tag) {
            self.ways[way][index].flags = flags;
        }
    }

    /// Direct-access invalidate: `{index, way}` taken from the address's
    /// low bits, as the reset and flush-all walks address the memory.
    pub fn invalidate_direct(&mut self, walk_addr: u64, way_bits: u32) -> (u64, u8, CacheLine) {
        let way = (walk_addr as usize) & ((1 << way_bits) - 1);
        let index = self.index(walk_addr);
        let tag = self.ways[way][index].tag;
        let addr = self.line_addr(tag, index);
        let line = &mut self.ways[way][index];
        let flags = line.flags;
        let data = line.data;
        line.flags = 0;
        (addr, flags, data)
    }

    /// Invalidates the line holding `addr` when present.
    pub fn invalidate(&mut self, addr: u64) {
        let index = self.index(addr);
        let tag = self.tag(addr);
        if let Some(way) = self.hit_way(index, tag) {
            self.ways[way][index].flags = 0;
        }
    }

    fn hit_way(&self, index: usize, tag: u64) -> Option<usize> {
        self.ways
            .iter()
            .position(|w| w[index].flags & fl::VALID != 0 && w[index].tag == tag)
    }
}
