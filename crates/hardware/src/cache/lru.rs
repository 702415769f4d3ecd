//! Per-index LRU order tracking.
//!
//! One ordered way-list per cache index: every hit or install moves the
//! touched way to the most-recently-used end, and the victim is whatever
//! sits at the least-recently-used end.

/// LRU state for all indexes of one cache.
pub struct Lru {
    ways: usize,
    /// Way order per index, MRU last.
    order: Vec<Vec<u8>>,
}

impl Lru {
    /// Creates the order table with ways in numeric order.
    pub fn new(lines: usize, ways: usize) -> Self {
        let order = (0..lines)
            .map(|_| (0..ways as u8).collect())
            .collect();
        Self { ways, order }
    }

    /// Marks `way` most recently used at `index`.
    pub fn touch(&mut self, index: usize, way: usize) {
        let row = &mut self.order[index];
        if let Some(pos) = row.iter().position(|&w| w == way as u8) {
            let w = row.remove(pos);
            row.push(w);
        }
    }

    /// The least recently used way at `index`.
    pub fn victim(&self, index: usize) -> usize {
        usize::from(self.order[index][0])
    }

    /// Number of ways tracked.
    pub fn ways(&self) -> usize {
        self.ways
    }
}
