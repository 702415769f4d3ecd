//! LRU order tests.

use pretty_assertions::assert_eq;

use river_core::cache::lru::Lru;

#[test]
fn initial_victim_is_way_zero() {
    let lru = Lru::new(4, 4);
    assert_eq!(lru.victim(0), 0);
}

#[test]
fn touch_moves_to_mru() {
    let mut lru = Lru::new(4, 4);
    lru.touch(0, 0);
    assert_eq!(lru.victim(0), 1, "way 0 became MRU");
}

#[test]
fn victim_cycles_through_all_ways() {
    let mut lru = Lru::new(1, 4);
    let mut seen = Vec::new();
    for _ in 0..4 {
        let v = lru.victim(0);
        seen.push(v);
        lru.touch(0, v);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3]);
}

#[test]
fn indexes_are_independent() {
    let mut lru = Lru::new(2, 2);
    lru.touch(0, 0);
    assert_eq!(lru.victim(0), 1);
    assert_eq!(lru.victim(1), 0, "index 1 unaffected");
}
