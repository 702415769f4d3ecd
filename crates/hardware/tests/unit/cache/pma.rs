//! PMA classification tests.

use river_core::cache::pma::Pma;

#[test]
fn main_memory_is_cached() {
    assert!(Pma::cached(0x0001_0000));
    assert!(Pma::cached(0x8000_0000));
}

#[test]
fn clint_window_is_uncached() {
    assert!(!Pma::cached(0x0200_0000));
    assert!(!Pma::cached(0x0200_FFFF));
    assert!(Pma::cached(0x0201_0000));
}

#[test]
fn plic_window_is_uncached() {
    assert!(!Pma::cached(0x0C00_0000));
    assert!(!Pma::cached(0x0FFF_FFFF));
}

#[test]
fn io_aperture_is_uncached() {
    assert!(!Pma::cached(0x1000_0000));
    assert!(!Pma::cached(0x100F_FFFF));
    assert!(Pma::cached(0x1010_0000));
}
