//! Program image loading.
//!
//! Accepts either an ELF64 executable (loadable segments are copied to
//! their load addresses) or a raw flat image placed at an explicit
//! address. The entry point of an ELF image is returned so the caller
//! can align it with the configured reset vector.

use std::fs;
use std::path::Path;

use object::{File, Object, ObjectSegment};
use tracing::info;

use crate::common::error::SimError;
use crate::soc::SocMemory;

/// Loads an ELF image into memory; returns the entry point.
///
/// # Errors
///
/// Fails when the file cannot be read or is not a valid object file.
pub fn load_elf(path: &Path, memory: &mut SocMemory) -> Result<u64, SimError> {
    let bytes = fs::read(path)?;
    let elf = File::parse(&*bytes)?;

    for segment in elf.segments() {
        let addr = segment.address();
        let data = segment.data()?;
        if data.is_empty() {
            continue;
        }
        memory.load(addr, data);
        info!(
            addr = format_args!("{addr:#x}"),
            len = data.len(),
            "loaded segment"
        );
    }

    Ok(elf.entry())
}

/// Loads a raw flat image at `addr`.
///
/// # Errors
///
/// Fails when the file cannot be read.
pub fn load_flat(path: &Path, addr: u64, memory: &mut SocMemory) -> Result<(), SimError> {
    let bytes = fs::read(path)?;
    info!(
        addr = format_args!("{addr:#x}"),
        len = bytes.len(),
        "loaded flat image"
    );
    memory.load(addr, &bytes);
    Ok(())
}
