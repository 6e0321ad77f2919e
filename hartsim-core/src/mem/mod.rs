//! The memory hierarchy: a flat main memory, an optional one-level cache in
//! front of it, and the facade the core goes through for every access.

pub mod cache;
pub mod main_memory;

pub use cache::{Cache, CacheConfig, CacheConfigError, LineView, ReplacementPolicy, WritePolicy};
pub use main_memory::{MainMemory, MainMemoryConfig};

use crate::{is_word_aligned, Cycle};
use log::warn;
use std::ops::Range;
use thiserror::Error;

/// Errors raised by the memory hierarchy. All of them are fatal to the
/// current simulation.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MemoryError {
    #[error("unaligned memory access at {address:#010x}")]
    MisalignedAccess { address: u32 },
    #[error("address {address:#010x} is outside memory bounds")]
    OutOfBounds { address: u32 },
    /// The audit copy of a line's set index disagrees with the index decoded
    /// from its address. This indicates a bug in the cache itself, not bad
    /// input.
    #[error("cache is in an inconsistent state for address {address:#010x}")]
    InconsistentCache { address: u32 },
}

/// Uniform access surface over "cache-or-direct" memory.
///
/// Owns the main memory and, when configured with one, the cache in front of
/// it. All accesses are word-sized and must be word-aligned. Writes that land
/// inside the loaded program image are legal but suspicious, and emit a
/// warning.
#[derive(Debug)]
pub struct Memory {
    backend: Backend,
    /// Byte-address extent of the loaded program, recorded at load time.
    program_range: Option<Range<u32>>,
}

#[derive(Debug)]
enum Backend {
    Direct(MainMemory),
    Cached { cache: Cache, main: MainMemory },
}

impl Memory {
    /// A memory hierarchy without a cache; every access goes straight to
    /// `main`.
    pub fn direct(main: MainMemory) -> Self {
        Self {
            backend: Backend::Direct(main),
            program_range: None,
        }
    }

    /// A memory hierarchy with `cache` in front of `main`.
    pub fn cached(cache: Cache, main: MainMemory) -> Self {
        Self {
            backend: Backend::Cached { cache, main },
            program_range: None,
        }
    }

    /// Record the byte-address extent of the program image, enabling the
    /// advisory warning on writes into it.
    pub fn set_program_range(&mut self, range: Range<u32>) {
        self.program_range = Some(range);
    }

    /// Returns the word at `address` and the access latency.
    pub fn read_word(&mut self, address: u32) -> Result<(u32, Cycle), MemoryError> {
        check_alignment(address)?;
        match &mut self.backend {
            Backend::Direct(main) => main.read_word(address),
            Backend::Cached { cache, main } => cache.read(main, address),
        }
    }

    /// Writes `value` at `address`, returning the access latency.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<Cycle, MemoryError> {
        check_alignment(address)?;
        if let Some(range) = &self.program_range {
            if range.contains(&address) {
                warn!("write to program memory at {address:#010x}, may make the program ill-formed");
            }
        }
        match &mut self.backend {
            Backend::Direct(main) => main.write_word(address, value),
            Backend::Cached { cache, main } => cache.write(main, address, value),
        }
    }

    /// Writes `value` straight to main memory, bypassing the cache.
    ///
    /// This exists solely to place the program image before execution starts.
    /// Calling it after the cache has been populated would let main memory
    /// and cache disagree.
    pub fn raw_write_word(&mut self, address: u32, value: u32) -> Result<Cycle, MemoryError> {
        match &mut self.backend {
            Backend::Direct(main) | Backend::Cached { main, .. } => main.write_word(address, value),
        }
    }

    /// Read-only view of the backing main memory, for dumping.
    pub fn main_memory(&self) -> &MainMemory {
        match &self.backend {
            Backend::Direct(main) | Backend::Cached { main, .. } => main,
        }
    }

    /// Read-only view of the cache, if one is configured.
    pub fn cache(&self) -> Option<&Cache> {
        match &self.backend {
            Backend::Direct(_) => None,
            Backend::Cached { cache, .. } => Some(cache),
        }
    }
}

fn check_alignment(address: u32) -> Result<(), MemoryError> {
    if is_word_aligned(address) {
        Ok(())
    } else {
        Err(MemoryError::MisalignedAccess { address })
    }
}
