use super::MemoryError;
use crate::{unit, Cycle};

/// Configuration of a [`MainMemory`].
#[derive(Debug, Clone)]
pub struct MainMemoryConfig {
    /// Fixed latency of one main-memory access, in cycles.
    pub access_time: Cycle,
    /// Capacity in words.
    pub size_words: u32,
}

impl Default for MainMemoryConfig {
    fn default() -> Self {
        Self {
            access_time: 100,
            size_words: 256,
        }
    }
}

/// Flat, word-indexed main memory.
///
/// Non-word-aligned accesses are illegal throughout the machine, so the
/// backing store is a flat vector of word-sized elements. Byte addresses map
/// to word indices by division by four; alignment itself is enforced a level
/// up, by [`Memory`](super::Memory).
///
/// Every access, word-sized or block-sized, is charged the same fixed
/// `access_time`. A block transfer counts as a single access (burst
/// transfer), which keeps the cache's miss cost closed-form.
#[derive(Debug)]
pub struct MainMemory {
    access_time: Cycle,
    words: Vec<u32>,
}

impl Default for MainMemory {
    fn default() -> Self {
        Self::new(MainMemoryConfig::default())
    }
}

impl MainMemory {
    /// Create a new zero-initialized main memory.
    pub fn new(config: MainMemoryConfig) -> Self {
        Self {
            access_time: config.access_time,
            words: vec![0; config.size_words as usize],
        }
    }

    /// Returns the stored word at byte address `address`, together with the
    /// access latency.
    pub fn read_word(&self, address: u32) -> Result<(u32, Cycle), MemoryError> {
        let index = self.index(address, 1)?;
        Ok((self.words[index], self.access_time))
    }

    /// Stores `value` at byte address `address`, returning the access latency.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<Cycle, MemoryError> {
        let index = self.index(address, 1)?;
        self.words[index] = value;
        Ok(self.access_time)
    }

    /// Reads `buf.len()` consecutive words starting at byte address `address`
    /// into `buf`. Charged as a single access.
    pub(crate) fn read_block(&self, buf: &mut [u32], address: u32) -> Result<Cycle, MemoryError> {
        let index = self.index(address, buf.len())?;
        buf.copy_from_slice(&self.words[index..index + buf.len()]);
        Ok(self.access_time)
    }

    /// Writes the words in `block` to consecutive addresses starting at byte
    /// address `address`. Charged as a single access.
    pub(crate) fn write_block(&mut self, address: u32, block: &[u32]) -> Result<Cycle, MemoryError> {
        let index = self.index(address, block.len())?;
        self.words[index..index + block.len()].copy_from_slice(block);
        Ok(self.access_time)
    }

    /// Read-only view of the whole memory, for dumping.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    fn index(&self, address: u32, len: usize) -> Result<usize, MemoryError> {
        let index = (address / unit::WORD) as usize;
        if index + len > self.words.len() {
            return Err(MemoryError::OutOfBounds { address });
        }
        Ok(index)
    }
}
