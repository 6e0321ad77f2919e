//! Set-associative cache sitting between the core and main memory.

use super::main_memory::MainMemory;
use super::MemoryError;
use crate::{unit, Cycle};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use thiserror::Error;

/// Write policy of a [`Cache`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WritePolicy {
    /// Propagate every write to main memory immediately.
    WriteThrough,
    /// Mark the line dirty and defer the write until eviction.
    WriteBack,
}

/// Replacement policy of a [`Cache`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReplacementPolicy {
    /// Evict the least recently used way of the set.
    Lru,
    /// Evict the way that was filled the longest ago.
    Fifo,
    /// Evict a uniformly random way of the set.
    Random,
}

/// Configuration of a [`Cache`].
///
/// `size_words`, `block_size_words`, and `associativity` must be powers of
/// two, with `size_words` a multiple of `block_size_words * associativity`.
/// The resulting geometry must leave at least one tag bit. [`Cache::new`]
/// rejects anything else.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total capacity in words.
    pub size_words: u32,
    /// Words per block (the unit of transfer from main memory).
    pub block_size_words: u32,
    /// Number of ways per set.
    pub associativity: u32,
    /// Extra cycles charged on a miss, on top of the transfer latencies.
    pub miss_penalty: Cycle,
    /// Cycles charged for the tag lookup itself, hit or miss.
    pub hit_time: Cycle,
    pub write_policy: WritePolicy,
    pub replacement_policy: ReplacementPolicy,
    /// Fixed seed for the RANDOM replacement policy. `None` seeds from
    /// entropy, making victim choices differ between runs.
    pub rng_seed: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_words: 32,
            block_size_words: 2,
            associativity: 2,
            miss_penalty: 4,
            hit_time: 10,
            write_policy: WritePolicy::WriteThrough,
            replacement_policy: ReplacementPolicy::Lru,
            rng_seed: None,
        }
    }
}

/// Rejected [`CacheConfig`] geometry.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CacheConfigError {
    #[error("cache {parameter} must be a power of two, got {value}")]
    NotPowerOfTwo {
        parameter: &'static str,
        value: u32,
    },
    #[error(
        "cache size ({size_words} words) must be a multiple of \
         block size * associativity ({block_size_words} * {associativity})"
    )]
    NotDivisible {
        size_words: u32,
        block_size_words: u32,
        associativity: u32,
    },
    #[error("cache geometry leaves no tag bits")]
    NoTagBits,
}

#[derive(Debug, Clone)]
struct Line {
    tag: u32,
    /// Redundant copy of the set index this line belongs to, kept for
    /// consistency auditing on every hit.
    index: u32,
    data: Vec<u32>,
    active: bool,
    dirty: bool,
}

/// One level of set-associative cache over a [`MainMemory`].
///
/// The cache does not hold a reference to the main memory it fronts; the
/// backing memory is passed into every access instead, so the facade above
/// can own both without aliasing.
///
/// Addresses decompose into `tag | index | offset`, with `offset` covering
/// one block in bytes and `index` selecting the set. Each set keeps an order
/// list of its ways whose front is the eviction candidate; LRU refreshes the
/// list on hits, FIFO only on fills, and RANDOM ignores it.
#[derive(Debug, Clone)]
pub struct Cache {
    associativity: u32,
    miss_penalty: Cycle,
    hit_time: Cycle,
    write_policy: WritePolicy,
    replacement_policy: ReplacementPolicy,
    offset_bits: u32,
    index_bits: u32,
    lines: Vec<Line>,
    /// Per-set order lists of indices into `lines`; front = next victim.
    set_order: Vec<VecDeque<usize>>,
    hits: u64,
    misses: u64,
    rng: SmallRng,
}

/// Read-only view of one active cache line, for dumping.
#[derive(Debug, Copy, Clone)]
pub struct LineView<'a> {
    /// Byte address of the first word of the block.
    pub address: u32,
    pub data: &'a [u32],
}

impl Cache {
    pub fn new(config: CacheConfig) -> Result<Self, CacheConfigError> {
        let size = exponent_checked("size", config.size_words)?;
        let block = exponent_checked("block size", config.block_size_words)?;
        let ways = exponent_checked("associativity", config.associativity)?;
        let line_capacity = config.block_size_words as u64 * config.associativity as u64;
        if config.size_words as u64 % line_capacity != 0 {
            return Err(CacheConfigError::NotDivisible {
                size_words: config.size_words,
                block_size_words: config.block_size_words,
                associativity: config.associativity,
            });
        }

        let offset_bits = block + unit::WORD.ilog2();
        let index_bits = size - block - ways;
        if offset_bits + index_bits >= u32::BITS {
            return Err(CacheConfigError::NoTagBits);
        }

        let num_lines = (config.size_words / config.block_size_words) as usize;
        let num_sets = num_lines / config.associativity as usize;
        let lines = (0..num_lines)
            .map(|_| Line {
                tag: 0,
                index: 0,
                data: vec![0; config.block_size_words as usize],
                active: false,
                dirty: false,
            })
            .collect();
        let set_order = (0..num_sets)
            .map(|set| {
                let base = set * config.associativity as usize;
                (base..base + config.associativity as usize).collect()
            })
            .collect();

        Ok(Self {
            associativity: config.associativity,
            miss_penalty: config.miss_penalty,
            hit_time: config.hit_time,
            write_policy: config.write_policy,
            replacement_policy: config.replacement_policy,
            offset_bits,
            index_bits,
            lines,
            set_order,
            hits: 0,
            misses: 0,
            rng: match config.rng_seed {
                Some(seed) => SmallRng::seed_from_u64(seed),
                None => SmallRng::from_entropy(),
            },
        })
    }

    /// Returns the word at the word-aligned byte address `address`, together
    /// with the total cycles charged for the access.
    pub fn read(&mut self, main: &mut MainMemory, address: u32) -> Result<(u32, Cycle), MemoryError> {
        let (line_id, cycles) = self.lookup(main, address)?;
        let word = (self.offset(address) / unit::WORD) as usize;
        Ok((self.lines[line_id].data[word], cycles))
    }

    /// Writes `value` at the word-aligned byte address `address`, returning
    /// the total cycles charged for the access.
    pub fn write(
        &mut self,
        main: &mut MainMemory,
        address: u32,
        value: u32,
    ) -> Result<Cycle, MemoryError> {
        let (line_id, mut cycles) = self.lookup(main, address)?;
        let word = (self.offset(address) / unit::WORD) as usize;
        self.lines[line_id].data[word] = value;
        match self.write_policy {
            WritePolicy::WriteThrough => cycles += main.write_word(address, value)?,
            WritePolicy::WriteBack => self.lines[line_id].dirty = true,
        }
        Ok(cycles)
    }

    /// Number of lookups that found an active matching line.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of lookups that had to fill a line from main memory.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Iterate over the active lines, for dumping.
    pub fn lines(&self) -> impl Iterator<Item = LineView<'_>> {
        self.lines.iter().filter(|line| line.active).map(|line| LineView {
            address: self.block_address(line.tag, line.index),
            data: &line.data,
        })
    }

    /// Resolves `address` to a line holding its block, filling from `main` on
    /// a miss. Returns the line's index into `self.lines` and the cycles
    /// charged.
    fn lookup(&mut self, main: &mut MainMemory, address: u32) -> Result<(usize, Cycle), MemoryError> {
        let index = self.index(address);
        let tag = self.tag(address);
        let base = (index * self.associativity) as usize;

        for line_id in base..base + self.associativity as usize {
            let line = &self.lines[line_id];
            if line.active && line.tag == tag {
                if line.index != index {
                    return Err(MemoryError::InconsistentCache { address });
                }
                self.hits += 1;
                if self.replacement_policy == ReplacementPolicy::Lru {
                    let order = &mut self.set_order[index as usize];
                    if let Some(position) = order.iter().position(|&id| id == line_id) {
                        order.remove(position);
                    }
                    order.push_back(line_id);
                }
                return Ok((line_id, self.hit_time));
            }
        }

        self.misses += 1;
        let victim_id = self.pick_victim(index);

        let mut transfer = 0;
        let victim = &self.lines[victim_id];
        if victim.dirty {
            let victim_address = self.block_address(victim.tag, victim.index);
            transfer += main.write_block(victim_address, &victim.data)?;
        }

        let block_address = self.block_address(tag, index);
        let line = &mut self.lines[victim_id];
        transfer += main.read_block(&mut line.data, block_address)?;
        line.tag = tag;
        line.index = index;
        line.active = true;
        line.dirty = false;

        Ok((victim_id, self.hit_time + self.miss_penalty + transfer))
    }

    /// Chooses the line to replace within set `index`.
    ///
    /// LRU and FIFO take the front of the set's order list and rotate it to
    /// the back; RANDOM picks a way uniformly and leaves the order list
    /// alone (it is unused under RANDOM).
    fn pick_victim(&mut self, index: u32) -> usize {
        match self.replacement_policy {
            ReplacementPolicy::Random => {
                let way = self.rng.gen_range(0..self.associativity);
                (index * self.associativity + way) as usize
            }
            ReplacementPolicy::Lru | ReplacementPolicy::Fifo => {
                let order = &mut self.set_order[index as usize];
                let victim = order.pop_front().expect("set order list is never empty");
                order.push_back(victim);
                victim
            }
        }
    }

    fn offset(&self, address: u32) -> u32 {
        address & ((1 << self.offset_bits) - 1)
    }

    fn index(&self, address: u32) -> u32 {
        (address >> self.offset_bits) & ((1 << self.index_bits) - 1)
    }

    fn tag(&self, address: u32) -> u32 {
        address >> (self.offset_bits + self.index_bits)
    }

    /// Byte address of the first word of the block identified by
    /// `(tag, index)`.
    fn block_address(&self, tag: u32, index: u32) -> u32 {
        ((tag << self.index_bits) | index) << self.offset_bits
    }
}

fn exponent_checked(parameter: &'static str, value: u32) -> Result<u32, CacheConfigError> {
    if value.is_power_of_two() {
        Ok(value.ilog2())
    } else {
        Err(CacheConfigError::NotPowerOfTwo { parameter, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::main_memory::MainMemoryConfig;

    fn main_memory() -> MainMemory {
        MainMemory::new(MainMemoryConfig {
            access_time: 100,
            size_words: 256,
        })
    }

    fn cache(config: CacheConfig) -> Cache {
        Cache::new(config).unwrap()
    }

    /// `B=2, A=1, NS=4`: addresses 0 and 4 share a block.
    fn tiny_direct_mapped() -> Cache {
        cache(CacheConfig {
            size_words: 8,
            block_size_words: 2,
            associativity: 1,
            ..CacheConfig::default()
        })
    }

    /// `B=1, A=2, NS=1`: one set of two single-word ways.
    fn two_way_single_set(replacement_policy: ReplacementPolicy) -> Cache {
        cache(CacheConfig {
            size_words: 2,
            block_size_words: 1,
            associativity: 2,
            replacement_policy,
            ..CacheConfig::default()
        })
    }

    #[test]
    fn test_config_rejects_non_power_of_two() {
        for (size, block, ways) in [(24, 2, 2), (32, 3, 2), (32, 2, 6)] {
            let result = Cache::new(CacheConfig {
                size_words: size,
                block_size_words: block,
                associativity: ways,
                ..CacheConfig::default()
            });
            assert!(matches!(
                result,
                Err(CacheConfigError::NotPowerOfTwo { .. })
            ));
        }
    }

    #[test]
    fn test_config_rejects_undersized_cache() {
        // 4 words cannot hold 4-word blocks two ways associative.
        let result = Cache::new(CacheConfig {
            size_words: 4,
            block_size_words: 4,
            associativity: 2,
            ..CacheConfig::default()
        });
        assert!(matches!(result, Err(CacheConfigError::NotDivisible { .. })));
    }

    #[test]
    fn test_config_rejects_geometry_without_tag_bits() {
        // 2^30 words direct-mapped with single-word blocks uses all 32
        // address bits for offset and index.
        let result = Cache::new(CacheConfig {
            size_words: 1 << 30,
            block_size_words: 1,
            associativity: 1,
            ..CacheConfig::default()
        });
        assert_eq!(Err(CacheConfigError::NoTagBits), result.map(|_| ()));
    }

    #[test]
    fn test_address_decomposition_round_trips() {
        let cache = cache(CacheConfig::default());
        // 32 words, 2-word blocks, 2 ways: 3 offset bits, 3 index bits.
        for address in [0, 4, 8, 0x40, 0xDEADBEE0, 0xFFFF_FFF8] {
            let tag = cache.tag(address);
            let index = cache.index(address);
            let offset = cache.offset(address);
            assert_eq!(
                address,
                cache.block_address(tag, index) | offset,
                "address {address:#010x}"
            );
        }
    }

    #[test]
    fn test_miss_then_hit_within_block() {
        let mut main = main_memory();
        main.write_word(0, 11).unwrap();
        main.write_word(4, 22).unwrap();
        let mut cache = tiny_direct_mapped();

        // First access misses and pays for the block fill.
        assert_eq!((11, 10 + 4 + 100), cache.read(&mut main, 0).unwrap());
        // Second word of the same block is already resident.
        assert_eq!((22, 10), cache.read(&mut main, 4).unwrap());
        assert_eq!(1, cache.misses());
        assert_eq!(1, cache.hits());
    }

    #[test]
    fn test_counters_cover_all_accesses() {
        let mut main = main_memory();
        let mut cache = tiny_direct_mapped();
        let accesses = [0, 4, 8, 0, 32, 0, 4];
        for address in accesses {
            cache.read(&mut main, address).unwrap();
        }
        assert_eq!(accesses.len() as u64, cache.hits() + cache.misses());
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut main = main_memory();
        let mut cache = two_way_single_set(ReplacementPolicy::Lru);

        for address in [0, 4, 8] {
            cache.read(&mut main, address).unwrap();
        }
        assert_eq!(3, cache.misses());
        assert_eq!(0, cache.hits());
        // Address 0 was least recently used, so the set now holds 4 and 8.
        let mut resident: Vec<u32> = cache.lines().map(|line| line.address).collect();
        resident.sort();
        assert_eq!(vec![4, 8], resident);

        let mut probe_zero = cache.clone();
        let (_, cycles) = probe_zero.read(&mut main, 0).unwrap();
        assert_eq!(4, probe_zero.misses());
        assert!(cycles > 10);

        let mut probe_four = cache.clone();
        let (_, cycles) = probe_four.read(&mut main, 4).unwrap();
        assert_eq!(1, probe_four.hits());
        assert_eq!(10, cycles);
    }

    #[test]
    fn test_back_to_back_hits_diverge_lru_from_fifo() {
        // Fill both ways, then touch address 0 again. Under LRU that
        // refreshes 0 to most-recently-used, so the next miss evicts 4;
        // under FIFO the order list is untouched by hits, so 0 (the oldest
        // fill) is evicted instead.
        let mut main = main_memory();

        let mut lru = two_way_single_set(ReplacementPolicy::Lru);
        for address in [0, 4, 0, 8] {
            lru.read(&mut main, address).unwrap();
        }
        let (_, cycles) = lru.read(&mut main, 0).unwrap();
        assert_eq!(10, cycles, "LRU must keep the re-touched line resident");

        let mut fifo = two_way_single_set(ReplacementPolicy::Fifo);
        for address in [0, 4, 0, 8] {
            fifo.read(&mut main, address).unwrap();
        }
        let (_, cycles) = fifo.read(&mut main, 0).unwrap();
        assert!(cycles > 10, "FIFO must have evicted the oldest fill");
    }

    #[test]
    fn test_random_replacement_is_reproducible_with_seed() {
        let run = |seed| {
            let mut main = main_memory();
            let mut cache = cache(CacheConfig {
                size_words: 2,
                block_size_words: 1,
                associativity: 2,
                replacement_policy: ReplacementPolicy::Random,
                rng_seed: Some(seed),
                ..CacheConfig::default()
            });
            for address in [0, 4, 8, 12, 0, 4, 8, 12] {
                cache.read(&mut main, address).unwrap();
            }
            (cache.hits(), cache.misses())
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_write_through_updates_main_memory() {
        let mut main = main_memory();
        let mut cache = tiny_direct_mapped();

        // Write miss: fill (10 + 4 + 100) plus the write-through (100).
        assert_eq!(214, cache.write(&mut main, 8, 5).unwrap());
        assert_eq!((5, 100), main.read_word(8).unwrap());
        // Write hit still pays for the main-memory write.
        assert_eq!(110, cache.write(&mut main, 8, 6).unwrap());
        assert_eq!((6, 100), main.read_word(8).unwrap());
    }

    #[test]
    fn test_write_back_defers_until_eviction() {
        let mut main = main_memory();
        let mut cache = cache(CacheConfig {
            size_words: 1,
            block_size_words: 1,
            associativity: 1,
            write_policy: WritePolicy::WriteBack,
            ..CacheConfig::default()
        });

        // Write miss: only the fill is charged, main memory is untouched.
        assert_eq!(114, cache.write(&mut main, 0, 42).unwrap());
        assert_eq!((0, 100), main.read_word(0).unwrap());
        // Reading the line back costs a hit, and sees the new value.
        assert_eq!((42, 10), cache.read(&mut main, 0).unwrap());

        // Evicting the dirty line writes it back: fill plus write-back.
        assert_eq!((0, 10 + 4 + 100 + 100), cache.read(&mut main, 4).unwrap());
        assert_eq!((42, 100), main.read_word(0).unwrap());
    }

    #[test]
    fn test_write_back_converges_to_write_through_state() {
        // The same access trace, with every dirty line evicted at the end,
        // must leave main memory identical under both write policies.
        let trace: &[(u32, Option<u32>)] = &[
            (0, Some(1)),
            (4, Some(2)),
            (0, None),
            (8, Some(3)),
            (0, Some(9)),
            (12, None),
        ];
        let run = |write_policy| {
            let mut main = main_memory();
            let mut cache = cache(CacheConfig {
                size_words: 2,
                block_size_words: 1,
                associativity: 2,
                write_policy,
                ..CacheConfig::default()
            });
            for &(address, write) in trace {
                match write {
                    Some(value) => {
                        cache.write(&mut main, address, value).unwrap();
                    }
                    None => {
                        cache.read(&mut main, address).unwrap();
                    }
                }
            }
            // Worst-case sweep over a fresh address range evicts everything.
            for address in (64..128).step_by(4) {
                cache.read(&mut main, address).unwrap();
            }
            main.words().to_vec()
        };
        assert_eq!(run(WritePolicy::WriteThrough), run(WritePolicy::WriteBack));
    }
}
