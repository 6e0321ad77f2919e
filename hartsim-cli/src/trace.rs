//! Textual dumps of the architectural state, rendered from the core's
//! read-only views.

use hartsim_core::mem::{Cache, MainMemory};
use hartsim_core::registers::{Registers, Specifier};
use std::io::{self, Write};

/// Number of words printed per row in the register and memory dumps.
const WORDS_PER_ROW: usize = 4;

/// Dumps the register file, four registers per row.
pub fn dump_registers(out: &mut impl Write, registers: &Registers) -> io::Result<()> {
    for specifier in Specifier::iter_all() {
        let index = usize::from(specifier);
        write!(out, "{:>3} : {:<8x}", specifier.to_string(), registers.read(specifier))?;
        row_separator(out, index)?;
    }
    Ok(())
}

/// Dumps the cache statistics and every active line.
pub fn dump_cache(out: &mut impl Write, cache: &Cache) -> io::Result<()> {
    writeln!(out, "Cache")?;
    writeln!(out, "=====")?;
    writeln!(out, "Hits: {}\tMisses: {}", cache.hits(), cache.misses())?;
    let accesses = cache.hits() + cache.misses();
    let miss_rate = match accesses {
        0 => 0.0,
        _ => 100.0 * cache.misses() as f64 / accesses as f64,
    };
    writeln!(out, "Miss Rate: {miss_rate}%")?;
    for line in cache.lines() {
        write!(out, "{:#010x} : ", line.address)?;
        for word in line.data {
            write!(out, "{word:#010x} ")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Dumps main memory, four words per row with a leading address column.
pub fn dump_main_memory(out: &mut impl Write, memory: &MainMemory) -> io::Result<()> {
    writeln!(out, "Main Memory")?;
    writeln!(out, "===========")?;
    for (index, word) in memory.words().iter().enumerate() {
        if index % WORDS_PER_ROW == 0 {
            write!(out, "{:#010x} : ", index * 4)?;
        }
        write!(out, "{word:#010x}")?;
        row_separator(out, index)?;
    }
    Ok(())
}

fn row_separator(out: &mut impl Write, index: usize) -> io::Result<()> {
    out.write_all(if index % WORDS_PER_ROW == WORDS_PER_ROW - 1 {
        b"\n"
    } else {
        b" "
    })
}
