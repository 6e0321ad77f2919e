//! The top-level simulation loop.

use crate::core::{Core, ExecutionError};
use crate::mem::{Memory, MemoryError};
use crate::program::Program;
use crate::{unit, Cycle};
use log::trace;

/// Per-instruction record handed to the caller after each step, for tracing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StepReport {
    /// `pc` of the instruction that was just retired.
    pub pc: u32,
    /// Total cycle cost of that instruction (all stages).
    pub cycles: Cycle,
}

/// Drives a [`Core`] from a loaded program image to termination,
/// accumulating total simulated time.
///
/// The program is placed in main memory word by word, bypassing the cache
/// (nothing has touched the cache yet at that point), and its extent is
/// recorded so that later stores into it can be flagged. Execution starts at
/// address 0 and finishes when `pc` reaches the end of the image.
#[derive(Debug)]
pub struct Simulator {
    core: Core,
    /// Byte address one past the loaded program; reaching it terminates the
    /// run.
    end: u32,
    time: Cycle,
}

impl Simulator {
    /// Loads `program` into `memory` and prepares a core to run it.
    ///
    /// Fails if the image does not fit in main memory.
    pub fn new(mut memory: Memory, program: &Program) -> Result<Self, MemoryError> {
        let mut address = 0;
        for &word in program.words() {
            memory.raw_write_word(address, word)?;
            address += unit::WORD;
        }
        memory.set_program_range(0..address);
        trace!("loaded {} instruction words", program.words().len());

        Ok(Self {
            core: Core::new(memory),
            end: address,
            time: 0,
        })
    }

    /// Returns `true` once `pc` has reached the end of the program image.
    pub fn is_finished(&self) -> bool {
        self.core.registers().pc() == self.end
    }

    /// Retires one instruction, accumulating its cycle cost.
    ///
    /// Errors are fatal to the run; the simulator must not be stepped again
    /// after one.
    pub fn step(&mut self) -> Result<StepReport, ExecutionError> {
        let pc = self.core.registers().pc();
        let cycles = self.core.step()?;
        self.time += cycles;
        trace!("retired instruction at {pc:#010x} in {cycles} cycles");
        Ok(StepReport { pc, cycles })
    }

    /// Runs until the program terminates.
    pub fn run(&mut self) -> Result<(), ExecutionError> {
        while !self.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    /// Total simulated time so far.
    pub fn total_cycles(&self) -> Cycle {
        self.time
    }

    pub fn core(&self) -> &Core {
        &self.core
    }
}
