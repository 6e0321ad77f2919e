use crate::mem::{Memory, MemoryError};
use crate::registers::{Registers, Specifier};
use crate::Cycle;

/// What happened while retiring one instruction: the memory-hierarchy
/// latency incurred in the execute stage, and whether the write-back stage
/// ran.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Retired {
    /// Cycles spent in the memory hierarchy during execute (loads and
    /// stores; zero for everything else).
    pub memory_cycles: Cycle,
    /// Whether the instruction had a destination register. The write-back
    /// stage runs (and is charged) even when the destination is `r0`.
    pub wrote_back: bool,
}

impl Retired {
    fn with_write_back(memory_cycles: Cycle) -> Self {
        Self {
            memory_cycles,
            wrote_back: true,
        }
    }

    fn without_write_back(memory_cycles: Cycle) -> Self {
        Self {
            memory_cycles,
            wrote_back: false,
        }
    }
}

pub(super) type ExecutionResult = Result<Retired, MemoryError>;

/// Applies instruction semantics against the register file and the memory
/// hierarchy. Every method retires exactly one instruction, updating `pc`.
#[derive(Debug)]
pub(super) struct Executor<'a> {
    pub registers: &'a mut Registers,
    pub memory: &'a mut Memory,
}

impl<'a> Executor<'a> {
    /// Executes an `addi` instruction.
    ///
    /// Adds the sign-extended 12-bit immediate to register `src`. Arithmetic
    /// overflow is ignored and the result is simply the low 32 bits.
    pub fn addi(&mut self, dest: Specifier, src: Specifier, immediate: i32) -> ExecutionResult {
        let result = self.registers.read(src).wrapping_add_signed(immediate);
        self.registers.write(dest, result);
        increment_pc(self.registers);
        Ok(Retired::with_write_back(0))
    }

    /// Executes a `lui` instruction.
    ///
    /// Places the U-immediate in the top 20 bits of `dest`, filling the
    /// lowest 12 bits with zeros.
    pub fn lui(&mut self, dest: Specifier, immediate: i32) -> ExecutionResult {
        self.registers.write(dest, immediate as u32 & !0xFFF);
        increment_pc(self.registers);
        Ok(Retired::with_write_back(0))
    }

    /// Executes an `add` instruction.
    pub fn add(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_add(s2))
    }

    /// Executes a `sub` instruction.
    pub fn sub(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1.wrapping_sub(s2))
    }

    /// Executes a `sll` instruction.
    ///
    /// Shifts left by the amount held in the lower 5 bits of `src2`.
    pub fn sll(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 << (s2 & 0x1F))
    }

    /// Executes a `xor` instruction.
    pub fn xor(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 ^ s2)
    }

    /// Executes a `sra` instruction.
    ///
    /// Arithmetic right shift: the sign bit is copied into the vacated upper
    /// bits. The shift amount is the lower 5 bits of `src2`.
    pub fn sra(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| {
            ((s1 as i32) >> (s2 & 0x1F)) as u32
        })
    }

    /// Executes an `or` instruction.
    pub fn or(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 | s2)
    }

    /// Executes an `and` instruction.
    pub fn and(&mut self, dest: Specifier, src1: Specifier, src2: Specifier) -> ExecutionResult {
        self.reg_reg_op(dest, src1, src2, |s1, s2| s1 & s2)
    }

    /// Executes a `jal` instruction.
    ///
    /// Stores the address of the following instruction in `dest`, then jumps
    /// relative to the current `pc`.
    pub fn jal(&mut self, dest: Specifier, offset: i32) -> ExecutionResult {
        let pc = self.registers.pc();
        self.registers.write(dest, pc.wrapping_add(4));
        *self.registers.pc_mut() = pc.wrapping_add_signed(offset);
        Ok(Retired::with_write_back(0))
    }

    /// Executes a `jalr` instruction.
    ///
    /// The target address is `base + offset` with its least-significant bit
    /// cleared. The address of the following instruction goes to `dest`.
    pub fn jalr(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let target = self.registers.read(base).wrapping_add_signed(offset) & !1;
        let pc = self.registers.pc();
        self.registers.write(dest, pc.wrapping_add(4));
        *self.registers.pc_mut() = target;
        Ok(Retired::with_write_back(0))
    }

    /// Executes a `beq` instruction.
    pub fn beq(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.branch_op(src1, src2, offset, |s1, s2| s1 == s2)
    }

    /// Executes a `bne` instruction.
    pub fn bne(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.branch_op(src1, src2, offset, |s1, s2| s1 != s2)
    }

    /// Executes a `blt` instruction (signed comparison).
    pub fn blt(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.branch_op(src1, src2, offset, |s1, s2| (s1 as i32) < (s2 as i32))
    }

    /// Executes a `bge` instruction (signed comparison).
    pub fn bge(&mut self, src1: Specifier, src2: Specifier, offset: i32) -> ExecutionResult {
        self.branch_op(src1, src2, offset, |s1, s2| (s1 as i32) >= (s2 as i32))
    }

    /// Executes a `lw` instruction. The memory latency of the load is
    /// reported in the result.
    pub fn lw(&mut self, dest: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.registers.read(base).wrapping_add_signed(offset);
        let (value, cycles) = self.memory.read_word(address)?;
        self.registers.write(dest, value);
        increment_pc(self.registers);
        Ok(Retired::with_write_back(cycles))
    }

    /// Executes a `sw` instruction. The memory latency of the store is
    /// reported in the result.
    pub fn sw(&mut self, src: Specifier, base: Specifier, offset: i32) -> ExecutionResult {
        let address = self.registers.read(base).wrapping_add_signed(offset);
        let cycles = self.memory.write_word(address, self.registers.read(src))?;
        increment_pc(self.registers);
        Ok(Retired::without_write_back(cycles))
    }

    fn reg_reg_op(
        &mut self,
        dest: Specifier,
        src1: Specifier,
        src2: Specifier,
        op: fn(u32, u32) -> u32,
    ) -> ExecutionResult {
        let result = op(self.registers.read(src1), self.registers.read(src2));
        self.registers.write(dest, result);
        increment_pc(self.registers);
        Ok(Retired::with_write_back(0))
    }

    fn branch_op(
        &mut self,
        src1: Specifier,
        src2: Specifier,
        offset: i32,
        condition: fn(u32, u32) -> bool,
    ) -> ExecutionResult {
        let taken = condition(self.registers.read(src1), self.registers.read(src2));
        let pc = self.registers.pc_mut();
        *pc = match taken {
            true => pc.wrapping_add_signed(offset),
            false => pc.wrapping_add(4),
        };
        Ok(Retired::without_write_back(0))
    }
}

fn increment_pc(registers: &mut Registers) {
    let pc = registers.pc_mut();
    *pc = pc.wrapping_add(4);
}
