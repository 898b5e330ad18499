//! Cycle-accurate 6510 instruction execution over the byte store and access
//! map of [`crate::memory::Memory`] (§4.B).

pub mod execute;
pub mod opcodes;

#[cfg(test)]
mod test;

use bitflags::bitflags;

use crate::memory::{AccessFlags, Memory, Provenance};
use opcodes::{AddressingMode, Instruction, OPCODES};

bitflags! {
    /// Processor status register bits. `UNUSED` is always set (§3's
    /// invariant); nothing in this crate ever clears it.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct StatusFlags: u8 {
        const CARRY     = 0x01;
        const ZERO      = 0x02;
        const INTERRUPT = 0x04;
        const DECIMAL   = 0x08;
        const BREAK     = 0x10;
        const UNUSED    = 0x20;
        const OVERFLOW  = 0x40;
        const NEGATIVE  = 0x80;
    }
}

const STACK_PAGE: u16 = 0x0100;
const RESET_SP: u8 = 0xFD;
const RESET_STATUS: StatusFlags =
    StatusFlags::from_bits_truncate(StatusFlags::INTERRUPT.bits() | StatusFlags::UNUSED.bits());

/// Step budget for a subroutine run (§4.B, §7). 30,000 single-steps is
/// generous for a per-frame player routine but still bounds a runaway loop.
pub const SUBROUTINE_STEP_BUDGET: u32 = 30_000;

/// Optional sinks invoked synchronously from the step that triggers them
/// (§4.B, §9's "capability struct" design note). Any or all may be left
/// unset; they perform no flow control.
#[derive(Default)]
pub struct Callbacks<'a> {
    pub on_indirect_access: Option<Box<dyn FnMut(u16, u16, u16) + 'a>>,
    pub on_write: Option<Box<dyn FnMut(u16, u8) + 'a>>,
    pub on_vic_write: Option<Box<dyn FnMut(u16, u8) + 'a>>,
    pub on_sid_write: Option<Box<dyn FnMut(u16, u8) + 'a>>,
    pub on_cia_write: Option<Box<dyn FnMut(u16, u8) + 'a>>,
}

/// Where an addressing mode's effective location lives: a concrete address,
/// or the accumulator itself (no memory operand).
#[derive(Debug, Clone, Copy)]
pub enum OperandLoc {
    Accumulator,
    Address(u16),
}

/// The CPU: registers, flags, and an owned [`Memory`]. No `Rc<RefCell<_>>`
/// indirection (Design Note §9) — callers that need to observe memory
/// afterwards do so through `cpu.mem`.
pub struct Cpu<'a> {
    pub mem: Memory,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub pc: u16,
    pub sp: u8,
    pub status: StatusFlags,
    pub cycles: u64,
    pub a_prov: Provenance,
    pub x_prov: Provenance,
    pub y_prov: Provenance,
    pub callbacks: Callbacks<'a>,
}

impl<'a> Cpu<'a> {
    pub fn new() -> Cpu<'a> {
        Cpu {
            mem: Memory::new(),
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: RESET_SP,
            status: RESET_STATUS,
            cycles: 0,
            a_prov: Provenance::unknown(),
            x_prov: Provenance::unknown(),
            y_prov: Provenance::unknown(),
            callbacks: Callbacks::default(),
        }
    }

    /// Clears registers, flags, stack pointer and provenance, but leaves the
    /// byte store and access map untouched (§4.C step 2). Called once before
    /// `init`, and again before every individual call to `play` — the source
    /// behavior this crate reproduces, since a player routine that relies on
    /// entering with fixed register state would otherwise observe whatever
    /// the previous call happened to leave behind.
    pub fn reset_registers_and_flags(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = RESET_SP;
        self.status = RESET_STATUS;
        self.a_prov = Provenance::unknown();
        self.x_prov = Provenance::unknown();
        self.y_prov = Provenance::unknown();
    }

    pub fn flag(&self, flag: StatusFlags) -> bool {
        self.status.contains(flag)
    }

    pub fn set_flag(&mut self, flag: StatusFlags, value: bool) {
        self.status.set(flag, value);
    }

    fn set_zn(&mut self, value: u8) {
        self.set_flag(StatusFlags::ZERO, value == 0);
        self.set_flag(StatusFlags::NEGATIVE, value & 0x80 != 0);
    }

    fn push8(&mut self, value: u8) {
        let addr = STACK_PAGE + self.sp as u16;
        self.mem.poke(addr, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop8(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        let addr = STACK_PAGE + self.sp as u16;
        self.mem.peek(addr)
    }

    fn push16(&mut self, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.push8(hi);
        self.push8(lo);
    }

    fn pop16(&mut self) -> u16 {
        let lo = self.pop8();
        let hi = self.pop8();
        u16::from_le_bytes([lo, hi])
    }

    /// Reads a little-endian word from the zero page, wrapping the high
    /// byte's address within page zero (`$FF` pairs with `$00`, not `$0100`).
    fn read_word_zero_page(&mut self, zp: u8) -> u16 {
        let lo = self.mem.read(zp as u16);
        let hi = self.mem.read(zp.wrapping_add(1) as u16);
        u16::from_le_bytes([lo, hi])
    }

    /// Whether an indexed read in this addressing mode incurs the
    /// conditional page-cross cycle. Pure reads (loads, compares, ALU ops)
    /// pay it; stores and read-modify-write instructions already have the
    /// worst case baked into their table entry and never pay it again.
    fn has_conditional_page_penalty(instruction: Instruction) -> bool {
        use Instruction::*;
        matches!(
            instruction,
            Lda | Ldx | Ldy | Adc | And | Cmp | Cpx | Cpy | Eor | Ora | Sbc | Lax | Las
        )
    }

    /// Resolves the effective address (or accumulator) for `mode`, advancing
    /// `pc` over any operand bytes and charging page-cross penalties where
    /// applicable (§4.B). `pc0` is the address of the opcode byte, used for
    /// index-range tracking and indirect-access callbacks.
    fn resolve_operand(&mut self, mode: AddressingMode, instruction: Instruction, pc0: u16) -> OperandLoc {
        use AddressingMode::*;
        match mode {
            Accumulator => OperandLoc::Accumulator,
            Implied => OperandLoc::Accumulator, // never dereferenced by Implied instructions
            Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                OperandLoc::Address(addr)
            }
            ZeroPage => {
                let addr = self.mem.fetch_operand(self.pc) as u16;
                self.pc = self.pc.wrapping_add(1);
                OperandLoc::Address(addr)
            }
            ZeroPageX => {
                let base = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.mem.record_index(pc0, self.x);
                OperandLoc::Address(base.wrapping_add(self.x) as u16)
            }
            ZeroPageY => {
                let base = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.mem.record_index(pc0, self.y);
                OperandLoc::Address(base.wrapping_add(self.y) as u16)
            }
            Absolute => {
                let lo = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                OperandLoc::Address(u16::from_le_bytes([lo, hi]))
            }
            AbsoluteX | AbsoluteY => {
                let lo = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let base = u16::from_le_bytes([lo, hi]);
                let index = if mode == AbsoluteX { self.x } else { self.y };
                self.mem.record_index(pc0, index);
                let addr = base.wrapping_add(index as u16);
                if Self::has_conditional_page_penalty(instruction) && (base & 0xFF00) != (addr & 0xFF00) {
                    self.cycles += 1;
                }
                OperandLoc::Address(addr)
            }
            Indirect => {
                let lo = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let hi = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                let ptr = u16::from_le_bytes([lo, hi]);
                // Replicates the documented 6502 page-wrap bug: the high
                // byte is fetched from (ptr & $FF00)|((ptr+1) & $00FF), not
                // from ptr+1 when that would cross a page.
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let target_lo = self.mem.read(ptr);
                let target_hi = self.mem.read(hi_addr);
                OperandLoc::Address(u16::from_le_bytes([target_lo, target_hi]))
            }
            IndirectX => {
                let operand = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.mem.record_index(pc0, self.x);
                let zp = operand.wrapping_add(self.x);
                let effective = self.read_word_zero_page(zp);
                if let Some(cb) = self.callbacks.on_indirect_access.as_mut() {
                    cb(pc0, zp as u16, effective);
                }
                OperandLoc::Address(effective)
            }
            IndirectY => {
                let zp = self.mem.fetch_operand(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.mem.record_index(pc0, self.y);
                let base = self.read_word_zero_page(zp);
                let effective = base.wrapping_add(self.y as u16);
                if Self::has_conditional_page_penalty(instruction) && (base & 0xFF00) != (effective & 0xFF00) {
                    self.cycles += 1;
                }
                if let Some(cb) = self.callbacks.on_indirect_access.as_mut() {
                    cb(pc0, zp as u16, effective);
                }
                OperandLoc::Address(effective)
            }
            Relative => {
                let offset = self.mem.fetch_operand(self.pc) as i8;
                self.pc = self.pc.wrapping_add(1);
                let addr = self.pc.wrapping_add(offset as u16);
                OperandLoc::Address(addr)
            }
        }
    }

    /// Writes through to memory, propagating the writing register's
    /// provenance and firing the generic + region-filtered write callbacks
    /// (§4.B's register-provenance rule; §4.C's VIC/SID/CIA sinks).
    pub fn write_with_provenance(&mut self, addr: u16, value: u8, writer_pc: u16, provenance: Provenance) {
        self.mem.write(addr, value, writer_pc, provenance);
        if let Some(cb) = self.callbacks.on_write.as_mut() {
            cb(addr, value);
        }
        match addr {
            0xD000..=0xD3FF => {
                if let Some(cb) = self.callbacks.on_vic_write.as_mut() {
                    cb(addr, value);
                }
            }
            0xD400..=0xD7FF => {
                if let Some(cb) = self.callbacks.on_sid_write.as_mut() {
                    cb(addr, value);
                }
            }
            0xDC00..=0xDCFF => {
                if let Some(cb) = self.callbacks.on_cia_write.as_mut() {
                    cb(addr, value);
                }
            }
            _ => {}
        }
    }

    /// Executes exactly one instruction (§4.B's single-step contract).
    pub fn step(&mut self) {
        let pc0 = self.pc;
        let opcode = self.mem.fetch_opcode(self.pc);
        self.pc = self.pc.wrapping_add(1);
        let entry = OPCODES[opcode as usize];

        let operand = self.resolve_operand(entry.mode, entry.instruction, pc0);
        self.cycles += entry.cycles as u64;
        execute::execute(self, entry.instruction, entry.mode, operand, pc0);
    }

    /// Runs `target` as a subroutine call: pushes a synthetic return address
    /// and single-steps until a matching `RTS`, a fatal condition, or the
    /// step budget is exhausted (§4.B, §7). Returns whether a matching `RTS`
    /// was reached.
    pub fn run_subroutine(&mut self, target: u16) -> bool {
        use std::collections::HashSet;

        // Manual JSR: the return address is target-1 (RTS adds 1 back), the
        // same convention the JSR opcode itself uses.
        self.push16(self.pc.wrapping_sub(1));
        self.pc = target;
        let entry_sp = self.sp;

        let mut reported_low_pc = false;
        let mut reported_low_sp = false;
        let mut reported_jumps: HashSet<u16> = HashSet::new();
        let mut reported_rts_returns: HashSet<u16> = HashSet::new();
        let mut pc_history: std::collections::VecDeque<u16> = std::collections::VecDeque::with_capacity(8);

        for step_count in 0..SUBROUTINE_STEP_BUDGET {
            let pc_before = self.pc;

            if pc_before <= 0x0001 {
                log::warn!(
                    "6510 core: execution reached ${:04X}, aborting subroutine run to ${:04X}",
                    pc_before,
                    target
                );
                return false;
            }
            if pc_before <= 0x00FF && !reported_low_pc {
                log::warn!(
                    "6510 core: execution entered low memory at ${:04X} during subroutine ${:04X}",
                    pc_before,
                    target
                );
                reported_low_pc = true;
            }
            if self.sp < 0xA0 && !reported_low_sp {
                log::warn!(
                    "6510 core: stack pointer dropped to ${:02X} during subroutine ${:04X}",
                    self.sp,
                    target
                );
                reported_low_sp = true;
            }

            if let Some(jump_target) = self.peek_jump_target(pc_before) {
                if jump_target <= 0x0001 {
                    log::warn!(
                        "6510 core: jump/call to ${:04X} from ${:04X}, aborting subroutine run to ${:04X}",
                        jump_target,
                        pc_before,
                        target
                    );
                    return false;
                }
                if jump_target <= 0x00FF && reported_jumps.insert(jump_target) {
                    log::warn!(
                        "6510 core: jump/call to low memory ${:04X} from ${:04X}",
                        jump_target,
                        pc_before
                    );
                }
            }

            if pc_history.len() == 8 {
                pc_history.pop_front();
            }
            pc_history.push_back(pc_before);

            let was_rts = self.mem.peek(pc_before) == 0x60;
            if was_rts && self.sp < 0xFC {
                let candidate = u16::from_le_bytes([
                    self.mem.peek(STACK_PAGE + self.sp.wrapping_add(1) as u16),
                    self.mem.peek(STACK_PAGE + self.sp.wrapping_add(2) as u16),
                ]);
                if candidate < 0x0100 && reported_rts_returns.insert(candidate) {
                    log::warn!(
                        "6510 core: RTS at ${:04X} returns to low memory ${:04X}",
                        pc_before,
                        candidate
                    );
                }
            }

            self.step();

            if was_rts && self.sp == entry_sp.wrapping_add(2) {
                return true;
            }

            let _ = step_count;
        }

        log::warn!(
            "6510 core: subroutine ${:04X} exhausted its {}-step budget; recent PC history: {:?}",
            target,
            SUBROUTINE_STEP_BUDGET,
            pc_history.into_iter().collect::<Vec<_>>()
        );
        false
    }

    /// If the opcode at `pc` is `JMP`/`JSR` (absolute or indirect... only
    /// absolute forms carry a directly-readable 16-bit target), returns that
    /// target without performing the jump. Used to detect problematic jumps
    /// one step ahead of executing them.
    fn peek_jump_target(&self, pc: u16) -> Option<u16> {
        let opcode = self.mem.peek(pc);
        match opcode {
            0x4C | 0x20 => {
                // JMP abs / JSR abs
                let lo = self.mem.peek(pc.wrapping_add(1));
                let hi = self.mem.peek(pc.wrapping_add(2));
                Some(u16::from_le_bytes([lo, hi]))
            }
            _ => None,
        }
    }
}

impl<'a> Default for Cpu<'a> {
    fn default() -> Self {
        Cpu::new()
    }
}

/// A byte is only ever `OpCode` if it is also `Execute` (§4.A's invariant).
#[allow(dead_code)]
fn debug_assert_opcode_implies_execute(flags: AccessFlags) -> bool {
    !flags.contains(AccessFlags::OPCODE) || flags.contains(AccessFlags::EXECUTE)
}
