//! Per-instruction effects (§4.B). Addressing has already been resolved by
//! [`super::Cpu::resolve_operand`] into an [`super::OperandLoc`] by the time
//! any of these run; this module only implements what each instruction does
//! with that location.

use super::{Cpu, OperandLoc, StatusFlags};
use crate::cpu::opcodes::{AddressingMode, Instruction};
use crate::memory::Provenance;

fn load(cpu: &mut Cpu, operand: OperandLoc) -> u8 {
    match operand {
        OperandLoc::Accumulator => cpu.a,
        OperandLoc::Address(addr) => cpu.mem.read(addr),
    }
}

fn operand_address(operand: OperandLoc) -> Option<u16> {
    match operand {
        OperandLoc::Accumulator => None,
        OperandLoc::Address(addr) => Some(addr),
    }
}

/// Provenance for a value freshly loaded from `operand`. `Immediate` mode
/// produces an immediate-kind record; every other addressing mode produces
/// a memory-kind record naming the address read and the index register
/// value used to reach it (0 when the mode was not indexed).
fn load_provenance(mode: AddressingMode, operand: OperandLoc, value: u8, index_used: u8) -> Provenance {
    match (mode, operand) {
        (AddressingMode::Immediate, OperandLoc::Address(addr)) => Provenance::immediate_at(addr, value),
        (AddressingMode::Immediate, OperandLoc::Accumulator) => Provenance::immediate(value),
        (_, OperandLoc::Address(addr)) => Provenance::memory(addr, value, index_used),
        (_, OperandLoc::Accumulator) => Provenance::immediate(value),
    }
}

fn index_used_for(cpu: &Cpu, mode: AddressingMode) -> u8 {
    use AddressingMode::*;
    match mode {
        ZeroPageX | AbsoluteX | IndirectX => cpu.x,
        ZeroPageY | AbsoluteY | IndirectY => cpu.y,
        _ => 0,
    }
}

fn store(cpu: &mut Cpu, operand: OperandLoc, value: u8, pc0: u16, provenance: Provenance) {
    match operand {
        OperandLoc::Accumulator => cpu.a = value,
        OperandLoc::Address(addr) => cpu.write_with_provenance(addr, value, pc0, provenance),
    }
}

fn adc(cpu: &mut Cpu, value: u8) {
    let carry_in: u16 = if cpu.flag(StatusFlags::CARRY) { 1 } else { 0 };
    if cpu.flag(StatusFlags::DECIMAL) {
        // BCD addition. V is left as whatever the binary formula below
        // would produce; decimal-mode overflow is undefined on the NMOS
        // part and this crate does not special-case it (Design Note §9b).
        let mut lo = (cpu.a & 0x0F) as u16 + (value & 0x0F) as u16 + carry_in;
        let mut hi = (cpu.a >> 4) as u16 + (value >> 4) as u16;
        if lo > 9 {
            lo += 6;
            hi += 1;
        }
        let binary_result = cpu.a as u16 + value as u16 + carry_in;
        let overflow = (!(cpu.a ^ value) & (cpu.a ^ (binary_result as u8)) & 0x80) != 0;
        if hi > 9 {
            hi += 6;
        }
        let result = (((hi & 0x0F) << 4) | (lo & 0x0F)) as u8;
        cpu.set_flag(StatusFlags::CARRY, hi > 15);
        cpu.set_flag(StatusFlags::OVERFLOW, overflow);
        cpu.set_zn(result);
        cpu.a = result;
    } else {
        let result = cpu.a as u16 + value as u16 + carry_in;
        let result_u8 = result as u8;
        let overflow = (!(cpu.a ^ value) & (cpu.a ^ result_u8) & 0x80) != 0;
        cpu.set_flag(StatusFlags::CARRY, result > 0xFF);
        cpu.set_flag(StatusFlags::OVERFLOW, overflow);
        cpu.set_zn(result_u8);
        cpu.a = result_u8;
    }
}

fn sbc(cpu: &mut Cpu, value: u8) {
    // SBC(value) == ADC(!value) for the binary carry/overflow math; decimal
    // mode subtracts the BCD value directly instead.
    if cpu.flag(StatusFlags::DECIMAL) {
        let carry_in: i16 = if cpu.flag(StatusFlags::CARRY) { 1 } else { 0 };
        let binary_result = cpu.a as i16 - value as i16 - (1 - carry_in);
        let overflow = ((cpu.a ^ value) & (cpu.a ^ (binary_result as u8)) & 0x80) != 0;

        let mut lo = (cpu.a & 0x0F) as i16 - (value & 0x0F) as i16 - (1 - carry_in);
        let mut hi = (cpu.a >> 4) as i16 - (value >> 4) as i16;
        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }
        let result = (((hi as u8) << 4) & 0xF0 | (lo as u8) & 0x0F) as u8;
        cpu.set_flag(StatusFlags::CARRY, binary_result >= 0);
        cpu.set_flag(StatusFlags::OVERFLOW, overflow);
        cpu.set_zn(binary_result as u8);
        cpu.a = result;
    } else {
        adc(cpu, !value);
    }
}

fn compare(cpu: &mut Cpu, reg: u8, value: u8) {
    let result = reg.wrapping_sub(value);
    cpu.set_flag(StatusFlags::CARRY, reg >= value);
    cpu.set_flag(StatusFlags::ZERO, reg == value);
    cpu.set_flag(StatusFlags::NEGATIVE, result & 0x80 != 0);
}

fn branch(cpu: &mut Cpu, taken: bool, target: u16) {
    if !taken {
        return;
    }
    let base = cpu.pc;
    cpu.cycles += 1;
    if (base & 0xFF00) != (target & 0xFF00) {
        cpu.cycles += 1;
    }
    cpu.pc = target;
    cpu.mem.mark(target, crate::memory::AccessFlags::JUMP_TARGET);
}

fn asl(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.set_flag(StatusFlags::CARRY, value & 0x80 != 0);
    let result = value << 1;
    cpu.set_zn(result);
    result
}

fn lsr(cpu: &mut Cpu, value: u8) -> u8 {
    cpu.set_flag(StatusFlags::CARRY, value & 0x01 != 0);
    let result = value >> 1;
    cpu.set_zn(result);
    result
}

fn rol(cpu: &mut Cpu, value: u8) -> u8 {
    let carry_in = if cpu.flag(StatusFlags::CARRY) { 1 } else { 0 };
    cpu.set_flag(StatusFlags::CARRY, value & 0x80 != 0);
    let result = (value << 1) | carry_in;
    cpu.set_zn(result);
    result
}

fn ror(cpu: &mut Cpu, value: u8) -> u8 {
    let carry_in = if cpu.flag(StatusFlags::CARRY) { 0x80 } else { 0 };
    cpu.set_flag(StatusFlags::CARRY, value & 0x01 != 0);
    let result = (value >> 1) | carry_in;
    cpu.set_zn(result);
    result
}

/// Dispatches one decoded instruction. `pc0` is the address of the opcode
/// byte (used as the writer-PC for stores and as the synthesized
/// return-address base for `JSR`).
pub fn execute(cpu: &mut Cpu, instruction: Instruction, mode: AddressingMode, operand: OperandLoc, pc0: u16) {
    use Instruction::*;

    let index_used = index_used_for(cpu, mode);

    match instruction {
        // Loads.
        Lda => {
            let v = load(cpu, operand);
            cpu.a_prov = load_provenance(mode, operand, v, index_used);
            cpu.a = v;
            cpu.set_zn(v);
        }
        Ldx => {
            let v = load(cpu, operand);
            cpu.x_prov = load_provenance(mode, operand, v, index_used);
            cpu.x = v;
            cpu.set_zn(v);
        }
        Ldy => {
            let v = load(cpu, operand);
            cpu.y_prov = load_provenance(mode, operand, v, index_used);
            cpu.y = v;
            cpu.set_zn(v);
        }

        // Stores.
        Sta => {
            let prov = cpu.a_prov;
            store(cpu, operand, cpu.a, pc0, prov);
        }
        Stx => {
            let prov = cpu.x_prov;
            store(cpu, operand, cpu.x, pc0, prov);
        }
        Sty => {
            let prov = cpu.y_prov;
            store(cpu, operand, cpu.y, pc0, prov);
        }

        // Transfers: a register-to-register copy carries the source
        // register's provenance forward rather than minting a new one.
        Tax => {
            cpu.x = cpu.a;
            cpu.x_prov = cpu.a_prov;
            cpu.set_zn(cpu.x);
        }
        Tay => {
            cpu.y = cpu.a;
            cpu.y_prov = cpu.a_prov;
            cpu.set_zn(cpu.y);
        }
        Txa => {
            cpu.a = cpu.x;
            cpu.a_prov = cpu.x_prov;
            cpu.set_zn(cpu.a);
        }
        Tya => {
            cpu.a = cpu.y;
            cpu.a_prov = cpu.y_prov;
            cpu.set_zn(cpu.a);
        }
        Tsx => {
            cpu.x = cpu.sp;
            cpu.x_prov = Provenance::unknown();
            cpu.set_zn(cpu.x);
        }
        Txs => {
            cpu.sp = cpu.x;
        }

        // Stack.
        Pha => cpu.push8(cpu.a),
        Php => cpu.push8((cpu.status | StatusFlags::BREAK | StatusFlags::UNUSED).bits()),
        Pla => {
            let v = cpu.pop8();
            cpu.a = v;
            cpu.a_prov = Provenance::memory(0x0100 | cpu.sp as u16, v, 0);
            cpu.set_zn(v);
        }
        Plp => {
            let v = cpu.pop8();
            cpu.status = StatusFlags::from_bits_truncate(v) | StatusFlags::UNUSED;
        }

        // Logical / arithmetic.
        And => {
            let v = load(cpu, operand);
            cpu.a &= v;
            cpu.set_zn(cpu.a);
        }
        Ora => {
            let v = load(cpu, operand);
            cpu.a |= v;
            cpu.set_zn(cpu.a);
        }
        Eor => {
            let v = load(cpu, operand);
            cpu.a ^= v;
            cpu.set_zn(cpu.a);
        }
        Bit => {
            let v = load(cpu, operand);
            cpu.set_flag(StatusFlags::ZERO, (cpu.a & v) == 0);
            cpu.set_flag(StatusFlags::NEGATIVE, v & 0x80 != 0);
            cpu.set_flag(StatusFlags::OVERFLOW, v & 0x40 != 0);
        }
        Adc => {
            let v = load(cpu, operand);
            adc(cpu, v);
        }
        Sbc => {
            let v = load(cpu, operand);
            sbc(cpu, v);
        }
        Cmp => {
            let v = load(cpu, operand);
            compare(cpu, cpu.a, v);
        }
        Cpx => {
            let v = load(cpu, operand);
            compare(cpu, cpu.x, v);
        }
        Cpy => {
            let v = load(cpu, operand);
            compare(cpu, cpu.y, v);
        }

        // Increments / decrements.
        Inc => {
            let v = load(cpu, operand).wrapping_add(1);
            cpu.set_zn(v);
            store(cpu, operand, v, pc0, Provenance::unknown());
        }
        Dec => {
            let v = load(cpu, operand).wrapping_sub(1);
            cpu.set_zn(v);
            store(cpu, operand, v, pc0, Provenance::unknown());
        }
        Inx => {
            cpu.x = cpu.x.wrapping_add(1);
            cpu.set_zn(cpu.x);
        }
        Iny => {
            cpu.y = cpu.y.wrapping_add(1);
            cpu.set_zn(cpu.y);
        }
        Dex => {
            cpu.x = cpu.x.wrapping_sub(1);
            cpu.set_zn(cpu.x);
        }
        Dey => {
            cpu.y = cpu.y.wrapping_sub(1);
            cpu.set_zn(cpu.y);
        }

        // Shifts / rotates.
        Asl => {
            let v = load(cpu, operand);
            let r = asl(cpu, v);
            store(cpu, operand, r, pc0, Provenance::unknown());
        }
        Lsr => {
            let v = load(cpu, operand);
            let r = lsr(cpu, v);
            store(cpu, operand, r, pc0, Provenance::unknown());
        }
        Rol => {
            let v = load(cpu, operand);
            let r = rol(cpu, v);
            store(cpu, operand, r, pc0, Provenance::unknown());
        }
        Ror => {
            let v = load(cpu, operand);
            let r = ror(cpu, v);
            store(cpu, operand, r, pc0, Provenance::unknown());
        }

        // Branches.
        Bcc => branch(cpu, !cpu.flag(StatusFlags::CARRY), operand_address(operand).unwrap()),
        Bcs => branch(cpu, cpu.flag(StatusFlags::CARRY), operand_address(operand).unwrap()),
        Beq => branch(cpu, cpu.flag(StatusFlags::ZERO), operand_address(operand).unwrap()),
        Bne => branch(cpu, !cpu.flag(StatusFlags::ZERO), operand_address(operand).unwrap()),
        Bmi => branch(cpu, cpu.flag(StatusFlags::NEGATIVE), operand_address(operand).unwrap()),
        Bpl => branch(cpu, !cpu.flag(StatusFlags::NEGATIVE), operand_address(operand).unwrap()),
        Bvc => branch(cpu, !cpu.flag(StatusFlags::OVERFLOW), operand_address(operand).unwrap()),
        Bvs => branch(cpu, cpu.flag(StatusFlags::OVERFLOW), operand_address(operand).unwrap()),

        // Jumps / calls.
        Jmp => {
            cpu.pc = operand_address(operand).unwrap();
            cpu.mem.mark(cpu.pc, crate::memory::AccessFlags::JUMP_TARGET);
        }
        Jsr => {
            let target = operand_address(operand).unwrap();
            let return_addr = cpu.pc.wrapping_sub(1);
            cpu.push16(return_addr);
            cpu.pc = target;
            cpu.mem.mark(cpu.pc, crate::memory::AccessFlags::JUMP_TARGET);
        }
        Rts => {
            let addr = cpu.pop16();
            cpu.pc = addr.wrapping_add(1);
        }
        Rti => {
            let status = cpu.pop8();
            cpu.status = StatusFlags::from_bits_truncate(status) | StatusFlags::UNUSED;
            cpu.pc = cpu.pop16();
        }
        Brk => {
            // The opcode fetch already advanced pc past the opcode byte;
            // BRK additionally skips a padding byte before pushing.
            cpu.pc = cpu.pc.wrapping_add(1);
            let ret = cpu.pc;
            cpu.push16(ret);
            cpu.push8((cpu.status | StatusFlags::BREAK | StatusFlags::UNUSED).bits());
            cpu.set_flag(StatusFlags::INTERRUPT, true);
            let lo = cpu.mem.peek(0xFFFE);
            let hi = cpu.mem.peek(0xFFFF);
            cpu.pc = u16::from_le_bytes([lo, hi]);
        }

        // Flags.
        Clc => cpu.set_flag(StatusFlags::CARRY, false),
        Sec => cpu.set_flag(StatusFlags::CARRY, true),
        Cld => cpu.set_flag(StatusFlags::DECIMAL, false),
        Sed => cpu.set_flag(StatusFlags::DECIMAL, true),
        Cli => cpu.set_flag(StatusFlags::INTERRUPT, false),
        Sei => cpu.set_flag(StatusFlags::INTERRUPT, true),
        Clv => cpu.set_flag(StatusFlags::OVERFLOW, false),

        Nop | Dop | Top => {
            // Dop/Top already consumed their extra operand byte(s) during
            // address resolution; nothing else to do.
        }

        // Undocumented opcodes, given their commonly-documented effects
        // (§4.B). Present so real tunes that happen to use them do not
        // derail analysis; unstable edge cases are not modeled (Design Note
        // §9c).
        Slo => {
            let v = load(cpu, operand);
            let shifted = asl(cpu, v);
            store(cpu, operand, shifted, pc0, Provenance::unknown());
            cpu.a |= shifted;
            cpu.set_zn(cpu.a);
        }
        Rla => {
            let v = load(cpu, operand);
            let rotated = rol(cpu, v);
            store(cpu, operand, rotated, pc0, Provenance::unknown());
            cpu.a &= rotated;
            cpu.set_zn(cpu.a);
        }
        Sre => {
            let v = load(cpu, operand);
            let shifted = lsr(cpu, v);
            store(cpu, operand, shifted, pc0, Provenance::unknown());
            cpu.a ^= shifted;
            cpu.set_zn(cpu.a);
        }
        Rra => {
            let v = load(cpu, operand);
            let rotated = ror(cpu, v);
            store(cpu, operand, rotated, pc0, Provenance::unknown());
            adc(cpu, rotated);
        }
        Dcp => {
            let v = load(cpu, operand).wrapping_sub(1);
            store(cpu, operand, v, pc0, Provenance::unknown());
            compare(cpu, cpu.a, v);
        }
        Isc => {
            let v = load(cpu, operand).wrapping_add(1);
            store(cpu, operand, v, pc0, Provenance::unknown());
            sbc(cpu, v);
        }
        Sax => {
            let v = cpu.a & cpu.x;
            store(cpu, operand, v, pc0, Provenance::unknown());
        }
        Lax => {
            let v = load(cpu, operand);
            cpu.a = v;
            cpu.x = v;
            let prov = load_provenance(mode, operand, v, index_used);
            cpu.a_prov = prov;
            cpu.x_prov = prov;
            cpu.set_zn(v);
        }
        Anc => {
            let v = load(cpu, operand);
            cpu.a &= v;
            cpu.set_zn(cpu.a);
            cpu.set_flag(StatusFlags::CARRY, cpu.a & 0x80 != 0);
        }
        Alr => {
            let v = load(cpu, operand);
            cpu.a &= v;
            cpu.a = lsr(cpu, cpu.a);
        }
        Arr => {
            let v = load(cpu, operand);
            cpu.a &= v;
            cpu.a = ror(cpu, cpu.a);
            let bit6 = cpu.a & 0x40 != 0;
            let bit5 = cpu.a & 0x20 != 0;
            cpu.set_flag(StatusFlags::CARRY, bit6);
            cpu.set_flag(StatusFlags::OVERFLOW, bit6 ^ bit5);
        }
        Axs => {
            let v = load(cpu, operand);
            let result = (cpu.a & cpu.x).wrapping_sub(v);
            cpu.set_flag(StatusFlags::CARRY, (cpu.a & cpu.x) >= v);
            cpu.x = result;
            cpu.set_zn(cpu.x);
        }
        Las => {
            let v = load(cpu, operand) & cpu.sp;
            cpu.a = v;
            cpu.x = v;
            cpu.sp = v;
            cpu.set_zn(v);
        }
        Xaa => {
            let v = load(cpu, operand);
            cpu.a = cpu.x & v;
            cpu.set_zn(cpu.a);
        }
        Sha | Shx | Shy | Tas => {
            let addr = operand_address(operand).unwrap_or(0);
            let high = (addr >> 8) as u8;
            let v = match instruction {
                Shx => cpu.x & high.wrapping_add(1),
                Shy => cpu.y & high.wrapping_add(1),
                Tas => {
                    cpu.sp = cpu.a & cpu.x;
                    cpu.sp & high.wrapping_add(1)
                }
                _ => cpu.a & cpu.x & high.wrapping_add(1),
            };
            store(cpu, operand, v, pc0, Provenance::unknown());
        }
        Kil => {
            // Freezes the CPU: back PC up so the same opcode re-executes.
            cpu.pc = pc0;
        }
    }
}
