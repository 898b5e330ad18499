//! The 256-entry opcode table: one record per possible opcode byte, naming
//! the instruction, its addressing mode, base cycle count, and whether it is
//! one of the undocumented forms.

/// Addressing modes of the 6510's instruction set (13 forms, §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Accumulator,
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

/// Symbolic instruction names: the 56 documented mnemonics plus the
/// undocumented forms real tunes occasionally rely on. `Dop`/`Top` are the
/// double/triple-byte illegal NOP variants; `Kil` is the opcode family that
/// locks the CPU by never advancing past itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Instruction {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc, Cld,
    Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp, Jsr, Lda,
    Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti, Rts, Sbc, Sec,
    Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Undocumented.
    Slo, Rla, Sre, Rra, Sax, Lax, Dcp, Isc, Anc, Alr, Arr, Axs, Las, Xaa, Sha,
    Shx, Shy, Tas, Dop, Top, Kil,
}

/// One entry of the opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub instruction: Instruction,
    pub mode: AddressingMode,
    pub cycles: u8,
    pub illegal: bool,
}

const fn op(instruction: Instruction, mode: AddressingMode, cycles: u8, illegal: bool) -> OpcodeInfo {
    OpcodeInfo { instruction, mode, cycles, illegal }
}

use AddressingMode::*;
use Instruction::*;

/// The full 256-entry table, indexed by opcode byte. A module-level `static`
/// array of value records rather than a mutable singleton (Design Note §9).
pub static OPCODES: [OpcodeInfo; 256] = [
    /* 0x00 */ op(Brk, Implied, 7, false),
    /* 0x01 */ op(Ora, IndirectX, 6, false),
    /* 0x02 */ op(Kil, Implied, 0, true),
    /* 0x03 */ op(Slo, IndirectX, 8, true),
    /* 0x04 */ op(Dop, ZeroPage, 3, true),
    /* 0x05 */ op(Ora, ZeroPage, 3, false),
    /* 0x06 */ op(Asl, ZeroPage, 5, false),
    /* 0x07 */ op(Slo, ZeroPage, 5, true),
    /* 0x08 */ op(Php, Implied, 3, false),
    /* 0x09 */ op(Ora, Immediate, 2, false),
    /* 0x0A */ op(Asl, Accumulator, 2, false),
    /* 0x0B */ op(Anc, Immediate, 2, true),
    /* 0x0C */ op(Top, Absolute, 4, true),
    /* 0x0D */ op(Ora, Absolute, 4, false),
    /* 0x0E */ op(Asl, Absolute, 6, false),
    /* 0x0F */ op(Slo, Absolute, 6, true),

    /* 0x10 */ op(Bpl, Relative, 2, false),
    /* 0x11 */ op(Ora, IndirectY, 5, false),
    /* 0x12 */ op(Kil, Implied, 0, true),
    /* 0x13 */ op(Slo, IndirectY, 8, true),
    /* 0x14 */ op(Dop, ZeroPageX, 4, true),
    /* 0x15 */ op(Ora, ZeroPageX, 4, false),
    /* 0x16 */ op(Asl, ZeroPageX, 6, false),
    /* 0x17 */ op(Slo, ZeroPageX, 6, true),
    /* 0x18 */ op(Clc, Implied, 2, false),
    /* 0x19 */ op(Ora, AbsoluteY, 4, false),
    /* 0x1A */ op(Nop, Implied, 2, true),
    /* 0x1B */ op(Slo, AbsoluteY, 7, true),
    /* 0x1C */ op(Top, AbsoluteX, 4, true),
    /* 0x1D */ op(Ora, AbsoluteX, 4, false),
    /* 0x1E */ op(Asl, AbsoluteX, 7, false),
    /* 0x1F */ op(Slo, AbsoluteX, 7, true),

    /* 0x20 */ op(Jsr, Absolute, 6, false),
    /* 0x21 */ op(And, IndirectX, 6, false),
    /* 0x22 */ op(Kil, Implied, 0, true),
    /* 0x23 */ op(Rla, IndirectX, 8, true),
    /* 0x24 */ op(Bit, ZeroPage, 3, false),
    /* 0x25 */ op(And, ZeroPage, 3, false),
    /* 0x26 */ op(Rol, ZeroPage, 5, false),
    /* 0x27 */ op(Rla, ZeroPage, 5, true),
    /* 0x28 */ op(Plp, Implied, 4, false),
    /* 0x29 */ op(And, Immediate, 2, false),
    /* 0x2A */ op(Rol, Accumulator, 2, false),
    /* 0x2B */ op(Anc, Immediate, 2, true),
    /* 0x2C */ op(Bit, Absolute, 4, false),
    /* 0x2D */ op(And, Absolute, 4, false),
    /* 0x2E */ op(Rol, Absolute, 6, false),
    /* 0x2F */ op(Rla, Absolute, 6, true),

    /* 0x30 */ op(Bmi, Relative, 2, false),
    /* 0x31 */ op(And, IndirectY, 5, false),
    /* 0x32 */ op(Kil, Implied, 0, true),
    /* 0x33 */ op(Rla, IndirectY, 8, true),
    /* 0x34 */ op(Dop, ZeroPageX, 4, true),
    /* 0x35 */ op(And, ZeroPageX, 4, false),
    /* 0x36 */ op(Rol, ZeroPageX, 6, false),
    /* 0x37 */ op(Rla, ZeroPageX, 6, true),
    /* 0x38 */ op(Sec, Implied, 2, false),
    /* 0x39 */ op(And, AbsoluteY, 4, false),
    /* 0x3A */ op(Nop, Implied, 2, true),
    /* 0x3B */ op(Rla, AbsoluteY, 7, true),
    /* 0x3C */ op(Top, AbsoluteX, 4, true),
    /* 0x3D */ op(And, AbsoluteX, 4, false),
    /* 0x3E */ op(Rol, AbsoluteX, 7, false),
    /* 0x3F */ op(Rla, AbsoluteX, 7, true),

    /* 0x40 */ op(Rti, Implied, 6, false),
    /* 0x41 */ op(Eor, IndirectX, 6, false),
    /* 0x42 */ op(Kil, Implied, 0, true),
    /* 0x43 */ op(Sre, IndirectX, 8, true),
    /* 0x44 */ op(Dop, ZeroPage, 3, true),
    /* 0x45 */ op(Eor, ZeroPage, 3, false),
    /* 0x46 */ op(Lsr, ZeroPage, 5, false),
    /* 0x47 */ op(Sre, ZeroPage, 5, true),
    /* 0x48 */ op(Pha, Implied, 3, false),
    /* 0x49 */ op(Eor, Immediate, 2, false),
    /* 0x4A */ op(Lsr, Accumulator, 2, false),
    /* 0x4B */ op(Alr, Immediate, 2, true),
    /* 0x4C */ op(Jmp, Absolute, 3, false),
    /* 0x4D */ op(Eor, Absolute, 4, false),
    /* 0x4E */ op(Lsr, Absolute, 6, false),
    /* 0x4F */ op(Sre, Absolute, 6, true),

    /* 0x50 */ op(Bvc, Relative, 2, false),
    /* 0x51 */ op(Eor, IndirectY, 5, false),
    /* 0x52 */ op(Kil, Implied, 0, true),
    /* 0x53 */ op(Sre, IndirectY, 8, true),
    /* 0x54 */ op(Dop, ZeroPageX, 4, true),
    /* 0x55 */ op(Eor, ZeroPageX, 4, false),
    /* 0x56 */ op(Lsr, ZeroPageX, 6, false),
    /* 0x57 */ op(Sre, ZeroPageX, 6, true),
    /* 0x58 */ op(Cli, Implied, 2, false),
    /* 0x59 */ op(Eor, AbsoluteY, 4, false),
    /* 0x5A */ op(Nop, Implied, 2, true),
    /* 0x5B */ op(Sre, AbsoluteY, 7, true),
    /* 0x5C */ op(Top, AbsoluteX, 4, true),
    /* 0x5D */ op(Eor, AbsoluteX, 4, false),
    /* 0x5E */ op(Lsr, AbsoluteX, 7, false),
    /* 0x5F */ op(Sre, AbsoluteX, 7, true),

    /* 0x60 */ op(Rts, Implied, 6, false),
    /* 0x61 */ op(Adc, IndirectX, 6, false),
    /* 0x62 */ op(Kil, Implied, 0, true),
    /* 0x63 */ op(Rra, IndirectX, 8, true),
    /* 0x64 */ op(Dop, ZeroPage, 3, true),
    /* 0x65 */ op(Adc, ZeroPage, 3, false),
    /* 0x66 */ op(Ror, ZeroPage, 5, false),
    /* 0x67 */ op(Rra, ZeroPage, 5, true),
    /* 0x68 */ op(Pla, Implied, 4, false),
    /* 0x69 */ op(Adc, Immediate, 2, false),
    /* 0x6A */ op(Ror, Accumulator, 2, false),
    /* 0x6B */ op(Arr, Immediate, 2, true),
    /* 0x6C */ op(Jmp, Indirect, 5, false),
    /* 0x6D */ op(Adc, Absolute, 4, false),
    /* 0x6E */ op(Ror, Absolute, 6, false),
    /* 0x6F */ op(Rra, Absolute, 6, true),

    /* 0x70 */ op(Bvs, Relative, 2, false),
    /* 0x71 */ op(Adc, IndirectY, 5, false),
    /* 0x72 */ op(Kil, Implied, 0, true),
    /* 0x73 */ op(Rra, IndirectY, 8, true),
    /* 0x74 */ op(Dop, ZeroPageX, 4, true),
    /* 0x75 */ op(Adc, ZeroPageX, 4, false),
    /* 0x76 */ op(Ror, ZeroPageX, 6, false),
    /* 0x77 */ op(Rra, ZeroPageX, 6, true),
    /* 0x78 */ op(Sei, Implied, 2, false),
    /* 0x79 */ op(Adc, AbsoluteY, 4, false),
    /* 0x7A */ op(Nop, Implied, 2, true),
    /* 0x7B */ op(Rra, AbsoluteY, 7, true),
    /* 0x7C */ op(Top, AbsoluteX, 4, true),
    /* 0x7D */ op(Adc, AbsoluteX, 4, false),
    /* 0x7E */ op(Ror, AbsoluteX, 7, false),
    /* 0x7F */ op(Rra, AbsoluteX, 7, true),

    /* 0x80 */ op(Dop, Immediate, 2, true),
    /* 0x81 */ op(Sta, IndirectX, 6, false),
    /* 0x82 */ op(Dop, Immediate, 2, true),
    /* 0x83 */ op(Sax, IndirectX, 6, true),
    /* 0x84 */ op(Sty, ZeroPage, 3, false),
    /* 0x85 */ op(Sta, ZeroPage, 3, false),
    /* 0x86 */ op(Stx, ZeroPage, 3, false),
    /* 0x87 */ op(Sax, ZeroPage, 3, true),
    /* 0x88 */ op(Dey, Implied, 2, false),
    /* 0x89 */ op(Dop, Immediate, 2, true),
    /* 0x8A */ op(Txa, Implied, 2, false),
    /* 0x8B */ op(Xaa, Immediate, 2, true),
    /* 0x8C */ op(Sty, Absolute, 4, false),
    /* 0x8D */ op(Sta, Absolute, 4, false),
    /* 0x8E */ op(Stx, Absolute, 4, false),
    /* 0x8F */ op(Sax, Absolute, 4, true),

    /* 0x90 */ op(Bcc, Relative, 2, false),
    /* 0x91 */ op(Sta, IndirectY, 6, false),
    /* 0x92 */ op(Kil, Implied, 0, true),
    /* 0x93 */ op(Sha, IndirectY, 6, true),
    /* 0x94 */ op(Sty, ZeroPageX, 4, false),
    /* 0x95 */ op(Sta, ZeroPageX, 4, false),
    /* 0x96 */ op(Stx, ZeroPageY, 4, false),
    /* 0x97 */ op(Sax, ZeroPageY, 4, true),
    /* 0x98 */ op(Tya, Implied, 2, false),
    /* 0x99 */ op(Sta, AbsoluteY, 5, false),
    /* 0x9A */ op(Txs, Implied, 2, false),
    /* 0x9B */ op(Tas, AbsoluteY, 5, true),
    /* 0x9C */ op(Shy, AbsoluteX, 5, true),
    /* 0x9D */ op(Sta, AbsoluteX, 5, false),
    /* 0x9E */ op(Shx, AbsoluteY, 5, true),
    /* 0x9F */ op(Sha, AbsoluteY, 5, true),

    /* 0xA0 */ op(Ldy, Immediate, 2, false),
    /* 0xA1 */ op(Lda, IndirectX, 6, false),
    /* 0xA2 */ op(Ldx, Immediate, 2, false),
    /* 0xA3 */ op(Lax, IndirectX, 6, true),
    /* 0xA4 */ op(Ldy, ZeroPage, 3, false),
    /* 0xA5 */ op(Lda, ZeroPage, 3, false),
    /* 0xA6 */ op(Ldx, ZeroPage, 3, false),
    /* 0xA7 */ op(Lax, ZeroPage, 3, true),
    /* 0xA8 */ op(Tay, Implied, 2, false),
    /* 0xA9 */ op(Lda, Immediate, 2, false),
    /* 0xAA */ op(Tax, Implied, 2, false),
    /* 0xAB */ op(Lax, Immediate, 2, true),
    /* 0xAC */ op(Ldy, Absolute, 4, false),
    /* 0xAD */ op(Lda, Absolute, 4, false),
    /* 0xAE */ op(Ldx, Absolute, 4, false),
    /* 0xAF */ op(Lax, Absolute, 4, true),

    /* 0xB0 */ op(Bcs, Relative, 2, false),
    /* 0xB1 */ op(Lda, IndirectY, 5, false),
    /* 0xB2 */ op(Kil, Implied, 0, true),
    /* 0xB3 */ op(Lax, IndirectY, 5, true),
    /* 0xB4 */ op(Ldy, ZeroPageX, 4, false),
    /* 0xB5 */ op(Lda, ZeroPageX, 4, false),
    /* 0xB6 */ op(Ldx, ZeroPageY, 4, false),
    /* 0xB7 */ op(Lax, ZeroPageY, 4, true),
    /* 0xB8 */ op(Clv, Implied, 2, false),
    /* 0xB9 */ op(Lda, AbsoluteY, 4, false),
    /* 0xBA */ op(Tsx, Implied, 2, false),
    /* 0xBB */ op(Las, AbsoluteY, 4, true),
    /* 0xBC */ op(Ldy, AbsoluteX, 4, false),
    /* 0xBD */ op(Lda, AbsoluteX, 4, false),
    /* 0xBE */ op(Ldx, AbsoluteY, 4, false),
    /* 0xBF */ op(Lax, AbsoluteY, 4, true),

    /* 0xC0 */ op(Cpy, Immediate, 2, false),
    /* 0xC1 */ op(Cmp, IndirectX, 6, false),
    /* 0xC2 */ op(Dop, Immediate, 2, true),
    /* 0xC3 */ op(Dcp, IndirectX, 8, true),
    /* 0xC4 */ op(Cpy, ZeroPage, 3, false),
    /* 0xC5 */ op(Cmp, ZeroPage, 3, false),
    /* 0xC6 */ op(Dec, ZeroPage, 5, false),
    /* 0xC7 */ op(Dcp, ZeroPage, 5, true),
    /* 0xC8 */ op(Iny, Implied, 2, false),
    /* 0xC9 */ op(Cmp, Immediate, 2, false),
    /* 0xCA */ op(Dex, Implied, 2, false),
    /* 0xCB */ op(Axs, Immediate, 2, true),
    /* 0xCC */ op(Cpy, Absolute, 4, false),
    /* 0xCD */ op(Cmp, Absolute, 4, false),
    /* 0xCE */ op(Dec, Absolute, 6, false),
    /* 0xCF */ op(Dcp, Absolute, 6, true),

    /* 0xD0 */ op(Bne, Relative, 2, false),
    /* 0xD1 */ op(Cmp, IndirectY, 5, false),
    /* 0xD2 */ op(Kil, Implied, 0, true),
    /* 0xD3 */ op(Dcp, IndirectY, 8, true),
    /* 0xD4 */ op(Dop, ZeroPageX, 4, true),
    /* 0xD5 */ op(Cmp, ZeroPageX, 4, false),
    /* 0xD6 */ op(Dec, ZeroPageX, 6, false),
    /* 0xD7 */ op(Dcp, ZeroPageX, 6, true),
    /* 0xD8 */ op(Cld, Implied, 2, false),
    /* 0xD9 */ op(Cmp, AbsoluteY, 4, false),
    /* 0xDA */ op(Nop, Implied, 2, true),
    /* 0xDB */ op(Dcp, AbsoluteY, 7, true),
    /* 0xDC */ op(Top, AbsoluteX, 4, true),
    /* 0xDD */ op(Cmp, AbsoluteX, 4, false),
    /* 0xDE */ op(Dec, AbsoluteX, 7, false),
    /* 0xDF */ op(Dcp, AbsoluteX, 7, true),

    /* 0xE0 */ op(Cpx, Immediate, 2, false),
    /* 0xE1 */ op(Sbc, IndirectX, 6, false),
    /* 0xE2 */ op(Dop, Immediate, 2, true),
    /* 0xE3 */ op(Isc, IndirectX, 8, true),
    /* 0xE4 */ op(Cpx, ZeroPage, 3, false),
    /* 0xE5 */ op(Sbc, ZeroPage, 3, false),
    /* 0xE6 */ op(Inc, ZeroPage, 5, false),
    /* 0xE7 */ op(Isc, ZeroPage, 5, true),
    /* 0xE8 */ op(Inx, Implied, 2, false),
    /* 0xE9 */ op(Sbc, Immediate, 2, false),
    /* 0xEA */ op(Nop, Implied, 2, false),
    /* 0xEB */ op(Sbc, Immediate, 2, true),
    /* 0xEC */ op(Cpx, Absolute, 4, false),
    /* 0xED */ op(Sbc, Absolute, 4, false),
    /* 0xEE */ op(Inc, Absolute, 6, false),
    /* 0xEF */ op(Isc, Absolute, 6, true),

    /* 0xF0 */ op(Beq, Relative, 2, false),
    /* 0xF1 */ op(Sbc, IndirectY, 5, false),
    /* 0xF2 */ op(Kil, Implied, 0, true),
    /* 0xF3 */ op(Isc, IndirectY, 8, true),
    /* 0xF4 */ op(Dop, ZeroPageX, 4, true),
    /* 0xF5 */ op(Sbc, ZeroPageX, 4, false),
    /* 0xF6 */ op(Inc, ZeroPageX, 6, false),
    /* 0xF7 */ op(Isc, ZeroPageX, 6, true),
    /* 0xF8 */ op(Sed, Implied, 2, false),
    /* 0xF9 */ op(Sbc, AbsoluteY, 4, false),
    /* 0xFA */ op(Nop, Implied, 2, true),
    /* 0xFB */ op(Isc, AbsoluteY, 7, true),
    /* 0xFC */ op(Top, AbsoluteX, 4, true),
    /* 0xFD */ op(Sbc, AbsoluteX, 4, false),
    /* 0xFE */ op(Inc, AbsoluteX, 7, false),
    /* 0xFF */ op(Isc, AbsoluteX, 7, true),
];

/// Instruction size in bytes, by addressing mode (§4.B's address resolution
/// rules — used by the analyzer/emitter to know how many bytes an
/// instruction occupies without re-decoding it).
pub fn instruction_size(mode: AddressingMode) -> u16 {
    match mode {
        Accumulator | Implied => 1,
        Immediate | ZeroPage | ZeroPageX | ZeroPageY | Relative | IndirectX | IndirectY => 2,
        Absolute | AbsoluteX | AbsoluteY | Indirect => 3,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_has_256_entries() {
        assert_eq!(OPCODES.len(), 256);
    }

    #[test]
    fn brk_is_documented_seven_cycles() {
        let entry = OPCODES[0x00];
        assert_eq!(entry.instruction, Instruction::Brk);
        assert!(!entry.illegal);
        assert_eq!(entry.cycles, 7);
    }

    #[test]
    fn kil_opcodes_are_illegal() {
        for &byte in &[0x02u8, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2] {
            assert_eq!(OPCODES[byte as usize].instruction, Instruction::Kil);
            assert!(OPCODES[byte as usize].illegal);
        }
    }

    #[test]
    fn indirect_jmp_is_absolute_sized_bug_prone_mode() {
        let entry = OPCODES[0x6C];
        assert_eq!(entry.instruction, Instruction::Jmp);
        assert_eq!(entry.mode, AddressingMode::Indirect);
        assert_eq!(instruction_size(entry.mode), 3);
    }
}
