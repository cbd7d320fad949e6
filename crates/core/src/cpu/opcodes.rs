//! Opcode metadata for the NMOS 6502.
//!
//! Two tables live here:
//! - [`opcode`], which decodes any byte into a mnemonic and addressing mode
//!   (length is derived from the mode), used by the emulator, canonicalizer
//!   and disassembler.
//! - [`SEQUENCE_OPCODE_LENGTHS`], the validator's companion table. It only
//!   admits opcodes that may appear inside a self-contained fragment; control
//!   transfers that leave the fragment (BRK, JSR, JMP, RTS, RTI), NOP and the
//!   interrupt-mask instructions are excluded along with every illegal opcode.

use std::fmt;

/// Addressing modes of the official instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Implied,
    Accumulator,
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

impl AddrMode {
    /// Total instruction length in bytes for an opcode using this mode.
    pub fn len(self) -> usize {
        match self {
            AddrMode::Implied | AddrMode::Accumulator => 1,
            AddrMode::Immediate
            | AddrMode::ZeroPage
            | AddrMode::ZeroPageX
            | AddrMode::ZeroPageY
            | AddrMode::IndirectX
            | AddrMode::IndirectY
            | AddrMode::Relative => 2,
            AddrMode::Absolute
            | AddrMode::AbsoluteX
            | AddrMode::AbsoluteY
            | AddrMode::Indirect => 3,
        }
    }

    /// Canonicalization family of this mode.
    pub fn family(self) -> OperandFamily {
        match self {
            AddrMode::ZeroPage => OperandFamily::ZeroPage,
            AddrMode::IndirectY => OperandFamily::ZeroPagePointer,
            AddrMode::Absolute => OperandFamily::Absolute,
            AddrMode::AbsoluteX | AddrMode::AbsoluteY => OperandFamily::Indexed,
            AddrMode::ZeroPageX | AddrMode::ZeroPageY | AddrMode::IndirectX => {
                OperandFamily::ZeroPageIndexed
            }
            AddrMode::Immediate => OperandFamily::Immediate,
            AddrMode::Implied
            | AddrMode::Accumulator
            | AddrMode::Indirect
            | AddrMode::Relative => OperandFamily::Other,
        }
    }
}

/// How the canonicalizer treats an instruction's operand bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandFamily {
    /// `zp`: one slot in the growing zero-page region.
    ZeroPage,
    /// `(zp),Y`: two consecutive slots in the zero-page region.
    ZeroPagePointer,
    /// `abs`: one byte in the absolute page.
    Absolute,
    /// `abs,X` / `abs,Y`: a full page in the indexed region.
    Indexed,
    /// `zp,X`, `zp,Y`, `(zp,X)`: the single fixed slot at address 0.
    ZeroPageIndexed,
    /// `#imm`: left untouched, offset recorded as a constant.
    Immediate,
    /// No address operand to rewrite.
    Other,
}

/// Official NMOS 6502 mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    /// Any undocumented opcode.
    Illegal,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Mnemonic::Illegal => "???".to_string(),
            other => format!("{other:?}").to_ascii_uppercase(),
        };
        f.write_str(&text)
    }
}

/// Decoded opcode metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
}

impl Opcode {
    pub fn len(&self) -> usize {
        self.mode.len()
    }

    pub fn is_illegal(&self) -> bool {
        self.mnemonic == Mnemonic::Illegal
    }
}

/// Decode an opcode byte.
pub fn opcode(op: u8) -> Opcode {
    use AddrMode::*;
    use Mnemonic::*;

    let (mnemonic, mode) = match op {
        0x69 => (Adc, Immediate),
        0x65 => (Adc, ZeroPage),
        0x75 => (Adc, ZeroPageX),
        0x6d => (Adc, Absolute),
        0x7d => (Adc, AbsoluteX),
        0x79 => (Adc, AbsoluteY),
        0x61 => (Adc, IndirectX),
        0x71 => (Adc, IndirectY),

        0x29 => (And, Immediate),
        0x25 => (And, ZeroPage),
        0x35 => (And, ZeroPageX),
        0x2d => (And, Absolute),
        0x3d => (And, AbsoluteX),
        0x39 => (And, AbsoluteY),
        0x21 => (And, IndirectX),
        0x31 => (And, IndirectY),

        0x0a => (Asl, Accumulator),
        0x06 => (Asl, ZeroPage),
        0x16 => (Asl, ZeroPageX),
        0x0e => (Asl, Absolute),
        0x1e => (Asl, AbsoluteX),

        0x90 => (Bcc, Relative),
        0xb0 => (Bcs, Relative),
        0xf0 => (Beq, Relative),
        0x30 => (Bmi, Relative),
        0xd0 => (Bne, Relative),
        0x10 => (Bpl, Relative),
        0x50 => (Bvc, Relative),
        0x70 => (Bvs, Relative),

        0x24 => (Bit, ZeroPage),
        0x2c => (Bit, Absolute),

        0x00 => (Brk, Implied),

        0x18 => (Clc, Implied),
        0xd8 => (Cld, Implied),
        0x58 => (Cli, Implied),
        0xb8 => (Clv, Implied),

        0xc9 => (Cmp, Immediate),
        0xc5 => (Cmp, ZeroPage),
        0xd5 => (Cmp, ZeroPageX),
        0xcd => (Cmp, Absolute),
        0xdd => (Cmp, AbsoluteX),
        0xd9 => (Cmp, AbsoluteY),
        0xc1 => (Cmp, IndirectX),
        0xd1 => (Cmp, IndirectY),

        0xe0 => (Cpx, Immediate),
        0xe4 => (Cpx, ZeroPage),
        0xec => (Cpx, Absolute),
        0xc0 => (Cpy, Immediate),
        0xc4 => (Cpy, ZeroPage),
        0xcc => (Cpy, Absolute),

        0xc6 => (Dec, ZeroPage),
        0xd6 => (Dec, ZeroPageX),
        0xce => (Dec, Absolute),
        0xde => (Dec, AbsoluteX),
        0xca => (Dex, Implied),
        0x88 => (Dey, Implied),

        0x49 => (Eor, Immediate),
        0x45 => (Eor, ZeroPage),
        0x55 => (Eor, ZeroPageX),
        0x4d => (Eor, Absolute),
        0x5d => (Eor, AbsoluteX),
        0x59 => (Eor, AbsoluteY),
        0x41 => (Eor, IndirectX),
        0x51 => (Eor, IndirectY),

        0xe6 => (Inc, ZeroPage),
        0xf6 => (Inc, ZeroPageX),
        0xee => (Inc, Absolute),
        0xfe => (Inc, AbsoluteX),
        0xe8 => (Inx, Implied),
        0xc8 => (Iny, Implied),

        0x4c => (Jmp, Absolute),
        0x6c => (Jmp, Indirect),
        0x20 => (Jsr, Absolute),

        0xa9 => (Lda, Immediate),
        0xa5 => (Lda, ZeroPage),
        0xb5 => (Lda, ZeroPageX),
        0xad => (Lda, Absolute),
        0xbd => (Lda, AbsoluteX),
        0xb9 => (Lda, AbsoluteY),
        0xa1 => (Lda, IndirectX),
        0xb1 => (Lda, IndirectY),

        0xa2 => (Ldx, Immediate),
        0xa6 => (Ldx, ZeroPage),
        0xb6 => (Ldx, ZeroPageY),
        0xae => (Ldx, Absolute),
        0xbe => (Ldx, AbsoluteY),

        0xa0 => (Ldy, Immediate),
        0xa4 => (Ldy, ZeroPage),
        0xb4 => (Ldy, ZeroPageX),
        0xac => (Ldy, Absolute),
        0xbc => (Ldy, AbsoluteX),

        0x4a => (Lsr, Accumulator),
        0x46 => (Lsr, ZeroPage),
        0x56 => (Lsr, ZeroPageX),
        0x4e => (Lsr, Absolute),
        0x5e => (Lsr, AbsoluteX),

        0xea => (Nop, Implied),

        0x09 => (Ora, Immediate),
        0x05 => (Ora, ZeroPage),
        0x15 => (Ora, ZeroPageX),
        0x0d => (Ora, Absolute),
        0x1d => (Ora, AbsoluteX),
        0x19 => (Ora, AbsoluteY),
        0x01 => (Ora, IndirectX),
        0x11 => (Ora, IndirectY),

        0x48 => (Pha, Implied),
        0x08 => (Php, Implied),
        0x68 => (Pla, Implied),
        0x28 => (Plp, Implied),

        0x2a => (Rol, Accumulator),
        0x26 => (Rol, ZeroPage),
        0x36 => (Rol, ZeroPageX),
        0x2e => (Rol, Absolute),
        0x3e => (Rol, AbsoluteX),

        0x6a => (Ror, Accumulator),
        0x66 => (Ror, ZeroPage),
        0x76 => (Ror, ZeroPageX),
        0x6e => (Ror, Absolute),
        0x7e => (Ror, AbsoluteX),

        0x40 => (Rti, Implied),
        0x60 => (Rts, Implied),

        0xe9 => (Sbc, Immediate),
        0xe5 => (Sbc, ZeroPage),
        0xf5 => (Sbc, ZeroPageX),
        0xed => (Sbc, Absolute),
        0xfd => (Sbc, AbsoluteX),
        0xf9 => (Sbc, AbsoluteY),
        0xe1 => (Sbc, IndirectX),
        0xf1 => (Sbc, IndirectY),

        0x38 => (Sec, Implied),
        0xf8 => (Sed, Implied),
        0x78 => (Sei, Implied),

        0x85 => (Sta, ZeroPage),
        0x95 => (Sta, ZeroPageX),
        0x8d => (Sta, Absolute),
        0x9d => (Sta, AbsoluteX),
        0x99 => (Sta, AbsoluteY),
        0x81 => (Sta, IndirectX),
        0x91 => (Sta, IndirectY),

        0x86 => (Stx, ZeroPage),
        0x96 => (Stx, ZeroPageY),
        0x8e => (Stx, Absolute),
        0x84 => (Sty, ZeroPage),
        0x94 => (Sty, ZeroPageX),
        0x8c => (Sty, Absolute),

        0xaa => (Tax, Implied),
        0xa8 => (Tay, Implied),
        0xba => (Tsx, Implied),
        0x8a => (Txa, Implied),
        0x9a => (Txs, Implied),
        0x98 => (Tya, Implied),

        _ => (Illegal, Implied),
    };

    Opcode { mnemonic, mode }
}

/// True for the eight conditional branches (`op & 0x1f == 0x10`).
pub fn is_branch(op: u8) -> bool {
    op & 0x1f == 0x10
}

/// Lengths of opcodes accepted as fragment members; 0 means "not allowed".
#[rustfmt::skip]
pub static SEQUENCE_OPCODE_LENGTHS: [u8; 256] = [
    0, 2, 0, 0, 0, 2, 2, 0, 1, 2, 1, 0, 0, 3, 3, 0,
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0,
    0, 2, 0, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0,
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0,
    0, 2, 0, 0, 0, 2, 2, 0, 1, 2, 1, 0, 0, 3, 3, 0,
    2, 2, 0, 0, 0, 2, 2, 0, 0, 3, 0, 0, 0, 3, 3, 0,
    0, 2, 0, 0, 0, 2, 2, 0, 1, 2, 1, 0, 0, 3, 3, 0,
    2, 2, 0, 0, 0, 2, 2, 0, 0, 3, 0, 0, 0, 3, 3, 0,
    0, 2, 0, 0, 2, 2, 2, 0, 1, 0, 1, 0, 3, 3, 3, 0,
    2, 2, 0, 0, 2, 2, 2, 0, 1, 3, 1, 0, 0, 3, 0, 0,
    2, 2, 2, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0,
    2, 2, 0, 0, 2, 2, 2, 0, 1, 3, 1, 0, 3, 3, 3, 0,
    2, 2, 0, 0, 2, 2, 2, 0, 1, 2, 1, 0, 3, 3, 3, 0,
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0,
    2, 2, 0, 0, 2, 2, 2, 0, 1, 2, 0, 0, 3, 3, 3, 0,
    2, 2, 0, 0, 0, 2, 2, 0, 1, 3, 0, 0, 0, 3, 3, 0,
];

/// Format the instruction starting at `bytes[0]`, located at `address`.
///
/// Missing operand bytes (truncated input) are rendered as `??`.
pub fn disassemble(address: u16, bytes: &[u8]) -> String {
    let Some(&op) = bytes.first() else {
        return String::new();
    };
    let info = opcode(op);
    if info.is_illegal() {
        return format!(".byte ${op:02X}");
    }

    let lo = bytes.get(1).copied();
    let hi = bytes.get(2).copied();
    let byte = || lo.map(|b| format!("{b:02X}")).unwrap_or_else(|| "??".to_string());
    let word = || match (lo, hi) {
        (Some(lo), Some(hi)) => format!("{:04X}", u16::from_le_bytes([lo, hi])),
        _ => "????".to_string(),
    };

    let operand = match info.mode {
        AddrMode::Implied => String::new(),
        AddrMode::Accumulator => " A".to_string(),
        AddrMode::Immediate => format!(" #${}", byte()),
        AddrMode::ZeroPage => format!(" ${}", byte()),
        AddrMode::ZeroPageX => format!(" ${},X", byte()),
        AddrMode::ZeroPageY => format!(" ${},Y", byte()),
        AddrMode::Absolute => format!(" ${}", word()),
        AddrMode::AbsoluteX => format!(" ${},X", word()),
        AddrMode::AbsoluteY => format!(" ${},Y", word()),
        AddrMode::Indirect => format!(" (${})", word()),
        AddrMode::IndirectX => format!(" (${},X)", byte()),
        AddrMode::IndirectY => format!(" (${}),Y", byte()),
        AddrMode::Relative => match lo {
            Some(rel) => {
                let target = address.wrapping_add(2).wrapping_add(rel as i8 as u16);
                format!(" ${target:04X}")
            }
            None => " $????".to_string(),
        },
    };

    format!("{}{}", info.mnemonic, operand)
}

/// Disassemble a whole byte sequence, one line per instruction.
///
/// Each line carries the address, the raw bytes and the instruction text.
pub fn disassemble_all(base: u16, bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        let address = base.wrapping_add(offset as u16);
        let len = opcode(bytes[offset]).len().min(bytes.len() - offset);
        let raw: Vec<String> =
            bytes[offset..offset + len].iter().map(|b| format!("{b:02x}")).collect();
        lines.push(format!(
            "{address:04x}  {:<9} {}",
            raw.join(" "),
            disassemble(address, &bytes[offset..])
        ));
        offset += len;
    }
    lines
}
