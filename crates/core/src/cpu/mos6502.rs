//! Instruction-stepped NMOS 6502.
//!
//! Covers the documented instruction set, including decimal-mode ADC/SBC and
//! the indirect-JMP page wrap. Cycle timing and the read-modify-write dummy
//! writes are not modelled.

use crate::cpu::opcodes::{opcode, AddrMode, Mnemonic};
use crate::cpu::{Bus, Cpu, CpuError, Registers};

const STACK_PAGE: u16 = 0x0100;
const RESET_VECTOR: u16 = 0xfffc;
const IRQ_VECTOR: u16 = 0xfffe;

/// Resolved operand of the instruction being executed.
#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Immediate(u8),
    Address(u16),
}

#[derive(Debug, Clone, Default)]
pub struct Mos6502 {
    regs: Registers,
}

impl Mos6502 {
    pub fn new() -> Self {
        Self::default()
    }

    fn fetch<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch(bus);
        let hi = self.fetch(bus);
        u16::from_le_bytes([lo, hi])
    }

    fn read_word<B: Bus>(bus: &mut B, address: u16) -> u16 {
        let lo = bus.read(address);
        let hi = bus.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Read a pointer stored in zero page; the high byte wraps within page 0.
    fn read_zp_word<B: Bus>(bus: &mut B, address: u8) -> u16 {
        let lo = bus.read(address as u16);
        let hi = bus.read(address.wrapping_add(1) as u16);
        u16::from_le_bytes([lo, hi])
    }

    fn push<B: Bus>(&mut self, bus: &mut B, value: u8) {
        bus.write(STACK_PAGE | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    fn pull<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        bus.read(STACK_PAGE | self.regs.sp as u16)
    }

    fn set_nz(&mut self, value: u8) {
        self.regs.n = value & 0x80 != 0;
        self.regs.z = value == 0;
    }

    fn operand<B: Bus>(&mut self, bus: &mut B, mode: AddrMode) -> Operand {
        match mode {
            AddrMode::Implied => Operand::None,
            AddrMode::Accumulator => Operand::Accumulator,
            AddrMode::Immediate => Operand::Immediate(self.fetch(bus)),
            AddrMode::ZeroPage => Operand::Address(self.fetch(bus) as u16),
            AddrMode::ZeroPageX => {
                Operand::Address(self.fetch(bus).wrapping_add(self.regs.x) as u16)
            }
            AddrMode::ZeroPageY => {
                Operand::Address(self.fetch(bus).wrapping_add(self.regs.y) as u16)
            }
            AddrMode::Absolute => Operand::Address(self.fetch_word(bus)),
            AddrMode::AbsoluteX => {
                Operand::Address(self.fetch_word(bus).wrapping_add(self.regs.x as u16))
            }
            AddrMode::AbsoluteY => {
                Operand::Address(self.fetch_word(bus).wrapping_add(self.regs.y as u16))
            }
            AddrMode::Indirect => {
                let pointer = self.fetch_word(bus);
                // NMOS bug: the high byte is fetched without carrying into the page.
                let hi_addr = (pointer & 0xff00) | (pointer.wrapping_add(1) & 0x00ff);
                let lo = bus.read(pointer);
                let hi = bus.read(hi_addr);
                Operand::Address(u16::from_le_bytes([lo, hi]))
            }
            AddrMode::IndirectX => {
                let zp = self.fetch(bus).wrapping_add(self.regs.x);
                Operand::Address(Self::read_zp_word(bus, zp))
            }
            AddrMode::IndirectY => {
                let zp = self.fetch(bus);
                let base = Self::read_zp_word(bus, zp);
                Operand::Address(base.wrapping_add(self.regs.y as u16))
            }
            AddrMode::Relative => {
                let rel = self.fetch(bus) as i8;
                Operand::Address(self.regs.pc.wrapping_add(rel as u16))
            }
        }
    }

    fn load<B: Bus>(&mut self, bus: &mut B, operand: Operand) -> u8 {
        match operand {
            Operand::Immediate(value) => value,
            Operand::Address(address) => bus.read(address),
            Operand::Accumulator => self.regs.a,
            Operand::None => 0,
        }
    }

    /// Read-modify-write helper shared by the shift and increment instructions.
    fn modify<B: Bus>(
        &mut self,
        bus: &mut B,
        operand: Operand,
        f: impl FnOnce(&mut Self, u8) -> u8,
    ) {
        match operand {
            Operand::Accumulator => {
                let value = self.regs.a;
                let result = f(self, value);
                self.regs.a = result;
            }
            Operand::Address(address) => {
                let value = bus.read(address);
                let result = f(self, value);
                bus.write(address, result);
            }
            Operand::Immediate(_) | Operand::None => {}
        }
    }

    fn store<B: Bus>(bus: &mut B, operand: Operand, value: u8) {
        if let Operand::Address(address) = operand {
            bus.write(address, value);
        }
    }

    fn branch(&mut self, operand: Operand, taken: bool) {
        if let (true, Operand::Address(target)) = (taken, operand) {
            self.regs.pc = target;
        }
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.regs.c = register >= value;
        self.set_nz(register.wrapping_sub(value));
    }

    fn adc(&mut self, value: u8) {
        let a = self.regs.a as u16;
        let m = value as u16;
        let carry = self.regs.c as u16;
        let binary = a + m + carry;

        if !self.regs.d {
            let result = binary as u8;
            self.regs.v = (!(a ^ m) & (a ^ binary) & 0x80) != 0;
            self.regs.c = binary > 0xff;
            self.regs.a = result;
            self.set_nz(result);
            return;
        }

        // NMOS decimal mode: Z follows the binary sum, N and V the intermediate high nibble.
        let mut lo = (a & 0x0f) + (m & 0x0f) + carry;
        let mut hi = (a >> 4) + (m >> 4);
        if lo > 9 {
            lo += 6;
        }
        if lo > 0x0f {
            hi += 1;
        }
        self.regs.z = binary & 0xff == 0;
        self.regs.n = hi & 0x08 != 0;
        self.regs.v = ((hi << 4) ^ a) & 0x80 != 0 && (a ^ m) & 0x80 == 0;
        if hi > 9 {
            hi += 6;
        }
        self.regs.c = hi > 0x0f;
        self.regs.a = (((hi << 4) | (lo & 0x0f)) & 0xff) as u8;
    }

    fn sbc(&mut self, value: u8) {
        let a = self.regs.a as i16;
        let m = value as i16;
        let borrow = if self.regs.c { 0 } else { 1 };
        let binary = a - m - borrow;
        let result = (binary & 0xff) as u8;

        self.regs.v = ((a ^ m) & (a ^ binary) & 0x80) != 0;
        self.regs.c = binary >= 0;
        self.set_nz(result);

        if !self.regs.d {
            self.regs.a = result;
            return;
        }

        let mut lo = (a & 0x0f) - (m & 0x0f) - borrow;
        let mut hi = (a >> 4) - (m >> 4);
        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }
        self.regs.a = (((hi << 4) | (lo & 0x0f)) & 0xff) as u8;
    }

    fn interrupt<B: Bus>(&mut self, bus: &mut B, vector: u16, brk: bool) {
        let [lo, hi] = self.regs.pc.to_le_bytes();
        self.push(bus, hi);
        self.push(bus, lo);
        let status = self.regs.status(brk);
        self.push(bus, status);
        self.regs.i = true;
        self.regs.pc = Self::read_word(bus, vector);
    }
}

impl Cpu for Mos6502 {
    fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.regs = Registers { sp: 0xfd, i: true, ..Registers::default() };
        self.regs.pc = Self::read_word(bus, RESET_VECTOR);
    }

    fn step<B: Bus>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        let pc = self.regs.pc;
        let op = self.fetch(bus);
        let info = opcode(op);
        let operand = self.operand(bus, info.mode);

        match info.mnemonic {
            Mnemonic::Lda => {
                let value = self.load(bus, operand);
                self.regs.a = value;
                self.set_nz(value);
            }
            Mnemonic::Ldx => {
                let value = self.load(bus, operand);
                self.regs.x = value;
                self.set_nz(value);
            }
            Mnemonic::Ldy => {
                let value = self.load(bus, operand);
                self.regs.y = value;
                self.set_nz(value);
            }
            Mnemonic::Sta => Self::store(bus, operand, self.regs.a),
            Mnemonic::Stx => Self::store(bus, operand, self.regs.x),
            Mnemonic::Sty => Self::store(bus, operand, self.regs.y),

            Mnemonic::Adc => {
                let value = self.load(bus, operand);
                self.adc(value);
            }
            Mnemonic::Sbc => {
                let value = self.load(bus, operand);
                self.sbc(value);
            }
            Mnemonic::And => {
                let value = self.regs.a & self.load(bus, operand);
                self.regs.a = value;
                self.set_nz(value);
            }
            Mnemonic::Ora => {
                let value = self.regs.a | self.load(bus, operand);
                self.regs.a = value;
                self.set_nz(value);
            }
            Mnemonic::Eor => {
                let value = self.regs.a ^ self.load(bus, operand);
                self.regs.a = value;
                self.set_nz(value);
            }
            Mnemonic::Bit => {
                let value = self.load(bus, operand);
                self.regs.z = self.regs.a & value == 0;
                self.regs.n = value & 0x80 != 0;
                self.regs.v = value & 0x40 != 0;
            }
            Mnemonic::Cmp => {
                let value = self.load(bus, operand);
                self.compare(self.regs.a, value);
            }
            Mnemonic::Cpx => {
                let value = self.load(bus, operand);
                self.compare(self.regs.x, value);
            }
            Mnemonic::Cpy => {
                let value = self.load(bus, operand);
                self.compare(self.regs.y, value);
            }

            Mnemonic::Asl => self.modify(bus, operand, |cpu, value| {
                cpu.regs.c = value & 0x80 != 0;
                let result = value << 1;
                cpu.set_nz(result);
                result
            }),
            Mnemonic::Lsr => self.modify(bus, operand, |cpu, value| {
                cpu.regs.c = value & 0x01 != 0;
                let result = value >> 1;
                cpu.set_nz(result);
                result
            }),
            Mnemonic::Rol => self.modify(bus, operand, |cpu, value| {
                let carry_in = cpu.regs.c as u8;
                cpu.regs.c = value & 0x80 != 0;
                let result = (value << 1) | carry_in;
                cpu.set_nz(result);
                result
            }),
            Mnemonic::Ror => self.modify(bus, operand, |cpu, value| {
                let carry_in = (cpu.regs.c as u8) << 7;
                cpu.regs.c = value & 0x01 != 0;
                let result = (value >> 1) | carry_in;
                cpu.set_nz(result);
                result
            }),
            Mnemonic::Inc => self.modify(bus, operand, |cpu, value| {
                let result = value.wrapping_add(1);
                cpu.set_nz(result);
                result
            }),
            Mnemonic::Dec => self.modify(bus, operand, |cpu, value| {
                let result = value.wrapping_sub(1);
                cpu.set_nz(result);
                result
            }),
            Mnemonic::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.set_nz(self.regs.x);
            }
            Mnemonic::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.set_nz(self.regs.y);
            }
            Mnemonic::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.set_nz(self.regs.x);
            }
            Mnemonic::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.set_nz(self.regs.y);
            }

            Mnemonic::Bcc => self.branch(operand, !self.regs.c),
            Mnemonic::Bcs => self.branch(operand, self.regs.c),
            Mnemonic::Bne => self.branch(operand, !self.regs.z),
            Mnemonic::Beq => self.branch(operand, self.regs.z),
            Mnemonic::Bpl => self.branch(operand, !self.regs.n),
            Mnemonic::Bmi => self.branch(operand, self.regs.n),
            Mnemonic::Bvc => self.branch(operand, !self.regs.v),
            Mnemonic::Bvs => self.branch(operand, self.regs.v),

            Mnemonic::Jmp => {
                if let Operand::Address(target) = operand {
                    self.regs.pc = target;
                }
            }
            Mnemonic::Jsr => {
                if let Operand::Address(target) = operand {
                    let [lo, hi] = self.regs.pc.wrapping_sub(1).to_le_bytes();
                    self.push(bus, hi);
                    self.push(bus, lo);
                    self.regs.pc = target;
                }
            }
            Mnemonic::Rts => {
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.regs.pc = u16::from_le_bytes([lo, hi]).wrapping_add(1);
            }
            Mnemonic::Rti => {
                let status = self.pull(bus);
                self.regs.set_status(status);
                let lo = self.pull(bus);
                let hi = self.pull(bus);
                self.regs.pc = u16::from_le_bytes([lo, hi]);
            }
            Mnemonic::Brk => {
                // BRK skips a padding byte after the opcode.
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.interrupt(bus, IRQ_VECTOR, true);
            }

            Mnemonic::Pha => self.push(bus, self.regs.a),
            Mnemonic::Php => {
                let status = self.regs.status(true);
                self.push(bus, status);
            }
            Mnemonic::Pla => {
                let value = self.pull(bus);
                self.regs.a = value;
                self.set_nz(value);
            }
            Mnemonic::Plp => {
                let status = self.pull(bus);
                self.regs.set_status(status);
            }

            Mnemonic::Tax => {
                self.regs.x = self.regs.a;
                self.set_nz(self.regs.x);
            }
            Mnemonic::Tay => {
                self.regs.y = self.regs.a;
                self.set_nz(self.regs.y);
            }
            Mnemonic::Txa => {
                self.regs.a = self.regs.x;
                self.set_nz(self.regs.a);
            }
            Mnemonic::Tya => {
                self.regs.a = self.regs.y;
                self.set_nz(self.regs.a);
            }
            Mnemonic::Tsx => {
                self.regs.x = self.regs.sp;
                self.set_nz(self.regs.x);
            }
            Mnemonic::Txs => self.regs.sp = self.regs.x,

            Mnemonic::Clc => self.regs.c = false,
            Mnemonic::Sec => self.regs.c = true,
            Mnemonic::Cli => self.regs.i = false,
            Mnemonic::Sei => self.regs.i = true,
            Mnemonic::Clv => self.regs.v = false,
            Mnemonic::Cld => self.regs.d = false,
            Mnemonic::Sed => self.regs.d = true,
            Mnemonic::Nop => {}

            Mnemonic::Illegal => {
                self.regs.pc = pc;
                return Err(CpuError::IllegalOpcode { opcode: op, pc });
            }
        }

        Ok(())
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn save_state(&self) -> Registers {
        self.regs
    }

    fn load_state(&mut self, registers: &Registers) {
        self.regs = *registers;
    }
}
