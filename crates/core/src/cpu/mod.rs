//! Instruction-set collaborators: opcode metadata and a 6502 emulator.
//!
//! The rest of the crate only depends on the [`Bus`] and [`Cpu`] traits, so a
//! different emulator can be dropped in as long as it can be reset, stepped
//! one instruction at a time and have its registers saved and restored.

pub mod mos6502;
pub mod opcodes;

use thiserror::Error;

pub use mos6502::Mos6502;

/// Memory surface an emulator drives while executing.
pub trait Bus {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

/// Errors raised by an emulator while stepping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("illegal opcode ${opcode:02x} at ${pc:04x}")]
    IllegalOpcode { opcode: u8, pc: u16 },
}

/// Full register snapshot of a 6502.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub n: bool,
    pub v: bool,
    pub d: bool,
    pub i: bool,
    pub z: bool,
    pub c: bool,
}

impl Registers {
    /// Pack the flags into a status byte (bit 5 always set, B as given).
    pub fn status(&self, brk: bool) -> u8 {
        let mut p = 0x20;
        if self.n {
            p |= 0x80;
        }
        if self.v {
            p |= 0x40;
        }
        if brk {
            p |= 0x10;
        }
        if self.d {
            p |= 0x08;
        }
        if self.i {
            p |= 0x04;
        }
        if self.z {
            p |= 0x02;
        }
        if self.c {
            p |= 0x01;
        }
        p
    }

    /// Unpack a status byte; B and bit 5 have no storage and are ignored.
    pub fn set_status(&mut self, p: u8) {
        self.n = p & 0x80 != 0;
        self.v = p & 0x40 != 0;
        self.d = p & 0x08 != 0;
        self.i = p & 0x04 != 0;
        self.z = p & 0x02 != 0;
        self.c = p & 0x01 != 0;
    }
}

/// Contract the execution runner needs from an emulator.
pub trait Cpu {
    /// Power-on reset: fetches the program counter from the reset vector.
    fn reset<B: Bus>(&mut self, bus: &mut B);

    /// Execute exactly one instruction.
    fn step<B: Bus>(&mut self, bus: &mut B) -> Result<(), CpuError>;

    fn pc(&self) -> u16;

    fn save_state(&self) -> Registers;

    fn load_state(&mut self, registers: &Registers);
}
