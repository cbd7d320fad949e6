//! Semantic queries: describe a behavior, get the fingerprint a fragment
//! with that behavior would have.
//!
//! A query is any [`Probe`]: something that reads initial state through
//! [`Inputs`] and records results through [`Outputs`]. [`Program`] is the
//! text form accepted by the CLI, e.g. `[0x20, 0x21] = [0x20, 0x21] + 1`.

pub mod lexer;
pub mod parser;

use thiserror::Error;

use crate::bus::RunState;
use crate::config::ScanConfig;
use crate::cpu::Bus;
use crate::fingerprint::{fingerprints, Fingerprint};
use crate::symbols::Register;
use crate::vectors::TestVectorSet;

pub use parser::{BinaryOp, Expr, Func, Place, Program, Statement, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("parse error at offset {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("evaluation error at offset {pos}: {message}")]
    Eval { pos: usize, message: String },
}

/// Read access to the state a probe runs against.
pub trait Inputs {
    /// Initial register value from the test vector.
    fn reg(&self, reg: Register) -> u8;

    fn read(&mut self, address: u16) -> u8;

    fn read16(&mut self, address: u16) -> u16 {
        let lo = self.read(address) as u16;
        let hi = self.read(address.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    /// Little-endian value spread over up to eight `addresses`.
    fn read_le(&mut self, addresses: &[u16]) -> u64 {
        addresses
            .iter()
            .take(8)
            .enumerate()
            .fold(0, |acc, (i, &address)| acc | (self.read(address) as u64) << (8 * i))
    }
}

/// Write access for recording a probe's results.
pub trait Outputs {
    fn set_reg(&mut self, reg: Register, value: u8);

    fn write(&mut self, address: u16, value: u8);

    fn write16(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(address, lo);
        self.write(address.wrapping_add(1), hi);
    }

    fn write_le(&mut self, addresses: &[u16], value: u64) {
        for (i, &address) in addresses.iter().take(8).enumerate() {
            self.write(address, (value >> (8 * i)) as u8);
        }
    }
}

impl Inputs for RunState<'_> {
    fn reg(&self, reg: Register) -> u8 {
        self.vector().register(reg)
    }

    fn read(&mut self, address: u16) -> u8 {
        Bus::read(self, address)
    }
}

impl Outputs for RunState<'_> {
    fn set_reg(&mut self, reg: Register, value: u8) {
        self.set_register(reg, value);
    }

    fn write(&mut self, address: u16, value: u8) {
        Bus::write(self, address, value);
    }
}

/// Interpret a byte as signed.
pub fn s8(x: i64) -> i64 {
    let x = x & 0xff;
    if x & 0x80 != 0 {
        x - 0x100
    } else {
        x
    }
}

/// Interpret a 16-bit word as signed.
pub fn s16(x: i64) -> i64 {
    let x = x & 0xffff;
    if x & 0x8000 != 0 {
        x - 0x10000
    } else {
        x
    }
}

/// A behavioral description run once per test vector.
pub trait Probe {
    fn probe(&self, state: &mut RunState<'_>) -> Result<(), QueryError>;
}

impl<F> Probe for F
where
    F: Fn(&mut RunState<'_>) -> Result<(), QueryError>,
{
    fn probe(&self, state: &mut RunState<'_>) -> Result<(), QueryError> {
        self(state)
    }
}

/// Run `probe` against every vector with no fragment loaded and fingerprint the outputs.
pub fn evaluate<P: Probe + ?Sized>(
    probe: &P,
    vectors: &TestVectorSet,
    config: &ScanConfig,
) -> Result<Fingerprint, QueryError> {
    let results = vectors
        .iter()
        .map(|vector| {
            let mut state = RunState::new(None, vector, config.layout)
                .with_indexed_pairs(config.pair_indexed_writes);
            probe.probe(&mut state)?;
            Ok(state.into_outputs())
        })
        .collect::<Result<Vec<_>, QueryError>>()?;
    Ok(fingerprints(vectors, &results))
}

fn eval_error(pos: usize, message: impl Into<String>) -> QueryError {
    QueryError::Eval { pos, message: message.into() }
}

fn address(value: i64, pos: usize) -> Result<u16, QueryError> {
    u16::try_from(value).map_err(|_| eval_error(pos, format!("address {value} out of range")))
}

impl Program {
    fn addresses<S: Inputs>(
        &self,
        state: &mut S,
        exprs: &[Expr],
        pos: usize,
    ) -> Result<Vec<u16>, QueryError> {
        if exprs.len() > 8 {
            return Err(eval_error(pos, "at most 8 bytes can be combined"));
        }
        exprs.iter().map(|e| address(self.eval(state, e)?, pos)).collect()
    }

    fn eval<S: Inputs>(&self, state: &mut S, expr: &Expr) -> Result<i64, QueryError> {
        Ok(match expr {
            Expr::Number(n) => *n,
            Expr::Read { place, pos } => match place {
                Place::Register(reg) => state.reg(*reg) as i64,
                Place::Byte(addr) => {
                    let addr = address(self.eval(state, addr)?, *pos)?;
                    state.read(addr) as i64
                }
                Place::Word(addr) => {
                    let addr = address(self.eval(state, addr)?, *pos)?;
                    state.read16(addr) as i64
                }
                Place::Bytes(exprs) => {
                    let addrs = self.addresses(state, exprs, *pos)?;
                    state.read_le(&addrs) as i64
                }
            },
            Expr::Unary { op, expr } => {
                let v = self.eval(state, expr)?;
                match op {
                    UnaryOp::Neg => v.wrapping_neg(),
                    UnaryOp::Not => (v == 0) as i64,
                    UnaryOp::BitNot => !v,
                }
            }
            Expr::Call { func, arg } => {
                let v = self.eval(state, arg)?;
                match func {
                    Func::S8 => s8(v),
                    Func::S16 => s16(v),
                    Func::Lo => v & 0xff,
                    Func::Hi => (v >> 8) & 0xff,
                }
            }
            Expr::Binary { op, left, right, pos } => {
                let l = self.eval(state, left)?;
                match op {
                    BinaryOp::LogicAnd if l == 0 => return Ok(0),
                    BinaryOp::LogicOr if l != 0 => return Ok(1),
                    _ => {}
                }
                let r = self.eval(state, right)?;
                let shift = || {
                    u32::try_from(r)
                        .ok()
                        .filter(|&n| n < 64)
                        .ok_or_else(|| eval_error(*pos, format!("shift by {r} out of range")))
                };
                match op {
                    BinaryOp::Add => l.wrapping_add(r),
                    BinaryOp::Sub => l.wrapping_sub(r),
                    BinaryOp::Mul => l.wrapping_mul(r),
                    BinaryOp::Div | BinaryOp::Mod if r == 0 => {
                        return Err(eval_error(*pos, "division by zero"));
                    }
                    BinaryOp::Div => l.wrapping_div(r),
                    BinaryOp::Mod => l.wrapping_rem(r),
                    BinaryOp::And => l & r,
                    BinaryOp::Or => l | r,
                    BinaryOp::Xor => l ^ r,
                    BinaryOp::Shl => l << shift()?,
                    BinaryOp::Shr => l >> shift()?,
                    BinaryOp::Eq => (l == r) as i64,
                    BinaryOp::Ne => (l != r) as i64,
                    BinaryOp::Lt => (l < r) as i64,
                    BinaryOp::Le => (l <= r) as i64,
                    BinaryOp::Gt => (l > r) as i64,
                    BinaryOp::Ge => (l >= r) as i64,
                    BinaryOp::LogicAnd | BinaryOp::LogicOr => (r != 0) as i64,
                }
            }
        })
    }

    fn execute<S: Inputs + Outputs>(&self, state: &mut S) -> Result<(), QueryError> {
        for statement in &self.statements {
            let value = self.eval(state, &statement.value)?;
            match &statement.target {
                Place::Register(reg) => state.set_reg(*reg, value as u8),
                Place::Byte(addr) => {
                    let addr = address(self.eval(state, addr)?, statement.pos)?;
                    state.write(addr, value as u8);
                }
                Place::Word(addr) => {
                    let addr = address(self.eval(state, addr)?, statement.pos)?;
                    state.write16(addr, value as u16);
                }
                Place::Bytes(exprs) => {
                    let addrs = self.addresses(state, exprs, statement.pos)?;
                    state.write_le(&addrs, value as u64);
                }
            }
        }
        Ok(())
    }
}

impl Probe for Program {
    fn probe(&self, state: &mut RunState<'_>) -> Result<(), QueryError> {
        self.execute(state)
    }
}
