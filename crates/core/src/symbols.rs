//! Symbol naming for addresses and registers touched during one execution.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::MemoryLayout;

/// Registers a fragment or query can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    A,
    X,
    Y,
    N,
    V,
    C,
    Z,
    Sp,
}

impl Register {
    /// Registers merged into the output map after a successful run.
    pub const OUTPUTS: [Register; 7] =
        [Register::A, Register::X, Register::Y, Register::N, Register::V, Register::C, Register::Z];

    pub fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::X => "X",
            Register::Y => "Y",
            Register::N => "N",
            Register::V => "V",
            Register::C => "C",
            Register::Z => "Z",
            Register::Sp => "SP",
        }
    }

    pub fn from_name(name: &str) -> Option<Register> {
        Some(match name {
            "A" => Register::A,
            "X" => Register::X,
            "Y" => Register::Y,
            "N" => Register::N,
            "V" => Register::V,
            "C" => Register::C,
            "Z" => Register::Z,
            "SP" => Register::Sp,
            _ => return None,
        })
    }
}

/// Address class, in the same partitioning the canonicalizer allocates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    ZeroPage,
    Absolute,
    Indexed,
    Indirect,
}

impl Region {
    pub fn classify(address: u16, layout: &MemoryLayout) -> Region {
        if address < 0x100 {
            Region::ZeroPage
        } else if address < layout.indexed_base() {
            Region::Absolute
        } else if address < layout.end() {
            Region::Indexed
        } else {
            Region::Indirect
        }
    }

    fn prefix(self) -> char {
        match self {
            Region::ZeroPage => 'z',
            Region::Absolute => 'a',
            Region::Indexed => 'n',
            Region::Indirect => 'i',
        }
    }

    fn from_prefix(c: char) -> Option<Region> {
        match c {
            'z' => Some(Region::ZeroPage),
            'a' => Some(Region::Absolute),
            'n' => Some(Region::Indexed),
            'i' => Some(Region::Indirect),
            _ => None,
        }
    }
}

/// A register or a classified memory address.
///
/// Printed names: `A X Y N V C Z SP` for registers, `<region><hex>` for memory
/// (`z20`, `a200`, `n300`, `iff00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    Register(Register),
    Memory { region: Region, address: u16 },
}

impl Symbol {
    pub fn memory(address: u16, layout: &MemoryLayout) -> Symbol {
        Symbol::Memory { region: Region::classify(address, layout), address }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Register(reg) => f.write_str(reg.name()),
            Symbol::Memory { region, address } => write!(f, "{}{:x}", region.prefix(), address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid symbol name '{0}'")]
pub struct SymbolParseError(pub String);

impl FromStr for Symbol {
    type Err = SymbolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(reg) = Register::from_name(s) {
            return Ok(Symbol::Register(reg));
        }
        let mut chars = s.chars();
        let region = chars
            .next()
            .and_then(Region::from_prefix)
            .ok_or_else(|| SymbolParseError(s.to_string()))?;
        let digits = chars.as_str();
        if digits.is_empty() {
            return Err(SymbolParseError(s.to_string()));
        }
        let address =
            u16::from_str_radix(digits, 16).map_err(|_| SymbolParseError(s.to_string()))?;
        Ok(Symbol::Memory { region, address })
    }
}

/// Value observed for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Byte(u8),
    /// A write through the indexed region, kept with the address it landed on.
    Indexed { address: u16, value: u8 },
}

impl Value {
    pub fn byte(self) -> u8 {
        match self {
            Value::Byte(value) | Value::Indexed { value, .. } => value,
        }
    }

    /// Fixed-width hex token used in signatures.
    pub fn token(self) -> String {
        match self {
            Value::Byte(value) => format!("{value:02x}"),
            Value::Indexed { address, value } => format!("{address:04x}{value:02x}"),
        }
    }
}

/// Per-execution outputs, ordered by symbol.
pub type OutputMap = BTreeMap<Symbol, Value>;
