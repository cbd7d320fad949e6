//! Symbolic memory bus: one [`RunState`] per (fragment, vector) execution.

use std::collections::BTreeMap;

use tracing::trace;

use crate::config::{MemoryLayout, FRAGMENT_BASE};
use crate::cpu::Bus;
use crate::symbols::{OutputMap, Region, Register, Symbol, Value};
use crate::vectors::TestVector;

/// Start of the interrupt vector table inside the fragment window.
const VECTOR_TABLE: u16 = 0xfffa;

/// How an address was used during one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub symbol: Symbol,
    pub read: bool,
    pub written: bool,
}

/// Execution record backing the emulator's memory.
///
/// Reads of the fragment window return the fragment image; every other
/// address is classified into a [`Symbol`] and served from this execution's
/// outputs if written, else from the test vector.
#[derive(Debug)]
pub struct RunState<'a> {
    fragment: Option<&'a [u8]>,
    vector: &'a TestVector,
    layout: MemoryLayout,
    pair_indexed_writes: bool,
    accesses: BTreeMap<u16, Access>,
    outputs: OutputMap,
}

impl<'a> RunState<'a> {
    pub fn new(fragment: Option<&'a [u8]>, vector: &'a TestVector, layout: MemoryLayout) -> Self {
        Self {
            fragment,
            vector,
            layout,
            pair_indexed_writes: false,
            accesses: BTreeMap::new(),
            outputs: OutputMap::new(),
        }
    }

    /// Record writes to the indexed region as (address, value) pairs.
    pub fn with_indexed_pairs(mut self, enabled: bool) -> Self {
        self.pair_indexed_writes = enabled;
        self
    }

    pub fn vector(&self) -> &TestVector {
        self.vector
    }

    pub fn outputs(&self) -> &OutputMap {
        &self.outputs
    }

    pub fn into_outputs(self) -> OutputMap {
        self.outputs
    }

    pub fn accesses(&self) -> impl Iterator<Item = &Access> {
        self.accesses.values()
    }

    pub fn set_register(&mut self, reg: Register, value: u8) {
        self.outputs.insert(Symbol::Register(reg), Value::Byte(value));
    }

    fn touch(&mut self, address: u16, write: bool) -> Symbol {
        let layout = self.layout;
        let access = self.accesses.entry(address).or_insert_with(|| Access {
            symbol: Symbol::memory(address, &layout),
            read: false,
            written: false,
        });
        if write {
            access.written = true;
        } else {
            access.read = true;
        }
        access.symbol
    }

    fn image_byte(&self, address: u16) -> Option<u8> {
        if address < FRAGMENT_BASE {
            return None;
        }
        if address >= VECTOR_TABLE {
            let [lo, hi] = FRAGMENT_BASE.to_le_bytes();
            return Some(match address {
                0xfffc => lo,
                0xfffd => hi,
                _ => 0x00,
            });
        }
        let fragment = self.fragment?;
        let offset = (address - FRAGMENT_BASE) as usize;
        // One byte past the image reads as zero; the runner stops before fetching it.
        if offset <= fragment.len() {
            Some(fragment.get(offset).copied().unwrap_or(0))
        } else {
            None
        }
    }
}

impl Bus for RunState<'_> {
    fn read(&mut self, address: u16) -> u8 {
        if let Some(byte) = self.image_byte(address) {
            return byte;
        }
        let symbol = self.touch(address, false);
        match self.outputs.get(&symbol) {
            Some(value) => {
                trace!(address, %symbol, ?value, "read back");
                value.byte()
            }
            None => self.vector.byte(address),
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        let symbol = self.touch(address, true);
        let recorded = match symbol {
            Symbol::Memory { region: Region::Indexed, .. } if self.pair_indexed_writes => {
                Value::Indexed { address, value }
            }
            _ => Value::Byte(value),
        };
        self.outputs.insert(symbol, recorded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_window_serves_image_and_reset_vector() {
        let vector = TestVector::fill(0x55);
        let code = [0xa9, 0x01];
        let mut rs = RunState::new(Some(&code), &vector, MemoryLayout::default());
        assert_eq!(rs.read(0xff00), 0xa9);
        assert_eq!(rs.read(0xff01), 0x01);
        assert_eq!(rs.read(0xff02), 0x00);
        assert_eq!(rs.read(0xfffc), 0x00);
        assert_eq!(rs.read(0xfffd), 0xff);
        assert_eq!(rs.read(0xfffe), 0x00);
        assert_eq!(rs.accesses().count(), 0);
        // Past the image the window is ordinary memory.
        assert_eq!(rs.read(0xff10), 0x55);
        assert_eq!(rs.accesses().next().map(|a| a.symbol.to_string()), Some("iff10".into()));
    }

    #[test]
    fn writes_are_read_back_and_tracked_both_ways() {
        let vector = TestVector::fill(0x10);
        let mut rs = RunState::new(None, &vector, MemoryLayout::default());
        assert_eq!(rs.read(0x0020), 0x10);
        rs.write(0x0020, 0x99);
        assert_eq!(rs.read(0x0020), 0x99);
        let access = rs.accesses().next().copied().unwrap();
        assert!(access.read && access.written);
        assert_eq!(rs.outputs().len(), 1);
    }

    #[test]
    fn indexed_pairs_keep_the_address() {
        let vector = TestVector::fill(0);
        let mut rs =
            RunState::new(None, &vector, MemoryLayout::default()).with_indexed_pairs(true);
        rs.write(0x0305, 0x42);
        rs.write(0x0020, 0x42);
        let outputs = rs.into_outputs();
        let indexed: Symbol = "n305".parse().unwrap();
        let zp: Symbol = "z20".parse().unwrap();
        assert_eq!(outputs[&indexed], Value::Indexed { address: 0x0305, value: 0x42 });
        assert_eq!(outputs[&zp], Value::Byte(0x42));
    }
}
