//! Operand canonicalization.
//!
//! Rewrites every memory operand of a fragment into a fixed layout so that
//! fragments differing only in which addresses they use become byte-identical.
//! Slots are handed out per operand family from the regions of a
//! [`MemoryLayout`]; a repeated original address reuses its slot.

use std::collections::HashMap;

use tracing::trace;

use crate::config::MemoryLayout;
use crate::cpu::opcodes::{disassemble, opcode, OperandFamily};

/// Outcome of a successful canonicalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Canonicalization {
    /// Offsets of immediate operand bytes.
    pub constants: Vec<usize>,
    /// Offset of every instruction, in order.
    pub offsets: Vec<usize>,
    /// Original to canonical address, in allocation order.
    pub map: Vec<(u16, u16)>,
}

impl Canonicalization {
    /// Length of the fragment with its final instruction dropped.
    pub fn last_boundary(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }
}

struct Allocator {
    layout: MemoryLayout,
    next_zp: u16,
    next_abs: u16,
    next_indexed: u16,
    memo: HashMap<u16, u16>,
    result: Canonicalization,
}

impl Allocator {
    fn new(layout: MemoryLayout) -> Self {
        Self {
            layout,
            next_zp: layout.zp_start as u16,
            next_abs: layout.abs_base(),
            next_indexed: layout.indexed_base(),
            memo: HashMap::new(),
            result: Canonicalization::default(),
        }
    }

    fn remember(&mut self, original: u16, canonical: u16) -> u16 {
        self.memo.insert(original, canonical);
        self.result.map.push((original, canonical));
        canonical
    }

    /// Zero-page slot for `zp` (`width` 1) or a `(zp),Y` pointer (`width` 2).
    fn zero_page(&mut self, original: u16, width: u16) -> Option<u16> {
        if let Some(&slot) = self.memo.get(&original) {
            return (slot < 0x100).then_some(slot);
        }
        if self.next_zp + width > 0x100 {
            return None;
        }
        let slot = self.next_zp;
        self.next_zp += width;
        Some(self.remember(original, slot))
    }

    fn absolute(&mut self, original: u16) -> Option<u16> {
        if let Some(&slot) = self.memo.get(&original) {
            return Some(slot);
        }
        if self.next_abs >= self.layout.abs_base() + 0x100 {
            return None;
        }
        let slot = self.next_abs;
        self.next_abs += 1;
        Some(self.remember(original, slot))
    }

    fn indexed(&mut self, original: u16) -> Option<u16> {
        if let Some(&slot) = self.memo.get(&original) {
            return Some(slot);
        }
        if self.next_indexed >= self.layout.end() {
            return None;
        }
        let slot = self.next_indexed;
        self.next_indexed += 0x100;
        Some(self.remember(original, slot))
    }

    /// The single slot at address 0; excludes every other zero-page slot.
    fn zero_page_indexed(&mut self, original: u16) -> Option<u16> {
        if let Some(&slot) = self.memo.get(&original) {
            return (slot < 0x100).then_some(slot);
        }
        if self.next_zp > self.layout.zp_start as u16 {
            return None;
        }
        self.next_zp = 0x100;
        Some(self.remember(original, 0))
    }
}

/// Canonicalize `insns` in place.
///
/// Returns `None` when a region runs out of slots or a second distinct
/// zero-page-indexed operand shows up; the bytes are then partially
/// rewritten and must be discarded.
pub fn canonicalize(insns: &mut [u8], layout: &MemoryLayout) -> Option<Canonicalization> {
    let mut alloc = Allocator::new(*layout);
    let mut i = 0;

    while i < insns.len() {
        alloc.result.offsets.push(i);
        let info = opcode(insns[i]);
        let len = info.len();
        if i + len > insns.len() {
            return None;
        }

        match info.mode.family() {
            OperandFamily::ZeroPage | OperandFamily::ZeroPagePointer => {
                let width =
                    if info.mode.family() == OperandFamily::ZeroPagePointer { 2 } else { 1 };
                let slot = alloc.zero_page(insns[i + 1] as u16, width)?;
                insns[i + 1] = slot as u8;
            }
            OperandFamily::Absolute | OperandFamily::Indexed => {
                let original = u16::from_le_bytes([insns[i + 1], insns[i + 2]]);
                let slot = if info.mode.family() == OperandFamily::Absolute {
                    alloc.absolute(original)?
                } else {
                    alloc.indexed(original)?
                };
                let [lo, hi] = slot.to_le_bytes();
                insns[i + 1] = lo;
                insns[i + 2] = hi;
            }
            OperandFamily::ZeroPageIndexed => {
                let slot = alloc.zero_page_indexed(insns[i + 1] as u16)?;
                insns[i + 1] = slot as u8;
            }
            OperandFamily::Immediate => alloc.result.constants.push(i + 1),
            OperandFamily::Other => {}
        }

        trace!("{:04x}  {}", i, disassemble(i as u16, &insns[i..i + len]));
        i += len;
    }

    Some(alloc.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(bytes: &[u8]) -> Option<Vec<u8>> {
        let mut insns = bytes.to_vec();
        canonicalize(&mut insns, &MemoryLayout::default()).map(|_| insns)
    }

    #[test]
    fn zero_page_and_absolute() {
        assert_eq!(canon(&[0xa5, 0x00]).unwrap(), [0xa5, 0x20]);
        assert_eq!(canon(&[0xa9, 0x12]).unwrap(), [0xa9, 0x12]);
        assert_eq!(canon(&[0xa5, 0x12, 0xa5, 0xff]).unwrap(), [0xa5, 0x20, 0xa5, 0x21]);
        assert_eq!(
            canon(&[0xa5, 0x12, 0x6d, 0x12, 0x13, 0x2d, 0xff, 0xff, 0x2d, 0x12, 0x13]).unwrap(),
            [0xa5, 0x20, 0x6d, 0x00, 0x02, 0x2d, 0x01, 0x02, 0x2d, 0x00, 0x02]
        );
    }

    #[test]
    fn indirect_y_takes_two_slots() {
        assert_eq!(canon(&[0x71, 0x71, 0xa5, 0x71]).unwrap(), [0x71, 0x20, 0xa5, 0x20]);
        assert_eq!(canon(&[0x71, 0x71, 0xa5, 0x72]).unwrap(), [0x71, 0x20, 0xa5, 0x22]);
        assert_eq!(canon(&[0xa5, 0x72, 0x71, 0x71]).unwrap(), [0xa5, 0x20, 0x71, 0x21]);
    }

    #[test]
    fn zero_page_indexed_has_one_slot() {
        assert_eq!(canon(&[0x36, 0x88, 0x36, 0x88]).unwrap(), [0x36, 0x00, 0x36, 0x00]);
        assert_eq!(canon(&[0x36, 0x88, 0x36, 0x89]), None);
        // Other zero-page slots are already in use.
        assert_eq!(canon(&[0xa5, 0x10, 0xb5, 0x11]), None);
        // And none can be allocated afterwards.
        assert_eq!(canon(&[0xb5, 0x11, 0xa5, 0x10]), None);
    }

    #[test]
    fn absolute_indexed_gets_a_page_each() {
        assert_eq!(
            canon(&[0x19, 0x88, 0x20, 0xde, 0x88, 0x20]).unwrap(),
            [0x19, 0x00, 0x03, 0xde, 0x00, 0x03]
        );
        assert_eq!(
            canon(&[0x19, 0x88, 0x20, 0xde, 0x88, 0x21]).unwrap(),
            [0x19, 0x00, 0x03, 0xde, 0x00, 0x04]
        );
        assert_eq!(
            canon(&[0x19, 0x88, 0x20, 0xde, 0x89, 0x20]).unwrap(),
            [0x19, 0x00, 0x03, 0xde, 0x00, 0x04]
        );
    }

    #[test]
    fn reports_offsets_constants_and_map() {
        let mut insns = vec![0xa9, 0x05, 0x85, 0x44, 0xe8];
        let result = canonicalize(&mut insns, &MemoryLayout::default()).unwrap();
        assert_eq!(result.offsets, vec![0, 2, 4]);
        assert_eq!(result.constants, vec![1]);
        assert_eq!(result.map, vec![(0x44, 0x20)]);
        assert_eq!(result.last_boundary(), 4);
    }

    #[test]
    fn zero_page_reuse_of_a_wide_slot_fails() {
        // $0088 lands in the absolute page; a later zp,X use of $88 cannot follow it there.
        assert_eq!(canon(&[0xad, 0x88, 0x00, 0xb5, 0x88]), None);
    }
}
