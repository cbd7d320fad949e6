//! Sequence validation: how many bytes from an offset form a usable fragment.

use tracing::trace;

use crate::cpu::opcodes::{disassemble, is_branch, SEQUENCE_OPCODE_LENGTHS};

/// Longest valid fragment starting at `start`, no longer than `max_len`.
///
/// Instructions are walked with [`SEQUENCE_OPCODE_LENGTHS`]; the walk stops at
/// the first disallowed opcode or at an instruction that does not fit. A
/// prefix is valid when every relative branch in it targets an instruction
/// boundary inside the prefix (its end included). A branch to itself, or one
/// targeting anything outside `[start, start + max_len]`, rejects the whole
/// candidate. Returns 0 when no valid prefix of at least `min_len` bytes exists.
pub fn validate_sequence(data: &[u8], start: usize, max_len: usize, min_len: usize) -> usize {
    let limit = data.len().min(start.saturating_add(max_len));
    let mut boundaries: Vec<usize> = Vec::new();
    let mut targets: Vec<usize> = Vec::new();
    let mut best = 0;
    let mut i = start;

    while i < limit {
        let op = data[i];
        let len = SEQUENCE_OPCODE_LENGTHS[op as usize] as usize;
        if len == 0 || i + len > limit {
            break;
        }
        if is_branch(op) {
            let rel = data[i + 1] as i8;
            if rel == 0 {
                trace!(offset = i, "branch to self");
                return 0;
            }
            let target = (i + 2) as isize + rel as isize;
            if target < start as isize || target as usize > limit {
                trace!(offset = i, target, "branch leaves the window");
                return 0;
            }
            targets.push(target as usize);
        }
        trace!("{:04x}  {}", i, disassemble(i as u16, &data[i..i + len]));
        boundaries.push(i);
        i += len;

        let resolved = targets.iter().all(|&t| t == i || (t < i && boundaries.contains(&t)));
        if resolved && i - start >= min_len {
            best = i - start;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_disallowed_opcode() {
        // LDA #1; RTS; LDA #2
        let data = [0xa9, 0x01, 0x60, 0xa9, 0x02];
        assert_eq!(validate_sequence(&data, 0, 32, 2), 2);
        assert_eq!(validate_sequence(&data, 3, 32, 2), 2);
        assert_eq!(validate_sequence(&data, 2, 32, 2), 0);
    }

    #[test]
    fn respects_max_and_min_len() {
        let data = [0xe8, 0xe8, 0xe8, 0xe8];
        assert_eq!(validate_sequence(&data, 0, 3, 2), 3);
        assert_eq!(validate_sequence(&data, 0, 1, 2), 0);
        assert_eq!(validate_sequence(&data, 3, 32, 2), 0);
        assert_eq!(validate_sequence(&data, 3, 32, 1), 1);
    }

    #[test]
    fn truncated_instruction_is_dropped() {
        // LDA #1; LDA abs (missing high byte)
        let data = [0xa9, 0x01, 0xad, 0x00];
        assert_eq!(validate_sequence(&data, 0, 32, 2), 2);
    }

    #[test]
    fn forward_branch_must_resolve_on_a_boundary() {
        assert_eq!(validate_sequence(&[0xd0, 0x02, 0xa9, 0x01], 0, 32, 2), 4);
        // Into the middle of LDA #1.
        assert_eq!(validate_sequence(&[0xd0, 0x01, 0xa9, 0x01], 0, 32, 2), 0);
        // Past the end of the data.
        assert_eq!(validate_sequence(&[0xd0, 0x04, 0xa9, 0x01], 0, 32, 2), 0);
    }

    #[test]
    fn backward_branch_to_a_boundary_is_accepted() {
        // INY; BNE -3
        assert_eq!(validate_sequence(&[0xc8, 0xd0, 0xfd], 0, 32, 2), 3);
        // Before the window start.
        assert_eq!(validate_sequence(&[0xe8, 0xc8, 0xd0, 0xfc], 1, 32, 2), 0);
    }

    #[test]
    fn branch_to_self_rejects_everything() {
        assert_eq!(validate_sequence(&[0xa9, 0x01, 0xd0, 0x00], 0, 32, 2), 0);
    }

    #[test]
    fn longer_prefix_wins_once_targets_resolve() {
        // BEQ +2 resolves only after LDA #1 is included; SEC extends it.
        let data = [0xf0, 0x02, 0xa9, 0x01, 0x38];
        assert_eq!(validate_sequence(&data, 0, 32, 2), 5);
        assert_eq!(validate_sequence(&data, 0, 3, 2), 0);
    }
}
