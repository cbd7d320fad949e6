//! Executes canonical fragments against test vectors.

use thiserror::Error;
use tracing::debug;

use crate::bus::RunState;
use crate::config::{MemoryLayout, ScanConfig, FRAGMENT_BASE, FRAGMENT_WINDOW_LEN};
use crate::cpu::{Cpu, CpuError, Mos6502};
use crate::symbols::{OutputMap, Register};
use crate::vectors::{TestVector, TestVectorSet};

/// Why a fragment was dropped. Expected and frequent; callers skip the fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Disqualified {
    #[error("fragment of {len} bytes does not fit the image window")]
    Oversized { len: usize },

    #[error("exceeded the {limit} instruction limit")]
    StepLimit { limit: usize },

    #[error("ran before the start (pc ${pc:04x})")]
    RanBeforeStart { pc: u16 },

    #[error("ran past the end (pc ${pc:04x})")]
    RanPastEnd { pc: u16 },

    #[error("stack mismatch (sp ${before:02x} -> ${after:02x})")]
    StackMismatch { before: u8, after: u8 },

    #[error("left decimal mode set")]
    DecimalMode,

    #[error(transparent)]
    Cpu(#[from] CpuError),
}

/// Drives an emulator over one fragment per vector.
#[derive(Debug, Clone)]
pub struct ExecutionRunner<C: Cpu = Mos6502> {
    cpu: C,
    layout: MemoryLayout,
    max_steps: usize,
    pair_indexed_writes: bool,
}

impl ExecutionRunner<Mos6502> {
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_cpu(Mos6502::new(), config)
    }
}

impl<C: Cpu> ExecutionRunner<C> {
    pub fn with_cpu(cpu: C, config: &ScanConfig) -> Self {
        Self {
            cpu,
            layout: config.layout,
            max_steps: config.max_steps,
            pair_indexed_writes: config.pair_indexed_writes,
        }
    }

    /// Run `insns` from the image base until the program counter lands on its end.
    pub fn run_one(
        &mut self,
        insns: &[u8],
        vector: &TestVector,
    ) -> Result<OutputMap, Disqualified> {
        if insns.len() > FRAGMENT_WINDOW_LEN {
            return Err(Disqualified::Oversized { len: insns.len() });
        }
        let mut state = RunState::new(Some(insns), vector, self.layout)
            .with_indexed_pairs(self.pair_indexed_writes);

        self.cpu.reset(&mut state);
        let mut initial = self.cpu.save_state();
        initial.a = vector.register(Register::A);
        initial.x = vector.register(Register::X);
        initial.y = vector.register(Register::Y);
        initial.sp = vector.register(Register::Sp);
        initial.n = vector.register(Register::N) != 0;
        initial.v = vector.register(Register::V) != 0;
        initial.z = vector.register(Register::Z) != 0;
        initial.c = vector.register(Register::C) != 0;
        initial.d = false;
        self.cpu.load_state(&initial);

        let start = FRAGMENT_BASE;
        let end = start + insns.len() as u16;
        let mut steps = 0;
        while self.cpu.pc() != end {
            if steps >= self.max_steps {
                return Err(Disqualified::StepLimit { limit: self.max_steps });
            }
            self.cpu.step(&mut state)?;
            steps += 1;
            let pc = self.cpu.pc();
            if pc < start {
                return Err(Disqualified::RanBeforeStart { pc });
            }
            if pc > end {
                return Err(Disqualified::RanPastEnd { pc });
            }
        }

        let last = self.cpu.save_state();
        if last.sp != initial.sp {
            return Err(Disqualified::StackMismatch { before: initial.sp, after: last.sp });
        }
        if last.d {
            return Err(Disqualified::DecimalMode);
        }
        if steps > 100 {
            debug!(steps, "long simulation");
        }

        for reg in Register::OUTPUTS {
            let value = match reg {
                Register::A => last.a,
                Register::X => last.x,
                Register::Y => last.y,
                Register::N => last.n as u8,
                Register::V => last.v as u8,
                Register::C => last.c as u8,
                Register::Z => last.z as u8,
                Register::Sp => last.sp,
            };
            state.set_register(reg, value);
        }
        Ok(state.into_outputs())
    }

    /// Run `insns` against every vector; the first disqualification wins.
    pub fn run_all(
        &mut self,
        insns: &[u8],
        vectors: &TestVectorSet,
    ) -> Result<Vec<OutputMap>, Disqualified> {
        vectors.iter().map(|vector| self.run_one(insns, vector)).collect()
    }
}
