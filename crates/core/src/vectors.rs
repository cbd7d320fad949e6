//! Test vectors: initial machine states every fragment is executed against.

use sha2::{Digest, Sha256};

use crate::config::VectorConfig;
use crate::symbols::{Register, Symbol, Value};

const MEMORY_SIZE: usize = 0x10000;

/// Addresses holding the initial register values of each vector.
pub const REG_A: u16 = 0xff00;
pub const REG_X: u16 = 0xff01;
pub const REG_Y: u16 = 0xff02;
pub const REG_FLAGS: u16 = 0xff03;
pub const REG_SP: u16 = 0xff04;

/// xorshift32 with arithmetic right shift; each call yields one byte.
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: i32,
}

impl XorShift32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed as i32 }
    }

    pub fn next_byte(&mut self) -> u8 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x & 0xff) as u8
    }
}

/// How a vector's memory image was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSeed {
    Fill(u8),
    Random(u32),
}

/// One full 64K memory image.
#[derive(Clone)]
pub struct TestVector {
    seed: VectorSeed,
    memory: Box<[u8]>,
}

impl std::fmt::Debug for TestVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestVector").field("seed", &self.seed).finish_non_exhaustive()
    }
}

impl TestVector {
    pub fn fill(value: u8) -> Self {
        Self { seed: VectorSeed::Fill(value), memory: vec![value; MEMORY_SIZE].into_boxed_slice() }
    }

    pub fn random(rng: &mut XorShift32, seed: u32) -> Self {
        let memory: Vec<u8> = (0..MEMORY_SIZE).map(|_| rng.next_byte()).collect();
        Self { seed: VectorSeed::Random(seed), memory: memory.into_boxed_slice() }
    }

    pub fn seed(&self) -> VectorSeed {
        self.seed
    }

    pub fn byte(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Initial value of a register, derived from the reserved high bytes.
    pub fn register(&self, reg: Register) -> u8 {
        let flags = self.byte(REG_FLAGS);
        match reg {
            Register::A => self.byte(REG_A),
            Register::X => self.byte(REG_X),
            Register::Y => self.byte(REG_Y),
            Register::N => (flags >> 7) & 1,
            Register::V => (flags >> 6) & 1,
            Register::Z => (flags >> 1) & 1,
            Register::C => flags & 1,
            Register::Sp => self.byte(REG_SP),
        }
    }

    /// Value a symbol holds in this vector when an execution never wrote it.
    pub fn default_value(&self, symbol: &Symbol) -> Value {
        match symbol {
            Symbol::Register(reg) => Value::Byte(self.register(*reg)),
            Symbol::Memory { address, .. } => Value::Byte(self.byte(*address)),
        }
    }
}

/// Ordered battery of vectors shared by every fragment and query in a session.
#[derive(Debug, Clone)]
pub struct TestVectorSet {
    vectors: Vec<TestVector>,
    identity: String,
}

impl TestVectorSet {
    /// Fill vectors first, then pseudo-random ones seeded 1, 2, ... in order.
    pub fn generate(config: &VectorConfig) -> Self {
        let mut vectors: Vec<TestVector> =
            config.fills.iter().take(config.count).map(|&fill| TestVector::fill(fill)).collect();
        let mut seed = 1u32;
        while vectors.len() < config.count {
            let mut rng = XorShift32::new(seed);
            vectors.push(TestVector::random(&mut rng, seed));
            seed += 1;
        }
        let identity = Self::digest(&vectors);
        Self { vectors, identity }
    }

    fn digest(vectors: &[TestVector]) -> String {
        let mut hasher = Sha256::new();
        hasher.update((vectors.len() as u64).to_le_bytes());
        for vector in vectors {
            hasher.update(vector.memory());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Hex SHA-256 over the vector count and every memory image.
    ///
    /// Fingerprints from sets with different identities are never compared.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TestVector> {
        self.vectors.iter()
    }
}

impl Default for TestVectorSet {
    fn default() -> Self {
        Self::generate(&VectorConfig::default())
    }
}

impl<'a> IntoIterator for &'a TestVectorSet {
    type Item = &'a TestVector;
    type IntoIter = std::slice::Iter<'a, TestVector>;

    fn into_iter(self) -> Self::IntoIter {
        self.vectors.iter()
    }
}
