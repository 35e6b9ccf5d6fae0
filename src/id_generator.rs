use num_bigint::{BigUint, RandBigInt};
use rand::{rngs::StdRng, SeedableRng};

use crate::{circular_id::Id, error::Result};

/// Source of node ids.
pub trait IdGenerator {
	fn generate(&mut self, bit_count: usize) -> Result<Id>;
}

/// Uniformly random ids, optionally XORed with a fixed salt.
///
/// The salt is repeated until it covers `bit_count` bits. XOR with a
/// constant is a bijection, so salting keeps the output uniform.
pub struct RandomIdGenerator{
	rng: StdRng,
	salt: Vec<u8>,
}

impl RandomIdGenerator {
	pub fn new() -> Self {
		RandomIdGenerator{
			rng: StdRng::from_entropy(),
			salt: Vec::new(),
		}
	}

	/// Deterministic output, for simulations.
	pub fn from_seed(seed: u64) -> Self {
		RandomIdGenerator{
			rng: StdRng::seed_from_u64(seed),
			salt: Vec::new(),
		}
	}

	pub fn with_salt(mut self, salt: &[u8]) -> Self {
		self.salt = salt.to_vec();
		self
	}

	fn salt_value(&self, bit_count: usize) -> Option<BigUint> {
		if self.salt.is_empty() {
			return None;
		}
		let len = (bit_count + 7) / 8;
		let bytes: Vec<u8> = self.salt.iter().cycle().take(len).cloned().collect();
		Some(BigUint::from_bytes_be(&bytes))
	}
}

impl Default for RandomIdGenerator {
	fn default() -> Self {
		Self::new()
	}
}

impl IdGenerator for RandomIdGenerator {
	fn generate(&mut self, bit_count: usize) -> Result<Id> {
		let mut value = self.rng.gen_biguint(bit_count as u64);
		if let Some(salt) = self.salt_value(bit_count) {
			value ^= salt;
		}
		Id::from_biguint(bit_count, value)
	}
}
