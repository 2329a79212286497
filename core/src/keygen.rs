//! Runtime key generation.
//!
//! RULE: Runtime keys are only minted here.
//! A save system owns exactly one KeyGenerator. In production it draws
//! from the platform RNG (uuid v4). Tests and replay tooling seed it,
//! which makes every generated key reproducible from the seed alone:
//!   - Same seed, same sequence of classify() calls, same keys.
//!   - Seeded keys are still well-formed v4 UUIDs and never nil.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use uuid::{Builder, Uuid};

/// Mixed into the seed so key streams never line up with other Pcg streams
/// seeded from the same value.
const KEY_STREAM_SALT: u64 = 0x6b65_795f_7374_726d;

pub struct KeyGenerator {
    seeded: Option<Pcg64Mcg>,
}

impl KeyGenerator {
    pub fn random() -> Self {
        Self { seeded: None }
    }

    pub fn seeded(seed: u64) -> Self {
        let derived_seed = seed ^ KEY_STREAM_SALT.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self { seeded: Some(Pcg64Mcg::seed_from_u64(derived_seed)) }
    }

    /// Seeded when a seed is configured, random otherwise.
    pub fn from_config(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::random, Self::seeded)
    }

    pub fn is_deterministic(&self) -> bool {
        self.seeded.is_some()
    }

    /// Mint a fresh runtime key.
    pub fn next_key(&mut self) -> Uuid {
        match &mut self.seeded {
            Some(rng) => {
                let mut bytes = [0u8; 16];
                rng.fill_bytes(&mut bytes);
                Builder::from_random_bytes(bytes).into_uuid()
            }
            None => Uuid::new_v4(),
        }
    }
}

impl Default for KeyGenerator {
    fn default() -> Self { Self::random() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_keys() {
        let mut a = KeyGenerator::seeded(12345);
        let mut b = KeyGenerator::seeded(12345);
        for _ in 0..50 {
            assert_eq!(a.next_key(), b.next_key());
        }
    }

    #[test]
    fn seeded_keys_are_v4_and_distinct() {
        let mut keys = KeyGenerator::seeded(7);
        let first = keys.next_key();
        let second = keys.next_key();
        assert_ne!(first, second);
        assert!(!first.is_nil());
        assert_eq!(first.get_version_num(), 4);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = KeyGenerator::seeded(1);
        let mut b = KeyGenerator::seeded(2);
        assert_ne!(a.next_key(), b.next_key());
    }
}
