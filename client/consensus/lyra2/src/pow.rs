//! Proof-of-work seam.
//!
//! The sealer only needs to recompute a proof for a given pow-hash and nonce.
//! The production LYRA2 hash plugs in behind [`PowAlgorithm`]; [`Blake3Pow`]
//! is a cheap stand-in used by the dev node and tests.

use lyra2_primitives::{hash_meets_target, H256};

use crate::work::{BlockNonce, Seal, WorkPackage};

/// Output of one PoW evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PowOutput {
    /// Digest the miner has to present alongside the nonce
    pub mix_digest: H256,
    /// Value compared against the target
    pub result: H256,
}

pub trait PowAlgorithm: Send + Sync {
    fn compute(&self, pow_hash: &H256, nonce: BlockNonce) -> PowOutput;

    /// Recompute the proof and check both the mix digest and the target.
    fn verify(&self, work: &WorkPackage, seal: &Seal) -> bool {
        let out = self.compute(&work.pow_hash, seal.nonce);
        out.mix_digest == seal.mix_digest && hash_meets_target(&out.result, &work.target)
    }
}

/// Blake3 PoW: `mix = blake3(pow_hash || nonce)`, `result = blake3(mix || pow_hash)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Pow;

impl PowAlgorithm for Blake3Pow {
    fn compute(&self, pow_hash: &H256, nonce: BlockNonce) -> PowOutput {
        let mut hasher = blake3::Hasher::new();
        hasher.update(pow_hash.as_bytes());
        hasher.update(&nonce.0);
        let mix_digest = H256::from(*hasher.finalize().as_bytes());

        let mut hasher = blake3::Hasher::new();
        hasher.update(mix_digest.as_bytes());
        hasher.update(pow_hash.as_bytes());
        let result = H256::from(*hasher.finalize().as_bytes());

        PowOutput { mix_digest, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra2_primitives::difficulty_to_target;

    fn work(difficulty: u128) -> WorkPackage {
        WorkPackage::with_difficulty(H256::repeat_byte(0x42), vec![1, 2, 3], difficulty, 1)
    }

    #[test]
    fn test_compute_is_deterministic() {
        let pow = Blake3Pow;
        let a = pow.compute(&H256::repeat_byte(1), BlockNonce::from(9));
        let b = pow.compute(&H256::repeat_byte(1), BlockNonce::from(9));
        let c = pow.compute(&H256::repeat_byte(1), BlockNonce::from(10));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.mix_digest, a.result);
    }

    #[test]
    fn test_verify_accepts_correct_digest() {
        let pow = Blake3Pow;
        let work = work(1);
        let nonce = BlockNonce::from(42);
        let mix_digest = pow.compute(&work.pow_hash, nonce).mix_digest;
        assert!(pow.verify(&work, &Seal { nonce, mix_digest }));
    }

    #[test]
    fn test_verify_rejects_wrong_digest() {
        let pow = Blake3Pow;
        let work = work(1);
        let seal = Seal { nonce: BlockNonce::from(42), mix_digest: H256::zero() };
        assert!(!pow.verify(&work, &seal));
    }

    #[test]
    fn test_verify_rejects_result_above_target() {
        let pow = Blake3Pow;
        let mut work = work(1);
        let nonce = BlockNonce::from(42);
        let out = pow.compute(&work.pow_hash, nonce);

        // zero target cannot be met
        work.target = H256::zero();
        assert!(!pow.verify(&work, &Seal { nonce, mix_digest: out.mix_digest }));

        work.target = out.result;
        assert!(pow.verify(&work, &Seal { nonce, mix_digest: out.mix_digest }));
    }

    #[test]
    fn test_search_finds_solution_for_low_difficulty() {
        let pow = Blake3Pow;
        let work = WorkPackage { target: difficulty_to_target(16), ..work(1) };
        let found = (0u64..10_000).map(BlockNonce::from).find(|nonce| {
            let out = pow.compute(&work.pow_hash, *nonce);
            pow.verify(&work, &Seal { nonce: *nonce, mix_digest: out.mix_digest })
        });
        assert!(found.is_some());
    }
}
