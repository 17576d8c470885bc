//! Work packages handed to miners and the solutions coming back.

use std::fmt;
use std::sync::Arc;

use lyra2_primitives::{difficulty_to_target, BlockNumber, H256};

/// Eight-byte block nonce, big-endian encoding of a `u64`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockNonce(pub [u8; 8]);

impl BlockNonce {
    pub fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for BlockNonce {
    fn from(n: u64) -> Self {
        BlockNonce(n.to_be_bytes())
    }
}

impl fmt::Debug for BlockNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Immutable snapshot of a block template, as exported to miners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkPackage {
    /// Seal hash of the header (what the PoW is computed over)
    pub pow_hash: H256,
    /// Encoded header without seal
    pub header: Vec<u8>,
    /// Boundary condition: 2^256 / difficulty
    pub target: H256,
    /// Height of the block being mined
    pub number: BlockNumber,
}

impl WorkPackage {
    pub fn new(pow_hash: H256, header: Vec<u8>, target: H256, number: BlockNumber) -> Self {
        Self { pow_hash, header, target, number }
    }

    /// Build a package from a difficulty instead of an explicit target.
    pub fn with_difficulty(
        pow_hash: H256,
        header: Vec<u8>,
        difficulty: u128,
        number: BlockNumber,
    ) -> Self {
        Self::new(pow_hash, header, difficulty_to_target(difficulty), number)
    }

    /// The external representation:
    ///
    /// - `[0]` 32 bytes hex encoded pow-hash
    /// - `[1]` hex encoded header
    /// - `[2]` 32 bytes hex encoded target
    /// - `[3]` hex encoded block number
    pub fn to_work(&self) -> [String; 4] {
        [
            encode_hex(self.pow_hash.as_bytes()),
            encode_hex(&self.header),
            encode_hex(self.target.as_bytes()),
            format!("{:#x}", self.number),
        ]
    }
}

/// Proof submitted for a work package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Seal {
    pub nonce: BlockNonce,
    pub mix_digest: H256,
}

/// A work package together with an accepted seal, ready for import.
#[derive(Clone, Debug)]
pub struct SealedBlock {
    pub work: Arc<WorkPackage>,
    pub seal: Seal,
}

impl SealedBlock {
    pub fn number(&self) -> BlockNumber {
        self.work.number
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
