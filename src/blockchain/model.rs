use log::debug;

use super::{Block, BlockRecord, GENESIS_PAYLOAD};
use crate::error::ChainError;

/// Simple in-memory blockchain with Proof-of-Work.
///
/// The chain is never empty: construction always mines a genesis block.
#[derive(Debug, Clone)]
pub struct Blockchain {
    chain: Vec<Block>,
    difficulty: u32,
}

impl Blockchain {
    /// Initialize a new blockchain with a mined genesis block.
    pub fn new(difficulty: u32) -> Self {
        let mut genesis = Block::new(GENESIS_PAYLOAD, "");
        genesis.mine(difficulty);
        debug!("genesis sealed (digest={}, nonce={})", genesis.digest(), genesis.nonce());
        Self {
            chain: vec![genesis],
            difficulty,
        }
    }

    /// Rebuild a chain from exported records without re-sealing anything.
    /// Stored digests are kept verbatim, so the result may well be invalid;
    /// run [`Blockchain::validate`] before trusting it.
    pub fn from_snapshot(records: Vec<BlockRecord>, difficulty: u32) -> Result<Self, ChainError> {
        if records.is_empty() {
            return Err(ChainError::EmptySnapshot);
        }
        Ok(Self {
            chain: records.into_iter().map(Block::from_record).collect(),
            difficulty,
        })
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Mine and append a new block carrying `payload`. Blocks the caller
    /// until a nonce satisfying the chain difficulty is found.
    pub fn append(&mut self, payload: impl Into<String>) -> &Block {
        let mut block = self.next_candidate(payload);
        block.mine(self.difficulty);
        self.chain.push(block);
        self.last_block()
    }

    /// Build an unmined block on top of the current tip.
    pub fn next_candidate(&self, payload: impl Into<String>) -> Block {
        Block::new(payload, self.last_block().digest())
    }

    /// Append a block that was mined elsewhere. The block must extend the
    /// current tip, carry a digest matching its contents and meet the chain
    /// difficulty.
    pub fn commit(&mut self, block: Block) -> Result<&Block, ChainError> {
        let index = self.chain.len();
        if block.predecessor_digest() != self.last_block().digest() {
            return Err(ChainError::BrokenLink { index });
        }
        if !block.is_consistent() {
            return Err(ChainError::DigestMismatch { index });
        }
        if !block.meets_difficulty(self.difficulty) {
            return Err(ChainError::InsufficientWork {
                index,
                difficulty: self.difficulty,
            });
        }
        self.chain.push(block);
        Ok(self.last_block())
    }

    /// Validate linkage and digest integrity of every block.
    ///
    /// The difficulty predicate is only enforced when blocks are mined or
    /// committed; see [`Blockchain::validate_strict`] to re-check it here.
    pub fn validate(&self) -> Result<(), ChainError> {
        self.walk(false)
    }

    /// Like [`Blockchain::validate`], but also requires every block
    /// (genesis included) to meet the chain difficulty.
    pub fn validate_strict(&self) -> Result<(), ChainError> {
        self.walk(true)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn walk(&self, check_work: bool) -> Result<(), ChainError> {
        for (index, block) in self.chain.iter().enumerate() {
            // Genesis has no predecessor to link to
            if index > 0 && block.predecessor_digest() != self.chain[index - 1].digest() {
                return Err(ChainError::BrokenLink { index });
            }
            if !block.is_consistent() {
                return Err(ChainError::DigestMismatch { index });
            }
            if check_work && !block.meets_difficulty(self.difficulty) {
                return Err(ChainError::InsufficientWork {
                    index,
                    difficulty: self.difficulty,
                });
            }
        }
        Ok(())
    }

    /// Order-preserving, read-only projection of every block.
    pub fn export_snapshot(&self) -> Vec<BlockRecord> {
        self.chain.iter().map(Block::to_record).collect()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.chain.get(index)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }
}
