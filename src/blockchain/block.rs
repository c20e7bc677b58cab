use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single block in the ledger: an opaque payload chained to its
/// predecessor by digest and sealed by Proof-of-Work.
///
/// Fields are private so that nothing outside this module can change a
/// block after it has been mined; the only way to obtain a block with
/// arbitrary contents is [`Block::from_record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    digest: String,
    predecessor_digest: String,
    payload: String,
    nonce: u64,
    timestamp: i64, // Unix timestamp (UTC)
}

/// Exported, serializable view of a block. This is the shape handed to
/// peers and HTTP clients, one per block in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub digest: String,
    pub predecessor_digest: String,
    pub payload: String,
    pub nonce: u64,
    pub timestamp: i64,
}

/// Compute the SHA-256 digest of a block's fields as lowercase hex.
///
/// Text fields are length-prefixed (u64, little-endian) so that no two
/// distinct `(predecessor_digest, payload)` pairs share a preimage; the
/// nonce and timestamp follow as fixed-width little-endian integers.
pub fn digest_of(predecessor_digest: &str, payload: &str, nonce: u64, timestamp: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update((predecessor_digest.len() as u64).to_le_bytes());
    hasher.update(predecessor_digest.as_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(payload.as_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// True when `digest` starts with `difficulty` hex zeros.
pub fn meets_difficulty(digest: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    digest.len() >= difficulty && digest.bytes().take(difficulty).all(|b| b == b'0')
}

impl Block {
    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(payload: impl Into<String>, predecessor_digest: impl Into<String>) -> Self {
        Self::from_parts(predecessor_digest, payload, 0, Utc::now().timestamp())
    }

    /// Rebuild a block from its raw fields, computing a fresh digest.
    pub fn from_parts(
        predecessor_digest: impl Into<String>,
        payload: impl Into<String>,
        nonce: u64,
        timestamp: i64,
    ) -> Self {
        let mut block = Self {
            digest: String::new(),
            predecessor_digest: predecessor_digest.into(),
            payload: payload.into(),
            nonce,
            timestamp,
        };
        block.digest = block.compute_digest();
        block
    }

    /// Rebuild a block from an exported record, keeping the recorded digest
    /// as-is. A record whose fields were altered after export yields a block
    /// that fails [`Block::is_consistent`].
    pub fn from_record(record: BlockRecord) -> Self {
        Self {
            digest: record.digest,
            predecessor_digest: record.predecessor_digest,
            payload: record.payload,
            nonce: record.nonce,
            timestamp: record.timestamp,
        }
    }

    pub fn to_record(&self) -> BlockRecord {
        BlockRecord {
            digest: self.digest.clone(),
            predecessor_digest: self.predecessor_digest.clone(),
            payload: self.payload.clone(),
            nonce: self.nonce,
            timestamp: self.timestamp,
        }
    }

    /// Recompute the digest from the current fields (ignores the cached one).
    pub fn compute_digest(&self) -> String {
        digest_of(
            &self.predecessor_digest,
            &self.payload,
            self.nonce,
            self.timestamp,
        )
    }

    /// Perform Proof-of-Work: starting from the current nonce, bump it until
    /// the digest starts with `difficulty` leading zeros (in hex).
    ///
    /// There is no upper bound on the number of attempts.
    pub fn mine(&mut self, difficulty: u32) {
        let target_prefix = "0".repeat(difficulty as usize);
        while !self.digest.starts_with(&target_prefix) {
            self.nonce = self.nonce.wrapping_add(1);
            self.digest = self.compute_digest();
        }
    }

    /// Cached digest matches the block's contents.
    pub fn is_consistent(&self) -> bool {
        self.digest == self.compute_digest()
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        meets_difficulty(&self.digest, difficulty)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn predecessor_digest(&self) -> &str {
        &self.predecessor_digest
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, BlockRecord, digest_of, meets_difficulty};

    #[test]
    fn digest_is_deterministic() {
        let a = digest_of("prev", "Test data", 7, 1_700_000_000);
        let b = digest_of("prev", "Test data", 7, 1_700_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn every_field_feeds_the_digest() {
        let base = digest_of("prev", "data", 1, 100);
        assert_ne!(base, digest_of("prev2", "data", 1, 100));
        assert_ne!(base, digest_of("prev", "data2", 1, 100));
        assert_ne!(base, digest_of("prev", "data", 2, 100));
        assert_ne!(base, digest_of("prev", "data", 1, 101));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(digest_of("ab", "c", 0, 0), digest_of("a", "bc", 0, 0));
    }

    #[test]
    fn new_block_has_consistent_digest() {
        let b = Block::new("Test data", "0");
        assert_eq!(b.nonce(), 0);
        assert_eq!(b.digest(), b.compute_digest());
        assert!(b.is_consistent());
    }

    #[test]
    fn mining_produces_leading_zeros() {
        let mut b = Block::new("payload", "prev");
        b.mine(2);
        assert!(b.digest().starts_with("00"));
        assert!(b.meets_difficulty(2));
        assert!(b.is_consistent());
    }

    #[test]
    fn zero_difficulty_leaves_nonce_untouched() {
        let mut b = Block::new("payload", "prev");
        let before = b.digest().to_string();
        b.mine(0);
        assert_eq!(b.nonce(), 0);
        assert_eq!(b.digest(), before);
    }

    #[test]
    fn mining_resumes_from_current_nonce() {
        let mut b = Block::from_parts("prev", "payload", 500, 1_700_000_000);
        b.mine(1);
        assert!(b.nonce() >= 500);
        assert!(b.meets_difficulty(1));
    }

    #[test]
    fn difficulty_predicate() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn record_keeps_stale_digest() {
        let mut b = Block::new("original", "prev");
        b.mine(1);
        let mut record = b.to_record();
        assert_eq!(Block::from_record(record.clone()), b);

        record.payload = "Tampered".into();
        let tampered = Block::from_record(record);
        assert!(!tampered.is_consistent());
    }

    #[test]
    fn rebuilding_from_fields_reproduces_digest() {
        let mut b = Block::new("round trip", "prev");
        b.mine(1);
        let BlockRecord {
            digest,
            predecessor_digest,
            payload,
            nonce,
            timestamp,
        } = b.to_record();
        let rebuilt = Block::from_parts(predecessor_digest, payload, nonce, timestamp);
        assert_eq!(rebuilt.digest(), digest);
    }
}
