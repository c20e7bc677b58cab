pub mod block;
pub mod model;

pub use block::{Block, BlockRecord, digest_of, meets_difficulty};
pub use model::Blockchain;

/// Default Proof-of-Work difficulty (number of leading hex zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Payload of the first block of every chain.
pub const GENESIS_PAYLOAD: &str = "Genesis Block";
