use thiserror::Error;

/// Reasons a chain (or a block offered to it) is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("snapshot contains no blocks")]
    EmptySnapshot,

    #[error("block #{index} does not reference its predecessor's digest")]
    BrokenLink { index: usize },

    #[error("block #{index} digest does not match its contents")]
    DigestMismatch { index: usize },

    #[error("block #{index} digest does not meet difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: u32 },
}

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("mining worker is not running")]
    WorkerStopped,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
