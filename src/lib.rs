//! Append-only ledger secured by Proof-of-Work, plus the node glue around
//! it: a background mining worker, a peer broadcast hub and a JSON API.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod miner;
pub mod network;
