use std::env;
use std::str::FromStr;

use crate::blockchain::DEFAULT_DIFFICULTY;
use crate::error::ConfigError;

/// Runtime settings for a node, read from the environment (after `.env`
/// has been loaded) with optional positional overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub host: String,
    pub rest_port: u16,
    pub p2p_port: u16,
    pub difficulty: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            rest_port: 8080,
            p2p_port: 6000,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }
}

impl NodeConfig {
    /// Build from process environment and command line:
    /// `pow_ledger [<p2p_port> <rest_port>]`.
    pub fn load() -> Result<Self, ConfigError> {
        let args: Vec<String> = env::args().skip(1).collect();
        Self::from_sources(|key| env::var(key).ok(), &args)
    }

    /// Same as [`NodeConfig::load`] with the sources injected.
    pub fn from_sources<F>(lookup: F, args: &[String]) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            rest_port: parse_or("PORT", lookup("PORT"), defaults.rest_port)?,
            p2p_port: parse_or("P2P_PORT", lookup("P2P_PORT"), defaults.p2p_port)?,
            difficulty: parse_or("DIFFICULTY", lookup("DIFFICULTY"), defaults.difficulty)?,
        };

        if let Some(p2p) = args.first() {
            config.p2p_port = parse("p2p_port", p2p)?;
        }
        if let Some(rest) = args.get(1) {
            config.rest_port = parse("rest_port", rest)?;
        }
        Ok(config)
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(v) => parse(key, &v),
        None => Ok(default),
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
