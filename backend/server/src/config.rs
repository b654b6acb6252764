//! Application configuration loaded from environment variables.

use crate::errors::{Result, ServerError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Chain ingestion settings; `None` when `CONTRACT_ID` is unset
    pub chain: Option<ChainConfig>,
}

/// Settings for the on-chain contribution indexer.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Soroban RPC endpoint (e.g. https://soroban-testnet.stellar.org)
    pub rpc_url: String,
    /// Campaign contract address (Strkey format)
    pub contract_id: String,
    /// How often (in seconds) to poll the RPC for new events
    pub poll_interval_secs: u64,
    /// Maximum number of events to fetch per RPC request
    pub events_per_page: u32,
    /// Ledger to start from if no cursor is saved
    pub start_ledger: u32,
    /// Decimal places of the on-chain asset; raw integer amounts are scaled down by this
    pub amount_decimals: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let chain = match env_var("CONTRACT_ID") {
            Ok(contract_id) => Some(ChainConfig {
                rpc_url: env_var("RPC_URL")
                    .unwrap_or_else(|_| "https://soroban-testnet.stellar.org".to_string()),
                contract_id,
                poll_interval_secs: parse_or("POLL_INTERVAL_SECS", 5)?,
                events_per_page: parse_or("EVENTS_PER_PAGE", 100)?,
                start_ledger: parse_or("START_LEDGER", 0)?,
                amount_decimals: parse_or("CHAIN_AMOUNT_DECIMALS", 7)?,
            }),
            Err(_) => None,
        };

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./gated_funding.db".to_string()),
            api_port: parse_or("API_PORT", 3001)?,
            chain,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServerError::Config(format!("Missing env var: {key}")))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ServerError::Config(format!("Invalid {key}"))),
        Err(_) => Ok(default),
    }
}
