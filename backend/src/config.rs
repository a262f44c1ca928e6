//! Application configuration loaded from environment variables.
//!
//! Required: `ENTRANCE_FEE`, and either `HMAC_SECRET` or `HMAC_SECRET_PATH`
//! Optional: `DRAW_INTERVAL_SECS`, `KEY_HASH`, `SUBSCRIPTION_ID`,
//!           `CALLBACK_GAS_LIMIT`, `COORDINATOR_ID`, `MAX_NUM_WORDS`,
//!           `MAX_CALLBACK_GAS_LIMIT`, `BLOCK_TIME_MS`, `KEEPER_POLL_MS`,
//!           `HTTP_PORT`

use anyhow::{Context, Result};
use raffle::{RandomnessParams, RoundConfig};
use std::env::VarError;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration for the raffle backend.
#[derive(Clone)]
pub struct AppConfig {
    /// Minimum payment accepted per entry.
    pub entrance_fee: u64,
    /// Minimum time between two draws.
    pub draw_interval: Duration,
    /// Key / gas lane the raffle requests randomness through.
    pub key_hash: String,
    /// Coordinator subscription that pays for the raffle's requests.
    pub subscription_id: u64,
    /// Callback budget passed with each request.
    pub callback_gas_limit: u32,
    /// Identity the coordinator uses when delivering random words.
    pub coordinator_id: String,
    /// Secret key for HMAC-SHA256 randomness generation.
    pub hmac_secret: Vec<u8>,
    /// Maximum number of words the coordinator serves per request.
    pub max_num_words: u32,
    /// Maximum callback budget the coordinator accepts.
    pub max_callback_gas_limit: u32,
    /// Simulated time per confirmation before a request is answered.
    pub block_time: Duration,
    /// How often the keeper probes for upkeep.
    pub keeper_poll_interval: Duration,
    /// HTTP server port.
    pub http_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let entrance_fee = std::env::var("ENTRANCE_FEE")
            .context("ENTRANCE_FEE env var must be set")?;
        let entrance_fee = entrance_fee
            .parse::<u64>()
            .with_context(|| format!("invalid ENTRANCE_FEE: {entrance_fee}"))?;

        let hmac_secret = hmac_secret(std::env::var("HMAC_SECRET"))?;

        let key_hash = std::env::var("KEY_HASH").unwrap_or_else(|_| "default-lane".into());
        let coordinator_id =
            std::env::var("COORDINATOR_ID").unwrap_or_else(|_| "vrf-coordinator".into());

        Ok(Self {
            entrance_fee,
            draw_interval: Duration::from_secs(env_or("DRAW_INTERVAL_SECS", 30)?),
            key_hash,
            subscription_id: env_or("SUBSCRIPTION_ID", 1)?,
            callback_gas_limit: env_or("CALLBACK_GAS_LIMIT", 500_000)?,
            coordinator_id,
            hmac_secret,
            max_num_words: env_or("MAX_NUM_WORDS", 10)?,
            max_callback_gas_limit: env_or("MAX_CALLBACK_GAS_LIMIT", 2_500_000)?,
            block_time: Duration::from_millis(env_or("BLOCK_TIME_MS", 400)?),
            keeper_poll_interval: Duration::from_millis(env_or("KEEPER_POLL_MS", 1_000)?),
            http_port: env_or("HTTP_PORT", 8080)?,
        })
    }

    /// Raffle configuration derived from the environment.
    pub fn round_config(&self) -> RoundConfig {
        RoundConfig {
            entrance_fee: self.entrance_fee,
            interval: self.draw_interval,
            randomness: RandomnessParams {
                key_hash: self.key_hash.clone(),
                subscription_id: self.subscription_id,
                callback_gas_limit: self.callback_gas_limit,
            },
            coordinator: self.coordinator_id.clone(),
        }
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            entrance_fee: 100,
            draw_interval: Duration::from_secs(30),
            key_hash: "test-lane".into(),
            subscription_id: 1,
            callback_gas_limit: 500_000,
            coordinator_id: "vrf-coordinator".into(),
            hmac_secret: b"test-secret".to_vec(),
            max_num_words: 10,
            max_callback_gas_limit: 2_500_000,
            block_time: Duration::from_millis(400),
            keeper_poll_interval: Duration::from_secs(1),
            http_port: 8080,
        }
    }
}

/// Resolve the HMAC secret from `HMAC_SECRET`, or from the file named by
/// `HMAC_SECRET_PATH` when the former is not set at all.
fn hmac_secret(inline: Result<String, VarError>) -> Result<Vec<u8>> {
    let secret = match inline {
        Ok(secret) => secret.into_bytes(),
        Err(e @ VarError::NotUnicode(_)) => {
            return Err(e).context("HMAC_SECRET must be valid UTF-8");
        }
        Err(VarError::NotPresent) => {
            let path = std::env::var("HMAC_SECRET_PATH")
                .context("HMAC_SECRET or HMAC_SECRET_PATH env var must be set")?;
            let path = shellexpand::tilde(&path).to_string();
            std::fs::read(&path)
                .with_context(|| format!("failed to read HMAC secret from {path}"))?
        }
    };
    anyhow::ensure!(!secret.is_empty(), "HMAC secret must not be empty");
    Ok(secret)
}

/// Parse an optional variable, falling back to `default` when unset.
///
/// A variable that is set but malformed is an error rather than silently
/// replaced by the default.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid {name}: {raw}")),
        Err(VarError::NotPresent) => Ok(default),
        Err(e) => Err(e).with_context(|| format!("invalid {name}")),
    }
}
