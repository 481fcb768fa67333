//! Account Oracle
//!
//! The crate's only window onto live chain state. Builders use it to fetch
//! the freshness anchor at the last possible moment; the recovery planner
//! uses it for per-address account state and fee estimation. Every non-2xx
//! response and every parse failure is a hard `ExternalOracle` error; an
//! oracle never reports a silent zero balance.

pub mod retry;

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::commitment::ANCHOR_LEN;
use crate::error::{MeridianError, MeridianResult};
use crate::log_debug;

pub use retry::RetryPolicy;

/// On-chain state of a single account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    /// Next usable sequence/nonce for the account
    pub sequence: u64,
    /// Spendable balance in base units
    pub balance: u128,
}

/// Read-only view of chain state
pub trait AccountOracle: Send + Sync {
    /// Sequence and balance for an address
    fn get_account_state(
        &self,
        address: &str,
    ) -> impl Future<Output = MeridianResult<AccountState>> + Send;

    /// A fresh 32-byte anchor. Anchors expire within minutes; callers fetch
    /// one immediately before freezing a transaction and never cache it.
    fn get_freshness_anchor(&self) -> impl Future<Output = MeridianResult<[u8; ANCHOR_LEN]>> + Send;

    /// Current flat fee in base units
    fn estimate_fee(&self) -> impl Future<Output = MeridianResult<u128>> + Send;
}

/// Oracle endpoint and behavior, explicit at construction
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OracleConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP-backed oracle
///
/// Endpoints:
/// - `GET {base_url}/anchor`            -> `{ "block_hash": "<base58>" }`
/// - `GET {base_url}/account/{address}` -> `{ "sequence": N, "balance": "<decimal>" }`
/// - `GET {base_url}/fee`               -> `{ "fee": "<decimal>" }`
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

#[derive(Deserialize)]
struct AnchorResponse {
    block_hash: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    sequence: u64,
    balance: String,
}

#[derive(Deserialize)]
struct FeeResponse {
    fee: String,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> MeridianResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MeridianError::oracle(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> MeridianResult<T> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MeridianError::oracle(format!(
                "GET {} returned {}",
                url, status
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| MeridianError::oracle(format!("GET {} returned unparseable body: {}", url, e)))
    }
}

impl AccountOracle for HttpOracle {
    async fn get_account_state(&self, address: &str) -> MeridianResult<AccountState> {
        let path = format!("account/{}", address);
        let body: AccountResponse = self
            .config
            .retry
            .run(|| self.get_json(&path))
            .await?;
        let balance = body
            .balance
            .parse::<u128>()
            .map_err(|_| MeridianError::oracle(format!("bad balance string {:?}", body.balance)))?;
        log_debug!(
            "oracle",
            "fetched account state",
            address = address,
            sequence = body.sequence,
            balance = balance
        );
        Ok(AccountState {
            sequence: body.sequence,
            balance,
        })
    }

    async fn get_freshness_anchor(&self) -> MeridianResult<[u8; ANCHOR_LEN]> {
        let body: AnchorResponse = self
            .config
            .retry
            .run(|| self.get_json("anchor"))
            .await?;
        let raw = bs58::decode(&body.block_hash)
            .into_vec()
            .map_err(|e| MeridianError::oracle(format!("anchor is not base58: {}", e)))?;
        let anchor: [u8; ANCHOR_LEN] = raw.as_slice().try_into().map_err(|_| {
            MeridianError::oracle(format!(
                "anchor must decode to {} bytes, got {}",
                ANCHOR_LEN,
                raw.len()
            ))
        })?;
        Ok(anchor)
    }

    async fn estimate_fee(&self) -> MeridianResult<u128> {
        let body: FeeResponse = self.config.retry.run(|| self.get_json("fee")).await?;
        body.fee
            .parse::<u128>()
            .map_err(|_| MeridianError::oracle(format!("bad fee string {:?}", body.fee)))
    }
}
