//! Recovery Planner
//!
//! Rebuilds access to funds on the bank chain without a live wallet service.
//! The planner walks a bounded range of unhardened derivation indices,
//! queries account state for each derived address with bounded concurrency,
//! and emits one sweep transfer per funded address. With private material it
//! returns broadcast-ready transactions; with public-only material it returns
//! unsigned bytes plus everything an external signer needs to verify what it
//! is signing.
//!
//! Index 0 is the base address and is never scanned.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{MeridianError, MeridianResult};
use crate::keys::{derivation, SigningKeyMaterial};
use crate::oracle::{AccountOracle, AccountState};
use crate::tx::TransferBuilder;
use crate::{log_info, log_warn};

/// Indices scanned when the caller gives no explicit end
pub const DEFAULT_SCAN_WINDOW: u32 = 20;

/// Hard ceiling on `end - start`: ten default windows
pub const MAX_SCAN_RANGE: u32 = 10 * DEFAULT_SCAN_WINDOW;

/// Concurrent in-flight oracle queries during a scan
const SCAN_CONCURRENCY: usize = 8;

/// Whether the planner signs the sweeps it builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Sign with the planner's key material; output is broadcast-ready
    Signed,
    /// Leave unsigned; output carries the digest and derivation metadata
    /// for an external signer
    Unsigned,
}

/// Scan parameters. `starting_scan_index` defaults to 1 and
/// `ending_scan_index` to one default window past the start; the range is
/// half-open, `[start, end)`.
#[derive(Debug, Clone)]
pub struct RecoveryParams {
    pub destination: String,
    pub chain_id: String,
    pub mode: RecoveryMode,
    pub starting_scan_index: Option<u32>,
    pub ending_scan_index: Option<u32>,
}

/// One sweep transfer for one funded scan address
#[derive(Debug, Clone)]
pub struct RecoveredTransaction {
    pub scan_index: u32,
    pub address: String,
    pub derivation_path: String,
    pub sequence: u64,
    pub fee: u128,
    pub amount: u128,
    pub chain_id: String,
    /// Hex of the 32-byte digest an external signer must sign
    pub digest: String,
    pub payload: RecoveredPayload,
}

/// Serialized form of a recovered transaction
#[derive(Debug, Clone)]
pub enum RecoveredPayload {
    Signed { broadcast: Vec<u8>, tx_id: String },
    Unsigned { unsigned_hex: String },
}

/// Outcome of a scan. `last_scan_index` is the last index actually scanned,
/// so a follow-up scan resumes at `last_scan_index + 1`.
#[derive(Debug)]
pub struct RecoveryReport {
    pub transactions: Vec<RecoveredTransaction>,
    pub last_scan_index: u32,
    pub failed_indices: Vec<u32>,
}

/// Plans and builds sweep transactions over a derivation-index range
pub struct RecoveryPlanner<O> {
    oracle: Arc<O>,
    material: SigningKeyMaterial,
}

impl<O: AccountOracle + 'static> RecoveryPlanner<O> {
    pub fn new(oracle: Arc<O>, material: SigningKeyMaterial) -> Self {
        Self { oracle, material }
    }

    /// Scan the range and build one sweep per funded address
    pub async fn recover(&self, params: &RecoveryParams) -> MeridianResult<RecoveryReport> {
        let start = params.starting_scan_index.unwrap_or(1);
        let end = params
            .ending_scan_index
            .unwrap_or_else(|| start.saturating_add(DEFAULT_SCAN_WINDOW));
        check_bounds(start, end)?;

        if params.mode == RecoveryMode::Signed && !self.material.can_sign() {
            return Err(MeridianError::validation(
                "signed recovery requires private key material",
            ));
        }
        crate::codec::bank::validate_address(&params.destination, "destination")?;

        log_info!(
            "recovery",
            "starting scan",
            start = start,
            end = end,
            destination = params.destination
        );

        let fee = self.oracle.estimate_fee().await?;
        let states = self.scan_range(start, end).await?;

        let single_address = end - start == 1;
        let mut transactions = Vec::new();
        let mut failed_indices = Vec::new();

        for (index, address, public_key, state) in states {
            let state = match state {
                Ok(state) => state,
                Err(err) if single_address => return Err(err),
                Err(err) => {
                    log_warn!(
                        "recovery",
                        "address query failed, skipping index",
                        index = index,
                        error = err
                    );
                    failed_indices.push(index);
                    continue;
                }
            };

            // A balance that cannot cover its own sweep fee is not worth
            // a transaction
            if state.balance <= fee {
                continue;
            }

            let tx = self
                .build_sweep(params, index, &address, &public_key, state, fee)
                .await?;
            transactions.push(tx);
        }

        if transactions.is_empty() {
            return Err(MeridianError::no_funds_found(
                "Did not find an address with funds to recover",
            ));
        }

        log_info!(
            "recovery",
            "scan complete",
            funded = transactions.len(),
            failed = failed_indices.len(),
            last_scan_index = end - 1
        );

        Ok(RecoveryReport {
            transactions,
            last_scan_index: end - 1,
            failed_indices,
        })
    }

    /// Query account state for every index in `[start, end)` with bounded
    /// concurrency; results come back in index order
    async fn scan_range(
        &self,
        start: u32,
        end: u32,
    ) -> MeridianResult<Vec<(u32, String, Vec<u8>, MeridianResult<AccountState>)>> {
        let semaphore = Arc::new(Semaphore::new(SCAN_CONCURRENCY));
        let mut handles: Vec<(u32, String, Vec<u8>, JoinHandle<MeridianResult<AccountState>>)> =
            Vec::with_capacity((end - start) as usize);

        for index in start..end {
            let (_, public_key) = derivation::derive_scan_key(&self.material, index)?;
            let address = derivation::bank_address(&public_key)?;

            let oracle = Arc::clone(&self.oracle);
            let semaphore = Arc::clone(&semaphore);
            let task_address = address.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| MeridianError::internal("scan semaphore closed"))?;
                oracle.get_account_state(&task_address).await
            });
            handles.push((index, address, public_key, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, address, public_key, handle) in handles {
            let state = handle
                .await
                .map_err(|e| MeridianError::internal(format!("scan task panicked: {}", e)))?;
            results.push((index, address, public_key, state));
        }
        Ok(results)
    }

    async fn build_sweep(
        &self,
        params: &RecoveryParams,
        index: u32,
        address: &str,
        public_key: &[u8],
        state: AccountState,
        fee: u128,
    ) -> MeridianResult<RecoveredTransaction> {
        let amount = state.balance - fee;
        let mut tx = TransferBuilder::new()
            .sender(address)?
            .recipient(&params.destination)?
            .amount(amount)
            .fee(fee)
            .sequence(state.sequence)
            .chain_id(&params.chain_id)
            .public_key(public_key)?
            .build()?;

        let digest = hex::encode(tx.digest());
        let payload = match params.mode {
            RecoveryMode::Signed => {
                let child = self.material.derive_child(index)?;
                let full = child.sign_digest(&tx.digest())?;
                // Bank signatures are compact r || s
                tx.add_signature(&full[..64])?;
                let broadcast = tx.to_broadcast_format()?;
                let tx_id = tx
                    .id()?
                    .ok_or_else(|| MeridianError::internal("signed transaction has no id"))?;
                RecoveredPayload::Signed { broadcast, tx_id }
            }
            RecoveryMode::Unsigned => RecoveredPayload::Unsigned {
                unsigned_hex: tx.unsigned_hex(),
            },
        };

        Ok(RecoveredTransaction {
            scan_index: index,
            address: address.to_string(),
            derivation_path: derivation::scan_path(index),
            sequence: state.sequence,
            fee,
            amount,
            chain_id: params.chain_id.clone(),
            digest,
            payload,
        })
    }
}

fn check_bounds(start: u32, end: u32) -> MeridianResult<()> {
    if start < 1 {
        return Err(MeridianError::bounds(
            "scan cannot include index 0, the base address",
        ));
    }
    if end <= start {
        return Err(MeridianError::bounds(format!(
            "scan range [{}, {}) is empty",
            start, end
        )));
    }
    if end - start > MAX_SCAN_RANGE {
        return Err(MeridianError::bounds(format!(
            "scan range of {} exceeds the ceiling of {}",
            end - start,
            MAX_SCAN_RANGE
        )));
    }
    Ok(())
}
