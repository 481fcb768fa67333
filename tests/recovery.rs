//! Recovery Planner Integration Tests
//!
//! Drives the planner against an in-memory oracle so every scan scenario is
//! deterministic: funded/empty index mixes, oracle outages, bounds abuse,
//! and the unsigned hand-off metadata an external signer needs.

use std::collections::HashMap;
use std::sync::Arc;

use meridian_core::codec::commitment::ANCHOR_LEN;
use meridian_core::error::{ErrorCode, MeridianError, MeridianResult};
use meridian_core::keys::{derivation, SigningKeyMaterial};
use meridian_core::oracle::{AccountOracle, AccountState};
use meridian_core::recovery::{
    RecoveredPayload, RecoveryMode, RecoveryParams, RecoveryPlanner, DEFAULT_SCAN_WINDOW,
    MAX_SCAN_RANGE,
};
use meridian_core::tx::TransferBuilder;

const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const FEE: u128 = 1_000;

/// Balances keyed by address; addresses absent from the map read as empty,
/// addresses in `failing` error out
struct MockOracle {
    balances: HashMap<String, AccountState>,
    failing: Vec<String>,
}

impl MockOracle {
    fn new() -> Self {
        Self {
            balances: HashMap::new(),
            failing: Vec::new(),
        }
    }

    fn fund(&mut self, address: &str, balance: u128, sequence: u64) {
        self.balances
            .insert(address.to_string(), AccountState { sequence, balance });
    }

    fn fail(&mut self, address: &str) {
        self.failing.push(address.to_string());
    }
}

impl AccountOracle for MockOracle {
    async fn get_account_state(&self, address: &str) -> MeridianResult<AccountState> {
        if self.failing.iter().any(|a| a == address) {
            return Err(MeridianError::oracle("node unavailable"));
        }
        Ok(self
            .balances
            .get(address)
            .copied()
            .unwrap_or(AccountState {
                sequence: 0,
                balance: 0,
            }))
    }

    async fn get_freshness_anchor(&self) -> MeridianResult<[u8; ANCHOR_LEN]> {
        Ok([0x77; ANCHOR_LEN])
    }

    async fn estimate_fee(&self) -> MeridianResult<u128> {
        Ok(FEE)
    }
}

fn material() -> SigningKeyMaterial {
    SigningKeyMaterial::from_mnemonic(MNEMONIC, "").unwrap()
}

fn scan_address(material: &SigningKeyMaterial, index: u32) -> String {
    let (_, public_key) = derivation::derive_scan_key(material, index).unwrap();
    derivation::bank_address(&public_key).unwrap()
}

fn destination() -> String {
    let other = SigningKeyMaterial::from_secp256k1_bytes(&[0x99; 32]).unwrap();
    derivation::bank_address(&other.public_key().unwrap()).unwrap()
}

fn params(mode: RecoveryMode, start: u32, end: u32) -> RecoveryParams {
    RecoveryParams {
        destination: destination(),
        chain_id: "meridian-1".to_string(),
        mode,
        starting_scan_index: Some(start),
        ending_scan_index: Some(end),
    }
}

#[tokio::test]
async fn funded_indices_each_get_their_own_sweep() {
    let material = material();
    let mut oracle = MockOracle::new();
    // Indices 1 and 4 empty, 2 and 3 funded with different sequences
    oracle.fund(&scan_address(&material, 2), 500_000, 5);
    oracle.fund(&scan_address(&material, 3), 80_000, 12);

    let planner = RecoveryPlanner::new(Arc::new(oracle), material);
    let report = planner
        .recover(&params(RecoveryMode::Signed, 1, 5))
        .await
        .unwrap();

    assert_eq!(report.transactions.len(), 2);
    assert_eq!(report.last_scan_index, 4);
    assert!(report.failed_indices.is_empty());

    let first = &report.transactions[0];
    let second = &report.transactions[1];
    assert_eq!(first.scan_index, 2);
    assert_eq!(second.scan_index, 3);
    assert_eq!(first.sequence, 5);
    assert_eq!(second.sequence, 12);
    assert_eq!(first.amount, 500_000 - FEE);
    assert_eq!(second.amount, 80_000 - FEE);
    assert_eq!(first.derivation_path, "m/2");

    for tx in &report.transactions {
        match &tx.payload {
            RecoveredPayload::Signed { broadcast, tx_id } => {
                assert!(!broadcast.is_empty());
                assert_eq!(tx_id.len(), 64);
            }
            RecoveredPayload::Unsigned { .. } => panic!("expected signed sweeps"),
        }
    }
}

#[tokio::test]
async fn all_empty_range_is_an_error_not_an_empty_report() {
    let planner = RecoveryPlanner::new(Arc::new(MockOracle::new()), material());
    let err = planner
        .recover(&params(RecoveryMode::Signed, 1, 5))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoFundsFound);
}

#[tokio::test]
async fn balance_below_fee_is_not_swept() {
    let material = material();
    let mut oracle = MockOracle::new();
    // Exactly the fee: sweeping it would send zero
    oracle.fund(&scan_address(&material, 1), FEE, 0);
    oracle.fund(&scan_address(&material, 2), FEE + 1, 0);

    let planner = RecoveryPlanner::new(Arc::new(oracle), material);
    let report = planner
        .recover(&params(RecoveryMode::Signed, 1, 3))
        .await
        .unwrap();
    assert_eq!(report.transactions.len(), 1);
    assert_eq!(report.transactions[0].scan_index, 2);
    assert_eq!(report.transactions[0].amount, 1);
}

#[tokio::test]
async fn bounds_violations_are_rejected_before_any_query() {
    let planner = RecoveryPlanner::new(Arc::new(MockOracle::new()), material());

    for (start, end) in [(0, 5), (3, 3), (7, 2), (1, 2 + MAX_SCAN_RANGE)] {
        let err = planner
            .recover(&params(RecoveryMode::Signed, start, end))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Bounds, "range [{}, {})", start, end);
    }
}

#[tokio::test]
async fn default_window_scans_twenty_indices() {
    let material = material();
    let mut oracle = MockOracle::new();
    oracle.fund(&scan_address(&material, 20), 10_000, 0);

    let planner = RecoveryPlanner::new(Arc::new(oracle), material);
    let report = planner
        .recover(&RecoveryParams {
            destination: destination(),
            chain_id: "meridian-1".to_string(),
            mode: RecoveryMode::Signed,
            starting_scan_index: None,
            ending_scan_index: None,
        })
        .await
        .unwrap();

    // Default range is [1, 1 + window); index 20 is the last one in it
    assert_eq!(report.last_scan_index, DEFAULT_SCAN_WINDOW);
    assert_eq!(report.transactions.len(), 1);
    assert_eq!(report.transactions[0].scan_index, 20);
}

#[tokio::test]
async fn oracle_failure_on_one_index_is_recorded_and_skipped() {
    let material = material();
    let mut oracle = MockOracle::new();
    oracle.fund(&scan_address(&material, 1), 50_000, 2);
    oracle.fail(&scan_address(&material, 2));
    oracle.fund(&scan_address(&material, 3), 60_000, 0);

    let planner = RecoveryPlanner::new(Arc::new(oracle), material);
    let report = planner
        .recover(&params(RecoveryMode::Signed, 1, 4))
        .await
        .unwrap();
    assert_eq!(report.transactions.len(), 2);
    assert_eq!(report.failed_indices, vec![2]);
}

#[tokio::test]
async fn oracle_failure_on_the_only_index_propagates() {
    let material = material();
    let mut oracle = MockOracle::new();
    oracle.fail(&scan_address(&material, 1));

    let planner = RecoveryPlanner::new(Arc::new(oracle), material);
    let err = planner
        .recover(&params(RecoveryMode::Signed, 1, 2))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExternalOracle);
}

#[tokio::test]
async fn unsigned_mode_hands_off_everything_a_signer_needs() {
    let material = material();
    let mut oracle = MockOracle::new();
    oracle.fund(&scan_address(&material, 2), 500_000, 5);

    // Public-only planner: same scan, no signing ability
    let xprv = match &material {
        SigningKeyMaterial::Extended { xprv } => *xprv,
        _ => unreachable!(),
    };
    let xpub = bitcoin::bip32::Xpub::from_priv(&bitcoin::secp256k1::Secp256k1::new(), &xprv);
    let public_only = SigningKeyMaterial::PublicOnly { xpub };

    let planner = RecoveryPlanner::new(Arc::new(oracle), public_only);
    let report = planner
        .recover(&params(RecoveryMode::Unsigned, 1, 5))
        .await
        .unwrap();

    assert_eq!(report.transactions.len(), 1);
    let sweep = &report.transactions[0];
    assert_eq!(sweep.derivation_path, "m/2");
    assert_eq!(sweep.chain_id, "meridian-1");
    assert_eq!(sweep.fee, FEE);

    let unsigned_hex = match &sweep.payload {
        RecoveredPayload::Unsigned { unsigned_hex } => unsigned_hex.clone(),
        RecoveredPayload::Signed { .. } => panic!("expected unsigned payload"),
    };

    // The external signer can reconstruct the exact digest from the bytes
    let canonical = hex::decode(&unsigned_hex).unwrap();
    use meridian_core::codec::bank::BankCodec;
    use meridian_core::codec::CanonicalCodec;
    let codec = BankCodec;
    let fields = codec.decode(&canonical).unwrap();
    assert_eq!(hex::encode(codec.digest(&canonical)), sweep.digest);
    assert_eq!(fields.sequence, 5);

    // And the holder of the private material can finish the flow
    let (child, _) = derivation::derive_scan_key(&material, 2).unwrap();
    let digest = codec.digest(&canonical);
    let full = child.sign_digest(&digest).unwrap();
    let mut tx = TransferBuilder::new()
        .sender(&fields.sender)
        .unwrap()
        .recipient(&fields.recipient)
        .unwrap()
        .amount(fields.amount.amount.parse().unwrap())
        .fee(fields.fee.amount.parse().unwrap())
        .sequence(fields.sequence)
        .chain_id(&fields.chain_id)
        .public_key(&fields.public_key)
        .unwrap()
        .build()
        .unwrap();
    tx.add_signature(&full[..64]).unwrap();
    assert!(tx.to_broadcast_format().is_ok());
}

#[tokio::test]
async fn signed_mode_with_public_only_material_is_rejected() {
    let material = material();
    let xprv = match &material {
        SigningKeyMaterial::Extended { xprv } => *xprv,
        _ => unreachable!(),
    };
    let xpub = bitcoin::bip32::Xpub::from_priv(&bitcoin::secp256k1::Secp256k1::new(), &xprv);
    let public_only = SigningKeyMaterial::PublicOnly { xpub };

    let planner = RecoveryPlanner::new(Arc::new(MockOracle::new()), public_only);
    let err = planner
        .recover(&params(RecoveryMode::Signed, 1, 3))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Validation);
}
