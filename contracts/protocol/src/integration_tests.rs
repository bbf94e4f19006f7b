//! Cross-component tests
//!
//! Drive the assembled protocol through the facade: user flows that span
//! the engine, treasury, liquidator and bridge, and property tests for the
//! system-wide balances.

use casper_types::U256;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use keel_bridge::{ConfirmOutcome, TransferKey, TransferStatus};
use keel_common::{
    constants::accounts,
    math::{self, from_whole, Scale},
    AssetId, CurrencyToken, EventType, KeelError, Role,
};
use keel_liquidator::LiquidationOutcome;

use crate::config::{default_addresses, AssetSection, BackingSection, KeelConfig};
use crate::Keel;

const GOV: [u8; 32] = [1u8; 32];
const ALICE: [u8; 32] = [2u8; 32];
const BOB: [u8; 32] = [3u8; 32];
const CAROL: [u8; 32] = [4u8; 32];
const KEEPER: [u8; 32] = [6u8; 32];
const RELAY: [u8; 32] = [8u8; 32];
const T0: u64 = 1_700_000_000;
const YEAR: u64 = 365 * 24 * 3600;

const ONE: i128 = 1_000_000_000_000_000_000;
const UNIT: u128 = 1_000_000_000_000_000_000;
const XRP_DEST: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

fn xrp() -> AssetId {
    AssetId::new("XRP").unwrap()
}

fn units(n: u128) -> U256 {
    from_whole(n, Scale::Unit).unwrap()
}

fn currency(n: u128) -> U256 {
    from_whole(n, Scale::Currency).unwrap()
}

/// Price in hundredths of a currency unit
fn price(hundredths: u128) -> U256 {
    U256::from(hundredths) * U256::exp10(16)
}

fn config(validate_destination: bool) -> KeelConfig {
    let mut config = KeelConfig {
        governor: hex::encode(GOV),
        assets: vec![AssetSection {
            symbol: "XRP".into(),
            backing: BackingSection::Native,
            debt_ceiling: "1000000".into(),
            debt_floor: "10".into(),
            vault_limit: None,
            liquidation_ratio: "1.5".into(),
            debt_rate_per_second: "1.000000001".into(),
            protocol_fee_bps: 1_000,
        }],
        ..Default::default()
    };
    config.bridge.validate_destination = validate_destination;
    config
}

/// Alice, Bob and Carol are whitelisted with 1000 XRP each in their
/// wallets; XRP trades at 1.0.
fn protocol_with(validate_destination: bool) -> Keel {
    let mut keel = Keel::from_config(&config(validate_destination), T0).unwrap();
    for user in [ALICE, BOB, CAROL] {
        keel.grant_role(GOV, user, Role::Whitelisted, T0).unwrap();
        keel.fund_wallet(user, xrp(), units(1_000)).unwrap();
    }
    keel.grant_role(GOV, RELAY, Role::Relay, T0).unwrap();
    keel.post_price(GOV, xrp(), units(1), T0).unwrap();
    keel
}

fn protocol() -> Keel {
    protocol_with(true)
}

/// `owner` locks `collateral` and draws `debt`.
fn borrow(keel: &mut Keel, owner: [u8; 32], collateral: u128, debt: i128, now: u64) {
    keel.deposit_collateral(owner, xrp(), units(collateral), now).unwrap();
    keel.open_or_update(owner, xrp(), collateral as i128 * ONE, debt * ONE, 0, now).unwrap();
}

#[test]
fn test_collateral_only_vault() {
    let mut keel = protocol();
    keel.deposit_collateral(ALICE, xrp(), units(150), T0).unwrap();
    keel.open_or_update(ALICE, xrp(), 150 * ONE, 0, 0, T0).unwrap();

    let view = keel.read(&ALICE, &xrp()).unwrap();
    assert_eq!(view.collateral, units(150));
    assert_eq!(view.debt_value, U256::zero());
    assert_eq!(view.equity_value, U256::zero());
    assert_eq!(keel.custody().wallet_balance(&ALICE, &xrp()), units(850));
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_equity_tracked_by_treasury() {
    let mut keel = protocol();
    borrow(&mut keel, ALICE, 300, 100, T0);
    keel.transfer_currency(ALICE, BOB, units(100), T0).unwrap();

    keel.deposit_collateral(BOB, xrp(), units(160), T0).unwrap();
    keel.open_or_update(BOB, xrp(), 160 * ONE, 0, 100 * ONE, T0).unwrap();

    assert_eq!(keel.treasury().equity_of(keel.engine(), &BOB, &xrp()).unwrap(), currency(100));
    assert_eq!(keel.read(&BOB, &xrp()).unwrap().debt_value, U256::zero());
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_positions_without_collateral_rejected() {
    let mut keel = protocol();
    let before = keel.supply_report().unwrap();
    let events = keel.engine().events().len();

    let err = keel.open_or_update(CAROL, xrp(), 0, 100 * ONE, 100 * ONE, T0).unwrap_err();
    assert!(matches!(err, KeelError::InsufficientCollateral { .. }));
    assert_eq!(keel.read(&CAROL, &xrp()).unwrap_err(), KeelError::VaultNotFound { asset: xrp() });
    assert_eq!(keel.supply_report().unwrap(), before);
    assert_eq!(keel.engine().events().len(), events);
    assert_eq!(keel.engine().currency_balance(&CAROL), U256::zero());
}

#[test]
fn test_positions_without_collateral_need_no_price() {
    let mut keel = Keel::from_config(&config(true), T0).unwrap();
    keel.grant_role(GOV, CAROL, Role::Whitelisted, T0).unwrap();

    let err = keel.open_or_update(CAROL, xrp(), 0, 100 * ONE, 100 * ONE, T0).unwrap_err();
    assert_eq!(
        err,
        KeelError::InsufficientCollateral {
            collateral_value: U256::zero(),
            required: currency(200),
        }
    );
}

#[test]
fn test_escrow_refuses_direct_transfers() {
    let mut keel = protocol_with(false);
    borrow(&mut keel, ALICE, 300, 100, T0);

    for account in [accounts::BRIDGE_ESCROW, accounts::BRIDGE_SETTLEMENT] {
        let err = keel.transfer_currency(ALICE, account, units(1), T0).unwrap_err();
        assert!(matches!(err, KeelError::Unauthorized { role: Role::Bridge, .. }));
    }
    assert_eq!(keel.engine().currency_balance(&accounts::BRIDGE_ESCROW), U256::zero());
    assert!(keel.is_consistent().unwrap());

    let key = keel.submit_transfer(ALICE, "X", 30 * UNIT, T0, T0).unwrap();
    keel.cancel_transfer(RELAY, &key, T0).unwrap();
    assert_eq!(keel.engine().currency_balance(&accounts::BRIDGE_ESCROW), U256::zero());
    assert_eq!(keel.engine().currency_balance(&ALICE), currency(100));
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_logging_installs_once() {
    let keel = protocol();
    keel.init_logging().unwrap();
    assert!(matches!(
        crate::init_logging(&crate::LoggingConfig::default()),
        Err(KeelError::Config(_))
    ));
}

#[test]
fn test_duplicate_transfer_until_cancelled() {
    let mut keel = protocol_with(false);
    borrow(&mut keel, ALICE, 300, 100, T0);

    let key = keel.submit_transfer(ALICE, "X", 30 * UNIT, T0, T0).unwrap();
    assert_eq!(
        keel.submit_transfer(ALICE, "X", 30 * UNIT, T0, T0).unwrap_err(),
        KeelError::DuplicateTransfer { key: key.0 }
    );
    assert_eq!(keel.engine().currency_balance(&ALICE), currency(70));

    keel.cancel_transfer(RELAY, &key, T0 + 1).unwrap();
    assert_eq!(keel.engine().currency_balance(&ALICE), currency(100));

    let again = keel.submit_transfer(ALICE, "X", 30 * UNIT, T0, T0 + 2).unwrap();
    assert_eq!(again, key);
    assert_eq!(keel.transfer(&key).unwrap().status, TransferStatus::Pending);
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_healthy_vault_survives_liquidation_attempt() {
    let mut keel = protocol();
    borrow(&mut keel, ALICE, 300, 100, T0);
    let view = keel.read(&ALICE, &xrp()).unwrap();
    let report = keel.supply_report().unwrap();
    let events = keel.engine().events().len();

    let outcome = keel.liquidate(KEEPER, ALICE, xrp(), T0).unwrap();
    assert!(matches!(
        outcome,
        LiquidationOutcome::Healthy { collateral_value, required }
            if required == currency(100) && collateral_value > currency(199)
    ));
    assert_eq!(keel.read(&ALICE, &xrp()).unwrap(), view);
    assert_eq!(keel.supply_report().unwrap(), report);
    assert_eq!(keel.engine().events().len(), events);
    assert_eq!(keel.engine().standby_collateral(&KEEPER, &xrp()), U256::zero());
}

#[test]
fn test_currency_round_trip_through_token_and_bridge() {
    let mut keel = protocol();
    borrow(&mut keel, ALICE, 300, 100, T0);

    keel.withdraw_currency(ALICE, units(40), T0).unwrap();
    keel.transfer_token(ALICE, BOB, units(10)).unwrap();
    keel.deposit_currency(BOB, units(10), T0).unwrap();
    assert_eq!(keel.token().balance_of(&ALICE), units(30));
    assert_eq!(keel.engine().currency_balance(&BOB), currency(10));
    assert!(keel.is_consistent().unwrap());

    let key = keel.submit_transfer(ALICE, XRP_DEST, 30 * UNIT, T0, T0).unwrap();
    keel.dispatch_transfer(RELAY, &key, T0 + 5).unwrap();
    let tx = "E3FE6EA3D48F0C2B639448020EA4F03D4F4F8FFDB243A852A0F59177921B4879";
    assert_eq!(keel.confirm_transfer(RELAY, &key, tx, T0 + 10).unwrap(), ConfirmOutcome::Confirmed);
    assert_eq!(
        keel.confirm_transfer(RELAY, &key, tx, T0 + 11).unwrap(),
        ConfirmOutcome::AlreadyCompleted
    );

    assert_eq!(keel.engine().currency_balance(&ALICE), currency(30));
    assert_eq!(keel.engine().currency_balance(&accounts::BRIDGE_SETTLEMENT), currency(30));
    assert_eq!(keel.engine().currency_balance(&accounts::BRIDGE_ESCROW), U256::zero());
    assert_eq!(keel.transfer(&key).unwrap().external_tx_id.as_deref(), Some(tx));
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_interest_flows_to_equity_and_reserve() {
    let mut keel = protocol();
    borrow(&mut keel, ALICE, 300, 100, T0);
    keel.transfer_currency(ALICE, BOB, units(100), T0).unwrap();
    keel.deposit_collateral(BOB, xrp(), units(160), T0).unwrap();
    keel.open_or_update(BOB, xrp(), 160 * ONE, 0, 100 * ONE, T0).unwrap();

    let previewed = keel.preview(&ALICE, &xrp(), T0 + YEAR).unwrap();
    let step = keel.accrue(CAROL, xrp(), T0 + YEAR).unwrap();
    assert_eq!(keel.read(&ALICE, &xrp()).unwrap(), previewed);

    let debt = keel.read(&ALICE, &xrp()).unwrap().debt_value;
    let equity = keel.read(&BOB, &xrp()).unwrap().equity_value;
    assert!(debt > currency(103) && debt < currency(104), "debt {debt}");
    assert_eq!(debt - currency(100), step.debt_value_increase);
    assert_eq!(equity - currency(100), step.equity_value_increase);
    assert!(step.reserve_credit >= step.fee && !step.fee.is_zero());
    assert_eq!(keel.engine().currency_balance(&accounts::RESERVE), step.reserve_credit);
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_price_drop_liquidation_and_settlement() {
    let mut keel = protocol();
    borrow(&mut keel, ALICE, 300, 100, T0);
    borrow(&mut keel, BOB, 600, 100, T0);

    // 300 × 0.4 / 1.5 = 80 < 100; Bob still covers 160
    keel.post_price(GOV, xrp(), price(40), T0 + 60).unwrap();
    let candidates = keel.scan(T0 + 60);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].owner, ALICE);

    let seized = keel.liquidate_batch(KEEPER, &[(ALICE, xrp()), (BOB, xrp())], T0 + 60);
    assert_eq!(seized.len(), 1);
    let confiscation = &seized[0].2;
    assert_eq!(confiscation.keeper_share, units(39));
    assert_eq!(confiscation.reserve_share, units(261));
    assert_eq!(keel.engine().standby_collateral(&KEEPER, &xrp()), units(39));
    // A minute of interest accrued before the seizure
    let unbacked = keel.engine().unbacked_debt();
    assert_eq!(unbacked, confiscation.debt_value);
    assert!(unbacked > currency(100));
    assert!(keel.scan(T0 + 60).is_empty());
    assert!(keel.is_consistent().unwrap());

    // Alice's borrowed currency plus the accrued spread cover the shortfall
    keel.transfer_currency(ALICE, accounts::RESERVE, units(100), T0 + 60).unwrap();
    assert_eq!(keel.settle_unbacked_debt(GOV, unbacked, T0 + 60).unwrap(), U256::zero());
    assert!(keel.is_consistent().unwrap());
}

#[test]
fn test_component_roles_granted_at_assembly() {
    let keel = protocol();
    let registry = keel.registry();
    assert!(registry.assignment(&default_addresses::TREASURY, Role::Treasury).is_some());
    assert!(registry.assignment(&default_addresses::LIQUIDATOR, Role::Liquidator).is_some());
    assert!(registry.assignment(&default_addresses::BRIDGE, Role::Bridge).is_some());
    assert_eq!(keel.token().minter(), &default_addresses::TREASURY);
    assert_eq!(keel.engine().asset(&xrp()).unwrap().config.version, 0);
}

#[test]
fn test_assembly_rejects_bad_config() {
    let mut duplicate = config(true);
    duplicate.assets.push(duplicate.assets[0].clone());
    assert_eq!(
        Keel::from_config(&duplicate, T0).err(),
        Some(KeelError::AssetAlreadyExists { asset: xrp() })
    );

    let no_governor = KeelConfig { governor: String::new(), ..config(true) };
    assert!(matches!(Keel::from_config(&no_governor, T0), Err(KeelError::Config(_))));
}

#[test]
fn test_governance_is_gated() {
    let mut keel = protocol();
    assert_eq!(
        keel.post_price(ALICE, xrp(), units(2), T0).unwrap_err(),
        KeelError::Unauthorized { address: ALICE, role: Role::Governance }
    );
    assert!(keel.set_bridge_enabled(ALICE, false, T0).is_err());
    keel.set_bridge_enabled(GOV, false, T0).unwrap();
    borrow(&mut keel, ALICE, 300, 100, T0);
    assert_eq!(
        keel.submit_transfer(ALICE, XRP_DEST, 30 * UNIT, T0, T0).unwrap_err(),
        KeelError::BridgeDisabled
    );
    assert!(keel.revoke_role(GOV, ALICE, Role::Whitelisted).unwrap());
    assert!(keel.open_or_update(ALICE, xrp(), 0, 10 * ONE, 0, T0).is_err());
}

#[test]
fn test_drained_events_are_time_ordered() {
    let mut keel = protocol();
    borrow(&mut keel, ALICE, 300, 100, T0);
    let key = keel.submit_transfer(ALICE, XRP_DEST, 30 * UNIT, T0, T0 + 1).unwrap();
    keel.dispatch_transfer(RELAY, &key, T0 + 2).unwrap();
    keel.accrue(ALICE, xrp(), T0 + 3).unwrap();

    let events = keel.drain_events();
    assert!(events.windows(2).all(|pair| pair[0].at() <= pair[1].at()));
    let kinds: Vec<EventType> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(kinds.first(), Some(&EventType::AssetInitialized));
    assert!(kinds.contains(&EventType::TransferSubmitted));
    assert!(kinds.contains(&EventType::TransferDispatched));
    assert_eq!(kinds.last(), Some(&EventType::Accrued));
    assert!(keel.drain_events().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Step {
    Borrow(usize, i128),
    Supply(usize, i128),
    ToToken(usize, u128),
    FromToken(usize, u128),
    Submit(usize, u128),
    Dispatch(usize),
    Confirm(usize),
    Cancel(usize),
    /// Direct ledger transfer into the bridge escrow account
    Donate(usize, u128),
    Wait(u64),
    /// Price in hundredths, followed by a keeper sweep
    Reprice(u128),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..2usize, -60i128..80).prop_map(|(u, n)| Step::Borrow(u, n)),
        (0..2usize, -40i128..40).prop_map(|(u, n)| Step::Supply(u, n)),
        (0..2usize, 1u128..50).prop_map(|(u, n)| Step::ToToken(u, n)),
        (0..2usize, 1u128..50).prop_map(|(u, n)| Step::FromToken(u, n)),
        (0..2usize, 1u128..40).prop_map(|(u, n)| Step::Submit(u, n)),
        (0..8usize).prop_map(Step::Dispatch),
        (0..8usize).prop_map(Step::Confirm),
        (0..8usize).prop_map(Step::Cancel),
        (0..2usize, 1u128..10).prop_map(|(u, n)| Step::Donate(u, n)),
        (1u64..3_000).prop_map(Step::Wait),
        (20u128..200).prop_map(Step::Reprice),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_system_stays_consistent(steps in prop::collection::vec(step(), 1..50)) {
        let users = [ALICE, BOB];
        let mut keel = protocol();
        for user in users {
            borrow(&mut keel, user, 400, 50, T0);
        }

        let mut now = T0;
        let mut keys: Vec<TransferKey> = Vec::new();
        let mut accumulator = keel.engine().asset(&xrp()).unwrap().supply.debt_accumulator;
        let pick = |keys: &[TransferKey], i: usize| keys.get(i % keys.len().max(1)).copied();

        for (nonce, step) in steps.into_iter().enumerate() {
            // Failures are expected (floors, balances, lifecycle); each must leave no trace
            let _ = match step {
                Step::Borrow(u, n) => {
                    keel.open_or_update(users[u], xrp(), 0, n * ONE, 0, now).map(|_| ())
                }
                Step::Supply(u, n) => {
                    keel.open_or_update(users[u], xrp(), 0, 0, n * ONE, now).map(|_| ())
                }
                Step::ToToken(u, n) => keel.withdraw_currency(users[u], units(n), now),
                Step::FromToken(u, n) => keel.deposit_currency(users[u], units(n), now),
                Step::Submit(u, n) => keel
                    .submit_transfer(users[u], XRP_DEST, n * UNIT, nonce as u64, now)
                    .map(|key| keys.push(key)),
                Step::Dispatch(i) => match pick(&keys, i) {
                    Some(key) => keel.dispatch_transfer(RELAY, &key, now),
                    None => Ok(()),
                },
                Step::Confirm(i) => match pick(&keys, i) {
                    Some(key) => keel.confirm_transfer(RELAY, &key, "TX", now).map(|_| ()),
                    None => Ok(()),
                },
                Step::Cancel(i) => match pick(&keys, i) {
                    Some(key) => keel.cancel_transfer(RELAY, &key, now),
                    None => Ok(()),
                },
                Step::Donate(u, n) => {
                    keel.transfer_currency(users[u], accounts::BRIDGE_ESCROW, units(n), now)
                }
                Step::Wait(secs) => {
                    now += secs;
                    keel.post_price(GOV, xrp(), units(1), now)
                        .and_then(|_| keel.accrue(CAROL, xrp(), now).map(|_| ()))
                }
                Step::Reprice(hundredths) => {
                    keel.post_price(GOV, xrp(), price(hundredths), now).map(|_| {
                        keel.liquidate_batch(KEEPER, &[(ALICE, xrp()), (BOB, xrp())], now);
                    })
                }
            };

            prop_assert!(keel.is_consistent().unwrap());
            let next = keel.engine().asset(&xrp()).unwrap().supply.debt_accumulator;
            prop_assert!(next >= accumulator);
            accumulator = next;
        }

        let report = keel.supply_report().unwrap();
        prop_assert_eq!(
            math::currency_to_unit(report.externalized_currency).unwrap(),
            keel.token().total_supply()
        );
    }
}
