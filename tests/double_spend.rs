//! Double-spend integration tests
//!
//! End-to-end scenarios through the public API: payments, mining, fork
//! choice and attack sessions.

use double_spend_lab::attack::{AttackRequest, AttackSimulator, SuccessModel};
use double_spend_lab::core::{
    fork_choice, validate_chain, Amount, Chain, ChainParams, ForkChoice, Transaction,
};
use double_spend_lab::mining::RejectionReason;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn coins(n: i64) -> Amount {
    Amount::from_coins(n)
}

fn chain_with(wallet: &str, balance: i64) -> Chain {
    Chain::new(ChainParams::with_difficulty(6).with_allocation(wallet, coins(balance))).unwrap()
}

fn attack(model: SuccessModel) -> AttackRequest {
    AttackRequest::new("A", "Victim", coins(10), 3)
        .with_shadow_wallet("ShadowWallet")
        .with_success_model(model)
}

#[test]
fn test_mining_settles_pending_payment() {
    let mut chain = chain_with("A", 10);
    chain
        .submit_transaction(Transaction::new("A", "B", coins(10)))
        .unwrap();

    chain.mine_block("M1").unwrap();

    assert_eq!(chain.balance_of("B"), coins(10));
    assert_eq!(chain.balance_of("A"), Amount::ZERO);
    assert!(chain.mempool().is_empty());
}

#[test]
fn test_overspend_rejected() {
    let mut chain = chain_with("A", 10);
    let before = chain.mempool().len();

    let err = chain
        .submit_transaction(Transaction::new("A", "B", coins(1000)))
        .unwrap_err();

    assert!(matches!(err, RejectionReason::InsufficientBalance { .. }));
    assert!(err.to_string().contains("Insufficient balance"));
    assert_eq!(chain.mempool().len(), before);
}

#[test]
fn test_forced_success_finalizes_shadow_payment() {
    let mut chain = chain_with("A", 10);
    let mut rng = StdRng::seed_from_u64(1);

    let outcome = AttackSimulator::default()
        .run(&mut chain, &attack(SuccessModel::ForcedSuccess), &mut rng)
        .unwrap();

    assert!(outcome.successful);
    assert_eq!(chain.balance_of("Victim"), Amount::ZERO);
    assert_eq!(chain.balance_of("ShadowWallet"), coins(10));
    assert!(validate_chain(chain.blocks(), chain.params()).is_ok());
}

#[test]
fn test_forced_failure_keeps_legitimate_payment() {
    let mut chain = chain_with("A", 10);
    let mut rng = StdRng::seed_from_u64(1);

    let outcome = AttackSimulator::default()
        .run(&mut chain, &attack(SuccessModel::ForcedFailure), &mut rng)
        .unwrap();

    assert!(!outcome.successful);
    assert_eq!(chain.balance_of("Victim"), coins(10));
    assert_eq!(chain.balance_of("ShadowWallet"), Amount::ZERO);
}

#[test]
fn test_only_one_conflicting_payment_survives() {
    for seed in 0..8 {
        let mut chain = chain_with("A", 10);
        let mut rng = StdRng::seed_from_u64(seed);
        let model = SuccessModel::natural(0.9, 0.6).unwrap();

        let outcome = AttackSimulator::default()
            .run(&mut chain, &attack(model), &mut rng)
            .unwrap();

        let legit = chain.is_confirmed(&outcome.legitimate_tx_id);
        let shadow = chain.is_confirmed(&outcome.shadow_tx_id);
        assert!(legit != shadow, "seed {}: exactly one payment must be final", seed);
        assert_eq!(shadow, outcome.successful);
    }
}

#[test]
fn test_same_seed_same_outcome() {
    let run = |seed| {
        let mut chain = chain_with("A", 10);
        let mut rng = StdRng::seed_from_u64(seed);
        AttackSimulator::default()
            .run(&mut chain, &attack(SuccessModel::default()), &mut rng)
            .unwrap()
            .successful
    };

    for seed in [3, 17, 256] {
        assert_eq!(run(seed), run(seed));
    }
}

#[test]
fn test_equal_length_never_replaces() {
    let mut local = chain_with("A", 10);
    let mut rival = local.fork_at(0).unwrap();
    local.mine_block("honest").unwrap();
    rival.mine_block("rival").unwrap();

    assert_eq!(fork_choice(&local, rival.blocks()), ForkChoice::Keep);
    assert_eq!(
        local.replace_chain(rival.blocks().to_vec()).unwrap(),
        ForkChoice::Keep
    );
    assert_eq!(local.balance_of("honest"), coins(1));
}

#[test]
fn test_chain_links_hold_after_attack() {
    let mut chain = chain_with("A", 10);
    let mut rng = StdRng::seed_from_u64(9);
    AttackSimulator::default()
        .run(&mut chain, &attack(SuccessModel::ForcedSuccess), &mut rng)
        .unwrap();

    for pair in chain.blocks().windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].compute_hash());
    }
    for wallet in chain.balances().values() {
        assert!(!wallet.is_negative());
    }
}
