#![cfg(test)]

use super::*;
use soroban_sdk::{
    contracterror, contractimpl, panic_with_error,
    testutils::Address as _,
    token::{StellarAssetClient, TokenClient},
    vec, Address, Env,
};

use arena_prize_storage::PrizeStorage;

// -------------------------------------------------------------------
// Mock token
// -------------------------------------------------------------------

// Minimal SEP-41 surface (transfer/balance) with a per-address block list,
// so tests can make a single recipient's payout fail and later clear it.

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum TokenError {
    RecipientBlocked = 1,
    InsufficientBalance = 2,
}

#[contracttype]
pub enum TokenKey {
    Balance(Address),
    Blocked(Address),
}

#[contract]
pub struct FlakyToken;

#[contractimpl]
impl FlakyToken {
    pub fn mint(env: Env, to: Address, amount: i128) {
        let key = TokenKey::Balance(to);
        let bal: i128 = env.storage().persistent().get(&key).unwrap_or(0);
        env.storage().persistent().set(&key, &(bal + amount));
    }

    pub fn set_blocked(env: Env, addr: Address, blocked: bool) {
        env.storage()
            .persistent()
            .set(&TokenKey::Blocked(addr), &blocked);
    }

    pub fn transfer(env: Env, from: Address, to: Address, amount: i128) {
        from.require_auth();
        if env
            .storage()
            .persistent()
            .get(&TokenKey::Blocked(to.clone()))
            .unwrap_or(false)
        {
            panic_with_error!(&env, TokenError::RecipientBlocked);
        }
        let from_key = TokenKey::Balance(from);
        let from_bal: i128 = env.storage().persistent().get(&from_key).unwrap_or(0);
        if from_bal < amount {
            panic_with_error!(&env, TokenError::InsufficientBalance);
        }
        env.storage().persistent().set(&from_key, &(from_bal - amount));
        let to_key = TokenKey::Balance(to);
        let to_bal: i128 = env.storage().persistent().get(&to_key).unwrap_or(0);
        env.storage().persistent().set(&to_key, &(to_bal + amount));
    }

    pub fn balance(env: Env, id: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&TokenKey::Balance(id))
            .unwrap_or(0)
    }
}

// -------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------

struct Setup<'a> {
    storage: arena_prize_storage::PrizeStorageClient<'a>,
    distributor: PrizeDistributorClient<'a>,
    game: Address,
    player: Address,
    treasury: Address,
}

/// Wire a real PrizeStorage and PrizeDistributor around `token_addr` with the
/// given split policy. The "game" is a generated address acting under mocked
/// auth, bound to session 1 with `escrow` already deposited from `player`.
fn setup_with_token<'a>(
    env: &'a Env,
    token_addr: &Address,
    shares_bps: Vec<u32>,
    fee_bps: u32,
    escrow: i128,
) -> Setup<'a> {
    let admin = Address::generate(env);
    let game = Address::generate(env);
    let player = Address::generate(env);
    let treasury = Address::generate(env);

    let storage_id = env.register(PrizeStorage, ());
    let storage = arena_prize_storage::PrizeStorageClient::new(env, &storage_id);

    let distributor_id = env.register(PrizeDistributor, ());
    let distributor = PrizeDistributorClient::new(env, &distributor_id);

    env.mock_all_auths_allowing_non_root_auth();

    storage.init(&admin, token_addr, &distributor_id);
    distributor.init(
        &admin,
        &storage_id,
        &PayoutPolicy {
            shares_bps,
            fee_bps,
            treasury: treasury.clone(),
        },
    );

    storage.open_session(&game, &1u64);
    if escrow > 0 {
        storage.deposit(&game, &1u64, &player, &escrow);
    }

    Setup {
        storage,
        distributor,
        game,
        player,
        treasury,
    }
}

/// Same, but with a fresh Stellar Asset Contract token and `player` funded.
fn setup<'a>(env: &'a Env, shares_bps: Vec<u32>, fee_bps: u32, escrow: i128) -> (Setup<'a>, Address) {
    let token_admin = Address::generate(env);
    let sac = env.register_stellar_asset_contract_v2(token_admin.clone());
    let token_addr = sac.address();

    let player = {
        // Mint before setup so the deposit inside setup_with_token succeeds.
        let p = Address::generate(env);
        env.mock_all_auths_allowing_non_root_auth();
        StellarAssetClient::new(env, &token_addr).mint(&p, &100_000_000i128);
        p
    };

    let mut s = setup_with_token(env, &token_addr, shares_bps, fee_bps, 0);
    s.player = player;
    if escrow > 0 {
        s.storage.deposit(&s.game, &1u64, &s.player, &escrow);
    }
    (s, token_addr)
}

fn tc<'a>(env: &'a Env, token: &Address) -> TokenClient<'a> {
    TokenClient::new(env, token)
}

// -------------------------------------------------------------------
// 1. Policy validation
// -------------------------------------------------------------------

#[test]
fn test_init_rejects_reinit() {
    let env = Env::default();
    let (s, _) = setup(&env, vec![&env, 10_000u32], 0, 0);
    env.mock_all_auths_allowing_non_root_auth();

    let admin = Address::generate(&env);
    let storage_addr = s.storage.address.clone();
    let result = s.distributor.try_init(
        &admin,
        &storage_addr,
        &PayoutPolicy {
            shares_bps: vec![&env, 10_000u32],
            fee_bps: 0,
            treasury: s.treasury.clone(),
        },
    );
    assert_eq!(result, Err(Ok(Error::AlreadyInitialized)));
}

#[test]
fn test_policy_empty_shares_rejected() {
    let env = Env::default();
    let admin = Address::generate(&env);
    let storage_addr = Address::generate(&env);
    let treasury = Address::generate(&env);

    let distributor_id = env.register(PrizeDistributor, ());
    let client = PrizeDistributorClient::new(&env, &distributor_id);
    env.mock_all_auths_allowing_non_root_auth();

    let result = client.try_init(
        &admin,
        &storage_addr,
        &PayoutPolicy {
            shares_bps: Vec::new(&env),
            fee_bps: 0,
            treasury,
        },
    );
    assert_eq!(result, Err(Ok(Error::InvalidPolicy)));
}

#[test]
fn test_policy_overcommitted_shares_rejected() {
    let env = Env::default();
    let admin = Address::generate(&env);
    let storage_addr = Address::generate(&env);
    let treasury = Address::generate(&env);

    let distributor_id = env.register(PrizeDistributor, ());
    let client = PrizeDistributorClient::new(&env, &distributor_id);
    env.mock_all_auths_allowing_non_root_auth();

    // 70% + 30% + 5% fee > 100%
    let result = client.try_init(
        &admin,
        &storage_addr,
        &PayoutPolicy {
            shares_bps: vec![&env, 7_000u32, 3_000u32],
            fee_bps: 500,
            treasury: treasury.clone(),
        },
    );
    assert_eq!(result, Err(Ok(Error::InvalidPolicy)));

    // Zero shares are meaningless ranks.
    let result = client.try_init(
        &admin,
        &storage_addr,
        &PayoutPolicy {
            shares_bps: vec![&env, 9_000u32, 0u32],
            fee_bps: 0,
            treasury,
        },
    );
    assert_eq!(result, Err(Ok(Error::InvalidPolicy)));
}

// -------------------------------------------------------------------
// 2. Winner-take-all and tiered splits
// -------------------------------------------------------------------

#[test]
fn test_winner_take_all() {
    let env = Env::default();
    let (s, token_addr) = setup(&env, vec![&env, 10_000u32], 0, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    let winner = Address::generate(&env);
    let ranked = vec![&env, winner.clone()];

    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert!(settled);

    let token = tc(&env, &token_addr);
    assert_eq!(token.balance(&winner), 1_000_000);
    assert_eq!(token.balance(&s.treasury), 0);
    assert!(s.storage.get_ledger(&1u64).distributed);
    assert_eq!(s.storage.pool(&1u64), 0);
}

#[test]
fn test_tiered_split() {
    let env = Env::default();
    let (s, token_addr) = setup(&env, vec![&env, 5_000u32, 3_000u32, 2_000u32], 0, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    let first = Address::generate(&env);
    let second = Address::generate(&env);
    let third = Address::generate(&env);
    let ranked = vec![&env, first.clone(), second.clone(), third.clone()];

    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert!(settled);

    let token = tc(&env, &token_addr);
    assert_eq!(token.balance(&first), 500_000);
    assert_eq!(token.balance(&second), 300_000);
    assert_eq!(token.balance(&third), 200_000);
    assert!(s.storage.get_ledger(&1u64).distributed);
}

#[test]
fn test_protocol_fee_goes_to_treasury() {
    let env = Env::default();
    let (s, token_addr) = setup(&env, vec![&env, 9_000u32], 1_000, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    let winner = Address::generate(&env);
    let ranked = vec![&env, winner.clone()];

    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert!(settled);

    let token = tc(&env, &token_addr);
    assert_eq!(token.balance(&winner), 900_000);
    assert_eq!(token.balance(&s.treasury), 100_000);
}

// -------------------------------------------------------------------
// 3. Full accounting: dust and unfilled ranks
// -------------------------------------------------------------------

#[test]
fn test_rounding_dust_is_accounted() {
    let env = Env::default();
    let (s, token_addr) = setup(&env, vec![&env, 3_333u32, 3_333u32, 3_333u32], 0, 0);
    env.mock_all_auths_allowing_non_root_auth();

    s.storage.deposit(&s.game, &1u64, &s.player, &1_001i128);

    let a = Address::generate(&env);
    let b = Address::generate(&env);
    let c = Address::generate(&env);
    let ranked = vec![&env, a.clone(), b.clone(), c.clone()];

    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_001i128);
    assert!(settled);

    // 1_001 * 3_333 / 10_000 = 333 each; 2 tokens of dust go to the treasury.
    let token = tc(&env, &token_addr);
    assert_eq!(token.balance(&a), 333);
    assert_eq!(token.balance(&b), 333);
    assert_eq!(token.balance(&c), 333);
    assert_eq!(token.balance(&s.treasury), 2);

    // Every escrowed token accounted for.
    let ledger = s.storage.get_ledger(&1u64);
    assert_eq!(ledger.paid_out, ledger.escrowed);
    assert!(ledger.distributed);
}

#[test]
fn test_unfilled_ranks_fall_to_treasury() {
    let env = Env::default();
    let (s, token_addr) = setup(&env, vec![&env, 7_000u32, 2_000u32, 1_000u32], 0, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    // Only one registrant; ranks 2 and 3 are unfilled.
    let sole = Address::generate(&env);
    let ranked = vec![&env, sole.clone()];

    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert!(settled);

    let token = tc(&env, &token_addr);
    assert_eq!(token.balance(&sole), 700_000);
    assert_eq!(token.balance(&s.treasury), 300_000);
    assert!(s.storage.get_ledger(&1u64).distributed);
}

#[test]
fn test_zero_pool_settles_with_empty_plan() {
    let env = Env::default();
    let (s, _) = setup(&env, vec![&env, 10_000u32], 0, 0);
    env.mock_all_auths_allowing_non_root_auth();

    let settled = s
        .distributor
        .distribute(&s.game, &1u64, &Vec::new(&env), &0i128);
    assert!(settled);

    assert!(s.storage.get_ledger(&1u64).distributed);
    assert_eq!(s.distributor.get_plan(&1u64).len(), 0);
}

// -------------------------------------------------------------------
// 4. Authorization and consistency guards
// -------------------------------------------------------------------

#[test]
fn test_distribute_by_unbound_game_rejected() {
    let env = Env::default();
    let (s, _) = setup(&env, vec![&env, 10_000u32], 0, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    let impostor = Address::generate(&env);
    let winner = Address::generate(&env);
    let result = s.distributor.try_distribute(
        &impostor,
        &1u64,
        &vec![&env, winner],
        &1_000_000i128,
    );
    assert_eq!(result, Err(Ok(Error::NotAuthorized)));
}

#[test]
fn test_distribute_unknown_session_rejected() {
    let env = Env::default();
    let (s, _) = setup(&env, vec![&env, 10_000u32], 0, 0);
    env.mock_all_auths_allowing_non_root_auth();

    let result = s
        .distributor
        .try_distribute(&s.game, &99u64, &Vec::new(&env), &0i128);
    assert_eq!(result, Err(Ok(Error::SessionNotFound)));
}

#[test]
fn test_pool_mismatch_rejected() {
    let env = Env::default();
    let (s, _) = setup(&env, vec![&env, 10_000u32], 0, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    let winner = Address::generate(&env);
    let result = s.distributor.try_distribute(
        &s.game,
        &1u64,
        &vec![&env, winner],
        &999_999i128,
    );
    assert_eq!(result, Err(Ok(Error::PoolMismatch)));
}

#[test]
fn test_distribute_after_settlement_rejected() {
    let env = Env::default();
    let (s, token_addr) = setup(&env, vec![&env, 10_000u32], 0, 1_000_000);
    env.mock_all_auths_allowing_non_root_auth();

    let winner = Address::generate(&env);
    let ranked = vec![&env, winner.clone()];
    assert!(s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128));

    let result = s
        .distributor
        .try_distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert_eq!(result, Err(Ok(Error::AlreadyDistributed)));

    // No balance moved by the rejected call.
    assert_eq!(tc(&env, &token_addr).balance(&winner), 1_000_000);
}

// -------------------------------------------------------------------
// 5. Per-recipient failure and retry
// -------------------------------------------------------------------

#[test]
fn test_failed_recipient_defers_without_blocking_others() {
    let env = Env::default();

    let token_id = env.register(FlakyToken, ());
    let flaky = FlakyTokenClient::new(&env, &token_id);

    let s = setup_with_token(&env, &token_id, vec![&env, 6_000u32, 4_000u32], 0, 0);
    env.mock_all_auths_allowing_non_root_auth();

    flaky.mint(&s.player, &10_000_000i128);
    s.storage.deposit(&s.game, &1u64, &s.player, &1_000_000i128);

    let first = Address::generate(&env);
    let second = Address::generate(&env);
    flaky.set_blocked(&first, &true);

    let ranked = vec![&env, first.clone(), second.clone()];
    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert!(!settled);

    // Second place was paid; first place's entry is still owed.
    assert_eq!(flaky.balance(&second), 400_000);
    assert_eq!(flaky.balance(&first), 0);
    assert!(!s.storage.get_ledger(&1u64).distributed);
    assert_eq!(s.storage.pool(&1u64), 600_000);

    let plan = s.distributor.get_plan(&1u64);
    assert_eq!(plan.len(), 2);
    assert!(!plan.get_unchecked(0).paid);
    assert!(plan.get_unchecked(1).paid);

    // Retry once the recipient can accept funds again.
    flaky.set_blocked(&first, &false);
    let settled = s.distributor.distribute(&s.game, &1u64, &ranked, &1_000_000i128);
    assert!(settled);

    // Committed payouts were not repeated.
    assert_eq!(flaky.balance(&first), 600_000);
    assert_eq!(flaky.balance(&second), 400_000);
    assert!(s.storage.get_ledger(&1u64).distributed);
    assert_eq!(s.storage.pool(&1u64), 0);
}
