//! Arena Prize Distributor Contract
//!
//! Computes and executes payouts for concluded game sessions, reading and
//! writing through the prize storage ledger. The split policy is injected at
//! `init` and never hard-coded per call.
//!
//! ## Payout plan
//! The first `distribute` call for a session persists a deterministic plan:
//! one entry per ranked player up to the number of configured rank shares,
//! then a terminal treasury entry carrying the protocol fee, rounding dust,
//! and the shares of unfilled ranks. Plan entries always sum to the pool
//! exactly, so nothing the ledger escrowed can go unaccounted.
//!
//! ## Per-recipient retry
//! Entries are executed through the storage client's `try_` form: a failing
//! recipient is skipped and its entry stays unpaid while committed payouts
//! stand. Retrying `distribute` resumes from the stored plan. The session is
//! marked distributed only after every entry has been paid.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, BytesN, Env, Vec,
};

use arena_prize_storage::PrizeStorageClient;
use shared::{split_amount, BASIS_POINTS_DIVISOR};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    InvalidPolicy      = 4,
    SessionNotFound    = 5,
    AlreadyDistributed = 6,
    PoolMismatch       = 7,
    PlanNotFound       = 8,
    Overflow           = 9,
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

#[contracttype]
pub enum DataKey {
    Admin,
    PrizeStorage,
    Policy,
    /// Persisted payout plan keyed by session id.
    Plan(u64),
}

/// Split policy fixed at construction.
///
/// `shares_bps` assigns basis points of the pool to each rank, best rank
/// first. `fee_bps` reserves the protocol's share: validation keeps the rank
/// shares at most `10_000 - fee_bps`, and the terminal treasury entry
/// collects the fee together with rounding dust and unfilled-rank shares.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayoutPolicy {
    pub shares_bps: Vec<u32>,
    pub fee_bps: u32,
    pub treasury: Address,
}

/// One planned payout. `paid` flips when the storage ledger records it.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PayoutEntry {
    pub to: Address,
    pub amount: i128,
    pub paid: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct DistributionPlanned {
    #[topic]
    pub session_id: u64,
    pub pool: i128,
    pub payouts: u32,
}

#[contractevent]
pub struct PayoutDeferred {
    #[topic]
    pub session_id: u64,
    #[topic]
    pub to: Address,
    pub amount: i128,
}

#[contractevent]
pub struct DistributionCompleted {
    #[topic]
    pub session_id: u64,
    pub pool: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct PrizeDistributor;

#[contractimpl]
impl PrizeDistributor {
    /// Initialize the distributor with its storage contract and split policy.
    /// May only be called once.
    pub fn init(
        env: Env,
        admin: Address,
        prize_storage: Address,
        policy: PayoutPolicy,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();
        validate_policy(&policy)?;

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&DataKey::PrizeStorage, &prize_storage);
        env.storage().instance().set(&DataKey::Policy, &policy);

        Ok(())
    }

    /// Settle a session's pool across `ranked_players` (best rank first).
    ///
    /// Callable only by the game contract bound to the session's ledger
    /// entry. The first call fixes the payout plan; retries reuse it
    /// verbatim and only re-attempt unpaid entries, so the ranked list is
    /// consulted once. Returns `true` when every entry has been paid and the
    /// ledger's `distributed` flag is set, `false` when any payout was
    /// deferred and a retry is required.
    pub fn distribute(
        env: Env,
        game: Address,
        session_id: u64,
        ranked_players: Vec<Address>,
        pool: i128,
    ) -> Result<bool, Error> {
        require_initialized(&env)?;

        game.require_auth();

        let storage_addr = get_prize_storage(&env);
        let storage = PrizeStorageClient::new(&env, &storage_addr);

        let ledger = match storage.try_get_ledger(&session_id) {
            Ok(Ok(entry)) => entry,
            _ => return Err(Error::SessionNotFound),
        };
        if ledger.game != game {
            return Err(Error::NotAuthorized);
        }
        if ledger.distributed {
            return Err(Error::AlreadyDistributed);
        }
        if pool != ledger.escrowed {
            return Err(Error::PoolMismatch);
        }

        let plan_key = DataKey::Plan(session_id);
        let plan: Vec<PayoutEntry> = match env.storage().persistent().get(&plan_key) {
            Some(existing) => existing,
            None => {
                let built = build_plan(&env, &ranked_players, pool)?;
                DistributionPlanned {
                    session_id,
                    pool,
                    payouts: built.len(),
                }
                .publish(&env);
                built
            }
        };

        let me = env.current_contract_address();
        let mut all_paid = true;
        let mut updated: Vec<PayoutEntry> = Vec::new(&env);
        for i in 0..plan.len() {
            let mut entry = plan.get_unchecked(i);
            if !entry.paid {
                match storage.try_record_distribution(&me, &session_id, &entry.to, &entry.amount) {
                    Ok(Ok(())) => entry.paid = true,
                    _ => {
                        all_paid = false;
                        PayoutDeferred {
                            session_id,
                            to: entry.to.clone(),
                            amount: entry.amount,
                        }
                        .publish(&env);
                    }
                }
            }
            updated.push_back(entry);
        }

        env.storage().persistent().set(&plan_key, &updated);
        env.storage()
            .persistent()
            .extend_ttl(&plan_key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        if !all_paid {
            return Ok(false);
        }

        match storage.try_mark_distributed(&me, &session_id) {
            Ok(Ok(())) => {
                DistributionCompleted { session_id, pool }.publish(&env);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Return the persisted payout plan for a session.
    pub fn get_plan(env: Env, session_id: u64) -> Result<Vec<PayoutEntry>, Error> {
        require_initialized(&env)?;
        env.storage()
            .persistent()
            .get(&DataKey::Plan(session_id))
            .ok_or(Error::PlanNotFound)
    }

    /// Return the split policy fixed at `init`.
    pub fn get_policy(env: Env) -> Result<PayoutPolicy, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Policy)
            .ok_or(Error::NotInitialized)
    }

    /// Replace the contract code while keeping the distributor address
    /// stable. Admin only.
    pub fn upgrade(env: Env, new_wasm_hash: BytesN<32>) -> Result<(), Error> {
        let admin: Address = env
            .storage()
            .instance()
            .get(&DataKey::Admin)
            .ok_or(Error::NotInitialized)?;
        admin.require_auth();
        env.deployer().update_current_contract_wasm(new_wasm_hash);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn get_prize_storage(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::PrizeStorage)
        .expect("PrizeDistributor: storage not set")
}

fn get_policy(env: &Env) -> PayoutPolicy {
    env.storage()
        .instance()
        .get(&DataKey::Policy)
        .expect("PrizeDistributor: policy not set")
}

/// A policy is valid when it has at least one non-zero rank share and the
/// rank shares plus the fee never claim more than the whole pool.
fn validate_policy(policy: &PayoutPolicy) -> Result<(), Error> {
    if policy.shares_bps.is_empty() {
        return Err(Error::InvalidPolicy);
    }
    let mut total: u32 = policy.fee_bps;
    for i in 0..policy.shares_bps.len() {
        let share = policy.shares_bps.get_unchecked(i);
        if share == 0 {
            return Err(Error::InvalidPolicy);
        }
        total = total.checked_add(share).ok_or(Error::InvalidPolicy)?;
    }
    if total > BASIS_POINTS_DIVISOR {
        return Err(Error::InvalidPolicy);
    }
    Ok(())
}

/// Build the payout plan for `pool` over `ranked_players`.
///
/// Zero-amount entries are omitted (the ledger rejects zero transfers), so a
/// zero pool yields an empty plan and settles immediately.
fn build_plan(env: &Env, ranked_players: &Vec<Address>, pool: i128) -> Result<Vec<PayoutEntry>, Error> {
    let policy = get_policy(env);

    let mut plan: Vec<PayoutEntry> = Vec::new(env);
    let mut allotted: i128 = 0;

    let winners = if ranked_players.len() < policy.shares_bps.len() {
        ranked_players.len()
    } else {
        policy.shares_bps.len()
    };

    for i in 0..winners {
        let share = policy.shares_bps.get_unchecked(i);
        let amount = split_amount(pool, share).map_err(|_| Error::Overflow)?;
        if amount > 0 {
            plan.push_back(PayoutEntry {
                to: ranked_players.get_unchecked(i),
                amount,
                paid: false,
            });
            allotted = allotted.checked_add(amount).ok_or(Error::Overflow)?;
        }
    }

    // Fee, rounding dust, and unfilled-rank shares all land in one terminal
    // treasury entry so the plan total equals the pool exactly.
    let remainder = pool.checked_sub(allotted).ok_or(Error::Overflow)?;
    if remainder > 0 {
        plan.push_back(PayoutEntry {
            to: policy.treasury.clone(),
            amount: remainder,
            paid: false,
        });
    }

    Ok(plan)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test;
