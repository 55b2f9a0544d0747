//! Arena Prize Storage Contract
//!
//! Durable escrow ledger for game-session prize pools. Holds the SEP-41
//! tokens collected as entry fees and records, per session id, the game
//! contract that opened the entry, the escrowed total, the amount already
//! paid out, and a one-shot `distributed` flag.
//!
//! ## Capability model
//! The address passed to `open_session` is recorded on the entry and becomes
//! the only address allowed to deposit for that session id. The distributor
//! bound at `init` is the only address allowed to record payouts. Neither
//! check is a global allowlist, so any number of game contracts can share one
//! ledger without redeployment.
//!
//! ## Invariant
//! For every session, `paid_out <= escrowed` at all times, the queryable pool
//! equals `escrowed - paid_out`, and `distributed` flips false→true at most
//! once, only when `paid_out == escrowed`.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token::TokenClient,
    Address, BytesN, Env,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
/// Bumped on every write so an active session's ledger never expires mid-game.
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized      = 1,
    NotInitialized          = 2,
    NotAuthorized           = 3,
    SessionAlreadyOpen      = 4,
    SessionNotFound         = 5,
    InvalidAmount           = 6,
    AlreadyDistributed      = 7,
    DistributionExceedsPool = 8,
    PoolNotFullyAccounted   = 9,
    Overflow                = 10,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

/// Discriminants for all storage keys.
///
/// Instance keys (Admin, Token, Distributor): contract config, one ledger
/// entry. Persistent keys (Ledger): per-session accounting entries, each
/// with their own TTL.
#[contracttype]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Token,
    Distributor,
    // --- persistent() ---
    /// Per-session escrow entry keyed by session id.
    Ledger(u64),
}

/// Per-session escrow record.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerEntry {
    /// The game contract that opened this session; sole permitted depositor.
    pub game: Address,
    /// Sum of all deposits for the session.
    pub escrowed: i128,
    /// Sum of all recorded distributions; never exceeds `escrowed`.
    pub paid_out: i128,
    /// Set exactly once, when `paid_out == escrowed`.
    pub distributed: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct SessionLedgerOpened {
    #[topic]
    pub session_id: u64,
    pub game: Address,
}

#[contractevent]
pub struct Deposited {
    #[topic]
    pub session_id: u64,
    #[topic]
    pub from: Address,
    pub amount: i128,
}

#[contractevent]
pub struct DistributionRecorded {
    #[topic]
    pub session_id: u64,
    #[topic]
    pub to: Address,
    pub amount: i128,
}

#[contractevent]
pub struct SessionDistributed {
    #[topic]
    pub session_id: u64,
    pub total: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct PrizeStorage;

#[contractimpl]
impl PrizeStorage {
    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Initialize the prize storage. May only be called once.
    ///
    /// `token` must be a deployed SEP-41 contract address; all escrow inflows
    /// and payout outflows transfer through it. `distributor` is the only
    /// address permitted to record distributions.
    pub fn init(env: Env, admin: Address, token: Address, distributor: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage().instance().set(&DataKey::Distributor, &distributor);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // open_session
    // -----------------------------------------------------------------------

    /// Create the ledger entry for a new session and bind `game` as its sole
    /// depositor. The first opener wins; reopening an existing session id
    /// returns `SessionAlreadyOpen`.
    pub fn open_session(env: Env, game: Address, session_id: u64) -> Result<(), Error> {
        require_initialized(&env)?;

        game.require_auth();

        let key = DataKey::Ledger(session_id);
        if env.storage().persistent().has(&key) {
            return Err(Error::SessionAlreadyOpen);
        }

        let entry = LedgerEntry {
            game: game.clone(),
            escrowed: 0,
            paid_out: 0,
            distributed: false,
        };
        set_ledger(&env, session_id, &entry);

        SessionLedgerOpened { session_id, game }.publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // deposit
    // -----------------------------------------------------------------------

    /// Transfer `amount` tokens from `from` into escrow for a session.
    ///
    /// Callable only by the game contract bound to `session_id` at
    /// `open_session` — a capability check scoped to the session id, not a
    /// caller allowlist. Deposits are rejected once the session has been
    /// distributed.
    pub fn deposit(
        env: Env,
        game: Address,
        session_id: u64,
        from: Address,
        amount: i128,
    ) -> Result<(), Error> {
        require_initialized(&env)?;

        game.require_auth();

        let mut entry = get_ledger_entry(&env, session_id)?;
        if entry.game != game {
            return Err(Error::NotAuthorized);
        }
        if entry.distributed {
            return Err(Error::AlreadyDistributed);
        }
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        entry.escrowed = entry.escrowed.checked_add(amount).ok_or(Error::Overflow)?;
        set_ledger(&env, session_id, &entry);

        let token = get_token(&env);
        TokenClient::new(&env, &token).transfer(&from, &env.current_contract_address(), &amount);

        Deposited {
            session_id,
            from,
            amount,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // record_distribution
    // -----------------------------------------------------------------------

    /// Transfer `amount` tokens out of a session's escrow to `to` and record
    /// the payout. Callable only by the distributor bound at `init`.
    ///
    /// Multiple calls against the same session are permitted (one per
    /// recipient); the running `paid_out` total can never exceed `escrowed`
    /// and no call is accepted once `distributed` is set.
    ///
    /// Accounting state is updated BEFORE the external token transfer: if the
    /// transfer traps, the whole frame rolls back, and a committed call can
    /// never be replayed into a double payment.
    pub fn record_distribution(
        env: Env,
        distributor: Address,
        session_id: u64,
        to: Address,
        amount: i128,
    ) -> Result<(), Error> {
        require_initialized(&env)?;
        require_distributor(&env, &distributor)?;

        let mut entry = get_ledger_entry(&env, session_id)?;
        if entry.distributed {
            return Err(Error::AlreadyDistributed);
        }
        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }

        let paid_out = entry.paid_out.checked_add(amount).ok_or(Error::Overflow)?;
        if paid_out > entry.escrowed {
            return Err(Error::DistributionExceedsPool);
        }

        entry.paid_out = paid_out;
        set_ledger(&env, session_id, &entry);

        let token = get_token(&env);
        TokenClient::new(&env, &token).transfer(&env.current_contract_address(), &to, &amount);

        DistributionRecorded {
            session_id,
            to,
            amount,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // mark_distributed
    // -----------------------------------------------------------------------

    /// Flip the session's `distributed` flag. Callable only by the bound
    /// distributor, exactly once, and only when every escrowed token has been
    /// accounted for by recorded distributions.
    pub fn mark_distributed(env: Env, distributor: Address, session_id: u64) -> Result<(), Error> {
        require_initialized(&env)?;
        require_distributor(&env, &distributor)?;

        let mut entry = get_ledger_entry(&env, session_id)?;
        if entry.distributed {
            return Err(Error::AlreadyDistributed);
        }
        if entry.paid_out != entry.escrowed {
            return Err(Error::PoolNotFullyAccounted);
        }

        entry.distributed = true;
        set_ledger(&env, session_id, &entry);

        SessionDistributed {
            session_id,
            total: entry.escrowed,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // views
    // -----------------------------------------------------------------------

    /// Return a session's full ledger entry.
    pub fn get_ledger(env: Env, session_id: u64) -> Result<LedgerEntry, Error> {
        require_initialized(&env)?;
        get_ledger_entry(&env, session_id)
    }

    /// Current pool for a session: escrowed minus paid out. Never negative.
    pub fn pool(env: Env, session_id: u64) -> Result<i128, Error> {
        require_initialized(&env)?;
        let entry = get_ledger_entry(&env, session_id)?;
        entry
            .escrowed
            .checked_sub(entry.paid_out)
            .ok_or(Error::Overflow)
    }

    // -----------------------------------------------------------------------
    // upgrade
    // -----------------------------------------------------------------------

    /// Replace the contract code while keeping the storage address stable.
    /// Admin only. The storage layout is additive-only across versions.
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

/// Verify that `caller` is the bound distributor and has signed the invocation.
fn require_distributor(env: &Env, caller: &Address) -> Result<(), Error> {
    let distributor: Address = env
        .storage()
        .instance()
        .get(&DataKey::Distributor)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &distributor {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn get_token(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::Token)
        .expect("PrizeStorage: token not set")
}

fn get_ledger_entry(env: &Env, session_id: u64) -> Result<LedgerEntry, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Ledger(session_id))
        .ok_or(Error::SessionNotFound)
}

/// Write a ledger entry and extend its TTL in one step.
fn set_ledger(env: &Env, session_id: u64, entry: &LedgerEntry) {
    let key = DataKey::Ledger(session_id);
    env.storage().persistent().set(&key, entry);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
