//! Arena Game Factory Contract
//!
//! Creates game sessions and keeps the append-only catalog external indexers
//! enumerate. Session ids are dense (1..=count), so `game_count` plus
//! `get_game` is a complete enumeration surface; entries are never removed.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, BytesN, Env,
};

use arena_game::GameClient;

pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    InvalidDuration = 4,
    InvalidEntryFee = 5,
    GameNotFound = 6,
    Overflow = 7,
}

// ---------------------------------------------------------------------------
// Storage types
// ---------------------------------------------------------------------------

#[contracttype]
pub enum DataKey {
    Admin,
    Game,
    NextSessionId,
    Catalog(u64),
}

/// Immutable catalog record for one created session.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogEntry {
    pub session_id: u64,
    pub game: Address,
    pub duration: u64,
    pub entry_fee: i128,
    pub created_at: u64,
    pub created_by: Address,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Creation event consumed by deployment/indexing tooling; the session id
/// and game contract address lead.
#[contractevent]
pub struct GameCreated {
    #[topic]
    pub session_id: u64,
    pub game: Address,
    pub duration: u64,
    pub entry_fee: i128,
    pub created_by: Address,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct GameFactory;

#[contractimpl]
impl GameFactory {
    /// Initialize the factory with the game contract it creates sessions on.
    /// May only be called once.
    pub fn init(env: Env, admin: Address, game: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Game, &game);
        env.storage().instance().set(&DataKey::NextSessionId, &0u64);

        Ok(())
    }

    /// Create a new game session with the given window and entry fee.
    ///
    /// Open to any authenticated creator; the creator is recorded on the
    /// catalog entry. `entry_fee` may be zero (free games) but must be
    /// explicit and non-negative. Returns the new session id.
    pub fn create_game(
        env: Env,
        creator: Address,
        duration: u64,
        entry_fee: i128,
    ) -> Result<u64, Error> {
        require_initialized(&env)?;

        creator.require_auth();

        if duration == 0 {
            return Err(Error::InvalidDuration);
        }
        if entry_fee < 0 {
            return Err(Error::InvalidEntryFee);
        }

        let next: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextSessionId)
            .unwrap_or(0);
        let session_id = next.checked_add(1).ok_or(Error::Overflow)?;
        env.storage()
            .instance()
            .set(&DataKey::NextSessionId, &session_id);

        let game = get_game_addr(&env);
        GameClient::new(&env, &game).create_session(
            &env.current_contract_address(),
            &session_id,
            &duration,
            &entry_fee,
        );

        let entry = CatalogEntry {
            session_id,
            game: game.clone(),
            duration,
            entry_fee,
            created_at: env.ledger().timestamp(),
            created_by: creator.clone(),
        };
        let key = DataKey::Catalog(session_id);
        env.storage().persistent().set(&key, &entry);
        env.storage()
            .persistent()
            .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        GameCreated {
            session_id,
            game,
            duration,
            entry_fee,
            created_by: creator,
        }
        .publish(&env);

        Ok(session_id)
    }

    /// Number of sessions ever created. Ids run 1..=count.
    pub fn game_count(env: Env) -> Result<u64, Error> {
        require_initialized(&env)?;
        Ok(env
            .storage()
            .instance()
            .get(&DataKey::NextSessionId)
            .unwrap_or(0))
    }

    /// Look up a catalog entry by session id.
    pub fn get_game(env: Env, session_id: u64) -> Result<CatalogEntry, Error> {
        require_initialized(&env)?;
        env.storage()
            .persistent()
            .get(&DataKey::Catalog(session_id))
            .ok_or(Error::GameNotFound)
    }

    /// Replace the contract code while keeping the factory address stable.
    /// Admin only.
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

fn get_game_addr(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::Game)
        .expect("GameFactory: game not set")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
