//! Arena Game Contract
//!
//! Per-session lifecycle: registration with an exact entry fee, score
//! tracking over a closed action vocabulary, and settlement of the escrowed
//! pool through the prize distributor once the session's time window closes.
//!
//! Sessions are created by the bound factory and keyed by session id. Money
//! never rests here: entry fees move straight into the prize storage ledger,
//! and the distributor pays out of it at settlement. Every score-affecting
//! action, registration included, publishes a `PlayerAction` event — the
//! canonical audit log for leaderboards and other observers.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, BytesN, Env, Vec,
};

use arena_prize_distributor::PrizeDistributorClient;
use arena_prize_storage::PrizeStorageClient;

pub const MAX_PLAYERS_PER_SESSION: u32 = 100;
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotAuthorized = 3,
    SessionAlreadyExists = 4,
    SessionNotFound = 5,
    InvalidDuration = 6,
    InvalidEntryFee = 7,
    GameEnded = 8,
    GameNotEnded = 9,
    AlreadyRegistered = 10,
    PlayerNotRegistered = 11,
    IncorrectEntryFee = 12,
    UnrecognizedAction = 13,
    InvalidAction = 14,
    SessionFull = 15,
    AlreadySettled = 16,
    Overflow = 17,
}

/// Closed vocabulary of score-affecting actions. The wire form is `u32`;
/// values outside the vocabulary are rejected, never ignored.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionType {
    Registration = 0,
    Move = 1,
    Attack = 2,
    Defend = 3,
}

/// Lifecycle state as observed from outside. Only `Settled` is stored;
/// `Ended` is derived from the clock, so no tick operation exists and
/// registration stays open through the whole window.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GameStatus {
    Open = 0,
    Ended = 1,
    Settled = 2,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionData {
    pub session_id: u64,
    pub entry_fee: i128,
    pub start_time: u64,
    pub end_time: u64,
    pub settled: bool,
    pub player_count: u32,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerRecord {
    pub username: BytesN<32>,
    pub pseudonym: BytesN<32>,
    pub score: u32,
    pub registered_at: u64,
}

/// A player with their final score, as ranked at settlement.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScoreEntry {
    pub player: Address,
    pub score: u32,
}

#[contracttype]
pub enum DataKey {
    Admin,
    Factory,
    PrizeStorage,
    Distributor,
    Session(u64),
    Players(u64),
    Player(u64, Address),
}

#[contractevent]
pub struct SessionOpened {
    #[topic]
    pub session_id: u64,
    pub entry_fee: i128,
    pub start_time: u64,
    pub end_time: u64,
}

#[contractevent]
pub struct PlayerAction {
    #[topic]
    pub session_id: u64,
    #[topic]
    pub player: Address,
    pub action_type: u32,
    pub new_score: u32,
}

#[contractevent]
pub struct SessionSettled {
    #[topic]
    pub session_id: u64,
    pub pool: i128,
    pub players: u32,
}

#[contract]
pub struct Game;

#[contractimpl]
impl Game {
    pub fn init(
        env: Env,
        admin: Address,
        factory: Address,
        prize_storage: Address,
        distributor: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Factory, &factory);
        env.storage()
            .instance()
            .set(&DataKey::PrizeStorage, &prize_storage);
        env.storage()
            .instance()
            .set(&DataKey::Distributor, &distributor);

        Ok(())
    }

    /// Open a new session. Callable only by the bound factory.
    ///
    /// `start_time` is the current ledger timestamp; the session accepts
    /// registrations and actions until `start_time + duration`. Also opens
    /// the session's escrow entry in prize storage, binding this contract as
    /// the sole depositor for the session id.
    pub fn create_session(
        env: Env,
        factory: Address,
        session_id: u64,
        duration: u64,
        entry_fee: i128,
    ) -> Result<(), Error> {
        require_initialized(&env)?;

        factory.require_auth();
        let bound: Address = env
            .storage()
            .instance()
            .get(&DataKey::Factory)
            .ok_or(Error::NotInitialized)?;
        if factory != bound {
            return Err(Error::NotAuthorized);
        }

        if duration == 0 {
            return Err(Error::InvalidDuration);
        }
        if entry_fee < 0 {
            return Err(Error::InvalidEntryFee);
        }
        if env.storage().persistent().has(&DataKey::Session(session_id)) {
            return Err(Error::SessionAlreadyExists);
        }

        let start_time = env.ledger().timestamp();
        let end_time = start_time.checked_add(duration).ok_or(Error::Overflow)?;

        let session = SessionData {
            session_id,
            entry_fee,
            start_time,
            end_time,
            settled: false,
            player_count: 0,
        };
        set_session(&env, session_id, &session);
        set_persistent(&env, DataKey::Players(session_id), &Vec::<Address>::new(&env));

        let storage_addr = get_prize_storage(&env);
        PrizeStorageClient::new(&env, &storage_addr)
            .open_session(&env.current_contract_address(), &session_id);

        SessionOpened {
            session_id,
            entry_fee,
            start_time,
            end_time,
        }
        .publish(&env);

        Ok(())
    }

    /// Register `player` for a session under a username and pseudonym,
    /// paying exactly the entry fee.
    ///
    /// The fee is escrowed in prize storage within the same atomic frame.
    /// A player registers at most once per session, and the payment must
    /// equal the fee exactly — neither overpayment nor underpayment is
    /// accepted. Registration is the first scored action and publishes the
    /// same `PlayerAction` shape as gameplay.
    pub fn register(
        env: Env,
        session_id: u64,
        player: Address,
        username: BytesN<32>,
        pseudonym: BytesN<32>,
        payment: i128,
    ) -> Result<(), Error> {
        require_initialized(&env)?;

        player.require_auth();

        let mut session = get_session_data(&env, session_id)?;
        if session.settled || env.ledger().timestamp() >= session.end_time {
            return Err(Error::GameEnded);
        }

        let player_key = DataKey::Player(session_id, player.clone());
        if env.storage().persistent().has(&player_key) {
            return Err(Error::AlreadyRegistered);
        }

        if payment != session.entry_fee {
            return Err(Error::IncorrectEntryFee);
        }

        if session.player_count >= MAX_PLAYERS_PER_SESSION {
            return Err(Error::SessionFull);
        }

        // Free games carry no deposit; the ledger rejects zero amounts.
        if session.entry_fee > 0 {
            let storage_addr = get_prize_storage(&env);
            PrizeStorageClient::new(&env, &storage_addr).deposit(
                &env.current_contract_address(),
                &session_id,
                &player,
                &session.entry_fee,
            );
        }

        let new_score = score_delta(ActionType::Registration);
        let record = PlayerRecord {
            username,
            pseudonym,
            score: new_score,
            registered_at: env.ledger().timestamp(),
        };
        env.storage().persistent().set(&player_key, &record);
        extend_persistent_ttl(&env, &player_key);

        let mut players: Vec<Address> = env
            .storage()
            .persistent()
            .get(&DataKey::Players(session_id))
            .unwrap_or(Vec::new(&env));
        players.push_back(player.clone());
        set_persistent(&env, DataKey::Players(session_id), &players);

        session.player_count = session.player_count.checked_add(1).ok_or(Error::Overflow)?;
        set_session(&env, session_id, &session);

        PlayerAction {
            session_id,
            player,
            action_type: ActionType::Registration as u32,
            new_score,
        }
        .publish(&env);

        Ok(())
    }

    /// Record a scored action for a registered player.
    ///
    /// `action_type` must name a recognized gameplay action; registration
    /// cannot be replayed here since it carries the fee and the exactly-once
    /// guarantee. The score delta is deterministic per action type.
    pub fn record_action(
        env: Env,
        session_id: u64,
        player: Address,
        action_type: u32,
    ) -> Result<(), Error> {
        require_initialized(&env)?;

        player.require_auth();

        let session = get_session_data(&env, session_id)?;
        if session.settled || env.ledger().timestamp() >= session.end_time {
            return Err(Error::GameEnded);
        }

        let player_key = DataKey::Player(session_id, player.clone());
        let mut record: PlayerRecord = env
            .storage()
            .persistent()
            .get(&player_key)
            .ok_or(Error::PlayerNotRegistered)?;

        let action = action_from_u32(action_type).ok_or(Error::UnrecognizedAction)?;
        if action == ActionType::Registration {
            return Err(Error::InvalidAction);
        }

        let new_score = record
            .score
            .checked_add(score_delta(action))
            .ok_or(Error::Overflow)?;
        record.score = new_score;
        env.storage().persistent().set(&player_key, &record);
        extend_persistent_ttl(&env, &player_key);

        PlayerAction {
            session_id,
            player,
            action_type,
            new_score,
        }
        .publish(&env);

        Ok(())
    }

    /// Settle an expired session: rank the players, hand the escrowed pool
    /// to the distributor, and mark the session settled once the distributor
    /// reports full payment.
    ///
    /// Callable by anyone — the outcome is deterministic. Returns `true`
    /// when the session settled; `false` when a payout was deferred, in
    /// which case the session stays `Ended` and `finalize` may be retried.
    /// After a successful settlement further calls fail with
    /// `AlreadySettled` — they never pay twice.
    pub fn finalize(env: Env, session_id: u64) -> Result<bool, Error> {
        require_initialized(&env)?;

        let mut session = get_session_data(&env, session_id)?;
        if session.settled {
            return Err(Error::AlreadySettled);
        }
        if env.ledger().timestamp() < session.end_time {
            return Err(Error::GameNotEnded);
        }

        let storage_addr = get_prize_storage(&env);
        let ledger = PrizeStorageClient::new(&env, &storage_addr).get_ledger(&session_id);
        let pool = ledger.escrowed;

        let ranked = rank_players(&env, session_id);
        let mut ranked_addrs: Vec<Address> = Vec::new(&env);
        for i in 0..ranked.len() {
            ranked_addrs.push_back(ranked.get_unchecked(i).player);
        }

        let distributor_addr = get_distributor(&env);
        let settled = PrizeDistributorClient::new(&env, &distributor_addr).distribute(
            &env.current_contract_address(),
            &session_id,
            &ranked_addrs,
            &pool,
        );

        if settled {
            session.settled = true;
            set_session(&env, session_id, &session);

            SessionSettled {
                session_id,
                pool,
                players: session.player_count,
            }
            .publish(&env);
        }

        Ok(settled)
    }

    pub fn get_session(env: Env, session_id: u64) -> Result<SessionData, Error> {
        require_initialized(&env)?;
        get_session_data(&env, session_id)
    }

    /// Derived lifecycle state: `Settled` once a distribution committed,
    /// else `Ended` when the window has passed, else `Open`.
    pub fn status(env: Env, session_id: u64) -> Result<GameStatus, Error> {
        require_initialized(&env)?;
        let session = get_session_data(&env, session_id)?;
        if session.settled {
            Ok(GameStatus::Settled)
        } else if env.ledger().timestamp() >= session.end_time {
            Ok(GameStatus::Ended)
        } else {
            Ok(GameStatus::Open)
        }
    }

    pub fn get_player(env: Env, session_id: u64, player: Address) -> Result<PlayerRecord, Error> {
        require_initialized(&env)?;
        get_session_data(&env, session_id)?;
        env.storage()
            .persistent()
            .get(&DataKey::Player(session_id, player))
            .ok_or(Error::PlayerNotRegistered)
    }

    pub fn get_players(env: Env, session_id: u64) -> Result<Vec<Address>, Error> {
        require_initialized(&env)?;
        get_session_data(&env, session_id)?;
        Ok(env
            .storage()
            .persistent()
            .get(&DataKey::Players(session_id))
            .unwrap_or(Vec::new(&env)))
    }

    /// Current rankings: score descending, ties broken by ascending address
    /// so prize order is reproducible.
    pub fn rankings(env: Env, session_id: u64) -> Result<Vec<ScoreEntry>, Error> {
        require_initialized(&env)?;
        get_session_data(&env, session_id)?;
        Ok(rank_players(&env, session_id))
    }

    /// The session's escrowed pool, read from prize storage — the single
    /// source of truth for money.
    pub fn pool(env: Env, session_id: u64) -> Result<i128, Error> {
        require_initialized(&env)?;
        get_session_data(&env, session_id)?;
        let storage_addr = get_prize_storage(&env);
        Ok(PrizeStorageClient::new(&env, &storage_addr).pool(&session_id))
    }

    /// Replace the contract code while keeping the game address stable.
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
        .expect("Game: prize storage not set")
}

fn get_distributor(env: &Env) -> Address {
    env.storage()
        .instance()
        .get(&DataKey::Distributor)
        .expect("Game: distributor not set")
}

fn get_session_data(env: &Env, session_id: u64) -> Result<SessionData, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Session(session_id))
        .ok_or(Error::SessionNotFound)
}

fn action_from_u32(value: u32) -> Option<ActionType> {
    match value {
        0 => Some(ActionType::Registration),
        1 => Some(ActionType::Move),
        2 => Some(ActionType::Attack),
        3 => Some(ActionType::Defend),
        _ => None,
    }
}

/// Deterministic score deltas for the closed action vocabulary.
fn score_delta(action: ActionType) -> u32 {
    match action {
        ActionType::Registration => 10,
        ActionType::Move => 1,
        ActionType::Attack => 5,
        ActionType::Defend => 2,
    }
}

/// Insertion-sort the roster into rank order: score descending, ties broken
/// by ascending address.
fn rank_players(env: &Env, session_id: u64) -> Vec<ScoreEntry> {
    let players: Vec<Address> = env
        .storage()
        .persistent()
        .get(&DataKey::Players(session_id))
        .unwrap_or(Vec::new(env));

    let mut ranked: Vec<ScoreEntry> = Vec::new(env);
    for i in 0..players.len() {
        let player = players.get_unchecked(i);
        let record: PlayerRecord = env
            .storage()
            .persistent()
            .get(&DataKey::Player(session_id, player.clone()))
            .expect("Game: roster entry without record");
        let score = record.score;

        let mut inserted = false;
        for j in 0..ranked.len() {
            let entry = ranked.get_unchecked(j);
            if score > entry.score || (score == entry.score && player < entry.player) {
                ranked.insert(
                    j,
                    ScoreEntry {
                        player: player.clone(),
                        score,
                    },
                );
                inserted = true;
                break;
            }
        }
        if !inserted {
            ranked.push_back(ScoreEntry { player, score });
        }
    }

    ranked
}

fn set_session(env: &Env, session_id: u64, session: &SessionData) {
    set_persistent(env, DataKey::Session(session_id), session);
}

fn set_persistent<T>(env: &Env, key: DataKey, value: &T)
where
    T: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(&key, value);
    extend_persistent_ttl(env, &key);
}

fn extend_persistent_ttl(env: &Env, key: &DataKey) {
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}
