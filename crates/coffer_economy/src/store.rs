//! # Player and Inventory Store
//!
//! Mutable economy state: player accounts and the item instances they own.
//!
//! Writes go through [`EconomyStore::commit`], which applies a
//! [`WriteBatch`] atomically: either every upsert in the batch is visible
//! afterwards, or none is. Chest opening relies on this to deduct a cost
//! and grant an item in one step.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::catalog::{Currency, ItemId};
use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::FixedPoint;
use crate::stats::StatTotals;

/// Internal player identifier.
pub type PlayerId = u64;

/// Identifier of an owned item instance.
pub type InstanceId = u64;

/// A player account with balances and cached stat totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAccount {
    /// Internal id.
    pub id: PlayerId,
    /// Unique identity from the calling platform.
    pub external_identity: String,
    /// Name shown to other players.
    pub display_name: Option<String>,
    /// Coin balance.
    pub coins: FixedPoint,
    /// Gem balance.
    pub gems: FixedPoint,
    /// Totals derived from equipped items.
    pub totals: StatTotals,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl PlayerAccount {
    /// Balance in a currency.
    #[must_use]
    pub const fn balance(&self, currency: Currency) -> FixedPoint {
        match currency {
            Currency::Coins => self.coins,
            Currency::Gems => self.gems,
        }
    }

    /// Deducts `amount` from a balance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InsufficientFunds` if the balance is too low.
    /// The account is unchanged on error.
    pub fn debit(&mut self, currency: Currency, amount: FixedPoint) -> EconomyResult<()> {
        let available = self.balance(currency);
        let remaining =
            available
                .checked_sub(amount)
                .ok_or_else(|| EconomyError::InsufficientFunds {
                    currency: currency.as_str().to_string(),
                    required: amount.to_string(),
                    available: available.to_string(),
                })?;
        *self.balance_mut(currency) = remaining;
        Ok(())
    }

    /// Adds `amount` to a balance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the balance would overflow.
    pub fn credit(&mut self, currency: Currency, amount: FixedPoint) -> EconomyResult<()> {
        let updated = self.balance(currency).safe_add(amount)?;
        *self.balance_mut(currency) = updated;
        Ok(())
    }

    fn balance_mut(&mut self, currency: Currency) -> &mut FixedPoint {
        match currency {
            Currency::Coins => &mut self.coins,
            Currency::Gems => &mut self.gems,
        }
    }
}

/// One owned copy of an item definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInstance {
    /// Instance id.
    pub id: InstanceId,
    /// Definition this is a copy of.
    pub item_id: ItemId,
    /// Current owner.
    pub owner: PlayerId,
    /// Whether it contributes to the owner's totals.
    pub equipped: bool,
    /// When the owner received it.
    pub acquired_at: DateTime<Utc>,
}

/// A set of upserts applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Player rows to insert or replace.
    pub players: Vec<PlayerAccount>,
    /// Instance rows to insert or replace.
    pub instances: Vec<ItemInstance>,
}

impl WriteBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player upsert, replacing any earlier one for the same id.
    pub fn put_player(&mut self, player: PlayerAccount) {
        self.players.retain(|p| p.id != player.id);
        self.players.push(player);
    }

    /// Adds an instance upsert, replacing any earlier one for the same id.
    pub fn put_instance(&mut self, instance: ItemInstance) {
        self.instances.retain(|i| i.id != instance.id);
        self.instances.push(instance);
    }

    /// True if the batch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty() && self.instances.is_empty()
    }
}

/// Storage backend for economy state.
///
/// Reads return owned snapshots. Mutual exclusion between writers of the
/// same player is the caller's job; the store only guarantees that each
/// [`commit`](EconomyStore::commit) is atomic.
pub trait EconomyStore: Send + Sync {
    /// Loads a player by internal id.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the backend fails.
    fn player(&self, id: PlayerId) -> EconomyResult<Option<PlayerAccount>>;

    /// Loads a player by external identity.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the backend fails.
    fn player_by_identity(&self, identity: &str) -> EconomyResult<Option<PlayerAccount>>;

    /// Loads one item instance.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the backend fails.
    fn instance(&self, id: InstanceId) -> EconomyResult<Option<ItemInstance>>;

    /// Every instance owned by a player, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the backend fails.
    fn instances_of(&self, owner: PlayerId) -> EconomyResult<Vec<ItemInstance>>;

    /// Reserves a fresh player id.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the backend fails.
    fn allocate_player_id(&self) -> EconomyResult<PlayerId>;

    /// Reserves a fresh instance id.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the backend fails.
    fn allocate_instance_id(&self) -> EconomyResult<InstanceId>;

    /// Applies every upsert in the batch, or none.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::DuplicateIdentity` if a player row would
    /// reuse another player's identity, and
    /// `EconomyError::PersistenceFailure` if the backend fails or an
    /// instance names an owner that does not exist.
    fn commit(&self, batch: WriteBatch) -> EconomyResult<()>;

    /// Releases the backend. Later calls fail.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if shutdown fails.
    fn close(&self) -> EconomyResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    players: BTreeMap<PlayerId, PlayerAccount>,
    identities: HashMap<String, PlayerId>,
    instances: BTreeMap<InstanceId, ItemInstance>,
}

/// In-process store.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    next_player_id: AtomicU64,
    next_instance_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            next_player_id: AtomicU64::new(1),
            next_instance_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of player rows.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.state.read().players.len()
    }

    /// Number of instance rows.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.state.read().instances.len()
    }

    fn ensure_open(&self) -> EconomyResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EconomyError::PersistenceFailure("store is closed".into()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EconomyStore for MemoryStore {
    fn player(&self, id: PlayerId) -> EconomyResult<Option<PlayerAccount>> {
        self.ensure_open()?;
        Ok(self.state.read().players.get(&id).cloned())
    }

    fn player_by_identity(&self, identity: &str) -> EconomyResult<Option<PlayerAccount>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(state
            .identities
            .get(identity)
            .and_then(|id| state.players.get(id))
            .cloned())
    }

    fn instance(&self, id: InstanceId) -> EconomyResult<Option<ItemInstance>> {
        self.ensure_open()?;
        Ok(self.state.read().instances.get(&id).cloned())
    }

    fn instances_of(&self, owner: PlayerId) -> EconomyResult<Vec<ItemInstance>> {
        self.ensure_open()?;
        Ok(self
            .state
            .read()
            .instances
            .values()
            .filter(|i| i.owner == owner)
            .cloned()
            .collect())
    }

    fn allocate_player_id(&self) -> EconomyResult<PlayerId> {
        self.ensure_open()?;
        Ok(self.next_player_id.fetch_add(1, Ordering::SeqCst))
    }

    fn allocate_instance_id(&self) -> EconomyResult<InstanceId> {
        self.ensure_open()?;
        Ok(self.next_instance_id.fetch_add(1, Ordering::SeqCst))
    }

    fn commit(&self, batch: WriteBatch) -> EconomyResult<()> {
        self.ensure_open()?;
        let mut state = self.state.write();

        // Validate everything before touching state.
        for player in &batch.players {
            if let Some(&holder) = state.identities.get(&player.external_identity) {
                if holder != player.id {
                    return Err(EconomyError::DuplicateIdentity(
                        player.external_identity.clone(),
                    ));
                }
            }
        }
        for instance in &batch.instances {
            let owner_known = state.players.contains_key(&instance.owner)
                || batch.players.iter().any(|p| p.id == instance.owner);
            if !owner_known {
                return Err(EconomyError::PersistenceFailure(format!(
                    "instance {} names unknown owner {}",
                    instance.id, instance.owner
                )));
            }
        }

        for player in batch.players {
            if let Some(previous) = state.players.get(&player.id) {
                if previous.external_identity != player.external_identity {
                    let stale = previous.external_identity.clone();
                    state.identities.remove(&stale);
                }
            }
            state
                .identities
                .insert(player.external_identity.clone(), player.id);
            state.players.insert(player.id, player);
        }
        for instance in batch.instances {
            state.instances.insert(instance.id, instance);
        }

        Ok(())
    }

    fn close(&self) -> EconomyResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: PlayerId, identity: &str) -> PlayerAccount {
        PlayerAccount {
            id,
            external_identity: identity.into(),
            display_name: None,
            coins: FixedPoint::from_whole(100),
            gems: FixedPoint::ZERO,
            totals: StatTotals::base(),
            created_at: Utc::now(),
        }
    }

    fn instance(id: InstanceId, owner: PlayerId) -> ItemInstance {
        ItemInstance {
            id,
            item_id: "fire".into(),
            owner,
            equipped: false,
            acquired_at: Utc::now(),
        }
    }

    #[test]
    fn test_debit_insufficient_leaves_balance() {
        let mut player = account(1, "alice");
        let err = player
            .debit(Currency::Coins, FixedPoint::from_whole(150))
            .unwrap_err();
        assert!(matches!(err, EconomyError::InsufficientFunds { .. }));
        assert_eq!(player.coins, FixedPoint::from_whole(100));

        player.debit(Currency::Coins, FixedPoint::from_whole(100)).unwrap();
        assert!(player.coins.is_zero());
    }

    #[test]
    fn test_commit_and_lookup() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put_player(account(1, "alice"));
        batch.put_instance(instance(10, 1));
        store.commit(batch).unwrap();

        assert_eq!(store.player_by_identity("alice").unwrap().unwrap().id, 1);
        assert_eq!(store.instances_of(1).unwrap().len(), 1);
        assert!(store.instance(10).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_identity_rejected_atomically() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put_player(account(1, "alice"));
        store.commit(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.put_player(account(2, "alice"));
        batch.put_instance(instance(10, 1));
        let err = store.commit(batch).unwrap_err();

        assert_eq!(err, EconomyError::DuplicateIdentity("alice".into()));
        assert_eq!(store.player_count(), 1);
        assert_eq!(store.instance_count(), 0);
    }

    #[test]
    fn test_unknown_owner_rejected() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put_instance(instance(10, 99));
        assert!(matches!(
            store.commit(batch),
            Err(EconomyError::PersistenceFailure(_))
        ));
    }

    #[test]
    fn test_closed_store_fails() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(matches!(
            store.player(1),
            Err(EconomyError::PersistenceFailure(_))
        ));
    }

    #[test]
    fn test_batch_put_replaces() {
        let mut batch = WriteBatch::new();
        batch.put_player(account(1, "alice"));
        let mut updated = account(1, "alice");
        updated.coins = FixedPoint::ZERO;
        batch.put_player(updated.clone());
        assert_eq!(batch.players, vec![updated]);
    }
}
