//! # Inventory Ledger
//!
//! Ownership and equip state of item instances, and the recomputation of
//! each player's cached [`StatTotals`] whenever that state changes.
//!
//! Every mutating operation holds the affected player's lock for its whole
//! read-modify-write, and a transfer locks both players in ascending id
//! order. Totals are always written in the same commit as the instance
//! change that caused them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::catalog::{Catalog, ItemDefinition};
use crate::error::{EconomyError, EconomyResult, EntityKind};
use crate::stats::StatTotals;
use crate::store::{EconomyStore, InstanceId, ItemInstance, PlayerAccount, PlayerId, WriteBatch};

/// Exclusive hold on one player's state.
pub type PlayerGuard = ArcMutexGuard<RawMutex, ()>;

/// Table size below which idle entries are never pruned.
const MIN_PRUNE_AT: usize = 64;

/// Lazily created per-player mutexes.
///
/// Entries nobody holds or waits on are pruned once the table has doubled
/// in size since the last sweep.
#[derive(Debug, Default)]
pub struct PlayerLocks {
    table: Mutex<LockTable>,
}

#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PlayerId, Arc<Mutex<()>>>,
    prune_at: usize,
}

impl PlayerLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the player's lock is held.
    pub fn lock(&self, player: PlayerId) -> PlayerGuard {
        let lock = {
            let mut table = self.table.lock();
            if table.locks.len() >= table.prune_at.max(MIN_PRUNE_AT) {
                // Only the table holds these: no guard, no waiter.
                table.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
                table.prune_at = table.locks.len() * 2;
            }
            Arc::clone(table.locks.entry(player).or_default())
        };
        lock.lock_arc()
    }

    /// Number of players with a lock entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().locks.len()
    }

    /// Returns true if no player has a lock entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().locks.is_empty()
    }

    /// Locks two players in ascending id order.
    ///
    /// Returns a single guard when both ids are equal.
    pub fn lock_pair(&self, a: PlayerId, b: PlayerId) -> (PlayerGuard, Option<PlayerGuard>) {
        match a.cmp(&b) {
            std::cmp::Ordering::Equal => (self.lock(a), None),
            std::cmp::Ordering::Less => {
                let first = self.lock(a);
                (first, Some(self.lock(b)))
            }
            std::cmp::Ordering::Greater => {
                let first = self.lock(b);
                (first, Some(self.lock(a)))
            }
        }
    }
}

/// An instance paired with its definition.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedItem {
    /// The owned copy.
    pub instance: ItemInstance,
    /// Its catalog definition.
    pub definition: ItemDefinition,
}

/// Grants, equips and transfers item instances.
pub struct InventoryLedger {
    store: Arc<dyn EconomyStore>,
    catalog: Arc<Catalog>,
    locks: PlayerLocks,
}

impl InventoryLedger {
    /// Creates a ledger over a store and catalog.
    #[must_use]
    pub fn new(store: Arc<dyn EconomyStore>, catalog: Arc<Catalog>) -> Self {
        Self {
            store,
            catalog,
            locks: PlayerLocks::new(),
        }
    }

    /// The per-player lock table.
    #[must_use]
    pub fn locks(&self) -> &PlayerLocks {
        &self.locks
    }

    /// Creates a new instance for `player`, adding it to `batch`.
    ///
    /// When `equip` is set the player's totals are recomputed in memory; the
    /// caller is responsible for putting `player` into the same batch.
    /// Must be called with the player's lock held.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::PersistenceFailure` if the store cannot
    /// allocate an id or read the player's instances.
    pub fn stage_grant(
        &self,
        player: &mut PlayerAccount,
        item: &ItemDefinition,
        equip: bool,
        batch: &mut WriteBatch,
    ) -> EconomyResult<ItemInstance> {
        let instance = ItemInstance {
            id: self.store.allocate_instance_id()?,
            item_id: item.id.clone(),
            owner: player.id,
            equipped: equip,
            acquired_at: Utc::now(),
        };

        if equip {
            let mut owned = self.store.instances_of(player.id)?;
            owned.push(instance.clone());
            player.totals = self.totals_for(&owned)?;
        }

        batch.put_instance(instance.clone());
        Ok(instance)
    }

    /// Grants one instance of `item_id` to a player.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotFound` for an unknown player or item and
    /// `EconomyError::PersistenceFailure` if the commit fails.
    pub fn grant(
        &self,
        player_id: PlayerId,
        item_id: &str,
        equip: bool,
    ) -> EconomyResult<ItemInstance> {
        let item = self.catalog.require_item(item_id)?;
        let _guard = self.locks.lock(player_id);

        let mut player = self.require_player(player_id)?;
        let mut batch = WriteBatch::new();
        let instance = self.stage_grant(&mut player, item, equip, &mut batch)?;
        if equip {
            batch.put_player(player);
        }
        self.store.commit(batch)?;

        tracing::debug!(player_id, item_id, instance_id = instance.id, equip, "item granted");
        Ok(instance)
    }

    /// Sets the equip flag on an instance and recomputes the owner's totals.
    ///
    /// Setting the flag to its current value is not an error.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotFound` for an unknown instance or player
    /// and `EconomyError::NotOwned` if the player does not own it.
    pub fn set_equipped(
        &self,
        instance_id: InstanceId,
        player_id: PlayerId,
        equipped: bool,
    ) -> EconomyResult<StatTotals> {
        let _guard = self.locks.lock(player_id);

        let mut instance = self.require_instance(instance_id)?;
        if instance.owner != player_id {
            return Err(EconomyError::NotOwned {
                instance_id,
                player_id,
            });
        }
        let mut player = self.require_player(player_id)?;

        instance.equipped = equipped;
        let owned = replace(self.store.instances_of(player_id)?, &instance);
        player.totals = self.totals_for(&owned)?;
        let totals = player.totals;

        let mut batch = WriteBatch::new();
        batch.put_instance(instance);
        batch.put_player(player);
        self.store.commit(batch)?;

        tracing::debug!(player_id, instance_id, equipped, "equip state changed");
        Ok(totals)
    }

    /// Moves an instance to another player, unequipped.
    ///
    /// Both players' totals are recomputed in the same commit.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotFound` for an unknown instance or player
    /// and `EconomyError::NotOwned` if `from` does not own it.
    pub fn transfer(
        &self,
        instance_id: InstanceId,
        from: PlayerId,
        to: PlayerId,
    ) -> EconomyResult<ItemInstance> {
        let _guards = self.locks.lock_pair(from, to);

        let mut instance = self.require_instance(instance_id)?;
        if instance.owner != from {
            return Err(EconomyError::NotOwned {
                instance_id,
                player_id: from,
            });
        }
        let mut sender = self.require_player(from)?;
        let mut receiver = self.require_player(to)?;

        instance.owner = to;
        instance.equipped = false;

        let mut batch = WriteBatch::new();
        let sender_owned: Vec<_> = self
            .store
            .instances_of(from)?
            .into_iter()
            .filter(|i| i.id != instance_id)
            .collect();
        sender.totals = self.totals_for(&sender_owned)?;

        if from == to {
            batch.put_player(sender);
        } else {
            let receiver_owned = self.store.instances_of(to)?;
            receiver.totals = self.totals_for(&receiver_owned)?;
            batch.put_player(sender);
            batch.put_player(receiver);
        }
        batch.put_instance(instance.clone());
        self.store.commit(batch)?;

        tracing::debug!(instance_id, from, to, "item transferred");
        Ok(instance)
    }

    /// Rebuilds a player's totals from their equipped items and stores them.
    ///
    /// Idempotent: calling twice yields the same totals and no second write.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotFound` for an unknown player or a dangling
    /// item definition.
    pub fn recompute(&self, player_id: PlayerId) -> EconomyResult<StatTotals> {
        let _guard = self.locks.lock(player_id);

        let mut player = self.require_player(player_id)?;
        let totals = self.totals_for(&self.store.instances_of(player_id)?)?;
        if player.totals != totals {
            player.totals = totals;
            let mut batch = WriteBatch::new();
            batch.put_player(player);
            self.store.commit(batch)?;
        }
        Ok(totals)
    }

    /// Every instance a player owns, with definitions, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotFound` for an unknown player.
    pub fn items_of(&self, player_id: PlayerId) -> EconomyResult<Vec<OwnedItem>> {
        self.require_player(player_id)?;
        self.store
            .instances_of(player_id)?
            .into_iter()
            .map(|instance| {
                let definition = self.catalog.require_item(&instance.item_id)?.clone();
                Ok(OwnedItem {
                    instance,
                    definition,
                })
            })
            .collect()
    }

    /// Totals for the equipped subset of `owned`.
    fn totals_for(&self, owned: &[ItemInstance]) -> EconomyResult<StatTotals> {
        let equipped = owned
            .iter()
            .filter(|i| i.equipped)
            .map(|i| self.catalog.require_item(&i.item_id))
            .collect::<EconomyResult<Vec<_>>>()?;
        Ok(StatTotals::aggregate(equipped))
    }

    fn require_player(&self, id: PlayerId) -> EconomyResult<PlayerAccount> {
        self.store
            .player(id)?
            .ok_or_else(|| EconomyError::not_found(EntityKind::Player, id))
    }

    fn require_instance(&self, id: InstanceId) -> EconomyResult<ItemInstance> {
        self.store
            .instance(id)?
            .ok_or_else(|| EconomyError::not_found(EntityKind::ItemInstance, id))
    }
}

fn replace(mut owned: Vec<ItemInstance>, updated: &ItemInstance) -> Vec<ItemInstance> {
    for slot in &mut owned {
        if slot.id == updated.id {
            *slot = updated.clone();
        }
    }
    owned
}
