//! # Economy System
//!
//! The entry point callers talk to. Ties the catalog, the selection
//! engine, the inventory ledger and the opening ledger together.
//!
//! ## The Opening Pipeline
//!
//! ```text
//! open_chest(identity, chest) ->
//!   1. Requested  - look up the chest, resolve its pool
//!   2. Validated  - load or provision the player, check funds
//!   3. Selected   - weighted draw over the pool
//!   4. Granted    - deduct cost + create instance, one commit
//!   5. Logged     - append to the opening ledger (best effort)
//!   6. Completed  - return the item view
//! ```
//!
//! Nothing is written before stage 4. A failure at or before the commit
//! leaves the player untouched; a ledger failure after it is logged and
//! the opening still succeeds.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::catalog::{Catalog, ChestSummary, Currency, ItemDefinition, ItemView};
use crate::config::EconomyConfig;
use crate::error::{EconomyError, EconomyResult, EntityKind};
use crate::fixed_point::FixedPoint;
use crate::inventory::{InventoryLedger, OwnedItem};
use crate::ledger::{OpeningEntry, OpeningLedger};
use crate::loot::{LootTable, RandomSource, RngSource};
use crate::rarity::Rarity;
use crate::stats::StatTotals;
use crate::store::{EconomyStore, InstanceId, ItemInstance, PlayerAccount, PlayerId, WriteBatch};

/// Stage of a chest opening, for logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpeningStage {
    /// Request received.
    Requested,
    /// Chest, pool, player and funds checked.
    Validated,
    /// Item drawn.
    Selected,
    /// Cost and grant committed.
    Granted,
    /// Ledger record written, or its failure logged.
    Logged,
    /// Result returned.
    Completed,
}

impl fmt::Display for OpeningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "requested",
            Self::Validated => "validated",
            Self::Selected => "selected",
            Self::Granted => "granted",
            Self::Logged => "logged",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Result of a successful chest opening.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpenedChest {
    /// The awarded item.
    pub item: ItemView,
    /// Rarity tier of the award.
    pub rarity: Rarity,
    /// The new instance in the player's inventory.
    pub instance_id: InstanceId,
    /// Amount charged.
    pub cost_paid: FixedPoint,
    /// Currency charged.
    pub currency: Currency,
    /// Balance in `currency` after the opening.
    pub balance_after: FixedPoint,
    /// Ledger record id, absent when the audit write failed.
    pub record_id: Option<u64>,
    /// Time taken in microseconds.
    pub time_us: u64,
}

/// One entry of a chest's visible drop pool.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChestContentItem {
    /// Item that can drop.
    pub item: ItemView,
    /// Effective weight in the resolved pool.
    pub drop_weight: f64,
}

/// A chest with its resolved drop pool.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChestContents {
    /// The chest.
    pub chest: ChestSummary,
    /// Candidates in draw order.
    pub items: Vec<ChestContentItem>,
}

/// The chest economy service.
pub struct EconomySystem {
    catalog: Arc<Catalog>,
    store: Arc<dyn EconomyStore>,
    ledger: Arc<dyn OpeningLedger>,
    inventory: InventoryLedger,
    rng: Mutex<Box<dyn RandomSource>>,
    config: EconomyConfig,
}

impl EconomySystem {
    /// Creates the service.
    ///
    /// Draws are seeded from `config.rng_seed` when set, otherwise from
    /// operating-system entropy.
    #[must_use]
    pub fn new(
        catalog: Arc<Catalog>,
        store: Arc<dyn EconomyStore>,
        ledger: Arc<dyn OpeningLedger>,
        config: EconomyConfig,
    ) -> Self {
        let rng: Box<dyn RandomSource> = match config.rng_seed {
            Some(seed) => Box::new(RngSource::seeded(seed)),
            None => Box::new(RngSource::from_entropy()),
        };
        let inventory = InventoryLedger::new(Arc::clone(&store), Arc::clone(&catalog));

        Self {
            catalog,
            store,
            ledger,
            inventory,
            rng: Mutex::new(rng),
            config,
        }
    }

    /// Replaces the random source.
    #[must_use]
    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    /// The loaded catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The active settings.
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Opens a chest for the player with the given external identity.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown or inactive chest, or an unknown player
    ///   when auto-provisioning is off
    /// - `EmptyLootTable` when the chest's pool has no positive weight
    /// - `InsufficientFunds` when charging is on and the balance is short
    /// - `PersistenceFailure` when the grant cannot be committed
    ///
    /// None of these leave a partial write behind.
    pub fn open_chest(&self, identity: &str, chest_name: &str) -> EconomyResult<OpenedChest> {
        let start = Instant::now();
        tracing::debug!(stage = %OpeningStage::Requested, identity, chest = chest_name);

        let chest = self
            .catalog
            .chest_by_name(chest_name)
            .ok_or_else(|| EconomyError::not_found(EntityKind::Chest, chest_name))?;
        let table = self.catalog.resolve_candidates(chest)?;

        let granted = match self.commit_opening(identity, &table) {
            Err(EconomyError::DuplicateIdentity(_)) => {
                tracing::debug!(identity, "identity provisioned concurrently, retrying");
                self.commit_opening(identity, &table)?
            }
            other => other?,
        };
        let GrantedOpening {
            player_id,
            item,
            instance,
            cost,
            balance_after,
            provisioned,
        } = granted;
        if provisioned {
            tracing::info!(player_id, identity, "player created");
        }

        let entry = OpeningEntry {
            player_id,
            chest_id: chest.id.clone(),
            item_id: item.id.clone(),
            rarity: item.rarity,
            cost_paid: cost,
            currency: chest.currency,
            opened_at: Utc::now(),
        };
        let record_id = match self.ledger.append(entry) {
            Ok(record) => Some(record.id),
            Err(err) => {
                tracing::warn!(player_id, chest = %chest.id, error = %err, "opening not recorded");
                None
            }
        };
        tracing::debug!(stage = %OpeningStage::Logged, player_id, record_id);

        let time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        tracing::info!(
            stage = %OpeningStage::Completed,
            player_id,
            chest = %chest.id,
            item = %item.id,
            rarity = item.rarity.id(),
            time_us,
            "chest opened"
        );

        Ok(OpenedChest {
            item: self.catalog.item_view(item),
            rarity: item.rarity,
            instance_id: instance.id,
            cost_paid: cost,
            currency: chest.currency,
            balance_after,
            record_id,
            time_us,
        })
    }

    /// The resolved drop pool of a chest, in draw order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown chest and `EmptyLootTable` when
    /// nothing resolves.
    pub fn chest_contents(&self, chest_name: &str) -> EconomyResult<ChestContents> {
        let chest = self
            .catalog
            .chest_by_name(chest_name)
            .ok_or_else(|| EconomyError::not_found(EntityKind::Chest, chest_name))?;
        let table = self.catalog.resolve_candidates(chest)?;

        Ok(ChestContents {
            chest: ChestSummary::from(chest),
            items: table
                .candidates()
                .iter()
                .map(|c| ChestContentItem {
                    item: self.catalog.item_view(c.item),
                    drop_weight: c.weight,
                })
                .collect(),
        })
    }

    /// Active chests, cheapest first.
    #[must_use]
    pub fn list_chests(&self) -> Vec<ChestSummary> {
        self.catalog
            .chests_by_cost()
            .into_iter()
            .map(ChestSummary::from)
            .collect()
    }

    /// Returns the player with this identity, creating it if needed.
    ///
    /// Concurrent calls for the same identity all return the same account.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the store fails.
    pub fn ensure_player(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> EconomyResult<PlayerAccount> {
        if let Some(existing) = self.store.player_by_identity(identity)? {
            return Ok(existing);
        }

        let account = self.new_account(identity, display_name)?;

        let mut batch = WriteBatch::new();
        batch.put_player(account.clone());
        match self.store.commit(batch) {
            Ok(()) => {
                tracing::info!(player_id = account.id, identity, "player created");
                Ok(account)
            }
            Err(EconomyError::DuplicateIdentity(_)) => self
                .store
                .player_by_identity(identity)?
                .ok_or_else(|| EconomyError::not_found(EntityKind::Player, identity)),
            Err(err) => Err(err),
        }
    }

    /// Loads a player by internal id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn player(&self, player_id: PlayerId) -> EconomyResult<PlayerAccount> {
        self.store
            .player(player_id)?
            .ok_or_else(|| EconomyError::not_found(EntityKind::Player, player_id))
    }

    /// Loads a player by external identity.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown identity.
    pub fn player_by_identity(&self, identity: &str) -> EconomyResult<PlayerAccount> {
        self.store
            .player_by_identity(identity)?
            .ok_or_else(|| EconomyError::not_found(EntityKind::Player, identity))
    }

    /// Every item a player owns, ordered by instance id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown player.
    pub fn player_items(&self, player_id: PlayerId) -> EconomyResult<Vec<OwnedItem>> {
        self.inventory.items_of(player_id)
    }

    /// Adds currency to a player's balance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown player and `ArithmeticOverflow`
    /// if the balance would overflow.
    pub fn credit(
        &self,
        player_id: PlayerId,
        currency: Currency,
        amount: FixedPoint,
    ) -> EconomyResult<PlayerAccount> {
        let _guard = self.inventory.locks().lock(player_id);
        let mut player = self.player(player_id)?;
        player.credit(currency, amount)?;

        let mut batch = WriteBatch::new();
        batch.put_player(player.clone());
        self.store.commit(batch)?;

        tracing::debug!(player_id, currency = currency.as_str(), amount = %amount, "balance credited");
        Ok(player)
    }

    /// Grants an item outside of chest opening.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown player or item.
    pub fn grant(
        &self,
        player_id: PlayerId,
        item_id: &str,
        equip: bool,
    ) -> EconomyResult<ItemInstance> {
        self.inventory.grant(player_id, item_id, equip)
    }

    /// Equips or unequips an owned instance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `NotOwned`.
    pub fn set_equipped(
        &self,
        instance_id: InstanceId,
        player_id: PlayerId,
        equipped: bool,
    ) -> EconomyResult<StatTotals> {
        self.inventory.set_equipped(instance_id, player_id, equipped)
    }

    /// Moves an instance between players.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `NotOwned`.
    pub fn transfer(
        &self,
        instance_id: InstanceId,
        from: PlayerId,
        to: PlayerId,
    ) -> EconomyResult<ItemInstance> {
        self.inventory.transfer(instance_id, from, to)
    }

    /// Rebuilds a player's cached totals.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown player.
    pub fn recompute(&self, player_id: PlayerId) -> EconomyResult<StatTotals> {
        self.inventory.recompute(player_id)
    }

    /// Syncs the ledger and closes the store.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the store is closed regardless.
    pub fn shutdown(&self) -> EconomyResult<()> {
        let synced = self.ledger.sync();
        self.store.close()?;
        tracing::info!("economy shut down");
        synced
    }

    fn new_account(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> EconomyResult<PlayerAccount> {
        Ok(PlayerAccount {
            id: self.store.allocate_player_id()?,
            external_identity: identity.to_string(),
            display_name: display_name.map(str::to_string),
            coins: self.config.starting_coins,
            gems: self.config.starting_gems,
            totals: StatTotals::base(),
            created_at: Utc::now(),
        })
    }

    /// Validates, draws and commits one opening.
    ///
    /// An unknown identity is provisioned in memory and written in the same
    /// batch as the debit and the grant, so a failed opening stores nothing.
    fn commit_opening<'a>(
        &self,
        identity: &str,
        table: &LootTable<'a>,
    ) -> EconomyResult<GrantedOpening<'a>> {
        let chest = table.chest();
        let (player_id, fresh) = match self.store.player_by_identity(identity)? {
            Some(player) => (player.id, None),
            None if self.config.auto_provision_players => {
                let account =
                    self.new_account(identity, Some(&self.config.default_display_name))?;
                (account.id, Some(account))
            }
            None => return Err(EconomyError::not_found(EntityKind::Player, identity)),
        };
        let provisioned = fresh.is_some();
        let _guard = self.inventory.locks().lock(player_id);

        let mut player = match fresh {
            Some(account) => account,
            None => self
                .store
                .player(player_id)?
                .ok_or_else(|| EconomyError::not_found(EntityKind::Player, identity))?,
        };
        let cost = if self.config.charge_on_open {
            FixedPoint::from_whole(chest.cost)
        } else {
            FixedPoint::ZERO
        };
        player.debit(chest.currency, cost)?;
        tracing::debug!(stage = %OpeningStage::Validated, player_id, cost = %cost);

        let item = {
            let mut rng = self.rng.lock();
            table.select(&mut **rng)?
        };
        tracing::debug!(stage = %OpeningStage::Selected, player_id, item = %item.id);

        let mut batch = WriteBatch::new();
        let instance = self
            .inventory
            .stage_grant(&mut player, item, false, &mut batch)?;
        let balance_after = player.balance(chest.currency);
        batch.put_player(player);
        self.store.commit(batch)?;
        tracing::debug!(stage = %OpeningStage::Granted, player_id, instance_id = instance.id);

        Ok(GrantedOpening {
            player_id,
            item,
            instance,
            cost,
            balance_after,
            provisioned,
        })
    }
}

/// What the commit step of an opening produced.
struct GrantedOpening<'a> {
    player_id: PlayerId,
    item: &'a ItemDefinition,
    instance: ItemInstance,
    cost: FixedPoint,
    balance_after: FixedPoint,
    provisioned: bool,
}

impl Drop for EconomySystem {
    fn drop(&mut self) {
        if let Err(err) = self.store.close() {
            tracing::warn!(error = %err, "store did not close cleanly");
        }
    }
}
