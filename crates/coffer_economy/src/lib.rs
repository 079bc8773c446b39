//! # COFFER Economy System
//!
//! Chest-opening economy: a catalog of items and chests, a weighted
//! random selection engine, an inventory ledger with cached per-player
//! stat totals, and an append-only audit log of openings.
//!
//! ## Design Principles
//!
//! 1. **Fixed-point balances** - coins, prices and cached stats never use floats
//! 2. **Injected randomness** - every draw goes through a [`RandomSource`]
//! 3. **All-or-nothing openings** - cost deduction and grant share one commit
//! 4. **External configuration** - rarities, items and chests live in TOML
//!
//! ## Thread Safety
//!
//! [`EconomySystem`] is `Send + Sync`. Operations on the same player are
//! serialized by a per-player lock; different players proceed in parallel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use coffer_economy::{Catalog, EconomyConfig, EconomySystem, MemoryLedger, MemoryStore};
//!
//! let catalog = Arc::new(Catalog::load("data/catalog.toml")?);
//! let system = EconomySystem::new(
//!     catalog,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryLedger::new()),
//!     EconomyConfig::default(),
//! );
//!
//! let opened = system.open_chest("telegram:1234", "basic")?;
//! println!("{} ({})", opened.item.name, opened.item.rarity.name);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod attribute;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fixed_point;
pub mod inventory;
pub mod ledger;
pub mod loot;
pub mod rarity;
pub mod stats;
pub mod store;
pub mod systems;

pub use attribute::{AttributeCategory, AttributeKey};
pub use catalog::{
    Catalog, ChestDefinition, ChestId, ChestSummary, Currency, DropEntry, DropTable,
    ItemDefinition, ItemId, ItemView, RarityView, RarityWeights, Slot,
};
pub use config::EconomyConfig;
pub use error::{EconomyError, EconomyResult, EntityKind};
pub use fixed_point::FixedPoint;
pub use inventory::{InventoryLedger, OwnedItem, PlayerLocks};
pub use ledger::{ChestOpeningRecord, FileLedger, MemoryLedger, OpeningEntry, OpeningLedger};
pub use loot::{select_weighted, Candidate, LootStatistics, LootTable, RandomSource, RngSource};
pub use rarity::{Rarity, RarityRegistry, RarityTier};
pub use stats::StatTotals;
pub use store::{
    EconomyStore, InstanceId, ItemInstance, MemoryStore, PlayerAccount, PlayerId, WriteBatch,
};
pub use systems::{ChestContentItem, ChestContents, EconomySystem, OpenedChest, OpeningStage};
