//! # Stat Totals
//!
//! A player's cached totals are a pure function of the item definitions
//! they have equipped: the base values plus the sum of every equipped
//! attribute in its category. `auto_tap` is an OR.
//!
//! Aggregation never accumulates onto previous totals, so recomputing is
//! idempotent and removing an item restores the earlier values.

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeCategory;
use crate::catalog::ItemDefinition;
use crate::fixed_point::FixedPoint;

/// Coins per tap with nothing equipped.
pub const BASE_COINS_PER_TAP: FixedPoint = FixedPoint::from_parts(0, 100_000);

/// Offline storage with nothing equipped.
pub const BASE_OFFLINE_STORAGE: u64 = 100;

/// Cached per-player totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatTotals {
    /// Coins earned per tap.
    pub coins_per_tap: FixedPoint,
    /// Offline storage capacity.
    pub offline_storage: u64,
    /// Chest luck bonus, in percent.
    pub luck: u64,
    /// Critical tap chance, in percent.
    pub crit_chance: u64,
    /// Whether auto tap is enabled.
    pub auto_tap: bool,
}

impl StatTotals {
    /// Totals with nothing equipped.
    #[must_use]
    pub const fn base() -> Self {
        Self {
            coins_per_tap: BASE_COINS_PER_TAP,
            offline_storage: BASE_OFFLINE_STORAGE,
            luck: 0,
            crit_chance: 0,
            auto_tap: false,
        }
    }

    /// Totals for a set of equipped item definitions.
    pub fn aggregate<'a>(equipped: impl IntoIterator<Item = &'a ItemDefinition>) -> Self {
        let mut totals = Self::base();

        for key in equipped.into_iter().flat_map(|item| item.attributes.iter()) {
            let value = key.value();
            match key.category() {
                AttributeCategory::CoinsPerTap => {
                    totals.coins_per_tap = totals.coins_per_tap.saturating_add(value);
                }
                AttributeCategory::OfflineStorage => {
                    totals.offline_storage = totals.offline_storage.saturating_add(value.whole());
                }
                AttributeCategory::Luck => {
                    totals.luck = totals.luck.saturating_add(value.whole());
                }
                AttributeCategory::CritChance => {
                    totals.crit_chance = totals.crit_chance.saturating_add(value.whole());
                }
                AttributeCategory::AutoTap => totals.auto_tap = true,
                AttributeCategory::Unaggregated => {}
            }
        }

        totals
    }
}

impl Default for StatTotals {
    fn default() -> Self {
        Self::base()
    }
}
