//! # Attribute Keys
//!
//! The closed set of stat modifiers an item can carry. Unknown keys are
//! rejected when the catalog is deserialized, never at use time.

use serde::{Deserialize, Serialize};

use crate::fixed_point::FixedPoint;

/// Which cached total an attribute feeds into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeCategory {
    /// `coins_per_tap_*`, summed.
    CoinsPerTap,
    /// `offline_storage_*`, summed.
    OfflineStorage,
    /// `luck_*`, summed.
    Luck,
    /// `crit_chance_*`, summed.
    CritChance,
    /// `auto_tap`, OR-ed.
    AutoTap,
    /// Known to the catalog but not part of the cached totals.
    Unaggregated,
}

/// A stat modifier key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    /// +0.1 coins per tap.
    #[serde(rename = "coins_per_tap_1")]
    CoinsPerTap1,
    /// +0.5 coins per tap.
    #[serde(rename = "coins_per_tap_2")]
    CoinsPerTap2,
    /// +1.0 coins per tap.
    #[serde(rename = "coins_per_tap_3")]
    CoinsPerTap3,
    /// +100 offline storage.
    #[serde(rename = "offline_storage_100")]
    OfflineStorage100,
    /// +500 offline storage.
    #[serde(rename = "offline_storage_500")]
    OfflineStorage500,
    /// +1000 offline storage.
    #[serde(rename = "offline_storage_1000")]
    OfflineStorage1000,
    /// +10% chest luck.
    #[serde(rename = "luck_10")]
    Luck10,
    /// +25% chest luck.
    #[serde(rename = "luck_25")]
    Luck25,
    /// +50% chest luck.
    #[serde(rename = "luck_50")]
    Luck50,
    /// 5% crit chance.
    #[serde(rename = "crit_chance_5")]
    CritChance5,
    /// 10% crit chance.
    #[serde(rename = "crit_chance_10")]
    CritChance10,
    /// Auto tap enabled.
    AutoTap,
    /// 2x offline earnings.
    DoubleOffline,
}

impl AttributeKey {
    /// Every key, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::CoinsPerTap1,
        Self::CoinsPerTap2,
        Self::CoinsPerTap3,
        Self::OfflineStorage100,
        Self::OfflineStorage500,
        Self::OfflineStorage1000,
        Self::Luck10,
        Self::Luck25,
        Self::Luck50,
        Self::CritChance5,
        Self::CritChance10,
        Self::AutoTap,
        Self::DoubleOffline,
    ];

    /// The configuration key, e.g. `offline_storage_500`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoinsPerTap1 => "coins_per_tap_1",
            Self::CoinsPerTap2 => "coins_per_tap_2",
            Self::CoinsPerTap3 => "coins_per_tap_3",
            Self::OfflineStorage100 => "offline_storage_100",
            Self::OfflineStorage500 => "offline_storage_500",
            Self::OfflineStorage1000 => "offline_storage_1000",
            Self::Luck10 => "luck_10",
            Self::Luck25 => "luck_25",
            Self::Luck50 => "luck_50",
            Self::CritChance5 => "crit_chance_5",
            Self::CritChance10 => "crit_chance_10",
            Self::AutoTap => "auto_tap",
            Self::DoubleOffline => "double_offline",
        }
    }

    /// The category this key aggregates into.
    #[must_use]
    pub const fn category(self) -> AttributeCategory {
        match self {
            Self::CoinsPerTap1 | Self::CoinsPerTap2 | Self::CoinsPerTap3 => {
                AttributeCategory::CoinsPerTap
            }
            Self::OfflineStorage100 | Self::OfflineStorage500 | Self::OfflineStorage1000 => {
                AttributeCategory::OfflineStorage
            }
            Self::Luck10 | Self::Luck25 | Self::Luck50 => AttributeCategory::Luck,
            Self::CritChance5 | Self::CritChance10 => AttributeCategory::CritChance,
            Self::AutoTap => AttributeCategory::AutoTap,
            Self::DoubleOffline => AttributeCategory::Unaggregated,
        }
    }

    /// The configured value of this modifier.
    #[must_use]
    pub const fn value(self) -> FixedPoint {
        match self {
            Self::CoinsPerTap1 => FixedPoint::from_parts(0, 100_000),
            Self::CoinsPerTap2 => FixedPoint::from_parts(0, 500_000),
            Self::CoinsPerTap3 | Self::AutoTap => FixedPoint::ONE,
            Self::OfflineStorage100 => FixedPoint::from_whole(100),
            Self::OfflineStorage500 => FixedPoint::from_whole(500),
            Self::OfflineStorage1000 => FixedPoint::from_whole(1000),
            Self::Luck10 | Self::CritChance10 => FixedPoint::from_whole(10),
            Self::Luck25 => FixedPoint::from_whole(25),
            Self::Luck50 => FixedPoint::from_whole(50),
            Self::CritChance5 => FixedPoint::from_whole(5),
            Self::DoubleOffline => FixedPoint::from_whole(2),
        }
    }

    /// Text shown on the item card.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::CoinsPerTap1 => "+0.1 Coins per Tap",
            Self::CoinsPerTap2 => "+0.5 Coins per Tap",
            Self::CoinsPerTap3 => "+1.0 Coins per Tap",
            Self::OfflineStorage100 => "+100 Offline Storage",
            Self::OfflineStorage500 => "+500 Offline Storage",
            Self::OfflineStorage1000 => "+1000 Offline Storage",
            Self::Luck10 => "+10% Chest Luck",
            Self::Luck25 => "+25% Chest Luck",
            Self::Luck50 => "+50% Chest Luck",
            Self::CritChance5 => "5% Crit Chance",
            Self::CritChance10 => "10% Crit Chance",
            Self::AutoTap => "Auto Tap Enabled",
            Self::DoubleOffline => "2x Offline Earnings",
        }
    }
}
