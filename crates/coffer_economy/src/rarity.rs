//! # Rarity Registry
//!
//! The fixed, ranked set of rarity tiers. Each tier carries a base drop
//! weight and a display color. The ranking is the enum order and is what
//! the guaranteed-minimum-rarity filter compares against.

use serde::{Deserialize, Serialize};

use crate::error::{EconomyError, EconomyResult};

/// Rarity tier for items and chests, ordered by power.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Rarity {
    /// Common items (gray).
    Common = 0,
    /// Uncommon items (green).
    Uncommon = 1,
    /// Rare items (blue).
    Rare = 2,
    /// Epic items (purple).
    Epic = 3,
    /// Legendary items (orange).
    Legendary = 4,
    /// Mythic items (red).
    Mythic = 5,
}

impl Rarity {
    /// All tiers in ascending rank.
    pub const ALL: [Self; 6] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
        Self::Mythic,
    ];

    /// Power rank, 0 for common.
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Stable identifier used in configuration files.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
            Self::Mythic => "mythic",
        }
    }

    /// Converts from a rank, clamping anything above mythic.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Common,
            1 => Self::Uncommon,
            2 => Self::Rare,
            3 => Self::Epic,
            4 => Self::Legendary,
            _ => Self::Mythic,
        }
    }
}

/// Display and weighting data for one rarity tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RarityTier {
    /// Which tier this describes.
    pub id: Rarity,
    /// Human-readable name.
    pub name: String,
    /// Base drop weight (informational; chests carry their own weights).
    pub base_weight: u32,
    /// Display color, `#RRGGBB`.
    pub color_hex: String,
}

/// The registry of all six rarity tiers, indexed by rank.
#[derive(Clone, Debug, PartialEq)]
pub struct RarityRegistry {
    tiers: [RarityTier; 6],
}

impl RarityRegistry {
    /// Builds a registry from configured tiers.
    ///
    /// Every rarity must appear exactly once.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` on a missing or duplicated tier
    /// or a malformed color.
    pub fn from_tiers(tiers: Vec<RarityTier>) -> EconomyResult<Self> {
        let mut slots: [Option<RarityTier>; 6] = Default::default();

        for tier in tiers {
            if !is_hex_color(&tier.color_hex) {
                return Err(EconomyError::InvalidConfig(format!(
                    "rarity {} has invalid color {:?}",
                    tier.id.id(),
                    tier.color_hex
                )));
            }
            let slot = &mut slots[tier.id.rank() as usize];
            if slot.is_some() {
                return Err(EconomyError::InvalidConfig(format!(
                    "rarity {} is defined twice",
                    tier.id.id()
                )));
            }
            *slot = Some(tier);
        }

        let mut filled = Vec::with_capacity(6);
        for (rarity, slot) in Rarity::ALL.iter().zip(slots) {
            let tier = slot.ok_or_else(|| {
                EconomyError::InvalidConfig(format!("rarity {} is not defined", rarity.id()))
            })?;
            filled.push(tier);
        }

        let tiers: [RarityTier; 6] = filled
            .try_into()
            .map_err(|_| EconomyError::InvalidConfig("rarity registry is incomplete".into()))?;
        Ok(Self { tiers })
    }

    /// Looks up the tier data for a rarity.
    #[inline]
    #[must_use]
    pub fn tier(&self, rarity: Rarity) -> &RarityTier {
        &self.tiers[rarity.rank() as usize]
    }

    /// Iterates all tiers in ascending rank.
    pub fn iter(&self) -> impl Iterator<Item = &RarityTier> {
        self.tiers.iter()
    }
}

impl Default for RarityRegistry {
    /// The shipped tiers.
    fn default() -> Self {
        let tier = |id: Rarity, name: &str, base_weight: u32, color_hex: &str| RarityTier {
            id,
            name: name.to_string(),
            base_weight,
            color_hex: color_hex.to_string(),
        };

        Self {
            tiers: [
                tier(Rarity::Common, "Common", 100, "#9CA3AF"),
                tier(Rarity::Uncommon, "Uncommon", 50, "#10B981"),
                tier(Rarity::Rare, "Rare", 25, "#3B82F6"),
                tier(Rarity::Epic, "Epic", 10, "#8B5CF6"),
                tier(Rarity::Legendary, "Legendary", 5, "#F59E0B"),
                tier(Rarity::Mythic, "Mythic", 1, "#EF4444"),
            ],
        }
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
