//! # Item and Chest Catalog
//!
//! Immutable configuration data, loaded once from TOML at startup:
//! the rarity registry, item definitions and chest definitions.
//!
//! ## Drop Tables
//!
//! A chest's drop table is one of two explicit modes:
//!
//! - **per_rarity**: a weight per rarity tier, split evenly across every
//!   active catalog item of that tier. Each item's weight is the exact
//!   fraction `w / count`; no rounding is applied.
//! - **per_item**: an explicit weight per item. Zero weights are excluded.
//!
//! ```toml
//! [[chests]]
//! id = "basic"
//! name = "basic"
//! display_name = "Basic Chest"
//! cost = 100
//! currency = "coins"
//!
//! [chests.drop_table]
//! mode = "per_rarity"
//! common = 70
//! uncommon = 25
//! rare = 5
//! ```
//!
//! Resolution is pure: it reads the catalog and returns an ordered
//! [`LootTable`]; nothing is mutated.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeKey;
use crate::error::{EconomyError, EconomyResult, EntityKind};
use crate::loot::{Candidate, LootTable};
use crate::rarity::{Rarity, RarityRegistry, RarityTier};

/// Identifier of an item definition.
pub type ItemId = String;

/// Identifier of a chest definition.
pub type ChestId = String;

/// Equipment slot an item occupies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Swords and other weapons.
    #[default]
    Weapon,
    /// Head armor.
    Helmet,
    /// Off-hand shield.
    Shield,
    /// Back slot.
    Cape,
}

/// Currency a chest is priced in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Currency {
    /// Soft currency earned by tapping.
    Coins = 0,
    /// Premium currency.
    Gems = 1,
}

impl Currency {
    /// Configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coins => "coins",
            Self::Gems => "gems",
        }
    }

    /// Converts from the on-disk tag.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Coins),
            1 => Some(Self::Gems),
            _ => None,
        }
    }
}

/// An item definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemDefinition {
    /// Unique identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Image reference for the client.
    pub image_ref: String,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Slot the item is worn in.
    #[serde(default)]
    pub slot: Slot,
    /// Stat modifiers granted while equipped.
    #[serde(default)]
    pub attributes: Vec<AttributeKey>,
    /// Inactive items never resolve into a drop pool.
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Weight per rarity tier. Missing tiers weigh zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RarityWeights {
    /// Common weight.
    #[serde(default)]
    pub common: f64,
    /// Uncommon weight.
    #[serde(default)]
    pub uncommon: f64,
    /// Rare weight.
    #[serde(default)]
    pub rare: f64,
    /// Epic weight.
    #[serde(default)]
    pub epic: f64,
    /// Legendary weight.
    #[serde(default)]
    pub legendary: f64,
    /// Mythic weight.
    #[serde(default)]
    pub mythic: f64,
}

impl RarityWeights {
    /// The weight configured for a tier.
    #[must_use]
    pub const fn weight(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Uncommon => self.uncommon,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
            Rarity::Mythic => self.mythic,
        }
    }
}

/// One explicit entry of a per-item drop table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropEntry {
    /// Item that can drop.
    pub item: ItemId,
    /// Drop weight; defaults to 1.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Drop-weight configuration of a chest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DropTable {
    /// Weight per rarity, split evenly across the catalog items of that rarity.
    PerRarity(RarityWeights),
    /// Explicit weight per item.
    PerItem {
        /// Entries in draw order.
        entries: Vec<DropEntry>,
    },
}

/// A chest definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChestDefinition {
    /// Unique identifier.
    pub id: ChestId,
    /// Unique lookup name used by callers.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Price per opening, in whole units of `currency`.
    pub cost: u64,
    /// Currency the price is charged in.
    pub currency: Currency,
    /// Draws are restricted to this tier or better when set.
    #[serde(default)]
    pub guaranteed_minimum_rarity: Option<Rarity>,
    /// Drop weights.
    pub drop_table: DropTable,
    /// Inactive chests cannot be looked up.
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Rarity name and color as shown to players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RarityView {
    /// Tier name.
    pub name: String,
    /// Display color.
    pub color_hex: String,
}

/// Public projection of an item definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemView {
    /// Item id.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Image reference.
    pub image_ref: String,
    /// Rarity name and color.
    pub rarity: RarityView,
}

/// Public projection of a chest definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChestSummary {
    /// Chest id.
    pub id: ChestId,
    /// Lookup name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Price per opening.
    pub cost: u64,
    /// Currency of the price.
    pub currency: Currency,
    /// Guaranteed minimum rarity, if any.
    pub guaranteed_minimum_rarity: Option<Rarity>,
}

impl From<&ChestDefinition> for ChestSummary {
    fn from(chest: &ChestDefinition) -> Self {
        Self {
            id: chest.id.clone(),
            name: chest.name.clone(),
            display_name: chest.display_name.clone(),
            cost: chest.cost,
            currency: chest.currency,
            guaranteed_minimum_rarity: chest.guaranteed_minimum_rarity,
        }
    }
}

/// On-disk layout of a catalog file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    rarities: Option<Vec<RarityTier>>,
    #[serde(default)]
    items: Vec<ItemDefinition>,
    #[serde(default)]
    chests: Vec<ChestDefinition>,
}

/// The validated, read-only catalog.
#[derive(Clone, Debug)]
pub struct Catalog {
    rarities: RarityRegistry,
    items: Vec<ItemDefinition>,
    item_index: HashMap<ItemId, usize>,
    chests: Vec<ChestDefinition>,
    chest_by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Builds and validates a catalog.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` on duplicate ids or names,
    /// repeated attribute keys on an item, dangling item references,
    /// duplicate (chest, item) pairs, weights that are negative or not
    /// finite, or a chest whose total weight overflows.
    pub fn new(
        rarities: RarityRegistry,
        items: Vec<ItemDefinition>,
        chests: Vec<ChestDefinition>,
    ) -> EconomyResult<Self> {
        let mut item_index = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if item.id.is_empty() {
                return Err(EconomyError::InvalidConfig("item with empty id".into()));
            }
            if item_index.insert(item.id.clone(), idx).is_some() {
                return Err(EconomyError::InvalidConfig(format!(
                    "item {} is defined twice",
                    item.id
                )));
            }
            let mut keys = HashSet::with_capacity(item.attributes.len());
            if let Some(key) = item.attributes.iter().find(|key| !keys.insert(**key)) {
                return Err(EconomyError::InvalidConfig(format!(
                    "item {} lists attribute {} twice",
                    item.id,
                    key.as_str()
                )));
            }
        }

        let mut chest_ids = HashSet::with_capacity(chests.len());
        let mut chest_by_name = HashMap::with_capacity(chests.len());
        for (idx, chest) in chests.iter().enumerate() {
            if !chest_ids.insert(chest.id.as_str()) {
                return Err(EconomyError::InvalidConfig(format!(
                    "chest {} is defined twice",
                    chest.id
                )));
            }
            if chest_by_name.insert(chest.name.clone(), idx).is_some() {
                return Err(EconomyError::InvalidConfig(format!(
                    "chest name {} is used twice",
                    chest.name
                )));
            }
            validate_drop_table(chest, &item_index)?;
        }

        Ok(Self {
            rarities,
            items,
            item_index,
            chests,
            chest_by_name,
        })
    }

    /// Parses a catalog from TOML text.
    ///
    /// When the file has no `[[rarities]]` the shipped registry is used.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` if the text does not parse
    /// (including unknown attribute keys) or fails validation.
    pub fn from_toml_str(text: &str) -> EconomyResult<Self> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| EconomyError::InvalidConfig(e.to_string()))?;

        let rarities = match file.rarities {
            Some(tiers) => RarityRegistry::from_tiers(tiers)?,
            None => RarityRegistry::default(),
        };

        Self::new(rarities, file.items, file.chests)
    }

    /// Loads a catalog file.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidConfig` if the file cannot be read or
    /// is invalid.
    pub fn load(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EconomyError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        let catalog = Self::from_toml_str(&text)?;
        tracing::info!(
            path = %path.display(),
            items = catalog.items.len(),
            chests = catalog.chests.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// The rarity registry.
    #[must_use]
    pub fn rarities(&self) -> &RarityRegistry {
        &self.rarities
    }

    /// Looks up an item definition.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ItemDefinition> {
        self.item_index.get(id).map(|&idx| &self.items[idx])
    }

    /// Looks up an item definition, failing with `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::NotFound` if no such item exists.
    pub fn require_item(&self, id: &str) -> EconomyResult<&ItemDefinition> {
        self.item(id)
            .ok_or_else(|| EconomyError::not_found(EntityKind::ItemDefinition, id))
    }

    /// All item definitions in catalog order.
    #[must_use]
    pub fn items(&self) -> &[ItemDefinition] {
        &self.items
    }

    /// Looks up an active chest by its lookup name.
    #[must_use]
    pub fn chest_by_name(&self, name: &str) -> Option<&ChestDefinition> {
        self.chest_by_name
            .get(name)
            .map(|&idx| &self.chests[idx])
            .filter(|chest| chest.active)
    }

    /// Active chests ordered by cost, cheapest first.
    #[must_use]
    pub fn chests_by_cost(&self) -> Vec<&ChestDefinition> {
        let mut chests: Vec<_> = self.chests.iter().filter(|c| c.active).collect();
        chests.sort_by_key(|c| c.cost);
        chests
    }

    /// Public view of an item, with its rarity name and color.
    #[must_use]
    pub fn item_view(&self, item: &ItemDefinition) -> ItemView {
        let tier = self.rarities.tier(item.rarity);
        ItemView {
            id: item.id.clone(),
            name: item.name.clone(),
            image_ref: item.image_ref.clone(),
            rarity: RarityView {
                name: tier.name.clone(),
                color_hex: tier.color_hex.clone(),
            },
        }
    }

    /// Resolves a chest's drop table into an ordered candidate pool.
    ///
    /// Per-rarity tables are visited in ascending rank, items within a tier
    /// in catalog order. Per-item tables keep their configured order.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::EmptyLootTable` if nothing resolves with a
    /// positive weight.
    pub fn resolve_candidates<'a>(
        &'a self,
        chest: &'a ChestDefinition,
    ) -> EconomyResult<LootTable<'a>> {
        let mut candidates = Vec::new();

        match &chest.drop_table {
            DropTable::PerRarity(weights) => {
                for rarity in Rarity::ALL {
                    let weight = weights.weight(rarity);
                    if weight <= 0.0 {
                        continue;
                    }
                    let tier_items: Vec<_> = self
                        .items
                        .iter()
                        .filter(|item| item.active && item.rarity == rarity)
                        .collect();
                    if tier_items.is_empty() {
                        continue;
                    }
                    let share = weight / tier_items.len() as f64;
                    candidates.extend(tier_items.into_iter().map(|item| Candidate {
                        item,
                        weight: share,
                    }));
                }
            }
            DropTable::PerItem { entries } => {
                for entry in entries {
                    if entry.weight <= 0.0 {
                        continue;
                    }
                    let item = self.require_item(&entry.item)?;
                    if !item.active {
                        continue;
                    }
                    candidates.push(Candidate {
                        item,
                        weight: entry.weight,
                    });
                }
            }
        }

        if candidates.is_empty() {
            return Err(EconomyError::EmptyLootTable {
                chest: chest.name.clone(),
            });
        }

        let table = LootTable::new(chest, candidates);
        if !table.meets_guarantee() {
            tracing::warn!(
                chest = %chest.id,
                minimum = chest.guaranteed_minimum_rarity.map_or("-", Rarity::id),
                "no candidate meets the guaranteed rarity, draws use the full pool"
            );
        }
        Ok(table)
    }

    /// True if the chest resolves to a pool with positive total weight.
    #[must_use]
    pub fn is_openable(&self, chest: &ChestDefinition) -> bool {
        self.resolve_candidates(chest).is_ok()
    }
}

fn validate_drop_table(
    chest: &ChestDefinition,
    item_index: &HashMap<ItemId, usize>,
) -> EconomyResult<()> {
    let bad_weight = |weight: f64| !weight.is_finite() || weight < 0.0;

    let total: f64 = match &chest.drop_table {
        DropTable::PerRarity(weights) => Rarity::ALL.iter().map(|&r| weights.weight(r)).sum(),
        DropTable::PerItem { entries } => entries.iter().map(|e| e.weight).sum(),
    };

    match &chest.drop_table {
        DropTable::PerRarity(weights) => {
            for rarity in Rarity::ALL {
                if bad_weight(weights.weight(rarity)) {
                    return Err(EconomyError::InvalidConfig(format!(
                        "chest {} has invalid {} weight",
                        chest.id,
                        rarity.id()
                    )));
                }
            }
        }
        DropTable::PerItem { entries } => {
            let mut seen = HashSet::with_capacity(entries.len());
            for entry in entries {
                if !item_index.contains_key(&entry.item) {
                    return Err(EconomyError::InvalidConfig(format!(
                        "chest {} references unknown item {}",
                        chest.id, entry.item
                    )));
                }
                if !seen.insert(entry.item.as_str()) {
                    return Err(EconomyError::InvalidConfig(format!(
                        "chest {} lists item {} twice",
                        chest.id, entry.item
                    )));
                }
                if bad_weight(entry.weight) {
                    return Err(EconomyError::InvalidConfig(format!(
                        "chest {} has invalid weight for item {}",
                        chest.id, entry.item
                    )));
                }
            }
        }
    }

    // Individually finite weights can still overflow the pool total.
    if !total.is_finite() {
        return Err(EconomyError::InvalidConfig(format!(
            "chest {} has a total drop weight that is not finite",
            chest.id
        )));
    }

    Ok(())
}

const fn default_true() -> bool {
    true
}

const fn default_weight() -> f64 {
    1.0
}
