//! # Loot Selection
//!
//! Picks one item from a chest's resolved candidate pool.
//!
//! ## Algorithm
//!
//! 1. If the chest has a guaranteed minimum rarity, keep only candidates
//!    whose rank is at least that minimum. If nothing survives the filter,
//!    the unfiltered pool is used instead. Resolution warns about such a
//!    chest once; each draw only logs at debug level.
//! 2. Draw `r = u * T` where `u` is uniform in `[0, 1)` and `T` is the
//!    total weight of the pool.
//! 3. Walk the pool in order, subtracting each weight from `r`; the first
//!    candidate that brings `r` to zero or below wins.
//! 4. If accumulated rounding leaves `r` positive after the walk, the last
//!    candidate wins.
//!
//! Each candidate is therefore selected with probability `w / T`, and ties
//! resolve deterministically by pool order.
//!
//! ## Randomness
//!
//! Randomness is injected through [`RandomSource`]. Production uses
//! [`RngSource`] over ChaCha20; tests substitute a fixed sequence.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::catalog::{ChestDefinition, ItemDefinition, ItemId};
use crate::error::{EconomyError, EconomyResult};
use crate::rarity::Rarity;

/// A source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send {
    /// Next uniform draw in `[0, 1)`.
    fn next_unit(&mut self) -> f64;
}

/// [`RandomSource`] backed by any `rand` generator.
#[derive(Clone, Debug)]
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng + Send> RngSource<R> {
    /// Wraps an existing generator.
    #[must_use]
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<ChaCha20Rng> {
    /// Reproducible stream for simulations and tests.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha20Rng::seed_from_u64(seed))
    }

    /// Stream seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(ChaCha20Rng::from_entropy())
    }
}

impl<R: Rng + Send> RandomSource for RngSource<R> {
    #[inline]
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// One selectable item with its effective weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate<'a> {
    /// The item that can drop.
    pub item: &'a ItemDefinition,
    /// Effective weight, always positive.
    pub weight: f64,
}

/// A chest's resolved, ordered candidate pool.
#[derive(Clone, Debug)]
pub struct LootTable<'a> {
    chest: &'a ChestDefinition,
    candidates: Vec<Candidate<'a>>,
}

impl<'a> LootTable<'a> {
    /// Wraps a resolved pool. Callers guarantee it is non-empty.
    #[must_use]
    pub const fn new(chest: &'a ChestDefinition, candidates: Vec<Candidate<'a>>) -> Self {
        Self { chest, candidates }
    }

    /// The chest this pool belongs to.
    #[must_use]
    pub const fn chest(&self) -> &'a ChestDefinition {
        self.chest
    }

    /// Candidates in draw order.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate<'a>] {
        &self.candidates
    }

    /// Sum of all candidate weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.candidates.iter().map(|c| c.weight).sum()
    }

    /// True if the chest has no guaranteed minimum or some candidate meets it.
    ///
    /// When false, draws fall back to the whole pool.
    #[must_use]
    pub fn meets_guarantee(&self) -> bool {
        self.chest.guaranteed_minimum_rarity.map_or(true, |min| {
            self.candidates
                .iter()
                .any(|c| c.item.rarity >= min && c.weight > 0.0)
        })
    }

    /// Draws one item, honoring the chest's guaranteed minimum rarity.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::EmptyLootTable` if the pool has no positive
    /// weight.
    pub fn select(&self, rng: &mut dyn RandomSource) -> EconomyResult<&'a ItemDefinition> {
        select_weighted(&self.candidates, self.chest.guaranteed_minimum_rarity, rng)
            .map(|idx| self.candidates[idx].item)
            .ok_or_else(|| EconomyError::EmptyLootTable {
                chest: self.chest.name.clone(),
            })
    }

    /// Runs `iterations` draws and tallies the outcome.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::EmptyLootTable` if the pool has no positive
    /// weight.
    pub fn run_statistics(
        &self,
        rng: &mut dyn RandomSource,
        iterations: u32,
    ) -> EconomyResult<LootStatistics> {
        let mut stats = LootStatistics::new();
        for _ in 0..iterations {
            let item = self.select(rng)?;
            stats.record(item);
        }
        Ok(stats)
    }
}

/// Weighted pick over `candidates`, returning the winning index.
///
/// Returns `None` only when the pool has no positive weight.
#[must_use]
pub fn select_weighted(
    candidates: &[Candidate<'_>],
    minimum: Option<Rarity>,
    rng: &mut dyn RandomSource,
) -> Option<usize> {
    let filtered: Vec<usize> = match minimum {
        Some(min) => candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.item.rarity >= min && c.weight > 0.0)
            .map(|(idx, _)| idx)
            .collect(),
        None => Vec::new(),
    };

    let pool: Vec<usize> = if minimum.is_some() && !filtered.is_empty() {
        filtered
    } else {
        if let Some(min) = minimum {
            tracing::debug!(minimum = min.id(), "guarantee unreachable, drawing from the full pool");
        }
        (0..candidates.len())
            .filter(|&idx| candidates[idx].weight > 0.0)
            .collect()
    };

    let total: f64 = pool.iter().map(|&idx| candidates[idx].weight).sum();
    if pool.is_empty() || !total.is_finite() || total <= 0.0 {
        return None;
    }

    let mut remaining = rng.next_unit() * total;
    for &idx in &pool {
        remaining -= candidates[idx].weight;
        if remaining <= 0.0 {
            return Some(idx);
        }
    }

    pool.last().copied()
}

/// Outcome tally from repeated draws.
#[derive(Clone, Debug, Default)]
pub struct LootStatistics {
    /// Total number of draws.
    pub total_rolls: u64,
    /// Draw counts by item id.
    pub item_counts: HashMap<ItemId, u64>,
    /// Draw counts by rarity tier.
    pub rarity_counts: HashMap<Rarity, u64>,
}

impl LootStatistics {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one draw.
    pub fn record(&mut self, item: &ItemDefinition) {
        self.total_rolls += 1;
        *self.item_counts.entry(item.id.clone()).or_insert(0) += 1;
        *self.rarity_counts.entry(item.rarity).or_insert(0) += 1;
    }

    /// Observed share of draws for an item, in `[0, 1]`.
    #[must_use]
    pub fn item_frequency(&self, item_id: &str) -> f64 {
        self.share(self.item_counts.get(item_id).copied().unwrap_or(0))
    }

    /// Observed share of draws for a rarity tier, in `[0, 1]`.
    #[must_use]
    pub fn rarity_frequency(&self, rarity: Rarity) -> f64 {
        self.share(self.rarity_counts.get(&rarity).copied().unwrap_or(0))
    }

    fn share(&self, count: u64) -> f64 {
        if self.total_rolls == 0 {
            0.0
        } else {
            count as f64 / self.total_rolls as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Currency, DropEntry, DropTable, Slot};

    /// Replays a fixed sequence of draws.
    struct Sequence {
        values: Vec<f64>,
        next: usize,
    }

    impl Sequence {
        fn new(values: &[f64]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
            }
        }
    }

    impl RandomSource for Sequence {
        fn next_unit(&mut self) -> f64 {
            let value = self.values[self.next % self.values.len()];
            self.next += 1;
            value
        }
    }

    fn item(id: &str, rarity: Rarity) -> ItemDefinition {
        ItemDefinition {
            id: id.into(),
            name: id.into(),
            image_ref: format!("{id}.png"),
            rarity,
            slot: Slot::Weapon,
            attributes: Vec::new(),
            active: true,
        }
    }

    fn chest(minimum: Option<Rarity>) -> ChestDefinition {
        ChestDefinition {
            id: "test".into(),
            name: "test".into(),
            display_name: "Test Chest".into(),
            cost: 0,
            currency: Currency::Coins,
            guaranteed_minimum_rarity: minimum,
            drop_table: DropTable::PerItem {
                entries: vec![DropEntry {
                    item: "a".into(),
                    weight: 1.0,
                }],
            },
            active: true,
        }
    }

    #[test]
    fn test_walk_boundaries() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Rare);
        let pool = [
            Candidate { item: &a, weight: 30.0 },
            Candidate { item: &b, weight: 70.0 },
        ];

        assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.0])), Some(0));
        assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.3])), Some(0));
        assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.31])), Some(1));
        assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.999_999])), Some(1));
    }

    #[test]
    fn test_ties_resolve_by_order() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Common);
        let pool = [
            Candidate { item: &a, weight: 1.0 },
            Candidate { item: &b, weight: 1.0 },
        ];

        for _ in 0..10 {
            assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.5])), Some(0));
        }
    }

    #[test]
    fn test_minimum_rarity_filters() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Epic);
        let pool = [
            Candidate { item: &a, weight: 99.0 },
            Candidate { item: &b, weight: 1.0 },
        ];

        let mut rng = Sequence::new(&[0.0, 0.5, 0.99]);
        for _ in 0..3 {
            assert_eq!(select_weighted(&pool, Some(Rarity::Rare), &mut rng), Some(1));
        }
    }

    #[test]
    fn test_minimum_rarity_falls_back() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Uncommon);
        let pool = [
            Candidate { item: &a, weight: 1.0 },
            Candidate { item: &b, weight: 1.0 },
        ];

        let pick = select_weighted(&pool, Some(Rarity::Mythic), &mut Sequence::new(&[0.75]));
        assert_eq!(pick, Some(1));
    }

    #[test]
    fn test_overflowing_total_is_rejected() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Common);
        let pool = [
            Candidate { item: &a, weight: 1e308 },
            Candidate { item: &b, weight: 1e308 },
        ];
        assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.25])), None);
    }

    #[test]
    fn test_meets_guarantee() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Epic);
        let guaranteed = chest(Some(Rarity::Rare));
        let open = chest(None);

        let commons = vec![Candidate { item: &a, weight: 1.0 }];
        assert!(!LootTable::new(&guaranteed, commons.clone()).meets_guarantee());
        assert!(LootTable::new(&open, commons).meets_guarantee());

        let mixed = vec![
            Candidate { item: &a, weight: 1.0 },
            Candidate { item: &b, weight: 1.0 },
        ];
        assert!(LootTable::new(&guaranteed, mixed).meets_guarantee());
    }

    #[test]
    fn test_empty_pool() {
        let pool: [Candidate<'_>; 0] = [];
        assert_eq!(select_weighted(&pool, None, &mut Sequence::new(&[0.5])), None);
    }

    #[test]
    fn test_table_select_reports_chest() {
        let def = chest(None);
        let table = LootTable::new(&def, Vec::new());
        let err = table.select(&mut Sequence::new(&[0.5])).unwrap_err();
        assert_eq!(err, EconomyError::EmptyLootTable { chest: "test".into() });
    }

    #[test]
    fn test_frequencies_match_weights() {
        let a = item("a", Rarity::Common);
        let b = item("b", Rarity::Uncommon);
        let c = item("c", Rarity::Rare);
        let def = chest(None);
        let table = LootTable::new(
            &def,
            vec![
                Candidate { item: &a, weight: 70.0 },
                Candidate { item: &b, weight: 25.0 },
                Candidate { item: &c, weight: 5.0 },
            ],
        );

        let mut rng = RngSource::seeded(7);
        let stats = table.run_statistics(&mut rng, 100_000).unwrap();

        assert_eq!(stats.total_rolls, 100_000);
        assert!((stats.item_frequency("a") - 0.70).abs() < 0.01);
        assert!((stats.item_frequency("b") - 0.25).abs() < 0.01);
        assert!((stats.item_frequency("c") - 0.05).abs() < 0.01);
        assert!((stats.rarity_frequency(Rarity::Rare) - 0.05).abs() < 0.01);
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut first = RngSource::seeded(42);
        let mut second = RngSource::seeded(42);
        for _ in 0..100 {
            let value = first.next_unit();
            assert!((0.0..1.0).contains(&value));
            assert_eq!(value.to_bits(), second.next_unit().to_bits());
        }
    }
}
