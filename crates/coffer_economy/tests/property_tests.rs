//! Property-based tests using proptest
//!
//! Invariants that must hold for ALL inputs:
//! - Selection: always a member of the pool, never below a satisfiable minimum
//! - Stats: aggregation is order independent and unequipping restores totals
//! - Balances: a rejected debit never changes the account

use proptest::prelude::*;

use chrono::Utc;
use coffer_economy::{
    select_weighted, AttributeKey, Candidate, Currency, FixedPoint, ItemDefinition,
    PlayerAccount, RandomSource, Rarity, Slot, StatTotals,
};

struct Fixed(f64);

impl RandomSource for Fixed {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

fn item(idx: usize, rarity: u8, attributes: Vec<AttributeKey>) -> ItemDefinition {
    ItemDefinition {
        id: format!("item_{idx}"),
        name: format!("Item {idx}"),
        image_ref: format!("item_{idx}.png"),
        rarity: Rarity::from_u8(rarity),
        slot: Slot::Weapon,
        attributes,
        active: true,
    }
}

fn attribute() -> impl Strategy<Value = AttributeKey> {
    (0..AttributeKey::ALL.len()).prop_map(|idx| AttributeKey::ALL[idx])
}

// ============================================================
// Selection Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_selection_picks_pool_member(
        pool_shape in prop::collection::vec((0u8..6, 0.001f64..1000.0), 1..12),
        draw in 0.0f64..1.0,
    ) {
        let items: Vec<_> = pool_shape
            .iter()
            .enumerate()
            .map(|(idx, (rarity, _))| item(idx, *rarity, Vec::new()))
            .collect();
        let pool: Vec<_> = items
            .iter()
            .zip(&pool_shape)
            .map(|(item, (_, weight))| Candidate { item, weight: *weight })
            .collect();

        let picked = select_weighted(&pool, None, &mut Fixed(draw));
        prop_assert!(matches!(picked, Some(idx) if idx < pool.len()));
    }

    #[test]
    fn prop_satisfiable_minimum_is_honored(
        pool_shape in prop::collection::vec((0u8..6, 0.001f64..1000.0), 1..12),
        minimum in 0u8..6,
        draw in 0.0f64..1.0,
    ) {
        let items: Vec<_> = pool_shape
            .iter()
            .enumerate()
            .map(|(idx, (rarity, _))| item(idx, *rarity, Vec::new()))
            .collect();
        let pool: Vec<_> = items
            .iter()
            .zip(&pool_shape)
            .map(|(item, (_, weight))| Candidate { item, weight: *weight })
            .collect();
        let minimum = Rarity::from_u8(minimum);

        let idx = select_weighted(&pool, Some(minimum), &mut Fixed(draw)).unwrap();
        if pool.iter().any(|c| c.item.rarity >= minimum) {
            prop_assert!(pool[idx].item.rarity >= minimum);
        }
    }

    #[test]
    fn prop_selection_is_deterministic(
        weights in prop::collection::vec(0.001f64..100.0, 1..8),
        draw in 0.0f64..1.0,
    ) {
        let items: Vec<_> = (0..weights.len()).map(|idx| item(idx, 0, Vec::new())).collect();
        let pool: Vec<_> = items
            .iter()
            .zip(&weights)
            .map(|(item, weight)| Candidate { item, weight: *weight })
            .collect();

        let first = select_weighted(&pool, None, &mut Fixed(draw));
        let second = select_weighted(&pool, None, &mut Fixed(draw));
        prop_assert_eq!(first, second);
    }
}

// ============================================================
// Stat Aggregation Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_aggregate_is_order_independent(
        loadouts in prop::collection::vec(prop::collection::vec(attribute(), 0..5), 0..6),
    ) {
        let items: Vec<_> = loadouts
            .into_iter()
            .enumerate()
            .map(|(idx, attrs)| item(idx, 2, attrs))
            .collect();

        let forward = StatTotals::aggregate(items.iter());
        let backward = StatTotals::aggregate(items.iter().rev());
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_unequip_restores_previous_totals(
        base in prop::collection::vec(prop::collection::vec(attribute(), 0..4), 0..4),
        extra in prop::collection::vec(attribute(), 0..4),
    ) {
        let items: Vec<_> = base
            .into_iter()
            .enumerate()
            .map(|(idx, attrs)| item(idx, 1, attrs))
            .collect();
        let added = item(99, 1, extra);

        let before = StatTotals::aggregate(items.iter());
        let with_extra = StatTotals::aggregate(items.iter().chain(std::iter::once(&added)));
        let after = StatTotals::aggregate(items.iter());

        prop_assert!(with_extra.coins_per_tap >= before.coins_per_tap);
        prop_assert!(with_extra.offline_storage >= before.offline_storage);
        prop_assert_eq!(before, after);
    }
}

// ============================================================
// Balance Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_debit_never_goes_negative(balance in 0u64..1_000_000, cost in 0u64..1_000_000) {
        let mut account = PlayerAccount {
            id: 1,
            external_identity: "tg:prop".into(),
            display_name: None,
            coins: FixedPoint::from_whole(balance),
            gems: FixedPoint::ZERO,
            totals: StatTotals::base(),
            created_at: Utc::now(),
        };

        let result = account.debit(Currency::Coins, FixedPoint::from_whole(cost));
        if cost <= balance {
            prop_assert!(result.is_ok());
            prop_assert_eq!(account.coins, FixedPoint::from_whole(balance - cost));
        } else {
            prop_assert!(result.is_err());
            prop_assert_eq!(account.coins, FixedPoint::from_whole(balance));
        }
    }
}
