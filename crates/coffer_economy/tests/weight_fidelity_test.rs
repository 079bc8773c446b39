//! Observed drop frequencies converge on configured weights.

use coffer_economy::{Catalog, Rarity, RngSource};

const CATALOG: &str = include_str!("../../../data/catalog.toml");
const DRAWS: u32 = 100_000;

#[test]
fn test_basic_chest_frequencies() {
    let catalog = Catalog::from_toml_str(CATALOG).unwrap();
    let chest = catalog.chest_by_name("basic").unwrap();
    let table = catalog.resolve_candidates(chest).unwrap();

    let mut rng = RngSource::seeded(0xC0FF_EE00);
    let stats = table.run_statistics(&mut rng, DRAWS).unwrap();

    for (rarity, expected) in [
        (Rarity::Common, 0.70),
        (Rarity::Uncommon, 0.25),
        (Rarity::Rare, 0.05),
    ] {
        let observed = stats.rarity_frequency(rarity);
        assert!(
            (observed - expected).abs() < 0.01,
            "{rarity:?}: observed {observed:.4}, expected {expected}"
        );
    }
}

#[test]
fn test_per_item_chest_frequencies() {
    let catalog = Catalog::from_toml_str(CATALOG).unwrap();
    let chest = catalog.chest_by_name("starter").unwrap();
    let table = catalog.resolve_candidates(chest).unwrap();

    let mut rng = RngSource::seeded(17);
    let stats = table.run_statistics(&mut rng, DRAWS).unwrap();

    for (item, expected) in [("wooden", 0.70), ("ice", 0.20), ("fire", 0.08), ("thunder", 0.02)] {
        let observed = stats.item_frequency(item);
        assert!(
            (observed - expected).abs() < 0.01,
            "{item}: observed {observed:.4}, expected {expected}"
        );
    }
}

#[test]
fn test_guaranteed_chest_frequencies() {
    let catalog = Catalog::from_toml_str(CATALOG).unwrap();
    let chest = catalog.chest_by_name("mythic").unwrap();
    let table = catalog.resolve_candidates(chest).unwrap();

    let mut rng = RngSource::seeded(23);
    let stats = table.run_statistics(&mut rng, DRAWS).unwrap();

    assert!((stats.rarity_frequency(Rarity::Epic) - 0.60).abs() < 0.01);
    assert!((stats.rarity_frequency(Rarity::Legendary) - 0.35).abs() < 0.01);
    assert!((stats.rarity_frequency(Rarity::Mythic) - 0.05).abs() < 0.01);
}

#[test]
fn test_rarity_split_across_several_items() {
    let text = r#"
        [[items]]
        id = "oak"
        name = "Oak Sword"
        image_ref = "oak.png"
        rarity = "common"

        [[items]]
        id = "pine"
        name = "Pine Sword"
        image_ref = "pine.png"
        rarity = "common"

        [[items]]
        id = "birch"
        name = "Birch Sword"
        image_ref = "birch.png"
        rarity = "common"

        [[items]]
        id = "jade"
        name = "Jade Sword"
        image_ref = "jade.png"
        rarity = "rare"

        [[chests]]
        id = "grove"
        name = "grove"
        display_name = "Grove Chest"
        cost = 0
        currency = "coins"

        [chests.drop_table]
        mode = "per_rarity"
        common = 90
        rare = 10
    "#;
    let catalog = Catalog::from_toml_str(text).unwrap();
    let chest = catalog.chest_by_name("grove").unwrap();
    let table = catalog.resolve_candidates(chest).unwrap();

    let mut rng = RngSource::seeded(31);
    let stats = table.run_statistics(&mut rng, DRAWS).unwrap();

    for item in ["oak", "pine", "birch"] {
        assert!((stats.item_frequency(item) - 0.30).abs() < 0.01, "{item}");
    }
    assert!((stats.item_frequency("jade") - 0.10).abs() < 0.01);
}
