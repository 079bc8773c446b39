//! Concurrent openings, provisioning and transfers.

use std::sync::Arc;
use std::thread;

use coffer_economy::{
    Catalog, Currency, EconomyConfig, EconomyError, EconomyStore, EconomySystem, FixedPoint,
    MemoryLedger, MemoryStore, OpeningLedger,
};

const CATALOG: &str = include_str!("../../../data/catalog.toml");

fn system(store: Arc<MemoryStore>, ledger: Arc<MemoryLedger>) -> Arc<EconomySystem> {
    let config = EconomyConfig {
        rng_seed: Some(77),
        ..EconomyConfig::default()
    };
    Arc::new(EconomySystem::new(
        Arc::new(Catalog::from_toml_str(CATALOG).unwrap()),
        store,
        ledger,
        config,
    ))
}

#[test]
fn test_parallel_openings_never_overspend() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let system = system(store.clone(), ledger.clone());

    let player = system.ensure_player("tg:race", None).unwrap();
    system
        .credit(player.id, Currency::Coins, FixedPoint::from_whole(1000))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let system = Arc::clone(&system);
            thread::spawn(move || {
                (0..5)
                    .map(|_| system.open_chest("tg:race", "basic"))
                    .filter(Result::is_ok)
                    .count()
            })
        })
        .collect();

    let opened: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(opened, 10);
    assert!(system.player(player.id).unwrap().coins.is_zero());
    assert_eq!(store.instances_of(player.id).unwrap().len(), 10);
    assert_eq!(ledger.records().unwrap().len(), 10);
}

#[test]
fn test_parallel_provisioning_yields_one_account() {
    let store = Arc::new(MemoryStore::new());
    let system = system(store.clone(), Arc::new(MemoryLedger::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let system = Arc::clone(&system);
            thread::spawn(move || system.ensure_player("tg:twin", None).unwrap().id)
        })
        .collect();

    let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.player_count(), 1);
}

#[test]
fn test_parallel_first_opens_share_one_account() {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let system = system(store.clone(), ledger.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let system = Arc::clone(&system);
            thread::spawn(move || system.open_chest("tg:fresh", "starter").unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let player = system.player_by_identity("tg:fresh").unwrap();
    assert_eq!(store.player_count(), 1);
    assert_eq!(store.instances_of(player.id).unwrap().len(), 8);
    assert_eq!(ledger.records().unwrap().len(), 8);
}

#[test]
fn test_crossing_transfers_do_not_deadlock() {
    let store = Arc::new(MemoryStore::new());
    let system = system(store.clone(), Arc::new(MemoryLedger::new()));

    let a = system.ensure_player("tg:a", None).unwrap().id;
    let b = system.ensure_player("tg:b", None).unwrap().id;
    let from_a: Vec<_> = (0..50).map(|_| system.grant(a, "ice", false).unwrap().id).collect();
    let from_b: Vec<_> = (0..50).map(|_| system.grant(b, "fire", false).unwrap().id).collect();

    let left = {
        let system = Arc::clone(&system);
        thread::spawn(move || {
            for id in from_a {
                system.transfer(id, a, b).unwrap();
            }
        })
    };
    let right = {
        let system = Arc::clone(&system);
        thread::spawn(move || {
            for id in from_b {
                system.transfer(id, b, a).unwrap();
            }
        })
    };
    left.join().unwrap();
    right.join().unwrap();

    let a_items = system.player_items(a).unwrap();
    let b_items = system.player_items(b).unwrap();
    assert_eq!(a_items.len(), 50);
    assert_eq!(b_items.len(), 50);
    assert!(a_items.iter().all(|i| i.definition.id == "fire"));
    assert!(b_items.iter().all(|i| i.definition.id == "ice"));
}

#[test]
fn test_parallel_equips_keep_totals_consistent() {
    let store = Arc::new(MemoryStore::new());
    let system = system(store.clone(), Arc::new(MemoryLedger::new()));

    let player = system.ensure_player("tg:eq", None).unwrap().id;
    let instances: Vec<_> = (0..16)
        .map(|_| system.grant(player, "ice", false).unwrap().id)
        .collect();

    let handles: Vec<_> = instances
        .into_iter()
        .map(|id| {
            let system = Arc::clone(&system);
            thread::spawn(move || system.set_equipped(id, player, true).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = system.player(player).unwrap().totals;
    assert_eq!(stored.offline_storage, 100 + 16 * 100);
    assert_eq!(system.recompute(player).unwrap(), stored);
}

#[test]
fn test_unknown_player_without_provisioning() {
    let config = EconomyConfig {
        auto_provision_players: false,
        ..EconomyConfig::default()
    };
    let system = EconomySystem::new(
        Arc::new(Catalog::from_toml_str(CATALOG).unwrap()),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryLedger::new()),
        config,
    );
    let err = system.open_chest("tg:ghost", "starter").unwrap_err();
    assert!(matches!(err, EconomyError::NotFound { .. }));
}
