//! Selection properties of the shared rotator.

use std::collections::HashSet;
use std::sync::Arc;

use api_rotator::rotation::{
    EndpointDraft, EndpointIntent, RotationMode, RotationState, Rotator, SwitchPolicy,
};
use api_rotator::settings::{MemoryStore, SettingsStore};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn seeded(names: &[&str], seed: u64) -> Rotator {
    let rotator = Rotator::with_rng(
        RotationState::default(),
        Arc::new(MemoryStore::default()),
        StdRng::seed_from_u64(seed),
    );
    for name in names {
        rotator
            .apply(EndpointIntent::Add {
                draft: EndpointDraft::new(*name, format!("https://{}.example.com", name)),
            })
            .unwrap();
    }
    rotator
}

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

#[test]
fn test_sequential_visits_each_enabled_endpoint_once_per_cycle() {
    for n in 1..=NAMES.len() {
        let rotator = seeded(&NAMES[..n], 1);
        let first_cycle: Vec<String> = (0..n).map(|_| rotator.advance().unwrap().name).collect();
        let second_cycle: Vec<String> = (0..n).map(|_| rotator.advance().unwrap().name).collect();

        let distinct: HashSet<&String> = first_cycle.iter().collect();
        assert_eq!(distinct.len(), n, "cycle of {} repeated an endpoint", n);
        assert_eq!(first_cycle, second_cycle);
    }
}

#[test]
fn test_random_mode_never_repeats_consecutively() {
    for n in 2..=5 {
        let rotator = seeded(&NAMES[..n], n as u64);
        rotator
            .apply(EndpointIntent::SetMode {
                mode: RotationMode::Random,
            })
            .unwrap();

        let mut seen = HashSet::new();
        let mut previous = rotator.advance().unwrap().id;
        seen.insert(previous);
        for _ in 0..500 {
            let next = rotator.advance().unwrap().id;
            assert_ne!(next, previous);
            seen.insert(next);
            previous = next;
        }
        assert_eq!(seen.len(), n, "random mode never reached some endpoint");
    }
}

#[test]
fn test_empty_list_returns_none_without_mutation() {
    let rotator = seeded(&[], 1);
    assert!(rotator.advance().is_none());
    assert!(rotator.select_for_dispatch().is_none());
    assert!(rotator.current().is_none());
    assert_eq!(rotator.snapshot().cursor, 0);
}

#[test]
fn test_single_endpoint_is_stable() {
    let rotator = seeded(&["only"], 1);
    for _ in 0..5 {
        assert_eq!(rotator.advance().unwrap().name, "only");
        assert_eq!(rotator.snapshot().cursor, 0);
    }
}

#[test]
fn test_disabling_current_endpoint_is_never_selected() {
    let rotator = seeded(&["a", "b", "c"], 1);
    // cursor lands on c, the last enabled index
    rotator.advance().unwrap();
    let c = rotator.advance().unwrap();
    assert_eq!(c.name, "c");
    assert_eq!(rotator.snapshot().cursor, 2);

    rotator
        .apply(EndpointIntent::Toggle { id: c.id })
        .unwrap();

    // cursor 2 is out of range for two enabled endpoints; no panic, no c
    assert_ne!(rotator.current().unwrap().id, c.id);
    for _ in 0..6 {
        assert_ne!(rotator.advance().unwrap().id, c.id);
        assert_ne!(rotator.select_for_dispatch().unwrap().id, c.id);
    }
}

#[test]
fn test_all_disabled_is_inactive() {
    let rotator = seeded(&["a", "b"], 1);
    for endpoint in rotator.snapshot().endpoints {
        rotator
            .apply(EndpointIntent::SetEnabled {
                id: endpoint.id,
                enabled: false,
            })
            .unwrap();
    }
    assert!(!rotator.is_active());
    assert!(rotator.advance().is_none());
}

#[test]
fn test_sticky_policy_holds_until_advanced() {
    let rotator = seeded(&["a", "b", "c"], 1);
    rotator
        .apply(EndpointIntent::SetSwitchPolicy {
            policy: SwitchPolicy::StickyUntilError,
        })
        .unwrap();

    for _ in 0..3 {
        assert_eq!(rotator.select_for_dispatch().unwrap().name, "a");
    }
    let tried = HashSet::from([rotator.current().unwrap().id]);
    assert_eq!(rotator.advance_untried(&tried).unwrap().name, "b");
    assert_eq!(rotator.select_for_dispatch().unwrap().name, "b");
}

#[test]
fn test_select_intent_moves_cursor_within_enabled_subset() {
    let rotator = seeded(&["a", "b", "c"], 1);
    let ids: Vec<_> = rotator.snapshot().endpoints.iter().map(|e| e.id).collect();
    rotator
        .apply(EndpointIntent::SetEnabled {
            id: ids[0],
            enabled: false,
        })
        .unwrap();

    rotator.apply(EndpointIntent::Select { id: ids[2] }).unwrap();
    // c is the second enabled endpoint
    assert_eq!(rotator.snapshot().cursor, 1);
    assert_eq!(rotator.current().unwrap().name, "c");

    assert!(rotator.apply(EndpointIntent::Select { id: ids[0] }).is_err());
}

#[test]
fn test_selection_is_persisted() {
    let store = Arc::new(MemoryStore::default());
    let rotator = Rotator::new(RotationState::default(), store.clone());
    for name in ["a", "b"] {
        rotator
            .apply(EndpointIntent::Add {
                draft: EndpointDraft::new(name, format!("https://{}.example.com", name)),
            })
            .unwrap();
    }

    let picked = rotator.advance().unwrap();
    let stored = store.load().unwrap();
    assert_eq!(stored.cursor, 1);
    assert_eq!(stored.current_endpoint().unwrap().id, picked.id);
}

#[test]
fn test_concurrent_advances_keep_cursor_in_range() {
    let rotator = seeded(&["a", "b", "c"], 1);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let rotator = rotator.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    assert!(rotator.advance().is_some());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    // 800 sequential advances from cursor 0 over 3 endpoints
    assert_eq!(rotator.snapshot().cursor, 800 % 3);
}
