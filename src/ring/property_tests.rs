//! Property-Based Tests for Ring Module

use proptest::prelude::*;

use crate::ring::ConsistentHashRing;

const SAMPLE: usize = 2000;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // Removing a node only moves the keys it owned.
    #[test]
    fn prop_remove_moves_only_owned_keys(
        node_count in 2usize..12,
        victim in any::<prop::sample::Index>(),
        seed in any::<u32>()
    ) {
        let nodes: Vec<String> = (0..node_count).map(|i| format!("10.0.0.{i}:7000")).collect();
        let mut ring = ConsistentHashRing::new();
        for node in &nodes {
            ring.add(node);
        }
        let keys: Vec<String> = (0..SAMPLE).map(|i| format!("{seed}-{i}")).collect();
        let before: Vec<String> = keys.iter().map(|k| ring.get(k).unwrap().to_string()).collect();

        let removed = victim.get(&nodes).clone();
        ring.remove(&removed);

        let mut moved = 0;
        for (key, old) in keys.iter().zip(&before) {
            let new = ring.get(key).unwrap();
            prop_assert_ne!(new, removed.as_str());
            if *old == removed {
                moved += 1;
            } else {
                prop_assert_eq!(new, old.as_str());
            }
        }

        // Roughly 1/N of the sample, with slack for virtual-node variance
        let share = moved as f64 / SAMPLE as f64;
        prop_assert!(share < 2.5 / node_count as f64, "share {}", share);
    }

    #[test]
    fn prop_lookup_stable_under_readd(key in "[a-z0-9]{1,16}") {
        let mut ring = ConsistentHashRing::new();
        for node in ["A", "B", "C"] {
            ring.add(node);
        }
        let owner = ring.get(&key).unwrap().to_string();

        ring.add("B");
        prop_assert_eq!(ring.get(&key), Some(owner.as_str()));
    }
}
