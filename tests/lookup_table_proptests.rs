// LookupTable property tests over the public surface.
//
// Property 1: round trip and overwrite.
//  - Storing k -> v then finding k yields v; fetching yields v unless v is
//    nil. Re-storing a key keeps entries unchanged.
//
// Property 2: growth and drain.
//  - Inserting n distinct keys keeps every key fetchable and bins above n;
//    removing all of them returns bins to MIN_BINS and entries to 0.
//
// Property 3: dup independence.
//  - Arbitrary mutations on a dup never change what the original fetches.
//
// Property 4: bulk consistency.
//  - all_keys and all_values have entries elements each and pair up under
//    fetch.
use lookup_table::{Heap, LookupTable, Value, MIN_BINS};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn value_of(v: Option<i64>) -> Value {
    v.map(Value::Fixnum).unwrap_or(Value::Nil)
}

// Property 1: round trip and overwrite.
proptest! {
    #[test]
    fn prop_round_trip(pairs in proptest::collection::vec((any::<i64>(), proptest::option::of(any::<i64>())), 1..200)) {
        let mut heap = Heap::new();
        let t = LookupTable::create(&mut heap).unwrap();
        let mut model: BTreeMap<i64, Value> = BTreeMap::new();

        for (k, v) in pairs {
            let before = t.entries(&heap).unwrap();
            let existed = model.contains_key(&k);
            t.store(&mut heap, Value::Fixnum(k), value_of(v)).unwrap();
            model.insert(k, value_of(v));

            let after = t.entries(&heap).unwrap();
            prop_assert_eq!(after, if existed { before } else { before + 1 });
            prop_assert_eq!(t.find(&heap, Value::Fixnum(k)).unwrap(), value_of(v));
            prop_assert_eq!(t.fetch(&heap, Value::Fixnum(k)).unwrap(), value_of(v));
        }

        for (k, v) in &model {
            prop_assert_eq!(t.find(&heap, Value::Fixnum(*k)).unwrap(), *v);
        }
    }
}

// Property 2: growth and drain.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_grow_then_drain(keys in proptest::collection::btree_set(any::<i64>(), 1..300)) {
        let mut heap = Heap::new();
        let t = LookupTable::create(&mut heap).unwrap();

        for &k in &keys {
            t.store(&mut heap, Value::Fixnum(k), Value::Fixnum(k.wrapping_mul(3))).unwrap();
        }
        let bins = t.bins(&heap).unwrap();
        prop_assert!(bins > keys.len());
        prop_assert!(bins.is_power_of_two());
        for &k in &keys {
            prop_assert_eq!(t.fetch(&heap, Value::Fixnum(k)).unwrap(), Value::Fixnum(k.wrapping_mul(3)));
        }

        for &k in &keys {
            prop_assert_eq!(t.remove(&mut heap, Value::Fixnum(k)).unwrap(), Value::Fixnum(k.wrapping_mul(3)));
            prop_assert!(t.is_consistent(&heap));
        }
        prop_assert_eq!(t.bins(&heap).unwrap(), MIN_BINS);
        prop_assert_eq!(t.entries(&heap).unwrap(), 0);
    }
}

// Property 3: dup independence.
proptest! {
    #[test]
    fn prop_dup_independent(
        initial in proptest::collection::vec((0i64..64, any::<i64>()), 0..64),
        edits in proptest::collection::vec((any::<bool>(), 0i64..96, any::<i64>()), 0..64),
    ) {
        let mut heap = Heap::new();
        let t = LookupTable::create(&mut heap).unwrap();
        for &(k, v) in &initial {
            t.store(&mut heap, Value::Fixnum(k), Value::Fixnum(v)).unwrap();
        }
        let snapshot: Vec<(Value, Value)> = t
            .all_keys(&heap).unwrap()
            .into_iter()
            .zip(t.all_values(&heap).unwrap())
            .collect();

        let copy = t.dup(&mut heap).unwrap();
        prop_assert_eq!(copy.bins(&heap).unwrap(), t.bins(&heap).unwrap());
        for (is_store, k, v) in edits {
            if is_store {
                copy.store(&mut heap, Value::Fixnum(k), Value::Fixnum(v)).unwrap();
            } else {
                copy.remove(&mut heap, Value::Fixnum(k)).unwrap();
            }
        }

        prop_assert_eq!(t.entries(&heap).unwrap(), snapshot.len());
        for (k, v) in &snapshot {
            prop_assert_eq!(t.fetch(&heap, *k).unwrap(), *v);
        }
        for k in 0..96 {
            let present = snapshot.iter().any(|(sk, _)| *sk == Value::Fixnum(k));
            prop_assert_eq!(t.has_key(&heap, Value::Fixnum(k)).unwrap(), present);
        }
    }
}

// Property 4: bulk consistency.
proptest! {
    #[test]
    fn prop_bulk_consistency(ops in proptest::collection::vec((any::<bool>(), -50i64..50, proptest::option::of(any::<i64>())), 0..200)) {
        let mut heap = Heap::new();
        let t = LookupTable::create(&mut heap).unwrap();
        for (is_store, k, v) in ops {
            if is_store {
                t.store(&mut heap, Value::Fixnum(k), value_of(v)).unwrap();
            } else {
                t.remove(&mut heap, Value::Fixnum(k)).unwrap();
            }
        }

        let keys = t.all_keys(&heap).unwrap();
        let values = t.all_values(&heap).unwrap();
        let entries = t.entries(&heap).unwrap();
        prop_assert_eq!(keys.len(), entries);
        prop_assert_eq!(values.len(), entries);
        for (k, v) in keys.iter().zip(values.iter()) {
            prop_assert_eq!(t.fetch(&heap, *k).unwrap(), *v);
        }
    }
}
