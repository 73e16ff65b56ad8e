#![cfg(test)]

// Property tests for LookupTable kept inside the crate so they can check
// structural invariants through crate-private accessors.

use crate::heap::Heap;
use crate::lookup_table::{LookupTable, MIN_BINS};
use crate::value::Value;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

// Key description; string keys are re-allocated on every use so lookups
// must go through content equality, not identity.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
enum KeySpec {
    Nil,
    True,
    False,
    Fix(i64),
    Str(String),
}

fn materialize(heap: &mut Heap, k: &KeySpec) -> Value {
    match k {
        KeySpec::Nil => Value::Nil,
        KeySpec::True => Value::True,
        KeySpec::False => Value::False,
        KeySpec::Fix(n) => Value::Fixnum(*n),
        KeySpec::Str(s) => heap.alloc_string(s).unwrap(),
    }
}

fn describe(heap: &Heap, v: Value) -> KeySpec {
    match v {
        Value::Nil => KeySpec::Nil,
        Value::True => KeySpec::True,
        Value::False => KeySpec::False,
        Value::Fixnum(n) => KeySpec::Fix(n),
        Value::Object(obj) => KeySpec::Str(heap.string(obj).unwrap().to_string()),
        other => panic!("unexpected key {:?}", other),
    }
}

// Pool-indexed operations so shrinking moves towards earlier keys.
#[derive(Clone, Debug)]
enum Op {
    Store(usize, Option<i64>),
    Remove(usize),
    Fetch(usize),
    Find(usize),
    HasKey(usize),
    Dup,
    Enumerate,
}

fn arb_key() -> impl Strategy<Value = KeySpec> {
    prop_oneof![
        Just(KeySpec::Nil),
        Just(KeySpec::True),
        Just(KeySpec::False),
        (-200i64..200).prop_map(KeySpec::Fix),
        "[a-z]{0,4}".prop_map(KeySpec::Str),
    ]
}

// Every key ends in the same 8 low bits, so they share a bucket until the
// table outgrows 256 bins.
fn arb_colliding_key() -> impl Strategy<Value = KeySpec> {
    (0i64..64).prop_map(|n| KeySpec::Fix((n << 8) | 7))
}

fn arb_scenario<K>(key: K) -> impl Strategy<Value = (Vec<KeySpec>, Vec<Op>)>
where
    K: Strategy<Value = KeySpec>,
{
    proptest::collection::vec(key, 1..=48).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            4 => (idx.clone(), proptest::option::of(any::<i64>()))
                .prop_map(|(i, v)| Op::Store(i, v)),
            2 => idx.clone().prop_map(Op::Remove),
            1 => idx.clone().prop_map(Op::Fetch),
            1 => idx.clone().prop_map(Op::Find),
            1 => idx.clone().prop_map(Op::HasKey),
            1 => Just(Op::Dup),
            1 => Just(Op::Enumerate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

fn to_value(v: Option<i64>) -> Value {
    v.map(Value::Fixnum).unwrap_or(Value::Nil)
}

fn run(pool: Vec<KeySpec>, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut heap = Heap::new();
    let t = LookupTable::create(&mut heap).unwrap();
    let mut model: HashMap<KeySpec, Value> = HashMap::new();

    for op in ops {
        match op {
            Op::Store(i, v) => {
                let k = materialize(&mut heap, &pool[i]);
                t.store(&mut heap, k, to_value(v)).unwrap();
                model.insert(pool[i].clone(), to_value(v));
            }
            Op::Remove(i) => {
                let k = materialize(&mut heap, &pool[i]);
                let out = t.remove(&mut heap, k).unwrap();
                let expected = model.remove(&pool[i]).unwrap_or(Value::Nil);
                prop_assert_eq!(out, expected);
                prop_assert!(!t.has_key(&heap, k).unwrap());
            }
            Op::Fetch(i) => {
                let k = materialize(&mut heap, &pool[i]);
                let expected = model.get(&pool[i]).copied().unwrap_or(Value::Nil);
                prop_assert_eq!(t.fetch(&heap, k).unwrap(), expected);
            }
            Op::Find(i) => {
                let k = materialize(&mut heap, &pool[i]);
                let expected = model.get(&pool[i]).copied().unwrap_or(Value::Undef);
                prop_assert_eq!(t.find(&heap, k).unwrap(), expected);
            }
            Op::HasKey(i) => {
                let k = materialize(&mut heap, &pool[i]);
                prop_assert_eq!(t.has_key(&heap, k).unwrap(), model.contains_key(&pool[i]));
                prop_assert_eq!(t.find_entry(&heap, k).unwrap().is_some(), model.contains_key(&pool[i]));
            }
            Op::Dup => {
                let copy = t.dup(&mut heap).unwrap();
                prop_assert_eq!(copy.bins(&heap).unwrap(), t.bins(&heap).unwrap());
                prop_assert_eq!(copy.all_keys(&heap).unwrap(), t.all_keys(&heap).unwrap());
                prop_assert!(copy.is_consistent(&heap));
                // Mutate the copy; the original must not notice.
                for spec in &pool {
                    let k = materialize(&mut heap, spec);
                    copy.remove(&mut heap, k).unwrap();
                }
                copy.store(&mut heap, Value::Fixnum(i64::MIN), Value::True).unwrap();
                prop_assert!(!t.has_key(&heap, Value::Fixnum(i64::MIN)).unwrap());
                prop_assert_eq!(t.entries(&heap).unwrap(), model.len());
                for (spec, v) in &model {
                    let k = materialize(&mut heap, spec);
                    prop_assert_eq!(t.find(&heap, k).unwrap(), *v);
                }
            }
            Op::Enumerate => {
                let keys = t.all_keys(&heap).unwrap();
                let values = t.all_values(&heap).unwrap();
                prop_assert_eq!(keys.len(), values.len());
                let seen: BTreeSet<KeySpec> = keys.iter().map(|&k| describe(&heap, k)).collect();
                let expected: BTreeSet<KeySpec> = model.keys().cloned().collect();
                prop_assert_eq!(seen, expected);
                for (k, v) in keys.iter().zip(values.iter()) {
                    prop_assert_eq!(t.find(&heap, *k).unwrap(), *v);
                }
            }
        }

        // Post-conditions after each op
        prop_assert_eq!(t.entries(&heap).unwrap(), model.len());
        let bins = t.bins(&heap).unwrap();
        prop_assert!(bins >= MIN_BINS && bins.is_power_of_two());
        prop_assert!(model.len() < bins, "load factor stays below one");
        prop_assert!(t.is_consistent(&heap));
    }
    Ok(())
}

// Property: State-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - store/fetch/find round trip, overwrite keeps the entry count.
// - find distinguishes a stored nil from a miss; fetch does not.
// - remove returns the stored value or nil, and the key is gone afterwards.
// - dup yields an equal, independent table with the same bin count.
// - all_keys/all_values agree with each other and with the model.
// - entries/bins and the structural invariants hold after every op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario(arb_key())) {
        run(pool, ops)?;
    }
}

// Property: Same state machine with every key sharing its low byte, so all
// of them chain in one bucket and growth never separates them.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario(arb_colliding_key())) {
        run(pool, ops)?;
    }
}
