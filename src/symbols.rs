//! SymbolTable: interned names with stable handles.

use crate::heap::Heap;
use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{new_key_type, Key, SlotMap};
use std::collections::hash_map::RandomState;

new_key_type! {
    pub(crate) struct SymbolKey;
}

/// Handle to an interned name. Two symbols are equal iff their names are.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Symbol(SymbolKey);

impl Symbol {
    pub fn name<'a, S>(&self, heap: &'a Heap<S>) -> Option<&'a str> {
        heap.symbols().name(*self)
    }

    /// Identity word: arena index in the low bits, generation above.
    pub(crate) fn identity(&self) -> u64 {
        self.0.data().as_ffi()
    }
}

#[derive(Debug)]
struct Entry {
    name: Box<str>,
    hash: u64,
}

pub struct SymbolTable<S = RandomState> {
    hasher: S,
    index: HashTable<SymbolKey>,
    names: SlotMap<SymbolKey, Entry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over interned symbols in arena order.
pub struct Iter<'a> {
    it: slotmap::basic::Iter<'a, SymbolKey, Entry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Symbol, &'a str);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(k, e)| (Symbol(k), &*e.name))
    }
}

impl<S> SymbolTable<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            names: SlotMap::with_key(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, sym: Symbol) -> Option<&str> {
        self.names.get(sym.0).map(|e| &*e.name)
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            it: self.names.iter(),
        }
    }
}

impl<S> SymbolTable<S>
where
    S: BuildHasher,
{
    fn make_hash(&self, name: &str) -> u64 {
        self.hasher.hash_one(name)
    }

    pub fn find(&self, name: &str) -> Option<Symbol> {
        let hash = self.make_hash(name);
        self.index
            .find(hash, |&k| {
                self.names
                    .get(k)
                    .map(|e| &*e.name == name)
                    .unwrap_or(false)
            })
            .map(|&k| Symbol(k))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Return the symbol for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Symbol {
        let hash = self.make_hash(name);
        match self.index.entry(
            hash,
            |&k| {
                self.names
                    .get(k)
                    .map(|e| &*e.name == name)
                    .unwrap_or(false)
            },
            |&k| self.names.get(k).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => Symbol(*o.get()),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = self.names.insert(Entry {
                    name: name.into(),
                    hash,
                });
                let _ = v.insert(k);
                Symbol(k)
            }
        }
    }

}
