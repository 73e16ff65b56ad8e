//! Heap: the allocation context tables draw their storage from.
//!
//! Every piece of table state (slot arrays, chain links, the boxed bin and
//! entry counters, the table record itself) is a cell in one of the typed
//! arenas below. Handles are generational, so a handle that outlives its
//! cell is reported as [`HeapError::Dangling`] instead of aliasing a newer
//! cell.
//!
//! Reclamation is the caller's call: [`Heap::collect`] marks from the roots
//! it is given and sweeps everything else. Tables never free cells
//! themselves; a removed link or a replaced slot array simply stops being
//! reachable.

use crate::link::{Link, LinkRef};
use crate::lookup_table::{LookupTable, TableFields};
use crate::symbols::{Symbol, SymbolTable};
use crate::value::Value;
use core::hash::BuildHasher;
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use std::collections::hash_map::RandomState;
use thiserror::Error;

new_key_type! {
    /// Handle to a heap object (string or opaque object).
    pub struct ObjectRef;
    /// Handle to a boxed integer.
    pub struct IntRef;
    /// Handle to a slot array.
    pub struct SlotArrayRef;
    pub(crate) struct TableKey;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("heap exhausted: {live} live cells, limit {limit}")]
    Exhausted { live: usize, limit: usize },
    #[error("bin count {bins} has no power-of-two capacity")]
    Overflow { bins: usize },
    #[error("dangling {0} reference")]
    Dangling(&'static str),
}

#[derive(Debug)]
pub(crate) enum HeapObject {
    String(Box<str>),
    Opaque,
}

/// A starting point for [`Heap::collect`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Root {
    Table(LookupTable),
    Value(Value),
}

impl From<LookupTable> for Root {
    fn from(t: LookupTable) -> Self {
        Root::Table(t)
    }
}

impl From<Value> for Root {
    fn from(v: Value) -> Self {
        Root::Value(v)
    }
}

/// Live cell counts per arena. Symbols are immortal and not counted
/// against the limit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub objects: usize,
    pub tables: usize,
    pub slot_arrays: usize,
    pub links: usize,
    pub integers: usize,
    pub symbols: usize,
}

impl HeapStats {
    pub fn live(&self) -> usize {
        self.objects + self.tables + self.slot_arrays + self.links + self.integers
    }
}

pub struct Heap<S = RandomState> {
    objects: SlotMap<ObjectRef, HeapObject>,
    tables: SlotMap<TableKey, TableFields>,
    slot_arrays: SlotMap<SlotArrayRef, Box<[Option<LinkRef>]>>,
    links: SlotMap<LinkRef, Link>,
    integers: SlotMap<IntRef, i64>,
    symbols: SymbolTable<S>,
    hasher: S,
    limit: Option<usize>,
}

impl Heap {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    /// A heap that refuses to hold more than `limit` live cells.
    pub fn with_limit(limit: usize) -> Self {
        let mut heap = Self::new();
        heap.set_limit(Some(limit));
        heap
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Marks {
    objects: SecondaryMap<ObjectRef, ()>,
    tables: SecondaryMap<TableKey, ()>,
    slot_arrays: SecondaryMap<SlotArrayRef, ()>,
    links: SecondaryMap<LinkRef, ()>,
    integers: SecondaryMap<IntRef, ()>,
}

impl Marks {
    fn value(&mut self, v: Value) {
        if let Value::Object(obj) = v {
            self.objects.insert(obj, ());
        }
    }
}

impl<S> Heap<S>
where
    S: BuildHasher + Clone,
{
    /// Uses `hasher` both for string contents and for the symbol table.
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            objects: SlotMap::with_key(),
            tables: SlotMap::with_key(),
            slot_arrays: SlotMap::with_key(),
            links: SlotMap::with_key(),
            integers: SlotMap::with_key(),
            symbols: SymbolTable::with_hasher(hasher.clone()),
            hasher,
            limit: None,
        }
    }
}

impl<S> Heap<S> {
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            objects: self.objects.len(),
            tables: self.tables.len(),
            slot_arrays: self.slot_arrays.len(),
            links: self.links.len(),
            integers: self.integers.len(),
            symbols: self.symbols.len(),
        }
    }

    /// Number of live cells counted against the limit.
    pub fn live(&self) -> usize {
        self.stats().live()
    }

    fn reserve(&self) -> Result<(), HeapError> {
        match self.limit {
            Some(limit) if self.live() >= limit => Err(HeapError::Exhausted {
                live: self.live(),
                limit,
            }),
            _ => Ok(()),
        }
    }

    // Allocation context

    pub fn allocate_slot_array(&mut self, n: usize) -> Result<SlotArrayRef, HeapError> {
        self.reserve()?;
        Ok(self.slot_arrays.insert(vec![None; n].into_boxed_slice()))
    }

    pub fn allocate_link(
        &mut self,
        key: Value,
        value: Value,
        next: Option<LinkRef>,
    ) -> Result<LinkRef, HeapError> {
        self.reserve()?;
        Ok(self.links.insert(Link { key, value, next }))
    }

    pub fn box_integer(&mut self, n: i64) -> Result<IntRef, HeapError> {
        self.reserve()?;
        Ok(self.integers.insert(n))
    }

    pub fn read_integer(&self, r: IntRef) -> Result<i64, HeapError> {
        self.integers
            .get(r)
            .copied()
            .ok_or(HeapError::Dangling("integer"))
    }

    pub fn link(&self, r: LinkRef) -> Result<&Link, HeapError> {
        self.links.get(r).ok_or(HeapError::Dangling("link"))
    }

    pub fn slot_array(&self, r: SlotArrayRef) -> Result<&[Option<LinkRef>], HeapError> {
        self.slot_arrays
            .get(r)
            .map(|s| &**s)
            .ok_or(HeapError::Dangling("slot array"))
    }

    pub(crate) fn link_mut(&mut self, r: LinkRef) -> Result<&mut Link, HeapError> {
        self.links.get_mut(r).ok_or(HeapError::Dangling("link"))
    }

    pub(crate) fn set_slot(
        &mut self,
        r: SlotArrayRef,
        idx: usize,
        head: Option<LinkRef>,
    ) -> Result<(), HeapError> {
        let slots = self
            .slot_arrays
            .get_mut(r)
            .ok_or(HeapError::Dangling("slot array"))?;
        slots[idx] = head;
        Ok(())
    }

    pub(crate) fn allocate_table(&mut self, fields: TableFields) -> Result<TableKey, HeapError> {
        self.reserve()?;
        Ok(self.tables.insert(fields))
    }

    pub(crate) fn table_fields(&self, t: TableKey) -> Result<TableFields, HeapError> {
        self.tables
            .get(t)
            .copied()
            .ok_or(HeapError::Dangling("table"))
    }

    pub(crate) fn set_table_fields(
        &mut self,
        t: TableKey,
        fields: TableFields,
    ) -> Result<(), HeapError> {
        let slot = self.tables.get_mut(t).ok_or(HeapError::Dangling("table"))?;
        *slot = fields;
        Ok(())
    }

    // Object model

    pub fn alloc_string(&mut self, s: &str) -> Result<Value, HeapError> {
        self.reserve()?;
        Ok(Value::Object(self.objects.insert(HeapObject::String(s.into()))))
    }

    /// An object with identity semantics and no contents.
    pub fn alloc_object(&mut self) -> Result<Value, HeapError> {
        self.reserve()?;
        Ok(Value::Object(self.objects.insert(HeapObject::Opaque)))
    }

    pub fn string(&self, r: ObjectRef) -> Option<&str> {
        match self.objects.get(r)? {
            HeapObject::String(s) => Some(s),
            HeapObject::Opaque => None,
        }
    }

    pub fn contains_object(&self, r: ObjectRef) -> bool {
        self.objects.contains_key(r)
    }

    pub(crate) fn object(&self, r: ObjectRef) -> Option<&HeapObject> {
        self.objects.get(r)
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn symbols(&self) -> &SymbolTable<S> {
        &self.symbols
    }

    // Collection

    /// Mark everything reachable from `roots`, sweep the rest, and return
    /// the number of reclaimed cells. Handles into swept cells report
    /// [`HeapError::Dangling`] afterwards.
    pub fn collect<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = Root>,
    {
        let mut marks = Marks::default();
        for root in roots {
            match root {
                Root::Value(v) => marks.value(v),
                Root::Table(t) => self.mark_table(t.key(), &mut marks),
            }
        }

        let before = self.live();
        self.objects.retain(|k, _| marks.objects.contains_key(k));
        self.tables.retain(|k, _| marks.tables.contains_key(k));
        self.slot_arrays
            .retain(|k, _| marks.slot_arrays.contains_key(k));
        self.links.retain(|k, _| marks.links.contains_key(k));
        self.integers.retain(|k, _| marks.integers.contains_key(k));
        before - self.live()
    }

    fn mark_table(&self, t: TableKey, marks: &mut Marks) {
        let Some(fields) = self.tables.get(t) else {
            return;
        };
        if marks.tables.insert(t, ()).is_some() {
            return;
        }
        marks.integers.insert(fields.bins, ());
        marks.integers.insert(fields.entries, ());
        let Some(slots) = self.slot_arrays.get(fields.slots) else {
            return;
        };
        marks.slot_arrays.insert(fields.slots, ());
        for head in slots.iter() {
            let mut cur = *head;
            while let Some(r) = cur {
                let Some(link) = self.links.get(r) else {
                    break;
                };
                if marks.links.insert(r, ()).is_some() {
                    break;
                }
                marks.value(link.key);
                marks.value(link.value);
                cur = link.next;
            }
        }
    }
}

impl<S> Heap<S>
where
    S: BuildHasher,
{
    pub fn intern(&mut self, name: &str) -> Value {
        Value::Symbol(self.symbols.intern(name))
    }

    pub fn symbol(&self, name: &str) -> Option<Symbol> {
        self.symbols.find(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: Every allocation counts as one live cell, whatever its size.
    #[test]
    fn allocations_are_counted() {
        let mut heap = Heap::new();
        assert_eq!(heap.live(), 0);
        let slots = heap.allocate_slot_array(64).unwrap();
        let n = heap.box_integer(7).unwrap();
        let l = heap
            .allocate_link(Value::Fixnum(1), Value::True, None)
            .unwrap();
        assert_eq!(heap.live(), 3);
        assert_eq!(heap.slot_array(slots).unwrap().len(), 64);
        assert!(heap.slot_array(slots).unwrap().iter().all(|s| s.is_none()));
        assert_eq!(heap.read_integer(n), Ok(7));
        assert_eq!(heap.link(l).unwrap().value(), Value::True);
    }

    /// Invariant: A bounded heap refuses allocations past its limit and
    /// reports how full it is.
    #[test]
    fn limit_is_enforced() {
        let mut heap = Heap::with_limit(2);
        heap.box_integer(1).unwrap();
        heap.box_integer(2).unwrap();
        assert_eq!(
            heap.box_integer(3),
            Err(HeapError::Exhausted { live: 2, limit: 2 })
        );
        heap.set_limit(None);
        assert!(heap.box_integer(3).is_ok());
    }

    /// Invariant: Error messages name the failing quantity.
    #[test]
    fn error_messages() {
        assert_eq!(
            HeapError::Overflow { bins: usize::MAX }.to_string(),
            format!("bin count {} has no power-of-two capacity", usize::MAX)
        );
        assert_eq!(
            HeapError::Exhausted { live: 3, limit: 3 }.to_string(),
            "heap exhausted: 3 live cells, limit 3"
        );
        assert_eq!(HeapError::Dangling("link").to_string(), "dangling link reference");
    }

    /// Invariant: Collecting with no roots frees every cell, and stale
    /// handles then report `Dangling` instead of aliasing new cells.
    #[test]
    fn collect_without_roots_frees_everything() {
        let mut heap = Heap::new();
        let n = heap.box_integer(1).unwrap();
        let s = heap.alloc_string("gone").unwrap();
        assert_eq!(heap.collect(core::iter::empty()), 2);
        assert_eq!(heap.live(), 0);
        assert_eq!(heap.read_integer(n), Err(HeapError::Dangling("integer")));
        let Value::Object(obj) = s else {
            panic!("expected object");
        };
        assert!(!heap.contains_object(obj));

        let fresh = heap.box_integer(2).unwrap();
        assert_ne!(n, fresh);
        assert_eq!(heap.read_integer(n), Err(HeapError::Dangling("integer")));
    }

    /// Invariant: Value roots keep their objects alive.
    #[test]
    fn value_roots_survive() {
        let mut heap = Heap::new();
        let keep = heap.alloc_string("keep").unwrap();
        let _drop = heap.alloc_string("drop").unwrap();
        assert_eq!(heap.collect([Root::Value(keep)]), 1);
        let Value::Object(obj) = keep else {
            panic!("expected object");
        };
        assert_eq!(heap.string(obj), Some("keep"));
    }

    /// Invariant: Symbols are interned per heap and survive collection.
    #[test]
    fn symbols_are_interned_and_immortal() {
        let mut heap = Heap::new();
        let a = heap.intern("to_s");
        let b = heap.intern("to_s");
        assert_eq!(a, b);
        heap.collect(core::iter::empty());
        let Value::Symbol(sym) = a else {
            panic!("expected symbol");
        };
        assert_eq!(sym.name(&heap), Some("to_s"));
        assert_eq!(heap.symbol("to_s"), Some(sym));
        assert_eq!(heap.stats().symbols, 1);
        assert_eq!(heap.live(), 0);
    }
}
