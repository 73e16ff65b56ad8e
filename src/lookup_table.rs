//! LookupTable: separate chaining over heap-allocated slot arrays and links.
//!
//! A table is a handle to a heap record of three fields: the boxed bin count,
//! the boxed entry count, and the slot array. Nothing is cached on the Rust
//! side; every operation re-reads the record through the heap and writes
//! updated counters back as freshly boxed integers.
//!
//! Layout
//! - `bins` is a power of two, at least [`MIN_BINS`]; a key lives in slot
//!   `hash & (bins - 1)`.
//! - Each slot heads a singly linked chain. New keys are appended at the
//!   tail, so a chain lists its keys in insertion order.
//!
//! Resizing
//! - Grow to `2 * bins` once `entries == bins`.
//! - Shrink to `bins / 2` once `entries <= bins / 4`, never below
//!   `MIN_BINS`.
//! - Redistribution re-threads the existing links into a newly allocated
//!   slot array, walking old slots in order and each chain head to tail,
//!   so links that share a new bucket keep their relative order.
//!
//! Failure
//! - Heap exhaustion is the only runtime failure. Each operation decides
//!   up front whether it will resize and makes every allocation it needs,
//!   the new slot array included, before its first structural write. An
//!   `Err(HeapError::Exhausted)` therefore leaves the table exactly as it
//!   was.

use crate::heap::{Heap, HeapError, IntRef, SlotArrayRef, TableKey};
use crate::link::{Link, LinkRef};
use crate::value::Value;
use core::hash::BuildHasher;

/// Smallest bin count a table is created with or shrinks to.
pub const MIN_BINS: usize = 16;

#[derive(Copy, Clone, Debug)]
pub(crate) struct TableFields {
    pub(crate) bins: IntRef,
    pub(crate) entries: IntRef,
    pub(crate) slots: SlotArrayRef,
}

#[inline]
fn bucket_index(hash: u64, bins: usize) -> usize {
    debug_assert!(bins.is_power_of_two());
    (hash & (bins as u64 - 1)) as usize
}

fn count<S>(heap: &Heap<S>, r: IntRef) -> Result<usize, HeapError> {
    Ok(heap.read_integer(r)? as usize)
}

/// Result of walking one bucket for a key.
struct Probe {
    idx: usize,
    /// Predecessor of `found`, or the chain tail when `found` is `None`.
    prev: Option<LinkRef>,
    found: Option<LinkRef>,
}

fn probe<S>(heap: &Heap<S>, fields: &TableFields, key: Value) -> Result<Probe, HeapError>
where
    S: BuildHasher,
{
    let bins = count(heap, fields.bins)?;
    let idx = bucket_index(key.hash_with(heap), bins);
    let mut prev = None;
    let mut cur = heap.slot_array(fields.slots)?[idx];
    while let Some(r) = cur {
        let link = heap.link(r)?;
        if link.key.eql(&key, heap) {
            return Ok(Probe {
                idx,
                prev,
                found: Some(r),
            });
        }
        prev = Some(r);
        cur = link.next;
    }
    Ok(Probe {
        idx,
        prev,
        found: None,
    })
}

/// Cells for a resize, allocated before the operation that triggers it
/// touches the table.
struct Resize {
    bins: usize,
    boxed: IntRef,
    slots: SlotArrayRef,
}

impl Resize {
    fn allocate<S>(heap: &mut Heap<S>, bins: usize) -> Result<Self, HeapError> {
        let slots = heap.allocate_slot_array(bins)?;
        let boxed = heap.box_integer(bins as i64)?;
        Ok(Resize { bins, boxed, slots })
    }
}

/// Handle to a table living in a [`Heap`]. Copying the handle does not copy
/// the table; use [`LookupTable::dup`] for that.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LookupTable(TableKey);

impl LookupTable {
    pub(crate) fn key(&self) -> TableKey {
        self.0
    }

    /// An empty table with `MIN_BINS` slots.
    pub fn create<S>(heap: &mut Heap<S>) -> Result<Self, HeapError> {
        Self::with_bins(heap, MIN_BINS)
    }

    /// An empty table with at least `bins` slots, rounded up to a power of two.
    pub fn with_bins<S>(heap: &mut Heap<S>, bins: usize) -> Result<Self, HeapError> {
        let bins = bins
            .max(MIN_BINS)
            .checked_next_power_of_two()
            .ok_or(HeapError::Overflow { bins })?;
        let slots = heap.allocate_slot_array(bins)?;
        let fields = TableFields {
            bins: heap.box_integer(bins as i64)?,
            entries: heap.box_integer(0)?,
            slots,
        };
        Ok(LookupTable(heap.allocate_table(fields)?))
    }

    /// Current number of slots.
    pub fn bins<S>(&self, heap: &Heap<S>) -> Result<usize, HeapError> {
        count(heap, heap.table_fields(self.0)?.bins)
    }

    /// Current number of stored pairs.
    pub fn entries<S>(&self, heap: &Heap<S>) -> Result<usize, HeapError> {
        count(heap, heap.table_fields(self.0)?.entries)
    }

    pub fn len<S>(&self, heap: &Heap<S>) -> Result<usize, HeapError> {
        self.entries(heap)
    }

    pub fn is_empty<S>(&self, heap: &Heap<S>) -> Result<bool, HeapError> {
        Ok(self.entries(heap)? == 0)
    }

    /// Insert or overwrite. Overwriting an existing key allocates nothing.
    pub fn store<S>(&self, heap: &mut Heap<S>, key: Value, value: Value) -> Result<(), HeapError>
    where
        S: BuildHasher,
    {
        debug_assert!(!key.is_undef() && !value.is_undef(), "undefined is not storable");
        let mut fields = heap.table_fields(self.0)?;
        let probe = probe(heap, &fields, key)?;
        if let Some(found) = probe.found {
            heap.link_mut(found)?.value = value;
            return Ok(());
        }

        let entries = count(heap, fields.entries)? + 1;
        let bins = count(heap, fields.bins)?;
        let grow = if entries >= bins {
            let doubled = bins.checked_mul(2).ok_or(HeapError::Overflow { bins })?;
            Some(Resize::allocate(heap, doubled)?)
        } else {
            None
        };
        let link = heap.allocate_link(key, value, None)?;
        fields.entries = heap.box_integer(entries as i64)?;

        match probe.prev {
            Some(tail) => heap.link_mut(tail)?.next = Some(link),
            None => heap.set_slot(fields.slots, probe.idx, Some(link))?,
        }
        heap.set_table_fields(self.0, fields)?;
        if let Some(grow) = grow {
            self.redistribute(heap, grow)?;
        }
        Ok(())
    }

    /// Remove `key` and return its value, or `nil` if it was absent.
    pub fn remove<S>(&self, heap: &mut Heap<S>, key: Value) -> Result<Value, HeapError>
    where
        S: BuildHasher,
    {
        let mut fields = heap.table_fields(self.0)?;
        let probe = probe(heap, &fields, key)?;
        let Some(found) = probe.found else {
            return Ok(Value::Nil);
        };

        let entries = count(heap, fields.entries)? - 1;
        let bins = count(heap, fields.bins)?;
        let shrink = if entries <= bins / 4 && bins / 2 >= MIN_BINS {
            Some(Resize::allocate(heap, bins / 2)?)
        } else {
            None
        };
        fields.entries = heap.box_integer(entries as i64)?;

        let Link { value, next, .. } = *heap.link(found)?;
        match probe.prev {
            Some(prev) => heap.link_mut(prev)?.next = next,
            None => heap.set_slot(fields.slots, probe.idx, next)?,
        }
        // A stale LinkRef must not lead back into the live chain.
        heap.link_mut(found)?.next = None;
        heap.set_table_fields(self.0, fields)?;
        if let Some(shrink) = shrink {
            self.redistribute(heap, shrink)?;
        }
        Ok(value)
    }

    /// Re-thread every link into the slot array of `resize`. Allocates
    /// nothing.
    fn redistribute<S>(&self, heap: &mut Heap<S>, resize: Resize) -> Result<(), HeapError>
    where
        S: BuildHasher,
    {
        let Resize { bins, boxed, slots } = resize;
        let mut fields = heap.table_fields(self.0)?;

        let heads = heap.slot_array(fields.slots)?.to_vec();
        let mut tails: Vec<Option<LinkRef>> = vec![None; bins];
        for head in heads {
            let mut cur = head;
            while let Some(r) = cur {
                let Link { key, next, .. } = *heap.link(r)?;
                let idx = bucket_index(key.hash_with(heap), bins);
                heap.link_mut(r)?.next = None;
                match tails[idx] {
                    Some(tail) => heap.link_mut(tail)?.next = Some(r),
                    None => heap.set_slot(slots, idx, Some(r))?,
                }
                tails[idx] = Some(r);
                cur = next;
            }
        }

        fields.slots = slots;
        fields.bins = boxed;
        heap.set_table_fields(self.0, fields)?;
        debug_assert!(self.is_consistent(heap));
        Ok(())
    }

    /// The chain link holding `key`, if any.
    pub fn find_entry<S>(&self, heap: &Heap<S>, key: Value) -> Result<Option<LinkRef>, HeapError>
    where
        S: BuildHasher,
    {
        let fields = heap.table_fields(self.0)?;
        Ok(probe(heap, &fields, key)?.found)
    }

    /// The stored value, or [`Value::Undef`] when `key` is absent. Unlike
    /// [`fetch`](Self::fetch) this tells a stored `nil` apart from a miss.
    pub fn find<S>(&self, heap: &Heap<S>, key: Value) -> Result<Value, HeapError>
    where
        S: BuildHasher,
    {
        match self.find_entry(heap, key)? {
            Some(r) => Ok(heap.link(r)?.value),
            None => Ok(Value::Undef),
        }
    }

    /// The stored value, or `nil` when `key` is absent.
    pub fn fetch<S>(&self, heap: &Heap<S>, key: Value) -> Result<Value, HeapError>
    where
        S: BuildHasher,
    {
        match self.find(heap, key)? {
            Value::Undef => Ok(Value::Nil),
            v => Ok(v),
        }
    }

    pub fn has_key<S>(&self, heap: &Heap<S>, key: Value) -> Result<bool, HeapError>
    where
        S: BuildHasher,
    {
        Ok(self.find_entry(heap, key)?.is_some())
    }

    /// A new table with the same pairs and the same bin count. Links and the
    /// slot array are copied; chains keep their order.
    pub fn dup<S>(&self, heap: &mut Heap<S>) -> Result<LookupTable, HeapError> {
        let fields = heap.table_fields(self.0)?;
        let bins = count(heap, fields.bins)?;
        let entries = heap.read_integer(fields.entries)?;
        let heads = heap.slot_array(fields.slots)?.to_vec();

        let slots = heap.allocate_slot_array(bins)?;
        for (idx, head) in heads.into_iter().enumerate() {
            let mut tail: Option<LinkRef> = None;
            let mut cur = head;
            while let Some(r) = cur {
                let Link { key, value, next } = *heap.link(r)?;
                let copy = heap.allocate_link(key, value, None)?;
                match tail {
                    Some(t) => heap.link_mut(t)?.next = Some(copy),
                    None => heap.set_slot(slots, idx, Some(copy))?,
                }
                tail = Some(copy);
                cur = next;
            }
        }

        let copy = TableFields {
            bins: heap.box_integer(bins as i64)?,
            entries: heap.box_integer(entries)?,
            slots,
        };
        Ok(LookupTable(heap.allocate_table(copy)?))
    }

    /// Pairs in slot order, then chain order within each slot.
    pub fn iter<'h, S>(&self, heap: &'h Heap<S>) -> Result<Iter<'h, S>, HeapError> {
        let fields = heap.table_fields(self.0)?;
        Ok(Iter {
            heap,
            slots: heap.slot_array(fields.slots)?.iter(),
            cur: None,
            failed: false,
        })
    }

    pub fn all_keys<S>(&self, heap: &Heap<S>) -> Result<Vec<Value>, HeapError> {
        self.iter(heap)?.map(|e| e.map(|(_, k, _)| k)).collect()
    }

    pub fn all_values<S>(&self, heap: &Heap<S>) -> Result<Vec<Value>, HeapError> {
        self.iter(heap)?.map(|e| e.map(|(_, _, v)| v)).collect()
    }

    pub fn all_entries<S>(&self, heap: &Heap<S>) -> Result<Vec<LinkRef>, HeapError> {
        self.iter(heap)?.map(|e| e.map(|(r, _, _)| r)).collect()
    }

    /// Check every structural invariant: power-of-two bins, slot array
    /// length, chain counts against `entries`, bucket placement, and the
    /// absence of cycles.
    pub fn is_consistent<S>(&self, heap: &Heap<S>) -> bool
    where
        S: BuildHasher,
    {
        self.check(heap).unwrap_or(false)
    }

    fn check<S>(&self, heap: &Heap<S>) -> Result<bool, HeapError>
    where
        S: BuildHasher,
    {
        let fields = heap.table_fields(self.0)?;
        let bins = count(heap, fields.bins)?;
        let entries = count(heap, fields.entries)?;
        let slots = heap.slot_array(fields.slots)?;
        if !bins.is_power_of_two() || bins < MIN_BINS || slots.len() != bins {
            return Ok(false);
        }

        let mut seen = 0usize;
        for (idx, head) in slots.iter().enumerate() {
            let mut cur = *head;
            while let Some(r) = cur {
                seen += 1;
                if seen > entries {
                    return Ok(false);
                }
                let link = heap.link(r)?;
                if bucket_index(link.key.hash_with(heap), bins) != idx {
                    return Ok(false);
                }
                cur = link.next;
            }
        }
        Ok(seen == entries)
    }
}

/// Iterator over `(link, key, value)` in enumeration order. A dangling
/// link is yielded as an error and ends the walk.
pub struct Iter<'h, S> {
    heap: &'h Heap<S>,
    slots: core::slice::Iter<'h, Option<LinkRef>>,
    cur: Option<LinkRef>,
    failed: bool,
}

impl<'h, S> Iterator for Iter<'h, S> {
    type Item = Result<(LinkRef, Value, Value), HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(r) = self.cur {
                return Some(match self.heap.link(r) {
                    Ok(link) => {
                        self.cur = link.next;
                        Ok((r, link.key, link.value))
                    }
                    Err(e) => {
                        self.failed = true;
                        Err(e)
                    }
                });
            }
            self.cur = *self.slots.next()?;
        }
    }
}
