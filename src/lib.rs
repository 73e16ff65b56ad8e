//! lookup-table: a chained hash table for a runtime's object memory, where
//! the buckets, the chain links and even the size counters are cells in a
//! garbage-collected heap.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a classic separate-chaining table whose every piece of state is
//!   heap-visible, so a collector can trace it like any other object graph,
//!   and whose keys are tagged values with polymorphic hash/equality.
//! - Layers:
//!   - `Value`: the tagged reference. Hashing and equality dispatch on the
//!     variant (fixnums hash to themselves, strings by content, everything
//!     else by identity).
//!   - `Heap`: the allocation context. Typed generational arenas for
//!     objects, tables, slot arrays, chain links and boxed integers, an
//!     optional cell limit, a symbol table, and a mark-and-sweep `collect`.
//!   - `LookupTable`: a handle to a `{bins, entries, slots}` record in the
//!     heap, plus the store/remove/resize algorithms and the queries.
//!
//! Constraints
//! - Single mutator: every mutating call takes `&mut Heap`.
//! - No cached native state: bin and entry counts are boxed integers read
//!   and re-boxed through the heap on every operation.
//! - `bins` is a power of two, at least `MIN_BINS`; bucket placement is a
//!   mask of the hash.
//! - Chains are tail-inserted and never cyclic; a link belongs to exactly
//!   one slot or one predecessor.
//!
//! Failure boundaries
//! - Heap exhaustion is the only runtime error and it is propagated as-is.
//!   Operations allocate before they write, so a failure never leaves a
//!   table whose counters disagree with its chains.
//! - Handles that outlive a collection report `HeapError::Dangling` rather
//!   than aliasing recycled cells.
//! - Misbehaving hash/equality (non-stable hashes) is outside the contract.
//!
//! Notes and non-goals
//! - Not thread-safe, no serialization format.
//! - The collector is deliberately minimal: it exists so "unreachable links
//!   and slot arrays are collectible" is observable, not as a GC design.
//! - Symbols are immortal and do not count against the heap limit.

pub mod heap;
pub mod link;
pub mod lookup_table;
mod lookup_table_proptest;
pub mod symbols;
pub mod value;

// Public surface
pub use heap::{Heap, HeapError, HeapStats, IntRef, ObjectRef, Root, SlotArrayRef};
pub use link::{Link, LinkRef};
pub use lookup_table::{LookupTable, MIN_BINS};
pub use symbols::{Symbol, SymbolTable};
pub use value::Value;
