//! Chain links: the `{key, value, next}` records hanging off each slot.

use crate::value::Value;
use slotmap::new_key_type;

new_key_type! {
    /// Handle to a chain link in the heap. Inspect it with
    /// [`Heap::link`](crate::Heap::link).
    pub struct LinkRef;
}

/// One key/value pair and the next link of the same bucket, if any.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Link {
    pub(crate) key: Value,
    pub(crate) value: Value,
    pub(crate) next: Option<LinkRef>,
}

impl Link {
    pub fn key(&self) -> Value {
        self.key
    }

    pub fn value(&self) -> Value {
        self.value
    }

    /// Successor within the bucket, in insertion order.
    pub fn next(&self) -> Option<LinkRef> {
        self.next
    }
}
