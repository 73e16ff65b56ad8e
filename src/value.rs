//! Value: the tagged reference every key and value in the heap is made of.
//!
//! Immediates (`nil`, booleans, fixnums, the `undefined` marker) carry their
//! payload inline. Symbols and heap objects are handles into the [`Heap`].
//! Hashing and equality dispatch on the variant:
//!
//! | variant            | hash                      | `eql`              |
//! |--------------------|---------------------------|--------------------|
//! | `Fixnum(n)`        | `n` itself                | identity           |
//! | `Nil/True/False`   | fixed tag word            | identity           |
//! | `Symbol`           | arena identity            | identity           |
//! | string object      | content, heap hasher      | content            |
//! | other objects      | arena identity            | identity           |
//!
//! Derived `PartialEq` is identity (two handles to distinct but equal
//! strings compare unequal); tables use [`Value::eql`].

use crate::heap::{Heap, HeapObject, ObjectRef};
use crate::symbols::Symbol;
use core::hash::BuildHasher;
use slotmap::Key;

const FALSE_TAG: u64 = 0x06;
const TRUE_TAG: u64 = 0x0a;
const NIL_TAG: u64 = 0x0e;
const UNDEF_TAG: u64 = 0x12;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Value {
    Nil,
    True,
    False,
    /// Marks "no such key" in [`LookupTable::find`](crate::LookupTable::find).
    /// Never stored.
    Undef,
    Fixnum(i64),
    Symbol(Symbol),
    Object(ObjectRef),
}

impl Value {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    pub fn as_fixnum(&self) -> Option<i64> {
        match *self {
            Value::Fixnum(n) => Some(n),
            _ => None,
        }
    }

    /// Hash used for bucket placement. Stable for the lifetime of `heap`.
    pub fn hash_with<S>(&self, heap: &Heap<S>) -> u64
    where
        S: BuildHasher,
    {
        match *self {
            Value::Fixnum(n) => n as u64,
            Value::Nil => NIL_TAG,
            Value::True => TRUE_TAG,
            Value::False => FALSE_TAG,
            Value::Undef => UNDEF_TAG,
            Value::Symbol(sym) => sym.identity(),
            Value::Object(obj) => match heap.object(obj) {
                Some(HeapObject::String(s)) => heap.hasher().hash_one(&**s),
                _ => obj.data().as_ffi(),
            },
        }
    }

    /// Key equality: content for strings, identity for everything else.
    pub fn eql<S>(&self, other: &Value, heap: &Heap<S>) -> bool {
        match (*self, *other) {
            (Value::Object(a), Value::Object(b)) if a != b => {
                match (heap.object(a), heap.object(b)) {
                    (Some(HeapObject::String(x)), Some(HeapObject::String(y))) => x == y,
                    _ => false,
                }
            }
            (a, b) => a == b,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Fixnum(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b {
            Value::True
        } else {
            Value::False
        }
    }
}

impl From<Symbol> for Value {
    fn from(sym: Symbol) -> Self {
        Value::Symbol(sym)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}
