use crate::value::Value;
use parking_lot::MappedRwLockWriteGuard;
use std::{
    fmt::{Debug, Formatter},
    ops::{Deref, DerefMut},
};

/// Writable reference to a storage location.
///
/// Heap and static locations hold the lock of their own slot for as long as
/// the pointer lives. Other slots stay usable; borrowing the same slot again
/// fails with [`ExecutionError::SlotBorrowed`](crate::error::ExecutionError::SlotBorrowed).
pub enum ManagedPtr<'a> {
    Locked(MappedRwLockWriteGuard<'a, Value>),
    /// A location inside a struct the caller borrowed mutably.
    Interior(&'a mut Value),
}

impl Deref for ManagedPtr<'_> {
    type Target = Value;

    fn deref(&self) -> &Value {
        match self {
            ManagedPtr::Locked(guard) => &**guard,
            ManagedPtr::Interior(value) => &**value,
        }
    }
}

impl DerefMut for ManagedPtr<'_> {
    fn deref_mut(&mut self) -> &mut Value {
        match self {
            ManagedPtr::Locked(guard) => &mut **guard,
            ManagedPtr::Interior(value) => &mut **value,
        }
    }
}

impl Debug for ManagedPtr<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ManagedPtr({:?})", self.deref())
    }
}
