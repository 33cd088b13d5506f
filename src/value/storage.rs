use crate::{
    error::ExecutionError,
    types::{MetadataProvider, TypeDescription, members::FieldDescription},
    value::{Value, layout::FieldLayout},
};
use dashmap::DashMap;
use parking_lot::{MappedRwLockWriteGuard, RwLock, RwLockWriteGuard};
use std::sync::Arc;

/// Slot-addressed field values, laid out by [`FieldLayout`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldStorage {
    slots: Vec<Value>,
}

impl FieldStorage {
    pub fn new(slots: Vec<Value>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Value> {
        self.slots.get_mut(slot)
    }

    pub fn set(&mut self, slot: usize, value: Value) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) => {
                *s = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.slots.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.slots
    }
}

/// Why a shared slot could not be reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotError {
    Missing,
    /// A reference to the slot is alive, on this thread or another.
    Borrowed,
}

impl SlotError {
    pub fn into_execution(self, type_name: String, slot: usize) -> ExecutionError {
        match self {
            SlotError::Missing => ExecutionError::InvalidSlot { type_name, slot },
            SlotError::Borrowed => ExecutionError::SlotBorrowed { type_name, slot },
        }
    }
}

/// Field values shared between threads, each slot behind its own lock.
///
/// Nothing here waits: a slot that is borrowed for writing reports
/// [`SlotError::Borrowed`] instead.
#[derive(Debug, Default)]
pub struct SlotCells {
    cells: Box<[RwLock<Value>]>,
}

impl SlotCells {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            cells: values.into_iter().map(RwLock::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn cell(&self, slot: usize) -> Result<&RwLock<Value>, SlotError> {
        self.cells.get(slot).ok_or(SlotError::Missing)
    }

    pub fn get(&self, slot: usize) -> Result<Value, SlotError> {
        let value = self.cell(slot)?.try_read().ok_or(SlotError::Borrowed)?;
        Ok(value.clone())
    }

    pub fn set(&self, slot: usize, value: Value) -> Result<(), SlotError> {
        *self.borrow_mut(slot)? = value;
        Ok(())
    }

    /// Exclusive handle on one slot; other slots stay available.
    pub fn borrow_mut(&self, slot: usize) -> Result<MappedRwLockWriteGuard<'_, Value>, SlotError> {
        let guard = self.cell(slot)?.try_write().ok_or(SlotError::Borrowed)?;
        Ok(RwLockWriteGuard::map(guard, |value| value))
    }

    /// Copy of every slot, as for unboxing a struct.
    pub fn snapshot(&self) -> Result<FieldStorage, SlotError> {
        (0..self.cells.len())
            .map(|slot| self.get(slot))
            .collect::<Result<Vec<_>, _>>()
            .map(FieldStorage::new)
    }
}

/// Static fields of one type.
#[derive(Debug)]
pub struct StaticStorage {
    layout: FieldLayout,
    cells: SlotCells,
}

impl StaticStorage {
    pub fn description(&self) -> TypeDescription {
        self.layout.description
    }

    pub fn slot_of(&self, field: FieldDescription) -> Option<usize> {
        self.layout.slot_of(field)
    }

    pub fn get(&self, slot: usize) -> Result<Value, SlotError> {
        self.cells.get(slot)
    }

    pub fn set(&self, slot: usize, value: Value) -> Result<(), SlotError> {
        self.cells.set(slot, value)
    }

    pub fn slot_mut(&self, slot: usize) -> Result<MappedRwLockWriteGuard<'_, Value>, SlotError> {
        self.cells.borrow_mut(slot)
    }
}

/// Process-wide static field storage, created on first use per type.
#[derive(Debug, Default)]
pub struct StaticStorageManager {
    types: DashMap<TypeDescription, Arc<StaticStorage>>,
}

impl StaticStorageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, description: TypeDescription) -> Option<Arc<StaticStorage>> {
        self.types.get(&description).map(|s| Arc::clone(&s))
    }

    pub fn get_or_init(
        &self,
        metadata: &dyn MetadataProvider,
        description: TypeDescription,
    ) -> Arc<StaticStorage> {
        if let Some(existing) = self.get(description) {
            return existing;
        }
        let layout = FieldLayout::statics(metadata, description);
        let cells = SlotCells::new(layout.new_storage(metadata).into_values());
        let created = Arc::new(StaticStorage { layout, cells });
        // a concurrent initializer may have won; keep whichever was inserted first
        Arc::clone(&self.types.entry(description).or_insert(created))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoreType, registry::RegistryBuilder};

    #[test]
    fn static_storage_is_shared_per_type() {
        let mut builder = RegistryBuilder::new();
        let int = builder.core(CoreType::Int32);
        let config = builder.class("Game.Config");
        builder
            .define(config)
            .field("instance", int)
            .static_field("limit", int);
        let registry = builder.build();
        let manager = StaticStorageManager::new();

        let first = manager.get_or_init(&registry, config);
        let second = manager.get_or_init(&registry, config);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);

        let limit = FieldDescription { parent: config, index: 1 };
        let slot = first.slot_of(limit).unwrap();
        *first.slot_mut(slot).unwrap() = Value::Int32(5);
        assert_eq!(second.get(slot), Ok(Value::Int32(5)));
        assert_eq!(first.slot_of(FieldDescription { parent: config, index: 0 }), None);
    }

    #[test]
    fn slots_lock_independently() {
        let cells = SlotCells::new(vec![Value::Int32(1), Value::Int32(2)]);
        let mut a = cells.borrow_mut(0).unwrap();
        let mut b = cells.borrow_mut(1).unwrap();
        std::mem::swap(&mut *a, &mut *b);

        assert_eq!(cells.borrow_mut(0).err(), Some(SlotError::Borrowed));
        assert_eq!(cells.get(1), Err(SlotError::Borrowed));
        drop(a);
        drop(b);

        assert_eq!(cells.get(0), Ok(Value::Int32(2)));
        assert_eq!(cells.get(1), Ok(Value::Int32(1)));
        assert_eq!(cells.get(2), Err(SlotError::Missing));
        assert_eq!(
            cells.snapshot(),
            Ok(FieldStorage::new(vec![Value::Int32(2), Value::Int32(1)]))
        );
    }
}
