use crate::{
    error::ExecutionError,
    types::{CoreType, MetadataProvider, TypeDescription},
};
use parking_lot::{MappedRwLockWriteGuard, RwLock};
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

pub mod layout;
pub mod pointer;
pub mod storage;

pub use pointer::ManagedPtr;
pub use storage::{FieldStorage, SlotCells, SlotError};

/// A managed value. Enum values are carried as their underlying integral
/// value; structs are carried inline and copied on assignment.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Char(u16),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    IntPtr(isize),
    UIntPtr(usize),
    String(Arc<str>),
    Object(ObjectRef),
    Struct(Object),
    Array(ArrayRef),
}

impl Value {
    pub fn default_for(core: CoreType) -> Self {
        match core {
            CoreType::Boolean => Value::Boolean(false),
            CoreType::Char => Value::Char(0),
            CoreType::Int8 => Value::Int8(0),
            CoreType::UInt8 => Value::UInt8(0),
            CoreType::Int16 => Value::Int16(0),
            CoreType::UInt16 => Value::UInt16(0),
            CoreType::Int32 => Value::Int32(0),
            CoreType::UInt32 => Value::UInt32(0),
            CoreType::Int64 => Value::Int64(0),
            CoreType::UInt64 => Value::UInt64(0),
            CoreType::Float32 => Value::Float32(0.0),
            CoreType::Float64 => Value::Float64(0.0),
            CoreType::IntPtr => Value::IntPtr(0),
            CoreType::UIntPtr => Value::UIntPtr(0),
            CoreType::Object
            | CoreType::ValueType
            | CoreType::Enum
            | CoreType::Void
            | CoreType::String => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integral value widened to `i64`; `None` for `UInt64` values that do not fit.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Int8(v) => v.into(),
            Value::UInt8(v) => v.into(),
            Value::Int16(v) => v.into(),
            Value::UInt16(v) => v.into(),
            Value::Char(v) => v.into(),
            Value::Int32(v) => v.into(),
            Value::UInt32(v) => v.into(),
            Value::Int64(v) => v,
            Value::UInt64(v) => i64::try_from(v).ok()?,
            Value::IntPtr(v) => v as i64,
            _ => return None,
        })
    }

    pub fn core_type(&self) -> Option<CoreType> {
        Some(match self {
            Value::Boolean(_) => CoreType::Boolean,
            Value::Char(_) => CoreType::Char,
            Value::Int8(_) => CoreType::Int8,
            Value::UInt8(_) => CoreType::UInt8,
            Value::Int16(_) => CoreType::Int16,
            Value::UInt16(_) => CoreType::UInt16,
            Value::Int32(_) => CoreType::Int32,
            Value::UInt32(_) => CoreType::UInt32,
            Value::Int64(_) => CoreType::Int64,
            Value::UInt64(_) => CoreType::UInt64,
            Value::Float32(_) => CoreType::Float32,
            Value::Float64(_) => CoreType::Float64,
            Value::IntPtr(_) => CoreType::IntPtr,
            Value::UIntPtr(_) => CoreType::UIntPtr,
            Value::String(_) => CoreType::String,
            Value::Null | Value::Object(_) | Value::Struct(_) | Value::Array(_) => return None,
        })
    }

    /// Exact type of the value; `None` for null.
    pub fn runtime_type(&self, metadata: &dyn MetadataProvider) -> Option<TypeDescription> {
        match self {
            Value::Null => None,
            Value::Object(o) => Some(o.description()),
            Value::Struct(s) => Some(s.description),
            Value::Array(a) => Some(a.description()),
            other => other.core_type().map(|c| metadata.core_type(c)),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

impl From<ArrayRef> for Value {
    fn from(value: ArrayRef) -> Self {
        Value::Array(value)
    }
}

/// Instance data of a class object or a struct value.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub description: TypeDescription,
    pub storage: FieldStorage,
}

impl Object {
    pub fn new(description: TypeDescription, storage: FieldStorage) -> Self {
        Self {
            description,
            storage,
        }
    }

    pub fn slot(&self, slot: usize) -> Option<&Value> {
        self.storage.get(slot)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Value> {
        self.storage.get_mut(slot)
    }
}

struct HeapObject {
    description: TypeDescription,
    slots: SlotCells,
}

/// Shared reference to a heap object. Equality is identity.
///
/// Every field slot is locked on its own, so references to different fields
/// of one object can be held together.
#[derive(Clone)]
pub struct ObjectRef(Arc<HeapObject>);

impl ObjectRef {
    pub fn new(instance: Object) -> Self {
        Self(Arc::new(HeapObject {
            description: instance.description,
            slots: SlotCells::new(instance.storage.into_values()),
        }))
    }

    pub fn description(&self) -> TypeDescription {
        self.0.description
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn slot_count(&self) -> usize {
        self.0.slots.len()
    }

    /// Copy of the slot value; `None` when the slot is missing or borrowed.
    pub fn get(&self, slot: usize) -> Option<Value> {
        self.try_get(slot).ok()
    }

    pub fn try_get(&self, slot: usize) -> Result<Value, SlotError> {
        self.0.slots.get(slot)
    }

    pub fn set(&self, slot: usize, value: Value) -> Result<(), SlotError> {
        self.0.slots.set(slot, value)
    }

    /// Exclusive handle on one slot.
    pub fn slot_mut(&self, slot: usize) -> Result<MappedRwLockWriteGuard<'_, Value>, SlotError> {
        self.0.slots.borrow_mut(slot)
    }

    /// Copy of the whole instance, as for unboxing a struct.
    pub fn snapshot(&self) -> Result<Object, SlotError> {
        Ok(Object::new(self.0.description, self.0.slots.snapshot()?))
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // identity only: fields may refer back to this object
        write!(f, "ObjectRef({:?} @ {:p})", self.0.description, self.0)
    }
}

struct ArrayData {
    description: TypeDescription,
    element: TypeDescription,
    items: RwLock<Vec<Value>>,
}

/// Shared reference to a single-dimensional array. Equality is identity.
#[derive(Clone)]
pub struct ArrayRef(Arc<ArrayData>);

impl ArrayRef {
    pub fn new(description: TypeDescription, element: TypeDescription, items: Vec<Value>) -> Self {
        Self(Arc::new(ArrayData {
            description,
            element,
            items: RwLock::new(items),
        }))
    }

    pub fn description(&self) -> TypeDescription {
        self.0.description
    }

    pub fn element_type(&self) -> TypeDescription {
        self.0.element
    }

    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.items.read().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.0.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for ArrayRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.items.try_read() {
            Some(items) => write!(f, "ArrayRef({:?}, {:?})", self.0.description, items),
            None => write!(f, "ArrayRef({:?}, <locked>)", self.0.description),
        }
    }
}

/// Receiver handed to a native method body.
pub enum This<'a> {
    Static,
    Object(ObjectRef),
    /// A struct receiver, mutated in place.
    Value(&'a mut Object),
}

impl This<'_> {
    pub fn description(&self) -> Option<TypeDescription> {
        match self {
            This::Static => None,
            This::Object(o) => Some(o.description()),
            This::Value(v) => Some(v.description),
        }
    }

    fn type_name(&self) -> String {
        format!("{:?}", self.description())
    }

    pub fn get(&self, slot: usize) -> Result<Value, ExecutionError> {
        let value = match self {
            This::Static => return Err(ExecutionError::NullReference),
            This::Object(o) => o.try_get(slot),
            This::Value(v) => v.slot(slot).cloned().ok_or(SlotError::Missing),
        };
        value.map_err(|e| e.into_execution(self.type_name(), slot))
    }

    pub fn set(&mut self, slot: usize, value: Value) -> Result<(), ExecutionError> {
        let written = match self {
            This::Static => return Err(ExecutionError::NullReference),
            This::Object(o) => o.set(slot, value),
            This::Value(v) => {
                if v.storage.set(slot, value) {
                    Ok(())
                } else {
                    Err(SlotError::Missing)
                }
            }
        };
        written.map_err(|e| e.into_execution(self.type_name(), slot))
    }
}
