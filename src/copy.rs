//! Deep copies of values into a (possibly different) result type.
//!
//! Fields are matched by name, so a copy can move data between two unrelated
//! types with the same field names. Collections are rebuilt through their
//! `Add` method, arrays element by element; everything from the `System`
//! namespace is shared rather than copied.
use crate::{
    error::CopyError,
    runtime::Runtime,
    types::{CoreType, MetadataExt, TypeDescription, TypeKind},
    value::{ArrayRef, Value},
};

/// Receives the dotted path of a field or element and the source value, and
/// returns the value that gets copied in its place.
pub type Processor<'p> = dyn Fn(&str, &Value) -> Value + 'p;

pub struct DeepCopier<'r> {
    runtime: &'r Runtime,
    processor: Option<&'r Processor<'r>>,
    root: String,
}

impl<'r> DeepCopier<'r> {
    pub fn new(runtime: &'r Runtime) -> Self {
        Self {
            runtime,
            processor: None,
            root: String::new(),
        }
    }

    pub fn with_processor(mut self, processor: &'r Processor<'r>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Prefix for every path handed to the processor.
    pub fn with_path_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn copy(&self, source: &Value, result_type: TypeDescription) -> Result<Value, CopyError> {
        self.copy_at(source, result_type, &self.root)
    }

    fn path(root: &str, segment: &str) -> String {
        if root.is_empty() {
            segment.to_string()
        } else {
            format!("{root}.{segment}")
        }
    }

    fn copy_at(&self, source: &Value, result_type: TypeDescription, path: &str) -> Result<Value, CopyError> {
        let metadata = self.runtime.metadata();
        let Some(source_type) = source.runtime_type(metadata) else {
            return Ok(Value::Null);
        };
        // primitives, enums (held as their integral value) and strings are immutable
        if source.core_type().is_some() {
            return Ok(source.clone());
        }
        let Some(source_def) = metadata.type_definition(source_type) else {
            return Ok(source.clone());
        };
        let result_def = metadata.type_definition(result_type);

        if !source_def.generic_arguments.is_empty()
            && let Some(result_def) = result_def
            && let Some(&element_type) = result_def.generic_arguments.first()
            && let Some(append) = self.runtime.append_strategy(result_type)
        {
            let result = self.runtime.create_instance(result_type)?;
            for (index, element) in self.elements(source, source_type)?.iter().enumerate() {
                let element = self.copy_at(element, element_type, &Self::path(path, &index.to_string()))?;
                append.invoke_values(vec![result.clone(), element])?;
            }
            return Ok(result);
        }

        if let Value::Array(array) = source {
            let Some(TypeKind::Array { element }) = result_def.map(|d| d.kind) else {
                return Ok(source.clone());
            };
            let items = array
                .to_vec()
                .iter()
                .enumerate()
                .map(|(index, item)| self.copy_at(item, element, &Self::path(path, &index.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::Array(ArrayRef::new(result_type, element, items)));
        }

        if source_def.is_system() {
            return Ok(source.clone());
        }

        let target_type = if metadata.is_core(result_type, CoreType::Object) {
            source_type
        } else {
            result_type
        };
        let mut result = self.runtime.create_instance(target_type)?;
        self.copy_fields(source, source_type, &mut result, path)?;
        Ok(result)
    }

    /// Elements of a collection, taken from its zero-argument `ToArray`.
    fn elements(&self, source: &Value, source_type: TypeDescription) -> Result<Vec<Value>, CopyError> {
        let not_enumerable = || CopyError::NotEnumerable {
            type_name: self.runtime.type_name(source_type),
        };
        let to_array = self
            .runtime
            .resolver()
            .first_method(source_type, |m| {
                m.name == "ToArray" && m.signature.instance && m.signature.parameters.is_empty()
            })
            .ok_or_else(not_enumerable)?;
        let mut receiver = source.clone();
        match self.runtime.invoke(&to_array, Some(&mut receiver), &[])? {
            Value::Array(items) => Ok(items.to_vec()),
            _ => Err(not_enumerable()),
        }
    }

    fn copy_fields(
        &self,
        source: &Value,
        source_type: TypeDescription,
        result: &mut Value,
        path: &str,
    ) -> Result<(), CopyError> {
        let Some(result_type) = result.runtime_type(self.runtime.metadata()) else {
            return Ok(());
        };
        let source_layout = self.runtime.layout(source_type);
        let result_layout = self.runtime.layout(result_type);
        for (slot, field) in source_layout.slots().iter().enumerate() {
            let Some(target) = result_layout.slot_by_name(&field.name) else {
                continue;
            };
            let value = match source {
                Value::Object(o) => o.get(slot),
                Value::Struct(s) => s.slot(slot).cloned(),
                _ => None,
            };
            let Some(value) = value else {
                continue;
            };
            let field_path = Self::path(path, &field.name);
            let value = match self.processor {
                Some(processor) => processor(&field_path, &value),
                None => value,
            };
            let target_type = result_layout.slots()[target].field_type;
            let copied = self.copy_at(&value, target_type, &field_path)?;
            match result {
                Value::Object(o) => o
                    .set(target, copied)
                    .map_err(|e| e.into_execution(self.runtime.type_name(result_type), target))?,
                Value::Struct(s) => {
                    s.storage.set(target, copied);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Runtime {
    /// Deep copy of `source` as an instance of `result_type`.
    pub fn deep_copy(&self, source: &Value, result_type: TypeDescription) -> Result<Value, CopyError> {
        DeepCopier::new(self).copy(source, result_type)
    }
}
