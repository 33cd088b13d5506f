use crate::{
    cache::AppendStrategyCache,
    codegen::{
        Argument, CodeGenerator, CompiledFragment, Fragment, FunctionPointer, call_native,
        interpreter::Interpreter,
    },
    config::RuntimeConfig,
    error::{ExecutionError, GenerationError},
    invoker::Invoker,
    resolver::MemberResolver,
    types::{
        CoreType, MetadataExt, MetadataProvider, ResolvedDebug, TypeDescription, TypeKind,
        comparer::TypeComparer,
        members::{FieldDescription, MethodDescription},
    },
    value::{
        ArrayRef, Object, ObjectRef, SlotError, This, Value,
        layout::{FieldLayout, default_value},
        storage::{StaticStorage, StaticStorageManager},
    },
};
use dashmap::DashMap;
use std::sync::Arc;

/// Everything accessors and invokers are synthesized against: the metadata,
/// static storage, field layouts and the code generation backend.
///
/// Resolution and synthesis never mutate the runtime except for the lazily
/// filled layout, static storage and append strategy caches, so a `Runtime`
/// can be shared between threads freely.
pub struct Runtime {
    metadata: Arc<dyn MetadataProvider>,
    statics: StaticStorageManager,
    layouts: DashMap<TypeDescription, Arc<FieldLayout>>,
    backend: Arc<dyn CodeGenerator>,
    config: RuntimeConfig,
    append_strategies: AppendStrategyCache,
}

impl Runtime {
    pub fn new(metadata: impl MetadataProvider + 'static) -> Self {
        Self::from_shared(Arc::new(metadata))
    }

    pub fn from_shared(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self {
            metadata,
            statics: StaticStorageManager::new(),
            layouts: DashMap::new(),
            backend: Arc::new(Interpreter),
            config: RuntimeConfig::default(),
            append_strategies: AppendStrategyCache::new(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self.layouts.clear();
        self
    }

    pub fn with_backend(mut self, backend: impl CodeGenerator + 'static) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    pub fn metadata(&self) -> &dyn MetadataProvider {
        self.metadata.as_ref()
    }

    pub fn metadata_handle(&self) -> Arc<dyn MetadataProvider> {
        Arc::clone(&self.metadata)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn CodeGenerator {
        self.backend.as_ref()
    }

    pub fn resolver(&self) -> MemberResolver<'_> {
        MemberResolver::new(self.metadata()).with_depth_limit(self.config.hierarchy_depth_limit)
    }

    pub fn comparer(&self) -> TypeComparer<'_> {
        TypeComparer::new(self.metadata()).with_depth_limit(self.config.hierarchy_depth_limit)
    }

    pub fn type_name(&self, ty: TypeDescription) -> String {
        self.metadata.type_name(ty)
    }

    pub fn statics(&self) -> &StaticStorageManager {
        &self.statics
    }

    pub fn static_storage(&self, ty: TypeDescription) -> Arc<StaticStorage> {
        self.statics.get_or_init(self.metadata(), ty)
    }

    /// Instance field layout of `ty`, computed once.
    pub fn layout(&self, ty: TypeDescription) -> Arc<FieldLayout> {
        if let Some(layout) = self.layouts.get(&ty) {
            return Arc::clone(&layout);
        }
        let layout = Arc::new(FieldLayout::instance_limited(
            self.metadata(),
            ty,
            self.config.hierarchy_depth_limit,
        ));
        Arc::clone(&self.layouts.entry(ty).or_insert(layout))
    }

    pub fn generate(&self, fragment: Fragment) -> Result<CompiledFragment, GenerationError> {
        tracing::trace!(
            "generating with {}: {}",
            self.backend.name(),
            fragment.show(self.metadata())
        );
        self.backend.generate(self, fragment)
    }

    pub fn append_strategy(&self, collection: TypeDescription) -> Option<Arc<Invoker>> {
        self.append_strategies.get(self, collection)
    }

    pub fn append_strategies(&self) -> &AppendStrategyCache {
        &self.append_strategies
    }

    pub fn default_value(&self, ty: TypeDescription) -> Value {
        default_value(self.metadata(), ty)
    }

    /// Zeroed instance data of `ty`; no constructor runs.
    pub fn new_struct(&self, ty: TypeDescription) -> Object {
        Object::new(ty, self.layout(ty).new_storage(self.metadata()))
    }

    /// Heap-allocated, zeroed instance of `ty`; no constructor runs.
    pub fn new_object(&self, ty: TypeDescription) -> Value {
        Value::Object(ObjectRef::new(self.new_struct(ty)))
    }

    /// Moves a struct to the heap. Every other value is returned unchanged.
    pub fn box_value(&self, value: Value) -> Value {
        match value {
            Value::Struct(s) => Value::Object(ObjectRef::new(s)),
            other => other,
        }
    }

    fn unknown(&self, member: &impl ResolvedDebug) -> ExecutionError {
        ExecutionError::UnknownMember(member.show(self.metadata()))
    }

    /// A fresh instance the way `Activator.CreateInstance` would build one:
    /// value types are zeroed, classes run their parameterless constructor.
    pub fn create_instance(&self, ty: TypeDescription) -> Result<Value, ExecutionError> {
        let Some(def) = self.metadata.type_definition(ty) else {
            return Err(self.unknown(&ty));
        };
        match def.kind {
            kind if kind.is_value_type() => return Ok(self.default_value(ty)),
            TypeKind::Array { element } => {
                return Ok(Value::Array(ArrayRef::new(ty, element, vec![])));
            }
            TypeKind::Interface | TypeKind::Void => {
                return Err(ExecutionError::Uninstantiable(self.type_name(ty)));
            }
            _ => {}
        }
        if self.metadata.is_core(ty, CoreType::String) {
            return Ok(Value::String("".into()));
        }
        if def.is_abstract {
            return Err(ExecutionError::Uninstantiable(self.type_name(ty)));
        }
        let instance = self.new_object(ty);
        let constructor = def
            .constructors
            .iter()
            .position(|c| c.signature.instance && c.signature.parameters.is_empty())
            .map(|index| MethodDescription::constructor(ty, index));
        if let Some(constructor) = constructor
            && let Some(function) = FunctionPointer::resolve(self.metadata(), &constructor)
        {
            call_native(self.metadata(), &function, Some(Argument::Ref(&instance)), &[])?;
        }
        Ok(instance)
    }

    fn check_receiver(&self, receiver: &Value, declaring: TypeDescription) -> Result<(), ExecutionError> {
        if receiver.is_null() {
            return Err(ExecutionError::NullReference);
        }
        if self.comparer().is_instance_of(receiver, declaring) {
            return Ok(());
        }
        Err(ExecutionError::InvalidCast {
            expected: self.type_name(declaring),
            actual: receiver
                .runtime_type(self.metadata())
                .map_or_else(|| "null".to_string(), |t| self.type_name(t)),
        })
    }

    fn slot(&self, field: FieldDescription) -> Result<usize, ExecutionError> {
        self.layout(field.parent)
            .slot_of(field)
            .ok_or_else(|| self.unknown(&field))
    }

    /// Reads a field through metadata, without a synthesized accessor.
    pub fn get_field_value(
        &self,
        field: FieldDescription,
        instance: Option<&Value>,
    ) -> Result<Value, ExecutionError> {
        let Some(def) = self.metadata.field_definition(field) else {
            return Err(self.unknown(&field));
        };
        if def.static_member {
            let storage = self.static_storage(field.parent);
            let slot = storage.slot_of(field).ok_or_else(|| self.unknown(&field))?;
            return storage
                .get(slot)
                .map_err(|e| e.into_execution(self.type_name(field.parent), slot));
        }
        let receiver = instance.ok_or(ExecutionError::NullReference)?;
        self.check_receiver(receiver, field.parent)?;
        let slot = self.slot(field)?;
        let value = match receiver {
            Value::Object(o) => o.try_get(slot),
            Value::Struct(s) => s.slot(slot).cloned().ok_or(SlotError::Missing),
            _ => Err(SlotError::Missing),
        };
        value.map_err(|e| e.into_execution(self.type_name(field.parent), slot))
    }

    /// Writes a field through metadata. Struct receivers are updated in place.
    pub fn set_field_value(
        &self,
        field: FieldDescription,
        instance: Option<&mut Value>,
        value: Value,
    ) -> Result<(), ExecutionError> {
        let Some(def) = self.metadata.field_definition(field) else {
            return Err(self.unknown(&field));
        };
        if !self.comparer().value_matches(&value, def.field_type) {
            return Err(ExecutionError::TypeMismatch {
                target: field.show(self.metadata()),
                expected: self.type_name(def.field_type),
                actual: value
                    .runtime_type(self.metadata())
                    .map_or_else(|| "null".to_string(), |t| self.type_name(t)),
            });
        }
        if def.static_member {
            let storage = self.static_storage(field.parent);
            let slot = storage.slot_of(field).ok_or_else(|| self.unknown(&field))?;
            return storage
                .set(slot, value)
                .map_err(|e| e.into_execution(self.type_name(field.parent), slot));
        }
        let receiver = instance.ok_or(ExecutionError::NullReference)?;
        self.check_receiver(receiver, field.parent)?;
        let slot = self.slot(field)?;
        let written = match receiver {
            Value::Object(o) => o.set(slot, value),
            Value::Struct(s) if slot < s.storage.len() => {
                s.storage.set(slot, value);
                Ok(())
            }
            _ => Err(SlotError::Missing),
        };
        written.map_err(|e| e.into_execution(self.type_name(field.parent), slot))
    }

    /// Calls a method through metadata. Instance calls dispatch virtually on
    /// the receiver's runtime type; struct receivers are mutated in place.
    pub fn invoke(
        &self,
        method: &MethodDescription,
        instance: Option<&mut Value>,
        arguments: &[Value],
    ) -> Result<Value, ExecutionError> {
        let Some(def) = self.metadata.method_definition(method) else {
            return Err(self.unknown(method));
        };
        if arguments.len() != def.signature.parameters.len() {
            return Err(ExecutionError::ArgumentCount {
                target: method.show(self.metadata()),
                expected: def.signature.parameters.len(),
                actual: arguments.len(),
            });
        }
        if def.is_static() {
            let function = FunctionPointer::resolve(self.metadata(), method)
                .ok_or_else(|| ExecutionError::MissingBody(method.show(self.metadata())))?;
            return call_native(self.metadata(), &function, None, arguments);
        }
        let receiver = instance.ok_or(ExecutionError::NullReference)?;
        let runtime_type = receiver
            .runtime_type(self.metadata())
            .ok_or(ExecutionError::NullReference)?;
        let target = self
            .resolver()
            .resolve_virtual(method, runtime_type)
            .ok_or_else(|| ExecutionError::MissingBody(method.show(self.metadata())))?;
        let function = FunctionPointer::resolve(self.metadata(), &target)
            .ok_or_else(|| ExecutionError::MissingBody(target.show(self.metadata())))?;
        match receiver {
            Value::Struct(s) => (function.body)(This::Value(s), arguments),
            other => call_native(self.metadata(), &function, Some(Argument::Ref(other)), arguments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        members::{MethodDefinition, MethodSignature},
        registry::RegistryBuilder,
    };

    #[test]
    fn reflective_paths_round_trip() {
        let mut builder = RegistryBuilder::new();
        let int = builder.core(CoreType::Int32);
        let counter = builder.struct_type("Game.Counter");
        builder.define(counter).field("value", int).method(
            MethodDefinition::new("Bump", MethodSignature::instance(vec![], None)).with_body(
                |mut this, _| {
                    let Some(Value::Int32(v)) = this.get(0).ok() else {
                        return Err(ExecutionError::Native("bad counter".into()));
                    };
                    this.set(0, Value::Int32(v + 1))?;
                    Ok(Value::Null)
                },
            ),
        );
        let runtime = Runtime::new(builder.build());
        let value = FieldDescription { parent: counter, index: 0 };
        let bump = MethodDescription::method(counter, 0);

        let mut instance = runtime.create_instance(counter).unwrap();
        runtime.set_field_value(value, Some(&mut instance), Value::Int32(2)).unwrap();
        runtime.invoke(&bump, Some(&mut instance), &[]).unwrap();
        assert_eq!(runtime.get_field_value(value, Some(&instance)), Ok(Value::Int32(3)));
        assert!(matches!(
            runtime.set_field_value(value, Some(&mut instance), Value::Int64(1)),
            Err(ExecutionError::TypeMismatch { .. })
        ));
        assert_eq!(
            runtime.invoke(&bump, Some(&mut instance), &[Value::Int32(1)]),
            Err(ExecutionError::ArgumentCount {
                target: bump.show(runtime.metadata()),
                expected: 0,
                actual: 1,
            })
        );
    }

    #[test]
    fn create_instance_runs_parameterless_constructor() {
        let mut builder = RegistryBuilder::new();
        let string = builder.core(CoreType::String);
        let dog = builder.class("Zoo.Dog");
        let animal = builder.interface("Zoo.IAnimal");
        builder.define(dog).field("name", string).constructor(
            MethodDefinition::new(".ctor", MethodSignature::instance(vec![], None)).with_body(
                |mut this, _| {
                    this.set(0, Value::from("Rex"))?;
                    Ok(Value::Null)
                },
            ),
        );
        let runtime = Runtime::new(builder.build());
        let name = FieldDescription { parent: dog, index: 0 };

        let rex = runtime.create_instance(dog).unwrap();
        assert_eq!(runtime.get_field_value(name, Some(&rex)), Ok(Value::from("Rex")));
        assert!(matches!(
            runtime.create_instance(animal),
            Err(ExecutionError::Uninstantiable(_))
        ));
        assert_eq!(runtime.create_instance(string), Ok(Value::from("")));
    }
}
