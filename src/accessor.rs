//! # Field accessors
//!
//! Accessors return a writable reference to one field's storage. They come in
//! three shapes, each backed by a generated fragment:
//!
//! - **[`FieldAccessor`]**: instance fields of classes, given a receiver of the
//!   requested type `T`. A `castclass` is emitted when `T` is a proper
//!   supertype of the declaring type.
//! - **[`StructFieldAccessor`]**: instance fields of structs. The receiver is
//!   taken by `&mut`, so writes land in the caller's struct.
//! - **[`StaticFieldAccessor`]**: static fields, no receiver.
//!
//! Every request is validated against the type compatibility rules before any
//! code is generated. Accessors are not cached; callers keep the ones they reuse.
use crate::{
    codegen::{Argument, CompiledFragment, Fragment, FragmentReturn, Instruction, Returned},
    error::{AccessError, ExecutionError, IncompatibleType},
    runtime::Runtime,
    types::{
        CoreType, MetadataExt, ResolvedDebug, TypeDescription, TypeKind,
        members::{FieldDefinition, FieldDescription, ParameterType},
    },
    value::{ManagedPtr, Object, Value},
};

/// Requested receiver type `T` and value type `F` of an accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessSpec {
    pub receiver: TypeDescription,
    pub value: TypeDescription,
}

impl AccessSpec {
    pub fn new(receiver: TypeDescription, value: TypeDescription) -> Self {
        Self { receiver, value }
    }
}

fn unexpected(code: &CompiledFragment, returned: Returned<'_>) -> ExecutionError {
    ExecutionError::UnexpectedResult(format!("{} ({returned:?})", code.name()))
}

/// Accessor for a class instance field (or, for legacy requests, a static field).
#[derive(Debug)]
pub struct FieldAccessor {
    field: FieldDescription,
    spec: AccessSpec,
    field_type: TypeDescription,
    type_name: String,
    code: CompiledFragment,
}

impl FieldAccessor {
    pub fn field(&self) -> FieldDescription {
        self.field
    }

    pub fn spec(&self) -> AccessSpec {
        self.spec
    }

    pub fn fragment(&self) -> &CompiledFragment {
        &self.code
    }

    /// Reference to the field inside `receiver`. Only this field's slot stays
    /// locked until the reference is dropped.
    pub fn get<'a>(&'a self, receiver: &'a Value) -> Result<ManagedPtr<'a>, ExecutionError> {
        match self.code.execute(vec![Argument::Ref(receiver)])? {
            Returned::Address(pointer) => Ok(pointer),
            other => Err(unexpected(&self.code, other)),
        }
    }

    pub fn read(&self, receiver: &Value) -> Result<Value, ExecutionError> {
        Ok(self.get(receiver)?.clone())
    }

    /// Stores `value`, which must fit the field's declared type.
    pub fn write(&self, runtime: &Runtime, receiver: &Value, value: Value) -> Result<(), ExecutionError> {
        if !runtime.comparer().value_matches(&value, self.field_type) {
            return Err(ExecutionError::TypeMismatch {
                target: self.code.name().to_string(),
                expected: self.type_name.clone(),
                actual: value
                    .runtime_type(runtime.metadata())
                    .map_or_else(|| "null".to_string(), |t| runtime.type_name(t)),
            });
        }
        *self.get(receiver)? = value;
        Ok(())
    }
}

/// Accessor for a struct instance field. The struct is only ever taken by
/// reference; there is no by-value entry point.
#[derive(Debug)]
pub struct StructFieldAccessor {
    field: FieldDescription,
    spec: AccessSpec,
    code: CompiledFragment,
}

impl StructFieldAccessor {
    pub fn field(&self) -> FieldDescription {
        self.field
    }

    pub fn spec(&self) -> AccessSpec {
        self.spec
    }

    pub fn get<'a>(&'a self, receiver: &'a mut Object) -> Result<&'a mut Value, ExecutionError> {
        match self.code.execute(vec![Argument::ByRef(receiver)])? {
            Returned::Address(ManagedPtr::Interior(value)) => Ok(value),
            other => Err(unexpected(&self.code, other)),
        }
    }
}

/// Accessor for a static field.
#[derive(Debug)]
pub struct StaticFieldAccessor {
    field: FieldDescription,
    value: TypeDescription,
    code: CompiledFragment,
}

impl StaticFieldAccessor {
    pub fn field(&self) -> FieldDescription {
        self.field
    }

    pub fn value_type(&self) -> TypeDescription {
        self.value
    }

    /// Reference to the static slot, which stays locked until it is dropped.
    pub fn get(&self) -> Result<ManagedPtr<'_>, ExecutionError> {
        match self.code.execute(vec![])? {
            Returned::Address(pointer) => Ok(pointer),
            other => Err(unexpected(&self.code, other)),
        }
    }

    pub fn read(&self) -> Result<Value, ExecutionError> {
        Ok(self.get()?.clone())
    }
}

impl Runtime {
    fn field_parts(&self, field: FieldDescription) -> Option<(&FieldDefinition, String)> {
        let def = self.metadata().field_definition(field)?;
        Some((def, field.show(self.metadata())))
    }

    fn missing_field(&self, request: &str, ty: TypeDescription, name: &str) -> AccessError {
        AccessError::MissingField {
            request: request.to_string(),
            type_name: self.type_name(ty),
            field: name.to_string(),
        }
    }

    fn incompatible(&self, request: &str, field: &str, source: IncompatibleType) -> AccessError {
        AccessError::Incompatible {
            request: request.to_string(),
            field: field.to_string(),
            source,
        }
    }

    fn validate_value(
        &self,
        request: &str,
        field: FieldDescription,
        value: TypeDescription,
    ) -> Result<(), AccessError> {
        let Some((def, shown)) = self.field_parts(field) else {
            return Err(self.missing_field(request, field.parent, &format!("#{}", field.index)));
        };
        self.comparer()
            .validate_field_type(def.field_type, value)
            .map_err(|source| self.incompatible(request, &shown, source))
    }

    fn fragment_name(&self, receiver: TypeDescription, field: FieldDescription, shape: &str) -> String {
        let field_name = self
            .metadata()
            .field_definition(field)
            .map_or("?", |f| f.name.as_str());
        format!("refget {} {shape} {field_name}", self.type_name(receiver))
    }

    /// Looks up an instance field by name, including inherited fields.
    fn instance_field(&self, request: &str, ty: TypeDescription, name: &str) -> Result<FieldDescription, AccessError> {
        let field = self
            .resolver()
            .field(ty, name)
            .ok_or_else(|| self.missing_field(request, ty, name))?;
        if self.resolver().is_static(&field.into()) {
            return Err(AccessError::StaticField {
                request: request.to_string(),
                field: field.show(self.metadata()),
            });
        }
        Ok(field)
    }

    fn class_accessor(
        &self,
        request: &str,
        spec: AccessSpec,
        field: FieldDescription,
        cast: bool,
    ) -> Result<FieldAccessor, AccessError> {
        self.validate_value(request, field, spec.value)?;
        let Some((def, _)) = self.field_parts(field) else {
            return Err(self.missing_field(request, field.parent, &format!("#{}", field.index)));
        };
        let mut fragment = Fragment::new(
            self.fragment_name(spec.receiver, field, "fi"),
            vec![ParameterType::Value(spec.receiver)],
            FragmentReturn::ByRef(spec.value),
        )
        .owned_by(field.parent);
        if def.static_member {
            // no receiver cast: the argument is never read
            fragment.emit(Instruction::LoadStaticFieldAddress(field));
        } else {
            fragment.emit(Instruction::LoadArgument(0));
            if cast {
                fragment.emit(Instruction::CastClass(field.parent));
            }
            fragment.emit(Instruction::LoadFieldAddress(field));
        }
        fragment.emit(Instruction::Return);
        Ok(FieldAccessor {
            field,
            spec,
            field_type: def.field_type,
            type_name: self.type_name(def.field_type),
            code: self.generate(fragment)?,
        })
    }

    fn reject_value_type_receiver(&self, request: &str, field: &str, receiver: TypeDescription) -> Result<(), AccessError> {
        if self.metadata().is_value_type(receiver) {
            return Err(self.incompatible(
                request,
                field,
                IncompatibleType::ValueTypeReceiver {
                    requested: self.type_name(receiver),
                },
            ));
        }
        Ok(())
    }

    /// Accessor for the instance field `name` of `spec.receiver` or one of its
    /// bases. The receiver type must be a reference type.
    pub fn field_ref_access(&self, spec: AccessSpec, name: &str) -> Result<FieldAccessor, AccessError> {
        let request = format!(
            "FieldRefAccess<{}, {}>",
            self.type_name(spec.receiver),
            self.type_name(spec.value)
        );
        self.reject_value_type_receiver(&request, name, spec.receiver)?;
        let field = self.instance_field(&request, spec.receiver, name)?;
        self.class_accessor(&request, spec, field, false)
    }

    /// Accessor over `System.Object` receivers for the field `name` of `ty`.
    /// Instance fields are always guarded by a receiver cast; static fields are
    /// accepted and ignore the receiver.
    pub fn field_ref_access_in(
        &self,
        ty: TypeDescription,
        name: &str,
        value: TypeDescription,
    ) -> Result<FieldAccessor, AccessError> {
        let request = format!(
            "FieldRefAccess<{}> for {}",
            self.type_name(value),
            self.type_name(ty)
        );
        let field = self
            .resolver()
            .field(ty, name)
            .ok_or_else(|| self.missing_field(&request, ty, name))?;
        self.reject_struct_instance_field(&request, field)?;
        let spec = AccessSpec::new(self.metadata().core_type(CoreType::Object), value);
        self.class_accessor(&request, spec, field, true)
    }

    fn reject_struct_instance_field(&self, request: &str, field: FieldDescription) -> Result<(), AccessError> {
        let Some((def, shown)) = self.field_parts(field) else {
            return Err(self.missing_field(request, field.parent, &format!("#{}", field.index)));
        };
        if !def.static_member && self.metadata().is_value_type(field.parent) {
            return Err(AccessError::StructInstanceField {
                request: request.to_string(),
                field: shown,
                declaring: self.type_name(field.parent),
            });
        }
        Ok(())
    }

    /// Accessor for an already resolved field. Static fields are accepted and
    /// ignore the receiver.
    pub fn field_ref_access_for(&self, spec: AccessSpec, field: FieldDescription) -> Result<FieldAccessor, AccessError> {
        let request = format!(
            "FieldRefAccess<{}, {}>",
            self.type_name(spec.receiver),
            self.type_name(spec.value)
        );
        let shown = field.show(self.metadata());
        self.reject_value_type_receiver(&request, &shown, spec.receiver)?;
        self.reject_struct_instance_field(&request, field)?;
        let is_static = self.resolver().is_static(&field.into());
        let cast = if is_static {
            false
        } else {
            self.comparer()
                .receiver_needs_cast(spec.receiver, field.parent)
                .map_err(|source| self.incompatible(&request, &shown, source))?
        };
        self.class_accessor(&request, spec, field, cast)
    }

    fn struct_accessor(&self, request: &str, spec: AccessSpec, field: FieldDescription) -> Result<StructFieldAccessor, AccessError> {
        self.validate_value(request, field, spec.value)?;
        let mut fragment = Fragment::new(
            self.fragment_name(spec.receiver, field, "struct fi"),
            vec![ParameterType::Ref(spec.receiver)],
            FragmentReturn::ByRef(spec.value),
        )
        .owned_by(field.parent);
        fragment
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::LoadFieldAddress(field))
            .emit(Instruction::Return);
        Ok(StructFieldAccessor {
            field,
            spec,
            code: self.generate(fragment)?,
        })
    }

    fn require_struct(&self, request: &str, receiver: TypeDescription) -> Result<(), AccessError> {
        if self.metadata().kind_of(receiver) != Some(TypeKind::Struct) {
            return Err(AccessError::NotAStruct {
                request: request.to_string(),
                receiver: self.type_name(receiver),
            });
        }
        Ok(())
    }

    /// Accessor for the instance field `name` of the struct `spec.receiver`.
    pub fn struct_field_ref_access(&self, spec: AccessSpec, name: &str) -> Result<StructFieldAccessor, AccessError> {
        let request = format!(
            "StructFieldRefAccess<{}, {}>",
            self.type_name(spec.receiver),
            self.type_name(spec.value)
        );
        self.require_struct(&request, spec.receiver)?;
        let field = self.instance_field(&request, spec.receiver, name)?;
        self.struct_accessor(&request, spec, field)
    }

    /// Accessor for a resolved instance field declared exactly on the struct `spec.receiver`.
    pub fn struct_field_ref_access_for(
        &self,
        spec: AccessSpec,
        field: FieldDescription,
    ) -> Result<StructFieldAccessor, AccessError> {
        let request = format!(
            "StructFieldRefAccess<{}, {}>",
            self.type_name(spec.receiver),
            self.type_name(spec.value)
        );
        self.require_struct(&request, spec.receiver)?;
        let Some((def, shown)) = self.field_parts(field) else {
            return Err(self.missing_field(&request, field.parent, &format!("#{}", field.index)));
        };
        if def.static_member {
            return Err(AccessError::StaticField {
                request: request.clone(),
                field: shown,
            });
        }
        self.comparer()
            .validate_struct_receiver(spec.receiver, field.parent)
            .map_err(|source| self.incompatible(&request, &shown, source))?;
        self.struct_accessor(&request, spec, field)
    }

    /// Accessor for the static field `name` of `ty` or one of its bases.
    pub fn static_field_ref_access(
        &self,
        ty: TypeDescription,
        name: &str,
        value: TypeDescription,
    ) -> Result<StaticFieldAccessor, AccessError> {
        let request = format!(
            "StaticFieldRefAccess<{}> for {}",
            self.type_name(value),
            self.type_name(ty)
        );
        let field = self
            .resolver()
            .field(ty, name)
            .ok_or_else(|| self.missing_field(&request, ty, name))?;
        self.static_accessor(&request, field, value)
    }

    pub fn static_field_ref_access_for(
        &self,
        field: FieldDescription,
        value: TypeDescription,
    ) -> Result<StaticFieldAccessor, AccessError> {
        let request = format!("StaticFieldRefAccess<{}>", self.type_name(value));
        self.static_accessor(&request, field, value)
    }

    fn static_accessor(
        &self,
        request: &str,
        field: FieldDescription,
        value: TypeDescription,
    ) -> Result<StaticFieldAccessor, AccessError> {
        let Some((def, shown)) = self.field_parts(field) else {
            return Err(self.missing_field(request, field.parent, &format!("#{}", field.index)));
        };
        if !def.static_member {
            return Err(AccessError::InstanceField {
                request: request.to_string(),
                field: shown,
            });
        }
        self.validate_value(request, field, value)?;
        let mut fragment = Fragment::new(
            self.fragment_name(field.parent, field, "static fi"),
            vec![],
            FragmentReturn::ByRef(value),
        )
        .owned_by(field.parent);
        fragment
            .emit(Instruction::LoadStaticFieldAddress(field))
            .emit(Instruction::Return);
        Ok(StaticFieldAccessor {
            field,
            value,
            code: self.generate(fragment)?,
        })
    }
}
