use crate::{
    config::DEFAULT_HIERARCHY_DEPTH,
    error::IncompatibleType,
    types::{
        CoreType, MetadataExt, MetadataProvider, TypeDescription, TypeKind,
        members::ParameterType,
    },
    value::Value,
};

/// Assignability between types and the compatibility rules accessors and
/// invokers are validated against.
#[derive(Clone, Copy)]
pub struct TypeComparer<'m> {
    metadata: &'m dyn MetadataProvider,
    depth_limit: usize,
}

impl<'m> TypeComparer<'m> {
    pub fn new(metadata: &'m dyn MetadataProvider) -> Self {
        Self {
            metadata,
            depth_limit: DEFAULT_HIERARCHY_DEPTH,
        }
    }

    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit;
        self
    }

    fn name(&self, ty: TypeDescription) -> String {
        self.metadata.type_name(ty)
    }

    /// Every interface implemented by `ty` or one of its bases, including
    /// interfaces inherited by those interfaces. An interface does not list itself.
    pub fn interfaces_of(&self, ty: TypeDescription) -> Vec<TypeDescription> {
        let mut found: Vec<TypeDescription> = vec![];
        let mut pending: Vec<TypeDescription> = self
            .metadata
            .ancestors(ty, self.depth_limit)
            .filter_map(|a| self.metadata.type_definition(a))
            .flat_map(|d| d.implements.iter().copied())
            .collect();
        while let Some(next) = pending.pop() {
            if found.contains(&next) || found.len() >= self.depth_limit {
                continue;
            }
            found.push(next);
            if let Some(def) = self.metadata.type_definition(next) {
                pending.extend(def.implements.iter().copied());
            }
        }
        found
    }

    /// Whether a value whose type is `source` can be stored in a location of type `target`.
    pub fn is_assignable_to(&self, source: TypeDescription, target: TypeDescription) -> bool {
        if source == target {
            return self.metadata.type_definition(source).is_some();
        }
        let (Some(source_kind), Some(target_kind)) =
            (self.metadata.kind_of(source), self.metadata.kind_of(target))
        else {
            return false;
        };
        if matches!(source_kind, TypeKind::Void) || matches!(target_kind, TypeKind::Void) {
            return false;
        }
        if self.metadata.is_core(target, CoreType::Object) {
            return true;
        }
        if target_kind.is_interface() {
            return self.interfaces_of(source).contains(&target);
        }
        if let (TypeKind::Array { element: from }, TypeKind::Array { element: to }) =
            (source_kind, target_kind)
        {
            return !self.metadata.is_value_type(from) && self.is_assignable_to(from, to);
        }
        self.metadata
            .ancestors(source, self.depth_limit)
            .any(|a| a == target)
    }

    /// Underlying integral type of an enum.
    pub fn enum_underlying(&self, ty: TypeDescription) -> Option<TypeDescription> {
        match self.metadata.kind_of(ty)? {
            TypeKind::Enum { underlying } => Some(self.metadata.core_type(underlying)),
            _ => None,
        }
    }

    /// Checks a requested value type against a field's declared type.
    pub fn validate_field_type(
        &self,
        field_type: TypeDescription,
        requested: TypeDescription,
    ) -> Result<(), IncompatibleType> {
        if let Some(underlying) = self.enum_underlying(field_type) {
            if requested != field_type && requested != underlying {
                return Err(IncompatibleType::EnumField {
                    requested: self.name(requested),
                    actual: self.name(field_type),
                    underlying: self.name(underlying),
                });
            }
        } else if self.metadata.is_value_type(field_type) {
            if requested != field_type {
                return Err(IncompatibleType::ValueField {
                    requested: self.name(requested),
                    actual: self.name(field_type),
                });
            }
        } else if requested != field_type && !self.is_assignable_to(field_type, requested) {
            return Err(IncompatibleType::ReferenceField {
                requested: self.name(requested),
                actual: self.name(field_type),
            });
        }
        Ok(())
    }

    /// Decides whether a class accessor typed on `requested` must check its
    /// receiver at run time before touching a field declared on `declaring`.
    pub fn receiver_needs_cast(
        &self,
        requested: TypeDescription,
        declaring: TypeDescription,
    ) -> Result<bool, IncompatibleType> {
        if self.metadata.is_value_type(requested) {
            return Err(IncompatibleType::ValueTypeReceiver {
                requested: self.name(requested),
            });
        }
        if requested == declaring {
            return Ok(false);
        }
        if self.is_assignable_to(declaring, requested) {
            return Ok(true);
        }
        if self.is_assignable_to(requested, declaring) {
            return Ok(false);
        }
        Err(IncompatibleType::UnrelatedReceiver {
            requested: self.name(requested),
            declaring: self.name(declaring),
        })
    }

    pub fn validate_struct_receiver(
        &self,
        requested: TypeDescription,
        declaring: TypeDescription,
    ) -> Result<(), IncompatibleType> {
        if requested != declaring {
            return Err(IncompatibleType::StructReceiver {
                requested: self.name(requested),
                declaring: self.name(declaring),
            });
        }
        Ok(())
    }

    pub fn is_instance_of(&self, value: &Value, ty: TypeDescription) -> bool {
        value
            .runtime_type(self.metadata)
            .is_some_and(|rt| self.is_assignable_to(rt, ty))
    }

    /// Whether `value` may be passed where `ty` is expected. Enum values travel
    /// as their underlying integral value.
    pub fn value_matches(&self, value: &Value, ty: TypeDescription) -> bool {
        if value.is_null() {
            return self.metadata.type_definition(ty).is_some() && !self.metadata.is_value_type(ty);
        }
        match self.enum_underlying(ty) {
            Some(underlying) => value.runtime_type(self.metadata) == Some(underlying),
            None => self.is_instance_of(value, ty),
        }
    }

    /// Delegate parameter `delegate` can forward into method parameter `method`.
    pub fn parameter_accepts(&self, delegate: ParameterType, method: ParameterType) -> bool {
        match (delegate, method) {
            (ParameterType::Ref(d), ParameterType::Ref(m)) => d == m,
            (ParameterType::Value(d), ParameterType::Value(m)) => {
                d == m || (!self.metadata.is_value_type(m) && self.is_assignable_to(d, m))
            }
            _ => false,
        }
    }

    pub fn return_accepts(
        &self,
        delegate: Option<ParameterType>,
        method: Option<ParameterType>,
    ) -> bool {
        match (delegate, method) {
            (None, None) => true,
            (Some(ParameterType::Ref(d)), Some(ParameterType::Ref(m))) => d == m,
            (Some(ParameterType::Value(d)), Some(ParameterType::Value(m))) => {
                d == m || (!self.metadata.is_value_type(m) && self.is_assignable_to(m, d))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::registry::{RegistryBuilder, TypeRegistry};

    struct Fixture {
        registry: TypeRegistry,
        animal: TypeDescription,
        dog: TypeDescription,
        named: TypeDescription,
        color: TypeDescription,
        point: TypeDescription,
    }

    fn fixture() -> Fixture {
        let mut builder = RegistryBuilder::new();
        let animal = builder.class("Zoo.Animal");
        let dog = builder.class("Zoo.Dog");
        let named = builder.interface("Zoo.INamed");
        let color = builder.enum_type("Zoo.Color", CoreType::Int32);
        let point = builder.struct_type("Zoo.Point");
        builder.define(animal).implements(named);
        builder.define(dog).extends(animal);
        Fixture {
            registry: builder.build(),
            animal,
            dog,
            named,
            color,
            point,
        }
    }

    #[test]
    fn assignability_follows_bases_and_interfaces() {
        let f = fixture();
        let cmp = TypeComparer::new(&f.registry);
        let object = f.registry.core_type(CoreType::Object);
        assert!(cmp.is_assignable_to(f.dog, f.animal));
        assert!(cmp.is_assignable_to(f.dog, f.named));
        assert!(cmp.is_assignable_to(f.point, object));
        assert!(!cmp.is_assignable_to(f.animal, f.dog));
        assert!(!cmp.is_assignable_to(f.named, f.animal));
    }

    #[test]
    fn enum_fields_accept_underlying_type() {
        let f = fixture();
        let cmp = TypeComparer::new(&f.registry);
        let int = f.registry.core_type(CoreType::Int32);
        let long = f.registry.core_type(CoreType::Int64);
        assert_eq!(cmp.validate_field_type(f.color, int), Ok(()));
        assert_eq!(cmp.validate_field_type(f.color, f.color), Ok(()));
        assert!(matches!(
            cmp.validate_field_type(f.color, long),
            Err(IncompatibleType::EnumField { .. })
        ));
    }

    #[test]
    fn value_fields_require_exact_type() {
        let f = fixture();
        let cmp = TypeComparer::new(&f.registry);
        let int = f.registry.core_type(CoreType::Int32);
        let long = f.registry.core_type(CoreType::Int64);
        let object = f.registry.core_type(CoreType::Object);
        assert!(matches!(
            cmp.validate_field_type(int, long),
            Err(IncompatibleType::ValueField { .. })
        ));
        assert!(cmp.validate_field_type(int, object).is_err());
        assert_eq!(cmp.validate_field_type(f.dog, f.animal), Ok(()));
        assert_eq!(cmp.validate_field_type(f.dog, object), Ok(()));
        assert!(matches!(
            cmp.validate_field_type(f.animal, f.dog),
            Err(IncompatibleType::ReferenceField { .. })
        ));
    }

    #[test]
    fn receiver_cast_only_for_supertypes() {
        let f = fixture();
        let cmp = TypeComparer::new(&f.registry);
        let string = f.registry.core_type(CoreType::String);
        assert_eq!(cmp.receiver_needs_cast(f.dog, f.dog), Ok(false));
        assert_eq!(cmp.receiver_needs_cast(f.dog, f.animal), Ok(false));
        assert_eq!(cmp.receiver_needs_cast(f.animal, f.dog), Ok(true));
        assert_eq!(cmp.receiver_needs_cast(f.named, f.dog), Ok(true));
        assert!(matches!(
            cmp.receiver_needs_cast(string, f.dog),
            Err(IncompatibleType::UnrelatedReceiver { .. })
        ));
        assert!(matches!(
            cmp.receiver_needs_cast(f.point, f.point),
            Err(IncompatibleType::ValueTypeReceiver { .. })
        ));
    }

    #[test]
    fn enum_values_travel_as_integers() {
        let f = fixture();
        let cmp = TypeComparer::new(&f.registry);
        assert!(cmp.value_matches(&Value::Int32(3), f.color));
        assert!(!cmp.value_matches(&Value::Int64(3), f.color));
        assert!(cmp.value_matches(&Value::Null, f.dog));
        assert!(!cmp.value_matches(&Value::Null, f.point));
    }
}
