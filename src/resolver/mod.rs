//! Member resolution over a [`MetadataProvider`].
//!
//! [`MemberResolver`] finds fields, properties, methods, constructors and nested
//! types by name, signature or predicate. Every lookup comes in two variants:
//!
//! - **Declared**: only members defined exactly on the starting type.
//! - **Inherited**: walks the base type chain from the starting type upward and
//!   stops at the first type that yields a result. The chain of an interface is
//!   only the interface itself.
//!
//! Predicate lookups (`first_*`) only consider declared members.
//!
//! A missing member is not an error. Lookups return `None` and report the miss
//! through `tracing` at debug level, so optional lookups compose. The only hard
//! resolution failure is an ambiguous method match, see [`methods`].
//!
//! Virtual and interface dispatch helpers live in [`dispatch`].
use crate::{
    config::DEFAULT_HIERARCHY_DEPTH,
    types::{
        MetadataExt, MetadataProvider, TypeDefinition, TypeDescription,
        members::{
            FieldDefinition, FieldDescription, MemberDescription, MethodDescription,
            PropertyDefinition, PropertyDescription,
        },
    },
    value::Value,
};
use std::convert::Infallible;

pub mod dispatch;
pub mod methods;

#[derive(Clone, Copy)]
pub struct MemberResolver<'m> {
    metadata: &'m dyn MetadataProvider,
    depth_limit: usize,
}

impl<'m> MemberResolver<'m> {
    pub fn new(metadata: &'m dyn MetadataProvider) -> Self {
        Self {
            metadata,
            depth_limit: DEFAULT_HIERARCHY_DEPTH,
        }
    }

    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = limit.max(1);
        self
    }

    pub fn metadata(&self) -> &'m dyn MetadataProvider {
        self.metadata
    }

    pub(crate) fn name(&self, ty: TypeDescription) -> String {
        self.metadata.type_name(ty)
    }

    /// Definition of `ty`, logging on behalf of `operation` when the handle is unknown.
    pub(crate) fn definition_for(
        &self,
        ty: TypeDescription,
        operation: &str,
    ) -> Option<&'m TypeDefinition> {
        let def = self.metadata.type_definition(ty);
        if def.is_none() {
            tracing::debug!("{operation}: type is null");
        }
        def
    }

    pub fn type_by_name(&self, name: &str) -> Option<TypeDescription> {
        if let Some(ty) = self.metadata.find_type(name) {
            return Some(ty);
        }
        let short = (0..self.metadata.type_count())
            .map(TypeDescription::from_index)
            .find(|&t| {
                self.metadata
                    .type_definition(t)
                    .is_some_and(|d| d.name == name)
            });
        if short.is_none() {
            tracing::debug!("TypeByName: could not find type named {name}");
        }
        short
    }

    /// Applies `f` to `ty` and then each base type, stopping at the first result.
    pub fn try_find_including_base_types<T, E>(
        &self,
        ty: TypeDescription,
        mut f: impl FnMut(TypeDescription) -> Result<Option<T>, E>,
    ) -> Result<Option<T>, E> {
        let mut current = Some(ty);
        let mut visited = 0;
        while let Some(t) = current {
            let Some(def) = self.metadata.type_definition(t) else {
                break;
            };
            if let Some(found) = f(t)? {
                return Ok(Some(found));
            }
            visited += 1;
            if visited >= self.depth_limit {
                tracing::warn!(
                    "base type walk from {} stopped after {visited} types",
                    self.name(ty)
                );
                break;
            }
            current = def.extends.filter(|&base| base != t);
        }
        Ok(None)
    }

    pub fn find_including_base_types<T>(
        &self,
        ty: TypeDescription,
        mut f: impl FnMut(TypeDescription) -> Option<T>,
    ) -> Option<T> {
        let found: Result<Option<T>, Infallible> =
            self.try_find_including_base_types(ty, |t| Ok(f(t)));
        match found {
            Ok(found) => found,
            Err(never) => match never {},
        }
    }

    /// Applies `f` to `ty`, then depth-first to its nested types.
    pub fn find_including_inner_types<T>(
        &self,
        ty: TypeDescription,
        mut f: impl FnMut(TypeDescription) -> Option<T>,
    ) -> Option<T> {
        self.find_inner(ty, &mut f, 0)
    }

    fn find_inner<T>(
        &self,
        ty: TypeDescription,
        f: &mut impl FnMut(TypeDescription) -> Option<T>,
        depth: usize,
    ) -> Option<T> {
        if let Some(found) = f(ty) {
            return Some(found);
        }
        if depth >= self.depth_limit {
            tracing::warn!("nested type walk stopped at {}", self.name(ty));
            return None;
        }
        let def = self.metadata.type_definition(ty)?;
        def.nested_types
            .iter()
            .find_map(|&inner| self.find_inner(inner, &mut *f, depth + 1))
    }

    fn declared_field_named(&self, ty: TypeDescription, name: &str) -> Option<FieldDescription> {
        let def = self.metadata.type_definition(ty)?;
        def.fields
            .iter()
            .position(|f| f.name == name)
            .map(|index| FieldDescription { parent: ty, index })
    }

    pub fn declared_field(&self, ty: TypeDescription, name: &str) -> Option<FieldDescription> {
        self.definition_for(ty, "DeclaredField")?;
        if name.is_empty() {
            tracing::debug!("DeclaredField: name is null");
            return None;
        }
        let field = self.declared_field_named(ty, name);
        if field.is_none() {
            tracing::debug!(
                "DeclaredField: could not find field for type {} and name {name}",
                self.name(ty)
            );
        }
        field
    }

    pub fn field(&self, ty: TypeDescription, name: &str) -> Option<FieldDescription> {
        self.definition_for(ty, "Field")?;
        if name.is_empty() {
            tracing::debug!("Field: name is null");
            return None;
        }
        let field = self.find_including_base_types(ty, |t| self.declared_field_named(t, name));
        if field.is_none() {
            tracing::debug!(
                "Field: could not find field for type {} and name {name}",
                self.name(ty)
            );
        }
        field
    }

    /// The `index`th declared field of `ty`, in declaration order.
    pub fn declared_field_at(&self, ty: TypeDescription, index: usize) -> Option<FieldDescription> {
        let def = self.definition_for(ty, "DeclaredField")?;
        if index >= def.fields.len() {
            tracing::debug!(
                "DeclaredField: could not find field for type {} and index {index}",
                self.name(ty)
            );
            return None;
        }
        Some(FieldDescription { parent: ty, index })
    }

    fn declared_property_named(&self, ty: TypeDescription, name: &str) -> Option<PropertyDescription> {
        let def = self.metadata.type_definition(ty)?;
        def.properties
            .iter()
            .position(|p| p.name == name)
            .map(|index| PropertyDescription { parent: ty, index })
    }

    pub fn declared_property(&self, ty: TypeDescription, name: &str) -> Option<PropertyDescription> {
        self.definition_for(ty, "DeclaredProperty")?;
        if name.is_empty() {
            tracing::debug!("DeclaredProperty: name is null");
            return None;
        }
        let property = self.declared_property_named(ty, name);
        if property.is_none() {
            tracing::debug!(
                "DeclaredProperty: could not find property for type {} and name {name}",
                self.name(ty)
            );
        }
        property
    }

    pub fn property(&self, ty: TypeDescription, name: &str) -> Option<PropertyDescription> {
        self.definition_for(ty, "Property")?;
        if name.is_empty() {
            tracing::debug!("Property: name is null");
            return None;
        }
        let property = self.find_including_base_types(ty, |t| self.declared_property_named(t, name));
        if property.is_none() {
            tracing::debug!(
                "Property: could not find property for type {} and name {name}",
                self.name(ty)
            );
        }
        property
    }

    pub fn property_getter_of(&self, property: PropertyDescription) -> Option<MethodDescription> {
        let def = self.metadata.property_definition(property)?;
        def.getter
            .map(|index| MethodDescription::method(property.parent, index))
    }

    pub fn property_setter_of(&self, property: PropertyDescription) -> Option<MethodDescription> {
        let def = self.metadata.property_definition(property)?;
        def.setter
            .map(|index| MethodDescription::method(property.parent, index))
    }

    pub fn declared_property_getter(&self, ty: TypeDescription, name: &str) -> Option<MethodDescription> {
        self.property_getter_of(self.declared_property(ty, name)?)
    }

    pub fn declared_property_setter(&self, ty: TypeDescription, name: &str) -> Option<MethodDescription> {
        self.property_setter_of(self.declared_property(ty, name)?)
    }

    pub fn property_getter(&self, ty: TypeDescription, name: &str) -> Option<MethodDescription> {
        self.property_getter_of(self.property(ty, name)?)
    }

    pub fn property_setter(&self, ty: TypeDescription, name: &str) -> Option<MethodDescription> {
        self.property_setter_of(self.property(ty, name)?)
    }

    fn declared_inner_named(&self, ty: TypeDescription, name: &str) -> Option<TypeDescription> {
        let def = self.metadata.type_definition(ty)?;
        def.nested_types.iter().copied().find(|&inner| {
            self.metadata
                .type_definition(inner)
                .is_some_and(|d| d.name == name)
        })
    }

    pub fn declared_inner(&self, ty: TypeDescription, name: &str) -> Option<TypeDescription> {
        self.definition_for(ty, "DeclaredInner")?;
        if name.is_empty() {
            tracing::debug!("DeclaredInner: name is null");
            return None;
        }
        let inner = self.declared_inner_named(ty, name);
        if inner.is_none() {
            tracing::debug!(
                "DeclaredInner: could not find nested type for type {} and name {name}",
                self.name(ty)
            );
        }
        inner
    }

    pub fn inner(&self, ty: TypeDescription, name: &str) -> Option<TypeDescription> {
        self.definition_for(ty, "Inner")?;
        if name.is_empty() {
            tracing::debug!("Inner: name is null");
            return None;
        }
        let inner = self.find_including_base_types(ty, |t| self.declared_inner_named(t, name));
        if inner.is_none() {
            tracing::debug!(
                "Inner: could not find nested type for type {} and name {name}",
                self.name(ty)
            );
        }
        inner
    }

    pub fn first_inner(
        &self,
        ty: TypeDescription,
        mut predicate: impl FnMut(&TypeDefinition) -> bool,
    ) -> Option<TypeDescription> {
        let def = self.definition_for(ty, "FirstInner")?;
        def.nested_types.iter().copied().find(|&inner| {
            self.metadata
                .type_definition(inner)
                .is_some_and(&mut predicate)
        })
    }

    pub fn first_field(
        &self,
        ty: TypeDescription,
        mut predicate: impl FnMut(&FieldDefinition) -> bool,
    ) -> Option<FieldDescription> {
        let def = self.definition_for(ty, "FirstField")?;
        def.fields
            .iter()
            .position(&mut predicate)
            .map(|index| FieldDescription { parent: ty, index })
    }

    pub fn first_property(
        &self,
        ty: TypeDescription,
        mut predicate: impl FnMut(&PropertyDefinition) -> bool,
    ) -> Option<PropertyDescription> {
        let def = self.definition_for(ty, "FirstProperty")?;
        def.properties
            .iter()
            .position(&mut predicate)
            .map(|index| PropertyDescription { parent: ty, index })
    }

    pub fn declared_fields(&self, ty: TypeDescription) -> Vec<FieldDescription> {
        self.definition_for(ty, "GetDeclaredFields")
            .map(|def| {
                (0..def.fields.len())
                    .map(|index| FieldDescription { parent: ty, index })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn declared_properties(&self, ty: TypeDescription) -> Vec<PropertyDescription> {
        self.definition_for(ty, "GetDeclaredProperties")
            .map(|def| {
                (0..def.properties.len())
                    .map(|index| PropertyDescription { parent: ty, index })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn declared_methods(&self, ty: TypeDescription) -> Vec<MethodDescription> {
        self.definition_for(ty, "GetDeclaredMethods")
            .map(|def| {
                (0..def.methods.len())
                    .map(|index| MethodDescription::method(ty, index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `search_static`: `None` lists every constructor, otherwise only type
    /// initializers (`true`) or instance constructors (`false`).
    pub fn declared_constructors(
        &self,
        ty: TypeDescription,
        search_static: Option<bool>,
    ) -> Vec<MethodDescription> {
        let Some(def) = self.definition_for(ty, "GetDeclaredConstructors") else {
            return vec![];
        };
        def.constructors
            .iter()
            .enumerate()
            .filter(|(_, c)| search_static.is_none_or(|s| s == c.is_static()))
            .map(|(index, _)| MethodDescription::constructor(ty, index))
            .collect()
    }

    pub fn field_names(&self, ty: TypeDescription) -> Vec<String> {
        self.definition_for(ty, "GetFieldNames")
            .map(|d| d.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn method_names(&self, ty: TypeDescription) -> Vec<String> {
        self.definition_for(ty, "GetMethodNames")
            .map(|d| d.methods.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn property_names(&self, ty: TypeDescription) -> Vec<String> {
        self.definition_for(ty, "GetPropertyNames")
            .map(|d| d.properties.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    fn instance_type(&self, instance: &Value, operation: &str) -> Option<TypeDescription> {
        let ty = instance.runtime_type(self.metadata);
        if ty.is_none() {
            tracing::debug!("{operation}: instance is null");
        }
        ty
    }

    pub fn field_names_of(&self, instance: &Value) -> Vec<String> {
        self.instance_type(instance, "GetFieldNames")
            .map(|t| self.field_names(t))
            .unwrap_or_default()
    }

    pub fn method_names_of(&self, instance: &Value) -> Vec<String> {
        self.instance_type(instance, "GetMethodNames")
            .map(|t| self.method_names(t))
            .unwrap_or_default()
    }

    pub fn property_names_of(&self, instance: &Value) -> Vec<String> {
        self.instance_type(instance, "GetPropertyNames")
            .map(|t| self.property_names(t))
            .unwrap_or_default()
    }

    /// Field type, property type, or method return type. Constructors have none.
    pub fn underlying_type(&self, member: &MemberDescription) -> Option<TypeDescription> {
        match member {
            MemberDescription::Field(f) => self.metadata.field_definition(*f).map(|d| d.field_type),
            MemberDescription::Property(p) => self
                .metadata
                .property_definition(*p)
                .map(|d| d.property_type),
            MemberDescription::Method(m) => Some(self.returned_type(m)),
            MemberDescription::Constructor(_) => None,
        }
    }

    pub fn is_static(&self, member: &MemberDescription) -> bool {
        match member {
            MemberDescription::Field(f) => self
                .metadata
                .field_definition(*f)
                .is_some_and(|d| d.static_member),
            MemberDescription::Property(p) => self
                .property_getter_of(*p)
                .or_else(|| self.property_setter_of(*p))
                .and_then(|m| self.metadata.method_definition(&m))
                .is_some_and(|m| m.is_static()),
            MemberDescription::Method(m) | MemberDescription::Constructor(m) => self
                .metadata
                .method_definition(m)
                .is_some_and(|d| d.is_static()),
        }
    }
}
