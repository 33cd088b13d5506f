//! # Metadata model
//!
//! Types are referred to through [`TypeDescription`], a small copyable handle
//! into a [`MetadataProvider`]. The provider owns every [`TypeDefinition`];
//! handles are only meaningful against the provider that issued them.
//!
//! - **[`TypeDefinition`]**: name, kind, base type, interfaces and member lists.
//! - **[`members`]**: field, method and property definitions plus their handles.
//! - **[`registry`]**: an in-memory provider with a fluent builder.
//! - **[`comparer`]**: assignability and the accessor compatibility rules.
use crate::types::members::{
    FieldDefinition, FieldDescription, MethodDefinition, MethodDescription, MethodKind,
    PropertyDefinition, PropertyDescription,
};
use std::fmt::{Debug, Formatter};

pub mod comparer;
pub mod members;
pub mod registry;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDescription(u32);

impl TypeDescription {
    /// Never issued by a provider; every lookup against it fails.
    pub const NULL: Self = Self(u32::MAX);

    pub const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Debug for TypeDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "TypeDescription(null)")
        } else {
            write!(f, "TypeDescription(#{})", self.0)
        }
    }
}

/// Types every provider must expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoreType {
    Object,
    ValueType,
    Enum,
    Void,
    String,
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    IntPtr,
    UIntPtr,
}

impl CoreType {
    pub const ALL: [CoreType; 19] = [
        CoreType::Object,
        CoreType::ValueType,
        CoreType::Enum,
        CoreType::Void,
        CoreType::String,
        CoreType::Boolean,
        CoreType::Char,
        CoreType::Int8,
        CoreType::UInt8,
        CoreType::Int16,
        CoreType::UInt16,
        CoreType::Int32,
        CoreType::UInt32,
        CoreType::Int64,
        CoreType::UInt64,
        CoreType::Float32,
        CoreType::Float64,
        CoreType::IntPtr,
        CoreType::UIntPtr,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CoreType::Object => "Object",
            CoreType::ValueType => "ValueType",
            CoreType::Enum => "Enum",
            CoreType::Void => "Void",
            CoreType::String => "String",
            CoreType::Boolean => "Boolean",
            CoreType::Char => "Char",
            CoreType::Int8 => "SByte",
            CoreType::UInt8 => "Byte",
            CoreType::Int16 => "Int16",
            CoreType::UInt16 => "UInt16",
            CoreType::Int32 => "Int32",
            CoreType::UInt32 => "UInt32",
            CoreType::Int64 => "Int64",
            CoreType::UInt64 => "UInt64",
            CoreType::Float32 => "Single",
            CoreType::Float64 => "Double",
            CoreType::IntPtr => "IntPtr",
            CoreType::UIntPtr => "UIntPtr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix("System.").unwrap_or(name);
        Self::ALL.into_iter().find(|c| c.name() == short)
    }

    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            CoreType::Int8
                | CoreType::UInt8
                | CoreType::Int16
                | CoreType::UInt16
                | CoreType::Int32
                | CoreType::UInt32
                | CoreType::Int64
                | CoreType::UInt64
        )
    }

    pub const fn is_primitive(self) -> bool {
        !matches!(
            self,
            CoreType::Object
                | CoreType::ValueType
                | CoreType::Enum
                | CoreType::Void
                | CoreType::String
        )
    }

    pub(crate) const fn kind(self) -> TypeKind {
        match self {
            CoreType::Object | CoreType::ValueType | CoreType::Enum | CoreType::String => {
                TypeKind::Class
            }
            CoreType::Void => TypeKind::Void,
            other => TypeKind::Primitive(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum { underlying: CoreType },
    Primitive(CoreType),
    Array { element: TypeDescription },
    Void,
}

impl TypeKind {
    pub const fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeKind::Struct | TypeKind::Enum { .. } | TypeKind::Primitive(_)
        )
    }

    pub const fn is_interface(&self) -> bool {
        matches!(self, TypeKind::Interface)
    }
}

/// Explicit interface map of one implementing type: pairs of
/// (interface method, implementing method).
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceMap {
    pub interface: TypeDescription,
    pub entries: Vec<(MethodDescription, MethodDescription)>,
}

#[derive(Clone, Debug)]
pub struct TypeDefinition {
    pub namespace: Option<String>,
    pub name: String,
    pub kind: TypeKind,
    pub extends: Option<TypeDescription>,
    pub implements: Vec<TypeDescription>,
    pub fields: Vec<FieldDefinition>,
    pub properties: Vec<PropertyDefinition>,
    pub methods: Vec<MethodDefinition>,
    pub constructors: Vec<MethodDefinition>,
    pub nested_types: Vec<TypeDescription>,
    pub encloser: Option<TypeDescription>,
    pub generic_arguments: Vec<TypeDescription>,
    pub interface_maps: Vec<InterfaceMap>,
    pub is_abstract: bool,
}

impl TypeDefinition {
    pub fn new(namespace: Option<&str>, name: &str, kind: TypeKind) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            kind,
            extends: None,
            implements: vec![],
            fields: vec![],
            properties: vec![],
            methods: vec![],
            constructors: vec![],
            nested_types: vec![],
            encloser: None,
            generic_arguments: vec![],
            interface_maps: vec![],
            is_abstract: false,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self.namespace.as_deref(), Some(ns) if ns == "System" || ns.starts_with("System."))
    }
}

/// Read-only source of type metadata.
pub trait MetadataProvider: Send + Sync {
    fn type_count(&self) -> usize;

    fn type_definition(&self, ty: TypeDescription) -> Option<&TypeDefinition>;

    fn core_type(&self, core: CoreType) -> TypeDescription;

    /// Looks a type up by its full name (`Namespace.Outer+Inner`).
    fn find_type(&self, name: &str) -> Option<TypeDescription> {
        (0..self.type_count())
            .map(TypeDescription::from_index)
            .find(|&t| self.type_name(t) == name)
    }
}

/// Lookups shared by every component; available on any provider.
pub trait MetadataExt: MetadataProvider {
    fn type_name(&self, ty: TypeDescription) -> String {
        let Some(def) = self.type_definition(ty) else {
            return format!("{ty:?}");
        };
        if let TypeKind::Array { element } = def.kind {
            return format!("{}[]", self.type_name(element));
        }
        let mut name = match def.encloser {
            Some(outer) if outer != ty => format!("{}+{}", self.type_name(outer), def.name),
            _ => match &def.namespace {
                Some(ns) if !ns.is_empty() => format!("{ns}.{}", def.name),
                _ => def.name.clone(),
            },
        };
        if !def.generic_arguments.is_empty() && !def.name.contains('[') {
            let args: Vec<_> = def
                .generic_arguments
                .iter()
                .map(|&a| self.type_name(a))
                .collect();
            name = format!("{name}[{}]", args.join(","));
        }
        name
    }

    fn kind_of(&self, ty: TypeDescription) -> Option<TypeKind> {
        self.type_definition(ty).map(|d| d.kind)
    }

    fn is_value_type(&self, ty: TypeDescription) -> bool {
        self.kind_of(ty).is_some_and(|k| k.is_value_type())
    }

    fn is_interface(&self, ty: TypeDescription) -> bool {
        self.kind_of(ty).is_some_and(|k| k.is_interface())
    }

    fn is_core(&self, ty: TypeDescription, core: CoreType) -> bool {
        self.core_type(core) == ty
    }

    fn field_definition(&self, field: FieldDescription) -> Option<&FieldDefinition> {
        self.type_definition(field.parent)?.fields.get(field.index)
    }

    fn method_definition(&self, method: &MethodDescription) -> Option<&MethodDefinition> {
        let def = self.type_definition(method.parent)?;
        match method.kind {
            MethodKind::Method => def.methods.get(method.index),
            MethodKind::Constructor => def.constructors.get(method.index),
        }
    }

    fn property_definition(&self, property: PropertyDescription) -> Option<&PropertyDefinition> {
        self.type_definition(property.parent)?
            .properties
            .get(property.index)
    }

    /// The type itself followed by its base types, most derived first.
    fn ancestors(&self, ty: TypeDescription, limit: usize) -> Ancestors<'_, Self> {
        Ancestors {
            metadata: self,
            next: self.type_definition(ty).map(|_| ty),
            remaining: limit,
        }
    }
}

impl<T: MetadataProvider + ?Sized> MetadataExt for T {}

pub struct Ancestors<'m, M: ?Sized> {
    metadata: &'m M,
    next: Option<TypeDescription>,
    remaining: usize,
}

impl<M: MetadataProvider + ?Sized> Iterator for Ancestors<'_, M> {
    type Item = TypeDescription;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;
        self.next = self
            .metadata
            .type_definition(current)
            .and_then(|d| d.extends)
            .filter(|&base| base != current);
        Some(current)
    }
}

/// Human-readable rendering that needs the provider to resolve names.
pub trait ResolvedDebug {
    fn show(&self, metadata: &dyn MetadataProvider) -> String;
}

impl ResolvedDebug for TypeDescription {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        metadata.type_name(*self)
    }
}
