use crate::{
    config::DEFAULT_HIERARCHY_DEPTH,
    types::{
        CoreType, InterfaceMap, MetadataExt, MetadataProvider, TypeDefinition, TypeDescription,
        TypeKind,
        members::{
            FieldDefinition, MethodDefinition, MethodDescription, MethodSignature,
            PropertyDefinition,
        },
    },
};
use std::collections::HashMap;

/// In-memory metadata provider. Built once through [`RegistryBuilder`] and
/// read-only afterwards.
#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeDefinition>,
    by_name: HashMap<String, TypeDescription>,
    core: Vec<TypeDescription>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn types(&self) -> impl Iterator<Item = TypeDescription> + '_ {
        (0..self.types.len()).map(TypeDescription::from_index)
    }
}

impl MetadataProvider for TypeRegistry {
    fn type_count(&self) -> usize {
        self.types.len()
    }

    fn type_definition(&self, ty: TypeDescription) -> Option<&TypeDefinition> {
        if ty.is_null() {
            return None;
        }
        self.types.get(ty.index())
    }

    fn core_type(&self, core: CoreType) -> TypeDescription {
        CoreType::ALL
            .iter()
            .position(|&c| c == core)
            .and_then(|i| self.core.get(i).copied())
            .unwrap_or(TypeDescription::NULL)
    }

    fn find_type(&self, name: &str) -> Option<TypeDescription> {
        self.by_name.get(name).copied()
    }
}

fn split_name(full_name: &str) -> (Option<&str>, &str) {
    match full_name.rsplit_once('.') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, full_name),
    }
}

pub struct RegistryBuilder {
    types: Vec<TypeDefinition>,
    core: Vec<TypeDescription>,
    arrays: HashMap<TypeDescription, TypeDescription>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            types: vec![],
            core: vec![],
            arrays: HashMap::new(),
        };
        for core in CoreType::ALL {
            let mut def = TypeDefinition::new(Some("System"), core.name(), core.kind());
            def.extends = match core {
                CoreType::Object | CoreType::Void => None,
                CoreType::String | CoreType::ValueType => Some(TypeDescription::from_index(0)),
                // Enum and the primitives derive from ValueType
                _ => Some(TypeDescription::from_index(1)),
            };
            def.is_abstract = matches!(core, CoreType::ValueType | CoreType::Enum);
            builder.core.push(TypeDescription::from_index(builder.types.len()));
            builder.types.push(def);
        }
        builder
    }

    pub fn core(&self, core: CoreType) -> TypeDescription {
        CoreType::ALL
            .iter()
            .position(|&c| c == core)
            .and_then(|i| self.core.get(i).copied())
            .unwrap_or(TypeDescription::NULL)
    }

    fn push(&mut self, def: TypeDefinition) -> TypeDescription {
        let ty = TypeDescription::from_index(self.types.len());
        self.types.push(def);
        ty
    }

    /// Declares a type by full name (`Namespace.Name`) with the conventional base type
    /// for its kind.
    pub fn declare(&mut self, full_name: &str, kind: TypeKind) -> TypeDescription {
        let (namespace, name) = split_name(full_name);
        let mut def = TypeDefinition::new(namespace, name, kind);
        def.extends = self.default_base(kind);
        self.push(def)
    }

    fn default_base(&self, kind: TypeKind) -> Option<TypeDescription> {
        match kind {
            TypeKind::Class | TypeKind::Array { .. } => Some(self.core(CoreType::Object)),
            TypeKind::Struct | TypeKind::Primitive(_) => Some(self.core(CoreType::ValueType)),
            TypeKind::Enum { .. } => Some(self.core(CoreType::Enum)),
            TypeKind::Interface | TypeKind::Void => None,
        }
    }

    pub fn class(&mut self, full_name: &str) -> TypeDescription {
        self.declare(full_name, TypeKind::Class)
    }

    pub fn struct_type(&mut self, full_name: &str) -> TypeDescription {
        self.declare(full_name, TypeKind::Struct)
    }

    pub fn interface(&mut self, full_name: &str) -> TypeDescription {
        self.declare(full_name, TypeKind::Interface)
    }

    pub fn enum_type(&mut self, full_name: &str, underlying: CoreType) -> TypeDescription {
        self.declare(full_name, TypeKind::Enum { underlying })
    }

    /// Declares a type nested inside `outer`.
    pub fn nested(&mut self, outer: TypeDescription, name: &str, kind: TypeKind) -> TypeDescription {
        let mut def = TypeDefinition::new(None, name, kind);
        def.extends = self.default_base(kind);
        def.encloser = Some(outer);
        let ty = self.push(def);
        if let Some(outer) = self.types.get_mut(outer.index()) {
            outer.nested_types.push(ty);
        }
        ty
    }

    /// Single-dimensional array type of `element`; repeated calls return the same handle.
    pub fn array_of(&mut self, element: TypeDescription) -> TypeDescription {
        if let Some(&existing) = self.arrays.get(&element) {
            return existing;
        }
        let mut def = TypeDefinition::new(None, "[]", TypeKind::Array { element });
        def.extends = Some(self.core(CoreType::Object));
        let ty = self.push(def);
        self.arrays.insert(element, ty);
        ty
    }

    pub fn define(&mut self, ty: TypeDescription) -> TypeBuilder<'_> {
        TypeBuilder { builder: self, ty }
    }

    pub fn definition(&self, ty: TypeDescription) -> Option<&TypeDefinition> {
        self.types.get(ty.index())
    }

    /// First method of `ty` called `name`.
    pub fn method_handle(&self, ty: TypeDescription, name: &str) -> Option<MethodDescription> {
        let def = self.types.get(ty.index())?;
        def.methods
            .iter()
            .position(|m| m.name == name)
            .map(|i| MethodDescription::method(ty, i))
    }

    pub fn constructor_handle(&self, ty: TypeDescription, arity: usize) -> Option<MethodDescription> {
        let def = self.types.get(ty.index())?;
        def.constructors
            .iter()
            .position(|m| m.signature.instance && m.signature.parameters.len() == arity)
            .map(|i| MethodDescription::constructor(ty, i))
    }

    pub fn build(mut self) -> TypeRegistry {
        self.link_overrides();
        self.derive_interface_maps();

        let mut registry = TypeRegistry {
            types: self.types,
            by_name: HashMap::new(),
            core: self.core,
        };
        let names: Vec<_> = registry
            .types()
            .map(|t| (registry.type_name(t), t))
            .collect();
        for (name, ty) in names {
            registry.by_name.entry(name).or_insert(ty);
        }
        registry
    }

    fn base_chain(&self, ty: TypeDescription) -> Vec<TypeDescription> {
        let mut chain = vec![];
        let mut current = self.types.get(ty.index()).and_then(|d| d.extends);
        while let Some(base) = current {
            if chain.len() >= DEFAULT_HIERARCHY_DEPTH || base == ty {
                break;
            }
            chain.push(base);
            current = self.types.get(base.index()).and_then(|d| d.extends);
        }
        chain
    }

    fn find_matching_method(
        &self,
        chain: &[TypeDescription],
        name: &str,
        signature: &MethodSignature,
        predicate: impl Fn(&MethodDefinition) -> bool,
    ) -> Option<MethodDescription> {
        chain.iter().find_map(|&t| {
            let def = self.types.get(t.index())?;
            def.methods
                .iter()
                .position(|m| {
                    m.name == name
                        && m.signature.instance == signature.instance
                        && m.signature.parameters == signature.parameters
                        && predicate(m)
                })
                .map(|i| MethodDescription::method(t, i))
        })
    }

    // Virtual methods without an explicit slot override the nearest matching base virtual.
    fn link_overrides(&mut self) {
        let mut links = vec![];
        for (index, def) in self.types.iter().enumerate() {
            let ty = TypeDescription::from_index(index);
            let chain = self.base_chain(ty);
            for (m, method) in def.methods.iter().enumerate() {
                if !method.virtual_member || method.new_slot || method.overrides.is_some() {
                    continue;
                }
                if let Some(base) =
                    self.find_matching_method(&chain, &method.name, &method.signature, |b| {
                        b.virtual_member
                    })
                {
                    links.push((index, m, base));
                }
            }
        }
        for (index, m, base) in links {
            if let Some(method) = self.types.get_mut(index).and_then(|d| d.methods.get_mut(m)) {
                method.overrides = Some(base);
            }
        }
    }

    fn interface_closure(&self, direct: &[TypeDescription]) -> Vec<TypeDescription> {
        let mut closure: Vec<TypeDescription> = vec![];
        let mut pending = direct.to_vec();
        while let Some(next) = pending.pop() {
            if closure.contains(&next) || closure.len() >= DEFAULT_HIERARCHY_DEPTH {
                continue;
            }
            closure.push(next);
            if let Some(def) = self.types.get(next.index()) {
                pending.extend(def.implements.iter().copied());
            }
        }
        closure
    }

    // Interface methods map to the first instance method with the same name and
    // parameters found on the implementing type or its bases.
    fn derive_interface_maps(&mut self) {
        let mut derived = vec![];
        for (index, def) in self.types.iter().enumerate() {
            if def.kind.is_interface() || def.implements.is_empty() {
                continue;
            }
            let ty = TypeDescription::from_index(index);
            let mut chain = vec![ty];
            chain.extend(self.base_chain(ty));
            for interface in self.interface_closure(&def.implements) {
                if def.interface_maps.iter().any(|m| m.interface == interface) {
                    continue;
                }
                let Some(interface_def) = self.types.get(interface.index()) else {
                    continue;
                };
                let entries = interface_def
                    .methods
                    .iter()
                    .enumerate()
                    .filter(|(_, im)| im.signature.instance)
                    .filter_map(|(i, im)| {
                        let target = self.find_matching_method(&chain, &im.name, &im.signature, |m| {
                            m.generic_parameters == im.generic_parameters
                        })?;
                        Some((MethodDescription::method(interface, i), target))
                    })
                    .collect();
                derived.push((index, InterfaceMap { interface, entries }));
            }
        }
        for (index, map) in derived {
            if let Some(def) = self.types.get_mut(index) {
                def.interface_maps.push(map);
            }
        }
    }
}

/// Fluent editor for one declared type.
pub struct TypeBuilder<'b> {
    builder: &'b mut RegistryBuilder,
    ty: TypeDescription,
}

impl TypeBuilder<'_> {
    pub fn id(&self) -> TypeDescription {
        self.ty
    }

    fn edit(self, f: impl FnOnce(&mut TypeDefinition)) -> Self {
        if let Some(def) = self.builder.types.get_mut(self.ty.index()) {
            f(def);
        }
        self
    }

    pub fn extends(self, base: TypeDescription) -> Self {
        self.edit(|d| d.extends = Some(base))
    }

    pub fn implements(self, interface: TypeDescription) -> Self {
        self.edit(|d| d.implements.push(interface))
    }

    pub fn abstract_type(self) -> Self {
        self.edit(|d| d.is_abstract = true)
    }

    pub fn generic_arguments(self, arguments: &[TypeDescription]) -> Self {
        self.edit(|d| d.generic_arguments = arguments.to_vec())
    }

    pub fn field(self, name: &str, ty: TypeDescription) -> Self {
        self.edit(|d| d.fields.push(FieldDefinition::new(name, ty)))
    }

    pub fn static_field(self, name: &str, ty: TypeDescription) -> Self {
        self.edit(|d| {
            d.fields.push(FieldDefinition {
                static_member: true,
                ..FieldDefinition::new(name, ty)
            })
        })
    }

    pub fn readonly_field(self, name: &str, ty: TypeDescription) -> Self {
        self.edit(|d| {
            d.fields.push(FieldDefinition {
                init_only: true,
                ..FieldDefinition::new(name, ty)
            })
        })
    }

    pub fn method(self, method: MethodDefinition) -> Self {
        self.edit(|d| d.methods.push(method))
    }

    pub fn constructor(self, constructor: MethodDefinition) -> Self {
        self.edit(|d| d.constructors.push(constructor))
    }

    /// Adds a property; accessors are appended to the method list as
    /// `get_{name}` / `set_{name}` unless already named.
    pub fn property(
        self,
        name: &str,
        ty: TypeDescription,
        getter: Option<MethodDefinition>,
        setter: Option<MethodDefinition>,
    ) -> Self {
        let name = name.to_string();
        self.edit(move |d| {
            let mut attach = |mut m: MethodDefinition, prefix: &str| {
                if m.name.is_empty() {
                    m.name = format!("{prefix}_{name}");
                }
                d.methods.push(m);
                d.methods.len() - 1
            };
            let getter = getter.map(|m| attach(m, "get"));
            let setter = setter.map(|m| attach(m, "set"));
            d.properties.push(PropertyDefinition {
                name: name.clone(),
                property_type: ty,
                getter,
                setter,
            });
        })
    }

    pub fn interface_map(
        self,
        interface: TypeDescription,
        entries: Vec<(MethodDescription, MethodDescription)>,
    ) -> Self {
        self.edit(|d| d.interface_maps.push(InterfaceMap { interface, entries }))
    }
}
