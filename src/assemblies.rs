//! Importing type metadata from managed assemblies with `dotnetdll`.
//!
//! Only the shape of each type is imported: kind, base type, interfaces,
//! fields, methods, constructors and properties. Method bodies are CIL and
//! are not executed, so imported methods have no body; hosts attach native
//! bodies with a [`RegistryBuilder`] when they need to call them.
//! Types referenced from other assemblies become empty placeholders named
//! after the reference, and generic instantiations resolve to their open
//! definition.
use crate::{
    error::AssemblyError,
    types::{
        CoreType, TypeDescription, TypeKind,
        members::{MethodDefinition, MethodSignature, ParameterType},
        registry::{RegistryBuilder, TypeRegistry},
    },
};
use dotnetdll::prelude::{
    BaseType, Kind, MemberType, Method, MethodType, ParameterType as DllParameter, ReadOptions,
    Resolution, TypeIndex, TypeSource, UserType, ValueKind,
};
use std::{collections::HashMap, path::Path};

pub fn load_assembly(path: impl AsRef<Path>) -> Result<TypeRegistry, AssemblyError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| AssemblyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_assembly(&path.display().to_string(), &bytes)
}

pub fn parse_assembly(name: &str, bytes: &[u8]) -> Result<TypeRegistry, AssemblyError> {
    let resolution =
        Resolution::parse(bytes, ReadOptions::default()).map_err(|e| AssemblyError::Parse {
            path: name.to_string(),
            reason: format!("{e:?}"),
        })?;
    let mut importer = Importer::new(&resolution);
    importer.declare_all();
    importer.define_all();
    tracing::debug!(
        "imported {} types from {name}",
        resolution.type_definitions.len()
    );
    Ok(importer.builder.build())
}

fn full_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}

fn core_of<T>(base: &BaseType<T>) -> Option<CoreType> {
    Some(match base {
        BaseType::Boolean => CoreType::Boolean,
        BaseType::Char => CoreType::Char,
        BaseType::Int8 => CoreType::Int8,
        BaseType::UInt8 => CoreType::UInt8,
        BaseType::Int16 => CoreType::Int16,
        BaseType::UInt16 => CoreType::UInt16,
        BaseType::Int32 => CoreType::Int32,
        BaseType::UInt32 => CoreType::UInt32,
        BaseType::Int64 => CoreType::Int64,
        BaseType::UInt64 => CoreType::UInt64,
        BaseType::Float32 => CoreType::Float32,
        BaseType::Float64 => CoreType::Float64,
        BaseType::IntPtr | BaseType::ValuePointer(..) | BaseType::FunctionPointer(_) => CoreType::IntPtr,
        BaseType::UIntPtr => CoreType::UIntPtr,
        BaseType::Object => CoreType::Object,
        BaseType::String => CoreType::String,
        _ => return None,
    })
}

fn user_type<T: Clone>(source: &TypeSource<T>) -> UserType {
    match source {
        TypeSource::User(u) => *u,
        TypeSource::Generic { base, .. } => *base,
    }
}

struct Importer<'r, 'a> {
    resolution: &'r Resolution<'a>,
    builder: RegistryBuilder,
    order: Vec<(usize, TypeIndex)>,
    positions: HashMap<TypeIndex, usize>,
    definitions: HashMap<TypeIndex, TypeDescription>,
    by_name: HashMap<String, TypeDescription>,
}

impl<'r, 'a> Importer<'r, 'a> {
    fn new(resolution: &'r Resolution<'a>) -> Self {
        let builder = RegistryBuilder::new();
        let by_name = CoreType::ALL
            .iter()
            .map(|&c| (full_name(Some("System"), c.name()), builder.core(c)))
            .collect();
        let order: Vec<_> = (0..resolution.type_definitions.len())
            .filter_map(|i| resolution.type_definition_index(i).map(|t| (i, t)))
            .collect();
        let positions = order.iter().map(|&(i, t)| (t, i)).collect();
        Self {
            resolution,
            builder,
            order,
            positions,
            definitions: HashMap::new(),
            by_name,
        }
    }

    fn user_type_name(&self, user: UserType) -> String {
        let resolution = self.resolution;
        match user {
            UserType::Definition(d) => {
                let def = &resolution[d];
                full_name(def.namespace.as_deref(), &def.name)
            }
            UserType::Reference(r) => {
                let reference = &resolution[r];
                full_name(reference.namespace.as_deref(), &reference.name)
            }
        }
    }

    fn kind_of(&self, position: usize) -> TypeKind {
        let def = &self.resolution.type_definitions[position];
        if matches!(def.flags.kind, Kind::Interface) {
            return TypeKind::Interface;
        }
        let base = def
            .extends
            .as_ref()
            .map(|source| self.user_type_name(user_type(source)));
        match base.as_deref() {
            Some("System.ValueType") => TypeKind::Struct,
            Some("System.Enum") => {
                let underlying = def
                    .fields
                    .iter()
                    .find(|f| !f.static_member && f.name == "value__")
                    .and_then(|f| match &f.return_type {
                        MemberType::Base(b) => core_of(b),
                        _ => None,
                    })
                    .unwrap_or(CoreType::Int32);
                TypeKind::Enum { underlying }
            }
            _ => TypeKind::Class,
        }
    }

    fn declare(&mut self, position: usize, index: TypeIndex) -> TypeDescription {
        if let Some(&existing) = self.definitions.get(&index) {
            return existing;
        }
        let resolution = self.resolution;
        let def = &resolution.type_definitions[position];
        let name = full_name(def.namespace.as_deref(), &def.name);
        let ty = if let Some(&core) = self.by_name.get(&name) {
            core
        } else {
            let kind = self.kind_of(position);
            match def.encloser {
                Some(outer) => {
                    match self.positions.get(&outer).copied() {
                        Some(p) => {
                            let outer = self.declare(p, outer);
                            self.builder.nested(outer, &def.name, kind)
                        }
                        None => self.builder.declare(&name, kind),
                    }
                }
                None => self.builder.declare(&name, kind),
            }
        };
        self.definitions.insert(index, ty);
        ty
    }

    fn declare_all(&mut self) {
        for (position, index) in self.order.clone() {
            self.declare(position, index);
        }
    }

    /// Placeholder for a type defined in another assembly.
    fn external(&mut self, name: String, value_type: bool) -> TypeDescription {
        if let Some(&ty) = self.by_name.get(&name) {
            return ty;
        }
        let kind = if value_type { TypeKind::Struct } else { TypeKind::Class };
        let ty = self.builder.declare(&name, kind);
        self.by_name.insert(name, ty);
        ty
    }

    fn source_type<T: Clone>(&mut self, source: &TypeSource<T>, value_type: bool) -> TypeDescription {
        match user_type(source) {
            UserType::Definition(d) => match self.definitions.get(&d) {
                Some(&ty) => ty,
                None => self.builder.core(CoreType::Object),
            },
            UserType::Reference(_) => {
                let name = self.user_type_name(user_type(source));
                self.external(name, value_type)
            }
        }
    }

    fn base_type<T: Clone>(
        &mut self,
        base: &BaseType<T>,
        element: fn(&mut Self, &T) -> TypeDescription,
    ) -> TypeDescription {
        if let Some(core) = core_of(base) {
            return self.builder.core(core);
        }
        match base {
            BaseType::Type { source, value_kind } => {
                self.source_type(source, matches!(value_kind, Some(ValueKind::ValueType)))
            }
            BaseType::Vector(_, inner) => {
                let inner = element(self, inner);
                self.builder.array_of(inner)
            }
            _ => self.builder.core(CoreType::Object),
        }
    }

    fn member_type(&mut self, ty: &MemberType) -> TypeDescription {
        match ty {
            MemberType::Base(b) => self.base_type(b, Self::member_type),
            _ => self.builder.core(CoreType::Object),
        }
    }

    fn method_type(&mut self, ty: &MethodType) -> TypeDescription {
        match ty {
            MethodType::Base(b) => self.base_type(b, Self::method_type),
            _ => self.builder.core(CoreType::Object),
        }
    }

    fn parameter(&mut self, parameter: &DllParameter<MethodType>) -> ParameterType {
        match parameter {
            DllParameter::Value(t) => ParameterType::Value(self.method_type(t)),
            DllParameter::Ref(t) => ParameterType::Ref(self.method_type(t)),
            _ => ParameterType::Value(self.builder.core(CoreType::Object)),
        }
    }

    fn method(&mut self, method: &Method) -> MethodDefinition {
        let signature = &method.signature;
        let parameters = signature
            .parameters
            .iter()
            .map(|p| self.parameter(&p.1))
            .collect();
        let return_type = signature.return_type.1.as_ref().map(|r| self.parameter(r));
        let signature = if signature.instance {
            MethodSignature::instance(parameters, return_type)
        } else {
            MethodSignature::static_member(parameters, return_type)
        };
        let mut def = MethodDefinition::new(&method.name, signature);
        if method.abstract_member {
            def = def.abstract_member();
        } else if method.virtual_member {
            def = def.virtual_member();
        }
        if !method.generic_parameters.is_empty() {
            def = def.generic(method.generic_parameters.len());
        }
        def
    }

    fn define_all(&mut self) {
        for (position, index) in self.order.clone() {
            let Some(&ty) = self.definitions.get(&index) else {
                continue;
            };
            // core types keep their built-in shape
            if CoreType::ALL.iter().any(|&c| self.builder.core(c) == ty) {
                continue;
            }
            let resolution = self.resolution;
            let def = &resolution.type_definitions[position];

            if let Some(source) = &def.extends {
                let base = self.source_type(source, false);
                self.builder.define(ty).extends(base);
            }
            for (_, source) in &def.implements {
                let interface = self.source_type(source, false);
                self.builder.define(ty).implements(interface);
            }
            for field in &def.fields {
                let field_type = self.member_type(&field.return_type);
                let builder = self.builder.define(ty);
                if field.static_member {
                    builder.static_field(&field.name, field_type);
                } else {
                    builder.field(&field.name, field_type);
                }
            }
            let mut any_abstract = false;
            for method in &def.methods {
                any_abstract |= method.abstract_member;
                let imported = self.method(method);
                let builder = self.builder.define(ty);
                if method.name == ".ctor" || method.name == ".cctor" {
                    builder.constructor(imported);
                } else {
                    builder.method(imported);
                }
            }
            for property in &def.properties {
                let getter = property.getter.as_ref().map(|m| self.method(m));
                let setter = property.setter.as_ref().map(|m| self.method(m));
                let property_type = getter
                    .as_ref()
                    .and_then(|g| g.signature.return_type)
                    .or_else(|| setter.as_ref().and_then(|s| s.signature.parameters.last().copied()))
                    .map_or(self.builder.core(CoreType::Object), |p| p.ty());
                self.builder
                    .define(ty)
                    .property(&property.name, property_type, getter, setter);
            }
            if any_abstract && !matches!(def.flags.kind, Kind::Interface) {
                self.builder.define(ty).abstract_type();
            }
        }
    }
}
