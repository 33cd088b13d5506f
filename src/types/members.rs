use crate::{
    error::ExecutionError,
    types::{MetadataExt, MetadataProvider, ResolvedDebug, TypeDescription},
    value::{This, Value},
};
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

/// Host implementation of a method. Receives the receiver (or [`This::Static`])
/// and the already-evaluated arguments.
pub type NativeBody =
    Arc<dyn Fn(This<'_>, &[Value]) -> Result<Value, ExecutionError> + Send + Sync>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ParameterType {
    Value(TypeDescription),
    Ref(TypeDescription),
}

impl ParameterType {
    pub const fn ty(&self) -> TypeDescription {
        match self {
            ParameterType::Value(t) | ParameterType::Ref(t) => *t,
        }
    }

    pub const fn is_by_ref(&self) -> bool {
        matches!(self, ParameterType::Ref(_))
    }
}

impl ResolvedDebug for ParameterType {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        match self {
            ParameterType::Value(t) => metadata.type_name(*t),
            ParameterType::Ref(t) => format!("ref {}", metadata.type_name(*t)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MethodSignature {
    pub instance: bool,
    pub parameters: Vec<ParameterType>,
    /// `None` for void.
    pub return_type: Option<ParameterType>,
}

impl MethodSignature {
    pub fn instance(parameters: Vec<ParameterType>, return_type: Option<ParameterType>) -> Self {
        Self {
            instance: true,
            parameters,
            return_type,
        }
    }

    pub fn static_member(
        parameters: Vec<ParameterType>,
        return_type: Option<ParameterType>,
    ) -> Self {
        Self {
            instance: false,
            parameters,
            return_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: TypeDescription,
    pub static_member: bool,
    pub init_only: bool,
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: TypeDescription) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            static_member: false,
            init_only: false,
        }
    }
}

#[derive(Clone)]
pub struct MethodDefinition {
    pub name: String,
    pub signature: MethodSignature,
    pub virtual_member: bool,
    pub abstract_member: bool,
    /// Virtual methods that start a new slot instead of overriding a base slot.
    pub new_slot: bool,
    pub overrides: Option<MethodDescription>,
    pub generic_parameters: usize,
    pub body: Option<NativeBody>,
}

impl Debug for MethodDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("virtual_member", &self.virtual_member)
            .field("overrides", &self.overrides)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

impl MethodDefinition {
    pub fn new(name: &str, signature: MethodSignature) -> Self {
        Self {
            name: name.to_string(),
            signature,
            virtual_member: false,
            abstract_member: false,
            new_slot: false,
            overrides: None,
            generic_parameters: 0,
            body: None,
        }
    }

    pub fn virtual_member(mut self) -> Self {
        self.virtual_member = true;
        self
    }

    pub fn abstract_member(mut self) -> Self {
        self.virtual_member = true;
        self.abstract_member = true;
        self
    }

    pub fn new_slot(mut self) -> Self {
        self.new_slot = true;
        self
    }

    pub fn overrides(mut self, base: MethodDescription) -> Self {
        self.virtual_member = true;
        self.overrides = Some(base);
        self
    }

    pub fn generic(mut self, parameters: usize) -> Self {
        self.generic_parameters = parameters;
        self
    }

    pub fn with_body<F>(mut self, body: F) -> Self
    where
        F: Fn(This<'_>, &[Value]) -> Result<Value, ExecutionError> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn is_static(&self) -> bool {
        !self.signature.instance
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDefinition {
    pub name: String,
    pub property_type: TypeDescription,
    /// Indices into the declaring type's methods.
    pub getter: Option<usize>,
    pub setter: Option<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FieldDescription {
    pub parent: TypeDescription,
    pub index: usize,
}

impl ResolvedDebug for FieldDescription {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        match metadata.field_definition(*self) {
            Some(f) => format!(
                "{}{} {}::{}",
                if f.static_member { "static " } else { "" },
                metadata.type_name(f.field_type),
                metadata.type_name(self.parent),
                f.name
            ),
            None => format!("{}::<field #{}>", metadata.type_name(self.parent), self.index),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PropertyDescription {
    pub parent: TypeDescription,
    pub index: usize,
}

impl ResolvedDebug for PropertyDescription {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        match metadata.property_definition(*self) {
            Some(p) => format!(
                "{} {}::{}",
                metadata.type_name(p.property_type),
                metadata.type_name(self.parent),
                p.name
            ),
            None => format!(
                "{}::<property #{}>",
                metadata.type_name(self.parent),
                self.index
            ),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MethodKind {
    Method,
    Constructor,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescription {
    pub parent: TypeDescription,
    pub index: usize,
    pub kind: MethodKind,
    /// Generic arguments of a constructed generic method.
    pub generics: Option<Arc<[TypeDescription]>>,
}

impl MethodDescription {
    pub const fn method(parent: TypeDescription, index: usize) -> Self {
        Self {
            parent,
            index,
            kind: MethodKind::Method,
            generics: None,
        }
    }

    pub const fn constructor(parent: TypeDescription, index: usize) -> Self {
        Self {
            parent,
            index,
            kind: MethodKind::Constructor,
            generics: None,
        }
    }

    /// The open method this description was constructed from.
    pub fn definition(&self) -> Self {
        Self {
            generics: None,
            ..self.clone()
        }
    }

    pub fn is_same_definition(&self, other: &Self) -> bool {
        self.parent == other.parent && self.index == other.index && self.kind == other.kind
    }
}

impl ResolvedDebug for MethodDescription {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        let Some(m) = metadata.method_definition(self) else {
            return format!("{}::<method #{}>", metadata.type_name(self.parent), self.index);
        };
        let ret = m
            .signature
            .return_type
            .map_or_else(|| "void".to_string(), |r| r.show(metadata));
        let generics = match &self.generics {
            Some(args) => {
                let args: Vec<_> = args.iter().map(|&a| metadata.type_name(a)).collect();
                format!("<{}>", args.join(", "))
            }
            None => String::new(),
        };
        let params: Vec<_> = m
            .signature
            .parameters
            .iter()
            .map(|p| p.show(metadata))
            .collect();
        format!(
            "{}{} {}::{}{}({})",
            if m.signature.instance { "" } else { "static " },
            ret,
            metadata.type_name(self.parent),
            m.name,
            generics,
            params.join(", ")
        )
    }
}

/// Any resolvable member.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemberDescription {
    Field(FieldDescription),
    Property(PropertyDescription),
    Method(MethodDescription),
    Constructor(MethodDescription),
}

impl MemberDescription {
    pub fn declaring_type(&self) -> TypeDescription {
        match self {
            MemberDescription::Field(f) => f.parent,
            MemberDescription::Property(p) => p.parent,
            MemberDescription::Method(m) | MemberDescription::Constructor(m) => m.parent,
        }
    }

    pub fn name<'m>(&self, metadata: &'m dyn MetadataProvider) -> Option<&'m str> {
        match self {
            MemberDescription::Field(f) => metadata.field_definition(*f).map(|d| d.name.as_str()),
            MemberDescription::Property(p) => {
                metadata.property_definition(*p).map(|d| d.name.as_str())
            }
            MemberDescription::Method(m) | MemberDescription::Constructor(m) => {
                metadata.method_definition(m).map(|d| d.name.as_str())
            }
        }
    }
}

impl From<FieldDescription> for MemberDescription {
    fn from(value: FieldDescription) -> Self {
        MemberDescription::Field(value)
    }
}

impl From<PropertyDescription> for MemberDescription {
    fn from(value: PropertyDescription) -> Self {
        MemberDescription::Property(value)
    }
}

impl From<MethodDescription> for MemberDescription {
    fn from(value: MethodDescription) -> Self {
        match value.kind {
            MethodKind::Method => MemberDescription::Method(value),
            MethodKind::Constructor => MemberDescription::Constructor(value),
        }
    }
}

impl ResolvedDebug for MemberDescription {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        match self {
            MemberDescription::Field(f) => f.show(metadata),
            MemberDescription::Property(p) => p.show(metadata),
            MemberDescription::Method(m) | MemberDescription::Constructor(m) => m.show(metadata),
        }
    }
}
