//! # Code generation
//!
//! Accessors and non-virtual invokers are described as a [`Fragment`]: a
//! parameter list, a return shape and a short linear instruction sequence in
//! the style of CIL (`ldarg`, `castclass`, `ldflda`, `call`, `ret`, ...). A
//! [`CodeGenerator`] turns a fragment into a [`CompiledFragment`] that can be
//! executed any number of times.
//!
//! - **[`interpreter::Interpreter`]**: the default backend. Verifies the
//!   fragment, resolves field slots, static storage and method bodies once, and
//!   runs the lowered form on a small operand stack.
//! - **[`Unavailable`]**: a backend that refuses every fragment, for hosts
//!   without dynamic code.
//!
//! Every compiled fragment checks its arguments against the declared
//! parameter types before running, whatever the backend.
use crate::{
    error::{ExecutionError, GenerationError},
    runtime::Runtime,
    types::{
        MetadataExt, MetadataProvider, ResolvedDebug, TypeDescription,
        comparer::TypeComparer,
        members::{FieldDescription, MethodDescription, NativeBody, ParameterType},
    },
    value::{ManagedPtr, Object, This, Value},
};
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};

pub mod interpreter;
pub mod verifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentReturn {
    Void,
    Value(TypeDescription),
    ByRef(TypeDescription),
    Delegate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    LoadArgument(u16),
    LoadArgumentAddress(u16),
    CastClass(TypeDescription),
    LoadFieldAddress(FieldDescription),
    LoadStaticFieldAddress(FieldDescription),
    Call(MethodDescription),
    LoadMethodPointer(MethodDescription),
    /// Pops a method pointer and a target, pushes a delegate bound to both.
    NewDelegate,
    Return,
}

impl ResolvedDebug for Instruction {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        match self {
            Instruction::LoadArgument(i) => format!("ldarg {i}"),
            Instruction::LoadArgumentAddress(i) => format!("ldarga {i}"),
            Instruction::CastClass(t) => format!("castclass {}", metadata.type_name(*t)),
            Instruction::LoadFieldAddress(f) => format!("ldflda {}", f.show(metadata)),
            Instruction::LoadStaticFieldAddress(f) => format!("ldsflda {}", f.show(metadata)),
            Instruction::Call(m) => format!("call {}", m.show(metadata)),
            Instruction::LoadMethodPointer(m) => format!("ldftn {}", m.show(metadata)),
            Instruction::NewDelegate => "newobj delegate".to_string(),
            Instruction::Return => "ret".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub name: String,
    /// Type the fragment is generated for, if any.
    pub owner: Option<TypeDescription>,
    pub parameters: Vec<ParameterType>,
    pub return_type: FragmentReturn,
    pub instructions: Vec<Instruction>,
}

impl Fragment {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<ParameterType>,
        return_type: FragmentReturn,
    ) -> Self {
        Self {
            name: name.into(),
            owner: None,
            parameters,
            return_type,
            instructions: vec![],
        }
    }

    pub fn owned_by(mut self, owner: TypeDescription) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }
}

impl ResolvedDebug for Fragment {
    fn show(&self, metadata: &dyn MetadataProvider) -> String {
        let params: Vec<_> = self.parameters.iter().map(|p| p.show(metadata)).collect();
        let mut out = format!("{}({})", self.name, params.join(", "));
        for (offset, instruction) in self.instructions.iter().enumerate() {
            out.push_str(&format!("\n  IL_{offset:04x}: {}", instruction.show(metadata)));
        }
        out
    }
}

/// An argument passed to a compiled fragment.
pub enum Argument<'a> {
    Value(Value),
    /// A borrowed value. Field addresses taken through it live as long as the borrow.
    Ref(&'a Value),
    /// A struct passed by reference; writes reach the caller's struct.
    ByRef(&'a mut Object),
}

impl Argument<'_> {
    /// The argument as an owned value; structs passed by reference are copied.
    pub fn to_value(&self) -> Value {
        match self {
            Argument::Value(v) => v.clone(),
            Argument::Ref(v) => (*v).clone(),
            Argument::ByRef(o) => Value::Struct((**o).clone()),
        }
    }

    fn value(&self) -> Option<&Value> {
        match self {
            Argument::Value(v) => Some(v),
            Argument::Ref(v) => Some(*v),
            Argument::ByRef(_) => None,
        }
    }

    pub(crate) fn runtime_type(&self, metadata: &dyn MetadataProvider) -> Option<TypeDescription> {
        match self {
            Argument::ByRef(o) => Some(o.description),
            other => other.value()?.runtime_type(metadata),
        }
    }

    pub(crate) fn describe(&self, metadata: &dyn MetadataProvider) -> String {
        match self.runtime_type(metadata) {
            Some(t) if matches!(self, Argument::ByRef(_)) => format!("ref {}", metadata.type_name(t)),
            Some(t) => metadata.type_name(t),
            None => "null".to_string(),
        }
    }
}

impl From<Value> for Argument<'_> {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl<'a> From<&'a Value> for Argument<'a> {
    fn from(value: &'a Value) -> Self {
        Argument::Ref(value)
    }
}

impl<'a> From<&'a mut Object> for Argument<'a> {
    fn from(value: &'a mut Object) -> Self {
        Argument::ByRef(value)
    }
}

/// A method with its resolved body, as loaded by `ldftn`.
#[derive(Clone)]
pub struct FunctionPointer {
    pub method: MethodDescription,
    pub(crate) name: String,
    pub(crate) body: NativeBody,
}

impl Debug for FunctionPointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FunctionPointer({})", self.name)
    }
}

impl FunctionPointer {
    pub(crate) fn resolve(
        metadata: &dyn MetadataProvider,
        method: &MethodDescription,
    ) -> Option<Self> {
        let body = metadata.method_definition(method)?.body.clone()?;
        Some(Self {
            method: method.clone(),
            name: method.show(metadata),
            body,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A target paired with a function pointer; calls never dispatch virtually.
#[derive(Clone)]
pub struct BoundDelegate {
    pub target: Value,
    pub function: FunctionPointer,
    pub(crate) metadata: Arc<dyn MetadataProvider>,
}

impl BoundDelegate {
    pub fn invoke(&self, arguments: &[Value]) -> Result<Value, ExecutionError> {
        call_native(
            self.metadata.as_ref(),
            &self.function,
            Some(Argument::Ref(&self.target)),
            arguments,
        )
    }
}

impl Debug for BoundDelegate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundDelegate")
            .field("target", &self.target)
            .field("function", &self.function)
            .finish()
    }
}

pub enum Returned<'a> {
    Void,
    Value(Value),
    Address(ManagedPtr<'a>),
    Delegate(BoundDelegate),
}

impl Debug for Returned<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Returned::Void => write!(f, "Void"),
            Returned::Value(v) => write!(f, "Value({v:?})"),
            Returned::Address(p) => write!(f, "Address({p:?})"),
            Returned::Delegate(d) => write!(f, "Delegate({:?})", d.function),
        }
    }
}

/// Backend-specific executable form of a fragment.
pub trait Executable: Send + Sync {
    fn execute<'a>(&'a self, arguments: Vec<Argument<'a>>) -> Result<Returned<'a>, ExecutionError>;
}

pub struct CompiledFragment {
    name: String,
    parameters: Vec<ParameterType>,
    return_type: FragmentReturn,
    metadata: Arc<dyn MetadataProvider>,
    code: Box<dyn Executable>,
}

impl Debug for CompiledFragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFragment")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

impl CompiledFragment {
    pub fn new(runtime: &Runtime, fragment: &Fragment, code: Box<dyn Executable>) -> Self {
        Self {
            name: fragment.name.clone(),
            parameters: fragment.parameters.clone(),
            return_type: fragment.return_type,
            metadata: runtime.metadata_handle(),
            code,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterType] {
        &self.parameters
    }

    pub fn return_type(&self) -> FragmentReturn {
        self.return_type
    }

    pub fn execute<'a>(&'a self, arguments: Vec<Argument<'a>>) -> Result<Returned<'a>, ExecutionError> {
        check_arguments(self.metadata.as_ref(), &self.name, &self.parameters, &arguments)?;
        self.code.execute(arguments)
    }
}

/// Arity and per-parameter checks shared by every generated callable.
pub(crate) fn check_arguments(
    metadata: &dyn MetadataProvider,
    target: &str,
    parameters: &[ParameterType],
    arguments: &[Argument<'_>],
) -> Result<(), ExecutionError> {
    if arguments.len() != parameters.len() {
        return Err(ExecutionError::ArgumentCount {
            target: target.to_string(),
            expected: parameters.len(),
            actual: arguments.len(),
        });
    }
    let comparer = TypeComparer::new(metadata);
    for (index, (parameter, argument)) in parameters.iter().zip(arguments).enumerate() {
        let accepted = match (parameter, argument) {
            (ParameterType::Ref(t), Argument::ByRef(o)) => o.description == *t,
            (ParameterType::Value(t), Argument::Value(v)) => comparer.value_matches(v, *t),
            (ParameterType::Value(t), Argument::Ref(v)) => comparer.value_matches(v, *t),
            _ => false,
        };
        if !accepted {
            return Err(ExecutionError::ArgumentType {
                target: target.to_string(),
                index,
                expected: parameter.show(metadata),
                actual: argument.describe(metadata),
            });
        }
    }
    Ok(())
}

pub trait CodeGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        runtime: &Runtime,
        fragment: Fragment,
    ) -> Result<CompiledFragment, GenerationError>;
}

/// Backend for hosts without dynamic code generation.
#[derive(Clone, Debug)]
pub struct Unavailable {
    pub reason: String,
}

impl CodeGenerator for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn generate(
        &self,
        _runtime: &Runtime,
        fragment: Fragment,
    ) -> Result<CompiledFragment, GenerationError> {
        Err(GenerationError::Unsupported {
            backend: self.name().to_string(),
            reason: format!("{} ({})", self.reason, fragment.name),
        })
    }
}

/// Runs a native body against a receiver. Boxed structs are mutated in place;
/// structs passed by value run against a copy.
pub(crate) fn call_native(
    metadata: &dyn MetadataProvider,
    function: &FunctionPointer,
    receiver: Option<Argument<'_>>,
    arguments: &[Value],
) -> Result<Value, ExecutionError> {
    let body = &function.body;
    let value = match receiver {
        None => return body(This::Static, arguments),
        Some(Argument::ByRef(object)) => return body(This::Value(object), arguments),
        Some(Argument::Value(value)) => return call_on_value(metadata, function, &value, arguments),
        Some(Argument::Ref(value)) => value,
    };
    call_on_value(metadata, function, value, arguments)
}

pub(crate) fn call_on_value(
    metadata: &dyn MetadataProvider,
    function: &FunctionPointer,
    receiver: &Value,
    arguments: &[Value],
) -> Result<Value, ExecutionError> {
    let body = &function.body;
    match receiver {
        Value::Null => Err(ExecutionError::NullReference),
        // boxed structs are mutated in the box, one slot at a time
        Value::Object(o) => body(This::Object(o.clone()), arguments),
        Value::Struct(s) => {
            let mut copy = s.clone();
            body(This::Value(&mut copy), arguments)
        }
        other => Err(ExecutionError::UnsupportedReceiver {
            method: function.name.clone(),
            actual: other
                .runtime_type(metadata)
                .map_or_else(|| "null".to_string(), |t| metadata.type_name(t)),
        }),
    }
}
