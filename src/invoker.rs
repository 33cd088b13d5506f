//! # Method invokers
//!
//! [`Runtime::method_delegate`] binds a method to a callable [`Invoker`] with a
//! caller-chosen [`DelegateSignature`]. Four strategies exist:
//!
//! - **Static**: calls the method body directly.
//! - **Open virtual**: the receiver is the first argument and the most derived
//!   implementation is looked up per call.
//! - **Open non-virtual**: a generated fragment loads the receiver (by address
//!   for structs) and the arguments and calls the exact method.
//! - **Closed**: the receiver is fixed at bind time. Virtual bindings resolve
//!   the implementation once; non-virtual bindings go through a generated
//!   `ldftn` trampoline.
use crate::{
    codegen::{
        Argument, BoundDelegate, CompiledFragment, Fragment, FragmentReturn, FunctionPointer,
        Instruction, Returned, call_native, check_arguments,
    },
    error::{BindError, ExecutionError, GenerationError},
    resolver::MemberResolver,
    runtime::Runtime,
    types::{
        CoreType, MetadataExt, MetadataProvider, ResolvedDebug, TypeDescription,
        members::{MethodDescription, ParameterType},
    },
    value::Value,
};
use dashmap::DashMap;
use enum_dispatch::enum_dispatch;
use std::sync::Arc;

/// Shape of the produced callable: its parameters (receiver first for open
/// instance bindings) and return type (`None` for void).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DelegateSignature {
    pub parameters: Vec<ParameterType>,
    pub return_type: Option<ParameterType>,
}

impl DelegateSignature {
    pub fn new(parameters: Vec<ParameterType>, return_type: Option<ParameterType>) -> Self {
        Self {
            parameters,
            return_type,
        }
    }

    fn fragment_return(&self) -> FragmentReturn {
        match self.return_type {
            None => FragmentReturn::Void,
            Some(p) => FragmentReturn::Value(p.ty()),
        }
    }
}

#[enum_dispatch]
pub trait Invoke {
    fn invoke<'a>(&self, arguments: Vec<Argument<'a>>) -> Result<Value, ExecutionError>;

    /// The method this invoker was bound to.
    fn method(&self) -> &MethodDescription;
}

#[enum_dispatch(Invoke)]
#[derive(Debug)]
pub enum Invoker {
    StaticInvoker,
    VirtualInvoker,
    DirectInvoker,
    BoundInvoker,
}

impl Invoker {
    pub fn invoke_values(&self, arguments: Vec<Value>) -> Result<Value, ExecutionError> {
        self.invoke(arguments.into_iter().map(Argument::Value).collect())
    }
}

fn values(arguments: &[Argument<'_>]) -> Vec<Value> {
    arguments.iter().map(Argument::to_value).collect()
}

pub struct StaticInvoker {
    method: MethodDescription,
    name: String,
    parameters: Vec<ParameterType>,
    function: FunctionPointer,
    metadata: Arc<dyn MetadataProvider>,
}

impl std::fmt::Debug for StaticInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StaticInvoker({})", self.name)
    }
}

impl Invoke for StaticInvoker {
    fn invoke<'a>(&self, arguments: Vec<Argument<'a>>) -> Result<Value, ExecutionError> {
        check_arguments(self.metadata.as_ref(), &self.name, &self.parameters, &arguments)?;
        call_native(self.metadata.as_ref(), &self.function, None, &values(&arguments))
    }

    fn method(&self) -> &MethodDescription {
        &self.method
    }
}

/// Open instance binding that dispatches on the receiver's runtime type.
/// The implementation found for each runtime type is kept, so only the first
/// call per receiver type walks the hierarchy.
pub struct VirtualInvoker {
    method: MethodDescription,
    name: String,
    parameters: Vec<ParameterType>,
    depth_limit: usize,
    metadata: Arc<dyn MetadataProvider>,
    targets: DashMap<TypeDescription, Arc<FunctionPointer>>,
}

impl VirtualInvoker {
    /// Number of receiver types dispatched so far.
    pub fn dispatched_types(&self) -> usize {
        self.targets.len()
    }

    fn target_for(&self, runtime_type: TypeDescription) -> Result<Arc<FunctionPointer>, ExecutionError> {
        if let Some(cached) = self.targets.get(&runtime_type) {
            return Ok(Arc::clone(&cached));
        }
        let metadata = self.metadata.as_ref();
        let target = MemberResolver::new(metadata)
            .with_depth_limit(self.depth_limit)
            .resolve_virtual(&self.method, runtime_type)
            .ok_or_else(|| ExecutionError::MissingBody(self.name.clone()))?;
        let function = FunctionPointer::resolve(metadata, &target)
            .ok_or_else(|| ExecutionError::MissingBody(target.show(metadata)))?;
        Ok(Arc::clone(
            &self.targets.entry(runtime_type).or_insert(Arc::new(function)),
        ))
    }
}

impl std::fmt::Debug for VirtualInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VirtualInvoker({})", self.name)
    }
}

impl Invoke for VirtualInvoker {
    fn invoke<'a>(&self, arguments: Vec<Argument<'a>>) -> Result<Value, ExecutionError> {
        let metadata = self.metadata.as_ref();
        check_arguments(metadata, &self.name, &self.parameters, &arguments)?;
        let mut arguments = arguments.into_iter();
        let Some(receiver) = arguments.next() else {
            return Err(ExecutionError::NullReference);
        };
        let runtime_type = receiver
            .runtime_type(metadata)
            .ok_or(ExecutionError::NullReference)?;
        let function = self.target_for(runtime_type)?;
        let rest: Vec<_> = arguments.map(|a| a.to_value()).collect();
        call_native(metadata, &function, Some(receiver), &rest)
    }

    fn method(&self) -> &MethodDescription {
        &self.method
    }
}

/// Open instance binding that calls the exact method through a generated fragment.
#[derive(Debug)]
pub struct DirectInvoker {
    method: MethodDescription,
    code: CompiledFragment,
}

impl Invoke for DirectInvoker {
    fn invoke<'a>(&self, arguments: Vec<Argument<'a>>) -> Result<Value, ExecutionError> {
        match self.code.execute(arguments)? {
            Returned::Void => Ok(Value::Null),
            Returned::Value(v) => Ok(v),
            other => Err(ExecutionError::UnexpectedResult(format!(
                "{} ({other:?})",
                self.code.name()
            ))),
        }
    }

    fn method(&self) -> &MethodDescription {
        &self.method
    }
}

/// Closed binding: a fixed receiver and a fixed implementation.
#[derive(Debug)]
pub struct BoundInvoker {
    method: MethodDescription,
    parameters: Vec<ParameterType>,
    delegate: BoundDelegate,
}

impl BoundInvoker {
    pub fn target(&self) -> &Value {
        &self.delegate.target
    }
}

impl Invoke for BoundInvoker {
    fn invoke<'a>(&self, arguments: Vec<Argument<'a>>) -> Result<Value, ExecutionError> {
        check_arguments(
            self.delegate.metadata.as_ref(),
            self.delegate.function.name(),
            &self.parameters,
            &arguments,
        )?;
        self.delegate.invoke(&values(&arguments))
    }

    fn method(&self) -> &MethodDescription {
        &self.method
    }
}

struct Binding<'r> {
    runtime: &'r Runtime,
    name: String,
}

impl Binding<'_> {
    fn invalid(&self, reason: impl Into<String>) -> BindError {
        BindError::InvalidSignature {
            method: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn show(&self, p: &ParameterType) -> String {
        p.show(self.runtime.metadata())
    }

    /// Delegate parameters and return type against the method's own.
    fn check_signature(
        &self,
        delegate: &[ParameterType],
        delegate_return: Option<ParameterType>,
        method: &MethodDescription,
    ) -> Result<(), BindError> {
        let Some(def) = self.runtime.metadata().method_definition(method) else {
            return Err(self.invalid("unknown method"));
        };
        let signature = &def.signature;
        if delegate.len() != signature.parameters.len() {
            return Err(self.invalid(format!(
                "expected {} parameters, got {}",
                signature.parameters.len(),
                delegate.len()
            )));
        }
        let comparer = self.runtime.comparer();
        for (index, (d, m)) in delegate.iter().zip(&signature.parameters).enumerate() {
            if d.is_by_ref() || m.is_by_ref() {
                return Err(self.invalid(format!("parameter {index} is passed by reference")));
            }
            if !comparer.parameter_accepts(*d, *m) {
                return Err(self.invalid(format!(
                    "parameter {index} of type {} cannot be passed as {}",
                    self.show(d),
                    self.show(m)
                )));
            }
        }
        if !comparer.return_accepts(delegate_return, signature.return_type) {
            let shown = |r: Option<ParameterType>| r.map_or_else(|| "void".to_string(), |r| self.show(&r));
            return Err(self.invalid(format!(
                "return type {} cannot be returned as {}",
                shown(signature.return_type),
                shown(delegate_return)
            )));
        }
        Ok(())
    }

    fn function(&self, method: &MethodDescription) -> Result<FunctionPointer, BindError> {
        FunctionPointer::resolve(self.runtime.metadata(), method).ok_or_else(|| BindError::MissingBody {
            method: method.show(self.runtime.metadata()),
        })
    }

    fn no_mapping(&self, ty: TypeDescription, interface: TypeDescription, method: &MethodDescription) -> BindError {
        BindError::NoInterfaceMapping {
            type_name: self.runtime.type_name(ty),
            interface: self.runtime.type_name(interface),
            method: method.show(self.runtime.metadata()),
        }
    }
}

impl Runtime {
    /// Binds `method` to a callable of shape `signature`.
    ///
    /// `instance` fixes the receiver (a closed binding); without it the
    /// receiver is the first delegate parameter. `virtual_call` selects
    /// dispatch to the receiver's most derived override; interface methods
    /// must be called virtually unless a struct receiver maps them to its own
    /// implementation.
    pub fn method_delegate(
        &self,
        method: &MethodDescription,
        signature: &DelegateSignature,
        instance: Option<Value>,
        virtual_call: bool,
    ) -> Result<Invoker, BindError> {
        let metadata = self.metadata();
        let binding = Binding {
            runtime: self,
            name: method.show(metadata),
        };
        let Some(def) = metadata.method_definition(method) else {
            return Err(BindError::Unresolved {
                method: binding.name.clone(),
                type_name: self.type_name(method.parent),
            });
        };
        if def.is_static() {
            binding.check_signature(&signature.parameters, signature.return_type, method)?;
            return Ok(StaticInvoker {
                method: method.clone(),
                name: binding.name.clone(),
                parameters: signature.parameters.clone(),
                function: binding.function(method)?,
                metadata: self.metadata_handle(),
            }
            .into());
        }
        match instance {
            None => self.open_delegate(&binding, method.clone(), signature, virtual_call),
            Some(instance) => self.closed_delegate(&binding, method.clone(), signature, instance, virtual_call),
        }
    }

    fn open_delegate(
        &self,
        binding: &Binding<'_>,
        mut method: MethodDescription,
        signature: &DelegateSignature,
        virtual_call: bool,
    ) -> Result<Invoker, BindError> {
        let metadata = self.metadata();
        let resolver = self.resolver();
        let comparer = self.comparer();
        let Some((&receiver, rest)) = signature.parameters.split_first() else {
            return Err(binding.invalid("an open instance delegate takes the receiver as its first parameter"));
        };
        let receiver_type = receiver.ty();
        let mut declaring = method.parent;

        // struct receivers cannot dispatch through the interface, so bind the struct's own method
        if metadata.is_interface(declaring) && metadata.is_value_type(receiver_type) {
            let Some(target) = resolver.implementation_of(receiver_type, &method) else {
                return Err(binding.no_mapping(receiver_type, declaring, &method));
            };
            method = target;
            declaring = receiver_type;
        }
        if metadata.is_interface(declaring) && !virtual_call {
            return Err(BindError::InterfaceRequiresVirtual {
                method: binding.name.clone(),
            });
        }
        binding.check_signature(rest, signature.return_type, &method)?;

        if virtual_call && !metadata.is_value_type(declaring) {
            if receiver.is_by_ref() {
                return Err(binding.invalid("class receivers are passed by value"));
            }
            let slot = if metadata.is_interface(declaring) {
                method
            } else if metadata.is_interface(receiver_type) {
                resolver
                    .interface_method_for(declaring, receiver_type, &method)
                    .ok_or_else(|| binding.no_mapping(declaring, receiver_type, &method))?
            } else {
                resolver.base_definition(&method)
            };
            if !comparer.is_assignable_to(receiver_type, slot.parent) {
                return Err(binding.invalid(format!(
                    "receiver type {} is not a {}",
                    self.type_name(receiver_type),
                    self.type_name(slot.parent)
                )));
            }
            return Ok(VirtualInvoker {
                name: slot.show(metadata),
                method: slot,
                parameters: signature.parameters.clone(),
                depth_limit: self.config().hierarchy_depth_limit,
                metadata: self.metadata_handle(),
                targets: DashMap::new(),
            }
            .into());
        }

        let receiver_load = if metadata.is_value_type(declaring) {
            if receiver_type != declaring {
                return Err(binding.invalid(format!(
                    "struct receiver must be {}",
                    self.type_name(declaring)
                )));
            }
            match receiver {
                ParameterType::Ref(_) => Instruction::LoadArgument(0),
                ParameterType::Value(_) => Instruction::LoadArgumentAddress(0),
            }
        } else {
            if receiver.is_by_ref() || !comparer.is_assignable_to(receiver_type, declaring) {
                return Err(binding.invalid(format!(
                    "receiver {} cannot be passed as {}",
                    binding.show(&receiver),
                    self.type_name(declaring)
                )));
            }
            Instruction::LoadArgument(0)
        };
        let mut fragment = Fragment::new(
            format!("open instance {}", binding.name),
            signature.parameters.clone(),
            signature.fragment_return(),
        )
        .owned_by(declaring);
        fragment.emit(receiver_load);
        for index in 1..signature.parameters.len() {
            let index = u16::try_from(index)
                .map_err(|_| binding.invalid(format!("parameter {index} is beyond the fragment argument range")))?;
            fragment.emit(Instruction::LoadArgument(index));
        }
        fragment
            .emit(Instruction::Call(method.clone()))
            .emit(Instruction::Return);
        Ok(DirectInvoker {
            method,
            code: self.generate(fragment)?,
        }
        .into())
    }

    fn closed_delegate(
        &self,
        binding: &Binding<'_>,
        method: MethodDescription,
        signature: &DelegateSignature,
        instance: Value,
        virtual_call: bool,
    ) -> Result<Invoker, BindError> {
        let metadata = self.metadata();
        let declaring = method.parent;
        if metadata.is_interface(declaring) && !virtual_call {
            return Err(BindError::InterfaceRequiresVirtual {
                method: binding.name.clone(),
            });
        }
        binding.check_signature(&signature.parameters, signature.return_type, &method)?;
        // boxed once, so mutations by struct methods persist across calls
        let instance = self.box_value(instance);
        let actual = instance
            .runtime_type(metadata)
            .map_or_else(|| "null".to_string(), |t| self.type_name(t));
        if !self.comparer().is_instance_of(&instance, declaring) {
            return Err(BindError::ReceiverMismatch {
                method: binding.name.clone(),
                actual,
            });
        }

        if virtual_call {
            let resolver = self.resolver();
            let slot = if metadata.is_interface(declaring) {
                method.clone()
            } else {
                resolver.base_definition(&method)
            };
            let target = instance
                .runtime_type(metadata)
                .and_then(|t| resolver.resolve_virtual(&slot, t))
                .ok_or_else(|| BindError::Unresolved {
                    method: binding.name.clone(),
                    type_name: actual.clone(),
                })?;
            return Ok(BoundInvoker {
                method,
                parameters: signature.parameters.clone(),
                delegate: BoundDelegate {
                    target: instance,
                    function: binding.function(&target)?,
                    metadata: self.metadata_handle(),
                },
            }
            .into());
        }

        // a boxed struct travels as an object so the delegate keeps the box
        let target_type = if metadata.is_value_type(declaring) {
            metadata.core_type(CoreType::Object)
        } else {
            declaring
        };
        let mut trampoline = Fragment::new(
            format!("closed instance {}", binding.name),
            vec![ParameterType::Value(target_type)],
            FragmentReturn::Delegate,
        )
        .owned_by(declaring);
        trampoline
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::LoadMethodPointer(method.clone()))
            .emit(Instruction::NewDelegate)
            .emit(Instruction::Return);
        let code = self.generate(trampoline)?;
        let delegate = match code.execute(vec![Argument::Value(instance)]) {
            Ok(Returned::Delegate(delegate)) => delegate,
            Ok(other) => {
                return Err(GenerationError::Execution {
                    fragment: code.name().to_string(),
                    source: ExecutionError::UnexpectedResult(format!("{other:?}")),
                }
                .into());
            }
            Err(source) => {
                return Err(GenerationError::Execution {
                    fragment: code.name().to_string(),
                    source,
                }
                .into());
            }
        };
        Ok(BoundInvoker {
            method,
            parameters: signature.parameters.clone(),
            delegate,
        }
        .into())
    }
}
