//! The default backend: fragments are verified, lowered once into [`Op`]s with
//! every slot and body resolved, and then run on a small operand stack.
use crate::{
    codegen::{
        Argument, BoundDelegate, CodeGenerator, CompiledFragment, Executable, Fragment,
        FragmentReturn, FunctionPointer, Instruction, Returned, call_native, call_on_value,
        verifier,
    },
    error::{ExecutionError, GenerationError},
    runtime::Runtime,
    types::{
        MetadataExt, MetadataProvider, ResolvedDebug, TypeDescription, comparer::TypeComparer,
        members::{FieldDescription, MethodDescription, ParameterType},
    },
    value::{ManagedPtr, Object, This, Value, storage::StaticStorage},
};
use parking_lot::MappedRwLockWriteGuard;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default)]
pub struct Interpreter;

enum Op {
    LoadArgument(usize),
    /// Loads a by-value struct argument; a boxed struct is unboxed into a copy.
    LoadStructCopy(usize),
    CastClass {
        target: TypeDescription,
        name: String,
    },
    FieldAddress {
        slot: usize,
        owner: String,
    },
    StaticAddress {
        storage: Arc<StaticStorage>,
        slot: usize,
    },
    Call {
        function: FunctionPointer,
        instance: bool,
        arity: usize,
        returns: bool,
    },
    MethodPointer(FunctionPointer),
    NewDelegate,
    Return,
}

struct Program {
    name: String,
    metadata: Arc<dyn MetadataProvider>,
    return_type: FragmentReturn,
    code: Vec<Op>,
}

impl CodeGenerator for Interpreter {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn generate(
        &self,
        runtime: &Runtime,
        fragment: Fragment,
    ) -> Result<CompiledFragment, GenerationError> {
        if runtime.config().verify_fragments {
            verifier::verify(runtime.metadata(), &fragment)?;
        }
        let code = fragment
            .instructions
            .iter()
            .map(|i| lower(runtime, &fragment, i))
            .collect::<Result<Vec<_>, _>>()?;
        let program = Program {
            name: fragment.name.clone(),
            metadata: runtime.metadata_handle(),
            return_type: fragment.return_type,
            code,
        };
        Ok(CompiledFragment::new(runtime, &fragment, Box::new(program)))
    }
}

fn instance_slot(
    runtime: &Runtime,
    fragment: &Fragment,
    field: FieldDescription,
) -> Result<usize, GenerationError> {
    runtime
        .layout(field.parent)
        .slot_of(field)
        .ok_or_else(|| GenerationError::UnknownField {
            fragment: fragment.name.clone(),
            field: field.show(runtime.metadata()),
        })
}

fn function(
    runtime: &Runtime,
    fragment: &Fragment,
    method: &MethodDescription,
) -> Result<FunctionPointer, GenerationError> {
    FunctionPointer::resolve(runtime.metadata(), method).ok_or_else(|| {
        GenerationError::MissingBody {
            fragment: fragment.name.clone(),
            method: method.show(runtime.metadata()),
        }
    })
}

fn lower(
    runtime: &Runtime,
    fragment: &Fragment,
    instruction: &Instruction,
) -> Result<Op, GenerationError> {
    let metadata = runtime.metadata();
    Ok(match instruction {
        // arguments already arrive as references, so both loads read the same slot
        Instruction::LoadArgument(i) | Instruction::LoadArgumentAddress(i) => {
            let index = *i as usize;
            match fragment.parameters.get(index) {
                Some(ParameterType::Value(t)) if metadata.is_value_type(*t) => Op::LoadStructCopy(index),
                _ => Op::LoadArgument(index),
            }
        }
        Instruction::CastClass(target) => Op::CastClass {
            target: *target,
            name: metadata.type_name(*target),
        },
        Instruction::LoadFieldAddress(field) => Op::FieldAddress {
            slot: instance_slot(runtime, fragment, *field)?,
            owner: metadata.type_name(field.parent),
        },
        Instruction::LoadStaticFieldAddress(field) => {
            let storage = runtime.static_storage(field.parent);
            let slot = storage
                .slot_of(*field)
                .ok_or_else(|| GenerationError::UnknownField {
                    fragment: fragment.name.clone(),
                    field: field.show(metadata),
                })?;
            Op::StaticAddress { storage, slot }
        }
        Instruction::Call(method) => {
            let signature = metadata
                .method_definition(method)
                .map(|m| m.signature.clone())
                .unwrap_or_default();
            Op::Call {
                function: function(runtime, fragment, method)?,
                instance: signature.instance,
                arity: signature.parameters.len(),
                returns: signature.return_type.is_some(),
            }
        }
        Instruction::LoadMethodPointer(method) => {
            Op::MethodPointer(function(runtime, fragment, method)?)
        }
        Instruction::NewDelegate => Op::NewDelegate,
        Instruction::Return => Op::Return,
    })
}

enum Slot<'a> {
    Value(Value),
    Ref(&'a Value),
    ByRef(&'a mut Object),
    Address(ManagedPtr<'a>),
    Function(FunctionPointer),
    Delegate(BoundDelegate),
}

impl<'a> From<Argument<'a>> for Slot<'a> {
    fn from(argument: Argument<'a>) -> Self {
        match argument {
            Argument::Value(v) => Slot::Value(v),
            Argument::Ref(v) => Slot::Ref(v),
            Argument::ByRef(o) => Slot::ByRef(o),
        }
    }
}

impl Program {
    fn invalid(&self, reason: impl Into<String>) -> ExecutionError {
        ExecutionError::InvalidProgram {
            fragment: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn pop<'a>(&self, stack: &mut Vec<Slot<'a>>) -> Result<Slot<'a>, ExecutionError> {
        stack.pop().ok_or_else(|| self.invalid("stack underflow"))
    }

    fn pop_value(&self, stack: &mut Vec<Slot<'_>>) -> Result<Value, ExecutionError> {
        match self.pop(stack)? {
            Slot::Value(v) => Ok(v),
            Slot::Ref(v) => Ok(v.clone()),
            Slot::Address(p) => Ok((*p).clone()),
            _ => Err(self.invalid("expected a value on the stack")),
        }
    }

    fn cast<'a>(&self, slot: Slot<'a>, target: TypeDescription, name: &str) -> Result<Slot<'a>, ExecutionError> {
        let value = match &slot {
            Slot::Value(v) => v,
            Slot::Ref(v) => *v,
            _ => return Err(self.invalid("castclass of a non-reference")),
        };
        if value.is_null() {
            return Ok(slot);
        }
        let metadata = self.metadata.as_ref();
        if TypeComparer::new(metadata).is_instance_of(value, target) {
            return Ok(slot);
        }
        Err(ExecutionError::InvalidCast {
            expected: name.to_string(),
            actual: value
                .runtime_type(metadata)
                .map_or_else(|| "null".to_string(), |t| metadata.type_name(t)),
        })
    }

    fn struct_copy<'a>(&self, argument: Argument<'a>) -> Result<Slot<'a>, ExecutionError> {
        let boxed = match &argument {
            Argument::Value(Value::Object(o)) => o,
            Argument::Ref(Value::Object(o)) => o,
            _ => return Ok(argument.into()),
        };
        let copy = boxed
            .snapshot()
            .map_err(|e| e.into_execution(self.metadata.type_name(boxed.description()), 0))?;
        Ok(Slot::Value(Value::Struct(copy)))
    }

    fn field_address<'a>(&self, slot: Slot<'a>, index: usize, owner: &str) -> Result<ManagedPtr<'a>, ExecutionError> {
        let out_of_range = || ExecutionError::InvalidSlot {
            type_name: owner.to_string(),
            slot: index,
        };
        match slot {
            Slot::Ref(Value::Object(o)) => o
                .slot_mut(index)
                .map(ManagedPtr::Locked)
                .map_err(|e| e.into_execution(owner.to_string(), index)),
            Slot::ByRef(object) => object
                .slot_mut(index)
                .map(ManagedPtr::Interior)
                .ok_or_else(out_of_range),
            Slot::Address(ManagedPtr::Interior(Value::Struct(object))) => object
                .slot_mut(index)
                .map(ManagedPtr::Interior)
                .ok_or_else(out_of_range),
            Slot::Address(ManagedPtr::Locked(guard)) => {
                MappedRwLockWriteGuard::try_map(guard, |v| match v {
                    Value::Struct(object) => object.slot_mut(index),
                    _ => None,
                })
                .map(ManagedPtr::Locked)
                .map_err(|_| out_of_range())
            }
            Slot::Ref(Value::Null) | Slot::Value(Value::Null) => Err(ExecutionError::NullReference),
            Slot::Value(_) => Err(self.invalid("field address of a receiver passed by value")),
            _ => Err(self.invalid("ldflda needs an object reference or a struct address")),
        }
    }

    fn call(
        &self,
        stack: &mut Vec<Slot<'_>>,
        function: &FunctionPointer,
        instance: bool,
        arity: usize,
    ) -> Result<Value, ExecutionError> {
        let mut arguments = Vec::with_capacity(arity);
        for _ in 0..arity {
            arguments.push(self.pop_value(stack)?);
        }
        arguments.reverse();
        let metadata = self.metadata.as_ref();
        if !instance {
            return call_native(metadata, function, None, &arguments);
        }
        match self.pop(stack)? {
            Slot::Value(v) => call_native(metadata, function, Some(Argument::Value(v)), &arguments),
            Slot::Ref(v) => call_native(metadata, function, Some(Argument::Ref(v)), &arguments),
            Slot::ByRef(o) => call_native(metadata, function, Some(Argument::ByRef(o)), &arguments),
            Slot::Address(mut pointer) => match &mut *pointer {
                Value::Struct(object) => (function.body)(This::Value(object), &arguments),
                other => call_on_value(metadata, function, other, &arguments),
            },
            _ => Err(self.invalid("call receiver must be a value or an address")),
        }
    }

    fn finish<'a>(&self, mut stack: Vec<Slot<'a>>) -> Result<Returned<'a>, ExecutionError> {
        let returned = match self.return_type {
            FragmentReturn::Void => Returned::Void,
            FragmentReturn::Value(_) => Returned::Value(self.pop_value(&mut stack)?),
            FragmentReturn::ByRef(_) => match self.pop(&mut stack)? {
                Slot::Address(p) => Returned::Address(p),
                _ => return Err(self.invalid("ret expects an address")),
            },
            FragmentReturn::Delegate => match self.pop(&mut stack)? {
                Slot::Delegate(d) => Returned::Delegate(d),
                _ => return Err(self.invalid("ret expects a delegate")),
            },
        };
        if !stack.is_empty() {
            return Err(self.invalid("stack is not empty at ret"));
        }
        Ok(returned)
    }
}

impl Executable for Program {
    fn execute<'a>(&'a self, arguments: Vec<Argument<'a>>) -> Result<Returned<'a>, ExecutionError> {
        let mut arguments: Vec<Option<Argument<'a>>> = arguments.into_iter().map(Some).collect();
        let mut stack: Vec<Slot<'a>> = vec![];
        for op in &self.code {
            match op {
                Op::LoadArgument(i) => {
                    let argument = arguments
                        .get_mut(*i)
                        .and_then(Option::take)
                        .ok_or_else(|| self.invalid(format!("argument {i} is not available")))?;
                    stack.push(argument.into());
                }
                Op::LoadStructCopy(i) => {
                    let argument = arguments
                        .get_mut(*i)
                        .and_then(Option::take)
                        .ok_or_else(|| self.invalid(format!("argument {i} is not available")))?;
                    stack.push(self.struct_copy(argument)?);
                }
                Op::CastClass { target, name } => {
                    let slot = self.pop(&mut stack)?;
                    stack.push(self.cast(slot, *target, name)?);
                }
                Op::FieldAddress { slot, owner } => {
                    let receiver = self.pop(&mut stack)?;
                    stack.push(Slot::Address(self.field_address(receiver, *slot, owner)?));
                }
                Op::StaticAddress { storage, slot } => {
                    let pointer = storage
                        .slot_mut(*slot)
                        .map_err(|e| e.into_execution(self.metadata.type_name(storage.description()), *slot))?;
                    stack.push(Slot::Address(ManagedPtr::Locked(pointer)));
                }
                Op::Call {
                    function,
                    instance,
                    arity,
                    returns,
                } => {
                    let result = self.call(&mut stack, function, *instance, *arity)?;
                    if *returns {
                        stack.push(Slot::Value(result));
                    }
                }
                Op::MethodPointer(function) => stack.push(Slot::Function(function.clone())),
                Op::NewDelegate => {
                    let Slot::Function(function) = self.pop(&mut stack)? else {
                        return Err(self.invalid("delegate construction needs a method pointer"));
                    };
                    let target = self.pop_value(&mut stack)?;
                    stack.push(Slot::Delegate(BoundDelegate {
                        target,
                        function,
                        metadata: Arc::clone(&self.metadata),
                    }));
                }
                Op::Return => return self.finish(stack),
            }
        }
        Err(self.invalid("fragment ended without ret"))
    }
}
