//! Stack-shape verification of fragments before they are lowered.
use crate::{
    codegen::{Fragment, FragmentReturn, Instruction},
    error::GenerationError,
    types::{
        MetadataExt, MetadataProvider, TypeDescription,
        members::ParameterType,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Value(TypeDescription),
    Address(TypeDescription),
    Function,
    Delegate,
}

struct Verifier<'f> {
    metadata: &'f dyn MetadataProvider,
    fragment: &'f Fragment,
    stack: Vec<Shape>,
    loaded: Vec<bool>,
    offset: usize,
}

impl Verifier<'_> {
    fn fail(&self, reason: impl Into<String>) -> GenerationError {
        GenerationError::InvalidFragment {
            fragment: self.fragment.name.clone(),
            offset: self.offset,
            reason: reason.into(),
        }
    }

    fn pop(&mut self) -> Result<Shape, GenerationError> {
        self.stack.pop().ok_or_else(|| self.fail("stack underflow"))
    }

    fn argument(&mut self, index: u16) -> Result<ParameterType, GenerationError> {
        let index = index as usize;
        let Some(&parameter) = self.fragment.parameters.get(index) else {
            return Err(self.fail(format!("argument {index} is out of range")));
        };
        if std::mem::replace(&mut self.loaded[index], true) {
            return Err(self.fail(format!("argument {index} is loaded more than once")));
        }
        Ok(parameter)
    }

    fn step(&mut self, instruction: &Instruction) -> Result<(), GenerationError> {
        match instruction {
            Instruction::LoadArgument(index) => {
                let shape = match self.argument(*index)? {
                    ParameterType::Value(t) => Shape::Value(t),
                    ParameterType::Ref(t) => Shape::Address(t),
                };
                self.stack.push(shape);
            }
            Instruction::LoadArgumentAddress(index) => {
                let t = match self.argument(*index)? {
                    ParameterType::Value(t) if self.metadata.is_value_type(t) => t,
                    ParameterType::Ref(t) => t,
                    ParameterType::Value(_) => {
                        return Err(self.fail("ldarga needs a value type or by-ref argument"));
                    }
                };
                self.stack.push(Shape::Address(t));
            }
            Instruction::CastClass(target) => {
                if !matches!(self.pop()?, Shape::Value(_)) {
                    return Err(self.fail("castclass needs an object reference"));
                }
                if self.metadata.type_definition(*target).is_none()
                    || self.metadata.is_value_type(*target)
                {
                    return Err(self.fail("castclass target must be a reference type"));
                }
                self.stack.push(Shape::Value(*target));
            }
            Instruction::LoadFieldAddress(field) => {
                let Some((static_member, field_type)) = self
                    .metadata
                    .field_definition(*field)
                    .map(|f| (f.static_member, f.field_type))
                else {
                    return Err(self.fail("ldflda of an unknown field"));
                };
                if static_member {
                    return Err(self.fail("ldflda of a static field"));
                }
                if !matches!(self.pop()?, Shape::Value(_) | Shape::Address(_)) {
                    return Err(self.fail("ldflda needs an object reference or an address"));
                }
                self.stack.push(Shape::Address(field_type));
            }
            Instruction::LoadStaticFieldAddress(field) => {
                let Some((static_member, field_type)) = self
                    .metadata
                    .field_definition(*field)
                    .map(|f| (f.static_member, f.field_type))
                else {
                    return Err(self.fail("ldsflda of an unknown field"));
                };
                if !static_member {
                    return Err(self.fail("ldsflda of an instance field"));
                }
                self.stack.push(Shape::Address(field_type));
            }
            Instruction::Call(method) => {
                let Some(signature) = self
                    .metadata
                    .method_definition(method)
                    .map(|m| m.signature.clone())
                else {
                    return Err(self.fail("call of an unknown method"));
                };
                if signature.parameters.iter().any(ParameterType::is_by_ref) {
                    return Err(self.fail("call of a method with by-ref parameters"));
                }
                for _ in &signature.parameters {
                    if !matches!(self.pop()?, Shape::Value(_)) {
                        return Err(self.fail("call arguments must be values"));
                    }
                }
                if signature.instance {
                    match self.pop()? {
                        Shape::Value(_) | Shape::Address(_) => {}
                        _ => return Err(self.fail("call receiver must be a value or an address")),
                    }
                }
                if let Some(returned) = signature.return_type {
                    match returned {
                        ParameterType::Value(t) => self.stack.push(Shape::Value(t)),
                        ParameterType::Ref(_) => {
                            return Err(self.fail("call of a method returning by reference"));
                        }
                    }
                }
            }
            Instruction::LoadMethodPointer(method) => {
                if self.metadata.method_definition(method).is_none() {
                    return Err(self.fail("ldftn of an unknown method"));
                }
                self.stack.push(Shape::Function);
            }
            Instruction::NewDelegate => {
                if self.pop()? != Shape::Function {
                    return Err(self.fail("delegate construction needs a method pointer"));
                }
                if !matches!(self.pop()?, Shape::Value(_)) {
                    return Err(self.fail("delegate target must be an object reference"));
                }
                self.stack.push(Shape::Delegate);
            }
            Instruction::Return => {
                if self.offset + 1 != self.fragment.instructions.len() {
                    return Err(self.fail("ret must be the last instruction"));
                }
                let valid = match (self.fragment.return_type, self.stack.as_slice()) {
                    (FragmentReturn::Void, []) => true,
                    (FragmentReturn::Value(_), [Shape::Value(_)]) => true,
                    (FragmentReturn::ByRef(_), [Shape::Address(_)]) => true,
                    (FragmentReturn::Delegate, [Shape::Delegate]) => true,
                    _ => false,
                };
                if !valid {
                    return Err(self.fail(format!(
                        "stack {:?} does not match return type {:?}",
                        self.stack, self.fragment.return_type
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn verify(metadata: &dyn MetadataProvider, fragment: &Fragment) -> Result<(), GenerationError> {
    let mut verifier = Verifier {
        metadata,
        fragment,
        stack: vec![],
        loaded: vec![false; fragment.parameters.len()],
        offset: 0,
    };
    for (offset, instruction) in fragment.instructions.iter().enumerate() {
        verifier.offset = offset;
        verifier.step(instruction)?;
    }
    if fragment.instructions.last() != Some(&Instruction::Return) {
        verifier.offset = fragment.instructions.len();
        return Err(verifier.fail("fragment does not end with ret"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CoreType,
        members::FieldDescription,
        registry::{RegistryBuilder, TypeRegistry},
    };

    fn fixture() -> (TypeRegistry, TypeDescription, TypeDescription) {
        let mut builder = RegistryBuilder::new();
        let int = builder.core(CoreType::Int32);
        let dog = builder.class("Zoo.Dog");
        let point = builder.struct_type("Zoo.Point");
        builder.define(dog).field("age", int).static_field("count", int);
        builder.define(point).field("x", int);
        (builder.build(), dog, point)
    }

    #[test]
    fn accepts_class_field_address() {
        let (registry, dog, _) = fixture();
        let int = registry.core_type(CoreType::Int32);
        let mut fragment = Fragment::new(
            "age",
            vec![ParameterType::Value(dog)],
            FragmentReturn::ByRef(int),
        );
        fragment
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::LoadFieldAddress(FieldDescription { parent: dog, index: 0 }))
            .emit(Instruction::Return);
        assert_eq!(verify(&registry, &fragment), Ok(()));
    }

    #[test]
    fn rejects_static_field_through_ldflda() {
        let (registry, dog, _) = fixture();
        let int = registry.core_type(CoreType::Int32);
        let mut fragment = Fragment::new(
            "count",
            vec![ParameterType::Value(dog)],
            FragmentReturn::ByRef(int),
        );
        fragment
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::LoadFieldAddress(FieldDescription { parent: dog, index: 1 }))
            .emit(Instruction::Return);
        assert!(matches!(
            verify(&registry, &fragment),
            Err(GenerationError::InvalidFragment { offset: 1, .. })
        ));
    }

    #[test]
    fn rejects_mismatched_return_and_missing_ret() {
        let (registry, _, point) = fixture();
        let int = registry.core_type(CoreType::Int32);
        let mut fragment = Fragment::new(
            "x",
            vec![ParameterType::Ref(point)],
            FragmentReturn::Value(int),
        );
        fragment
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::LoadFieldAddress(FieldDescription { parent: point, index: 0 }));
        assert!(matches!(
            verify(&registry, &fragment),
            Err(GenerationError::InvalidFragment { offset: 2, .. })
        ));
        fragment.emit(Instruction::Return);
        assert!(matches!(
            verify(&registry, &fragment),
            Err(GenerationError::InvalidFragment { offset: 2, .. })
        ));
    }

    #[test]
    fn arguments_load_once() {
        let (registry, dog, _) = fixture();
        let mut fragment = Fragment::new(
            "twice",
            vec![ParameterType::Value(dog)],
            FragmentReturn::Value(dog),
        );
        fragment
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::LoadArgument(0))
            .emit(Instruction::Return);
        assert!(matches!(
            verify(&registry, &fragment),
            Err(GenerationError::InvalidFragment { offset: 1, .. })
        ));
    }
}
