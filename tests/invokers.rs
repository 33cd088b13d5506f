mod common;

use common::{Zoo, zoo};
use dotnet_access::{
    DelegateSignature, Invoke, Invoker,
    codegen::Argument,
    error::{BindError, ExecutionError},
    types::members::ParameterType,
    value::Value,
};

fn speaks(zoo: &Zoo) -> DelegateSignature {
    DelegateSignature::new(vec![], Some(ParameterType::Value(zoo.string)))
}

#[test]
fn closed_virtual_interface_calls_dispatch_per_receiver() {
    let (zoo, runtime) = zoo();
    let speak = Zoo::method(&runtime, zoo.animal, "Speak");
    for (ty, sound) in [(zoo.dog, "woof"), (zoo.cat, "meow"), (zoo.puppy, "yip")] {
        let instance = runtime.create_instance(ty).unwrap();
        let invoker = runtime
            .method_delegate(&speak, &speaks(&zoo), Some(instance), true)
            .unwrap();
        assert!(matches!(invoker, Invoker::BoundInvoker(_)));
        assert_eq!(invoker.invoke_values(vec![]), Ok(Value::from(sound)));
    }
}

#[test]
fn closed_non_virtual_calls_the_exact_method() {
    let (zoo, runtime) = zoo();
    let speak = Zoo::method(&runtime, zoo.dog, "Speak");
    let puppy = runtime.create_instance(zoo.puppy).unwrap();
    let invoker = runtime
        .method_delegate(&speak, &speaks(&zoo), Some(puppy.clone()), false)
        .unwrap();
    assert_eq!(invoker.invoke_values(vec![]), Ok(Value::from("woof")));

    let virtual_invoker = runtime
        .method_delegate(&speak, &speaks(&zoo), Some(puppy), true)
        .unwrap();
    assert_eq!(virtual_invoker.invoke_values(vec![]), Ok(Value::from("yip")));
}

#[test]
fn closed_bindings_check_the_receiver() {
    let (zoo, runtime) = zoo();
    let speak = Zoo::method(&runtime, zoo.dog, "Speak");
    let cat = runtime.create_instance(zoo.cat).unwrap();
    assert!(matches!(
        runtime.method_delegate(&speak, &speaks(&zoo), Some(cat.clone()), false),
        Err(BindError::ReceiverMismatch { .. })
    ));

    let interface_speak = Zoo::method(&runtime, zoo.animal, "Speak");
    let err = runtime
        .method_delegate(&interface_speak, &speaks(&zoo), Some(cat), false)
        .unwrap_err();
    assert!(matches!(err, BindError::InterfaceRequiresVirtual { .. }));
    assert!(err.to_string().starts_with("Interface methods must be called virtually"));
}

#[test]
fn open_bindings_take_the_receiver_first() {
    let (zoo, runtime) = zoo();
    let describe = Zoo::method(&runtime, zoo.base, "Describe");
    let signature = DelegateSignature::new(
        vec![ParameterType::Value(zoo.base)],
        Some(ParameterType::Value(zoo.string)),
    );
    let derived = runtime.create_instance(zoo.derived).unwrap();

    let exact = runtime
        .method_delegate(&describe, &signature, None, false)
        .unwrap();
    assert!(matches!(exact, Invoker::DirectInvoker(_)));
    assert_eq!(exact.invoke_values(vec![derived.clone()]), Ok(Value::from("base")));

    let dispatching = runtime
        .method_delegate(&describe, &signature, None, true)
        .unwrap();
    assert!(matches!(dispatching, Invoker::VirtualInvoker(_)));
    assert_eq!(
        dispatching.invoke_values(vec![derived.clone()]),
        Ok(Value::from("derived"))
    );

    // the receiver must still fit the delegate's first parameter
    let other = runtime.create_instance(zoo.other).unwrap();
    assert!(matches!(
        exact.invoke_values(vec![other]),
        Err(ExecutionError::ArgumentType { index: 0, .. })
    ));
    assert!(matches!(
        exact.invoke_values(vec![Value::Null]),
        Err(ExecutionError::NullReference)
    ));
}

#[test]
fn delegate_types_must_fit_the_method() {
    let (zoo, runtime) = zoo();
    let describe = Zoo::method(&runtime, zoo.base, "Describe");
    let base = runtime.create_instance(zoo.base).unwrap();

    let wrong_return = DelegateSignature::new(vec![], Some(ParameterType::Value(zoo.int)));
    let err = runtime
        .method_delegate(&describe, &wrong_return, Some(base.clone()), true)
        .unwrap_err();
    assert!(matches!(err, BindError::InvalidSignature { .. }));
    assert!(err.to_string().starts_with("Invalid delegate type for"));

    // widening the return type to object is allowed
    let widened = DelegateSignature::new(vec![], Some(ParameterType::Value(zoo.object)));
    assert!(runtime.method_delegate(&describe, &widened, Some(base), true).is_ok());

    let unrelated_receiver = DelegateSignature::new(
        vec![ParameterType::Value(zoo.other)],
        Some(ParameterType::Value(zoo.string)),
    );
    assert!(matches!(
        runtime.method_delegate(&describe, &unrelated_receiver, None, false),
        Err(BindError::InvalidSignature { .. })
    ));
}

#[test]
fn struct_receivers_bind_their_own_implementation() {
    let (zoo, runtime) = zoo();
    let increment = Zoo::method(&runtime, zoo.counter_interface, "Increment");
    let signature = DelegateSignature::new(
        vec![ParameterType::Ref(zoo.counter)],
        Some(ParameterType::Value(zoo.int)),
    );
    let invoker = runtime
        .method_delegate(&increment, &signature, None, false)
        .unwrap();
    let own = Zoo::method(&runtime, zoo.counter, "Increment");
    assert_eq!(invoker.method(), &own);

    let mut counter = runtime.new_struct(zoo.counter);
    assert_eq!(
        invoker.invoke(vec![Argument::ByRef(&mut counter)]),
        Ok(Value::Int32(1))
    );
    assert_eq!(
        invoker.invoke(vec![Argument::ByRef(&mut counter)]),
        Ok(Value::Int32(2))
    );
    assert_eq!(counter.slot(0), Some(&Value::Int32(2)));
}

#[test]
fn closed_struct_receivers_are_boxed_once() {
    let (zoo, runtime) = zoo();
    let increment = Zoo::method(&runtime, zoo.counter_interface, "Increment");
    let signature = DelegateSignature::new(vec![], Some(ParameterType::Value(zoo.int)));
    let counter = Value::Struct(runtime.new_struct(zoo.counter));
    let invoker = runtime
        .method_delegate(&increment, &signature, Some(counter.clone()), true)
        .unwrap();
    assert_eq!(invoker.invoke_values(vec![]), Ok(Value::Int32(1)));
    assert_eq!(invoker.invoke_values(vec![]), Ok(Value::Int32(2)));

    // the caller's struct is a separate copy
    let Value::Struct(original) = counter else {
        unreachable!()
    };
    assert_eq!(original.slot(0), Some(&Value::Int32(0)));
    let Invoker::BoundInvoker(bound) = &invoker else {
        panic!("expected a bound invoker, got {invoker:?}");
    };
    assert_eq!(bound.target().as_object().unwrap().get(0), Some(Value::Int32(2)));
}

#[test]
fn void_methods_return_null() {
    let (zoo, runtime) = zoo();
    let run = runtime
        .resolver()
        .declared_method(zoo.overloads, "Run", Some(&[ParameterType::Value(zoo.int)]), None)
        .unwrap()
        .unwrap();
    let signature = DelegateSignature::new(
        vec![ParameterType::Value(zoo.overloads), ParameterType::Value(zoo.int)],
        None,
    );
    let invoker = runtime.method_delegate(&run, &signature, None, false).unwrap();
    let target = runtime.create_instance(zoo.overloads).unwrap();
    assert_eq!(invoker.invoke_values(vec![target.clone(), Value::Int32(3)]), Ok(Value::Null));
    assert!(matches!(
        invoker.invoke_values(vec![target]),
        Err(ExecutionError::ArgumentCount { expected: 2, actual: 1, .. })
    ));
}

#[test]
fn methods_without_bodies_cannot_be_bound() {
    let (zoo, runtime) = zoo();
    let go = runtime
        .resolver()
        .declared_method(zoo.ambiguous, "Go", Some(&[ParameterType::Value(zoo.int)]), None)
        .unwrap()
        .unwrap();
    let instance = runtime.create_instance(zoo.ambiguous).unwrap();
    let signature = DelegateSignature::new(vec![ParameterType::Value(zoo.int)], None);
    assert!(matches!(
        runtime.method_delegate(&go, &signature, Some(instance), true),
        Err(BindError::MissingBody { .. })
    ));
}

#[test]
fn boxed_structs_passed_by_value_are_copied() {
    let (zoo, runtime) = zoo();
    let increment = Zoo::method(&runtime, zoo.counter, "Increment");
    let signature = DelegateSignature::new(
        vec![ParameterType::Value(zoo.counter)],
        Some(ParameterType::Value(zoo.int)),
    );
    let invoker = runtime
        .method_delegate(&increment, &signature, None, false)
        .unwrap();
    assert!(matches!(invoker, Invoker::DirectInvoker(_)));

    let boxed = runtime.box_value(Value::Struct(runtime.new_struct(zoo.counter)));
    assert_eq!(invoker.invoke_values(vec![boxed.clone()]), Ok(Value::Int32(1)));
    assert_eq!(invoker.invoke_values(vec![boxed.clone()]), Ok(Value::Int32(1)));
    assert_eq!(boxed.as_object().unwrap().get(0), Some(Value::Int32(0)));
}

#[test]
fn class_methods_bind_through_an_interface_receiver() {
    let (zoo, runtime) = zoo();
    let speak = Zoo::method(&runtime, zoo.dog, "Speak");
    let signature = DelegateSignature::new(
        vec![ParameterType::Value(zoo.animal)],
        Some(ParameterType::Value(zoo.string)),
    );
    let invoker = runtime
        .method_delegate(&speak, &signature, None, true)
        .unwrap();
    for (ty, sound) in [(zoo.puppy, "yip"), (zoo.cat, "meow"), (zoo.dog, "woof")] {
        let instance = runtime.create_instance(ty).unwrap();
        assert_eq!(invoker.invoke_values(vec![instance]), Ok(Value::from(sound)));
    }

    // Base does not implement IAnimal, so there is nothing to remap to
    let describe = Zoo::method(&runtime, zoo.base, "Describe");
    assert!(matches!(
        runtime.method_delegate(&describe, &signature, None, true),
        Err(BindError::NoInterfaceMapping { .. })
    ));
}

#[test]
fn virtual_targets_are_resolved_once_per_receiver_type() {
    let (zoo, runtime) = zoo();
    let describe = Zoo::method(&runtime, zoo.base, "Describe");
    let signature = DelegateSignature::new(
        vec![ParameterType::Value(zoo.base)],
        Some(ParameterType::Value(zoo.string)),
    );
    let invoker = runtime
        .method_delegate(&describe, &signature, None, true)
        .unwrap();
    let Invoker::VirtualInvoker(dispatching) = &invoker else {
        panic!("expected a virtual invoker, got {invoker:?}");
    };
    assert_eq!(dispatching.dispatched_types(), 0);

    let base = runtime.create_instance(zoo.base).unwrap();
    let derived = runtime.create_instance(zoo.derived).unwrap();
    for _ in 0..2 {
        assert_eq!(invoker.invoke_values(vec![derived.clone()]), Ok(Value::from("derived")));
    }
    assert_eq!(dispatching.dispatched_types(), 1);
    assert_eq!(invoker.invoke_values(vec![base]), Ok(Value::from("base")));
    assert_eq!(invoker.invoke_values(vec![derived]), Ok(Value::from("derived")));
    assert_eq!(dispatching.dispatched_types(), 2);
}

#[test]
fn closed_non_virtual_struct_bindings_keep_their_box() {
    let (zoo, runtime) = zoo();
    let increment = Zoo::method(&runtime, zoo.counter, "Increment");
    let signature = DelegateSignature::new(vec![], Some(ParameterType::Value(zoo.int)));
    let counter = Value::Struct(runtime.new_struct(zoo.counter));
    let invoker = runtime
        .method_delegate(&increment, &signature, Some(counter), false)
        .unwrap();
    assert_eq!(invoker.invoke_values(vec![]), Ok(Value::Int32(1)));
    assert_eq!(invoker.invoke_values(vec![]), Ok(Value::Int32(2)));
}
