mod common;

use common::{Zoo, zoo};
use dotnet_access::{
    AccessSpec,
    codegen::Unavailable,
    error::{AccessError, ExecutionError, GenerationError, IncompatibleType},
    value::Value,
};

#[test]
fn inherited_field_through_derived_receiver() {
    let (zoo, runtime) = zoo();
    let accessor = runtime
        .field_ref_access(AccessSpec::new(zoo.derived, zoo.int), "count")
        .unwrap();
    let count = Zoo::field(&runtime, zoo.base, "count");
    assert_eq!(accessor.field(), count);

    let instance = runtime.create_instance(zoo.derived).unwrap();
    *accessor.get(&instance).unwrap() = Value::Int32(41);
    assert_eq!(runtime.get_field_value(count, Some(&instance)), Ok(Value::Int32(41)));

    let mut receiver = instance.clone();
    runtime
        .set_field_value(count, Some(&mut receiver), Value::Int32(42))
        .unwrap();
    assert_eq!(accessor.read(&instance), Ok(Value::Int32(42)));
}

#[test]
fn object_receiver_inserts_a_cast() {
    let (zoo, runtime) = zoo();
    let label = Zoo::field(&runtime, zoo.derived, "label");
    let accessor = runtime
        .field_ref_access_for(AccessSpec::new(zoo.object, zoo.string), label)
        .unwrap();

    let derived = runtime.create_instance(zoo.derived).unwrap();
    accessor.write(&runtime, &derived, Value::from("hello")).unwrap();
    assert_eq!(runtime.get_field_value(label, Some(&derived)), Ok(Value::from("hello")));

    let other = runtime.create_instance(zoo.other).unwrap();
    assert!(matches!(
        accessor.get(&other),
        Err(ExecutionError::InvalidCast { .. })
    ));
    // the unrelated instance was not touched
    assert_eq!(other.as_object().unwrap().get(0), Some(Value::Int32(0)));

    let by_name = runtime
        .field_ref_access_in(zoo.derived, "label", zoo.object)
        .unwrap();
    assert_eq!(by_name.read(&derived), Ok(Value::from("hello")));
    assert!(matches!(
        by_name.read(&other),
        Err(ExecutionError::InvalidCast { .. })
    ));
}

#[test]
fn unrelated_receiver_is_rejected_up_front() {
    let (zoo, runtime) = zoo();
    let label = Zoo::field(&runtime, zoo.derived, "label");
    let err = runtime
        .field_ref_access_for(AccessSpec::new(zoo.other, zoo.string), label)
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Incompatible {
            source: IncompatibleType::UnrelatedReceiver { .. },
            ..
        }
    ));
}

#[test]
fn enum_fields_accept_their_underlying_type() {
    let (zoo, runtime) = zoo();
    let as_enum = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.color), "color")
        .unwrap();
    let as_int = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.int), "color")
        .unwrap();
    let instance = runtime.create_instance(zoo.base).unwrap();
    *as_enum.get(&instance).unwrap() = Value::Int32(3);
    assert_eq!(as_int.read(&instance), Ok(Value::Int32(3)));

    let err = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.long), "color")
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Incompatible {
            source: IncompatibleType::EnumField { .. },
            ..
        }
    ));
}

#[test]
fn value_fields_need_the_exact_type() {
    let (zoo, runtime) = zoo();
    for requested in [zoo.long, zoo.object, zoo.color] {
        let err = runtime
            .field_ref_access(AccessSpec::new(zoo.base, requested), "count")
            .unwrap_err();
        assert!(
            matches!(
                err,
                AccessError::Incompatible {
                    source: IncompatibleType::ValueField { .. },
                    ..
                }
            ),
            "{err}"
        );
    }
    // reference fields may widen
    assert!(runtime
        .field_ref_access(AccessSpec::new(zoo.derived, zoo.object), "label")
        .is_ok());
}

#[test]
fn struct_fields_are_written_in_place() {
    let (zoo, runtime) = zoo();
    let accessor = runtime
        .struct_field_ref_access(AccessSpec::new(zoo.counter, zoo.int), "value")
        .unwrap();
    let mut point = runtime.new_struct(zoo.counter);
    *accessor.get(&mut point).unwrap() = Value::Int32(9);
    assert_eq!(point.slot(0), Some(&Value::Int32(9)));

    // class-style accessors refuse struct receivers
    assert!(matches!(
        runtime.field_ref_access(AccessSpec::new(zoo.counter, zoo.int), "value"),
        Err(AccessError::Incompatible {
            source: IncompatibleType::ValueTypeReceiver { .. },
            ..
        })
    ));
    assert!(matches!(
        runtime.field_ref_access_in(zoo.counter, "value", zoo.int),
        Err(AccessError::StructInstanceField { .. })
    ));
    assert!(matches!(
        runtime.struct_field_ref_access(AccessSpec::new(zoo.base, zoo.int), "count"),
        Err(AccessError::NotAStruct { .. })
    ));
}

#[test]
fn static_fields_share_storage() {
    let (zoo, runtime) = zoo();
    let accessor = runtime
        .static_field_ref_access(zoo.derived, "instances", zoo.int)
        .unwrap();
    *accessor.get().unwrap() = Value::Int32(5);

    let field = Zoo::field(&runtime, zoo.base, "instances");
    assert_eq!(runtime.get_field_value(field, None), Ok(Value::Int32(5)));
    let again = runtime.static_field_ref_access_for(field, zoo.int).unwrap();
    assert_eq!(again.read(), Ok(Value::Int32(5)));

    assert!(matches!(
        runtime.static_field_ref_access(zoo.base, "count", zoo.int),
        Err(AccessError::InstanceField { .. })
    ));
    assert!(matches!(
        runtime.field_ref_access(AccessSpec::new(zoo.base, zoo.int), "instances"),
        Err(AccessError::StaticField { .. })
    ));
}

#[test]
fn two_fields_of_one_object_can_be_held_together() {
    let (zoo, runtime) = zoo();
    let count = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.int), "count")
        .unwrap();
    let color = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.int), "color")
        .unwrap();
    let instance = runtime.create_instance(zoo.base).unwrap();
    count.write(&runtime, &instance, Value::Int32(1)).unwrap();
    color.write(&runtime, &instance, Value::Int32(2)).unwrap();

    {
        let mut a = count.get(&instance).unwrap();
        let mut b = color.get(&instance).unwrap();
        std::mem::swap(&mut *a, &mut *b);

        // the same field cannot be taken twice while it is held
        assert!(matches!(
            count.get(&instance),
            Err(ExecutionError::SlotBorrowed { slot: 0, .. })
        ));
        let field = Zoo::field(&runtime, zoo.base, "color");
        assert!(matches!(
            runtime.get_field_value(field, Some(&instance)),
            Err(ExecutionError::SlotBorrowed { .. })
        ));
    }
    assert_eq!(count.read(&instance), Ok(Value::Int32(2)));
    assert_eq!(color.read(&instance), Ok(Value::Int32(1)));
}

#[test]
fn held_static_fields_fail_fast() {
    let (zoo, runtime) = zoo();
    let accessor = runtime
        .static_field_ref_access(zoo.base, "instances", zoo.int)
        .unwrap();
    let field = Zoo::field(&runtime, zoo.base, "instances");

    let mut held = accessor.get().unwrap();
    *held = Value::Int32(3);
    assert!(matches!(
        accessor.read(),
        Err(ExecutionError::SlotBorrowed { .. })
    ));
    assert!(matches!(
        runtime.set_field_value(field, None, Value::Int32(4)),
        Err(ExecutionError::SlotBorrowed { .. })
    ));
    // instance fields of the same type are unaffected
    let instance = runtime.create_instance(zoo.base).unwrap();
    let count = Zoo::field(&runtime, zoo.base, "count");
    assert_eq!(runtime.get_field_value(count, Some(&instance)), Ok(Value::Int32(0)));
    drop(held);

    assert_eq!(accessor.read(), Ok(Value::Int32(3)));
}

#[test]
fn missing_fields_are_reported() {
    let (zoo, runtime) = zoo();
    let err = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.int), "nope")
        .unwrap_err();
    assert!(matches!(err, AccessError::MissingField { .. }));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn backend_failures_surface_as_generation_errors() {
    let mut zoo = Zoo::new();
    let runtime = zoo.runtime().with_backend(Unavailable {
        reason: "no dynamic code".into(),
    });
    let err = runtime
        .field_ref_access(AccessSpec::new(zoo.base, zoo.int), "count")
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::Generation(GenerationError::Unsupported { .. })
    ));
    // validation still runs first
    assert!(matches!(
        runtime.field_ref_access(AccessSpec::new(zoo.base, zoo.long), "count"),
        Err(AccessError::Incompatible { .. })
    ));
}
