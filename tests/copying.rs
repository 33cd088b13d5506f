mod common;

use common::{Zoo, zoo};
use dotnet_access::{
    Runtime,
    copy::DeepCopier,
    types::members::ParameterType,
    value::Value,
};

fn holder_with_items(zoo: &Zoo, runtime: &Runtime, items: &[i32]) -> Value {
    let mut bag = runtime.create_instance(zoo.bag).unwrap();
    let add = runtime
        .resolver()
        .declared_method(zoo.bag, "Add", Some(&[ParameterType::Value(zoo.int)]), None)
        .unwrap()
        .unwrap();
    for &item in items {
        runtime.invoke(&add, Some(&mut bag), &[Value::Int32(item)]).unwrap();
    }

    let mut point = runtime.new_struct(zoo.counter);
    *point.slot_mut(0).unwrap() = Value::Int32(7);

    let mut holder = runtime.create_instance(zoo.holder).unwrap();
    for (name, value) in [
        ("name", Value::from("crate")),
        ("bag", bag),
        ("point", Value::Struct(point)),
    ] {
        let field = Zoo::field(runtime, zoo.holder, name);
        runtime.set_field_value(field, Some(&mut holder), value).unwrap();
    }
    holder
}

fn items_of(zoo: &Zoo, runtime: &Runtime, bag: &Value) -> Vec<Value> {
    let to_array = Zoo::method(runtime, zoo.bag, "ToArray");
    let mut receiver = bag.clone();
    match runtime.invoke(&to_array, Some(&mut receiver), &[]).unwrap() {
        Value::Array(items) => items.to_vec(),
        other => panic!("ToArray returned {other:?}"),
    }
}

#[test]
fn collections_are_rebuilt_through_add() {
    let (zoo, runtime) = zoo();
    let source = holder_with_items(&zoo, &runtime, &[1, 2, 3]);
    let copy = runtime.deep_copy(&source, zoo.holder).unwrap();

    let field = |name| Zoo::field(&runtime, zoo.holder, name);
    let source_bag = runtime.get_field_value(field("bag"), Some(&source)).unwrap();
    let copied_bag = runtime.get_field_value(field("bag"), Some(&copy)).unwrap();
    assert!(!source_bag
        .as_object()
        .unwrap()
        .ptr_eq(copied_bag.as_object().unwrap()));
    assert_eq!(
        items_of(&zoo, &runtime, &copied_bag),
        vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]
    );
    assert_eq!(runtime.append_strategies().len(), 1);

    assert_eq!(runtime.get_field_value(field("name"), Some(&copy)), Ok(Value::from("crate")));
    assert_eq!(runtime.get_field_value(field("child"), Some(&copy)), Ok(Value::Null));
    let Ok(Value::Struct(point)) = runtime.get_field_value(field("point"), Some(&copy)) else {
        panic!("point was not copied as a struct");
    };
    assert_eq!(point.slot(0), Some(&Value::Int32(7)));
}

#[test]
fn copies_do_not_alias_the_source() {
    let (zoo, runtime) = zoo();
    let source = holder_with_items(&zoo, &runtime, &[4]);
    let copy = runtime.deep_copy(&source, zoo.holder).unwrap();
    assert!(!source.as_object().unwrap().ptr_eq(copy.as_object().unwrap()));

    let name = Zoo::field(&runtime, zoo.holder, "name");
    let mut changed = copy.clone();
    runtime
        .set_field_value(name, Some(&mut changed), Value::from("changed"))
        .unwrap();
    assert_eq!(runtime.get_field_value(name, Some(&source)), Ok(Value::from("crate")));
}

#[test]
fn processor_sees_dotted_paths() {
    let (zoo, runtime) = zoo();
    let source = holder_with_items(&zoo, &runtime, &[5, 6]);
    let seen = parking_lot::Mutex::new(vec![]);
    let processor = |path: &str, value: &Value| {
        seen.lock().push(path.to_string());
        match (path, value) {
            ("root.point.value", Value::Int32(v)) => Value::Int32(v * 10),
            _ => value.clone(),
        }
    };
    let copy = DeepCopier::new(&runtime)
        .with_processor(&processor)
        .with_path_root("root")
        .copy(&source, zoo.holder)
        .unwrap();

    let point = Zoo::field(&runtime, zoo.holder, "point");
    let Ok(Value::Struct(point)) = runtime.get_field_value(point, Some(&copy)) else {
        panic!("point was not copied as a struct");
    };
    assert_eq!(point.slot(0), Some(&Value::Int32(70)));
    let seen = seen.into_inner();
    assert!(seen.contains(&"root.name".to_string()));
    assert!(seen.contains(&"root.bag".to_string()));
}

#[test]
fn object_targets_keep_the_source_type() {
    let (zoo, runtime) = zoo();
    let source = holder_with_items(&zoo, &runtime, &[]);
    let copy = runtime.deep_copy(&source, zoo.object).unwrap();
    assert_eq!(copy.as_object().unwrap().description(), zoo.holder);
    assert_eq!(runtime.deep_copy(&Value::Null, zoo.holder), Ok(Value::Null));
}
