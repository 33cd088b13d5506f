#![allow(dead_code)]

use dotnet_access::{
    Runtime,
    error::ExecutionError,
    types::{
        CoreType, TypeDescription,
        members::{FieldDescription, MethodDefinition, MethodDescription, MethodSignature, ParameterType},
        registry::RegistryBuilder,
    },
    value::{ArrayRef, Value},
};

/// A small type universe shared by the integration tests:
///
/// ```text
/// Demo.Base { count: int, color: Color, static instances: int, virtual Describe() }
/// Demo.Derived : Base { label: string, override Describe() }
/// Demo.Other { other: int }
/// Demo.IAnimal { Speak() }   Dog : IAnimal, Puppy : Dog, Cat : IAnimal
/// Demo.ICounter { Increment() }   struct Counter : ICounter { value: int }
/// Demo.Bag<int> { items: int[], Add(int), ToArray() }
/// Demo.Holder { name: string, bag: Bag, point: Counter, child: Holder }
/// ```
pub struct Zoo {
    pub int: TypeDescription,
    pub long: TypeDescription,
    pub string: TypeDescription,
    pub object: TypeDescription,
    pub color: TypeDescription,
    pub base: TypeDescription,
    pub derived: TypeDescription,
    pub other: TypeDescription,
    pub animal: TypeDescription,
    pub dog: TypeDescription,
    pub puppy: TypeDescription,
    pub cat: TypeDescription,
    pub counter_interface: TypeDescription,
    pub counter: TypeDescription,
    pub overloads: TypeDescription,
    pub ambiguous: TypeDescription,
    pub bag: TypeDescription,
    pub int_array: TypeDescription,
    pub holder: TypeDescription,
    builder: Option<RegistryBuilder>,
}

fn speak(string: TypeDescription, sound: &'static str) -> MethodDefinition {
    string_result("Speak", string, sound).virtual_member()
}

fn string_result(name: &str, string: TypeDescription, text: &'static str) -> MethodDefinition {
    MethodDefinition::new(
        name,
        MethodSignature::instance(vec![], Some(ParameterType::Value(string))),
    )
    .with_body(move |_, _| Ok(Value::from(text)))
}

impl Zoo {
    pub fn new() -> Self {
        let mut builder = RegistryBuilder::new();
        let int = builder.core(CoreType::Int32);
        let long = builder.core(CoreType::Int64);
        let string = builder.core(CoreType::String);
        let object = builder.core(CoreType::Object);
        let color = builder.enum_type("Demo.Color", CoreType::Int32);
        let base = builder.class("Demo.Base");
        let derived = builder.class("Demo.Derived");
        let other = builder.class("Demo.Other");
        let animal = builder.interface("Demo.IAnimal");
        let dog = builder.class("Demo.Dog");
        let puppy = builder.class("Demo.Puppy");
        let cat = builder.class("Demo.Cat");
        let counter_interface = builder.interface("Demo.ICounter");
        let counter = builder.struct_type("Demo.Counter");
        let overloads = builder.class("Demo.Overloads");
        let ambiguous = builder.class("Demo.Ambiguous");
        let bag = builder.class("Demo.Bag");
        let holder = builder.class("Demo.Holder");
        let int_array = builder.array_of(int);

        builder
            .define(base)
            .field("count", int)
            .field("color", color)
            .static_field("instances", int)
            .method(string_result("Describe", string, "base").virtual_member());
        builder
            .define(derived)
            .extends(base)
            .field("label", string)
            .method(string_result("Describe", string, "derived").virtual_member());
        builder.define(other).field("other", int);

        builder.define(animal).method(
            MethodDefinition::new(
                "Speak",
                MethodSignature::instance(vec![], Some(ParameterType::Value(string))),
            )
            .abstract_member(),
        );
        builder.define(dog).implements(animal).method(speak(string, "woof"));
        builder.define(puppy).extends(dog).method(speak(string, "yip"));
        builder.define(cat).implements(animal).method(speak(string, "meow"));

        builder.define(counter_interface).method(
            MethodDefinition::new(
                "Increment",
                MethodSignature::instance(vec![], Some(ParameterType::Value(int))),
            )
            .abstract_member(),
        );
        builder
            .define(counter)
            .implements(counter_interface)
            .field("value", int)
            .method(
                MethodDefinition::new(
                    "Increment",
                    MethodSignature::instance(vec![], Some(ParameterType::Value(int))),
                )
                .with_body(|mut this, _| {
                    let next = this.get(0)?.as_i64().unwrap_or_default() as i32 + 1;
                    this.set(0, Value::Int32(next))?;
                    Ok(Value::Int32(next))
                }),
            );

        let run = |parameters: Vec<ParameterType>| {
            MethodDefinition::new("Run", MethodSignature::instance(parameters, None))
                .with_body(|_, _| Ok(Value::Null))
        };
        builder
            .define(overloads)
            .method(run(vec![ParameterType::Value(int)]))
            .method(run(vec![]))
            .method(run(vec![ParameterType::Value(string)]));
        builder
            .define(ambiguous)
            .method(MethodDefinition::new(
                "Go",
                MethodSignature::instance(vec![ParameterType::Value(int)], None),
            ))
            .method(MethodDefinition::new(
                "Go",
                MethodSignature::instance(vec![ParameterType::Value(string)], None),
            ));

        builder
            .define(bag)
            .generic_arguments(&[int])
            .field("items", int_array)
            .method(
                MethodDefinition::new(
                    "Add",
                    MethodSignature::instance(vec![ParameterType::Value(int)], None),
                )
                .with_body(move |mut this, args| {
                    let mut items = match this.get(0)? {
                        Value::Array(items) => items.to_vec(),
                        _ => vec![],
                    };
                    items.extend_from_slice(args);
                    this.set(0, Value::Array(ArrayRef::new(int_array, int, items)))?;
                    Ok(Value::Null)
                }),
            )
            .method(
                MethodDefinition::new(
                    "ToArray",
                    MethodSignature::instance(vec![], Some(ParameterType::Value(int_array))),
                )
                .with_body(move |this, _| {
                    let items = match this.get(0)? {
                        Value::Array(items) => items.to_vec(),
                        Value::Null => vec![],
                        other => return Err(ExecutionError::Native(format!("corrupt bag {other:?}"))),
                    };
                    Ok(Value::Array(ArrayRef::new(int_array, int, items)))
                }),
            );
        builder
            .define(holder)
            .field("name", string)
            .field("bag", bag)
            .field("point", counter)
            .field("child", holder);

        Self {
            int,
            long,
            string,
            object,
            color,
            base,
            derived,
            other,
            animal,
            dog,
            puppy,
            cat,
            counter_interface,
            counter,
            overloads,
            ambiguous,
            bag,
            int_array,
            holder,
            builder: Some(builder),
        }
    }

    pub fn runtime(&mut self) -> Runtime {
        let builder = self.builder.take().expect("runtime() is called once per fixture");
        Runtime::new(builder.build())
    }

    pub fn field(runtime: &Runtime, ty: TypeDescription, name: &str) -> FieldDescription {
        runtime
            .resolver()
            .field(ty, name)
            .unwrap_or_else(|| panic!("no field {name}"))
    }

    pub fn method(runtime: &Runtime, ty: TypeDescription, name: &str) -> MethodDescription {
        runtime
            .resolver()
            .declared_method(ty, name, None, None)
            .unwrap()
            .unwrap_or_else(|| panic!("no method {name}"))
    }
}

/// Builds the fixture and its runtime in one go.
pub fn zoo() -> (Zoo, Runtime) {
    let mut zoo = Zoo::new();
    let runtime = zoo.runtime();
    (zoo, runtime)
}
