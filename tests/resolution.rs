mod common;

use common::{Zoo, zoo};
use dotnet_access::{
    error::ResolutionError,
    types::{MetadataExt, members::ParameterType},
};

#[test]
fn overloads_fall_back_to_the_parameterless_method() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    let run = resolver
        .declared_method(zoo.overloads, "Run", None, None)
        .unwrap()
        .unwrap();
    let def = runtime.metadata().method_definition(&run).unwrap();
    assert!(def.signature.parameters.is_empty());

    let with_string = resolver
        .method(zoo.overloads, "Run", Some(&[ParameterType::Value(zoo.string)]), None)
        .unwrap()
        .unwrap();
    assert_ne!(run, with_string);
}

#[test]
fn ambiguous_overloads_are_reported() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    for result in [
        resolver.declared_method(zoo.ambiguous, "Go", None, None),
        resolver.method(zoo.ambiguous, "Go", None, None),
    ] {
        let Err(ResolutionError::Ambiguous { candidates, .. }) = result else {
            panic!("expected an ambiguity, got {result:?}");
        };
        assert_eq!(candidates.len(), 2);
    }
    // an explicit parameter list picks one
    assert!(resolver
        .method(zoo.ambiguous, "Go", Some(&[ParameterType::Value(zoo.int)]), None)
        .unwrap()
        .is_some());
}

#[test]
fn missing_members_are_not_errors() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    assert_eq!(resolver.method(zoo.base, "Missing", None, None), Ok(None));
    assert_eq!(resolver.field(zoo.base, "missing"), None);
    assert_eq!(resolver.property(zoo.base, "Missing"), None);
    assert_eq!(resolver.inner(zoo.base, "Missing"), None);
    assert_eq!(resolver.field(zoo.base, ""), None);
    // a parameter list that matches nothing
    assert_eq!(
        resolver.method(zoo.overloads, "Run", Some(&[ParameterType::Value(zoo.long)]), None),
        Ok(None)
    );
}

#[test]
fn inherited_members_are_found_on_derived_types() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    assert_eq!(resolver.declared_field(zoo.derived, "count"), None);
    let count = resolver.field(zoo.derived, "count").unwrap();
    assert_eq!(count, Zoo::field(&runtime, zoo.base, "count"));

    // the nearest declaration wins
    let describe = resolver.method(zoo.derived, "Describe", None, None).unwrap().unwrap();
    assert_eq!(describe.parent, zoo.derived);
    assert_eq!(
        resolver.base_definition(&describe),
        Zoo::method(&runtime, zoo.base, "Describe")
    );

    let speak = resolver.method(zoo.puppy, "Speak", None, None).unwrap().unwrap();
    assert_eq!(speak.parent, zoo.puppy);
}

#[test]
fn method_paths_name_type_and_method() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    let describe = resolver
        .method_by_path("Demo.Derived:Describe", None, None)
        .unwrap()
        .unwrap();
    assert_eq!(describe.parent, zoo.derived);
    assert!(matches!(
        resolver.method_by_path("Demo.Derived.Describe", None, None),
        Err(ResolutionError::MalformedMethodPath(_))
    ));
    assert_eq!(resolver.method_by_path("Demo.Nowhere:Describe", None, None), Ok(None));
}

#[test]
fn generic_arguments_need_a_generic_method() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    assert_eq!(
        resolver.method(zoo.base, "Describe", None, Some(&[zoo.int])),
        Ok(None)
    );
}

#[test]
fn interface_maps_follow_inheritance() {
    let (zoo, runtime) = zoo();
    let resolver = runtime.resolver();
    let speak = Zoo::method(&runtime, zoo.animal, "Speak");

    let for_dog = resolver.implementation_of(zoo.dog, &speak).unwrap();
    assert_eq!(for_dog.parent, zoo.dog);
    let for_puppy = resolver.resolve_virtual(&speak, zoo.puppy).unwrap();
    assert_eq!(for_puppy.parent, zoo.puppy);
    assert_eq!(resolver.implementation_of(zoo.base, &speak), None);
}
