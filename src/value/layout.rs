use crate::{
    config::DEFAULT_HIERARCHY_DEPTH,
    types::{MetadataExt, MetadataProvider, TypeDescription, TypeKind, members::FieldDescription},
    value::{FieldStorage, Object, Value},
};

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSlot {
    pub field: FieldDescription,
    pub name: String,
    pub field_type: TypeDescription,
}

/// Slot assignment for the fields of one type. Instance layouts place base
/// type fields first so a slot stays valid for every derived type.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    pub description: TypeDescription,
    slots: Vec<FieldSlot>,
}

impl FieldLayout {
    fn collect(
        metadata: &dyn MetadataProvider,
        description: TypeDescription,
        owners: impl IntoIterator<Item = TypeDescription>,
        static_fields: bool,
    ) -> Self {
        let mut slots = vec![];
        for owner in owners {
            let Some(def) = metadata.type_definition(owner) else {
                continue;
            };
            for (index, field) in def.fields.iter().enumerate() {
                if field.static_member == static_fields {
                    slots.push(FieldSlot {
                        field: FieldDescription {
                            parent: owner,
                            index,
                        },
                        name: field.name.clone(),
                        field_type: field.field_type,
                    });
                }
            }
        }
        Self { description, slots }
    }

    pub fn instance(metadata: &dyn MetadataProvider, description: TypeDescription) -> Self {
        Self::instance_limited(metadata, description, DEFAULT_HIERARCHY_DEPTH)
    }

    pub fn instance_limited(
        metadata: &dyn MetadataProvider,
        description: TypeDescription,
        depth_limit: usize,
    ) -> Self {
        let mut chain: Vec<_> = metadata.ancestors(description, depth_limit).collect();
        chain.reverse();
        Self::collect(metadata, description, chain, false)
    }

    pub fn statics(metadata: &dyn MetadataProvider, description: TypeDescription) -> Self {
        Self::collect(metadata, description, [description], true)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn slot_of(&self, field: FieldDescription) -> Option<usize> {
        self.slots.iter().position(|s| s.field == field)
    }

    /// Most derived field with the given name.
    pub fn slot_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().rposition(|s| s.name == name)
    }

    pub fn new_storage(&self, metadata: &dyn MetadataProvider) -> FieldStorage {
        self.storage_with_depth(metadata, DEFAULT_HIERARCHY_DEPTH)
    }

    fn storage_with_depth(&self, metadata: &dyn MetadataProvider, depth: usize) -> FieldStorage {
        FieldStorage::new(
            self.slots
                .iter()
                .map(|s| default_value_with_depth(metadata, s.field_type, depth))
                .collect(),
        )
    }
}

/// Zero value of `ty`: null for reference types, zeroed fields for structs.
pub fn default_value(metadata: &dyn MetadataProvider, ty: TypeDescription) -> Value {
    default_value_with_depth(metadata, ty, DEFAULT_HIERARCHY_DEPTH)
}

fn default_value_with_depth(metadata: &dyn MetadataProvider, ty: TypeDescription, depth: usize) -> Value {
    match metadata.kind_of(ty) {
        Some(TypeKind::Primitive(core)) => Value::default_for(core),
        Some(TypeKind::Enum { underlying }) => Value::default_for(underlying),
        // a struct that (malformed) contains itself bottoms out at null
        Some(TypeKind::Struct) if depth > 0 => {
            let layout = FieldLayout::instance(metadata, ty);
            Value::Struct(Object::new(ty, layout.storage_with_depth(metadata, depth - 1)))
        }
        _ => Value::Null,
    }
}
