use crate::{
    resolver::MemberResolver,
    types::{
        InterfaceMap, MetadataExt, ResolvedDebug, TypeDescription,
        members::{MethodDescription, MethodKind},
    },
};

impl<'m> MemberResolver<'m> {
    /// The method that introduced the virtual slot `method` occupies.
    pub fn base_definition(&self, method: &MethodDescription) -> MethodDescription {
        let mut current = method.definition();
        for _ in 0..self.depth_limit {
            let next = self
                .metadata()
                .method_definition(&current)
                .and_then(|m| m.overrides.clone());
            match next {
                Some(base) if !base.is_same_definition(&current) => current = base,
                _ => {
                    return MethodDescription {
                        generics: method.generics.clone(),
                        ..current
                    };
                }
            }
        }
        tracing::warn!(
            "override chain of {} exceeds the hierarchy depth limit",
            method.show(self.metadata())
        );
        method.clone()
    }

    /// Interface map for `interface` on `ty` or the nearest base declaring one.
    pub fn interface_map(
        &self,
        ty: TypeDescription,
        interface: TypeDescription,
    ) -> Option<&'m InterfaceMap> {
        self.find_including_base_types(ty, |t| {
            self.metadata()
                .type_definition(t)?
                .interface_maps
                .iter()
                .find(|m| m.interface == interface)
        })
    }

    /// The method of `ty` that implements `interface_method`, after overrides.
    pub fn implementation_of(
        &self,
        ty: TypeDescription,
        interface_method: &MethodDescription,
    ) -> Option<MethodDescription> {
        let map = self.interface_map(ty, interface_method.parent)?;
        let (_, target) = map
            .entries
            .iter()
            .find(|(im, _)| im.is_same_definition(interface_method))?;
        let target = MethodDescription {
            generics: interface_method.generics.clone(),
            ..target.clone()
        };
        let is_virtual = self
            .metadata()
            .method_definition(&target)
            .is_some_and(|m| m.virtual_member);
        if is_virtual {
            self.resolve_virtual(&target, ty)
        } else {
            Some(target)
        }
    }

    /// Reverse interface lookup: the method of `interface` that `target` implements on `ty`.
    pub fn interface_method_for(
        &self,
        ty: TypeDescription,
        interface: TypeDescription,
        target: &MethodDescription,
    ) -> Option<MethodDescription> {
        let map = self.interface_map(ty, interface)?;
        let slot = self.base_definition(target);
        map.entries
            .iter()
            .find(|(_, implementation)| {
                implementation.is_same_definition(target)
                    || self.base_definition(implementation).is_same_definition(&slot)
            })
            .map(|(im, _)| MethodDescription {
                generics: target.generics.clone(),
                ..im.clone()
            })
    }

    /// Most-derived implementation of `method` for an instance of `runtime_type`.
    /// Interface methods go through the interface maps; a default interface
    /// body is used when the type provides none.
    pub fn resolve_virtual(
        &self,
        method: &MethodDescription,
        runtime_type: TypeDescription,
    ) -> Option<MethodDescription> {
        let def = self.metadata().method_definition(method)?;
        if self.metadata().is_interface(method.parent) {
            return self.implementation_of(runtime_type, method).or_else(|| {
                def.body.as_ref().map(|_| method.clone())
            });
        }
        if !def.virtual_member || method.kind == MethodKind::Constructor {
            return Some(method.clone());
        }
        let slot = self.base_definition(method);
        for ancestor in self.metadata().ancestors(runtime_type, self.depth_limit) {
            let Some(ancestor_def) = self.metadata().type_definition(ancestor) else {
                continue;
            };
            for (index, candidate) in ancestor_def.methods.iter().enumerate() {
                if !candidate.virtual_member || candidate.abstract_member {
                    continue;
                }
                let candidate = MethodDescription::method(ancestor, index);
                if self.base_definition(&candidate).is_same_definition(&slot) {
                    return Some(MethodDescription {
                        generics: method.generics.clone(),
                        ..candidate
                    });
                }
            }
        }
        tracing::debug!(
            "no implementation of {} for {}",
            method.show(self.metadata()),
            self.name(runtime_type)
        );
        None
    }
}
