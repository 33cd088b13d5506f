//! Method and constructor lookups.
//!
//! Without a parameter list a name may match several overloads on one type.
//! The lookup then retries with the parameterless overload and only reports
//! [`ResolutionError::Ambiguous`] when that retry finds nothing either.
use crate::{
    error::ResolutionError,
    resolver::MemberResolver,
    types::{
        CoreType, MetadataExt, ResolvedDebug, TypeDescription,
        members::{MethodDefinition, MethodDescription, MethodKind, ParameterType},
    },
};
use std::sync::Arc;

fn describe_parameters(resolver: &MemberResolver<'_>, parameters: Option<&[ParameterType]>) -> String {
    match parameters {
        None => "<any>".to_string(),
        Some(p) => {
            let names: Vec<_> = p.iter().map(|p| p.show(resolver.metadata())).collect();
            format!("({})", names.join(", "))
        }
    }
}

impl MemberResolver<'_> {
    /// Methods called `name` declared on `ty`. `Err` carries the candidates when
    /// no parameter list was given and more than one overload matches.
    fn unique_method(
        &self,
        ty: TypeDescription,
        name: &str,
        parameters: Option<&[ParameterType]>,
    ) -> Result<Option<MethodDescription>, Vec<MethodDescription>> {
        let Some(def) = self.metadata().type_definition(ty) else {
            return Ok(None);
        };
        let candidates: Vec<_> = def
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| m.name == name)
            .filter(|(_, m)| parameters.is_none_or(|p| m.signature.parameters == p))
            .map(|(index, _)| MethodDescription::method(ty, index))
            .collect();
        if parameters.is_none() && candidates.len() > 1 {
            return Err(candidates);
        }
        Ok(candidates.into_iter().next())
    }

    fn ambiguous(&self, ty: TypeDescription, name: &str, candidates: Vec<MethodDescription>) -> ResolutionError {
        ResolutionError::Ambiguous {
            type_name: self.name(ty),
            member: name.to_string(),
            candidates: candidates.iter().map(|m| m.show(self.metadata())).collect(),
        }
    }

    /// Applies generic arguments; the count must match the method's generic arity.
    fn instantiate(
        &self,
        method: MethodDescription,
        generics: Option<&[TypeDescription]>,
        operation: &str,
    ) -> Option<MethodDescription> {
        let Some(generics) = generics else {
            return Some(method);
        };
        let arity = self
            .metadata()
            .method_definition(&method)
            .map_or(0, |m| m.generic_parameters);
        if arity == 0 || arity != generics.len() {
            tracing::debug!(
                "{operation}: {} takes {arity} generic arguments, got {}",
                method.show(self.metadata()),
                generics.len()
            );
            return None;
        }
        Some(MethodDescription {
            generics: Some(Arc::from(generics)),
            ..method
        })
    }

    pub fn declared_method(
        &self,
        ty: TypeDescription,
        name: &str,
        parameters: Option<&[ParameterType]>,
        generics: Option<&[TypeDescription]>,
    ) -> Result<Option<MethodDescription>, ResolutionError> {
        if self.definition_for(ty, "DeclaredMethod").is_none() {
            return Ok(None);
        }
        if name.is_empty() {
            tracing::debug!("DeclaredMethod: name is null");
            return Ok(None);
        }
        let found = match self.unique_method(ty, name, parameters) {
            Ok(found) => found,
            Err(candidates) => match self.unique_method(ty, name, Some(&[])) {
                Ok(Some(parameterless)) => Some(parameterless),
                _ => return Err(self.ambiguous(ty, name, candidates)),
            },
        };
        let Some(method) = found else {
            tracing::debug!(
                "DeclaredMethod: could not find method for type {} and name {name} and parameters {}",
                self.name(ty),
                describe_parameters(self, parameters)
            );
            return Ok(None);
        };
        Ok(self.instantiate(method, generics, "DeclaredMethod"))
    }

    pub fn method(
        &self,
        ty: TypeDescription,
        name: &str,
        parameters: Option<&[ParameterType]>,
        generics: Option<&[TypeDescription]>,
    ) -> Result<Option<MethodDescription>, ResolutionError> {
        if self.definition_for(ty, "Method").is_none() {
            return Ok(None);
        }
        if name.is_empty() {
            tracing::debug!("Method: name is null");
            return Ok(None);
        }
        let found = match self.try_find_including_base_types(ty, |t| self.unique_method(t, name, parameters)) {
            Ok(found) => found,
            Err(candidates) => {
                let parameterless = self.find_including_base_types(ty, |t| {
                    self.unique_method(t, name, Some(&[])).ok().flatten()
                });
                match parameterless {
                    Some(m) => Some(m),
                    None => return Err(self.ambiguous(ty, name, candidates)),
                }
            }
        };
        let Some(method) = found else {
            tracing::debug!(
                "Method: could not find method for type {} and name {name} and parameters {}",
                self.name(ty),
                describe_parameters(self, parameters)
            );
            return Ok(None);
        };
        Ok(self.instantiate(method, generics, "Method"))
    }

    /// Resolves `Namespace.Type:Method` against the methods declared on that type.
    pub fn method_by_path(
        &self,
        path: &str,
        parameters: Option<&[ParameterType]>,
        generics: Option<&[TypeDescription]>,
    ) -> Result<Option<MethodDescription>, ResolutionError> {
        if path.is_empty() {
            tracing::debug!("Method: typeColonMethodname is null");
            return Ok(None);
        }
        let parts: Vec<_> = path.split(':').collect();
        let [type_name, method_name] = parts.as_slice() else {
            return Err(ResolutionError::MalformedMethodPath(path.to_string()));
        };
        let Some(ty) = self.type_by_name(type_name) else {
            return Ok(None);
        };
        self.declared_method(ty, method_name, parameters, generics)
    }

    pub fn first_method(
        &self,
        ty: TypeDescription,
        mut predicate: impl FnMut(&MethodDefinition) -> bool,
    ) -> Option<MethodDescription> {
        let def = self.definition_for(ty, "FirstMethod")?;
        def.methods
            .iter()
            .position(&mut predicate)
            .map(|index| MethodDescription::method(ty, index))
    }

    pub fn first_constructor(
        &self,
        ty: TypeDescription,
        mut predicate: impl FnMut(&MethodDefinition) -> bool,
    ) -> Option<MethodDescription> {
        let def = self.definition_for(ty, "FirstConstructor")?;
        def.constructors
            .iter()
            .position(&mut predicate)
            .map(|index| MethodDescription::constructor(ty, index))
    }

    fn declared_constructor_matching(
        &self,
        ty: TypeDescription,
        parameters: &[ParameterType],
        search_static: bool,
    ) -> Option<MethodDescription> {
        let def = self.metadata().type_definition(ty)?;
        def.constructors
            .iter()
            .position(|c| c.is_static() == search_static && c.signature.parameters == parameters)
            .map(|index| MethodDescription::constructor(ty, index))
    }

    /// Omitted parameters select the parameterless overload. `search_static`
    /// selects the type initializer instead of instance constructors.
    pub fn declared_constructor(
        &self,
        ty: TypeDescription,
        parameters: Option<&[ParameterType]>,
        search_static: bool,
    ) -> Option<MethodDescription> {
        self.definition_for(ty, "DeclaredConstructor")?;
        let parameters = parameters.unwrap_or_default();
        let found = self.declared_constructor_matching(ty, parameters, search_static);
        if found.is_none() {
            tracing::debug!(
                "DeclaredConstructor: could not find constructor for type {} and parameters {}",
                self.name(ty),
                describe_parameters(self, Some(parameters))
            );
        }
        found
    }

    pub fn constructor(
        &self,
        ty: TypeDescription,
        parameters: Option<&[ParameterType]>,
        search_static: bool,
    ) -> Option<MethodDescription> {
        self.definition_for(ty, "Constructor")?;
        let parameters = parameters.unwrap_or_default();
        let found = self.find_including_base_types(ty, |t| {
            self.declared_constructor_matching(t, parameters, search_static)
        });
        if found.is_none() {
            tracing::debug!(
                "Constructor: could not find constructor for type {} and parameters {}",
                self.name(ty),
                describe_parameters(self, Some(parameters))
            );
        }
        found
    }

    /// Return type of a method; `System.Void` for constructors and void methods.
    pub fn returned_type(&self, method: &MethodDescription) -> TypeDescription {
        let void = self.metadata().core_type(CoreType::Void);
        match method.kind {
            MethodKind::Constructor => void,
            MethodKind::Method => self
                .metadata()
                .method_definition(method)
                .and_then(|m| m.signature.return_type)
                .map_or(void, |r| r.ty()),
        }
    }
}
