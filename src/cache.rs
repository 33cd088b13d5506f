use crate::{
    invoker::{DelegateSignature, Invoker},
    runtime::Runtime,
    types::{
        MetadataExt, TypeDescription,
        members::{MethodDescription, ParameterType},
    },
};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::{collections::HashMap, sync::Arc};

/// Per-collection-type `Add` invokers used when deep copying collections.
/// Types without a usable `Add` are cached as `None`.
#[derive(Debug, Default)]
pub struct AppendStrategyCache {
    handlers: RwLock<HashMap<TypeDescription, Option<Arc<Invoker>>>>,
}

impl AppendStrategyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    pub fn get(&self, runtime: &Runtime, collection: TypeDescription) -> Option<Arc<Invoker>> {
        if let Some(cached) = self.handlers.read().get(&collection) {
            return cached.clone();
        }

        // only one thread binds a given type; readers keep going meanwhile
        let handlers = self.handlers.upgradable_read();
        if let Some(cached) = handlers.get(&collection) {
            return cached.clone();
        }
        let handler = Self::bind(runtime, collection).map(Arc::new);
        let mut handlers = RwLockUpgradableReadGuard::upgrade(handlers);
        handlers.entry(collection).or_insert(handler).clone()
    }

    fn bind(runtime: &Runtime, collection: TypeDescription) -> Option<Invoker> {
        let add = runtime.resolver().first_method(collection, |m| {
            m.name == "Add" && m.signature.instance && m.signature.parameters.len() == 1
        })?;
        let signature = Self::signature(runtime, collection, &add)?;
        match runtime.method_delegate(&add, &signature, None, true) {
            Ok(invoker) => Some(invoker),
            Err(e) => {
                tracing::warn!(
                    "cannot bind {}.Add for copying: {e}",
                    runtime.type_name(collection)
                );
                None
            }
        }
    }

    fn signature(
        runtime: &Runtime,
        collection: TypeDescription,
        add: &MethodDescription,
    ) -> Option<DelegateSignature> {
        let def = runtime.metadata().method_definition(add)?;
        let mut parameters = vec![ParameterType::Value(collection)];
        parameters.extend(def.signature.parameters.iter().copied());
        Some(DelegateSignature::new(parameters, def.signature.return_type))
    }
}
