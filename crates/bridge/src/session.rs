use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::ModuleDescriptor;
use crate::error::{MODULE_NOT_FOUND, StructuredError};
use crate::factory::{ConstructionFailure, CreatedModules, ModuleProvider, create_native_modules};
use crate::module::{ModuleDescription, NativeModule};
use crate::runtime::{Runtime, RuntimeHandle};
use crate::source::{self, CanonicalSourceName};

/// One bridge lifetime: the runtime it talks to and the modules built for it.
///
/// Modules only hold a weak handle to the runtime; the session holds the
/// strong one. Dropping the session invalidates every module.
pub struct BridgeSession {
    runtime: Arc<dyn Runtime>,
    created: CreatedModules,
    by_name: HashMap<String, usize>,
    bundle: Option<CanonicalSourceName>,
}

impl BridgeSession {
    pub fn start(
        runtime: Arc<dyn Runtime>,
        descriptors: &[ModuleDescriptor],
        provider: &ModuleProvider,
    ) -> Self {
        let handle = RuntimeHandle::new(&runtime);
        let created = create_native_modules(descriptors, &handle, provider);
        let by_name = created
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .as_ref()
                    .ok()
                    .map(|module| (module.name().to_string(), index))
            })
            .collect();

        tracing::debug!(
            "bridge session started with {} module(s), {} failure(s)",
            created.modules().count(),
            created.failures().count()
        );

        Self {
            runtime,
            created,
            by_name,
            bundle: None,
        }
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        RuntimeHandle::new(&self.runtime)
    }

    pub fn created(&self) -> &CreatedModules {
        &self.created
    }

    pub fn module(&self, name: &str) -> Option<&NativeModule> {
        let index = *self.by_name.get(name)?;
        self.created.get(index)?.as_ref().ok()
    }

    pub fn modules(&self) -> impl Iterator<Item = &NativeModule> {
        self.created.modules()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConstructionFailure> {
        self.created.failures()
    }

    pub fn describe_modules(&self) -> Vec<ModuleDescription> {
        self.modules().map(NativeModule::describe).collect()
    }

    /// Records the bundle the runtime is executing and returns its canonical name.
    pub fn load_bundle(&mut self, location: &str) -> &CanonicalSourceName {
        let name = source::canonicalize(location);
        tracing::debug!("loading bundle {}", name);
        self.bundle.insert(name)
    }

    pub fn bundle(&self) -> Option<&CanonicalSourceName> {
        self.bundle.as_ref()
    }

    pub fn invoke(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, StructuredError> {
        let result = match self.module(module) {
            Some(native) => native.invoke(method, args),
            None => Err(StructuredError::new(
                MODULE_NOT_FOUND,
                format!("unknown native module '{}'", module),
            )
            .with_context_entry("module", module)),
        };

        result.map_err(|err| match &self.bundle {
            Some(bundle) => err.with_context_entry("sourceURL", bundle.as_str()),
            None => err,
        })
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        for module in self.created.modules() {
            module.invalidate();
        }
        tracing::debug!("bridge session torn down");
    }
}
