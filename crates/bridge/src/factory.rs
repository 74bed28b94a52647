use std::collections::{HashMap, HashSet};

use crate::descriptor::ModuleDescriptor;
use crate::error::{
    DUPLICATE_MODULE, INVALID_DESCRIPTOR, MODULE_NOT_FOUND, StructuredError, guard,
};
use crate::method::MethodTable;
use crate::module::{NativeCapability, NativeModule};
use crate::runtime::RuntimeHandle;

pub type ModuleConstructor =
    Box<dyn Fn(&ModuleDescriptor) -> anyhow::Result<Box<dyn NativeCapability>> + Send + Sync>;

/// Constructors the host knows about, keyed by implementation name.
#[derive(Default)]
pub struct ModuleProvider {
    constructors: HashMap<String, ModuleConstructor>,
}

impl ModuleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, implementation: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&ModuleDescriptor) -> anyhow::Result<Box<dyn NativeCapability>>
            + Send
            + Sync
            + 'static,
    {
        let implementation = implementation.into();
        if self
            .constructors
            .insert(implementation.clone(), Box::new(constructor))
            .is_some()
        {
            tracing::warn!("replacing native module constructor '{}'", implementation);
        }
        self
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.constructors.contains_key(implementation)
    }

    fn construct(
        &self,
        descriptor: &ModuleDescriptor,
    ) -> Result<Box<dyn NativeCapability>, StructuredError> {
        let constructor = self.constructors.get(descriptor.implementation()).ok_or_else(|| {
            StructuredError::new(
                MODULE_NOT_FOUND,
                format!(
                    "no native implementation registered for '{}'",
                    descriptor.implementation()
                ),
            )
        })?;
        guard(|| constructor(descriptor))
    }
}

/// A descriptor that did not produce a module.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to construct native module '{name}' (descriptor #{index}): {error}")]
pub struct ConstructionFailure {
    pub index: usize,
    pub name: String,
    pub error: StructuredError,
}

/// Result of one factory run: exactly one entry per descriptor, in order.
#[derive(Debug)]
pub struct CreatedModules {
    entries: Vec<Result<NativeModule, ConstructionFailure>>,
}

impl CreatedModules {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Result<NativeModule, ConstructionFailure>> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Result<NativeModule, ConstructionFailure>] {
        &self.entries
    }

    pub fn modules(&self) -> impl Iterator<Item = &NativeModule> {
        self.entries.iter().filter_map(|entry| entry.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConstructionFailure> {
        self.entries.iter().filter_map(|entry| entry.as_ref().err())
    }
}

/// Builds one module per descriptor. A descriptor that cannot be built fails
/// on its own; the rest of the batch still constructs.
pub fn create_native_modules(
    descriptors: &[ModuleDescriptor],
    runtime: &RuntimeHandle,
    provider: &ModuleProvider,
) -> CreatedModules {
    let mut registered = HashSet::with_capacity(descriptors.len());
    let entries = descriptors
        .iter()
        .enumerate()
        .map(|(index, descriptor)| {
            let entry = build_module(index, descriptor, runtime, provider, &registered);
            match &entry {
                Ok(module) => {
                    registered.insert(module.name().to_string());
                    tracing::debug!(
                        "constructed native module {} ({} methods)",
                        module.name(),
                        module.methods().len()
                    );
                }
                Err(failure) => tracing::warn!("{}", failure),
            }
            entry
        })
        .collect();

    CreatedModules { entries }
}

fn build_module(
    index: usize,
    descriptor: &ModuleDescriptor,
    runtime: &RuntimeHandle,
    provider: &ModuleProvider,
    registered: &HashSet<String>,
) -> Result<NativeModule, ConstructionFailure> {
    let fail = |error: StructuredError| ConstructionFailure {
        index,
        name: descriptor.name().to_string(),
        error: error.with_context_entry("module", descriptor.name()),
    };

    if descriptor.name().is_empty() {
        return Err(fail(StructuredError::new(
            INVALID_DESCRIPTOR,
            "module descriptor has an empty name",
        )));
    }
    if registered.contains(descriptor.name()) {
        return Err(fail(StructuredError::new(
            DUPLICATE_MODULE,
            format!("native module '{}' is already registered", descriptor.name()),
        )));
    }

    let capability = provider.construct(descriptor).map_err(fail)?;
    let (methods, constants) = guard(|| Ok((capability.methods(), capability.constants())))
        .map_err(fail)?;
    let methods = MethodTable::new(methods).map_err(|message| {
        fail(StructuredError::new(
            INVALID_DESCRIPTOR,
            format!("native module '{}': {}", descriptor.name(), message),
        ))
    })?;

    Ok(NativeModule::new(
        descriptor.name().to_string(),
        index,
        methods,
        constants,
        capability,
        runtime.clone(),
    ))
}
