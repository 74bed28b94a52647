use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{StructuredError, guard};
use crate::method::{Arguments, MethodSignature, MethodSpec, MethodTable};
use crate::runtime::{RuntimeHandle, RuntimeMessage};

/// Native side of a module. Implementations are constructed by a
/// [`ModuleProvider`](crate::factory::ModuleProvider) constructor.
pub trait NativeCapability: Send + Sync {
    /// Operations the runtime may call, each bound to its handler. Read
    /// once, at construction.
    fn methods(&self) -> Vec<MethodSpec>;

    /// Values exported to the runtime alongside the method list.
    fn constants(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Called once when the owning session is torn down.
    fn invalidate(&self) {}
}

pub struct InvocationContext<'a> {
    module: &'a str,
    runtime: &'a RuntimeHandle,
}

impl<'a> InvocationContext<'a> {
    pub fn new(module: &'a str, runtime: &'a RuntimeHandle) -> Self {
        Self { module, runtime }
    }

    pub fn module_name(&self) -> &str {
        self.module
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        self.runtime
    }

    pub fn emit(&self, event: &str, body: Value) -> anyhow::Result<()> {
        self.runtime.post(RuntimeMessage::Event {
            module: self.module.to_string(),
            name: event.to_string(),
            body,
        })
    }

    pub fn request_reload(&self, reason: &str) -> anyhow::Result<()> {
        self.runtime.post(RuntimeMessage::Reload {
            reason: reason.to_string(),
        })
    }
}

/// Module config handed to the runtime so it can build call stubs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDescription {
    pub name: String,
    pub constants: Map<String, Value>,
    pub methods: Vec<MethodSignature>,
}

/// One constructed module, bound to the descriptor at `descriptor_index`.
pub struct NativeModule {
    name: String,
    descriptor_index: usize,
    methods: MethodTable,
    constants: Map<String, Value>,
    capability: Box<dyn NativeCapability>,
    runtime: RuntimeHandle,
}

impl NativeModule {
    pub(crate) fn new(
        name: String,
        descriptor_index: usize,
        methods: MethodTable,
        constants: Map<String, Value>,
        capability: Box<dyn NativeCapability>,
        runtime: RuntimeHandle,
    ) -> Self {
        Self {
            name,
            descriptor_index,
            methods,
            constants,
            capability,
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor_index(&self) -> usize {
        self.descriptor_index
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub fn constants(&self) -> &Map<String, Value> {
        &self.constants
    }

    pub fn describe(&self) -> ModuleDescription {
        ModuleDescription {
            name: self.name.clone(),
            constants: self.constants.clone(),
            methods: self.methods.signatures(),
        }
    }

    pub fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, StructuredError> {
        let spec = self.methods.lookup(method)?;
        spec.signature().check_arguments(&args)?;

        tracing::debug!("invoking {}.{}", self.name, method);
        let ctx = InvocationContext::new(&self.name, &self.runtime);
        guard(|| spec.call(&ctx, Arguments::new(args))).inspect_err(|err| {
            tracing::warn!("{}.{} failed: {}", self.name, method, err);
        })
    }

    pub(crate) fn invalidate(&self) {
        if let Some(err) = crate::error::capture_error(|| {
            self.capability.invalidate();
            Ok(())
        }) {
            tracing::warn!("failed to invalidate native module {}: {}", self.name, err);
        }
    }
}

impl std::fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeModule")
            .field("name", &self.name)
            .field("descriptor_index", &self.descriptor_index)
            .field("methods", &self.methods.len())
            .finish()
    }
}
