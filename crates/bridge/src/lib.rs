pub mod config;
pub mod descriptor;
pub mod error;
pub mod factory;
pub mod method;
pub mod module;
pub mod runtime;
pub mod session;
pub mod source;

pub use config::{BridgeConfig, ConfigError};
pub use descriptor::ModuleDescriptor;
pub use error::{HostError, NATIVE_MODULE_ERROR_DOMAIN, StructuredError, capture_error, guard};
pub use factory::{
    ConstructionFailure, CreatedModules, ModuleConstructor, ModuleProvider, create_native_modules,
};
pub use method::{
    Arguments, MethodHandler, MethodKind, MethodSignature, MethodSpec, MethodTable, ParamSpec,
    ValueKind,
};
pub use module::{InvocationContext, ModuleDescription, NativeCapability, NativeModule};
pub use runtime::{Runtime, RuntimeHandle, RuntimeMessage};
pub use session::BridgeSession;
pub use source::{CanonicalSourceName, canonicalize};
