use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::error::{HostError, RUNTIME_UNAVAILABLE};

/// Messages native modules post back into the scripting runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuntimeMessage {
    Event {
        module: String,
        name: String,
        body: Value,
    },
    Reload {
        reason: String,
    },
}

/// The running scripting runtime, as seen from native modules.
///
/// Implementations serialize posts onto their own thread or queue.
pub trait Runtime: Send + Sync {
    fn post(&self, message: RuntimeMessage) -> anyhow::Result<()>;
}

/// Non-owning handle to the runtime. Modules hold this so they never keep
/// the runtime alive.
#[derive(Clone, Default)]
pub struct RuntimeHandle {
    inner: Option<Weak<dyn Runtime>>,
}

impl RuntimeHandle {
    pub fn new(runtime: &Arc<dyn Runtime>) -> Self {
        Self {
            inner: Some(Arc::downgrade(runtime)),
        }
    }

    /// A handle that was never attached to a runtime.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.upgrade().is_some()
    }

    pub fn post(&self, message: RuntimeMessage) -> anyhow::Result<()> {
        let runtime = self.upgrade().ok_or_else(|| {
            HostError::new("runtime instance is no longer running").with_code(RUNTIME_UNAVAILABLE)
        })?;
        runtime.post(message)
    }

    fn upgrade(&self) -> Option<Arc<dyn Runtime>> {
        self.inner.as_ref()?.upgrade()
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
