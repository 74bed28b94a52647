//! Failure translation at the native/runtime boundary.
//!
//! Native code fails in two ways: by returning an [`anyhow::Error`] or by
//! panicking. [`guard`] runs a unit of work and reshapes either failure into a
//! [`StructuredError`], the only error shape the runtime ever observes.

use std::any::Any;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use deno_error::{AdditionalProperties, JsErrorBox, JsErrorClass, PropertyValue};
use serde::Serialize;
use serde_json::Value;

/// Domain stamped on every error produced by this crate.
pub const NATIVE_MODULE_ERROR_DOMAIN: &str = "NativeModuleInvocation";

pub const UNHANDLED_ERROR_CODE: i64 = 1;
pub const MODULE_NOT_FOUND: i64 = 2;
pub const DUPLICATE_MODULE: i64 = 3;
pub const INVALID_DESCRIPTOR: i64 = 4;
pub const METHOD_NOT_FOUND: i64 = 5;
pub const INVALID_ARGUMENTS: i64 = 6;
pub const RUNTIME_UNAVAILABLE: i64 = 7;

const UNKNOWN_ERROR_MESSAGE: &str = "unknown native error";

/// Uniform error value handed to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct StructuredError {
    domain: String,
    code: i64,
    message: String,
    context: BTreeMap<String, Value>,
}

impl StructuredError {
    pub(crate) fn new(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            domain: NATIVE_MODULE_ERROR_DOMAIN.to_string(),
            code,
            message: if message.is_empty() {
                UNKNOWN_ERROR_MESSAGE.to_string()
            } else {
                message
            },
            context: BTreeMap::new(),
        }
    }

    /// Adds a context entry unless the key is already present.
    pub(crate) fn with_context_entry(mut self, key: &str, value: impl Serialize) -> Self {
        if !self.context.contains_key(key) {
            if let Some(value) = coerce_context_value(&value) {
                self.context.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "domain": self.domain,
            "code": self.code,
            "message": self.message,
            "context": self.context,
        })
    }

    fn from_host_failure(err: &anyhow::Error) -> Self {
        let mut code = None;
        let mut context = BTreeMap::new();

        // Outer causes win over inner ones for both code and context keys.
        for cause in err.chain() {
            let (cause_code, cause_context) =
                if let Some(host) = cause.downcast_ref::<HostError>() {
                    (host.code, &host.context)
                } else if let Some(structured) = cause.downcast_ref::<StructuredError>() {
                    (Some(structured.code), &structured.context)
                } else {
                    continue;
                };
            code = code.or(cause_code);
            for (key, value) in cause_context {
                context.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let mut error = Self::new(code.unwrap_or(UNHANDLED_ERROR_CODE), format!("{:#}", err));
        error.context = context;
        error
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            format!("native module panicked: {}", text)
        } else if let Some(text) = payload.downcast_ref::<String>() {
            format!("native module panicked: {}", text)
        } else {
            "native module panicked".to_string()
        };
        Self::new(UNHANDLED_ERROR_CODE, message)
    }
}

/// Domain, code and each context entry travel to the runtime as extra
/// properties on the thrown error. Context values are JSON text.
impl JsErrorClass for StructuredError {
    fn get_class(&self) -> Cow<'static, str> {
        if self.code == INVALID_ARGUMENTS {
            "TypeError".into()
        } else {
            "Error".into()
        }
    }

    fn get_message(&self) -> Cow<'static, str> {
        self.message.clone().into()
    }

    fn get_additional_properties(&self) -> AdditionalProperties {
        let mut properties: Vec<(Cow<'static, str>, PropertyValue)> = vec![
            ("domain".into(), self.domain.clone().into()),
            ("code".into(), self.code.to_string().into()),
        ];
        properties.extend(
            self.context
                .iter()
                .map(|(key, value)| (key.clone().into(), value.to_string().into())),
        );
        Box::new(properties.into_iter())
    }

    fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }
}

impl From<StructuredError> for JsErrorBox {
    fn from(err: StructuredError) -> Self {
        JsErrorBox::from_err(err)
    }
}

/// Failure raised by capability code that wants to control the reported
/// code and attach auxiliary data.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
    code: Option<i64>,
    context: BTreeMap<String, Value>,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Values that do not serialize to JSON, and nulls, are dropped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        match coerce_context_value(&value) {
            Some(value) => {
                self.context.insert(key, value);
            }
            None => tracing::debug!("dropping non-representable error context entry '{}'", key),
        }
        self
    }

    pub fn code(&self) -> Option<i64> {
        self.code
    }
}

/// Runs `work` inline and converts any failure into a [`StructuredError`].
pub fn guard<T, F>(work: F) -> Result<T, StructuredError>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(StructuredError::from_host_failure(&err)),
        Err(payload) => Err(StructuredError::from_panic(payload)),
    }
}

/// Like [`guard`] for work with no result: `None` means it succeeded.
pub fn capture_error<F>(work: F) -> Option<StructuredError>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    guard(work).err()
}

fn coerce_context_value(value: &impl Serialize) -> Option<Value> {
    serde_json::to_value(value).ok().and_then(sanitize_value)
}

fn sanitize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(sanitize_value).collect(),
        )),
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(key, value)| sanitize_value(value).map(|value| (key, value)))
                .collect(),
        )),
        other => Some(other),
    }
}
