//! Declared operations of a native module.
//!
//! Every module publishes a fixed list of [`MethodSpec`]s, each a signature
//! bound to its handler. The wrapper builds a [`MethodTable`] from that list
//! once, at construction, and every call from the runtime is resolved and
//! type-checked against it before the handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{INVALID_ARGUMENTS, METHOD_NOT_FOUND, StructuredError};
use crate::module::InvocationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Returns its value directly to the caller.
    Sync,
    /// Settles a promise on the runtime side.
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::Any => true,
            ValueKind::Null => value.is_null(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Number => value.is_number(),
            ValueKind::String => value.is_string(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
        }
    }

    fn describe(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub optional: bool,
}

/// Declared shape of a method, as published to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodSignature {
    pub name: &'static str,
    pub kind: MethodKind,
    pub params: Vec<ParamSpec>,
    pub returns: ValueKind,
}

impl MethodSignature {
    /// Checks call arguments against the declared parameters. Missing or null
    /// arguments are accepted for optional parameters.
    pub fn check_arguments(&self, args: &[Value]) -> Result<(), StructuredError> {
        if args.len() > self.params.len() {
            return Err(StructuredError::new(
                INVALID_ARGUMENTS,
                format!(
                    "{} expects at most {} argument(s), got {}",
                    self.name,
                    self.params.len(),
                    args.len()
                ),
            )
            .with_context_entry("method", self.name));
        }

        for (index, param) in self.params.iter().enumerate() {
            match args.get(index) {
                None | Some(Value::Null) if param.optional => {}
                None => {
                    return Err(StructuredError::new(
                        INVALID_ARGUMENTS,
                        format!("{} is missing argument '{}'", self.name, param.name),
                    )
                    .with_context_entry("method", self.name)
                    .with_context_entry("index", index));
                }
                Some(value) if !param.kind.accepts(value) => {
                    return Err(StructuredError::new(
                        INVALID_ARGUMENTS,
                        format!(
                            "{} argument '{}' must be {:?}, got {}",
                            self.name,
                            param.name,
                            param.kind,
                            ValueKind::describe(value)
                        ),
                    )
                    .with_context_entry("method", self.name)
                    .with_context_entry("index", index));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Native code behind one method. `args` already match the signature.
pub type MethodHandler =
    Arc<dyn Fn(&InvocationContext<'_>, Arguments) -> anyhow::Result<Value> + Send + Sync>;

/// A method signature bound to the handler that runs it.
#[derive(Clone)]
pub struct MethodSpec {
    signature: MethodSignature,
    handler: MethodHandler,
}

impl MethodSpec {
    pub fn sync<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&InvocationContext<'_>, Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            signature: MethodSignature {
                name,
                kind: MethodKind::Sync,
                params: Vec::new(),
                returns: ValueKind::Null,
            },
            handler: Arc::new(handler),
        }
    }

    pub fn asynchronous<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&InvocationContext<'_>, Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let mut spec = Self::sync(name, handler);
        spec.signature.kind = MethodKind::Async;
        spec
    }

    pub fn param(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.signature.params.push(ParamSpec {
            name,
            kind,
            optional: false,
        });
        self
    }

    pub fn optional_param(mut self, name: &'static str, kind: ValueKind) -> Self {
        self.signature.params.push(ParamSpec {
            name,
            kind,
            optional: true,
        });
        self
    }

    pub fn returns(mut self, kind: ValueKind) -> Self {
        self.signature.returns = kind;
        self
    }

    pub fn name(&self) -> &'static str {
        self.signature.name
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub(crate) fn call(
        &self,
        ctx: &InvocationContext<'_>,
        args: Arguments,
    ) -> anyhow::Result<Value> {
        (self.handler)(ctx, args)
    }
}

impl std::fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSpec")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Name-indexed lookup table over a module's methods.
#[derive(Debug, Clone)]
pub struct MethodTable {
    methods: Vec<MethodSpec>,
    index: HashMap<&'static str, usize>,
}

impl MethodTable {
    pub fn new(methods: Vec<MethodSpec>) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(methods.len());
        for (position, method) in methods.iter().enumerate() {
            if method.name().is_empty() {
                return Err(format!("method #{} has an empty name", position));
            }
            if index.insert(method.name(), position).is_some() {
                return Err(format!("method '{}' is declared twice", method.name()));
            }
        }
        Ok(Self { methods, index })
    }

    pub fn lookup(&self, name: &str) -> Result<&MethodSpec, StructuredError> {
        self.index
            .get(name)
            .map(|&position| &self.methods[position])
            .ok_or_else(|| {
                StructuredError::new(METHOD_NOT_FOUND, format!("unknown method '{}'", name))
                    .with_context_entry("method", name)
            })
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }

    pub fn signatures(&self) -> Vec<MethodSignature> {
        self.methods
            .iter()
            .map(|method| method.signature().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Positional call arguments, already checked against a [`MethodSignature`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Vec<Value>);

impl Arguments {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index).filter(|value| !value.is_null())
    }

    pub fn string(&self, index: usize) -> anyhow::Result<&str> {
        self.get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("argument {} is not a string", index))
    }

    pub fn bool(&self, index: usize) -> anyhow::Result<bool> {
        self.get(index)
            .and_then(Value::as_bool)
            .ok_or_else(|| anyhow::anyhow!("argument {} is not a bool", index))
    }

    pub fn number(&self, index: usize) -> anyhow::Result<f64> {
        self.get(index)
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow::anyhow!("argument {} is not a number", index))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}
